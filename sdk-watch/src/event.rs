//! Change events and the operation kinds they carry.

use std::fmt;
use std::path::{Path, PathBuf};

use bitflags::bitflags;
use notify::event::{EventKind, ModifyKind, RenameMode};

bitflags! {
    /// Filesystem operation kinds.
    ///
    /// A [`ChangeEvent`] carries exactly one flag; a combination is used as
    /// an operation filter.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Op: u8 {
        /// A file or directory appeared
        const CREATE = 1;
        /// File content changed
        const WRITE = 1 << 1;
        /// A file or directory was deleted
        const REMOVE = 1 << 2;
        /// A file or directory was moved away from this path
        const RENAME = 1 << 3;
        /// Metadata (permissions, timestamps) changed
        const CHMOD = 1 << 4;
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, _) in self.iter_names() {
            if !first {
                f.write_str("|")?;
            }
            f.write_str(name)?;
            first = false;
        }
        Ok(())
    }
}

/// A single filesystem change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Absolute path of the affected entry
    pub path: PathBuf,
    /// What happened to it
    pub op: Op,
}

impl ChangeEvent {
    /// Create a new change event.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, op: Op) -> Self {
        Self {
            path: path.into(),
            op,
        }
    }

    /// Check whether the event matches any kind in `ops`.
    #[must_use]
    pub const fn is(&self, ops: Op) -> bool {
        self.op.intersects(ops)
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op, self.path.display())
    }
}

/// Translate one raw notify event into zero or more change events.
pub(crate) fn translate(event: notify::Event) -> Vec<ChangeEvent> {
    let op = match event.kind {
        EventKind::Create(_) => Op::CREATE,
        EventKind::Remove(_) => Op::REMOVE,
        EventKind::Modify(ModifyKind::Metadata(_)) => Op::CHMOD,
        EventKind::Modify(ModifyKind::Name(mode)) => return renames(mode, event.paths),
        EventKind::Modify(_) => Op::WRITE,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => return Vec::new(),
    };
    event
        .paths
        .into_iter()
        .map(|path| ChangeEvent::new(path, op))
        .collect()
}

fn renames(mode: RenameMode, paths: Vec<PathBuf>) -> Vec<ChangeEvent> {
    match mode {
        RenameMode::From => paths
            .into_iter()
            .map(|p| ChangeEvent::new(p, Op::RENAME))
            .collect(),
        RenameMode::To => paths
            .into_iter()
            .map(|p| ChangeEvent::new(p, Op::CREATE))
            .collect(),
        // Backends reporting Both have already reported From and To.
        RenameMode::Both => Vec::new(),
        RenameMode::Any | RenameMode::Other => paths
            .into_iter()
            .map(|p| {
                let op = if exists(&p) { Op::CREATE } else { Op::RENAME };
                ChangeEvent::new(p, op)
            })
            .collect(),
    }
}

fn exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}
