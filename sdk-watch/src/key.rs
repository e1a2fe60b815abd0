//! Mapping from file paths to resource keys.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// How a file path is turned into a store key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// File name with the configured extension stripped (`signing.pem` → `signing`)
    NameNoExtension,
    /// File name as-is
    NameWithExtension,
    /// Path below the nearest watch root, with one leading `/`
    PathRelativeToRoot,
    /// Absolute path unchanged
    #[default]
    FullPath,
}

/// Resolves keys for one loader: a strategy, the extension stripped by
/// [`KeyStrategy::NameNoExtension`] and the roots used by
/// [`KeyStrategy::PathRelativeToRoot`].
#[derive(Debug, Clone)]
pub struct KeyResolver {
    strategy: KeyStrategy,
    extension: Option<String>,
    roots: Vec<PathBuf>,
}

impl KeyResolver {
    /// Create a resolver. `extension` may be given with or without the
    /// leading dot.
    #[must_use]
    pub fn new(strategy: KeyStrategy, extension: Option<&str>, roots: Vec<PathBuf>) -> Self {
        Self {
            strategy,
            extension: extension.map(normalize_extension),
            roots,
        }
    }

    /// The configured strategy.
    #[must_use]
    pub const fn strategy(&self) -> KeyStrategy {
        self.strategy
    }

    /// The normalized extension (with its leading dot).
    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    /// Derive the key for `path`, or `None` if the path yields no key
    /// under this strategy.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> Option<String> {
        match self.strategy {
            KeyStrategy::FullPath => Some(path.to_string_lossy().into_owned()),
            KeyStrategy::NameWithExtension => file_name(path).map(str::to_owned),
            KeyStrategy::NameNoExtension => {
                let ext = self.extension.as_deref()?;
                let stem = file_name(path)?.strip_suffix(ext)?;
                (!stem.is_empty()).then(|| stem.to_owned())
            }
            KeyStrategy::PathRelativeToRoot => self.relative_to_root(path),
        }
    }

    fn relative_to_root(&self, path: &Path) -> Option<String> {
        let root = self
            .roots
            .iter()
            .filter(|root| path.starts_with(root))
            .max_by_key(|root| root.components().count())?;
        let parts: Vec<_> = path
            .strip_prefix(root)
            .ok()?
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            return None;
        }
        Some(format!("/{}", parts.join("/")))
    }
}

fn normalize_extension(ext: &str) -> String {
    if ext.starts_with('.') {
        ext.to_owned()
    } else {
        format!(".{ext}")
    }
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name()?.to_str()
}
