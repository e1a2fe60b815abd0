//! Test fixtures: generated PEM material and scratch directories.

use std::io;
use std::path::{Path, PathBuf};

use rcgen::{CertifiedKey, generate_simple_self_signed};
use tempfile::TempDir;

/// A self-signed certificate with its private key, PEM encoded.
#[derive(Debug, Clone)]
pub struct PemPair {
    /// Certificate PEM
    pub cert_pem: String,
    /// Private key PEM (PKCS#8)
    pub key_pem: String,
}

impl PemPair {
    /// Generate a pair for the given subject alternative names.
    ///
    /// # Errors
    ///
    /// Returns the rcgen error if generation fails.
    pub fn generate(names: &[&str]) -> Result<Self, rcgen::Error> {
        let names: Vec<String> = names.iter().map(ToString::to_string).collect();
        let CertifiedKey { cert, key_pair } = generate_simple_self_signed(names)?;
        Ok(Self {
            cert_pem: cert.pem(),
            key_pem: key_pair.serialize_pem(),
        })
    }

    /// Generate a pair for `localhost`.
    ///
    /// # Errors
    ///
    /// Returns the rcgen error if generation fails.
    pub fn localhost() -> Result<Self, rcgen::Error> {
        Self::generate(&["localhost"])
    }

    /// A certificate paired with a key that does not belong to it.
    ///
    /// # Errors
    ///
    /// Returns the rcgen error if generation fails.
    pub fn mismatched() -> Result<Self, rcgen::Error> {
        let cert = Self::localhost()?;
        let other = Self::localhost()?;
        Ok(Self {
            cert_pem: cert.cert_pem,
            key_pem: other.key_pem,
        })
    }
}

/// A temporary directory with convenience writers. Removed on drop.
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Create a fresh directory.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the directory cannot be created.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    /// Canonical path of the directory.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the path cannot be resolved.
    pub fn canonical(&self) -> io::Result<PathBuf> {
        self.dir.path().canonicalize()
    }

    /// Path of the directory as created.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` to `name` (relative, parent directories created).
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the write fails.
    pub fn write(&self, name: &str, contents: impl AsRef<[u8]>) -> io::Result<PathBuf> {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Write a file under a temporary name and rename it into place.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if either step fails.
    pub fn replace(&self, name: &str, contents: impl AsRef<[u8]>) -> io::Result<PathBuf> {
        let staged = self.write(&format!("{name}.tmp~"), contents)?;
        let path = self.dir.path().join(name);
        std::fs::rename(staged, &path)?;
        Ok(path)
    }

    /// Remove `name`.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be removed.
    pub fn remove(&self, name: &str) -> io::Result<()> {
        std::fs::remove_file(self.dir.path().join(name))
    }

    /// Write a certificate, key and optional CA bundle under the
    /// conventional `tls.crt` / `tls.key` / `ca.crt` names.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if a write fails.
    pub fn write_tls(&self, pair: &PemPair, ca: Option<&str>) -> io::Result<()> {
        self.write("tls.crt", &pair.cert_pem)?;
        self.write("tls.key", &pair.key_pem)?;
        if let Some(ca) = ca {
            self.write("ca.crt", ca)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_pair_is_pem() {
        let pair = PemPair::localhost().unwrap();
        assert!(pair.cert_pem.starts_with("-----BEGIN CERTIFICATE-----"));
        assert!(pair.key_pem.contains("PRIVATE KEY"));
    }

    #[test]
    fn test_scratch_dir_writes_nested() {
        let dir = ScratchDir::new().unwrap();
        let path = dir.write("a/b/c.pem", b"x").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"x");
        dir.replace("a/b/c.pem", b"y").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"y");
        dir.remove("a/b/c.pem").unwrap();
        assert!(!path.exists());
    }
}
