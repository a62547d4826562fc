use std::{
    fs, io,
    path::{Path, PathBuf},
};

use log::debug;
use tempfile::TempDir;

/// Private temporary directory holding the keys for a single encryption attempt.
///
/// The directory and everything written into it is deleted when this is dropped.
#[derive(Debug)]
pub struct EphemeralKeyring {
    dir: TempDir,
}

impl EphemeralKeyring {
    pub fn create() -> io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("quote_mailer-keyring-")
            .tempdir()?;
        debug!("Created ephemeral keyring at {:?}", dir.path());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Writes `contents` to `name` inside the keyring and returns the full path
    pub fn write_file(&self, name: &str, contents: &str) -> io::Result<PathBuf> {
        let path = self.dir.path().join(name);
        fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn read_file(&self, name: &str) -> io::Result<String> {
        fs::read_to_string(self.dir.path().join(name))
    }
}

impl Drop for EphemeralKeyring {
    fn drop(&mut self) {
        debug!("Removing ephemeral keyring at {:?}", self.dir.path());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_on_drop() {
        // Arrange
        let keyring = EphemeralKeyring::create().unwrap();
        let file = keyring.write_file("key.asc", "material").unwrap();
        let dir = keyring.path().to_path_buf();
        assert!(file.exists());

        // Act
        drop(keyring);

        // Assert
        assert!(!file.exists());
        assert!(!dir.exists());
    }

    #[test]
    fn removed_when_unwinding() {
        let mut dir = None;
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let keyring = EphemeralKeyring::create().unwrap();
            dir = Some(keyring.path().to_path_buf());
            panic!("attempt aborted");
        }));

        assert!(result.is_err());
        assert!(!dir.unwrap().exists());
    }

    #[test]
    fn each_keyring_is_separate() {
        let a = EphemeralKeyring::create().unwrap();
        let b = EphemeralKeyring::create().unwrap();
        a.write_file("key.asc", "a").unwrap();
        assert_ne!(a.path(), b.path());
        assert!(b.read_file("key.asc").is_err());
        assert_eq!(a.read_file("key.asc").unwrap(), "a");
    }
}
