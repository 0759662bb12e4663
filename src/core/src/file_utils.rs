//! Disposable files for tests.
//!
//! [`write_test_file`] writes the given bytes to a file named `testfile` inside
//! a fresh temporary directory. The directory and file are removed when the
//! returned [`TestFile`] is dropped, so keep it alive for as long as the test
//! needs the path.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use tempfile::TempDir;

use crate::error_handling::types::FileError;

const TEMP_DIR_PREFIX: &str = "testutils-";
const FILE_NAME: &str = "testfile";

/// A file on disk that lives as long as this value.
#[derive(Debug)]
pub struct TestFile {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl TestFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The private directory holding the file.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or(&self.path)
    }
}

impl AsRef<Path> for TestFile {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

impl Drop for TestFile {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let dir_path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!(
                    "Failed to remove temporary directory {}: {}",
                    dir_path.display(),
                    e
                );
            } else {
                debug!("Removed temporary directory {}", dir_path.display());
            }
        }
    }
}

/// Creates a temporary file holding `content` with owner-only permissions.
pub fn write_test_file(content: impl AsRef<[u8]>) -> Result<TestFile, FileError> {
    let dir = tempfile::Builder::new()
        .prefix(TEMP_DIR_PREFIX)
        .tempdir()
        .map_err(FileError::TempDirFailed)?;
    let path = dir.path().join(FILE_NAME);

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&path).map_err(FileError::WriteFailed)?;
    file.write_all(content.as_ref())
        .and_then(|_| file.flush())
        .map_err(FileError::WriteFailed)?;

    // The umask can only narrow the creation mode, but make it explicit.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
            .map_err(FileError::PermissionsFailed)?;
    }

    debug!(
        "Wrote {} bytes to test file {}",
        content.as_ref().len(),
        path.display()
    );
    Ok(TestFile {
        dir: Some(dir),
        path,
    })
}

/// Like [`write_test_file`] but fails the calling test on error.
pub fn test_file(content: impl AsRef<[u8]>) -> TestFile {
    match write_test_file(content) {
        Ok(file) => file,
        Err(e) => panic!("failed to create test file: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_plain_content() {
        let file = test_file("hello world");
        assert_eq!(fs::read_to_string(file.path()).unwrap(), "hello world");
        assert!(file.path().ends_with(FILE_NAME));
    }

    #[test]
    fn writes_empty_content() {
        let file = test_file("");
        assert_eq!(fs::read(file.path()).unwrap().len(), 0);
    }

    #[test]
    fn writes_multiline_content() {
        let content = "line 1\nline 2\r\nline 3\n";
        let file = test_file(content);
        assert_eq!(fs::read_to_string(file.path()).unwrap(), content);
    }

    #[test]
    fn writes_large_content() {
        let content = "abcdefghij".repeat(100_000);
        let file = test_file(&content);
        assert_eq!(fs::metadata(file.path()).unwrap().len(), 1_000_000);
        assert_eq!(fs::read_to_string(file.path()).unwrap(), content);
    }

    #[test]
    fn writes_binary_content() {
        let content: Vec<u8> = (0..=255u8).collect();
        let file = test_file(&content);
        assert_eq!(fs::read(file.path()).unwrap(), content);
    }

    #[test]
    fn directory_uses_prefix() {
        let file = test_file("x");
        let name = file.dir().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(TEMP_DIR_PREFIX), "unexpected dir name {}", name);
    }

    #[cfg(unix)]
    #[test]
    fn file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let file = test_file("secret");
        let mode = fs::metadata(file.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn each_call_gets_its_own_path() {
        let a = test_file("a");
        let b = test_file("b");
        assert_ne!(a.path(), b.path());
        assert_eq!(fs::read_to_string(a.path()).unwrap(), "a");
        assert_eq!(fs::read_to_string(b.path()).unwrap(), "b");
    }

    #[test]
    fn dropping_removes_file_and_directory() {
        let file = test_file("temporary");
        let path = file.path().to_path_buf();
        let dir = file.dir().to_path_buf();
        assert!(path.exists());
        drop(file);
        assert!(!path.exists());
        assert!(!dir.exists());
    }
}
