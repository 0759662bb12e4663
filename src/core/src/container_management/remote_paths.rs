//! Path checks shared by the container file operations.
//!
//! Remote paths are always slash separated, whatever the host OS. Relative
//! remote paths resolve under the service user's home directory.

use std::path::{Component, Path};

use crate::error_handling::types::ContainerError;

/// Splits a slash separated path into its non-empty components.
///
/// `"/foo//bar/"` gives `["foo", "bar"]`; `""` and `"/"` give nothing.
pub fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Rejects remote paths with a `..` component or an embedded NUL.
pub fn validate_remote_path(path: &str) -> Result<(), ContainerError> {
    for part in split_path(path) {
        if part == ".." || part.contains('\0') {
            return Err(ContainerError::InvalidPath(format!(
                "invalid path component {:?} in {:?}",
                part, path
            )));
        }
    }
    Ok(())
}

/// Absolute form of `path`, with relative paths placed under `home`.
///
/// An empty path or `.` is `home` itself. `.` components are dropped.
pub fn resolve_remote_path(home: &str, path: &str) -> Result<String, ContainerError> {
    validate_remote_path(path)?;

    let mut parts: Vec<String> = if path.starts_with('/') {
        Vec::new()
    } else {
        split_path(home)
    };
    parts.extend(split_path(path).into_iter().filter(|part| part != "."));

    Ok(format!("/{}", parts.join("/")))
}

/// Parent directory of an absolute remote path, `None` when it is `/`.
pub fn remote_parent(path: &str) -> Option<String> {
    let mut parts = split_path(path);
    parts.pop()?;
    if parts.is_empty() {
        None
    } else {
        Some(format!("/{}", parts.join("/")))
    }
}

/// Rejects local paths that climb out of their directory with `..`.
pub fn validate_local_path(path: &Path) -> Result<(), ContainerError> {
    if path.as_os_str().is_empty() {
        return Err(ContainerError::InvalidPath("empty local path".to_string()));
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(ContainerError::InvalidPath(format!(
            "local path {} attempts to escape its directory",
            path.display()
        )));
    }
    Ok(())
}
