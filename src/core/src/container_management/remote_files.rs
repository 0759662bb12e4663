use log::{debug, info};
use std::path::Path;

use crate::container_management::remote_paths::{
    remote_parent, resolve_remote_path, validate_local_path,
};
use crate::container_management::running_container::RunningContainer;
use crate::container_management::types::FileEntry;
use crate::error_handling::types::ContainerError;

/// Lists a directory as `size|type|./name` lines. The directory is `$1`.
const LIST_SCRIPT: &str = r#"cd "$1" || exit 1
for f in * .*; do
  case "$f" in .|..) continue ;; esac
  [ -e "$f" ] || [ -L "$f" ] || continue
  stat -c '%s|%F|%n' "./$f"
done"#;

/// File access inside a container, performed as the service user.
///
/// Relative remote paths resolve under `home`. Directory creation, listing
/// and removal run as `user`, so they see the same permissions a client of
/// the service would.
#[derive(Debug, Clone)]
pub struct RemoteFs {
    user: String,
    home: String,
}

impl RemoteFs {
    pub fn new(user: &str, home: &str) -> Self {
        Self {
            user: user.to_string(),
            home: home.to_string(),
        }
    }

    pub fn home(&self) -> &str {
        &self.home
    }

    /// Absolute remote path for `path`.
    pub fn resolve(&self, path: &str) -> Result<String, ContainerError> {
        resolve_remote_path(&self.home, path)
    }

    /// Uploads `local` to `remote`, creating remote parent directories.
    pub async fn save_file(
        &self,
        container: &RunningContainer,
        local: &Path,
        remote: &str,
    ) -> Result<(), ContainerError> {
        validate_local_path(local)?;
        let metadata = tokio::fs::metadata(local).await.map_err(|e| {
            ContainerError::FileOperationFailed(format!(
                "local file {}: {}",
                local.display(),
                e
            ))
        })?;
        if !metadata.is_file() {
            return Err(ContainerError::FileOperationFailed(format!(
                "{} is not a regular file",
                local.display()
            )));
        }

        let target = self.resolve(remote)?;
        if let Some(parent) = remote_parent(&target) {
            container
                .exec_as(&self.user, &["mkdir", "-p", &parent])
                .await?;
        }

        let id = &container.handle().id;
        container.runtime().copy_to(id, local, &target).await?;
        container.exec(&["chown", &self.user, &target]).await?;

        info!(
            "[{}] Saved {} to {} ({} bytes)",
            container.handle().name,
            local.display(),
            target,
            metadata.len()
        );
        Ok(())
    }

    /// Downloads `remote` to `local`, creating local parent directories.
    pub async fn get_file(
        &self,
        container: &RunningContainer,
        remote: &str,
        local: &Path,
    ) -> Result<(), ContainerError> {
        validate_local_path(local)?;
        let source = self.resolve(remote)?;

        if container
            .exec_as(&self.user, &["test", "-f", &source])
            .await
            .is_err()
        {
            return Err(ContainerError::FileOperationFailed(format!(
                "remote file {} does not exist or is not a regular file",
                source
            )));
        }

        if let Some(parent) = local.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_local_dir(parent).await?;
        }

        let id = &container.handle().id;
        container.runtime().copy_from(id, &source, local).await?;
        restrict_permissions(local).await?;

        info!(
            "[{}] Fetched {} to {}",
            container.handle().name,
            source,
            local.display()
        );
        Ok(())
    }

    /// Entries of a remote directory. An empty path or `.` lists `home`.
    pub async fn list_files(
        &self,
        container: &RunningContainer,
        path: &str,
    ) -> Result<Vec<FileEntry>, ContainerError> {
        let dir = self.resolve(path)?;
        let output = container
            .exec_as(&self.user, &["sh", "-c", LIST_SCRIPT, "sh", &dir])
            .await?;
        let entries = parse_stat_listing(&output.stdout_string())?;
        debug!(
            "[{}] Listed {} entries in {}",
            container.handle().name,
            entries.len(),
            dir
        );
        Ok(entries)
    }

    pub async fn delete_file(
        &self,
        container: &RunningContainer,
        remote: &str,
    ) -> Result<(), ContainerError> {
        let target = self.resolve(remote)?;
        container.exec_as(&self.user, &["rm", &target]).await?;
        debug!("[{}] Deleted {}", container.handle().name, target);
        Ok(())
    }
}

/// Creates `dir` and its parents with mode `0o750`.
pub(crate) async fn create_local_dir(dir: &Path) -> Result<(), ContainerError> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o750);
    builder.create(dir).await.map_err(|e| {
        ContainerError::FileOperationFailed(format!(
            "failed to create local directory {}: {}",
            dir.display(),
            e
        ))
    })
}

/// Sets owner-only read/write on a downloaded file.
pub(crate) async fn restrict_permissions(path: &Path) -> Result<(), ContainerError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(|e| {
                ContainerError::FileOperationFailed(format!(
                    "failed to set permissions on {}: {}",
                    path.display(),
                    e
                ))
            })?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Parses `size|type|./name` lines, sorted by name.
pub(crate) fn parse_stat_listing(output: &str) -> Result<Vec<FileEntry>, ContainerError> {
    let mut entries = Vec::new();
    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let mut fields = line.splitn(3, '|');
        let (size, kind, name) = match (fields.next(), fields.next(), fields.next()) {
            (Some(size), Some(kind), Some(name)) => (size, kind, name),
            _ => {
                return Err(ContainerError::ParseFailed(format!(
                    "unexpected listing line {:?}",
                    line
                )))
            }
        };
        let size = size.trim().parse::<u64>().map_err(|_| {
            ContainerError::ParseFailed(format!("invalid size in listing line {:?}", line))
        })?;
        entries.push(FileEntry {
            name: name.strip_prefix("./").unwrap_or(name).to_string(),
            size,
            is_dir: kind == "directory",
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}
