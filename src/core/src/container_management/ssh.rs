use std::path::Path;

use crate::container_management::docker_runtime::DockerRuntime;
use crate::container_management::remote_files::RemoteFs;
use crate::container_management::running_container::RunningContainer;
use crate::container_management::types::{ContainerHandle, ContainerSpec, FileEntry, WaitStrategy};
use crate::error_handling::types::ContainerError;

pub const SSH_IMAGE: &str = "lscr.io/linuxserver/openssh-server:latest";
pub const SSH_PORT: u16 = 2222;
pub const SSH_DEFAULT_USER: &str = "test";
pub const SSH_DEFAULT_PASSWORD: &str = "test";
const SSH_HOME: &str = "/config";

/// OpenSSH server with password login for `user`.
#[derive(Debug)]
pub struct SshTestContainer {
    container: RunningContainer,
    files: RemoteFs,
    user: String,
    password: String,
}

impl SshTestContainer {
    pub async fn start() -> Result<Self, ContainerError> {
        Self::start_with_user(SSH_DEFAULT_USER).await
    }

    pub async fn start_with_user(user: &str) -> Result<Self, ContainerError> {
        let runtime = DockerRuntime::from_env().await?;
        Self::start_on(&runtime, user).await
    }

    pub async fn start_on(runtime: &DockerRuntime, user: &str) -> Result<Self, ContainerError> {
        let container = RunningContainer::start(runtime, &ssh_spec(user)).await?;
        Ok(Self {
            container,
            files: RemoteFs::new(user, SSH_HOME),
            user: user.to_string(),
            password: SSH_DEFAULT_PASSWORD.to_string(),
        })
    }

    /// `host:port` of the SSH server.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host(), self.port())
    }

    pub fn host(&self) -> &str {
        self.container.host()
    }

    pub fn port(&self) -> u16 {
        self.container.handle().host_port(SSH_PORT).unwrap_or_default()
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn home(&self) -> &str {
        self.files.home()
    }

    pub fn handle(&self) -> &ContainerHandle {
        self.container.handle()
    }

    pub async fn save_file(&self, local: &Path, remote: &str) -> Result<(), ContainerError> {
        self.files.save_file(&self.container, local, remote).await
    }

    pub async fn get_file(&self, remote: &str, local: &Path) -> Result<(), ContainerError> {
        self.files.get_file(&self.container, remote, local).await
    }

    pub async fn list_files(&self, path: &str) -> Result<Vec<FileEntry>, ContainerError> {
        self.files.list_files(&self.container, path).await
    }

    pub async fn delete_file(&self, remote: &str) -> Result<(), ContainerError> {
        self.files.delete_file(&self.container, remote).await
    }

    pub async fn close(&mut self) -> Result<(), ContainerError> {
        self.container.close().await
    }
}

pub(crate) fn ssh_spec(user: &str) -> ContainerSpec {
    ContainerSpec::new("ssh", SSH_IMAGE)
        .expose(SSH_PORT)
        .env("USER_NAME", user)
        .env("USER_PASSWORD", SSH_DEFAULT_PASSWORD)
        .env("PASSWORD_ACCESS", "true")
        .env("SUDO_ACCESS", "true")
        .env("TZ", "Etc/UTC")
        .wait_for(WaitStrategy::log("done."))
}
