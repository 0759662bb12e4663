use log::debug;
use std::net::{Ipv4Addr, TcpListener};
use std::path::Path;

use crate::container_management::docker_runtime::DockerRuntime;
use crate::container_management::remote_files::RemoteFs;
use crate::container_management::running_container::RunningContainer;
use crate::container_management::types::{ContainerHandle, ContainerSpec, FileEntry, WaitStrategy};
use crate::error_handling::types::ContainerError;

pub const FTP_IMAGE: &str = "delfer/alpine-ftp-server:latest";
pub const FTP_PORT: u16 = 21;
pub const FTP_USER: &str = "ftpuser";
pub const FTP_PASSWORD: &str = "ftppass";

/// vsftpd server with a single `ftpuser` account.
///
/// Passive mode uses one data port, published on the same number on the
/// host so the address the server advertises is reachable.
#[derive(Debug)]
pub struct FtpTestContainer {
    container: RunningContainer,
    files: RemoteFs,
    passive_port: u16,
}

impl FtpTestContainer {
    pub async fn start() -> Result<Self, ContainerError> {
        let runtime = DockerRuntime::from_env().await?;
        Self::start_on(&runtime).await
    }

    pub async fn start_on(runtime: &DockerRuntime) -> Result<Self, ContainerError> {
        let passive_port = allocate_ephemeral_port()?;
        debug!("Allocated passive FTP port {}", passive_port);

        let spec = ftp_spec(&runtime.settings().container_host, passive_port);
        let container = RunningContainer::start(runtime, &spec).await?;
        Ok(Self {
            container,
            files: RemoteFs::new(FTP_USER, &ftp_home(FTP_USER)),
            passive_port,
        })
    }

    pub fn ip(&self) -> &str {
        self.container.host()
    }

    pub fn port(&self) -> u16 {
        self.container.handle().host_port(FTP_PORT).unwrap_or_default()
    }

    pub fn passive_port(&self) -> u16 {
        self.passive_port
    }

    pub fn user(&self) -> &str {
        FTP_USER
    }

    pub fn password(&self) -> &str {
        FTP_PASSWORD
    }

    /// `ip:port` of the control connection.
    pub fn connection_string(&self) -> String {
        format!("{}:{}", self.ip(), self.port())
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

pub(crate) fn ftp_home(user: &str) -> String {
    format!("/ftp/{}", user)
}

pub(crate) fn ftp_spec(host: &str, passive_port: u16) -> ContainerSpec {
    let passive = passive_port.to_string();
    ContainerSpec::new("ftp", FTP_IMAGE)
        .expose(FTP_PORT)
        .publish_fixed(passive_port)
        .env(
            "USERS",
            &format!("{}|{}|{}", FTP_USER, FTP_PASSWORD, ftp_home(FTP_USER)),
        )
        .env("ADDRESS", host)
        .env("MIN_PORT", &passive)
        .env("MAX_PORT", &passive)
        .wait_for(WaitStrategy::Port(FTP_PORT))
}

/// Picks a free TCP port on the loopback interface.
fn allocate_ephemeral_port() -> Result<u16, ContainerError> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    let port = listener.local_addr()?.port();
    // Close the socket to free the port for docker to bind
    drop(listener);
    Ok(port)
}
