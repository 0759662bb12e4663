use log::{debug, info, warn};
use std::process::Stdio;

use crate::container_management::docker_runtime::{rm_args, DockerRuntime};
use crate::container_management::types::{ContainerHandle, ContainerSpec, ExecOutput};
use crate::error_handling::types::ContainerError;

/// A started container owned by one service wrapper.
///
/// [`close`](Self::close) removes it. A value dropped without `close` is
/// removed synchronously, with a warning, so a failing test does not leak
/// containers.
#[derive(Debug)]
pub struct RunningContainer {
    runtime: DockerRuntime,
    handle: ContainerHandle,
    closed: bool,
}

impl RunningContainer {
    pub async fn start(
        runtime: &DockerRuntime,
        spec: &ContainerSpec,
    ) -> Result<Self, ContainerError> {
        let handle = runtime.run(spec).await?;
        Ok(Self {
            runtime: runtime.clone(),
            handle,
            closed: false,
        })
    }

    pub fn handle(&self) -> &ContainerHandle {
        &self.handle
    }

    pub fn runtime(&self) -> &DockerRuntime {
        &self.runtime
    }

    pub fn host(&self) -> &str {
        &self.handle.host
    }

    pub fn host_port(&self, container_port: u16) -> Result<u16, ContainerError> {
        self.handle.host_port(container_port).ok_or_else(|| {
            ContainerError::PortNotMapped(format!(
                "[{}] port {} is not published",
                self.handle.name, container_port
            ))
        })
    }

    pub async fn exec(&self, args: &[&str]) -> Result<ExecOutput, ContainerError> {
        self.runtime.exec(&self.handle.id, args).await
    }

    pub async fn exec_as(&self, user: &str, args: &[&str]) -> Result<ExecOutput, ContainerError> {
        self.runtime.exec_as(&self.handle.id, Some(user), args).await
    }

    pub async fn logs(&self) -> Result<String, ContainerError> {
        self.runtime.logs(&self.handle.id).await
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Removes the container. Calling it again is a no-op.
    pub async fn close(&mut self) -> Result<(), ContainerError> {
        if self.closed {
            return Ok(());
        }
        self.runtime.terminate(&self.handle.id).await?;
        self.closed = true;
        Ok(())
    }
}

impl Drop for RunningContainer {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        warn!(
            "[{}] Dropped without close, removing container",
            self.handle.name
        );
        let status = std::process::Command::new(&self.runtime.settings().docker_bin)
            .args(rm_args(&self.handle.id))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(s) if s.success() => {
                info!("[{}] Container removed on drop", self.handle.name);
                self.runtime.unregister(&self.handle.id);
            }
            Ok(s) => warn!("[{}] docker rm exited with {}", self.handle.name, s),
            Err(e) => warn!("[{}] Failed to run docker rm: {}", self.handle.name, e),
        }
        debug!("[{}] Drop finished", self.handle.name);
    }
}
