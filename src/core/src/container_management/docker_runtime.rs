use chrono::Utc;
use log::{debug, error, info, trace, warn};
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::Instant;
use uuid::Uuid;

use crate::configuration::Settings;
use crate::container_management::types::{
    ContainerHandle, ContainerSpec, ContainerStats, ExecOutput, WaitStrategy,
};
use crate::error_handling::types::ContainerError;

#[derive(Debug, Default)]
struct Registry {
    active: HashMap<String, ContainerHandle>,
    stats: ContainerStats,
}

/// Drives the `docker` CLI and keeps track of the containers it started.
///
/// Clones share the registry and counters, so a single runtime can be handed
/// to several service containers.
///
/// Design notes:
/// - Containers run detached with `--rm`, so removing one also removes its
///   anonymous volumes.
/// - Exposed ports are published on the configured host with an ephemeral
///   host port; the mapping is read back with `docker port`.
/// - Readiness is polled with a progressive backoff until the configured
///   startup timeout.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    settings: Settings,
    registry: Arc<Mutex<Registry>>,
}

impl DockerRuntime {
    /// Creates a runtime for `settings`.
    ///
    /// Returns an error if the settings are invalid or the docker daemon is
    /// not reachable through the configured binary.
    pub async fn new(settings: Settings) -> Result<Self, ContainerError> {
        info!("Initializing DockerRuntime with {}", settings.docker_bin);
        settings.validate()?;

        if !Self::is_runtime_available(&settings.docker_bin).await {
            error!(
                "Container runtime {} is not available on this system",
                settings.docker_bin
            );
            return Err(ContainerError::RuntimeNotAvailable);
        }

        Ok(Self {
            settings,
            registry: Arc::default(),
        })
    }

    /// Runtime built from [`Settings::from_env`].
    pub async fn from_env() -> Result<Self, ContainerError> {
        Self::new(Settings::from_env()?).await
    }

    /// Checks whether `docker_bin` can talk to a daemon.
    pub async fn is_runtime_available(docker_bin: &str) -> bool {
        let available = Command::new(docker_bin)
            .args(["version", "--format", "{{.Server.Version}}"])
            .stdin(Stdio::null())
            .output()
            .await
            .map(|output| output.status.success())
            .unwrap_or(false);

        debug!("{} availability check: {}", docker_bin, available);
        available
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Starts a container for `spec` and waits until it is ready.
    ///
    /// Side effects:
    /// - Runs `docker run -d --rm` with a unique `testutils-<service>-<uuid>` name.
    /// - Resolves every exposed port to its host port.
    /// - Evaluates the wait strategies in order under a shared deadline.
    /// - Updates internal stats and registry.
    ///
    /// On any failure after the container was created it is removed again.
    pub async fn run(&self, spec: &ContainerSpec) -> Result<ContainerHandle, ContainerError> {
        let name = format!("testutils-{}-{}", spec.service, Uuid::new_v4());
        info!("[{}] Starting container from image {}", name, spec.image);

        let args = run_args(spec, &self.settings, &name);
        debug!("[{}] docker {}", name, args.join(" "));

        let output = match self.docker(&args).await {
            Ok(output) => output,
            Err(e) => {
                error!("[{}] Failed to start container: {}", name, e);
                self.lock().stats.failed_count += 1;
                return Err(ContainerError::StartFailed(e.to_string()));
            }
        };

        let id = output.stdout_string().trim().to_string();
        if id.is_empty() {
            self.lock().stats.failed_count += 1;
            return Err(ContainerError::StartFailed(format!(
                "[{}] docker run printed no container id",
                name
            )));
        }

        let mut handle = ContainerHandle {
            id,
            name,
            service: spec.service.clone(),
            image: spec.image.clone(),
            host: self.settings.container_host.clone(),
            ports: HashMap::new(),
            created_at: Utc::now(),
        };

        if let Err(e) = self.prepare(&mut handle, spec).await {
            error!("[{}] Container not ready: {}", handle.name, e);
            self.lock().stats.failed_count += 1;
            if let Err(rm) = self.docker(&rm_args(&handle.id)).await {
                warn!("[{}] Failed to remove container: {}", handle.name, rm);
            }
            return Err(e);
        }

        {
            let mut registry = self.lock();
            registry.stats.total_created += 1;
            registry.stats.active_count += 1;
            registry.active.insert(handle.id.clone(), handle.clone());
        }

        info!(
            "[{}] Container {} ready (ports: {:?})",
            handle.name,
            handle.short_id(),
            handle.ports
        );
        Ok(handle)
    }

    async fn prepare(
        &self,
        handle: &mut ContainerHandle,
        spec: &ContainerSpec,
    ) -> Result<(), ContainerError> {
        for port in &spec.exposed_ports {
            let host_port = self.mapped_port(&handle.id, *port).await?;
            debug!("[{}] Port {} mapped to {}", handle.name, port, host_port);
            handle.ports.insert(*port, host_port);
        }
        for port in &spec.fixed_ports {
            handle.ports.insert(*port, *port);
        }

        let deadline = Instant::now() + self.settings.startup_timeout();
        for strategy in &spec.wait {
            match strategy {
                WaitStrategy::Log {
                    message,
                    occurrences,
                } => {
                    self.wait_for_log(handle, message, *occurrences, deadline)
                        .await?
                }
                WaitStrategy::Port(port) => {
                    let host_port = handle.host_port(*port).ok_or_else(|| {
                        ContainerError::PortNotMapped(format!(
                            "[{}] port {} is not exposed",
                            handle.name, port
                        ))
                    })?;
                    self.wait_for_port(handle, host_port, deadline).await?
                }
            }
        }
        Ok(())
    }

    /// Host port docker published for `container_port`.
    pub async fn mapped_port(
        &self,
        container_id: &str,
        container_port: u16,
    ) -> Result<u16, ContainerError> {
        let output = self
            .docker(&[
                "port".to_string(),
                container_id.to_string(),
                format!("{}/tcp", container_port),
            ])
            .await?;
        parse_port_output(&output.stdout_string()).ok_or_else(|| {
            ContainerError::PortNotMapped(format!(
                "no host port for {}/tcp in {:?}",
                container_port,
                output.stdout_string()
            ))
        })
    }

    /// Polls the container logs until `message` was printed `occurrences` times.
    pub async fn wait_for_log(
        &self,
        handle: &ContainerHandle,
        message: &str,
        occurrences: usize,
        deadline: Instant,
    ) -> Result<(), ContainerError> {
        let mut attempt: u32 = 0;
        loop {
            let logs = self.logs(&handle.id).await?;
            let seen = logs.matches(message).count();
            if seen >= occurrences {
                debug!(
                    "[{}] Log line {:?} seen {} time(s)",
                    handle.name, message, seen
                );
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ContainerError::ReadinessTimeout(format!(
                    "[{}] log line {:?} seen {}/{} times",
                    handle.name, message, seen, occurrences
                )));
            }

            attempt += 1;
            let wait = backoff_delay(attempt).min(deadline - now);
            trace!(
                "[{}] Waiting for log line {:?} ({}/{}), retrying in {}ms",
                handle.name,
                message,
                seen,
                occurrences,
                wait.as_millis()
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Retries a TCP connection to `host_port` until it succeeds.
    pub async fn wait_for_port(
        &self,
        handle: &ContainerHandle,
        host_port: u16,
        deadline: Instant,
    ) -> Result<(), ContainerError> {
        let target_addr = format!("{}:{}", handle.host, host_port);
        let mut attempt: u32 = 0;
        loop {
            match TcpStream::connect(&target_addr).await {
                Ok(_) => {
                    debug!("[{}] {} accepts connections", handle.name, target_addr);
                    return Ok(());
                }
                Err(e) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(ContainerError::ReadinessTimeout(format!(
                            "[{}] {} not accepting connections: {}",
                            handle.name, target_addr, e
                        )));
                    }
                    attempt += 1;
                    let wait = backoff_delay(attempt).min(deadline - now);
                    debug!(
                        "[{}] Connection attempt {} to {} failed: {} - retrying in {}ms",
                        handle.name,
                        attempt,
                        target_addr,
                        e,
                        wait.as_millis()
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Combined stdout and stderr of the container so far.
    pub async fn logs(&self, container_id: &str) -> Result<String, ContainerError> {
        let output = self
            .docker(&["logs".to_string(), container_id.to_string()])
            .await?;
        let mut logs = output.stdout_string();
        logs.push_str(&output.stderr_string());
        Ok(logs)
    }

    /// Runs `args` inside the container as its default user.
    pub async fn exec(
        &self,
        container_id: &str,
        args: &[&str],
    ) -> Result<ExecOutput, ContainerError> {
        self.exec_as(container_id, None, args).await
    }

    /// Runs `args` inside the container, optionally as `user`.
    pub async fn exec_as(
        &self,
        container_id: &str,
        user: Option<&str>,
        args: &[&str],
    ) -> Result<ExecOutput, ContainerError> {
        let mut cmd = vec!["exec".to_string()];
        if let Some(user) = user {
            cmd.push("-u".to_string());
            cmd.push(user.to_string());
        }
        cmd.push(container_id.to_string());
        cmd.extend(args.iter().map(|a| a.to_string()));
        self.docker(&cmd).await
    }

    /// `docker cp <local> <id>:<remote>`.
    pub async fn copy_to(
        &self,
        container_id: &str,
        local: &Path,
        remote: &str,
    ) -> Result<(), ContainerError> {
        self.docker(&[
            "cp".to_string(),
            local.to_string_lossy().into_owned(),
            format!("{}:{}", container_id, remote),
        ])
        .await?;
        trace!("Copied {} to {}:{}", local.display(), container_id, remote);
        Ok(())
    }

    /// `docker cp <id>:<remote> <local>`.
    pub async fn copy_from(
        &self,
        container_id: &str,
        remote: &str,
        local: &Path,
    ) -> Result<(), ContainerError> {
        self.docker(&[
            "cp".to_string(),
            format!("{}:{}", container_id, remote),
            local.to_string_lossy().into_owned(),
        ])
        .await?;
        trace!("Copied {}:{} to {}", container_id, remote, local.display());
        Ok(())
    }

    /// Force-removes a container and drops it from the registry.
    pub async fn terminate(&self, container_id: &str) -> Result<(), ContainerError> {
        let name = self
            .get_container(container_id)
            .map(|h| h.name)
            .unwrap_or_else(|| container_id.to_string());
        info!("[{}] Terminating container", name);

        if let Err(e) = self.docker(&rm_args(container_id)).await {
            error!("[{}] Failed to remove container: {}", name, e);
            self.lock().stats.failed_count += 1;
            return Err(e);
        }

        self.unregister(container_id);
        info!("[{}] Container terminated", name);
        Ok(())
    }

    /// Terminates all tracked containers, continuing on errors and counting failures.
    pub async fn terminate_all(&self) -> Result<(), ContainerError> {
        let ids = self.list_active_containers();
        info!("Terminating {} active containers", ids.len());

        let mut failures = 0;
        for id in ids {
            if let Err(e) = self.terminate(&id).await {
                error!("Failed to terminate container {}: {}", id, e);
                failures += 1;
            }
        }

        if failures > 0 {
            return Err(ContainerError::CommandFailed(format!(
                "{} container(s) could not be removed",
                failures
            )));
        }
        Ok(())
    }

    /// Snapshot of the counters. `active_count` is recomputed from the registry.
    pub fn stats(&self) -> ContainerStats {
        let registry = self.lock();
        let mut stats = registry.stats.clone();
        stats.active_count = registry.active.len();
        debug!(
            "Container stats: active={}, total={}, failed={}",
            stats.active_count, stats.total_created, stats.failed_count
        );
        stats
    }

    pub fn get_container(&self, container_id: &str) -> Option<ContainerHandle> {
        self.lock().active.get(container_id).cloned()
    }

    pub fn list_active_containers(&self) -> Vec<String> {
        self.lock().active.keys().cloned().collect()
    }

    /// Removes a container from the registry without touching docker.
    pub(crate) fn unregister(&self, container_id: &str) {
        let mut registry = self.lock();
        if registry.active.remove(container_id).is_some() {
            registry.stats.active_count = registry.stats.active_count.saturating_sub(1);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn docker(&self, args: &[String]) -> Result<ExecOutput, ContainerError> {
        let output = Command::new(&self.settings.docker_bin)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ContainerError::RuntimeNotAvailable
                } else {
                    ContainerError::IoError(e)
                }
            })?;

        let result = ExecOutput {
            stdout: output.stdout,
            stderr: output.stderr,
        };
        if !output.status.success() {
            return Err(ContainerError::CommandFailed(format!(
                "{} {} exited with {}: {}",
                self.settings.docker_bin,
                args.first().map(String::as_str).unwrap_or(""),
                output.status,
                result.stderr_string().trim()
            )));
        }
        Ok(result)
    }
}

impl Drop for DockerRuntime {
    fn drop(&mut self) {
        // Only the last clone reports.
        if Arc::strong_count(&self.registry) > 1 {
            return;
        }
        let registry = self.lock();
        if !registry.active.is_empty() {
            warn!(
                "DockerRuntime dropped with {} active containers - this may indicate a resource leak",
                registry.active.len()
            );
            let remaining: Vec<_> = registry.active.values().map(|h| &h.name).collect();
            warn!("Remaining containers: {:?}", remaining);
        } else {
            debug!("DockerRuntime dropped cleanly with no active containers");
        }
    }
}

/// Arguments for `docker run` (without the binary itself).
pub(crate) fn run_args(spec: &ContainerSpec, settings: &Settings, name: &str) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "run".into(),
        "-d".into(),
        "--rm".into(),
        "--name".into(),
        name.into(),
        format!("--pull={}", settings.pull_policy.as_arg()),
        "--label".into(),
        format!("testutils.service={}", spec.service),
    ];
    for port in &spec.exposed_ports {
        args.push("-p".into());
        args.push(format!("{}::{}", settings.container_host, port));
    }
    for port in &spec.fixed_ports {
        args.push("-p".into());
        args.push(format!("{}:{}:{}", settings.container_host, port, port));
    }
    for (key, value) in &spec.env {
        args.push("-e".into());
        args.push(format!("{}={}", key, value));
    }
    args.extend(spec.run_args.iter().cloned());
    args.push(spec.image.clone());
    args.extend(spec.command.iter().cloned());
    args
}

pub(crate) fn rm_args(container_id: &str) -> Vec<String> {
    vec![
        "rm".to_string(),
        "-f".to_string(),
        "-v".to_string(),
        container_id.to_string(),
    ]
}

/// First host port in `docker port` output such as `127.0.0.1:49153` or `[::]:49153`.
pub(crate) fn parse_port_output(output: &str) -> Option<u16> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .find_map(|line| line.rsplit_once(':').and_then(|(_, port)| port.parse().ok()))
}

/// Progressive backoff, capped at 2s.
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    let millis = 200 + u64::from(attempt) * 200;
    Duration::from_millis(millis.min(2000))
}
