//! Core types used by the container management subsystem.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// Aggregate counters describing the current and historical container state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerStats {
    /// Number of containers currently tracked as running.
    pub active_count: usize,
    /// Total number of containers successfully started since the runtime was created.
    pub total_created: u64,
    /// Number of operations that failed (start, readiness or terminate failures).
    pub failed_count: u64,
}

/// Condition a freshly started container must meet before it is handed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitStrategy {
    /// `message` appears at least `occurrences` times in the container logs.
    Log { message: String, occurrences: usize },
    /// The host port mapped to this container port accepts TCP connections.
    Port(u16),
}

impl WaitStrategy {
    pub fn log(message: &str) -> Self {
        WaitStrategy::Log {
            message: message.to_string(),
            occurrences: 1,
        }
    }

    pub fn log_times(message: &str, occurrences: usize) -> Self {
        WaitStrategy::Log {
            message: message.to_string(),
            occurrences: occurrences.max(1),
        }
    }
}

/// Everything needed to `docker run` a service container.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    /// Logical service name, used in the container name (e.g. "postgres").
    pub service: String,
    pub image: String,
    /// Container ports published on an ephemeral host port.
    pub exposed_ports: Vec<u16>,
    /// Ports published on the same port number on the host.
    pub fixed_ports: Vec<u16>,
    pub env: Vec<(String, String)>,
    /// Extra `docker run` arguments placed before the image.
    pub run_args: Vec<String>,
    /// Command and arguments placed after the image.
    pub command: Vec<String>,
    pub wait: Vec<WaitStrategy>,
}

impl ContainerSpec {
    pub fn new(service: &str, image: &str) -> Self {
        Self {
            service: service.to_string(),
            image: image.to_string(),
            ..Default::default()
        }
    }

    pub fn expose(mut self, port: u16) -> Self {
        self.exposed_ports.push(port);
        self
    }

    pub fn publish_fixed(mut self, port: u16) -> Self {
        self.fixed_ports.push(port);
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn run_arg(mut self, arg: &str) -> Self {
        self.run_args.push(arg.to_string());
        self
    }

    pub fn command(mut self, args: &[&str]) -> Self {
        self.command = args.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn wait_for(mut self, strategy: WaitStrategy) -> Self {
        self.wait.push(strategy);
        self
    }
}

/// Handle describing a specific running container.
#[derive(Debug, Clone)]
pub struct ContainerHandle {
    /// Identifier printed by `docker run -d`.
    pub id: String,
    /// Unique container name (e.g. `testutils-ssh-<uuid>`).
    pub name: String,
    pub service: String,
    pub image: String,
    /// Host the mapped ports are reachable on.
    pub host: String,
    /// Container port to host port.
    pub ports: HashMap<u16, u16>,
    pub created_at: DateTime<Utc>,
}

impl ContainerHandle {
    /// Host port mapped to `container_port`, if it was published.
    pub fn host_port(&self, container_port: u16) -> Option<u16> {
        self.ports.get(&container_port).copied()
    }

    /// `host:port` for `container_port`, if it was published.
    pub fn address(&self, container_port: u16) -> Option<String> {
        self.host_port(container_port)
            .map(|port| format!("{}:{}", self.host, port))
    }

    /// Short form of the id, as `docker ps` prints it.
    pub fn short_id(&self) -> &str {
        let end = self.id.len().min(12);
        &self.id[..end]
    }
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
}

/// Output of a command run inside a container.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExecOutput {
    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}
