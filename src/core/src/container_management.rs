//! Container management subsystem.
//!
//! This module starts throwaway service containers for integration tests by
//! driving the `docker` CLI. [`DockerRuntime`] owns the lifecycle and the
//! bookkeeping; each service wrapper starts one container, exposes its
//! connection details and removes it on `close()`.
//!
//! Re-exports:
//! - [`DockerRuntime`]: run/exec/cp/terminate plus stats and registry.
//! - [`ContainerSpec`], [`ContainerHandle`], [`ContainerStats`], [`WaitStrategy`]: core types.
//! - One wrapper per service: SSH, FTP, PostgreSQL, MySQL, MongoDB, LocalStack S3.
//!
//! Example (needs a docker daemon):
//! ```no_run
//! use testutils::container_management::PostgresTestContainer;
//!
//! # async fn demo() -> Result<(), testutils::error_handling::ContainerError> {
//! let mut pg = PostgresTestContainer::start().await?;
//! println!("connect to {}", pg.connection_string());
//! pg.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod docker_runtime;
pub mod ftp;
#[cfg(test)]
pub mod integration_tests;
pub mod localstack;
pub mod mongo;
pub mod mysql;
pub mod postgres;
pub mod remote_files;
pub mod remote_paths;
pub mod running_container;
pub mod ssh;
pub mod types;

pub use docker_runtime::DockerRuntime;
pub use ftp::FtpTestContainer;
pub use localstack::{LocalstackTestContainer, S3Object};
pub use mongo::{MongoTestContainer, MONGO_ENV_VAR};
pub use mysql::MySqlTestContainer;
pub use postgres::PostgresTestContainer;
pub use remote_files::RemoteFs;
pub use remote_paths::{split_path, validate_remote_path};
pub use running_container::RunningContainer;
pub use ssh::SshTestContainer;
pub use types::{
    ContainerHandle, ContainerSpec, ContainerStats, ExecOutput, FileEntry, WaitStrategy,
};
