use log::{debug, warn};
use uuid::Uuid;

use crate::container_management::docker_runtime::DockerRuntime;
use crate::container_management::running_container::RunningContainer;
use crate::container_management::types::{ContainerHandle, ContainerSpec, WaitStrategy};
use crate::error_handling::types::ContainerError;

pub const MONGO_PORT: u16 = 27017;
/// Set to the container URI while a [`MongoTestContainer`] is open.
pub const MONGO_ENV_VAR: &str = "MONGO_TEST";

/// MongoDB server of a given major version.
///
/// Starting it exports its URI in `MONGO_TEST`; closing it puts back the
/// previous value (or unsets the variable).
#[derive(Debug)]
pub struct MongoTestContainer {
    container: RunningContainer,
    uri: String,
    previous_env: Option<String>,
    env_restored: bool,
}

impl MongoTestContainer {
    pub async fn start(version: u32) -> Result<Self, ContainerError> {
        let runtime = DockerRuntime::from_env().await?;
        Self::start_on(&runtime, version).await
    }

    pub async fn start_on(runtime: &DockerRuntime, version: u32) -> Result<Self, ContainerError> {
        let previous_env = std::env::var(MONGO_ENV_VAR).ok();
        let container = RunningContainer::start(runtime, &mongo_spec(version)).await?;

        let port = container.host_port(MONGO_PORT)?;
        let uri = mongo_uri(container.host(), port);
        std::env::set_var(MONGO_ENV_VAR, &uri);
        debug!(
            "[{}] {} set to {}",
            container.handle().name,
            MONGO_ENV_VAR,
            uri
        );

        Ok(Self {
            container,
            uri,
            previous_env,
            env_restored: false,
        })
    }

    /// `mongodb://host:port`
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// A collection name no other call returns, for test isolation.
    pub fn collection_name(&self) -> String {
        format!("test_coll_{}", Uuid::new_v4().simple())
    }

    pub fn handle(&self) -> &ContainerHandle {
        self.container.handle()
    }

    /// Restores `MONGO_TEST`, then removes the container.
    pub async fn close(&mut self) -> Result<(), ContainerError> {
        self.restore_env();
        self.container.close().await
    }

    fn restore_env(&mut self) {
        if self.env_restored {
            return;
        }
        match &self.previous_env {
            Some(value) => std::env::set_var(MONGO_ENV_VAR, value),
            None => std::env::remove_var(MONGO_ENV_VAR),
        }
        self.env_restored = true;
    }
}

impl Drop for MongoTestContainer {
    fn drop(&mut self) {
        if !self.env_restored {
            warn!(
                "[{}] Dropped without close, restoring {}",
                self.container.handle().name,
                MONGO_ENV_VAR
            );
            self.restore_env();
        }
    }
}

pub(crate) fn mongo_uri(host: &str, port: u16) -> String {
    format!("mongodb://{}:{}", host, port)
}

pub(crate) fn mongo_spec(version: u32) -> ContainerSpec {
    ContainerSpec::new("mongo", &format!("mongo:{}", version))
        .expose(MONGO_PORT)
        .wait_for(WaitStrategy::log("Waiting for connections"))
}
