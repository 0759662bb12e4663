use log::{debug, info, warn};
use serde::Deserialize;
use std::path::Path;
use uuid::Uuid;

use crate::container_management::docker_runtime::DockerRuntime;
use crate::container_management::remote_files::{create_local_dir, restrict_permissions};
use crate::container_management::remote_paths::validate_local_path;
use crate::container_management::running_container::RunningContainer;
use crate::container_management::types::{ContainerHandle, ContainerSpec, WaitStrategy};
use crate::error_handling::types::ContainerError;

pub const LOCALSTACK_IMAGE: &str = "localstack/localstack:3";
pub const LOCALSTACK_PORT: u16 = 4566;
pub const LOCALSTACK_REGION: &str = "us-east-1";
pub const LOCALSTACK_ACCESS_KEY: &str = "test";
pub const LOCALSTACK_SECRET_KEY: &str = "test";

/// An object as listed by `list-objects-v2`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct S3Object {
    pub key: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListObjectsOutput {
    #[serde(default)]
    contents: Vec<S3Object>,
}

/// LocalStack with S3 enabled.
///
/// Bucket operations run `awslocal` inside the container, so no AWS SDK is
/// needed on the host. Point an S3 client at [`endpoint`](Self::endpoint)
/// with the static credentials to use the same buckets from the test.
#[derive(Debug)]
pub struct LocalstackTestContainer {
    container: RunningContainer,
    endpoint: String,
}

impl LocalstackTestContainer {
    pub async fn start() -> Result<Self, ContainerError> {
        let runtime = DockerRuntime::from_env().await?;
        Self::start_on(&runtime).await
    }

    pub async fn start_on(runtime: &DockerRuntime) -> Result<Self, ContainerError> {
        let container = RunningContainer::start(runtime, &localstack_spec()).await?;
        let port = container.host_port(LOCALSTACK_PORT)?;
        let endpoint = format!("http://{}:{}", container.host(), port);
        Ok(Self {
            container,
            endpoint,
        })
    }

    /// `http://host:port`
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn region(&self) -> &str {
        LOCALSTACK_REGION
    }

    pub fn access_key(&self) -> &str {
        LOCALSTACK_ACCESS_KEY
    }

    pub fn secret_key(&self) -> &str {
        LOCALSTACK_SECRET_KEY
    }

    pub fn handle(&self) -> &ContainerHandle {
        self.container.handle()
    }

    /// Creates a bucket with a unique name and returns the name.
    pub async fn make_bucket(&self) -> Result<String, ContainerError> {
        let bucket = unique_bucket_name();
        self.awslocal(&["s3", "mb", &format!("s3://{}", bucket)])
            .await?;
        info!("[{}] Created bucket {}", self.handle().name, bucket);
        Ok(bucket)
    }

    /// Uploads `local` as `bucket/key`.
    pub async fn save_file(&self, local: &Path, bucket: &str, key: &str) -> Result<(), ContainerError> {
        validate_local_path(local)?;
        if !tokio::fs::metadata(local).await?.is_file() {
            return Err(ContainerError::FileOperationFailed(format!(
                "{} is not a regular file",
                local.display()
            )));
        }

        let staging = staging_path();
        let id = &self.handle().id;
        self.container.runtime().copy_to(id, local, &staging).await?;
        let result = self
            .awslocal(&["s3", "cp", &staging, &s3_url(bucket, key)])
            .await;
        self.remove_staging(&staging).await;
        result?;

        debug!("[{}] Uploaded {} to s3://{}/{}", self.handle().name, local.display(), bucket, key);
        Ok(())
    }

    /// Downloads `bucket/key` to `local`, creating local parent directories.
    pub async fn get_file(&self, bucket: &str, key: &str, local: &Path) -> Result<(), ContainerError> {
        validate_local_path(local)?;

        let staging = staging_path();
        if let Err(e) = self
            .awslocal(&["s3", "cp", &s3_url(bucket, key), &staging])
            .await
        {
            self.remove_staging(&staging).await;
            return Err(e);
        }

        if let Some(parent) = local.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_local_dir(parent).await?;
        }
        let id = &self.handle().id;
        let copied = self.container.runtime().copy_from(id, &staging, local).await;
        self.remove_staging(&staging).await;
        copied?;
        restrict_permissions(local).await?;

        debug!("[{}] Downloaded s3://{}/{} to {}", self.handle().name, bucket, key, local.display());
        Ok(())
    }

    /// All objects in `bucket` whose key starts with `prefix`, recursively.
    pub async fn list_files(&self, bucket: &str, prefix: &str) -> Result<Vec<S3Object>, ContainerError> {
        let mut args = vec![
            "s3api",
            "list-objects-v2",
            "--bucket",
            bucket,
            "--output",
            "json",
        ];
        if !prefix.is_empty() {
            args.push("--prefix");
            args.push(prefix);
        }
        let output = self.awslocal(&args).await?;
        parse_list_objects(&output)
    }

    pub async fn delete_file(&self, bucket: &str, key: &str) -> Result<(), ContainerError> {
        self.awslocal(&["s3", "rm", &s3_url(bucket, key)]).await?;
        debug!("[{}] Deleted s3://{}/{}", self.handle().name, bucket, key);
        Ok(())
    }

    pub async fn close(&mut self) -> Result<(), ContainerError> {
        self.container.close().await
    }

    async fn awslocal(&self, args: &[&str]) -> Result<String, ContainerError> {
        let mut cmd = vec!["awslocal"];
        cmd.extend_from_slice(args);
        let output = self.container.exec(&cmd).await?;
        Ok(output.stdout_string())
    }

    async fn remove_staging(&self, staging: &str) {
        if let Err(e) = self.container.exec(&["rm", "-f", staging]).await {
            warn!("[{}] Failed to remove {}: {}", self.handle().name, staging, e);
        }
    }
}

pub(crate) fn localstack_spec() -> ContainerSpec {
    ContainerSpec::new("localstack", LOCALSTACK_IMAGE)
        .expose(LOCALSTACK_PORT)
        .env("SERVICES", "s3")
        .env("AWS_DEFAULT_REGION", LOCALSTACK_REGION)
        .env("AWS_ACCESS_KEY_ID", LOCALSTACK_ACCESS_KEY)
        .env("AWS_SECRET_ACCESS_KEY", LOCALSTACK_SECRET_KEY)
        .wait_for(WaitStrategy::log("Ready."))
}

/// Lowercase, 3-63 characters, as S3 requires.
pub(crate) fn unique_bucket_name() -> String {
    format!("testbucket-{}", Uuid::new_v4().simple())
}

fn s3_url(bucket: &str, key: &str) -> String {
    format!("s3://{}/{}", bucket, key.trim_start_matches('/'))
}

fn staging_path() -> String {
    format!("/tmp/testutils-{}", Uuid::new_v4().simple())
}

/// Parses `list-objects-v2` JSON. Empty output means no objects.
pub(crate) fn parse_list_objects(output: &str) -> Result<Vec<S3Object>, ContainerError> {
    if output.trim().is_empty() {
        return Ok(Vec::new());
    }
    let parsed: ListObjectsOutput = serde_json::from_str(output)
        .map_err(|e| ContainerError::ParseFailed(format!("list-objects-v2 output: {}", e)))?;
    Ok(parsed.contents)
}
