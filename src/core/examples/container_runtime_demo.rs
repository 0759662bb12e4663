use log::{error, info};
use testutils::container_management::{DockerRuntime, PostgresTestContainer, SshTestContainer};
use testutils::file_utils::write_test_file;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("Starting container runtime demo");

    let runtime = match DockerRuntime::from_env().await {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to initialize DockerRuntime (is docker running?): {}", e);
            return Err(e.into());
        }
    };

    info!("Starting PostgreSQL container...");
    let mut pg = PostgresTestContainer::start_on(&runtime, "demo").await?;
    info!("PostgreSQL: {}", pg.connection_string());

    info!("Starting SSH container...");
    let mut ssh = SshTestContainer::start_on(&runtime, "demo").await?;
    info!("SSH: {} ({}/{})", ssh.address(), ssh.user(), ssh.password());

    let local = write_test_file("uploaded by the demo\n")?;
    ssh.save_file(local.path(), "demo/hello.txt").await?;
    for entry in ssh.list_files("demo").await? {
        info!("  {} ({} bytes, dir: {})", entry.name, entry.size, entry.is_dir);
    }

    let stats = runtime.stats();
    info!(
        "Stats: active={}, total={}, failed={}",
        stats.active_count, stats.total_created, stats.failed_count
    );

    ssh.close().await?;
    pg.close().await?;
    runtime.terminate_all().await?;

    info!("Demo finished, active containers: {}", runtime.stats().active_count);
    Ok(())
}
