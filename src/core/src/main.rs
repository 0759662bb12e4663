use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info, warn};
use std::path::PathBuf;
use testutils::configuration::settings::ENV_CONFIG;
use testutils::configuration::Settings;
use testutils::container_management::{
    DockerRuntime, FtpTestContainer, LocalstackTestContainer, MongoTestContainer,
    MySqlTestContainer, PostgresTestContainer, SshTestContainer,
};
use testutils::error_handling::ContainerError;

#[derive(Parser)]
#[command(name = "testutils")]
#[command(version)]
#[command(about = "Throwaway service containers for integration tests")]
struct Args {
    /// TOML settings file
    #[arg(long, global = true, env = "TESTUTILS_CONFIG")]
    config: Option<PathBuf>,

    /// Container CLI to use instead of the configured one
    #[arg(long, global = true, env = "TESTUTILS_DOCKER_BIN")]
    docker_bin: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report whether the container runtime is reachable
    Check,
    /// Start a service container and keep it running until Ctrl-C
    Up {
        service: Service,
        /// Database name for postgres and mysql
        #[arg(long, default_value = "test")]
        database: String,
        /// Login user for ssh
        #[arg(long, default_value = "test")]
        user: String,
        /// Major version for mongo
        #[arg(long, default_value_t = 7)]
        mongo_version: u32,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Service {
    Ssh,
    Ftp,
    Postgres,
    Mysql,
    Mongo,
    Localstack,
}

enum Running {
    Ssh(SshTestContainer),
    Ftp(FtpTestContainer),
    Postgres(PostgresTestContainer),
    Mysql(MySqlTestContainer),
    Mongo(MongoTestContainer),
    Localstack(LocalstackTestContainer),
}

impl Running {
    async fn start(
        runtime: &DockerRuntime,
        service: Service,
        database: &str,
        user: &str,
        mongo_version: u32,
    ) -> Result<Self, ContainerError> {
        Ok(match service {
            Service::Ssh => Running::Ssh(SshTestContainer::start_on(runtime, user).await?),
            Service::Ftp => Running::Ftp(FtpTestContainer::start_on(runtime).await?),
            Service::Postgres => {
                Running::Postgres(PostgresTestContainer::start_on(runtime, database).await?)
            }
            Service::Mysql => {
                Running::Mysql(MySqlTestContainer::start_on(runtime, database).await?)
            }
            Service::Mongo => {
                Running::Mongo(MongoTestContainer::start_on(runtime, mongo_version).await?)
            }
            Service::Localstack => {
                Running::Localstack(LocalstackTestContainer::start_on(runtime).await?)
            }
        })
    }

    fn details(&self) -> Vec<(&'static str, String)> {
        match self {
            Running::Ssh(c) => vec![
                ("address", c.address()),
                ("user", c.user().to_string()),
                ("password", c.password().to_string()),
                ("home", c.home().to_string()),
            ],
            Running::Ftp(c) => vec![
                ("address", c.connection_string()),
                ("user", c.user().to_string()),
                ("password", c.password().to_string()),
                ("passive port", c.passive_port().to_string()),
            ],
            Running::Postgres(c) => vec![("url", c.connection_string())],
            Running::Mysql(c) => vec![("dsn", c.dsn()), ("url", c.url())],
            Running::Mongo(c) => vec![("uri", c.uri().to_string())],
            Running::Localstack(c) => vec![
                ("endpoint", c.endpoint().to_string()),
                ("region", c.region().to_string()),
                ("access key", c.access_key().to_string()),
                ("secret key", c.secret_key().to_string()),
            ],
        }
    }

    async fn close(&mut self) -> Result<(), ContainerError> {
        match self {
            Running::Ssh(c) => c.close().await,
            Running::Ftp(c) => c.close().await,
            Running::Postgres(c) => c.close().await,
            Running::Mysql(c) => c.close().await,
            Running::Mongo(c) => c.close().await,
            Running::Localstack(c) => c.close().await,
        }
    }
}

fn load_settings(args: &Args) -> Settings {
    let config = args.config.as_ref().map(|p| p.to_string_lossy().into_owned());
    let loaded = Settings::from_lookup(|key| {
        if key == ENV_CONFIG {
            config.clone()
        } else {
            std::env::var(key).ok()
        }
    });

    let mut settings = loaded.unwrap_or_else(|e| {
        error!("Unable to load settings: {}", e);
        std::process::exit(1);
    });
    if let Some(bin) = &args.docker_bin {
        settings.docker_bin = bin.clone();
    }
    settings
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    let args = Args::parse();
    let settings = load_settings(&args);

    match args.command {
        Commands::Check => {
            if DockerRuntime::is_runtime_available(&settings.docker_bin).await {
                info!("{} is available", settings.docker_bin);
            } else {
                error!("{} is not available", settings.docker_bin);
                std::process::exit(1);
            }
        }
        Commands::Up {
            service,
            database,
            user,
            mongo_version,
        } => {
            let runtime = DockerRuntime::new(settings).await.unwrap_or_else(|e| {
                error!("Unable to create a container runtime: {}, exiting...", e);
                std::process::exit(1);
            });

            info!("Starting {:?} container", service);
            let mut running =
                match Running::start(&runtime, service, &database, &user, mongo_version).await {
                    Ok(running) => running,
                    Err(e) => {
                        error!("Failed to start {:?} container: {}", service, e);
                        std::process::exit(1);
                    }
                };

            for (key, value) in running.details() {
                println!("{:<14}{}", format!("{}:", key), value);
            }
            info!("Press Ctrl-C to stop");

            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Unable to listen for Ctrl-C: {}", e);
            }

            info!("Stopping {:?} container", service);
            if let Err(e) = running.close().await {
                error!("Failed to remove container: {}", e);
                std::process::exit(1);
            }
        }
    }
}
