#[cfg(test)]
mod integration_tests {
    use crate::configuration::Settings;
    use crate::container_management::{
        ContainerSpec, DockerRuntime, FtpTestContainer, LocalstackTestContainer,
        MongoTestContainer, MySqlTestContainer, PostgresTestContainer, SshTestContainer,
        WaitStrategy, MONGO_ENV_VAR,
    };
    use crate::error_handling::types::ContainerError;
    use crate::file_utils::test_file;
    use serial_test::serial;
    use std::fs;
    use std::time::Duration;
    use tokio::net::TcpStream;
    use tokio::time::timeout;
    use tokio_test::assert_ok;

    async fn runtime() -> DockerRuntime {
        let _ = env_logger::builder().is_test(true).try_init();
        DockerRuntime::new(Settings::default())
            .await
            .expect("docker runtime not available")
    }

    #[tokio::test]
    async fn missing_binary_is_reported() {
        let settings = Settings {
            docker_bin: "/nonexistent/testutils-docker".to_string(),
            ..Settings::default()
        };
        let result = DockerRuntime::new(settings).await;
        assert!(matches!(result, Err(ContainerError::RuntimeNotAvailable)));
    }

    #[tokio::test]
    async fn invalid_settings_are_rejected_before_probing() {
        let settings = Settings {
            startup_timeout_secs: 0,
            ..Settings::default()
        };
        let result = DockerRuntime::new(settings).await;
        assert!(matches!(result, Err(ContainerError::ConfigInvalid(_))));
    }

    #[tokio::test]
    #[ignore = "requires docker"]
    async fn generic_container_lifecycle() {
        let runtime = runtime().await;
        let spec = ContainerSpec::new("alpine", "alpine:3")
            .command(&["sh", "-c", "echo booted; sleep 300"])
            .wait_for(WaitStrategy::log("booted"));

        let handle = timeout(Duration::from_secs(120), runtime.run(&spec))
            .await
            .expect("timed out starting container")
            .expect("failed to start container");
        assert!(handle.name.starts_with("testutils-alpine-"));
        assert_eq!(runtime.stats().active_count, 1);
        assert_eq!(runtime.stats().total_created, 1);
        assert!(runtime.get_container(&handle.id).is_some());

        let out = runtime.exec(&handle.id, &["echo", "hello"]).await.unwrap();
        assert_eq!(out.stdout_string(), "hello\n");
        assert!(runtime.exec(&handle.id, &["false"]).await.is_err());
        assert!(runtime.logs(&handle.id).await.unwrap().contains("booted"));

        assert_ok!(runtime.terminate(&handle.id).await);
        assert_eq!(runtime.stats().active_count, 0);
        assert!(runtime.list_active_containers().is_empty());
    }

    #[tokio::test]
    #[ignore = "requires docker"]
    async fn readiness_timeout_removes_container() {
        let settings = Settings {
            startup_timeout_secs: 2,
            ..Settings::default()
        };
        let runtime = DockerRuntime::new(settings).await.unwrap();
        let spec = ContainerSpec::new("alpine", "alpine:3")
            .command(&["sleep", "300"])
            .wait_for(WaitStrategy::log("never printed"));

        let result = runtime.run(&spec).await;
        assert!(matches!(result, Err(ContainerError::ReadinessTimeout(_))));
        assert_eq!(runtime.stats().failed_count, 1);
        assert_eq!(runtime.stats().active_count, 0);
    }

    #[tokio::test]
    #[ignore = "requires docker"]
    async fn ssh_container_file_operations() {
        let runtime = runtime().await;
        let mut ssh = SshTestContainer::start_on(&runtime, "test").await.unwrap();
        assert!(ssh.address().starts_with("127.0.0.1:"));
        assert_eq!(ssh.user(), "test");
        assert_eq!(ssh.password(), "test");
        assert!(TcpStream::connect(ssh.address()).await.is_ok());

        let local = test_file("ssh payload\n");
        ssh.save_file(local.path(), "upload/nested/file.txt")
            .await
            .unwrap();

        let entries = ssh.list_files("upload/nested").await.unwrap();
        assert!(entries
            .iter()
            .any(|e| e.name == "file.txt" && e.size == 12 && !e.is_dir));
        let home = ssh.list_files("").await.unwrap();
        assert!(home.iter().any(|e| e.name == "upload" && e.is_dir));

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("down/loaded.txt");
        ssh.get_file("upload/nested/file.txt", &target).await.unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "ssh payload\n");

        assert!(ssh
            .get_file("../etc/passwd", &dir.path().join("x"))
            .await
            .is_err());
        assert!(ssh.get_file("missing.txt", &target).await.is_err());

        ssh.delete_file("upload/nested/file.txt").await.unwrap();
        assert!(ssh.list_files("upload/nested").await.unwrap().is_empty());

        assert_ok!(ssh.close().await);
        assert_ok!(ssh.close().await);
    }

    #[tokio::test]
    #[ignore = "requires docker"]
    async fn ftp_container_file_operations() {
        let runtime = runtime().await;
        let mut ftp = FtpTestContainer::start_on(&runtime).await.unwrap();
        assert_eq!(ftp.user(), "ftpuser");
        assert_eq!(ftp.password(), "ftppass");
        assert_eq!(
            ftp.connection_string(),
            format!("{}:{}", ftp.ip(), ftp.port())
        );

        for name in ["test1.txt", "test2.txt", "testdir/nested.txt"] {
            let local = test_file(format!("content of {}", name));
            ftp.save_file(local.path(), name).await.unwrap();
        }

        let home = ftp.list_files(".").await.unwrap();
        for expected in ["test1.txt", "test2.txt", "testdir"] {
            assert!(home.iter().any(|e| e.name == expected), "{} missing", expected);
        }
        assert_eq!(ftp.list_files("").await.unwrap(), home);

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested.txt");
        ftp.get_file("testdir/nested.txt", &target).await.unwrap();
        assert_eq!(
            fs::read_to_string(&target).unwrap(),
            "content of testdir/nested.txt"
        );

        assert_ok!(ftp.close().await);
    }

    #[tokio::test]
    #[ignore = "requires docker"]
    async fn postgres_and_mysql_accept_connections() {
        let runtime = runtime().await;

        let mut pg = PostgresTestContainer::start_on(&runtime, "test").await.unwrap();
        assert!(pg.connection_string().starts_with("postgres://postgres:secret@"));
        assert!(TcpStream::connect((pg.host(), pg.port())).await.is_ok());
        assert_ok!(pg.close().await);

        let mut my = MySqlTestContainer::start_on(&runtime, "test").await.unwrap();
        assert!(my.dsn().ends_with("/test?parseTime=true"));
        assert!(my.url().starts_with("mysql://root:secret@"));
        assert!(TcpStream::connect((my.host(), my.port())).await.is_ok());
        assert_ok!(my.close().await);

        assert_eq!(runtime.stats().total_created, 2);
        assert_eq!(runtime.stats().active_count, 0);
    }

    #[tokio::test]
    #[serial]
    #[ignore = "requires docker"]
    async fn mongo_sets_and_restores_env() {
        let runtime = runtime().await;
        std::env::set_var(MONGO_ENV_VAR, "mongodb://original-value:27017");

        let mut mongo = MongoTestContainer::start_on(&runtime, 7).await.unwrap();
        assert!(mongo.uri().starts_with("mongodb://"));
        assert_eq!(std::env::var(MONGO_ENV_VAR).unwrap(), mongo.uri());
        assert_ne!(mongo.collection_name(), mongo.collection_name());

        assert_ok!(mongo.close().await);
        assert_eq!(
            std::env::var(MONGO_ENV_VAR).unwrap(),
            "mongodb://original-value:27017"
        );
        std::env::remove_var(MONGO_ENV_VAR);
    }

    #[tokio::test]
    #[ignore = "requires docker"]
    async fn localstack_s3_file_operations() {
        let runtime = runtime().await;
        let mut ls = LocalstackTestContainer::start_on(&runtime).await.unwrap();
        assert!(ls.endpoint().starts_with("http://"));

        let bucket = ls.make_bucket().await.unwrap();
        assert_ne!(bucket, ls.make_bucket().await.unwrap());

        let local = test_file("Hello S3 world!");
        ls.save_file(local.path(), &bucket, "test-object.txt")
            .await
            .unwrap();
        let objects = ls.list_files(&bucket, "").await.unwrap();
        assert!(objects.iter().any(|o| o.key == "test-object.txt"));

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("downloaded.txt");
        ls.get_file(&bucket, "test-object.txt", &target).await.unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "Hello S3 world!");

        ls.delete_file(&bucket, "test-object.txt").await.unwrap();
        assert!(ls.list_files(&bucket, "").await.unwrap().is_empty());

        for key in ["prefix1/file1.txt", "prefix1/file2.txt", "prefix2/file1.txt"] {
            ls.save_file(local.path(), &bucket, key).await.unwrap();
        }
        assert_eq!(ls.list_files(&bucket, "prefix1/").await.unwrap().len(), 2);
        assert_eq!(ls.list_files(&bucket, "prefix2/").await.unwrap().len(), 1);

        assert_ok!(ls.close().await);
    }
}
