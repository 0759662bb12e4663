use std::fmt;

#[derive(Debug)]
pub enum CaptureError {
    PipeFailed(std::io::Error),
    RedirectFailed(std::io::Error),
    DrainFailed(std::io::Error),
    DrainPanicked(String),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::PipeFailed(e) => write!(f, "Failed to create capture pipe: {}", e),
            CaptureError::RedirectFailed(e) => write!(f, "Failed to redirect stream: {}", e),
            CaptureError::DrainFailed(e) => write!(f, "Failed to read captured output: {}", e),
            CaptureError::DrainPanicked(e) => write!(f, "Capture drain worker panicked: {}", e),
        }
    }
}

impl std::error::Error for CaptureError {}

#[derive(Debug)]
pub enum FileError {
    TempDirFailed(std::io::Error),
    WriteFailed(std::io::Error),
    PermissionsFailed(std::io::Error),
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileError::TempDirFailed(e) => write!(f, "Failed to create temp directory: {}", e),
            FileError::WriteFailed(e) => write!(f, "Failed to write test file: {}", e),
            FileError::PermissionsFailed(e) => {
                write!(f, "Failed to set test file permissions: {}", e)
            }
        }
    }
}

impl std::error::Error for FileError {}

#[derive(Debug)]
pub enum HttpError {
    BindFailed(String),
    ServerTaskFailed(String),
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpError::BindFailed(e) => write!(f, "Mock HTTP server bind failed: {}", e),
            HttpError::ServerTaskFailed(e) => write!(f, "Mock HTTP server task failed: {}", e),
        }
    }
}

impl std::error::Error for HttpError {}

#[derive(Debug)]
pub enum ContainerError {
    RuntimeNotAvailable,
    StartFailed(String),
    PortNotMapped(String),
    ReadinessTimeout(String),
    CommandFailed(String),
    InvalidPath(String),
    FileOperationFailed(String),
    ParseFailed(String),
    ConfigInvalid(ConfigError),
    IoError(std::io::Error),
}

impl fmt::Display for ContainerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerError::RuntimeNotAvailable => write!(f, "Container runtime not available"),
            ContainerError::StartFailed(e) => write!(f, "Container start failed: {}", e),
            ContainerError::PortNotMapped(e) => write!(f, "Container port not mapped: {}", e),
            ContainerError::ReadinessTimeout(e) => {
                write!(f, "Container did not become ready: {}", e)
            }
            ContainerError::CommandFailed(e) => write!(f, "Container command failed: {}", e),
            ContainerError::InvalidPath(e) => write!(f, "Invalid path: {}", e),
            ContainerError::FileOperationFailed(e) => {
                write!(f, "Container file operation failed: {}", e)
            }
            ContainerError::ParseFailed(e) => write!(f, "Failed to parse runtime output: {}", e),
            ContainerError::ConfigInvalid(e) => write!(f, "Container settings invalid: {}", e),
            ContainerError::IoError(e) => write!(f, "Container IO error: {}", e),
        }
    }
}

impl std::error::Error for ContainerError {}

impl From<std::io::Error> for ContainerError {
    fn from(err: std::io::Error) -> Self {
        ContainerError::IoError(err)
    }
}

impl From<ConfigError> for ContainerError {
    fn from(err: ConfigError) -> Self {
        ContainerError::ConfigInvalid(err)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    InvalidValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::InvalidValue(e) => write!(f, "Invalid configuration value: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}
