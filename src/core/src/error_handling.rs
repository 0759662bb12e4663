//! Error types shared by every subsystem of the crate.

pub mod types;

pub use types::{CaptureError, ConfigError, ContainerError, FileError, HttpError};
