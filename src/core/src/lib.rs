//! Helpers for writing tests: capture what a piece of code writes to
//! stdout/stderr, stand up a mock HTTP endpoint, drop a file on disk, or
//! start a throwaway service container.

pub mod configuration;
pub mod container_management;
pub mod data_capture;
pub mod error_handling;
pub mod file_utils;
pub mod http_mock;

pub use data_capture::{
    capture_stderr, capture_stdout, capture_stdout_and_stderr, try_capture, SharedBuffer,
};
pub use file_utils::{test_file, write_test_file, TestFile};
pub use http_mock::{MockHttpServer, RequestRecorder};
