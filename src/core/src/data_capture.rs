//! Output capture for tests.
//!
//! - [`stdio_capture`]: redirect the process-wide stdout/stderr descriptors
//!   into a pipe for the duration of a closure and hand back what was written.
//! - [`shared_buffer`]: an injectable in-memory writer for code that takes an
//!   `impl Write`, safe for parallel tests.
//!
//! ```no_run
//! use std::io::Write;
//! use testutils::data_capture::{capture_stdout, capture_stdout_and_stderr};
//!
//! let out = capture_stdout(|| {
//!     std::io::stdout().write_all(b"hello\n").unwrap();
//! });
//! assert_eq!(out, "hello\n");
//!
//! let (out, err) = capture_stdout_and_stderr(|| {
//!     std::io::stderr().write_all(b"oops\n").unwrap();
//! });
//! assert!(out.is_empty());
//! assert_eq!(err, "oops\n");
//! ```

pub mod shared_buffer;
pub mod stdio_capture;
pub mod types;

pub use shared_buffer::SharedBuffer;
pub use stdio_capture::{
    capture, capture_bytes, capture_stderr, capture_stderr_bytes, capture_stdout,
    capture_stdout_and_stderr, capture_stdout_and_stderr_bytes, capture_stdout_bytes,
    try_capture, try_capture_stdout_and_stderr, StreamRedirect,
};
pub use types::{CaptureState, CapturedOutput, StdioStream};
