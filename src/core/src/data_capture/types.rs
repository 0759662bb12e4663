//! Common data types used across the data_capture subsystem.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Process-wide output streams that can be redirected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StdioStream {
    /// Standard output (descriptor 1).
    Stdout,
    /// Standard error (descriptor 2).
    Stderr,
}

impl StdioStream {
    pub(crate) fn index(self) -> usize {
        match self {
            StdioStream::Stdout => 0,
            StdioStream::Stderr => 1,
        }
    }
}

impl fmt::Display for StdioStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StdioStream::Stdout => write!(f, "stdout"),
            StdioStream::Stderr => write!(f, "stderr"),
        }
    }
}

/// Lifecycle of a single redirection.
///
/// `Idle -> Redirecting -> Draining -> Restored`; a handle never reaches
/// `Restored` without passing through `Draining`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureState {
    /// No redirection installed yet.
    Idle,
    /// The stream descriptor points at the capture pipe.
    Redirecting,
    /// The original descriptor is back; the drain worker is finishing.
    Draining,
    /// The drain worker has been joined and its buffer handed back.
    Restored,
}

/// Bytes collected from both streams by a dual capture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedOutput {
    /// Raw bytes written to standard output during the action.
    pub stdout: Vec<u8>,
    /// Raw bytes written to standard error during the action.
    pub stderr: Vec<u8>,
}

impl CapturedOutput {
    /// Standard output decoded as UTF-8 (invalid sequences replaced).
    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Standard error decoded as UTF-8 (invalid sequences replaced).
    pub fn stderr_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}
