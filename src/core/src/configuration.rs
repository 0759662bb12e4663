//! Runtime settings for the container helpers and the `testutils` binary.

pub mod settings;

pub use settings::{PullPolicy, Settings};
