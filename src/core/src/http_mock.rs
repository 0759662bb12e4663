//! In-process HTTP doubles.
//!
//! [`MockHttpServer`] serves a [`Handler`] on an ephemeral loopback port and
//! [`RequestRecorder`] wraps a handler to keep a copy of every request it
//! sees, so a test can point the code under test at `server.url()` and then
//! assert on what was sent.
//!
//! The `http` crate is re-exported so handlers can be written without
//! depending on it directly.

pub mod mock_server;
pub mod request_recorder;
pub mod types;

pub use warp::http;
pub use warp::hyper::body::Bytes;

pub use mock_server::MockHttpServer;
pub use request_recorder::RequestRecorder;
pub use types::{ok_response, response, Handler, MockRequest, MockResponse, RecordedRequest};
