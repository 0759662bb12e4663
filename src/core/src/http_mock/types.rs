//! Request/response types shared by the mock server and the recorder.

use warp::http::{HeaderMap, Method, Request, Response, StatusCode};
use warp::hyper::body::Bytes;

/// Request handed to a [`Handler`]: method, URI (path and query), headers
/// and the full body.
pub type MockRequest = Request<Bytes>;

/// Response produced by a [`Handler`].
pub type MockResponse = Response<Bytes>;

/// Serves requests for a [`MockHttpServer`](super::MockHttpServer).
///
/// Implemented for any `Fn(MockRequest) -> MockResponse` closure.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, request: MockRequest) -> MockResponse;
}

impl<F> Handler for F
where
    F: Fn(MockRequest) -> MockResponse + Send + Sync + 'static,
{
    fn handle(&self, request: MockRequest) -> MockResponse {
        self(request)
    }
}

/// Snapshot of one request seen by a [`RequestRecorder`](super::RequestRecorder).
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    /// Request path without the query string.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// First value of `name` if it is present and valid visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// `200 OK` with an empty body.
pub fn ok_response() -> MockResponse {
    response(StatusCode::OK, Bytes::new())
}

/// A response with `status` and `body` and no extra headers.
pub fn response(status: StatusCode, body: impl Into<Bytes>) -> MockResponse {
    let mut res = Response::new(body.into());
    *res.status_mut() = status;
    res
}
