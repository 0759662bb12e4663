use std::sync::{Arc, Mutex, MutexGuard};

use log::trace;

use super::types::{ok_response, Handler, MockRequest, MockResponse, RecordedRequest};

/// Handler decorator that records every request before forwarding it.
///
/// Clones share the same record list: hand one clone to the
/// [`MockHttpServer`](super::MockHttpServer) and keep another to inspect what
/// arrived. Without a downstream handler every request gets `200 OK`.
#[derive(Clone, Default)]
pub struct RequestRecorder {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    next: Option<Arc<dyn Handler>>,
}

impl RequestRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records requests, then forwards them (body intact) to `next`.
    pub fn wrapping<H: Handler>(next: H) -> Self {
        Self {
            requests: Arc::default(),
            next: Some(Arc::new(next)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<RecordedRequest>> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// The request recorded at `index`, in arrival order.
    pub fn get(&self, index: usize) -> Option<RecordedRequest> {
        self.lock().get(index).cloned()
    }

    /// Copy of every recorded request; later recordings do not affect it.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().clone()
    }

    pub fn reset(&self) {
        self.lock().clear();
    }

    fn record(&self, request: &MockRequest) {
        let record = RecordedRequest {
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            headers: request.headers().clone(),
            body: request.body().to_vec(),
        };
        trace!(
            "Recorded {} {} ({} body bytes)",
            record.method,
            record.path,
            record.body.len()
        );
        self.lock().push(record);
    }
}

impl Handler for RequestRecorder {
    fn handle(&self, request: MockRequest) -> MockResponse {
        self.record(&request);
        match &self.next {
            Some(next) => next.handle(request),
            None => ok_response(),
        }
    }
}

impl std::fmt::Debug for RequestRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestRecorder")
            .field("recorded", &self.len())
            .field("forwards", &self.next.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_mock::mock_server::handler_filter;
    use crate::http_mock::types::response;
    use crate::http_mock::MockHttpServer;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use warp::http::{Method, StatusCode};

    async fn raw_post(addr: std::net::SocketAddr, path: &str, body: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "POST {} HTTP/1.1\r\nHost: {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            path,
            addr,
            body.len(),
            body
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf).into_owned()
    }

    #[tokio::test]
    async fn records_method_path_headers_and_body() {
        let recorder = RequestRecorder::new();
        let filter = handler_filter(Arc::new(recorder.clone()));

        let res = warp::test::request()
            .method("PUT")
            .path("/api/v1/things?id=3")
            .header("x-request-id", "req-1")
            .body(r#"{"name":"thing"}"#)
            .reply(&filter)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.body().is_empty());

        assert_eq!(recorder.len(), 1);
        let rec = recorder.get(0).unwrap();
        assert_eq!(rec.method, Method::PUT);
        assert_eq!(rec.path, "/api/v1/things");
        assert_eq!(rec.header("x-request-id"), Some("req-1"));
        assert_eq!(rec.body_string(), r#"{"name":"thing"}"#);
    }

    #[tokio::test]
    async fn forwards_request_with_body_intact() {
        let recorder = RequestRecorder::wrapping(|req: MockRequest| {
            let body = String::from_utf8_lossy(req.body()).to_uppercase();
            response(StatusCode::CREATED, body)
        });
        let filter = handler_filter(Arc::new(recorder.clone()));

        let res = warp::test::request()
            .method("POST")
            .path("/echo")
            .body("shout")
            .reply(&filter)
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(res.body().as_ref(), b"SHOUT");
        assert_eq!(recorder.get(0).unwrap().body, b"shout");
    }

    #[tokio::test]
    async fn get_out_of_range_is_none() {
        let recorder = RequestRecorder::new();
        assert!(recorder.is_empty());
        assert!(recorder.get(0).is_none());
    }

    #[tokio::test]
    async fn snapshot_is_a_copy_and_reset_clears() {
        let recorder = RequestRecorder::new();
        let filter = handler_filter(Arc::new(recorder.clone()));
        for path in ["/a", "/b"] {
            warp::test::request().path(path).reply(&filter).await;
        }

        let snapshot = recorder.requests();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].path, "/a");
        assert_eq!(snapshot[1].path, "/b");

        recorder.reset();
        assert_eq!(recorder.len(), 0);
        assert_eq!(snapshot.len(), 2);

        warp::test::request().path("/c").reply(&filter).await;
        assert_eq!(recorder.len(), 1);
        assert_eq!(recorder.get(0).unwrap().path, "/c");
    }

    #[tokio::test]
    async fn records_concurrent_requests_through_server() {
        let recorder = RequestRecorder::new();
        let mut server = MockHttpServer::start(recorder.clone()).await.unwrap();
        let addr = server.addr();

        let mut tasks = Vec::new();
        for i in 0..10 {
            tasks.push(tokio::spawn(async move {
                raw_post(addr, &format!("/submit/{}", i), &format!("body-{}", i)).await
            }));
        }
        for task in tasks {
            let reply = task.await.unwrap();
            assert!(reply.starts_with("HTTP/1.1 200 OK"), "reply: {}", reply);
        }

        assert_eq!(recorder.len(), 10);
        let mut bodies: Vec<String> = recorder
            .requests()
            .iter()
            .map(|r| r.body_string())
            .collect();
        bodies.sort();
        let mut expected: Vec<String> = (0..10).map(|i| format!("body-{}", i)).collect();
        expected.sort();
        assert_eq!(bodies, expected);
        assert!(recorder
            .requests()
            .iter()
            .all(|r| r.method == Method::POST && r.header("content-type") == Some("text/plain")));

        server.shutdown().await.unwrap();
    }
}
