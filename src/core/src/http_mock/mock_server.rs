use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use warp::http::{HeaderMap, Method, Request, StatusCode};
use warp::hyper::body::Bytes;
use warp::path::FullPath;
use warp::{Filter, Rejection};

use super::types::{response, Handler, MockResponse};
use crate::error_handling::types::HttpError;

/// Loopback HTTP server that sends every request to a [`Handler`].
///
/// The listener is bound on `127.0.0.1` with an ephemeral port. The server
/// stops on [`shutdown`](Self::shutdown) or, at the latest, when the value is
/// dropped at the end of the test.
pub struct MockHttpServer {
    addr: SocketAddr,
    url: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl MockHttpServer {
    /// Binds the listener and starts serving. Must be called from within a
    /// tokio runtime.
    pub async fn start<H: Handler>(handler: H) -> Result<Self, HttpError> {
        let routes = handler_filter(Arc::new(handler));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let (addr, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown((Ipv4Addr::LOCALHOST, 0), async move {
                let _ = shutdown_rx.await;
            })
            .map_err(|e| HttpError::BindFailed(e.to_string()))?;

        let task = tokio::spawn(server);
        let url = format!("http://{}", addr);
        info!("Mock HTTP server listening on {}", url);

        Ok(Self {
            addr,
            url,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// Base URL, e.g. `http://127.0.0.1:49152`.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `url()` joined with `path` (which should start with `/`).
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.url, path)
    }

    /// Stops accepting connections and waits for the server task to finish.
    /// Calling it more than once is a no-op.
    pub async fn shutdown(&mut self) -> Result<(), HttpError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| HttpError::ServerTaskFailed(e.to_string()))?;
            debug!("Mock HTTP server on {} stopped", self.url);
        }
        Ok(())
    }
}

impl Drop for MockHttpServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            if tx.send(()).is_err() {
                warn!("Mock HTTP server on {} already stopped", self.url);
            }
            debug!("Mock HTTP server on {} signalled to stop on drop", self.url);
        }
    }
}

/// Catch-all filter that rebuilds the request and hands it to `handler`.
pub(crate) fn handler_filter(
    handler: Arc<dyn Handler>,
) -> impl Filter<Extract = (MockResponse,), Error = Rejection> + Clone {
    let query = warp::query::raw()
        .or(warp::any().map(String::new))
        .unify();

    warp::method()
        .and(warp::path::full())
        .and(query)
        .and(warp::header::headers_cloned())
        .and(warp::body::bytes())
        .map(
            move |method: Method, path: FullPath, query: String, headers: HeaderMap, body: Bytes| {
                let uri = if query.is_empty() {
                    path.as_str().to_string()
                } else {
                    format!("{}?{}", path.as_str(), query)
                };
                match Request::builder().method(method).uri(uri).body(body) {
                    Ok(mut request) => {
                        *request.headers_mut() = headers;
                        handler.handle(request)
                    }
                    Err(e) => response(StatusCode::BAD_REQUEST, e.to_string()),
                }
            },
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_mock::types::MockRequest;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio_test::assert_ok;

    fn echo(request: MockRequest) -> MockResponse {
        let body = format!(
            "{} {}?{} {}",
            request.method(),
            request.uri().path(),
            request.uri().query().unwrap_or(""),
            String::from_utf8_lossy(request.body())
        );
        response(StatusCode::OK, body)
    }

    async fn raw_get(addr: SocketAddr, path: &str) -> std::io::Result<String> {
        let mut stream = TcpStream::connect(addr).await?;
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            path, addr
        );
        stream.write_all(request.as_bytes()).await?;
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    #[tokio::test]
    async fn filter_passes_method_path_query_and_body() {
        let filter = handler_filter(Arc::new(echo));
        let res = warp::test::request()
            .method("POST")
            .path("/items/7?verbose=1")
            .body("payload")
            .reply(&filter)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body().as_ref(), b"POST /items/7?verbose=1 payload");
    }

    #[tokio::test]
    async fn filter_passes_headers() {
        let filter = handler_filter(Arc::new(|req: MockRequest| {
            let token = req
                .headers()
                .get("x-token")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("missing")
                .to_string();
            response(StatusCode::ACCEPTED, token)
        }));
        let res = warp::test::request()
            .path("/")
            .header("x-token", "abc123")
            .reply(&filter)
            .await;
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        assert_eq!(res.body().as_ref(), b"abc123");
    }

    #[tokio::test]
    async fn server_answers_on_its_url() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut server = MockHttpServer::start(echo).await.unwrap();
        assert!(server.url().starts_with("http://127.0.0.1:"));
        assert_eq!(server.url_for("/x"), format!("{}/x", server.url()));

        let reply = raw_get(server.addr(), "/hello?name=test").await.unwrap();
        assert!(reply.starts_with("HTTP/1.1 200 OK"), "reply: {}", reply);
        assert!(reply.ends_with("GET /hello?name=test "), "reply: {}", reply);

        assert_ok!(server.shutdown().await);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_closes_listener() {
        let mut server = MockHttpServer::start(echo).await.unwrap();
        let addr = server.addr();
        assert_ok!(server.shutdown().await);
        assert_ok!(server.shutdown().await);
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn servers_get_distinct_ports() {
        let a = MockHttpServer::start(echo).await.unwrap();
        let b = MockHttpServer::start(echo).await.unwrap();
        assert_ne!(a.addr().port(), b.addr().port());
    }
}
