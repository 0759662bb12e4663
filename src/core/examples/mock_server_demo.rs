use log::info;
use std::io::Write;
use testutils::data_capture::capture_stdout_and_stderr;
use testutils::http_mock::http::StatusCode;
use testutils::http_mock::{response, MockHttpServer, MockRequest, RequestRecorder};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let recorder = RequestRecorder::wrapping(|req: MockRequest| {
        response(StatusCode::OK, format!("hello {}", req.uri().path()))
    });
    let mut server = MockHttpServer::start(recorder.clone()).await?;
    info!("Mock server at {}", server.url());

    let mut stream = TcpStream::connect(server.addr()).await?;
    let request = format!(
        "POST /greet HTTP/1.1\r\nHost: {}\r\nContent-Length: 5\r\nConnection: close\r\n\r\nworld",
        server.addr()
    );
    stream.write_all(request.as_bytes()).await?;
    let mut reply = String::new();
    stream.read_to_string(&mut reply).await?;
    info!("Reply: {}", reply.lines().last().unwrap_or_default());

    for req in recorder.requests() {
        info!("Recorded {} {} body={:?}", req.method, req.path, req.body_string());
    }
    server.shutdown().await?;

    let (out, err) = capture_stdout_and_stderr(|| {
        let _ = std::io::stdout().write_all(b"to stdout\n");
        let _ = std::io::stderr().write_all(b"to stderr\n");
    });
    info!("Captured stdout={:?} stderr={:?}", out, err);
    Ok(())
}
