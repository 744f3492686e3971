use std::net::SocketAddr;

use burette::server::Server;
use burette::{App, HandlerError, Request};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn spawn_app() -> SocketAddr {
    let mut app = App::new();
    app.get("/hello/<name>", |req: &Request| {
        format!("hello {}", req.path_param("name").unwrap_or_default())
    })
    .unwrap()
    .post("/echo", |req: &Request| -> Result<String, HandlerError> {
        Ok(req.text()?.to_owned())
    })
    .unwrap();

    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr();
    tokio::spawn(server.run(app));
    addr
}

async fn round_trip(addr: SocketAddr, raw: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8(response).unwrap()
}

#[tokio::test]
async fn serves_get_request() {
    let addr = spawn_app().await;
    let response = round_trip(addr, b"GET /hello/rust HTTP/1.1\r\nHost: localhost\r\n\r\n").await;

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
    assert!(response.contains("Content-Type: text/html; charset=UTF-8\r\n"));
    assert!(response.contains("Content-Length: 10\r\n"));
    assert!(response.ends_with("\r\n\r\nhello rust"));
}

#[tokio::test]
async fn waits_for_declared_body() {
    let addr = spawn_app().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"POST /echo HTTP/1.1\r\nContent-Length: 13\r\n\r\nhello")
        .await
        .unwrap();
    stream.write_all(b"%20world").await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
    assert!(response.ends_with("hello world"));
}

#[tokio::test]
async fn unknown_path_is_404() {
    let addr = spawn_app().await;
    let response = round_trip(addr, b"GET /nope HTTP/1.1\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(response.ends_with("<html><body>not found</body></html>"));
}

#[tokio::test]
async fn malformed_request_is_400() {
    let addr = spawn_app().await;
    let response = round_trip(addr, b"NOT A REQUEST\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{response}");
}

#[tokio::test]
async fn overflowing_content_length_is_413() {
    let addr = spawn_app().await;
    let response = round_trip(
        addr,
        b"POST /echo HTTP/1.1\r\nContent-Length: 18446744073709551615\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 413 Payload Too Large\r\n"), "{response}");
}

#[tokio::test]
async fn oversized_content_length_is_413() {
    let addr = spawn_app().await;
    let response = round_trip(addr, b"POST /echo HTTP/1.1\r\nContent-Length: 9000000\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 413 Payload Too Large\r\n"), "{response}");
}

#[tokio::test]
async fn percent_encoded_path_is_decoded() {
    let addr = spawn_app().await;
    let response = round_trip(addr, b"GET /hello/%41da HTTP/1.1\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
    assert!(response.ends_with("hello Ada"));
}

#[tokio::test]
async fn non_utf8_path_is_400() {
    let addr = spawn_app().await;
    let response = round_trip(addr, b"GET /hello/%FF HTTP/1.1\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{response}");
}
