//! Development server: a small Tokio host adapter for an [`App`].
//!
//! Reads one HTTP/1.1 request per connection, hands it to [`App::call`] on
//! the blocking thread pool, writes the response and closes the connection.
//! There is no keep-alive, pipelining or streaming. Not for production use.

use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::App;
use crate::http::{Environ, Headers, StatusCode, WireResponse};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

// Reasons a buffered request cannot be handed to the app.
#[derive(Debug, Error)]
enum HeadError {
    #[error("request head is incomplete")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid Content-Length header")]
    InvalidContentLength,

    #[error("request path is not valid UTF-8 once decoded")]
    InvalidPath,
}

/// Maximum size of a complete HTTP request we will buffer before rejecting it (8 MiB).
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// Maximum number of headers accepted per request.
const MAX_HEADERS: usize = 64;

/// Where the development server listens.
///
/// # Examples
///
/// ```
/// use burette::server::ServerConfig;
///
/// let config = ServerConfig::default();
/// assert_eq!(config.addr(), "localhost:5963");
///
/// let config: ServerConfig = serde_json::from_str(r#"{"port": 8080}"#).unwrap();
/// assert_eq!(config.addr(), "localhost:8080");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 5963,
        }
    }
}

impl ServerConfig {
    /// `host:port`, suitable for [`Server::bind`].
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The development HTTP server.
///
/// # Examples
///
/// ```rust,no_run
/// use burette::App;
/// use burette::server::Server;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut app = App::new();
///     app.get("/", || "Hello!")?;
///
///     let server = Server::bind("127.0.0.1:5963").await?;
///     server.run(app).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections forever, serving each request with `app`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run(self, app: App) -> Result<(), ServerError> {
        let app = Arc::new(app);
        info!(address = %self.local_addr, "development server listening");

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let app = Arc::clone(&app);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, app).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// Binds `config.addr()` and serves `app` until the process exits.
///
/// # Errors
///
/// See [`Server::bind`] and [`Server::run`].
pub async fn run_local(app: App, config: &ServerConfig) -> Result<(), ServerError> {
    Server::bind(config.addr()).await?.run(app).await
}

// The parsed request head plus where its body starts in the buffer.
struct Head {
    env: Environ,
    body_offset: usize,
    content_length: usize,
}

fn parse_head(buf: &[u8]) -> Result<Head, HeadError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut raw = httparse::Request::new(&mut headers);

    let body_offset = match raw.parse(buf)? {
        httparse::Status::Complete(offset) => offset,
        httparse::Status::Partial => return Err(HeadError::Incomplete),
    };

    let method = raw.method.ok_or(HeadError::MissingField { field: "method" })?;
    let target = raw.path.ok_or(HeadError::MissingField { field: "path" })?;
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    let path = percent_decode_str(path)
        .decode_utf8()
        .map_err(|_| HeadError::InvalidPath)?;

    let mut content_type = None;
    let mut content_length = 0;
    for header in raw.headers.iter() {
        if header.name.eq_ignore_ascii_case("content-type") {
            content_type = std::str::from_utf8(header.value).ok();
        } else if header.name.eq_ignore_ascii_case("content-length") {
            content_length = std::str::from_utf8(header.value)
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .ok_or(HeadError::InvalidContentLength)?;
        }
    }

    let env = Environ::new(method, path.into_owned())
        .query_string(query)
        .content_type(content_type.unwrap_or_default());

    Ok(Head {
        env,
        body_offset,
        content_length,
    })
}

// A response produced by the server itself, before any app code runs.
fn plain_response(status: StatusCode) -> WireResponse {
    let mut headers = Headers::new();
    headers.insert("Content-Type", "text/plain; charset=utf-8");
    WireResponse::new(status, headers, Bytes::from(status.to_string()))
}

/// Serves the single request carried by `stream`.
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    app: Arc<App>,
) -> Result<(), std::io::Error> {
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    let (head, total_needed) = loop {
        let bytes_read = stream.read_buf(&mut buf).await?;

        if bytes_read == 0 {
            debug!(peer = %peer_addr, "connection closed by peer");
            return Ok(());
        }

        if buf.len() > MAX_REQUEST_SIZE {
            warn!(peer = %peer_addr, "request too large, sending 413");
            let response = plain_response(StatusCode::PAYLOAD_TOO_LARGE);
            stream.write_all(&response.to_http1()).await?;
            return Ok(());
        }

        let head = match parse_head(&buf) {
            Ok(head) => head,
            Err(HeadError::Incomplete) => continue,
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request, sending 400");
                let response = plain_response(StatusCode::BAD_REQUEST);
                stream.write_all(&response.to_http1()).await?;
                return Ok(());
            }
        };

        let Some(total_needed) = head
            .body_offset
            .checked_add(head.content_length)
            .filter(|&total| total <= MAX_REQUEST_SIZE)
        else {
            warn!(peer = %peer_addr, "declared body too large, sending 413");
            let response = plain_response(StatusCode::PAYLOAD_TOO_LARGE);
            stream.write_all(&response.to_http1()).await?;
            return Ok(());
        };

        // Wait for the full body to arrive.
        if buf.len() >= total_needed {
            break (head, total_needed);
        }
    };

    let body = buf.freeze().slice(head.body_offset..total_needed);
    let env = head.env.body(head.content_length, Cursor::new(body));

    debug!(
        peer = %peer_addr,
        method = env.method(),
        path = env.path(),
        "dispatching request"
    );

    let response = match tokio::task::spawn_blocking(move || app.call(env)).await {
        Ok(response) => response,
        Err(e) => {
            error!(peer = %peer_addr, error = %e, "dispatch task failed");
            plain_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    };

    stream.write_all(&response.to_http1()).await?;
    stream.flush().await?;
    stream.shutdown().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_splits_path_and_query() {
        let raw = b"GET /hoge/path?q=1&r=2 HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let head = parse_head(raw).unwrap();
        assert_eq!(head.body_offset, raw.len());
        assert_eq!(head.content_length, 0);
        assert_eq!(head.env.method(), "GET");
        assert_eq!(head.env.path(), "/hoge/path");
    }

    #[test]
    fn head_reads_content_length() {
        let raw = b"POST /post HTTP/1.1\r\nContent-Type: text/plain; charset=EUC-JP\r\nContent-Length: 5\r\n\r\nhello";
        let head = parse_head(raw).unwrap();
        assert_eq!(head.content_length, 5);
        assert_eq!(&raw[head.body_offset..], b"hello");
    }

    #[test]
    fn head_decodes_path() {
        let raw = b"GET /users/%41%20b?q=%41 HTTP/1.1\r\n\r\n";
        let head = parse_head(raw).unwrap();
        assert_eq!(head.env.path(), "/users/A b");
    }

    #[test]
    fn head_rejects_non_utf8_path() {
        let raw = b"GET /users/%FF HTTP/1.1\r\n\r\n";
        assert!(matches!(parse_head(raw), Err(HeadError::InvalidPath)));
    }

    #[test]
    fn head_keeps_oversized_content_length() {
        let raw = b"POST /echo HTTP/1.1\r\nContent-Length: 18446744073709551615\r\n\r\n";
        assert_eq!(parse_head(raw).unwrap().content_length, usize::MAX);
    }

    #[test]
    fn head_incomplete() {
        assert!(matches!(
            parse_head(b"GET / HTTP/1.1\r\nHost:"),
            Err(HeadError::Incomplete)
        ));
    }

    #[test]
    fn head_bad_content_length() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: lots\r\n\r\n";
        assert!(matches!(parse_head(raw), Err(HeadError::InvalidContentLength)));
    }

    #[test]
    fn custom_method_survives_parsing() {
        let raw = b"HOGE /hoge_url HTTP/1.1\r\n\r\n";
        assert_eq!(parse_head(raw).unwrap().env.method(), "HOGE");
    }

    #[test]
    fn config_defaults() {
        let config: ServerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.addr(), "localhost:5963");
    }
}
