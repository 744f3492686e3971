//! Handler-built responses and their coercion into wire form.
//!
//! [`Response`] is what a handler builds when it needs control over status,
//! content type or headers. [`coerce`] turns any handler outcome into a
//! [`WireResponse`]: the encoded body, status line and header list the host
//! adapter writes out.

use bytes::{BufMut, Bytes, BytesMut};
use encoding_rs::UTF_8;

use super::error::HandlerError;
use super::reply::Reply;
use super::request::encoding_for;
use super::{Headers, StatusCode};
use crate::log::Logger;

const TEXT_HTML: &str = "text/html";
const APPLICATION_JSON: &str = "application/json";
const RESPONSE_CHARSET: &str = "utf-8";

/// Fixed body for unexpected handler failures. Never carries error details.
pub const INTERNAL_ERROR_BODY: &str = "<html><body>Internal Server Error</body></html>";

/// An explicit response built by a handler.
///
/// Unset content type and charset fall back to `text/html` and `utf-8` when
/// the response is coerced.
///
/// # Examples
///
/// ```
/// use burette::http::{Response, StatusCode};
///
/// let response = Response::new()
///     .status(StatusCode::CREATED)
///     .content_type("text/plain")
///     .header("X-Request-Id", "abc-123")
///     .body("created");
///
/// assert_eq!(response.status_code(), StatusCode::CREATED);
/// assert_eq!(response.charset_name(), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    status: StatusCode,
    body: String,
    content_type: Option<String>,
    charset: Option<String>,
    headers: Headers,
    location: Option<String>,
}

impl Response {
    /// A `200 OK` response with an empty body.
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn status(mut self, status: impl Into<StatusCode>) -> Self {
        self.status = status.into();
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets the media type, e.g. `text/plain`. The charset is set separately.
    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Sets the charset used both in `Content-Type` and to encode the body.
    #[must_use]
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    /// Appends an extra header. `Content-Type` is always added by coercion.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn body_text(&self) -> &str {
        &self.body
    }

    pub fn content_type_name(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn charset_name(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Redirect target; only present on responses built by [`redirect`].
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }
}

/// A `302 Found` response pointing at `url`, with an empty body.
///
/// # Examples
///
/// ```
/// use burette::http::{StatusCode, redirect};
///
/// let response = redirect("/empty");
/// assert_eq!(response.status_code(), StatusCode::FOUND);
/// assert_eq!(response.location(), Some("/empty"));
/// ```
pub fn redirect(url: impl Into<String>) -> Response {
    Response {
        status: StatusCode::FOUND,
        location: Some(url.into()),
        ..Response::default()
    }
}

/// A coerced response, ready for the host adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireResponse {
    status: StatusCode,
    headers: Headers,
    body: Bytes,
}

impl WireResponse {
    /// A response built by the host itself, bypassing coercion.
    pub fn new(status: StatusCode, headers: Headers, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The status line, e.g. `"405 Method Not Allowed"`.
    pub fn status_line(&self) -> String {
        self.status.to_string()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The body, already encoded with the resolved charset.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Splits into `(body, status line, headers)`.
    pub fn into_parts(self) -> (Bytes, String, Vec<(String, String)>) {
        let status_line = self.status_line();
        (self.body, status_line, self.headers.into_vec())
    }

    /// Serializes as an HTTP/1.1 message that closes the connection.
    ///
    /// `Content-Length` and `Connection: close` follow the coerced headers.
    pub fn to_http1(&self) -> BytesMut {
        let estimated_size = 128 + self.headers.len() * 64 + self.body.len();
        let mut buf = BytesMut::with_capacity(estimated_size);

        buf.put(format!("HTTP/1.1 {}\r\n", self.status).as_bytes());
        buf.put(self.headers.to_string().as_bytes());
        buf.put(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        buf.put(&b"Connection: close\r\n\r\n"[..]);
        buf.put(self.body.as_ref());

        buf
    }
}

/// Normalizes a handler outcome into a [`WireResponse`].
///
/// - `Err(Http)`: its status and body, `text/html`, request charset.
/// - any other `Err`: `500` with [`INTERNAL_ERROR_BODY`], `text/html`,
///   request charset. Logging the failure is the caller's job.
/// - `Ok(Response)`: its own status, body and charset; `Content-Type` from
///   its content type and charset; `Location` when it is a `302` redirect.
/// - `Ok(Json)`: serialized body, `200`, `application/json`, request charset.
/// - `Ok(Text)`: the text, `200`, `text/html`, request charset.
///
/// The body is encoded with the resolved charset. A charset the encoder does
/// not know is reported to `log` and the body is encoded as UTF-8.
pub fn coerce(
    outcome: Result<Reply, HandlerError>,
    request_charset: &str,
    log: &dyn Logger,
) -> WireResponse {
    let response = match outcome {
        Ok(Reply::Response(response)) => response,
        Ok(Reply::Text(text)) => Response::new()
            .body(text)
            .content_type(TEXT_HTML)
            .charset(request_charset),
        Ok(Reply::Json(data)) => Response::new()
            .body(data.to_string())
            .content_type(APPLICATION_JSON)
            .charset(request_charset),
        Err(HandlerError::Http(err)) => Response::new()
            .status(err.status())
            .body(err.body())
            .content_type(TEXT_HTML)
            .charset(request_charset),
        Err(_) => Response::new()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .body(INTERNAL_ERROR_BODY)
            .content_type(TEXT_HTML)
            .charset(request_charset),
    };

    let Response {
        status,
        body,
        content_type,
        charset,
        mut headers,
        location,
    } = response;
    let content_type = content_type.as_deref().unwrap_or(TEXT_HTML);
    let charset = charset.as_deref().unwrap_or(RESPONSE_CHARSET);

    headers.insert("Content-Type", format!("{content_type}; charset={charset}"));
    if let Some(location) = location.filter(|_| status.is_redirect()) {
        headers.insert("Location", location);
    }

    WireResponse {
        status,
        headers,
        body: encode_body(&body, charset, log),
    }
}

fn encode_body(body: &str, charset: &str, log: &dyn Logger) -> Bytes {
    let encoding = encoding_for(charset).unwrap_or_else(|| {
        log.unknown_charset(charset);
        UTF_8
    });
    let (encoded, _, _) = encoding.encode(body);
    Bytes::from(encoded.into_owned())
}
