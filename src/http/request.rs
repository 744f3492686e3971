//! The inbound side of one call: the host adapter's [`Environ`] record and
//! the lazily-decoding [`Request`] view built over it.

use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Cursor, Read};

use bytes::Bytes;
use encoding_rs::Encoding;
use percent_encoding::percent_decode_str;
use thiserror::Error;

use super::Method;
use crate::router::PathParams;

/// Charset assumed when the content-type header does not name one.
pub const DEFAULT_CHARSET: &str = "UTF-8";

/// Query parameters: decoded key to every decoded value, in encounter order.
pub type QueryParams = HashMap<String, Vec<String>>;

/// Errors raised while reading or decoding a request body.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("failed to read request body: {0}")]
    Io(#[from] io::Error),

    #[error("request body ended after {received} of {expected} bytes")]
    IncompleteBody { expected: usize, received: usize },

    #[error("unknown charset: {0}")]
    UnknownCharset(String),

    #[error("request body is not valid {charset}")]
    Decode { charset: String },
}

/// Per-call environment supplied by the host adapter.
///
/// Everything the core needs to know about one inbound request: the method
/// and path, the raw query string and content-type value, and a one-shot
/// body source that yields `content_length` bytes.
///
/// # Examples
///
/// ```
/// use burette::http::Environ;
///
/// let env = Environ::new("POST", "/post")
///     .query_string("q=1")
///     .content_type("application/x-www-form-urlencoded; charset=UTF-8")
///     .body_bytes("mytext=hello");
/// assert_eq!(env.content_length(), 12);
/// ```
pub struct Environ {
    method: String,
    path: String,
    query_string: String,
    content_type: String,
    content_length: usize,
    input: Option<Box<dyn Read + Send>>,
}

impl Environ {
    /// Starts an environment for `method` on `path` with no query and no body.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            query_string: String::new(),
            content_type: String::new(),
            content_length: 0,
            input: None,
        }
    }

    /// Sets the raw query string (without the leading `?`).
    #[must_use]
    pub fn query_string(mut self, query: impl Into<String>) -> Self {
        self.query_string = query.into();
        self
    }

    /// Sets the raw `Content-Type` header value.
    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Attaches a body source that will be read for exactly `length` bytes.
    #[must_use]
    pub fn body(mut self, length: usize, input: impl Read + Send + 'static) -> Self {
        self.content_length = length;
        self.input = Some(Box::new(input));
        self
    }

    /// Attaches an in-memory body; the content length is its size.
    #[must_use]
    pub fn body_bytes(self, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        let length = body.len();
        self.body(length, Cursor::new(body))
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn content_length(&self) -> usize {
        self.content_length
    }
}

impl fmt::Debug for Environ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environ")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query_string", &self.query_string)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// A read-only view over one inbound call.
///
/// Every derived value is computed on first access and cached for the life
/// of the request. The body source is not re-readable, so [`body`] drains it
/// once and every later call (including [`text`]) sees the cached bytes.
///
/// A `Request` belongs to the call that created it; it is not shared across
/// threads.
///
/// [`body`]: Request::body
/// [`text`]: Request::text
///
/// # Examples
///
/// ```
/// use burette::http::{Environ, Request};
///
/// let req = Request::new(
///     Environ::new("GET", "/search")
///         .query_string("tag=a&tag=b&empty=")
///         .content_type("text/plain; charset=EUC-JP"),
/// );
/// assert_eq!(req.charset(), "EUC-JP");
/// assert_eq!(req.content_type(), "text/plain");
/// assert_eq!(req.params()["tag"], ["a", "b"]);
/// assert!(!req.params().contains_key("empty"));
/// ```
pub struct Request {
    method: Method,
    path: String,
    query_string: String,
    content_type_line: String,
    content_length: usize,
    input: RefCell<Option<Box<dyn Read + Send>>>,
    path_params: Option<PathParams>,
    charset: OnceCell<String>,
    content_type: OnceCell<String>,
    params: OnceCell<QueryParams>,
    body: OnceCell<Bytes>,
    text: OnceCell<String>,
}

impl Request {
    /// Wraps the host adapter's environment. Nothing is parsed or read yet.
    pub fn new(env: Environ) -> Self {
        Self {
            method: Method::from(env.method.as_str()),
            path: env.path,
            query_string: env.query_string,
            content_type_line: env.content_type,
            content_length: env.content_length,
            input: RefCell::new(env.input),
            path_params: None,
            charset: OnceCell::new(),
            content_type: OnceCell::new(),
            params: OnceCell::new(),
            body: OnceCell::new(),
            text: OnceCell::new(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path exactly as the host adapter supplied it.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the raw query string (without the leading `?`).
    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    pub fn content_length(&self) -> usize {
        self.content_length
    }

    /// The `charset` parameter of the content-type header, or `UTF-8`.
    pub fn charset(&self) -> &str {
        self.charset.get_or_init(|| {
            parse_charset(&self.content_type_line)
                .unwrap_or(DEFAULT_CHARSET)
                .to_owned()
        })
    }

    /// The media type of the content-type header, without parameters.
    ///
    /// Empty when the request carried no content type.
    pub fn content_type(&self) -> &str {
        self.content_type.get_or_init(|| {
            self.content_type_line
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_owned()
        })
    }

    /// Decoded query parameters.
    ///
    /// Repeated keys accumulate values in order. A key whose value is empty
    /// (`k=` or a bare `k`) contributes nothing and does not appear.
    pub fn params(&self) -> &QueryParams {
        self.params
            .get_or_init(|| parse_query_string(&self.query_string))
    }

    /// First value of query parameter `key`, if any.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.params()
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Path parameters captured by the matched route.
    ///
    /// `None` until the router has matched this request.
    pub fn path_params(&self) -> Option<&PathParams> {
        self.path_params.as_ref()
    }

    /// Value of the path parameter `name`, if the matched route declared it.
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.as_ref()?.get(name)
    }

    pub(crate) fn set_path_params(&mut self, params: PathParams) {
        self.path_params = Some(params);
    }

    /// The raw body: `content_length` bytes, read from the source on first call.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Io`]: the body source failed.
    /// - [`RequestError::IncompleteBody`]: the source ended early.
    pub fn body(&self) -> Result<&Bytes, RequestError> {
        if let Some(body) = self.body.get() {
            return Ok(body);
        }

        // The declared length is untrusted; let the buffer grow with the data.
        let mut buf = Vec::new();
        if let Some(input) = self.input.borrow_mut().take() {
            input
                .take(self.content_length as u64)
                .read_to_end(&mut buf)?;
        }
        if buf.len() < self.content_length {
            return Err(RequestError::IncompleteBody {
                expected: self.content_length,
                received: buf.len(),
            });
        }

        Ok(self.body.get_or_init(|| Bytes::from(buf)))
    }

    /// The body decoded with [`charset`](Self::charset), then percent-decoded.
    ///
    /// # Errors
    ///
    /// Any [`body`](Self::body) error, [`RequestError::UnknownCharset`] when
    /// the charset label is not recognized, or [`RequestError::Decode`] when
    /// the bytes are not valid in that charset.
    pub fn text(&self) -> Result<&str, RequestError> {
        if let Some(text) = self.text.get() {
            return Ok(text);
        }

        let charset = self.charset();
        let encoding = encoding_for(charset)
            .ok_or_else(|| RequestError::UnknownCharset(charset.to_owned()))?;
        let (decoded, had_errors) = encoding.decode_without_bom_handling(self.body()?);
        if had_errors {
            return Err(RequestError::Decode {
                charset: charset.to_owned(),
            });
        }
        let text = percent_decode_str(&decoded).decode_utf8_lossy().into_owned();

        Ok(self.text.get_or_init(|| text))
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query_string", &self.query_string)
            .field("content_type", &self.content_type_line)
            .field("content_length", &self.content_length)
            .field("path_params", &self.path_params)
            .finish_non_exhaustive()
    }
}

/// Resolves a charset label (`UTF-8`, `euc-jp`, `Shift_JIS`, …) to an encoding.
pub(crate) fn encoding_for(label: &str) -> Option<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
}

fn parse_charset(content_type: &str) -> Option<&str> {
    content_type
        .split(';')
        .skip(1)
        .find_map(|param| {
            let (name, value) = param.split_once('=')?;
            name.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| value.trim_matches(|c| c == ' ' || c == '"'))
        })
        .filter(|charset| !charset.is_empty())
}

fn parse_query_string(query: &str) -> QueryParams {
    let mut params = QueryParams::new();
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        if value.is_empty() {
            continue;
        }
        params
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Body source that counts how often it is read.
    struct CountingReader {
        data: Cursor<Vec<u8>>,
        reads: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    }

    impl Read for CountingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.data.read(buf)
        }
    }

    fn get(query: &str) -> Request {
        Request::new(Environ::new("GET", "/get_url").query_string(query))
    }

    fn post(content_type: &str, body: Vec<u8>) -> Request {
        Request::new(
            Environ::new("POST", "/get_url")
                .content_type(content_type)
                .body_bytes(body),
        )
    }

    #[test]
    fn params_single_keys() {
        let req = get("akey=aval&bkey=bval");
        assert_eq!(req.params().len(), 2);
        assert_eq!(req.params()["akey"], ["aval"]);
        assert_eq!(req.params()["bkey"], ["bval"]);
    }

    #[test]
    fn params_repeated_key_accumulates_in_order() {
        let req = get("akey=aval&bkey=bval&akey=aval2&ckey=");
        assert_eq!(req.params()["akey"], ["aval", "aval2"]);
        assert_eq!(req.params()["bkey"], ["bval"]);
        assert!(!req.params().contains_key("ckey"));
        assert_eq!(req.query_param("akey"), Some("aval"));
    }

    #[test]
    fn params_bare_key_is_dropped() {
        let req = get("flag&akey=aval");
        assert!(!req.params().contains_key("flag"));
        assert_eq!(req.params().len(), 1);
    }

    #[test]
    fn params_percent_decoded() {
        let req = get("akey=%2F%23%3F%26&%2F%23%3F%26=bval");
        assert_eq!(req.params()["akey"], ["/#?&"]);
        assert_eq!(req.params()["/#?&"], ["bval"]);
    }

    #[test]
    fn params_empty_query() {
        assert!(get("").params().is_empty());
    }

    #[test]
    fn charset_defaults_to_utf8() {
        assert_eq!(get("").charset(), "UTF-8");
        assert_eq!(post("text/plain", Vec::new()).charset(), "UTF-8");
    }

    #[test]
    fn charset_parameter_is_extracted() {
        assert_eq!(post("text/plain; charset=EUC-JP", Vec::new()).charset(), "EUC-JP");
        assert_eq!(post("text/plain;charset=\"utf-8\"", Vec::new()).charset(), "utf-8");
        assert_eq!(
            post("text/plain; Charset=Shift_JIS; format=flowed", Vec::new()).charset(),
            "Shift_JIS"
        );
    }

    #[test]
    fn content_type_strips_parameters() {
        let req = post(" application/json ; charset=UTF-8", Vec::new());
        assert_eq!(req.content_type(), "application/json");
        assert_eq!(get("").content_type(), "");
    }

    #[test]
    fn body_is_read_once() {
        let reads = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let reader = CountingReader {
            data: Cursor::new(b"hello world".to_vec()),
            reads: reads.clone(),
        };
        let req = Request::new(Environ::new("POST", "/").body(5, reader));

        assert_eq!(req.body().unwrap().as_ref(), b"hello");
        let after_first = reads.load(std::sync::atomic::Ordering::SeqCst);
        assert_eq!(req.body().unwrap().as_ref(), b"hello");
        assert_eq!(req.text().unwrap(), "hello");
        assert_eq!(reads.load(std::sync::atomic::Ordering::SeqCst), after_first);
    }

    #[test]
    fn text_is_decoded_once() {
        let req = post("text/plain; charset=UTF-8", b"a%20b".to_vec());

        let first = req.text().unwrap();
        let second = req.text().unwrap();
        assert_eq!(first, "a b");
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn huge_declared_length_with_short_source() {
        let req = Request::new(Environ::new("POST", "/").body(1usize << 46, &b"abc"[..]));
        assert!(matches!(
            req.body(),
            Err(RequestError::IncompleteBody { received: 3, .. })
        ));
    }

    #[test]
    fn body_without_source_is_empty() {
        assert!(get("").body().unwrap().is_empty());
    }

    #[test]
    fn short_body_is_an_error() {
        let req = Request::new(Environ::new("POST", "/").body(10, Cursor::new(b"abc".to_vec())));
        assert!(matches!(
            req.body(),
            Err(RequestError::IncompleteBody {
                expected: 10,
                received: 3
            })
        ));
    }

    #[test]
    fn text_decodes_utf8() {
        let req = post("text/plain; charset=UTF-8", "あいうえお".as_bytes().to_vec());
        assert_eq!(req.text().unwrap(), "あいうえお");
    }

    #[test]
    fn text_decodes_euc_jp() {
        let (encoded, _, _) = encoding_rs::EUC_JP.encode("あいうえお");
        let req = post("text/plain; charset=EUC-JP", encoded.into_owned());
        assert_eq!(req.charset(), "EUC-JP");
        assert_eq!(req.text().unwrap(), "あいうえお");
    }

    #[test]
    fn text_without_charset_is_utf8() {
        let req = post("text/plain", "あいうえお".as_bytes().to_vec());
        assert_eq!(req.text().unwrap(), "あいうえお");
    }

    #[test]
    fn text_is_percent_decoded() {
        let req = post(
            "application/x-www-form-urlencoded",
            b"mytext=%E3%81%82%2F%26".to_vec(),
        );
        assert_eq!(req.text().unwrap(), "mytext=あ/&");
    }

    #[test]
    fn text_unknown_charset() {
        let req = post("text/plain; charset=no-such-thing", b"abc".to_vec());
        assert!(matches!(req.text(), Err(RequestError::UnknownCharset(c)) if c == "no-such-thing"));
    }

    #[test]
    fn text_invalid_bytes() {
        let req = post("text/plain; charset=UTF-8", vec![0xff, 0xfe, 0xfd]);
        assert!(matches!(req.text(), Err(RequestError::Decode { .. })));
    }

    #[test]
    fn path_params_absent_before_dispatch() {
        let req = get("");
        assert!(req.path_params().is_none());
        assert_eq!(req.path_param("id"), None);
    }
}
