//! What a handler hands back to the dispatcher.

use serde::Serialize;
use serde_json::Value;

use super::Response;
use super::error::{HandlerError, HttpError};

/// The value a handler produced, before coercion into wire form.
///
/// Handlers pick the variant explicitly; coercion is an exhaustive match
/// over it (see [`coerce`](super::coerce)).
///
/// | Variant    | Status | Content-Type       | Charset          |
/// |------------|--------|--------------------|------------------|
/// | `Text`     | 200    | `text/html`        | request charset  |
/// | `Json`     | 200    | `application/json` | request charset  |
/// | `Response` | own    | own or `text/html` | own or `utf-8`   |
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// HTML or plain text used verbatim as the body. Empty for "no content".
    Text(String),
    /// Structured data serialized as a JSON body.
    Json(Value),
    /// A fully specified response.
    Response(Response),
}

impl Reply {
    /// Serializes any record into a [`Reply::Json`].
    ///
    /// # Errors
    ///
    /// Returns the serializer's error when `data` cannot be represented as JSON
    /// (for example a map with non-string keys).
    pub fn json<T: Serialize + ?Sized>(data: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(data).map(Self::Json)
    }
}

impl Default for Reply {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<()> for Reply {
    fn from((): ()) -> Self {
        Self::default()
    }
}

impl From<String> for Reply {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Reply {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Option<String>> for Reply {
    fn from(text: Option<String>) -> Self {
        Self::Text(text.unwrap_or_default())
    }
}

impl From<Value> for Reply {
    fn from(data: Value) -> Self {
        Self::Json(data)
    }
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}

/// Conversion from a handler's return type into the dispatcher's result.
///
/// Implemented for every type that converts into [`Reply`], and for
/// `Result<T, E>` where `T` does and `E` converts into [`HandlerError`], so
/// handlers can use `?` freely.
pub trait IntoReply {
    fn into_reply(self) -> Result<Reply, HandlerError>;
}

macro_rules! into_reply_via_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoReply for $ty {
                fn into_reply(self) -> Result<Reply, HandlerError> {
                    Ok(Reply::from(self))
                }
            }
        )*
    };
}

into_reply_via_from!(Reply, (), String, &str, Option<String>, Value, Response);

impl<T, E> IntoReply for Result<T, E>
where
    T: Into<Reply>,
    E: Into<HandlerError>,
{
    fn into_reply(self) -> Result<Reply, HandlerError> {
        self.map(Into::into).map_err(Into::into)
    }
}

impl IntoReply for HttpError {
    fn into_reply(self) -> Result<Reply, HandlerError> {
        Err(HandlerError::Http(self))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;
    use crate::http::StatusCode;

    #[test]
    fn unit_and_none_become_empty_text() {
        assert_eq!(().into_reply().unwrap(), Reply::Text(String::new()));
        assert_eq!(None::<String>.into_reply().unwrap(), Reply::Text(String::new()));
    }

    #[test]
    fn strings_become_text() {
        assert_eq!("hi".into_reply().unwrap(), Reply::Text("hi".to_owned()));
        assert_eq!(String::from("hi").into_reply().unwrap(), Reply::Text("hi".to_owned()));
    }

    #[test]
    fn json_from_record() {
        let mut data = BTreeMap::new();
        data.insert("a", vec![1, 2]);
        assert_eq!(Reply::json(&data).unwrap(), Reply::Json(json!({"a": [1, 2]})));
    }

    #[test]
    fn json_rejects_non_string_keys() {
        let mut data = BTreeMap::new();
        data.insert(vec![1], 1);
        assert!(Reply::json(&data).is_err());
    }

    #[test]
    fn result_errors_convert() {
        let ok: Result<&str, HttpError> = Ok("fine");
        assert_eq!(ok.into_reply().unwrap(), Reply::Text("fine".to_owned()));

        let err: Result<String, HttpError> = Err(HttpError::new(StatusCode::FORBIDDEN));
        let err = err.into_reply().unwrap_err();
        assert_eq!(err.as_http().map(HttpError::status), Some(StatusCode::FORBIDDEN));
    }

    #[test]
    fn http_error_returned_directly() {
        let err = HttpError::not_found().into_reply().unwrap_err();
        assert!(err.as_http().is_some());
    }
}
