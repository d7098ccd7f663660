//! Per-request context handed to middleware and handlers.

use crate::http::{FormData, Request};

/// Errors from decoding a request body.
#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    #[error("expected Content-Type {expected}, got {actual}")]
    WrongContentType {
        expected: &'static str,
        actual: String,
    },

    #[error("malformed JSON body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-request context: the parsed request plus body decoding helpers.
pub struct Context {
    request: Request,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self { request }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Decodes an `application/x-www-form-urlencoded` body.
    ///
    /// A body without a `Content-Type` is accepted as a form, since that is
    /// what minimal clients (and `curl -d`) send.
    pub fn form(&self) -> Result<FormData, BodyError> {
        match self.request.headers().mime_type() {
            None => Ok(FormData::from_bytes(self.request.body())),
            Some(mime) if mime == "application/x-www-form-urlencoded" => {
                Ok(FormData::from_bytes(self.request.body()))
            }
            Some(actual) => Err(BodyError::WrongContentType {
                expected: "application/x-www-form-urlencoded",
                actual,
            }),
        }
    }

    /// Deserializes a JSON body. An empty body decodes as `{}` so that
    /// payload types with all-default fields accept a bare POST.
    pub fn json<T>(&self) -> Result<T, BodyError>
    where
        T: serde::de::DeserializeOwned,
    {
        let body = self.request.body();
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::from_str("{}")?);
        }
        Ok(serde_json::from_slice(body)?)
    }
}
