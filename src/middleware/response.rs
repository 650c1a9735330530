use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::json;

/// Write side of a single HTTP response.
///
/// Every responding method takes `self`, so a sink can answer a request once
/// and only once. The returned [`Sent`] token is the proof that it did.
#[derive(Debug)]
#[must_use = "a ResponseSink must be used to answer the request"]
pub struct ResponseSink {
    _private: (),
}

/// A finished response. Only a [`ResponseSink`] can produce one.
#[derive(Debug)]
#[must_use]
pub struct Sent(Response);

impl ResponseSink {
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Respond with a status code and an empty body
    pub fn status(self, status: StatusCode) -> Sent {
        Sent(status.into_response())
    }

    /// Respond with a status code and a JSON body
    pub fn json<T: Serialize + ?Sized>(self, status: StatusCode, body: &T) -> Sent {
        match serde_json::to_value(body) {
            Ok(value) => Sent((status, Json(value)).into_response()),
            Err(e) => {
                tracing::error!("Failed to serialize response data: {}", e);
                Sent(
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({
                            "error": true,
                            "message": "Failed to serialize response data",
                            "code": "INTERNAL_SERVER_ERROR"
                        })),
                    )
                        .into_response(),
                )
            }
        }
    }

    /// Respond with anything axum knows how to turn into a response
    pub fn respond(self, response: impl IntoResponse) -> Sent {
        Sent(response.into_response())
    }
}

impl Default for ResponseSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sent {
    pub fn status(&self) -> StatusCode {
        self.0.status()
    }

    pub fn into_inner(self) -> Response {
        self.0
    }
}

impl IntoResponse for Sent {
    fn into_response(self) -> Response {
        self.0
    }
}
