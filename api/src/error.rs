use std::collections::HashMap;

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use serde_json::Value;

use crate::blog::{
    comment::{form::SubmitError, store::StorageError, validate::FieldErrors, validate::ValidationError},
    post::PostError,
};

/// An error caused by the request itself rather than by the server. The
/// message is shown to the visitor as-is.
pub trait ApiRequestError: std::error::Error {
    fn status_code(&self) -> StatusCode;

    fn code(&self) -> &'static str;

    /// Whether repeating the same request later may succeed.
    fn retryable(&self) -> bool {
        false
    }

    fn fields(&self) -> Option<FieldErrors> {
        None
    }
}

#[derive(Debug)]
pub enum ServerError {
    StorageError(StorageError),
}

impl Serialize for ServerError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        use serde::ser::SerializeMap;
        match self {
            ServerError::StorageError(e) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("message", &e.to_string())?;
                map.end()
            }
        }
    }
}

pub enum AppError {
    ServerError {
        error: ServerError,

        #[cfg(debug_assertions)]
        backtrace: Option<backtrace::Backtrace>,
    },
    RequestError(Box<dyn ApiRequestError + Send + Sync>),
    Unhandled(String, StatusCode),
}

#[derive(Serialize)]
struct ErrorResponse {
    code: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    retryable: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<FieldErrors>,

    #[cfg(debug_assertions)]
    #[serde(skip_serializing_if = "Option::is_none")]
    debug_info: Option<HashMap<&'static str, Value>>,
}

impl ErrorResponse {
    fn new(code: &str, error: impl Into<String>) -> Self {
        ErrorResponse {
            code: code.into(),
            error: Some(error.into()),
            retryable: false,
            fields: None,
            #[cfg(debug_assertions)]
            debug_info: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status_code, error_response) = match self {
            AppError::ServerError {
                error,
                #[cfg(debug_assertions)]
                backtrace,
            } => {
                tracing::error!(?error, "Server error while handling request");

                #[cfg(debug_assertions)]
                let response = {
                    let frames_info = backtrace.as_ref().map(filter_backtrace).unwrap_or_default();
                    ErrorResponse {
                        debug_info: Some(HashMap::from([
                            (
                                "backtrace",
                                serde_json::to_value(&frames_info).unwrap_or(Value::Null),
                            ),
                            ("error", serde_json::to_value(&error).unwrap_or(Value::Null)),
                        ])),
                        ..ErrorResponse::new("SERVER_ERR", "Internal server error")
                    }
                };

                #[cfg(not(debug_assertions))]
                let response = ErrorResponse::new("SERVER_ERR", "Internal server error");

                (StatusCode::INTERNAL_SERVER_ERROR, response)
            }
            AppError::RequestError(e) => (
                e.status_code(),
                ErrorResponse {
                    retryable: e.retryable(),
                    fields: e.fields(),
                    ..ErrorResponse::new(e.code(), e.to_string())
                },
            ),
            AppError::Unhandled(msg, status_code) => (status_code, ErrorResponse::new("ERR", msg)),
        };

        (status_code, Json(error_response)).into_response()
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::ServerError { error, .. } => f.debug_tuple("ServerError").field(error).finish(),
            AppError::RequestError(e) => f.debug_tuple("RequestError").field(&e.to_string()).finish(),
            AppError::Unhandled(msg, status) => {
                f.debug_tuple("Unhandled").field(msg).field(status).finish()
            }
        }
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        AppError::ServerError {
            error: ServerError::StorageError(e),

            #[cfg(debug_assertions)]
            backtrace: Some(backtrace::Backtrace::new()),
        }
    }
}

impl From<PostError> for AppError {
    fn from(e: PostError) -> Self {
        AppError::RequestError(Box::new(e))
    }
}

impl From<std::sync::Arc<PostError>> for AppError {
    fn from(e: std::sync::Arc<PostError>) -> Self {
        AppError::RequestError(Box::new(e))
    }
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::RequestError(Box::new(e))
    }
}

impl From<SubmitError> for AppError {
    fn from(e: SubmitError) -> Self {
        match e {
            SubmitError::Invalid(errors) => ValidationError::Fields(errors).into(),
            SubmitError::Storage(e) => e.into(),
        }
    }
}

impl From<&'static str> for AppError {
    fn from(e: &'static str) -> Self {
        AppError::Unhandled(e.into(), StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<(&'static str, StatusCode)> for AppError {
    fn from((e, status_code): (&'static str, StatusCode)) -> Self {
        AppError::Unhandled(e.into(), status_code)
    }
}

impl From<(String, StatusCode)> for AppError {
    fn from((e, status_code): (String, StatusCode)) -> Self {
        AppError::Unhandled(e, status_code)
    }
}

impl<E: ApiRequestError + ?Sized> ApiRequestError for std::sync::Arc<E> {
    fn status_code(&self) -> StatusCode {
        (**self).status_code()
    }

    fn code(&self) -> &'static str {
        (**self).code()
    }

    fn retryable(&self) -> bool {
        (**self).retryable()
    }

    fn fields(&self) -> Option<FieldErrors> {
        (**self).fields()
    }
}

#[cfg(debug_assertions)]
#[derive(Serialize, Debug)]
struct FrameInfo {
    name: String,
    loc: String,
}

#[cfg(debug_assertions)]
fn filter_backtrace(backtrace: &backtrace::Backtrace) -> Vec<FrameInfo> {
    const MODULE_PREFIX: &str = concat!(env!("CARGO_PKG_NAME"), "::");
    let mut frames_info: Vec<FrameInfo> = Vec::new();

    for frame in backtrace.frames() {
        for symbol in frame.symbols() {
            if let (Some(name), Some(filename), Some(lineno)) = (
                symbol.name().map(|n| n.to_string()),
                symbol.filename(),
                symbol.lineno(),
            ) {
                if name.contains(MODULE_PREFIX) {
                    frames_info.push(FrameInfo {
                        name,
                        loc: format!("{}:{}", filename.to_string_lossy(), lineno),
                    });
                }
            }
        }
    }

    frames_info
}
