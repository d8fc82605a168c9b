use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value, json};
use thiserror::Error;

/// Structured context attached to an error response.
pub type Details = Map<String, Value>;

#[derive(Debug, Error)]
pub enum TableportError {
    #[error("validation: {message}")]
    Validation { message: String, details: Details },

    #[error("config: {message}")]
    Configuration { message: String, details: Details },

    #[error("database: {message}")]
    Database { message: String, details: Details },

    #[error("result too large: more than {max_chunks} result chunks")]
    ResultTooLarge { max_chunks: usize },

    #[error("not found: {message}")]
    NotFound { message: String },

    #[error("volume: {message}")]
    Volume { message: String },

    #[error("connection: {message}")]
    Connection { message: String },

    #[error("query: {message}")]
    Query { message: String },

    #[error("timeout: query timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("auth: {message}")]
    Auth { message: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
}

impl TableportError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: Details::new(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            details: Details::new(),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            details: Details::new(),
        }
    }

    /// Attach a detail entry. Variants without a details map are returned unchanged.
    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        match &mut self {
            Self::Validation { details, .. }
            | Self::Configuration { details, .. }
            | Self::Database { details, .. } => {
                details.insert(key.to_string(), value.into());
            }
            _ => {}
        }
        self
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } | Self::Volume { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::ResultTooLarge { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to API clients, without the category prefix.
    pub fn message(&self) -> String {
        match self {
            Self::Validation { message, .. }
            | Self::Configuration { message, .. }
            | Self::Database { message, .. }
            | Self::NotFound { message }
            | Self::Volume { message } => message.clone(),
            Self::ResultTooLarge { max_chunks } => format!(
                "Result exceeds {max_chunks} chunks; narrow the query with a filter or a smaller limit"
            ),
            _ => "Internal server error".to_string(),
        }
    }

    pub fn details(&self) -> Details {
        match self {
            Self::Validation { details, .. }
            | Self::Configuration { details, .. }
            | Self::Database { details, .. } => details.clone(),
            Self::ResultTooLarge { max_chunks } => {
                let mut details = Details::new();
                details.insert("max_chunks".to_string(), json!(max_chunks));
                details
            }
            Self::NotFound { .. } | Self::Volume { .. } => Details::new(),
            other => {
                let mut details = Details::new();
                details.insert("type".to_string(), json!(other.kind()));
                details.insert("info".to_string(), json!(other.to_string()));
                details
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "ValidationError",
            Self::Configuration { .. } => "ConfigurationError",
            Self::Database { .. } => "DatabaseError",
            Self::ResultTooLarge { .. } => "ResultTooLargeError",
            Self::NotFound { .. } => "NotFoundError",
            Self::Volume { .. } => "VolumeError",
            Self::Connection { .. } => "ConnectionError",
            Self::Query { .. } => "QueryError",
            Self::Timeout { .. } => "TimeoutError",
            Self::Auth { .. } => "AuthError",
            Self::Io(_) => "IoError",
            Self::Http(_) => "HttpError",
        }
    }
}

impl IntoResponse for TableportError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, "request rejected");
        }
        let body = json!({
            "error": true,
            "message": self.message(),
            "details": self.details(),
        });
        (status, Json(body)).into_response()
    }
}
