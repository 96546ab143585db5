use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Errors a single webhook request can end in.
///
/// Every variant is request-local; none of them bring the server down.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("Missing secret")]
    MissingSecret,

    /// Unknown slug, placeholder secret or secret mismatch. Deliberately
    /// reported the same way as "not found".
    #[error("Source not found or secret mismatch")]
    Unauthenticated,

    #[error("Invalid JSON: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("Invalid payload, unknown body: {0}")]
    UnknownPayloadShape(String),

    #[error("Failed to send message: {0}")]
    Delivery(#[from] SinkError),

    #[error("Webhook bridge is disabled")]
    Disabled,
}

impl HookError {
    pub fn status(&self) -> StatusCode {
        match self {
            HookError::MissingSecret
            | HookError::InvalidPayload(_)
            | HookError::UnknownPayloadShape(_) => StatusCode::BAD_REQUEST,
            HookError::Unauthenticated => StatusCode::NOT_FOUND,
            HookError::Delivery(_) => StatusCode::INTERNAL_SERVER_ERROR,
            HookError::Disabled => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Message returned to the caller. Sink and parser internals stay in the logs.
    fn public_message(&self) -> &'static str {
        match self {
            HookError::MissingSecret => "Missing secret",
            HookError::Unauthenticated => "Source not found or secret mismatch",
            HookError::InvalidPayload(_) => "Invalid JSON",
            HookError::UnknownPayloadShape(_) => "Invalid payload, unknown body",
            HookError::Delivery(_) => "Failed to send message",
            HookError::Disabled => "Service Unavailable",
        }
    }
}

impl IntoResponse for HookError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.public_message() });
        (self.status(), Json(body)).into_response()
    }
}

/// Failure handing a rendered message to the notification host.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sink rejected message: status={status}, body={body}")]
    Rejected { status: u16, body: String },

    #[error("no notification sink configured")]
    NotConfigured,
}

/// Loading or validating the bridge configuration failed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// One diagnostic per offending entry.
    #[error("invalid configuration:\n{}", .0.join("\n"))]
    Invalid(Vec<String>),

    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
