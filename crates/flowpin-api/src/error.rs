use thiserror::Error;

/// Top-level error type for the `flowpin-api` crate.
///
/// Keeps the three failure families apart: the HTTP transport itself,
/// the login exchange, and a well-formed controller response that says
/// the requested operation did not happen. `flowpin-core` maps these into
/// workflow-level diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login exchange failed or produced no usable token.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// An endpoint template still has `{placeholders}` after rendering.
    #[error("Endpoint template {template:?} has unresolved placeholders")]
    EndpointTemplate { template: String },

    /// TLS set-up or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Controller ──────────────────────────────────────────────────
    /// The controller answered, but the operation failed: error status,
    /// missing field, or a field of the wrong type.
    #[error("Controller rejected {operation}: {message}")]
    Controller {
        operation: &'static str,
        message: String,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// The public IP lookup service returned something that is not an IPv4 address.
    #[error("Invalid IPv4 address from lookup service: {value:?}")]
    InvalidAddress { value: String },
}

impl Error {
    pub(crate) fn controller(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Controller {
            operation,
            message: message.into(),
        }
    }
}

/// First 200 characters of a response body, for error messages.
pub(crate) fn preview(body: &str) -> String {
    body.chars().take(200).collect()
}
