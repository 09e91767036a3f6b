// ── Core error types ──
//
// Workflow-level errors. Consumers never see reqwest or serde failures
// directly; the `From<flowpin_api::Error>` impl translates transport-layer
// errors into the variants the CLI knows how to explain.

use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    // ── Controller errors ────────────────────────────────────────────
    #[error("Controller rejected {operation}: {message}")]
    Controller { operation: String, message: String },

    #[error("Public address lookup returned {value:?}, not an IPv4 address")]
    InvalidAddress { value: String },

    // ── Backup content errors ────────────────────────────────────────
    #[error("Archive member {member:?} escapes the extraction directory")]
    PathTraversal { member: String },

    #[error("No netflow server setting found in {}", path.display())]
    SettingNotFound { path: PathBuf },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<flowpin_api::Error> for CoreError {
    fn from(err: flowpin_api::Error) -> Self {
        match err {
            flowpin_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            flowpin_api::Error::Transport(ref e) => {
                let url = e
                    .url()
                    .map_or_else(|| "<unknown>".into(), ToString::to_string);
                if e.is_timeout() || e.is_connect() {
                    CoreError::ConnectionFailed {
                        url,
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Controller {
                        operation: "request".into(),
                        message: format!("{e} ({url})"),
                    }
                }
            }
            flowpin_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            flowpin_api::Error::EndpointTemplate { template } => CoreError::Config {
                message: format!("endpoint template {template:?} has unresolved placeholders"),
            },
            flowpin_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            flowpin_api::Error::Controller { operation, message } => CoreError::Controller {
                operation: operation.into(),
                message,
            },
            flowpin_api::Error::InvalidAddress { value } => CoreError::InvalidAddress { value },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_controller_error_keeps_operation() {
        let err: CoreError = flowpin_api::Error::Controller {
            operation: "apply_backup",
            message: "HTTP 500".into(),
        }
        .into();
        assert!(matches!(
            err,
            CoreError::Controller { ref operation, .. } if operation == "apply_backup"
        ));
    }

    #[test]
    fn api_auth_error_maps_to_authentication_failed() {
        let err: CoreError = flowpin_api::Error::Authentication {
            message: "login failed".into(),
        }
        .into();
        assert!(matches!(err, CoreError::AuthenticationFailed { .. }));
    }
}
