//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use flowpin_config::ConfigError;
use flowpin_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const ARCHIVE: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
#[allow(unused_assignments)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to {url}")]
    #[diagnostic(
        code(flowpin::connection_failed),
        help(
            "Check that the controller and the public IP service are reachable.\n\
             Self-signed controller certificate? Try: flowpin run --insecure"
        )
    )]
    ConnectionFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(flowpin::auth_failed),
        help(
            "Verify the controller username and password.\n\
             Run: flowpin config set-password"
        )
    )]
    AuthFailed { message: String },

    #[error("No password found for '{account}'")]
    #[diagnostic(
        code(flowpin::no_credentials),
        help(
            "Store one with: flowpin config set-password\n\
             Or set FLOWPIN_PASSWORD, or controller.password_env in the config file."
        )
    )]
    NoCredentials { account: String },

    // ── Device config ────────────────────────────────────────────────
    #[error("No netflow server setting in {}", path.display())]
    #[diagnostic(
        code(flowpin::setting_not_found),
        help(
            "Expected `system {{ flow-accounting {{ netflow {{ server <ipv4> }} }} }}`.\n\
             Configure a collector on the router once by hand; flowpin only moves it."
        )
    )]
    SettingNotFound { path: PathBuf },

    #[error("Backup archive rejected: member {member:?} escapes the extraction directory")]
    #[diagnostic(
        code(flowpin::archive_rejected),
        help("The downloaded backup was not unpacked. Inspect it by hand before retrying.")
    )]
    ArchiveRejected { member: String },

    // ── Controller ───────────────────────────────────────────────────
    #[error("Controller rejected {operation}: {message}")]
    #[diagnostic(code(flowpin::controller))]
    Controller { operation: String, message: String },

    #[error("Public IP service returned {value:?}")]
    #[diagnostic(
        code(flowpin::public_ip),
        help("public_ip.url must answer with a bare IPv4 address.")
    )]
    InvalidAddress { value: String },

    // ── Validation / configuration ───────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(flowpin::validation))]
    Validation { field: String, reason: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(
        code(flowpin::config),
        help("Check the file printed by: flowpin config path")
    )]
    Config { message: String },

    #[error("Keyring error: {message}")]
    #[diagnostic(code(flowpin::keyring))]
    Keyring { message: String },

    // ── IO / internal ────────────────────────────────────────────────
    #[error("I/O error on {}", path.display())]
    #[diagnostic(code(flowpin::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal error: {0}")]
    #[diagnostic(code(flowpin::internal))]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::SettingNotFound { .. } => exit_code::NOT_FOUND,
            Self::ArchiveRejected { .. } => exit_code::ARCHIVE,
            Self::Validation { .. } | Self::Config { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed {
                url,
                source: reason.into(),
            },
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },
            CoreError::Controller { operation, message } => {
                CliError::Controller { operation, message }
            }
            CoreError::InvalidAddress { value } => CliError::InvalidAddress { value },
            CoreError::PathTraversal { member } => CliError::ArchiveRejected { member },
            CoreError::SettingNotFound { path } => CliError::SettingNotFound { path },
            CoreError::Io { path, source } => CliError::Io { path, source },
            CoreError::Config { message } => CliError::Config { message },
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { account } => CliError::NoCredentials { account },
            ConfigError::Keyring(e) => CliError::Keyring {
                message: e.to_string(),
            },
            other @ ConfigError::Figment(_) => CliError::Config {
                message: other.to_string(),
            },
        }
    }
}
