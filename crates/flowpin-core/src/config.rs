// ── Runtime workflow configuration ──
//
// These types describe *what* to do on one run: which controller and
// device, where files live, and how long to wait. They carry credential
// data but never touch disk. The CLI builds a `WorkflowConfig` (through
// flowpin-config) and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use flowpin_api::Endpoints;
use flowpin_api::transport::{TlsMode, TransportConfig};

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed certs).
    DangerAcceptInvalid,
}

impl TlsVerification {
    pub(crate) fn transport(&self, timeout: Duration) -> TransportConfig {
        let tls = match self {
            Self::SystemDefaults => TlsMode::System,
            Self::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            Self::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        };
        TransportConfig { tls, timeout }
    }
}

/// How to reach and authenticate with the controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// API base URL, including the version prefix (`https://host/v2.1`).
    pub url: Url,
    pub username: String,
    pub password: SecretString,
    /// Response/request header carrying the session token.
    pub token_header: String,
    /// Lifetime requested at login.
    pub session_timeout: Duration,
    pub endpoints: Endpoints,
    pub tls: TlsVerification,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// Where to ask for our public address.
#[derive(Debug, Clone)]
pub struct PublicIpConfig {
    pub url: Url,
    pub endpoint: String,
}

/// Local file layout for the backup and its unpacked contents.
#[derive(Debug, Clone)]
pub struct PathsConfig {
    /// Local copy of the downloaded (and later rebuilt) backup archive.
    pub backup_file: PathBuf,
    /// Parent for the temporary extraction directory. System temp dir if unset.
    pub work_dir: Option<PathBuf>,
    /// Directory inside the archive that holds the device configuration.
    pub config_dir: PathBuf,
    /// Config file, relative to `config_dir`.
    pub config_file: PathBuf,
}

impl PathsConfig {
    /// Config file path relative to the extraction root.
    pub fn config_rel_path(&self) -> PathBuf {
        self.config_dir.join(&self.config_file)
    }
}

/// Readiness wait budgets. A zero timeout skips that wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitConfig {
    pub dns_timeout: Duration,
    pub controller_timeout: Duration,
    pub interval: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            dns_timeout: Duration::ZERO,
            controller_timeout: Duration::from_secs(300),
            interval: Duration::from_secs(10),
        }
    }
}

impl WaitConfig {
    /// Convert a signed seconds value from configuration; zero or negative
    /// disables the wait.
    pub fn timeout_from_secs(secs: i64) -> Duration {
        u64::try_from(secs).map_or(Duration::ZERO, Duration::from_secs)
    }
}

/// Everything one workflow run needs.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub device_id: String,
    /// Hostname that should resolve to our public address before we act.
    pub device_hostname: Option<String>,
    pub controller: ControllerConfig,
    pub public_ip: PublicIpConfig,
    pub paths: PathsConfig,
    pub wait: WaitConfig,
    /// Compute and log the edit, but upload nothing.
    pub dry_run: bool,
}
