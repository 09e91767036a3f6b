//! Configuration for flowpin.
//!
//! TOML file plus `FLOWPIN_*` environment overrides, credential resolution
//! (env, keyring, plaintext), and translation to
//! `flowpin_core::WorkflowConfig`. The CLI layers its own flags on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use flowpin_core::{
    ControllerConfig, Endpoints, PathsConfig, PublicIpConfig, TlsVerification, WaitConfig,
    WorkflowConfig,
};

/// Keyring service name; accounts are `<username>@<host>`.
pub const KEYRING_SERVICE: &str = "flowpin";
const ENV_PREFIX: &str = "FLOWPIN_";
const PASSWORD_ENV: &str = "FLOWPIN_PASSWORD";
const REDACTED: &str = "********";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no password found for '{account}'")]
    NoCredentials { account: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Controller device ID of the router to manage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    /// Public DNS name of the router. Enables the DNS wait.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_hostname: Option<String>,

    #[serde(default)]
    pub dry_run: bool,

    #[serde(default)]
    pub controller: ControllerSection,

    #[serde(default)]
    pub public_ip: PublicIpSection,

    #[serde(default)]
    pub paths: PathsSection,

    #[serde(default)]
    pub wait: WaitSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ControllerSection {
    /// API base URL including the version prefix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Plaintext password (prefer the keyring or an env var).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Name of an environment variable holding the password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    pub token_header: String,

    /// Session lifetime requested at login, in seconds.
    pub session_timeout: u64,

    /// Skip certificate verification.
    pub insecure: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,

    /// Per-request timeout, in seconds.
    pub timeout: u64,

    pub endpoints: Endpoints,
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            url: None,
            username: None,
            password: None,
            password_env: None,
            token_header: "x-auth-token".into(),
            session_timeout: 3600,
            insecure: false,
            ca_cert: None,
            timeout: 30,
            endpoints: Endpoints::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PublicIpSection {
    pub url: String,
    pub endpoint: String,
}

impl Default for PublicIpSection {
    fn default() -> Self {
        Self {
            url: "https://api.ipify.org".into(),
            endpoint: "/".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsSection {
    /// Local backup archive. Defaults to the platform cache dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_file: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,

    pub config_dir: PathBuf,
    pub config_file: PathBuf,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            backup_file: None,
            work_dir: None,
            config_dir: "config".into(),
            config_file: "config.boot".into(),
        }
    }
}

/// Wait budgets in seconds. Zero or negative timeouts skip the wait.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct WaitSection {
    pub dns_timeout: i64,
    pub controller_timeout: i64,
    pub interval: u64,
}

impl Default for WaitSection {
    fn default() -> Self {
        Self {
            dns_timeout: 0,
            controller_timeout: 300,
            interval: 10,
        }
    }
}

impl Config {
    /// Copy with every secret masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.controller.password.is_some() {
            copy.controller.password = Some(REDACTED.into());
        }
        copy
    }
}

// ── Config file path ────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("net", "flowpin", "flowpin")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("flowpin");
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn default_backup_file(device_id: &str) -> PathBuf {
    let name = format!("{device_id}.tar.gz");
    project_dirs().map_or_else(
        || std::env::temp_dir().join("flowpin").join(&name),
        |dirs| dirs.cache_dir().join("backups").join(&name),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Layered sources: defaults, then the TOML file, then `FLOWPIN_*`
/// variables (`__` separates nested keys, e.g. `FLOWPIN_WAIT__INTERVAL`).
pub fn sources(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load from `path`, or the canonical path when `None`.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    debug!(path = %path.display(), exists = path.exists(), "loading config");
    Ok(sources(&path).extract()?)
}

// ── Credential resolution ───────────────────────────────────────────

/// Keyring account for a controller login: `<username>@<host>`.
pub fn keyring_account(username: &str, controller_url: &str) -> String {
    let host = Url::parse(controller_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .unwrap_or_else(|| controller_url.to_owned());
    format!("{username}@{host}")
}

fn keyring_lookup(account: &str) -> Option<String> {
    keyring::Entry::new(KEYRING_SERVICE, account)
        .and_then(|entry| entry.get_password())
        .ok()
}

/// Store a controller password in the system keyring.
pub fn store_password(account: &str, password: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, account)?.set_password(password)?;
    Ok(())
}

/// Resolve the controller password: `password_env`, then
/// `FLOWPIN_PASSWORD`, then the keyring, then plaintext config.
pub fn resolve_password(section: &ControllerSection) -> Result<SecretString, ConfigError> {
    resolve_password_with(section, |name| std::env::var(name).ok(), keyring_lookup)
}

fn resolve_password_with(
    section: &ControllerSection,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    // 1. Configured env var
    if let Some(pw) = section.password_env.as_deref().and_then(&env) {
        return Ok(SecretString::from(pw));
    }

    // 2. Well-known env var
    if let Some(pw) = env(PASSWORD_ENV) {
        return Ok(SecretString::from(pw));
    }

    // 3. Keyring
    let account = keyring_account(
        section.username.as_deref().unwrap_or_default(),
        section.url.as_deref().unwrap_or_default(),
    );
    if let Some(pw) = keyring(&account) {
        return Ok(SecretString::from(pw));
    }

    // 4. Plaintext in config
    if let Some(ref pw) = section.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials { account })
}

// ── Translation ─────────────────────────────────────────────────────

fn parse_url(field: &str, value: &str) -> Result<Url, ConfigError> {
    value
        .parse()
        .map_err(|e| invalid(field, format!("invalid URL {value:?}: {e}")))
}

/// Build the runtime `WorkflowConfig`. The password is resolved only once
/// the rest of the config has validated.
pub fn to_workflow_config(cfg: &Config) -> Result<WorkflowConfig, ConfigError> {
    build_workflow_config(cfg, || resolve_password(&cfg.controller))
}

fn build_workflow_config(
    cfg: &Config,
    password: impl FnOnce() -> Result<SecretString, ConfigError>,
) -> Result<WorkflowConfig, ConfigError> {
    let device_id = cfg
        .device_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| invalid("device_id", "must be set"))?;

    let section = &cfg.controller;
    let url = parse_url(
        "controller.url",
        section
            .url
            .as_deref()
            .ok_or_else(|| invalid("controller.url", "must be set"))?,
    )?;
    let username = section
        .username
        .clone()
        .ok_or_else(|| invalid("controller.username", "must be set"))?;

    let tls = if section.insecure {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = section.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    if cfg.wait.interval == 0 {
        return Err(invalid("wait.interval", "must be at least one second"));
    }
    let public_ip_url = parse_url("public_ip.url", &cfg.public_ip.url)?;
    let password = password()?;

    Ok(WorkflowConfig {
        controller: ControllerConfig {
            url,
            username,
            password,
            token_header: section.token_header.clone(),
            session_timeout: Duration::from_secs(section.session_timeout),
            endpoints: section.endpoints.clone(),
            tls,
            timeout: Duration::from_secs(section.timeout),
        },
        public_ip: PublicIpConfig {
            url: public_ip_url,
            endpoint: cfg.public_ip.endpoint.clone(),
        },
        paths: PathsConfig {
            backup_file: cfg
                .paths
                .backup_file
                .clone()
                .unwrap_or_else(|| default_backup_file(&device_id)),
            work_dir: cfg.paths.work_dir.clone(),
            config_dir: cfg.paths.config_dir.clone(),
            config_file: cfg.paths.config_file.clone(),
        },
        wait: WaitConfig {
            dns_timeout: WaitConfig::timeout_from_secs(cfg.wait.dns_timeout),
            controller_timeout: WaitConfig::timeout_from_secs(cfg.wait.controller_timeout),
            interval: Duration::from_secs(cfg.wait.interval),
        },
        device_hostname: cfg.device_hostname.clone().filter(|h| !h.is_empty()),
        dry_run: cfg.dry_run,
        device_id,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    const SAMPLE: &str = r#"
device_id = "dev-1"
device_hostname = "edge.example.net"

[controller]
url = "https://unms.example.net/v2.1"
username = "admin"
password = "plain"
insecure = true

[controller.endpoints]
reboot = "/devices/{device_id}/reboot"

[wait]
dns_timeout = -1
controller_timeout = 120
"#;

    fn load(text: &str) -> Config {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, text).unwrap();
        load_config(Some(&path)).unwrap()
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(cfg.wait, WaitSection::default());
        assert_eq!(cfg.controller.token_header, "x-auth-token");
    }

    #[test]
    fn file_values_override_defaults() {
        let cfg = load(SAMPLE);
        assert_eq!(cfg.device_id.as_deref(), Some("dev-1"));
        assert!(cfg.controller.insecure);
        assert_eq!(cfg.controller.endpoints.reboot, "/devices/{device_id}/reboot");
        // Untouched endpoints keep their defaults.
        assert_eq!(cfg.controller.endpoints.login, "/user/login");
        assert_eq!(cfg.wait.interval, 10);
    }

    #[test]
    fn translates_to_workflow_config() {
        let cfg = load(SAMPLE);
        let wf = build_workflow_config(&cfg, || Ok(SecretString::from("pw".to_owned()))).unwrap();

        assert_eq!(wf.device_id, "dev-1");
        assert_eq!(wf.controller.url.as_str(), "https://unms.example.net/v2.1");
        assert_eq!(wf.controller.tls, TlsVerification::DangerAcceptInvalid);
        assert_eq!(wf.wait.dns_timeout, Duration::ZERO);
        assert_eq!(wf.wait.controller_timeout, Duration::from_secs(120));
        assert!(wf.paths.backup_file.ends_with("dev-1.tar.gz"));
        assert_eq!(wf.device_hostname.as_deref(), Some("edge.example.net"));
    }

    #[test]
    fn missing_device_id_is_a_validation_error() {
        let cfg = load("[controller]\nurl = \"https://h/v2.1\"\nusername = \"u\"\n");
        let err = build_workflow_config(&cfg, || panic!("password resolved before validation")).unwrap_err();
        assert!(
            matches!(err, ConfigError::Validation { ref field, .. } if field == "device_id"),
            "got {err:?}"
        );
    }

    #[test]
    fn bad_controller_url_is_rejected() {
        let cfg = load("device_id = \"d\"\n[controller]\nurl = \"not a url\"\nusername = \"u\"\n");
        let err = build_workflow_config(&cfg, || panic!("password resolved before validation")).unwrap_err();
        assert!(
            matches!(err, ConfigError::Validation { ref field, .. } if field == "controller.url"),
            "got {err:?}"
        );
    }

    #[test]
    fn password_chain_order() {
        let section = ControllerSection {
            url: Some("https://unms.example.net/v2.1".into()),
            username: Some("admin".into()),
            password: Some("plain".into()),
            password_env: Some("MY_PW".into()),
            ..ControllerSection::default()
        };
        let no_keyring = |_: &str| None;

        let env_all = |name: &str| match name {
            "MY_PW" => Some("from-custom-env".to_owned()),
            PASSWORD_ENV => Some("from-env".to_owned()),
            _ => None,
        };
        let pw = resolve_password_with(&section, env_all, no_keyring).unwrap();
        assert_eq!(pw.expose_secret(), "from-custom-env");

        let env_default = |name: &str| (name == PASSWORD_ENV).then(|| "from-env".to_owned());
        let pw = resolve_password_with(&section, env_default, no_keyring).unwrap();
        assert_eq!(pw.expose_secret(), "from-env");

        let keyring = |account: &str| {
            (account == "admin@unms.example.net").then(|| "from-keyring".to_owned())
        };
        let pw = resolve_password_with(&section, |_| None, keyring).unwrap();
        assert_eq!(pw.expose_secret(), "from-keyring");

        let pw = resolve_password_with(&section, |_| None, no_keyring).unwrap();
        assert_eq!(pw.expose_secret(), "plain");
    }

    #[test]
    fn no_password_anywhere_names_the_account() {
        let section = ControllerSection {
            url: Some("https://unms.example.net".into()),
            username: Some("admin".into()),
            ..ControllerSection::default()
        };
        let err = resolve_password_with(&section, |_| None, |_| None).unwrap_err();
        assert!(
            matches!(err, ConfigError::NoCredentials { ref account } if account == "admin@unms.example.net"),
            "got {err:?}"
        );
    }

    #[test]
    fn redacted_masks_password() {
        let cfg = load(SAMPLE).redacted();
        assert_eq!(cfg.controller.password.as_deref(), Some(REDACTED));
    }
}
