// Controller endpoint templates
//
// Paths are relative to the controller API base (e.g.
// `https://unms.example.net/v2.1`) and may carry `{device_id}` and
// `{backup_id}` placeholders. Every path is configurable because UNMS and
// UISP releases have moved endpoints around between API versions.

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;

/// Bytes escaped in a single path segment: the URL path set plus `/` and `%`.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Path templates for every controller call flowpin makes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    /// `POST`: credential exchange.
    pub login: String,
    /// `GET`: device detail, used as the readiness probe.
    pub device: String,
    /// `POST`: create a new backup on the controller.
    pub create_backup: String,
    /// `GET` / `DELETE`: a single stored backup.
    pub backup: String,
    /// `POST` (multipart): upload a backup archive.
    pub upload_backup: String,
    /// `POST`: push a stored backup onto the device.
    pub apply_backup: String,
    /// `POST`: restart the device.
    pub reboot: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login: "/user/login".into(),
            device: "/devices/{device_id}".into(),
            create_backup: "/devices/{device_id}/backups".into(),
            backup: "/devices/{device_id}/backups/{backup_id}".into(),
            upload_backup: "/devices/{device_id}/backups/upload".into(),
            apply_backup: "/devices/{device_id}/backups/{backup_id}/apply".into(),
            reboot: "/devices/{device_id}/restart".into(),
        }
    }
}

/// Substitute `{name}` placeholders with percent-encoded path segments.
///
/// Fails if any placeholder is left over, so a typo in a configured
/// template never reaches the controller.
pub fn render(template: &str, params: &[(&str, &str)]) -> Result<String, Error> {
    let mut path = template.to_owned();
    for (name, value) in params {
        let encoded = utf8_percent_encode(value, SEGMENT).to_string();
        path = path.replace(&format!("{{{name}}}"), &encoded);
    }
    if path.contains('{') || path.contains('}') {
        return Err(Error::EndpointTemplate {
            template: template.to_owned(),
        });
    }
    Ok(path)
}

/// Append an API path to a base URL, keeping the base's own path.
///
/// `Url::join` would drop the `/v2.1` suffix of a base like
/// `https://host/v2.1` when the path starts with `/`.
pub fn join(base: &Url, path: &str) -> Result<Url, Error> {
    let base = base.as_str().trim_end_matches('/');
    let path = path.trim_start_matches('/');
    Ok(Url::parse(&format!("{base}/{path}"))?)
}
