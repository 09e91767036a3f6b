// Device operations on the controller
//
// Every call follows the same path: render the endpoint template, fetch a
// token from the session, send the request with the token header, check
// the status, then pull the one documented field out of the JSON body.

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::endpoints::{self, Endpoints};
use crate::error::{Error, preview};
use crate::session::SessionManager;

/// `{"id": "..."}`: returned by create and upload.
#[derive(Debug, Deserialize)]
struct BackupCreated {
    id: String,
}

/// `{"result": true}`: returned by delete, apply and restart.
#[derive(Debug, Deserialize)]
struct OperationResult {
    result: bool,
}

/// Domain operations for one controller, built on a [`SessionManager`].
pub struct DeviceController {
    session: SessionManager,
    endpoints: Endpoints,
}

impl DeviceController {
    pub fn new(session: SessionManager, endpoints: Endpoints) -> Self {
        Self { session, endpoints }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    // ── Backups ──────────────────────────────────────────────────────

    /// Ask the controller to take a fresh backup of the device.
    ///
    /// `POST /devices/{device_id}/backups` → `{"id": ...}`
    pub async fn create_backup(&self, device_id: &str) -> Result<String, Error> {
        const OP: &str = "create_backup";
        let url = self.url(
            OP,
            &self.endpoints.create_backup,
            &[("device_id", device_id)],
        )?;
        debug!(device_id, "creating backup");
        let req = self.authorized(Method::POST, url).await?;
        let resp = self.execute(OP, device_id, req).await?;
        let created: BackupCreated = parse_json(OP, resp).await?;
        debug!(device_id, backup_id = %created.id, "backup created");
        Ok(created.id)
    }

    /// Download a stored backup archive.
    ///
    /// `GET /devices/{device_id}/backups/{backup_id}?replaceUnmsKey=false`
    pub async fn get_backup(&self, device_id: &str, backup_id: &str) -> Result<Vec<u8>, Error> {
        const OP: &str = "get_backup";
        let url = self.url(
            OP,
            &self.endpoints.backup,
            &[("device_id", device_id), ("backup_id", backup_id)],
        )?;
        debug!(device_id, backup_id, "downloading backup");
        let req = self
            .authorized(Method::GET, url)
            .await?
            .query(&[("replaceUnmsKey", "false")]);
        let resp = self.execute(OP, device_id, req).await?;
        let bytes = resp.bytes().await?;
        if bytes.is_empty() {
            return Err(Error::controller(OP, "backup download was empty"));
        }
        debug!(device_id, backup_id, size = bytes.len(), "backup downloaded");
        Ok(bytes.to_vec())
    }

    /// Remove a stored backup from the controller.
    ///
    /// `DELETE /devices/{device_id}/backups/{backup_id}` → `{"result": bool}`
    pub async fn delete_backup(&self, device_id: &str, backup_id: &str) -> Result<bool, Error> {
        const OP: &str = "delete_backup";
        let url = self.url(
            OP,
            &self.endpoints.backup,
            &[("device_id", device_id), ("backup_id", backup_id)],
        )?;
        debug!(device_id, backup_id, "deleting backup");
        let req = self.authorized(Method::DELETE, url).await?;
        let resp = self.execute(OP, device_id, req).await?;
        let outcome: OperationResult = parse_json(OP, resp).await?;
        Ok(outcome.result)
    }

    /// Upload a backup archive; the controller assigns it a new id.
    ///
    /// `POST /devices/{device_id}/backups/upload` (multipart `file`) → `{"id": ...}`
    pub async fn upload_backup(&self, device_id: &str, archive: Vec<u8>) -> Result<String, Error> {
        const OP: &str = "upload_backup";
        let url = self.url(
            OP,
            &self.endpoints.upload_backup,
            &[("device_id", device_id)],
        )?;
        debug!(device_id, size = archive.len(), "uploading backup");
        let part = reqwest::multipart::Part::bytes(archive)
            .file_name(format!("{device_id}.tar.gz"))
            .mime_str("application/gzip")?;
        let form = reqwest::multipart::Form::new().part("file", part);
        let req = self.authorized(Method::POST, url).await?.multipart(form);
        let resp = self.execute(OP, device_id, req).await?;
        let created: BackupCreated = parse_json(OP, resp).await?;
        debug!(device_id, backup_id = %created.id, "backup uploaded");
        Ok(created.id)
    }

    /// Push a stored backup onto the device.
    ///
    /// `POST /devices/{device_id}/backups/{backup_id}/apply` → `{"result": bool}`
    pub async fn apply_backup(&self, device_id: &str, backup_id: &str) -> Result<bool, Error> {
        const OP: &str = "apply_backup";
        let url = self.url(
            OP,
            &self.endpoints.apply_backup,
            &[("device_id", device_id), ("backup_id", backup_id)],
        )?;
        debug!(device_id, backup_id, "applying backup");
        let req = self.authorized(Method::POST, url).await?;
        let resp = self.execute(OP, device_id, req).await?;
        let outcome: OperationResult = parse_json(OP, resp).await?;
        Ok(outcome.result)
    }

    // ── Device ───────────────────────────────────────────────────────

    /// Restart the device.
    ///
    /// `POST /devices/{device_id}/restart` → `{"result": bool}`
    pub async fn reboot_device(&self, device_id: &str) -> Result<bool, Error> {
        const OP: &str = "reboot_device";
        let url = self.url(OP, &self.endpoints.reboot, &[("device_id", device_id)])?;
        debug!(device_id, "rebooting device");
        let req = self.authorized(Method::POST, url).await?;
        let resp = self.execute(OP, device_id, req).await?;
        let outcome: OperationResult = parse_json(OP, resp).await?;
        Ok(outcome.result)
    }

    /// Readiness probe: `true` once `GET /devices/{device_id}` answers 200.
    ///
    /// Any other status and any connectivity failure mean "not yet". Only
    /// a failure to obtain a token is returned as an error.
    pub async fn check_ready(&self, device_id: &str) -> Result<bool, Error> {
        const OP: &str = "check_ready";
        let url = self.url(OP, &self.endpoints.device, &[("device_id", device_id)])?;
        let req = self.authorized(Method::GET, url).await?;
        match req.send().await {
            Ok(resp) if resp.status() == StatusCode::OK => Ok(true),
            Ok(resp) => {
                if resp.status() == StatusCode::UNAUTHORIZED {
                    self.session.invalidate().await;
                }
                debug!(device_id, status = %resp.status(), "controller not ready");
                Ok(false)
            }
            Err(e) => {
                debug!(device_id, error = %e, "controller unreachable");
                Ok(false)
            }
        }
    }

    // ── Request helpers ──────────────────────────────────────────────

    fn url(
        &self,
        operation: &'static str,
        template: &str,
        params: &[(&str, &str)],
    ) -> Result<Url, Error> {
        let path = endpoints::render(template, params).inspect_err(|e| {
            warn!(operation, error = %e, "bad endpoint template");
        })?;
        endpoints::join(self.session.base_url(), &path)
    }

    /// Start a request with a fresh (or still valid) token attached.
    async fn authorized(&self, method: Method, url: Url) -> Result<RequestBuilder, Error> {
        let token = self.session.token().await?;
        Ok(self
            .session
            .http()
            .request(method, url)
            .header(self.session.token_header(), token.expose_secret()))
    }

    /// Send the request and turn HTTP failures into typed errors.
    async fn execute(
        &self,
        operation: &'static str,
        device_id: &str,
        req: RequestBuilder,
    ) -> Result<Response, Error> {
        let resp = req.send().await.map_err(|e| {
            warn!(
                operation,
                device_id,
                url = ?e.url().map(Url::as_str),
                error = %e,
                "request failed"
            );
            Error::Transport(e)
        })?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            self.session.invalidate().await;
            warn!(operation, device_id, url = %resp.url(), "token rejected by controller");
            return Err(Error::Authentication {
                message: format!("{operation}: token rejected (HTTP 401)"),
            });
        }

        if !status.is_success() {
            let url = resp.url().clone();
            let body = resp.text().await.unwrap_or_default();
            warn!(operation, device_id, %url, %status, "controller returned an error");
            return Err(Error::controller(
                operation,
                format!("HTTP {status}: {}", preview(&body)),
            ));
        }

        Ok(resp)
    }
}

/// Parse a JSON body into `T`, treating a missing or mistyped field as a
/// controller-side failure.
async fn parse_json<T: DeserializeOwned>(
    operation: &'static str,
    resp: Response,
) -> Result<T, Error> {
    let body = resp.text().await?;
    serde_json::from_str(&body).map_err(|e| {
        Error::controller(
            operation,
            format!("unexpected response ({e}): {}", preview(&body)),
        )
    })
}
