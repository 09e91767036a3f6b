// Controller session management
//
// UNMS hands out an opaque token in a response header on login. The token
// is attached as a header on every later call. We keep it only for half of
// the lifetime we asked the controller for, so a request never goes out
// with a token that is about to die on the server side.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::header::HeaderName;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use crate::endpoints;
use crate::error::{Error, preview};

/// Default lifetime requested from the controller (one hour).
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(3600);

/// Default response header carrying the token.
pub const DEFAULT_TOKEN_HEADER: &str = "x-auth-token";

/// A token and the moment flowpin stops trusting it.
#[derive(Debug, Clone)]
pub struct Session {
    token: SecretString,
    expires_at: DateTime<Utc>,
}

impl Session {
    /// Build a session issued at `issued_at` for a server-declared `lifetime`.
    ///
    /// The session is treated as expired after half the lifetime.
    pub fn issued(
        token: SecretString,
        issued_at: DateTime<Utc>,
        lifetime: Duration,
    ) -> Result<Self, Error> {
        let half = TimeDelta::from_std(lifetime / 2).map_err(|_| Error::Authentication {
            message: format!("session lifetime {lifetime:?} is out of range"),
        })?;
        Ok(Self {
            token,
            expires_at: issued_at + half,
        })
    }

    pub fn token(&self) -> &SecretString {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// A session is expired from `expires_at` onwards.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Login settings that rarely change between deployments.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Login path relative to the API base.
    pub login_path: String,
    /// Response/request header carrying the token.
    pub token_header: String,
    /// Lifetime requested from the controller (`sessionTimeout`).
    pub session_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            login_path: endpoints::Endpoints::default().login,
            token_header: DEFAULT_TOKEN_HEADER.into(),
            session_timeout: DEFAULT_SESSION_TIMEOUT,
        }
    }
}

/// Owns the controller token and refreshes it on demand.
///
/// Every authenticated request goes through [`token()`](Self::token), which
/// checks the expiry on each call and logs in again when needed. Login
/// failures are returned as [`Error::Authentication`] and never retried
/// here; retry policy belongs to the caller.
pub struct SessionManager {
    http: reqwest::Client,
    base_url: Url,
    username: String,
    password: SecretString,
    token_header: HeaderName,
    login_path: String,
    session_timeout: Duration,
    session: Mutex<Option<Session>>,
}

impl SessionManager {
    pub fn new(
        http: reqwest::Client,
        base_url: Url,
        username: String,
        password: SecretString,
        settings: SessionSettings,
    ) -> Result<Self, Error> {
        let token_header =
            HeaderName::try_from(settings.token_header.as_str()).map_err(|e| {
                Error::Authentication {
                    message: format!("invalid token header {:?}: {e}", settings.token_header),
                }
            })?;
        Ok(Self {
            http,
            base_url,
            username,
            password,
            token_header,
            login_path: settings.login_path,
            session_timeout: settings.session_timeout,
            session: Mutex::new(None),
        })
    }

    /// The underlying HTTP client, shared with the endpoint modules.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// The controller API base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Header name used to send the token.
    pub fn token_header(&self) -> &HeaderName {
        &self.token_header
    }

    /// Expiry of the held session, if any.
    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.session.lock().await.as_ref().map(Session::expires_at)
    }

    /// Return a usable token, logging in first if none is held or the held
    /// one has expired.
    pub async fn token(&self) -> Result<SecretString, Error> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            if !session.is_expired_at(Utc::now()) {
                return Ok(session.token().clone());
            }
            debug!(expired_at = %session.expires_at(), "session expired, logging in again");
        }

        let session = self.login().await?;
        let token = session.token().clone();
        *guard = Some(session);
        Ok(token)
    }

    /// Forget the held session so the next call logs in again.
    ///
    /// Used when the controller rejects a token it issued (HTTP 401).
    pub async fn invalidate(&self) {
        if self.session.lock().await.take().is_some() {
            debug!("session invalidated");
        }
    }

    /// Perform the credential exchange.
    ///
    /// `POST {base}/user/login` with `username`, `password` and
    /// `sessionTimeout` (milliseconds). The token comes back in the
    /// configured response header.
    pub async fn login(&self) -> Result<Session, Error> {
        let url = endpoints::join(&self.base_url, &self.login_path)?;
        debug!(%url, username = %self.username, "logging in");

        let timeout_ms = u64::try_from(self.session_timeout.as_millis()).unwrap_or(u64::MAX);
        let body = json!({
            "username": self.username,
            "password": self.password.expose_secret(),
            "sessionTimeout": timeout_ms,
        });

        let issued_at = Utc::now();
        let resp = self
            .http
            .post(url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(%url, error = %e, "login request failed");
                Error::Authentication {
                    message: format!("login request to {url} failed: {e}"),
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Authentication {
                message: format!("login failed (HTTP {status}): {}", preview(&body)),
            });
        }

        let token = resp
            .headers()
            .get(&self.token_header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::Authentication {
                message: format!("login response carried no {} header", self.token_header),
            })?;

        let session = Session::issued(
            SecretString::from(token.to_owned()),
            issued_at,
            self.session_timeout,
        )?;
        debug!(expires_at = %session.expires_at(), "login successful");
        Ok(session)
    }
}
