// Public address lookup
//
// Asks an IP echo service (ipify, icanhazip, ifconfig.me, ...) which IPv4
// address our requests come from. The service must answer with the bare
// dotted-quad as plain text.

use std::net::Ipv4Addr;

use tracing::debug;
use url::Url;

use crate::endpoints;
use crate::error::Error;
use crate::transport::TransportConfig;

pub struct PublicIpClient {
    http: reqwest::Client,
    url: Url,
}

impl PublicIpClient {
    pub fn new(base_url: &Url, endpoint: &str, transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self::with_client(
            transport.build_client()?,
            endpoints::join(base_url, endpoint)?,
        ))
    }

    /// Use a pre-built client and a complete lookup URL.
    pub fn with_client(http: reqwest::Client, url: Url) -> Self {
        Self { http, url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Current public IPv4 address.
    pub async fn current(&self) -> Result<Ipv4Addr, Error> {
        debug!(url = %self.url, "looking up public address");
        let body = self
            .http
            .get(self.url.clone())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let value = body.trim();
        let addr = value.parse::<Ipv4Addr>().map_err(|_| Error::InvalidAddress {
            value: value.to_owned(),
        })?;
        debug!(%addr, "public address resolved");
        Ok(addr)
    }
}
