//! Async client for the UNMS / UISP controller API.
//!
//! Only the slice of the API that flowpin needs:
//!
//! - **[`SessionManager`]**: token login and refresh-on-demand. Tokens are
//!   trusted for half of the lifetime requested from the controller.
//! - **[`DeviceController`]**: backup create / download / delete / upload /
//!   apply, device restart, and the readiness probe.
//! - **[`PublicIpClient`]**: current public IPv4 address from an echo service.
//! - **[`TransportConfig`]**: shared TLS and timeout settings.

pub mod controller;
pub mod endpoints;
pub mod error;
pub mod public_ip;
pub mod session;
pub mod transport;

pub use controller::DeviceController;
pub use endpoints::Endpoints;
pub use error::Error;
pub use public_ip::PublicIpClient;
pub use session::{Session, SessionManager, SessionSettings};
pub use transport::{TlsMode, TransportConfig};
