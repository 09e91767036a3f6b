//! Business logic for flowpin: everything between the HTTP client and the
//! CLI.
//!
//! - **[`Workflow`]**: one end-to-end run: public address lookup, DNS and
//!   controller readiness waits, backup, edit, re-upload, apply, reboot.
//! - **[`Poller`]**: deadline-bounded, cancellable probe loop.
//! - **[`ConfigDocument`]**: locates and rewrites the netflow collector
//!   address in an EdgeOS `config.boot`, leaving every other byte alone.
//! - **[`archive`]**: vetted `.tar.gz` unpacking and repacking.
//! - **[`WorkflowConfig`]**: runtime configuration, built by the CLI.

pub mod archive;
pub mod config;
pub mod dns;
pub mod editor;
pub mod error;
pub mod files;
pub mod poller;
pub mod workflow;

pub use archive::ExtractionDir;
pub use config::{
    ControllerConfig, PathsConfig, PublicIpConfig, TlsVerification, WaitConfig, WorkflowConfig,
};
pub use dns::{Resolve, SystemResolver};
pub use editor::{Change, ConfigDocument, EditError, NetflowServer};
pub use error::CoreError;
pub use poller::{PollOutcome, PollStatus, Poller, Probe};
pub use workflow::{Outcome, Stage, Workflow};

// Re-exported so the CLI does not need a direct dependency for these.
pub use flowpin_api::Endpoints;
pub use tokio_util::sync::CancellationToken;
