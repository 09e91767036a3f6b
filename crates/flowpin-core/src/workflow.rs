// ── Workflow orchestration ──
//
// One run, start to finish: find our public address, wait for DNS and the
// controller, pull a fresh backup, point the netflow collector at the new
// address, push the backup back and restart the device.

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use flowpin_api::transport::{TlsMode, TransportConfig};
use flowpin_api::{DeviceController, PublicIpClient, SessionManager, SessionSettings};

use crate::archive::{self, ExtractionDir};
use crate::config::WorkflowConfig;
use crate::dns::{Resolve, SystemResolver};
use crate::editor::{Change, ConfigDocument};
use crate::error::CoreError;
use crate::files;
use crate::poller::{PollOutcome, PollStatus, Poller, Probe};

/// Where the run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Stage {
    Idle,
    WaitDns,
    WaitController,
    BackingUp,
    Editing,
    NoChange,
    Reapplying,
    Rebooting,
    Done,
    Failed,
}

/// How a run that did not fail ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A readiness wait timed out or was cancelled; nothing was touched.
    NotReady { stage: Stage, status: PollStatus },
    /// The device already points at the current address.
    Unchanged { address: Ipv4Addr },
    /// The edit was computed but not uploaded.
    DryRun {
        previous: Ipv4Addr,
        current: Ipv4Addr,
    },
    /// The edited backup was uploaded. `applied` and `rebooted` report
    /// whether the controller accepted those follow-up requests.
    Updated {
        previous: Ipv4Addr,
        current: Ipv4Addr,
        applied: bool,
        rebooted: bool,
    },
}

/// Drives a single run against one device.
pub struct Workflow<R = SystemResolver> {
    config: WorkflowConfig,
    controller: DeviceController,
    public_ip: PublicIpClient,
    resolver: R,
    cancel: CancellationToken,
    stage: Stage,
}

impl Workflow<SystemResolver> {
    pub fn new(config: WorkflowConfig) -> Result<Self, CoreError> {
        let settings = &config.controller;
        let http = settings
            .tls
            .transport(settings.timeout)
            .build_client()?;
        let session = SessionManager::new(
            http,
            settings.url.clone(),
            settings.username.clone(),
            settings.password.clone(),
            SessionSettings {
                login_path: settings.endpoints.login.clone(),
                token_header: settings.token_header.clone(),
                session_timeout: settings.session_timeout,
            },
        )?;
        let controller = DeviceController::new(session, settings.endpoints.clone());

        let public_ip = PublicIpClient::new(
            &config.public_ip.url,
            &config.public_ip.endpoint,
            &TransportConfig {
                tls: TlsMode::System,
                timeout: settings.timeout,
            },
        )?;

        Ok(Self {
            config,
            controller,
            public_ip,
            resolver: SystemResolver,
            cancel: CancellationToken::new(),
            stage: Stage::Idle,
        })
    }
}

impl<R: Resolve> Workflow<R> {
    /// Swap the resolver used for the DNS wait.
    pub fn with_resolver<R2: Resolve>(self, resolver: R2) -> Workflow<R2> {
        Workflow {
            config: self.config,
            controller: self.controller,
            public_ip: self.public_ip,
            resolver,
            cancel: self.cancel,
            stage: self.stage,
        }
    }

    /// Token that ends any readiness wait in progress.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Run to completion.
    pub async fn run(&mut self) -> Result<Outcome, CoreError> {
        let result = self.drive().await;
        if let Err(ref e) = result {
            error!(stage = %self.stage, error = %e, "run failed");
            self.enter(Stage::Failed);
        }
        result
    }

    fn enter(&mut self, stage: Stage) {
        info!(device_id = %self.config.device_id, stage = %stage, "entering stage");
        self.stage = stage;
    }

    async fn drive(&mut self) -> Result<Outcome, CoreError> {
        let device_id = self.config.device_id.clone();

        let public = self.public_ip.current().await?;
        info!(address = %public, "current public address");

        self.enter(Stage::WaitDns);
        let dns = self.wait_dns(public).await;
        if !dns.status.may_proceed() {
            return Ok(Outcome::NotReady {
                stage: Stage::WaitDns,
                status: dns.status,
            });
        }

        self.enter(Stage::WaitController);
        let ready = self.wait_controller(&device_id).await;
        if !ready.status.may_proceed() {
            return Ok(Outcome::NotReady {
                stage: Stage::WaitController,
                status: ready.status,
            });
        }

        self.enter(Stage::BackingUp);
        let extraction = self.fetch_backup(&device_id).await?;

        self.enter(Stage::Editing);
        let config_path = extraction.path().join(self.config.paths.config_rel_path());
        let mut document = ConfigDocument::load(&config_path)?;
        let change = document
            .set_value(public)
            .map_err(|_| CoreError::SettingNotFound {
                path: self.config.paths.config_rel_path(),
            })?;
        let previous = match change {
            Change::Unchanged => {
                self.enter(Stage::NoChange);
                info!(address = %public, "netflow collector already up to date");
                self.enter(Stage::Done);
                return Ok(Outcome::Unchanged { address: public });
            }
            Change::Rewritten { previous } => previous,
        };
        info!(from = %previous, to = %public, "netflow collector address rewritten");

        if self.config.dry_run {
            info!("dry run: leaving the controller untouched");
            self.enter(Stage::Done);
            return Ok(Outcome::DryRun {
                previous,
                current: public,
            });
        }

        self.enter(Stage::Reapplying);
        document.save(&config_path)?;
        let backup_file = self.config.paths.backup_file.clone();
        {
            let source = extraction.path().join(&self.config.paths.config_dir);
            let arcname = self.config.paths.config_dir.clone();
            let dest = backup_file.clone();
            blocking(move || archive::pack_as(&source, &arcname, &dest)).await?;
        }
        drop(extraction);

        let bytes = tokio::fs::read(&backup_file)
            .await
            .map_err(|e| CoreError::io(&backup_file, e))?;
        let uploaded = self.controller.upload_backup(&device_id, bytes).await?;
        info!(device_id = %device_id, backup_id = %uploaded, "backup uploaded");

        let applied = best_effort(
            "apply_backup",
            self.controller.apply_backup(&device_id, &uploaded),
        )
        .await?;

        self.enter(Stage::Rebooting);
        let rebooted =
            best_effort("reboot_device", self.controller.reboot_device(&device_id)).await?;

        self.enter(Stage::Done);
        Ok(Outcome::Updated {
            previous,
            current: public,
            applied,
            rebooted,
        })
    }

    async fn wait_dns(&self, public: Ipv4Addr) -> PollOutcome {
        let Some(host) = self.config.device_hostname.as_deref() else {
            debug!("no device hostname configured, skipping DNS wait");
            return PollOutcome::skipped();
        };
        let poller = Poller::new(
            self.config.wait.dns_timeout,
            self.config.wait.interval,
            self.cancel.clone(),
        );
        let resolver = &self.resolver;
        poller
            .run("dns", move || async move {
                let addrs = resolver.resolve(host).await?;
                debug!(host, ?addrs, "resolved");
                Ok::<_, std::io::Error>(Probe::from(addrs.contains(&IpAddr::V4(public))))
            })
            .await
    }

    async fn wait_controller(&self, device_id: &str) -> PollOutcome {
        let poller = Poller::new(
            self.config.wait.controller_timeout,
            self.config.wait.interval,
            self.cancel.clone(),
        );
        let controller = &self.controller;
        poller
            .run("controller", move || async move {
                controller.check_ready(device_id).await.map(Probe::from)
            })
            .await
    }

    /// Create, download and discard a controller backup, then unpack the
    /// local copy.
    async fn fetch_backup(&self, device_id: &str) -> Result<ExtractionDir, CoreError> {
        let backup_id = self.controller.create_backup(device_id).await?;
        info!(device_id, backup_id = %backup_id, "backup created");

        let bytes = self.controller.get_backup(device_id, &backup_id).await?;
        let backup_file = self.config.paths.backup_file.clone();
        {
            let dest = backup_file.clone();
            blocking(move || {
                ensure_parent(&dest)?;
                files::write_atomic(&dest, &bytes)
            })
            .await?;
        }
        info!(path = %backup_file.display(), "backup downloaded");

        if self.controller.delete_backup(device_id, &backup_id).await? {
            debug!(device_id, backup_id = %backup_id, "backup removed from controller");
        } else {
            warn!(device_id, backup_id = %backup_id, "controller did not remove the backup");
        }

        let extraction = ExtractionDir::create(self.config.paths.work_dir.as_deref())?;
        let dest = extraction.path().to_path_buf();
        blocking(move || archive::unpack(&backup_file, &dest)).await?;
        Ok(extraction)
    }
}

/// Controller rejections of apply and reboot are logged and the run goes
/// on; auth and transport failures still end it.
async fn best_effort(
    operation: &str,
    call: impl Future<Output = Result<bool, flowpin_api::Error>>,
) -> Result<bool, CoreError> {
    match call.await {
        Ok(true) => {
            info!(operation, "accepted by controller");
            Ok(true)
        }
        Ok(false) => {
            warn!(operation, "controller reported failure, continuing");
            Ok(false)
        }
        Err(e @ flowpin_api::Error::Controller { .. }) => {
            warn!(operation, error = %e, "request rejected, continuing");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

fn ensure_parent(path: &Path) -> Result<(), CoreError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))
        }
        _ => Ok(()),
    }
}

async fn blocking<T, F>(task: F) -> Result<T, CoreError>
where
    F: FnOnce() -> Result<T, CoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| CoreError::Internal(format!("blocking task failed: {e}")))?
}
