//! `flowpin run`: one pass of the workflow against the configured device.

use std::time::{Duration, Instant};

use tracing::warn;

use flowpin_config::Config;
use flowpin_core::{CancellationToken, Outcome, Workflow};

use super::Painter;
use crate::cli::{GlobalOpts, RunArgs};
use crate::error::CliError;

pub async fn handle(args: RunArgs, global: &GlobalOpts, painter: Painter) -> Result<(), CliError> {
    let mut cfg = flowpin_config::load_config(global.config.as_deref())?;
    apply_overrides(&mut cfg, args);
    let config = flowpin_config::to_workflow_config(&cfg)?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, abandoning any wait in progress");
            trigger.cancel();
        }
    });

    let started = Instant::now();
    let mut workflow = Workflow::new(config)?.with_cancel(cancel);
    let outcome = workflow.run().await?;
    println!("{}", describe(&outcome, started.elapsed(), painter));
    Ok(())
}

/// CLI flags win over file and environment values.
fn apply_overrides(cfg: &mut Config, args: RunArgs) {
    if let Some(device_id) = args.device_id {
        cfg.device_id = Some(device_id);
    }
    if let Some(url) = args.controller {
        cfg.controller.url = Some(url);
    }
    if let Some(username) = args.username {
        cfg.controller.username = Some(username);
    }
    if args.insecure {
        cfg.controller.insecure = true;
    }
    if let Some(timeout) = args.timeout {
        cfg.controller.timeout = timeout;
    }
    if let Some(hostname) = args.hostname {
        cfg.device_hostname = Some(hostname);
    }
    if let Some(secs) = args.dns_timeout {
        cfg.wait.dns_timeout = secs;
    }
    if let Some(secs) = args.controller_timeout {
        cfg.wait.controller_timeout = secs;
    }
    if args.dry_run {
        cfg.dry_run = true;
    }
}

fn describe(outcome: &Outcome, elapsed: Duration, painter: Painter) -> String {
    let took = painter.dim(&format!(
        "({})",
        humantime::format_duration(Duration::from_secs(elapsed.as_secs()))
    ));
    match outcome {
        Outcome::Updated {
            previous,
            current,
            applied,
            rebooted,
        } => {
            let mut line = format!(
                "{} netflow collector moved {} -> {} {took}",
                painter.ok("updated"),
                previous,
                painter.value(&current.to_string()),
            );
            if !applied {
                line.push_str(&format!(
                    "\n{} controller did not apply the backup",
                    painter.warn("warning")
                ));
            }
            if !rebooted {
                line.push_str(&format!(
                    "\n{} controller did not restart the device",
                    painter.warn("warning")
                ));
            }
            line
        }
        Outcome::Unchanged { address } => format!(
            "{} netflow collector already at {} {took}",
            painter.ok("unchanged"),
            painter.value(&address.to_string()),
        ),
        Outcome::DryRun { previous, current } => format!(
            "{} would move netflow collector {} -> {} {took}",
            painter.warn("dry run"),
            previous,
            painter.value(&current.to_string()),
        ),
        Outcome::NotReady { stage, status } => format!(
            "{} {stage} wait ended ({status}); nothing was changed {took}",
            painter.warn("not ready"),
        ),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use flowpin_core::{PollStatus, Stage};

    use super::*;

    #[test]
    fn describe_plain_text() {
        let painter = Painter::new(false);
        let outcome = Outcome::Updated {
            previous: "192.0.2.1".parse().unwrap(),
            current: "203.0.113.9".parse().unwrap(),
            applied: true,
            rebooted: false,
        };
        let text = describe(&outcome, Duration::from_secs(75), painter);
        assert_eq!(
            text,
            "updated netflow collector moved 192.0.2.1 -> 203.0.113.9 (1m 15s)\n\
             warning controller did not restart the device"
        );
    }

    #[test]
    fn describe_not_ready_names_the_stage() {
        let outcome = Outcome::NotReady {
            stage: Stage::WaitDns,
            status: PollStatus::TimedOut,
        };
        let text = describe(&outcome, Duration::from_secs(5), Painter::new(false));
        assert!(text.starts_with("not ready wait-dns wait ended (timed-out)"), "{text}");
    }
}
