//! Clap derive structures for the `flowpin` CLI.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// flowpin -- keep an EdgeRouter's NetFlow collector on your public IP
#[derive(Debug, Parser)]
#[command(
    name = "flowpin",
    version,
    about = "Keep an EdgeRouter's NetFlow collector pointed at your public IP",
    long_about = "Pulls a configuration backup from a UNMS/UISP controller, rewrites\n\
        system/flow-accounting/netflow/server to the current public IPv4 address,\n\
        then uploads, applies and reboots. Does nothing when the address is current.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config dir)
    #[arg(long = "config", short = 'C', env = "FLOWPIN_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check the device and re-point its NetFlow collector if needed
    Run(RunArgs),

    /// Show or rewrite the collector address in a local config.boot
    Inspect(InspectArgs),

    /// Manage configuration and stored credentials
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── run ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Controller device ID of the router
    #[arg(long, short = 'd', env = "FLOWPIN_DEVICE_ID")]
    pub device_id: Option<String>,

    /// Controller API URL, e.g. https://unms.example.net/v2.1
    #[arg(long, short = 'c')]
    pub controller: Option<String>,

    /// Controller username
    #[arg(long, short = 'u')]
    pub username: Option<String>,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k')]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Public DNS name of the router; enables the DNS wait
    #[arg(long)]
    pub hostname: Option<String>,

    /// Seconds to wait for DNS to follow the public IP (0 or less skips)
    #[arg(long, allow_negative_numbers = true)]
    pub dns_timeout: Option<i64>,

    /// Seconds to wait for the controller to report the device (0 or less skips)
    #[arg(long, allow_negative_numbers = true)]
    pub controller_timeout: Option<i64>,

    /// Compute the change but upload nothing
    #[arg(long, short = 'n')]
    pub dry_run: bool,
}

// ── inspect ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Path to a config.boot file
    pub file: PathBuf,

    /// Rewrite the collector address to this IPv4 address
    #[arg(long, value_name = "IPV4")]
    pub set: Option<Ipv4Addr>,

    /// With --set, print the rewritten file instead of saving it
    #[arg(long, requires = "set")]
    pub print: bool,
}

// ── config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration (secrets masked)
    Show,

    /// Print the config file location
    Path,

    /// Store the controller password in the system keyring
    SetPassword,
}

// ── completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
