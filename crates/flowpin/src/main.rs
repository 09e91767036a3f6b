mod cli;
mod commands;
mod error;

use std::io::IsTerminal;

use clap::Parser;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

use crate::cli::{Cli, ColorMode, Command};
use crate::commands::Painter;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup tracing based on verbosity
    init_tracing(cli.global.verbose);

    // Dispatch and handle errors with proper exit codes
    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

/// Warnings and errors go to stderr, everything else to stdout.
fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn,flowpin=info,flowpin_core=info",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let writer = std::io::stderr
        .with_max_level(Level::WARN)
        .or_else(std::io::stdout);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(writer)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let painter = Painter::new(match cli.global.color {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => std::io::stdout().is_terminal(),
    });

    match cli.command {
        Command::Run(args) => commands::run::handle(args, &cli.global, painter).await,

        Command::Inspect(args) => commands::inspect::handle(&args, painter),

        // Config commands never reach the controller
        Command::Config(args) => commands::config_cmd::handle(&args, &cli.global),

        // Shell completions generation
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "flowpin", &mut std::io::stdout());
            Ok(())
        }
    }
}
