//! Config subcommand handlers.

use flowpin_config as config;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;

/// Map an interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = global.config.clone().unwrap_or_else(config::config_path);

    match args.command {
        ConfigCommand::Path => {
            println!("{}", path.display());
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = config::load_config(Some(&path))?;
            let rendered = toml::to_string_pretty(&cfg.redacted()).map_err(|e| {
                CliError::Config {
                    message: format!("failed to render config: {e}"),
                }
            })?;
            println!("# {}", path.display());
            print!("{rendered}");
            Ok(())
        }

        ConfigCommand::SetPassword => {
            let cfg = config::load_config(Some(&path))?;
            let (Some(username), Some(url)) =
                (cfg.controller.username.as_deref(), cfg.controller.url.as_deref())
            else {
                return Err(CliError::Validation {
                    field: "controller".into(),
                    reason: "set controller.url and controller.username first".into(),
                });
            };
            let account = config::keyring_account(username, url);

            let password = rpassword::prompt_password(format!("Password for {account}: "))
                .map_err(prompt_err)?;
            if password.is_empty() {
                return Err(CliError::Validation {
                    field: "password".into(),
                    reason: "password cannot be empty".into(),
                });
            }

            config::store_password(&account, &password)?;
            eprintln!("   ✓ Password stored in system keyring for {account}");
            Ok(())
        }
    }
}
