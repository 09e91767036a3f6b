//! `flowpin inspect`: offline look at (or rewrite of) a config.boot.

use flowpin_core::{Change, ConfigDocument, CoreError};

use super::Painter;
use crate::cli::InspectArgs;
use crate::error::CliError;

pub fn handle(args: &InspectArgs, painter: Painter) -> Result<(), CliError> {
    let mut document = ConfigDocument::load(&args.file)?;
    let not_found = || CliError::from(CoreError::SettingNotFound {
        path: args.file.clone(),
    });

    let Some(target) = args.set else {
        let found = document.find().ok_or_else(not_found)?;
        println!("{}", found.address);
        return Ok(());
    };

    let change = document.set_value(target).map_err(|_| not_found())?;
    if args.print {
        print!("{document}");
        return Ok(());
    }

    match change {
        Change::Unchanged => println!(
            "{} collector already at {}",
            painter.ok("unchanged"),
            painter.value(&target.to_string())
        ),
        Change::Rewritten { previous } => {
            document.save(&args.file)?;
            println!(
                "{} collector {} -> {} in {}",
                painter.ok("rewritten"),
                previous,
                painter.value(&target.to_string()),
                args.file.display()
            );
        }
    }
    Ok(())
}
