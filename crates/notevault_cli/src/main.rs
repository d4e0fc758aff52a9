//! CLI entry point.
//!
//! # Responsibility
//! - Open a vault from a data directory and run one maintenance command.
//! - Keep output deterministic (`key=value` lines or pretty JSON).

mod args;

use args::{Cli, Commands};
use clap::Parser;
use log::error;
use notevault_core::{init_logging_for, CoreConfig, CoreError, NoteVault};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let data_dir = match std::path::absolute(&cli.data_dir) {
        Ok(path) => path,
        Err(err) => {
            eprintln!("invalid data dir `{}`: {err}", cli.data_dir.display());
            return ExitCode::from(2);
        }
    };
    let config = CoreConfig::from_env(&data_dir);
    if let Err(err) = init_logging_for(&config) {
        eprintln!("logging disabled: {err}");
    }
    let debug_errors = config.debug_errors;

    match run(config, cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(
                "event=cli_command module=cli status=error error_code={} error={}",
                err.kind().as_str(),
                err
            );
            eprintln!("error[{}]: {}", err.kind().as_str(), err.public_message(debug_errors));
            ExitCode::FAILURE
        }
    }
}

fn run(config: CoreConfig, command: Option<Commands>) -> Result<(), CoreError> {
    let vault = NoteVault::open(config)?;

    match command {
        None => {
            let root = vault.folders().root()?;
            println!("notevault_core version={}", notevault_core::core_version());
            println!("root_folder id={} name={}", root.id, root.name);
        }
        Some(Commands::Tree) => print_json(&vault.folders().tree()?),
        Some(Commands::History) => {
            for record in vault.backups().history()? {
                println!(
                    "backup name={} exported_at={} size_bytes={} folders={} notes={} attachments={}",
                    record.name,
                    record.manifest.exported_at.to_rfc3339(),
                    record.size_bytes,
                    record.manifest.total_folders,
                    record.manifest.total_notes,
                    record.manifest.total_attachments
                );
            }
        }
        Some(Commands::Stats) => print_json(&vault.backups().stats()?),
        Some(Commands::Export { with_attachments }) => {
            let exported = vault.backups().export(with_attachments)?;
            println!(
                "exported name={} path={}",
                exported.record.name,
                exported.record.path.display()
            );
        }
        Some(Commands::Restore { name, overwrite }) => {
            print_json(&vault.backups().restore(&name, overwrite)?);
        }
        Some(Commands::DeleteBackup { name }) => {
            vault.backups().delete_backup(&name)?;
            println!("deleted name={name}");
        }
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(err) => eprintln!("failed to render output: {err}"),
    }
}
