use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "notevault")]
#[command(about = "Maintenance commands for a NoteVault data directory", long_about = None)]
pub struct Cli {
    /// Directory holding the database, uploads, backups and logs
    #[arg(env = "NOTEVAULT_DATA_DIR")]
    pub data_dir: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Print the folder tree as JSON
    Tree,

    /// List stored backups, newest first
    History,

    /// Print aggregate backup statistics as JSON
    Stats,

    /// Write a new backup
    Export {
        /// Copy attachment blobs into the backup
        #[arg(long)]
        with_attachments: bool,
    },

    /// Import a stored backup
    Restore {
        /// Backup directory name as listed by `history`
        name: String,

        /// Update matching folders and notes instead of skipping them
        #[arg(long)]
        overwrite: bool,
    },

    /// Remove a stored backup
    DeleteBackup {
        /// Backup directory name as listed by `history`
        name: String,
    },
}
