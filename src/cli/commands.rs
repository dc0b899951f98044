use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DATA_DIR_ENV;

#[derive(Parser)]
#[command(name = "sample-library")]
#[command(version = "1.0")]
#[command(about = "Audio sample library synchronizer and analyzer", long_about = None)]
pub struct Cli {
    /// Directory holding catalog files and preferences
    #[arg(long, global = true, env = DATA_DIR_ENV)]
    pub data_dir: Option<PathBuf>,

    /// Maximum wait for the library lock, in milliseconds
    #[arg(long, global = true)]
    pub lock_timeout_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan a directory, analyse new samples and save its catalog
    Sync {
        /// Sample directory to synchronize
        dir: PathBuf,
    },

    /// List cataloged samples
    List {
        /// Sample directory (defaults to the last opened one)
        dir: Option<PathBuf>,

        /// Filter rule such as "tempo>120", "key=9" or "title~kick"
        #[arg(short = 'r', long = "rule")]
        rules: Vec<String>,

        /// Write the listing to a CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Delete samples from disk and from the catalog
    Remove {
        /// Sample directory the files belong to
        dir: PathBuf,

        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Unlink instead of moving to the trash directory
        #[arg(long)]
        permanent: bool,
    },

    /// Force analysis of cataloged samples
    Reanalyse {
        /// Sample directory the files belong to
        dir: PathBuf,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Print the last opened sample directory
    Last,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_with_rules() {
        let cli = Cli::try_parse_from([
            "sample-library",
            "--lock-timeout-ms",
            "200",
            "list",
            "/samples",
            "-r",
            "tempo>120",
            "--rule",
            "title~kick",
        ])
        .unwrap();

        assert_eq!(cli.lock_timeout_ms, Some(200));
        match cli.command {
            Commands::List { dir, rules, csv } => {
                assert_eq!(dir, Some(PathBuf::from("/samples")));
                assert_eq!(rules, vec!["tempo>120", "title~kick"]);
                assert!(csv.is_none());
            }
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn test_remove_requires_files() {
        assert!(Cli::try_parse_from(["sample-library", "remove", "/samples"]).is_err());
        let cli =
            Cli::try_parse_from(["sample-library", "remove", "/samples", "a.wav", "--permanent"])
                .unwrap();
        assert!(matches!(cli.command, Commands::Remove { permanent: true, .. }));
    }
}
