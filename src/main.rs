use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::Parser;
use sample_library::cli::commands::{Cli, Commands};
use sample_library::library::record::key_name;
use sample_library::utils::reporting::Reporter;
use sample_library::{FilterEngine, FilterRule, LibraryConfig, RemovalMode, SampleLibrary};

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn build_config(cli: &Cli) -> LibraryConfig {
    let mut config = match &cli.data_dir {
        Some(dir) => LibraryConfig::with_data_dir(dir),
        None => LibraryConfig::default(),
    };
    if let Some(ms) = cli.lock_timeout_ms {
        config = config.lock_timeout(Duration::from_millis(ms));
    }
    config
}

/// Catalog keys are absolute, so relative arguments are resolved first.
fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(&cli);
    let mut library = SampleLibrary::open(config);
    println!("Initialized with {} threads", rayon::current_num_threads());

    match cli.command {
        Commands::Sync { dir } => {
            println!("=== Synchronizing {} ===", dir.display());
            let known = library.load_directory(&dir)?;
            println!("Loaded {} cataloged samples", known);

            let mut last_percent = None;
            let report = library.sync_blocking(|progress| {
                let percent = (progress * 100.0).round() as u32;
                if last_percent != Some(percent) {
                    last_percent = Some(percent);
                    print!("\rProgress: {:>3}%", percent);
                    let _ = std::io::stdout().flush();
                }
            })?;
            println!();

            if report.analysis_skipped {
                println!("No changes since the last synchronization.");
            }
            println!("Added: {}", report.added);
            println!("Removed: {}", report.removed);
            for (path, reason) in &report.failed {
                println!("  Not analysed: {} ({})", path.display(), reason);
            }
            if report.cancelled {
                println!("Synchronization was cancelled.");
            }
            println!("\n=== Synchronization Complete ===");
        }

        Commands::List { dir, rules, csv } => {
            let dir = match dir {
                Some(dir) => dir,
                None => library.last_opened_directory()?,
            };
            library.load_directory(&dir)?;

            let mut filter = FilterEngine::new();
            for rule in &rules {
                filter.add_rule(rule.parse::<FilterRule>()?);
            }
            let records = library.filtered_records(&filter);

            for record in &records {
                let tempo = record.tempo().map_or_else(|| "-".to_string(), |t| t.to_string());
                let key = record.key().and_then(key_name).unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<40} {:>8.3}s {:>7.1} LUFS {:>5} BPM  {}",
                    record.title(),
                    record.length(),
                    record.loudness_lufs(),
                    tempo,
                    key
                );
            }
            println!("\n{} samples", records.len());

            if let Some(output) = csv {
                Reporter::new().generate_catalog_report(&records, &output)?;
            }
        }

        Commands::Remove {
            dir,
            files,
            permanent,
        } => {
            library.load_directory(&dir)?;
            let mode = if permanent {
                RemovalMode::Permanent
            } else {
                RemovalMode::Trash
            };
            let files: Vec<PathBuf> = files.iter().map(|f| absolute(f)).collect();
            let removed = library.remove_files(&files, mode)?;
            println!("Removed {} of {} samples", removed, files.len());
        }

        Commands::Reanalyse { dir, files } => {
            library.load_directory(&dir)?;
            let files: Vec<PathBuf> = files.iter().map(|f| absolute(f)).collect();
            let report = library.reanalyse(&files)?;
            for (path, reason) in &report.failed {
                println!("  Not analysed: {} ({})", path.display(), reason);
            }
            println!("Analysed {} of {} samples", report.analysed, files.len());
        }

        Commands::Last => {
            println!("{}", library.last_opened_directory()?.display());
        }
    }

    Ok(())
}
