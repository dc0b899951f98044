use std::path::PathBuf;

pub mod analyzers;
pub mod audio;
pub mod cli;
pub mod config;
pub mod library;
pub mod utils;

#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Analysis error: {0}")]
    Analysis(String),
    #[error("Corrupt catalog file: {0}")]
    CorruptCatalog(String),
    #[error("Timed out waiting for lock: {}", .0.display())]
    LockContention(PathBuf),
    #[error("No sample with path: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Sample already in catalog: {}", .0.display())]
    DuplicatePath(PathBuf),
    #[error("Cannot read library directory: {}", .0.display())]
    DirectoryUnreadable(PathBuf),
    #[error("A synchronization pass is already running")]
    SyncInProgress,
    #[error("No synchronization pass is running")]
    NoSyncRunning,
    #[error("No library directory has been loaded")]
    NoLibraryLoaded,
}

pub type Result<T> = std::result::Result<T, LibraryError>;

// Re-exports for convenience
pub use analyzers::sample::{Analyze, SampleAnalyzer};
pub use config::LibraryConfig;
pub use library::catalog::Catalog;
pub use library::filter::{CompareOperator, FilterEngine, FilterRule, RuleKind};
pub use library::manager::{ReanalysisReport, RemovalMode, SampleLibrary};
pub use library::record::{Analysis, SampleRecord, FEATURE_VECTOR_LEN};
pub use library::sync::{SyncEvent, SyncReport, SyncState, Synchronizer};
