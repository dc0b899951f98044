use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DATA_DIR_ENV: &str = "SAMPLE_LIBRARY_DATA_DIR";

const APP_DIR_NAME: &str = "sample-library";
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Locations and limits shared by persistence and file management.
#[derive(Debug, Clone)]
pub struct LibraryConfig {
    /// Catalog files, the preference file and the lock file live here.
    pub data_dir: PathBuf,
    /// Reported as the last opened directory before any has been stored.
    pub default_library_dir: PathBuf,
    /// Soft-deleted files are moved here.
    pub trash_dir: PathBuf,
    pub lock_timeout: Duration,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .map(|d| d.join(APP_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from("./sample-library-data"));
        Self::with_data_dir(data_dir)
    }
}

impl LibraryConfig {
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let default_library_dir = dirs::audio_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            trash_dir: data_dir.join("trash"),
            data_dir,
            default_library_dir,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn trash_dir(mut self, trash_dir: impl Into<PathBuf>) -> Self {
        self.trash_dir = trash_dir.into();
        self
    }

    pub fn preferences_file(&self) -> PathBuf {
        self.data_dir.join("preferences.json")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.data_dir.join(".library.lock")
    }

    /// Catalog file for a watched directory, named after the directory.
    pub fn catalog_file(&self, library_dir: &Path) -> PathBuf {
        let name = library_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_string());
        self.data_dir.join(format!("{}.samplelib.json", name))
    }
}
