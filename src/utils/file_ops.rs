use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use crate::Result;

pub struct FileManager {
    trash_dir: PathBuf,
}

impl FileManager {
    pub fn new(trash_dir: impl Into<PathBuf>) -> Self {
        Self {
            trash_dir: trash_dir.into(),
        }
    }

    pub fn trash_dir(&self) -> &Path {
        &self.trash_dir
    }

    /// Move a file into the trash directory without overwriting earlier
    /// trashed files of the same name. Returns the new location.
    pub fn move_to_trash(&self, file_path: impl AsRef<Path>) -> Result<PathBuf> {
        let file_path = file_path.as_ref();
        let file_name = file_path.file_name().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "Invalid file path")
        })?;

        fs::create_dir_all(&self.trash_dir)?;

        let mut destination = self.trash_dir.join(file_name);
        if destination.exists() {
            let stem = file_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "sample".to_string());
            let extension = file_path
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default();

            let mut counter = 1;
            loop {
                destination = self
                    .trash_dir
                    .join(format!("{}_{}{}", stem, counter, extension));
                if !destination.exists() {
                    break;
                }
                counter += 1;
            }
        }

        Self::move_file(file_path, &destination)?;
        info!("Moved {} to {}", file_path.display(), destination.display());
        Ok(destination)
    }

    pub fn delete_permanently(&self, file_path: impl AsRef<Path>) -> Result<()> {
        let file_path = file_path.as_ref();
        fs::remove_file(file_path)?;
        info!("Deleted {}", file_path.display());
        Ok(())
    }

    /// Rename, falling back to copy and delete across filesystems.
    fn move_file(from: &Path, to: &Path) -> Result<()> {
        if fs::rename(from, to).is_err() {
            fs::copy(from, to)?;
            fs::remove_file(from)?;
        }
        Ok(())
    }
}
