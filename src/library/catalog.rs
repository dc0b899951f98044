use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;

use crate::library::record::SampleRecord;
use crate::{LibraryError, Result};

/// Catalog shared between the caller and a background synchronization pass.
pub type SharedCatalog = Arc<Mutex<Catalog>>;

/// Lock a shared catalog. Every mutation leaves both views consistent before
/// returning, so a poisoned lock still guards a usable catalog.
pub fn lock_catalog(catalog: &Mutex<Catalog>) -> MutexGuard<'_, Catalog> {
    catalog.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns every sample record, keyed by path. The palette only stores keys into
/// the same map, so it can never reference a record that is gone.
#[derive(Debug, Default)]
pub struct Catalog {
    records: BTreeMap<PathBuf, SampleRecord>,
    palette: BTreeSet<PathBuf>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, record: SampleRecord) -> Result<()> {
        if self.records.contains_key(record.path()) {
            return Err(LibraryError::DuplicatePath(record.path().to_path_buf()));
        }
        debug!("Adding sample: {}", record.path().display());
        self.records.insert(record.path().to_path_buf(), record);
        Ok(())
    }

    /// Remove a record from the catalog and from the palette.
    pub fn remove(&mut self, path: &Path) -> Result<SampleRecord> {
        let record = self
            .records
            .remove(path)
            .ok_or_else(|| LibraryError::NotFound(path.to_path_buf()))?;
        self.palette.remove(path);
        debug!("Removed sample: {}", path.display());
        Ok(record)
    }

    pub fn get(&self, path: &Path) -> Result<&SampleRecord> {
        self.records
            .get(path)
            .ok_or_else(|| LibraryError::NotFound(path.to_path_buf()))
    }

    pub fn get_mut(&mut self, path: &Path) -> Result<&mut SampleRecord> {
        self.records
            .get_mut(path)
            .ok_or_else(|| LibraryError::NotFound(path.to_path_buf()))
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.records.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.records.keys().map(PathBuf::as_path)
    }

    pub fn all(&self) -> impl Iterator<Item = &SampleRecord> {
        self.records.values()
    }

    pub fn palette(&self) -> impl Iterator<Item = &SampleRecord> {
        self.palette.iter().filter_map(|path| self.records.get(path))
    }

    pub fn palette_len(&self) -> usize {
        self.palette.len()
    }

    pub fn in_palette(&self, path: &Path) -> bool {
        self.palette.contains(path)
    }

    pub fn add_to_palette(&mut self, path: &Path) -> Result<()> {
        if !self.records.contains_key(path) {
            return Err(LibraryError::NotFound(path.to_path_buf()));
        }
        self.palette.insert(path.to_path_buf());
        Ok(())
    }

    /// Returns whether the path was in the palette.
    pub fn remove_from_palette(&mut self, path: &Path) -> bool {
        self.palette.remove(path)
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.palette.clear();
    }
}
