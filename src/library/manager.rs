use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

use log::{info, warn};

use crate::analyzers::sample::{Analyze, SampleAnalyzer};
use crate::config::LibraryConfig;
use crate::library::catalog::{lock_catalog, Catalog, SharedCatalog};
use crate::library::filter::FilterEngine;
use crate::library::persistence::LibraryStore;
use crate::library::record::SampleRecord;
use crate::library::sync::{DiskFs, LibraryFs, SyncEvent, SyncReport, SyncTask, Synchronizer};
use crate::utils::file_ops::FileManager;
use crate::utils::parallel::ParallelProcessor;
use crate::{LibraryError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalMode {
    /// Move the file into the configured trash directory.
    Trash,
    Permanent,
}

/// Outcome of [`SampleLibrary::reanalyse`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReanalysisReport {
    pub analysed: usize,
    /// Paths that were not analysed, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

/// The catalog of one watched directory together with its persistence and
/// background synchronization.
pub struct SampleLibrary<F = DiskFs, A = SampleAnalyzer> {
    store: LibraryStore,
    files: FileManager,
    catalog: SharedCatalog,
    synchronizer: Option<Synchronizer<F, A>>,
    task: Option<SyncTask<F, A>>,
    library_dir: Option<PathBuf>,
}

impl<F, A> ParallelProcessor for SampleLibrary<F, A> {}

impl SampleLibrary {
    pub fn open(config: LibraryConfig) -> Self {
        Self::with_synchronizer(config, Synchronizer::with_defaults())
    }
}

impl<F, A> SampleLibrary<F, A>
where
    F: LibraryFs + 'static,
    A: Analyze + 'static,
{
    pub fn with_synchronizer(config: LibraryConfig, synchronizer: Synchronizer<F, A>) -> Self {
        Self::init_parallel_processing();
        Self {
            files: FileManager::new(config.trash_dir.clone()),
            store: LibraryStore::new(config),
            catalog: Arc::new(Mutex::new(Catalog::new())),
            synchronizer: Some(synchronizer),
            task: None,
            library_dir: None,
        }
    }

    pub fn library_dir(&self) -> Option<&Path> {
        self.library_dir.as_deref()
    }

    pub fn catalog(&self) -> SharedCatalog {
        Arc::clone(&self.catalog)
    }

    pub fn is_syncing(&self) -> bool {
        self.task.is_some()
    }

    fn synchronizer_mut(&mut self) -> Result<&mut Synchronizer<F, A>> {
        self.synchronizer.as_mut().ok_or(LibraryError::SyncInProgress)
    }

    fn current_dir(&self) -> Result<&Path> {
        self.library_dir().ok_or(LibraryError::NoLibraryLoaded)
    }

    /// Switch to `dir`, preloading its catalog file when one exists.
    /// Returns the number of preloaded records.
    pub fn load_directory(&mut self, dir: impl AsRef<Path>) -> Result<usize> {
        let dir_ref = dir.as_ref();
        let dir = if let Ok(canonical) = std::fs::canonicalize(dir_ref) {
            canonical
        } else {
            dir_ref.to_path_buf()
        };

        let records = self.store.load_catalog(&dir)?.unwrap_or_default();
        let catalog = Arc::clone(&self.catalog);
        let synchronizer = self.synchronizer_mut()?;
        synchronizer.clear_known();

        let mut catalog = lock_catalog(&catalog);
        catalog.clear();
        for record in records {
            let path = record.path().to_path_buf();
            match catalog.add(record) {
                Ok(()) => synchronizer.seed_known([path]),
                Err(e) => warn!("Skipping catalog entry: {}", e),
            }
        }
        let loaded = catalog.len();
        drop(catalog);

        self.store.store_last_opened_directory(&dir)?;
        info!("Opened library {} with {} known samples", dir.display(), loaded);
        self.library_dir = Some(dir);
        Ok(loaded)
    }

    /// Start a background pass over the loaded directory.
    pub fn start_sync(&mut self) -> Result<()> {
        let dir = self.current_dir()?.to_path_buf();
        let synchronizer = self.synchronizer.take().ok_or(LibraryError::SyncInProgress)?;
        self.task = Some(SyncTask::spawn(synchronizer, dir, Arc::clone(&self.catalog)));
        Ok(())
    }

    pub fn cancel_sync(&self) {
        if let Some(task) = &self.task {
            task.cancel();
        }
    }

    pub fn events(&self) -> Option<&Receiver<SyncEvent>> {
        self.task.as_ref().map(SyncTask::events)
    }

    /// Wait for the running pass and write the reconciled catalog back.
    /// A failed pass leaves the catalog file untouched.
    pub fn finish_sync(&mut self) -> Result<SyncReport> {
        let task = self.task.take().ok_or(LibraryError::NoSyncRunning)?;
        let (synchronizer, result) = task.join();
        self.synchronizer = Some(synchronizer);
        let report = result?;
        self.save()?;
        Ok(report)
    }

    /// Run a pass to completion, forwarding progress.
    pub fn sync_blocking(&mut self, mut on_progress: impl FnMut(f64)) -> Result<SyncReport> {
        self.start_sync()?;
        if let Some(events) = self.events() {
            for event in events.iter() {
                match event {
                    SyncEvent::Progress(progress) => on_progress(progress),
                    SyncEvent::Finished { .. } => break,
                }
            }
        }
        self.finish_sync()
    }

    pub fn save(&self) -> Result<PathBuf> {
        let dir = self.current_dir()?;
        let catalog = lock_catalog(&self.catalog);
        self.store.save_catalog(dir, &catalog)
    }

    pub fn all_records(&self) -> Vec<SampleRecord> {
        lock_catalog(&self.catalog).all().cloned().collect()
    }

    pub fn palette_records(&self) -> Vec<SampleRecord> {
        lock_catalog(&self.catalog).palette().cloned().collect()
    }

    pub fn filtered_records(&self, filter: &FilterEngine) -> Vec<SampleRecord> {
        let catalog = lock_catalog(&self.catalog);
        filter.apply(&catalog).into_iter().cloned().collect()
    }

    pub fn record(&self, path: &Path) -> Result<SampleRecord> {
        lock_catalog(&self.catalog).get(path).cloned()
    }

    /// Returns how many paths are now in the palette; unknown paths are skipped.
    pub fn add_to_palette<P: AsRef<Path>>(&self, paths: &[P]) -> usize {
        let mut catalog = lock_catalog(&self.catalog);
        paths
            .iter()
            .filter(|path| match catalog.add_to_palette(path.as_ref()) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Not adding to palette: {}", e);
                    false
                }
            })
            .count()
    }

    pub fn remove_from_palette<P: AsRef<Path>>(&self, paths: &[P]) -> usize {
        let mut catalog = lock_catalog(&self.catalog);
        paths
            .iter()
            .filter(|path| catalog.remove_from_palette(path.as_ref()))
            .count()
    }

    /// Delete cataloged files from disk and drop their records. Paths outside
    /// the catalog are never touched, and files that cannot be removed keep
    /// their records. Returns the number of records removed.
    pub fn remove_files<P: AsRef<Path>>(&mut self, paths: &[P], mode: RemovalMode) -> Result<usize> {
        self.current_dir()?;
        let catalog = Arc::clone(&self.catalog);
        let files = &self.files;
        let synchronizer = self.synchronizer.as_mut().ok_or(LibraryError::SyncInProgress)?;

        let mut removed = 0;
        for path in paths.iter().map(AsRef::as_ref) {
            if !lock_catalog(&catalog).contains(path) {
                warn!("Not removing {}: not a cataloged sample", path.display());
                continue;
            }
            let outcome = match mode {
                RemovalMode::Trash => files.move_to_trash(path).map(|_| ()),
                RemovalMode::Permanent => files.delete_permanently(path),
            };
            if let Err(e) = outcome {
                if path.exists() {
                    warn!("Could not remove {}: {}", path.display(), e);
                    continue;
                }
            }
            synchronizer.forget(path);
            if lock_catalog(&catalog).remove(path).is_ok() {
                removed += 1;
            }
        }

        self.save()?;
        Ok(removed)
    }

    /// Re-run analysis on cataloged paths, overwriting their descriptors.
    /// Failed files are left unanalyzed and listed in the report.
    pub fn reanalyse<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<ReanalysisReport> {
        self.current_dir()?;
        let synchronizer = self.synchronizer.as_ref().ok_or(LibraryError::SyncInProgress)?;

        let mut report = ReanalysisReport::default();
        let targets: Vec<PathBuf> = {
            let catalog = lock_catalog(&self.catalog);
            paths
                .iter()
                .map(|p| p.as_ref().to_path_buf())
                .filter(|p| {
                    let known = catalog.contains(p);
                    if !known {
                        report
                            .failed
                            .push((p.clone(), LibraryError::NotFound(p.clone()).to_string()));
                    }
                    known
                })
                .collect()
        };
        let results = Self::analyze_all(synchronizer.analyzer(), &targets);

        {
            let mut catalog = lock_catalog(&self.catalog);
            for (path, result) in results {
                let Ok(record) = catalog.get_mut(&path) else {
                    continue;
                };
                match result {
                    Ok(analysis) => {
                        record.apply_analysis(analysis);
                        report.analysed += 1;
                    }
                    Err(e) => {
                        record.mark_unanalyzed();
                        report.failed.push((path, e.to_string()));
                    }
                }
            }
        }

        self.save()?;
        Ok(report)
    }

    /// Directory of the previous session, or the configured default.
    pub fn last_opened_directory(&self) -> Result<PathBuf> {
        Ok(self
            .store
            .last_opened_directory()?
            .unwrap_or_else(|| self.store.config().default_library_dir.clone()))
    }
}

impl<F, A> Drop for SampleLibrary<F, A> {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.cancel();
        }
    }
}
