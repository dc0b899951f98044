use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::analyzers::sample::{Analyze, SampleAnalyzer};
use crate::audio::decoder::is_supported_audio_file;
use crate::library::catalog::{lock_catalog, Catalog, SharedCatalog};
use crate::library::record::SampleRecord;
use crate::{LibraryError, Result};

/// Filesystem access needed by a synchronization pass.
pub trait LibraryFs: Send + Sync {
    /// All supported audio files below `root`, recursively.
    fn scan(&self, root: &Path) -> Result<Vec<PathBuf>>;
    fn exists(&self, path: &Path) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DiskFs;

impl LibraryFs for DiskFs {
    fn scan(&self, root: &Path) -> Result<Vec<PathBuf>> {
        std::fs::read_dir(root).map_err(|e| {
            warn!("Cannot read {}: {}", root.display(), e);
            LibraryError::DirectoryUnreadable(root.to_path_buf())
        })?;

        let files = WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!("Error accessing entry: {}", err);
                    None
                }
            })
            .filter(|e| e.file_type().is_file() && is_supported_audio_file(e.path()))
            .map(|e| e.into_path())
            .collect();
        Ok(files)
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Scanning,
    Reconciling,
    Analyzing,
    Done,
    Cancelled,
}

impl SyncState {
    pub fn is_finished(self) -> bool {
        matches!(self, SyncState::Done | SyncState::Cancelled)
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct SyncReport {
    pub added: usize,
    pub removed: usize,
    /// Files added unanalyzed, with the reason.
    pub failed: Vec<(PathBuf, String)>,
    /// Nothing changed on disk, so the analysis stage never ran.
    pub analysis_skipped: bool,
    pub cancelled: bool,
}

/// One synchronization pass, advanced by [`Synchronizer::step`].
#[derive(Debug)]
pub struct SyncPass {
    root: PathBuf,
    state: SyncState,
    current_files: Vec<PathBuf>,
    to_check: VecDeque<PathBuf>,
    to_add: VecDeque<PathBuf>,
    processed: usize,
    total: usize,
    report: SyncReport,
}

impl SyncPass {
    fn new(root: PathBuf) -> Self {
        Self {
            root,
            state: SyncState::Idle,
            current_files: Vec::new(),
            to_check: VecDeque::new(),
            to_add: VecDeque::new(),
            processed: 0,
            total: 0,
            report: SyncReport::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Fraction of per-file steps done; never decreases within a pass.
    pub fn progress(&self) -> f64 {
        if self.state == SyncState::Done {
            1.0
        } else if self.total == 0 {
            0.0
        } else {
            self.processed as f64 / self.total as f64
        }
    }

    pub fn report(&self) -> &SyncReport {
        &self.report
    }

    pub fn into_report(self) -> SyncReport {
        self.report
    }

    fn advance(&mut self) {
        self.processed = (self.processed + 1).min(self.total);
    }
}

/// Reconciles a watched directory with the catalog.
pub struct Synchronizer<F = DiskFs, A = SampleAnalyzer> {
    fs: F,
    analyzer: A,
    known_paths: HashSet<PathBuf>,
}

impl Synchronizer {
    pub fn with_defaults() -> Self {
        Self::new(DiskFs, SampleAnalyzer::new())
    }
}

impl<F: LibraryFs, A: Analyze> Synchronizer<F, A> {
    pub fn new(fs: F, analyzer: A) -> Self {
        Self {
            fs,
            analyzer,
            known_paths: HashSet::new(),
        }
    }

    pub fn analyzer(&self) -> &A {
        &self.analyzer
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn fs_mut(&mut self) -> &mut F {
        &mut self.fs
    }

    pub fn known_paths(&self) -> &HashSet<PathBuf> {
        &self.known_paths
    }

    /// Mark paths as already cataloged, e.g. after loading a catalog file.
    pub fn seed_known<I: IntoIterator<Item = PathBuf>>(&mut self, paths: I) {
        self.known_paths.extend(paths);
    }

    pub fn forget(&mut self, path: &Path) {
        self.known_paths.remove(path);
    }

    pub fn clear_known(&mut self) {
        self.known_paths.clear();
    }

    pub fn begin(&self, root: impl Into<PathBuf>) -> SyncPass {
        SyncPass::new(root.into())
    }

    /// Advance `pass` by one unit of work: the scan, or a single file.
    ///
    /// Cancellation is observed before every unit. A scan failure is returned
    /// with the pass left in `Scanning` and the catalog untouched.
    pub fn step(
        &mut self,
        pass: &mut SyncPass,
        catalog: &Mutex<Catalog>,
        cancel: &AtomicBool,
    ) -> Result<SyncState> {
        if pass.state.is_finished() {
            return Ok(pass.state);
        }
        if cancel.load(Ordering::SeqCst) {
            info!("Synchronization of {} cancelled", pass.root.display());
            pass.state = SyncState::Cancelled;
            pass.report.cancelled = true;
            return Ok(pass.state);
        }

        match pass.state {
            SyncState::Idle => pass.state = SyncState::Scanning,
            SyncState::Scanning => self.scan(pass, catalog)?,
            SyncState::Reconciling => self.reconcile_next(pass, catalog),
            SyncState::Analyzing => self.analyze_next(pass, catalog),
            SyncState::Done | SyncState::Cancelled => {}
        }
        Ok(pass.state)
    }

    /// Drive a whole pass on the calling thread.
    pub fn run(
        &mut self,
        root: &Path,
        catalog: &Mutex<Catalog>,
        cancel: &AtomicBool,
        mut on_progress: impl FnMut(f64),
    ) -> Result<SyncReport> {
        let mut pass = self.begin(root);
        let mut last_progress = -1.0;
        loop {
            let state = self.step(&mut pass, catalog, cancel)?;
            let progress = pass.progress();
            if progress > last_progress {
                on_progress(progress);
                last_progress = progress;
            }
            if state.is_finished() {
                break;
            }
        }

        let report = pass.into_report();
        info!(
            "Synchronized {}: {} added, {} removed, {} failed{}",
            root.display(),
            report.added,
            report.removed,
            report.failed.len(),
            if report.cancelled { " (cancelled)" } else { "" }
        );
        Ok(report)
    }

    fn scan(&mut self, pass: &mut SyncPass, catalog: &Mutex<Catalog>) -> Result<()> {
        let files = self.fs.scan(&pass.root)?;

        let catalog = lock_catalog(catalog);
        self.known_paths.retain(|path| catalog.contains(path));
        pass.to_check = catalog.paths().map(Path::to_path_buf).collect();
        drop(catalog);

        info!(
            "Found {} audio files in {}, checking {} cataloged samples",
            files.len(),
            pass.root.display(),
            pass.to_check.len()
        );
        pass.total = files.len() + pass.to_check.len();
        pass.current_files = files;
        pass.state = SyncState::Reconciling;
        Ok(())
    }

    fn reconcile_next(&mut self, pass: &mut SyncPass, catalog: &Mutex<Catalog>) {
        let Some(path) = pass.to_check.pop_front() else {
            self.finish_reconciling(pass);
            return;
        };

        if !self.fs.exists(&path) {
            if lock_catalog(catalog).remove(&path).is_ok() {
                debug!("Pruned missing file: {}", path.display());
                pass.report.removed += 1;
            }
            self.known_paths.remove(&path);
        }
        pass.advance();
    }

    fn finish_reconciling(&mut self, pass: &mut SyncPass) {
        let unchanged = self.known_paths.len() == pass.current_files.len()
            && pass
                .current_files
                .iter()
                .all(|path| self.known_paths.contains(path));

        if unchanged {
            debug!("No new files in {}", pass.root.display());
            pass.processed = pass.total;
            pass.report.analysis_skipped = true;
            pass.state = SyncState::Done;
        } else {
            pass.to_add = std::mem::take(&mut pass.current_files).into();
            pass.state = SyncState::Analyzing;
        }
    }

    fn analyze_next(&mut self, pass: &mut SyncPass, catalog: &Mutex<Catalog>) {
        let Some(path) = pass.to_add.pop_front() else {
            pass.state = SyncState::Done;
            return;
        };

        if !self.known_paths.contains(&path) {
            self.add_file(path, catalog, &mut pass.report);
        }
        pass.advance();
    }

    /// Analyze one new file off-lock, then commit the finished record.
    fn add_file(&mut self, path: PathBuf, catalog: &Mutex<Catalog>, report: &mut SyncReport) {
        if lock_catalog(catalog).contains(&path) {
            self.known_paths.insert(path);
            return;
        }

        let mut record = SampleRecord::from_path(path.clone());
        if let Err(e) = self.analyzer.analyze_record(&mut record, false) {
            warn!("Failed to analyse {}: {}", path.display(), e);
            report.failed.push((path.clone(), e.to_string()));
        }

        match lock_catalog(catalog).add(record) {
            Ok(()) => report.added += 1,
            Err(e) => warn!("Not adding {}: {}", path.display(), e),
        }
        self.known_paths.insert(path);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncEvent {
    Progress(f64),
    /// Sent exactly once per task, after the last progress event.
    Finished { cancelled: bool },
}

/// A synchronization pass running on its own thread.
///
/// The synchronizer is moved into the worker and handed back by [`SyncTask::join`].
pub struct SyncTask<F = DiskFs, A = SampleAnalyzer> {
    cancel: Arc<AtomicBool>,
    events: Receiver<SyncEvent>,
    handle: JoinHandle<(Synchronizer<F, A>, Result<SyncReport>)>,
}

impl<F, A> SyncTask<F, A>
where
    F: LibraryFs + 'static,
    A: Analyze + 'static,
{
    pub fn spawn(
        mut synchronizer: Synchronizer<F, A>,
        root: PathBuf,
        catalog: SharedCatalog,
    ) -> Self {
        let (tx, events) = mpsc::channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);

        let handle = thread::spawn(move || {
            let result = synchronizer.run(&root, &catalog, &flag, |progress| {
                let _ = tx.send(SyncEvent::Progress(progress));
            });
            let cancelled = match &result {
                Ok(report) => report.cancelled,
                Err(_) => flag.load(Ordering::SeqCst),
            };
            let _ = tx.send(SyncEvent::Finished { cancelled });
            (synchronizer, result)
        });

        Self {
            cancel,
            events,
            handle,
        }
    }
}

impl<F, A> SyncTask<F, A> {
    /// Request cooperative cancellation; the worker stops before its next file.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn events(&self) -> &Receiver<SyncEvent> {
        &self.events
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker and take back the synchronizer.
    pub fn join(self) -> (Synchronizer<F, A>, Result<SyncReport>) {
        match self.handle.join() {
            Ok(outcome) => outcome,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::record::{Analysis, FEATURE_VECTOR_LEN};
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct FakeFs {
        files: Vec<PathBuf>,
        unreadable: bool,
    }

    impl FakeFs {
        fn with(paths: &[&str]) -> Self {
            Self {
                files: paths.iter().map(PathBuf::from).collect(),
                unreadable: false,
            }
        }

        fn set(&mut self, paths: &[&str]) {
            self.files = paths.iter().map(PathBuf::from).collect();
        }
    }

    impl LibraryFs for FakeFs {
        fn scan(&self, root: &Path) -> Result<Vec<PathBuf>> {
            if self.unreadable {
                return Err(LibraryError::DirectoryUnreadable(root.to_path_buf()));
            }
            Ok(self.files.clone())
        }

        fn exists(&self, path: &Path) -> bool {
            self.files.iter().any(|f| f == path)
        }
    }

    #[derive(Default)]
    struct FakeAnalyzer {
        calls: AtomicUsize,
    }

    impl Analyze for FakeAnalyzer {
        fn analyze(&self, path: &Path) -> Result<Analysis> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if path.to_string_lossy().contains("corrupt") {
                return Err(LibraryError::Decode("bad header".into()));
            }
            Ok(Analysis {
                length: 1.0,
                loudness_db: -6.0,
                loudness_lufs: -12.0,
                tempo: Some(120),
                key: Some(9),
                feature_vector: vec![0.25; FEATURE_VECTOR_LEN],
            })
        }
    }

    fn synchronizer(paths: &[&str]) -> Synchronizer<FakeFs, FakeAnalyzer> {
        Synchronizer::new(FakeFs::with(paths), FakeAnalyzer::default())
    }

    fn run_pass(
        sync: &mut Synchronizer<FakeFs, FakeAnalyzer>,
        catalog: &Mutex<Catalog>,
    ) -> SyncReport {
        sync.run(Path::new("/lib"), catalog, &AtomicBool::new(false), |_| {})
            .unwrap()
    }

    fn cataloged(catalog: &Mutex<Catalog>) -> Vec<String> {
        lock_catalog(catalog)
            .paths()
            .map(|p| p.display().to_string())
            .collect()
    }

    #[test]
    fn test_pass_walks_states_in_order() {
        let mut sync = synchronizer(&["/lib/a.wav", "/lib/b.wav"]);
        let catalog = Mutex::new(Catalog::new());
        let cancel = AtomicBool::new(false);
        let mut pass = sync.begin("/lib");

        let mut states = vec![pass.state()];
        while !pass.state().is_finished() {
            let state = sync.step(&mut pass, &catalog, &cancel).unwrap();
            if states.last() != Some(&state) {
                states.push(state);
            }
        }
        assert_eq!(
            states,
            vec![
                SyncState::Idle,
                SyncState::Scanning,
                SyncState::Reconciling,
                SyncState::Analyzing,
                SyncState::Done
            ]
        );
        assert_eq!(pass.report().added, 2);
        assert_eq!(pass.progress(), 1.0);
    }

    #[test]
    fn test_second_pass_changes_nothing() {
        let mut sync = synchronizer(&["/lib/a.wav", "/lib/b.wav", "/lib/c.wav"]);
        let catalog = Mutex::new(Catalog::new());

        let first = run_pass(&mut sync, &catalog);
        assert_eq!(first.added, 3);
        let calls = sync.analyzer().calls.load(Ordering::SeqCst);

        let second = run_pass(&mut sync, &catalog);
        assert_eq!(second.added, 0);
        assert_eq!(second.removed, 0);
        assert!(second.analysis_skipped);
        assert_eq!(sync.analyzer().calls.load(Ordering::SeqCst), calls);
    }

    #[test]
    fn test_deleted_file_is_pruned_and_readded_once() {
        let mut sync = synchronizer(&["/lib/a.wav", "/lib/b.wav", "/lib/c.wav"]);
        let catalog = Mutex::new(Catalog::new());
        run_pass(&mut sync, &catalog);
        lock_catalog(&catalog)
            .add_to_palette(Path::new("/lib/b.wav"))
            .unwrap();

        sync.fs_mut().set(&["/lib/a.wav", "/lib/c.wav"]);
        let report = run_pass(&mut sync, &catalog);
        assert_eq!(report.removed, 1);
        assert_eq!(cataloged(&catalog), vec!["/lib/a.wav", "/lib/c.wav"]);
        assert_eq!(lock_catalog(&catalog).palette_len(), 0);

        sync.fs_mut().set(&["/lib/a.wav", "/lib/b.wav", "/lib/c.wav"]);
        let report = run_pass(&mut sync, &catalog);
        assert_eq!(report.added, 1);
        assert_eq!(
            cataloged(&catalog),
            vec!["/lib/a.wav", "/lib/b.wav", "/lib/c.wav"]
        );
    }

    #[test]
    fn test_same_count_swap_is_detected() {
        let mut sync = synchronizer(&["/lib/a.wav", "/lib/b.wav"]);
        let catalog = Mutex::new(Catalog::new());
        run_pass(&mut sync, &catalog);

        sync.fs_mut().set(&["/lib/a.wav", "/lib/d.wav"]);
        let report = run_pass(&mut sync, &catalog);
        assert_eq!((report.added, report.removed), (1, 1));
        assert_eq!(cataloged(&catalog), vec!["/lib/a.wav", "/lib/d.wav"]);
    }

    #[test]
    fn test_bad_file_does_not_abort_pass() {
        let mut sync = synchronizer(&["/lib/a.wav", "/lib/corrupt.wav", "/lib/c.wav"]);
        let catalog = Mutex::new(Catalog::new());
        let report = run_pass(&mut sync, &catalog);

        assert_eq!(report.added, 3);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, PathBuf::from("/lib/corrupt.wav"));
        let catalog = lock_catalog(&catalog);
        assert!(!catalog.get(Path::new("/lib/corrupt.wav")).unwrap().is_analyzed());
        assert!(catalog.get(Path::new("/lib/c.wav")).unwrap().is_analyzed());
    }

    #[test]
    fn test_cancel_keeps_only_complete_records() {
        let paths = ["/lib/1.wav", "/lib/2.wav", "/lib/3.wav", "/lib/4.wav", "/lib/5.wav"];
        let mut sync = synchronizer(&paths);
        let catalog = Mutex::new(Catalog::new());
        let cancel = AtomicBool::new(false);
        let mut pass = sync.begin("/lib");

        while lock_catalog(&catalog).len() < 2 {
            sync.step(&mut pass, &catalog, &cancel).unwrap();
        }
        cancel.store(true, Ordering::SeqCst);
        assert_eq!(
            sync.step(&mut pass, &catalog, &cancel).unwrap(),
            SyncState::Cancelled
        );
        assert!(pass.report().cancelled);

        let catalog = lock_catalog(&catalog);
        assert_eq!(catalog.len(), 2);
        assert!(catalog.all().all(|r| r.is_analyzed() && r.tempo() == Some(120)));
    }

    #[test]
    fn test_progress_is_monotonic() {
        let mut sync = synchronizer(&["/lib/a.wav", "/lib/b.wav", "/lib/c.wav"]);
        let catalog = Mutex::new(Catalog::new());
        run_pass(&mut sync, &catalog);
        sync.fs_mut().set(&["/lib/a.wav", "/lib/e.wav"]);

        let mut seen = Vec::new();
        sync.run(Path::new("/lib"), &catalog, &AtomicBool::new(false), |p| {
            seen.push(p)
        })
        .unwrap();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(seen.last(), Some(&1.0));
    }

    #[test]
    fn test_unreadable_root_fails_pass() {
        let mut sync = synchronizer(&["/lib/a.wav"]);
        let catalog = Mutex::new(Catalog::new());
        run_pass(&mut sync, &catalog);
        sync.fs_mut().unreadable = true;

        let err = sync
            .run(Path::new("/lib"), &catalog, &AtomicBool::new(false), |_| {})
            .unwrap_err();
        assert!(matches!(err, LibraryError::DirectoryUnreadable(_)));
        assert_eq!(lock_catalog(&catalog).len(), 1);
    }

    #[test]
    fn test_externally_removed_record_is_readded() {
        let mut sync = synchronizer(&["/lib/a.wav", "/lib/b.wav"]);
        let catalog = Mutex::new(Catalog::new());
        run_pass(&mut sync, &catalog);

        lock_catalog(&catalog).remove(Path::new("/lib/a.wav")).unwrap();
        let report = run_pass(&mut sync, &catalog);
        assert_eq!(report.added, 1);
        assert_eq!(lock_catalog(&catalog).len(), 2);
    }

    #[test]
    fn test_background_task_reports_completion_once() {
        let sync = synchronizer(&["/lib/a.wav", "/lib/b.wav"]);
        let catalog: SharedCatalog = Arc::new(Mutex::new(Catalog::new()));
        let task = SyncTask::spawn(sync, PathBuf::from("/lib"), Arc::clone(&catalog));

        let events: Vec<SyncEvent> = task.events().iter().collect();
        let (_sync, report) = task.join();

        assert_eq!(report.unwrap().added, 2);
        let finished: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, SyncEvent::Finished { .. }))
            .collect();
        assert_eq!(finished, vec![&SyncEvent::Finished { cancelled: false }]);
        assert_eq!(events.last(), Some(&SyncEvent::Finished { cancelled: false }));
        assert_eq!(lock_catalog(&catalog).len(), 2);
    }

    /// Blocks inside `analyze` until released, announcing each call first.
    struct GatedAnalyzer {
        started: Mutex<mpsc::Sender<PathBuf>>,
        released: Arc<AtomicBool>,
    }

    impl Analyze for GatedAnalyzer {
        fn analyze(&self, path: &Path) -> Result<Analysis> {
            let _ = self.started.lock().unwrap().send(path.to_path_buf());
            while !self.released.load(Ordering::SeqCst) {
                thread::sleep(std::time::Duration::from_millis(5));
            }
            FakeAnalyzer::default().analyze(path)
        }
    }

    #[test]
    fn test_cancelled_background_task_keeps_complete_records() {
        let (started_tx, started) = mpsc::channel();
        let released = Arc::new(AtomicBool::new(false));
        let sync = Synchronizer::new(
            FakeFs::with(&["/lib/a.wav", "/lib/b.wav", "/lib/c.wav"]),
            GatedAnalyzer {
                started: Mutex::new(started_tx),
                released: Arc::clone(&released),
            },
        );
        let catalog: SharedCatalog = Arc::new(Mutex::new(Catalog::new()));
        let task = SyncTask::spawn(sync, PathBuf::from("/lib"), Arc::clone(&catalog));

        let first = started.recv().unwrap();
        task.cancel();
        released.store(true, Ordering::SeqCst);

        let events: Vec<SyncEvent> = task.events().iter().collect();
        let (sync, report) = task.join();
        let report = report.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.added, 1);
        let finished: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, SyncEvent::Finished { .. }))
            .collect();
        assert_eq!(finished, vec![&SyncEvent::Finished { cancelled: true }]);
        assert_eq!(events.last(), Some(&SyncEvent::Finished { cancelled: true }));

        let catalog = lock_catalog(&catalog);
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get(&first).unwrap().is_analyzed());
        assert!(catalog.all().all(SampleRecord::is_analyzed));
        assert_eq!(sync.known_paths().len(), 1);
        assert!(started.try_recv().is_err());
    }
}
