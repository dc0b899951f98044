use std::path::PathBuf;

use log::{debug, warn};
use rayon::prelude::*;

use crate::analyzers::sample::Analyze;
use crate::library::record::Analysis;
use crate::Result;

pub trait ParallelProcessor {
    fn init_parallel_processing() {
        // The global pool can only be built once; later calls keep the existing one.
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(num_cpus::get())
            .build_global()
        {
            debug!("Keeping existing thread pool: {}", e);
        }
        debug!("Using {} CPU threads for analysis", rayon::current_num_threads());
    }

    /// Analyze every path in parallel. Results keep the input order.
    fn analyze_all<A: Analyze>(analyzer: &A, paths: &[PathBuf]) -> Vec<(PathBuf, Result<Analysis>)> {
        paths
            .par_iter()
            .map(|path| {
                let result = analyzer.analyze(path);
                if let Err(e) = &result {
                    warn!("Failed to analyse {}: {}", path.display(), e);
                }
                (path.clone(), result)
            })
            .collect()
    }
}
