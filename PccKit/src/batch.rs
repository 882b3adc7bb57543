//! Batch package operations
//!
//! Discovery of package files and parallel repacking. Files are processed
//! independently; a failure on one is recorded and the batch carries on.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use walkdir::WalkDir;

use crate::package::{OpenOptions, SaveMode, SaveOptions, SaveOutcome};

/// File extensions recognized as packages
pub const PACKAGE_EXTENSIONS: &[&str] = &["pcc", "upk", "sfm"];

/// Result of a batch repack
#[derive(Debug, Clone, Default)]
pub struct BatchRepackResult {
    /// Files rewritten
    pub success_count: usize,
    /// Files that could not be opened or saved
    pub fail_count: usize,
    /// Files left as they were (unchanged or compression skipped)
    pub skipped_count: usize,
    /// Message for each file processed
    pub results: Vec<String>,
}

/// Progress of a batch repack
#[derive(Debug, Clone)]
pub struct RepackProgress {
    pub current: usize,
    pub total: usize,
    /// File being processed
    pub file: String,
}

/// Find all package files in a directory recursively
///
/// # Returns
/// A sorted list of paths with a `.pcc`, `.upk` or `.sfm` extension.
pub fn find_package_files<P: AsRef<Path>>(dir: P) -> Vec<PathBuf> {
    let mut files: Vec<_> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.path().is_file() && is_package_file(e.path()))
        .map(|e| e.path().to_path_buf())
        .collect();

    files.sort();
    files
}

/// Whether a path has a package extension
pub fn is_package_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| {
        PACKAGE_EXTENSIONS
            .iter()
            .any(|known| ext.eq_ignore_ascii_case(known))
    })
}

/// Repack package files in place, in parallel, with the default codecs
pub fn batch_repack<F>(
    files: &[PathBuf],
    mode: SaveMode,
    options: &SaveOptions,
    progress: F,
) -> BatchRepackResult
where
    F: Fn(&RepackProgress) + Send + Sync,
{
    batch_repack_with(files, &OpenOptions::default(), mode, options, progress)
}

/// Repack package files in place, opening each with `open`
pub fn batch_repack_with<F>(
    files: &[PathBuf],
    open: &OpenOptions,
    mode: SaveMode,
    options: &SaveOptions,
    progress: F,
) -> BatchRepackResult
where
    F: Fn(&RepackProgress) + Send + Sync,
{
    let success_counter = AtomicUsize::new(0);
    let fail_counter = AtomicUsize::new(0);
    let skipped_counter = AtomicUsize::new(0);
    let processed = AtomicUsize::new(0);
    let total = files.len();

    let results: Vec<String> = files
        .par_iter()
        .map(|path| {
            let display_path = path.display().to_string();
            let current = processed.fetch_add(1, Ordering::SeqCst) + 1;
            progress(&RepackProgress {
                current,
                total,
                file: display_path.clone(),
            });

            let outcome = open
                .clone()
                .open(path)
                .and_then(|mut package| package.save_to_file(path, mode, options));

            match outcome {
                Ok(SaveOutcome::Written { size, .. }) => {
                    success_counter.fetch_add(1, Ordering::SeqCst);
                    format!("Repacked: {display_path} ({size} bytes)")
                }
                Ok(SaveOutcome::Unchanged) => {
                    skipped_counter.fetch_add(1, Ordering::SeqCst);
                    format!("Unchanged: {display_path}")
                }
                Ok(SaveOutcome::Skipped) => {
                    skipped_counter.fetch_add(1, Ordering::SeqCst);
                    format!("Skipped: {display_path}")
                }
                Err(e) => {
                    tracing::warn!("Failed to repack {}: {}", display_path, e);
                    fail_counter.fetch_add(1, Ordering::SeqCst);
                    format!("Failed {display_path}: {e}")
                }
            }
        })
        .collect();

    BatchRepackResult {
        success_count: success_counter.load(Ordering::SeqCst),
        fail_count: fail_counter.load(Ordering::SeqCst),
        skipped_count: skipped_counter.load(Ordering::SeqCst),
        results,
    }
}
