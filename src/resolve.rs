//! Output resolution: pick the one file that is the engine's result.
//!
//! The engine writes its output somewhere under the workspace with no
//! documented name, and depending on mode it may also leave derivative
//! images (crops, previews) next to the real one. Resolution is therefore a
//! ranking over every image-suffixed file in the tree:
//!
//! 1. most recently modified first,
//! 2. then larger file first,
//! 3. then lexicographically smallest path (only to make exact ties
//!    deterministic).
//!
//! The first-ranked candidate wins. Nothing is deleted or modified.

use crate::error::JobError;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// Extensions (compared case-insensitively) that count as engine output.
pub const ACCEPTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// One image file found after the engine ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size: u64,
}

fn has_accepted_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ACCEPTED_EXTENSIONS.iter().any(|a| a.eq_ignore_ascii_case(ext)))
}

/// Every accepted-suffix file under `dir`, recursively, minus `exclude`.
pub fn collect_candidates(dir: &Path, exclude: &[&Path]) -> Result<Vec<Candidate>, JobError> {
    let mut candidates = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() || !has_accepted_extension(entry.path()) {
            continue;
        }
        if exclude.iter().any(|ex| *ex == entry.path()) {
            continue;
        }
        let meta = entry.metadata().map_err(std::io::Error::from)?;
        candidates.push(Candidate {
            path: entry.into_path(),
            modified: meta.modified()?,
            size: meta.len(),
        });
    }
    Ok(candidates)
}

/// Ranking order: newest, then largest, then smallest path.
fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    b.modified
        .cmp(&a.modified)
        .then_with(|| b.size.cmp(&a.size))
        .then_with(|| a.path.cmp(&b.path))
}

/// Pick the winning candidate, if any.
pub fn select(mut candidates: Vec<Candidate>) -> Option<Candidate> {
    candidates.sort_by(rank);
    candidates.into_iter().next()
}

/// Resolve the engine's output file under `dir`.
///
/// `exclude` lists files that must never be returned. The local engine
/// passes the staged input here only when `workspace.exclude_input` is set.
pub fn resolve(dir: &Path, exclude: &[&Path]) -> Result<PathBuf, JobError> {
    let candidates = collect_candidates(dir, exclude)?;
    tracing::debug!(count = candidates.len(), "collected output candidates");
    select(candidates)
        .map(|c| c.path)
        .ok_or_else(|| JobError::NoOutputProduced(dir.to_path_buf()))
}
