//! Run Planner
//!
//! Discovers reference directories and their candidate implementations.
//!
//! Filtering options:
//! - Regex pattern matching on the reference name
//!
//! Ordering: references and candidates are sorted by name for deterministic
//! execution.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use regex::Regex;

/// Source extensions accepted as candidates
pub const CANDIDATE_EXTENSIONS: &[&str] = &["c", "s", "S"];

/// One reference and the candidates found for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedReference {
    /// Directory name, which is also the function name
    pub name: String,
    /// Reference directory holding `props` and `ref.c`
    pub directory: PathBuf,
    /// Candidate sources, sorted by file name
    pub candidates: Vec<PathBuf>,
}

/// Execution plan for a run
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    /// Ordered references to evaluate
    pub references: Vec<PlannedReference>,
}

impl ExecutionPlan {
    /// Total candidates across all references
    pub fn candidate_count(&self) -> usize {
        self.references.iter().map(|r| r.candidates.len()).sum()
    }
}

/// Build the execution plan.
///
/// Every subdirectory of `references` is a reference. Its candidates are the
/// files `<implementations>/<name>/<name>*.{c,s,S}`; a missing
/// implementation directory yields no candidates.
pub fn build_plan(
    references: &Path,
    implementations: Option<&Path>,
    filter: Option<&Regex>,
) -> io::Result<ExecutionPlan> {
    let mut planned = Vec::new();

    for entry in fs::read_dir(references)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();

        // Apply regex filter on reference name
        if let Some(re) = filter {
            if !re.is_match(&name) {
                continue;
            }
        }

        let candidates = match implementations {
            Some(dir) => find_candidates(&dir.join(&name), &name)?,
            None => Vec::new(),
        };

        planned.push(PlannedReference {
            name,
            directory: entry.path(),
            candidates,
        });
    }

    // Sort alphabetically for deterministic execution order
    planned.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(ExecutionPlan {
        references: planned,
    })
}

/// Candidate sources for `name` inside `dir`
pub fn find_candidates(dir: &Path, name: &str) -> io::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut candidates = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if is_candidate(&path, name) {
            candidates.push(path);
        }
    }
    candidates.sort();
    Ok(candidates)
}

fn is_candidate(path: &Path, name: &str) -> bool {
    let extension = path.extension().and_then(|e| e.to_str());
    let stem = path.file_stem().and_then(|s| s.to_str());
    match (extension, stem) {
        (Some(ext), Some(stem)) => {
            CANDIDATE_EXTENSIONS.contains(&ext) && stem.starts_with(name) && path.is_file()
        }
        _ => false,
    }
}
