use std::collections::BTreeSet;
use std::path::Path;
use walkdir::WalkDir;
use anyhow::{Result, Context};
use tracing::{debug, info};
use crate::ledger::Ledger;

/// Result of comparing the import folder against the ledger
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportScan {
    /// New files, sorted by name
    pub to_process: Vec<String>,
    /// Files whose original name is already in the ledger
    pub already_logged: Vec<String>,
}

impl ImportScan {
    pub fn is_empty(&self) -> bool {
        self.to_process.is_empty()
    }
}

/// Regular files directly inside `dir`, sorted by name.
///
/// Sub-directories are ignored. A missing directory yields an empty list.
pub fn list_files(dir: &Path) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("Failed to list {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        names.push(entry.file_name().to_string_lossy().to_string());
    }
    names.sort();
    Ok(names)
}

/// Keep the candidates whose name is not already logged.
///
/// Output is sorted and deduplicated, so running it twice is a no-op.
pub fn filter_new<I, S>(candidates: I, logged: &BTreeSet<String>) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    candidates
        .into_iter()
        .map(|name| name.as_ref().to_string())
        .filter(|name| !logged.contains(name))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// List the import folder and split it into new and already-logged files
pub fn scan_import(import_dir: &Path, ledger: &Ledger) -> Result<ImportScan> {
    let logged = ledger.original_names();
    let files = list_files(import_dir)?;

    let to_process = filter_new(&files, &logged);
    let already_logged: Vec<String> = files
        .into_iter()
        .filter(|name| logged.contains(name))
        .collect();

    for name in &already_logged {
        debug!("Already logged, skipping: {}", name);
    }
    info!(
        "Import scan: {} new, {} already logged",
        to_process.len(),
        already_logged.len()
    );

    Ok(ImportScan { to_process, already_logged })
}
