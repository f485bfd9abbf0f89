use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, Context, bail};
use walkdir::WalkDir;
use tracing::{info, warn};
use crate::ledger::Ledger;
use crate::rename::copy_preserving;
use crate::scanner;
use crate::upload::{self, FileUploader, UploadOutcome, UploadResult};

/// One inconsistency between the ledger and the folders
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Problem {
    /// `copyable` when the export copy exists to restore it from
    MissingImport { row: usize, name: String, copyable: bool },
    /// `copyable` when the import original exists to restore it from
    MissingExport { row: usize, name: String, copyable: bool },
    EmptyRenamed { row: usize, original: String },
    MissingUrl { row: usize, name: String },
    UnlistedImport { name: String },
}

impl Problem {
    /// Whether [`quick_fix`] can do anything about it
    pub fn fixable(&self) -> bool {
        match self {
            Problem::MissingImport { copyable, .. } | Problem::MissingExport { copyable, .. } => *copyable,
            Problem::EmptyRenamed { original, .. } => !original.is_empty(),
            Problem::MissingUrl { .. } => true,
            Problem::UnlistedImport { .. } => false,
        }
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Rows are shown 1-based, header excluded
        match self {
            Problem::MissingImport { row, name, .. } => write!(f, "Missing import file: {} (entry {})", name, row + 1),
            Problem::MissingExport { row, name, .. } => write!(f, "Missing export file: {} (entry {})", name, row + 1),
            Problem::EmptyRenamed { row, original } => {
                write!(f, "Empty Renamed field (entry {}, original: {})", row + 1, original)
            }
            Problem::MissingUrl { row, name } => write!(f, "Missing URL: {} (entry {})", name, row + 1),
            Problem::UnlistedImport { name } => write!(f, "Unlisted import file: {} (run the pipeline to process it)", name),
        }
    }
}

/// Compare every ledger row with the import and export folders.
///
/// Missing URLs are only reported when `check_urls` is set and the export
/// file exists.
pub fn diagnose(ledger: &Ledger, import_dir: &Path, export_dir: &Path, check_urls: bool) -> Result<Vec<Problem>> {
    let mut problems = Vec::new();

    for (row, entry) in ledger.rows.iter().enumerate() {
        let import_exists = import_dir.join(&entry.original_name).is_file();
        let export_exists = !entry.renamed_name.is_empty() && export_dir.join(&entry.renamed_name).is_file();

        if !import_exists {
            problems.push(Problem::MissingImport {
                row,
                name: entry.original_name.clone(),
                copyable: export_exists,
            });
        }
        if entry.renamed_name.is_empty() {
            problems.push(Problem::EmptyRenamed { row, original: entry.original_name.clone() });
        } else if !export_exists {
            problems.push(Problem::MissingExport {
                row,
                name: entry.renamed_name.clone(),
                copyable: import_exists,
            });
        }
        if check_urls && export_exists && !entry.has_url() {
            problems.push(Problem::MissingUrl { row, name: entry.renamed_name.clone() });
        }
    }

    let logged = ledger.original_names();
    for name in scanner::list_files(import_dir)? {
        if !logged.contains(&name) {
            problems.push(Problem::UnlistedImport { name });
        }
    }

    info!("Health check found {} problem(s)", problems.len());
    Ok(problems)
}

#[derive(Debug, Default)]
pub struct FixReport {
    pub copied_to_export: usize,
    pub copied_to_import: usize,
    pub filled_renamed: usize,
    pub uploads_attempted: usize,
    pub uploaded: usize,
    /// (file, reason)
    pub failures: Vec<(String, String)>,
}

impl FixReport {
    /// Whether the ledger was modified and must be saved
    pub fn ledger_changed(&self) -> bool {
        self.filled_renamed > 0 || self.uploaded > 0
    }
}

/// Repair what can be repaired without asking.
///
/// Copies import <-> export when exactly one side exists, fills empty
/// `Renamed` fields from the original name, and uploads rows without a URL
/// when an uploader is given. Unlisted import files are left alone.
pub fn quick_fix<F>(
    ledger: &mut Ledger,
    import_dir: &Path,
    export_dir: &Path,
    uploader: Option<&dyn FileUploader>,
    on_upload: F,
) -> Result<FixReport>
where
    F: FnMut(usize, &UploadResult),
{
    let mut report = FixReport::default();
    let mut to_upload: Vec<(usize, PathBuf)> = Vec::new();

    for (row, entry) in ledger.rows.iter_mut().enumerate() {
        if entry.renamed_name.is_empty() && !entry.original_name.is_empty() {
            entry.renamed_name = entry.original_name.clone();
            entry.touch();
            report.filled_renamed += 1;
            info!("Filled empty Renamed field of entry {} with '{}'", row + 1, entry.original_name);
        }

        let import_file = import_dir.join(&entry.original_name);
        let export_file = export_dir.join(&entry.renamed_name);
        let import_exists = import_file.is_file();
        let mut export_exists = export_file.is_file();

        if !export_exists && import_exists {
            fs::create_dir_all(export_dir)?;
            match copy_preserving(&import_file, &export_file) {
                Ok(_) => {
                    info!("Copied '{}' to export as '{}'", entry.original_name, entry.renamed_name);
                    report.copied_to_export += 1;
                    export_exists = true;
                }
                Err(e) => report.failures.push((entry.renamed_name.clone(), format!("copy to export failed: {}", e))),
            }
        } else if export_exists && !import_exists {
            fs::create_dir_all(import_dir)?;
            match copy_preserving(&export_file, &import_file) {
                Ok(_) => {
                    info!("Copied '{}' back to import as '{}'", entry.renamed_name, entry.original_name);
                    report.copied_to_import += 1;
                }
                Err(e) => report.failures.push((entry.original_name.clone(), format!("copy to import failed: {}", e))),
            }
        }

        if uploader.is_some() && export_exists && !entry.has_url() {
            to_upload.push((row, export_file));
        }
    }

    if let Some(uploader) = uploader {
        let paths: Vec<PathBuf> = to_upload.iter().map(|(_, path)| path.clone()).collect();
        report.uploads_attempted = paths.len();
        let results = upload::upload_all(uploader, &paths, on_upload);
        for ((row, path), result) in to_upload.into_iter().zip(results) {
            apply_upload(ledger, row, &path, result, &mut report.uploaded, &mut report.failures);
        }
    }

    Ok(report)
}

fn apply_upload(
    ledger: &mut Ledger,
    row: usize,
    path: &Path,
    result: UploadResult,
    uploaded: &mut usize,
    failures: &mut Vec<(String, String)>,
) {
    let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    match result {
        Ok(UploadOutcome::Uploaded(url)) => {
            let entry = &mut ledger.rows[row];
            entry.url = url;
            entry.touch();
            *uploaded += 1;
        }
        Ok(UploadOutcome::Failed(reason)) => failures.push((name, reason)),
        Err(e) => failures.push((name, e.to_string())),
    }
}

#[derive(Debug, Default)]
pub struct BulkUploadReport {
    pub attempted: usize,
    pub uploaded: usize,
    pub already_had_url: usize,
    pub missing_file: usize,
    /// (file, reason)
    pub failures: Vec<(String, String)>,
}

/// Rows that still need an upload: no URL and an existing export file
pub fn pending_uploads(ledger: &Ledger, export_dir: &Path) -> (Vec<(usize, PathBuf)>, usize, usize) {
    let mut pending = Vec::new();
    let mut had_url = 0;
    let mut missing = 0;
    for (row, entry) in ledger.rows.iter().enumerate() {
        if entry.has_url() {
            had_url += 1;
            continue;
        }
        let path = export_dir.join(&entry.renamed_name);
        if entry.renamed_name.is_empty() || !path.is_file() {
            warn!("Export file for entry {} missing, skipping upload", row + 1);
            missing += 1;
            continue;
        }
        pending.push((row, path));
    }
    (pending, had_url, missing)
}

/// Upload every entry that has no URL yet. The ledger is updated in memory only.
pub fn bulk_upload<F>(ledger: &mut Ledger, export_dir: &Path, uploader: &dyn FileUploader, on_upload: F) -> BulkUploadReport
where
    F: FnMut(usize, &UploadResult),
{
    let (pending, already_had_url, missing_file) = pending_uploads(ledger, export_dir);
    let mut report = BulkUploadReport {
        attempted: pending.len(),
        already_had_url,
        missing_file,
        ..Default::default()
    };

    let paths: Vec<PathBuf> = pending.iter().map(|(_, path)| path.clone()).collect();
    let results = upload::upload_all(uploader, &paths, on_upload);
    for ((row, path), result) in pending.into_iter().zip(results) {
        apply_upload(ledger, row, &path, result, &mut report.uploaded, &mut report.failures);
    }

    info!(
        "Bulk upload: {} attempted, {} uploaded, {} failed",
        report.attempted,
        report.uploaded,
        report.failures.len()
    );
    report
}

/// One line of the folder tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub depth: usize,
    pub name: String,
    pub is_dir: bool,
    /// File size, or total content size for directories
    pub size: u64,
}

/// Everything under `root`, depth-first with names sorted, plus the total size
pub fn folder_tree(root: &Path) -> Result<(Vec<TreeEntry>, u64)> {
    if !root.is_dir() {
        bail!("{} is not a directory", root.display());
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        let is_dir = entry.file_type().is_dir();
        let size = if is_dir {
            fs_extra::dir::get_size(entry.path()).unwrap_or(0)
        } else {
            entry.metadata().map(|m| m.len()).unwrap_or(0)
        };
        entries.push(TreeEntry {
            depth: entry.depth(),
            name: entry.file_name().to_string_lossy().to_string(),
            is_dir,
            size,
        });
    }

    let total = fs_extra::dir::get_size(root)
        .with_context(|| format!("Failed to measure {}", root.display()))?;
    Ok((entries, total))
}

/// Permanently delete the working directory. Callers confirm first.
pub fn nuke(base_dir: &Path) -> Result<()> {
    if !base_dir.is_dir() {
        bail!("{} is not a directory", base_dir.display());
    }
    warn!("Deleting {} permanently", base_dir.display());
    fs::remove_dir_all(base_dir)
        .with_context(|| format!("Failed to delete {}", base_dir.display()))?;
    Ok(())
}

/// Problems grouped for the summary line
pub fn count_fixable(problems: &[Problem]) -> usize {
    problems.iter().filter(|p| p.fixable()).count()
}

/// Distinct names in `problems` that refer to import files not in the ledger
pub fn unlisted_names(problems: &[Problem]) -> BTreeSet<String> {
    problems
        .iter()
        .filter_map(|p| match p {
            Problem::UnlistedImport { name } => Some(name.clone()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UploadError;
    use crate::ledger::LedgerRow;
    use tempfile::tempdir;

    struct Echo;

    impl FileUploader for Echo {
        fn upload(&self, path: &Path) -> Result<UploadOutcome, UploadError> {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            if name.starts_with("bad") {
                Ok(UploadOutcome::Failed("rejected".to_string()))
            } else {
                Ok(UploadOutcome::Uploaded(format!("https://s-ul.eu/{}", name)))
            }
        }
    }

    struct Folders {
        _dir: tempfile::TempDir,
        import: PathBuf,
        export: PathBuf,
    }

    fn folders() -> Folders {
        let dir = tempdir().unwrap();
        let import = dir.path().join("Images import");
        let export = dir.path().join("Images export");
        fs::create_dir_all(&import).unwrap();
        fs::create_dir_all(&export).unwrap();
        Folders { _dir: dir, import, export }
    }

    fn ledger_of(rows: &[(&str, &str, &str)]) -> Ledger {
        let mut ledger = Ledger::empty();
        for (original, renamed, url) in rows {
            ledger.rows.push(LedgerRow::new(*original, *renamed, *url));
        }
        ledger
    }

    #[test]
    fn diagnose_reports_each_kind() {
        let f = folders();
        fs::write(f.import.join("a.png"), b"a").unwrap();
        fs::write(f.export.join("B.png"), b"b").unwrap();
        fs::write(f.import.join("stray.png"), b"s").unwrap();
        let ledger = ledger_of(&[("a.png", "A.png", ""), ("b.png", "B.png", ""), ("c.png", "", "")]);

        let problems = diagnose(&ledger, &f.import, &f.export, true).unwrap();
        assert!(problems.contains(&Problem::MissingExport { row: 0, name: "A.png".into(), copyable: true }));
        assert!(problems.contains(&Problem::MissingImport { row: 1, name: "b.png".into(), copyable: true }));
        assert!(problems.contains(&Problem::MissingUrl { row: 1, name: "B.png".into() }));
        assert!(problems.contains(&Problem::EmptyRenamed { row: 2, original: "c.png".into() }));
        assert!(problems.contains(&Problem::UnlistedImport { name: "stray.png".into() }));
        assert!(!problems.iter().any(|p| matches!(p, Problem::MissingUrl { row: 0, .. })));
        assert_eq!(unlisted_names(&problems).len(), 1);
    }

    #[test]
    fn lost_on_both_sides_is_not_fixable() {
        let f = folders();
        let ledger = ledger_of(&[("gone.png", "GONE.png", "https://s-ul.eu/gone")]);

        let problems = diagnose(&ledger, &f.import, &f.export, true).unwrap();
        assert_eq!(problems.len(), 2);
        assert!(problems.contains(&Problem::MissingImport { row: 0, name: "gone.png".into(), copyable: false }));
        assert!(problems.contains(&Problem::MissingExport { row: 0, name: "GONE.png".into(), copyable: false }));
        assert_eq!(count_fixable(&problems), 0);
    }

    #[test]
    fn diagnose_ignores_urls_when_uploads_off() {
        let f = folders();
        fs::write(f.import.join("a.png"), b"a").unwrap();
        fs::write(f.export.join("A.png"), b"a").unwrap();
        let ledger = ledger_of(&[("a.png", "A.png", "")]);
        assert!(diagnose(&ledger, &f.import, &f.export, false).unwrap().is_empty());
    }

    #[test]
    fn quick_fix_copies_both_ways_and_fills_names() {
        let f = folders();
        fs::write(f.import.join("a.png"), b"a").unwrap();
        fs::write(f.export.join("B.png"), b"b").unwrap();
        fs::write(f.import.join("c.png"), b"c").unwrap();
        let mut ledger = ledger_of(&[("a.png", "A.png", "x"), ("b.png", "B.png", "y"), ("c.png", "", "z")]);

        let report = quick_fix(&mut ledger, &f.import, &f.export, None, |_, _| {}).unwrap();
        assert_eq!(report.copied_to_export, 2);
        assert_eq!(report.copied_to_import, 1);
        assert_eq!(report.filled_renamed, 1);
        assert!(f.export.join("A.png").exists());
        assert!(f.import.join("b.png").exists());
        assert!(f.export.join("c.png").exists());
        assert_eq!(ledger.rows[2].renamed_name, "c.png");
        assert!(report.ledger_changed());
    }

    #[test]
    fn quick_fix_uploads_missing_urls() {
        let f = folders();
        fs::write(f.export.join("A.png"), b"a").unwrap();
        fs::write(f.export.join("bad.png"), b"b").unwrap();
        let mut ledger = ledger_of(&[("a.png", "A.png", ""), ("b.png", "bad.png", "")]);

        let report = quick_fix(&mut ledger, &f.import, &f.export, Some(&Echo), |_, _| {}).unwrap();
        assert_eq!(report.uploads_attempted, 2);
        assert_eq!(report.uploaded, 1);
        assert_eq!(ledger.rows[0].url, "https://s-ul.eu/A.png");
        assert_eq!(ledger.rows[1].url, "");
        assert_eq!(report.failures.len(), 1);
    }

    #[test]
    fn bulk_upload_skips_done_and_missing() {
        let f = folders();
        fs::write(f.export.join("A.png"), b"a").unwrap();
        fs::write(f.export.join("C.png"), b"c").unwrap();
        let mut ledger = ledger_of(&[
            ("a.png", "A.png", ""),
            ("b.png", "B.png", ""),
            ("c.png", "C.png", "https://s-ul.eu/old"),
        ]);

        let mut seen = 0;
        let report = bulk_upload(&mut ledger, &f.export, &Echo, |_, _| seen += 1);
        assert_eq!(seen, 1);
        assert_eq!(report.attempted, 1);
        assert_eq!(report.uploaded, 1);
        assert_eq!(report.already_had_url, 1);
        assert_eq!(report.missing_file, 1);
        assert_eq!(ledger.rows[0].url, "https://s-ul.eu/A.png");
        assert_eq!(ledger.rows[2].url, "https://s-ul.eu/old");

        let again = bulk_upload(&mut ledger, &f.export, &Echo, |_, _| {});
        assert_eq!(again.attempted, 0);
    }

    #[test]
    fn tree_lists_sorted_entries_with_sizes() {
        let f = folders();
        fs::write(f.import.join("b.png"), b"bb").unwrap();
        fs::write(f.import.join("a.png"), b"a").unwrap();
        let root = f.import.parent().unwrap();

        let (entries, total) = folder_tree(root).unwrap();
        let names: Vec<_> = entries.iter().map(|e| (e.depth, e.name.as_str())).collect();
        assert_eq!(names, [(1, "Images export"), (1, "Images import"), (2, "a.png"), (2, "b.png")]);
        assert!(entries[1].is_dir);
        assert_eq!(entries[2].size, 1);
        assert_eq!(entries[3].size, 2);
        assert!(total >= 3);
    }

    #[test]
    fn nuke_removes_directory() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("work");
        fs::create_dir_all(base.join("Images import")).unwrap();
        fs::write(base.join("index.csv"), b"x").unwrap();

        nuke(&base).unwrap();
        assert!(!base.exists());
        assert!(nuke(&base).is_err());
    }
}
