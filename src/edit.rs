use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, Context, bail};
use tracing::{info, warn};
use crate::ledger::{Ledger, LedgerRow};
use crate::rename::split_name;
use crate::upload::{FileUploader, UploadOutcome};

#[derive(Debug, PartialEq, Eq)]
pub struct EntryRename {
    pub old_name: String,
    pub new_name: String,
    /// False when the export file was missing and only the row changed
    pub file_moved: bool,
}

/// Rename one entry's export file to `new_base` + its current extension.
///
/// A missing export file only produces a warning; the row is still updated.
pub fn rename_entry(ledger: &mut Ledger, index: usize, new_base: &str, export_dir: &Path) -> Result<EntryRename> {
    let new_base = new_base.trim();
    if new_base.is_empty() {
        bail!("New name cannot be empty");
    }

    let row = ledger.row_mut(index)?;
    let old_name = row.renamed_name.clone();
    let (_, ext) = split_name(&old_name);
    let new_name = format!("{}{}", new_base, ext);

    if new_name == old_name {
        return Ok(EntryRename { old_name, new_name, file_moved: false });
    }

    let dest = export_dir.join(&new_name);
    if dest.exists() {
        bail!("'{}' already exists in the export folder", new_name);
    }

    let src = export_dir.join(&old_name);
    let file_moved = if src.is_file() {
        fs::rename(&src, &dest)
            .with_context(|| format!("Failed to rename '{}' to '{}'", old_name, new_name))?;
        true
    } else {
        warn!("Export file '{}' missing, updating ledger only", old_name);
        false
    };

    info!("Entry {} renamed '{}' -> '{}'", index + 1, old_name, new_name);
    row.renamed_name = new_name.clone();
    row.touch();
    Ok(EntryRename { old_name, new_name, file_moved })
}

/// Set the URL by hand; blank removes it
pub fn set_url(ledger: &mut Ledger, index: usize, url: &str) -> Result<()> {
    let row = ledger.row_mut(index)?;
    row.url = url.trim().to_string();
    row.touch();
    info!("Entry {} URL set to '{}'", index + 1, row.url);
    Ok(())
}

/// Upload the entry's export file again. The row only changes on success.
pub fn reupload_entry(
    ledger: &mut Ledger,
    index: usize,
    export_dir: &Path,
    uploader: &dyn FileUploader,
) -> Result<UploadOutcome> {
    let path = export_dir.join(&ledger.row(index)?.renamed_name);
    let outcome = uploader.upload(&path)?;
    if let UploadOutcome::Uploaded(url) = &outcome {
        let row = ledger.row_mut(index)?;
        row.url = url.clone();
        row.touch();
    }
    Ok(outcome)
}

/// Remove a row from the ledger and hand it back
pub fn delete_entry(ledger: &mut Ledger, index: usize) -> Result<LedgerRow> {
    ledger.row(index)?;
    let row = ledger.rows.remove(index);
    info!("Entry {} ('{}') removed from ledger", index + 1, row.original_name);
    Ok(row)
}

/// Send an entry's import and export files to the OS trash.
///
/// Returns (path, reason) for every file that could not be trashed.
pub fn trash_entry_files(row: &LedgerRow, import_dir: &Path, export_dir: &Path) -> Vec<(PathBuf, String)> {
    let mut failed = Vec::new();
    for path in [import_dir.join(&row.original_name), export_dir.join(&row.renamed_name)] {
        if !path.is_file() {
            continue;
        }
        match trash::delete(&path) {
            Ok(()) => info!("Moved {} to trash", path.display()),
            Err(e) => {
                warn!("Could not trash {}: {}", path.display(), e);
                failed.push((path, e.to_string()));
            }
        }
    }
    failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UploadError;
    use tempfile::tempdir;

    fn ledger_of(rows: &[(&str, &str, &str)]) -> Ledger {
        let mut ledger = Ledger::empty();
        for (original, renamed, url) in rows {
            ledger.rows.push(LedgerRow {
                timestamp: "2020-01-01 00:00:00.000000".to_string(),
                original_name: original.to_string(),
                renamed_name: renamed.to_string(),
                url: url.to_string(),
            });
        }
        ledger
    }

    struct FixedUploader(UploadOutcome);

    impl FileUploader for FixedUploader {
        fn upload(&self, path: &Path) -> Result<UploadOutcome, UploadError> {
            if !path.is_file() {
                return Err(UploadError::MissingFile(path.to_path_buf()));
            }
            Ok(self.0.clone())
        }
    }

    #[test]
    fn rename_moves_file_and_keeps_extension() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("old.png"), b"x").unwrap();
        let mut ledger = ledger_of(&[("a.png", "old.png", "")]);

        let result = rename_entry(&mut ledger, 0, "Tigers", dir.path()).unwrap();
        assert_eq!(result.new_name, "Tigers.png");
        assert!(result.file_moved);
        assert!(dir.path().join("Tigers.png").exists());
        assert!(!dir.path().join("old.png").exists());
        assert_eq!(ledger.rows[0].renamed_name, "Tigers.png");
        assert_ne!(ledger.rows[0].timestamp, "2020-01-01 00:00:00.000000");
    }

    #[test]
    fn rename_refuses_existing_target() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("old.png"), b"x").unwrap();
        fs::write(dir.path().join("taken.png"), b"y").unwrap();
        let mut ledger = ledger_of(&[("a.png", "old.png", "")]);

        assert!(rename_entry(&mut ledger, 0, "taken", dir.path()).is_err());
        assert_eq!(ledger.rows[0].renamed_name, "old.png");
    }

    #[test]
    fn rename_with_missing_file_updates_row_only() {
        let dir = tempdir().unwrap();
        let mut ledger = ledger_of(&[("a.png", "gone.png", "")]);

        let result = rename_entry(&mut ledger, 0, "new", dir.path()).unwrap();
        assert!(!result.file_moved);
        assert_eq!(ledger.rows[0].renamed_name, "new.png");
    }

    #[test]
    fn blank_url_clears_it() {
        let mut ledger = ledger_of(&[("a.png", "A.png", "http://x")]);
        set_url(&mut ledger, 0, "   ").unwrap();
        assert!(!ledger.rows[0].has_url());
        assert!(set_url(&mut ledger, 3, "http://y").is_err());
    }

    #[test]
    fn reupload_updates_only_on_success() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("A.png"), b"x").unwrap();
        let mut ledger = ledger_of(&[("a.png", "A.png", "")]);

        let failing = FixedUploader(UploadOutcome::Failed("nope".to_string()));
        reupload_entry(&mut ledger, 0, dir.path(), &failing).unwrap();
        assert_eq!(ledger.rows[0].url, "");

        let working = FixedUploader(UploadOutcome::Uploaded("https://s-ul.eu/A".to_string()));
        reupload_entry(&mut ledger, 0, dir.path(), &working).unwrap();
        assert_eq!(ledger.rows[0].url, "https://s-ul.eu/A");
    }

    #[test]
    fn reupload_of_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let mut ledger = ledger_of(&[("a.png", "A.png", "")]);
        let uploader = FixedUploader(UploadOutcome::Uploaded("u".to_string()));
        assert!(reupload_entry(&mut ledger, 0, dir.path(), &uploader).is_err());
    }

    #[test]
    fn delete_removes_row() {
        let mut ledger = ledger_of(&[("a.png", "A.png", ""), ("b.png", "B.png", "")]);
        let removed = delete_entry(&mut ledger, 0).unwrap();
        assert_eq!(removed.original_name, "a.png");
        assert_eq!(ledger.len(), 1);
        assert!(delete_entry(&mut ledger, 5).is_err());
    }

    #[test]
    fn trash_skips_files_that_are_already_gone() {
        let dir = tempdir().unwrap();
        let import = dir.path().join("import");
        let export = dir.path().join("export");
        fs::create_dir_all(&import).unwrap();
        fs::create_dir_all(&export).unwrap();
        fs::write(export.join("keep.png"), b"k").unwrap();

        let gone = LedgerRow::new("gone.png", "GONE.png", "");
        assert!(trash_entry_files(&gone, &import, &export).is_empty());

        let blank = LedgerRow::new("gone.png", "", "");
        assert!(trash_entry_files(&blank, &import, &export).is_empty());
        assert!(export.join("keep.png").exists());
    }
}
