use std::fs;
use std::path::PathBuf;
use anyhow::{Result, bail};
use tracing::info;
use crate::config::Config;
use crate::error::LedgerError;
use crate::ledger::{self, Ledger, LedgerRow};
use crate::rename::{self, RenamePrompt, RenameReport};
use crate::scanner::{self, ImportScan};
use crate::upload::{self, FileUploader, UploadOutcome, UploadResult};

/// How new files get their export name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameMode {
    /// Ask for each file
    Individual,
    /// `base` + padded index, starting at 1
    Bulk { base: String },
}

#[derive(Debug, Default)]
pub struct PipelineReport {
    pub scan: ImportScan,
    pub rename: RenameReport,
    /// Rows appended to the ledger, in processing order
    pub rows: Vec<LedgerRow>,
    pub uploaded: usize,
    /// (file, reason)
    pub upload_failures: Vec<(String, String)>,
}

/// Load the ledger for a write flow.
///
/// A ledger file that exists with content but fails header validation is
/// refused, so nothing gets appended under a foreign header.
pub fn load_ledger(config: &Config) -> Result<Ledger> {
    let path = config.ledger_path();
    let ledger = Ledger::read(&path)?;
    let has_content = fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false);
    if has_content && !ledger.is_valid() {
        return Err(LedgerError::InvalidHeader.into());
    }
    Ok(ledger)
}

/// Make sure the folders exist and find files not yet in the ledger
pub fn prepare(config: &Config) -> Result<ImportScan> {
    config.ensure_dirs()?;
    let ledger = load_ledger(config)?;
    scanner::scan_import(&config.import_dir(), &ledger)
}

/// Copy the files in `scan` into the export folder under their new names
pub fn rename_new(
    config: &Config,
    scan: &ImportScan,
    mode: &RenameMode,
    prompt: &mut dyn RenamePrompt,
) -> Result<RenameReport> {
    let import_dir = config.import_dir();
    let export_dir = config.export_dir();

    match mode {
        RenameMode::Individual => rename::rename_interactive(&scan.to_process, &import_dir, &export_dir, prompt),
        RenameMode::Bulk { base } => {
            if base.trim().is_empty() {
                bail!("Base name cannot be empty");
            }
            rename::rename_sequential(&scan.to_process, &import_dir, &export_dir, base, 1)
        }
    }
}

/// Upload the renamed files (when an uploader is given) and append one row each.
///
/// Every renamed file gets a ledger row, uploaded or not; a failed upload
/// leaves the URL empty. Rows are appended in one write at the end.
pub fn upload_and_log<F>(
    config: &Config,
    scan: ImportScan,
    rename: RenameReport,
    uploader: Option<&dyn FileUploader>,
    on_upload: F,
) -> Result<PipelineReport>
where
    F: FnMut(usize, &UploadResult),
{
    let mut urls = vec![String::new(); rename.renamed.len()];
    let mut uploaded = 0;
    let mut upload_failures = Vec::new();

    if let Some(uploader) = uploader {
        let paths: Vec<PathBuf> = rename.renamed.iter().map(|r| r.dest_path.clone()).collect();
        let results = upload::upload_all(uploader, &paths, on_upload);
        for (i, result) in results.into_iter().enumerate() {
            let name = rename.renamed[i].final_name.clone();
            match result {
                Ok(UploadOutcome::Uploaded(url)) => {
                    urls[i] = url;
                    uploaded += 1;
                }
                Ok(UploadOutcome::Failed(reason)) => upload_failures.push((name, reason)),
                Err(e) => upload_failures.push((name, e.to_string())),
            }
        }
    } else {
        info!("Uploads disabled, logging rows without URL");
    }

    let rows: Vec<LedgerRow> = rename
        .renamed
        .iter()
        .zip(urls)
        .map(|(file, url)| LedgerRow::new(file.original_name.clone(), file.final_name.clone(), url))
        .collect();

    if !rows.is_empty() {
        ledger::append_rows(&config.ledger_path(), &rows)?;
    }
    info!(
        "Pipeline finished: {} renamed, {} skipped, {} uploaded",
        rename.renamed.len(),
        rename.skipped.len(),
        uploaded
    );

    Ok(PipelineReport { scan, rename, rows, uploaded, upload_failures })
}

/// Rename, upload and log the files in `scan` in one go
pub fn process<F>(
    config: &Config,
    scan: ImportScan,
    mode: &RenameMode,
    prompt: &mut dyn RenamePrompt,
    uploader: Option<&dyn FileUploader>,
    on_upload: F,
) -> Result<PipelineReport>
where
    F: FnMut(usize, &UploadResult),
{
    let rename = rename_new(config, &scan, mode, prompt)?;
    upload_and_log(config, scan, rename, uploader, on_upload)
}
