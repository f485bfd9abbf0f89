use std::collections::{BTreeSet, HashSet};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use anyhow::{Result, bail};
use tracing::{debug, info, warn};
use crate::ledger::Ledger;
use crate::scanner;
use crate::{MAX_CONFLICT_ATTEMPTS, MAX_INTERACTIVE_ATTEMPTS};

/// How a taken name is varied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionStyle {
    /// `stem_1.ext`, `stem_2.ext`, ...
    Numbered,
    /// `stem_conflict_1.ext`, `stem_conflict_2.ext`, ...
    Conflict,
}

/// A file copied into the export folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamedFile {
    pub original_name: String,
    pub final_name: String,
    pub dest_path: PathBuf,
}

#[derive(Debug, Default)]
pub struct RenameReport {
    pub renamed: Vec<RenamedFile>,
    /// (original name, reason)
    pub skipped: Vec<(String, String)>,
}

/// Source of user decisions for the one-by-one flow
pub trait RenamePrompt {
    /// New base name for `original`, without extension. Blank keeps the original name.
    fn new_name(&mut self, original: &str) -> Result<String>;
    /// Whether an existing export file called `target` may be replaced
    fn confirm_overwrite(&mut self, target: &str) -> Result<bool>;
}

/// Split like `a.tar.gz` -> (`a.tar`, `.gz`); dotfiles keep their name as stem
pub fn split_name(name: &str) -> (String, String) {
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| name.to_string());
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (stem, ext)
}

/// The `attempt`-th alternative for `stem` + `ext`
pub fn candidate_name(stem: &str, ext: &str, style: CollisionStyle, attempt: usize) -> String {
    match style {
        CollisionStyle::Numbered => format!("{}_{}{}", stem, attempt, ext),
        CollisionStyle::Conflict => format!("{}_conflict_{}{}", stem, attempt, ext),
    }
}

/// First name not present in `existing`, starting with `proposed` itself.
///
/// Returns `None` once `max_attempts` alternatives are all taken.
pub fn resolve_collision(
    proposed: &str,
    existing: &BTreeSet<String>,
    style: CollisionStyle,
    max_attempts: usize,
) -> Option<String> {
    if !existing.contains(proposed) {
        return Some(proposed.to_string());
    }
    let (stem, ext) = split_name(proposed);
    (1..=max_attempts)
        .map(|attempt| candidate_name(&stem, &ext, style, attempt))
        .find(|candidate| !existing.contains(candidate))
}

/// Number of digits needed to print `n`
pub fn pad_width(n: usize) -> usize {
    n.max(1).to_string().len()
}

/// `base` + zero-padded `index` + `ext`
pub fn sequential_name(base: &str, index: usize, width: usize, ext: &str) -> String {
    format!("{}{:0width$}{}", base, index, ext, width = width)
}

/// Copy `src` to `dest` and carry over the modification time
pub fn copy_preserving(src: &Path, dest: &Path) -> io::Result<u64> {
    let bytes = fs::copy(src, dest)?;
    let carried = fs::metadata(src)
        .and_then(|meta| meta.modified())
        .and_then(|mtime| File::options().write(true).open(dest)?.set_modified(mtime));
    if let Err(e) = carried {
        debug!("Could not carry mtime to {}: {}", dest.display(), e);
    }
    Ok(bytes)
}

fn existing_names(export_dir: &Path) -> Result<BTreeSet<String>> {
    Ok(scanner::list_files(export_dir)?.into_iter().collect())
}

fn copy_into(
    report: &mut RenameReport,
    existing: &mut BTreeSet<String>,
    original: &str,
    src: &Path,
    export_dir: &Path,
    final_name: String,
) {
    let dest_path = export_dir.join(&final_name);
    match copy_preserving(src, &dest_path) {
        Ok(_) => {
            info!("Copied '{}' -> '{}'", original, final_name);
            existing.insert(final_name.clone());
            report.renamed.push(RenamedFile {
                original_name: original.to_string(),
                final_name,
                dest_path,
            });
        }
        Err(e) => {
            warn!("Copy failed for '{}': {}", original, e);
            report.skipped.push((original.to_string(), format!("copy failed: {}", e)));
        }
    }
}

/// Ask for a name and settle clashes; `None` once the attempts run out
fn choose_target(prompt: &mut dyn RenamePrompt, original: &str, existing: &BTreeSet<String>) -> Result<Option<String>> {
    let (original_stem, ext) = split_name(original);
    let answer = prompt.new_name(original)?;
    let answer = answer.trim();
    let (stem, mut target) = if answer.is_empty() {
        (original_stem, original.to_string())
    } else {
        (answer.to_string(), format!("{}{}", answer, ext))
    };

    let mut attempt = 0;
    while existing.contains(&target) {
        if prompt.confirm_overwrite(&target)? {
            info!("Overwriting existing export '{}'", target);
            break;
        }
        attempt += 1;
        if attempt > MAX_INTERACTIVE_ATTEMPTS {
            return Ok(None);
        }
        target = candidate_name(&stem, &ext, CollisionStyle::Numbered, attempt);
    }
    Ok(Some(target))
}

/// Ask for a name per file and copy it into `export_dir`.
///
/// On a clash the user may overwrite; otherwise `_1`, `_2`, ... suffixes are
/// tried (each one may clash and prompt again) until the attempts run out.
/// A failing prompt stops the run: that file and the rest are reported as
/// skipped, and the files already copied are returned.
pub fn rename_interactive(
    files: &[String],
    import_dir: &Path,
    export_dir: &Path,
    prompt: &mut dyn RenamePrompt,
) -> Result<RenameReport> {
    fs::create_dir_all(export_dir)?;
    let mut existing = existing_names(export_dir)?;
    let mut report = RenameReport::default();

    for (i, original) in files.iter().enumerate() {
        let src = import_dir.join(original);
        if !src.is_file() {
            warn!("'{}' not found in import folder, skipping", original);
            report.skipped.push((original.clone(), "not found in import folder".to_string()));
            continue;
        }

        let target = match choose_target(prompt, original, &existing) {
            Ok(Some(target)) => target,
            Ok(None) => {
                warn!("Too many name conflicts for '{}', skipping", original);
                report.skipped.push((original.clone(), "too many name conflicts".to_string()));
                continue;
            }
            Err(e) => {
                warn!("Renaming stopped at '{}': {:#}", original, e);
                for rest in &files[i..] {
                    report.skipped.push((rest.clone(), "renaming cancelled".to_string()));
                }
                break;
            }
        };

        copy_into(&mut report, &mut existing, original, &src, export_dir, target);
    }

    Ok(report)
}

/// Copy every file as `base` + padded index, starting at `start`.
///
/// Padding is wide enough for the largest index. Clashes get a
/// `_conflict_N` suffix and never overwrite.
pub fn rename_sequential(
    files: &[String],
    import_dir: &Path,
    export_dir: &Path,
    base: &str,
    start: usize,
) -> Result<RenameReport> {
    let base = base.trim();
    if base.is_empty() {
        bail!("Base name cannot be empty");
    }

    fs::create_dir_all(export_dir)?;
    let mut existing = existing_names(export_dir)?;
    let mut report = RenameReport::default();
    let width = pad_width((start + files.len()).saturating_sub(1));

    for (offset, original) in files.iter().enumerate() {
        let src = import_dir.join(original);
        if !src.is_file() {
            warn!("'{}' not found in import folder, skipping", original);
            report.skipped.push((original.clone(), "not found in import folder".to_string()));
            continue;
        }

        let (_, ext) = split_name(original);
        let proposed = sequential_name(base, start + offset, width, &ext);
        let Some(target) = resolve_collision(&proposed, &existing, CollisionStyle::Conflict, MAX_CONFLICT_ATTEMPTS) else {
            warn!("Too many name conflicts for '{}', skipping", proposed);
            report.skipped.push((original.clone(), format!("too many conflicts for {}", proposed)));
            continue;
        };
        if target != proposed {
            warn!("'{}' already exists, using '{}'", proposed, target);
        }

        copy_into(&mut report, &mut existing, original, &src, export_dir, target);
    }

    Ok(report)
}

#[derive(Debug, Default)]
pub struct BulkRenameReport {
    pub renamed: usize,
    pub already_correct: usize,
    /// Renamed names whose export file was missing
    pub missing: Vec<String>,
    /// (name, reason)
    pub errors: Vec<(String, String)>,
}

impl BulkRenameReport {
    pub fn changed(&self) -> bool {
        self.renamed > 0 || !self.errors.is_empty()
    }
}

/// Rename every ledger entry's export file to `base` + padded position.
///
/// Files whose target is taken are parked under a temporary name first, so
/// entries can swap names. The ledger is updated in memory; the caller saves.
pub fn rename_ledger_entries(ledger: &mut Ledger, export_dir: &Path, base: &str) -> Result<BulkRenameReport> {
    let base = base.trim();
    if base.is_empty() {
        bail!("Base name cannot be empty");
    }

    let width = pad_width(ledger.rows.len());
    let plan: Vec<String> = ledger
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| sequential_name(base, i + 1, width, &split_name(&row.renamed_name).1))
        .collect();

    let mut seen = HashSet::new();
    for target in &plan {
        if !seen.insert(target) {
            bail!("Two entries would both be renamed to '{}', aborting", target);
        }
    }

    // Taken before any file moves; an earlier rename may land on a missing row's name
    let present: Vec<bool> = ledger
        .rows
        .iter()
        .map(|row| export_dir.join(&row.renamed_name).is_file())
        .collect();

    let mut report = BulkRenameReport::default();
    let mut parked = Vec::new();

    for (i, target) in plan.iter().enumerate() {
        let row = &mut ledger.rows[i];
        if row.renamed_name == *target {
            report.already_correct += 1;
            continue;
        }

        let src = export_dir.join(&row.renamed_name);
        if !present[i] {
            warn!("Export file '{}' missing, skipping", row.renamed_name);
            report.missing.push(row.renamed_name.clone());
            continue;
        }

        let dest = export_dir.join(target);
        if dest.exists() {
            let temp_name = format!(".rename_tmp_{}_{}", i, target);
            match fs::rename(&src, export_dir.join(&temp_name)) {
                Ok(()) => {
                    row.renamed_name = temp_name.clone();
                    parked.push((i, temp_name));
                }
                Err(e) => report.errors.push((row.renamed_name.clone(), e.to_string())),
            }
            continue;
        }

        match fs::rename(&src, &dest) {
            Ok(()) => {
                info!("Renamed '{}' -> '{}'", row.renamed_name, target);
                row.renamed_name = target.clone();
                row.touch();
                report.renamed += 1;
            }
            Err(e) => report.errors.push((row.renamed_name.clone(), e.to_string())),
        }
    }

    for (i, temp_name) in parked {
        let target = &plan[i];
        let row = &mut ledger.rows[i];
        let dest = export_dir.join(target);
        if dest.exists() {
            // Taken by a file outside the ledger; keep the temp name recorded
            warn!("'{}' is still taken, leaving file as '{}'", target, temp_name);
            row.touch();
            report.errors.push((temp_name, format!("{} already exists", target)));
            continue;
        }
        match fs::rename(export_dir.join(&temp_name), &dest) {
            Ok(()) => {
                info!("Renamed '{}' -> '{}'", temp_name, target);
                row.renamed_name = target.clone();
                row.touch();
                report.renamed += 1;
            }
            Err(e) => {
                row.touch();
                report.errors.push((temp_name, e.to_string()));
            }
        }
    }

    Ok(report)
}
