use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use anyhow::{Context, Result, bail};
use regex::Regex;
use tracing::{info, warn};
use crate::scanner;

/// Environment override for the downloader binary
pub const GDOWN_BIN_ENV: &str = "GDOWN_BIN";

const DRIVE_HOST: &str = "drive.google.com";

fn folder_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"folders/([A-Za-z0-9_-]+)").expect("Invalid folder regex"))
}

/// Full folder URL for a bare id; URLs pass through untouched.
pub fn drive_folder_url(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        None
    } else if input.contains(DRIVE_HOST) {
        Some(input.to_string())
    } else {
        Some(format!("https://{}/drive/folders/{}", DRIVE_HOST, input))
    }
}

/// The folder id inside a Drive URL, or the input itself when it is already an id
pub fn folder_id(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if !input.contains(DRIVE_HOST) {
        return Some(input.to_string());
    }
    folder_id_regex()
        .captures(input)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn resolve_gdown_bin() -> Result<PathBuf> {
    if let Ok(bin) = env::var(GDOWN_BIN_ENV) {
        let bin = PathBuf::from(bin);
        if bin.exists() {
            return Ok(bin);
        }
        warn!("{} points to missing file {}", GDOWN_BIN_ENV, bin.display());
    }
    which::which("gdown").context("gdown not found in GDOWN_BIN or PATH (install with `pip install gdown`)")
}

/// Files that appeared in the import folder during a download
#[derive(Debug, Default)]
pub struct FetchReport {
    pub new_files: Vec<String>,
}

/// Download a public Drive folder into `import_dir` with gdown.
///
/// gdown's own progress is streamed to the terminal.
pub fn download_folder(drive_input: &str, import_dir: &Path) -> Result<FetchReport> {
    let Some(url) = drive_folder_url(drive_input) else {
        bail!("No Google Drive folder configured");
    };
    let bin = resolve_gdown_bin()?;
    fs::create_dir_all(import_dir)
        .with_context(|| format!("Failed to create {}", import_dir.display()))?;

    let before = scanner::list_files(import_dir)?;
    info!("Downloading Drive folder {} with {}", url, bin.display());

    let status = Command::new(&bin)
        .arg("--folder")
        .arg(&url)
        .arg("-O")
        .arg(import_dir)
        .arg("--remaining-ok")
        .status()
        .with_context(|| format!("failed to run `{}`", bin.display()))?;

    if !status.success() {
        bail!("gdown exited with {} (is the folder shared publicly?)", status);
    }

    let new_files = scanner::filter_new(scanner::list_files(import_dir)?, &before.into_iter().collect());
    info!("Drive download finished, {} new file(s)", new_files.len());
    Ok(FetchReport { new_files })
}
