use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, Context, bail};
use dialoguer::{theme::ColorfulTheme, Confirm, Input};
use colored::*;
use crate::colors;
use crate::fetch;
use crate::{IMPORT_FOLDER, EXPORT_FOLDER, LEDGER_FILENAME, LOG_FILENAME};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Google Drive folder id or URL; empty means "import folder only"
    #[serde(default)]
    pub drive_id: String,
    #[serde(default)]
    pub api_key: String,
    pub base_dir: PathBuf,

    #[serde(default = "default_true")]
    pub enable_colors: bool,
    #[serde(default = "default_true")]
    pub enable_logging: bool,
    #[serde(default = "default_true")]
    pub enable_upload: bool,

    /// Where this config lives on disk; never serialized
    #[serde(skip)]
    path: PathBuf,
}

impl Config {
    /// Fresh config with every toggle on except uploads, which need a key
    pub fn new(path: impl Into<PathBuf>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            drive_id: String::new(),
            api_key: String::new(),
            base_dir: base_dir.into(),
            enable_colors: true,
            enable_logging: true,
            enable_upload: false,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup_path(&self) -> PathBuf {
        self.path.with_extension("json.backup")
    }

    /// Load config from disk, or run the first-time wizard if it doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let config = Self::read_from(path)?;
            config.validate()?;
            Ok(config)
        } else {
            println!("{}", "=".repeat(60).color(colors::HEADER));
            println!("{}", "   🖼️  TEAM BANNERS - FIRST TIME SETUP   ".bold());
            println!("{}", "=".repeat(60).color(colors::HEADER));
            println!();

            let config = Self::run_first_time_wizard(path)?;
            config.save()?;

            println!();
            println!("{} Setup complete! Settings saved to {}", "✅".green(),
                path.display().to_string().color(colors::PATH));
            println!();

            Ok(config)
        }
    }

    /// Parse a config file without prompting. Falls back to the backup copy
    /// when the main file is corrupted.
    pub fn read_from(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let mut config: Config = match serde_json::from_str(&data) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{} Config corrupted, trying backup...", "⚠️".yellow());
                let backup = path.with_extension("json.backup");
                let restored = fs::read_to_string(&backup)
                    .ok()
                    .and_then(|data| serde_json::from_str::<Config>(&data).ok());
                match restored {
                    Some(config) => {
                        eprintln!("{} Restored from backup", "✅".green());
                        config
                    }
                    None => {
                        return Err(anyhow::Error::new(e)
                            .context(format!("Failed to parse config file {}", path.display())));
                    }
                }
            }
        };

        config.path = path.to_path_buf();
        if config.api_key.trim().is_empty() {
            config.enable_upload = false;
        }
        Ok(config)
    }

    /// The base folder must already exist; nothing else is created for the user
    pub fn validate(&self) -> Result<()> {
        if !self.base_dir.is_dir() {
            bail!(
                "Base folder '{}' does not exist or is not a directory. Fix it in {}",
                self.base_dir.display(),
                self.path.display()
            );
        }
        Ok(())
    }

    /// Save config to disk with backup
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .context("Failed to create config directory")?;
            }
        }

        if self.path.exists() {
            fs::copy(&self.path, self.backup_path())
                .context("Failed to create backup")?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(self)
            .context("Failed to serialize config")?;
        fs::write(&temp_path, &data)
            .context("Failed to write temp config")?;

        fs::rename(&temp_path, &self.path)
            .context("Failed to finalize config")?;

        Ok(())
    }

    /// Run interactive first-time wizard
    fn run_first_time_wizard(path: &Path) -> Result<Self> {
        let theme = ColorfulTheme::default();

        println!("{}", "1. BASE FOLDER".bold());
        println!("Import/export folders, the ledger and the log live here.");
        let cwd = std::env::current_dir().context("Could not read current directory")?;
        let base_dir = loop {
            let answer: String = Input::with_theme(&theme)
                .with_prompt("Base folder")
                .default(cwd.display().to_string())
                .interact_text()?;
            let candidate = PathBuf::from(answer.trim());
            if candidate.is_dir() {
                break candidate.canonicalize().unwrap_or(candidate);
            }
            println!("{} Not an existing directory, try again", "⚠️".yellow());
        };

        let mut config = Config::new(path, base_dir);
        println!();

        println!("{}", "2. GOOGLE DRIVE".bold());
        config.drive_id = Input::with_theme(&theme)
            .with_prompt("Drive folder ID or URL (blank to skip)")
            .allow_empty(true)
            .interact_text()?;
        println!();

        println!("{}", "3. S-UL.EU UPLOADS".bold());
        let key: String = Input::with_theme(&theme)
            .with_prompt("API key (blank to disable uploads)")
            .allow_empty(true)
            .interact_text()?;
        config.set_api_key(&key);
        if config.has_api_key() {
            config.enable_upload = Confirm::with_theme(&theme)
                .with_prompt("Upload renamed files automatically?")
                .default(true)
                .interact()?;
        }
        println!();

        println!("{}", "4. PREFERENCES".bold());
        config.enable_colors = Confirm::with_theme(&theme)
            .with_prompt("Use colored output?")
            .default(true)
            .interact()?;
        config.enable_logging = Confirm::with_theme(&theme)
            .with_prompt(format!("Write an activity log ({})?", LOG_FILENAME))
            .default(true)
            .interact()?;

        Ok(config)
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Uploads happen only when switched on and a key is present
    pub fn uploads_active(&self) -> bool {
        self.enable_upload && self.has_api_key()
    }

    /// Set the API key. Clearing it switches uploads off; returns true when that happened.
    pub fn set_api_key(&mut self, key: &str) -> bool {
        self.api_key = key.trim().to_string();
        if self.api_key.is_empty() && self.enable_upload {
            self.enable_upload = false;
            return true;
        }
        false
    }

    pub fn set_upload(&mut self, enabled: bool) -> Result<()> {
        if enabled && !self.has_api_key() {
            bail!("Cannot enable uploads without an API key");
        }
        self.enable_upload = enabled;
        Ok(())
    }

    pub fn set_base_dir(&mut self, dir: &Path) -> Result<()> {
        if !dir.is_dir() {
            bail!("'{}' is not an existing directory", dir.display());
        }
        self.base_dir = dir.canonicalize()
            .with_context(|| format!("Failed to resolve {}", dir.display()))?;
        Ok(())
    }

    pub fn drive_folder_url(&self) -> Option<String> {
        fetch::drive_folder_url(&self.drive_id)
    }

    pub fn import_dir(&self) -> PathBuf {
        self.base_dir.join(IMPORT_FOLDER)
    }

    pub fn export_dir(&self) -> PathBuf {
        self.base_dir.join(EXPORT_FOLDER)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.base_dir.join(LEDGER_FILENAME)
    }

    pub fn log_path(&self) -> PathBuf {
        self.base_dir.join(LOG_FILENAME)
    }

    /// Create the import and export folders if they are missing
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.import_dir(), self.export_dir()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn apply_colors(&self) {
        if !self.enable_colors {
            colored::control::set_override(false);
        }
    }

    /// Display current configuration
    pub fn display(&self) {
        let on_off = |flag: bool| if flag { "Enabled".green() } else { "Disabled".red() };

        println!("{}", "🔧 CURRENT CONFIGURATION".bold().color(colors::HEADER));
        println!();
        println!("{} Config file: {}", "•".cyan(), self.path.display());
        println!("{} Base folder: {}", "•".cyan(),
            self.base_dir.display().to_string().color(colors::PATH));
        match (self.drive_folder_url(), fetch::folder_id(&self.drive_id)) {
            (Some(url), Some(id)) => println!("{} Drive folder: {} ({})", "•".cyan(), url, id.dimmed()),
            (Some(url), None) => println!("{} Drive folder: {}", "•".cyan(), url),
            _ => println!("{} Drive folder: (not set)", "•".cyan()),
        }
        println!("{} API key: {}", "•".cyan(), mask_key(&self.api_key));
        println!("{} Colors: {}", "•".cyan(), on_off(self.enable_colors));
        println!("{} Activity log: {}", "•".cyan(), on_off(self.enable_logging));
        println!("{} Uploads: {}", "•".cyan(), on_off(self.enable_upload));
    }
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    match chars.len() {
        0 => "(not set)".to_string(),
        1..=4 => "*".repeat(chars.len()),
        n => format!("{}{}", "*".repeat(n - 4), chars[n - 4..].iter().collect::<String>()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_then_read_keeps_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut config = Config::new(&path, dir.path());
        config.drive_id = "abc123".to_string();
        config.set_api_key("secret");
        config.set_upload(true).unwrap();
        config.save().unwrap();

        let loaded = Config::read_from(&path).unwrap();
        assert_eq!(loaded.drive_id, "abc123");
        assert_eq!(loaded.api_key, "secret");
        assert!(loaded.uploads_active());
        assert_eq!(loaded.path(), path.as_path());
    }

    #[test]
    fn missing_toggles_default_to_true() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let body = format!(
            r#"{{"api_key": "k", "base_dir": {}}}"#,
            serde_json::to_string(&dir.path()).unwrap()
        );
        fs::write(&path, body).unwrap();

        let config = Config::read_from(&path).unwrap();
        assert!(config.enable_colors);
        assert!(config.enable_logging);
        assert!(config.enable_upload);
    }

    #[test]
    fn upload_is_forced_off_without_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let body = format!(
            r#"{{"base_dir": {}, "enable_upload": true}}"#,
            serde_json::to_string(&dir.path()).unwrap()
        );
        fs::write(&path, body).unwrap();

        let mut config = Config::read_from(&path).unwrap();
        assert!(!config.enable_upload);
        assert!(config.set_upload(true).is_err());
    }

    #[test]
    fn clearing_key_disables_upload() {
        let dir = tempdir().unwrap();
        let mut config = Config::new(dir.path().join("s.json"), dir.path());
        config.set_api_key("k");
        config.set_upload(true).unwrap();

        assert!(config.set_api_key("   "));
        assert!(!config.enable_upload);
        assert!(!config.set_api_key(""));
    }

    #[test]
    fn corrupted_config_falls_back_to_backup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut config = Config::new(&path, dir.path());
        config.drive_id = "first".to_string();
        config.save().unwrap();
        config.drive_id = "second".to_string();
        config.save().unwrap();

        fs::write(&path, "{ not json").unwrap();
        let restored = Config::read_from(&path).unwrap();
        assert_eq!(restored.drive_id, "first");
    }

    #[test]
    fn validate_rejects_missing_base_dir() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().join("s.json"), dir.path().join("gone"));
        assert!(config.validate().is_err());

        let mut config = config;
        assert!(config.set_base_dir(&dir.path().join("gone")).is_err());
        config.set_base_dir(dir.path()).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn derived_paths_live_under_base_dir() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().join("s.json"), dir.path());
        assert_eq!(config.import_dir(), dir.path().join("Images import"));
        assert_eq!(config.export_dir(), dir.path().join("Images export"));
        assert_eq!(config.ledger_path(), dir.path().join("index.csv"));
        config.ensure_dirs().unwrap();
        assert!(config.import_dir().is_dir());
        assert!(config.export_dir().is_dir());
    }

    #[test]
    fn masks_all_but_last_four() {
        assert_eq!(mask_key(""), "(not set)");
        assert_eq!(mask_key("abc"), "***");
        assert_eq!(mask_key("abcdefgh"), "****efgh");
    }
}
