//! TeamBanners - rename, upload and keep a ledger of team banner images

pub mod config;
pub mod error;
pub mod logging;
pub mod ledger;
pub mod scanner;
pub mod rename;
pub mod upload;
pub mod fetch;
pub mod edit;
pub mod maintenance;
pub mod pipeline;
pub mod ui;
pub mod cli;

// Re-exports for easy access
pub use config::Config;
pub use error::{LedgerError, UploadError};
pub use ledger::{Ledger, LedgerRow};
pub use scanner::ImportScan;
pub use rename::{CollisionStyle, RenamePrompt, RenameReport, RenamedFile};
pub use upload::{FileUploader, SulClient, UploadOutcome};
pub use cli::{Cli, Commands};

pub mod colors {
    use colored::Color;

    pub const SUCCESS: Color = Color::TrueColor { r: 77, g: 255, b: 157 };
    pub const HEADER: Color = Color::TrueColor { r: 157, g: 77, b: 255 };
    pub const PATH: Color = Color::TrueColor { r: 77, g: 195, b: 255 };
    pub const WARNING: Color = Color::TrueColor { r: 255, g: 217, b: 61 };
    pub const DANGER: Color = Color::TrueColor { r: 255, g: 107, b: 157 };
}

/// Current version of TeamBanners
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Folder (under the base directory) that receives downloaded originals
pub const IMPORT_FOLDER: &str = "Images import";

/// Folder (under the base directory) that receives renamed copies
pub const EXPORT_FOLDER: &str = "Images export";

pub const LEDGER_FILENAME: &str = "index.csv";
pub const LOG_FILENAME: &str = "script_activity.log";

/// Default config file, resolved against the working directory
pub const CONFIG_FILENAME: &str = "settings.json";

/// Canonical ledger header. Any other header invalidates the ledger.
pub const LEDGER_HEADER: [&str; 4] = ["Timestamp", "Original", "Renamed", "URL"];

pub const UPLOAD_ENDPOINT: &str = "https://s-ul.eu/api/v1/upload";
pub const UPLOAD_TIMEOUT_SECS: u64 = 60;

/// Interactive rename gives up after this many `_N` suffixes
pub const MAX_INTERACTIVE_ATTEMPTS: usize = 10;

/// Bulk rename gives up after this many `_conflict_N` suffixes
pub const MAX_CONFLICT_ATTEMPTS: usize = 5;
