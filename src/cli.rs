use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use colored::*;
use crate::{CONFIG_FILENAME, EXPORT_FOLDER, IMPORT_FOLDER, LEDGER_FILENAME, LOG_FILENAME};

#[derive(Parser, Debug)]
#[command(
    name = "team_banners",
    about = "Rename, upload and keep a CSV ledger of team banner images",
    version,
    long_about = "TeamBanners pulls images from a Google Drive folder (or a local\n\
                  import folder), renames them, uploads them to s-ul.eu and records\n\
                  every file in a CSV ledger.\n\n\
                  Run without a subcommand for the interactive menu."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Settings file
    #[arg(long, global = true, env = "TEAM_BANNERS_CONFIG", default_value = CONFIG_FILENAME)]
    pub config: PathBuf,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Explain what the tool does
    Explain,

    /// Show the ledger
    Show,

    /// Show the folder tree with sizes
    Tree,

    /// Change settings
    Settings,

    /// Fetch, rename, upload and log new files
    Run(RunArgs),

    /// Edit or delete one ledger entry
    Edit,

    /// Rename every logged file to BASE + number
    BulkRename(BulkRenameArgs),

    /// Upload every logged file that has no URL yet
    BulkUpload,

    /// Check the ledger against the folders, optionally fixing problems
    Doctor(DoctorArgs),

    /// Permanently delete the whole working folder
    Nuke,

    /// Show version information
    Version,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Where new files come from (asked when omitted)
    #[arg(long, value_enum)]
    pub source: Option<Source>,

    /// Rename in bulk with this base name instead of asking per file
    #[arg(long, value_name = "BASE")]
    pub bulk: Option<String>,

    /// Skip uploads for this run
    #[arg(long)]
    pub no_upload: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct BulkRenameArgs {
    /// Base name (asked when omitted)
    pub base: Option<String>,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct DoctorArgs {
    /// Apply quick fixes without asking
    #[arg(long)]
    pub fix: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Download the configured Google Drive folder first
    Drive,
    /// Only use files already in the import folder
    Import,
}

impl Cli {
    /// Print version information
    pub fn print_version() {
        println!("🖼️  TeamBanners v{}", env!("CARGO_PKG_VERSION"));
        println!("Rename, upload and log team banner images");
        println!("License: {}", env!("CARGO_PKG_LICENSE"));
    }

    /// Print what the tool does and where it keeps things
    pub fn print_explanation() {
        println!("{}", "WHAT THIS DOES".bold().cyan());
        println!("  1. Gets images: downloads the Drive folder with gdown, or uses");
        println!("     files you placed in '{}'.", IMPORT_FOLDER);
        println!("  2. Skips files whose original name is already in {}.", LEDGER_FILENAME);
        println!("  3. Renames each new file (one by one, or BASE01, BASE02, ...)");
        println!("     and copies it to '{}'. Originals are never moved.", EXPORT_FOLDER);
        println!("  4. Uploads the copy to s-ul.eu when uploads are enabled.");
        println!("  5. Logs Timestamp, Original, Renamed and URL for every file.");
        println!();
        println!("{}", "MAINTENANCE".bold().cyan());
        println!("  • {}  edit, re-upload or delete one entry", "edit".cyan().bold());
        println!("  • {}  renumber every logged file", "bulk-rename".cyan().bold());
        println!("  • {}  upload entries that have no URL", "bulk-upload".cyan().bold());
        println!("  • {}  find and fix ledger/folder drift", "doctor".cyan().bold());
        println!();
        println!("{}", "FILES".bold().cyan());
        println!("  • Settings: {} (or --config / TEAM_BANNERS_CONFIG)", CONFIG_FILENAME);
        println!("  • Ledger: <base>/{}", LEDGER_FILENAME);
        println!("  • Activity log: <base>/{}", LOG_FILENAME);
        println!();
        println!("{}", "SAFETY:".bold().cyan());
        println!("  • Bulk renames never overwrite, they add _conflict_N");
        println!("  • Deleted entry files go to the Recycle Bin");
        println!("  • nuke asks twice and cannot be undone");
    }
}

impl Commands {
    /// Get the command name
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Explain => "explain",
            Commands::Show => "show",
            Commands::Tree => "tree",
            Commands::Settings => "settings",
            Commands::Run(_) => "run",
            Commands::Edit => "edit",
            Commands::BulkRename(_) => "bulk-rename",
            Commands::BulkUpload => "bulk-upload",
            Commands::Doctor(_) => "doctor",
            Commands::Nuke => "nuke",
            Commands::Version => "version",
        }
    }

    /// Commands that work without a valid config
    pub fn needs_config(&self) -> bool {
        !matches!(self, Commands::Explain | Commands::Version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_means_menu() {
        let cli = Cli::try_parse_from(["team_banners"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from(["team_banners", "run", "--source", "import", "--bulk", "TEAM", "--no-upload"]).unwrap();
        match cli.command {
            Some(Commands::Run(args)) => {
                assert_eq!(args.source, Some(Source::Import));
                assert_eq!(args.bulk.as_deref(), Some("TEAM"));
                assert!(args.no_upload);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["team_banners", "show", "--config", "/tmp/x.json"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/tmp/x.json"));
        assert_eq!(cli.command.map(|c| c.name()), Some("show"));
    }
}
