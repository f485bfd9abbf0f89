use anyhow::{Result, Context};
use clap::Parser;
use colored::*;
use indicatif::ProgressBar;
use tracing_appender::non_blocking::WorkerGuard;
use team_banners::cli::{BulkRenameArgs, Cli, Commands, DoctorArgs, RunArgs, Source};
use team_banners::config::Config;
use team_banners::ledger::Ledger;
use team_banners::pipeline::{self, RenameMode};
use team_banners::ui::{self, DialoguerPrompt};
use team_banners::upload::{FileUploader, SulClient, UploadOutcome, UploadResult};
use team_banners::{colors, edit, fetch, logging, maintenance, rename};

/// What the caller should do after a handler returns
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

const MENU_ITEMS: &[&str] = &[
    "0. Explain what this does",
    "1. Show ledger",
    "2. Show folder tree",
    "3. Settings",
    "4. Start (fetch, rename, upload, log)",
    "5. Edit an entry",
    "6. Bulk rename logged files",
    "7. Bulk upload missing URLs",
    "8. Nuke working folder",
    "9. Exit",
];

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Handle commands that need no config first
    if let Some(command) = cli.command.as_ref().filter(|c| !c.needs_config()) {
        match command {
            Commands::Version => Cli::print_version(),
            _ => Cli::print_explanation(),
        }
        return Ok(());
    }

    let mut config = Config::load(&cli.config).context("Failed to load configuration")?;
    config.apply_colors();
    let mut guard = logging::init_logging(&config.base_dir, config.enable_logging);

    let result = match cli.command {
        Some(command) => dispatch(&command, &mut config, &mut guard).map(|_| ()),
        None => run_menu(&mut config, &mut guard),
    };

    if let Err(e) = &result {
        tracing::error!("{:#}", e);
    }
    logging::shutdown_logging(guard);
    result
}

fn dispatch(command: &Commands, config: &mut Config, guard: &mut Option<WorkerGuard>) -> Result<Flow> {
    tracing::info!("Command: {}", command.name());
    match command {
        Commands::Explain => Cli::print_explanation(),
        Commands::Version => Cli::print_version(),
        Commands::Show => handle_show(config)?,
        Commands::Tree => handle_tree(config)?,
        Commands::Settings => handle_settings(config)?,
        Commands::Run(args) => handle_run(config, args)?,
        Commands::Edit => handle_edit(config)?,
        Commands::BulkRename(args) => handle_bulk_rename(config, args)?,
        Commands::BulkUpload => handle_bulk_upload(config)?,
        Commands::Doctor(args) => handle_doctor(config, args)?,
        Commands::Nuke => return handle_nuke(config, guard),
    }
    Ok(Flow::Continue)
}

fn run_menu(config: &mut Config, guard: &mut Option<WorkerGuard>) -> Result<()> {
    let items: Vec<String> = MENU_ITEMS.iter().map(|s| s.to_string()).collect();

    loop {
        println!();
        println!("{}", "=".repeat(50).color(colors::HEADER));
        println!("{}", "   🖼️  TEAM BANNERS   ".bold());
        println!("{}", "=".repeat(50).color(colors::HEADER));

        let choice = ui::select("Choose an option", &items, 4)?;
        let command = match choice {
            0 => Commands::Explain,
            1 => Commands::Show,
            2 => Commands::Tree,
            3 => Commands::Settings,
            4 => Commands::Run(RunArgs::default()),
            5 => Commands::Edit,
            6 => Commands::BulkRename(BulkRenameArgs::default()),
            7 => Commands::BulkUpload,
            8 => Commands::Nuke,
            _ => {
                println!("{} Bye!", "👋".cyan());
                return Ok(());
            }
        };

        // A failed action is reported and the menu keeps running
        match dispatch(&command, config, guard) {
            Ok(Flow::Exit) => return Ok(()),
            Ok(Flow::Continue) => {}
            Err(e) => {
                tracing::error!("{} failed: {:#}", command.name(), e);
                ui::error(format!("{:#}", e));
            }
        }
    }
}

fn uploader_for(config: &Config) -> Result<Option<SulClient>> {
    if !config.uploads_active() {
        return Ok(None);
    }
    Ok(Some(SulClient::new(&config.api_key)?))
}

fn tick(pb: &ProgressBar, result: &UploadResult) {
    pb.inc(1);
    match result {
        Ok(UploadOutcome::Uploaded(_)) => pb.set_message("Uploaded"),
        Ok(UploadOutcome::Failed(_)) | Err(_) => pb.set_message("Failed"),
    }
}

fn upload_progress(pb: &ProgressBar) -> impl FnMut(usize, &UploadResult) + '_ {
    move |_: usize, result: &UploadResult| tick(pb, result)
}

fn print_failures(failures: &[(String, String)]) {
    for (name, reason) in failures {
        println!("  {} {} ({})", "•".red(), name, reason.dimmed());
    }
}

fn handle_show(config: &Config) -> Result<()> {
    let ledger = Ledger::read(&config.ledger_path())?;
    ui::show_ledger(&ledger);
    Ok(())
}

fn handle_tree(config: &Config) -> Result<()> {
    ui::heading("🌳 FOLDER TREE");
    let (entries, total) = maintenance::folder_tree(&config.base_dir)?;

    println!("{}", config.base_dir.display().to_string().color(colors::PATH));
    for entry in &entries {
        let indent = "│  ".repeat(entry.depth.saturating_sub(1));
        if entry.is_dir {
            println!("{}├─ 📁 {} {}", indent, entry.name.bold(), ui::human_size(entry.size).dimmed());
        } else {
            println!("{}├─ {} {}", indent, entry.name, ui::human_size(entry.size).dimmed());
        }
    }
    println!();
    println!("{} Total: {}", "📊".cyan(), ui::human_size(total));
    Ok(())
}

fn handle_settings(config: &mut Config) -> Result<()> {
    loop {
        ui::heading("⚙️  SETTINGS");
        config.display();
        println!();

        let on_off = |flag: bool| if flag { "on" } else { "off" };
        let items = vec![
            "Change Google Drive folder".to_string(),
            "Change API key".to_string(),
            "Change base folder".to_string(),
            format!("Toggle colors (now {})", on_off(config.enable_colors)),
            format!("Toggle activity log (now {})", on_off(config.enable_logging)),
            format!("Toggle uploads (now {})", on_off(config.enable_upload)),
            "Back".to_string(),
        ];

        match ui::select("Setting", &items, items.len() - 1)? {
            0 => {
                config.drive_id = ui::input("Drive folder ID or URL (blank clears it)")?;
                if let Some(url) = config.drive_folder_url() {
                    ui::info(format!("Folder: {}", url));
                }
            }
            1 => {
                let key = ui::input("API key (blank clears it)")?;
                if config.set_api_key(&key) {
                    ui::warn("API key cleared, uploads disabled");
                }
            }
            2 => {
                let dir = ui::input_required("Base folder")?;
                if let Err(e) = config.set_base_dir(std::path::Path::new(&dir)) {
                    ui::error(format!("{:#}", e));
                    continue;
                }
                ui::info("The activity log moves to the new folder on next launch");
            }
            3 => {
                config.enable_colors = !config.enable_colors;
                colored::control::set_override(config.enable_colors);
            }
            4 => {
                config.enable_logging = !config.enable_logging;
                ui::info("Activity log change takes effect on next launch");
            }
            5 => {
                if let Err(e) = config.set_upload(!config.enable_upload) {
                    ui::error(format!("{:#}", e));
                    continue;
                }
            }
            _ => return Ok(()),
        }

        config.save()?;
        tracing::info!("Settings updated");
        ui::success("Settings saved");
    }
}

fn handle_run(config: &Config, args: &RunArgs) -> Result<()> {
    ui::heading("🚀 PROCESS NEW FILES");

    let source = match args.source {
        Some(source) => source,
        None if config.drive_folder_url().is_none() => Source::Import,
        None => {
            let items = vec![
                "Download the Google Drive folder first".to_string(),
                format!("Use files already in '{}'", team_banners::IMPORT_FOLDER),
            ];
            if ui::select("Source", &items, 0)? == 0 { Source::Drive } else { Source::Import }
        }
    };

    if source == Source::Drive {
        config.ensure_dirs()?;
        let fetched = fetch::download_folder(&config.drive_id, &config.import_dir())
            .context("Drive download failed")?;
        ui::success(format!("Downloaded {} new file(s)", fetched.new_files.len()));
    }

    let scan = pipeline::prepare(config)?;
    if !scan.already_logged.is_empty() {
        ui::info(format!("{} file(s) already logged, skipping", scan.already_logged.len()));
    }
    if scan.is_empty() {
        ui::info("No new files to process");
        return Ok(());
    }

    println!("{} {} new file(s):", "🔍".cyan(), scan.to_process.len());
    for name in &scan.to_process {
        println!("  • {}", name.color(colors::PATH));
    }
    println!();

    let mode = match &args.bulk {
        Some(base) => RenameMode::Bulk { base: base.clone() },
        None => {
            let items = vec![
                "Rename one by one".to_string(),
                "Bulk rename (BASE1, BASE2, ...)".to_string(),
            ];
            if ui::select("Rename method", &items, 0)? == 0 {
                RenameMode::Individual
            } else {
                RenameMode::Bulk { base: ui::input_required("Base name")? }
            }
        }
    };

    let rename = pipeline::rename_new(config, &scan, &mode, &mut DialoguerPrompt::new())?;
    ui::print_rename_report(&rename);

    let client = if args.no_upload { None } else { uploader_for(config)? };
    if client.is_none() {
        ui::info("Uploads skipped, rows are logged without URL");
    }

    let pb = ui::progress_bar(rename.renamed.len())?;
    let report = pipeline::upload_and_log(
        config,
        scan,
        rename,
        client.as_ref().map(|c| c as &dyn FileUploader),
        upload_progress(&pb),
    )?;
    pb.finish_and_clear();

    if !report.upload_failures.is_empty() {
        ui::warn(format!("{} upload(s) failed:", report.upload_failures.len()));
        print_failures(&report.upload_failures);
    }
    ui::success(format!(
        "Logged {} file(s), {} uploaded",
        report.rows.len(),
        report.uploaded
    ));
    Ok(())
}

fn handle_edit(config: &Config) -> Result<()> {
    ui::heading("✏️  EDIT ENTRY");
    let mut ledger = pipeline::load_ledger(config)?;
    if ledger.is_empty() {
        ui::info("No entries to edit");
        return Ok(());
    }
    ui::show_ledger(&ledger);

    let Some(index) = ui::pick_entry(&ledger)? else {
        return Ok(());
    };
    let export_dir = config.export_dir();

    let actions = vec![
        "Change renamed file".to_string(),
        "Re-upload".to_string(),
        "Edit URL".to_string(),
        "Delete entry".to_string(),
        "Cancel".to_string(),
    ];
    match ui::select("Action", &actions, 0)? {
        0 => {
            let base = ui::input_required("New name (without extension)")?;
            let renamed = edit::rename_entry(&mut ledger, index, &base, &export_dir)?;
            if !renamed.file_moved {
                ui::warn(format!("'{}' was not in the export folder, only the ledger changed", renamed.old_name));
            }
            ui::success(format!("{} -> {}", renamed.old_name, renamed.new_name));
            if config.uploads_active() && ui::confirm("Re-upload the renamed file?", true)? {
                reupload(config, &mut ledger, index)?;
            }
        }
        1 => {
            if !config.uploads_active() {
                ui::warn("Uploads are disabled or the API key is missing");
                return Ok(());
            }
            reupload(config, &mut ledger, index)?;
        }
        2 => {
            let url = ui::input("New URL (blank removes it)")?;
            edit::set_url(&mut ledger, index, &url)?;
        }
        3 => {
            if !ui::confirm("Delete this entry?", false)? {
                return Ok(());
            }
            let row = edit::delete_entry(&mut ledger, index)?;
            if ui::confirm("Also move its import/export files to the Recycle Bin?", false)? {
                let failed = edit::trash_entry_files(&row, &config.import_dir(), &export_dir);
                for (path, reason) in &failed {
                    ui::warn(format!("{}: {}", path.display(), reason));
                }
            }
        }
        _ => return Ok(()),
    }

    ledger.save(&config.ledger_path())?;
    ui::success("Ledger saved");
    Ok(())
}

fn reupload(config: &Config, ledger: &mut Ledger, index: usize) -> Result<()> {
    let client = SulClient::new(&config.api_key)?;
    match edit::reupload_entry(ledger, index, &config.export_dir(), &client)? {
        UploadOutcome::Uploaded(url) => ui::success(format!("Uploaded: {}", url)),
        UploadOutcome::Failed(reason) => ui::warn(format!("Upload failed: {}", reason)),
    }
    Ok(())
}

fn handle_bulk_rename(config: &Config, args: &BulkRenameArgs) -> Result<()> {
    ui::heading("🔢 BULK RENAME LOGGED FILES");
    let mut ledger = pipeline::load_ledger(config)?;
    if ledger.is_empty() {
        ui::info("No entries to rename");
        return Ok(());
    }

    let base = match &args.base {
        Some(base) => base.trim().to_string(),
        None => ui::input_required("Base name")?,
    };
    let width = rename::pad_width(ledger.len());
    println!(
        "{} {} entries become {} .. {}",
        "ℹ️".cyan(),
        ledger.len(),
        rename::sequential_name(&base, 1, width, "").color(colors::PATH),
        rename::sequential_name(&base, ledger.len(), width, "").color(colors::PATH)
    );
    if !args.yes && !ui::confirm("Proceed?", false)? {
        ui::info("Bulk rename cancelled");
        return Ok(());
    }

    let report = rename::rename_ledger_entries(&mut ledger, &config.export_dir(), &base)?;
    if report.changed() {
        ledger.save(&config.ledger_path())?;
    }

    ui::success(format!("Renamed {} file(s)", report.renamed));
    if report.already_correct > 0 {
        ui::info(format!("{} already had the right name", report.already_correct));
    }
    if !report.missing.is_empty() {
        ui::warn(format!("{} export file(s) missing:", report.missing.len()));
        for name in &report.missing {
            println!("  {} {}", "•".yellow(), name);
        }
    }
    if !report.errors.is_empty() {
        ui::warn(format!("{} rename(s) failed:", report.errors.len()));
        print_failures(&report.errors);
    }
    Ok(())
}

fn handle_bulk_upload(config: &Config) -> Result<()> {
    ui::heading("☁️  BULK UPLOAD");
    let Some(client) = uploader_for(config)? else {
        ui::warn("Uploads are disabled or the API key is missing");
        return Ok(());
    };

    let mut ledger = pipeline::load_ledger(config)?;
    let (pending, _, _) = maintenance::pending_uploads(&ledger, &config.export_dir());
    if pending.is_empty() {
        ui::info("Nothing to upload");
        return Ok(());
    }

    let pb = ui::progress_bar(pending.len())?;
    let report = maintenance::bulk_upload(&mut ledger, &config.export_dir(), &client, upload_progress(&pb));
    pb.finish_and_clear();

    if report.uploaded > 0 {
        ledger.save(&config.ledger_path())?;
    }

    println!("{}", "─".repeat(50).color(colors::PATH));
    println!("{} Attempted: {}", "•".cyan(), report.attempted);
    println!("{} Uploaded: {}", "•".green(), report.uploaded);
    println!("{} Already had URL: {}", "•".cyan(), report.already_had_url);
    println!("{} Missing export file: {}", "•".yellow(), report.missing_file);
    if !report.failures.is_empty() {
        println!("{} Failed: {}", "•".red(), report.failures.len());
        print_failures(&report.failures);
    }
    Ok(())
}

fn handle_doctor(config: &Config, args: &DoctorArgs) -> Result<()> {
    ui::heading("🩺 HEALTH CHECK");
    let mut ledger = pipeline::load_ledger(config)?;
    let import_dir = config.import_dir();
    let export_dir = config.export_dir();

    let problems = maintenance::diagnose(&ledger, &import_dir, &export_dir, config.uploads_active())?;
    if problems.is_empty() {
        ui::success("No problems found");
        return Ok(());
    }
    for problem in &problems {
        let marker = if problem.fixable() { "•".yellow() } else { "•".dimmed() };
        println!("  {} {}", marker, problem);
    }

    let fixable = maintenance::count_fixable(&problems);
    let unlisted = maintenance::unlisted_names(&problems).len();
    println!();
    println!("{} {} problem(s), {} fixable", "📊".cyan(), problems.len(), fixable);
    if unlisted > 0 {
        ui::info(format!("{} unlisted import file(s): run the pipeline to process them", unlisted));
    }
    if fixable == 0 || !(args.fix || ui::confirm("Attempt quick fixes?", true)?) {
        return Ok(());
    }

    let client = uploader_for(config)?;
    let pb = ui::progress_bar(0)?;
    let report = maintenance::quick_fix(
        &mut ledger,
        &import_dir,
        &export_dir,
        client.as_ref().map(|c| c as &dyn FileUploader),
        |_, result| {
            pb.inc_length(1);
            tick(&pb, result);
        },
    )?;
    pb.finish_and_clear();

    if report.ledger_changed() {
        ledger.save(&config.ledger_path())?;
    }

    println!("{}", "─".repeat(50).color(colors::PATH));
    println!("{} Copied to export: {}", "•".cyan(), report.copied_to_export);
    println!("{} Copied to import: {}", "•".cyan(), report.copied_to_import);
    println!("{} Filled Renamed fields: {}", "•".cyan(), report.filled_renamed);
    println!("{} Uploads: {}/{}", "•".cyan(), report.uploaded, report.uploads_attempted);
    print_failures(&report.failures);

    let remaining = maintenance::diagnose(&ledger, &import_dir, &export_dir, config.uploads_active())?;
    ui::info(format!("{} problem(s) remain", remaining.len()));
    Ok(())
}

fn handle_nuke(config: &Config, guard: &mut Option<WorkerGuard>) -> Result<Flow> {
    ui::heading("💣 NUKE");
    println!(
        "{} This permanently deletes {} and everything in it.",
        "⚠️".yellow(),
        config.base_dir.display().to_string().color(colors::DANGER).bold()
    );
    if !ui::confirm_typed_yes("Are you sure?")? || !ui::confirm_typed_yes("Really delete everything?")? {
        ui::info("Nuke cancelled");
        return Ok(Flow::Continue);
    }

    tracing::warn!("Nuke confirmed for {}", config.base_dir.display());
    // The log file lives inside the folder being deleted
    logging::shutdown_logging(guard.take());
    maintenance::nuke(&config.base_dir)?;
    ui::success("Working folder deleted");
    Ok(Flow::Exit)
}
