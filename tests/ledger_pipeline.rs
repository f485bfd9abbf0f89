use std::fs;
use std::path::Path;
use anyhow::Result;
use tempfile::tempdir;
use team_banners::config::Config;
use team_banners::ledger::{self, Ledger, LedgerRow};
use team_banners::pipeline::{self, RenameMode};
use team_banners::rename::RenamePrompt;

struct Unattended;

impl RenamePrompt for Unattended {
    fn new_name(&mut self, _original: &str) -> Result<String> {
        Ok(String::new())
    }

    fn confirm_overwrite(&mut self, _target: &str) -> Result<bool> {
        Ok(false)
    }
}

fn setup(dir: &Path, files: &[String]) -> Config {
    let config = Config::new(dir.join("settings.json"), dir);
    config.ensure_dirs().expect("dirs");
    for name in files {
        fs::write(config.import_dir().join(name), name).expect("write import file");
    }
    config
}

fn numbered(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("photo_{:03}.jpg", i)).collect()
}

#[test]
fn bulk_run_logs_every_file_and_rescan_is_empty() {
    let tmp = tempdir().expect("tempdir");
    let config = setup(tmp.path(), &numbered(11));
    let mode = RenameMode::Bulk { base: "TEAM".to_string() };

    let scan = pipeline::prepare(&config).expect("prepare");
    assert_eq!(scan.to_process.len(), 11);
    let report = pipeline::process(&config, scan, &mode, &mut Unattended, None, |_, _| {}).expect("process");

    let names: Vec<_> = report.rows.iter().map(|r| r.renamed_name.clone()).collect();
    let expected: Vec<_> = (1..=11).map(|i| format!("TEAM{:02}.jpg", i)).collect();
    assert_eq!(names, expected);

    let ledger = Ledger::read(&config.ledger_path()).expect("read");
    assert!(ledger.is_valid());
    assert_eq!(ledger.len(), 11);
    assert!(ledger.rows.iter().all(|r| r.url.is_empty()));
    assert!(config.export_dir().join("TEAM11.jpg").exists());

    let again = pipeline::prepare(&config).expect("prepare again");
    assert!(again.is_empty());
    assert_eq!(again.already_logged.len(), 11);
}

#[test]
fn existing_export_gets_conflict_suffix() {
    let tmp = tempdir().expect("tempdir");
    let config = setup(tmp.path(), &numbered(11));
    fs::write(config.export_dir().join("TEAM01.jpg"), b"older banner").expect("seed export");

    let scan = pipeline::prepare(&config).expect("prepare");
    let mode = RenameMode::Bulk { base: "TEAM".to_string() };
    let report = pipeline::process(&config, scan, &mode, &mut Unattended, None, |_, _| {}).expect("process");

    assert_eq!(report.rows[0].renamed_name, "TEAM01_conflict_1.jpg");
    assert_eq!(report.rows[1].renamed_name, "TEAM02.jpg");
    assert_eq!(fs::read(config.export_dir().join("TEAM01.jpg")).expect("read"), b"older banner");
}

#[test]
fn only_new_files_are_processed_on_second_run() {
    let tmp = tempdir().expect("tempdir");
    let config = setup(tmp.path(), &["A.jpg".to_string(), "B.jpg".to_string()]);
    ledger::append_rows(&config.ledger_path(), &[LedgerRow::new("A.jpg", "Alpha.jpg", "")]).expect("seed ledger");
    fs::write(config.import_dir().join("C.jpg"), b"c").expect("write");

    let scan = pipeline::prepare(&config).expect("prepare");
    assert_eq!(scan.to_process, vec!["B.jpg", "C.jpg"]);

    pipeline::process(&config, scan, &RenameMode::Individual, &mut Unattended, None, |_, _| {}).expect("process");
    let originals: Vec<_> = Ledger::read(&config.ledger_path())
        .expect("read")
        .rows
        .into_iter()
        .map(|r| r.original_name)
        .collect();
    assert_eq!(originals, ["A.jpg", "B.jpg", "C.jpg"]);
    assert!(config.export_dir().join("B.jpg").exists());
}

#[test]
fn malformed_rows_do_not_block_appends() {
    let tmp = tempdir().expect("tempdir");
    let config = setup(tmp.path(), &["new.png".to_string()]);
    fs::write(
        config.ledger_path(),
        "Timestamp,Original,Renamed,URL\nt,old.png,OLD.png,\nbroken\n",
    )
    .expect("seed ledger");

    let scan = pipeline::prepare(&config).expect("prepare");
    pipeline::process(&config, scan, &RenameMode::Individual, &mut Unattended, None, |_, _| {}).expect("process");

    let ledger = Ledger::read(&config.ledger_path()).expect("read");
    assert_eq!(ledger.len(), 2);
    assert_eq!(ledger.malformed, 1);
}
