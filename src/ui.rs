//! Console helpers shared by the menu and the subcommands

use anyhow::Result;
use colored::*;
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use crate::colors;
use crate::ledger::Ledger;
use crate::rename::{RenamePrompt, RenameReport};

pub fn heading(title: &str) {
    println!();
    println!("{}", title.bold().color(colors::HEADER));
    println!("{}", "─".repeat(50).color(colors::PATH));
}

pub fn success(msg: impl AsRef<str>) {
    println!("{} {}", "✅".green(), msg.as_ref());
}

pub fn warn(msg: impl AsRef<str>) {
    println!("{} {}", "⚠️".yellow(), msg.as_ref().color(colors::WARNING));
}

pub fn info(msg: impl AsRef<str>) {
    println!("{} {}", "ℹ️".cyan(), msg.as_ref());
}

pub fn error(msg: impl AsRef<str>) {
    eprintln!("{} {}", "❌".red(), msg.as_ref().color(colors::DANGER));
}

pub fn progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} files {msg}")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

pub fn confirm(prompt: &str, default: bool) -> Result<bool> {
    Ok(Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(default)
        .interact()?)
}

pub fn input(prompt: &str) -> Result<String> {
    let answer: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()?;
    Ok(answer.trim().to_string())
}

/// Input that must not be blank; keeps asking
pub fn input_required(prompt: &str) -> Result<String> {
    loop {
        let answer = input(prompt)?;
        if !answer.is_empty() {
            return Ok(answer);
        }
        warn("A value is required");
    }
}

/// Require the literal word `yes`
pub fn confirm_typed_yes(prompt: &str) -> Result<bool> {
    Ok(input(&format!("{} (type 'yes')", prompt))?.eq_ignore_ascii_case("yes"))
}

pub fn select(prompt: &str, items: &[String], default: usize) -> Result<usize> {
    Ok(Select::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .items(items)
        .default(default)
        .interact()?)
}

/// Pick one ledger row; `None` on cancel
pub fn pick_entry(ledger: &Ledger) -> Result<Option<usize>> {
    let mut items: Vec<String> = ledger
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| format!("{:3}. {} -> {}", i + 1, row.original_name, row.renamed_name))
        .collect();
    items.push("Cancel".to_string());

    let picked = select("Which entry?", &items, 0)?;
    Ok((picked < ledger.rows.len()).then_some(picked))
}

/// dialoguer-backed answers for the one-by-one rename flow
pub struct DialoguerPrompt {
    theme: ColorfulTheme,
}

impl DialoguerPrompt {
    pub fn new() -> Self {
        Self { theme: ColorfulTheme::default() }
    }
}

impl Default for DialoguerPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl RenamePrompt for DialoguerPrompt {
    fn new_name(&mut self, original: &str) -> Result<String> {
        println!("{} {}", "🖼️".cyan(), original.color(colors::PATH));
        let answer: String = Input::with_theme(&self.theme)
            .with_prompt("New name without extension (blank keeps it)")
            .allow_empty(true)
            .interact_text()?;
        Ok(answer)
    }

    fn confirm_overwrite(&mut self, target: &str) -> Result<bool> {
        Ok(Confirm::with_theme(&self.theme)
            .with_prompt(format!("'{}' already exists in export. Overwrite?", target))
            .default(false)
            .interact()?)
    }
}

fn clip(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        format!("{:<width$}", text, width = width)
    } else {
        let head: String = text.chars().take(width.saturating_sub(1)).collect();
        format!("{}…", head)
    }
}

pub fn show_ledger(ledger: &Ledger) {
    heading("📒 LEDGER");
    if !ledger.is_valid() {
        warn("Ledger is missing, empty or has an unexpected header");
        return;
    }
    if ledger.malformed > 0 {
        warn(format!("{} malformed row(s) were skipped", ledger.malformed));
    }
    if ledger.is_empty() {
        info("No entries yet");
        return;
    }

    println!(
        "{:>4}  {}  {}  {}  {}",
        "#".dimmed(),
        clip("Timestamp", 26).dimmed(),
        clip("Original", 24).dimmed(),
        clip("Renamed", 24).dimmed(),
        "URL".dimmed()
    );
    for (i, row) in ledger.rows.iter().enumerate() {
        let url = if row.has_url() { row.url.color(colors::SUCCESS) } else { "(none)".dimmed() };
        println!(
            "{:>4}  {}  {}  {}  {}",
            i + 1,
            clip(&row.timestamp, 26),
            clip(&row.original_name, 24),
            clip(&row.renamed_name, 24).color(colors::PATH),
            url
        );
    }
    println!();
    let uploaded = ledger.rows.iter().filter(|r| r.has_url()).count();
    println!("{} {} entries, {} with URL", "📊".cyan(), ledger.len(), uploaded);
}

pub fn print_rename_report(report: &RenameReport) {
    for file in &report.renamed {
        println!("  {} {} -> {}", "•".green(), file.original_name, file.final_name.color(colors::PATH));
    }
    for (name, reason) in &report.skipped {
        println!("  {} {} ({})", "•".yellow(), name, reason.dimmed());
    }
    println!(
        "{} Copied {} file(s), skipped {}",
        "📊".cyan(),
        report.renamed.len(),
        report.skipped.len()
    );
}

pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_scale_by_1024() {
        assert_eq!(human_size(0), "0 B");
        assert_eq!(human_size(1023), "1023 B");
        assert_eq!(human_size(1536), "1.5 KB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn clip_pads_and_truncates() {
        assert_eq!(clip("ab", 4), "ab  ");
        assert_eq!(clip("abcdef", 4), "abc…");
    }
}
