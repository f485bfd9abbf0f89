use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::Path;
use chrono::Local;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use tracing::{info, warn};
use crate::error::LedgerError;
use crate::LEDGER_HEADER;

/// Microsecond precision, local time
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

pub fn timestamp_now() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// One processed file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRow {
    pub timestamp: String,
    pub original_name: String,
    pub renamed_name: String,
    /// Empty until an upload succeeds
    pub url: String,
}

impl LedgerRow {
    pub fn new(original_name: impl Into<String>, renamed_name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp_now(),
            original_name: original_name.into(),
            renamed_name: renamed_name.into(),
            url: url.into(),
        }
    }

    pub fn has_url(&self) -> bool {
        !self.url.trim().is_empty()
    }

    /// Refresh the timestamp after an edit
    pub fn touch(&mut self) {
        self.timestamp = timestamp_now();
    }

    fn from_record(record: &StringRecord) -> Self {
        let field = |i: usize| record.get(i).unwrap_or_default().to_string();
        Self {
            timestamp: field(0),
            original_name: field(1),
            renamed_name: field(2),
            url: field(3),
        }
    }

    fn as_record(&self) -> [&str; 4] {
        [&self.timestamp, &self.original_name, &self.renamed_name, &self.url]
    }
}

/// The parsed ledger file
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    /// `None` when the file is missing, empty, or carries a foreign header
    pub header: Option<Vec<String>>,
    pub rows: Vec<LedgerRow>,
    /// Rows dropped because their column count did not match the header
    pub malformed: usize,
}

impl Ledger {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse the whole ledger.
    ///
    /// A missing or empty file, or one whose header is not exactly
    /// `Timestamp,Original,Renamed,URL`, yields an empty ledger with no header.
    /// Rows with the wrong column count are skipped and counted.
    pub fn read(path: &Path) -> Result<Self, LedgerError> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::empty()),
            Err(source) => return Err(LedgerError::Io { path: path.to_path_buf(), source }),
        };

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(data.as_slice());

        let mut records = reader.records();
        let header_record = match records.next() {
            None => return Ok(Self::empty()),
            Some(record) => record.map_err(|source| LedgerError::Csv { path: path.to_path_buf(), source })?,
        };

        let header: Vec<String> = header_record
            .iter()
            .enumerate()
            .map(|(i, field)| if i == 0 { field.trim_start_matches('\u{feff}') } else { field })
            .map(str::to_string)
            .collect();

        if header.iter().map(String::as_str).ne(LEDGER_HEADER.iter().copied()) {
            warn!("Ledger header mismatch in {}: {:?}", path.display(), header);
            return Ok(Self::empty());
        }

        let mut rows = Vec::new();
        let mut malformed = 0;
        for record in records {
            let record = record.map_err(|source| LedgerError::Csv { path: path.to_path_buf(), source })?;
            if record.len() != header.len() {
                malformed += 1;
                let line = record.position().map(|p| p.line()).unwrap_or_default();
                warn!("Skipping malformed ledger row at line {}: {} columns", line, record.len());
                continue;
            }
            rows.push(LedgerRow::from_record(&record));
        }

        let blank = blank_lines_after_header(&data);
        if blank > 0 {
            warn!("Skipping {} blank ledger line(s)", blank);
            malformed += blank;
        }

        if malformed > 0 {
            warn!("{} malformed ledger row(s) skipped", malformed);
        }

        Ok(Self { header: Some(header), rows, malformed })
    }

    pub fn is_valid(&self) -> bool {
        self.header.is_some()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct original names already recorded
    pub fn original_names(&self) -> BTreeSet<String> {
        self.rows.iter().map(|row| row.original_name.clone()).collect()
    }

    pub fn row(&self, index: usize) -> Result<&LedgerRow, LedgerError> {
        self.rows.get(index).ok_or(LedgerError::NoSuchEntry(index))
    }

    pub fn row_mut(&mut self, index: usize) -> Result<&mut LedgerRow, LedgerError> {
        self.rows.get_mut(index).ok_or(LedgerError::NoSuchEntry(index))
    }

    /// Rewrite the whole ledger.
    ///
    /// Written to `<ledger>.tmp` and renamed over the original, so an
    /// interrupted rewrite leaves the previous ledger intact.
    pub fn save(&self, path: &Path) -> Result<(), LedgerError> {
        let temp_path = path.with_extension("csv.tmp");
        let io_err = |source| LedgerError::Io { path: temp_path.clone(), source };

        let file = File::create(&temp_path).map_err(io_err)?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        let csv_err = |source| LedgerError::Csv { path: temp_path.clone(), source };

        writer.write_record(LEDGER_HEADER).map_err(csv_err)?;
        for row in &self.rows {
            writer.write_record(row.as_record()).map_err(csv_err)?;
        }
        writer.flush().map_err(io_err)?;
        drop(writer);

        fs::rename(&temp_path, path)
            .map_err(|source| LedgerError::Io { path: path.to_path_buf(), source })?;

        info!("Ledger rewritten with {} row(s)", self.rows.len());
        Ok(())
    }
}

/// Blank lines after the header, outside quoted fields.
///
/// The csv reader drops these without yielding a record; they still count as
/// zero-column rows.
fn blank_lines_after_header(data: &[u8]) -> usize {
    let mut in_quotes = false;
    let mut seen_header = false;
    let mut line_empty = true;
    let mut blank = 0;

    for &byte in data {
        match byte {
            b'"' => {
                in_quotes = !in_quotes;
                line_empty = false;
            }
            b'\n' if !in_quotes => {
                if line_empty && seen_header {
                    blank += 1;
                }
                seen_header |= !line_empty;
                line_empty = true;
            }
            b'\r' if !in_quotes => {}
            _ => line_empty = false,
        }
    }
    blank
}

/// Append rows, writing the header first when the file is missing or empty
pub fn append_rows(path: &Path, rows: &[LedgerRow]) -> Result<(), LedgerError> {
    let io_err = |source| LedgerError::Io { path: path.to_path_buf(), source };
    let csv_err = |source| LedgerError::Csv { path: path.to_path_buf(), source };

    let needs_header = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);

    if needs_header {
        writer.write_record(LEDGER_HEADER).map_err(csv_err)?;
    }
    for row in rows {
        writer.write_record(row.as_record()).map_err(csv_err)?;
    }
    writer.flush().map_err(io_err)?;

    info!("Appended {} row(s) to {}", rows.len(), path.display());
    Ok(())
}
