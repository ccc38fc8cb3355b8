//! Input-directory loading of the three raw carousel logs.
//!
//! All three files are resolved and checked for existence before any parsing
//! starts, then read fully into memory once per run. Row-level problems are
//! skipped and counted per table; only structural problems (missing file,
//! unreadable directory, broken pays header) are fatal.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::events::{
    normalize_impression, normalize_payment, normalize_tap, ImpressionEvent, IngestReport,
    KeyKind, MissingColumn, PaymentEvent, PaysLayout, TapEvent,
};

pub const PRINTS_FILE: &str = "prints.json";
pub const TAPS_FILE: &str = "taps.json";
pub const PAYS_FILE: &str = "pays.csv";

/// One ingested source table: surviving rows, the observed user-id
/// representation, and the skip accounting.
#[derive(Debug, Clone)]
pub struct EventTable<T> {
    pub rows: Vec<T>,
    pub key_kind: Option<KeyKind>,
    pub report: IngestReport,
}

impl<T> Default for EventTable<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            key_kind: None,
            report: IngestReport::default(),
        }
    }
}

impl<T> EventTable<T> {
    fn push(&mut self, row: T, kind: KeyKind) {
        self.rows.push(row);
        self.report.record_ok();
        self.observe_kind(kind);
    }

    fn skip(&mut self) {
        self.report.record_malformed();
    }

    // A single non-numeric id makes the whole table's key column textual;
    // numeric strings and JSON numbers both count as integer-like.
    fn observe_kind(&mut self, kind: KeyKind) {
        match (self.key_kind, kind) {
            (_, KeyKind::Text) => self.key_kind = Some(KeyKind::Text),
            (None, KeyKind::Integer) => self.key_kind = Some(KeyKind::Integer),
            (Some(_), KeyKind::Integer) => {}
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SourceTables {
    pub prints: EventTable<ImpressionEvent>,
    pub taps: EventTable<TapEvent>,
    pub pays: EventTable<PaymentEvent>,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("input directory does not exist or is not a directory: {path}")]
    InvalidInputDir { path: PathBuf },
    #[error("required input file is missing: {path}")]
    MissingInputFile { path: PathBuf },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    MissingPaysColumn(#[from] MissingColumn),
}

/// Loads `prints.json`, `taps.json` and `pays.csv` from `input_dir`.
pub fn load_source_tables(input_dir: &Path) -> Result<SourceTables, SourceError> {
    if !input_dir.is_dir() {
        return Err(SourceError::InvalidInputDir {
            path: input_dir.to_path_buf(),
        });
    }

    let prints_path = input_dir.join(PRINTS_FILE);
    let taps_path = input_dir.join(TAPS_FILE);
    let pays_path = input_dir.join(PAYS_FILE);
    for path in [&prints_path, &taps_path, &pays_path] {
        if !path.is_file() {
            return Err(SourceError::MissingInputFile { path: path.clone() });
        }
    }

    let prints = load_jsonl(&prints_path, normalize_impression)?;
    let taps = load_jsonl(&taps_path, normalize_tap)?;
    let pays = load_pays(&pays_path)?;

    Ok(SourceTables { prints, taps, pays })
}

fn load_jsonl<T>(
    path: &Path,
    normalize: impl Fn(&Value) -> Result<(T, KeyKind), crate::events::MalformedRecord>,
) -> Result<EventTable<T>, SourceError> {
    let raw = fs::read_to_string(path)?;
    let mut table = EventTable::default();

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    component = "sources",
                    event = "sources.row.malformed",
                    file = %path.display(),
                    reason = %err
                );
                table.skip();
                continue;
            }
        };
        match normalize(&value) {
            Ok((row, kind)) => table.push(row, kind),
            Err(err) => {
                warn!(
                    component = "sources",
                    event = "sources.row.malformed",
                    file = %path.display(),
                    reason = %err
                );
                table.skip();
            }
        }
    }

    log_table_loaded(path, &table.report);
    Ok(table)
}

fn load_pays(path: &Path) -> Result<EventTable<PaymentEvent>, SourceError> {
    let raw = fs::read_to_string(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(raw.as_bytes());

    let layout = PaysLayout::resolve(reader.headers()?)?;
    let mut table = EventTable::default();

    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                warn!(
                    component = "sources",
                    event = "sources.row.malformed",
                    file = %path.display(),
                    reason = %err
                );
                table.skip();
                continue;
            }
        };
        match normalize_payment(&record, &layout) {
            Ok((row, kind)) => table.push(row, kind),
            Err(err) => {
                warn!(
                    component = "sources",
                    event = "sources.row.malformed",
                    file = %path.display(),
                    reason = %err
                );
                table.skip();
            }
        }
    }

    log_table_loaded(path, &table.report);
    Ok(table)
}

fn log_table_loaded(path: &Path, report: &IngestReport) {
    info!(
        component = "sources",
        event = "sources.table.loaded",
        file = %path.display(),
        rows_read = report.rows_read,
        rows_malformed = report.rows_malformed
    );
    if report.rows_malformed > 0 {
        warn!(
            component = "sources",
            event = "sources.table.rows_skipped",
            file = %path.display(),
            rows_malformed = report.rows_malformed
        );
    }
}
