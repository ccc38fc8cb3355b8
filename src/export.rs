//! CSV export of the final dataset table.

use std::fs;
use std::io::Write;
use std::path::Path;

use thiserror::Error;
use tracing::info;

use crate::dataset::DatasetRow;
use crate::events::DATE_FORMAT;

/// Column order of `dataset_ready.csv`. Stable across runs; identity columns,
/// then labels, then historical features.
pub const DATASET_COLUMNS: [&str; 12] = [
    "user_id",
    "value_prop",
    "day",
    "position",
    "label_tap",
    "label_pay",
    "hist_impressions",
    "hist_taps",
    "hist_tap_rate",
    "hist_payments",
    "hist_pay_amount_sum",
    "hist_pay_amount_avg",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("invalid output path: {path}")]
    InvalidOutputPath { path: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Writes the dataset with a header row. The file lands atomically: bytes go
/// to a sibling temp file first and are renamed into place.
pub fn write_dataset(path: &Path, rows: &[DatasetRow]) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(DATASET_COLUMNS)?;
    for row in rows {
        writer.write_record(&record_fields(row))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| std::io::Error::other(err.to_string()))?;

    write_atomic(path, &bytes)?;

    info!(
        component = "export",
        event = "export.dataset.written",
        path = %path.display(),
        rows = rows.len(),
        bytes = bytes.len()
    );

    Ok(())
}

fn record_fields(row: &DatasetRow) -> [String; 12] {
    [
        row.user_id.as_str().to_string(),
        row.value_prop.clone(),
        row.day.format(DATE_FORMAT).to_string(),
        row.position.to_string(),
        row.label_tap.to_string(),
        row.label_pay.to_string(),
        row.history.hist_impressions.to_string(),
        row.history.hist_taps.to_string(),
        row.history.hist_tap_rate.to_string(),
        row.history.hist_payments.to_string(),
        row.history.hist_pay_amount_sum.to_string(),
        row.history.hist_pay_amount_avg.to_string(),
    ]
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ExportError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| ExportError::InvalidOutputPath {
            path: path.display().to_string(),
        })?;
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    let written = (|| {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    if let Err(err) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }

    Ok(())
}
