//! Typed carousel event model and row-level normalization.
//!
//! Raw prints/taps rows are JSON Lines objects with the carousel placement
//! nested under `event_data`; raw payments rows come from a headered CSV.
//! Normalization flattens both into the typed events below. Malformed rows
//! are reported per row via [`MalformedRecord`] so callers can skip and count
//! them instead of aborting the run.

use std::fmt;

use chrono::NaiveDate;
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Canonical join key for a user. Raw logs carry ids either as JSON numbers
/// or as strings; both canonicalize to the decimal/text form so that joins
/// are exact within a run. The raw representation is remembered separately
/// as a [`KeyKind`] per source table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Observed representation of the user id column in one source table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyKind {
    Integer,
    Text,
}

impl KeyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Text => "text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpressionEvent {
    pub user_id: UserId,
    pub value_prop: String,
    pub day: NaiveDate,
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapEvent {
    pub user_id: UserId,
    pub value_prop: String,
    pub day: NaiveDate,
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub user_id: UserId,
    pub value_prop: String,
    pub pay_date: NaiveDate,
    pub amount: f64,
}

/// Per-source ingestion accounting. Malformed rows are skipped, never fatal,
/// but the count must survive to the final report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub rows_read: u64,
    pub rows_malformed: u64,
}

impl IngestReport {
    pub fn record_ok(&mut self) {
        self.rows_read += 1;
    }

    pub fn record_malformed(&mut self) {
        self.rows_read += 1;
        self.rows_malformed += 1;
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedRecord {
    #[error("missing required field '{field}'")]
    MissingField { field: &'static str },
    #[error("invalid date '{value}' in field '{field}'")]
    InvalidDate { field: &'static str, value: String },
    #[error("invalid number '{value}' in field '{field}'")]
    InvalidNumber { field: &'static str, value: String },
    #[error("field '{field}' has unsupported type")]
    UnsupportedType { field: &'static str },
    #[error("line is not a JSON object")]
    NotAnObject,
}

/// Resolved column indices for the payments CSV. Column order is not
/// significant; the amount column may be exported as `total` or `amount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaysLayout {
    pub pay_date: usize,
    pub user_id: usize,
    pub value_prop: usize,
    pub amount: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("payments CSV is missing required column '{column}'")]
pub struct MissingColumn {
    pub column: &'static str,
}

impl PaysLayout {
    pub fn resolve(headers: &StringRecord) -> Result<Self, MissingColumn> {
        let find = |names: &[&str], column: &'static str| {
            headers
                .iter()
                .position(|h| names.contains(&h.trim()))
                .ok_or(MissingColumn { column })
        };

        Ok(Self {
            pay_date: find(&["pay_date"], "pay_date")?,
            user_id: find(&["user_id"], "user_id")?,
            value_prop: find(&["value_prop"], "value_prop")?,
            amount: find(&["total", "amount"], "total")?,
        })
    }
}

pub fn normalize_impression(line: &Value) -> Result<(ImpressionEvent, KeyKind), MalformedRecord> {
    let (user_id, kind, value_prop, day, position) = normalize_carousel_row(line, true)?;
    let position = position.ok_or(MalformedRecord::MissingField { field: "position" })?;
    Ok((
        ImpressionEvent {
            user_id,
            value_prop,
            day,
            position,
        },
        kind,
    ))
}

pub fn normalize_tap(line: &Value) -> Result<(TapEvent, KeyKind), MalformedRecord> {
    // Taps are matched by (user, value_prop, day) only, so a missing
    // position is tolerated here.
    let (user_id, kind, value_prop, day, position) = normalize_carousel_row(line, false)?;
    Ok((
        TapEvent {
            user_id,
            value_prop,
            day,
            position: position.unwrap_or(0),
        },
        kind,
    ))
}

pub fn normalize_payment(
    record: &StringRecord,
    layout: &PaysLayout,
) -> Result<(PaymentEvent, KeyKind), MalformedRecord> {
    let pay_date = parse_date_str(field(record, layout.pay_date, "pay_date")?, "pay_date")?;
    let (user_id, kind) = user_id_from_str(field(record, layout.user_id, "user_id")?)?;
    let value_prop = field(record, layout.value_prop, "value_prop")?.to_string();
    let amount_raw = field(record, layout.amount, "total")?;
    let amount = amount_raw
        .parse::<f64>()
        .map_err(|_| MalformedRecord::InvalidNumber {
            field: "total",
            value: amount_raw.to_string(),
        })?;

    Ok((
        PaymentEvent {
            user_id,
            value_prop,
            pay_date,
            amount,
        },
        kind,
    ))
}

fn normalize_carousel_row(
    line: &Value,
    require_position: bool,
) -> Result<(UserId, KeyKind, String, NaiveDate, Option<u32>), MalformedRecord> {
    let obj = line.as_object().ok_or(MalformedRecord::NotAnObject)?;

    let day_raw = obj
        .get("day")
        .and_then(Value::as_str)
        .ok_or(MalformedRecord::MissingField { field: "day" })?;
    let day = parse_date_str(day_raw, "day")?;

    let (user_id, kind) = user_id_from_json(
        obj.get("user_id")
            .ok_or(MalformedRecord::MissingField { field: "user_id" })?,
    )?;

    let event_data = obj
        .get("event_data")
        .ok_or(MalformedRecord::MissingField { field: "event_data" })?
        .as_object()
        .ok_or(MalformedRecord::UnsupportedType {
            field: "event_data",
        })?;

    let value_prop = event_data
        .get("value_prop")
        .and_then(Value::as_str)
        .ok_or(MalformedRecord::MissingField { field: "value_prop" })?
        .to_string();

    let position = match event_data.get("position") {
        Some(value) => Some(json_position(value)?),
        None if require_position => {
            return Err(MalformedRecord::MissingField { field: "position" })
        }
        None => None,
    };

    Ok((user_id, kind, value_prop, day, position))
}

fn json_position(value: &Value) -> Result<u32, MalformedRecord> {
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).map_err(|_| MalformedRecord::InvalidNumber {
            field: "position",
            value: n.to_string(),
        });
    }
    if let Some(text) = value.as_str() {
        return text.parse::<u32>().map_err(|_| MalformedRecord::InvalidNumber {
            field: "position",
            value: text.to_string(),
        });
    }
    Err(MalformedRecord::UnsupportedType { field: "position" })
}

fn user_id_from_json(value: &Value) -> Result<(UserId, KeyKind), MalformedRecord> {
    if let Some(n) = value.as_i64() {
        return Ok((UserId::new(n.to_string()), KeyKind::Integer));
    }
    if let Some(text) = value.as_str() {
        return user_id_from_str(text);
    }
    Err(MalformedRecord::UnsupportedType { field: "user_id" })
}

fn user_id_from_str(raw: &str) -> Result<(UserId, KeyKind), MalformedRecord> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(MalformedRecord::MissingField { field: "user_id" });
    }
    let kind = if trimmed.parse::<i64>().is_ok() {
        KeyKind::Integer
    } else {
        KeyKind::Text
    };
    Ok((UserId::new(trimmed), kind))
}

fn field<'a>(
    record: &'a StringRecord,
    idx: usize,
    name: &'static str,
) -> Result<&'a str, MalformedRecord> {
    match record.get(idx).map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(MalformedRecord::MissingField { field: name }),
    }
}

fn parse_date_str(raw: &str, field: &'static str) -> Result<NaiveDate, MalformedRecord> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|_| MalformedRecord::InvalidDate {
        field,
        value: raw.to_string(),
    })
}
