//! Label & join engine and top-level dataset assembly.
//!
//! `build_dataset` is the one-pass pipeline: validate that the three source
//! tables carry comparable join keys, split the date range into target week
//! and history window, aggregate history features, then label and left-join
//! every target-week impression. The output row population is exactly the
//! target-week impressions; the join never adds or drops rows.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::events::{IngestReport, KeyKind, UserId};
use crate::history::{aggregate_history, FeatureKey, HistoryFeatures};
use crate::sources::SourceTables;
use crate::windows::{split_windows, WindowError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRow {
    pub user_id: UserId,
    pub value_prop: String,
    pub day: NaiveDate,
    pub position: u32,
    /// 1 iff a tap exists with identical (user_id, value_prop, day).
    /// Presence-based: duplicate taps for the triple do not change it.
    pub label_tap: u8,
    /// 1 iff any payment for (user_id, value_prop) carries a pay_date on or
    /// after this impression's day. The horizon is open-ended: a matching
    /// payment anywhere in the payments input counts, not only inside the
    /// target week.
    pub label_pay: u8,
    pub history: HistoryFeatures,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetBuildReport {
    pub prints: IngestReport,
    pub taps: IngestReport,
    pub pays: IngestReport,
    pub history_start: NaiveDate,
    pub target_start: NaiveDate,
    pub target_end_exclusive: NaiveDate,
    pub history_keys: u64,
    pub output_rows: u64,
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error(
        "join key type mismatch: {table} carries {found} user ids while {reference_table} carries {expected}"
    )]
    JoinKeyTypeMismatch {
        table: &'static str,
        found: &'static str,
        reference_table: &'static str,
        expected: &'static str,
    },
}

/// Runs the full feature-engineering pipeline over already-loaded tables.
pub fn build_dataset(
    tables: &SourceTables,
) -> Result<(Vec<DatasetRow>, DatasetBuildReport), DatasetError> {
    validate_join_keys(tables)?;
    let windows = split_windows(&tables.prints.rows)?;

    info!(
        component = "dataset",
        event = "dataset.build.start",
        history_start = %windows.history_start,
        target_start = %windows.target_start,
        target_end_exclusive = %windows.target_end_exclusive,
        prints = tables.prints.rows.len(),
        taps = tables.taps.rows.len(),
        pays = tables.pays.rows.len()
    );

    let history = aggregate_history(
        &windows,
        &tables.prints.rows,
        &tables.taps.rows,
        &tables.pays.rows,
    );
    let tap_triples = tap_triples(tables);
    let latest_payment = latest_payment_by_key(tables);

    let mut rows: Vec<DatasetRow> = tables
        .prints
        .rows
        .iter()
        .filter(|impression| windows.in_target(impression.day))
        .map(|impression| {
            let key = (impression.user_id.clone(), impression.value_prop.clone());
            let label_tap = u8::from(tap_triples.contains(&(
                impression.user_id.clone(),
                impression.value_prop.clone(),
                impression.day,
            )));
            let label_pay = u8::from(
                latest_payment
                    .get(&key)
                    .is_some_and(|latest| *latest >= impression.day),
            );
            let history = history.get(&key).copied().unwrap_or_default();

            DatasetRow {
                user_id: impression.user_id.clone(),
                value_prop: impression.value_prop.clone(),
                day: impression.day,
                position: impression.position,
                label_tap,
                label_pay,
                history,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        (a.day, &a.user_id, &a.value_prop, a.position).cmp(&(
            b.day,
            &b.user_id,
            &b.value_prop,
            b.position,
        ))
    });

    let report = DatasetBuildReport {
        prints: tables.prints.report,
        taps: tables.taps.report,
        pays: tables.pays.report,
        history_start: windows.history_start,
        target_start: windows.target_start,
        target_end_exclusive: windows.target_end_exclusive,
        history_keys: history.len() as u64,
        output_rows: rows.len() as u64,
    };

    info!(
        component = "dataset",
        event = "dataset.build.finish",
        output_rows = report.output_rows,
        history_keys = report.history_keys,
        rows_malformed = report.prints.rows_malformed
            + report.taps.rows_malformed
            + report.pays.rows_malformed
    );

    Ok((rows, report))
}

// An empty-joined result from numeric-vs-text ids must fail loudly, before
// any aggregation runs; emptiness downstream would be indistinguishable from
// genuinely sparse data.
fn validate_join_keys(tables: &SourceTables) -> Result<(), DatasetError> {
    let observed: [(&'static str, Option<KeyKind>); 3] = [
        ("prints", tables.prints.key_kind),
        ("taps", tables.taps.key_kind),
        ("pays", tables.pays.key_kind),
    ];

    let mut reference: Option<(&'static str, KeyKind)> = None;
    for (table, kind) in observed {
        let Some(kind) = kind else {
            continue;
        };
        match reference {
            None => reference = Some((table, kind)),
            Some((reference_table, expected)) if expected != kind => {
                return Err(DatasetError::JoinKeyTypeMismatch {
                    table,
                    found: kind.as_str(),
                    reference_table,
                    expected: expected.as_str(),
                });
            }
            Some(_) => {}
        }
    }

    Ok(())
}

fn tap_triples(tables: &SourceTables) -> HashSet<(UserId, String, NaiveDate)> {
    tables
        .taps
        .rows
        .iter()
        .map(|tap| (tap.user_id.clone(), tap.value_prop.clone(), tap.day))
        .collect()
}

fn latest_payment_by_key(tables: &SourceTables) -> HashMap<FeatureKey, NaiveDate> {
    let mut latest: HashMap<FeatureKey, NaiveDate> = HashMap::new();
    for payment in &tables.pays.rows {
        let key = (payment.user_id.clone(), payment.value_prop.clone());
        latest
            .entry(key)
            .and_modify(|existing| {
                if payment.pay_date > *existing {
                    *existing = payment.pay_date;
                }
            })
            .or_insert(payment.pay_date);
    }
    latest
}
