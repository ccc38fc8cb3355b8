//! Historical feature aggregation over the history window.
//!
//! Events dated inside the history window are grouped by
//! `(user_id, value_prop)` and reduced to the `hist_*` feature set. The key
//! set is the union over the three tables; a key seen only in payments still
//! yields a record with zeroed impression/tap fields. Ratios over empty
//! groups are defined as 0, never NaN.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::events::{ImpressionEvent, PaymentEvent, TapEvent, UserId};
use crate::windows::DatasetWindows;

pub type FeatureKey = (UserId, String);

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryFeatures {
    pub hist_impressions: u64,
    pub hist_taps: u64,
    pub hist_tap_rate: f64,
    pub hist_payments: u64,
    pub hist_pay_amount_sum: f64,
    pub hist_pay_amount_avg: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    impressions: u64,
    taps: u64,
    payments: u64,
    pay_amount_sum: f64,
}

impl Accumulator {
    fn finish(self) -> HistoryFeatures {
        let hist_tap_rate = if self.impressions > 0 {
            self.taps as f64 / self.impressions as f64
        } else {
            0.0
        };
        let hist_pay_amount_avg = if self.payments > 0 {
            self.pay_amount_sum / self.payments as f64
        } else {
            0.0
        };

        HistoryFeatures {
            hist_impressions: self.impressions,
            hist_taps: self.taps,
            hist_tap_rate,
            hist_payments: self.payments,
            hist_pay_amount_sum: self.pay_amount_sum,
            hist_pay_amount_avg,
        }
    }
}

/// Aggregates the history-window slice of the three event tables into one
/// feature record per observed key. Only events with a day strictly inside
/// the history window contribute; target-week events never leak in.
pub fn aggregate_history(
    windows: &DatasetWindows,
    impressions: &[ImpressionEvent],
    taps: &[TapEvent],
    payments: &[PaymentEvent],
) -> HashMap<FeatureKey, HistoryFeatures> {
    let mut groups: HashMap<FeatureKey, Accumulator> = HashMap::new();

    for event in impressions {
        if windows.in_history(event.day) {
            let entry = groups
                .entry((event.user_id.clone(), event.value_prop.clone()))
                .or_default();
            entry.impressions += 1;
        }
    }

    for event in taps {
        if windows.in_history(event.day) {
            let entry = groups
                .entry((event.user_id.clone(), event.value_prop.clone()))
                .or_default();
            entry.taps += 1;
        }
    }

    for event in payments {
        if windows.in_history(event.pay_date) {
            let entry = groups
                .entry((event.user_id.clone(), event.value_prop.clone()))
                .or_default();
            entry.payments += 1;
            entry.pay_amount_sum += event.amount;
        }
    }

    let features: HashMap<FeatureKey, HistoryFeatures> = groups
        .into_iter()
        .map(|(key, acc)| (key, acc.finish()))
        .collect();

    info!(
        component = "history",
        event = "history.aggregate.finish",
        history_start = %windows.history_start,
        history_end_exclusive = %windows.target_start,
        keys = features.len()
    );

    features
}
