//! Carousel cross-selling dataset builder.
//!
//! Turns three raw interaction logs (impressions, taps, payments) into a
//! flat supervised-learning table: one row per target-week impression with
//! tap/payment labels and 21-day historical engagement features per
//! (user, value_prop) key.

mod dataset;
mod events;
mod export;
mod history;
mod observability;
mod sources;
mod windows;

pub use dataset::{build_dataset, DatasetBuildReport, DatasetError, DatasetRow};
pub use events::{
    ImpressionEvent, IngestReport, KeyKind, MalformedRecord, MissingColumn, PaymentEvent, TapEvent,
    UserId, DATE_FORMAT,
};
pub use export::{write_dataset, ExportError, DATASET_COLUMNS};
pub use history::{aggregate_history, FeatureKey, HistoryFeatures};
pub use observability::{
    init_logging, log_run_start, logging_config_from_env, LogFormat, LoggingConfig,
    LoggingInitError,
};
pub use sources::{
    load_source_tables, EventTable, SourceError, SourceTables, PAYS_FILE, PRINTS_FILE, TAPS_FILE,
};
pub use windows::{
    split_windows, DatasetWindows, WindowError, HISTORY_WINDOW_DAYS, TARGET_WEEK_DAYS,
};
