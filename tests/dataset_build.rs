use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use tempfile::tempdir;
use xsell::{
    build_dataset, load_source_tables, write_dataset, DatasetError, SourceError, DATASET_COLUMNS,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn print_line(user_id: &str, value_prop: &str, day: &str, position: u32) -> String {
    format!(
        "{{\"day\":\"{day}\",\"event_data\":{{\"position\":{position},\"value_prop\":\"{value_prop}\"}},\"user_id\":{user_id}}}\n"
    )
}

fn tap_line(user_id: &str, value_prop: &str, day: &str) -> String {
    format!(
        "{{\"day\":\"{day}\",\"event_data\":{{\"value_prop\":\"{value_prop}\"}},\"user_id\":{user_id}}}\n"
    )
}

/// Fixture spanning a 2020-11-30 max day: target week [11-24, 12-01),
/// history window [11-03, 11-24).
fn seed_input_dir(dir: &Path) {
    let mut prints = String::new();
    // u1/vpA history: three impressions, one tapped.
    prints.push_str(&print_line("1", "vpA", "2020-11-05", 0));
    prints.push_str(&print_line("1", "vpA", "2020-11-06", 1));
    prints.push_str(&print_line("1", "vpA", "2020-11-07", 0));
    // Before the history window entirely; must not count anywhere.
    prints.push_str(&print_line("1", "vpA", "2020-11-02", 0));
    // Target week rows.
    prints.push_str(&print_line("1", "vpA", "2020-11-28", 1));
    prints.push_str(&print_line("2", "vpB", "2020-11-30", 0));
    prints.push_str(&print_line("3", "vpC", "2020-11-24", 2));
    fs::write(dir.join("prints.json"), prints).unwrap();

    let mut taps = String::new();
    taps.push_str(&tap_line("1", "vpA", "2020-11-06"));
    // Same-day tap for the 11-28 impression, duplicated on purpose.
    taps.push_str(&tap_line("1", "vpA", "2020-11-28"));
    taps.push_str(&tap_line("1", "vpA", "2020-11-28"));
    fs::write(dir.join("taps.json"), taps).unwrap();

    let pays = "pay_date,total,user_id,value_prop\n\
                2020-11-10,10.0,3,vpC\n\
                2020-11-12,20.0,3,vpC\n\
                2020-11-29,25.5,1,vpA\n";
    fs::write(dir.join("pays.csv"), pays).unwrap();
}

#[test]
fn full_pipeline_produces_expected_rows_and_csv() {
    let dir = tempdir().unwrap();
    seed_input_dir(dir.path());

    let tables = load_source_tables(dir.path()).unwrap();
    let (rows, report) = build_dataset(&tables).unwrap();

    assert_eq!(report.target_start, date(2020, 11, 24));
    assert_eq!(report.target_end_exclusive, date(2020, 12, 1));
    assert_eq!(report.history_start, date(2020, 11, 3));

    // Exactly the three target-week impressions, sorted by day.
    assert_eq!(rows.len(), 3);
    assert_eq!(report.output_rows, 3);
    assert_eq!(rows[0].day, date(2020, 11, 24));
    assert_eq!(rows[1].day, date(2020, 11, 28));
    assert_eq!(rows[2].day, date(2020, 11, 30));

    // u3/vpC: history payments only; no payment on/after the impression day.
    let vpc = &rows[0];
    assert_eq!(vpc.user_id.as_str(), "3");
    assert_eq!(vpc.label_tap, 0);
    assert_eq!(vpc.label_pay, 0);
    assert_eq!(vpc.history.hist_impressions, 0);
    assert_eq!(vpc.history.hist_tap_rate, 0.0);
    assert_eq!(vpc.history.hist_payments, 2);
    assert!((vpc.history.hist_pay_amount_sum - 30.0).abs() < 1e-12);
    assert!((vpc.history.hist_pay_amount_avg - 15.0).abs() < 1e-12);

    // u1/vpA: tapped same day (duplicates collapse), paid the day after,
    // 3 history impressions with 1 tap.
    let vpa = &rows[1];
    assert_eq!(vpa.user_id.as_str(), "1");
    assert_eq!(vpa.position, 1);
    assert_eq!(vpa.label_tap, 1);
    assert_eq!(vpa.label_pay, 1);
    assert_eq!(vpa.history.hist_impressions, 3);
    assert_eq!(vpa.history.hist_taps, 1);
    assert!((vpa.history.hist_tap_rate - 1.0 / 3.0).abs() < 1e-12);
    assert!(vpa.history.hist_tap_rate >= 0.0 && vpa.history.hist_tap_rate <= 1.0);
    assert_eq!(vpa.history.hist_payments, 0);

    // u2/vpB: no history at all -> zero-filled record, labels off.
    let vpb = &rows[2];
    assert_eq!(vpb.user_id.as_str(), "2");
    assert_eq!(vpb.label_tap, 0);
    assert_eq!(vpb.label_pay, 0);
    assert_eq!(vpb.history.hist_impressions, 0);
    assert_eq!(vpb.history.hist_pay_amount_sum, 0.0);

    let out = dir.path().join("dataset_ready.csv");
    write_dataset(&out, &rows).unwrap();

    let body = fs::read_to_string(&out).unwrap();
    let mut lines = body.lines();
    assert_eq!(lines.next().unwrap(), DATASET_COLUMNS.join(","));
    assert_eq!(lines.count(), 3);
    assert!(body.contains("3,vpC,2020-11-24,2,0,0,0,0,0,2,30,15"));
}

#[test]
fn pipeline_is_deterministic_across_runs() {
    let dir = tempdir().unwrap();
    seed_input_dir(dir.path());

    let out_a = dir.path().join("a.csv");
    let out_b = dir.path().join("b.csv");

    let tables = load_source_tables(dir.path()).unwrap();
    let (rows_a, report_a) = build_dataset(&tables).unwrap();
    write_dataset(&out_a, &rows_a).unwrap();

    let tables = load_source_tables(dir.path()).unwrap();
    let (rows_b, report_b) = build_dataset(&tables).unwrap();
    write_dataset(&out_b, &rows_b).unwrap();

    assert_eq!(rows_a, rows_b);
    assert_eq!(report_a, report_b);
    assert_eq!(fs::read(&out_a).unwrap(), fs::read(&out_b).unwrap());
}

#[test]
fn malformed_rows_are_reported_but_do_not_abort() {
    let dir = tempdir().unwrap();
    seed_input_dir(dir.path());

    // Append junk to each file; the run must still succeed.
    let prints_path = dir.path().join("prints.json");
    let mut prints = fs::read_to_string(&prints_path).unwrap();
    prints.push_str("{\"day\":\"2020-11-30\"}\n");
    fs::write(&prints_path, prints).unwrap();

    let pays_path = dir.path().join("pays.csv");
    let mut pays = fs::read_to_string(&pays_path).unwrap();
    pays.push_str("2020-11-30,not_a_number,1,vpA\n");
    fs::write(&pays_path, pays).unwrap();

    let tables = load_source_tables(dir.path()).unwrap();
    let (rows, report) = build_dataset(&tables).unwrap();

    assert_eq!(rows.len(), 3);
    assert_eq!(report.prints.rows_malformed, 1);
    assert_eq!(report.pays.rows_malformed, 1);
}

#[test]
fn missing_input_file_fails_before_parsing() {
    let dir = tempdir().unwrap();
    seed_input_dir(dir.path());
    fs::remove_file(dir.path().join("taps.json")).unwrap();

    let err = load_source_tables(dir.path()).unwrap_err();
    match err {
        SourceError::MissingInputFile { path } => assert!(path.ends_with("taps.json")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn text_ids_in_one_source_fail_the_join_key_check() {
    let dir = tempdir().unwrap();
    seed_input_dir(dir.path());

    let pays = "pay_date,total,user_id,value_prop\n2020-11-10,10.0,buyer-a,vpC\n";
    fs::write(dir.path().join("pays.csv"), pays).unwrap();

    let tables = load_source_tables(dir.path()).unwrap();
    let err = build_dataset(&tables).unwrap_err();
    match err {
        DatasetError::JoinKeyTypeMismatch { table, found, .. } => {
            assert_eq!(table, "pays");
            assert_eq!(found, "text");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn empty_prints_file_is_a_fatal_empty_input() {
    let dir = tempdir().unwrap();
    seed_input_dir(dir.path());
    fs::write(dir.path().join("prints.json"), "").unwrap();

    let tables = load_source_tables(dir.path()).unwrap();
    assert!(matches!(
        build_dataset(&tables).unwrap_err(),
        DatasetError::Window(_)
    ));
}
