use std::env;
use std::path::PathBuf;

use xsell::{
    build_dataset, init_logging, load_source_tables, log_run_start, logging_config_from_env,
    write_dataset,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (input_dir, output) = parse_args()?;

    let logging = logging_config_from_env();
    init_logging(&logging)?;
    log_run_start(&logging, &input_dir, &output);

    let tables = load_source_tables(&input_dir)?;
    let (rows, report) = build_dataset(&tables)?;
    write_dataset(&output, &rows)?;

    let skipped = report.prints.rows_malformed
        + report.taps.rows_malformed
        + report.pays.rows_malformed;
    println!(
        "Dataset ready | output={} rows={} target={}..{} history_start={} keys={} rows_skipped={}",
        output.display(),
        report.output_rows,
        report.target_start,
        report.target_end_exclusive,
        report.history_start,
        report.history_keys,
        skipped
    );

    Ok(())
}

fn parse_args() -> Result<(PathBuf, PathBuf), Box<dyn std::error::Error>> {
    let mut input_dir = env::var("XSELL_INPUT_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."));
    let mut output = env::var("XSELL_OUTPUT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("dataset_ready.csv"));

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--input-dir" => {
                input_dir = PathBuf::from(
                    args.next()
                        .ok_or("--input-dir requires a directory argument")?,
                );
            }
            "--output" => {
                output = PathBuf::from(args.next().ok_or("--output requires a path argument")?);
            }
            "--help" | "-h" => {
                println!(
                    "usage: dataset_build [--input-dir <dir>] [--output <path>]\n\
                     \n\
                     Reads prints.json, taps.json and pays.csv from the input\n\
                     directory (default '.') and writes the training table to\n\
                     the output path (default 'dataset_ready.csv').\n\
                     Env fallbacks: XSELL_INPUT_DIR, XSELL_OUTPUT."
                );
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}").into()),
        }
    }

    Ok((input_dir, output))
}
