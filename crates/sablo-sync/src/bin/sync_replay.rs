//! `sync-replay`: run a sync replay script and print the report.
//!
//! Usage:
//!   sync-replay [SCRIPT]
//!
//! The script is read from the file named by the first argument, or from
//! stdin when no argument is given. Set `RUST_LOG=sablo_sync=debug` to see
//! protocol decisions on stderr.

use std::io::{self, Read, Write};

use sablo_sync::replay::run_str;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let input = match args.get(1) {
        Some(path) => std::fs::read_to_string(path),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).map(|_| buf)
        }
    };
    let input = match input {
        Ok(input) => input,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let report = match run_str(&input) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    match serde_json::to_string_pretty(&report) {
        Ok(out) => {
            let mut stdout = io::stdout();
            if writeln!(stdout, "{out}").is_err() {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
