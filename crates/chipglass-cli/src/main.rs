//! Reference host for the load path: parse a layout file, print the
//! statistics block as JSON, list warnings, exit non-zero on failure.
//!
//! ```text
//! chipglass path/to/chip.gds
//! ```

use std::process::ExitCode;

use chipglass_io::{load, LoadOptions};

fn main() -> ExitCode {
    env_logger::init();

    let path = match std::env::args().nth(1) {
        Some(p) => p,
        None => {
            eprintln!("usage: chipglass <layout.gds|layout.dxf>");
            return ExitCode::from(2);
        }
    };

    let bytes = match std::fs::read(&path) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("cannot read {path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut progress = |pct: u8, msg: &str| log::info!("{pct:>3}% {msg}");
    let mut opts = LoadOptions {
        progress: Some(&mut progress),
        ..Default::default()
    };

    match load(&bytes, &path, &mut opts) {
        Ok(result) => {
            match serde_json::to_string_pretty(&result.stats) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("cannot serialize statistics: {e}");
                    return ExitCode::FAILURE;
                }
            }
            for warning in &result.warnings {
                eprintln!("warning: {warning}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("load failed: {e}");
            ExitCode::FAILURE
        }
    }
}
