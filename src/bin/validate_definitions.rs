//! CLI tool to check a definitions directory before deploying it.
//!
//! Usage:
//!   cargo run --bin validate-definitions -- ./definitions

use std::env;
use std::path::PathBuf;

use insights_report_lib::config::Config;
use insights_report_lib::services::Registry;

fn main() {
    dotenvy::dotenv().ok();

    let dir = match env::args().nth(1) {
        Some(arg) if arg == "--help" || arg == "-h" => {
            println!("Usage: validate-definitions [DEFINITIONS_DIR]");
            println!();
            println!("Defaults to DEFINITIONS_DIR, or ./definitions in development.");
            return;
        }
        Some(arg) => PathBuf::from(arg),
        None => match Config::from_env() {
            Ok(config) => config.definitions_dir,
            Err(e) => {
                eprintln!("Error: no directory given and configuration failed to load: {}", e);
                std::process::exit(1);
            }
        },
    };

    match Registry::load(&dir) {
        Ok(registry) => {
            println!("{}: {}", dir.display(), registry.summary());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
