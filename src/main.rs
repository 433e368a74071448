//! imgmatch - perceptual near-duplicate image finder.
//!
//! Entry point for the imgmatch CLI.

use clap::Parser;
use imgmatch::{cli::Cli, error::ExitCode};

fn main() {
    let cli = Cli::parse();

    match imgmatch::run_app(cli) {
        Ok(code) => std::process::exit(code.as_i32()),
        Err(err) => {
            eprintln!("Error: {:#}", err);
            std::process::exit(ExitCode::GeneralError.as_i32());
        }
    }
}
