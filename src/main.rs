//! `tidyframe` command line entry point.
//!
//! ```bash
//! tidyframe inspect data/raw/sales.csv
//! tidyframe template data/raw/sales.csv --name sales
//! tidyframe run --recipe data/recipes/sales.json --input data/raw/sales.csv
//! tidyframe verify data/clean/sales_clean.csv.receipt.json
//! ```

#![warn(clippy::all, rust_2018_idioms)]
#![expect(clippy::print_stdout, clippy::print_stderr)] // Reports go to the terminal

mod cli;

use anyhow::Result;
use clap::Parser as _;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    if let Err(e) = tidyframe::logging::init(cli.verbose) {
        eprintln!("Warning: logging unavailable: {e:#}");
    }

    cli::run(cli)
}
