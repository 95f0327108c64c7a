//! # tidyframe - reproducible cleaning of tabular data
//!
//! tidyframe turns the usual data-cleaning checklist (load, inspect, rename,
//! drop missing values, fix types, drop duplicates, filter, derive, save)
//! into a JSON recipe that can be reviewed, versioned and re-run on the raw
//! file to get the same clean file again.
//!
//! ## Quick Start
//!
//! ```no_run
//! use tidyframe::config::Settings;
//! use tidyframe::dataset::{inspect_df, load_df};
//! use tidyframe::pipeline::{PipelineSpec, run_pipeline};
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! let settings = Settings::default();
//! let raw = Path::new("data/raw/sales.csv");
//!
//! // Look before cleaning
//! let profile = inspect_df(&load_df(raw, &settings.csv)?, settings.preview_rows)?;
//! println!("{}", profile.render());
//!
//! // Draft a recipe from what the profile shows, then run it
//! let spec = PipelineSpec::from_profile("sales", &profile);
//! let report = run_pipeline(&spec, raw, Some(Path::new("data/clean/sales.csv")), &settings)?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`dataset`]: loading, saving, profiling and column-name tidying
//! - [`pipeline`]: recipes, validation and execution
//! - [`integrity`]: run receipts and their verification
//! - [`workspace`]: raw/clean directory layout and the raw-data guard
//! - [`config`]: settings file and environment overrides
//! - [`error`]: error type for the workspace and integrity layers
//! - [`logging`]: tracing setup for the command line tool
//!
//! ## Raw data is read-only
//!
//! Outputs that resolve to the input file, or that land inside the configured
//! raw directory, are refused with [`error::TidyError::RawOverwrite`].

#![warn(clippy::all, rust_2018_idioms)]

pub mod config;
pub mod dataset;
pub mod error;
pub mod integrity;
pub mod logging;
pub mod pipeline;
pub mod workspace;
