//! Recipe-driven cleaning pipelines.
//!
//! A cleaning checklist is captured as a versioned JSON recipe
//! ([`PipelineSpec`]), validated against the input schema, then run step by
//! step. Running the same recipe on the same raw file reproduces the same
//! output.
//!
//! # Steps
//!
//! - **Column names**: `standardize_names`, `rename_columns`, `drop_columns`
//! - **Text**: `trim_whitespace`
//! - **Missing values**: `drop_nulls`, `fill_nulls` (mean/median/mode/zero)
//! - **Types**: `cast_types`, `parse_dates`
//! - **Rows**: `drop_duplicates`, `filter`
//! - **New columns**: `derive`
//!
//! # Example
//!
//! ```no_run
//! use tidyframe::config::Settings;
//! use tidyframe::pipeline::{PipelineSpec, Step, run_pipeline};
//! use std::path::Path;
//!
//! let mut spec = PipelineSpec::checklist("sales");
//! spec.steps.push(Step::Filter { predicate: "price > 0".parse()? });
//! spec.steps.push(Step::Derive {
//!     name: "total".to_owned(),
//!     expression: "price * quantity".parse()?,
//! });
//!
//! let report = run_pipeline(
//!     &spec,
//!     Path::new("data/raw/sales.csv"),
//!     Some(Path::new("data/clean/sales_clean.csv")),
//!     &Settings::default(),
//! )?;
//! println!("{}", report.summary());
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod executor;
pub mod expr;
pub mod spec;
pub mod validation;

pub use executor::{RunReport, StepReport, apply_step, run_on_frame, run_pipeline};
pub use expr::{ArithOp, CompareOp, DeriveSpec, Expression, Operand, Predicate};
pub use spec::{
    ColumnType, ImputeStrategy, KeepStrategy, OutputConfig, PipelineSpec, SPEC_VERSION,
    SchemaConfig, SchemaMatchMode, Step,
};
pub use validation::{ValidationError, validate_pipeline};
