//! Run receipts and their verification.
//!
//! Every pipeline run can leave a `<output>.receipt.json` next to its output.
//! The receipt records the SHA-256 of the raw input, the hash of the recipe
//! that ran, and the hash and schema of the cleaned output, so a run can be
//! checked later:
//!
//! ```no_run
//! use tidyframe::integrity;
//! use std::path::Path;
//!
//! # fn example() -> tidyframe::error::Result<()> {
//! let report = integrity::verify_receipt_file(Path::new(
//!     "data/clean/sales_clean.csv.receipt.json",
//! ))?;
//! if !report.passed {
//!     eprintln!("{}", report.format_cli());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Hashes are byte-level: converting line endings or re-saving a CSV in a
//! spreadsheet will fail verification even when the values are unchanged.

pub mod hasher;
pub mod receipt;
pub mod verifier;

pub use hasher::{compute_file_hash, compute_recipe_hash};
pub use receipt::{
    FileFingerprint, OutputInfo, ProducerInfo, RecipeInfo, RunReceipt, SchemaColumn,
    create_receipt, load_receipt, receipt_path_for, save_receipt,
};
pub use verifier::{
    CheckOutcome, FileCheck, FileRole, VerificationReport, verify_receipt, verify_receipt_file,
};
