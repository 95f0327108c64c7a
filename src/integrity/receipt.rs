//! Run receipts: what went in, which recipe ran, what came out.

use super::hasher::{HASH_ALGORITHM, compute_file_hash, compute_recipe_hash};
use crate::error::{Result, ResultExt as _};
use crate::pipeline::PipelineSpec;
use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Current receipt schema version.
///
/// Bump on breaking changes to the receipt layout.
pub const RECEIPT_VERSION: u32 = 1;

/// Record of one pipeline run, written next to the cleaned output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReceipt {
    pub receipt_version: u32,

    /// UTC timestamp of the run
    pub created_utc: DateTime<Utc>,

    pub producer: ProducerInfo,

    /// Recipe name and hash of its canonical JSON
    pub recipe: RecipeInfo,

    /// Raw input as it was read; `path` is absolute
    pub input: FileFingerprint,

    /// Cleaned output; `path` is the file name, relative to the receipt
    pub output: OutputInfo,

    /// Rows in the input before any step ran
    pub rows_before: usize,

    /// Rows written to the output
    pub rows_after: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerInfo {
    pub app_name: String,
    pub app_version: String,
    pub platform: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeInfo {
    pub name: String,
    pub hash: String,
}

/// Size and hash of a file at the time of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFingerprint {
    pub path: String,
    pub file_size_bytes: u64,
    pub hash_algorithm: String,
    pub hash: String,
}

impl FileFingerprint {
    /// Hash `path` and record it under the name `recorded_as`.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read.
    pub fn of(path: &Path, recorded_as: String) -> Result<Self> {
        let hash = compute_file_hash(path)
            .with_context(|| format!("Failed to compute hash for {}", path.display()))?;
        let metadata = fs::metadata(path)
            .with_context(|| format!("Failed to read file metadata: {}", path.display()))?;

        Ok(Self {
            path: recorded_as,
            file_size_bytes: metadata.len(),
            hash_algorithm: HASH_ALGORITHM.to_owned(),
            hash,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputInfo {
    #[serde(flatten)]
    pub file: FileFingerprint,

    /// File format (csv, parquet, json)
    pub format: String,

    pub column_count: usize,

    pub schema: Vec<SchemaColumn>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaColumn {
    pub name: String,
    pub dtype: String,
}

/// Build a receipt for a finished run. Both files must exist.
///
/// # Errors
///
/// Returns error if either file cannot be hashed or the recipe cannot be
/// serialised.
pub fn create_receipt(
    spec: &PipelineSpec,
    input_path: &Path,
    output_path: &Path,
    output_df: &DataFrame,
    rows_before: usize,
) -> Result<RunReceipt> {
    let input_recorded = std::path::absolute(input_path)
        .unwrap_or_else(|_| input_path.to_path_buf())
        .display()
        .to_string();
    let input = FileFingerprint::of(input_path, input_recorded)?;

    let output_name = output_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_owned();
    let format = output_path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_lowercase();

    let schema: Vec<SchemaColumn> = output_df
        .schema()
        .iter()
        .map(|(name, dtype)| SchemaColumn {
            name: name.to_string(),
            dtype: dtype.to_string(),
        })
        .collect();

    let output = OutputInfo {
        file: FileFingerprint::of(output_path, output_name)?,
        format,
        column_count: output_df.width(),
        schema,
    };

    Ok(RunReceipt {
        receipt_version: RECEIPT_VERSION,
        created_utc: Utc::now(),
        producer: ProducerInfo {
            app_name: env!("CARGO_PKG_NAME").to_owned(),
            app_version: env!("CARGO_PKG_VERSION").to_owned(),
            platform: std::env::consts::OS.to_owned(),
        },
        recipe: RecipeInfo {
            name: spec.name.clone(),
            hash: compute_recipe_hash(spec)?,
        },
        input,
        output,
        rows_before,
        rows_after: output_df.height(),
    })
}

/// `data/clean/sales_clean.csv` -> `data/clean/sales_clean.csv.receipt.json`
pub fn receipt_path_for(output_path: &Path) -> PathBuf {
    let mut name = output_path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".receipt.json");
    output_path.with_file_name(name)
}

/// Save a receipt alongside the output it describes.
///
/// # Errors
///
/// Returns error if file cannot be written or JSON serialization fails.
pub fn save_receipt(receipt: &RunReceipt, output_path: &Path) -> Result<PathBuf> {
    let receipt_path = receipt_path_for(output_path);

    let json = serde_json::to_string_pretty(receipt).context("Failed to serialize receipt")?;

    fs::write(&receipt_path, json)
        .with_context(|| format!("Failed to write receipt to {}", receipt_path.display()))?;

    tracing::debug!(path = %receipt_path.display(), "Receipt written");
    Ok(receipt_path)
}

/// # Errors
///
/// Returns error if the file cannot be read or is not a receipt.
pub fn load_receipt(receipt_path: &Path) -> Result<RunReceipt> {
    let json = fs::read_to_string(receipt_path)
        .with_context(|| format!("Failed to read receipt file: {}", receipt_path.display()))?;
    serde_json::from_str(&json).context("Failed to parse receipt JSON (file may be corrupted)")
}
