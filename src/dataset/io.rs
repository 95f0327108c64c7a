use anyhow::{Context as _, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How CSV files are read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvOptions {
    /// Field separator (a single ASCII character)
    pub separator: char,

    /// Whether the first row holds column names
    pub has_header: bool,

    /// Rows scanned to infer column types (`None` scans the whole file)
    pub infer_schema_length: Option<usize>,

    /// Cell values treated as missing
    pub null_values: Vec<String>,

    /// Let the reader turn ISO-looking strings into dates
    pub try_parse_dates: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            separator: ',',
            has_header: true,
            infer_schema_length: Some(10_000),
            null_values: vec!["NA".to_owned(), "N/A".to_owned(), "null".to_owned()],
            try_parse_dates: false,
        }
    }
}

impl CsvOptions {
    fn separator_byte(&self) -> Result<u8> {
        u8::try_from(self.separator)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| anyhow::anyhow!("CSV separator must be ASCII, got {:?}", self.separator))
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Scan a dataset lazily. The format is taken from the file extension.
///
/// # Errors
///
/// Returns error for unsupported extensions or unreadable files.
pub fn load_df_lazy(path: &Path, options: &CsvOptions) -> Result<LazyFrame> {
    if !path.exists() {
        anyhow::bail!("Input file not found: {}", path.display());
    }

    let ext = extension_of(path);
    match ext.as_str() {
        "csv" | "tsv" | "txt" => {
            let separator = if ext == "tsv" {
                b'\t'
            } else {
                options.separator_byte()?
            };

            let null_values = if options.null_values.is_empty() {
                None
            } else {
                Some(NullValues::AllColumns(
                    options
                        .null_values
                        .iter()
                        .map(|v| v.as_str().into())
                        .collect(),
                ))
            };

            LazyCsvReader::new(path)
                .with_has_header(options.has_header)
                .with_separator(separator)
                .with_infer_schema_length(options.infer_schema_length)
                .with_null_values(null_values)
                .with_try_parse_dates(options.try_parse_dates)
                .finish()
                .with_context(|| format!("Failed to scan CSV {}", path.display()))
        }
        "parquet" => LazyFrame::scan_parquet(path, Default::default())
            .with_context(|| format!("Failed to scan Parquet {}", path.display())),
        "json" => {
            // No lazy JSON reader: read it all, then go lazy.
            let df = JsonReader::new(std::fs::File::open(path)?)
                .finish()
                .with_context(|| format!("Failed to read JSON {}", path.display()))?;
            Ok(df.lazy())
        }
        _ => Err(anyhow::anyhow!("Unsupported file extension: {ext}")),
    }
}

/// Load a whole dataset into memory.
///
/// # Errors
///
/// Returns error for unsupported extensions, unreadable files or rows the
/// reader cannot parse.
pub fn load_df(path: &Path, options: &CsvOptions) -> Result<DataFrame> {
    let df = load_df_lazy(path, options)?
        .collect()
        .with_context(|| format!("Failed to read {}", path.display()))?;
    tracing::debug!(
        path = %path.display(),
        rows = df.height(),
        columns = df.width(),
        "Dataset loaded"
    );
    Ok(df)
}

/// Write a dataset; the format follows the extension (CSV when unknown).
///
/// Data is written to a sibling temp file first and renamed into place, so
/// an interrupted write never leaves a truncated output behind.
///
/// # Errors
///
/// Returns error if the file cannot be created or written.
pub fn save_df(df: &mut DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }

    let temp_path = temp_path_for(path);
    let written = write_df(df, &temp_path, &extension_of(path));
    if let Err(e) = written {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e);
    }

    std::fs::rename(&temp_path, path).with_context(|| {
        format!(
            "Failed to move {} into place at {}",
            temp_path.display(),
            path.display()
        )
    })?;

    tracing::debug!(path = %path.display(), rows = df.height(), "Dataset saved");
    Ok(())
}

fn write_df(df: &mut DataFrame, path: &Path, ext: &str) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    match ext {
        "parquet" => {
            ParquetWriter::new(file)
                .finish(df)
                .context("Failed to write Parquet file")?;
        }
        "json" => {
            JsonWriter::new(file)
                .with_json_format(JsonFormat::Json)
                .finish(df)
                .context("Failed to write JSON file")?;
        }
        "tsv" => {
            CsvWriter::new(file)
                .include_header(true)
                .with_separator(b'\t')
                .finish(df)
                .context("Failed to write TSV file")?;
        }
        _ => {
            CsvWriter::new(file)
                .include_header(true)
                .finish(df)
                .context("Failed to write CSV file")?;
        }
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_owned());
    path.with_file_name(format!(".{name}.tmp"))
}
