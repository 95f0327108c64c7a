//! Dataset inspection: shape, types, missing values and duplicates.
//!
//! This is the "look before you clean" step. The profile is also what
//! [`crate::pipeline::PipelineSpec::from_profile`] uses to draft a recipe.

use anyhow::{Context as _, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Per-column summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub dtype: String,
    pub null_count: usize,
    pub null_percentage: f64,
    pub distinct_count: usize,
    /// Numeric columns only
    pub min: Option<f64>,
    /// Numeric columns only
    pub max: Option<f64>,
    /// Numeric columns only
    pub mean: Option<f64>,
}

impl ColumnProfile {
    pub fn is_string(&self) -> bool {
        self.dtype == DataType::String.to_string()
    }

    pub fn is_empty(&self, row_count: usize) -> bool {
        row_count > 0 && self.null_count == row_count
    }
}

/// Whole-dataset summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetProfile {
    pub row_count: usize,
    pub column_count: usize,
    /// Rows that repeat an earlier row exactly
    pub duplicate_rows: usize,
    pub columns: Vec<ColumnProfile>,
    /// First rows rendered as a table
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub preview: String,
}

impl DatasetProfile {
    pub fn total_nulls(&self) -> usize {
        self.columns.iter().map(|c| c.null_count).sum()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Human-readable report.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} rows x {} columns, {} duplicate rows, {} missing values",
            self.row_count,
            self.column_count,
            self.duplicate_rows,
            self.total_nulls()
        );
        let _ = writeln!(out);

        let name_width = self
            .columns
            .iter()
            .map(|c| c.name.chars().count())
            .max()
            .unwrap_or(0)
            .max("column".len());

        let _ = writeln!(
            out,
            "{:<name_width$}  {:<10}  {:>8}  {:>7}  {:>9}  {:>12}  {:>12}  {:>12}",
            "column", "dtype", "nulls", "null %", "distinct", "min", "max", "mean"
        );
        for c in &self.columns {
            let _ = writeln!(
                out,
                "{:<name_width$}  {:<10}  {:>8}  {:>6.1}%  {:>9}  {:>12}  {:>12}  {:>12}",
                c.name,
                c.dtype,
                c.null_count,
                c.null_percentage,
                c.distinct_count,
                fmt_opt(c.min),
                fmt_opt(c.max),
                fmt_opt(c.mean),
            );
        }

        if !self.preview.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "{}", self.preview);
        }
        out
    }
}

/// Formats an optional f64 to 4 decimal places, or "-" if None or non-finite.
fn fmt_opt(v: Option<f64>) -> String {
    match v {
        Some(x) if x.is_finite() => format!("{x:.4}"),
        _ => "-".to_owned(),
    }
}

/// Count rows that repeat an earlier row exactly.
///
/// # Errors
///
/// Returns error if Polars cannot deduplicate the frame.
pub fn count_duplicate_rows(df: &DataFrame) -> Result<usize> {
    if df.height() < 2 || df.width() == 0 {
        return Ok(0);
    }
    let unique = df
        .clone()
        .lazy()
        .unique_stable(None, UniqueKeepStrategy::First)
        .collect()
        .context("Failed to count duplicate rows")?;
    Ok(df.height().saturating_sub(unique.height()))
}

/// Profile a dataset. `preview_rows = 0` skips the preview.
///
/// # Errors
///
/// Returns error if a column cannot be summarised.
pub fn inspect_df(df: &DataFrame, preview_rows: usize) -> Result<DatasetProfile> {
    let row_count = df.height();
    let mut columns = Vec::with_capacity(df.width());

    for column in df.get_columns() {
        let name = column.name().to_string();
        let series = column.as_materialized_series();
        let null_count = series.null_count();
        let distinct_count = series
            .n_unique()
            .with_context(|| format!("Failed to count distinct values in '{name}'"))?;

        let (min, max, mean) = if series.dtype().is_primitive_numeric() {
            let cast = series
                .cast(&DataType::Float64)
                .with_context(|| format!("Failed to read '{name}' as numbers"))?;
            let ca = cast.f64().map_err(|e| anyhow::anyhow!(e))?;
            (ca.min(), ca.max(), ca.mean())
        } else {
            (None, None, None)
        };

        let null_percentage = if row_count == 0 {
            0.0
        } else {
            null_count as f64 / row_count as f64 * 100.0
        };

        columns.push(ColumnProfile {
            name,
            dtype: series.dtype().to_string(),
            null_count,
            null_percentage,
            distinct_count,
            min,
            max,
            mean,
        });
    }

    let preview = if preview_rows == 0 {
        String::new()
    } else {
        format!("{}", df.head(Some(preview_rows)))
    };

    Ok(DatasetProfile {
        row_count,
        column_count: df.width(),
        duplicate_rows: count_duplicate_rows(df)?,
        columns,
        preview,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Result<DataFrame> {
        Ok(df!(
            "city" => &[Some("Leeds"), Some("York"), Some("Leeds"), None],
            "price" => &[Some(2.5), Some(4.0), Some(2.5), Some(1.5)],
            "qty" => &[Some(1i64), None, Some(1), Some(3)]
        )?)
    }

    #[test]
    fn test_inspect_counts() -> Result<()> {
        let df = sample()?;
        let profile = inspect_df(&df, 2)?;

        assert_eq!(profile.row_count, 4);
        assert_eq!(profile.column_count, 3);
        assert_eq!(profile.duplicate_rows, 1);
        assert_eq!(profile.total_nulls(), 2);

        let city = profile.column("city").expect("city profiled");
        assert!(city.is_string());
        assert_eq!(city.null_count, 1);
        assert!((city.null_percentage - 25.0).abs() < f64::EPSILON);
        assert_eq!(city.min, None);

        let price = profile.column("price").expect("price profiled");
        assert_eq!(price.min, Some(1.5));
        assert_eq!(price.max, Some(4.0));
        assert_eq!(price.mean, Some(2.625));
        Ok(())
    }

    #[test]
    fn test_render_mentions_every_column() -> Result<()> {
        let df = sample()?;
        let report = inspect_df(&df, 0)?.render();
        assert!(report.starts_with("4 rows x 3 columns, 1 duplicate rows"));
        for name in ["city", "price", "qty"] {
            assert!(report.contains(name), "missing {name} in report");
        }
        Ok(())
    }

    #[test]
    fn test_empty_frame() -> Result<()> {
        let df = DataFrame::empty();
        let profile = inspect_df(&df, 5)?;
        assert_eq!(profile.row_count, 0);
        assert_eq!(profile.duplicate_rows, 0);
        assert!(profile.columns.is_empty());
        Ok(())
    }

    #[test]
    fn test_fully_empty_column_detected() -> Result<()> {
        let df = df!(
            "id" => &[1, 2],
            "notes" => &[None::<&str>, None]
        )?;
        let profile = inspect_df(&df, 0)?;
        assert!(profile.column("notes").expect("notes").is_empty(profile.row_count));
        assert!(!profile.column("id").expect("id").is_empty(profile.row_count));
        Ok(())
    }
}
