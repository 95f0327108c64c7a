//! Recipe (pipeline spec) data structures.
//!
//! A recipe is the cleaning checklist written down: input options, schema
//! expectations, an ordered list of steps and where the result goes. It is
//! plain JSON so it can be reviewed, versioned and re-run.

use super::expr::{Expression, Predicate};
use crate::dataset::{CsvOptions, DatasetProfile};
use anyhow::{Context as _, Result};
use polars::prelude::DataType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Current recipe version
pub const SPEC_VERSION: &str = "1";

/// Root recipe structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Recipe format version for future migrations
    pub version: String,

    /// Human-readable recipe name
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// CSV reading options; settings defaults apply when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<CsvOptions>,

    /// Schema expectations checked before any step runs
    #[serde(default)]
    pub schema: SchemaConfig,

    /// Ordered sequence of cleaning steps
    pub steps: Vec<Step>,

    #[serde(default)]
    pub output: OutputConfig,

    /// Record failing steps as warnings instead of aborting
    #[serde(default)]
    pub continue_on_error: bool,
}

impl PipelineSpec {
    /// Create an empty recipe with default settings
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: SPEC_VERSION.to_owned(),
            name: name.into(),
            description: None,
            input: None,
            schema: SchemaConfig::default(),
            steps: Vec::new(),
            output: OutputConfig::default(),
            continue_on_error: false,
        }
    }

    /// The generic cleaning checklist: tidy names, trim text, drop
    /// incomplete rows, drop exact duplicates.
    pub fn checklist(name: impl Into<String>) -> Self {
        let mut spec = Self::new(name);
        spec.description = Some("Standard cleaning checklist".to_owned());
        spec.steps = vec![
            Step::StandardizeNames,
            Step::TrimWhitespace {
                columns: Vec::new(),
            },
            Step::DropNulls { columns: None },
            Step::DropDuplicates {
                subset: None,
                keep: KeepStrategy::First,
            },
        ];
        spec
    }

    /// Draft a recipe from an inspection of the data.
    ///
    /// Only steps the profile shows a need for are included, so a tidy
    /// dataset yields a short recipe.
    pub fn from_profile(name: impl Into<String>, profile: &DatasetProfile) -> Self {
        let mut spec = Self::new(name);
        spec.description = Some(format!(
            "Drafted from a {} x {} dataset",
            profile.row_count, profile.column_count
        ));

        let empty: Vec<String> = profile
            .columns
            .iter()
            .filter(|c| c.is_empty(profile.row_count))
            .map(|c| c.name.clone())
            .collect();
        if !empty.is_empty() {
            spec.steps.push(Step::DropColumns {
                columns: empty.clone(),
            });
        }

        let text_columns: Vec<String> = profile
            .columns
            .iter()
            .filter(|c| c.is_string() && !empty.contains(&c.name))
            .map(|c| c.name.clone())
            .collect();
        let trims_text = !text_columns.is_empty();
        if trims_text {
            spec.steps.push(Step::TrimWhitespace {
                columns: text_columns,
            });
        }

        let nulls_remaining = profile
            .columns
            .iter()
            .filter(|c| !empty.contains(&c.name))
            .any(|c| c.null_count > 0);
        if nulls_remaining {
            spec.steps.push(Step::DropNulls { columns: None });
        }

        // Rows that differ only by padding become duplicates once trimmed.
        if profile.duplicate_rows > 0 || trims_text {
            spec.steps.push(Step::DropDuplicates {
                subset: None,
                keep: KeepStrategy::First,
            });
        }

        let names: Vec<String> = profile.columns.iter().map(|c| c.name.clone()).collect();
        if crate::dataset::sanitize_column_names(&names) != names {
            spec.steps.push(Step::StandardizeNames);
        }

        spec
    }

    /// Load a recipe from a JSON file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read recipe file {}", path.display()))?;
        Self::from_json(&content)
    }

    /// Parse a recipe from a JSON string
    ///
    /// # Errors
    ///
    /// Returns error if the JSON does not describe a recipe.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse recipe JSON")
    }

    /// Save recipe to a JSON file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written.
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = self.to_json()?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write recipe file {}", path.display()))
    }

    /// Serialize recipe to a JSON string
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize recipe")
    }
}

/// Schema validation configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaConfig {
    #[serde(default)]
    pub match_mode: SchemaMatchMode,

    #[serde(default)]
    pub required_columns: Vec<String>,
}

/// Schema matching mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaMatchMode {
    /// Required columns must exist, allow extra columns
    #[default]
    Tolerant,

    /// Exact match: required columns only, no extras
    Strict,
}

/// Output file configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output format when the path has no extension (csv, parquet, json)
    #[serde(default = "default_format")]
    pub format: String,

    /// Output path template; `{date}` and `{name}` are substituted
    #[serde(default)]
    pub path_template: String,

    /// Whether an existing output may be replaced
    #[serde(default = "default_true")]
    pub overwrite: bool,

    /// Write a run receipt; the settings default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<bool>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            path_template: String::new(),
            overwrite: default_true(),
            receipt: None,
        }
    }
}

/// Cleaning step (tagged enum)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Rewrite every column name to `snake_case`
    StandardizeNames,

    /// Rename columns according to mapping
    RenameColumns { mapping: BTreeMap<String, String> },

    /// Drop specified columns
    DropColumns { columns: Vec<String> },

    /// Strip leading/trailing whitespace; all string columns when empty
    TrimWhitespace {
        #[serde(default)]
        columns: Vec<String>,
    },

    /// Drop rows with a missing value in the listed columns (any column when absent)
    DropNulls {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        columns: Option<Vec<String>>,
    },

    /// Fill missing values
    FillNulls {
        strategy: ImputeStrategy,
        columns: Vec<String>,
    },

    /// Cast columns to target data types
    CastTypes {
        columns: BTreeMap<String, ColumnType>,
        /// Fail on values that do not convert instead of nulling them
        #[serde(default)]
        strict: bool,
    },

    /// Parse text columns as dates with a strptime format
    ParseDates {
        /// Column name to format, e.g. `"%Y-%m-%d"`
        columns: BTreeMap<String, String>,
        #[serde(default)]
        strict: bool,
    },

    /// Drop exact-duplicate rows, keeping the order of the survivors
    DropDuplicates {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subset: Option<Vec<String>>,
        #[serde(default)]
        keep: KeepStrategy,
    },

    /// Keep rows matching a predicate
    Filter { predicate: Predicate },

    /// Add or replace a column computed from an expression
    Derive { name: String, expression: Expression },
}

impl Step {
    /// The `op` tag as written in recipes
    pub fn op_name(&self) -> &'static str {
        match self {
            Self::StandardizeNames => "standardize_names",
            Self::RenameColumns { .. } => "rename_columns",
            Self::DropColumns { .. } => "drop_columns",
            Self::TrimWhitespace { .. } => "trim_whitespace",
            Self::DropNulls { .. } => "drop_nulls",
            Self::FillNulls { .. } => "fill_nulls",
            Self::CastTypes { .. } => "cast_types",
            Self::ParseDates { .. } => "parse_dates",
            Self::DropDuplicates { .. } => "drop_duplicates",
            Self::Filter { .. } => "filter",
            Self::Derive { .. } => "derive",
        }
    }

    /// One-line description for logs and reports
    pub fn describe(&self) -> String {
        match self {
            Self::StandardizeNames => "standardize column names".to_owned(),
            Self::RenameColumns { mapping } => format!("rename {} columns", mapping.len()),
            Self::DropColumns { columns } => format!("drop columns {columns:?}"),
            Self::TrimWhitespace { columns } if columns.is_empty() => {
                "trim whitespace in all text columns".to_owned()
            }
            Self::TrimWhitespace { columns } => format!("trim whitespace in {columns:?}"),
            Self::DropNulls { columns: None } => "drop rows with any missing value".to_owned(),
            Self::DropNulls {
                columns: Some(columns),
            } => format!("drop rows missing {columns:?}"),
            Self::FillNulls { strategy, columns } => {
                format!("fill missing {columns:?} with {strategy}")
            }
            Self::CastTypes { columns, .. } => {
                let casts: Vec<String> = columns.iter().map(|(c, t)| format!("{c}: {t}")).collect();
                format!("cast {}", casts.join(", "))
            }
            Self::ParseDates { columns, .. } => {
                format!("parse dates in {:?}", columns.keys().collect::<Vec<_>>())
            }
            Self::DropDuplicates { subset: None, keep } => {
                format!("drop duplicate rows (keep {keep})")
            }
            Self::DropDuplicates {
                subset: Some(subset),
                keep,
            } => format!("drop rows duplicated on {subset:?} (keep {keep})"),
            Self::Filter { predicate } => format!("keep rows where {predicate}"),
            Self::Derive { name, expression } => format!("derive {name} = {expression}"),
        }
    }
}

/// Imputation strategy for missing values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImputeStrategy {
    Mean,
    Median,
    Mode,
    Zero,
}

impl fmt::Display for ImputeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Mode => "mode",
            Self::Zero => "zero",
        };
        f.write_str(s)
    }
}

/// Which row of a duplicate group survives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeepStrategy {
    #[default]
    First,
    Last,
    /// Drop every row that has a duplicate
    None,
}

impl fmt::Display for KeepStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::First => "first",
            Self::Last => "last",
            Self::None => "none",
        };
        f.write_str(s)
    }
}

/// Target type of a cast
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[serde(alias = "i64", alias = "int")]
    Int64,
    #[serde(alias = "i32")]
    Int32,
    #[serde(alias = "f64", alias = "float")]
    Float64,
    #[serde(alias = "f32")]
    Float32,
    #[serde(alias = "str", alias = "text")]
    String,
    #[serde(alias = "bool")]
    Boolean,
    Date,
    Datetime,
    Categorical,
}

impl ColumnType {
    pub const ALL: [Self; 9] = [
        Self::Int64,
        Self::Int32,
        Self::Float64,
        Self::Float32,
        Self::String,
        Self::Boolean,
        Self::Date,
        Self::Datetime,
        Self::Categorical,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Int64 => "int64",
            Self::Int32 => "int32",
            Self::Float64 => "float64",
            Self::Float32 => "float32",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Datetime => "datetime",
            Self::Categorical => "categorical",
        }
    }

    pub fn to_dtype(self) -> DataType {
        match self {
            Self::Int64 => DataType::Int64,
            Self::Int32 => DataType::Int32,
            Self::Float64 => DataType::Float64,
            Self::Float32 => DataType::Float32,
            Self::String => DataType::String,
            Self::Boolean => DataType::Boolean,
            Self::Date => DataType::Date,
            Self::Datetime => {
                DataType::Datetime(polars::prelude::TimeUnit::Milliseconds, None)
            }
            Self::Categorical => DataType::Categorical(None, Default::default()),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        let alias = match wanted.as_str() {
            "i64" | "int" => "int64",
            "i32" => "int32",
            "f64" | "float" => "float64",
            "f32" => "float32",
            "str" | "text" => "string",
            "bool" => "boolean",
            other => other,
        };
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == alias)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown column type '{s}' (expected one of: {})",
                    Self::ALL.map(Self::as_str).join(", ")
                )
            })
    }
}

fn default_format() -> String {
    "csv".to_owned()
}

fn default_true() -> bool {
    true
}
