//! Recipe validation.
//!
//! Validates a recipe against the input schema before anything runs, by
//! replaying the steps over the evolving set of columns. Catching a typo in
//! step 7 before steps 1-6 have been computed is the point.

use super::expr::CompareOp;
use super::spec::{ImputeStrategy, PipelineSpec, SPEC_VERSION, SchemaMatchMode, Step};
use crate::dataset::sanitize_column_names;
use polars::prelude::*;
use std::collections::HashMap;

/// Validation error with the step it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub step_index: Option<usize>,
    pub message: String,
}

impl ValidationError {
    fn new(step_index: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            step_index,
            message: message.into(),
        }
    }

    fn step(step_index: usize, message: impl Into<String>) -> Self {
        Self::new(Some(step_index), message)
    }

    fn schema(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(idx) = self.step_index {
            write!(f, "Step {}: {}", idx + 1, self.message)
        } else {
            write!(f, "Schema: {}", self.message)
        }
    }
}

/// Column as the validator sees it; `dtype` is `None` once it can no longer be known.
#[derive(Debug, Clone)]
struct TrackedColumn {
    name: String,
    dtype: Option<DataType>,
}

struct Columns(Vec<TrackedColumn>);

impl Columns {
    fn get(&self, name: &str) -> Option<&TrackedColumn> {
        self.0.iter().find(|c| c.name == name)
    }

    fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    fn remove(&mut self, name: &str) {
        self.0.retain(|c| c.name != name);
    }

    fn set_dtype(&mut self, name: &str, dtype: Option<DataType>) {
        if let Some(c) = self.0.iter_mut().find(|c| c.name == name) {
            c.dtype = dtype;
        }
    }

    fn is_text(&self, name: &str) -> Option<bool> {
        self.get(name)
            .and_then(|c| c.dtype.as_ref())
            .map(|d| matches!(d, DataType::String))
    }

    fn is_numeric(&self, name: &str) -> Option<bool> {
        self.get(name)
            .and_then(|c| c.dtype.as_ref())
            .map(DataType::is_primitive_numeric)
    }
}

/// Validate a recipe against an input schema.
///
/// Returns every problem found; an empty list means the recipe can run.
pub fn validate_pipeline(spec: &PipelineSpec, input_schema: &Schema) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if spec.version != SPEC_VERSION {
        errors.push(ValidationError::schema(format!(
            "Unsupported recipe version '{}', expected '{SPEC_VERSION}'",
            spec.version
        )));
    }

    validate_schema_requirements(spec, input_schema, &mut errors);

    let mut columns = Columns(
        input_schema
            .iter()
            .map(|(name, dtype)| TrackedColumn {
                name: name.to_string(),
                dtype: Some(dtype.clone()),
            })
            .collect(),
    );

    for (idx, step) in spec.steps.iter().enumerate() {
        validate_step(step, idx, &mut columns, &mut errors);
    }

    errors
}

fn validate_schema_requirements(
    spec: &PipelineSpec,
    input_schema: &Schema,
    errors: &mut Vec<ValidationError>,
) {
    let input_cols: Vec<String> = input_schema.iter_names().map(|s| s.to_string()).collect();

    for required in &spec.schema.required_columns {
        if !input_cols.contains(required) {
            errors.push(ValidationError::schema(format!(
                "Required column '{required}' not found in input"
            )));
        }
    }

    if spec.schema.match_mode == SchemaMatchMode::Strict {
        let extra_cols: Vec<&String> = input_cols
            .iter()
            .filter(|c| !spec.schema.required_columns.contains(c))
            .collect();

        if !extra_cols.is_empty() {
            errors.push(ValidationError::schema(format!(
                "Strict mode: unexpected columns found: {extra_cols:?}"
            )));
        }
    }
}

fn validate_step(
    step: &Step,
    idx: usize,
    columns: &mut Columns,
    errors: &mut Vec<ValidationError>,
) {
    match step {
        Step::StandardizeNames => {
            let names: Vec<String> = columns.0.iter().map(|c| c.name.clone()).collect();
            for (column, new_name) in columns.0.iter_mut().zip(sanitize_column_names(&names)) {
                column.name = new_name;
            }
        }

        Step::RenameColumns { mapping } => {
            // Names as they will be once every entry of the mapping is applied.
            let mut after: HashMap<&str, usize> = HashMap::new();
            for column in &columns.0 {
                let name = mapping.get(&column.name).unwrap_or(&column.name);
                *after.entry(name.as_str()).or_default() += 1;
            }

            for (from, to) in mapping {
                if !columns.contains(from) {
                    errors.push(ValidationError::step(
                        idx,
                        format!("Cannot rename non-existent column '{from}'"),
                    ));
                } else if to.is_empty() {
                    errors.push(ValidationError::step(
                        idx,
                        format!("Cannot rename '{from}' to an empty name"),
                    ));
                } else if from != to && after.get(to.as_str()).copied().unwrap_or(0) > 1 {
                    errors.push(ValidationError::step(
                        idx,
                        format!("Cannot rename '{from}' to '{to}': target already exists"),
                    ));
                }
            }
            for column in &mut columns.0 {
                if let Some(to) = mapping.get(&column.name) {
                    column.name.clone_from(to);
                }
            }
        }

        Step::DropColumns { columns: drop_cols } => {
            for col in drop_cols {
                if columns.contains(col) {
                    columns.remove(col);
                } else {
                    errors.push(ValidationError::step(
                        idx,
                        format!("Cannot drop non-existent column '{col}'"),
                    ));
                }
            }
        }

        Step::TrimWhitespace { columns: trim_cols } => {
            require_columns(trim_cols, columns, idx, "trim whitespace in", errors);
            for col in trim_cols {
                if columns.is_text(col) == Some(false) {
                    errors.push(ValidationError::step(
                        idx,
                        format!("Cannot trim whitespace in non-text column '{col}'"),
                    ));
                }
            }
        }

        Step::DropNulls {
            columns: Some(null_cols),
        } => {
            require_columns(null_cols, columns, idx, "check missing values in", errors);
        }

        Step::DropNulls { columns: None } => {}

        Step::FillNulls { strategy, columns: fill_cols } => {
            require_columns(fill_cols, columns, idx, "fill missing values in", errors);
            if matches!(strategy, ImputeStrategy::Mean | ImputeStrategy::Median) {
                for col in fill_cols {
                    if columns.is_numeric(col) == Some(false) {
                        errors.push(ValidationError::step(
                            idx,
                            format!("Cannot fill non-numeric column '{col}' with the {strategy}"),
                        ));
                    }
                }
            }
        }

        Step::CastTypes { columns: casts, .. } => {
            let names: Vec<String> = casts.keys().cloned().collect();
            require_columns(&names, columns, idx, "cast", errors);
            for (name, target) in casts {
                columns.set_dtype(name, Some(target.to_dtype()));
            }
        }

        Step::ParseDates { columns: formats, .. } => {
            let names: Vec<String> = formats.keys().cloned().collect();
            require_columns(&names, columns, idx, "parse dates in", errors);
            for (name, format) in formats {
                if format.trim().is_empty() {
                    errors.push(ValidationError::step(
                        idx,
                        format!("Empty date format for column '{name}'"),
                    ));
                }
                if columns.is_text(name) == Some(false) {
                    errors.push(ValidationError::step(
                        idx,
                        format!("Cannot parse dates in non-text column '{name}'"),
                    ));
                }
                columns.set_dtype(name, Some(DataType::Date));
            }
        }

        Step::DropDuplicates {
            subset: Some(subset),
            ..
        } => {
            if subset.is_empty() {
                errors.push(ValidationError::step(
                    idx,
                    "Duplicate subset is empty (omit it to compare whole rows)",
                ));
            }
            require_columns(subset, columns, idx, "deduplicate on", errors);
        }

        Step::DropDuplicates { subset: None, .. } => {}

        Step::Filter { predicate } => {
            if !columns.contains(&predicate.column) {
                errors.push(ValidationError::step(
                    idx,
                    format!("Cannot filter on non-existent column '{}'", predicate.column),
                ));
            }
            if let Err(e) = predicate.check() {
                errors.push(ValidationError::step(idx, e.to_string()));
            }
            let ordered = matches!(
                predicate.op,
                CompareOp::Gt | CompareOp::Ge | CompareOp::Lt | CompareOp::Le
            );
            if ordered
                && predicate.value.is_number()
                && columns.is_text(&predicate.column) == Some(true)
            {
                errors.push(ValidationError::step(
                    idx,
                    format!(
                        "Cannot compare text column '{}' with a number (cast it first)",
                        predicate.column
                    ),
                ));
            }
        }

        Step::Derive { name, expression } => {
            if name.trim().is_empty() {
                errors.push(ValidationError::step(idx, "Derived column needs a name"));
            }
            for operand in expression.columns() {
                if !columns.contains(operand) {
                    errors.push(ValidationError::step(
                        idx,
                        format!("Cannot derive from non-existent column '{operand}'"),
                    ));
                } else if columns.is_numeric(operand) == Some(false) {
                    errors.push(ValidationError::step(
                        idx,
                        format!("Cannot do arithmetic on non-numeric column '{operand}'"),
                    ));
                }
            }
            if columns.contains(name) {
                columns.set_dtype(name, None);
            } else {
                columns.0.push(TrackedColumn {
                    name: name.clone(),
                    dtype: None,
                });
            }
        }
    }
}

fn require_columns(
    required: &[String],
    columns: &Columns,
    idx: usize,
    operation: &str,
    errors: &mut Vec<ValidationError>,
) {
    for col in required {
        if !columns.contains(col) {
            errors.push(ValidationError::step(
                idx,
                format!("Cannot {operation} non-existent column '{col}'"),
            ));
        }
    }
}
