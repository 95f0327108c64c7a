//! Pipeline execution engine.
//!
//! Runs a recipe against a dataset one step at a time, collecting after every
//! step so the report can show what each step did to the row and column
//! counts.

use super::spec::{ImputeStrategy, KeepStrategy, OutputConfig, PipelineSpec, Step};
use super::validation::validate_pipeline;
use crate::config::Settings;
use crate::dataset::{load_df, sanitize_column_names, save_df};
use crate::error::TidyError;
use crate::integrity;
use crate::workspace::{WorkspacePaths, guard_output};
use anyhow::{Context as _, Result};
use chrono::Local;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// What a single step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    /// 1-based position in the recipe
    pub index: usize,
    pub op: &'static str,
    pub description: String,
    pub rows_after: usize,
    pub columns_after: usize,
    /// `false` when the step failed and `continue_on_error` skipped it
    pub applied: bool,
}

/// Report generated after pipeline execution
#[derive(Debug, Clone)]
pub struct RunReport {
    pub rows_before: usize,
    pub columns_before: usize,
    pub rows_after: usize,
    pub columns_after: usize,
    pub steps: Vec<StepReport>,
    /// Steps skipped under `continue_on_error`
    pub warnings: Vec<String>,
    pub output_path: Option<PathBuf>,
    pub receipt_path: Option<PathBuf>,
    pub duration: Duration,
}

impl RunReport {
    pub fn steps_applied(&self) -> usize {
        self.steps.iter().filter(|s| s.applied).count()
    }

    /// Create a summary message
    pub fn summary(&self) -> String {
        format!(
            "Pipeline completed: rows {} → {} ({}), columns {} → {} ({}), {}/{} steps, {:.2}s",
            self.rows_before,
            self.rows_after,
            change(self.rows_before, self.rows_after),
            self.columns_before,
            self.columns_after,
            change(self.columns_before, self.columns_after),
            self.steps_applied(),
            self.steps.len(),
            self.duration.as_secs_f64()
        )
    }

    /// One line per step, for the CLI
    pub fn step_table(&self) -> String {
        self.steps
            .iter()
            .map(|s| {
                format!(
                    "{:>3}. {:<18} {:>8} rows {:>4} cols  {}{}",
                    s.index,
                    s.op,
                    s.rows_after,
                    s.columns_after,
                    s.description,
                    if s.applied { "" } else { " (skipped)" }
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn change(before: usize, after: usize) -> &'static str {
    match after.cmp(&before) {
        std::cmp::Ordering::Greater => "added",
        std::cmp::Ordering::Less => "removed",
        std::cmp::Ordering::Equal => "unchanged",
    }
}

/// Execute a recipe on an input file and write the result.
///
/// Nothing is written unless validation passes, and the output may never be
/// the input itself or live inside the configured raw directory.
///
/// # Errors
///
/// Returns error if the input cannot be loaded, the recipe does not fit the
/// data ([`TidyError::Validation`]), the output is refused
/// ([`TidyError::RawOverwrite`]), a step fails without `continue_on_error`,
/// or the output cannot be written.
pub fn run_pipeline(
    spec: &PipelineSpec,
    input_path: &Path,
    output_override: Option<&Path>,
    settings: &Settings,
) -> Result<RunReport> {
    let start = Instant::now();

    let csv_options = spec.input.as_ref().unwrap_or(&settings.csv);
    let df = load_df(input_path, csv_options).context("Failed to load input file")?;

    check_recipe(spec, &df.schema())?;

    let output_path = resolve_output_path(spec, input_path, output_override)?;
    let workspace = WorkspacePaths::from_settings(&settings.workspace);
    guard_output(input_path, &output_path, Some(&workspace.raw_dir))?;
    check_overwrite(&output_path, &spec.output)?;

    tracing::info!(
        recipe = %spec.name,
        input = %input_path.display(),
        output = %output_path.display(),
        steps = spec.steps.len(),
        "Running pipeline"
    );

    let rows_before = df.height();
    let columns_before = df.width();
    let (mut cleaned, steps, warnings) = apply_steps(spec, df)?;

    save_df(&mut cleaned, &output_path)
        .with_context(|| format!("Failed to write output {}", output_path.display()))?;

    let receipt_path = if spec.output.receipt.unwrap_or(settings.write_receipts) {
        let receipt =
            integrity::create_receipt(spec, input_path, &output_path, &cleaned, rows_before)?;
        Some(integrity::save_receipt(&receipt, &output_path)?)
    } else {
        None
    };

    let report = RunReport {
        rows_before,
        columns_before,
        rows_after: cleaned.height(),
        columns_after: cleaned.width(),
        steps,
        warnings,
        output_path: Some(output_path),
        receipt_path,
        duration: start.elapsed(),
    };
    tracing::info!("{}", report.summary());
    Ok(report)
}

/// Run a recipe's steps over an in-memory frame. Nothing is read or written.
///
/// # Errors
///
/// Returns error if the recipe does not fit the frame or a step fails without
/// `continue_on_error`.
pub fn run_on_frame(spec: &PipelineSpec, df: DataFrame) -> Result<(DataFrame, RunReport)> {
    let start = Instant::now();
    check_recipe(spec, &df.schema())?;

    let rows_before = df.height();
    let columns_before = df.width();
    let (cleaned, steps, warnings) = apply_steps(spec, df)?;

    let report = RunReport {
        rows_before,
        columns_before,
        rows_after: cleaned.height(),
        columns_after: cleaned.width(),
        steps,
        warnings,
        output_path: None,
        receipt_path: None,
        duration: start.elapsed(),
    };
    Ok((cleaned, report))
}

fn check_recipe(spec: &PipelineSpec, schema: &Schema) -> Result<()> {
    let errors = validate_pipeline(spec, schema);
    if errors.is_empty() {
        return Ok(());
    }
    for e in &errors {
        tracing::warn!("{e}");
    }
    Err(TidyError::Validation(errors.iter().map(ToString::to_string).collect()).into())
}

type StepOutcome = (DataFrame, Vec<StepReport>, Vec<String>);

fn apply_steps(spec: &PipelineSpec, mut df: DataFrame) -> Result<StepOutcome> {
    let mut reports = Vec::with_capacity(spec.steps.len());
    let mut warnings = Vec::new();

    for (i, step) in spec.steps.iter().enumerate() {
        let index = i + 1;
        let result = apply_step(step, df.clone().lazy()).and_then(|lf| {
            lf.collect()
                .with_context(|| format!("Failed to evaluate {}", step.op_name()))
        });

        let applied = match result {
            Ok(next) => {
                df = next;
                true
            }
            Err(e) if spec.continue_on_error => {
                let warning = format!("Step {index} ({}): {e:#} (skipped)", step.op_name());
                tracing::warn!("{warning}");
                warnings.push(warning);
                false
            }
            Err(e) => {
                return Err(e.context(format!("Step {index} ({}) failed", step.op_name())));
            }
        };

        tracing::debug!(
            step = index,
            op = step.op_name(),
            rows = df.height(),
            columns = df.width(),
            applied,
            "{}",
            step.describe()
        );

        reports.push(StepReport {
            index,
            op: step.op_name(),
            description: step.describe(),
            rows_after: df.height(),
            columns_after: df.width(),
            applied,
        });
    }

    Ok((df, reports, warnings))
}

fn column_names(lf: &mut LazyFrame) -> Result<Vec<String>> {
    let schema = lf.collect_schema().context("Failed to collect schema")?;
    Ok(schema.iter_names().map(ToString::to_string).collect())
}

/// Rebuild the frame column by column, replacing the columns `f` returns an
/// expression for.
fn map_columns(
    mut lf: LazyFrame,
    mut f: impl FnMut(&str, &DataType) -> Result<Option<Expr>>,
) -> Result<LazyFrame> {
    let schema = lf.collect_schema().context("Failed to collect schema")?;
    let exprs = schema
        .iter()
        .map(|(name, dtype)| {
            let replaced = f(name.as_str(), dtype)?;
            Ok(replaced.map_or_else(|| col(name.as_str()), |e| e.alias(name.as_str())))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(lf.select(exprs))
}

/// Apply a single transformation step
///
/// # Errors
///
/// Returns error if the step cannot be expressed over this frame's schema.
pub fn apply_step(step: &Step, mut lf: LazyFrame) -> Result<LazyFrame> {
    match step {
        Step::StandardizeNames => {
            let old = column_names(&mut lf)?;
            let new = sanitize_column_names(&old);
            let exprs: Vec<_> = old
                .iter()
                .zip(&new)
                .map(|(o, n)| col(o.as_str()).alias(n.as_str()))
                .collect();
            Ok(lf.select(exprs))
        }

        Step::RenameColumns { mapping } => {
            let exprs: Vec<_> = column_names(&mut lf)?
                .iter()
                .map(|name| match mapping.get(name) {
                    Some(new_name) => col(name.as_str()).alias(new_name.as_str()),
                    None => col(name.as_str()),
                })
                .collect();
            Ok(lf.select(exprs))
        }

        Step::DropColumns { columns } => {
            let keep: Vec<_> = column_names(&mut lf)?
                .iter()
                .filter(|name| !columns.contains(name))
                .map(|name| col(name.as_str()))
                .collect();
            Ok(lf.select(keep))
        }

        Step::TrimWhitespace { columns } => map_columns(lf, |name, dtype| {
            let wanted = if columns.is_empty() {
                dtype == &DataType::String
            } else {
                columns.iter().any(|c| c == name)
            };
            Ok(wanted.then(|| col(name).str().strip_chars(lit(NULL))))
        }),

        Step::DropNulls { columns } => {
            let targets = match columns {
                Some(columns) => columns.clone(),
                None => column_names(&mut lf)?,
            };
            let keep = targets
                .iter()
                .map(|c| col(c.as_str()).is_not_null())
                .reduce(Expr::and);
            Ok(match keep {
                Some(predicate) => lf.filter(predicate),
                None => lf,
            })
        }

        Step::FillNulls { strategy, columns } => map_columns(lf, |name, _| {
            if !columns.iter().any(|c| c == name) {
                return Ok(None);
            }
            let expr = col(name);
            let filled = match strategy {
                ImputeStrategy::Zero => expr.fill_null(lit(0)),
                ImputeStrategy::Mean => {
                    let mean_val = expr.clone().mean();
                    expr.fill_null(mean_val)
                }
                ImputeStrategy::Median => {
                    let median_val = expr.clone().median();
                    expr.fill_null(median_val)
                }
                ImputeStrategy::Mode => {
                    let mode_val = expr.clone().drop_nulls().mode().first();
                    expr.fill_null(mode_val)
                }
            };
            Ok(Some(filled))
        }),

        Step::CastTypes { columns, strict } => map_columns(lf, |name, _| {
            Ok(columns.get(name).map(|target| {
                let dtype = target.to_dtype();
                if *strict {
                    col(name).strict_cast(dtype)
                } else {
                    col(name).cast(dtype)
                }
            }))
        }),

        Step::ParseDates { columns, strict } => map_columns(lf, |name, dtype| {
            let Some(format) = columns.get(name) else {
                return Ok(None);
            };
            if dtype != &DataType::String {
                anyhow::bail!("Column '{name}' is {dtype}, dates can only be parsed from text");
            }
            let options = StrptimeOptions {
                format: Some(format.as_str().into()),
                strict: *strict,
                ..Default::default()
            };
            Ok(Some(col(name).str().to_date(options)))
        }),

        Step::DropDuplicates { subset, keep } => {
            let subset = subset
                .as_ref()
                .map(|cols| cols.iter().map(|c| c.as_str().into()).collect());
            Ok(lf.unique_stable(subset, keep_strategy(*keep)))
        }

        Step::Filter { predicate } => Ok(lf.filter(predicate.to_expr()?)),

        Step::Derive { name, expression } => {
            Ok(lf.with_column(expression.to_expr().alias(name.as_str())))
        }
    }
}

fn keep_strategy(keep: KeepStrategy) -> UniqueKeepStrategy {
    match keep {
        KeepStrategy::First => UniqueKeepStrategy::First,
        KeepStrategy::Last => UniqueKeepStrategy::Last,
        KeepStrategy::None => UniqueKeepStrategy::None,
    }
}

/// Output path from the override, else the recipe's template.
///
/// # Errors
///
/// Returns error when neither is set.
pub fn resolve_output_path(
    spec: &PipelineSpec,
    input_path: &Path,
    output_override: Option<&Path>,
) -> Result<PathBuf> {
    if let Some(path) = output_override {
        return Ok(path.to_path_buf());
    }
    if spec.output.path_template.is_empty() {
        anyhow::bail!(
            "No output path specified (provide --output or set output.path_template in the recipe)"
        );
    }

    let mut path = expand_path_template(&spec.output.path_template, &spec.name, input_path);
    if path.extension().is_none() {
        path.set_extension(&spec.output.format);
    }
    Ok(path)
}

/// Expand `{date}`, `{name}` (recipe name) and `{stem}` (input file stem).
fn expand_path_template(template: &str, recipe_name: &str, input_path: &Path) -> PathBuf {
    let today = Local::now().format("%Y-%m-%d").to_string();
    let stem = input_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    PathBuf::from(
        template
            .replace("{date}", &today)
            .replace("{name}", recipe_name)
            .replace("{stem}", &stem),
    )
}

fn check_overwrite(path: &Path, config: &OutputConfig) -> Result<()> {
    if path.exists() && !config.overwrite {
        anyhow::bail!(
            "Output file already exists and overwrite is false: {}",
            path.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::expr::{CompareOp, Predicate};
    use crate::pipeline::spec::ColumnType;
    use std::collections::BTreeMap;

    fn sales() -> Result<DataFrame> {
        Ok(df!(
            "Order ID" => &[1i64, 2, 2, 3, 4],
            "City" => &[Some(" Leeds "), Some("York"), Some("York"), None, Some("Hull ")],
            "Price" => &[Some("10.5"), Some("3"), Some("3"), Some("7"), Some("oops")],
            "Qty" => &[2i64, 1, 1, 5, 3]
        )?)
    }

    fn recipe(steps: Vec<Step>) -> PipelineSpec {
        let mut spec = PipelineSpec::new("test");
        spec.steps = steps;
        spec
    }

    #[test]
    fn test_checklist_end_to_end() -> Result<()> {
        let spec = recipe(vec![
            Step::StandardizeNames,
            Step::TrimWhitespace { columns: vec![] },
            Step::DropNulls { columns: None },
            Step::CastTypes {
                columns: BTreeMap::from([("price".to_owned(), ColumnType::Float64)]),
                strict: false,
            },
            Step::DropDuplicates {
                subset: None,
                keep: KeepStrategy::First,
            },
            Step::Filter {
                predicate: Predicate::new("price", CompareOp::Gt, 0),
            },
            Step::Derive {
                name: "total".to_owned(),
                expression: "price * qty".parse()?,
            },
        ]);

        let (df, report) = run_on_frame(&spec, sales()?)?;

        let names: Vec<_> = df.get_column_names_str();
        assert_eq!(names, vec!["order_id", "city", "price", "qty", "total"]);

        // null city dropped, duplicate York dropped, "oops" became null and
        // fails the filter
        assert_eq!(df.height(), 2);
        let city = df.column("city")?.str()?;
        assert_eq!(city.get(0), Some("Leeds"));
        assert_eq!(city.get(1), Some("York"));
        let total = df.column("total")?.f64()?;
        assert_eq!(total.get(0), Some(21.0));
        assert_eq!(total.get(1), Some(3.0));

        assert_eq!(report.rows_before, 5);
        assert_eq!(report.rows_after, 2);
        assert_eq!(report.steps.len(), 7);
        assert_eq!(report.steps[2].rows_after, 4);
        assert_eq!(report.steps[4].rows_after, 3);
        assert!(report.warnings.is_empty());
        Ok(())
    }

    #[test]
    fn test_drop_nulls_subset() -> Result<()> {
        let df = df!(
            "a" => &[Some(1i64), None, Some(3)],
            "b" => &[None, Some("x"), Some("y")]
        )?;
        let spec = recipe(vec![Step::DropNulls {
            columns: Some(vec!["a".to_owned()]),
        }]);
        let (out, _) = run_on_frame(&spec, df)?;
        assert_eq!(out.height(), 2);
        assert_eq!(out.column("b")?.null_count(), 1);
        Ok(())
    }

    #[test]
    fn test_drop_duplicates_keep_last_preserves_order() -> Result<()> {
        let df = df!(
            "k" => &["a", "b", "a", "c"],
            "v" => &[1i64, 2, 3, 4]
        )?;
        let spec = recipe(vec![Step::DropDuplicates {
            subset: Some(vec!["k".to_owned()]),
            keep: KeepStrategy::Last,
        }]);
        let (out, _) = run_on_frame(&spec, df)?;
        let v: Vec<_> = out.column("v")?.i64()?.into_no_null_iter().collect();
        assert_eq!(v, vec![2, 3, 4]);
        Ok(())
    }

    #[test]
    fn test_drop_duplicates_keep_none() -> Result<()> {
        let df = df!("k" => &["a", "b", "a"])?;
        let spec = recipe(vec![Step::DropDuplicates {
            subset: None,
            keep: KeepStrategy::None,
        }]);
        let (out, _) = run_on_frame(&spec, df)?;
        assert_eq!(out.height(), 1);
        Ok(())
    }

    #[test]
    fn test_fill_nulls() -> Result<()> {
        let df = df!(
            "x" => &[Some(1.0f64), None, Some(3.0)],
            "n" => &[Some(4i64), None, Some(4)]
        )?;
        let spec = recipe(vec![
            Step::FillNulls {
                strategy: ImputeStrategy::Mean,
                columns: vec!["x".to_owned()],
            },
            Step::FillNulls {
                strategy: ImputeStrategy::Zero,
                columns: vec!["n".to_owned()],
            },
        ]);
        let (out, _) = run_on_frame(&spec, df)?;
        assert_eq!(out.column("x")?.f64()?.get(1), Some(2.0));
        assert_eq!(out.column("n")?.null_count(), 0);
        Ok(())
    }

    #[test]
    fn test_fill_nulls_median_and_mode() -> Result<()> {
        let df = df!(
            "n" => &[Some(1.0f64), None, Some(3.0), Some(10.0)],
            "c" => &[Some("x"), None, Some("x"), Some("y")]
        )?;
        let spec = recipe(vec![
            Step::FillNulls {
                strategy: ImputeStrategy::Median,
                columns: vec!["n".to_owned()],
            },
            Step::FillNulls {
                strategy: ImputeStrategy::Mode,
                columns: vec!["c".to_owned()],
            },
        ]);
        let (out, _) = run_on_frame(&spec, df)?;
        assert_eq!(out.column("n")?.f64()?.get(1), Some(3.0));
        let c: Vec<_> = out.column("c")?.str()?.into_no_null_iter().collect();
        assert_eq!(c, vec!["x", "x", "x", "y"]);
        Ok(())
    }

    #[test]
    fn test_cast_to_temporal_boolean_and_categorical() -> Result<()> {
        let df = df!(
            "day" => &["2024-01-31", "bad"],
            "flag" => &[0i64, 1],
            "code" => &["A", "B"],
            "stamp" => &[0i64, 86_400_000]
        )?;
        let spec = recipe(vec![Step::CastTypes {
            columns: BTreeMap::from([
                ("day".to_owned(), ColumnType::Date),
                ("flag".to_owned(), ColumnType::Boolean),
                ("code".to_owned(), ColumnType::Categorical),
                ("stamp".to_owned(), ColumnType::Datetime),
            ]),
            strict: false,
        }]);
        let (out, report) = run_on_frame(&spec, df)?;

        assert_eq!(report.steps_applied(), 1);
        assert_eq!(out.column("day")?.dtype(), &DataType::Date);
        assert_eq!(out.column("day")?.null_count(), 1, "unparseable date becomes null");
        let flags: Vec<_> = out.column("flag")?.bool()?.into_no_null_iter().collect();
        assert_eq!(flags, vec![false, true]);
        assert!(matches!(out.column("code")?.dtype(), DataType::Categorical(..)));
        assert!(matches!(
            out.column("stamp")?.dtype(),
            DataType::Datetime(TimeUnit::Milliseconds, None)
        ));
        Ok(())
    }

    #[test]
    fn test_parse_dates() -> Result<()> {
        let df = df!("when" => &["2024-01-31", "2024-02-01"])?;
        let spec = recipe(vec![Step::ParseDates {
            columns: BTreeMap::from([("when".to_owned(), "%Y-%m-%d".to_owned())]),
            strict: true,
        }]);
        let (out, _) = run_on_frame(&spec, df)?;
        assert_eq!(out.column("when")?.dtype(), &DataType::Date);
        Ok(())
    }

    #[test]
    fn test_strict_cast_failure_aborts() -> Result<()> {
        let spec = recipe(vec![Step::CastTypes {
            columns: BTreeMap::from([("Price".to_owned(), ColumnType::Int64)]),
            strict: true,
        }]);
        let err = run_on_frame(&spec, sales()?).err().map(|e| format!("{e:#}"));
        assert!(err.is_some_and(|e| e.contains("Step 1 (cast_types) failed")));
        Ok(())
    }

    #[test]
    fn test_continue_on_error_keeps_previous_frame() -> Result<()> {
        let mut spec = recipe(vec![
            Step::CastTypes {
                columns: BTreeMap::from([("Price".to_owned(), ColumnType::Int64)]),
                strict: true,
            },
            Step::DropColumns {
                columns: vec!["Qty".to_owned()],
            },
        ]);
        spec.continue_on_error = true;

        let (out, report) = run_on_frame(&spec, sales()?)?;
        assert_eq!(out.width(), 3);
        assert_eq!(out.column("Price")?.dtype(), &DataType::String);
        assert_eq!(report.warnings.len(), 1);
        assert!(!report.steps[0].applied);
        assert_eq!(report.steps_applied(), 1);
        Ok(())
    }

    #[test]
    fn test_invalid_recipe_rejected_before_running() -> Result<()> {
        let clashing_rename = BTreeMap::from([
            ("City".to_owned(), "Qty".to_owned()),
            ("Qty".to_owned(), "Qty".to_owned()),
        ]);
        for step in [
            Step::DropColumns {
                columns: vec!["missing".to_owned()],
            },
            Step::RenameColumns {
                mapping: clashing_rename,
            },
        ] {
            let err = run_on_frame(&recipe(vec![step]), sales()?).err();
            let is_validation = err
                .as_ref()
                .and_then(|e| e.downcast_ref::<TidyError>())
                .is_some_and(|e| matches!(e, TidyError::Validation(_)));
            assert!(is_validation);
        }
        Ok(())
    }

    #[test]
    fn test_empty_frame_passes_through() -> Result<()> {
        let df = df!("a" => Vec::<i64>::new(), "b" => Vec::<String>::new())?;
        let (out, report) = run_on_frame(&PipelineSpec::checklist("empty"), df)?;
        assert_eq!(out.height(), 0);
        assert_eq!(report.rows_after, 0);
        Ok(())
    }

    #[test]
    fn test_resolve_output_path() -> Result<()> {
        let mut spec = PipelineSpec::new("weekly");
        let input = Path::new("data/raw/sales.csv");

        assert!(resolve_output_path(&spec, input, None).is_err());
        assert_eq!(
            resolve_output_path(&spec, input, Some(Path::new("out.csv")))?,
            PathBuf::from("out.csv")
        );

        spec.output.path_template = "data/clean/{stem}_{name}".to_owned();
        spec.output.format = "parquet".to_owned();
        assert_eq!(
            resolve_output_path(&spec, input, None)?,
            PathBuf::from("data/clean/sales_weekly.parquet")
        );

        spec.output.path_template = "out/{date}.csv".to_owned();
        let path = resolve_output_path(&spec, input, None)?;
        assert!(!path.to_string_lossy().contains("{date}"));
        Ok(())
    }

    #[test]
    fn test_run_pipeline_writes_output_and_receipt() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("sales.csv");
        std::fs::write(&input, "id,city\n1,Leeds\n1,Leeds\n2,\n")?;
        let output = dir.path().join("clean").join("sales_clean.csv");

        let mut settings = Settings::default();
        settings.workspace.root = dir.path().to_path_buf();

        let report = run_pipeline(
            &PipelineSpec::checklist("sales"),
            &input,
            Some(&output),
            &settings,
        )?;

        assert_eq!(report.rows_before, 3);
        assert_eq!(report.rows_after, 1);
        assert_eq!(std::fs::read_to_string(&output)?, "id,city\n1,Leeds\n");

        let receipt_path = report.receipt_path.context("receipt missing")?;
        let verification = integrity::verify_receipt_file(&receipt_path)?;
        assert!(verification.passed);
        Ok(())
    }

    #[test]
    fn test_run_pipeline_refuses_to_overwrite_input() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("sales.csv");
        std::fs::write(&input, "id\n1\n1\n")?;

        let result = run_pipeline(
            &PipelineSpec::checklist("sales"),
            &input,
            Some(&input),
            &Settings::default(),
        );
        let refused = result
            .err()
            .and_then(|e| e.downcast::<TidyError>().ok())
            .is_some_and(|e| matches!(e, TidyError::RawOverwrite(_)));
        assert!(refused);
        assert_eq!(std::fs::read_to_string(&input)?, "id\n1\n1\n");
        Ok(())
    }

    #[test]
    fn test_run_pipeline_respects_overwrite_false() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("sales.csv");
        std::fs::write(&input, "id\n1\n")?;
        let output = dir.path().join("out.csv");
        std::fs::write(&output, "keep me\n")?;

        let mut spec = PipelineSpec::checklist("sales");
        spec.output.overwrite = false;
        assert!(run_pipeline(&spec, &input, Some(&output), &Settings::default()).is_err());
        assert_eq!(std::fs::read_to_string(&output)?, "keep me\n");
        Ok(())
    }
}
