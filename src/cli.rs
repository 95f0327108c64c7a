use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tidyframe::config::{Settings, load_settings};
use tidyframe::dataset::{inspect_df, load_df, load_df_lazy};
use tidyframe::integrity::verify_receipt_file;
use tidyframe::pipeline::{
    ColumnType, DeriveSpec, KeepStrategy, PipelineSpec, RunReport, Step, run_pipeline,
    validate_pipeline,
};
use tidyframe::workspace::WorkspacePaths;

#[derive(Parser)]
#[command(
    name = "tidyframe",
    version,
    about = "Reproducible, recipe-driven cleaning of CSV datasets"
)]
pub struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true, env = "TIDYFRAME_CONFIG")]
    pub config: Option<PathBuf>,

    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Profile a dataset: shape, types, missing values, duplicates, preview
    Inspect {
        /// File to inspect. Defaults to the first file in the raw directory.
        file: Option<PathBuf>,

        /// Rows to preview
        #[arg(short = 'n', long)]
        rows: Option<usize>,

        /// Print the profile as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a saved recipe
    Run {
        /// Recipe JSON file
        #[arg(short, long)]
        recipe: PathBuf,

        /// Raw input file. Defaults to the first file in the raw directory.
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output file. Defaults to the recipe's path template, else the clean directory.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip writing a run receipt
        #[arg(long)]
        no_receipt: bool,
    },
    /// Clean a file with steps given as flags (the standard checklist when none are given)
    Clean(CleanArgs),
    /// Write a recipe drafted from a dataset, or the standard checklist
    Template {
        /// Dataset to draft the recipe from
        #[arg(required_unless_present = "checklist", conflicts_with = "checklist")]
        file: Option<PathBuf>,

        /// Write the standard cleaning checklist instead
        #[arg(long)]
        checklist: bool,

        /// Recipe name. Defaults to the file stem.
        #[arg(long)]
        name: Option<String>,

        /// Where to write the recipe. Defaults to the recipes directory.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check a recipe against a dataset without running it
    Validate {
        #[arg(short, long)]
        recipe: PathBuf,

        #[arg(short, long)]
        input: PathBuf,
    },
    /// Check a run receipt against the files it describes
    Verify {
        /// `.receipt.json` file
        receipt: PathBuf,

        /// Print the verification report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
pub struct CleanArgs {
    /// Raw input file. Defaults to the first file in the raw directory.
    file: Option<PathBuf>,

    /// Output file. Defaults to `<clean dir>/<stem>_clean.csv`.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Rewrite column names to snake_case
    #[arg(long)]
    standardize_names: bool,

    /// Rename a column (applied after --standardize-names)
    #[arg(long, value_name = "OLD=NEW", value_parser = parse_key_value)]
    rename: Vec<(String, String)>,

    /// Drop a column
    #[arg(long, value_name = "COLUMN")]
    drop_column: Vec<String>,

    /// Strip surrounding whitespace from text columns
    #[arg(long)]
    trim: bool,

    /// Drop rows with any missing value
    #[arg(long)]
    drop_nulls: bool,

    /// Cast a column (int64, float64, string, boolean, date, ...)
    #[arg(long, value_name = "COLUMN=TYPE", value_parser = parse_key_value)]
    cast: Vec<(String, String)>,

    /// Fail instead of nulling values that do not cast or parse
    #[arg(long)]
    strict: bool,

    /// Parse a text column as a date with a strptime format
    #[arg(long, value_name = "COLUMN=FORMAT", value_parser = parse_key_value)]
    parse_date: Vec<(String, String)>,

    /// Drop exact-duplicate rows (first occurrence kept)
    #[arg(long)]
    dedup: bool,

    /// Keep rows matching a predicate, e.g. "price > 0"
    #[arg(long, value_name = "PREDICATE")]
    filter: Vec<String>,

    /// Add a computed column, e.g. "total = price * quantity"
    #[arg(long, value_name = "NAME = EXPR")]
    derive: Vec<String>,

    /// Also save the recipe built from these flags
    #[arg(long, value_name = "PATH")]
    save_recipe: Option<PathBuf>,

    /// Skip writing a run receipt
    #[arg(long)]
    no_receipt: bool,
}

impl Commands {
    /// Commands that write into the workspace and need its directories.
    fn writes_to_workspace(&self) -> bool {
        matches!(self, Self::Run { .. } | Self::Clean(_) | Self::Template { .. })
    }
}

fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let (key, value) = (key.trim(), value.trim());
    if key.is_empty() || value.is_empty() {
        return Err(format!("expected KEY=VALUE, got '{s}'"));
    }
    Ok((key.to_owned(), value.to_owned()))
}

pub fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(cli.config.as_deref())?;
    let workspace = WorkspacePaths::from_settings(&settings.workspace);
    if cli.command.writes_to_workspace() {
        workspace.ensure_dirs()?;
    }

    match cli.command {
        Commands::Inspect { file, rows, json } => {
            handle_inspect(file, rows, json, &settings, &workspace)
        }
        Commands::Run {
            recipe,
            input,
            output,
            no_receipt,
        } => {
            let mut spec = PipelineSpec::from_file(&recipe)?;
            if no_receipt {
                spec.output.receipt = Some(false);
            }
            let input = input_or_default(input, &workspace)?;
            handle_run(&spec, &input, output, &settings, &workspace)
        }
        Commands::Clean(args) => handle_clean(args, &settings, &workspace),
        Commands::Template {
            file,
            checklist,
            name,
            output,
        } => handle_template(file, checklist, name, output, &settings, &workspace),
        Commands::Validate { recipe, input } => handle_validate(&recipe, &input, &settings),
        Commands::Verify { receipt, json } => handle_verify(&receipt, json),
    }
}

fn handle_inspect(
    file: Option<PathBuf>,
    rows: Option<usize>,
    json: bool,
    settings: &Settings,
    workspace: &WorkspacePaths,
) -> Result<()> {
    let file = input_or_default(file, workspace)?;
    let df = load_df(&file, &settings.csv)?;
    let profile = inspect_df(&df, rows.unwrap_or(settings.preview_rows))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
    } else {
        println!("{}\n", file.display());
        println!("{}", profile.render());
    }
    Ok(())
}

fn handle_run(
    spec: &PipelineSpec,
    input: &Path,
    output: Option<PathBuf>,
    settings: &Settings,
    workspace: &WorkspacePaths,
) -> Result<()> {
    let output = match output {
        Some(o) => Some(o),
        None if spec.output.path_template.is_empty() => Some(workspace.default_output_path(input)),
        None => None,
    };

    let report = run_pipeline(spec, input, output.as_deref(), settings)?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &RunReport) {
    println!("{}", report.step_table());
    for warning in &report.warnings {
        println!("Warning: {warning}");
    }
    println!("{}", report.summary());
    if let Some(path) = &report.output_path {
        println!("Output:  {}", path.display());
    }
    if let Some(path) = &report.receipt_path {
        println!("Receipt: {}", path.display());
    }
}

/// Recipe equivalent of the `clean` flags, in checklist order.
fn recipe_from_clean_args(args: &CleanArgs, name: &str) -> Result<PipelineSpec> {
    let mut steps = Vec::new();

    if args.standardize_names {
        steps.push(Step::StandardizeNames);
    }
    if !args.rename.is_empty() {
        steps.push(Step::RenameColumns {
            mapping: args.rename.iter().cloned().collect(),
        });
    }
    if !args.drop_column.is_empty() {
        steps.push(Step::DropColumns {
            columns: args.drop_column.clone(),
        });
    }
    if args.trim {
        steps.push(Step::TrimWhitespace {
            columns: Vec::new(),
        });
    }
    if args.drop_nulls {
        steps.push(Step::DropNulls { columns: None });
    }
    if !args.cast.is_empty() {
        let columns = args
            .cast
            .iter()
            .map(|(column, ty)| Ok((column.clone(), ty.parse::<ColumnType>()?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        steps.push(Step::CastTypes {
            columns,
            strict: args.strict,
        });
    }
    if !args.parse_date.is_empty() {
        steps.push(Step::ParseDates {
            columns: args.parse_date.iter().cloned().collect(),
            strict: args.strict,
        });
    }
    if args.dedup {
        steps.push(Step::DropDuplicates {
            subset: None,
            keep: KeepStrategy::First,
        });
    }
    for text in &args.filter {
        let predicate = text
            .parse()
            .with_context(|| format!("Invalid --filter '{text}'"))?;
        steps.push(Step::Filter { predicate });
    }
    for text in &args.derive {
        let DeriveSpec { name, expression } = text
            .parse()
            .with_context(|| format!("Invalid --derive '{text}'"))?;
        steps.push(Step::Derive { name, expression });
    }

    if steps.is_empty() {
        return Ok(PipelineSpec::checklist(name));
    }
    let mut spec = PipelineSpec::new(name);
    spec.steps = steps;
    Ok(spec)
}

fn handle_clean(args: CleanArgs, settings: &Settings, workspace: &WorkspacePaths) -> Result<()> {
    let input = input_or_default(args.file.clone(), workspace)?;
    let mut spec = recipe_from_clean_args(&args, &file_stem(&input))?;
    if args.no_receipt {
        spec.output.receipt = Some(false);
    }

    if let Some(path) = &args.save_recipe {
        spec.to_file(path)?;
        println!("Recipe saved to {}", path.display());
    }

    handle_run(&spec, &input, args.output, settings, workspace)
}

fn handle_template(
    file: Option<PathBuf>,
    checklist: bool,
    name: Option<String>,
    output: Option<PathBuf>,
    settings: &Settings,
    workspace: &WorkspacePaths,
) -> Result<()> {
    let spec = match file {
        Some(file) if !checklist => {
            let name = name.unwrap_or_else(|| file_stem(&file));
            let df = load_df(&file, &settings.csv)?;
            let profile = inspect_df(&df, 0)?;
            PipelineSpec::from_profile(name, &profile)
        }
        _ => PipelineSpec::checklist(name.unwrap_or_else(|| "checklist".to_owned())),
    };

    let output = output.unwrap_or_else(|| workspace.recipe_path(&spec.name));
    spec.to_file(&output)?;

    for (i, step) in spec.steps.iter().enumerate() {
        println!("{:>3}. {}", i + 1, step.describe());
    }
    println!("Recipe '{}' written to {}", spec.name, output.display());
    Ok(())
}

fn handle_validate(recipe: &Path, input: &Path, settings: &Settings) -> Result<()> {
    let spec = PipelineSpec::from_file(recipe)?;
    let csv_options = spec.input.as_ref().unwrap_or(&settings.csv);
    let schema = load_df_lazy(input, csv_options)?
        .collect_schema()
        .context("Failed to read input schema")?;

    let errors = validate_pipeline(&spec, &schema);
    if errors.is_empty() {
        println!(
            "✓ Recipe '{}' is valid for {} ({} steps)",
            spec.name,
            input.display(),
            spec.steps.len()
        );
        return Ok(());
    }

    for e in &errors {
        println!("✗ {e}");
    }
    anyhow::bail!("Recipe '{}' has {} problem(s)", spec.name, errors.len())
}

fn handle_verify(receipt: &Path, json: bool) -> Result<()> {
    let report = verify_receipt_file(receipt)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.format_cli());
    }

    if !report.passed {
        anyhow::bail!("Verification failed for {}", receipt.display());
    }
    Ok(())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_owned())
}

fn input_or_default(input: Option<PathBuf>, workspace: &WorkspacePaths) -> Result<PathBuf> {
    match input {
        Some(path) => Ok(path),
        None => first_raw_file(&workspace.raw_dir),
    }
}

fn first_raw_file(raw_dir: &Path) -> Result<PathBuf> {
    let mut entries = std::fs::read_dir(raw_dir)
        .with_context(|| {
            format!(
                "Failed to read {}. Pass an input file or create the raw directory.",
                raw_dir.display()
            )
        })?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect::<Vec<_>>();
    entries.sort();
    entries.into_iter().next().ok_or_else(|| {
        anyhow::anyhow!(
            "No files found in {} and no input file provided.",
            raw_dir.display()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory as _;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    fn clean_args(argv: &[&str]) -> Result<CleanArgs> {
        let cli = Cli::try_parse_from(argv)?;
        match cli.command {
            Commands::Clean(args) => Ok(args),
            _ => anyhow::bail!("not a clean command"),
        }
    }

    #[test]
    fn test_writing_commands_prepare_workspace() -> Result<()> {
        let writes = |argv: &[&str]| -> Result<bool> {
            Ok(Cli::try_parse_from(argv)?.command.writes_to_workspace())
        };
        assert!(writes(&["tidyframe", "clean", "sales.csv"])?);
        assert!(writes(&["tidyframe", "run", "-r", "sales.json"])?);
        assert!(writes(&["tidyframe", "template", "--checklist"])?);
        assert!(!writes(&["tidyframe", "inspect", "sales.csv"])?);
        assert!(!writes(&["tidyframe", "verify", "out.csv.receipt.json"])?);
        Ok(())
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value(" price = float64 "),
            Ok(("price".to_owned(), "float64".to_owned()))
        );
        assert!(parse_key_value("price").is_err());
        assert!(parse_key_value("=float64").is_err());
    }

    #[test]
    fn test_clean_flags_build_recipe_in_order() -> Result<()> {
        let args = clean_args(&[
            "tidyframe",
            "clean",
            "sales.csv",
            "--derive",
            "total = price * qty",
            "--filter",
            "price > 0",
            "--dedup",
            "--cast",
            "price=float64",
            "--drop-nulls",
            "--standardize-names",
        ])?;
        let spec = recipe_from_clean_args(&args, "sales")?;
        let ops: Vec<_> = spec.steps.iter().map(Step::op_name).collect();
        assert_eq!(
            ops,
            vec![
                "standardize_names",
                "drop_nulls",
                "cast_types",
                "drop_duplicates",
                "filter",
                "derive"
            ]
        );
        assert_eq!(spec.name, "sales");
        Ok(())
    }

    #[test]
    fn test_clean_without_flags_uses_checklist() -> Result<()> {
        let args = clean_args(&["tidyframe", "clean", "sales.csv"])?;
        let spec = recipe_from_clean_args(&args, "sales")?;
        assert_eq!(spec.steps, PipelineSpec::checklist("sales").steps);
        Ok(())
    }

    #[test]
    fn test_clean_rejects_unknown_type() -> Result<()> {
        let args = clean_args(&["tidyframe", "clean", "a.csv", "--cast", "x=decimal"])?;
        assert!(recipe_from_clean_args(&args, "a").is_err());
        Ok(())
    }

    #[test]
    fn test_template_requires_file_or_checklist() {
        assert!(Cli::try_parse_from(["tidyframe", "template"]).is_err());
        assert!(Cli::try_parse_from(["tidyframe", "template", "--checklist"]).is_ok());
        assert!(Cli::try_parse_from(["tidyframe", "template", "a.csv", "--checklist"]).is_err());
    }

    #[test]
    fn test_first_raw_file_is_sorted() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("b.csv"), "x\n1\n")?;
        std::fs::write(dir.path().join("a.csv"), "x\n1\n")?;
        std::fs::create_dir(dir.path().join("archive"))?;
        assert_eq!(first_raw_file(dir.path())?, dir.path().join("a.csv"));
        Ok(())
    }
}
