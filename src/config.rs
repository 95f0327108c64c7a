//! Application settings.
//!
//! Settings are read from `--config` when given, otherwise from
//! `<config dir>/tidyframe/config.json`, otherwise defaults apply. A few
//! values can be overridden through the environment for one-off runs.

use crate::dataset::CsvOptions;
use crate::error::{Result, ResultExt as _, TidyError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Overrides the workspace root directory.
pub const ENV_WORKSPACE: &str = "TIDYFRAME_WORKSPACE";
/// Overrides the number of preview rows shown by `inspect`.
pub const ENV_PREVIEW_ROWS: &str = "TIDYFRAME_PREVIEW_ROWS";
/// Overrides how many rows are scanned to infer CSV column types.
pub const ENV_INFER_SCHEMA_LENGTH: &str = "TIDYFRAME_INFER_SCHEMA_LENGTH";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceSettings {
    /// Root of the data directory
    pub root: PathBuf,
    /// Directory (relative to root) holding untouched input files
    pub raw_dir: String,
    /// Directory (relative to root) receiving cleaned outputs
    pub clean_dir: String,
    /// Directory (relative to root) for saved recipes
    pub recipes_dir: String,
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
            raw_dir: "raw".to_owned(),
            clean_dir: "clean".to_owned(),
            recipes_dir: "recipes".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Default CSV reading options, used when a recipe does not carry its own
    pub csv: CsvOptions,
    pub workspace: WorkspaceSettings,
    /// Rows shown in the `inspect` preview
    pub preview_rows: usize,
    /// Write a `.receipt.json` next to every output
    pub write_receipts: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            csv: CsvOptions::default(),
            workspace: WorkspaceSettings::default(),
            preview_rows: 5,
            write_receipts: true,
        }
    }
}

impl Settings {
    /// Apply `TIDYFRAME_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(root) = lookup(ENV_WORKSPACE)
            && !root.is_empty()
        {
            self.workspace.root = PathBuf::from(root);
        }

        if let Some(rows) = lookup(ENV_PREVIEW_ROWS).and_then(|v| v.parse::<usize>().ok()) {
            self.preview_rows = rows;
        }

        if let Some(len) = lookup(ENV_INFER_SCHEMA_LENGTH).and_then(|v| v.parse::<usize>().ok()) {
            self.csv.infer_schema_length = Some(len);
        }
    }
}

/// Default location of the settings file.
pub fn get_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tidyframe").join("config.json"))
}

/// Load settings from an explicit path, the default location, or defaults.
///
/// An explicit path must exist; the default location is optional.
///
/// # Errors
///
/// Returns error if the file cannot be read or is not valid settings JSON.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    let mut settings = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(TidyError::InvalidPath(format!(
                    "settings file not found: {}",
                    path.display()
                )));
            }
            read_settings(path)?
        }
        None => match get_config_path() {
            Some(path) if path.exists() => read_settings(&path)?,
            _ => Settings::default(),
        },
    };

    settings.apply_env_overrides();
    tracing::debug!(?settings, "Settings loaded");
    Ok(settings)
}

fn read_settings(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse settings file {}", path.display()))
}

/// Save settings as pretty JSON, creating parent directories.
///
/// # Errors
///
/// Returns error if the directory or file cannot be written.
pub fn save_settings(settings: &Settings, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write settings file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_round_trip_through_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("config.json");

        let mut settings = Settings::default();
        settings.preview_rows = 12;
        settings.csv.null_values.push("missing".to_owned());
        save_settings(&settings, &path)?;

        let loaded = load_settings(Some(&path))?;
        assert_eq!(loaded.preview_rows, 12);
        assert!(loaded.csv.null_values.contains(&"missing".to_owned()));
        Ok(())
    }

    #[test]
    fn test_partial_file_uses_defaults() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "preview_rows": 3 }"#)?;

        let loaded = read_settings(&path)?;
        assert_eq!(loaded.preview_rows, 3);
        assert_eq!(loaded.workspace, WorkspaceSettings::default());
        assert!(loaded.write_receipts);
        Ok(())
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = load_settings(Some(Path::new("/definitely/not/here.json")));
        assert!(matches!(result, Err(TidyError::InvalidPath(_))));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_WORKSPACE, "/srv/data"),
            (ENV_PREVIEW_ROWS, "20"),
            (ENV_INFER_SCHEMA_LENGTH, "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        let before = settings.csv.infer_schema_length;
        settings.apply_overrides(|key| vars.get(key).map(|v| (*v).to_owned()));

        assert_eq!(settings.workspace.root, PathBuf::from("/srv/data"));
        assert_eq!(settings.preview_rows, 20);
        assert_eq!(settings.csv.infer_schema_length, before);
    }
}
