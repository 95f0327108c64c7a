//! Raw/clean directory layout and the raw-data guard.
//!
//! Raw files are read, never written. Every code path that writes a dataset
//! goes through [`guard_output`] first.

use crate::config::WorkspaceSettings;
use crate::error::{Result, ResultExt as _, TidyError};
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub raw_dir: PathBuf,
    pub clean_dir: PathBuf,
    pub recipes_dir: PathBuf,
}

impl WorkspacePaths {
    pub fn from_settings(settings: &WorkspaceSettings) -> Self {
        let root = settings.root.clone();
        Self {
            raw_dir: root.join(&settings.raw_dir),
            clean_dir: root.join(&settings.clean_dir),
            recipes_dir: root.join(&settings.recipes_dir),
            root,
        }
    }

    /// Create the raw, clean and recipe directories.
    ///
    /// # Errors
    ///
    /// Returns error if a directory cannot be created.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.raw_dir, &self.clean_dir, &self.recipes_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }
        Ok(())
    }

    /// `clean_dir/<stem>_clean.csv`
    pub fn default_output_path(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset".to_owned());
        self.clean_dir.join(format!("{stem}_clean.csv"))
    }

    /// `recipes_dir/<name>.json`
    pub fn recipe_path(&self, name: &str) -> PathBuf {
        let file = crate::dataset::sanitize_column_name(name);
        self.recipes_dir.join(format!("{file}.json"))
    }
}

/// Absolute, symlink-resolved form of a path that may not exist yet.
///
/// The longest existing prefix is canonicalised by the OS; the components
/// below it cannot be symlinks, so `.` and `..` there are folded lexically.
fn resolve(path: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(path)
        .with_context(|| format!("Failed to resolve path {}", path.display()))?;
    let components: Vec<Component<'_>> = absolute.components().collect();

    for split in (1..=components.len()).rev() {
        let head: PathBuf = components[..split].iter().collect();
        if let Ok(mut resolved) = head.canonicalize() {
            for component in &components[split..] {
                match component {
                    Component::CurDir => {}
                    Component::ParentDir => {
                        resolved.pop();
                    }
                    other => resolved.push(other),
                }
            }
            return Ok(resolved);
        }
    }

    Ok(absolute)
}

/// Refuse outputs that would replace the input or land in the raw directory.
///
/// # Errors
///
/// Returns [`TidyError::RawOverwrite`] when the output is not allowed.
pub fn guard_output(input: &Path, output: &Path, raw_dir: Option<&Path>) -> Result<()> {
    let output_resolved = resolve(output)?;

    if output_resolved == resolve(input)? {
        return Err(TidyError::RawOverwrite(format!(
            "output {} is the input file",
            output.display()
        )));
    }

    if let Some(raw_dir) = raw_dir
        && output_resolved.starts_with(resolve(raw_dir)?)
    {
        return Err(TidyError::RawOverwrite(format!(
            "output {} is inside the raw directory {}",
            output.display(),
            raw_dir.display()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace(root: &Path) -> WorkspacePaths {
        WorkspacePaths::from_settings(&WorkspaceSettings {
            root: root.to_path_buf(),
            ..Default::default()
        })
    }

    #[test]
    fn test_layout() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let ws = workspace(dir.path());
        ws.ensure_dirs()?;

        assert!(ws.raw_dir.is_dir());
        assert!(ws.clean_dir.is_dir());
        assert_eq!(
            ws.default_output_path(Path::new("data/raw/sales 2024.csv")),
            ws.clean_dir.join("sales 2024_clean.csv")
        );
        assert_eq!(
            ws.recipe_path("Weekly Sales"),
            ws.recipes_dir.join("weekly_sales.json")
        );
        Ok(())
    }

    #[test]
    fn test_guard_rejects_input_path() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("sales.csv");
        std::fs::write(&input, "a\n1\n")?;

        let sneaky = dir.path().join(".").join("sales.csv");
        let result = guard_output(&input, &sneaky, None);
        assert!(matches!(result, Err(TidyError::RawOverwrite(_))));
        Ok(())
    }

    #[test]
    fn test_guard_rejects_raw_directory() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let ws = workspace(dir.path());
        ws.ensure_dirs()?;
        let input = ws.raw_dir.join("sales.csv");
        std::fs::write(&input, "a\n1\n")?;

        let result = guard_output(&input, &ws.raw_dir.join("sales_clean.csv"), Some(&ws.raw_dir));
        assert!(matches!(result, Err(TidyError::RawOverwrite(_))));

        let ok = guard_output(&input, &ws.default_output_path(&input), Some(&ws.raw_dir));
        assert!(ok.is_ok());
        Ok(())
    }

    #[test]
    fn test_guard_sees_through_parent_components() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let ws = workspace(dir.path());
        ws.ensure_dirs()?;
        let input = ws.raw_dir.join("sales.csv");
        std::fs::write(&input, "a\n1\n")?;

        let into_new_raw_subdir = ws.clean_dir.join("..").join("raw").join("new").join("x.csv");
        let result = guard_output(&input, &into_new_raw_subdir, Some(&ws.raw_dir));
        assert!(matches!(result, Err(TidyError::RawOverwrite(_))));

        let missing_parent = dir.path().join("scratch").join("..").join("raw").join("x.csv");
        let result = guard_output(&input, &missing_parent, Some(&ws.raw_dir));
        assert!(matches!(result, Err(TidyError::RawOverwrite(_))));

        let back_to_input = ws.raw_dir.join("new").join("..").join("sales.csv");
        let result = guard_output(&input, &back_to_input, None);
        assert!(matches!(result, Err(TidyError::RawOverwrite(_))));

        let elsewhere = ws.raw_dir.join("..").join("clean").join("nested").join("x.csv");
        assert!(guard_output(&input, &elsewhere, Some(&ws.raw_dir)).is_ok());
        assert!(!ws.raw_dir.join("new").exists());
        Ok(())
    }

    #[test]
    fn test_guard_rejects_raw_directory_before_it_exists() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let ws = workspace(dir.path());
        let input = dir.path().join("sales.csv");
        std::fs::write(&input, "a\n1\n")?;

        let result = guard_output(&input, &ws.raw_dir.join("sales_clean.csv"), Some(&ws.raw_dir));
        assert!(matches!(result, Err(TidyError::RawOverwrite(_))));
        Ok(())
    }
}
