//! Error type for the workspace and integrity layers.
//!
//! Pipeline logic works in `anyhow::Result` and adds context at every Polars
//! and I/O boundary. The layers that enforce rules of their own (the raw-data
//! guard, receipts, settings) report through [`TidyError`] so callers can
//! match on what went wrong:
//!
//! ```
//! use tidyframe::error::TidyError;
//!
//! fn describe(err: &TidyError) -> &'static str {
//!     match err {
//!         TidyError::RawOverwrite(_) => "refused to touch raw data",
//!         TidyError::Io(_) => "filesystem problem",
//!         _ => "other",
//!     }
//! }
//! ```
//!
//! [`ResultExt`] adds a `.context()` that keeps the crate's error type:
//!
//! ```no_run
//! use tidyframe::error::ResultExt as _;
//!
//! fn read_recipe() -> tidyframe::error::Result<String> {
//!     std::fs::read_to_string("recipe.json").context("Failed to read recipe")
//! }
//! ```

use std::fmt;

/// Main error type for tidyframe operations.
#[derive(Debug)]
pub enum TidyError {
    /// I/O errors (file operations)
    Io(std::io::Error),

    /// Data processing errors (Polars, parsing, etc.)
    DataProcessing(String),

    /// Settings or recipe errors
    Config(String),

    /// File not found or invalid path
    InvalidPath(String),

    /// An output would overwrite or land inside the raw data
    RawOverwrite(String),

    /// Recipe does not fit the dataset
    Validation(Vec<String>),

    /// Generic error with context
    Other(String),
}

impl fmt::Display for TidyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::DataProcessing(msg) => write!(f, "Data processing error: {msg}"),
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::InvalidPath(msg) => write!(f, "Invalid path: {msg}"),
            Self::RawOverwrite(msg) => write!(f, "Refusing to overwrite raw data: {msg}"),
            Self::Validation(errors) => {
                write!(f, "Pipeline validation failed:")?;
                for e in errors {
                    write!(f, "\n  {e}")?;
                }
                Ok(())
            }
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for TidyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TidyError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<anyhow::Error> for TidyError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(format!("{err:#}"))
    }
}

impl From<serde_json::Error> for TidyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(format!("JSON error: {err}"))
    }
}

impl From<polars::error::PolarsError> for TidyError {
    fn from(err: polars::error::PolarsError) -> Self {
        Self::DataProcessing(err.to_string())
    }
}

/// Result type alias for tidyframe operations.
pub type Result<T> = std::result::Result<T, TidyError>;

/// Extension trait to add context to results.
pub trait ResultExt<T> {
    /// Add context to an error.
    ///
    /// # Errors
    ///
    /// Returns the original error wrapped with `msg`.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    ///
    /// # Errors
    ///
    /// Returns the original error wrapped with the closure's message.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<TidyError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| wrap(e.into(), msg.into()))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| wrap(e.into(), f()))
    }
}

// Guard and validation failures keep their variant so callers can still match on them.
fn wrap(err: TidyError, msg: String) -> TidyError {
    match err {
        TidyError::RawOverwrite(inner) => TidyError::RawOverwrite(format!("{msg}: {inner}")),
        TidyError::Validation(_) => err,
        other => TidyError::Other(format!("{msg}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TidyError::DataProcessing("column not found".to_owned());
        assert_eq!(err.to_string(), "Data processing error: column not found");
    }

    #[test]
    fn test_validation_display_lists_every_error() {
        let err = TidyError::Validation(vec![
            "Step 1: Cannot drop non-existent column 'x'".to_owned(),
            "Schema: Required column 'id' not found in input".to_owned(),
        ]);
        let text = err.to_string();
        assert!(text.starts_with("Pipeline validation failed:"));
        assert!(text.contains("Step 1"));
        assert!(text.contains("Schema"));
    }

    #[test]
    fn test_result_context() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file.txt",
        ));

        let result: Result<()> = result.context("Failed to read file");
        let err = result.expect_err("context keeps the error");
        assert!(err.to_string().contains("Failed to read file"));
    }

    #[test]
    fn test_context_preserves_raw_overwrite() {
        let result: Result<()> = Err(TidyError::RawOverwrite("data/raw/a.csv".to_owned()));
        let err = result.context("Saving output").expect_err("still an error");
        assert!(matches!(err, TidyError::RawOverwrite(_)));
        assert!(err.to_string().contains("Saving output"));
    }
}
