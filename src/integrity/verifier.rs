//! Receipt verification.
//!
//! The output is checked against the hash stored in its receipt. The raw
//! input is checked too when it is still where the run found it: raw data
//! must never change after a run, so drift there is a failure as well.

use crate::error::{Result, TidyError};
use crate::integrity::hasher::compute_file_hash;
use crate::integrity::receipt::{FileFingerprint, RunReceipt, load_receipt};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Which file of a run a check is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileRole {
    Input,
    Output,
}

impl FileRole {
    fn label(self) -> &'static str {
        match self {
            Self::Input => "Input",
            Self::Output => "Output",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckOutcome {
    Verified,
    Modified { actual_hash: String },
    Missing,
    Unreadable { reason: String },
    /// The input has moved or been archived; nothing to compare
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileCheck {
    pub role: FileRole,
    pub path: PathBuf,
    pub expected_hash: String,
    pub outcome: CheckOutcome,
}

impl FileCheck {
    pub fn passed(&self) -> bool {
        matches!(self.outcome, CheckOutcome::Verified | CheckOutcome::Skipped)
    }

    fn format_cli(&self) -> String {
        let label = self.role.label();
        let path = self.path.display();
        match &self.outcome {
            CheckOutcome::Verified => format!(
                "✓ {label}: {path}\n    Hash: {}",
                short_hash(&self.expected_hash)
            ),
            CheckOutcome::Skipped => format!("- {label}: {path} (not present, skipped)"),
            CheckOutcome::Missing => format!("✗ {label}: {path}\n    File not found"),
            CheckOutcome::Unreadable { reason } => {
                format!("✗ {label}: {path}\n    Failed to compute hash: {reason}")
            }
            CheckOutcome::Modified { actual_hash } => {
                let mut out = format!(
                    "✗ {label}: {path}\n    Hash mismatch detected\n    Expected: {}\n    Actual:   {actual_hash}",
                    self.expected_hash
                );
                if self.role == FileRole::Input {
                    out.push_str("\n    Raw input changed after the run");
                }
                out
            }
        }
    }
}

/// Outcome of checking every file a receipt names.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub passed: bool,
    pub checks: Vec<FileCheck>,
    pub receipt: RunReceipt,
}

impl VerificationReport {
    pub fn format_cli(&self) -> String {
        let mut out = if self.passed {
            "✓ PASS: Run outputs verified".to_owned()
        } else {
            "✗ FAIL: Run outputs do not match the receipt".to_owned()
        };

        let _ = write!(
            out,
            "\n  Recipe: {} ({})\n  Rows: {} -> {}\n  Created: {}",
            self.receipt.recipe.name,
            short_hash(&self.receipt.recipe.hash),
            self.receipt.rows_before,
            self.receipt.rows_after,
            self.receipt.created_utc.format("%Y-%m-%d %H:%M:%S UTC")
        );
        for check in &self.checks {
            for line in check.format_cli().lines() {
                let _ = write!(out, "\n  {line}");
            }
        }
        out
    }
}

fn short_hash(hash: &str) -> &str {
    hash.get(..16).unwrap_or(hash)
}

fn check_file(
    role: FileRole,
    path: PathBuf,
    fingerprint: &FileFingerprint,
    missing_is_failure: bool,
) -> FileCheck {
    let outcome = if !path.exists() {
        if missing_is_failure {
            CheckOutcome::Missing
        } else {
            CheckOutcome::Skipped
        }
    } else {
        match compute_file_hash(&path) {
            Ok(actual) if actual == fingerprint.hash => CheckOutcome::Verified,
            Ok(actual_hash) => CheckOutcome::Modified { actual_hash },
            Err(e) => CheckOutcome::Unreadable {
                reason: e.to_string(),
            },
        }
    };

    FileCheck {
        role,
        path,
        expected_hash: fingerprint.hash.clone(),
        outcome,
    }
}

/// Check a receipt's files. The output is looked up in `receipt_dir`; the
/// input at the absolute path recorded during the run.
pub fn verify_receipt(receipt: &RunReceipt, receipt_dir: &Path) -> VerificationReport {
    let output = check_file(
        FileRole::Output,
        receipt_dir.join(&receipt.output.file.path),
        &receipt.output.file,
        true,
    );
    let input = check_file(
        FileRole::Input,
        PathBuf::from(&receipt.input.path),
        &receipt.input,
        false,
    );

    let checks = vec![output, input];
    let passed = checks.iter().all(FileCheck::passed);
    if !passed {
        tracing::warn!(recipe = %receipt.recipe.name, "Receipt verification failed");
    }

    VerificationReport {
        passed,
        checks,
        receipt: receipt.clone(),
    }
}

/// Load a `.receipt.json` and verify it.
///
/// # Errors
///
/// Returns error if the receipt cannot be read or parsed.
pub fn verify_receipt_file(receipt_path: &Path) -> Result<VerificationReport> {
    let receipt = load_receipt(receipt_path)?;
    let receipt_dir = receipt_path
        .parent()
        .ok_or_else(|| TidyError::InvalidPath("Receipt has no parent directory".to_owned()))?;
    Ok(verify_receipt(&receipt, receipt_dir))
}
