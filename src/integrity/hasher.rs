//! Streaming SHA-256 of files and recipes.

use crate::error::{Result, ResultExt as _};
use crate::pipeline::PipelineSpec;
use sha2::{Digest as _, Sha256};
use std::fs::File;
use std::io::{BufReader, Read as _};
use std::path::Path;

const BUFFER_SIZE: usize = 8192;

/// Hash algorithm identifier used in receipts.
pub const HASH_ALGORITHM: &str = "SHA-256";

/// SHA-256 of a file as lowercase hex, read in fixed-size chunks.
///
/// # Errors
///
/// Returns error if the file cannot be opened or read.
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;

    let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; BUFFER_SIZE];

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(buffer.get(..bytes_read).unwrap_or_default());
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// SHA-256 of a recipe's canonical JSON.
///
/// Two recipes with the same steps and options hash the same regardless of
/// how their files were formatted.
///
/// # Errors
///
/// Returns error if the recipe cannot be serialised.
pub fn compute_recipe_hash(spec: &PipelineSpec) -> Result<String> {
    let json = serde_json::to_vec(spec)?;
    Ok(format!("{:x}", Sha256::digest(&json)))
}
