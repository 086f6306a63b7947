//! Batch driver: input discovery and the sequential per-file loop.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use log::{error, info};
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::pipeline;
use crate::tools::ResolvedTools;

/// Errors that abort a batch before any file is processed.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("input directory does not exist: {0}")]
    MissingInputDir(PathBuf),

    #[error("input path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("could not read input directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not create temp directory: {0}")]
    TempDir(#[source] std::io::Error),
}

/// Aggregate outcome of a directory run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub interrupted: bool,
}

/// Largest failure count reported through the exit code. Keeps failure
/// codes clear of 130 (interrupt) and the shell's 126/127/128+n range.
const MAX_FAILURE_EXIT_CODE: usize = 125;

impl BatchResult {
    /// Process exit code for this result: the failed-file count capped
    /// at [`MAX_FAILURE_EXIT_CODE`], or 130 when the operator
    /// interrupted the batch.
    pub fn exit_code(&self) -> i32 {
        if self.interrupted {
            return 130;
        }
        self.failed.min(MAX_FAILURE_EXIT_CODE) as i32
    }
}

/// Check that the input path exists and is a directory.
pub fn validate_input_dir(input_dir: &Path) -> Result<(), BatchError> {
    if !input_dir.exists() {
        return Err(BatchError::MissingInputDir(input_dir.to_path_buf()));
    }
    if !input_dir.is_dir() {
        return Err(BatchError::NotADirectory(input_dir.to_path_buf()));
    }
    Ok(())
}

/// Find all LAS files in a directory, case-insensitively.
///
/// The result is sorted and deduplicated so processing order is
/// deterministic and a case-insensitive filesystem can never yield the
/// same file twice.
pub fn discover_inputs(input_dir: &Path) -> Result<Vec<PathBuf>, BatchError> {
    let entries = std::fs::read_dir(input_dir).map_err(|source| BatchError::ReadDir {
        path: input_dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .map(|ext| ext.eq_ignore_ascii_case("las"))
                .unwrap_or(false)
        })
        .collect();

    files.sort();
    files.dedup();
    Ok(files)
}

/// Destination path for one input: `<input_dir>/<output_subdir>/<stem>.bin`.
pub fn output_path(input_dir: &Path, output_subdir: &str, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    let mut name = stem;
    name.push(".bin");
    input_dir.join(output_subdir).join(name)
}

/// Process every LAS file in a directory, one at a time.
///
/// The interrupt flag is checked before each file; once set, no further
/// file is started and the result is marked interrupted. Completed
/// outputs are never rolled back. Intermediate exchange files live in a
/// scoped temp directory that is removed when this function returns on
/// any path.
pub fn run(
    tools: &ResolvedTools,
    config: &PipelineConfig,
    input_dir: &Path,
    interrupt: &AtomicBool,
    quiet: bool,
) -> Result<BatchResult, BatchError> {
    validate_input_dir(input_dir)?;

    let inputs = discover_inputs(input_dir)?;
    if inputs.is_empty() {
        error!("No LAS files found in: {}", input_dir.display());
        return Ok(BatchResult::default());
    }
    info!("Found {} LAS file(s) to process", inputs.len());

    // Dropped on every return path, taking the exchange files with it
    let temp_dir = tempfile::tempdir().map_err(BatchError::TempDir)?;

    let mut result = BatchResult {
        total: inputs.len(),
        ..BatchResult::default()
    };

    for (index, input) in inputs.iter().enumerate() {
        if interrupt.load(Ordering::SeqCst) {
            info!("Interrupted, stopping before the next file");
            result.interrupted = true;
            break;
        }

        info!("File {}/{}", index + 1, inputs.len());
        let output = output_path(input_dir, &config.output_subdir, input);

        match pipeline::process_file(tools, config, input, &output, temp_dir.path(), quiet) {
            Ok(()) => {
                info!("Successfully processed: {}", input.display());
                result.succeeded += 1;
            }
            Err(e) => {
                error!("Failed to process {}: {}", input.display(), e);
                result.failed += 1;
            }
        }
    }

    Ok(result)
}
