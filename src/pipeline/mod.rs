//! Per-file pipeline orchestration.
//!
//! Each input file goes through three external invocations, sharing
//! intermediate PLY files in a scoped temp directory:
//!
//! 1. CloudCompare: load LAS, compute and orient normals, derive
//!    dip / dip-direction scalar fields, export the cloud as PLY
//! 2. PoissonRecon: reconstruct a surface mesh from the exported cloud
//! 3. CloudCompare: save cloud and mesh together as one BIN project
//!
//! The first hard failure aborts the file. The color probe between
//! stages 1 and 2 is the only soft step: on failure the file continues
//! without color transfer.

pub mod commands;
pub mod exchange;

use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::tools::runner::{self, RunnerError};
use crate::tools::ResolvedTools;
use commands::CommandPlan;

/// Errors that abort processing of a single file.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage} failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: RunnerError,
    },

    #[error("{stage} finished but did not produce {path}")]
    MissingOutput { stage: &'static str, path: PathBuf },

    #[error("could not create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Create a spinner for a blocking external invocation.
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Run one stage to completion and check its file postcondition.
fn run_stage(
    stage: &'static str,
    message: &str,
    program: &Path,
    plan: &CommandPlan,
    timeout: Duration,
    expected_output: &Path,
    quiet: bool,
) -> Result<(), PipelineError> {
    for note in &plan.ignored {
        warn!("{}", note);
    }

    // Inputs sharing a stem reuse exchange paths; a leftover from an
    // earlier file must not pass this stage's postcondition
    if expected_output.exists() {
        let _ = std::fs::remove_file(expected_output);
    }

    let spinner = if quiet {
        None
    } else {
        Some(create_spinner(message))
    };

    let result = runner::run_command(program, &plan.args, timeout);

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let output = result.map_err(|source| PipelineError::Stage { stage, source })?;
    debug!("{} output: {}", stage, output.stdout.trim_end());

    // Exit code zero is not enough, the tool must have written the file
    if !expected_output.is_file() {
        return Err(PipelineError::MissingOutput {
            stage,
            path: expected_output.to_path_buf(),
        });
    }
    Ok(())
}

/// Process a single LAS file into a combined cloud+mesh project file.
///
/// # Arguments
///
/// * `tools` - Resolved executable paths, shared across the batch
/// * `config` - Pipeline parameters
/// * `input` - Source LAS file
/// * `output` - Destination project file; parent directories are created
/// * `temp_dir` - Scoped directory for the intermediate exchange files
/// * `quiet` - Suppress the per-stage spinner
pub fn process_file(
    tools: &ResolvedTools,
    config: &PipelineConfig,
    input: &Path,
    output: &Path,
    temp_dir: &Path,
    quiet: bool,
) -> Result<(), PipelineError> {
    let timeout = Duration::from_secs(config.tools.timeout_secs);
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "cloud".to_string());
    let cloud_ply = temp_dir.join(format!("{}_cloud.ply", stem));
    let mesh_ply = temp_dir.join(format!("{}_mesh.ply", stem));

    info!("Processing: {}", input.display());
    info!("Output: {}", output.display());

    // Stage 1: normals, dip scalar fields, PLY export
    info!("[1/3] Computing normals and exporting cloud...");
    let plan = commands::prepare_cloud_args(input, &cloud_ply, &config.normals);
    run_stage(
        "normal computation",
        "Computing normals (this may take a few minutes)...",
        &tools.cloudcompare.path,
        &plan,
        timeout,
        &cloud_ply,
        quiet,
    )?;

    // Soft probe: point count for the logs, color presence for stage 2
    let cloud_info = match exchange::probe_ply(&cloud_ply) {
        Ok(info) => {
            info!("Exported cloud with {} points", info.vertex_count);
            Some(info)
        }
        Err(e) => {
            warn!("Could not probe intermediate cloud: {}", e);
            None
        }
    };

    // Stage 2: surface reconstruction
    info!(
        "[2/3] Poisson reconstruction (depth={})...",
        config.reconstruction.octree_depth
    );
    let plan = commands::reconstruct_args(
        &cloud_ply,
        &mesh_ply,
        &config.reconstruction,
        cloud_info.map(|info| info.has_colors),
    );
    run_stage(
        "surface reconstruction",
        "Reconstructing surface (this can take a while)...",
        &tools.poisson_recon.path,
        &plan,
        timeout,
        &mesh_ply,
        quiet,
    )?;

    match exchange::probe_ply(&mesh_ply) {
        Ok(info) => info!("Mesh created with {} faces", info.face_count),
        Err(e) => warn!("Could not probe reconstructed mesh: {}", e),
    }

    // Stage 3: combined project file
    info!("[3/3] Saving project file...");
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent).map_err(|source| PipelineError::OutputDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let plan = commands::merge_args(&cloud_ply, &mesh_ply, output);
    run_stage(
        "project save",
        "Saving combined project...",
        &tools.cloudcompare.path,
        &plan,
        timeout,
        output,
        quiet,
    )?;

    info!("Saved: {}", output.display());
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::ToolConfig;
    use crate::tools::{ResolvedTool, ToolSource};
    use std::fs;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Write an executable shell script that copies a canned PLY header
    /// to the last argument of its invocation.
    fn write_stub_tool(dir: &Path, name: &str, script: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh").unwrap();
        writeln!(file, "{}", script).unwrap();
        drop(file);
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    const PLY_TO_LAST_ARG: &str = r#"for a; do out="$a"; done
printf 'ply\nformat ascii 1.0\nelement vertex 10\nproperty float x\nproperty float y\nproperty float z\nend_header\n' > "$out""#;

    const PLY_TO_OUT_FLAG: &str = r#"prev=""
for a; do [ "$prev" = "--out" ] && out="$a"; prev="$a"; done
printf 'ply\nformat ascii 1.0\nelement vertex 8\nelement face 12\nproperty list uchar int vertex_indices\nend_header\n' > "$out""#;

    fn stub_tools(dir: &Path) -> ResolvedTools {
        let cc = write_stub_tool(dir, "CloudCompare", PLY_TO_LAST_ARG);
        let pr = write_stub_tool(dir, "PoissonRecon", PLY_TO_OUT_FLAG);
        ResolvedTools {
            cloudcompare: ResolvedTool {
                path: cc,
                source: ToolSource::Explicit,
            },
            poisson_recon: ResolvedTool {
                path: pr,
                source: ToolSource::Explicit,
            },
        }
    }

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            tools: ToolConfig {
                timeout_secs: 30,
                ..ToolConfig::default()
            },
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_process_file_happy_path() {
        let bin_dir = TempDir::new().unwrap();
        let work_dir = TempDir::new().unwrap();
        let tools = stub_tools(bin_dir.path());
        let config = test_config();

        let input = work_dir.path().join("site1.las");
        fs::write(&input, b"not a real las").unwrap();
        let output = work_dir.path().join("Processed").join("site1.bin");

        process_file(&tools, &config, &input, &output, work_dir.path(), true).unwrap();

        assert!(output.is_file());
        assert!(work_dir.path().join("site1_cloud.ply").is_file());
        assert!(work_dir.path().join("site1_mesh.ply").is_file());
    }

    #[test]
    fn test_failed_reconstruction_skips_save() {
        let bin_dir = TempDir::new().unwrap();
        let work_dir = TempDir::new().unwrap();
        let mut tools = stub_tools(bin_dir.path());
        tools.poisson_recon.path = write_stub_tool(bin_dir.path(), "BrokenRecon", "exit 7");
        let config = test_config();

        let input = work_dir.path().join("site1.las");
        fs::write(&input, b"not a real las").unwrap();
        let output = work_dir.path().join("Processed").join("site1.bin");

        let err = process_file(&tools, &config, &input, &output, work_dir.path(), true)
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Stage {
                stage: "surface reconstruction",
                ..
            }
        ));
        // Save never ran
        assert!(!output.exists());
    }

    #[test]
    fn test_stale_exchange_file_does_not_mask_failure() {
        let bin_dir = TempDir::new().unwrap();
        let work_dir = TempDir::new().unwrap();
        let mut tools = stub_tools(bin_dir.path());
        // Exits zero but writes nothing
        tools.cloudcompare.path = write_stub_tool(bin_dir.path(), "SilentCC", "exit 0");
        let config = test_config();

        let input = work_dir.path().join("site1.las");
        fs::write(&input, b"not a real las").unwrap();
        let output = work_dir.path().join("Processed").join("site1.bin");

        // A previous same-stem input left its exchange file behind
        fs::write(work_dir.path().join("site1_cloud.ply"), b"stale").unwrap();

        let err = process_file(&tools, &config, &input, &output, work_dir.path(), true)
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::MissingOutput {
                stage: "normal computation",
                ..
            }
        ));
    }

    #[test]
    fn test_missing_postcondition_is_a_failure() {
        let bin_dir = TempDir::new().unwrap();
        let work_dir = TempDir::new().unwrap();
        let mut tools = stub_tools(bin_dir.path());
        // Exits zero but writes nothing
        tools.cloudcompare.path = write_stub_tool(bin_dir.path(), "SilentCC", "exit 0");
        let config = test_config();

        let input = work_dir.path().join("site1.las");
        fs::write(&input, b"not a real las").unwrap();
        let output = work_dir.path().join("Processed").join("site1.bin");

        let err = process_file(&tools, &config, &input, &output, work_dir.path(), true)
            .unwrap_err();

        assert!(matches!(err, PipelineError::MissingOutput { .. }));
    }
}
