//! Argument-list construction for the external tool invocations.
//!
//! Builders are pure: they take configuration and paths and return a
//! [`CommandPlan`] without touching the filesystem. Parameters that were
//! requested but cannot be expressed in the invocation are collected in
//! `ignored` so the orchestrator can report them instead of dropping them
//! silently.

use std::ffi::OsString;
use std::path::Path;

use crate::config::{NormalConfig, ReconstructionConfig};

/// A fully assembled argument list plus any requested-but-unexpressible
/// parameters.
#[derive(Debug)]
pub struct CommandPlan {
    pub args: Vec<OsString>,
    pub ignored: Vec<String>,
}

impl CommandPlan {
    fn new() -> Self {
        Self {
            args: Vec::new(),
            ignored: Vec::new(),
        }
    }

    fn arg(&mut self, value: impl Into<OsString>) -> &mut Self {
        self.args.push(value.into());
        self
    }
}

/// CloudCompare invocation for stage 1: open the LAS file, compute and
/// orient normals, derive dip / dip-direction scalar fields, and export
/// the cloud as PLY for the reconstruction step.
pub fn prepare_cloud_args(input: &Path, cloud_ply: &Path, normals: &NormalConfig) -> CommandPlan {
    let mut plan = CommandPlan::new();
    plan.arg("-SILENT")
        .arg("-AUTO_SAVE")
        .arg("OFF")
        .arg("-O")
        .arg(input)
        .arg("-OCTREE_NORMALS")
        .arg(normals.radius.to_string())
        .arg("-MODEL")
        .arg(normals.model.cc_name())
        .arg("-ORIENT_NORMS_MST")
        .arg(normals.knn.to_string())
        .arg("-NORMALS_TO_DIP")
        .arg("-C_EXPORT_FMT")
        .arg("PLY")
        .arg("-SAVE_CLOUDS")
        .arg("FILE")
        .arg(cloud_ply);
    plan
}

/// PoissonRecon invocation for stage 2: reconstruct a surface from the
/// exported cloud.
///
/// `cloud_has_colors` is the probe's verdict on the intermediate cloud;
/// `None` means the probe failed. `--colors` is passed only when color
/// interpolation is requested and the cloud actually carries colors;
/// otherwise the request lands in `ignored`.
pub fn reconstruct_args(
    cloud_ply: &Path,
    mesh_ply: &Path,
    recon: &ReconstructionConfig,
    cloud_has_colors: Option<bool>,
) -> CommandPlan {
    let mut plan = CommandPlan::new();
    plan.arg("--in")
        .arg(cloud_ply)
        .arg("--out")
        .arg(mesh_ply)
        .arg("--depth")
        .arg(recon.octree_depth.to_string())
        .arg("--samplesPerNode")
        .arg(recon.samples_per_node.to_string())
        .arg("--pointWeight")
        .arg(recon.point_weight.to_string())
        .arg("--bType")
        .arg(recon.boundary.btype_code().to_string());

    if recon.density {
        plan.arg("--density");
    }
    if let Some(threads) = recon.threads {
        plan.arg("--threads").arg(threads.to_string());
    }
    if recon.interpolate_colors {
        match cloud_has_colors {
            Some(true) => {
                plan.arg("--colors");
            }
            Some(false) => plan.ignored.push(
                "color interpolation requested but the source cloud has no colors".to_string(),
            ),
            None => plan.ignored.push(
                "color interpolation requested but the intermediate cloud could not be probed"
                    .to_string(),
            ),
        }
    }
    plan
}

/// CloudCompare invocation for stage 3: open the intermediate cloud and
/// mesh and save both into one BIN project file.
pub fn merge_args(cloud_ply: &Path, mesh_ply: &Path, output: &Path) -> CommandPlan {
    let mut plan = CommandPlan::new();
    plan.arg("-SILENT")
        .arg("-AUTO_SAVE")
        .arg("OFF")
        .arg("-O")
        .arg(cloud_ply)
        .arg("-O")
        .arg(mesh_ply)
        .arg("-C_EXPORT_FMT")
        .arg("BIN")
        .arg("-M_EXPORT_FMT")
        .arg("BIN")
        .arg("-SAVE_MESHES")
        .arg("ALL_AT_ONCE")
        .arg("FILE")
        .arg(output);
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BoundaryCondition, RadiusMode};
    use std::path::PathBuf;

    fn as_strings(plan: &CommandPlan) -> Vec<String> {
        plan.args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_prepare_cloud_args_defaults() {
        let normals = NormalConfig::default();
        let plan = prepare_cloud_args(
            Path::new("/data/site1.las"),
            Path::new("/tmp/site1_cloud.ply"),
            &normals,
        );

        let args = as_strings(&plan);
        assert_eq!(args[0], "-SILENT");
        assert!(plan.ignored.is_empty());

        // Radius defaults to auto, model to TRI, MST neighbors to 6
        let radius_at = args.iter().position(|a| a == "-OCTREE_NORMALS").unwrap();
        assert_eq!(args[radius_at + 1], "auto");
        let model_at = args.iter().position(|a| a == "-MODEL").unwrap();
        assert_eq!(args[model_at + 1], "TRI");
        let mst_at = args.iter().position(|a| a == "-ORIENT_NORMS_MST").unwrap();
        assert_eq!(args[mst_at + 1], "6");
        assert_eq!(args.last().unwrap(), "/tmp/site1_cloud.ply");
    }

    #[test]
    fn test_prepare_cloud_args_fixed_radius() {
        let normals = NormalConfig {
            radius: RadiusMode::Fixed(0.5),
            ..NormalConfig::default()
        };
        let plan = prepare_cloud_args(Path::new("in.las"), Path::new("out.ply"), &normals);

        let args = as_strings(&plan);
        let radius_at = args.iter().position(|a| a == "-OCTREE_NORMALS").unwrap();
        assert_eq!(args[radius_at + 1], "0.5");
    }

    #[test]
    fn test_reconstruct_args_btype_mapping() {
        for (boundary, code) in [
            (BoundaryCondition::Free, "1"),
            (BoundaryCondition::Dirichlet, "2"),
            (BoundaryCondition::Neumann, "3"),
        ] {
            let recon = ReconstructionConfig {
                boundary,
                ..ReconstructionConfig::default()
            };
            let plan =
                reconstruct_args(Path::new("c.ply"), Path::new("m.ply"), &recon, Some(false));
            let args = as_strings(&plan);
            let btype_at = args.iter().position(|a| a == "--bType").unwrap();
            assert_eq!(args[btype_at + 1], code);
        }
    }

    #[test]
    fn test_reconstruct_args_colors_only_when_available() {
        let recon = ReconstructionConfig::default();

        let plan = reconstruct_args(Path::new("c.ply"), Path::new("m.ply"), &recon, Some(true));
        assert!(as_strings(&plan).contains(&"--colors".to_string()));
        assert!(plan.ignored.is_empty());

        let plan = reconstruct_args(Path::new("c.ply"), Path::new("m.ply"), &recon, Some(false));
        assert!(!as_strings(&plan).contains(&"--colors".to_string()));
        assert_eq!(plan.ignored.len(), 1);

        let plan = reconstruct_args(Path::new("c.ply"), Path::new("m.ply"), &recon, None);
        assert!(!as_strings(&plan).contains(&"--colors".to_string()));
        assert_eq!(plan.ignored.len(), 1);
    }

    #[test]
    fn test_reconstruct_args_colors_not_requested() {
        let recon = ReconstructionConfig {
            interpolate_colors: false,
            ..ReconstructionConfig::default()
        };
        let plan = reconstruct_args(Path::new("c.ply"), Path::new("m.ply"), &recon, Some(true));
        assert!(!as_strings(&plan).contains(&"--colors".to_string()));
        assert!(plan.ignored.is_empty());
    }

    #[test]
    fn test_reconstruct_args_optional_flags() {
        let recon = ReconstructionConfig {
            threads: Some(8),
            density: false,
            ..ReconstructionConfig::default()
        };
        let plan = reconstruct_args(Path::new("c.ply"), Path::new("m.ply"), &recon, Some(false));
        let args = as_strings(&plan);

        assert!(!args.contains(&"--density".to_string()));
        let threads_at = args.iter().position(|a| a == "--threads").unwrap();
        assert_eq!(args[threads_at + 1], "8");
    }

    #[test]
    fn test_merge_args_output_is_last() {
        let out = PathBuf::from("/data/Processed/site1.bin");
        let plan = merge_args(Path::new("c.ply"), Path::new("m.ply"), &out);
        let args = as_strings(&plan);

        assert_eq!(args.last().unwrap(), "/data/Processed/site1.bin");
        assert_eq!(args.iter().filter(|a| *a == "-O").count(), 2);
        assert!(plan.ignored.is_empty());
    }
}
