//! Configuration types for the reconstruction pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Local surface model used for normal estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalModel {
    Triangulation,
    Quadric,
    Plane,
}

impl NormalModel {
    /// CloudCompare CLI name for this model.
    pub fn cc_name(&self) -> &'static str {
        match self {
            NormalModel::Triangulation => "TRI",
            NormalModel::Quadric => "QUADRIC",
            NormalModel::Plane => "LS",
        }
    }
}

impl fmt::Display for NormalModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NormalModel::Triangulation => "triangulation",
            NormalModel::Quadric => "quadric",
            NormalModel::Plane => "plane",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for NormalModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "triangulation" => Ok(NormalModel::Triangulation),
            "quadric" => Ok(NormalModel::Quadric),
            "plane" => Ok(NormalModel::Plane),
            other => Err(format!(
                "unknown normal model '{}', expected triangulation, quadric or plane",
                other
            )),
        }
    }
}

/// Screened Poisson boundary condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryCondition {
    Free,
    Dirichlet,
    Neumann,
}

impl BoundaryCondition {
    /// PoissonRecon `--bType` code for this condition.
    pub fn btype_code(&self) -> u32 {
        match self {
            BoundaryCondition::Free => 1,
            BoundaryCondition::Dirichlet => 2,
            BoundaryCondition::Neumann => 3,
        }
    }
}

impl fmt::Display for BoundaryCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BoundaryCondition::Free => "Free",
            BoundaryCondition::Dirichlet => "Dirichlet",
            BoundaryCondition::Neumann => "Neumann",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for BoundaryCondition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "free" => Ok(BoundaryCondition::Free),
            "dirichlet" => Ok(BoundaryCondition::Dirichlet),
            "neumann" => Ok(BoundaryCondition::Neumann),
            other => Err(format!(
                "unknown boundary condition '{}', expected free, dirichlet or neumann",
                other
            )),
        }
    }
}

/// Neighborhood radius for normal estimation: a fixed distance in
/// cloud units, or `auto` to let CloudCompare estimate one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RadiusRepr", into = "RadiusRepr")]
pub enum RadiusMode {
    Auto,
    Fixed(f64),
}

/// YAML-facing shape of [`RadiusMode`]: a bare number or the string `auto`.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RadiusRepr {
    Meters(f64),
    Text(String),
}

impl From<RadiusMode> for RadiusRepr {
    fn from(mode: RadiusMode) -> Self {
        match mode {
            RadiusMode::Auto => RadiusRepr::Text("auto".to_string()),
            RadiusMode::Fixed(m) => RadiusRepr::Meters(m),
        }
    }
}

impl TryFrom<RadiusRepr> for RadiusMode {
    type Error = String;

    fn try_from(repr: RadiusRepr) -> Result<Self, Self::Error> {
        match repr {
            RadiusRepr::Meters(m) => Ok(RadiusMode::Fixed(m)),
            RadiusRepr::Text(s) if s.eq_ignore_ascii_case("auto") => Ok(RadiusMode::Auto),
            RadiusRepr::Text(s) => Err(format!(
                "invalid radius '{}', expected 'auto' or a distance",
                s
            )),
        }
    }
}

impl fmt::Display for RadiusMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RadiusMode::Auto => write!(f, "auto"),
            RadiusMode::Fixed(m) => write!(f, "{}", m),
        }
    }
}

impl FromStr for RadiusMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            return Ok(RadiusMode::Auto);
        }
        s.parse::<f64>()
            .map(RadiusMode::Fixed)
            .map_err(|_| format!("invalid radius '{}', expected 'auto' or a distance", s))
    }
}

/// Configuration for normal estimation and orientation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalConfig {
    /// Neighbors used for MST normal orientation
    #[serde(default = "default_knn")]
    pub knn: u32,

    /// Neighborhood radius for the local model, or auto
    #[serde(default = "default_radius")]
    pub radius: RadiusMode,

    /// Local surface model
    #[serde(default = "default_model")]
    pub model: NormalModel,
}

fn default_knn() -> u32 {
    6
}

fn default_radius() -> RadiusMode {
    RadiusMode::Auto
}

fn default_model() -> NormalModel {
    NormalModel::Triangulation
}

impl Default for NormalConfig {
    fn default() -> Self {
        Self {
            knn: default_knn(),
            radius: default_radius(),
            model: default_model(),
        }
    }
}

/// Configuration for screened Poisson surface reconstruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconstructionConfig {
    /// Maximum octree depth
    #[serde(default = "default_octree_depth")]
    pub octree_depth: u32,

    /// Minimum samples per octree node
    #[serde(default = "default_samples_per_node")]
    pub samples_per_node: f64,

    /// Interpolation weight for point constraints
    #[serde(default = "default_point_weight")]
    pub point_weight: f64,

    /// Boundary condition for the solver
    #[serde(default = "default_boundary")]
    pub boundary: BoundaryCondition,

    /// Solver thread count (None = tool default)
    #[serde(default)]
    pub threads: Option<u32>,

    /// Output a per-vertex density scalar
    #[serde(default = "default_true")]
    pub density: bool,

    /// Interpolate source colors onto the mesh when available
    #[serde(default = "default_true")]
    pub interpolate_colors: bool,
}

fn default_octree_depth() -> u32 {
    11
}

fn default_samples_per_node() -> f64 {
    1.5
}

fn default_point_weight() -> f64 {
    2.0
}

fn default_boundary() -> BoundaryCondition {
    BoundaryCondition::Neumann
}

fn default_true() -> bool {
    true
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            octree_depth: default_octree_depth(),
            samples_per_node: default_samples_per_node(),
            point_weight: default_point_weight(),
            boundary: default_boundary(),
            threads: None,
            density: true,
            interpolate_colors: true,
        }
    }
}

/// Configuration for the external tool executables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Explicit path to the CloudCompare executable
    #[serde(default)]
    pub cloudcompare: Option<PathBuf>,

    /// Explicit path to the PoissonRecon executable
    #[serde(default)]
    pub poisson_recon: Option<PathBuf>,

    /// Per-invocation timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    3600
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            cloudcompare: None,
            poisson_recon: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub tools: ToolConfig,

    #[serde(default)]
    pub normals: NormalConfig,

    #[serde(default)]
    pub reconstruction: ReconstructionConfig,

    /// Name of the output subdirectory created under the input directory
    #[serde(default = "default_output_subdir")]
    pub output_subdir: String,
}

fn default_output_subdir() -> String {
    "Processed".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tools: ToolConfig::default(),
            normals: NormalConfig::default(),
            reconstruction: ReconstructionConfig::default(),
            output_subdir: default_output_subdir(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check that all values are in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.normals.knn < 1 {
            return Err(ConfigError::Invalid(
                "normals.knn must be at least 1".to_string(),
            ));
        }
        if let RadiusMode::Fixed(m) = self.normals.radius {
            if m <= 0.0 {
                return Err(ConfigError::Invalid(
                    "normals.radius must be positive or 'auto'".to_string(),
                ));
            }
        }
        if self.reconstruction.octree_depth < 1 {
            return Err(ConfigError::Invalid(
                "reconstruction.octree_depth must be at least 1".to_string(),
            ));
        }
        if self.reconstruction.samples_per_node <= 0.0 {
            return Err(ConfigError::Invalid(
                "reconstruction.samples_per_node must be positive".to_string(),
            ));
        }
        if self.reconstruction.point_weight < 0.0 {
            return Err(ConfigError::Invalid(
                "reconstruction.point_weight must not be negative".to_string(),
            ));
        }
        if self.reconstruction.threads == Some(0) {
            return Err(ConfigError::Invalid(
                "reconstruction.threads must be at least 1".to_string(),
            ));
        }
        if self.tools.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "tools.timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.output_subdir.is_empty() {
            return Err(ConfigError::Invalid(
                "output_subdir must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
