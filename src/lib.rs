//! Batch LAS-to-mesh reconstruction driver.
//!
//! This crate provides tools for:
//! - Locating the CloudCompare and PoissonRecon executables
//! - Driving both tools over a directory of LAS files
//! - Computing normals and dip / dip-direction scalar fields per cloud
//! - Reconstructing a Poisson surface and saving a combined project file
//!
//! # Example
//!
//! ```no_run
//! use std::sync::atomic::AtomicBool;
//! use lasrecon::{batch, config::PipelineConfig, tools};
//!
//! let config = PipelineConfig::default();
//! let resolved = tools::resolve_tools(&config.tools).unwrap();
//! let interrupt = AtomicBool::new(false);
//! let result = batch::run(&resolved, &config, "scans".as_ref(), &interrupt, false).unwrap();
//! println!("{} of {} files succeeded", result.succeeded, result.total);
//! ```

pub mod batch;
pub mod cli;
pub mod config;
pub mod pipeline;
pub mod tools;

pub use batch::BatchResult;
pub use config::{NormalConfig, PipelineConfig, ReconstructionConfig, ToolConfig};
pub use tools::{ResolvedTool, ResolvedTools};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
