//! Executable discovery for the external reconstruction tools.
//!
//! Each tool is resolved through the same ordered search, first match wins:
//!
//! 1. Explicit path from the command line or the config file
//! 2. Environment variable (`CLOUDCOMPARE_BIN`, `POISSONRECON_BIN`)
//! 3. Well-known install locations for the current platform
//! 4. `PATH` lookup by executable name
//!
//! An explicit path that does not exist is a hard error rather than a
//! fall-through: an operator who pinned a path gets that path or a
//! diagnostic, never a silently different binary.

use std::env;
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use thiserror::Error;

use crate::config::ToolConfig;

/// Errors that can occur while locating the external executables.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{tool} not found at the configured path: {path}")]
    ExplicitNotFound { tool: &'static str, path: PathBuf },

    #[error("{tool} not found; install it, set {env_var}, or pass {flag} <PATH>")]
    NotFound {
        tool: &'static str,
        env_var: &'static str,
        flag: &'static str,
    },
}

/// The two external executables the pipeline depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    CloudCompare,
    PoissonRecon,
}

impl ToolKind {
    /// Canonical tool name, as shown in logs and error messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            ToolKind::CloudCompare => "CloudCompare",
            ToolKind::PoissonRecon => "PoissonRecon",
        }
    }

    /// Environment variable consulted during resolution.
    pub fn env_var(&self) -> &'static str {
        match self {
            ToolKind::CloudCompare => "CLOUDCOMPARE_BIN",
            ToolKind::PoissonRecon => "POISSONRECON_BIN",
        }
    }

    /// CLI flag that pins this tool to an explicit path.
    pub fn cli_flag(&self) -> &'static str {
        match self {
            ToolKind::CloudCompare => "--cloudcompare",
            ToolKind::PoissonRecon => "--poisson-recon",
        }
    }

    /// Executable names tried during the `PATH` lookup.
    fn search_names(&self) -> Vec<String> {
        let base = self.display_name();
        if cfg!(target_os = "windows") {
            vec![format!("{}.exe", base)]
        } else if cfg!(target_os = "macos") {
            vec![base.to_string()]
        } else {
            // Distro packages commonly install an all-lowercase name
            vec![base.to_string(), base.to_ascii_lowercase()]
        }
    }

    /// Install locations checked before falling back to `PATH`.
    fn well_known_paths(&self) -> Vec<PathBuf> {
        let paths: &[&str] = if cfg!(target_os = "windows") {
            match self {
                ToolKind::CloudCompare => &[
                    r"C:\Program Files\CloudCompare\CloudCompare.exe",
                    r"C:\Program Files (x86)\CloudCompare\CloudCompare.exe",
                ],
                ToolKind::PoissonRecon => &[
                    r"C:\Program Files\PoissonRecon\PoissonRecon.exe",
                    r"C:\Program Files\AdaptiveSolvers\PoissonRecon.exe",
                ],
            }
        } else if cfg!(target_os = "macos") {
            match self {
                ToolKind::CloudCompare => &[
                    "/Applications/CloudCompare.app/Contents/MacOS/CloudCompare",
                    "/opt/homebrew/bin/CloudCompare",
                    "/usr/local/bin/CloudCompare",
                ],
                ToolKind::PoissonRecon => &[
                    "/opt/homebrew/bin/PoissonRecon",
                    "/usr/local/bin/PoissonRecon",
                ],
            }
        } else {
            match self {
                ToolKind::CloudCompare => &[
                    "/usr/bin/cloudcompare",
                    "/usr/local/bin/cloudcompare",
                    "/usr/bin/CloudCompare",
                    "/opt/cloudcompare/CloudCompare",
                    "/snap/bin/cloudcompare.CloudCompare",
                ],
                ToolKind::PoissonRecon => &[
                    "/usr/local/bin/PoissonRecon",
                    "/usr/bin/PoissonRecon",
                    "/opt/PoissonRecon/Bin/Linux/PoissonRecon",
                ],
            }
        };
        paths.iter().map(PathBuf::from).collect()
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Where a resolved executable path came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolSource {
    Explicit,
    EnvVar(&'static str),
    WellKnown,
    PathLookup,
}

impl fmt::Display for ToolSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolSource::Explicit => write!(f, "configured path"),
            ToolSource::EnvVar(var) => write!(f, "${}", var),
            ToolSource::WellKnown => write!(f, "well-known location"),
            ToolSource::PathLookup => write!(f, "PATH"),
        }
    }
}

/// A located executable together with the source that produced it.
#[derive(Debug, Clone)]
pub struct ResolvedTool {
    pub path: PathBuf,
    pub source: ToolSource,
}

/// Both executables, resolved once at startup and passed into the batch
/// driver. Nothing caches discovery results beyond this value.
#[derive(Debug, Clone)]
pub struct ResolvedTools {
    pub cloudcompare: ResolvedTool,
    pub poisson_recon: ResolvedTool,
}

/// Locate one tool.
///
/// # Arguments
///
/// * `kind` - Which executable to look for
/// * `explicit` - Operator-pinned path, if any (CLI flag or config file)
///
/// # Errors
///
/// `ResolveError::ExplicitNotFound` if a pinned path does not name an
/// existing file, `ResolveError::NotFound` if every search step comes up
/// empty.
pub fn resolve_tool(kind: ToolKind, explicit: Option<&Path>) -> Result<ResolvedTool, ResolveError> {
    if let Some(path) = explicit {
        if path.is_file() {
            debug!("{} pinned to {}", kind, path.display());
            return Ok(ResolvedTool {
                path: path.to_path_buf(),
                source: ToolSource::Explicit,
            });
        }
        return Err(ResolveError::ExplicitNotFound {
            tool: kind.display_name(),
            path: path.to_path_buf(),
        });
    }

    if let Some(value) = env::var_os(kind.env_var()) {
        if !value.is_empty() {
            let path = PathBuf::from(&value);
            if path.is_file() {
                debug!("{} found via ${}", kind, kind.env_var());
                return Ok(ResolvedTool {
                    path,
                    source: ToolSource::EnvVar(kind.env_var()),
                });
            }
            warn!(
                "{} is set to {} which does not exist, ignoring it",
                kind.env_var(),
                path.display()
            );
        }
    }

    for path in kind.well_known_paths() {
        if path.is_file() {
            debug!("{} found at well-known location {}", kind, path.display());
            return Ok(ResolvedTool {
                path,
                source: ToolSource::WellKnown,
            });
        }
    }

    if let Some(path_value) = env::var_os("PATH") {
        if let Some(path) = find_in_paths(&kind.search_names(), &path_value) {
            debug!("{} found on PATH at {}", kind, path.display());
            return Ok(ResolvedTool {
                path,
                source: ToolSource::PathLookup,
            });
        }
    }

    Err(ResolveError::NotFound {
        tool: kind.display_name(),
        env_var: kind.env_var(),
        flag: kind.cli_flag(),
    })
}

/// Locate both tools up front so bad installs fail before any file is
/// touched.
pub fn resolve_tools(config: &ToolConfig) -> Result<ResolvedTools, ResolveError> {
    let cloudcompare = resolve_tool(ToolKind::CloudCompare, config.cloudcompare.as_deref())?;
    let poisson_recon = resolve_tool(ToolKind::PoissonRecon, config.poisson_recon.as_deref())?;
    Ok(ResolvedTools {
        cloudcompare,
        poisson_recon,
    })
}

/// Walk a `PATH`-style value and return the first directory entry matching
/// any of `names`, in directory order.
fn find_in_paths(names: &[String], path_value: &OsStr) -> Option<PathBuf> {
    for dir in env::split_paths(path_value) {
        if dir.as_os_str().is_empty() {
            continue;
        }
        for name in names {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}
