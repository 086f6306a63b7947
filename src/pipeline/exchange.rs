//! Header probe for the intermediate PLY exchange files.
//!
//! The two external tools hand results to each other through PLY files in
//! a scoped temp directory. Only the ASCII header is ever read here: it
//! carries everything the pipeline needs (vertex count, face count, color
//! presence) without touching the payload, which is usually binary.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use thiserror::Error;

// PLY headers are a few hundred bytes of text; cap the scan so a corrupt
// payload can never be slurped whole.
const MAX_HEADER_BYTES: u64 = 64 * 1024;

/// Errors that can occur while probing an exchange file.
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid PLY file: {0}")]
    InvalidPly(String),
}

/// Result type for exchange-file operations.
pub type Result<T> = std::result::Result<T, ExchangeError>;

/// Summary of a PLY file's header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlyInfo {
    pub vertex_count: usize,
    pub face_count: usize,
    pub has_colors: bool,
}

/// Probe a PLY file for vertex count, face count and per-vertex colors.
///
/// # Arguments
///
/// * `path` - Path to the PLY file
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not PLY, or its header
/// is truncated or malformed.
pub fn probe_ply<P: AsRef<Path>>(path: P) -> Result<PlyInfo> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let reader = BufReader::new(file).take(MAX_HEADER_BYTES);
    let mut lines = reader.lines();

    // Check PLY magic number
    let first_line = lines
        .next()
        .ok_or_else(|| ExchangeError::InvalidPly("empty file".to_string()))??;
    if first_line.trim() != "ply" {
        return Err(ExchangeError::InvalidPly(format!(
            "{} is not a PLY file",
            path.display()
        )));
    }

    let mut vertex_count: Option<usize> = None;
    let mut face_count: usize = 0;
    let mut in_vertex_element = false;
    let mut has_red = false;
    let mut has_green = false;
    let mut has_blue = false;
    let mut header_done = false;

    for line in &mut lines {
        let line = line?;
        let stripped = line.trim();

        if let Some(rest) = stripped.strip_prefix("element ") {
            let parts: Vec<&str> = rest.split_whitespace().collect();
            in_vertex_element = parts.first() == Some(&"vertex");

            if let (Some(name), Some(count_str)) = (parts.first(), parts.get(1)) {
                let count: usize = count_str.parse().map_err(|_| {
                    ExchangeError::InvalidPly(format!("bad element count: {}", stripped))
                })?;
                match *name {
                    "vertex" => vertex_count = Some(count),
                    "face" => face_count = count,
                    _ => {}
                }
            }
        } else if stripped.starts_with("property") && in_vertex_element {
            // Colors only matter on the vertex element
            match stripped.split_whitespace().last() {
                Some("red") => has_red = true,
                Some("green") => has_green = true,
                Some("blue") => has_blue = true,
                _ => {}
            }
        } else if stripped == "end_header" {
            header_done = true;
            break;
        }
    }

    if !header_done {
        return Err(ExchangeError::InvalidPly("missing end_header".to_string()));
    }

    let vertex_count = vertex_count
        .ok_or_else(|| ExchangeError::InvalidPly("no vertex element in header".to_string()))?;

    Ok(PlyInfo {
        vertex_count,
        face_count,
        has_colors: has_red && has_green && has_blue,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_cloud_header(colors: bool) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "ply").unwrap();
        writeln!(file, "format binary_little_endian 1.0").unwrap();
        writeln!(file, "element vertex 1234").unwrap();
        writeln!(file, "property float x").unwrap();
        writeln!(file, "property float y").unwrap();
        writeln!(file, "property float z").unwrap();
        if colors {
            writeln!(file, "property uchar red").unwrap();
            writeln!(file, "property uchar green").unwrap();
            writeln!(file, "property uchar blue").unwrap();
        }
        writeln!(file, "end_header").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_probe_cloud_with_colors() {
        let file = write_cloud_header(true);
        let info = probe_ply(file.path()).unwrap();
        assert_eq!(info.vertex_count, 1234);
        assert_eq!(info.face_count, 0);
        assert!(info.has_colors);
    }

    #[test]
    fn test_probe_cloud_without_colors() {
        let file = write_cloud_header(false);
        let info = probe_ply(file.path()).unwrap();
        assert!(!info.has_colors);
    }

    #[test]
    fn test_probe_mesh_counts_faces() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "ply").unwrap();
        writeln!(file, "format ascii 1.0").unwrap();
        writeln!(file, "element vertex 8").unwrap();
        writeln!(file, "property float x").unwrap();
        writeln!(file, "property float y").unwrap();
        writeln!(file, "property float z").unwrap();
        writeln!(file, "element face 12").unwrap();
        writeln!(file, "property list uchar int vertex_indices").unwrap();
        writeln!(file, "end_header").unwrap();
        file.flush().unwrap();

        let info = probe_ply(file.path()).unwrap();
        assert_eq!(info.vertex_count, 8);
        assert_eq!(info.face_count, 12);
        assert!(!info.has_colors);
    }

    #[test]
    fn test_probe_ignores_binary_payload() {
        let mut file = write_cloud_header(true);
        // Arbitrary non-UTF8 bytes after the header
        file.write_all(&[0xff, 0xfe, 0x00, 0x7f, 0xc3, 0x28]).unwrap();
        file.flush().unwrap();

        let info = probe_ply(file.path()).unwrap();
        assert_eq!(info.vertex_count, 1234);
    }

    #[test]
    fn test_probe_rejects_non_ply() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "solid ascii").unwrap();
        file.flush().unwrap();

        assert!(matches!(
            probe_ply(file.path()),
            Err(ExchangeError::InvalidPly(_))
        ));
    }

    #[test]
    fn test_probe_rejects_truncated_header() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "ply").unwrap();
        writeln!(file, "element vertex 10").unwrap();
        file.flush().unwrap();

        assert!(matches!(
            probe_ply(file.path()),
            Err(ExchangeError::InvalidPly(_))
        ));
    }

    #[test]
    fn test_probe_requires_vertex_element() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "ply").unwrap();
        writeln!(file, "format ascii 1.0").unwrap();
        writeln!(file, "end_header").unwrap();
        file.flush().unwrap();

        assert!(matches!(
            probe_ply(file.path()),
            Err(ExchangeError::InvalidPly(_))
        ));
    }

    #[test]
    fn test_face_properties_are_not_colors() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "ply").unwrap();
        writeln!(file, "format ascii 1.0").unwrap();
        writeln!(file, "element vertex 4").unwrap();
        writeln!(file, "property float x").unwrap();
        writeln!(file, "property float y").unwrap();
        writeln!(file, "property float z").unwrap();
        writeln!(file, "element face 2").unwrap();
        writeln!(file, "property uchar red").unwrap();
        writeln!(file, "property uchar green").unwrap();
        writeln!(file, "property uchar blue").unwrap();
        writeln!(file, "end_header").unwrap();
        file.flush().unwrap();

        let info = probe_ply(file.path()).unwrap();
        assert!(!info.has_colors);
    }
}
