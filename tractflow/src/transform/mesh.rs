//! Header-level inspection of polydata files.
//!
//! Only cell counts are read; point and cell payloads are never decoded.

use once_cell::sync::Lazy;
use regex::bytes::Regex;
use std::path::{Path, PathBuf};
use thiserror::Error;

static LEGACY_CELLS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(VERTICES|LINES|POLYGONS|TRIANGLE_STRIPS|CELLS)[ \t]+(\d+)[ \t]+(\d+)[ \t]*\r?$")
        .expect("Invalid regex pattern")
});

static XML_PIECE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<Piece\b([^>]*)>").expect("Invalid regex pattern"));

static XML_CELL_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"NumberOf(?:Verts|Lines|Strips|Polys|Cells)\s*=\s*"(\d+)""#).expect("Invalid regex pattern")
});

const LEGACY_MAGIC: &[u8] = b"# vtk DataFile";
const XML_MAGIC: &[u8] = b"<VTKFile";

/// Mesh file extensions handled by the harden pass.
pub const MESH_EXTENSIONS: [&str; 2] = ["vtk", "vtp"];

/// Errors inspecting a mesh file.
#[derive(Debug, Error)]
pub enum MeshError {
    /// The file could not be read.
    #[error("Failed to read mesh {}: {source}", .path.display())]
    Io {
        /// Mesh path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is neither legacy nor XML VTK.
    #[error("Unrecognized mesh format: {}", .0.display())]
    Unrecognized(PathBuf),
}

/// Returns true if the path has a mesh extension.
#[must_use]
pub fn is_mesh_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| MESH_EXTENSIONS.iter().any(|m| e.eq_ignore_ascii_case(m)))
}

/// Counts the cells of a legacy (`.vtk`) or XML (`.vtp`) polydata file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a VTK file.
pub fn count_cells(path: &Path) -> Result<usize, MeshError> {
    let bytes = std::fs::read(path).map_err(|source| MeshError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    count_cells_in(&bytes).ok_or_else(|| MeshError::Unrecognized(path.to_path_buf()))
}

fn count_cells_in(bytes: &[u8]) -> Option<usize> {
    let head = &bytes[..bytes.len().min(256)];
    if head.starts_with(LEGACY_MAGIC) {
        Some(count_legacy(bytes))
    } else if contains(bytes, XML_MAGIC) {
        count_xml(bytes)
    } else {
        None
    }
}

fn count_legacy(bytes: &[u8]) -> usize {
    let mut seen: Vec<&[u8]> = Vec::new();
    let mut total = 0;

    for caps in LEGACY_CELLS.captures_iter(bytes) {
        let Some(keyword) = caps.get(1).map(|m| m.as_bytes()) else {
            continue;
        };
        if seen.contains(&keyword) {
            continue;
        }
        seen.push(keyword);

        let count = parse_usize(&caps[2]);
        let end = caps.get(0).map_or(bytes.len(), |m| m.end());
        // Version 5.1 headers count offsets, one more than cells.
        let rest = &bytes[end..];
        let rest = &rest[rest.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(rest.len())..];
        total += if rest.starts_with(b"OFFSETS") {
            count.saturating_sub(1)
        } else {
            count
        };
    }
    total
}

fn count_xml(bytes: &[u8]) -> Option<usize> {
    let mut pieces = XML_PIECE.captures_iter(bytes).peekable();
    pieces.peek()?;
    Some(
        pieces
            .flat_map(|piece| {
                let attrs = piece.get(1).map_or(&[][..], |m| m.as_bytes());
                XML_CELL_ATTR
                    .captures_iter(attrs)
                    .map(|c| parse_usize(&c[1]))
                    .collect::<Vec<_>>()
            })
            .sum(),
    )
}

fn parse_usize(digits: &[u8]) -> usize {
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
