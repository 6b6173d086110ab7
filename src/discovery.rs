// incident_ingestor/src/discovery.rs
// Finds the monthly exports under a dataset root and orders them chronologically.

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{IngestorError, Result};

const MONTHS: [&str; 12] = [
    "gennaio",
    "febbraio",
    "marzo",
    "aprile",
    "maggio",
    "giugno",
    "luglio",
    "agosto",
    "settembre",
    "ottobre",
    "novembre",
    "dicembre",
];

/// Month number encoded in a file name such as `csv_incidentiMarzo.csv`.
///
/// Returns 0 for names without a recognizable month, which sorts them first.
pub fn month_order(file_name: &str) -> u32 {
    let Some(start) = file_name.find("csv_incidenti") else {
        return 0;
    };
    let rest = &file_name[start + "csv_incidenti".len()..];
    let Some(end) = rest.find(".csv") else {
        return 0;
    };
    let token = rest[..end].trim().to_lowercase();
    MONTHS
        .iter()
        .position(|m| *m == token)
        .map(|i| i as u32 + 1)
        .unwrap_or(0)
}

/// Lists the exports to load, oldest first.
///
/// A file path is returned as is. A directory is walked for `*.csv` files whose
/// parent directory name is a year; they are ordered by (year, month, name).
pub fn discover_sources(root: &Path) -> Result<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    if !root.is_dir() {
        return Err(IngestorError::ConfigurationError(format!(
            "{} is neither a file nor a directory",
            root.display()
        )));
    }

    let mut found: Vec<(u32, u32, String, PathBuf)> = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy().to_string();
        if !file_name.ends_with(".csv") {
            continue;
        }
        let year = path
            .parent()
            .and_then(Path::file_name)
            .map(|d| d.to_string_lossy())
            .filter(|d| !d.is_empty() && d.chars().all(|c| c.is_ascii_digit()))
            .and_then(|d| d.parse::<u32>().ok());
        match year {
            Some(year) => found.push((year, month_order(&file_name), file_name, path.to_path_buf())),
            None => debug!("Ignoring {}: not inside a year directory", path.display()),
        }
    }

    found.sort();
    info!("Found {} monthly exports under {}", found.len(), root.display());
    Ok(found.into_iter().map(|(_, _, _, path)| path).collect())
}
