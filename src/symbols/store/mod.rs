
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use itertools::Itertools;
use tracing::debug;

use super::Symbol;

/// Write the symbol table as pretty-printed JSON.
///
/// The table is written to a sibling temp file and renamed into place, so a
/// reader never sees a partially written file.
#[inline]
pub fn save_symbols(symbols: &[Symbol], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(symbols).context("Failed to serialize symbols")?;
    let temp_path = temp_path_for(path);
    fs::write(&temp_path, json)
        .with_context(|| format!("Failed to write {}", temp_path.display()))?;
    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to move symbol table to {}", path.display()))?;

    debug!("Saved {} symbols to {}", symbols.len(), path.display());
    Ok(())
}

/// Load the symbol table; a missing file is an empty table
#[inline]
pub fn load_symbols(path: &Path) -> Result<Vec<Symbol>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse symbol table {}", path.display()))
}

/// Top-level modules, i.e. the distinct first path segments, sorted
#[inline]
pub fn list_modules(symbols: &[Symbol]) -> Vec<String> {
    symbols
        .iter()
        .map(|symbol| module_of(&symbol.path).to_string())
        .sorted()
        .dedup()
        .collect()
}

/// Symbols whose first path segment is exactly `module`, in table order
#[inline]
pub fn list_symbols<'a>(symbols: &'a [Symbol], module: &str) -> Vec<&'a Symbol> {
    symbols
        .iter()
        .filter(|symbol| module_of(&symbol.path) == module)
        .collect()
}

#[inline]
pub fn module_of(path: &str) -> &str {
    path.split('/').next().unwrap_or(path)
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
