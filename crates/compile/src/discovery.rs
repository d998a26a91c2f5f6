//! Finding build units below a root directory.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// A directory holding one independently compiled builder definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BuildUnit {
    pub source_path: PathBuf,
    /// Stem of the artifact file, unique per discovery root.
    pub artifact_name: String,
}

impl BuildUnit {
    /// Derives the artifact name from `source_path` relative to `root`:
    /// `root/team/db` becomes `team_db`, `root` itself its own directory name.
    pub fn new(root: &Path, source_path: impl Into<PathBuf>) -> Self {
        let source_path = source_path.into();
        let rel = source_path.strip_prefix(root).unwrap_or(&source_path);
        let parts: Vec<String> = rel.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect();
        let artifact_name = if parts.is_empty() { dir_name(root) } else { parts.join("_") };
        Self { source_path, artifact_name }
    }

    /// `<artifact_name>.<platform library extension>`
    pub fn artifact_file_name(&self) -> String { format!("{}.{}", self.artifact_name, std::env::consts::DLL_EXTENSION) }
}

fn dir_name(root: &Path) -> String {
    root.canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "root".to_string())
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("cannot walk {}", root.display())]
    Walk { root: PathBuf, #[source] source: walkdir::Error },
}

fn is_hidden(entry: &DirEntry) -> bool { entry.file_name().to_str().map_or(false, |s| s.starts_with('.')) }

/// Every directory below `root` (inclusive) that directly contains `marker`,
/// sorted by path. Hidden directories and directories whose path relative to
/// `root` starts with an `exclude` prefix are pruned.
pub fn discover(root: &Path, marker: &str, exclude: &[PathBuf]) -> Result<Vec<BuildUnit>, DiscoveryError> {
    let walker = WalkDir::new(root).sort_by_file_name().into_iter().filter_entry(|entry| {
        if !entry.file_type().is_dir() { return false; }
        if entry.depth() == 0 { return true; }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        !is_hidden(entry) && !exclude.iter().any(|prefix| rel.starts_with(prefix))
    });

    let mut units = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|source| DiscoveryError::Walk { root: root.to_path_buf(), source })?;
        if entry.path().join(marker).is_file() {
            let unit = BuildUnit::new(root, entry.path());
            debug!(path = %unit.source_path.display(), artifact = %unit.artifact_name, "found build unit");
            units.push(unit);
        }
    }
    units.sort_by(|a, b| a.source_path.cmp(&b.source_path));
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_names_join_relative_components() {
        let root = Path::new("compositions");
        assert_eq!(BuildUnit::new(root, "compositions/example").artifact_name, "example");
        assert_eq!(BuildUnit::new(root, "compositions/team/db").artifact_name, "team_db");
        let unit = BuildUnit::new(root, "compositions/example");
        assert_eq!(unit.artifact_file_name(), format!("example.{}", std::env::consts::DLL_EXTENSION));
    }
}
