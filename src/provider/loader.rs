//! Loading tree documents from a content directory

use crate::error::ContentError;
use crate::tree::DialogueTree;
use std::path::{Path, PathBuf};

/// Outcome of a directory load
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    /// Files that failed to load, with the reason
    pub rejected: Vec<(PathBuf, String)>,
}

/// Read and validate one tree document
pub async fn load_tree_file(path: &Path) -> Result<DialogueTree, ContentError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ContentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    DialogueTree::from_json(&raw)
}

/// Load every `*.json` file in `dir`, in file name order.
///
/// A bad document is logged and skipped; it never stops the rest of the batch.
/// Only failing to list the directory itself is an error.
pub async fn load_directory(dir: &Path) -> Result<(Vec<DialogueTree>, LoadReport), ContentError> {
    let io_err = |source| ContentError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut trees = Vec::with_capacity(paths.len());
    let mut report = LoadReport::default();
    for path in paths {
        match load_tree_file(&path).await {
            Ok(tree) => {
                tracing::debug!(tree_id = %tree.id, path = %path.display(), "Loaded dialogue tree");
                report.loaded.push(tree.id.clone());
                trees.push(tree);
            }
            Err(e) => {
                tracing::error!(
                    path = %path.display(),
                    error = %e,
                    "Skipping invalid dialogue tree"
                );
                report.rejected.push((path, e.to_string()));
            }
        }
    }

    tracing::info!(
        dir = %dir.display(),
        loaded = report.loaded.len(),
        rejected = report.rejected.len(),
        "Dialogue content loaded"
    );
    Ok((trees, report))
}
