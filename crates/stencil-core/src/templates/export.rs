//! Writing a loaded component's files to disk

use crate::component::Component;
use anyhow::{Context, Result};
use std::path::{Component as PathPart, Path};
use tokio::fs;

/// Copy every file of `component` into `target_dir`
///
/// Returns the relative paths written, in bundle order.
pub async fn export_component(component: &Component, target_dir: &Path) -> Result<Vec<String>> {
    // Ensure target directory exists
    fs::create_dir_all(target_dir)
        .await
        .context("Failed to create target directory")?;

    let mut written = Vec::new();

    for (file_path, content) in &component.files {
        if !is_safe_relative(file_path) {
            anyhow::bail!(
                "Refusing to export '{}' from {}: path escapes the target directory",
                file_path,
                component.key
            );
        }

        // Ensure parent directories exist
        let target_path = target_dir.join(file_path);
        if let Some(parent) = target_path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        fs::write(&target_path, content)
            .await
            .with_context(|| format!("Failed to write file: {}", target_path.display()))?;

        written.push(file_path.clone());
    }

    Ok(written)
}

/// Relative paths must stay inside the directory they are joined to
pub(crate) fn is_safe_relative(file_path: &str) -> bool {
    let path = Path::new(file_path);
    !file_path.is_empty()
        && path
            .components()
            .all(|part| matches!(part, PathPart::Normal(_) | PathPart::CurDir))
}
