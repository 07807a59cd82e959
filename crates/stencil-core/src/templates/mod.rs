//! Template sources, configs and bundles
//!
//! This module provides:
//! - Template config types (TemplateConfig, RootManifest)
//! - Asset catalogs and the AssetSource trait the scanner consumes
//! - Fetching from remote URLs or local directories, zip bundling
//! - Exporting loaded components
//! - Version compatibility checking

pub mod catalog;
pub mod export;
pub mod fetcher;
pub mod manifest;
pub mod version;

use crate::component::Loadable;
use crate::host::HostConfig;
use crate::scanner::Scanner;
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};

pub use catalog::{AssetCatalog, AssetSource, ComponentAsset, ConfigAsset, ConfigContent};
pub use export::export_component;
pub use fetcher::{TemplateFetcher, TemplateSource};
pub use manifest::{RootManifest, SlotDescriptor, TemplateConfig, CONFIG_FILE};
pub use version::check_compatibility;

/// Publish a local template tree: one zip per template plus a root manifest
///
/// Only templates that pair cleanly are published. Returns the number of
/// bundles written.
pub async fn build_zips<C: HostConfig>(config: &C, template_dir: &Option<PathBuf>) -> Result<usize> {
    let dir = template_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("templates"));

    if !dir.exists() {
        anyhow::bail!("Template directory not found: {}", dir.display());
    }

    let fetcher = TemplateFetcher::from_local(dir.clone(), config.user_agent())
        .with_component_files(config.component_files());
    let catalog = fetcher.enumerate().await?;
    let scan = Scanner::<TemplateFetcher>::build(catalog, config.library_version());

    println!(
        "{}",
        format!("Building {} template zips...", config.display_name())
            .cyan()
            .bold()
    );
    println!();

    for warning in &scan.warnings {
        eprintln!("{} {}", "Warning:".yellow(), warning);
    }
    for error in &scan.errors {
        eprintln!("{} {}", "Error:".red(), error);
    }

    let mut manifest = RootManifest::default();
    let mut built = 0;
    for entry in scan.registry.iter() {
        let Loadable::Local { dir: template_path, .. } = &entry.metadata.loadable else {
            continue;
        };

        print!("  {} {}...", "->".blue(), entry.key);

        match TemplateFetcher::build_local_zip(template_path, entry.key.name()) {
            Ok(zip_bytes) => {
                let zip_path = zip_path(&dir, &entry.key.relative_dir());
                std::fs::write(&zip_path, &zip_bytes)
                    .with_context(|| format!("Failed to write {}", zip_path.display()))?;
                println!(" {} ({} bytes)", "done".green(), zip_bytes.len());
                manifest.configs.push(entry.config_location.clone());
                manifest.components.push(entry.component_location.clone());
                built += 1;
            }
            Err(e) => {
                println!(" {}", "failed".red());
                eprintln!("    Error: {}", e);
            }
        }
    }

    let manifest_path = dir.join(CONFIG_FILE);
    let manifest_content =
        serde_yaml::to_string(&manifest).context("Failed to serialize root manifest")?;
    std::fs::write(&manifest_path, manifest_content)
        .with_context(|| format!("Failed to write {}", manifest_path.display()))?;

    println!();
    println!(
        "{} {} template zip(s) in {}",
        "Built".green().bold(),
        built,
        dir.display()
    );

    Ok(built)
}

fn zip_path(root: &Path, relative_dir: &str) -> PathBuf {
    root.join(format!("{}.zip", relative_dir))
}
