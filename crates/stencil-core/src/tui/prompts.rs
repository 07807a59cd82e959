//! Charm-style template browser using cliclack

use crate::component::Component;
use crate::host::HostConfig;
use crate::key::Device;
use crate::kit::TemplateKit;
use crate::loader::LoadOptions;
use crate::registry::{Registry, RegistryEntry};
use crate::scanner::ScanResult;
use crate::templates::export::export_component;
use crate::templates::fetcher::TemplateSource;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

/// CLI arguments for the browse command
#[derive(Debug, Clone, Default)]
pub struct BrowseArgs {
    /// Local directory to use for templates instead of fetching from remote
    pub template_dir: Option<PathBuf>,

    /// Category to open directly
    pub category: Option<String>,

    /// Device to open directly
    pub device: Option<Device>,

    /// Template name to open directly (defaults to the group's default)
    pub template: Option<String>,

    /// Directory to export the loaded template into
    pub export_dir: Option<PathBuf>,

    /// Auto-confirm all prompts (non-interactive mode)
    pub yes: bool,
}

/// Run the interactive browser
pub async fn browse<C: HostConfig>(config: &C, args: BrowseArgs) -> Result<()> {
    cliclack::intro(config.display_name())?;

    // Step 1: Setup kit
    let kit = setup_kit(config, &args.template_dir)?;

    // Step 2: Scan
    let scan = scan_templates(&kit).await?;
    let registry = Arc::clone(&scan.registry);

    // Step 3: Narrow down to one template
    let category = select_category(&registry, args.category.as_deref())?;
    let device = select_device(&registry, &category, args.device)?;
    let entry = select_template(&registry, &category, device, args.template.as_deref())?;
    show_metadata(&entry)?;

    // Step 4: Load
    let load = args.yes
        || cliclack::confirm("Load this template?")
            .initial_value(true)
            .interact()?;
    if !load {
        cliclack::outro("Nothing loaded.")?;
        return Ok(());
    }
    let component = load_component(&kit, &entry).await?;

    // Step 5: Follow-up actions
    run_actions(&kit, &entry, &component, &args).await?;

    cliclack::outro(format!(
        "{} template(s) cached",
        kit.loader().loaded_count()
    ))?;

    Ok(())
}

fn setup_kit<C: HostConfig>(config: &C, template_dir: &Option<PathBuf>) -> Result<TemplateKit> {
    let kit = match template_dir {
        Some(path) => {
            cliclack::log::info(format!("Using local templates from {}", path.display()))?;
            TemplateKit::new(config, TemplateSource::local(path.clone()))
        }
        None => {
            let kit = TemplateKit::from_config(config)?;
            match kit.source() {
                TemplateSource::Local(path) => {
                    cliclack::log::info(format!("Using local templates from {}", path.display()))?
                }
                TemplateSource::Remote(url) => {
                    cliclack::log::info(format!("Using remote templates from {}", url))?
                }
            }
            kit
        }
    };

    Ok(kit)
}

async fn scan_templates(kit: &TemplateKit) -> Result<ScanResult> {
    let spinner = cliclack::spinner();
    spinner.start("Scanning templates...");

    let scan = match kit.scanner().scan().await {
        Ok(scan) => scan,
        Err(e) => {
            spinner.stop("Failed to scan templates");
            return Err(e.into());
        }
    };

    spinner.stop(format!("Found {} templates", scan.registry.len()));

    for warning in &scan.warnings {
        cliclack::log::warning(warning.to_string())?;
    }
    for error in &scan.errors {
        cliclack::log::error(error.to_string())?;
    }

    if scan.registry.is_empty() {
        anyhow::bail!("No templates found.");
    }

    Ok(scan)
}

fn select_category(registry: &Registry, specified: Option<&str>) -> Result<String> {
    let categories = registry.categories();

    if let Some(category) = specified {
        if !categories.iter().any(|c| c == category) {
            anyhow::bail!(
                "Category '{}' not found. Available categories: {}",
                category,
                categories.join(", ")
            );
        }
        return Ok(category.to_string());
    }

    if let [only] = categories.as_slice() {
        cliclack::log::info(format!("Using category: {}", only))?;
        return Ok(only.clone());
    }

    let mut select = cliclack::select("Select a category");
    for category in &categories {
        let count = registry.iter().filter(|e| e.key.category() == category).count();
        select = select.item(category.clone(), category, format!("{} templates", count));
    }
    Ok(select.interact()?)
}

fn select_device(registry: &Registry, category: &str, specified: Option<Device>) -> Result<Device> {
    let devices = registry.devices(category);

    if let Some(device) = specified {
        if !devices.contains(&device) {
            anyhow::bail!("No {} templates for {}", device, category);
        }
        return Ok(device);
    }

    if let [only] = devices.as_slice() {
        cliclack::log::info(format!("Using device: {}", only))?;
        return Ok(*only);
    }

    let mut select = cliclack::select("Select a device");
    for device in &devices {
        let count = registry.group(category, *device).len();
        select = select.item(*device, device.as_str(), format!("{} templates", count));
    }
    Ok(select.interact()?)
}

fn select_template(
    registry: &Registry,
    category: &str,
    device: Device,
    specified: Option<&str>,
) -> Result<Arc<RegistryEntry>> {
    let group = registry.group(category, device);

    if let Some(name) = specified {
        return group
            .into_iter()
            .find(|e| e.key.name() == name)
            .ok_or_else(|| anyhow::anyhow!("Template '{}' not found in {}:{}", name, category, device));
    }

    let default = registry
        .resolve_default(category, device)
        .ok_or_else(|| anyhow::anyhow!("No templates for {}:{}", category, device))?;

    if group.len() == 1 {
        cliclack::log::info(format!(
            "Using template: {} - {}",
            default.metadata.display_name, default.metadata.description
        ))?;
        return Ok(default);
    }

    // Use indices to avoid borrow issues
    let mut select = cliclack::select("Select a template").initial_value(
        group
            .iter()
            .position(|e| e.key == default.key)
            .unwrap_or(0),
    );
    for (idx, entry) in group.iter().enumerate() {
        let label = if entry.key == default.key {
            format!("{} (default)", entry.metadata.display_name)
        } else {
            entry.metadata.display_name.clone()
        };
        select = select.item(idx, label, &entry.metadata.description);
    }
    let selected_idx: usize = select.interact()?;

    group
        .into_iter()
        .nth(selected_idx)
        .ok_or_else(|| anyhow::anyhow!("Invalid selection"))
}

fn show_metadata(entry: &RegistryEntry) -> Result<()> {
    let metadata = &entry.metadata;
    let mut lines = vec![
        format!("Key:      {}", entry.key),
        format!("Version:  {}", metadata.version),
    ];
    if !metadata.author.is_empty() {
        lines.push(format!("Author:   {}", metadata.author));
    }
    if !metadata.tags.is_empty() {
        let tags: Vec<&str> = metadata.tags.iter().map(String::as_str).collect();
        lines.push(format!("Tags:     {}", tags.join(", ")));
    }
    if !metadata.slots.is_empty() {
        let slots: Vec<String> = metadata
            .slots
            .iter()
            .map(|(name, slot)| {
                if slot.required {
                    format!("{}*", name)
                } else {
                    name.clone()
                }
            })
            .collect();
        lines.push(format!("Slots:    {}", slots.join(", ")));
    }
    cliclack::note(&metadata.display_name, lines.join("\n"))?;
    Ok(())
}

async fn load_component(kit: &TemplateKit, entry: &RegistryEntry) -> Result<Arc<Component>> {
    let spinner = cliclack::spinner();
    spinner.start("Loading template...");

    match kit.loader().load_key(&entry.key, LoadOptions::default()).await {
        Ok(component) => {
            spinner.stop(format!(
                "Loaded {} ({} files, {} bytes)",
                entry.key,
                component.files.len(),
                component.total_bytes()
            ));
            match kit.styles().load_component_style(&entry.key).await {
                Ok(Some(id)) => cliclack::log::info(format!("Style loaded: {}", id))?,
                Ok(None) => {}
                Err(e) => cliclack::log::warning(format!("{}", e))?,
            }
            Ok(component)
        }
        Err(e) => {
            spinner.stop("Failed to load template");
            Err(e.into())
        }
    }
}

async fn run_actions(
    kit: &TemplateKit,
    entry: &RegistryEntry,
    component: &Component,
    args: &BrowseArgs,
) -> Result<()> {
    // Non-interactive: export if asked, nothing else
    if args.yes {
        if let Some(dir) = &args.export_dir {
            export_to(component, dir).await?;
        }
        return Ok(());
    }

    let preview = preview_path(kit, entry);

    loop {
        let mut select = cliclack::select("What would you like to do?")
            .item("export", "Export files to a directory", "");
        if let Some(path) = &preview {
            select = select.item("preview", "Open preview", path.display().to_string());
        }
        let action: &str = select.item("done", "Done", "").interact()?;

        match action {
            "export" => {
                let dir = match &args.export_dir {
                    Some(dir) => dir.clone(),
                    None => {
                        let input: String = cliclack::input("Export directory")
                            .placeholder(entry.key.name())
                            .default_input(entry.key.name())
                            .interact()?;
                        PathBuf::from(input)
                    }
                };
                export_to(component, &dir).await?;
            }
            "preview" => {
                if let Some(path) = &preview {
                    if let Err(e) = open::that(path) {
                        cliclack::log::error(format!("Failed to open {}: {}", path.display(), e))?;
                    }
                }
            }
            _ => return Ok(()),
        }
    }
}

/// Previews can only be opened for local trees
fn preview_path(kit: &TemplateKit, entry: &RegistryEntry) -> Option<PathBuf> {
    let preview = entry.metadata.preview.as_ref()?;
    match kit.source() {
        TemplateSource::Local(root) => {
            let path = root.join(entry.key.relative_dir()).join(preview);
            path.exists().then_some(path)
        }
        TemplateSource::Remote(_) => None,
    }
}

async fn export_to(component: &Component, dir: &PathBuf) -> Result<()> {
    let spinner = cliclack::spinner();
    spinner.start("Exporting files...");
    let written = export_component(component, dir).await?;
    spinner.stop(format!("Exported {} files to {}", written.len(), dir.display()));
    Ok(())
}
