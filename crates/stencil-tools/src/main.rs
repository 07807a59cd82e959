//! stencil - inspect, preload and publish template trees

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use stencil_core::tui::BrowseArgs;
use stencil_core::{
    export_component, DefaultHost, Device, LoadOptions, RegistryEntry, ScanResult, TemplateKit,
    TemplateQuery, TemplateSource,
};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "stencil")]
#[command(about = "Inspect, preload and publish UI template trees")]
#[command(version)]
pub struct Args {
    /// Local directory to use for templates instead of fetching from remote
    #[arg(long = "template-dir", global = true)]
    pub template_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan the template tree and report problems
    Scan,
    /// List registered templates
    List(FilterArgs),
    /// Show one template's metadata (the group default when no name is given)
    Show(ShowArgs),
    /// Load matching templates into the cache and report failures
    Preload(FilterArgs),
    /// Load a template and write its files to a directory
    Export(ExportArgs),
    /// Build zip files for all templates in the template directory (for development use)
    BuildZips,
    /// Browse templates interactively
    Browse(CliBrowseArgs),
}

#[derive(Parser, Debug)]
pub struct FilterArgs {
    #[arg(short, long)]
    pub category: Option<String>,

    #[arg(short, long)]
    pub device: Option<Device>,

    #[arg(short, long)]
    pub tag: Option<String>,

    #[arg(short, long)]
    pub name: Option<String>,
}

impl FilterArgs {
    fn query(&self) -> TemplateQuery {
        let mut query = TemplateQuery::new();
        if let Some(category) = &self.category {
            query = query.category(category);
        }
        if let Some(device) = self.device {
            query = query.device(device);
        }
        if let Some(tag) = &self.tag {
            query = query.tag(tag);
        }
        if let Some(name) = &self.name {
            query = query.name(name);
        }
        query
    }
}

#[derive(Parser, Debug)]
pub struct ShowArgs {
    pub category: String,

    pub device: Device,

    pub name: Option<String>,
}

#[derive(Parser, Debug)]
pub struct ExportArgs {
    pub category: String,

    pub device: Device,

    pub name: String,

    /// Directory to write the template files into
    #[arg(short = 'o', long)]
    pub dir: PathBuf,
}

#[derive(Parser, Debug)]
pub struct CliBrowseArgs {
    #[arg(short, long)]
    pub category: Option<String>,

    #[arg(short, long)]
    pub device: Option<Device>,

    /// Template name to open directly
    #[arg(short, long)]
    pub template: Option<String>,

    /// Directory to export the chosen template into
    #[arg(short, long)]
    pub export_dir: Option<PathBuf>,

    /// Auto-confirm all prompts (non-interactive mode)
    #[arg(short, long)]
    pub yes: bool,
}

impl CliBrowseArgs {
    fn into_browse_args(self, template_dir: Option<PathBuf>) -> BrowseArgs {
        BrowseArgs {
            template_dir,
            category: self.category,
            device: self.device,
            template: self.template,
            export_dir: self.export_dir,
            yes: self.yes,
        }
    }
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("stencil_core=debug,stencil=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stencil_core=warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn kit(config: &DefaultHost, template_dir: &Option<PathBuf>) -> Result<TemplateKit> {
    match template_dir {
        Some(dir) => Ok(TemplateKit::new(config, TemplateSource::local(dir.clone()))),
        None => TemplateKit::from_config(config),
    }
}

async fn scan(kit: &TemplateKit) -> Result<ScanResult> {
    let scan = kit.scanner().scan().await?;
    for warning in &scan.warnings {
        eprintln!("{} {}", "Warning:".yellow(), warning);
    }
    for error in &scan.errors {
        eprintln!("{} {}", "Error:".red(), error);
    }
    Ok(scan)
}

fn print_entry(entry: &RegistryEntry) {
    let marker = if entry.metadata.is_default {
        " (default)".green().to_string()
    } else {
        String::new()
    };
    println!(
        "  {} {}{} {}",
        "->".blue(),
        entry.key.to_string().bold(),
        marker,
        entry.metadata.description.dimmed()
    );
}

fn print_details(entry: &RegistryEntry) {
    let metadata = &entry.metadata;
    println!("{}", metadata.display_name.cyan().bold());
    println!("  key:       {}", entry.key);
    println!("  version:   {}", metadata.version);
    if !metadata.description.is_empty() {
        println!("  about:     {}", metadata.description);
    }
    if !metadata.author.is_empty() {
        println!("  author:    {}", metadata.author);
    }
    if !metadata.tags.is_empty() {
        let tags: Vec<&str> = metadata.tags.iter().map(String::as_str).collect();
        println!("  tags:      {}", tags.join(", "));
    }
    for (name, slot) in &metadata.slots {
        let required = if slot.required { " (required)" } else { "" };
        println!("  slot:      {}{}", name, required);
    }
    if let Some(style) = &metadata.style {
        println!("  style:     {}", style);
    }
    if let Some(preview) = &metadata.preview {
        println!("  preview:   {}", preview);
    }
    println!("  config:    {}", entry.config_location);
    println!("  component: {}", entry.component_location);
}

async fn run(config: &DefaultHost, args: Args) -> Result<()> {
    match args.command {
        Some(Command::Scan) => {
            let kit = kit(config, &args.template_dir)?;
            let scan = scan(&kit).await?;
            println!(
                "{} {} template(s), {} warning(s), {} error(s)",
                "Scanned".green().bold(),
                scan.registry.len(),
                scan.warnings.len(),
                scan.errors.len()
            );
            if !scan.errors.is_empty() {
                anyhow::bail!("Template tree has {} error(s)", scan.errors.len());
            }
            Ok(())
        }
        Some(Command::List(filter)) => {
            let kit = kit(config, &args.template_dir)?;
            let scan = scan(&kit).await?;
            let entries = scan.registry.query(&filter.query());
            if entries.is_empty() {
                println!("No templates match.");
            }
            for entry in &entries {
                print_entry(entry);
            }
            Ok(())
        }
        Some(Command::Show(show)) => {
            let kit = kit(config, &args.template_dir)?;
            let scan = scan(&kit).await?;
            let entry = match &show.name {
                Some(name) => kit
                    .scanner()
                    .get_template(&show.category, show.device, name)
                    .ok_or_else(|| {
                        anyhow::anyhow!(
                            "Template '{}' not found in {}:{}",
                            name,
                            show.category,
                            show.device
                        )
                    })?,
                None => scan
                    .registry
                    .resolve_default(&show.category, show.device)
                    .ok_or_else(|| {
                        anyhow::anyhow!("No templates for {}:{}", show.category, show.device)
                    })?,
            };
            print_details(&entry);
            Ok(())
        }
        Some(Command::Preload(filter)) => {
            let kit = kit(config, &args.template_dir)?;
            scan(&kit).await?;
            let report = kit.loader().preload_by_filter(&filter.query()).await?;
            for key in &report.loaded {
                println!("  {} {}", "loaded".green(), key);
            }
            for failure in &report.failures {
                println!("  {} {}: {}", "failed".red(), failure.key, failure.error);
            }
            println!(
                "{} {} of {} template(s)",
                "Preloaded".green().bold(),
                report.loaded.len(),
                report.loaded.len() + report.failures.len()
            );
            Ok(())
        }
        Some(Command::Export(export)) => {
            let kit = kit(config, &args.template_dir)?;
            scan(&kit).await?;
            let component = kit
                .loader()
                .load(&export.category, export.device, &export.name, LoadOptions::default())
                .await?;
            let written = export_component(&component, &export.dir).await?;
            for file in &written {
                println!("  {} {}", "->".blue(), file);
            }
            println!(
                "{} {} file(s) to {}",
                "Exported".green().bold(),
                written.len(),
                export.dir.display()
            );
            Ok(())
        }
        Some(Command::BuildZips) => {
            stencil_core::templates::build_zips(config, &args.template_dir)
                .await
                .map(|_| ())
        }
        Some(Command::Browse(browse_args)) => {
            let result =
                stencil_core::browse(config, browse_args.into_browse_args(args.template_dir)).await;

            // Ensure cursor is visible on normal exit
            let _ = console::Term::stderr().show_cursor();

            result
        }
        None => {
            // No subcommand provided, default to the interactive browser
            let browse_args = BrowseArgs {
                template_dir: args.template_dir,
                ..BrowseArgs::default()
            };
            let result = stencil_core::browse(config, browse_args).await;

            let _ = console::Term::stderr().show_cursor();

            result
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Ensure terminal cursor is restored on panic
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = console::Term::stderr().show_cursor();
        default_panic(info);
    }));

    // Handle Ctrl+C gracefully
    ctrlc::set_handler(move || {
        let _ = console::Term::stderr().show_cursor();
        std::process::exit(130);
    })
    .ok();

    let args = Args::parse();
    init_tracing(args.debug);
    tracing::debug!("stencil starting with args: {:?}", args);

    run(&DefaultHost, args).await
}
