//! Composition point for scanner, loader and style tracker
//!
//! Applications construct a [`TemplateKit`] explicitly and pass it around.
//! For environments that want a convenience singleton there is one
//! process-wide default, created from [`DefaultHost`] on first access unless
//! another kit was installed, and torn down with [`reset_default`].

use crate::component::Component;
use crate::error::{Result, TemplateError};
use crate::host::{DefaultHost, HostConfig};
use crate::key::Device;
use crate::loader::{LoadOptions, Loader};
use crate::registry::RegistryCell;
use crate::scanner::{ScanResult, Scanner};
use crate::styles::StyleTracker;
use crate::templates::fetcher::{TemplateFetcher, TemplateSource};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Everything needed to discover, load and style templates from one source
#[derive(Clone)]
pub struct TemplateKit {
    fetcher: Arc<TemplateFetcher>,
    registry: Arc<RegistryCell>,
    scanner: Scanner<TemplateFetcher>,
    loader: Loader<TemplateFetcher>,
    styles: StyleTracker<TemplateFetcher>,
}

impl TemplateKit {
    /// Wire a kit around an explicit source
    pub fn new<C: HostConfig>(config: &C, source: TemplateSource) -> Self {
        let fetcher = Arc::new(
            TemplateFetcher::new(source, config.user_agent())
                .with_component_files(config.component_files()),
        );
        let registry = Arc::new(RegistryCell::default());
        let scanner = Scanner::new(
            Arc::clone(&fetcher),
            Arc::clone(&registry),
            config.library_version(),
        );
        let loader = Loader::new(Arc::clone(&registry), Arc::clone(&fetcher))
            .with_max_cached(config.max_cached());
        let styles = StyleTracker::new(Arc::clone(&fetcher), Arc::clone(&registry));
        Self {
            fetcher,
            registry,
            scanner,
            loader,
            styles,
        }
    }

    /// Wire a kit using the host's configured source
    pub fn from_config<C: HostConfig>(config: &C) -> anyhow::Result<Self> {
        let source = TemplateSource::from_config(config)?;
        Ok(Self::new(config, source))
    }

    pub fn scanner(&self) -> &Scanner<TemplateFetcher> {
        &self.scanner
    }

    pub fn loader(&self) -> &Loader<TemplateFetcher> {
        &self.loader
    }

    pub fn styles(&self) -> &StyleTracker<TemplateFetcher> {
        &self.styles
    }

    pub fn registry(&self) -> &Arc<RegistryCell> {
        &self.registry
    }

    pub fn source(&self) -> &TemplateSource {
        self.fetcher.source()
    }
}

static DEFAULT_KIT: RwLock<Option<Arc<TemplateKit>>> = RwLock::new(None);

/// Install `kit` as the process-wide default, replacing any previous one
pub fn install_default(kit: TemplateKit) -> Arc<TemplateKit> {
    let kit = Arc::new(kit);
    *DEFAULT_KIT.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&kit));
    kit
}

/// The process-wide default kit, created from [`DefaultHost`] on first access
pub fn default_kit() -> Result<Arc<TemplateKit>> {
    if let Some(kit) = DEFAULT_KIT.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
        return Ok(Arc::clone(kit));
    }

    let mut slot = DEFAULT_KIT.write().unwrap_or_else(PoisonError::into_inner);
    if let Some(kit) = slot.as_ref() {
        return Ok(Arc::clone(kit));
    }
    let kit = TemplateKit::from_config(&DefaultHost)
        .map(Arc::new)
        .map_err(|e| TemplateError::source_unavailable(&e))?;
    debug!("Created default template kit for {:?}", kit.source());
    *slot = Some(Arc::clone(&kit));
    Ok(kit)
}

/// Drop the process-wide default; the next access creates a fresh one
pub fn reset_default() {
    DEFAULT_KIT
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
}

pub fn get_scanner() -> Result<Scanner<TemplateFetcher>> {
    Ok(default_kit()?.scanner().clone())
}

pub fn get_loader() -> Result<Loader<TemplateFetcher>> {
    Ok(default_kit()?.loader().clone())
}

/// Scan the default kit's source
pub async fn scan_templates() -> Result<ScanResult> {
    let scanner = get_scanner()?;
    scanner.scan().await
}

pub async fn load_template(
    category: &str,
    device: Device,
    name: &str,
    options: LoadOptions,
) -> Result<Arc<Component>> {
    let loader = get_loader()?;
    loader.load(category, device, name, options).await
}

pub async fn preload_template(category: &str, device: Device, name: &str) -> Result<()> {
    let loader = get_loader()?;
    loader.preload(category, device, name).await
}
