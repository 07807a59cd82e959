//! Raw enumeration of a template tree
//!
//! An [`AssetCatalog`] is what an asset source hands the scanner: configs
//! available up front, and components that are only described by how to
//! load them.

use crate::component::Loadable;
use crate::templates::manifest::TemplateConfig;
use std::future::Future;

/// Config body as delivered by the source
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigContent {
    /// YAML text, parsed by the scanner
    Raw(String),
    /// Already structured (in-memory sources)
    Parsed(TemplateConfig),
    /// The source listed this config but could not deliver it
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigAsset {
    /// Location relative to the tree root, e.g. `login/desktop/default/template.yaml`
    pub location: String,
    pub content: ConfigContent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComponentAsset {
    /// Location relative to the tree root, e.g. `login/desktop/default/index.vue`
    pub location: String,
    pub loadable: Loadable,
}

/// Everything a source exposes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetCatalog {
    pub configs: Vec<ConfigAsset>,
    pub components: Vec<ComponentAsset>,
}

impl AssetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, location: impl Into<String>, config: TemplateConfig) -> Self {
        self.configs.push(ConfigAsset {
            location: location.into(),
            content: ConfigContent::Parsed(config),
        });
        self
    }

    pub fn with_raw_config(mut self, location: impl Into<String>, yaml: impl Into<String>) -> Self {
        self.configs.push(ConfigAsset {
            location: location.into(),
            content: ConfigContent::Raw(yaml.into()),
        });
        self
    }

    pub fn with_component(mut self, location: impl Into<String>, loadable: Loadable) -> Self {
        self.components.push(ComponentAsset {
            location: location.into(),
            loadable,
        });
        self
    }
}

/// Anything the scanner can enumerate
pub trait AssetSource: Send + Sync + 'static {
    fn enumerate(&self) -> impl Future<Output = anyhow::Result<AssetCatalog>> + Send;
}

impl AssetSource for AssetCatalog {
    async fn enumerate(&self) -> anyhow::Result<AssetCatalog> {
        Ok(self.clone())
    }
}
