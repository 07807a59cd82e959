//! Template config types and parsing

use crate::component::Loadable;
use crate::registry::TemplateMetadata;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// File name of a per-template config and of the root manifest
pub const CONFIG_FILE: &str = "template.yaml";

/// Component entry modules recognised in a template directory, in order of preference
pub const DEFAULT_COMPONENT_FILES: &[&str] = &[
    "index.vue",
    "index.tsx",
    "index.jsx",
    "index.ts",
    "index.js",
    "index.html",
];

/// A named insertion point a template exposes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDescriptor {
    /// Consumers must fill this slot
    #[serde(default)]
    pub required: bool,

    /// Props the slot passes to its content
    #[serde(default)]
    pub props: BTreeSet<String>,
}

/// Per-template config (`<category>/<device>/<name>/template.yaml`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TemplateConfig {
    /// Display name of the template
    pub name: String,

    /// Description of what the template provides
    #[serde(default)]
    pub description: String,

    /// Semver version of the template
    pub version: String,

    #[serde(default)]
    pub author: String,

    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Fallback for its (category, device) group when no name is requested
    #[serde(default, alias = "isDefault")]
    pub is_default: bool,

    /// Preview image, relative to the template directory
    #[serde(default)]
    pub preview: Option<String>,

    #[serde(default)]
    pub slots: BTreeMap<String, SlotDescriptor>,

    /// Stylesheet loaded alongside the component, relative to the template directory
    #[serde(default)]
    pub style: Option<String>,

    /// Oldest library version this template works with
    #[serde(default, alias = "minLibraryVersion")]
    pub min_library_version: Option<String>,
}

impl TemplateConfig {
    pub fn parse(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Attach the deferred component factory to produce registry metadata
    pub fn into_metadata(self, loadable: Loadable) -> TemplateMetadata {
        TemplateMetadata {
            display_name: self.name,
            description: self.description,
            version: self.version,
            author: self.author,
            tags: self.tags,
            is_default: self.is_default,
            preview: self.preview,
            slots: self.slots,
            style: self.style,
            loadable,
        }
    }
}

/// Root manifest of a published template tree (`template.yaml` at the root)
///
/// Remote sources cannot be listed, so the manifest enumerates them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootManifest {
    /// Config locations, e.g. `login/desktop/default/template.yaml`
    #[serde(default)]
    pub configs: Vec<String>,

    /// Component entry locations, e.g. `login/desktop/default/index.vue`
    #[serde(default)]
    pub components: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = TemplateConfig::parse(
            r#"
name: Split Login
description: Two-column login page
version: 1.2.0
author: ui-team
tags: [auth, split]
is_default: false
preview: preview.png
style: style.css
slots:
  footer:
    required: false
  form:
    required: true
    props: [onSubmit, loading]
"#,
        )
        .unwrap();

        assert_eq!(config.name, "Split Login");
        assert!(config.tags.contains("auth"));
        assert_eq!(config.style.as_deref(), Some("style.css"));
        let form = &config.slots["form"];
        assert!(form.required);
        assert!(form.props.contains("onSubmit"));
        assert!(!config.slots["footer"].required);
    }

    #[test]
    fn test_camel_case_aliases() {
        let config = TemplateConfig::parse(
            "name: Default\nversion: 1.0.0\nisDefault: true\nminLibraryVersion: 0.2.0\n",
        )
        .unwrap();
        assert!(config.is_default);
        assert_eq!(config.min_library_version.as_deref(), Some("0.2.0"));
        assert!(config.description.is_empty());
    }

    #[test]
    fn test_missing_required_fields() {
        assert!(TemplateConfig::parse("description: no name\n").is_err());
    }

    #[test]
    fn test_root_manifest_defaults() {
        let manifest: RootManifest = serde_yaml::from_str("configs: [a/desktop/b/template.yaml]\n").unwrap();
        assert_eq!(manifest.configs.len(), 1);
        assert!(manifest.components.is_empty());
    }
}
