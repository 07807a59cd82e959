//! Template discovery
//!
//! The scanner enumerates an [`AssetSource`], pairs each config with its
//! component by key, and builds a fresh [`Registry`]. Problems with single
//! templates are collected into the [`ScanResult`] instead of aborting the
//! scan. Sources are processed in sorted location order, so scanning the
//! same input twice yields value-equal registries.

use crate::error::{Result, TemplateError};
use crate::key::{Device, TemplateKey};
use crate::registry::{Registry, RegistryCell, RegistryEntry, TemplateQuery};
use crate::templates::catalog::{AssetCatalog, AssetSource, ComponentAsset, ConfigContent};
use crate::templates::manifest::TemplateConfig;
use crate::templates::version;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Non-fatal findings of a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanWarning {
    /// Metadata with nothing to load
    ConfigWithoutComponent { key: String, location: String },

    /// A component module with no metadata; excluded from the registry
    ComponentWithoutConfig { key: String, location: String },

    /// A group of several templates with none marked default
    NoDefault {
        category: String,
        device: Device,
        count: usize,
    },

    /// A group with more than one template marked default
    MultipleDefaults {
        category: String,
        device: Device,
        names: Vec<String>,
    },

    /// `version` is not valid semver
    InvalidVersion { key: String, version: String },

    /// The template asks for a newer library
    Incompatible { key: String, message: String },
}

impl fmt::Display for ScanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanWarning::ConfigWithoutComponent { key, location } => {
                write!(f, "{}: config {} has no component module", key, location)
            }
            ScanWarning::ComponentWithoutConfig { key, location } => {
                write!(f, "{}: component {} has no config, skipped", key, location)
            }
            ScanWarning::NoDefault {
                category,
                device,
                count,
            } => write!(
                f,
                "{}:{}: {} templates but none marked default, falling back to the first by name",
                category, device, count
            ),
            ScanWarning::MultipleDefaults {
                category,
                device,
                names,
            } => write!(
                f,
                "{}:{}: several templates marked default ({})",
                category,
                device,
                names.join(", ")
            ),
            ScanWarning::InvalidVersion { key, version } => {
                write!(f, "{}: version '{}' is not valid semver", key, version)
            }
            ScanWarning::Incompatible { key, message } => write!(f, "{}: {}", key, message),
        }
    }
}

/// Outcome of one scan pass
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub registry: Arc<Registry>,
    pub warnings: Vec<ScanWarning>,
    pub errors: Vec<TemplateError>,
}

impl ScanResult {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty() && self.errors.is_empty()
    }
}

/// Discovers templates and publishes the registry
pub struct Scanner<S> {
    source: Arc<S>,
    registry: Arc<RegistryCell>,
    library_version: String,
}

impl<S> Clone for Scanner<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            registry: Arc::clone(&self.registry),
            library_version: self.library_version.clone(),
        }
    }
}

impl<S: AssetSource> Scanner<S> {
    pub fn new(source: Arc<S>, registry: Arc<RegistryCell>, library_version: impl Into<String>) -> Self {
        Self {
            source,
            registry,
            library_version: library_version.into(),
        }
    }

    /// Enumerate the source, build a registry and publish it
    ///
    /// Fails only when the source itself cannot be enumerated; the previous
    /// registry stays in place in that case.
    pub async fn scan(&self) -> Result<ScanResult> {
        let catalog = self
            .source
            .enumerate()
            .await
            .map_err(|e| TemplateError::source_unavailable(&e))?;
        let result = Self::build(catalog, &self.library_version);
        self.registry.replace(Arc::clone(&result.registry));
        Ok(result)
    }

    /// Current registry snapshot
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.current()
    }

    /// Shared cell the scanner publishes into
    pub fn registry_cell(&self) -> &Arc<RegistryCell> {
        &self.registry
    }

    pub fn get_template(&self, category: &str, device: Device, name: &str) -> Option<Arc<RegistryEntry>> {
        let key = TemplateKey::new(category, device, name).ok()?;
        self.registry.current().get(&key)
    }

    /// Filtered view of the current registry
    pub fn query(&self, query: &TemplateQuery) -> Vec<Arc<RegistryEntry>> {
        self.registry.current().query(query)
    }

    /// Build a registry from an in-memory catalog without publishing it
    pub fn build(catalog: AssetCatalog, library_version: &str) -> ScanResult {
        let AssetCatalog {
            mut configs,
            mut components,
        } = catalog;
        configs.sort_by(|a, b| a.location.cmp(&b.location));
        components.sort_by(|a, b| a.location.cmp(&b.location));

        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        // Pair components by key, first location wins
        let mut by_key: HashMap<TemplateKey, ComponentAsset> = HashMap::new();
        let mut component_order: Vec<TemplateKey> = Vec::new();
        for component in components {
            let key = match TemplateKey::from_location(&component.location) {
                Ok(key) => key,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };
            match by_key.get(&key) {
                Some(existing) if existing.location == component.location => {}
                Some(existing) => errors.push(TemplateError::DuplicateKey {
                    key: key.to_string(),
                    existing: existing.location.clone(),
                    incoming: component.location,
                }),
                None => {
                    component_order.push(key.clone());
                    by_key.insert(key, component);
                }
            }
        }

        let mut registry = Registry::new();
        // Keys some config location maps to, parsed or not
        let mut config_keys: HashSet<TemplateKey> = HashSet::new();
        for config in configs {
            let key = match TemplateKey::from_location(&config.location) {
                Ok(key) => key,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };
            config_keys.insert(key.clone());

            let parsed = match config.content {
                ConfigContent::Parsed(parsed) => parsed,
                ConfigContent::Raw(text) => match TemplateConfig::parse(&text) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        errors.push(TemplateError::InvalidConfig {
                            location: config.location,
                            message: e.to_string(),
                        });
                        continue;
                    }
                },
                ConfigContent::Unavailable(message) => {
                    errors.push(TemplateError::InvalidConfig {
                        location: config.location,
                        message,
                    });
                    continue;
                }
            };

            let Some(component) = by_key.get(&key) else {
                warnings.push(ScanWarning::ConfigWithoutComponent {
                    key: key.to_string(),
                    location: config.location,
                });
                continue;
            };

            Self::check_versions(&key, &parsed, library_version, &mut warnings);

            let entry = RegistryEntry {
                key: key.clone(),
                metadata: parsed.into_metadata(component.loadable.clone()),
                config_location: config.location,
                component_location: component.location.clone(),
            };
            if let Err(e) = registry.register(entry) {
                debug!("Rejected template during scan: {}", e);
                errors.push(e);
            }
        }

        for key in component_order {
            if !config_keys.contains(&key) {
                if let Some(component) = by_key.get(&key) {
                    warnings.push(ScanWarning::ComponentWithoutConfig {
                        key: key.to_string(),
                        location: component.location.clone(),
                    });
                }
            }
        }

        Self::check_defaults(&registry, &mut warnings);

        for warning in &warnings {
            warn!("{}", warning);
        }
        for error in &errors {
            warn!("{}", error);
        }
        info!(
            "Scanned {} templates ({} warnings, {} errors)",
            registry.len(),
            warnings.len(),
            errors.len()
        );

        ScanResult {
            registry: Arc::new(registry),
            warnings,
            errors,
        }
    }

    fn check_versions(
        key: &TemplateKey,
        config: &TemplateConfig,
        library_version: &str,
        warnings: &mut Vec<ScanWarning>,
    ) {
        if version::parse_version(&config.version).is_err() {
            warnings.push(ScanWarning::InvalidVersion {
                key: key.to_string(),
                version: config.version.clone(),
            });
        }
        if let Some(min) = &config.min_library_version {
            if let Some(message) = version::check_compatibility(library_version, min) {
                warnings.push(ScanWarning::Incompatible {
                    key: key.to_string(),
                    message,
                });
            }
        }
    }

    fn check_defaults(registry: &Registry, warnings: &mut Vec<ScanWarning>) {
        let mut groups: BTreeMap<(String, Device), (usize, Vec<String>)> = BTreeMap::new();
        for entry in registry.iter() {
            let group = groups
                .entry((entry.key.category().to_string(), entry.key.device()))
                .or_default();
            group.0 += 1;
            if entry.metadata.is_default {
                group.1.push(entry.key.name().to_string());
            }
        }

        for ((category, device), (count, defaults)) in groups {
            if count > 1 && defaults.is_empty() {
                warnings.push(ScanWarning::NoDefault {
                    category,
                    device,
                    count,
                });
            } else if defaults.len() > 1 {
                warnings.push(ScanWarning::MultipleDefaults {
                    category,
                    device,
                    names: defaults,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, Loadable};
    use std::collections::BTreeMap as Map;

    fn config(name: &str, is_default: bool) -> TemplateConfig {
        TemplateConfig::parse(&format!(
            "name: {}\nversion: 1.0.0\nis_default: {}\n",
            name, is_default
        ))
        .unwrap()
    }

    fn ready(location: &str) -> Loadable {
        let key = TemplateKey::from_location(location).unwrap();
        Loadable::Ready(Arc::new(Component::new(key, "index.vue", Map::new())))
    }

    fn login_catalog() -> AssetCatalog {
        AssetCatalog::new()
            .with_config("login/desktop/split/template.yaml", config("Split", false))
            .with_config("login/desktop/default/template.yaml", config("Default", true))
            .with_component("login/desktop/split/index.vue", ready("login/desktop/split/index.vue"))
            .with_component("login/desktop/default/index.vue", ready("login/desktop/default/index.vue"))
    }

    #[test]
    fn test_build_pairs_configs_and_components() {
        let result = Scanner::<AssetCatalog>::build(login_catalog(), "0.1.0");
        assert!(result.is_clean(), "{:?}", result);
        assert_eq!(result.registry.len(), 2);

        // Sorted location order
        let keys: Vec<String> = result.registry.keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["login:desktop:default", "login:desktop:split"]);
    }

    #[test]
    fn test_unpaired_sources_warn() {
        let catalog = AssetCatalog::new()
            .with_config("login/desktop/orphan/template.yaml", config("Orphan", false))
            .with_component("login/mobile/bare/index.vue", ready("login/mobile/bare/index.vue"));
        let result = Scanner::<AssetCatalog>::build(catalog, "0.1.0");

        assert!(result.registry.is_empty());
        assert!(result.errors.is_empty());
        assert!(result.warnings.contains(&ScanWarning::ConfigWithoutComponent {
            key: "login:desktop:orphan".to_string(),
            location: "login/desktop/orphan/template.yaml".to_string(),
        }));
        assert!(result.warnings.contains(&ScanWarning::ComponentWithoutConfig {
            key: "login:mobile:bare".to_string(),
            location: "login/mobile/bare/index.vue".to_string(),
        }));
    }

    #[test]
    fn test_bad_entries_do_not_abort_scan() {
        let catalog = login_catalog()
            .with_raw_config("login/tablet/broken/template.yaml", "name: [unclosed")
            .with_component("login/tablet/broken/index.vue", ready("login/tablet/broken/index.vue"))
            .with_config("nowhere/template.yaml", config("Lost", false));
        let result = Scanner::<AssetCatalog>::build(catalog, "0.1.0");

        assert_eq!(result.registry.len(), 2);
        assert!(result
            .errors
            .iter()
            .any(|e| matches!(e, TemplateError::InvalidConfig { location, .. } if location.contains("broken"))));
        assert!(result
            .errors
            .iter()
            .any(|e| matches!(e, TemplateError::MalformedKey { .. })));
        // The broken config is reported as an error, not as a missing config
        assert!(!result.warnings.iter().any(|w| matches!(
            w,
            ScanWarning::ComponentWithoutConfig { key, .. } if key == "login:tablet:broken"
        )));
    }

    #[test]
    fn test_duplicate_component_keeps_first() {
        let catalog = login_catalog()
            .with_component("login/desktop/split/index.tsx", ready("login/desktop/split/index.tsx"));
        let result = Scanner::<AssetCatalog>::build(catalog, "0.1.0");

        assert_eq!(result.registry.len(), 2);
        assert_eq!(result.errors.len(), 1);
        let entry = result
            .registry
            .get(&TemplateKey::parse("login:desktop:split").unwrap())
            .unwrap();
        assert_eq!(entry.component_location, "login/desktop/split/index.tsx");
    }

    #[test]
    fn test_repeated_config_location_is_noop() {
        let catalog = login_catalog()
            .with_config("login/desktop/split/template.yaml", config("Split", false));
        let result = Scanner::<AssetCatalog>::build(catalog, "0.1.0");
        assert!(result.errors.is_empty());
        assert_eq!(result.registry.len(), 2);
    }

    #[test]
    fn test_default_group_warnings() {
        let catalog = AssetCatalog::new()
            .with_config("dash/desktop/a/template.yaml", config("A", false))
            .with_config("dash/desktop/b/template.yaml", config("B", false))
            .with_component("dash/desktop/a/index.vue", ready("dash/desktop/a/index.vue"))
            .with_component("dash/desktop/b/index.vue", ready("dash/desktop/b/index.vue"))
            .with_config("dash/mobile/a/template.yaml", config("A", true))
            .with_config("dash/mobile/b/template.yaml", config("B", true))
            .with_component("dash/mobile/a/index.vue", ready("dash/mobile/a/index.vue"))
            .with_component("dash/mobile/b/index.vue", ready("dash/mobile/b/index.vue"));
        let result = Scanner::<AssetCatalog>::build(catalog, "0.1.0");

        assert!(result.warnings.contains(&ScanWarning::NoDefault {
            category: "dash".to_string(),
            device: Device::Desktop,
            count: 2,
        }));
        assert!(result.warnings.contains(&ScanWarning::MultipleDefaults {
            category: "dash".to_string(),
            device: Device::Mobile,
            names: vec!["a".to_string(), "b".to_string()],
        }));
    }

    #[test]
    fn test_version_warnings() {
        let mut newer = config("Newer", false);
        newer.min_library_version = Some("9.0.0".to_string());
        let mut sloppy = config("Sloppy", false);
        sloppy.version = "latest".to_string();

        let catalog = AssetCatalog::new()
            .with_config("a/desktop/newer/template.yaml", newer)
            .with_config("a/desktop/sloppy/template.yaml", sloppy)
            .with_component("a/desktop/newer/index.vue", ready("a/desktop/newer/index.vue"))
            .with_component("a/desktop/sloppy/index.vue", ready("a/desktop/sloppy/index.vue"));
        let result = Scanner::<AssetCatalog>::build(catalog, "0.1.0");

        // Still registered
        assert_eq!(result.registry.len(), 2);
        assert!(result
            .warnings
            .iter()
            .any(|w| matches!(w, ScanWarning::Incompatible { key, .. } if key == "a:desktop:newer")));
        assert!(result
            .warnings
            .iter()
            .any(|w| matches!(w, ScanWarning::InvalidVersion { version, .. } if version == "latest")));
    }

    #[test]
    fn test_build_is_idempotent() {
        let first = Scanner::<AssetCatalog>::build(login_catalog(), "0.1.0");
        let second = Scanner::<AssetCatalog>::build(login_catalog(), "0.1.0");
        assert_eq!(*first.registry, *second.registry);
        assert_eq!(first.warnings, second.warnings);
    }

    #[tokio::test]
    async fn test_scan_publishes_registry() {
        let cell = Arc::new(RegistryCell::default());
        let scanner = Scanner::new(Arc::new(login_catalog()), Arc::clone(&cell), "0.1.0");

        let result = scanner.scan().await.unwrap();
        assert_eq!(result.registry.len(), 2);
        assert_eq!(cell.current().len(), 2);
        assert!(scanner.get_template("login", Device::Desktop, "split").is_some());
        assert!(scanner.get_template("login", Device::Desktop, "nope").is_none());
        assert_eq!(scanner.query(&TemplateQuery::new().category("login")).len(), 2);
    }
}
