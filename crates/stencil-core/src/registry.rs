//! Template registry
//!
//! A [`Registry`] is built once per scan and never patched afterwards; a
//! rescan publishes a whole new table through [`RegistryCell::replace`].
//! Entries keep registration order so queries are stable.

use crate::component::Loadable;
use crate::error::{Result, TemplateError};
use crate::key::{Device, TemplateKey};
use crate::templates::manifest::SlotDescriptor;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Immutable description of a template
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateMetadata {
    pub display_name: String,
    pub description: String,
    pub version: String,
    pub author: String,
    pub tags: BTreeSet<String>,
    pub is_default: bool,
    pub preview: Option<String>,
    pub slots: BTreeMap<String, SlotDescriptor>,
    pub style: Option<String>,

    /// Deferred component factory; never invoked by the registry
    pub loadable: Loadable,
}

impl TemplateMetadata {
    /// Slots a consumer must fill
    pub fn required_slots(&self) -> impl Iterator<Item = &str> {
        self.slots
            .iter()
            .filter(|(_, slot)| slot.required)
            .map(|(name, _)| name.as_str())
    }
}

/// Metadata plus where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryEntry {
    pub key: TemplateKey,
    pub metadata: TemplateMetadata,
    pub config_location: String,
    pub component_location: String,
}

impl RegistryEntry {
    fn same_source(&self, other: &RegistryEntry) -> bool {
        self.config_location == other.config_location
            && self.component_location == other.component_location
    }

    fn source_label(&self) -> String {
        format!("{} + {}", self.config_location, self.component_location)
    }
}

type Predicate = Arc<dyn Fn(&RegistryEntry) -> bool + Send + Sync>;

/// Conjunctive filter over registry entries
///
/// Unset fields match everything; the predicate runs last.
#[derive(Clone, Default)]
pub struct TemplateQuery {
    pub category: Option<String>,
    pub device: Option<Device>,
    pub tag: Option<String>,
    pub name: Option<String>,
    predicate: Option<Predicate>,
}

impl TemplateQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn device(mut self, device: Device) -> Self {
        self.device = Some(device);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&RegistryEntry) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn matches(&self, entry: &RegistryEntry) -> bool {
        if let Some(category) = &self.category {
            if entry.key.category() != category {
                return false;
            }
        }
        if let Some(device) = self.device {
            if entry.key.device() != device {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if entry.key.name() != name {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !entry.metadata.tags.contains(tag) {
                return false;
            }
        }
        match &self.predicate {
            Some(predicate) => predicate(entry),
            None => true,
        }
    }
}

impl fmt::Debug for TemplateQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateQuery")
            .field("category", &self.category)
            .field("device", &self.device)
            .field("tag", &self.tag)
            .field("name", &self.name)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

/// Key -> entry table in registration order
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<Arc<RegistryEntry>>,
    index: HashMap<TemplateKey, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry
    ///
    /// Re-registering the same source is a no-op. A different source under an
    /// existing key is rejected and the existing entry is kept.
    pub fn register(&mut self, entry: RegistryEntry) -> Result<()> {
        if let Some(&idx) = self.index.get(&entry.key) {
            let existing = &self.entries[idx];
            if existing.same_source(&entry) {
                return Ok(());
            }
            return Err(TemplateError::DuplicateKey {
                key: entry.key.to_string(),
                existing: existing.source_label(),
                incoming: entry.source_label(),
            });
        }
        self.index.insert(entry.key.clone(), self.entries.len());
        self.entries.push(Arc::new(entry));
        Ok(())
    }

    pub fn get(&self, key: &TemplateKey) -> Option<Arc<RegistryEntry>> {
        self.index.get(key).map(|&idx| Arc::clone(&self.entries[idx]))
    }

    pub fn contains(&self, key: &TemplateKey) -> bool {
        self.index.contains_key(key)
    }

    /// Entries matching `query`, in registration order
    pub fn query(&self, query: &TemplateQuery) -> Vec<Arc<RegistryEntry>> {
        self.entries
            .iter()
            .filter(|entry| query.matches(entry))
            .cloned()
            .collect()
    }

    /// The default template of a (category, device) group
    ///
    /// Prefers the entry marked `is_default`. Without one, falls back to the
    /// lexicographically smallest name so the answer does not depend on
    /// registration order. Several defaults resolve the same way among
    /// themselves.
    pub fn resolve_default(&self, category: &str, device: Device) -> Option<Arc<RegistryEntry>> {
        let group = self.group(category, device);
        let defaults: Vec<&Arc<RegistryEntry>> =
            group.iter().filter(|e| e.metadata.is_default).collect();
        let pool = if defaults.is_empty() {
            group.iter().collect()
        } else {
            defaults
        };
        pool.into_iter()
            .min_by(|a, b| a.key.name().cmp(b.key.name()))
            .cloned()
    }

    /// Every entry of one (category, device) group
    pub fn group(&self, category: &str, device: Device) -> Vec<Arc<RegistryEntry>> {
        self.entries
            .iter()
            .filter(|e| e.key.category() == category && e.key.device() == device)
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<RegistryEntry>> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &TemplateKey> {
        self.entries.iter().map(|e| &e.key)
    }

    /// Distinct categories, sorted
    pub fn categories(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self.entries.iter().map(|e| e.key.category()).collect();
        set.into_iter().map(String::from).collect()
    }

    /// Devices that have at least one template in `category`
    pub fn devices(&self, category: &str) -> Vec<Device> {
        let set: BTreeSet<Device> = self
            .entries
            .iter()
            .filter(|e| e.key.category() == category)
            .map(|e| e.key.device())
            .collect();
        set.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PartialEq for Registry {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(&other.entries)
                .all(|(a, b)| a.as_ref() == b.as_ref())
    }
}

/// Shared handle to the current registry snapshot
#[derive(Debug, Default)]
pub struct RegistryCell {
    current: RwLock<Arc<Registry>>,
}

impl RegistryCell {
    pub fn new(registry: Registry) -> Self {
        Self {
            current: RwLock::new(Arc::new(registry)),
        }
    }

    pub fn current(&self) -> Arc<Registry> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Swap in a new snapshot, returning the previous one
    pub fn replace(&self, registry: Arc<Registry>) -> Arc<Registry> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, registry)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::component::Component;
    use std::collections::BTreeMap;

    pub(crate) fn entry(key: &str, is_default: bool, tags: &[&str]) -> RegistryEntry {
        let key = TemplateKey::parse(key).unwrap();
        let dir = key.relative_dir();
        let component = Component::new(key.clone(), "index.vue", BTreeMap::new());
        RegistryEntry {
            metadata: TemplateMetadata {
                display_name: key.name().to_string(),
                description: String::new(),
                version: "1.0.0".to_string(),
                author: String::new(),
                tags: tags.iter().map(|t| t.to_string()).collect(),
                is_default,
                preview: None,
                slots: BTreeMap::new(),
                style: None,
                loadable: Loadable::Ready(Arc::new(component)),
            },
            config_location: format!("{}/template.yaml", dir),
            component_location: format!("{}/index.vue", dir),
            key,
        }
    }

    fn key(s: &str) -> TemplateKey {
        TemplateKey::parse(s).unwrap()
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = Registry::new();
        registry.register(entry("login:desktop:default", true, &[])).unwrap();
        assert!(registry.get(&key("login:desktop:default")).is_some());
        assert!(registry.get(&key("login:desktop:split")).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_from_different_source_rejected() {
        let mut registry = Registry::new();
        registry.register(entry("login:desktop:default", true, &[])).unwrap();

        let mut other = entry("login:desktop:default", false, &[]);
        other.config_location = "elsewhere/template.yaml".to_string();
        let err = registry.register(other).unwrap_err();
        assert!(matches!(err, TemplateError::DuplicateKey { .. }));

        // First registration is kept
        let kept = registry.get(&key("login:desktop:default")).unwrap();
        assert!(kept.metadata.is_default);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_same_source_is_noop() {
        let mut registry = Registry::new();
        registry.register(entry("login:desktop:default", true, &[])).unwrap();
        registry.register(entry("login:desktop:default", true, &[])).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_query_is_conjunctive_and_ordered() {
        let mut registry = Registry::new();
        registry.register(entry("login:desktop:split", false, &["auth"])).unwrap();
        registry.register(entry("dashboard:desktop:analytics", false, &["charts"])).unwrap();
        registry.register(entry("login:mobile:compact", false, &["auth"])).unwrap();
        registry.register(entry("login:desktop:default", true, &["auth", "basic"])).unwrap();

        let names = |q: &TemplateQuery| -> Vec<String> {
            registry.query(q).iter().map(|e| e.key.to_string()).collect()
        };

        assert_eq!(
            names(&TemplateQuery::new().category("login").device(Device::Desktop)),
            vec!["login:desktop:split", "login:desktop:default"]
        );
        assert_eq!(
            names(&TemplateQuery::new().tag("auth").device(Device::Mobile)),
            vec!["login:mobile:compact"]
        );
        assert_eq!(
            names(&TemplateQuery::new().tag("auth").predicate(|e| e.metadata.is_default)),
            vec!["login:desktop:default"]
        );
        assert_eq!(names(&TemplateQuery::new()).len(), 4);
        assert!(names(&TemplateQuery::new().name("nope")).is_empty());
    }

    #[test]
    fn test_resolve_default_ignores_registration_order() {
        for flip in [false, true] {
            let mut registry = Registry::new();
            let mut entries = vec![
                entry("login:desktop:default", true, &[]),
                entry("login:desktop:split", false, &[]),
            ];
            if flip {
                entries.reverse();
            }
            for e in entries {
                registry.register(e).unwrap();
            }
            let found = registry.resolve_default("login", Device::Desktop).unwrap();
            assert_eq!(found.key.name(), "default");
        }
    }

    #[test]
    fn test_resolve_default_fallback_is_lexicographic() {
        let mut registry = Registry::new();
        registry.register(entry("login:desktop:zeta", false, &[])).unwrap();
        registry.register(entry("login:desktop:alpha", false, &[])).unwrap();
        let found = registry.resolve_default("login", Device::Desktop).unwrap();
        assert_eq!(found.key.name(), "alpha");
        assert!(registry.resolve_default("login", Device::Mobile).is_none());
    }

    #[test]
    fn test_categories_and_devices() {
        let mut registry = Registry::new();
        registry.register(entry("login:mobile:a", false, &[])).unwrap();
        registry.register(entry("login:desktop:a", false, &[])).unwrap();
        registry.register(entry("dashboard:tablet:a", false, &[])).unwrap();
        assert_eq!(registry.categories(), vec!["dashboard", "login"]);
        assert_eq!(registry.devices("login"), vec![Device::Desktop, Device::Mobile]);
    }

    #[test]
    fn test_cell_replace_is_wholesale() {
        let cell = RegistryCell::default();
        assert!(cell.current().is_empty());

        let mut next = Registry::new();
        next.register(entry("login:desktop:default", true, &[])).unwrap();
        let previous = cell.replace(Arc::new(next));

        assert!(previous.is_empty());
        assert_eq!(cell.current().len(), 1);
    }
}
