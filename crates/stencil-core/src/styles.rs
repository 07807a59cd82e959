//! Style side effects tracked alongside loaded templates
//!
//! Styles are identified by `"{key}::style"` so they can be removed when a
//! template leaves the loader cache. The loader never calls into this
//! module; consumers drive it around cache transitions.

use crate::error::{Result, TemplateError};
use crate::key::TemplateKey;
use crate::registry::RegistryCell;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Reads a template's stylesheet from wherever the template lives
pub trait StyleSource: Send + Sync + 'static {
    fn read_style(
        &self,
        key: &TemplateKey,
        file: &str,
    ) -> impl Future<Output = anyhow::Result<Option<String>>> + Send;
}

/// A stylesheet currently applied for a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedStyle {
    pub key: TemplateKey,
    pub css: String,
}

/// Style id for a template key
pub fn style_id(key: &TemplateKey) -> String {
    format!("{}::style", key)
}

pub struct StyleTracker<S> {
    source: Arc<S>,
    registry: Arc<RegistryCell>,
    styles: Arc<Mutex<BTreeMap<String, LoadedStyle>>>,
}

impl<S> Clone for StyleTracker<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            registry: Arc::clone(&self.registry),
            styles: Arc::clone(&self.styles),
        }
    }
}

impl<S: StyleSource> StyleTracker<S> {
    pub fn new(source: Arc<S>, registry: Arc<RegistryCell>) -> Self {
        Self {
            source,
            registry,
            styles: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, LoadedStyle>> {
        self.styles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load the stylesheet a template declares
    ///
    /// Returns the style id, or `None` when the template declares no style
    /// or its file is absent. Loading an already tracked style is a no-op.
    pub async fn load_component_style(&self, key: &TemplateKey) -> Result<Option<String>> {
        let entry = self
            .registry
            .current()
            .get(key)
            .ok_or_else(|| TemplateError::TemplateNotFound {
                key: key.to_string(),
            })?;
        let Some(file) = entry.metadata.style.clone() else {
            return Ok(None);
        };

        let id = style_id(key);
        if self.lock().contains_key(&id) {
            return Ok(Some(id));
        }

        let css = self
            .source
            .read_style(key, &file)
            .await
            .map_err(|e| TemplateError::LoadFailed {
                key: key.to_string(),
                message: format!("style {}: {:#}", file, e),
            })?;
        let Some(css) = css else {
            debug!("Style {} declared by {} not found", file, key);
            return Ok(None);
        };

        self.lock().entry(id.clone()).or_insert(LoadedStyle {
            key: key.clone(),
            css,
        });
        debug!("Loaded style {}", id);
        Ok(Some(id))
    }

    /// Stop tracking a style; returns whether it was tracked
    pub fn remove_style(&self, id: &str) -> bool {
        let removed = self.lock().remove(id).is_some();
        if removed {
            debug!("Removed style {}", id);
        }
        removed
    }

    /// Remove every style whose template is not in `active`
    ///
    /// Returns the removed ids in order.
    pub fn cleanup_unused_styles(&self, active: &[TemplateKey]) -> Vec<String> {
        let active: HashSet<&TemplateKey> = active.iter().collect();
        let mut styles = self.lock();
        let unused: Vec<String> = styles
            .iter()
            .filter(|(_, style)| !active.contains(&style.key))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &unused {
            styles.remove(id);
        }
        unused
    }

    pub fn style(&self, id: &str) -> Option<LoadedStyle> {
        self.lock().get(id).cloned()
    }

    pub fn style_ids(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::entry;
    use crate::registry::Registry;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingStyles {
        reads: AtomicUsize,
    }

    impl StyleSource for CountingStyles {
        async fn read_style(&self, key: &TemplateKey, file: &str) -> anyhow::Result<Option<String>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if key.name() == "missing" {
                return Ok(None);
            }
            Ok(Some(format!("/* {} {} */", key, file)))
        }
    }

    fn tracker() -> (StyleTracker<CountingStyles>, Arc<CountingStyles>) {
        let mut registry = Registry::new();
        for name in ["login:desktop:default", "login:desktop:split", "login:desktop:missing"] {
            let mut e = entry(name, false, &[]);
            e.metadata.style = Some("style.css".to_string());
            registry.register(e).unwrap();
        }
        registry.register(entry("dashboard:desktop:plain", false, &[])).unwrap();

        let source = Arc::new(CountingStyles::default());
        let tracker = StyleTracker::new(Arc::clone(&source), Arc::new(RegistryCell::new(registry)));
        (tracker, source)
    }

    fn key(s: &str) -> TemplateKey {
        TemplateKey::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_load_is_idempotent() {
        let (tracker, source) = tracker();
        let id = tracker.load_component_style(&key("login:desktop:default")).await.unwrap();
        assert_eq!(id.as_deref(), Some("login:desktop:default::style"));
        tracker.load_component_style(&key("login:desktop:default")).await.unwrap();

        assert_eq!(source.reads.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.style_ids().len(), 1);
    }

    #[tokio::test]
    async fn test_no_style_declared_or_found() {
        let (tracker, _) = tracker();
        assert!(tracker.load_component_style(&key("dashboard:desktop:plain")).await.unwrap().is_none());
        assert!(tracker.load_component_style(&key("login:desktop:missing")).await.unwrap().is_none());
        assert!(tracker.load_component_style(&key("login:mobile:x")).await.is_err());
        assert!(tracker.style_ids().is_empty());
    }

    #[tokio::test]
    async fn test_remove_and_cleanup() {
        let (tracker, _) = tracker();
        tracker.load_component_style(&key("login:desktop:default")).await.unwrap();
        tracker.load_component_style(&key("login:desktop:split")).await.unwrap();

        assert!(tracker.remove_style("login:desktop:split::style"));
        assert!(!tracker.remove_style("login:desktop:split::style"));

        tracker.load_component_style(&key("login:desktop:split")).await.unwrap();
        let removed = tracker.cleanup_unused_styles(&[key("login:desktop:split")]);
        assert_eq!(removed, vec!["login:desktop:default::style"]);
        assert!(tracker.style("login:desktop:split::style").is_some());
    }
}
