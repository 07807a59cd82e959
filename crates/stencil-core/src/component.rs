//! Renderable component bundles and how to obtain them
//!
//! A [`Loadable`] is the deferred factory stored in template metadata: either
//! a component that is already in hand, or a strategy (local directory,
//! remote bundle) that a [`ComponentResolver`] turns into a [`Component`].

use crate::key::TemplateKey;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

/// A resolved template component: its entry module plus every bundled file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub key: TemplateKey,

    /// Relative path of the entry module inside `files`
    pub entry: String,

    /// Relative path -> contents
    pub files: BTreeMap<String, Vec<u8>>,
}

impl Component {
    pub fn new(key: TemplateKey, entry: impl Into<String>, files: BTreeMap<String, Vec<u8>>) -> Self {
        Self {
            key,
            entry: entry.into(),
            files,
        }
    }

    /// Contents of the entry module, if it was bundled
    pub fn entry_source(&self) -> Option<&[u8]> {
        self.files.get(&self.entry).map(Vec::as_slice)
    }

    pub fn file(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn total_bytes(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }
}

/// Deferred component factory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Loadable {
    /// Already resolved; resolving is a reference clone
    Ready(Arc<Component>),

    /// A template directory on disk, bundled on demand
    Local { dir: PathBuf, entry: String },

    /// A pre-built zip bundle behind a URL
    Remote { url: Url, entry: String },
}

impl Loadable {
    /// Entry module name this loadable resolves to
    pub fn entry(&self) -> &str {
        match self {
            Loadable::Ready(component) => &component.entry,
            Loadable::Local { entry, .. } | Loadable::Remote { entry, .. } => entry,
        }
    }
}

/// Capability that turns a [`Loadable`] into a [`Component`]
///
/// Implementations must be cheap to share; the loader holds one behind an
/// `Arc` and invokes it from spawned tasks.
pub trait ComponentResolver: Send + Sync + 'static {
    fn resolve(
        &self,
        key: &TemplateKey,
        loadable: &Loadable,
    ) -> impl Future<Output = anyhow::Result<Arc<Component>>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Device;

    fn sample() -> Component {
        let mut files = BTreeMap::new();
        files.insert("index.vue".to_string(), b"<template/>".to_vec());
        files.insert("style.css".to_string(), b".a{}".to_vec());
        Component::new(
            TemplateKey::new("login", Device::Desktop, "default").unwrap(),
            "index.vue",
            files,
        )
    }

    #[test]
    fn test_entry_source() {
        let component = sample();
        assert_eq!(component.entry_source(), Some(&b"<template/>"[..]));
        assert_eq!(component.total_bytes(), 15);
    }

    #[test]
    fn test_missing_entry() {
        let mut component = sample();
        component.entry = "index.tsx".to_string();
        assert!(component.entry_source().is_none());
    }

    #[test]
    fn test_loadable_entry() {
        let ready = Loadable::Ready(Arc::new(sample()));
        assert_eq!(ready.entry(), "index.vue");

        let local = Loadable::Local {
            dir: PathBuf::from("/tmp/login/desktop/default"),
            entry: "index.tsx".to_string(),
        };
        assert_eq!(local.entry(), "index.tsx");
    }
}
