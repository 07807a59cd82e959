//! Template fetching from a remote URL or a local directory
//!
//! Components are always delivered as zip bundles:
//! - Remote: fetches pre-built `<category>/<device>/<name>.zip` bundles
//! - Local: builds the bundle from the template folder on demand, then extracts it
//!
//! This keeps development trees and published trees behaving identically.

use super::catalog::{AssetCatalog, AssetSource, ComponentAsset, ConfigAsset, ConfigContent};
use super::export::is_safe_relative;
use super::manifest::{RootManifest, CONFIG_FILE, DEFAULT_COMPONENT_FILES};
use crate::component::{Component, ComponentResolver, Loadable};
use crate::host::HostConfig;
use crate::key::TemplateKey;
use crate::styles::StyleSource;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::debug;
use url::Url;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

/// Template source - either remote URL or local directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    Remote(Url),
    Local(PathBuf),
}

impl TemplateSource {
    /// Resolve the source for a host
    ///
    /// A non-empty template directory variable wins, then the URL variable,
    /// then the host's default URL.
    pub fn from_config<C: HostConfig>(config: &C) -> Result<Self> {
        if let Ok(dir) = std::env::var(config.template_dir_env()) {
            if !dir.is_empty() {
                return Ok(Self::Local(PathBuf::from(dir)));
            }
        }
        let url_str = std::env::var(config.template_url_env())
            .unwrap_or_else(|_| config.default_template_url().to_string());
        let url =
            Url::parse(&url_str).with_context(|| format!("Invalid template URL: {}", url_str))?;
        Ok(Self::Remote(url))
    }

    /// Create a local template source from a path
    pub fn local(path: PathBuf) -> Self {
        Self::Local(path)
    }
}

/// Template fetcher - enumerates a source and resolves its component bundles
#[derive(Debug, Clone)]
pub struct TemplateFetcher {
    source: TemplateSource,
    client: reqwest::Client,
    component_files: Vec<String>,
}

impl TemplateFetcher {
    /// Create a new fetcher with a custom user agent
    pub fn new(source: TemplateSource, user_agent: &str) -> Self {
        Self {
            source,
            client: reqwest::Client::builder()
                .user_agent(user_agent)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            component_files: DEFAULT_COMPONENT_FILES.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Create a fetcher from a host config
    pub fn from_config<C: HostConfig>(config: &C) -> Result<Self> {
        let source = TemplateSource::from_config(config)?;
        Ok(Self::new(source, config.user_agent()).with_component_files(config.component_files()))
    }

    /// Create a fetcher for local templates
    pub fn from_local(path: PathBuf, user_agent: &str) -> Self {
        Self::new(TemplateSource::local(path), user_agent)
    }

    /// Override the recognised entry module names (in order of preference)
    pub fn with_component_files(mut self, files: &[&str]) -> Self {
        self.component_files = files.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Get the template source
    pub fn source(&self) -> &TemplateSource {
        &self.source
    }

    /// Build a URL by appending path segments, preserving query parameters
    fn build_url(base: &Url, path: &str) -> Result<Url> {
        let mut url = base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow::anyhow!("URL cannot have path segments: {}", base))?;
            segments.pop_if_empty();
            for segment in path.split('/').filter(|s| !s.is_empty()) {
                segments.push(segment);
            }
        }
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;
        Ok(response)
    }

    async fn fetch_text(&self, url: Url) -> Result<String> {
        let response = self.get(url.clone()).await?;
        if !response.status().is_success() {
            anyhow::bail!("Failed to fetch {}: HTTP {}", url, response.status());
        }
        Ok(response.text().await?)
    }

    async fn fetch_bytes(&self, url: Url) -> Result<Vec<u8>> {
        let response = self.get(url.clone()).await?;
        if !response.status().is_success() {
            anyhow::bail!("Failed to fetch {}: HTTP {}", url, response.status());
        }
        Ok(response.bytes().await?.to_vec())
    }

    /// Fetch the root manifest listing a remote tree
    pub async fn fetch_root_manifest(&self, base_url: &Url) -> Result<RootManifest> {
        let url = Self::build_url(base_url, CONFIG_FILE)?;
        let content = self
            .fetch_text(url.clone())
            .await
            .with_context(|| format!("Failed to fetch root template manifest from {}", url))?;
        serde_yaml::from_str(&content).context("Failed to parse root manifest")
    }

    /// Walk `<root>/<category>/<device>/<name>/*`
    async fn enumerate_local(&self, root: &Path) -> Result<AssetCatalog> {
        if !root.is_dir() {
            anyhow::bail!("Template directory not found: {}", root.display());
        }

        let mut catalog = AssetCatalog::new();
        // template dir -> (preference rank, file name, location)
        let mut candidates: BTreeMap<PathBuf, Vec<(usize, String, String)>> = BTreeMap::new();

        for entry in WalkDir::new(root)
            .min_depth(4)
            .max_depth(4)
            .sort_by_file_name()
        {
            let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry.path().strip_prefix(root).with_context(|| {
                format!("{} is outside {}", entry.path().display(), root.display())
            })?;
            let location = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            let file_name = entry.file_name().to_string_lossy().into_owned();

            if file_name == CONFIG_FILE {
                let content = match fs::read_to_string(entry.path()).await {
                    Ok(text) => ConfigContent::Raw(text),
                    Err(e) => ConfigContent::Unavailable(e.to_string()),
                };
                catalog.configs.push(ConfigAsset { location, content });
            } else if let Some(rank) = self.component_files.iter().position(|f| *f == file_name) {
                if let Some(dir) = entry.path().parent() {
                    candidates
                        .entry(dir.to_path_buf())
                        .or_default()
                        .push((rank, file_name, location));
                }
            }
        }

        for (dir, mut found) in candidates {
            found.sort();
            let mut found = found.into_iter();
            if let Some((_, entry, location)) = found.next() {
                for (_, ignored, _) in found {
                    debug!(
                        "Ignoring secondary entry module {} in {} (using {})",
                        ignored,
                        dir.display(),
                        entry
                    );
                }
                catalog.components.push(ComponentAsset {
                    location,
                    loadable: Loadable::Local { dir, entry },
                });
            }
        }

        Ok(catalog)
    }

    /// Read the root manifest, fetch every config, describe every bundle
    async fn enumerate_remote(&self, base_url: &Url) -> Result<AssetCatalog> {
        let manifest = self.fetch_root_manifest(base_url).await?;
        let mut catalog = AssetCatalog::new();

        for location in manifest.configs {
            let content = match Self::build_url(base_url, &location) {
                Ok(url) => match self.fetch_text(url).await {
                    Ok(text) => ConfigContent::Raw(text),
                    Err(e) => ConfigContent::Unavailable(format!("{:#}", e)),
                },
                Err(e) => ConfigContent::Unavailable(format!("{:#}", e)),
            };
            catalog.configs.push(ConfigAsset { location, content });
        }

        for location in manifest.components {
            let (dir, entry) = location.rsplit_once('/').unwrap_or(("", location.as_str()));
            let url = Self::build_url(base_url, &format!("{}.zip", dir))?;
            let entry = entry.to_string();
            catalog.components.push(ComponentAsset {
                location,
                loadable: Loadable::Remote { url, entry },
            });
        }

        Ok(catalog)
    }

    /// Build a zip bundle of a local template directory
    /// Every file is stored under `<prefix>/`
    pub fn build_local_zip(template_dir: &Path, prefix: &str) -> Result<Vec<u8>> {
        if !template_dir.is_dir() {
            anyhow::bail!("Template directory not found: {}", template_dir.display());
        }

        // Create zip in memory
        let mut zip_buffer = Vec::new();
        {
            let mut zip = ZipWriter::new(Cursor::new(&mut zip_buffer));
            let options =
                SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

            for entry in WalkDir::new(template_dir).min_depth(1).sort_by_file_name() {
                let entry = entry
                    .with_context(|| format!("Failed to walk {}", template_dir.display()))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let relative = entry.path().strip_prefix(template_dir)?;
                let relative = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");

                let content = std::fs::read(entry.path())
                    .with_context(|| format!("Failed to read {}", entry.path().display()))?;
                zip.start_file(format!("{}/{}", prefix, relative), options)?;
                zip.write_all(&content)?;
            }

            zip.finish()?;
        }

        Ok(zip_buffer)
    }

    /// Extract a zip bundle into a component
    pub fn extract_bundle(
        zip_bytes: &[u8],
        key: &TemplateKey,
        prefix: &str,
        entry: &str,
    ) -> Result<Component> {
        let cursor = Cursor::new(zip_bytes);
        let mut archive = ZipArchive::new(cursor)
            .with_context(|| format!("Failed to read zip archive for template '{}'", key))?;

        let mut files: BTreeMap<String, Vec<u8>> = BTreeMap::new();

        // The zip contains files with paths like: {prefix}/file.txt
        let prefix = format!("{}/", prefix);

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;

            // Skip directories
            if file.is_dir() {
                continue;
            }

            let full_path = file.name().to_string();
            let relative_path = match full_path.strip_prefix(&prefix) {
                Some(stripped) => stripped.to_string(),
                None => full_path.clone(),
            };

            let mut contents = Vec::new();
            file.read_to_end(&mut contents)?;
            files.insert(relative_path, contents);
        }

        if !files.contains_key(entry) {
            anyhow::bail!(
                "Bundle for template '{}' is missing its entry module '{}'",
                key,
                entry
            );
        }

        Ok(Component::new(key.clone(), entry, files))
    }

    /// Read one file of a template, `None` if it does not exist
    pub async fn read_template_file(&self, key: &TemplateKey, file: &str) -> Result<Option<Vec<u8>>> {
        if !is_safe_relative(file) {
            anyhow::bail!("{} escapes the template directory of {}", file, key);
        }
        let relative = format!("{}/{}", key.relative_dir(), file);
        match &self.source {
            TemplateSource::Local(root) => {
                let path = root.join(&relative);
                if !path.exists() {
                    return Ok(None);
                }
                let bytes = fs::read(&path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                Ok(Some(bytes))
            }
            TemplateSource::Remote(base_url) => {
                let url = Self::build_url(base_url, &relative)?;
                let response = self.get(url.clone()).await?;
                if response.status() == reqwest::StatusCode::NOT_FOUND {
                    return Ok(None);
                }
                if !response.status().is_success() {
                    anyhow::bail!("Failed to fetch {}: HTTP {}", url, response.status());
                }
                Ok(Some(response.bytes().await?.to_vec()))
            }
        }
    }
}

impl AssetSource for TemplateFetcher {
    async fn enumerate(&self) -> Result<AssetCatalog> {
        match &self.source {
            TemplateSource::Local(root) => self.enumerate_local(root).await,
            TemplateSource::Remote(base_url) => self.enumerate_remote(base_url).await,
        }
    }
}

impl ComponentResolver for TemplateFetcher {
    async fn resolve(&self, key: &TemplateKey, loadable: &Loadable) -> Result<Arc<Component>> {
        match loadable {
            Loadable::Ready(component) => Ok(Arc::clone(component)),
            Loadable::Local { dir, entry } => {
                let zip_bytes = Self::build_local_zip(dir, key.name())?;
                let component = Self::extract_bundle(&zip_bytes, key, key.name(), entry)?;
                Ok(Arc::new(component))
            }
            Loadable::Remote { url, entry } => {
                let zip_bytes = self
                    .fetch_bytes(url.clone())
                    .await
                    .with_context(|| format!("Failed to fetch bundle for '{}'", key))?;
                let component = Self::extract_bundle(&zip_bytes, key, key.name(), entry)?;
                Ok(Arc::new(component))
            }
        }
    }
}

impl StyleSource for TemplateFetcher {
    async fn read_style(&self, key: &TemplateKey, file: &str) -> Result<Option<String>> {
        match self.read_template_file(key, file).await? {
            Some(bytes) => Ok(Some(
                String::from_utf8(bytes).with_context(|| format!("{} is not valid UTF-8", file))?,
            )),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Device;

    #[test]
    fn test_build_url_appends_segments() {
        let base = Url::parse("https://example.com/templates/?ref=main").unwrap();
        let url = TemplateFetcher::build_url(&base, "login/desktop/default.zip").unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.com/templates/login/desktop/default.zip?ref=main"
        );
    }

    #[test]
    fn test_zip_round_trip_strips_prefix() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.vue"), "<template/>").unwrap();
        std::fs::create_dir_all(dir.path().join("assets")).unwrap();
        std::fs::write(dir.path().join("assets/logo.svg"), "<svg/>").unwrap();

        let key = TemplateKey::new("login", Device::Desktop, "default").unwrap();
        let bytes = TemplateFetcher::build_local_zip(dir.path(), "default").unwrap();
        let component = TemplateFetcher::extract_bundle(&bytes, &key, "default", "index.vue").unwrap();

        assert_eq!(component.entry_source(), Some(&b"<template/>"[..]));
        assert_eq!(component.file("assets/logo.svg"), Some(&b"<svg/>"[..]));
        assert_eq!(component.files.len(), 2);
    }

    #[test]
    fn test_extract_requires_entry() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.vue"), "x").unwrap();
        let key = TemplateKey::new("login", Device::Desktop, "default").unwrap();
        let bytes = TemplateFetcher::build_local_zip(dir.path(), "default").unwrap();
        assert!(TemplateFetcher::extract_bundle(&bytes, &key, "default", "index.tsx").is_err());
    }

    #[tokio::test]
    async fn test_enumerate_local_prefers_first_entry_module() {
        let root = tempfile::TempDir::new().unwrap();
        let dir = root.path().join("login/desktop/default");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("template.yaml"), "name: D\nversion: 1.0.0\n").unwrap();
        std::fs::write(dir.join("index.js"), "x").unwrap();
        std::fs::write(dir.join("index.vue"), "y").unwrap();

        let fetcher = TemplateFetcher::from_local(root.path().to_path_buf(), "test");
        let catalog = fetcher.enumerate().await.unwrap();

        assert_eq!(catalog.configs.len(), 1);
        assert_eq!(catalog.configs[0].location, "login/desktop/default/template.yaml");
        assert_eq!(catalog.components.len(), 1);
        assert_eq!(catalog.components[0].location, "login/desktop/default/index.vue");
        assert_eq!(catalog.components[0].loadable.entry(), "index.vue");
    }

    #[tokio::test]
    async fn test_enumerate_missing_root() {
        let fetcher = TemplateFetcher::from_local(PathBuf::from("/nonexistent/stencil"), "test");
        assert!(fetcher.enumerate().await.is_err());
    }

    #[tokio::test]
    async fn test_read_template_file_stays_inside_template() {
        let root = tempfile::TempDir::new().unwrap();
        let dir = root.path().join("login/desktop/default");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("style.css"), ".a {}").unwrap();
        std::fs::write(root.path().join("secret.txt"), "hidden").unwrap();

        let fetcher = TemplateFetcher::from_local(root.path().to_path_buf(), "test");
        let key = TemplateKey::new("login", Device::Desktop, "default").unwrap();

        let css = fetcher.read_style(&key, "style.css").await.unwrap();
        assert_eq!(css.as_deref(), Some(".a {}"));
        assert!(fetcher.read_template_file(&key, "../../../secret.txt").await.is_err());
        assert!(fetcher.read_template_file(&key, "/etc/passwd").await.is_err());
    }

    #[derive(Clone)]
    struct EnvHost;

    impl HostConfig for EnvHost {
        fn name(&self) -> &'static str {
            "env-host"
        }

        fn display_name(&self) -> &'static str {
            "Env Host"
        }

        fn default_template_url(&self) -> &'static str {
            "https://example.com/templates"
        }

        fn template_url_env(&self) -> &'static str {
            "STENCIL_FETCHER_TEST_URL"
        }

        fn template_dir_env(&self) -> &'static str {
            "STENCIL_FETCHER_TEST_DIR"
        }
    }

    // Env vars are process-wide, so every case lives in one test
    #[test]
    fn test_source_from_config_precedence() {
        std::env::remove_var("STENCIL_FETCHER_TEST_DIR");
        std::env::remove_var("STENCIL_FETCHER_TEST_URL");
        match TemplateSource::from_config(&EnvHost).unwrap() {
            TemplateSource::Remote(url) => assert_eq!(url.as_str(), "https://example.com/templates"),
            other => panic!("unexpected source: {:?}", other),
        }

        std::env::set_var("STENCIL_FETCHER_TEST_URL", "not a url");
        assert!(TemplateSource::from_config(&EnvHost).is_err());

        std::env::set_var("STENCIL_FETCHER_TEST_DIR", "/tmp/stencil-templates");
        match TemplateSource::from_config(&EnvHost).unwrap() {
            TemplateSource::Local(path) => assert_eq!(path, PathBuf::from("/tmp/stencil-templates")),
            other => panic!("unexpected source: {:?}", other),
        }

        std::env::remove_var("STENCIL_FETCHER_TEST_DIR");
        std::env::remove_var("STENCIL_FETCHER_TEST_URL");
    }
}
