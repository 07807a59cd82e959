//! Stencil Core - template registry and loader
//!
//! This library discovers UI template definitions laid out as
//! `<category>/<device>/<name>/`, registers their metadata, and resolves the
//! component bundles on demand with single-flight caching.
//!
//! # Architecture
//!
//! The library is organized into layers:
//!
//! - **Layer 1: Core Types** - Key codec, registry, component bundles
//! - **Layer 2: Discovery and Loading** - `Scanner` over an `AssetSource`, `Loader` over a `ComponentResolver`
//! - **Layer 3: Composition** - `TemplateKit` and the optional process-wide default
//! - **Layer 4: CLI/TUI Interface** - Optional cliclack-based browser (feature-gated)
//!
//! # Feature Flags
//!
//! - `tui` (default): Enables the cliclack-based template browser
//!
//! # Example Usage
//!
//! ```ignore
//! use stencil_core::{Device, DefaultHost, LoadOptions, TemplateKit, TemplateSource};
//!
//! let kit = TemplateKit::new(&DefaultHost, TemplateSource::local("templates".into()));
//! let scan = kit.scanner().scan().await?;
//! for warning in &scan.warnings {
//!     eprintln!("{}", warning);
//! }
//!
//! let login = kit.loader().load("login", Device::Desktop, "split", LoadOptions::default()).await?;
//! let fallback = scan.registry.resolve_default("login", Device::Desktop);
//! ```

pub mod component;
pub mod error;
pub mod host;
pub mod key;
pub mod kit;
pub mod loader;
pub mod registry;
pub mod scanner;
pub mod styles;
pub mod templates;

#[cfg(feature = "tui")]
pub mod tui;

// Re-export main types for convenience
pub use component::{Component, ComponentResolver, Loadable};
pub use error::{PreloadFailure, Result, TemplateError};
pub use host::{DefaultHost, HostConfig};
pub use key::{decode, encode, Device, TemplateKey};
pub use kit::{
    default_kit, get_loader, get_scanner, install_default, load_template, preload_template,
    reset_default, scan_templates, TemplateKit,
};
pub use loader::{LoadOptions, Loader, PreloadReport};
pub use registry::{Registry, RegistryCell, RegistryEntry, TemplateMetadata, TemplateQuery};
pub use scanner::{ScanResult, ScanWarning, Scanner};
pub use styles::{StyleSource, StyleTracker};
pub use templates::{
    export_component, AssetCatalog, AssetSource, TemplateConfig, TemplateFetcher, TemplateSource,
};

#[cfg(feature = "tui")]
pub use tui::browse;

/// Library version - compared against `min_library_version` in template configs
pub const LIBRARY_VERSION: &str = env!("CARGO_PKG_VERSION");
