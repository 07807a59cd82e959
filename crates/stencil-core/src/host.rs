//! Host configuration trait for embedding applications
//!
//! Each application that embeds the registry implements this trait to say
//! where its templates live and how the loader should behave.

use crate::templates::manifest::DEFAULT_COMPONENT_FILES;

/// Configuration trait for applications hosting a template tree
///
/// Each host defines:
/// - Identity (name, display name, user agent)
/// - Template source URL and the environment variables overriding it
/// - Loader cache bound
/// - Which files count as component entry modules
pub trait HostConfig: Clone + Send + Sync + 'static {
    /// Internal host name (used for env vars, user agent)
    fn name(&self) -> &'static str;

    /// Human-readable display name
    fn display_name(&self) -> &'static str;

    /// Default URL for fetching templates
    fn default_template_url(&self) -> &'static str;

    /// Environment variable name for overriding the template URL
    fn template_url_env(&self) -> &'static str;

    /// Environment variable name pointing at a local template directory
    /// (takes precedence over the URL)
    fn template_dir_env(&self) -> &'static str;

    /// Version compared against `min_library_version` in template configs
    fn library_version(&self) -> &'static str {
        crate::LIBRARY_VERSION
    }

    /// Upper bound on resolved components kept by the loader
    fn max_cached(&self) -> Option<usize> {
        None
    }

    /// Entry module file names, in order of preference
    fn component_files(&self) -> &'static [&'static str] {
        DEFAULT_COMPONENT_FILES
    }

    /// User agent string for HTTP requests
    fn user_agent(&self) -> &'static str {
        self.name()
    }
}

/// Host used by the process-wide default toolkit
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHost;

impl HostConfig for DefaultHost {
    fn name(&self) -> &'static str {
        "stencil"
    }

    fn display_name(&self) -> &'static str {
        "Stencil"
    }

    fn default_template_url(&self) -> &'static str {
        "https://templates.stencil.dev/v1"
    }

    fn template_url_env(&self) -> &'static str {
        "STENCIL_TEMPLATE_URL"
    }

    fn template_dir_env(&self) -> &'static str {
        "STENCIL_TEMPLATE_DIR"
    }
}
