//! Error types for template discovery and loading.
//!
//! [`TemplateError`] is the domain error shared by the registry, scanner and
//! loader. It is `Clone` because a single failed load is reported to every
//! caller that coalesced onto it. IO and network plumbing inside the fetcher
//! uses `anyhow` and is folded into a variant here at the boundary.

use thiserror::Error;

/// Core error type for stencil operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    /// A key string or key part does not form a valid `category:device:name` triple.
    #[error("Malformed template key '{key}': {reason}")]
    MalformedKey { key: String, reason: String },

    /// Two distinct definitions map to the same key.
    #[error("Duplicate template key '{key}': already registered from {existing}, rejected {incoming}")]
    DuplicateKey {
        key: String,
        existing: String,
        incoming: String,
    },

    /// The requested key is not present in the registry.
    #[error("Template not found: {key}")]
    TemplateNotFound { key: String },

    /// The component resolver rejected.
    #[error("Failed to load template '{key}': {message}")]
    LoadFailed { key: String, message: String },

    /// A template config could not be read or parsed.
    #[error("Invalid template config at {location}: {message}")]
    InvalidConfig { location: String, message: String },

    /// Every member of a preload batch failed.
    #[error("All {} template preloads failed", failures.len())]
    BatchFailed { failures: Vec<PreloadFailure> },

    /// The asset source itself could not be enumerated.
    #[error("Template source unavailable: {message}")]
    SourceUnavailable { message: String },
}

/// One failed member of a preload batch.
#[derive(Debug, Clone, PartialEq)]
pub struct PreloadFailure {
    pub key: String,
    pub error: TemplateError,
}

impl TemplateError {
    pub(crate) fn malformed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn source_unavailable(err: &anyhow::Error) -> Self {
        Self::SourceUnavailable {
            message: format!("{:#}", err),
        }
    }
}

/// Result type alias for stencil operations.
pub type Result<T> = std::result::Result<T, TemplateError>;
