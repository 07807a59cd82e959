//! Version checks for template configs

use anyhow::Result;
use semver::Version;

/// Compare the running library version against a template's minimum
/// Returns a warning message if the library is older than the template expects
pub fn check_compatibility(library_version: &str, min_version: &str) -> Option<String> {
    let library_ver = match parse_version(library_version) {
        Ok(v) => v,
        Err(_) => return None, // Can't compare, skip warning
    };

    let min_ver = match parse_version(min_version) {
        Ok(v) => v,
        Err(_) => return None, // Reported separately as an invalid version
    };

    if library_ver < min_ver {
        Some(format!(
            "template requires library version {} or newer, running {}",
            min_version, library_version
        ))
    } else {
        None
    }
}

/// Parse version string, handling various formats
pub fn parse_version(version_str: &str) -> Result<Version> {
    // Remove leading 'v' if present
    let cleaned = version_str.strip_prefix('v').unwrap_or(version_str);
    Version::parse(cleaned).map_err(|e| anyhow::anyhow!("Invalid version '{}': {}", version_str, e))
}
