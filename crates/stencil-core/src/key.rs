//! Canonical template keys
//!
//! Every template is identified by `(category, device, name)`, encoded as
//! `"{category}:{device}:{name}"`. Parts double as path segments in a
//! template tree, so they may not contain the separator, path separators,
//! or surrounding whitespace.

use crate::error::{Result, TemplateError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator between key parts
pub const SEPARATOR: char = ':';

/// Target device class of a template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Desktop,
    Tablet,
    Mobile,
}

impl Device {
    pub const ALL: [Device; 3] = [Device::Desktop, Device::Tablet, Device::Mobile];

    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Desktop => "desktop",
            Device::Tablet => "tablet",
            Device::Mobile => "mobile",
        }
    }

    /// Exact lowercase match, as used inside keys and template paths
    pub fn from_canonical(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|device| device.as_str() == s)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Device {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "desktop" => Ok(Device::Desktop),
            "tablet" => Ok(Device::Tablet),
            "mobile" => Ok(Device::Mobile),
            _ => Err(TemplateError::malformed(
                s,
                "device must be one of desktop, tablet, mobile",
            )),
        }
    }
}

/// Identity of a template across the registry and loader cache
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemplateKey {
    category: String,
    device: Device,
    name: String,
}

impl TemplateKey {
    /// Build a key, rejecting parts that would make decoding ambiguous
    pub fn new(category: impl Into<String>, device: Device, name: impl Into<String>) -> Result<Self> {
        let category = category.into();
        let name = name.into();
        validate_part(&category, "category")?;
        validate_part(&name, "name")?;
        Ok(Self {
            category,
            device,
            name,
        })
    }

    /// Decode a canonical key string
    pub fn parse(key: &str) -> Result<Self> {
        let parts: Vec<&str> = key.split(SEPARATOR).collect();
        if parts.len() != 3 {
            return Err(TemplateError::malformed(
                key,
                format!("expected 3 parts separated by '{}', found {}", SEPARATOR, parts.len()),
            ));
        }
        let device = Device::from_canonical(parts[1])
            .ok_or_else(|| TemplateError::malformed(key, format!("unknown device '{}'", parts[1])))?;
        Self::new(parts[0], device, parts[2])
            .map_err(|e| match e {
                TemplateError::MalformedKey { reason, .. } => TemplateError::malformed(key, reason),
                other => other,
            })
    }

    /// Derive a key from a location such as `login/desktop/split/template.yaml`
    ///
    /// Only the first three path segments are significant.
    pub fn from_location(location: &str) -> Result<Self> {
        let segments: Vec<&str> = location
            .split(['/', '\\'])
            .filter(|s| !s.is_empty() && *s != ".")
            .collect();
        if segments.len() < 3 {
            return Err(TemplateError::malformed(
                location,
                "location must start with category/device/name",
            ));
        }
        let device = Device::from_canonical(segments[1]).ok_or_else(|| {
            TemplateError::malformed(location, format!("unknown device '{}'", segments[1]))
        })?;
        Self::new(segments[0], device, segments[2])
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Relative directory of this template inside a template tree
    pub fn relative_dir(&self) -> String {
        format!("{}/{}/{}", self.category, self.device, self.name)
    }

    /// Decompose into owned parts
    pub fn into_parts(self) -> (String, Device, String) {
        (self.category, self.device, self.name)
    }
}

impl fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.category,
            self.device,
            self.name,
            sep = SEPARATOR
        )
    }
}

impl FromStr for TemplateKey {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Encode a triple into its canonical key string
pub fn encode(category: &str, device: Device, name: &str) -> Result<String> {
    TemplateKey::new(category, device, name).map(|k| k.to_string())
}

/// Decode a canonical key string into its triple
pub fn decode(key: &str) -> Result<(String, Device, String)> {
    TemplateKey::parse(key).map(TemplateKey::into_parts)
}

fn validate_part(part: &str, what: &str) -> Result<()> {
    if part.is_empty() {
        return Err(TemplateError::malformed(part, format!("{} is empty", what)));
    }
    if part.contains(SEPARATOR) {
        return Err(TemplateError::malformed(
            part,
            format!("{} contains the separator '{}'", what, SEPARATOR),
        ));
    }
    if part.contains(['/', '\\']) {
        return Err(TemplateError::malformed(
            part,
            format!("{} contains a path separator", what),
        ));
    }
    if part.trim() != part {
        return Err(TemplateError::malformed(
            part,
            format!("{} has leading or trailing whitespace", what),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_canonical_form() {
        assert_eq!(
            encode("login", Device::Desktop, "split").unwrap(),
            "login:desktop:split"
        );
    }

    #[test]
    fn test_round_trip_across_devices() {
        for device in Device::ALL {
            for (category, name) in [("login", "default"), ("dashboard", "analytics-v2"), ("a", "b_c.d")] {
                let key = encode(category, device, name).unwrap();
                let (c, d, n) = decode(&key).unwrap();
                assert_eq!((c.as_str(), d, n.as_str()), (category, device, name));
            }
        }
    }

    #[test]
    fn test_rejects_separator_in_parts() {
        assert!(matches!(
            encode("log:in", Device::Mobile, "x"),
            Err(TemplateError::MalformedKey { .. })
        ));
        assert!(encode("login", Device::Mobile, "a:b").is_err());
    }

    #[test]
    fn test_rejects_empty_and_padded_parts() {
        assert!(encode("", Device::Tablet, "x").is_err());
        assert!(encode("login", Device::Tablet, " x").is_err());
        assert!(encode("login/admin", Device::Tablet, "x").is_err());
    }

    #[test]
    fn test_decode_wrong_separator_count() {
        for bad in ["login:desktop", "login:desktop:a:b", "", "login"] {
            let err = decode(bad).unwrap_err();
            assert!(matches!(err, TemplateError::MalformedKey { ref key, .. } if key == bad));
        }
    }

    #[test]
    fn test_decode_unknown_device() {
        assert!(decode("login:watch:default").is_err());
    }

    #[test]
    fn test_decode_requires_lowercase_device() {
        assert!(matches!(
            decode("login:DESKTOP:split"),
            Err(TemplateError::MalformedKey { .. })
        ));
        assert!(TemplateKey::parse("login:Desktop:split").is_err());
        assert!(TemplateKey::from_location("login/Mobile/split/index.vue").is_err());
        assert_eq!(Device::from_canonical("tablet"), Some(Device::Tablet));
    }

    #[test]
    fn test_device_parse_is_case_insensitive() {
        assert_eq!("Desktop".parse::<Device>().unwrap(), Device::Desktop);
        assert_eq!("MOBILE".parse::<Device>().unwrap(), Device::Mobile);
    }

    #[test]
    fn test_from_location() {
        let key = TemplateKey::from_location("login/desktop/split/template.yaml").unwrap();
        assert_eq!(key.to_string(), "login:desktop:split");

        let key = TemplateKey::from_location("./dashboard/mobile/compact").unwrap();
        assert_eq!(key.relative_dir(), "dashboard/mobile/compact");

        assert!(TemplateKey::from_location("login/desktop").is_err());
        assert!(TemplateKey::from_location("login/phone/x/index.vue").is_err());
    }
}
