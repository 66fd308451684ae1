//! Bundle descriptor: the JSON document inside the `DESC` chunk

use serde::{Deserialize, Serialize};

use crate::error::{DdfError, Result};

/// A descriptor key that accepts a single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    pub fn contains(&self, value: &str) -> bool {
        match self {
            StringOrList::One(s) => s == value,
            StringOrList::Many(list) => list.iter().any(|s| s == value),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            StringOrList::One(s) => s.is_empty(),
            StringOrList::Many(list) => list.is_empty(),
        }
    }
}

/// Release status of a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleStatus {
    Stable,
    #[default]
    Draft,
    Gold,
    Bronze,
}

/// The JSON descriptor of a bundle. Only the keys the gateway acts on are
/// typed; everything else rides along in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleDescriptor {
    /// Manufacturer name(s) the bundle matches
    pub manufacturername: StringOrList,
    /// Model id(s) the bundle matches
    pub modelid: StringOrList,
    /// Schema identifier
    pub schema: String,
    /// Human-readable product name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    /// Vendor display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    /// Battery device that sleeps between reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleeper: Option<bool>,
    /// Release status
    #[serde(default)]
    pub status: BundleStatus,
    /// Match expression evaluated against the device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matchexpr: Option<String>,
    /// Bundle version, dotted decimal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Sub-device definitions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subdevices: Vec<serde_json::Value>,
    /// Binding definitions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<serde_json::Value>,
    /// Untyped remainder of the descriptor
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl BundleDescriptor {
    /// Parse and validate descriptor JSON.
    pub fn parse(json: &[u8]) -> Result<Self> {
        let desc: BundleDescriptor = serde_json::from_slice(json)?;
        if desc.manufacturername.is_empty() {
            return Err(DdfError::MissingKey("manufacturername"));
        }
        if desc.modelid.is_empty() {
            return Err(DdfError::MissingKey("modelid"));
        }
        if desc.schema.is_empty() {
            return Err(DdfError::MissingKey("schema"));
        }
        Ok(desc)
    }

    /// True when the descriptor claims the given manufacturer/model pair.
    pub fn matches(&self, manufacturer: &str, model: &str) -> bool {
        self.manufacturername.contains(manufacturer) && self.modelid.contains(model)
    }

    /// Version as a comparable tuple; unparsable or absent versions sort
    /// lowest.
    pub fn version_key(&self) -> (u32, u32, u32) {
        let Some(version) = &self.version else {
            return (0, 0, 0);
        };
        let mut parts = version.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
        (
            parts.next().unwrap_or(0),
            parts.next().unwrap_or(0),
            parts.next().unwrap_or(0),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_descriptor() {
        let desc = BundleDescriptor::parse(
            br#"{"manufacturername":"Acme","modelid":"bulb-1","schema":"devcap1.schema.json"}"#,
        )
        .unwrap();
        assert!(desc.matches("Acme", "bulb-1"));
        assert!(!desc.matches("Acme", "bulb-2"));
        assert_eq!(desc.status, BundleStatus::Draft);
    }

    #[test]
    fn test_list_keys() {
        let desc = BundleDescriptor::parse(
            br#"{"manufacturername":["Acme","ACME Ltd"],"modelid":["a","b"],"schema":"s"}"#,
        )
        .unwrap();
        assert!(desc.matches("ACME Ltd", "b"));
    }

    #[test]
    fn test_missing_required_key() {
        let err =
            BundleDescriptor::parse(br#"{"modelid":"m","schema":"s"}"#).unwrap_err();
        assert!(matches!(err, DdfError::MalformedDescriptor(_)));

        let err = BundleDescriptor::parse(
            br#"{"manufacturername":"","modelid":"m","schema":"s"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, DdfError::MissingKey("manufacturername")));
    }

    #[test]
    fn test_version_key_ordering() {
        let mk = |v: &str| {
            BundleDescriptor::parse(
                format!(
                    r#"{{"manufacturername":"m","modelid":"i","schema":"s","version":"{v}"}}"#
                )
                .as_bytes(),
            )
            .unwrap()
        };
        assert!(mk("1.10.0").version_key() > mk("1.9.9").version_key());
        assert!(mk("2.0").version_key() > mk("1.99.99").version_key());
        let no_version = BundleDescriptor::parse(
            br#"{"manufacturername":"m","modelid":"i","schema":"s"}"#,
        )
        .unwrap();
        assert_eq!(no_version.version_key(), (0, 0, 0));
    }
}
