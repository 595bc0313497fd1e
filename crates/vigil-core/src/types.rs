use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Face descriptor produced by the external extraction model (typically 128-dimensional).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub values: Vec<f32>,
    /// Model version that produced this descriptor (e.g., "face_recognition_v1").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    /// Tag the descriptor with the model version that produced it.
    pub fn with_model_version(mut self, version: impl Into<String>) -> Self {
        self.model_version = Some(version.into());
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Check the inbound contract: non-empty, `expected_len` long, all values finite.
    pub fn validate(&self, expected_len: usize) -> Result<(), CoreError> {
        if self.values.is_empty() {
            return Err(CoreError::InvalidDescriptor("descriptor is empty".into()));
        }
        if self.values.len() != expected_len {
            return Err(CoreError::InvalidDescriptor(format!(
                "expected {expected_len}-dim descriptor, got {}",
                self.values.len()
            )));
        }
        if let Some(pos) = self.values.iter().position(|v| !v.is_finite()) {
            return Err(CoreError::InvalidDescriptor(format!(
                "non-finite value at index {pos}"
            )));
        }
        Ok(())
    }
}

/// Opaque identifier of an enrolled identity (a visitor).
///
/// Ordering is lexicographic; the gallery iterates identities in this order,
/// which makes 1:N tie-breaks reproducible.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(String);

impl IdentityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdentityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for IdentityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_expected_length() {
        let d = Descriptor::new(vec![0.1, 0.2, 0.3]);
        assert!(d.validate(3).is_ok());
    }

    #[test]
    fn test_validate_rejects_empty() {
        let d = Descriptor::new(vec![]);
        assert!(matches!(d.validate(0), Err(CoreError::InvalidDescriptor(_))));
    }

    #[test]
    fn test_validate_rejects_wrong_length() {
        let d = Descriptor::new(vec![0.0; 64]);
        assert!(matches!(d.validate(128), Err(CoreError::InvalidDescriptor(_))));
    }

    #[test]
    fn test_validate_rejects_nan() {
        let d = Descriptor::new(vec![0.0, f32::NAN]);
        assert!(matches!(d.validate(2), Err(CoreError::InvalidDescriptor(_))));
    }

    #[test]
    fn test_identity_ordering_is_lexicographic() {
        let mut ids = vec![IdentityId::from("visitor-b"), IdentityId::from("visitor-a")];
        ids.sort();
        assert_eq!(ids[0].as_str(), "visitor-a");
    }

    #[test]
    fn test_descriptor_json_omits_missing_model_version() {
        let json = serde_json::to_string(&Descriptor::new(vec![1.0])).unwrap();
        assert_eq!(json, r#"{"values":[1.0]}"#);
    }
}
