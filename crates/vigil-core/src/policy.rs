//! Decision policy — every tunable constant used by the comparator,
//! the enrollment aggregator and the matcher lives here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::CoreError;

// --- Named defaults (no magic numbers in the matcher) ---
pub const DEFAULT_SAMPLE_CAPACITY: usize = 5;
pub const DEFAULT_DESCRIPTOR_LEN: usize = 128;
pub const DEFAULT_LOW_THRESHOLD: f32 = 0.35;
pub const DEFAULT_HIGH_THRESHOLD: f32 = 0.8;
pub const DEFAULT_MID_SCALE: f32 = 0.6; // NOT high - low; empirical
pub const DEFAULT_ACCEPT_SIMILARITY: f32 = 0.5;
pub const DEFAULT_TIER_HIGH_CUTOFF: f32 = 0.75;
pub const DEFAULT_TIER_MEDIUM_CUTOFF: f32 = 0.5;

/// Coarse bucket derived from a similarity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfidenceTier::High => "high",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::Low => "low",
        };
        f.write_str(s)
    }
}

/// Thresholds and limits shared by enrollment and matching.
///
/// Deserializes from TOML with every field optional; missing fields take
/// the defaults above.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionPolicy {
    /// Maximum samples kept per enrollment record (N_max).
    pub sample_capacity: usize,
    /// Descriptor length expected from the extraction model.
    pub descriptor_len: usize,
    /// At or below this distance similarity is 1.0.
    pub low_threshold: f32,
    /// At or above this distance similarity is 0.0.
    pub high_threshold: f32,
    /// Divisor of the linear segment between the two thresholds.
    pub mid_scale: f32,
    /// Minimum similarity to accept any match.
    pub accept_similarity: f32,
    pub tier_high_cutoff: f32,
    pub tier_medium_cutoff: f32,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            sample_capacity: DEFAULT_SAMPLE_CAPACITY,
            descriptor_len: DEFAULT_DESCRIPTOR_LEN,
            low_threshold: DEFAULT_LOW_THRESHOLD,
            high_threshold: DEFAULT_HIGH_THRESHOLD,
            mid_scale: DEFAULT_MID_SCALE,
            accept_similarity: DEFAULT_ACCEPT_SIMILARITY,
            tier_high_cutoff: DEFAULT_TIER_HIGH_CUTOFF,
            tier_medium_cutoff: DEFAULT_TIER_MEDIUM_CUTOFF,
        }
    }
}

impl DecisionPolicy {
    /// Parse a policy from TOML and validate it.
    pub fn from_toml_str(src: &str) -> Result<Self, CoreError> {
        let policy: DecisionPolicy =
            toml::from_str(src).map_err(|e| CoreError::InvalidPolicy(e.to_string()))?;
        policy.validate()?;
        Ok(policy)
    }

    /// Read a TOML policy file. Matching itself never touches the filesystem;
    /// this is for daemon and CLI startup.
    pub fn from_toml_file(path: &Path) -> Result<Self, CoreError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CoreError::InvalidPolicy(format!("reading {}: {e}", path.display())))?;
        Self::from_toml_str(&raw).map_err(|e| match e {
            CoreError::InvalidPolicy(msg) => CoreError::InvalidPolicy(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    /// Reject policies whose constants contradict each other.
    pub fn validate(&self) -> Result<(), CoreError> {
        let fail = |msg: String| -> Result<(), CoreError> { Err(CoreError::InvalidPolicy(msg)) };

        if self.sample_capacity == 0 {
            return fail("sample_capacity must be at least 1".into());
        }
        if self.descriptor_len == 0 {
            return fail("descriptor_len must be at least 1".into());
        }
        if !(self.mid_scale.is_finite() && self.mid_scale > 0.0) {
            return fail(format!("mid_scale must be positive, got {}", self.mid_scale));
        }
        if !(self.low_threshold >= 0.0 && self.low_threshold <= self.high_threshold) {
            return fail(format!(
                "thresholds must satisfy 0 <= low <= high, got low={} high={}",
                self.low_threshold, self.high_threshold
            ));
        }
        for (name, value) in [
            ("accept_similarity", self.accept_similarity),
            ("tier_high_cutoff", self.tier_high_cutoff),
            ("tier_medium_cutoff", self.tier_medium_cutoff),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return fail(format!("{name} must be within [0, 1], got {value}"));
            }
        }
        if self.tier_medium_cutoff > self.tier_high_cutoff {
            return fail(format!(
                "tier_medium_cutoff ({}) exceeds tier_high_cutoff ({})",
                self.tier_medium_cutoff, self.tier_high_cutoff
            ));
        }
        Ok(())
    }

    pub fn tier(&self, similarity: f32) -> ConfidenceTier {
        if similarity >= self.tier_high_cutoff {
            ConfidenceTier::High
        } else if similarity >= self.tier_medium_cutoff {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }

    pub fn accepts(&self, similarity: f32) -> bool {
        similarity >= self.accept_similarity
    }
}
