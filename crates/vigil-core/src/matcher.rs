//! Identity matcher — 1:1 verification and 1:N identification.

use serde::{Deserialize, Serialize};

use crate::comparator::{distance, to_similarity_score};
use crate::enrollment::{EnrollmentRecord, Gallery};
use crate::error::CoreError;
use crate::policy::{ConfidenceTier, DecisionPolicy};
use crate::types::{Descriptor, IdentityId};

/// Points at the stored sample that produced a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRef {
    pub identity: IdentityId,
    /// Position of the sample inside its enrollment record.
    pub index: usize,
}

/// Outcome of matching a probe against one record or the whole gallery.
///
/// A rejected match keeps the best similarity seen so a near miss can be
/// shown to an operator, but never names an identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Matched identity (if any).
    pub identity: Option<IdentityId>,
    /// Best similarity found, in [0, 1].
    pub similarity: f32,
    pub tier: ConfidenceTier,
    /// Distance to the best sample (if any sample was compared).
    pub distance: Option<f32>,
    /// Sample that produced the accepted match.
    pub sample: Option<SampleRef>,
}

impl MatchResult {
    pub fn no_match(similarity: f32) -> Self {
        Self {
            identity: None,
            similarity,
            tier: ConfidenceTier::Low,
            distance: None,
            sample: None,
        }
    }

    pub fn is_match(&self) -> bool {
        self.identity.is_some()
    }
}

/// Best-scoring sample of one record.
#[derive(Debug, Clone, Copy)]
struct Best {
    similarity: f32,
    distance: f32,
    index: usize,
}

/// Strategy for comparing probe descriptors against enrolled identities.
pub trait Matcher {
    /// 1:1 — does `probe` match the claimed identity's record?
    fn verify(&self, probe: &Descriptor, claimed: &EnrollmentRecord) -> Result<MatchResult, CoreError>;

    /// 1:N — which enrolled identity, if any, does `probe` match?
    fn identify(&self, probe: &Descriptor, gallery: &Gallery) -> Result<MatchResult, CoreError>;

    /// Verify several probes from one capture burst; the best result wins.
    fn verify_any(&self, probes: &[Descriptor], claimed: &EnrollmentRecord) -> Result<MatchResult, CoreError> {
        best_of(probes, |p| self.verify(p, claimed))
    }

    /// Identify several probes from one capture burst; the best result wins.
    fn identify_any(&self, probes: &[Descriptor], gallery: &Gallery) -> Result<MatchResult, CoreError> {
        best_of(probes, |p| self.identify(p, gallery))
    }
}

/// Pick the best result over a burst of probes; the earliest probe wins ties.
fn best_of<F>(probes: &[Descriptor], mut run: F) -> Result<MatchResult, CoreError>
where
    F: FnMut(&Descriptor) -> Result<MatchResult, CoreError>,
{
    if probes.is_empty() {
        return Err(CoreError::InvalidDescriptor("no probe descriptors supplied".into()));
    }

    let mut best: Option<MatchResult> = None;
    for probe in probes {
        let result = run(probe)?;
        let is_better = match &best {
            None => true,
            Some(prev) => result.similarity > prev.similarity,
        };
        if is_better {
            best = Some(result);
        }
    }
    Ok(best.unwrap_or_else(|| MatchResult::no_match(0.0)))
}

/// Euclidean-distance matcher driven by a [`DecisionPolicy`].
///
/// Scores every sample of every non-empty record. Ties are broken by strict
/// comparison in iteration order (identity ascending, then sample order),
/// so the first candidate reaching the maximum wins.
#[derive(Debug, Clone, Default)]
pub struct DistanceMatcher {
    policy: DecisionPolicy,
}

impl DistanceMatcher {
    pub fn new(policy: DecisionPolicy) -> Result<Self, CoreError> {
        policy.validate()?;
        Ok(Self { policy })
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    fn best_in_record(&self, probe: &Descriptor, record: &EnrollmentRecord) -> Result<Option<Best>, CoreError> {
        let mut best: Option<Best> = None;
        for (index, candidate) in record.candidates().enumerate() {
            let dist = distance(probe, candidate)?;
            let similarity = to_similarity_score(dist, &self.policy);
            if best.map_or(true, |b| similarity > b.similarity) {
                best = Some(Best { similarity, distance: dist, index });
            }
        }
        Ok(best)
    }

    fn decide(&self, identity: &IdentityId, best: Option<Best>) -> MatchResult {
        match best {
            Some(b) if self.policy.accepts(b.similarity) => MatchResult {
                identity: Some(identity.clone()),
                similarity: b.similarity,
                tier: self.policy.tier(b.similarity),
                distance: Some(b.distance),
                sample: Some(SampleRef {
                    identity: identity.clone(),
                    index: b.index,
                }),
            },
            Some(b) => MatchResult {
                distance: Some(b.distance),
                ..MatchResult::no_match(b.similarity)
            },
            None => MatchResult::no_match(0.0),
        }
    }
}

impl Matcher for DistanceMatcher {
    fn verify(&self, probe: &Descriptor, claimed: &EnrollmentRecord) -> Result<MatchResult, CoreError> {
        probe.validate(self.policy.descriptor_len)?;

        let best = self.best_in_record(probe, claimed)?;
        let result = self.decide(claimed.identity(), best);

        tracing::debug!(
            identity = %claimed.identity(),
            samples = claimed.len(),
            similarity = result.similarity,
            matched = result.is_match(),
            "verify: compared"
        );
        Ok(result)
    }

    fn identify(&self, probe: &Descriptor, gallery: &Gallery) -> Result<MatchResult, CoreError> {
        probe.validate(self.policy.descriptor_len)?;

        let mut best: Option<(&IdentityId, Best)> = None;
        for record in gallery.iter().filter(|r| !r.is_empty()) {
            // records from another model generation are skipped, not fatal
            let candidate = match self.best_in_record(probe, record) {
                Ok(Some(candidate)) => candidate,
                Ok(None) => continue,
                Err(e @ (CoreError::ModelMismatch { .. } | CoreError::DimensionMismatch { .. })) => {
                    tracing::warn!(identity = %record.identity(), error = %e, "identify: record skipped");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if best.map_or(true, |(_, b)| candidate.similarity > b.similarity) {
                best = Some((record.identity(), candidate));
            }
        }

        let result = match best {
            Some((identity, b)) => self.decide(identity, Some(b)),
            None => MatchResult::no_match(0.0),
        };

        tracing::debug!(
            population = gallery.len(),
            similarity = result.similarity,
            identity = ?result.identity.as_ref().map(IdentityId::as_str),
            "identify: compared"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stretched curve so mid-range similarities are reachable with small vectors:
    /// similarity = 1 - distance / 10 for distances in (0, 10).
    fn wide_policy() -> DecisionPolicy {
        DecisionPolicy {
            descriptor_len: 2,
            low_threshold: 0.0,
            high_threshold: 10.0,
            mid_scale: 10.0,
            ..Default::default()
        }
    }

    fn d(x: f32, y: f32) -> Descriptor {
        Descriptor::new(vec![x, y])
    }

    fn gallery(policy: &DecisionPolicy, entries: &[(&str, Descriptor)]) -> Gallery {
        let mut g = Gallery::new();
        for (id, desc) in entries {
            g.enroll((*id).into(), desc.clone(), 0.9, policy).unwrap();
        }
        g
    }

    #[test]
    fn test_verify_exact_descriptor_matches() {
        let policy = DecisionPolicy { descriptor_len: 2, ..Default::default() };
        let g = gallery(&policy, &[("alice", d(0.2, 0.4))]);
        let matcher = DistanceMatcher::new(policy).unwrap();

        let result = matcher.verify(&d(0.2, 0.4), g.get(&"alice".into()).unwrap()).unwrap();
        assert!(result.is_match());
        assert_eq!(result.similarity, 1.0);
        assert_eq!(result.tier, ConfidenceTier::High);
        assert_eq!(result.distance, Some(0.0));
        assert_eq!(result.sample, Some(SampleRef { identity: "alice".into(), index: 0 }));
    }

    #[test]
    fn test_verify_takes_best_sample_not_average() {
        let policy = wide_policy();
        let mut g = Gallery::new();
        g.enroll("alice".into(), d(9.0, 0.0), 0.9, &policy).unwrap();
        g.enroll("alice".into(), d(1.0, 0.0), 0.8, &policy).unwrap();
        g.enroll("alice".into(), d(8.0, 0.0), 0.7, &policy).unwrap();
        let matcher = DistanceMatcher::new(policy).unwrap();

        let result = matcher.verify(&d(0.0, 0.0), g.get(&"alice".into()).unwrap()).unwrap();
        assert!(result.is_match());
        assert!((result.similarity - 0.9).abs() < 1e-6);
        assert_eq!(result.sample.unwrap().index, 1);
    }

    #[test]
    fn test_verify_rejection_keeps_diagnostic_similarity() {
        let policy = wide_policy();
        let g = gallery(&policy, &[("alice", d(6.0, 0.0))]);
        let matcher = DistanceMatcher::new(policy).unwrap();

        let result = matcher.verify(&d(0.0, 0.0), g.get(&"alice".into()).unwrap()).unwrap();
        assert!(!result.is_match());
        assert!((result.similarity - 0.4).abs() < 1e-6);
        assert_eq!(result.tier, ConfidenceTier::Low);
        assert!(result.sample.is_none());
    }

    #[test]
    fn test_verify_empty_record_is_no_match() {
        let matcher = DistanceMatcher::new(wide_policy()).unwrap();
        let record = EnrollmentRecord::new("ghost".into(), 5);
        let result = matcher.verify(&d(0.0, 0.0), &record).unwrap();
        assert_eq!(result, MatchResult::no_match(0.0));
    }

    #[test]
    fn test_verify_rejects_malformed_probe() {
        let policy = DecisionPolicy { descriptor_len: 2, ..Default::default() };
        let g = gallery(&policy, &[("alice", d(0.2, 0.4))]);
        let matcher = DistanceMatcher::new(policy).unwrap();
        let probe = Descriptor::new(vec![0.2, 0.4, 0.0]);
        let err = matcher.verify(&probe, g.get(&"alice".into()).unwrap()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidDescriptor(_)));
    }

    #[test]
    fn test_identify_picks_clear_winner() {
        // A scores 0.9, B scores 0.2
        let policy = wide_policy();
        let g = gallery(&policy, &[("A", d(1.0, 0.0)), ("B", d(8.0, 0.0))]);
        let matcher = DistanceMatcher::new(policy).unwrap();

        let result = matcher.identify(&d(0.0, 0.0), &g).unwrap();
        assert_eq!(result.identity, Some("A".into()));
        assert_eq!(result.tier, ConfidenceTier::High);
        assert!((result.similarity - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_identify_medium_tier() {
        let policy = wide_policy();
        let g = gallery(&policy, &[("A", d(4.0, 0.0)), ("B", d(8.0, 0.0))]);
        let matcher = DistanceMatcher::new(policy).unwrap();

        let result = matcher.identify(&d(0.0, 0.0), &g).unwrap();
        assert_eq!(result.identity, Some("A".into()));
        assert_eq!(result.tier, ConfidenceTier::Medium);
    }

    #[test]
    fn test_identify_near_miss_is_no_match_not_error() {
        let policy = wide_policy();
        let g = gallery(&policy, &[("A", d(6.0, 0.0)), ("B", d(9.0, 0.0))]);
        let matcher = DistanceMatcher::new(policy).unwrap();

        let result = matcher.identify(&d(0.0, 0.0), &g).unwrap();
        assert!(!result.is_match());
        assert!((result.similarity - 0.4).abs() < 1e-6);
        assert!(result.distance.is_some());
    }

    #[test]
    fn test_identify_tie_goes_to_lowest_identity() {
        let policy = wide_policy();
        // enrolled out of order; both at distance 1
        let g = gallery(&policy, &[("visitor-9", d(0.0, 1.0)), ("visitor-1", d(1.0, 0.0))]);
        let matcher = DistanceMatcher::new(policy).unwrap();

        for _ in 0..3 {
            let result = matcher.identify(&d(0.0, 0.0), &g).unwrap();
            assert_eq!(result.identity, Some("visitor-1".into()));
        }
    }

    #[test]
    fn test_identify_skips_empty_records() {
        let policy = wide_policy();
        let mut g = gallery(&policy, &[("B", d(1.0, 0.0))]);
        g.insert_record(EnrollmentRecord::new("A".into(), 5));
        let matcher = DistanceMatcher::new(policy).unwrap();

        let result = matcher.identify(&d(0.0, 0.0), &g).unwrap();
        assert_eq!(result.identity, Some("B".into()));
    }

    #[test]
    fn test_identify_skips_records_of_other_model() {
        let policy = wide_policy();
        let mut g = Gallery::new();
        g.enroll("alice".into(), d(1.0, 0.0).with_model_version("v1"), 0.9, &policy).unwrap();
        g.enroll("bob".into(), d(1.0, 0.0).with_model_version("v2"), 0.9, &policy).unwrap();
        let matcher = DistanceMatcher::new(policy).unwrap();

        let query = d(1.0, 0.0).with_model_version("v1");
        let result = matcher.identify(&query, &g).unwrap();
        assert_eq!(result.identity, Some("alice".into()));
        assert_eq!(result.similarity, 1.0);

        // bob sorts after alice; a v2 query must still reach him
        let query = d(1.0, 0.0).with_model_version("v2");
        let result = matcher.identify(&query, &g).unwrap();
        assert_eq!(result.identity, Some("bob".into()));
    }

    #[test]
    fn test_identify_only_incomparable_records_is_no_match() {
        let policy = wide_policy();
        let mut g = Gallery::new();
        g.enroll("bob".into(), d(1.0, 0.0).with_model_version("v2"), 0.9, &policy).unwrap();
        let matcher = DistanceMatcher::new(policy).unwrap();

        let result = matcher.identify(&d(1.0, 0.0).with_model_version("v1"), &g).unwrap();
        assert_eq!(result, MatchResult::no_match(0.0));
    }

    #[test]
    fn test_verify_other_model_is_error() {
        let policy = wide_policy();
        let mut g = Gallery::new();
        g.enroll("bob".into(), d(1.0, 0.0).with_model_version("v2"), 0.9, &policy).unwrap();
        let matcher = DistanceMatcher::new(policy).unwrap();

        let query = d(1.0, 0.0).with_model_version("v1");
        let err = matcher.verify(&query, g.get(&"bob".into()).unwrap()).unwrap_err();
        assert!(matches!(err, CoreError::ModelMismatch { .. }));
    }

    #[test]
    fn test_identify_empty_gallery() {
        let matcher = DistanceMatcher::new(wide_policy()).unwrap();
        let result = matcher.identify(&d(0.0, 0.0), &Gallery::new()).unwrap();
        assert_eq!(result, MatchResult::no_match(0.0));
    }

    #[test]
    fn test_identify_default_curve_real_descriptors() {
        let policy = DecisionPolicy::default();
        let base: Vec<f32> = (0..128).map(|i| (i as f32 * 0.37).sin() * 0.1).collect();
        let same: Vec<f32> = base.iter().map(|v| v + 0.01).collect();
        let other: Vec<f32> = base.iter().map(|v| -v + 0.1).collect();

        let mut g = Gallery::new();
        g.enroll("pdl-visitor-1".into(), Descriptor::new(same), 0.95, &policy).unwrap();
        g.enroll("pdl-visitor-2".into(), Descriptor::new(other), 0.95, &policy).unwrap();
        let matcher = DistanceMatcher::new(policy).unwrap();

        // distance to "same" is sqrt(128) * 0.01 ≈ 0.113
        let result = matcher.identify(&Descriptor::new(base), &g).unwrap();
        assert_eq!(result.identity, Some("pdl-visitor-1".into()));
        assert_eq!(result.similarity, 1.0);
    }

    #[test]
    fn test_identify_is_deterministic() {
        let policy = wide_policy();
        let g = gallery(&policy, &[("A", d(2.0, 1.0)), ("B", d(3.0, 3.0))]);
        let matcher = DistanceMatcher::new(policy).unwrap();
        let first = matcher.identify(&d(0.5, 0.5), &g).unwrap();
        let second = matcher.identify(&d(0.5, 0.5), &g).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_identify_any_takes_best_probe() {
        let policy = wide_policy();
        let g = gallery(&policy, &[("A", d(4.0, 0.0))]);
        let matcher = DistanceMatcher::new(policy).unwrap();

        // similarities 0.45 (rejected), 1.0, 0.8
        let probes = vec![d(9.5, 0.0), d(4.0, 0.0), d(6.0, 0.0)];
        let result = matcher.identify_any(&probes, &g).unwrap();
        assert_eq!(result.identity, Some("A".into()));
        assert!((result.similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_identify_any_empty_probes() {
        let matcher = DistanceMatcher::new(wide_policy()).unwrap();
        let err = matcher.identify_any(&[], &Gallery::new()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidDescriptor(_)));
    }

    #[test]
    fn test_verify_any_best_frame() {
        let policy = wide_policy();
        let g = gallery(&policy, &[("A", d(0.0, 0.0))]);
        let matcher = DistanceMatcher::new(policy).unwrap();
        let probes = vec![d(7.0, 0.0), d(2.0, 0.0)];
        let result = matcher.verify_any(&probes, g.get(&"A".into()).unwrap()).unwrap();
        assert!((result.similarity - 0.8).abs() < 1e-6);
        assert!(result.is_match());
    }

    #[test]
    fn test_new_rejects_invalid_policy() {
        let policy = DecisionPolicy { mid_scale: -1.0, ..Default::default() };
        assert!(DistanceMatcher::new(policy).is_err());
    }
}
