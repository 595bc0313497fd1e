//! Enrollment aggregator — bounded, quality-ranked descriptor samples per identity.

use std::collections::BTreeMap;

use crate::error::CoreError;
use crate::policy::DecisionPolicy;
use crate::types::{Descriptor, IdentityId};

/// One stored capture: descriptor plus the quality it was captured with.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub descriptor: Descriptor,
    /// Capture quality in [0, 1]. Fixed at capture time.
    pub quality: f32,
}

/// All samples stored for one identity, at most `capacity` of them.
///
/// Only built through [`EnrollmentRecord::new`] and [`add_sample`](Self::add_sample),
/// so capacity, quality range, dimension and model version always hold.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrollmentRecord {
    identity: IdentityId,
    capacity: usize,
    samples: Vec<Sample>,
}

impl EnrollmentRecord {
    pub fn new(identity: IdentityId, capacity: usize) -> Self {
        Self {
            identity,
            capacity,
            samples: Vec::with_capacity(capacity),
        }
    }

    pub fn identity(&self) -> &IdentityId {
        &self.identity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Descriptors to evaluate during matching. Order carries no meaning.
    pub fn candidates(&self) -> impl Iterator<Item = &Descriptor> {
        self.samples.iter().map(|s| &s.descriptor)
    }

    /// Index and quality of the lowest-quality sample (first one on ties).
    fn weakest(&self) -> Option<(usize, f32)> {
        self.samples
            .iter()
            .enumerate()
            .fold(None, |acc, (i, s)| match acc {
                Some((_, q)) if q <= s.quality => acc,
                _ => Some((i, s.quality)),
            })
    }

    /// Add a sample, returning whether it was kept.
    ///
    /// Below capacity the sample is appended. At capacity it replaces the
    /// weakest sample only if its quality is strictly higher; otherwise the
    /// record is left untouched and `false` is returned.
    pub fn add_sample(&mut self, descriptor: Descriptor, quality: f32) -> Result<bool, CoreError> {
        if !(0.0..=1.0).contains(&quality) {
            return Err(CoreError::InvalidQuality(quality));
        }
        if let Some(existing) = self.samples.first() {
            if existing.descriptor.len() != descriptor.len() {
                return Err(CoreError::DimensionMismatch {
                    left: existing.descriptor.len(),
                    right: descriptor.len(),
                });
            }
        }
        let stored_version = self
            .samples
            .iter()
            .find_map(|s| s.descriptor.model_version.as_ref());
        if let (Some(stored), Some(incoming)) = (stored_version, &descriptor.model_version) {
            if stored != incoming {
                return Err(CoreError::ModelMismatch {
                    left: stored.clone(),
                    right: incoming.clone(),
                });
            }
        }

        if self.samples.len() < self.capacity {
            self.samples.push(Sample { descriptor, quality });
            tracing::debug!(
                identity = %self.identity,
                quality,
                count = self.samples.len(),
                "enrollment: sample appended"
            );
            return Ok(true);
        }

        match self.weakest() {
            Some((idx, weakest)) if quality > weakest => {
                self.samples.remove(idx);
                self.samples.push(Sample { descriptor, quality });
                tracing::debug!(
                    identity = %self.identity,
                    quality,
                    evicted_quality = weakest,
                    "enrollment: weakest sample replaced"
                );
                Ok(true)
            }
            _ => {
                tracing::debug!(
                    identity = %self.identity,
                    quality,
                    "enrollment: sample discarded, record full of stronger samples"
                );
                Ok(false)
            }
        }
    }
}

/// The enrolled population, keyed by identity in ascending order.
///
/// Mutation goes through `&mut self`, so a gallery has a single writer at
/// a time; matching only needs `&self`.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    records: BTreeMap<IdentityId, EnrollmentRecord>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a freshly captured descriptor and add it to `identity`'s record.
    ///
    /// The record is created on the first accepted sample. Returns whether
    /// the sample was kept.
    pub fn enroll(
        &mut self,
        identity: IdentityId,
        descriptor: Descriptor,
        quality: f32,
        policy: &DecisionPolicy,
    ) -> Result<bool, CoreError> {
        descriptor.validate(policy.descriptor_len)?;

        let record = self
            .records
            .entry(identity.clone())
            .or_insert_with(|| EnrollmentRecord::new(identity, policy.sample_capacity));
        let result = record.add_sample(descriptor, quality);

        if record.is_empty() {
            let id = record.identity().clone();
            self.records.remove(&id);
        }
        result
    }

    /// Put a fully built record in place (e.g. loaded from storage).
    pub fn insert_record(&mut self, record: EnrollmentRecord) -> Option<EnrollmentRecord> {
        self.records.insert(record.identity().clone(), record)
    }

    pub fn remove(&mut self, identity: &IdentityId) -> Option<EnrollmentRecord> {
        self.records.remove(identity)
    }

    pub fn get(&self, identity: &IdentityId) -> Option<&EnrollmentRecord> {
        self.records.get(identity)
    }

    /// Records in ascending identity order.
    pub fn iter(&self) -> impl Iterator<Item = &EnrollmentRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
