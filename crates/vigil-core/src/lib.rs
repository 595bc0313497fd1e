//! vigil-core — Biometric identity verification engine.
//!
//! Pure decision logic over face descriptors produced elsewhere: Euclidean
//! comparison, a quality-aware enrollment aggregator, and 1:1 / 1:N
//! matching under a single tunable decision policy. Nothing in this crate
//! touches a camera, a model file or a database.

pub mod comparator;
pub mod enrollment;
pub mod error;
pub mod matcher;
pub mod policy;
pub mod source;
pub mod types;

pub use comparator::{distance, to_similarity_score};
pub use enrollment::{EnrollmentRecord, Gallery, Sample};
pub use error::CoreError;
pub use matcher::{DistanceMatcher, MatchResult, Matcher, SampleRef};
pub use policy::{ConfidenceTier, DecisionPolicy};
pub use source::{best_detection, Detection, DescriptorSource};
pub use types::{Descriptor, IdentityId};
