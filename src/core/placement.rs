//! Placement engine.
//!
//! Given a volume request and the pools eligible under its storage
//! class, visits the candidates in a random permutation and returns
//! the first successful creation. The randomization spreads load
//! across backends; it is not a correctness property, and tests
//! inject a deterministic order.

use crate::domain::types::Protocol;
use crate::error::{Error, Result};
use crate::storage::attributes::AttributeMatch;
use crate::storage::backend::Backend;
use crate::storage::volume::{Volume, VolumeConfig};
use crate::storage_class::PoolRef;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

// =============================================================================
// Permutation Sources
// =============================================================================

/// Pluggable candidate ordering.
pub trait PermutationSource: Send + Sync {
    /// A permutation of `0..n`.
    fn permutation(&self, n: usize) -> Vec<usize>;
}

/// Uniformly random permutation, seeded from wall-clock time per call.
pub struct WallClockShuffle;

impl PermutationSource for WallClockShuffle {
    fn permutation(&self, n: usize) -> Vec<usize> {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let mut rng = StdRng::seed_from_u64(seed);
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut rng);
        indices
    }
}

/// Identity ordering, for deterministic tests.
pub struct SequentialOrder;

impl PermutationSource for SequentialOrder {
    fn permutation(&self, n: usize) -> Vec<usize> {
        (0..n).collect()
    }
}

// =============================================================================
// Placement
// =============================================================================

/// Try the candidate pools in the given order; return the volume from
/// the first backend that accepts the create.
pub async fn place_volume(
    backends: &mut BTreeMap<String, Backend>,
    candidates: &[PoolRef],
    effective_protocol: Protocol,
    config: &VolumeConfig,
    class_attributes: &BTreeMap<String, AttributeMatch>,
    order: &dyn PermutationSource,
) -> Result<Volume> {
    if candidates.is_empty() {
        return Err(Error::NoBackend {
            storage_class: config.storage_class.clone(),
            protocol: effective_protocol,
        });
    }

    debug!(
        "Looking through {} candidate pools for volume {}",
        candidates.len(),
        config.name
    );

    let mut errors = Vec::new();
    for index in order.permutation(candidates.len()) {
        let candidate = &candidates[index];
        let Some(backend) = backends.get_mut(&candidate.backend) else {
            continue;
        };
        match backend
            .add_volume(config, &candidate.pool, class_attributes)
            .await
        {
            Ok(mut volume) => {
                // An unconstrained request adopts the protocol of the
                // backend that won placement.
                if volume.config.protocol == Protocol::Any {
                    volume.config.protocol = backend.protocol();
                }
                return Ok(volume);
            }
            Err(err) => {
                warn!(
                    "Failed to create volume {} on pool {} of backend {}: {}",
                    config.name, candidate.pool, candidate.backend, err
                );
                errors.push(format!(
                    "[failed to create volume {} on storage pool {} from backend {}: {}]",
                    config.name, candidate.pool, candidate.backend, err
                ));
            }
        }
    }

    Err(Error::AllBackendsFailed { errors })
}
