//! Methodology sampler.
//!
//! Picks the next methodology uniformly at random from the pool, excluding
//! the ones already used by the current clean streak. The random source is
//! injected so a fixed seed reproduces a fixed pass sequence.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::MethodologyId;

/// Source of the index draws the sampler makes.
///
/// Implementations must return a value in `0..len`; `len` is never zero.
pub trait RandomSource: Send {
    fn pick(&mut self, len: usize) -> usize;
}

/// Uniform draws from any [`RngCore`].
#[derive(Debug, Clone)]
pub struct RngSource<R>(pub R);

impl<R: RngCore + Send> RandomSource for RngSource<R> {
    fn pick(&mut self, len: usize) -> usize {
        self.0.gen_range(0..len)
    }
}

/// Select one methodology from `pool \ excluded` using `source`.
///
/// Candidates are taken in pool order, so the same pool, exclusions and
/// random source always yield the same pick.
pub fn select_methodology<S>(
    pool: &[MethodologyId],
    excluded: &BTreeSet<MethodologyId>,
    source: &mut S,
) -> DomainResult<MethodologyId>
where
    S: RandomSource + ?Sized,
{
    let candidates: Vec<&MethodologyId> = pool.iter().filter(|id| !excluded.contains(*id)).collect();
    if candidates.is_empty() {
        return Err(DomainError::Exhaustion {
            pool_size: pool.len(),
        });
    }
    let index = source.pick(candidates.len());
    candidates
        .get(index)
        .map(|id| (*id).clone())
        .ok_or_else(|| {
            DomainError::InvariantViolation(format!(
                "random source returned {index} for {} candidates",
                candidates.len()
            ))
        })
}

/// Stateful sampler owning its random source.
pub struct Sampler {
    source: Box<dyn RandomSource>,
}

impl Sampler {
    /// Sampler with a caller-supplied random source.
    pub fn with_source(source: impl RandomSource + 'static) -> Self {
        Self {
            source: Box::new(source),
        }
    }

    /// Sampler drawing uniformly from `rng`.
    pub fn with_rng(rng: impl RngCore + Send + 'static) -> Self {
        Self::with_source(RngSource(rng))
    }

    /// Deterministic sampler.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// `seeded` when a seed is given, `from_entropy` otherwise.
    pub fn from_seed_option(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_entropy, Self::seeded)
    }

    pub fn next(
        &mut self,
        pool: &[MethodologyId],
        used_in_sequence: &BTreeSet<MethodologyId>,
    ) -> DomainResult<MethodologyId> {
        select_methodology(pool, used_in_sequence, self.source.as_mut())
    }
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler").finish_non_exhaustive()
    }
}
