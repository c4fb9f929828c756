//! Requester identity allocation.
//!
//! A recording session joins the channel under a synthetic uid that must
//! not collide with any real participant. Real identities (possibly
//! alphanumeric) are folded into the numeric uid space with the same
//! transform used for join tokens, and the allocator redraws until it
//! finds a value outside that exclusion set.

use rand::Rng;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

use crate::error::OrchestratorError;

pub const DEFAULT_POOL_SIZE: u32 = 10_000;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1_000;

#[derive(Debug, Clone, Copy)]
pub struct UidAllocator {
    pool_size: u32,
    max_attempts: u32,
}

impl Default for UidAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE, DEFAULT_MAX_ATTEMPTS)
    }
}

impl UidAllocator {
    pub fn new(pool_size: u32, max_attempts: u32) -> Self {
        Self {
            pool_size: pool_size.max(1),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Draw a uid outside `excluded`. Dense exclusion sets make random
    /// sampling impractical, so the draw is capped and fails with
    /// `AllocationExhausted` instead of spinning.
    pub fn allocate(&self, excluded: &HashSet<u32>) -> Result<u32, OrchestratorError> {
        let mut rng = rand::rng();
        for _ in 0..self.max_attempts {
            let candidate = rng.random_range(0..self.pool_size);
            if !excluded.contains(&candidate) {
                return Ok(candidate);
            }
        }
        Err(OrchestratorError::AllocationExhausted {
            attempts: self.max_attempts,
            pool_size: self.pool_size,
        })
    }

    /// Deterministic alphanumeric-to-numeric transform.
    ///
    /// Identities that already parse as integers map to themselves, so a
    /// provider-reported numeric uid is excluded exactly. Anything else is
    /// folded through a digest into the pool range.
    pub fn numeric_uid(&self, raw: &str) -> u32 {
        if let Ok(n) = raw.parse::<u32>() {
            return n;
        }
        let digest = Sha256::digest(raw.as_bytes());
        let folded = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        folded % self.pool_size
    }

    /// Map every known identity into the exclusion set for `allocate`.
    pub fn exclusion_set<'a, I>(&self, identities: I) -> HashSet<u32>
    where
        I: IntoIterator<Item = &'a str>,
    {
        identities
            .into_iter()
            .map(|id| self.numeric_uid(id))
            .collect()
    }
}
