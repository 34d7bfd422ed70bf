//! Random short identifiers for workers (`ipt`) and slots (`ico`).

use std::collections::HashSet;

use rand::Rng;
use rand::distr::Alphanumeric;

use crate::error::SchedulerError;

const ALPHABET: u128 = 62;

/// Tracks every identifier handed out for one kind (workers or slots).
#[derive(Debug, Default)]
pub struct IdRegistry {
    taken: HashSet<String>,
}

impl IdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates an alphanumeric identifier of `length` chars not yet taken.
    ///
    /// Collisions are regenerated; the only error is a full identifier space.
    pub fn generate(&mut self, length: usize) -> Result<String, SchedulerError> {
        let length = length.max(1);
        if self.is_exhausted(length) {
            return Err(SchedulerError::IdSpaceExhausted { length });
        }

        let mut rng = rand::rng();
        loop {
            let id: String = (&mut rng)
                .sample_iter(Alphanumeric)
                .take(length)
                .map(char::from)
                .collect();
            if self.taken.insert(id.clone()) {
                return Ok(id);
            }
            tracing::trace!(id = %id, "identifier collision, regenerating");
        }
    }

    /// Returns an identifier to the pool.
    pub fn forget(&mut self, id: &str) -> bool {
        self.taken.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.taken.contains(id)
    }

    pub fn len(&self) -> usize {
        self.taken.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taken.is_empty()
    }

    fn is_exhausted(&self, length: usize) -> bool {
        let taken = self.taken.iter().filter(|id| id.len() == length).count() as u128;
        let space = u32::try_from(length)
            .ok()
            .and_then(|l| ALPHABET.checked_pow(l))
            .unwrap_or(u128::MAX);
        taken >= space
    }
}
