//! Main commitment accumulator: the single global running commitment.
//!
//! Only the ledger mutates it. Clients read a snapshot, split it into the part they can
//! open (their own previous contribution, "inner") and its complement ("outer"), and
//! submit a delta that replaces their contribution.
//!
//! Both halves are always rebuilt from their own opening tuples. A raw point subtraction
//! gives the same point only when the snapshot is itself consistent, and the prover will
//! recompute from openings regardless, so openings are the source of truth.

use crate::curve::{pedersen_positive, Commitment};
use crate::error::{ProtocolError, Result};
use crate::types::Scalar;
use ark_bn254::Fr;
use ark_ff::{One, Zero};
use std::ops::{Add, Sub};

/// Opening of a three-generator commitment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Opening {
    pub m: Scalar,
    pub r: Scalar,
    pub d: Scalar,
}

impl Opening {
    pub fn new(m: Scalar, r: Scalar, d: Scalar) -> Self {
        Self { m, r, d }
    }

    pub fn zero() -> Self {
        Self::new(Fr::zero(), Fr::zero(), Fr::zero())
    }

    /// Genesis value of the accumulator.
    pub fn seed() -> Self {
        Self::new(Fr::one(), Fr::one(), Fr::one())
    }

    pub fn commit(&self) -> Commitment {
        pedersen_positive(&self.m, &self.r, &self.d)
    }
}

impl Add for Opening {
    type Output = Opening;

    fn add(self, rhs: Opening) -> Opening {
        Opening::new(self.m + rhs.m, self.r + rhs.r, self.d + rhs.d)
    }
}

impl Sub for Opening {
    type Output = Opening;

    fn sub(self, rhs: Opening) -> Opening {
        Opening::new(self.m - rhs.m, self.r - rhs.r, self.d - rhs.d)
    }
}

/// Snapshot of the global accumulator, valid for one operation's input assembly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MainAccumulatorState {
    pub tot: Commitment,
    pub opening: Opening,
}

impl MainAccumulatorState {
    pub fn genesis() -> Self {
        let opening = Opening::seed();
        Self {
            tot: opening.commit(),
            opening,
        }
    }

    /// True when the published point matches the published opening.
    pub fn is_consistent(&self) -> bool {
        self.opening.commit() == self.tot
    }

    /// State after the ledger applies `delta`.
    pub fn apply(&self, delta: &Opening) -> Self {
        Self {
            tot: self.tot + delta.commit(),
            opening: self.opening + *delta,
        }
    }
}

/// Inner/outer split of a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccumulatorPartition {
    pub snapshot: MainAccumulatorState,
    pub inner: Commitment,
    pub inner_opening: Opening,
    pub outer: Commitment,
    pub outer_opening: Opening,
}

impl AccumulatorPartition {
    pub fn tot(&self) -> Commitment {
        self.inner + self.outer
    }

    /// Every pair reconstructs and the halves sum to the snapshot.
    pub fn verify(&self) -> Result<()> {
        if self.inner != self.inner_opening.commit() {
            return Err(ProtocolError::Consistency("main_c_inner does not match its opening".into()));
        }
        if self.outer != self.outer_opening.commit() {
            return Err(ProtocolError::Consistency("main_c_outer does not match its opening".into()));
        }
        if self.tot() != self.snapshot.tot {
            return Err(ProtocolError::Consistency(
                "main_c_inner + main_c_outer does not equal the accumulator snapshot".into(),
            ));
        }
        Ok(())
    }
}

/// Split `snapshot` around the caller's previous contribution.
///
/// `previous_nonce` is the number of operations the caller has already committed. With
/// none, the seed is the outer half.
pub fn derive_outer(
    snapshot: &MainAccumulatorState,
    previous_nonce: u64,
    my_previous_opening: Option<&Opening>,
) -> Result<AccumulatorPartition> {
    let (inner_opening, outer_opening) = if previous_nonce == 0 {
        let outer = Opening::seed();
        (snapshot.opening - outer, outer)
    } else {
        let mine = my_previous_opening.ok_or_else(|| {
            ProtocolError::State(format!("no previous opening for nonce {}", previous_nonce - 1))
        })?;
        (*mine, snapshot.opening - *mine)
    };

    let partition = AccumulatorPartition {
        snapshot: *snapshot,
        inner: inner_opening.commit(),
        inner_opening,
        outer: outer_opening.commit(),
        outer_opening,
    };
    partition.verify()?;
    Ok(partition)
}

/// Delta replacing `previous` with `next`, and the accumulator it produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccumulatorTransition {
    pub delta: Opening,
    pub next: MainAccumulatorState,
}

pub fn transition(
    snapshot: &MainAccumulatorState,
    previous: Option<&Opening>,
    next_contribution: &Opening,
) -> AccumulatorTransition {
    let delta = *next_contribution - previous.copied().unwrap_or_else(Opening::zero);
    AccumulatorTransition {
        delta,
        next: snapshot.apply(&delta),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ff::UniformRand;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn random_opening(rng: &mut ChaCha20Rng) -> Opening {
        Opening::new(Fr::rand(rng), Fr::rand(rng), Fr::rand(rng))
    }

    #[test]
    fn genesis_is_the_seed() {
        let g = MainAccumulatorState::genesis();
        assert!(g.is_consistent());
        assert_eq!(g.tot, pedersen_positive(&Fr::one(), &Fr::one(), &Fr::one()));
    }

    #[test]
    fn first_operation_uses_the_seed_as_outer() {
        let mut rng = ChaCha20Rng::seed_from_u64(21);
        let snapshot = MainAccumulatorState::genesis().apply(&random_opening(&mut rng));
        let p = derive_outer(&snapshot, 0, None).unwrap();
        assert_eq!(p.outer_opening, Opening::seed());
        assert_eq!(p.outer, Opening::seed().commit());
        assert_eq!(p.tot(), snapshot.tot);
    }

    #[test]
    fn outer_is_rebuilt_from_its_opening() {
        let mut rng = ChaCha20Rng::seed_from_u64(22);
        let mine = random_opening(&mut rng);
        let others = random_opening(&mut rng);
        let snapshot = MainAccumulatorState::genesis().apply(&others).apply(&mine);

        let p = derive_outer(&snapshot, 3, Some(&mine)).unwrap();
        assert_eq!(p.outer_opening, snapshot.opening - mine);
        assert_eq!(p.outer, p.outer_opening.commit());
        assert_eq!(p.outer, snapshot.tot - mine.commit());
    }

    #[test]
    fn inconsistent_snapshot_is_rejected() {
        let mut rng = ChaCha20Rng::seed_from_u64(23);
        let mut snapshot = MainAccumulatorState::genesis();
        snapshot.tot = random_opening(&mut rng).commit();
        let mine = random_opening(&mut rng);
        assert!(matches!(derive_outer(&snapshot, 1, Some(&mine)), Err(ProtocolError::Consistency(_))));
    }

    #[test]
    fn missing_previous_opening_is_a_state_error() {
        let snapshot = MainAccumulatorState::genesis();
        assert!(matches!(derive_outer(&snapshot, 2, None), Err(ProtocolError::State(_))));
    }

    #[test]
    fn transition_replaces_the_contribution() {
        let mut rng = ChaCha20Rng::seed_from_u64(24);
        let old = random_opening(&mut rng);
        let new = random_opening(&mut rng);
        let others = random_opening(&mut rng);
        let snapshot = MainAccumulatorState::genesis().apply(&others).apply(&old);

        let t = transition(&snapshot, Some(&old), &new);
        assert!(t.next.is_consistent());
        assert_eq!(t.next.opening, Opening::seed() + others + new);

        let first = transition(&MainAccumulatorState::genesis(), None, &new);
        assert_eq!(first.delta, new);
    }
}
