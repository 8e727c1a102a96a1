//! Commitment curve arithmetic.
//!
//! Commitments live on BN254 G1. Its group order equals the scalar field modulus, so
//! `pedersen(a) + pedersen(b) == pedersen(a + b)` holds with the opening added mod r.
//! That identity is what lets callers rebuild a commitment from its opening and compare.
//!
//! Generators are derived by try-and-increment over the Poseidon hash and cached for
//! the lifetime of the process.

use crate::constants::{MAX_HASH_TO_CURVE_ATTEMPTS, PEDERSEN_NON_HIDING_DOMAIN, PEDERSEN_POSITIVE_DOMAIN};
use crate::error::{ProtocolError, Result};
use crate::hash::{domain_tag, hash};
use crate::types::{fr_to_fq, parse_decimal, to_decimal, Scalar};
use ark_bn254::{Fq, Fr, G1Affine, G1Projective};
use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::Zero;
use ark_serialize::CanonicalSerialize;
use std::ops::{Add, Sub};
use std::sync::LazyLock;

/// A point on the commitment curve. Construction always yields an on-curve point or the identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CurvePoint(G1Affine);

/// A Pedersen commitment is just a curve point; the name documents intent at call sites.
pub type Commitment = CurvePoint;

impl CurvePoint {
    pub fn identity() -> Self {
        Self(G1Affine::zero())
    }

    /// The curve's standard base point, used for public keys and DH.
    pub fn generator() -> Self {
        Self(G1Affine::generator())
    }

    pub fn is_identity(&self) -> bool {
        self.0.is_zero()
    }

    /// Affine coordinates, with the identity encoded as `(0, 0)`.
    pub fn coords(&self) -> (Fq, Fq) {
        if self.0.infinity {
            (Fq::zero(), Fq::zero())
        } else {
            (self.0.x, self.0.y)
        }
    }

    /// Rebuild a point from coordinates, checking curve membership.
    pub fn from_coords(x: Fq, y: Fq) -> Result<Self> {
        if x.is_zero() && y.is_zero() {
            return Ok(Self::identity());
        }
        let p = G1Affine::new_unchecked(x, y);
        if !p.is_on_curve() || !p.is_in_correct_subgroup_assuming_on_curve() {
            return Err(ProtocolError::Input(format!(
                "point ({}, {}) is not on the commitment curve",
                to_decimal(&x),
                to_decimal(&y)
            )));
        }
        Ok(Self(p))
    }

    pub fn from_decimal(x: &str, y: &str) -> Result<Self> {
        Self::from_coords(parse_decimal(x)?, parse_decimal(y)?)
    }

    pub fn to_decimal(&self) -> (String, String) {
        let (x, y) = self.coords();
        (to_decimal(&x), to_decimal(&y))
    }

    pub fn mul(&self, s: &Scalar) -> Self {
        Self((self.0.into_group() * s).into_affine())
    }

    /// Compressed encoding, used as the printable zkAddress.
    pub fn to_hex(&self) -> String {
        let mut bytes = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.0.serialize_compressed(&mut bytes);
        hex::encode(bytes)
    }

    pub fn inner(&self) -> &G1Affine {
        &self.0
    }
}

impl From<G1Projective> for CurvePoint {
    fn from(p: G1Projective) -> Self {
        Self(p.into_affine())
    }
}

impl Add for CurvePoint {
    type Output = CurvePoint;

    fn add(self, rhs: CurvePoint) -> CurvePoint {
        (self.0.into_group() + rhs.0.into_group()).into()
    }
}

impl Sub for CurvePoint {
    type Output = CurvePoint;

    fn sub(self, rhs: CurvePoint) -> CurvePoint {
        (self.0.into_group() - rhs.0.into_group()).into()
    }
}

pub fn add(p: &CurvePoint, q: &CurvePoint) -> CurvePoint {
    *p + *q
}

pub fn sub(p: &CurvePoint, q: &CurvePoint) -> CurvePoint {
    *p - *q
}

/// Derive the `index`-th generator for `domain`.
///
/// x = Poseidon(domain, index, counter) lifted to Fq; the first counter whose x lands on the
/// curve wins, taking the smaller square root for y. BN254 G1 has cofactor 1.
pub fn derive_generator(domain: &[u8], index: u64) -> Result<CurvePoint> {
    let tag = domain_tag(domain);
    for counter in 0..MAX_HASH_TO_CURVE_ATTEMPTS {
        let x = fr_to_fq(&hash(&[tag, Fr::from(index), Fr::from(counter)]));
        if let Some(p) = G1Affine::get_point_from_x_unchecked(x, false) {
            if !p.is_zero() {
                return Ok(CurvePoint(p));
            }
        }
    }
    Err(ProtocolError::Consistency(format!(
        "no generator found for index {index} after {MAX_HASH_TO_CURVE_ATTEMPTS} attempts"
    )))
}

// Each attempt lands on the curve with probability about 1/2, so derivation for the fixed
// domains never exhausts its attempts; `generators_are_distinct_and_on_curve` pins this.
fn generators<const N: usize>(domain: &[u8]) -> [CurvePoint; N] {
    std::array::from_fn(|i| derive_generator(domain, i as u64).expect("generator derivation for a fixed domain"))
}

static POSITIVE_GENERATORS: LazyLock<[CurvePoint; 3]> = LazyLock::new(|| generators(PEDERSEN_POSITIVE_DOMAIN));
static NON_HIDING_GENERATORS: LazyLock<[CurvePoint; 2]> = LazyLock::new(|| generators(PEDERSEN_NON_HIDING_DOMAIN));

pub fn positive_generators() -> &'static [CurvePoint; 3] {
    &POSITIVE_GENERATORS
}

pub fn non_hiding_generators() -> &'static [CurvePoint; 2] {
    &NON_HIDING_GENERATORS
}

/// Three-generator, domain-bound commitment: `m*G0 + r*G1 + d*G2`.
pub fn pedersen_positive(m: &Scalar, r: &Scalar, d: &Scalar) -> Commitment {
    let [g0, g1, g2] = positive_generators();
    (g0.0.into_group() * m + g1.0.into_group() * r + g2.0.into_group() * d).into()
}

/// Two-generator commitment without a separate blinding term: `m*H0 + r*H1`.
pub fn pedersen_non_hiding(m: &Scalar, r: &Scalar) -> Commitment {
    let [h0, h1] = non_hiding_generators();
    (h0.0.into_group() * m + h1.0.into_group() * r).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ff::UniformRand;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn generators_are_distinct_and_on_curve() {
        let all: Vec<CurvePoint> = positive_generators()
            .iter()
            .chain(non_hiding_generators().iter())
            .copied()
            .collect();
        for (i, g) in all.iter().enumerate() {
            assert!(g.inner().is_on_curve());
            assert!(!g.is_identity());
            for h in &all[i + 1..] {
                assert_ne!(g, h);
            }
        }
        assert_eq!(derive_generator(PEDERSEN_POSITIVE_DOMAIN, 0).unwrap(), positive_generators()[0]);
    }

    #[test]
    fn non_hiding_is_deterministic() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let a = Fr::rand(&mut rng);
        let b = Fr::rand(&mut rng);
        assert_eq!(pedersen_non_hiding(&a, &b), pedersen_non_hiding(&a, &b));
        assert_ne!(pedersen_non_hiding(&a, &b), pedersen_non_hiding(&b, &a));
    }

    #[test]
    fn add_and_sub_are_inverse() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        for _ in 0..8 {
            let p = pedersen_non_hiding(&Fr::rand(&mut rng), &Fr::rand(&mut rng));
            let q = pedersen_positive(&Fr::rand(&mut rng), &Fr::rand(&mut rng), &Fr::rand(&mut rng));
            assert_eq!(sub(&add(&p, &q), &q), p);
            assert_eq!(add(&sub(&p, &q), &q), p);
        }
    }

    #[test]
    fn commitments_are_homomorphic_mod_r() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let (m1, r1, d1) = (Fr::rand(&mut rng), Fr::rand(&mut rng), Fr::rand(&mut rng));
        let (m2, r2, d2) = (Fr::rand(&mut rng), Fr::rand(&mut rng), Fr::rand(&mut rng));
        let sum = pedersen_positive(&m1, &r1, &d1) + pedersen_positive(&m2, &r2, &d2);
        assert_eq!(sum, pedersen_positive(&(m1 + m2), &(r1 + r2), &(d1 + d2)));

        let diff = pedersen_positive(&m1, &r1, &d1) - pedersen_positive(&m2, &r2, &d2);
        assert_eq!(diff, pedersen_positive(&(m1 - m2), &(r1 - r2), &(d1 - d2)));
    }

    #[test]
    fn coordinates_roundtrip_and_membership() {
        let p = pedersen_non_hiding(&Fr::from(5u64), &Fr::from(9u64));
        let (x, y) = p.to_decimal();
        assert_eq!(CurvePoint::from_decimal(&x, &y).unwrap(), p);

        let id = CurvePoint::identity();
        assert_eq!(id.to_decimal(), ("0".to_string(), "0".to_string()));
        assert_eq!(CurvePoint::from_decimal("0", "0").unwrap(), id);

        assert!(matches!(CurvePoint::from_decimal("1", "1"), Err(ProtocolError::Input(_))));
    }

    #[test]
    fn dh_symmetry() {
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let g = CurvePoint::generator();
        for _ in 0..4 {
            let a = Fr::rand(&mut rng);
            let b = Fr::rand(&mut rng);
            assert_eq!(g.mul(&b).mul(&a), g.mul(&a).mul(&b));
        }
    }
}
