//! Epoch key material and per-index capability derivation (C3, part one).
//!
//! An epoch publishes two public points `A = s1*G`, `B = s2*G` and a
//! validity window. Anyone holding the bundle can derive the public
//! capability point `V_i` for message index `i` with no interaction; only
//! the epoch owner (who holds `s1`, `s2`) can derive the matching private
//! scalar `v_i`, which is exactly what makes the exchange 0-RTT.

use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use sha2::{Digest, Sha512};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::curve::{self, PointBytes};
use crate::error::CoreError;

const HASH_DOMAIN: &[u8] = b"PRP-CAP";

/// Default epoch validity window per §4.3.1: 30 days, in milliseconds.
pub const EPOCH_VALIDITY_MS: u64 = 30 * 86_400 * 1000;

/// An epoch's private key material: `s1`, `s2`, and the validity window.
/// `s2` is the scalar that makes 0-RTT capability derivation possible and
/// must never be persisted outside this struct; dropping it zeroes both
/// scalars.
#[derive(ZeroizeOnDrop)]
pub struct EpochSecret {
    s1: Scalar,
    s2: Scalar,
}

/// The public half of an epoch, as published in a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochParams {
    /// `first_16_bytes(SHA-512(A || B))`, shown as hex on the wire.
    pub epoch_id: [u8; 16],
    pub a: PointBytes,
    pub b: PointBytes,
    pub valid_from_ms: u64,
    pub valid_until_ms: u64,
}

impl EpochSecret {
    /// Generate a fresh epoch's private scalars.
    pub fn generate() -> Self {
        Self {
            s1: curve::generate_private_scalar(),
            s2: curve::generate_private_scalar(),
        }
    }

    pub fn public_params(&self, valid_from_ms: u64, valid_until_ms: u64) -> EpochParams {
        let a = curve::point_encode(&curve::base_mul(&self.s1));
        let b = curve::point_encode(&curve::base_mul(&self.s2));
        let mut hasher = Sha512::new();
        hasher.update(a);
        hasher.update(b);
        let digest = hasher.finalize();
        let mut epoch_id = [0u8; 16];
        epoch_id.copy_from_slice(&digest[..16]);
        EpochParams { epoch_id, a, b, valid_from_ms, valid_until_ms }
    }

    /// [`Self::public_params`] with the spec's default 30-day validity
    /// window (`validUntil = now + EPOCH_VALIDITY_MS`), per §4.3.1.
    pub fn public_params_default_validity(&self, now_ms: u64) -> EpochParams {
        self.public_params(now_ms, now_ms + EPOCH_VALIDITY_MS)
    }

    /// Derive the private capability scalar `v_i = s1 + t_i * s2 mod n` for
    /// message index `i`. Only the epoch owner can call this.
    pub fn derive_v(&self, params: &EpochParams, index: u32) -> Scalar {
        let t_i = derive_t(params, index);
        curve::scalar_add(&self.s1, &curve::scalar_mul(&t_i, &self.s2))
    }

    /// Deliberately erase `s2` at epoch end (forward-secrecy requirement).
    /// After this call `derive_v` no longer produces a scalar whose
    /// base-point product matches any previously published `V_i` that
    /// depended on the real `s2`.
    pub fn erase_s2(&mut self) {
        self.s2 = Scalar::ZERO;
    }
}

/// Deterministically derive `t_i = H("PRP-CAP" || i_be32 || A || B)`.
///
/// This single function is the only place the hash input layout is
/// assembled — both the epoch owner (deriving `v_i`) and any sender
/// (deriving the public `V_i`) call it, so there is no possibility of the
/// two sides drifting on byte order or field order.
pub fn derive_t(params: &EpochParams, index: u32) -> Scalar {
    let mut input = Vec::with_capacity(7 + 4 + 32 + 32);
    input.extend_from_slice(HASH_DOMAIN);
    input.extend_from_slice(&index.to_be_bytes());
    input.extend_from_slice(&params.a);
    input.extend_from_slice(&params.b);
    curve::hash_to_scalar(&input)
}

/// Derive the public capability point `V_i = A + t_i * B` for message
/// index `i`. Computable by anyone holding the published bundle.
pub fn derive_capability_point(params: &EpochParams, index: u32) -> Result<EdwardsPoint, CoreError> {
    let a = curve::point_decode(&params.a)?;
    let b = curve::point_decode(&params.b)?;
    let t_i = derive_t(params, index);
    Ok(curve::point_add(&a, &curve::point_mul(&t_i, &b)))
}

/// `true` if `now_ms` falls within `[valid_from_ms, valid_until_ms)`.
pub fn is_valid_at(params: &EpochParams, now_ms: u64) -> bool {
    now_ms >= params.valid_from_ms && now_ms < params.valid_until_ms
}

impl Drop for EpochParams {
    fn drop(&mut self) {
        // Public values, but zeroize on drop anyway so an EpochParams
        // embedded alongside an EpochSecret in a caller's struct doesn't
        // leave a stray copy of A/B behind after the secret half clears.
        self.a.zeroize();
        self.b.zeroize();
        self.epoch_id.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_v_matches_public_capability_point() {
        let secret = EpochSecret::generate();
        let params = secret.public_params(0, u64::MAX);
        let v_3 = secret.derive_v(&params, 3);
        let lhs = curve::base_mul(&v_3);
        let rhs = derive_capability_point(&params, 3).unwrap();
        assert_eq!(lhs.compress(), rhs.compress());
    }

    #[test]
    fn different_indices_yield_different_capability_points() {
        let secret = EpochSecret::generate();
        let params = secret.public_params(0, u64::MAX);
        let v1 = derive_capability_point(&params, 1).unwrap();
        let v2 = derive_capability_point(&params, 2).unwrap();
        assert_ne!(v1.compress(), v2.compress());
    }

    #[test]
    fn validity_window_is_half_open() {
        let secret = EpochSecret::generate();
        let params = secret.public_params(1_000, 2_000);
        assert!(!is_valid_at(&params, 999));
        assert!(is_valid_at(&params, 1_000));
        assert!(is_valid_at(&params, 1_999));
        assert!(!is_valid_at(&params, 2_000));
    }

    #[test]
    fn default_validity_window_is_thirty_days() {
        let secret = EpochSecret::generate();
        let params = secret.public_params_default_validity(1_000);
        assert_eq!(params.valid_from_ms, 1_000);
        assert_eq!(params.valid_until_ms, 1_000 + EPOCH_VALIDITY_MS);
        assert!(is_valid_at(&params, 1_000 + EPOCH_VALIDITY_MS - 1));
        assert!(!is_valid_at(&params, 1_000 + EPOCH_VALIDITY_MS));
    }
}
