//! Scalar & point arithmetic on Edwards-25519 (C1).
//!
//! Every operation here is either a thin wrapper over `curve25519-dalek`
//! (whose `Scalar`/`EdwardsPoint` arithmetic is constant-time by
//! construction) or pure bit manipulation on public byte arrays. There is no
//! Montgomery/X25519 arithmetic anywhere in this crate — capability algebra
//! (C3) and ratchet DH steps (C4) are both plain Edwards scalar
//! multiplication, so there is exactly one point format and one scalar
//! format in play end to end.

use curve25519_dalek::constants::ED25519_BASEPOINT_POINT;
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha512};
use zeroize::Zeroize;

use crate::error::CoreError;

/// A 32-byte Edwards-25519 point in canonical compressed form.
pub type PointBytes = [u8; 32];
/// A 32-byte little-endian scalar, reduced modulo the group order.
pub type ScalarBytes = [u8; 32];

/// Clear bits 0,1,2 of byte 0; set bit 6 and clear bit 7 of byte 31.
///
/// Applied to a fresh random seed before it is reduced into a canonical
/// `Scalar`, the standard Curve25519 clamp.
fn clamp(mut seed: [u8; 32]) -> [u8; 32] {
    seed[0] &= 248;
    seed[31] &= 127;
    seed[31] |= 64;
    seed
}

/// Sample a fresh clamped, canonically-reduced private scalar.
///
/// Clamping is applied to the pre-reduction seed, and the result is then
/// folded into the group via `scalar_reduce` so that `scalar_add`/
/// `scalar_mul` on it are correct field arithmetic. A clamped-but-unreduced
/// 256-bit integer cannot safely participate in `Scalar` field arithmetic
/// across dalek versions.
pub fn generate_private_scalar() -> Scalar {
    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);
    let clamped = clamp(seed);
    seed.zeroize();
    Scalar::from_bytes_mod_order(clamped)
}

/// Wide reduction: `SHA-512` output (or any 64 bytes) mod the group order.
pub fn scalar_reduce(bytes: [u8; 64]) -> Scalar {
    Scalar::from_bytes_mod_order_wide(&bytes)
}

/// `a + b mod n`.
pub fn scalar_add(a: &Scalar, b: &Scalar) -> Scalar {
    a + b
}

/// `a * b mod n`.
pub fn scalar_mul(a: &Scalar, b: &Scalar) -> Scalar {
    a * b
}

/// Decode a compressed point. Off-curve input is a hard error.
pub fn point_decode(bytes: &PointBytes) -> Result<EdwardsPoint, CoreError> {
    CompressedEdwardsY(*bytes)
        .decompress()
        .ok_or(CoreError::InvalidPoint)
}

/// Encode a point to its canonical compressed form.
pub fn point_encode(point: &EdwardsPoint) -> PointBytes {
    point.compress().to_bytes()
}

/// `s * G`.
pub fn base_mul(scalar: &Scalar) -> EdwardsPoint {
    scalar * ED25519_BASEPOINT_POINT
}

/// `s * P`.
pub fn point_mul(scalar: &Scalar, point: &EdwardsPoint) -> EdwardsPoint {
    scalar * point
}

/// `P + Q`.
pub fn point_add(p: &EdwardsPoint, q: &EdwardsPoint) -> EdwardsPoint {
    p + q
}

/// The Diffie-Hellman primitive: identical to [`point_mul`], named
/// separately because its output is always hashed (never used directly as
/// a symmetric key) by every call site in C3/C4.
pub fn dh(scalar: &Scalar, point: &EdwardsPoint) -> EdwardsPoint {
    point_mul(scalar, point)
}

/// `SHA-512(bytes)` reduced mod the group order.
pub fn hash_to_scalar(bytes: &[u8]) -> Scalar {
    let digest: [u8; 64] = Sha512::digest(bytes).into();
    scalar_reduce(digest)
}
