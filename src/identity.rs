//! Long-term identity key material.
//!
//! Each party holds one long-term Edwards-25519 DH keypair. There is no
//! signing here and no device-certificate layer — PRP-Cap has no
//! signature scheme; trust in a published epoch bundle comes from
//! out-of-band verification of the identity public key's fingerprint, not
//! from a certificate chain.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use sha2::{Digest, Sha256};
use zeroize::ZeroizeOnDrop;

use crate::curve::{self, PointBytes};
use crate::error::CoreError;

/// A 32-byte Edwards-25519 public key, hex-encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKeyBytes(pub PointBytes);

impl PublicKeyBytes {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(s)?;
        let arr: PointBytes = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidScalar("public key must be 32 bytes"))?;
        Ok(Self(arr))
    }

    /// Human-readable fingerprint for manual verification: `SHA-256` of
    /// the public key, truncated to 16 bytes, hex in groups of 4.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0);
        let hex = hex::encode(&digest[..16]);
        hex.chars()
            .collect::<Vec<_>>()
            .chunks(4)
            .map(|c| c.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn point(&self) -> Result<EdwardsPoint, CoreError> {
        curve::point_decode(&self.0)
    }

    /// Base64 (URL-safe, unpadded) encoding, for contexts that need a
    /// shorter human-facing form than hex (e.g. a display-name QR payload).
    pub fn to_b64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    pub fn from_b64(s: &str) -> Result<Self, CoreError> {
        let bytes = URL_SAFE_NO_PAD.decode(s)?;
        let arr: PointBytes = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidScalar("public key must be 32 bytes"))?;
        Ok(Self(arr))
    }
}

/// A long-term identity keypair. Dropping it zeroes the private scalar.
#[derive(ZeroizeOnDrop)]
pub struct IdentityKeyPair {
    #[zeroize(skip)]
    public: PublicKeyBytes,
    secret: Scalar,
}

impl IdentityKeyPair {
    pub fn generate() -> Self {
        let secret = curve::generate_private_scalar();
        let public = PublicKeyBytes(curve::point_encode(&curve::base_mul(&secret)));
        Self { public, secret }
    }

    /// Rebuild a keypair from a stored 32-byte clamped scalar seed. The
    /// seed is reduced the same way [`curve::generate_private_scalar`]
    /// reduces a fresh one, so a persisted identity key round-trips.
    pub fn from_clamped_bytes(bytes: [u8; 32]) -> Self {
        let secret = Scalar::from_bytes_mod_order(bytes);
        let public = PublicKeyBytes(curve::point_encode(&curve::base_mul(&secret)));
        Self { public, secret }
    }

    pub fn public(&self) -> PublicKeyBytes {
        self.public
    }

    pub fn secret_scalar(&self) -> &Scalar {
        &self.secret
    }

    /// Raw Diffie-Hellman against another party's public key.
    pub fn dh(&self, their_public: &PublicKeyBytes) -> Result<EdwardsPoint, CoreError> {
        let their_point = their_public.point()?;
        Ok(curve::dh(&self.secret, &their_point))
    }
}
