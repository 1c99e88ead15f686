//! Authenticated encryption and the two ratchet KDFs (C2).
//!
//! Uses XSalsa20-Poly1305 (192-bit/24-byte nonce). Key size: 32 bytes.
//! Nonce: 24 bytes (random, or caller-supplied). Tag: 16 bytes, appended
//! by the cipher.
//!
//! Ciphertext wire format produced by [`seal`]:
//!   `[ nonce (24 bytes) | ciphertext + tag ]`
//!
//! `aad` is authenticated but not encrypted — ratchet headers are bound in
//! this way rather than encrypted alongside the plaintext.
//!
//! `kdf_root`/`kdf_chain` are plain `SHA-512` splits, not HKDF/HMAC, so
//! both sides of a ratchet session agree on exact byte output without
//! pulling in the `hkdf`/`hmac` crates for a single fixed-arity call site.

use rand::RngCore;
use sha2::{Digest, Sha512};
use xsalsa20poly1305::{
    aead::{Aead, KeyInit, Nonce, Payload},
    Key, XSalsa20Poly1305,
};

use crate::error::CoreError;

/// Generate `n` cryptographically secure random bytes.
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    buf
}

/// Sample a fresh random 24-byte nonce.
pub fn random_nonce() -> [u8; 24] {
    let mut nonce = [0u8; 24];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Constant-time equality on two equal-length byte slices.
///
/// Returns `false` (not constant-time) on a length mismatch; every call
/// site here compares fixed-size buffers, so length is never itself secret.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Encrypt `plaintext` under `key`, prepending a fresh random 24-byte nonce.
/// `aad` is authenticated but not encrypted.
pub fn seal(key: &[u8; 32], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CoreError> {
    let nonce_bytes = random_nonce();
    let ct = seal_with_nonce(key, &nonce_bytes, plaintext, aad)?;
    let mut out = Vec::with_capacity(24 + ct.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ct);
    Ok(out)
}

/// Encrypt with a caller-supplied nonce (used when the nonce is already
/// carried in a larger wire header, e.g. the ratchet message format).
pub fn seal_with_nonce(
    key: &[u8; 32],
    nonce: &[u8; 24],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CoreError> {
    let cipher = XSalsa20Poly1305::new(Key::from_slice(key));
    let nonce = Nonce::<XSalsa20Poly1305>::from_slice(nonce);
    cipher
        .encrypt(nonce, Payload { msg: plaintext, aad })
        .map_err(|_| CoreError::DecryptFail)
}

/// Decrypt wire-format bytes (`nonce || ciphertext+tag`).
pub fn open(key: &[u8; 32], data: &[u8], aad: &[u8]) -> Result<Vec<u8>, CoreError> {
    if data.len() < 24 {
        return Err(CoreError::DecryptFail);
    }
    let (nonce_bytes, ct) = data.split_at(24);
    let nonce: [u8; 24] = nonce_bytes.try_into().expect("split_at(24) guarantees length");
    open_with_nonce(key, &nonce, ct, aad)
}

/// Decrypt a ciphertext whose nonce is carried separately. Any
/// authentication failure returns `Err(CoreError::DecryptFail)` — the
/// underlying Poly1305 tag compare is constant-time, so this never leaks a
/// timing signal distinguishing "wrong key" from "tampered ciphertext".
pub fn open_with_nonce(
    key: &[u8; 32],
    nonce: &[u8; 24],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CoreError> {
    let cipher = XSalsa20Poly1305::new(Key::from_slice(key));
    let nonce = Nonce::<XSalsa20Poly1305>::from_slice(nonce);
    cipher
        .decrypt(nonce, Payload { msg: ciphertext, aad })
        .map_err(|_| CoreError::DecryptFail)
}

/// First 32 bytes of `SHA-512(input)`.
pub fn sha512_32(input: &[u8]) -> [u8; 32] {
    let digest = Sha512::digest(input);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest[..32]);
    out
}

/// Split `SHA-512(input)` into two 32-byte halves.
pub fn sha512_split(input: &[u8]) -> ([u8; 32], [u8; 32]) {
    let digest = Sha512::digest(input);
    let mut first = [0u8; 32];
    let mut second = [0u8; 32];
    first.copy_from_slice(&digest[..32]);
    second.copy_from_slice(&digest[32..]);
    (first, second)
}

/// `KDF_RK`: split `SHA-512(rootKey || dhOutput)` into `(newRoot, newChain)`.
pub fn kdf_root(root_key: &[u8; 32], dh_output: &[u8]) -> ([u8; 32], [u8; 32]) {
    let mut combined = Vec::with_capacity(32 + dh_output.len());
    combined.extend_from_slice(root_key);
    combined.extend_from_slice(dh_output);
    sha512_split(&combined)
}

/// `KDF_CK`: message key is `SHA-512(chainKey || 0x01)[..32]`; next chain
/// key is `SHA-512(chainKey || 0x02)[..32]`.
pub fn kdf_chain(chain_key: &[u8; 32]) -> ([u8; 32], [u8; 32]) {
    let message_key = {
        let mut hasher = Sha512::new();
        hasher.update(chain_key);
        hasher.update([0x01]);
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest[..32]);
        out
    };
    let next_chain = {
        let mut hasher = Sha512::new();
        hasher.update(chain_key);
        hasher.update([0x02]);
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest[..32]);
        out
    };
    (message_key, next_chain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let key = [7u8; 32];
        let ct = seal(&key, b"hello prp-cap", b"header-aad").unwrap();
        let pt = open(&key, &ct, b"header-aad").unwrap();
        assert_eq!(pt, b"hello prp-cap");
    }

    #[test]
    fn open_rejects_tamper() {
        let key = [7u8; 32];
        let mut ct = seal(&key, b"hello prp-cap", b"aad").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0x01;
        assert!(matches!(open(&key, &ct, b"aad"), Err(CoreError::DecryptFail)));
    }

    #[test]
    fn open_rejects_wrong_key() {
        let ct = seal(&[1u8; 32], b"hello", b"aad").unwrap();
        assert!(matches!(open(&[2u8; 32], &ct, b"aad"), Err(CoreError::DecryptFail)));
    }

    #[test]
    fn open_rejects_mismatched_aad() {
        let key = [3u8; 32];
        let ct = seal(&key, b"hello", b"aad-one").unwrap();
        assert!(matches!(open(&key, &ct, b"aad-two"), Err(CoreError::DecryptFail)));
    }

    #[test]
    fn open_rejects_short_input() {
        assert!(matches!(open(&[1u8; 32], &[0u8; 10], b""), Err(CoreError::DecryptFail)));
    }

    #[test]
    fn kdf_chain_is_deterministic_and_message_key_differs_from_next_chain() {
        let ck = [9u8; 32];
        let (mk, next_ck) = kdf_chain(&ck);
        let (mk2, next_ck2) = kdf_chain(&ck);
        assert_eq!(mk, mk2);
        assert_eq!(next_ck, next_ck2);
        assert_ne!(mk, next_ck);
    }

    #[test]
    fn kdf_root_depends_on_both_inputs() {
        let (r1, c1) = kdf_root(&[1u8; 32], b"dh-output-a");
        let (r2, c2) = kdf_root(&[1u8; 32], b"dh-output-b");
        assert_ne!(r1, r2);
        assert_ne!(c1, c2);
    }

    #[test]
    fn ct_eq_detects_single_bit_flip_and_length_mismatch() {
        let a = [0xABu8; 32];
        let mut b = a;
        assert!(ct_eq(&a, &b));
        b[5] ^= 0x01;
        assert!(!ct_eq(&a, &b));
        assert!(!ct_eq(&a, &a[..31]));
    }
}
