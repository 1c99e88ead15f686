//! PRP-Cap 0-RTT key exchange + Double Ratchet cryptographic core.
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates
//!   (`curve25519-dalek`, `xsalsa20poly1305`, `sha2`).
//! - Zeroize all secret material on drop.
//! - Every operation is a pure function of `(state, inputs)`: `encrypt` and
//!   `decrypt` return a *new* state on success and never mutate the
//!   caller's state on an `Err(_)` path.
//!
//! # Module layout
//! - `curve`    — Edwards-25519 scalar & point arithmetic (C1)
//! - `aead`     — XSalsa20-Poly1305 AEAD + the two ratchet KDFs (C2)
//! - `identity` — long-term and ephemeral DH keypairs shared by C3 and C4
//! - `epoch`    — epoch generation and `t_i`/`V_i`/`v_i` capability derivation (C3)
//! - `prpcap`   — 0-RTT message build/open and the bridge into ratchet init (C3)
//! - `ratchet`  — Double Ratchet session state, encrypt/decrypt (C4)
//! - `bundle`   — public-parameter bundle encode/decode
//! - `error`    — unified error type

pub mod aead;
pub mod bundle;
pub mod curve;
pub mod epoch;
pub mod error;
pub mod identity;
pub mod prpcap;
pub mod ratchet;

pub use error::CoreError;
