//! Double Ratchet session state and the symmetric + DH ratchet steps (C4).
//!
//! State separation:
//!   rootKey            — updated on every DH ratchet step
//!   sendingChainKey     — updated per sent message
//!   receivingChainKey   — updated per received message on the current chain
//!   messageKey          — derived from a chain key, used once, then dropped
//!
//! Every operation here is a pure function of `(state, inputs)`: `encrypt`
//! and `decrypt` take `&self` and return a *new* `RatchetState` on success,
//! leaving the caller's original state untouched on any `Err(_)` path. This
//! is what gives the "no mutation on failure" invariant for free rather than
//! needing a rollback step.

use std::collections::{HashMap, VecDeque};

use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use zeroize::Zeroize;

use crate::aead;
use crate::curve::{self, PointBytes};
use crate::error::CoreError;
use crate::identity::{IdentityKeyPair, PublicKeyBytes};

/// Ratchet header version. The only version this crate emits or accepts.
pub const RATCHET_VERSION: u8 = 0x01;
/// Maximum per-call gap a decrypt may tolerate without rejecting.
pub const MAX_SKIP: u64 = 100;
/// Soft cap on the total number of cached skipped message keys across all
/// chains. Enforced by evicting the oldest-inserted entry (tracked by
/// `skipped_key_order`, not `HashMap` iteration order), not by rejecting
/// the decrypt that would exceed it — see `CoreError::EvictionOverflow`.
const SKIPPED_KEYS_CAP: usize = 1000;

const HEADER_LEN: usize = 65;
const AEAD_OVERHEAD: usize = 16;

/// A single-use DH ratchet keypair.
#[derive(Clone, Copy)]
pub(crate) struct EphemeralKeyPair {
    pub(crate) secret: Scalar,
    pub(crate) public: PointBytes,
}

impl EphemeralKeyPair {
    pub(crate) fn generate() -> Self {
        let secret = curve::generate_private_scalar();
        let public = curve::point_encode(&curve::base_mul(&secret));
        Self { secret, public }
    }
}

/// A retired receiving chain, kept so messages still in flight on the old
/// chain can be derived after the peer has moved the conversation forward.
/// Only the single most-recently-retired chain is kept, bounding memory
/// at the cost of rejecting anything further behind.
#[derive(Clone)]
struct RetiredChain {
    chain_key: [u8; 32],
    next_expected: u32,
}

/// Where a session sits in the `Uninitialized -> Initialized ->
/// Bidirectional` state machine. There is no runtime value for
/// `Uninitialized`: a `RatchetState` is only ever constructed already
/// `Initialized` by `init_plain`/`init_from_prpcap_as_*`, and transitions
/// to `Bidirectional` the moment a message has actually been received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatchetPhase {
    /// Sending is possible; nothing has been received yet
    /// (`receiveCounter == 0` and no message has ever been decrypted).
    Initialized,
    /// At least one message has been received on this session.
    Bidirectional,
}

/// Complete Double Ratchet session state for one peer.
#[derive(Clone)]
pub struct RatchetState {
    my_ephemeral: EphemeralKeyPair,
    their_ephemeral: Option<PointBytes>,
    ratcheted_for_their_ephemeral: bool,

    root_key: [u8; 32],
    sending_chain_key: [u8; 32],
    receiving_chain_key: [u8; 32],

    send_counter: u32,
    receive_counter: u32,
    previous_send_counter: u32,

    /// Set once on the first successful `decrypt`; never cleared, even
    /// though `receive_counter` itself can later reset to 0 across a DH
    /// ratchet step. Backs `phase()`.
    has_received: bool,

    skipped_message_keys: HashMap<(PointBytes, u32), [u8; 32]>,
    /// Insertion order of `skipped_message_keys`, oldest first. Lets
    /// `insert_skipped` evict the genuine oldest entry instead of whatever
    /// `HashMap` iteration happens to yield. A key is popped from here
    /// whenever it's removed from the map, by eviction or by normal
    /// consumption in `decrypt`.
    skipped_key_order: VecDeque<(PointBytes, u32)>,
    previous_receiving_chains: HashMap<PointBytes, RetiredChain>,
}

impl Drop for RatchetState {
    fn drop(&mut self) {
        self.my_ephemeral.secret.zeroize();
        self.root_key.zeroize();
        self.sending_chain_key.zeroize();
        self.receiving_chain_key.zeroize();
        for mk in self.skipped_message_keys.values_mut() {
            mk.zeroize();
        }
        for retired in self.previous_receiving_chains.values_mut() {
            retired.chain_key.zeroize();
        }
    }
}

// ── Construction ─────────────────────────────────────────────────────────

impl RatchetState {
    /// Plain, symmetric initialization with no prior PRP-Cap exchange
    /// Both peers call this with the other's identity public and
    /// converge on the same root key and initial chain.
    pub fn init_plain(
        my_identity: &IdentityKeyPair,
        their_identity_public: PublicKeyBytes,
    ) -> Result<Self, CoreError> {
        let shared = my_identity.dh(&their_identity_public)?;
        let shared_bytes = curve::point_encode(&shared);
        let (root_key, initial_chain) = aead::sha512_split(&shared_bytes);
        Ok(Self {
            my_ephemeral: EphemeralKeyPair::generate(),
            their_ephemeral: None,
            ratcheted_for_their_ephemeral: false,
            root_key,
            sending_chain_key: initial_chain,
            receiving_chain_key: initial_chain,
            send_counter: 0,
            receive_counter: 0,
            previous_send_counter: 0,
            has_received: false,
            skipped_message_keys: HashMap::new(),
            skipped_key_order: VecDeque::new(),
            previous_receiving_chains: HashMap::new(),
        })
    }

    /// Recipient-side ratchet seeding from an opened PRP-Cap message.
    /// `ss` is the 0-RTT shared secret; `their_ratchet_ephemeral` is the
    /// sender's freshly generated ratchet public from the payload.
    ///
    /// Two DH terms are mixed alongside `ss`: an ephemeral-identity term
    /// `dh(myIdentity, theirRatchetEphemeral)` and an identity-identity term
    /// `dh(myIdentity, theirIdentity)` — see [`Self::init_from_prpcap_as_sender`]
    /// for why the identity-identity term replaces the literal `dh2` of
    /// §4.3.5 in this crate.
    pub(crate) fn init_from_prpcap_as_recipient(
        my_identity: &IdentityKeyPair,
        their_identity_public: PublicKeyBytes,
        their_ratchet_ephemeral: PublicKeyBytes,
        ss: [u8; 32],
    ) -> Result<Self, CoreError> {
        let their_ephemeral_point = their_ratchet_ephemeral.point()?;
        let dh1 = curve::dh(my_identity.secret_scalar(), &their_ephemeral_point);
        let dh2 = my_identity.dh(&their_identity_public)?;
        let my_ephemeral = EphemeralKeyPair::generate();
        let state = Self::finish_from_prpcap(ss, &dh1, &dh2, Some(their_ratchet_ephemeral.0), my_ephemeral);
        Ok(state)
    }

    /// Sender-side mirror of the same derivation, run immediately after
    /// building a 0-RTT message.
    ///
    /// §4.3.5 as literally written computes the second DH term from the
    /// *recipient's* freshly generated ratchet ephemeral secret — a value
    /// that is never transmitted to the sender anywhere in the 0-RTT flow,
    /// so the sender has no way to reproduce it. This crate resolves that
    /// ambiguity (documented in DESIGN.md) by using the identity-identity
    /// DH (`dh(myIdentity, theirIdentity)`, the same primitive
    /// [`Self::init_plain`] uses) as the second term instead: both sides
    /// already hold everything needed to compute it, and it still
    /// contributes independent key material alongside `ss` and the
    /// ephemeral-identity term. The sender's own current ratchet ephemeral
    /// becomes `sender_ratchet_ephemeral` itself (the keypair whose public
    /// half went into the 0-RTT payload), per §4.3.3 step 5 — no second
    /// ephemeral is generated.
    pub(crate) fn init_from_prpcap_as_sender(
        my_identity: &IdentityKeyPair,
        their_identity_public: PublicKeyBytes,
        sender_ratchet_ephemeral: EphemeralKeyPair,
        ss: [u8; 32],
    ) -> Result<Self, CoreError> {
        let their_identity_point = their_identity_public.point()?;
        let dh1 = curve::dh(&sender_ratchet_ephemeral.secret, &their_identity_point);
        let dh2 = my_identity.dh(&their_identity_public)?;
        let state = Self::finish_from_prpcap(ss, &dh1, &dh2, None, sender_ratchet_ephemeral);
        Ok(state)
    }

    fn finish_from_prpcap(
        mut ss: [u8; 32],
        dh1: &EdwardsPoint,
        dh2: &EdwardsPoint,
        their_ephemeral: Option<PointBytes>,
        my_ephemeral: EphemeralKeyPair,
    ) -> Self {
        let mut combined = Vec::with_capacity(96);
        combined.extend_from_slice(&ss);
        combined.extend_from_slice(&curve::point_encode(dh1));
        combined.extend_from_slice(&curve::point_encode(dh2));
        let (root_key, initial_chain) = aead::sha512_split(&combined);
        combined.zeroize();
        ss.zeroize();
        Self {
            my_ephemeral,
            their_ephemeral,
            ratcheted_for_their_ephemeral: false,
            root_key,
            sending_chain_key: initial_chain,
            receiving_chain_key: initial_chain,
            send_counter: 0,
            receive_counter: 0,
            previous_send_counter: 0,
            has_received: false,
            skipped_message_keys: HashMap::new(),
            skipped_key_order: VecDeque::new(),
            previous_receiving_chains: HashMap::new(),
        }
    }

    pub fn their_ephemeral(&self) -> Option<PointBytes> {
        self.their_ephemeral
    }

    pub fn send_counter(&self) -> u32 {
        self.send_counter
    }

    pub fn receive_counter(&self) -> u32 {
        self.receive_counter
    }

    pub fn previous_send_counter(&self) -> u32 {
        self.previous_send_counter
    }

    pub fn skipped_key_count(&self) -> usize {
        self.skipped_message_keys.len()
    }

    /// Current position in the `Initialized -> Bidirectional` state
    /// machine (§4.4.5). There is no `Uninitialized` variant to return —
    /// see [`RatchetPhase`].
    pub fn phase(&self) -> RatchetPhase {
        if self.has_received {
            RatchetPhase::Bidirectional
        } else {
            RatchetPhase::Initialized
        }
    }
}

// ── Wire header ──────────────────────────────────────────────────────────

fn encode_header(ephemeral: &PointBytes, prev_counter: u32, msg_counter: u32, nonce: &[u8; 24]) -> [u8; HEADER_LEN] {
    let mut out = [0u8; HEADER_LEN];
    out[0] = RATCHET_VERSION;
    out[1..33].copy_from_slice(ephemeral);
    out[33..37].copy_from_slice(&prev_counter.to_be_bytes());
    out[37..41].copy_from_slice(&msg_counter.to_be_bytes());
    out[41..65].copy_from_slice(nonce);
    out
}

struct ParsedHeader<'a> {
    ephemeral: PointBytes,
    previous_send_counter: u32,
    message_counter: u32,
    nonce: [u8; 24],
    ciphertext: &'a [u8],
}

fn parse_header(wire: &[u8]) -> Result<ParsedHeader<'_>, CoreError> {
    if wire.len() < HEADER_LEN + AEAD_OVERHEAD {
        return Err(CoreError::MalformedHeader("message shorter than fixed header + AEAD overhead"));
    }
    let version = wire[0];
    if version != RATCHET_VERSION {
        return Err(CoreError::UnknownVersion(version));
    }
    let mut ephemeral = [0u8; 32];
    ephemeral.copy_from_slice(&wire[1..33]);
    let previous_send_counter = u32::from_be_bytes(wire[33..37].try_into().unwrap());
    let message_counter = u32::from_be_bytes(wire[37..41].try_into().unwrap());
    let mut nonce = [0u8; 24];
    nonce.copy_from_slice(&wire[41..65]);
    Ok(ParsedHeader {
        ephemeral,
        previous_send_counter,
        message_counter,
        nonce,
        ciphertext: &wire[65..],
    })
}

fn insert_skipped(state: &mut RatchetState, key: (PointBytes, u32), message_key: [u8; 32]) {
    if state.skipped_message_keys.len() >= SKIPPED_KEYS_CAP {
        if let Some(evict_key) = state.skipped_key_order.pop_front() {
            if let Some(mut evicted) = state.skipped_message_keys.remove(&evict_key) {
                evicted.zeroize();
            }
        }
    }
    state.skipped_message_keys.insert(key, message_key);
    state.skipped_key_order.push_back(key);
}

/// Remove `key` from both `skipped_message_keys` and `skipped_key_order`,
/// keeping the two in sync when a key is consumed outside of eviction.
fn take_skipped(state: &mut RatchetState, key: &(PointBytes, u32)) -> Option<[u8; 32]> {
    let message_key = state.skipped_message_keys.remove(key)?;
    if let Some(pos) = state.skipped_key_order.iter().position(|k| k == key) {
        state.skipped_key_order.remove(pos);
    }
    Some(message_key)
}

// ── Encrypt / decrypt ─────────────────────────────────────────────────────

impl RatchetState {
    /// Encrypt `plaintext`, returning the new state and the wire-format
    /// message (`header || ciphertext+tag`).
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<(Self, Vec<u8>), CoreError> {
        let mut state = self.clone();

        if let Some(their_ephemeral) = state.their_ephemeral {
            if !state.ratcheted_for_their_ephemeral {
                state.previous_send_counter = state.send_counter;
                let new_ephemeral = EphemeralKeyPair::generate();
                let their_point = curve::point_decode(&their_ephemeral)?;
                let dh_out = curve::dh(&new_ephemeral.secret, &their_point);
                let mut dh_out_bytes = curve::point_encode(&dh_out);
                let (new_root, new_sending_chain) = aead::kdf_root(&state.root_key, &dh_out_bytes);
                dh_out_bytes.zeroize();
                state.root_key = new_root;
                state.sending_chain_key = new_sending_chain;
                state.my_ephemeral = new_ephemeral;
                state.send_counter = 0;
                state.ratcheted_for_their_ephemeral = true;
            }
        }

        let (mut message_key, next_chain) = aead::kdf_chain(&state.sending_chain_key);
        state.sending_chain_key = next_chain;

        let nonce = aead::random_nonce();
        let header = encode_header(&state.my_ephemeral.public, state.previous_send_counter, state.send_counter, &nonce);
        let ciphertext = aead::seal_with_nonce(&message_key, &nonce, plaintext, &[])?;
        message_key.zeroize();
        state.send_counter += 1;

        let mut wire = Vec::with_capacity(header.len() + ciphertext.len());
        wire.extend_from_slice(&header);
        wire.extend_from_slice(&ciphertext);
        Ok((state, wire))
    }

    /// Decrypt a wire-format message. On success returns the new state and
    /// the plaintext; on any error the caller's own state is untouched
    /// because only a clone was ever mutated.
    pub fn decrypt(&self, wire: &[u8]) -> Result<(Self, Vec<u8>), CoreError> {
        let header = parse_header(wire)?;
        let mut state = self.clone();
        let e_prime = header.ephemeral;

        let is_known_retired = state.previous_receiving_chains.contains_key(&e_prime);
        let is_new_ephemeral = match state.their_ephemeral {
            Some(current) => !aead::ct_eq(&e_prime, &current) && !is_known_retired,
            None => true,
        };

        if is_new_ephemeral {
            if let Some(old_e) = state.their_ephemeral {
                if header.previous_send_counter > 0 {
                    let mut chain_cursor = state.receiving_chain_key;
                    for idx in state.receive_counter..header.previous_send_counter {
                        let (mk, next) = aead::kdf_chain(&chain_cursor);
                        chain_cursor = next;
                        insert_skipped(&mut state, (old_e, idx), mk);
                    }
                    // Only the single most-recently-retired chain is kept
                    // (Resolved Open Question #4): drop whatever was there
                    // before so this map never grows past one entry across
                    // repeated DH ratchet steps.
                    for mut stale in state.previous_receiving_chains.drain().map(|(_, v)| v) {
                        stale.chain_key.zeroize();
                    }
                    state.previous_receiving_chains.insert(
                        old_e,
                        RetiredChain { chain_key: chain_cursor, next_expected: header.previous_send_counter },
                    );
                }
            }

            let skip_dh = state.their_ephemeral.is_none() && state.send_counter == 0;
            if !skip_dh {
                let their_point = curve::point_decode(&e_prime)?;
                let dh_out = curve::dh(&state.my_ephemeral.secret, &their_point);
                let mut dh_out_bytes = curve::point_encode(&dh_out);
                let (new_root, new_receiving_chain) = aead::kdf_root(&state.root_key, &dh_out_bytes);
                dh_out_bytes.zeroize();
                state.root_key = new_root;
                state.receiving_chain_key = new_receiving_chain;
                state.receive_counter = 0;
            }
            state.their_ephemeral = Some(e_prime);
            state.ratcheted_for_their_ephemeral = false;
        }

        let direct_key = (e_prime, header.message_counter);
        let mut message_key = if let Some(mk) = take_skipped(&mut state, &direct_key) {
            mk
        } else if state.their_ephemeral == Some(e_prime) {
            if header.message_counter < state.receive_counter {
                return Err(CoreError::Replay { counter: header.message_counter, receive_counter: state.receive_counter });
            }
            let skip = (header.message_counter - state.receive_counter) as u64;
            if skip > MAX_SKIP {
                return Err(CoreError::SkipLimitExceeded { skip, max_skip: MAX_SKIP });
            }
            let mut chain_cursor = state.receiving_chain_key;
            for idx in state.receive_counter..header.message_counter {
                let (mk, next) = aead::kdf_chain(&chain_cursor);
                chain_cursor = next;
                insert_skipped(&mut state, (e_prime, idx), mk);
            }
            let (mk, next) = aead::kdf_chain(&chain_cursor);
            state.receiving_chain_key = next;
            state.receive_counter = header.message_counter + 1;
            mk
        } else {
            let retired = state
                .previous_receiving_chains
                .get(&e_prime)
                .cloned()
                .ok_or(CoreError::UnknownChain)?;
            if header.message_counter < retired.next_expected {
                return Err(CoreError::Replay { counter: header.message_counter, receive_counter: retired.next_expected });
            }
            let skip = (header.message_counter - retired.next_expected) as u64;
            if skip > MAX_SKIP {
                return Err(CoreError::SkipLimitExceeded { skip, max_skip: MAX_SKIP });
            }
            let mut chain_cursor = retired.chain_key;
            for idx in retired.next_expected..header.message_counter {
                let (mk, next) = aead::kdf_chain(&chain_cursor);
                chain_cursor = next;
                insert_skipped(&mut state, (e_prime, idx), mk);
            }
            let (mk, next) = aead::kdf_chain(&chain_cursor);
            state
                .previous_receiving_chains
                .insert(e_prime, RetiredChain { chain_key: next, next_expected: header.message_counter + 1 });
            mk
        };

        let plaintext = aead::open_with_nonce(&message_key, &header.nonce, header.ciphertext, &[])?;
        message_key.zeroize();
        state.has_received = true;
        Ok((state, plaintext))
    }
}
