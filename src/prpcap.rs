//! 0-RTT message build/open and the bridge into ratchet initialization (C3,
//! part two). See `epoch` for capability-point derivation.

use zeroize::Zeroize;

use crate::aead;
use crate::curve;
use crate::epoch::{self, EpochParams, EpochSecret};
use crate::error::CoreError;
use crate::identity::{IdentityKeyPair, PublicKeyBytes};
use crate::ratchet::{EphemeralKeyPair, RatchetState};

const ZERO_RTT_VERSION: u8 = 0x01;

/// A complete 0-RTT message. Framing across a transport
/// is the caller's concern; [`ZeroRttMessage::to_bytes`]/[`from_bytes`]
/// give a concrete byte encoding for callers that want one.
#[derive(Debug, Clone)]
pub struct ZeroRttMessage {
    pub version: u8,
    pub sender_identity: [u8; 32],
    pub e: [u8; 32],
    pub index: u32,
    pub nonce: [u8; 24],
    pub ciphertext: Vec<u8>,
    pub timestamp_ms: u64,
}

impl ZeroRttMessage {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + 32 + 32 + 4 + 24 + 8 + self.ciphertext.len());
        out.push(self.version);
        out.extend_from_slice(&self.sender_identity);
        out.extend_from_slice(&self.e);
        out.extend_from_slice(&self.index.to_be_bytes());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.timestamp_ms.to_be_bytes());
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        const FIXED_LEN: usize = 1 + 32 + 32 + 4 + 24 + 8;
        if bytes.len() < FIXED_LEN {
            return Err(CoreError::MalformedHeader("0-RTT message shorter than fixed fields"));
        }
        let version = bytes[0];
        let mut sender_identity = [0u8; 32];
        sender_identity.copy_from_slice(&bytes[1..33]);
        let mut e = [0u8; 32];
        e.copy_from_slice(&bytes[33..65]);
        let index = u32::from_be_bytes(bytes[65..69].try_into().unwrap());
        let mut nonce = [0u8; 24];
        nonce.copy_from_slice(&bytes[69..93]);
        let timestamp_ms = u64::from_be_bytes(bytes[93..101].try_into().unwrap());
        let ciphertext = bytes[101..].to_vec();
        Ok(Self { version, sender_identity, e, index, nonce, ciphertext, timestamp_ms })
    }
}

/// The AEAD plaintext wrapped inside a 0-RTT message.
struct InitPayload {
    version: u8,
    sender_identity: [u8; 32],
    sender_ratchet_ephemeral: [u8; 32],
    plaintext: Vec<u8>,
}

impl InitPayload {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + 32 + 32 + self.plaintext.len());
        out.push(self.version);
        out.extend_from_slice(&self.sender_identity);
        out.extend_from_slice(&self.sender_ratchet_ephemeral);
        out.extend_from_slice(&self.plaintext);
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self, CoreError> {
        if bytes.len() < 1 + 32 + 32 {
            return Err(CoreError::MalformedHeader("0-RTT init payload too short"));
        }
        let version = bytes[0];
        let mut sender_identity = [0u8; 32];
        sender_identity.copy_from_slice(&bytes[1..33]);
        let mut sender_ratchet_ephemeral = [0u8; 32];
        sender_ratchet_ephemeral.copy_from_slice(&bytes[33..65]);
        let plaintext = bytes[65..].to_vec();
        Ok(Self { version, sender_identity, sender_ratchet_ephemeral, plaintext })
    }
}

/// Build a 0-RTT message to a recipient whose epoch is published as
/// `recipient_epoch`, and simultaneously seed the sender's own ratchet
/// state via [`RatchetState::init_from_prpcap_as_sender`].
pub fn build_zero_rtt(
    sender_identity: &IdentityKeyPair,
    recipient_identity_public: PublicKeyBytes,
    recipient_epoch: &EpochParams,
    index: u32,
    plaintext: &[u8],
    now_ms: u64,
) -> Result<(ZeroRttMessage, RatchetState), CoreError> {
    if !epoch::is_valid_at(recipient_epoch, now_ms) {
        return Err(CoreError::EpochExpired { valid_until_ms: recipient_epoch.valid_until_ms });
    }

    let mut e = curve::generate_private_scalar();
    let e_public = curve::point_encode(&curve::base_mul(&e));

    let capability_point = epoch::derive_capability_point(recipient_epoch, index)?;
    let shared_point = curve::dh(&e, &capability_point);
    e.zeroize();
    let mut ss = aead::sha512_32(&curve::point_encode(&shared_point));

    let sender_ratchet_ephemeral = EphemeralKeyPair::generate();
    let payload = InitPayload {
        version: ZERO_RTT_VERSION,
        sender_identity: sender_identity.public().0,
        sender_ratchet_ephemeral: sender_ratchet_ephemeral.public,
        plaintext: plaintext.to_vec(),
    }
    .encode();

    let nonce = aead::random_nonce();
    let ciphertext = aead::seal_with_nonce(&ss, &nonce, &payload, &[])?;

    let ratchet_state = RatchetState::init_from_prpcap_as_sender(
        sender_identity,
        recipient_identity_public,
        sender_ratchet_ephemeral,
        ss,
    )?;
    ss.zeroize();

    let message = ZeroRttMessage {
        version: ZERO_RTT_VERSION,
        sender_identity: sender_identity.public().0,
        e: e_public,
        index,
        nonce,
        ciphertext,
        timestamp_ms: now_ms,
    };

    Ok((message, ratchet_state))
}

/// Open a 0-RTT message using the epoch's private scalars, returning the
/// plaintext and a freshly seeded ratchet state.
pub fn open_zero_rtt(
    recipient_identity: &IdentityKeyPair,
    epoch_secret: &EpochSecret,
    epoch_params: &EpochParams,
    message: &ZeroRttMessage,
) -> Result<(Vec<u8>, RatchetState), CoreError> {
    if message.version != ZERO_RTT_VERSION {
        return Err(CoreError::UnknownVersion(message.version));
    }

    let mut v_i = epoch_secret.derive_v(epoch_params, message.index);
    let sender_ephemeral_point = curve::point_decode(&message.e)?;
    let shared_point = curve::dh(&v_i, &sender_ephemeral_point);
    v_i.zeroize();
    let mut ss = aead::sha512_32(&curve::point_encode(&shared_point));

    let payload_bytes = aead::open_with_nonce(&ss, &message.nonce, &message.ciphertext, &[])?;
    let payload = InitPayload::decode(&payload_bytes)?;
    if payload.version != ZERO_RTT_VERSION {
        return Err(CoreError::UnknownVersion(payload.version));
    }

    let sender_identity_public = PublicKeyBytes(payload.sender_identity);
    let sender_ratchet_ephemeral = PublicKeyBytes(payload.sender_ratchet_ephemeral);

    let ratchet_state = RatchetState::init_from_prpcap_as_recipient(
        recipient_identity,
        sender_identity_public,
        sender_ratchet_ephemeral,
        ss,
    )?;
    ss.zeroize();

    Ok((payload.plaintext, ratchet_state))
}
