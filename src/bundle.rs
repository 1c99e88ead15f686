//! The public-parameter bundle shared out-of-band: identity public
//! key plus one epoch's public points and validity metadata.

use serde::{Deserialize, Serialize};

use crate::epoch::EpochParams;
use crate::error::CoreError;
use crate::identity::PublicKeyBytes;

const BUNDLE_VERSION: u8 = 0x01;

/// JSON metadata trailing the fixed-width fields of a bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BundleMetadata {
    #[serde(rename = "validFrom")]
    valid_from: u64,
    #[serde(rename = "validUntil")]
    valid_until: u64,
    #[serde(rename = "epochId")]
    epoch_id: String,
}

/// A decoded public-parameter bundle.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub identity_public: PublicKeyBytes,
    pub epoch: EpochParams,
}

impl Bundle {
    pub fn new(identity_public: PublicKeyBytes, epoch: EpochParams) -> Self {
        Self { identity_public, epoch }
    }

    /// Encode as `version || identity_public || A || B || metadata_json`.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CoreError> {
        let metadata = BundleMetadata {
            valid_from: self.epoch.valid_from_ms,
            valid_until: self.epoch.valid_until_ms,
            epoch_id: hex::encode(self.epoch.epoch_id),
        };
        let metadata_json = serde_json::to_vec(&metadata)?;

        let mut out = Vec::with_capacity(1 + 32 + 32 + 32 + metadata_json.len());
        out.push(BUNDLE_VERSION);
        out.extend_from_slice(&self.identity_public.0);
        out.extend_from_slice(&self.epoch.a);
        out.extend_from_slice(&self.epoch.b);
        out.extend_from_slice(&metadata_json);
        Ok(out)
    }

    /// Decode and validate a bundle. Rejects any version byte other than
    /// `0x01`. Does not itself enforce the expiry policy — callers decide
    /// whether to accept an expired bundle.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        const FIXED_LEN: usize = 1 + 32 + 32 + 32;
        if bytes.len() < FIXED_LEN {
            return Err(CoreError::MalformedHeader("bundle shorter than fixed fields"));
        }
        let version = bytes[0];
        if version != BUNDLE_VERSION {
            return Err(CoreError::UnknownVersion(version));
        }
        let mut identity = [0u8; 32];
        identity.copy_from_slice(&bytes[1..33]);
        let mut a = [0u8; 32];
        a.copy_from_slice(&bytes[33..65]);
        let mut b = [0u8; 32];
        b.copy_from_slice(&bytes[65..97]);
        let metadata: BundleMetadata = serde_json::from_slice(&bytes[97..])?;
        let epoch_id_vec = hex::decode(&metadata.epoch_id)?;
        let epoch_id: [u8; 16] = epoch_id_vec
            .try_into()
            .map_err(|_| CoreError::ConfigError("epochId metadata must decode to 16 bytes"))?;

        Ok(Self {
            identity_public: PublicKeyBytes(identity),
            epoch: EpochParams {
                epoch_id,
                a,
                b,
                valid_from_ms: metadata.valid_from,
                valid_until_ms: metadata.valid_until,
            },
        })
    }
}
