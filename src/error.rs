use thiserror::Error;

/// Unified error type for every component of the core (C1-C4).
///
/// Never include secret material (scalars, keys, plaintexts) in a variant's
/// payload — only public values (counters, byte lengths, version bytes).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid curve point")]
    InvalidPoint,

    #[error("invalid scalar: {0}")]
    InvalidScalar(&'static str),

    #[error("malformed ratchet header: {0}")]
    MalformedHeader(&'static str),

    #[error("unknown protocol version: {0}")]
    UnknownVersion(u8),

    #[error("AEAD decryption failed (authentication tag mismatch)")]
    DecryptFail,

    #[error("replayed message counter {counter} (current receive counter {receive_counter})")]
    Replay { counter: u32, receive_counter: u32 },

    #[error("skip limit exceeded: {skip} > {max_skip}")]
    SkipLimitExceeded { skip: u64, max_skip: u64 },

    #[error("message ephemeral key refers to neither the current nor a retained previous chain")]
    UnknownChain,

    #[error("epoch expired at {valid_until_ms}")]
    EpochExpired { valid_until_ms: u64 },

    #[error("configuration error: {0}")]
    ConfigError(&'static str),

    /// A single `decrypt` call is already bounded by MAX_SKIP, so the
    /// skipped-key cache's global cap is enforced by eviction rather than
    /// by returning this error; kept in the enum for taxonomic
    /// completeness even though the current implementation never takes
    /// this path.
    #[error("skipped-key cache overflow: {len} entries exceeds cap {cap}")]
    EvictionOverflow { len: usize, cap: usize },

    #[error("bundle metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}
