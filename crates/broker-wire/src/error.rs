//! Codec-level error taxonomy.
//!
//! These map 1:1 to the error kinds the spec assigns to framing and decoding
//! failures (`MalformedFrame`, `InvalidKind`, `InvalidContentType`). All are
//! fatal to the connection they occur on — the caller closes the peer.

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed frame: totalLen {0} is smaller than the 8-byte frame prefix")]
    FrameTooShort(u32),

    #[error("malformed frame: headerLen {header_len} exceeds totalLen {total_len} minus the 8-byte prefix")]
    HeaderOverflow { header_len: u32, total_len: u32 },

    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),

    #[error("unknown kind byte {0:#x}")]
    InvalidKind(u8),

    #[error("unknown content-type byte {0}")]
    InvalidContentType(u8),

    #[error("invalid utf-8 in string field")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("invalid json payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("io error decoding frame: {0}")]
    Io(#[from] std::io::Error),
}
