//! Error types
//!
//! Errors are grouped by where they surface:
//! - [`FramingError`]: the interleaved transport prefix or RTP header is bad.
//!   Returned to the reader of the connection; the connection is usually lost.
//! - [`MediaError`]: a codec payload can not be handled. Logged by the worker
//!   that hit it, the packet or frame is dropped and the stream continues.
//! - [`HlsError`]: playlist or segment queries that can not be answered yet.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("media error: {0}")]
    Media(#[from] MediaError),

    #[error("hls error: {0}")]
    Hls(#[from] HlsError),

    #[error("stream is closed")]
    StreamClosed,
}

/// Interleaved RTP framing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    #[error("rtp pack must start with `$`, got 0x{0:02x}")]
    BadMagic(u8),

    #[error("rtp packet illegal channel {0}")]
    UnknownChannel(u8),

    #[error("truncated packet: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("invalid rtp header")]
    InvalidRtpHeader,

    #[error("packet of {0} bytes does not fit the interleaved length field")]
    Oversized(usize),
}

/// Codec payload errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("nalu type {0} is currently not handled")]
    UnsupportedNalType(u8),

    #[error("invalid avc packet")]
    InvalidAvcPacket,

    #[error("invalid aac packet")]
    InvalidAacPacket,

    #[error("unsupported aac profile {0}")]
    UnsupportedAacProfile(u8),

    #[error("invalid parameter set: {0}")]
    InvalidParameterSet(&'static str),

    #[error("flv header carries neither audio nor video")]
    NoFlvStreams,

    #[error("invalid flv signature")]
    InvalidFlvSignature,

    #[error("previous tag size mismatch: expected {expected}, got {actual}")]
    PreviousTagSizeMismatch { expected: u32, actual: u32 },
}

/// HLS query errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HlsError {
    #[error("playlist is not ready, the hls stream may have just started")]
    NotReady,

    #[error("segment {0} not found")]
    SegmentNotFound(u64),
}
