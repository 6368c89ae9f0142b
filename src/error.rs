#![forbid(unsafe_code)]

use thiserror::Error;

/// Errors surfaced while decoding a stream.
///
/// Every variant is fatal for the stream it occurred in; the reader that
/// produced it must not be reused.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unexpected end of stream")]
    Truncated,

    #[error("stored block length does not match its one's complement")]
    InvalidStoredLength,

    #[error("reserved block type")]
    ReservedBlockType,

    #[error("huffman code space over-subscribed")]
    OverSubscribedHuffman,

    #[error("unknown huffman code")]
    UnknownHuffmanCode,

    #[error("code length repeat with no previous length")]
    InvalidRepeatCode,

    #[error("back-reference distance out of range")]
    BadDistance,

    #[error("declared code count out of range")]
    TooManyCodes,

    #[error("not a gzip stream")]
    NotGzip,

    #[error("unsupported compression method {0}")]
    UnsupportedCompressionMethod(u8),

    #[error("gzip header crc16 check failed")]
    HeaderChecksumMismatch,

    #[error("crc32 mismatch: stored {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("length mismatch: stored {expected}, produced {actual}")]
    LengthMismatch { expected: u32, actual: u32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
