#![forbid(unsafe_code)]

//! Streaming decompressor for gzip (RFC 1952) and raw DEFLATE (RFC 1951)
//! streams.
//!
//! All buffers are sized once at construction: compressed bytes are pulled
//! from any [`std::io::Read`] through a bounded input buffer, and output is
//! produced through a fixed buffer that doubles as the 32 KiB sliding
//! window. Decoding suspends whenever that buffer fills, so arbitrarily
//! large streams decode in constant memory.
//!
//! ```no_run
//! # fn main() -> gzdec::Result<()> {
//! let file = std::fs::File::open("data.gz")?;
//! gzdec::decompress(file, std::io::stdout())?;
//! # Ok(())
//! # }
//! ```

use std::io::{Read, Write};

mod bit_reader;
mod byte_input;
mod checksum;
mod config;
mod deflate;
mod error;
mod gzip;
mod huffman_coding;
mod output_buffer;

pub use checksum::{Checksum, Crc32, NoChecksum};
pub use config::{DecompressionConfig, MAX_MATCH_LEN, WINDOW_SIZE};
pub use deflate::DeflateReader;
pub use error::{Error, Result};
pub use gzip::{CompressionMethod, GzipReader, MemberFlags, MemberHeader};

/// Decompresses one gzip member from `input` into `output`, verifying the
/// trailer checksum and length.
pub fn decompress<R: Read, W: Write>(input: R, output: W) -> Result<()> {
    GzipReader::new(input)?.read_all(output)
}

/// Decodes a raw DEFLATE stream (no container framing, no checksum) into
/// a vector.
pub fn read_deflate_to_vec<R: Read>(input: R) -> Result<Vec<u8>> {
    let mut reader = DeflateReader::<R, NoChecksum>::new(input);
    let mut result = Vec::new();
    loop {
        let more = reader.parse_some()?;
        let (_, batch) = reader.consume(0);
        result.extend_from_slice(batch);
        if !more {
            return Ok(result);
        }
    }
}
