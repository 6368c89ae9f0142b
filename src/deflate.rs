#![forbid(unsafe_code)]

use std::io::Read;
use std::mem;

use log::debug;

use crate::bit_reader::BitReader;
use crate::byte_input::ByteInput;
use crate::checksum::{Checksum, NoChecksum};
use crate::config::DecompressionConfig;
use crate::error::{Error, Result};
use crate::huffman_coding::{
    decode_litlen_distance_trees, fixed_distance_table, fixed_litlen_table, HuffmanTable,
    MAX_DISTANCE_SYMBOLS, MAX_LITLEN_SYMBOLS,
};
use crate::output_buffer::ByteOutput;

////////////////////////////////////////////////////////////////////////////////

const END_OF_BLOCK: u16 = 256;

// RFC 1951 §3.2.5: base value and extra-bit count per length symbol
// (257..=285) and per distance symbol (0..=29).
const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];
const LENGTH_EXTRA: [u32; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];
const DISTANCE_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];
const DISTANCE_EXTRA: [u32; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

////////////////////////////////////////////////////////////////////////////////

/// A back-reference that may outlive one `parse_some` call: when the output
/// buffer fills mid-copy, the remainder is carried here and resumed first
/// thing on the next call.
#[derive(Default)]
struct CopyState {
    remaining: usize,
    distance: usize,
}

impl CopyState {
    /// Copies as much as the output has room for. Returns `true` if the
    /// copy is unfinished (the output filled up).
    fn run<C: Checksum>(&mut self, output: &mut ByteOutput<C>) -> Result<bool> {
        let copying = self.remaining.min(output.available());
        output.repeat(copying, self.distance)?;
        self.remaining -= copying;
        Ok(self.remaining > 0)
    }

    fn begin<C: Checksum>(
        &mut self,
        output: &mut ByteOutput<C>,
        length: usize,
        distance: usize,
    ) -> Result<bool> {
        self.remaining = length;
        self.distance = distance;
        self.run(output)
    }
}

enum BlockProgress {
    /// The output buffer filled up; the block continues on the next call.
    OutputFull,
    /// The end-of-block symbol was reached.
    BlockDone,
}

/// Where the decoder stands between `parse_some` calls. The byte input is
/// threaded through the variants so that whichever subdecoder is active
/// owns the stream position.
enum State<R> {
    Idle(ByteInput<R>),
    Stored {
        remaining: usize,
        input: ByteInput<R>,
    },
    Fixed {
        copy: CopyState,
        reader: BitReader<R>,
    },
    Dynamic {
        copy: CopyState,
        reader: BitReader<R>,
    },
    /// Placeholder while a transition is in flight; observable only after
    /// an error tore a transition down.
    Poisoned,
}

////////////////////////////////////////////////////////////////////////////////

/// Resumable DEFLATE stream decoder.
///
/// `parse_some` runs until the final block completes or the output buffer
/// fills; `consume` drains the produced bytes. The caller alternates the
/// two until `parse_some` reports no more work.
pub struct DeflateReader<R, C: Checksum = NoChecksum> {
    state: State<R>,
    output: ByteOutput<C>,
    litlen: HuffmanTable<MAX_LITLEN_SYMBOLS>,
    distance: HuffmanTable<MAX_DISTANCE_SYMBOLS>,
    was_last: bool,
}

impl<R: Read, C: Checksum> DeflateReader<R, C> {
    pub fn new(input: R) -> Self {
        Self::with_config(input, &DecompressionConfig::default())
    }

    pub fn with_config(input: R, config: &DecompressionConfig) -> Self {
        config.validate();
        Self::from_byte_input(ByteInput::new(input, config.input_buffer_size), config)
    }

    pub(crate) fn from_byte_input(input: ByteInput<R>, config: &DecompressionConfig) -> Self {
        Self {
            state: State::Idle(input),
            output: ByteOutput::new(config.max_output_buffer_size, config.min_output_buffer_size),
            litlen: HuffmanTable::empty(),
            distance: HuffmanTable::empty(),
            was_last: false,
        }
    }

    /// Decodes until the stream ends or the output buffer is full.
    /// Returns whether more work is pending; once it returns `false` the
    /// stream is complete and a final `consume` drains the rest.
    pub fn parse_some(&mut self) -> Result<bool> {
        loop {
            // Finish (or suspend on) the active block; completing a block
            // yields the bit reader back for the next header.
            let reader = match mem::replace(&mut self.state, State::Poisoned) {
                State::Idle(input) => BitReader::new(input),
                State::Stored {
                    mut remaining,
                    mut input,
                } => {
                    while remaining > 0 {
                        let room = self.output.available();
                        if room == 0 {
                            self.state = State::Stored { remaining, input };
                            return Ok(true);
                        }
                        let chunk = input.range(remaining.min(room))?;
                        if chunk.is_empty() {
                            return Err(Error::Truncated);
                        }
                        self.output.put_bytes(chunk);
                        remaining -= chunk.len();
                    }
                    BitReader::new(input)
                }
                State::Fixed {
                    mut copy,
                    mut reader,
                } => match Self::huffman_block(
                    &self.litlen,
                    &self.distance,
                    &mut reader,
                    &mut copy,
                    &mut self.output,
                )? {
                    BlockProgress::OutputFull => {
                        self.state = State::Fixed { copy, reader };
                        return Ok(true);
                    }
                    BlockProgress::BlockDone => reader,
                },
                State::Dynamic {
                    mut copy,
                    mut reader,
                } => match Self::huffman_block(
                    &self.litlen,
                    &self.distance,
                    &mut reader,
                    &mut copy,
                    &mut self.output,
                )? {
                    BlockProgress::OutputFull => {
                        self.state = State::Dynamic { copy, reader };
                        return Ok(true);
                    }
                    BlockProgress::BlockDone => reader,
                },
                State::Poisoned => panic!("reusing a decoder after an error"),
            };

            if self.was_last {
                self.output.done();
                self.state = State::Idle(reader.into_inner());
                return Ok(false);
            }

            self.read_block_header(reader)?;
        }
    }

    /// One block header: final flag, type, and the per-type setup.
    fn read_block_header(&mut self, mut reader: BitReader<R>) -> Result<()> {
        self.was_last = reader.read_bits(1)? == 1;
        let block_type = reader.read_bits(2)?;
        debug!("block header: final={}, type={}", self.was_last, block_type);
        match block_type {
            0 => {
                // Stored blocks are byte-aligned: drop the partial bits and
                // read the length pair straight from the byte stream.
                let mut input = reader.into_inner();
                let len = input.read_u16_le()?;
                let nlen = input.read_u16_le()?;
                if len != !nlen {
                    return Err(Error::InvalidStoredLength);
                }
                self.state = State::Stored {
                    remaining: len as usize,
                    input,
                };
            }
            1 => {
                self.litlen = fixed_litlen_table()?;
                self.distance = fixed_distance_table()?;
                self.state = State::Fixed {
                    copy: CopyState::default(),
                    reader,
                };
            }
            2 => {
                let (litlen, distance) = decode_litlen_distance_trees(&mut reader)?;
                self.litlen = litlen;
                self.distance = distance;
                self.state = State::Dynamic {
                    copy: CopyState::default(),
                    reader,
                };
            }
            _ => return Err(Error::ReservedBlockType),
        }
        Ok(())
    }

    /// Literal/length/distance pipeline shared by fixed and dynamic
    /// blocks; only the tables differ.
    fn huffman_block(
        litlen: &HuffmanTable<MAX_LITLEN_SYMBOLS>,
        distance: &HuffmanTable<MAX_DISTANCE_SYMBOLS>,
        reader: &mut BitReader<R>,
        copy: &mut CopyState,
        output: &mut ByteOutput<C>,
    ) -> Result<BlockProgress> {
        if copy.remaining > 0 && copy.run(output)? {
            return Ok(BlockProgress::OutputFull);
        }
        while output.available() > 0 {
            let symbol = litlen.read_symbol(reader)?;
            if symbol < END_OF_BLOCK {
                output.put_byte(symbol as u8);
            } else if symbol == END_OF_BLOCK {
                return Ok(BlockProgress::BlockDone);
            } else {
                let length = Self::read_length(symbol, reader)?;
                let distance_symbol = distance.read_symbol(reader)?;
                let dist = Self::read_distance(distance_symbol, reader)?;
                if copy.begin(output, length, dist)? {
                    return Ok(BlockProgress::OutputFull);
                }
            }
        }
        Ok(BlockProgress::OutputFull)
    }

    fn read_length(symbol: u16, reader: &mut BitReader<R>) -> Result<usize> {
        let index = usize::from(symbol - 257);
        if index >= LENGTH_BASE.len() {
            return Err(Error::UnknownHuffmanCode);
        }
        let extra = reader.read_bits(LENGTH_EXTRA[index])?;
        Ok(usize::from(LENGTH_BASE[index]) + usize::from(extra))
    }

    fn read_distance(symbol: u16, reader: &mut BitReader<R>) -> Result<usize> {
        let index = usize::from(symbol);
        if index >= DISTANCE_BASE.len() {
            return Err(Error::BadDistance);
        }
        let extra = reader.read_bits(DISTANCE_EXTRA[index])?;
        Ok(usize::from(DISTANCE_BASE[index]) + usize::from(extra))
    }

    /// Bytes produced since the previous call, preceded by up to `keep`
    /// bytes of already-returned history (the returned count says how
    /// many). The history stays addressable until the next call.
    pub fn consume(&mut self, keep: usize) -> (usize, &[u8]) {
        let (kept, start, len) = self.output.commit_consume(keep);
        (kept, self.output.slice(start, len))
    }

    pub(crate) fn output(&self) -> &ByteOutput<C> {
        &self.output
    }

    pub(crate) fn output_mut(&mut self) -> &mut ByteOutput<C> {
        &mut self.output
    }

    /// The byte input, available between streams (after `parse_some`
    /// returned `false`) for whatever framing follows the DEFLATE data.
    pub(crate) fn byte_input_mut(&mut self) -> &mut ByteInput<R> {
        match &mut self.state {
            State::Idle(input) => input,
            _ => panic!("byte input requested while a block is being decoded"),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_deflate_to_vec;

    fn decode(data: &[u8]) -> Result<Vec<u8>> {
        read_deflate_to_vec(data)
    }

    /// Decoder with a deliberately tiny output buffer to force mid-block
    /// suspensions. Window-size validation is bypassed; the test streams
    /// only reference nearby history.
    fn tiny_buffer_decode(data: &[u8], capacity: usize, retained: usize) -> Result<Vec<u8>> {
        let mut reader = DeflateReader::<_, NoChecksum> {
            state: State::Idle(ByteInput::new(data, 64)),
            output: ByteOutput::new(capacity, retained),
            litlen: HuffmanTable::empty(),
            distance: HuffmanTable::empty(),
            was_last: false,
        };
        let mut result = Vec::new();
        loop {
            let more = reader.parse_some()?;
            let (_, batch) = reader.consume(0);
            result.extend_from_slice(batch);
            if !more {
                break;
            }
        }
        Ok(result)
    }

    #[test]
    fn empty_fixed_block() -> anyhow::Result<()> {
        assert_eq!(decode(&[0x03, 0x00])?, b"");
        Ok(())
    }

    #[test]
    fn stored_block() -> anyhow::Result<()> {
        let data = [0x01, 0x05, 0x00, 0xFA, 0xFF, b'H', b'e', b'l', b'l', b'o'];
        assert_eq!(decode(&data)?, b"Hello");
        Ok(())
    }

    #[test]
    fn fixed_block_literals() -> anyhow::Result<()> {
        assert_eq!(
            decode(&[0xF3, 0x48, 0xCD, 0xC9, 0xC9, 0x07, 0x00])?,
            b"Hello"
        );
        Ok(())
    }

    #[test]
    fn fixed_block_with_space() -> anyhow::Result<()> {
        let data = [
            0xF3, 0x48, 0xCD, 0xC9, 0xC9, 0x57, 0x28, 0xCF, 0x2F, 0xCA, 0x49, 0x01, 0x00,
        ];
        assert_eq!(decode(&data)?, b"Hello world");
        Ok(())
    }

    #[test]
    fn fixed_block_with_back_reference() -> anyhow::Result<()> {
        // "a" then a length-5 copy at distance 1.
        assert_eq!(decode(&[0x4B, 0x04, 0x03, 0x00])?, b"aaaaaa");
        Ok(())
    }

    #[test]
    fn maximum_length_copy() -> anyhow::Result<()> {
        // "a" then a length-258 copy at distance 1.
        assert_eq!(decode(&[0x4B, 0x1C, 0x05, 0x00])?, vec![b'a'; 259]);
        Ok(())
    }

    #[test]
    fn stored_length_mismatch_fails() {
        let data = [0x01, 0x05, 0x00, 0xFA, 0xFE, b'H', b'e', b'l', b'l', b'o'];
        assert!(matches!(decode(&data), Err(Error::InvalidStoredLength)));
    }

    #[test]
    fn reserved_block_type_fails() {
        assert!(matches!(
            decode(&[0x07, 0x00]),
            Err(Error::ReservedBlockType)
        ));
    }

    #[test]
    fn truncated_stored_block_fails() {
        assert!(matches!(
            decode(&[0x01, 0x05, 0x00, 0xFA, 0xFF, b'H']),
            Err(Error::Truncated)
        ));
    }

    #[test]
    fn truncated_header_fails() {
        assert!(matches!(decode(&[]), Err(Error::Truncated)));
    }

    #[test]
    fn stored_block_realigns_before_huffman_block() -> anyhow::Result<()> {
        // A non-final stored "Hel" followed by a final fixed block "lo":
        // the bit reader must surrender its lookahead at the boundary.
        let data = [
            0x00, 0x03, 0x00, 0xFC, 0xFF, b'H', b'e', b'l', 0xCB, 0xC9, 0x07, 0x00,
        ];
        assert_eq!(decode(&data)?, b"Hello");
        Ok(())
    }

    #[test]
    fn copy_resumes_across_full_output_buffer() -> anyhow::Result<()> {
        // 259 bytes of output through a 64-byte buffer: the length-258
        // copy must suspend and resume several times.
        let out = tiny_buffer_decode(&[0x4B, 0x1C, 0x05, 0x00], 64, 16)?;
        assert_eq!(out, vec![b'a'; 259]);
        Ok(())
    }

    #[test]
    fn stored_block_resumes_across_full_output_buffer() -> anyhow::Result<()> {
        let mut data = vec![0x01, 0x2C, 0x01, 0xD3, 0xFE];
        data.extend((0..300u16).map(|i| i as u8));
        let out = tiny_buffer_decode(&data, 64, 16)?;
        assert_eq!(out, (0..300u16).map(|i| i as u8).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn output_chunking_does_not_change_content() -> anyhow::Result<()> {
        let reference = decode(&[0x4B, 0x1C, 0x05, 0x00])?;
        for capacity in [32, 48, 64, 100, 300] {
            assert_eq!(
                tiny_buffer_decode(&[0x4B, 0x1C, 0x05, 0x00], capacity, 8)?,
                reference
            );
        }
        Ok(())
    }
}
