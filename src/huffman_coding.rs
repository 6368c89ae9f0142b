#![forbid(unsafe_code)]

use std::io::Read;

use log::trace;

use crate::bit_reader::BitReader;
use crate::error::{Error, Result};

/// Literal/length alphabet: 256 literals, end-of-block, 29 lengths, and the
/// two symbols RFC 1951 declares but never uses.
pub const MAX_LITLEN_SYMBOLS: usize = 288;
/// Distance alphabet, full 5-bit HDIST range.
pub const MAX_DISTANCE_SYMBOLS: usize = 32;
/// Code-length (precode) alphabet of a dynamic block.
pub const MAX_PRECODE_SYMBOLS: usize = 19;

const MAX_CODE_LEN: u8 = 15;

/// Transmission order of the code-length code lengths in a dynamic header.
const PRECODE_ORDER: [usize; MAX_PRECODE_SYMBOLS] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

#[derive(Clone, Copy)]
struct CodeEntry {
    code: u16,
    length: u8,
}

impl CodeEntry {
    const EMPTY: Self = Self { code: 0, length: 0 };
}

/// One codeword longer than eight bits: the bits past its 8-bit prefix,
/// MSB-aligned, plus how many of them there are.
#[derive(Clone, Copy)]
struct OverflowEntry {
    remainder: u8,
    bits_left: u8,
    symbol: u16,
    last_in_group: bool,
}

impl OverflowEntry {
    const EMPTY: Self = Self {
        remainder: 0,
        bits_left: 0,
        symbol: 0,
        last_in_group: false,
    };
}

/// What an 8-bit peek resolves to.
#[derive(Clone, Copy)]
enum FirstStage {
    /// No codeword starts with these bits.
    Unused,
    /// A codeword of at most 8 bits; its symbol.
    Direct(u16),
    /// Several codewords longer than 8 bits share this prefix; start of
    /// their overflow group.
    Overflow(u16),
}

/// Canonical Huffman decoding table over at most `N` symbols.
///
/// Two stages: a 256-entry direct lookup keyed by the next 8 (reversed)
/// bits resolves every short codeword in one step, and codewords longer
/// than 8 bits fall through to a short linear scan over the entries
/// sharing their prefix.
pub struct HuffmanTable<const N: usize> {
    codes: [CodeEntry; N],
    first_stage: [FirstStage; 256],
    overflow: [OverflowEntry; N],
}

impl<const N: usize> HuffmanTable<N> {
    pub fn empty() -> Self {
        Self {
            codes: [CodeEntry::EMPTY; N],
            first_stage: [FirstStage::Unused; 256],
            overflow: [OverflowEntry::EMPTY; N],
        }
    }

    /// Builds the canonical code for a per-symbol length vector (length 0
    /// means the symbol is absent) and indexes it for decoding.
    ///
    /// Codes of each length occupy consecutive values in symbol order,
    /// continuing from twice the previous length's end; running past the
    /// code space means the lengths are corrupt.
    pub fn from_lengths(lengths: &[u8]) -> Result<Self> {
        debug_assert!(lengths.len() <= N);
        let mut table = Self::empty();
        for (i, &length) in lengths.iter().enumerate() {
            debug_assert!(length <= MAX_CODE_LEN);
            table.codes[i].length = length;
        }

        let mut group_sizes = [0u16; 256];
        let mut next_code: u32 = 0;
        for length in 1..=MAX_CODE_LEN {
            for i in 0..lengths.len() {
                if table.codes[i].length != length {
                    continue;
                }
                if next_code >= 1 << length {
                    return Err(Error::OverSubscribedHuffman);
                }
                table.codes[i].code = next_code as u16;
                if length <= 8 {
                    let first = (next_code as usize) << (8 - length);
                    let past = ((next_code + 1) as usize) << (8 - length);
                    for slot in first..past {
                        table.first_stage[slot] = FirstStage::Direct(i as u16);
                    }
                } else {
                    group_sizes[(next_code >> (length - 8)) as usize] += 1;
                }
                next_code += 1;
            }
            next_code <<= 1;
        }

        // Lay the long codes out as contiguous per-prefix groups.
        let mut group_starts = [0u16; 256];
        let mut next_start = 0u16;
        for (start, &size) in group_starts.iter_mut().zip(group_sizes.iter()) {
            *start = next_start;
            next_start += size;
        }
        let mut group_filled = [0u16; 256];
        for i in 0..lengths.len() {
            let CodeEntry { code, length } = table.codes[i];
            if length <= 8 {
                continue;
            }
            let prefix = (code >> (length - 8)) as usize;
            let slot = (group_starts[prefix] + group_filled[prefix]) as usize;
            group_filled[prefix] += 1;
            table.overflow[slot] = OverflowEntry {
                remainder: ((u32::from(code) << (16 - u32::from(length))) & 0xff) as u8,
                bits_left: length - 8,
                symbol: i as u16,
                last_in_group: group_filled[prefix] == group_sizes[prefix],
            };
            table.first_stage[prefix] = FirstStage::Overflow(group_starts[prefix]);
        }

        Ok(table)
    }

    /// Decodes one codeword from the reader and returns its symbol.
    pub fn read_symbol<R: Read>(&self, reader: &mut BitReader<R>) -> Result<u16> {
        const PREFIX_MASKS: [u8; 9] = [0x00, 0x80, 0xc0, 0xe0, 0xf0, 0xf8, 0xfc, 0xfe, 0xff];

        let peeked = reader.peek_byte()?;
        let group_start = match self.first_stage[peeked as usize] {
            FirstStage::Direct(symbol) => {
                reader.consume(self.codes[symbol as usize].length)?;
                return Ok(symbol);
            }
            FirstStage::Unused => return Err(Error::UnknownHuffmanCode),
            FirstStage::Overflow(start) => start,
        };

        reader.consume(8)?;
        let peeked = reader.peek_byte()?;
        for entry in &self.overflow[group_start as usize..] {
            if peeked & PREFIX_MASKS[entry.bits_left as usize] == entry.remainder {
                reader.consume(entry.bits_left)?;
                return Ok(entry.symbol);
            }
            if entry.last_in_group {
                break;
            }
        }
        Err(Error::UnknownHuffmanCode)
    }
}

/// The implicit fixed-Huffman literal/length code of RFC 1951 §3.2.6.
pub fn fixed_litlen_table() -> Result<HuffmanTable<MAX_LITLEN_SYMBOLS>> {
    let mut lengths = [0u8; MAX_LITLEN_SYMBOLS];
    lengths[..144].fill(8);
    lengths[144..256].fill(9);
    lengths[256..280].fill(7);
    lengths[280..].fill(8);
    HuffmanTable::from_lengths(&lengths)
}

/// The fixed distance code: every distance symbol on five bits.
pub fn fixed_distance_table() -> Result<HuffmanTable<MAX_DISTANCE_SYMBOLS>> {
    HuffmanTable::from_lengths(&[5u8; MAX_DISTANCE_SYMBOLS])
}

/// Reads the code tables of a dynamic block: counts, the Huffman-encoded
/// code lengths, and the two decoding tables built from them.
///
/// The literal/length and distance length vectors form one sequence, so a
/// repeat code may run across the boundary between them.
pub fn decode_litlen_distance_trees<R: Read>(
    reader: &mut BitReader<R>,
) -> Result<(
    HuffmanTable<MAX_LITLEN_SYMBOLS>,
    HuffmanTable<MAX_DISTANCE_SYMBOLS>,
)> {
    let hlit = reader.read_bits(5)? as usize;
    if hlit > 29 {
        return Err(Error::TooManyCodes);
    }
    let litlen_count = hlit + 257;
    let distance_count = reader.read_bits(5)? as usize + 1;
    let precode_count = reader.read_bits(4)? as usize + 4;
    trace!(
        "dynamic tables: {} litlen, {} distance, {} precode lengths",
        litlen_count,
        distance_count,
        precode_count
    );

    let mut precode_lengths = [0u8; MAX_PRECODE_SYMBOLS];
    for &symbol in &PRECODE_ORDER[..precode_count] {
        precode_lengths[symbol] = reader.read_bits(3)? as u8;
    }
    let precode = HuffmanTable::<MAX_PRECODE_SYMBOLS>::from_lengths(&precode_lengths)?;

    let total = litlen_count + distance_count;
    let mut lengths = [0u8; MAX_LITLEN_SYMBOLS + MAX_DISTANCE_SYMBOLS];
    let mut filled = 0;
    while filled < total {
        match precode.read_symbol(reader)? {
            length @ 0..=15 => {
                lengths[filled] = length as u8;
                filled += 1;
            }
            16 => {
                if filled == 0 {
                    return Err(Error::InvalidRepeatCode);
                }
                let repeat = reader.read_bits(2)? as usize + 3;
                if filled + repeat > total {
                    return Err(Error::InvalidRepeatCode);
                }
                let previous = lengths[filled - 1];
                lengths[filled..filled + repeat].fill(previous);
                filled += repeat;
            }
            17 => {
                let zeros = reader.read_bits(3)? as usize + 3;
                if filled + zeros > total {
                    return Err(Error::InvalidRepeatCode);
                }
                filled += zeros;
            }
            18 => {
                let zeros = reader.read_bits(7)? as usize + 11;
                if filled + zeros > total {
                    return Err(Error::InvalidRepeatCode);
                }
                filled += zeros;
            }
            symbol => unreachable!("precode symbol {symbol} out of range"),
        }
    }

    let litlen = HuffmanTable::from_lengths(&lengths[..litlen_count])?;
    let distance = HuffmanTable::from_lengths(&lengths[litlen_count..total])?;
    Ok((litlen, distance))
}
