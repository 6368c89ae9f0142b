#![forbid(unsafe_code)]

use std::io::Read;

use crate::byte_input::ByteInput;
use crate::error::{Error, Result};

/// Refill threshold: no single read pulls more than 16 bits.
const MIN_BITS: u32 = 16;

/// Most bytes one refill pull may take from the input.
const REFILL_BYTES: usize = 6;

/// Bit-level view over a [`ByteInput`], in DEFLATE bit order.
///
/// Bits are packed LSB-first into bytes; the shift register keeps valid
/// bits in its low `count` positions and consumes from the least
/// significant end. Huffman codewords are matched MSB-first within the
/// codeword, which is what [`peek_byte`](Self::peek_byte) serves by
/// presenting the next 8 bits reversed.
///
/// The reader owns the byte input while it lives; [`Self::into_inner`]
/// surrenders the whole unconsumed bytes back, so a successor can resume
/// byte-aligned at a block boundary.
pub struct BitReader<R> {
    input: ByteInput<R>,
    bits: u64,
    count: u32,
}

impl<R: Read> BitReader<R> {
    pub fn new(input: ByteInput<R>) -> Self {
        Self {
            input,
            bits: 0,
            count: 0,
        }
    }

    /// Tops the register up to at least [`MIN_BITS`] bits, unless the
    /// stream ends first. Running dry here is not an error; the consuming
    /// read decides whether the shortfall matters.
    fn refill(&mut self) -> Result<()> {
        while self.count < MIN_BITS {
            let want = (((64 - self.count) / 8) as usize).min(REFILL_BYTES);
            let chunk = self.input.range(want)?;
            if chunk.is_empty() {
                break;
            }
            for &byte in chunk {
                self.bits |= u64::from(byte) << self.count;
                self.count += 8;
            }
        }
        Ok(())
    }

    /// Next `amount` bits (≤ 16) as their natural LSB-first value.
    pub fn read_bits(&mut self, amount: u32) -> Result<u16> {
        debug_assert!(amount <= 16);
        self.refill()?;
        if self.count < amount {
            return Err(Error::Truncated);
        }
        let value = (self.bits & ((1u64 << amount) - 1)) as u16;
        self.bits >>= amount;
        self.count -= amount;
        Ok(value)
    }

    /// Shows the next 8 bits reversed, so a Huffman codeword sits at the
    /// high end of the returned byte. Nothing is consumed; near the end of
    /// the stream the missing low bits read as zero.
    pub fn peek_byte(&mut self) -> Result<u8> {
        self.refill()?;
        Ok((self.bits as u8).reverse_bits())
    }

    /// Advances past `amount` bits previously shown by
    /// [`peek_byte`](Self::peek_byte).
    pub fn consume(&mut self, amount: u8) -> Result<()> {
        if u32::from(amount) > self.count {
            return Err(Error::Truncated);
        }
        self.bits >>= amount;
        self.count -= u32::from(amount);
        Ok(())
    }

    /// Hands the byte input back, returning every whole unconsumed byte to
    /// it first. Partial bits (a block's padding) are discarded.
    pub fn into_inner(mut self) -> ByteInput<R> {
        let whole_bytes = (self.count / 8) as usize;
        self.input.return_bytes(whole_bytes);
        self.input
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader_over(data: &[u8]) -> BitReader<&[u8]> {
        BitReader::new(ByteInput::new(data, 64))
    }

    #[test]
    fn reads_bits_lsb_first() -> anyhow::Result<()> {
        // 0b1011_0100: bit order within the byte is LSB first.
        let data = [0b1011_0100, 0b1100_1010];
        let mut reader = reader_over(&data);
        assert_eq!(reader.read_bits(1)?, 0);
        assert_eq!(reader.read_bits(2)?, 0b10);
        assert_eq!(reader.read_bits(5)?, 0b10110);
        assert_eq!(reader.read_bits(8)?, 0b1100_1010);
        Ok(())
    }

    #[test]
    fn reads_up_to_sixteen_bits_across_bytes() -> anyhow::Result<()> {
        let data = [0x34, 0x12, 0xff];
        let mut reader = reader_over(&data);
        assert_eq!(reader.read_bits(16)?, 0x1234);
        Ok(())
    }

    #[test]
    fn peek_reverses_without_consuming() -> anyhow::Result<()> {
        let data = [0b1011_0100];
        let mut reader = reader_over(&data);
        assert_eq!(reader.peek_byte()?, 0b0010_1101);
        assert_eq!(reader.peek_byte()?, 0b0010_1101);
        reader.consume(3)?;
        // Remaining bits 10110 pad with zeros above, then reverse.
        assert_eq!(reader.peek_byte()?, 0b0110_1000);
        Ok(())
    }

    #[test]
    fn starved_read_is_truncation() {
        let data = [0xab];
        let mut reader = reader_over(&data);
        assert!(matches!(reader.read_bits(16), Err(Error::Truncated)));
    }

    #[test]
    fn into_inner_returns_whole_bytes() -> anyhow::Result<()> {
        let data = [1, 2, 3, 4, 5];
        let mut reader = reader_over(&data);
        reader.read_bits(4)?;
        // Half of byte 1 is consumed; its leftover bits are dropped while
        // bytes 2..=5 go back to the byte input.
        let mut input = reader.into_inner();
        assert_eq!(input.read_u8()?, 2);
        assert_eq!(input.read_u8()?, 3);
        Ok(())
    }

    #[test]
    fn into_inner_without_reads_returns_everything() -> anyhow::Result<()> {
        let data = [7, 8];
        let reader = reader_over(&data);
        let mut input = reader.into_inner();
        assert_eq!(input.read_u16_le()?, 0x0807);
        Ok(())
    }
}
