#![forbid(unsafe_code)]

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{Error, Result};

/// Bytes of already-consumed history kept in front of the cursor when the
/// buffer is compacted, so that [`ByteInput::return_bytes`] can always
/// rewind the up-to-7 whole bytes a bit reader may surrender.
const COMPACT_SLACK: usize = 8;

/// Buffered pull access to the compressed stream as contiguous byte ranges.
///
/// The buffer has a fixed capacity chosen at construction; refills shift
/// live bytes to the front once the cursor passes the midpoint, keeping the
/// per-byte cost amortised constant.
pub struct ByteInput<R> {
    reader: R,
    buffer: Vec<u8>,
    position: usize,
    filled: usize,
}

impl<R: Read> ByteInput<R> {
    pub fn new(reader: R, capacity: usize) -> Self {
        Self {
            reader,
            buffer: vec![0; capacity],
            position: 0,
            filled: 0,
        }
    }

    /// One pull from the upstream reader, compacting first if the cursor is
    /// past the midpoint. Returns the number of bytes added; 0 means EOF.
    fn refill_some(&mut self) -> Result<usize> {
        if self.position > self.buffer.len() / 2 {
            let keep = COMPACT_SLACK.min(self.position);
            let start = self.position - keep;
            self.buffer.copy_within(start..self.filled, 0);
            self.filled -= start;
            self.position = keep;
        }
        let added = self.reader.read(&mut self.buffer[self.filled..])?;
        self.filled += added;
        Ok(added)
    }

    fn ensure(&mut self, bytes: usize) -> Result<()> {
        while self.position + bytes > self.filled {
            if self.refill_some()? == 0 {
                return Err(Error::Truncated);
            }
        }
        Ok(())
    }

    /// Returns up to `size` contiguous bytes and advances past them. May
    /// return fewer than requested (the caller loops); returns an empty
    /// slice only at end of stream.
    pub fn range(&mut self, size: usize) -> Result<&[u8]> {
        if self.position + size > self.filled {
            self.refill_some()?;
        }
        let start = self.position;
        let available = size.min(self.filled - start);
        self.position += available;
        Ok(&self.buffer[start..start + available])
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        let mut window = &self.buffer[self.position..];
        let value = window.read_u8()?;
        self.position += 1;
        Ok(value)
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        self.ensure(2)?;
        let mut window = &self.buffer[self.position..];
        let value = window.read_u16::<LittleEndian>()?;
        self.position += 2;
        Ok(value)
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        self.ensure(4)?;
        let mut window = &self.buffer[self.position..];
        let value = window.read_u32::<LittleEndian>()?;
        self.position += 4;
        Ok(value)
    }

    /// Rewinds the cursor over bytes that were taken but never consumed.
    /// Only whole bytes still inside the buffer may come back; the bit
    /// reader's surrender at a block boundary is the sole caller.
    pub fn return_bytes(&mut self, amount: usize) {
        assert!(amount <= self.position, "returning bytes that were never taken");
        self.position -= amount;
    }
}
