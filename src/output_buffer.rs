#![forbid(unsafe_code)]

use crate::checksum::Checksum;
use crate::error::{Error, Result};

/// Fixed-size output buffer doubling as the DEFLATE sliding window.
///
/// Literals and back-reference copies land at `used`; `consume` hands out
/// everything produced since the previous call, after shifting the buffer
/// so that at least `min_retained` bytes of history stay addressable in
/// front of the write position. The checksum sees every byte exactly once,
/// in order, as it is consumed.
pub struct ByteOutput<C> {
    buffer: Vec<u8>,
    used: usize,
    consumed: usize,
    expects_more: bool,
    min_retained: usize,
    checksum: C,
    total: u64,
}

impl<C: Checksum> ByteOutput<C> {
    pub fn new(capacity: usize, min_retained: usize) -> Self {
        Self {
            buffer: vec![0; capacity],
            used: 0,
            consumed: 0,
            expects_more: true,
            min_retained,
            checksum: C::default(),
            total: 0,
        }
    }

    pub fn available(&self) -> usize {
        self.buffer.len() - self.used
    }

    pub fn put_byte(&mut self, byte: u8) {
        assert!(self.used < self.buffer.len(), "output buffer overrun");
        self.buffer[self.used] = byte;
        self.used += 1;
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        assert!(
            self.used + bytes.len() <= self.buffer.len(),
            "output buffer overrun"
        );
        self.buffer[self.used..self.used + bytes.len()].copy_from_slice(bytes);
        self.used += bytes.len();
    }

    /// Copies `length` bytes starting `distance` bytes before the write
    /// position. With `distance < length` the copy replicates the pattern,
    /// one `distance`-sized stride at a time.
    pub fn repeat(&mut self, length: usize, distance: usize) -> Result<()> {
        assert!(
            self.used + length <= self.buffer.len(),
            "output buffer overrun"
        );
        if distance > self.used {
            return Err(Error::BadDistance);
        }
        debug_assert!(distance > 0 || length == 0);
        let mut written = 0;
        while written < length {
            let stride = distance.min(length - written);
            let source = self.used - distance;
            self.buffer.copy_within(source..source + stride, self.used);
            self.used += stride;
            written += stride;
        }
        Ok(())
    }

    /// No further bytes will be produced; the next `consume` may hand out
    /// everything left without preserving any window.
    pub fn done(&mut self) {
        self.expects_more = false;
    }

    /// Number of bytes produced over the whole stream so far.
    pub fn byte_count(&self) -> u64 {
        self.total
    }

    /// Takes the checksum accumulated so far, leaving a fresh one behind.
    pub fn checksum_value(&mut self) -> u32 {
        std::mem::take(&mut self.checksum).value()
    }

    /// Shifts out already-consumed bytes (keeping the window and up to
    /// `keep` bytes of caller lookback), feeds the fresh bytes to the
    /// checksum, and records the consumable span. Returns
    /// `(kept, start, len)`: the span `start..start + len` begins with
    /// `kept` bytes of previously-returned history followed by the fresh
    /// bytes.
    pub fn commit_consume(&mut self, keep: usize) -> (usize, usize, usize) {
        if !self.expects_more {
            // Final drain: nothing shifts any more, so the requested
            // history sits directly in front of the fresh bytes.
            let reported = keep.min(self.consumed);
            let start = self.consumed;
            let fresh = self.used - self.consumed;
            self.checksum.update(&self.buffer[start..start + fresh]);
            self.total += fresh as u64;
            self.consumed = self.used;
            return (reported, start - reported, fresh + reported);
        }

        let reported = keep.min(self.consumed);
        let mut retained = reported;
        // Keep enough history that the window stays intact even if the
        // caller asked for none.
        let minimum = self.min_retained.saturating_sub(self.used - self.consumed);
        if retained < minimum {
            retained = minimum;
        }
        assert!(
            retained <= self.consumed,
            "consume cannot retain more bytes than it has handed out"
        );
        let removing = self.consumed - retained;
        self.buffer.copy_within(removing..self.used, 0);
        self.used -= removing;
        let fresh_start = retained;
        let fresh = self.used - fresh_start;
        self.consumed = self.used;
        self.checksum.update(&self.buffer[fresh_start..self.used]);
        self.total += fresh as u64;
        (reported, fresh_start - reported, fresh + reported)
    }

    pub fn slice(&self, start: usize, len: usize) -> &[u8] {
        &self.buffer[start..start + len]
    }

    /// Last `len` bytes handed out by `consume`, still addressable because
    /// consumed history is only discarded by the next shift.
    pub fn tail(&self, len: usize) -> &[u8] {
        &self.buffer[self.consumed - len..self.consumed]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::{Crc32, NoChecksum};
    use crc::{Crc, CRC_32_ISO_HDLC};

    fn crc_of(data: &[u8]) -> u32 {
        Crc::<u32>::new(&CRC_32_ISO_HDLC).checksum(data)
    }

    fn drain(output: &mut ByteOutput<Crc32>, keep: usize) -> Vec<u8> {
        let (kept, start, len) = output.commit_consume(keep);
        output.slice(start + kept, len - kept).to_vec()
    }

    #[test]
    fn accumulates_and_consumes_in_order() {
        let mut output = ByteOutput::<Crc32>::new(64, 8);
        output.put_bytes(b"abc");
        output.put_byte(b'd');
        assert_eq!(output.available(), 60);
        output.done();
        assert_eq!(drain(&mut output, 0), b"abcd");
        assert_eq!(output.byte_count(), 4);
        assert_eq!(output.checksum_value(), crc_of(b"abcd"));
    }

    #[test]
    fn repeat_replicates_overlapping_pattern() -> anyhow::Result<()> {
        let mut output = ByteOutput::<Crc32>::new(64, 8);
        output.put_bytes(b"ab");
        output.repeat(6, 2)?;
        output.done();
        assert_eq!(drain(&mut output, 0), b"abababab");
        Ok(())
    }

    #[test]
    fn repeat_of_single_byte_runs() -> anyhow::Result<()> {
        let mut output = ByteOutput::<Crc32>::new(300, 8);
        output.put_byte(b'a');
        output.repeat(258, 1)?;
        output.done();
        assert_eq!(drain(&mut output, 0), vec![b'a'; 259]);
        Ok(())
    }

    #[test]
    fn distance_past_start_fails() {
        let mut output = ByteOutput::<Crc32>::new(64, 8);
        output.put_bytes(b"ab");
        assert!(matches!(output.repeat(4, 3), Err(Error::BadDistance)));
    }

    #[test]
    fn consume_retains_window_and_lookback() {
        let mut output = ByteOutput::<Crc32>::new(32, 8);
        output.put_bytes(b"0123456789abcdef0123456789abcdef");
        assert_eq!(output.available(), 0);
        let (kept, start, len) = output.commit_consume(0);
        assert_eq!((kept, len), (0, 32));
        assert_eq!(output.slice(start, len), b"0123456789abcdef0123456789abcdef");

        // Buffer is full and everything was handed out; the next commit
        // shifts, retaining the window minimum, and yields nothing fresh.
        let (kept, _start, len) = output.commit_consume(0);
        assert_eq!((kept, len), (0, 0));
        assert_eq!(output.available(), 24);

        // New bytes plus three bytes of requested history.
        output.put_bytes(b"XYZ");
        let (kept, start, len) = output.commit_consume(3);
        assert_eq!(kept, 3);
        assert_eq!(output.slice(start, len), b"defXYZ");
    }

    #[test]
    fn window_bytes_stay_addressable_for_repeats() -> anyhow::Result<()> {
        let mut output = ByteOutput::<NoChecksum>::new(32, 8);
        output.put_bytes(b"0123456789abcdef0123456789abcdef");
        output.commit_consume(0);
        output.commit_consume(0);
        // After the shift the last eight produced bytes are history;
        // a back-reference into them must still resolve.
        output.repeat(4, 8)?;
        output.done();
        let (_, start, len) = output.commit_consume(0);
        assert_eq!(output.slice(start, len), b"89ab");
        Ok(())
    }

    #[test]
    fn checksum_sees_every_byte_once() {
        let mut output = ByteOutput::<Crc32>::new(32, 8);
        output.put_bytes(b"0123456789abcdef0123456789abcdef");
        output.commit_consume(0);
        output.commit_consume(0);
        output.put_bytes(b"XYZ");
        output.done();
        output.commit_consume(0);
        assert_eq!(output.byte_count(), 35);
        assert_eq!(
            output.checksum_value(),
            crc_of(b"0123456789abcdef0123456789abcdefXYZ")
        );
    }

    #[test]
    #[should_panic(expected = "output buffer overrun")]
    fn overfilling_is_a_bug() {
        let mut output = ByteOutput::<NoChecksum>::new(4, 0);
        output.put_bytes(b"abcde");
    }
}
