#![forbid(unsafe_code)]

use crc::{Crc, Digest, CRC_32_ISO_HDLC};

static CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Rolling checksum fed by the output buffer, one `update` per consumed
/// chunk, each output byte exactly once and in order.
pub trait Checksum: Default {
    fn update(&mut self, data: &[u8]);
    fn value(self) -> u32;
}

/// CRC-32 as used by the gzip trailer.
pub struct Crc32 {
    digest: Digest<'static, u32>,
}

impl Default for Crc32 {
    fn default() -> Self {
        Self {
            digest: CRC.digest(),
        }
    }
}

impl Checksum for Crc32 {
    fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    fn value(self) -> u32 {
        self.digest.finalize()
    }
}

/// No-op plug-in for raw DEFLATE streams or disabled verification.
#[derive(Default)]
pub struct NoChecksum;

impl Checksum for NoChecksum {
    fn update(&mut self, _data: &[u8]) {}

    fn value(self) -> u32 {
        0
    }
}
