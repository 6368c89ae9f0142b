#![forbid(unsafe_code)]

use std::io::{Read, Write};

use crc::Crc;
use log::debug;

use crate::byte_input::ByteInput;
use crate::checksum::Crc32;
use crate::config::DecompressionConfig;
use crate::deflate::DeflateReader;
use crate::error::{Error, Result};

////////////////////////////////////////////////////////////////////////////////

const ID1: u8 = 0x1f;
const ID2: u8 = 0x8b;

const CM_DEFLATE: u8 = 8;

const FTEXT_OFFSET: u8 = 0;
const FHCRC_OFFSET: u8 = 1;
const FEXTRA_OFFSET: u8 = 2;
const FNAME_OFFSET: u8 = 3;
const FCOMMENT_OFFSET: u8 = 4;

////////////////////////////////////////////////////////////////////////////////

#[derive(Debug)]
pub struct MemberHeader {
    pub compression_method: CompressionMethod,
    pub flags: MemberFlags,
    pub modification_time: u32,
    pub extra: Option<Vec<u8>>,
    pub name: Option<String>,
    pub comment: Option<String>,
    pub extra_flags: u8,
    pub os: u8,
}

impl MemberHeader {
    fn read<R: Read>(input: &mut ByteInput<R>) -> Result<Self> {
        let id1 = input.read_u8()?;
        let id2 = input.read_u8()?;
        if id1 != ID1 || id2 != ID2 {
            return Err(Error::NotGzip);
        }
        let compression_method = CompressionMethod::from(input.read_u8()?);
        let flags = MemberFlags(input.read_u8()?);
        let modification_time = input.read_u32_le()?;
        let extra_flags = input.read_u8()?;
        let os = input.read_u8()?;

        let extra = if flags.has_extra() {
            let len = input.read_u16_le()? as usize;
            let mut extra = Vec::with_capacity(len);
            while extra.len() < len {
                let chunk = input.range(len - extra.len())?;
                if chunk.is_empty() {
                    return Err(Error::Truncated);
                }
                extra.extend_from_slice(chunk);
            }
            Some(extra)
        } else {
            None
        };

        let name = if flags.has_name() {
            Some(read_zero_terminated(input)?)
        } else {
            None
        };

        let comment = if flags.has_comment() {
            Some(read_zero_terminated(input)?)
        } else {
            None
        };

        let header = Self {
            compression_method,
            flags,
            modification_time,
            extra,
            name,
            comment,
            extra_flags,
            os,
        };

        if header.flags.has_crc() {
            let stored = input.read_u16_le()?;
            if header.crc16() != stored {
                return Err(Error::HeaderChecksumMismatch);
            }
        }

        Ok(header)
    }

    /// Low 16 bits of the CRC-32 over the serialised header, as stored
    /// behind the FHCRC flag.
    pub fn crc16(&self) -> u16 {
        let crc = Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);
        let mut digest = crc.digest();

        digest.update(&[ID1, ID2, self.compression_method.into(), self.flags.0]);
        digest.update(&self.modification_time.to_le_bytes());
        digest.update(&[self.extra_flags, self.os]);

        if let Some(extra) = &self.extra {
            digest.update(&(extra.len() as u16).to_le_bytes());
            digest.update(extra);
        }

        if let Some(name) = &self.name {
            digest.update(name.as_bytes());
            digest.update(&[0]);
        }

        if let Some(comment) = &self.comment {
            digest.update(comment.as_bytes());
            digest.update(&[0]);
        }

        (digest.finalize() & 0xffff) as u16
    }
}

fn read_zero_terminated<R: Read>(input: &mut ByteInput<R>) -> Result<String> {
    let mut bytes = Vec::new();
    loop {
        let byte = input.read_u8()?;
        if byte == 0 {
            break;
        }
        bytes.push(byte);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompressionMethod {
    Deflate,
    Unknown(u8),
}

impl From<u8> for CompressionMethod {
    fn from(value: u8) -> Self {
        match value {
            CM_DEFLATE => Self::Deflate,
            x => Self::Unknown(x),
        }
    }
}

impl From<CompressionMethod> for u8 {
    fn from(method: CompressionMethod) -> u8 {
        match method {
            CompressionMethod::Deflate => CM_DEFLATE,
            CompressionMethod::Unknown(x) => x,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Copy)]
pub struct MemberFlags(u8);

impl MemberFlags {
    fn bit(&self, n: u8) -> bool {
        (self.0 >> n) & 1 != 0
    }

    pub fn is_text(&self) -> bool {
        self.bit(FTEXT_OFFSET)
    }

    pub fn has_crc(&self) -> bool {
        self.bit(FHCRC_OFFSET)
    }

    pub fn has_extra(&self) -> bool {
        self.bit(FEXTRA_OFFSET)
    }

    pub fn has_name(&self) -> bool {
        self.bit(FNAME_OFFSET)
    }

    pub fn has_comment(&self) -> bool {
        self.bit(FCOMMENT_OFFSET)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// A single gzip member: parsed header, streaming DEFLATE body, verified
/// trailer.
pub struct GzipReader<R> {
    header: MemberHeader,
    deflate: DeflateReader<R, Crc32>,
    verify_checksum: bool,
    finished: bool,
}

impl<R: Read> GzipReader<R> {
    pub fn new(input: R) -> Result<Self> {
        Self::with_config(input, &DecompressionConfig::default())
    }

    pub fn with_config(input: R, config: &DecompressionConfig) -> Result<Self> {
        config.validate();
        let mut byte_input = ByteInput::new(input, config.input_buffer_size);
        let header = MemberHeader::read(&mut byte_input)?;
        debug!(
            "gzip member: method={:?}, name={:?}, mtime={}",
            header.compression_method, header.name, header.modification_time
        );
        if header.compression_method != CompressionMethod::Deflate {
            return Err(Error::UnsupportedCompressionMethod(
                header.compression_method.into(),
            ));
        }
        Ok(Self {
            header,
            deflate: DeflateReader::from_byte_input(byte_input, config),
            verify_checksum: config.verify_checksum,
            finished: false,
        })
    }

    pub fn header(&self) -> &MemberHeader {
        &self.header
    }

    /// Next chunk of decompressed bytes, or `None` once the member has
    /// ended and its trailer checked. The slice starts with up to `keep`
    /// bytes of previously-returned history (the count says how many),
    /// which stay addressable until the next call.
    pub fn read_some(&mut self, keep: usize) -> Result<Option<(usize, &[u8])>> {
        if self.finished {
            return Ok(None);
        }
        let more = self.deflate.parse_some()?;
        let (kept, start, len) = self.deflate.output_mut().commit_consume(keep);
        if !more {
            self.finished = true;
            self.verify_trailer()?;
        }
        Ok(Some((kept, self.deflate.output().slice(start, len))))
    }

    fn verify_trailer(&mut self) -> Result<()> {
        let stored_crc = self.deflate.byte_input_mut().read_u32_le()?;
        let stored_size = self.deflate.byte_input_mut().read_u32_le()?;
        let actual_crc = self.deflate.output_mut().checksum_value();
        let actual_size = self.deflate.output().byte_count() as u32;
        if self.verify_checksum && stored_crc != actual_crc {
            return Err(Error::ChecksumMismatch {
                expected: stored_crc,
                actual: actual_crc,
            });
        }
        if stored_size != actual_size {
            return Err(Error::LengthMismatch {
                expected: stored_size,
                actual: actual_size,
            });
        }
        Ok(())
    }

    pub fn read_all<W: Write>(&mut self, mut output: W) -> Result<()> {
        while let Some((kept, batch)) = self.read_some(0)? {
            output.write_all(&batch[kept..])?;
        }
        Ok(())
    }

    pub fn read_to_vec(&mut self) -> Result<Vec<u8>> {
        let mut result = Vec::new();
        self.read_all(&mut result)?;
        Ok(result)
    }

    /// Calls `callback` once per `separator`-terminated line and once for
    /// a trailing unterminated line, borrowing straight from the output
    /// buffer. A single line must fit inside the retained output window.
    pub fn read_by_lines<F: FnMut(&[u8])>(&mut self, separator: u8, mut callback: F) -> Result<()> {
        let mut keeping = 0;
        while let Some((kept, batch)) = self.read_some(keeping)? {
            let mut line_start = 0;
            for i in kept..batch.len() {
                if batch[i] == separator {
                    callback(&batch[line_start..i]);
                    line_start = i + 1;
                }
            }
            keeping = batch.len() - line_start;
        }
        if keeping > 0 {
            callback(self.deflate.output().tail(keeping));
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
