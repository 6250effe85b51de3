//! Bounds-checked reading of ISO BMFF box structures from a byte slice.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::boxes::{BoxType, FourCC};
use crate::{Error, ParseOptions, Result, ToU64, ToUsize};
use byteorder::{BigEndian, ByteOrder};
use log::{debug, warn};

/// Basic ISO box structure.
///
/// mp4 files are a sequence of possibly-nested 'box' structures.  Each box
/// begins with a header describing the length of the box's data and a
/// four-byte box type which identifies the type of the box. Together these
/// are enough to interpret the contents of that section of the file.
///
/// See ISO 14496-12:2015 § 4.2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    /// Box type.
    pub name: BoxType,
    /// Size of the box content, excluding the header.
    ///
    /// Never larger than what was left in the buffer the header came from.
    pub content_size: u64,
    /// Bytes taken by size, type, extended size and uuid.
    pub header_size: u64,
    /// Uuid for extended type.
    pub uuid: Option<[u8; 16]>,
}

impl BoxHeader {
    /// 4-byte size + 4-byte type
    pub const MIN_SIZE: u64 = 8;
    /// 4-byte size + 4-byte type + 8-byte size
    pub const MIN_LARGE_SIZE: u64 = 16;

    pub fn total_size(&self) -> u64 {
        self.header_size + self.content_size
    }
}

/// Sequential reader over a borrowed buffer.
///
/// A read either consumes exactly what it returns or fails and leaves the
/// offset where it was.
#[derive(Debug, Clone)]
pub struct BoxReader<'a> {
    data: &'a [u8],
    offset: usize,
    options: ParseOptions,
}

impl<'a> BoxReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_options(data, ParseOptions::default())
    }

    pub fn with_options(data: &'a [u8], options: ParseOptions) -> Self {
        Self { data, offset: 0, options }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    pub fn has_remaining(&self) -> bool {
        self.offset < self.data.len()
    }

    /// The unread part of the buffer, without consuming it.
    pub fn remaining_slice(&self) -> &'a [u8] {
        &self.data[self.offset..]
    }

    /// Consumes and returns the next `n` bytes.
    pub fn read(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            debug!("read of {n} bytes at {} with {} left", self.offset, self.remaining());
            return Err(Error::Truncated("read past end of buffer"));
        }
        let bytes = &self.data[self.offset..self.offset + n];
        self.offset += n;
        Ok(bytes)
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.read(n).map(drop)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(BigEndian::read_u16(self.read(2)?))
    }

    pub fn read_u24(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u24(self.read(3)?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.read(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(BigEndian::read_u64(self.read(8)?))
    }

    /// Reads a big-endian integer of `nbytes` bytes, 0 to 8.
    ///
    /// Zero-width fields (e.g. `iloc` offsets with `offset_size == 0`) read as 0.
    pub fn read_uint(&mut self, nbytes: u8) -> Result<u64> {
        match nbytes {
            0 => Ok(0),
            1..=8 => Ok(BigEndian::read_uint(self.read(nbytes.to_usize())?, nbytes.to_usize())),
            _ => Err(Error::InvalidData("integer field wider than 8 bytes")),
        }
    }

    pub fn read_fourcc(&mut self) -> Result<FourCC> {
        Ok(FourCC::from(self.read_u32()?))
    }

    /// Read and parse a box header.
    ///
    /// Call this first to determine the type of a particular box and its
    /// length. The header is validated against what is left in this reader:
    /// a box never claims more bytes than its parent holds.
    pub fn read_box_header(&mut self) -> Result<BoxHeader> {
        self.read_box_header_inner(false)
    }

    /// Like [`Self::read_box_header`], but a declared size of 0 means the
    /// box extends to the end of the buffer. Only valid for the last
    /// top-level box, usually `mdat`.
    pub fn read_top_level_box_header(&mut self) -> Result<BoxHeader> {
        self.read_box_header_inner(true)
    }

    fn read_box_header_inner(&mut self, top_level: bool) -> Result<BoxHeader> {
        let start = self.offset;
        let header = self.parse_box_header(start, top_level);
        if header.is_err() {
            self.offset = start;
        }
        header
    }

    fn parse_box_header(&mut self, start: usize, top_level: bool) -> Result<BoxHeader> {
        let size32 = self.read_u32()?;
        let name = BoxType::from(self.read_u32()?);
        let size = match size32 {
            1 => self.read_u64()?,
            _ => u64::from(size32),
        };
        let uuid = if name == BoxType::UuidBox {
            let mut buffer = [0u8; 16];
            buffer.copy_from_slice(self.read(16)?);
            Some(buffer)
        } else {
            None
        };
        let header_size = (self.offset - start).to_u64();
        let remaining = self.remaining().to_u64();

        let content_size = if size32 == 0 && top_level {
            remaining
        } else {
            let content_size = size.checked_sub(header_size).ok_or_else(|| {
                debug!("'{name:?}' box declares {size} bytes, header alone is {header_size}");
                Error::Overflow("box size smaller than its header")
            })?;
            if content_size > remaining {
                debug!("'{name:?}' box wants {content_size} bytes, {remaining} left");
                return Err(Error::Truncated("box size exceeds remaining bytes"));
            }
            content_size
        };

        Ok(BoxHeader {
            name,
            content_size,
            header_size,
            uuid,
        })
    }

    /// Reads the next child box and returns its header plus a reader over
    /// its content. Returns `None` once this reader is exhausted.
    pub fn next_box(&mut self) -> Result<Option<(BoxHeader, BoxReader<'a>)>> {
        if !self.has_remaining() {
            return Ok(None);
        }
        let start = self.offset;
        let header = self.read_box_header()?;
        let content = match usize::try_from(header.content_size) {
            Ok(len) => self.read(len),
            Err(e) => Err(e.into()),
        };
        match content {
            Ok(content) => Ok(Some((header, BoxReader::with_options(content, self.options)))),
            Err(e) => {
                self.offset = start;
                Err(e)
            },
        }
    }

    /// Parse the extra header fields for a full box: `(version, flags)`.
    pub fn read_full_box_version_flags(&mut self) -> Result<(u8, u32)> {
        let bytes = self.read(4)?;
        Ok((bytes[0], BigEndian::read_u24(&bytes[1..])))
    }

    /// Reads version and flags, failing unless the version is `expected`.
    ///
    /// Returns the flags.
    pub fn read_and_enforce_version(&mut self, expected: u8) -> Result<u32> {
        let start = self.offset;
        let (version, flags) = self.read_full_box_version_flags()?;
        if version != expected {
            debug!("expected box version {expected}, found {version}");
            self.offset = start;
            return Err(Error::InvalidData("unsupported box version"));
        }
        Ok(flags)
    }

    /// Parse the extra fields for a full box whose flag fields must be zero.
    pub fn read_full_box_version_no_flags(&mut self) -> Result<u8> {
        let start = self.offset;
        let (version, flags) = self.read_full_box_version_flags()?;

        if flags != 0 {
            if !self.options.lenient {
                self.offset = start;
                return Err(Error::InvalidData("expected flags to be 0"));
            }
            warn!("ignoring full box flags {flags:#x}");
        }

        Ok(version)
    }

    /// Reads a null-terminated string into `out`.
    ///
    /// The terminator is located before anything is consumed; without one
    /// the read fails with [`Error::NotFound`] and the offset is unchanged.
    /// The string is truncated to fit `out`, which is always terminated
    /// unless it is empty. The offset moves past the terminator either way.
    ///
    /// Returns the full length of the string, excluding the terminator.
    pub fn read_null_terminated_string(&mut self, out: &mut [u8]) -> Result<usize> {
        let string = self.read_null_terminated_bytes()?;
        if let Some(room) = out.len().checked_sub(1) {
            let copied = string.len().min(room);
            out[..copied].copy_from_slice(&string[..copied]);
            out[copied] = 0;
        }
        Ok(string.len())
    }

    /// Zero-copy variant of [`Self::read_null_terminated_string`].
    pub fn read_null_terminated_bytes(&mut self) -> Result<&'a [u8]> {
        let rest = self.remaining_slice();
        let len = rest.iter().position(|&b| b == 0).ok_or_else(|| {
            debug!("no null terminator in {} bytes", rest.len());
            Error::NotFound("null terminator")
        })?;
        self.offset += len + 1;
        Ok(&rest[..len])
    }

    /// Fails unless every byte has been consumed.
    pub fn ensure_consumed(&self) -> Result<()> {
        if self.has_remaining() {
            debug!("{} unread bytes", self.remaining());
            return Err(Error::InvalidData("unread box content or bad parser sync"));
        }
        Ok(())
    }
}
