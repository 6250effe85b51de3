//! Open Bitstream Unit framing.
//!
//! See AV1 Bitstream & Decoding Process Specification § 5.3

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::bits::BitReader;
use crate::sequence_header::SequenceHeader;
use crate::{Error, Result, ToU64};
use log::debug;

/// `obu_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObuType {
    SequenceHeader,
    TemporalDelimiter,
    FrameHeader,
    TileGroup,
    Metadata,
    Frame,
    RedundantFrameHeader,
    TileList,
    Padding,
    Reserved(u8),
}

impl From<u8> for ObuType {
    fn from(t: u8) -> Self {
        match t {
            1 => Self::SequenceHeader,
            2 => Self::TemporalDelimiter,
            3 => Self::FrameHeader,
            4 => Self::TileGroup,
            5 => Self::Metadata,
            6 => Self::Frame,
            7 => Self::RedundantFrameHeader,
            8 => Self::TileList,
            15 => Self::Padding,
            _ => Self::Reserved(t),
        }
    }
}

/// `obu_extension_header()`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObuExtension {
    pub temporal_id: u8,
    pub spatial_id: u8,
}

/// A view of one OBU inside a caller-owned buffer.
#[derive(Debug, Clone, Copy)]
pub struct Obu<'a> {
    pub obu_type: ObuType,
    pub extension: Option<ObuExtension>,
    /// `false` if the size was inferred from the end of the buffer.
    pub has_size_field: bool,
    /// Bytes taken by the header, extension and size field.
    pub header_size: usize,
    pub payload: &'a [u8],
}

/// Walks consecutive OBUs.
///
/// Yields at most one error, after which iteration ends.
pub struct ObuIter<'a> {
    data: &'a [u8],
    failed: bool,
}

impl<'a> ObuIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, failed: false }
    }
}

impl<'a> Iterator for ObuIter<'a> {
    type Item = Result<Obu<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.data.is_empty() {
            return None;
        }
        match read_obu(self.data) {
            Ok(obu) => {
                let consumed = obu.header_size + obu.payload.len();
                self.data = self.data.get(consumed..).unwrap_or_default();
                Some(Ok(obu))
            },
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            },
        }
    }
}

/// Reads the OBU at the start of `data`.
fn read_obu(data: &[u8]) -> Result<Obu<'_>> {
    let mut bits = BitReader::new(data);
    // obu_forbidden_bit
    bits.skip_bits(1);
    let obu_type = ObuType::from(bits.read_u8(4));
    let extension_flag = bits.read_bool();
    let has_size_field = bits.read_bool();
    // obu_reserved_1bit
    bits.skip_bits(1);

    let extension = if extension_flag {
        let temporal_id = bits.read_u8(3);
        let spatial_id = bits.read_u8(2);
        // extension_header_reserved_3bits
        bits.skip_bits(3);
        Some(ObuExtension { temporal_id, spatial_id })
    } else {
        None
    };

    let obu_size = if has_size_field {
        u64::from(bits.read_uleb128())
    } else {
        data.len().to_u64().saturating_sub(1 + u64::from(extension_flag))
    };

    if bits.has_error() {
        debug!("bad OBU header at bit {}", bits.bit_position());
        bits.check()?;
    }

    // every header field is a whole number of bytes
    let header_size = usize::try_from(bits.byte_position())?;
    let remaining = data.len() - header_size;
    if obu_size > remaining.to_u64() {
        debug!("{obu_type:?} OBU of {obu_size} bytes, only {remaining} left");
        return Err(Error::Truncated("obu_size exceeds remaining bytes"));
    }
    let end = header_size + usize::try_from(obu_size)?;

    Ok(Obu {
        obu_type,
        extension,
        has_size_field,
        header_size,
        payload: &data[header_size..end],
    })
}

/// Finds the first sequence header OBU in `data` and decodes it.
///
/// `data` is typically one access unit, or the `configOBUs` of an `av1C` box.
pub fn find_sequence_header(data: &[u8]) -> Result<SequenceHeader> {
    for obu in ObuIter::new(data) {
        let obu = obu?;
        if obu.obu_type == ObuType::SequenceHeader {
            return SequenceHeader::from_payload(obu.payload);
        }
    }
    Err(Error::NotFound("no sequence header OBU"))
}
