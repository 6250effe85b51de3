//! Building ISO BMFF box structures into a growable buffer.
//!
//! Box sizes are only known once the content is written, so headers are
//! written with a placeholder size and patched by [`BoxWriter::finish_box`].

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::boxes::{BoxType, FourCC};
use crate::reader::BoxHeader;
use crate::{Error, Result, ToU64, TryVec};
use byteorder::{BigEndian, ByteOrder};
use log::debug;

/// Flags of a full box are 24 bits wide.
const MAX_FULL_BOX_FLAGS: u32 = 0x00ff_ffff;

/// An open box, redeemed by [`BoxWriter::finish_box`].
#[must_use = "an open box must be passed to BoxWriter::finish_box"]
#[derive(Debug)]
pub struct BoxMarker {
    offset: usize,
}

/// Sequential writer that owns its output until [`Self::into_bytes`].
#[derive(Debug, Default)]
pub struct BoxWriter {
    data: std::vec::Vec<u8>,
    /// Offsets of the size fields of boxes not yet finished, innermost last.
    open: std::vec::Vec<usize>,
}

impl BoxWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut writer = Self::new();
        writer.reserve(capacity)?;
        Ok(writer)
    }

    /// Bytes written so far.
    pub fn offset(&self) -> usize {
        self.data.len()
    }

    /// Number of boxes started but not finished.
    pub fn open_boxes(&self) -> usize {
        self.open.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn reserve(&mut self, additional: usize) -> Result<()> {
        self.data.try_reserve(additional).map_err(|_| Error::OutOfMemory)
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.reserve(bytes.len())?;
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write(&[value])
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write(&value.to_be_bytes())
    }

    pub fn write_u24(&mut self, value: u32) -> Result<()> {
        if value > MAX_FULL_BOX_FLAGS {
            return Err(Error::Overflow("value does not fit in 24 bits"));
        }
        let mut buf = [0; 3];
        BigEndian::write_u24(&mut buf, value);
        self.write(&buf)
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write(&value.to_be_bytes())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write(&value.to_be_bytes())
    }

    pub fn write_fourcc(&mut self, fourcc: FourCC) -> Result<()> {
        self.write(&fourcc.value)
    }

    /// Appends `n` zero bytes.
    pub fn write_zeros(&mut self, n: usize) -> Result<()> {
        self.reserve(n)?;
        self.data.resize(self.data.len() + n, 0);
        Ok(())
    }

    /// Writes `string` followed by a zero byte.
    pub fn write_null_terminated(&mut self, string: &[u8]) -> Result<()> {
        if string.contains(&0) {
            return Err(Error::InvalidData("string contains a null byte"));
        }
        self.reserve(string.len() + 1)?;
        self.write(string)?;
        self.write_u8(0)
    }

    /// Writes `leb128(value)`, e.g. an OBU size field. Returns the byte count.
    pub fn write_uleb128(&mut self, value: u32) -> Result<usize> {
        let mut buf = [0u8; 5];
        let len = leb128::write::unsigned(&mut &mut buf[..], u64::from(value))?;
        self.write(&buf[..len])?;
        Ok(len)
    }

    /// Starts a box: zero-fills the header, writes a placeholder size and
    /// the type. The returned marker must go to [`Self::finish_box`].
    pub fn write_box_header(&mut self, name: BoxType) -> Result<BoxMarker> {
        self.start_box(name, None)
    }

    /// Starts a full box, which also carries `version` and 24-bit `flags`.
    pub fn write_full_box_header(&mut self, name: BoxType, version: u8, flags: u32) -> Result<BoxMarker> {
        if flags > MAX_FULL_BOX_FLAGS {
            return Err(Error::Overflow("full box flags do not fit in 24 bits"));
        }
        self.start_box(name, Some((version, flags)))
    }

    fn start_box(&mut self, name: BoxType, full: Option<(u8, u32)>) -> Result<BoxMarker> {
        let offset = self.offset();
        let header_len = if full.is_some() { 12 } else { 8 };
        self.open.try_reserve(1).map_err(|_| Error::OutOfMemory)?;
        self.write_zeros(header_len)?;

        let header = &mut self.data[offset..offset + header_len];
        BigEndian::write_u32(&mut header[0..4], header_len as u32);
        BigEndian::write_u32(&mut header[4..8], u32::from(name));
        if let Some((version, flags)) = full {
            header[8] = version;
            BigEndian::write_u24(&mut header[9..12], flags);
        }

        self.open.push(offset);
        Ok(BoxMarker { offset })
    }

    /// Patches the size of the innermost open box now that its content is
    /// written.
    ///
    /// The marker is consumed even on failure, so the box stays open and
    /// [`Self::into_bytes`] will refuse the output. An error here ends the
    /// write.
    pub fn finish_box(&mut self, marker: BoxMarker) -> Result<()> {
        if self.open.last() != Some(&marker.offset) {
            debug!("box at {} finished out of order", marker.offset);
            return Err(Error::InvalidData("boxes must be finished innermost first"));
        }
        let size = (self.offset() - marker.offset).to_u64();
        let size = u32::try_from(size).map_err(|_| {
            debug!("box at {} is {size} bytes", marker.offset);
            Error::Overflow("box larger than 4 GiB")
        })?;
        debug_assert!(u64::from(size) >= BoxHeader::MIN_SIZE);
        BigEndian::write_u32(&mut self.data[marker.offset..marker.offset + 4], size);
        self.open.pop();
        Ok(())
    }

    /// Writes a whole box whose content is already known.
    pub fn write_box(&mut self, name: BoxType, content: &[u8]) -> Result<()> {
        let marker = self.write_box_header(name)?;
        self.write(content)?;
        self.finish_box(marker)
    }

    /// Hands the output to the caller. Fails while any box is still open.
    pub fn into_bytes(self) -> Result<TryVec<u8>> {
        if !self.open.is_empty() {
            debug!("{} boxes left open", self.open.len());
            return Err(Error::InvalidData("unfinished box"));
        }
        Ok(self.data.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::BoxReader;

    #[test]
    fn finished_box_reads_back() {
        let content = b"avifmif1miaf";
        let mut w = BoxWriter::new();
        let ftyp = w.write_box_header(BoxType::FileTypeBox).unwrap();
        w.write(content).unwrap();
        w.finish_box(ftyp).unwrap();
        assert_eq!(&w.as_slice()[..4], &[0, 0, 0, 20]);

        let bytes = w.into_bytes().unwrap();
        let mut r = BoxReader::new(&bytes);
        let h = r.read_box_header().unwrap();
        assert_eq!(h.name, BoxType::FileTypeBox);
        assert_eq!(h.content_size, content.len() as u64);
        assert_eq!(r.remaining_slice(), content);
    }

    #[test]
    fn full_box_header() {
        let mut w = BoxWriter::new();
        let ispe = w.write_full_box_header(BoxType::ImageSpatialExtentsBox, 0, 0).unwrap();
        w.write_u32(1920).unwrap();
        w.write_u32(1080).unwrap();
        w.finish_box(ispe).unwrap();

        let bytes = w.into_bytes().unwrap();
        let mut r = BoxReader::new(&bytes);
        let h = r.read_box_header().unwrap();
        assert_eq!(h.total_size(), 20);
        assert_eq!(r.read_and_enforce_version(0).unwrap(), 0);
        assert_eq!(r.read_u32().unwrap(), 1920);
        assert_eq!(r.read_u32().unwrap(), 1080);
    }

    #[test]
    fn nested_boxes() {
        let mut w = BoxWriter::new();
        let iprp = w.write_box_header(BoxType::ItemPropertiesBox).unwrap();
        let ipco = w.write_box_header(BoxType::ItemPropertyContainerBox).unwrap();
        w.write_box(BoxType::PixelInformationBox, &[0, 0, 0, 0, 1, 8]).unwrap();
        assert_eq!(w.open_boxes(), 2);
        w.finish_box(ipco).unwrap();
        w.finish_box(iprp).unwrap();

        let bytes = w.into_bytes().unwrap();
        let mut r = BoxReader::new(&bytes);
        let (iprp, mut content) = r.next_box().unwrap().unwrap();
        assert_eq!(iprp.total_size(), 30);
        let (ipco, mut content) = content.next_box().unwrap().unwrap();
        assert_eq!(ipco.content_size, 14);
        let (pixi, _) = content.next_box().unwrap().unwrap();
        assert_eq!(pixi.name, BoxType::PixelInformationBox);
    }

    #[test]
    fn out_of_order_finish() {
        let mut w = BoxWriter::new();
        let outer = w.write_box_header(BoxType::MetadataBox).unwrap();
        let _inner = w.write_box_header(BoxType::HandlerBox).unwrap();
        assert!(matches!(w.finish_box(outer), Err(Error::InvalidData(_))));
        assert!(w.into_bytes().is_err());
    }

    #[test]
    fn failed_finish_leaves_box_open() {
        let mut w = BoxWriter::new();
        let outer = w.write_box_header(BoxType::MetadataBox).unwrap();
        let inner = w.write_box_header(BoxType::HandlerBox).unwrap();
        assert!(w.finish_box(outer).is_err());
        w.finish_box(inner).unwrap();
        assert_eq!(w.open_boxes(), 1);
        assert!(matches!(w.into_bytes(), Err(Error::InvalidData(_))));
    }

    #[test]
    fn into_bytes_keeps_contents() {
        let mut w = BoxWriter::with_capacity(64).unwrap();
        w.write_box(BoxType::FileTypeBox, b"avif").unwrap();
        let expected = w.as_slice().to_vec();
        let bytes = w.into_bytes().unwrap();
        assert_eq!(bytes, expected.as_slice());
    }

    #[test]
    fn zeros_and_strings() {
        let mut w = BoxWriter::with_capacity(2).unwrap();
        w.write_zeros(0).unwrap();
        w.write_zeros(100).unwrap();
        assert_eq!(w.offset(), 100);
        assert!(w.as_slice().iter().all(|&b| b == 0));

        w.write_null_terminated(b"pict").unwrap();
        assert!(w.write_null_terminated(b"a\0b").is_err());
        assert_eq!(&w.as_slice()[100..], b"pict\0");
    }

    #[test]
    fn uleb128_and_wide_fields() {
        let mut w = BoxWriter::new();
        assert_eq!(w.write_uleb128(0).unwrap(), 1);
        assert_eq!(w.write_uleb128(128).unwrap(), 2);
        assert_eq!(w.write_uleb128(u32::MAX).unwrap(), 5);
        assert_eq!(w.as_slice(), &[0x00, 0x80, 0x01, 0xff, 0xff, 0xff, 0xff, 0x0f]);

        assert!(w.write_u24(0x0100_0000).is_err());
        assert!(w.write_full_box_header(BoxType::HandlerBox, 0, 0x0100_0000).is_err());
        assert_eq!(w.open_boxes(), 0);
    }
}
