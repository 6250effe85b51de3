//! AV1 `sequence_header_obu()` decoding.
//!
//! See AV1 Bitstream & Decoding Process Specification § 5.5

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::bits::BitReader;
use crate::{Error, Result};
use log::debug;
use std::num::NonZeroU32;

/// CICP code for "unspecified", the default for primaries, transfer and matrix.
pub const UNSPECIFIED: u8 = 2;
/// `CP_BT_709`
pub const PRIMARIES_BT709: u8 = 1;
/// `TC_SRGB`
pub const TRANSFER_SRGB: u8 = 13;
/// `MC_IDENTITY`
pub const MATRIX_IDENTITY: u8 = 0;

/// Seq level index above which `seq_tier` is coded.
const TIER_LEVEL_THRESHOLD: u8 = 7;

/// Chroma layout derived from `mono_chrome` and the subsampling flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromaFormat {
    Yuv400,
    Yuv420,
    Yuv422,
    Yuv444,
}

impl ChromaFormat {
    /// Maps `(subsampling_x, subsampling_y)` to a color layout.
    ///
    /// Vertical-only subsampling is not a valid AV1 layout and yields `None`.
    pub fn from_subsampling(monochrome: bool, subsampling: (bool, bool)) -> Option<Self> {
        match (monochrome, subsampling) {
            (true, _) => Some(Self::Yuv400),
            (false, (true, true)) => Some(Self::Yuv420),
            (false, (true, false)) => Some(Self::Yuv422),
            (false, (false, false)) => Some(Self::Yuv444),
            (false, (false, true)) => None,
        }
    }
}

/// `chroma_sample_position`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromaSamplePosition {
    Unknown,
    Vertical,
    Colocated,
    Reserved,
}

impl From<u8> for ChromaSamplePosition {
    fn from(csp: u8) -> Self {
        match csp {
            1 => Self::Vertical,
            2 => Self::Colocated,
            3 => Self::Reserved,
            _ => Self::Unknown,
        }
    }
}

/// `color_range`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorRange {
    /// Studio swing
    Limited,
    Full,
}

/// Stream-wide parameters from a sequence header OBU.
///
/// Holds what decode buffer allocation and an `av1C` configuration record
/// need; everything else in the header is consumed and dropped.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceHeader {
    /// 0, 1 or 2
    pub seq_profile: u8,
    /// Should be true for non-animated AVIF
    pub still_picture: bool,
    pub reduced_still_picture_header: bool,
    pub timing_info_present: bool,
    pub initial_display_delay_present: bool,
    /// `operating_points_cnt_minus_1 + 1`
    pub operating_points_count: u8,
    /// Level of the first operating point
    pub seq_level_idx_0: u8,
    /// Tier of the first operating point
    pub seq_tier_0: bool,
    pub max_frame_width: NonZeroU32,
    pub max_frame_height: NonZeroU32,
    /// 8, 10, or 12
    pub bit_depth: u8,
    pub monochrome: bool,
    /// Horizontal and vertical. `false` is full-res.
    ///
    /// Forced to `(true, true)` for monochrome streams, as `av1C` expects.
    pub chroma_subsampling: (bool, bool),
    pub chroma_format: ChromaFormat,
    pub chroma_sample_position: ChromaSamplePosition,
    pub color_primaries: u8,
    pub transfer_characteristics: u8,
    pub matrix_coefficients: u8,
    pub color_range: ColorRange,
    pub film_grain_params_present: bool,
}

/// Output of `color_config()`.
#[derive(Debug, Clone, Copy)]
struct ColorConfig {
    bit_depth: u8,
    monochrome: bool,
    chroma_subsampling: (bool, bool),
    chroma_format: ChromaFormat,
    chroma_sample_position: ChromaSamplePosition,
    color_primaries: u8,
    transfer_characteristics: u8,
    matrix_coefficients: u8,
    color_range: ColorRange,
}

impl SequenceHeader {
    /// Decodes a sequence header OBU payload (without the OBU header).
    ///
    /// Fields are read in strict syntax order; anything not kept is still
    /// consumed so that later fields stay aligned. The bit reader's error
    /// flag is checked once, after the last field.
    pub fn parse(bits: &mut BitReader<'_>) -> Result<Self> {
        let seq_profile = bits.read_u8(3);
        if seq_profile > 2 {
            debug!("seq_profile {seq_profile} > 2");
            return Err(Error::InvalidData("invalid seq_profile"));
        }
        let still_picture = bits.read_bool();
        let reduced_still_picture_header = bits.read_bool();
        if reduced_still_picture_header && !still_picture {
            return Err(Error::InvalidData("reduced_still_picture_header without still_picture"));
        }

        let mut timing_info_present = false;
        let mut initial_display_delay_present = false;
        let mut operating_points_count = 1;
        let mut seq_level_idx_0 = 0;
        let mut seq_tier_0 = false;
        if reduced_still_picture_header {
            seq_level_idx_0 = bits.read_u8(5);
        } else {
            timing_info_present = bits.read_bool();
            let mut decoder_model_info_present = false;
            let mut buffer_delay_length = 0;
            if timing_info_present {
                skip_timing_info(bits);
                decoder_model_info_present = bits.read_bool();
                if decoder_model_info_present {
                    buffer_delay_length = skip_decoder_model_info(bits);
                }
            }
            initial_display_delay_present = bits.read_bool();
            operating_points_count = bits.read_u8(5) + 1;

            for i in 0..operating_points_count {
                let (level, tier) = read_operating_point(
                    bits,
                    decoder_model_info_present,
                    buffer_delay_length,
                    initial_display_delay_present,
                );
                if i == 0 {
                    seq_level_idx_0 = level;
                    seq_tier_0 = tier;
                }
            }
        }

        let frame_width_bits = bits.read_u8(4) + 1;
        let frame_height_bits = bits.read_u8(4) + 1;
        let max_frame_width = bits.read_u32(frame_width_bits) + 1;
        let max_frame_height = bits.read_u32(frame_height_bits) + 1;

        if !reduced_still_picture_header {
            let frame_id_numbers_present = bits.read_bool();
            if frame_id_numbers_present {
                // delta_frame_id_length_minus_2, additional_frame_id_length_minus_1
                bits.skip_bits(4 + 3);
            }
        }

        skip_coding_tools(bits, reduced_still_picture_header);

        let color = read_color_config(bits, seq_profile);
        let film_grain_params_present = bits.read_bool();

        bits.check()?;

        Ok(Self {
            seq_profile,
            still_picture,
            reduced_still_picture_header,
            timing_info_present,
            initial_display_delay_present,
            operating_points_count,
            seq_level_idx_0,
            seq_tier_0,
            max_frame_width: NonZeroU32::new(max_frame_width).ok_or(Error::InvalidData("zero max_frame_width"))?,
            max_frame_height: NonZeroU32::new(max_frame_height).ok_or(Error::InvalidData("zero max_frame_height"))?,
            bit_depth: color.bit_depth,
            monochrome: color.monochrome,
            chroma_subsampling: color.chroma_subsampling,
            chroma_format: color.chroma_format,
            chroma_sample_position: color.chroma_sample_position,
            color_primaries: color.color_primaries,
            transfer_characteristics: color.transfer_characteristics,
            matrix_coefficients: color.matrix_coefficients,
            color_range: color.color_range,
            film_grain_params_present,
        })
    }

    /// Parses a bare sequence header payload.
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        Self::parse(&mut BitReader::new(payload))
    }

    /// `(max_frame_width, max_frame_height)`
    pub fn dimensions(&self) -> (u32, u32) {
        (self.max_frame_width.get(), self.max_frame_height.get())
    }
}

/// `timing_info()`
fn skip_timing_info(bits: &mut BitReader<'_>) {
    // num_units_in_display_tick, time_scale
    bits.skip_bits(32 + 32);
    let equal_picture_interval = bits.read_bool();
    if equal_picture_interval {
        // num_ticks_per_picture_minus_1
        bits.read_uvlc();
    }
}

/// `decoder_model_info()`, returning `buffer_delay_length_minus_1 + 1`.
fn skip_decoder_model_info(bits: &mut BitReader<'_>) -> u8 {
    let buffer_delay_length = bits.read_u8(5) + 1;
    // num_units_in_decoding_tick, buffer_removal_time_length_minus_1,
    // frame_presentation_time_length_minus_1
    bits.skip_bits(32 + 5 + 5);
    buffer_delay_length
}

/// One entry of the operating point loop; returns `(seq_level_idx, seq_tier)`.
fn read_operating_point(
    bits: &mut BitReader<'_>,
    decoder_model_info_present: bool,
    buffer_delay_length: u8,
    initial_display_delay_present: bool,
) -> (u8, bool) {
    // operating_point_idc
    bits.skip_bits(12);
    let seq_level_idx = bits.read_u8(5);
    let seq_tier = seq_level_idx > TIER_LEVEL_THRESHOLD && bits.read_bool();
    if decoder_model_info_present {
        let decoder_model_present_for_this_op = bits.read_bool();
        if decoder_model_present_for_this_op {
            // decoder_buffer_delay, encoder_buffer_delay, low_delay_mode_flag
            let delay = u64::from(buffer_delay_length);
            bits.skip_bits(delay + delay + 1);
        }
    }
    if initial_display_delay_present {
        let initial_display_delay_present_for_this_op = bits.read_bool();
        if initial_display_delay_present_for_this_op {
            // initial_display_delay_minus_1
            bits.skip_bits(4);
        }
    }
    (seq_level_idx, seq_tier)
}

/// Everything between the frame id numbers and `color_config()`.
fn skip_coding_tools(bits: &mut BitReader<'_>, reduced_still_picture_header: bool) {
    // use_128x128_superblock, enable_filter_intra, enable_intra_edge_filter
    bits.skip_bits(3);
    if !reduced_still_picture_header {
        // enable_interintra_compound, enable_masked_compound,
        // enable_warped_motion, enable_dual_filter
        bits.skip_bits(4);
        let enable_order_hint = bits.read_bool();
        if enable_order_hint {
            // enable_jnt_comp, enable_ref_frame_mvs
            bits.skip_bits(2);
        }
        let seq_choose_screen_content_tools = bits.read_bool();
        let seq_force_screen_content_tools = seq_choose_screen_content_tools || bits.read_bool();
        if seq_force_screen_content_tools {
            let seq_choose_integer_mv = bits.read_bool();
            if !seq_choose_integer_mv {
                // seq_force_integer_mv
                bits.skip_bits(1);
            }
        }
        if enable_order_hint {
            // order_hint_bits_minus_1
            bits.skip_bits(3);
        }
    }
    // enable_superres, enable_cdef, enable_restoration
    bits.skip_bits(3);
}

/// `color_config()`
fn read_color_config(bits: &mut BitReader<'_>, seq_profile: u8) -> ColorConfig {
    let high_bitdepth = bits.read_bool();
    let bit_depth = match (seq_profile, high_bitdepth) {
        (2, true) if bits.read_bool() => 12,
        (_, true) => 10,
        (_, false) => 8,
    };

    let monochrome = seq_profile != 1 && bits.read_bool();

    let color_description_present = bits.read_bool();
    let (color_primaries, transfer_characteristics, matrix_coefficients) = if color_description_present {
        (bits.read_u8(8), bits.read_u8(8), bits.read_u8(8))
    } else {
        (UNSPECIFIED, UNSPECIFIED, UNSPECIFIED)
    };

    let mut config = ColorConfig {
        bit_depth,
        monochrome,
        chroma_subsampling: (true, true),
        chroma_format: ChromaFormat::Yuv420,
        chroma_sample_position: ChromaSamplePosition::Unknown,
        color_primaries,
        transfer_characteristics,
        matrix_coefficients,
        color_range: ColorRange::Limited,
    };

    if monochrome {
        config.color_range = read_color_range(bits);
        config.chroma_format = ChromaFormat::Yuv400;
        // separate_uv_delta_q is not coded for monochrome streams
        return config;
    }

    if color_primaries == PRIMARIES_BT709
        && transfer_characteristics == TRANSFER_SRGB
        && matrix_coefficients == MATRIX_IDENTITY
    {
        // sRGB in identity matrix implies full range 4:4:4 and no color_range bit
        config.color_range = ColorRange::Full;
        config.chroma_subsampling = (false, false);
    } else {
        config.color_range = read_color_range(bits);
        config.chroma_subsampling = match seq_profile {
            0 => (true, true),
            1 => (false, false),
            _ if bit_depth == 12 => {
                let subsampling_x = bits.read_bool();
                let subsampling_y = subsampling_x && bits.read_bool();
                (subsampling_x, subsampling_y)
            },
            _ => (true, false),
        };
        if config.chroma_subsampling == (true, true) {
            config.chroma_sample_position = ChromaSamplePosition::from(bits.read_u8(2));
        }
    }

    config.chroma_format = match config.chroma_subsampling {
        (true, true) => ChromaFormat::Yuv420,
        (true, false) => ChromaFormat::Yuv422,
        _ => ChromaFormat::Yuv444,
    };

    // separate_uv_delta_q
    bits.skip_bits(1);
    config
}

fn read_color_range(bits: &mut BitReader<'_>) -> ColorRange {
    if bits.read_bool() {
        ColorRange::Full
    } else {
        ColorRange::Limited
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// MSB-first bit packer for building test vectors.
    #[derive(Default)]
    pub(crate) struct BitPacker {
        bytes: std::vec::Vec<u8>,
        used: u32,
    }

    impl BitPacker {
        pub(crate) fn put(&mut self, n: u32, value: u64) -> &mut Self {
            for i in (0..n).rev() {
                if self.used % 8 == 0 {
                    self.bytes.push(0);
                }
                let bit = ((value >> i) & 1) as u8;
                let last = self.bytes.len() - 1;
                self.bytes[last] |= bit << (7 - self.used % 8);
                self.used += 1;
            }
            self
        }

        pub(crate) fn flag(&mut self, set: bool) -> &mut Self {
            self.put(1, u64::from(set))
        }

        pub(crate) fn finish(&mut self) -> std::vec::Vec<u8> {
            std::mem::take(&mut self.bytes)
        }
    }

    /// Reduced still picture header up to, not including, `color_config()`.
    pub(crate) fn reduced_prefix(profile: u64, level: u64, width: u64, height: u64) -> BitPacker {
        let mut w = BitPacker::default();
        w.put(3, profile).flag(true).flag(true).put(5, level);
        // 11 bits cover 1920 - 1, 1080 - 1
        w.put(4, 10).put(4, 10).put(11, width - 1).put(11, height - 1);
        // use_128x128_superblock, enable_filter_intra, enable_intra_edge_filter,
        // enable_superres, enable_cdef, enable_restoration
        w.put(6, 0b010_011);
        w
    }

    /// The golden 1920x1080 8-bit 4:2:0 still picture header.
    pub(crate) fn golden_payload() -> std::vec::Vec<u8> {
        let mut w = reduced_prefix(0, 5, 1920, 1080);
        // high_bitdepth, mono_chrome, color_description_present_flag, color_range
        w.flag(false).flag(false).flag(false).flag(false);
        // chroma_sample_position, separate_uv_delta_q, film_grain_params_present
        w.put(2, 0).flag(false).flag(false);
        w.finish()
    }

    #[test]
    fn golden_still_picture() {
        let h = SequenceHeader::from_payload(&golden_payload()).unwrap();
        assert_eq!(h.dimensions(), (1920, 1080));
        assert_eq!(h.seq_profile, 0);
        assert_eq!(h.seq_level_idx_0, 5);
        assert!(!h.seq_tier_0);
        assert_eq!(h.bit_depth, 8);
        assert_eq!(h.chroma_format, ChromaFormat::Yuv420);
        assert_eq!(h.chroma_subsampling, (true, true));
        assert_eq!(h.color_range, ColorRange::Limited);
        assert_eq!(h.color_primaries, UNSPECIFIED);
        assert_eq!(h.transfer_characteristics, UNSPECIFIED);
        assert_eq!(h.matrix_coefficients, UNSPECIFIED);
        assert!(h.still_picture && h.reduced_still_picture_header);
    }

    #[test]
    fn monochrome_ignores_color_description() {
        let mut w = reduced_prefix(0, 5, 64, 64);
        w.flag(false).flag(true).flag(true);
        w.put(8, u64::from(PRIMARIES_BT709)).put(8, u64::from(TRANSFER_SRGB)).put(8, u64::from(MATRIX_IDENTITY));
        // color_range, film_grain_params_present
        w.flag(true).flag(false);
        let h = SequenceHeader::from_payload(&w.finish()).unwrap();
        assert!(h.monochrome);
        assert_eq!(h.chroma_format, ChromaFormat::Yuv400);
        assert_eq!(h.chroma_subsampling, (true, true));
        assert_eq!(h.color_range, ColorRange::Full);
        assert_eq!(h.color_primaries, PRIMARIES_BT709);
    }

    #[test]
    fn srgb_identity_skips_color_range() {
        let mut w = reduced_prefix(1, 8, 64, 48);
        // profile 1 has no mono_chrome bit
        w.flag(true).flag(true);
        w.put(8, u64::from(PRIMARIES_BT709)).put(8, u64::from(TRANSFER_SRGB)).put(8, u64::from(MATRIX_IDENTITY));
        // separate_uv_delta_q, then film_grain_params_present = 1
        w.flag(false).flag(true);
        let h = SequenceHeader::from_payload(&w.finish()).unwrap();
        assert_eq!(h.color_range, ColorRange::Full);
        assert_eq!(h.chroma_format, ChromaFormat::Yuv444);
        assert_eq!(h.bit_depth, 10);
        // a consumed color_range bit would have shifted film grain out of place
        assert!(h.film_grain_params_present);
    }

    #[test]
    fn profile_2_twelve_bit_422() {
        let mut w = reduced_prefix(2, 12, 320, 240);
        // high_bitdepth, twelve_bit, mono_chrome, color_description_present_flag
        w.flag(true).flag(true).flag(false).flag(true);
        w.put(8, 9).put(8, 16).put(8, 9);
        // color_range, subsampling_x, subsampling_y
        w.flag(false).flag(true).flag(false);
        w.flag(false).flag(false);
        let h = SequenceHeader::from_payload(&w.finish()).unwrap();
        assert_eq!(h.bit_depth, 12);
        assert_eq!(h.chroma_format, ChromaFormat::Yuv422);
        assert_eq!(h.chroma_sample_position, ChromaSamplePosition::Unknown);
        assert_eq!((h.color_primaries, h.transfer_characteristics, h.matrix_coefficients), (9, 16, 9));
    }

    #[test]
    fn profile_2_ten_bit_is_422() {
        let mut w = reduced_prefix(2, 8, 16, 16);
        w.flag(true).flag(false).flag(false).flag(false);
        // color_range, separate_uv_delta_q, film_grain_params_present
        w.flag(true).flag(false).flag(false);
        let h = SequenceHeader::from_payload(&w.finish()).unwrap();
        assert_eq!(h.bit_depth, 10);
        assert_eq!(h.chroma_format, ChromaFormat::Yuv422);
        assert_eq!(h.color_range, ColorRange::Full);
    }

    #[test]
    fn rejects_profile_3() {
        let mut w = reduced_prefix(3, 5, 16, 16);
        w.put(8, 0);
        assert!(matches!(SequenceHeader::from_payload(&w.finish()), Err(Error::InvalidData(_))));
    }

    #[test]
    fn rejects_reduced_without_still() {
        let mut w = BitPacker::default();
        w.put(3, 0).flag(false).flag(true).put(32, 0);
        assert!(matches!(SequenceHeader::from_payload(&w.finish()), Err(Error::InvalidData(_))));
    }

    #[test]
    fn truncated_payload() {
        let payload = golden_payload();
        for len in 0..payload.len() {
            assert!(SequenceHeader::from_payload(&payload[..len]).is_err(), "len {len}");
        }
    }

    #[test]
    fn full_header_with_operating_points() {
        let mut w = BitPacker::default();
        w.put(3, 0).flag(false).flag(false);
        // timing_info_present_flag
        w.flag(true).put(32, 1001).put(32, 30000);
        // equal_picture_interval, num_ticks_per_picture_minus_1 = uvlc(0)
        w.flag(true).flag(true);
        // decoder_model_info_present_flag, buffer_delay_length_minus_1 = 9
        w.flag(true).put(5, 9).put(32, 1001).put(5, 4).put(5, 4);
        // initial_display_delay_present_flag, operating_points_cnt_minus_1 = 1
        w.flag(true).put(5, 1);
        // op 0: idc, level 9 (tier coded), decoder model with 10 bit delays, display delay
        w.put(12, 0x103).put(5, 9).flag(true);
        w.flag(true).put(10, 123).put(10, 456).flag(false);
        w.flag(true).put(4, 3);
        // op 1: level 4, no decoder model, no display delay
        w.put(12, 0x101).put(5, 4).flag(false).flag(false);
        w.put(4, 11).put(4, 11).put(12, 3839).put(12, 2159);
        // frame_id_numbers_present_flag with lengths
        w.flag(true).put(4, 5).put(3, 2);
        w.put(3, 0);
        // four compound/motion flags, enable_order_hint, jnt_comp + ref_frame_mvs
        w.put(4, 0b1111).flag(true).put(2, 0b11);
        // seq_choose_screen_content_tools = 0, seq_force_screen_content_tools = 1,
        // seq_choose_integer_mv = 0, seq_force_integer_mv
        w.flag(false).flag(true).flag(false).flag(true);
        // order_hint_bits_minus_1, superres/cdef/restoration
        w.put(3, 6).put(3, 0b011);
        // color_config: 10 bit, not mono, BT.2020 PQ, limited, csp colocated
        w.flag(true).flag(false).flag(true).put(8, 9).put(8, 16).put(8, 9);
        w.flag(false).put(2, 2).flag(false);
        w.flag(true);
        let h = SequenceHeader::from_payload(&w.finish()).unwrap();
        assert!(h.timing_info_present);
        assert!(h.initial_display_delay_present);
        assert_eq!(h.operating_points_count, 2);
        assert_eq!(h.seq_level_idx_0, 9);
        assert!(h.seq_tier_0);
        assert_eq!(h.dimensions(), (3840, 2160));
        assert_eq!(h.bit_depth, 10);
        assert_eq!(h.chroma_format, ChromaFormat::Yuv420);
        assert_eq!(h.chroma_sample_position, ChromaSamplePosition::Colocated);
        assert_eq!(h.color_range, ColorRange::Limited);
        assert!(h.film_grain_params_present);
    }

    #[test]
    fn chroma_format_from_subsampling() {
        assert_eq!(ChromaFormat::from_subsampling(true, (false, false)), Some(ChromaFormat::Yuv400));
        assert_eq!(ChromaFormat::from_subsampling(false, (true, false)), Some(ChromaFormat::Yuv422));
        assert_eq!(ChromaFormat::from_subsampling(false, (false, true)), None);
    }
}
