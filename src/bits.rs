//! MSB-first bit cursor with a sticky error flag.
//!
//! Reads never fail. Running past the end of the buffer yields zero bits and
//! sets the flag; callers read a whole field sequence and then call
//! [`BitReader::check`] once.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::{Error, Result};

/// Longest unary prefix accepted by [`BitReader::read_uvlc`].
const UVLC_MAX_LEADING_ZEROS: u32 = 32;

/// Most LEB128 groups accepted by [`BitReader::read_uleb128`].
const LEB128_MAX_GROUPS: u32 = 8;

pub struct BitReader<'a> {
    bits: bitreader::BitReader<'a>,
    /// Bits requested beyond the end of the buffer, all read as zero.
    overrun: u64,
    eof: bool,
    error: bool,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            bits: bitreader::BitReader::new(data),
            overrun: 0,
            eof: false,
            error: false,
        }
    }

    /// Reads `n` bits, most significant first. `n` may be 0..=64.
    ///
    /// Bits past the end of the buffer read as zero and set both the eof and
    /// error flags. Once the error flag is set, every read returns zero and
    /// only advances the position.
    pub fn read_bits(&mut self, n: u8) -> u64 {
        if n > 64 {
            self.error = true;
            return 0;
        }
        let wanted = u64::from(n);
        if self.error {
            self.overrun += wanted;
            return 0;
        }
        let available = self.bits.remaining();
        if wanted <= available {
            return match self.bits.read_u64(n) {
                Ok(value) => value,
                Err(err) => {
                    log::debug!("bitreader: {err}");
                    self.error = true;
                    0
                },
            };
        }

        self.eof = true;
        self.error = true;
        self.overrun += wanted - available;
        if available == 0 {
            return 0;
        }
        // available < n <= 64, so both the narrowing and the shift are in range
        let tail = self.bits.read_u64(available as u8).unwrap_or(0);
        tail << (wanted - available)
    }

    pub fn read_bool(&mut self) -> bool {
        self.read_bits(1) != 0
    }

    /// Reads a field of at most 32 bits.
    pub(crate) fn read_u32(&mut self, n: u8) -> u32 {
        debug_assert!(n <= 32);
        self.read_bits(n.min(32)) as u32
    }

    pub(crate) fn read_u8(&mut self, n: u8) -> u8 {
        debug_assert!(n <= 8);
        self.read_bits(n.min(8)) as u8
    }

    /// Skips `n` bits. Skipping past the end behaves like reading past it.
    pub fn skip_bits(&mut self, mut n: u64) {
        while n > 0 {
            let chunk = n.min(64);
            self.read_bits(chunk as u8);
            n -= chunk;
        }
    }

    /// `leb128()`: up to eight little-endian groups of seven bits.
    ///
    /// Sets the error flag when no group terminates within eight bytes or
    /// the value does not fit in 32 bits.
    pub fn read_uleb128(&mut self) -> u32 {
        let mut value: u64 = 0;
        for i in 0..LEB128_MAX_GROUPS {
            let byte = self.read_bits(8);
            value |= (byte & 0x7f) << (i * 7);
            if byte & 0x80 == 0 {
                return match u32::try_from(value) {
                    Ok(value) => value,
                    Err(_) => {
                        log::debug!("leb128 value {value} exceeds 32 bits");
                        self.error = true;
                        0
                    },
                };
            }
        }
        log::debug!("leb128 without terminating group");
        self.error = true;
        0
    }

    /// `uvlc()`: a unary count of leading zeros followed by that many bits.
    ///
    /// Returns `u32::MAX` if the prefix reaches 32 zeros.
    pub fn read_uvlc(&mut self) -> u32 {
        let mut leading_zeros = 0;
        while !self.read_bool() {
            leading_zeros += 1;
            if leading_zeros >= UVLC_MAX_LEADING_ZEROS {
                return u32::MAX;
            }
        }
        let value = self.read_u32(leading_zeros as u8);
        ((1u32 << leading_zeros) - 1) + value
    }

    /// Total bits consumed, including any synthesized past the end.
    pub fn bit_position(&self) -> u64 {
        self.bits.position() + self.overrun
    }

    /// Whole bytes consumed.
    pub fn byte_position(&self) -> u64 {
        self.bit_position() / 8
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn has_error(&self) -> bool {
        self.error
    }

    /// Turns the sticky flags into a result, once per field sequence.
    ///
    /// Reads stop touching the buffer after the first error, so eof is only
    /// set when running out of input was that first error.
    pub fn check(&self) -> Result<()> {
        if self.eof {
            Err(Error::Truncated("bitstream ended early"))
        } else if self.error {
            Err(Error::Overflow("bitstream value out of range"))
        } else {
            Ok(())
        }
    }
}
