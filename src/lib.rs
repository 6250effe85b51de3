#![deny(unsafe_code)]
//! Bounds-checked primitives for AVIF files: AV1 sequence header extraction
//! and ISO Base Media box framing.
//!
//! Everything here operates on untrusted, possibly truncated input held in
//! memory. Readers borrow the caller's buffer; the writer owns its output
//! until [`BoxWriter::into_bytes`] hands it back.
//!
//! This crate is written entirely in safe Rust code.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use fallible_collections::TryReserveError;

mod bits;
mod boxes;
mod obu;
mod reader;
mod sequence_header;
mod writer;

pub use crate::bits::BitReader;
pub use crate::boxes::{BoxType, FourCC};
pub use crate::obu::{Obu, ObuExtension, ObuIter, ObuType, find_sequence_header};
pub use crate::reader::{BoxHeader, BoxReader};
pub use crate::sequence_header::{
    ChromaFormat, ChromaSamplePosition, ColorRange, SequenceHeader, MATRIX_IDENTITY, PRIMARIES_BT709, TRANSFER_SRGB,
    UNSPECIFIED,
};
pub use crate::writer::{BoxMarker, BoxWriter};

/// A trait to indicate a type can be infallibly converted to `u64`.
/// This should only be implemented for infallible conversions, so only unsigned types are valid.
pub(crate) trait ToU64 {
    fn to_u64(self) -> u64;
}

/// Statically verify that the platform `usize` can fit within a `u64`.
/// If the size won't fit on the given platform, this will fail at compile time, but if a type
/// which can fail `TryInto<usize>` is used, it may panic.
impl ToU64 for usize {
    fn to_u64(self) -> u64 {
        const _: () = assert!(std::mem::size_of::<usize>() <= std::mem::size_of::<u64>());
        self.try_into().ok().unwrap()
    }
}

/// A trait to indicate a type can be infallibly converted to `usize`.
/// This should only be implemented for infallible conversions, so only unsigned types are valid.
pub(crate) trait ToUsize {
    fn to_usize(self) -> usize;
}

/// Statically verify that the given type can fit within a `usize`.
macro_rules! impl_to_usize_from {
    ( $from_type:ty ) => {
        impl ToUsize for $from_type {
            fn to_usize(self) -> usize {
                const _: () = assert!(std::mem::size_of::<$from_type>() <= std::mem::size_of::<usize>());
                self.try_into().ok().unwrap()
            }
        }
    };
}

impl_to_usize_from!(u8);
impl_to_usize_from!(u16);
impl_to_usize_from!(u32);

#[doc(hidden)]
pub type TryVec<T> = fallible_collections::TryVec<T>;

// To ensure we don't use stdlib allocating types by accident
#[allow(dead_code)]
struct Vec;
#[allow(dead_code)]
struct Box;
#[allow(dead_code)]
struct String;

/// Describes parser and writer failures.
///
/// Every failure is terminal for the current parse attempt. Whether to give
/// up on the whole file or skip the offending unit or box is up to the caller.
#[derive(Debug)]
pub enum Error {
    /// A field holds a structurally invalid value, e.g. `seq_profile > 2`.
    InvalidData(&'static str),
    /// A declared size or bit count runs past the end of the buffer.
    Truncated(&'static str),
    /// A LEB128, uvlc or box size does not fit the representable range.
    Overflow(&'static str),
    /// A scan or string search completed without a match.
    NotFound(&'static str),
    /// Out of memory
    OutOfMemory,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidData(s) => f.write_str(s),
            Self::Truncated(s) => write!(f, "truncated: {s}"),
            Self::Overflow(s) => write!(f, "overflow: {s}"),
            Self::NotFound(s) => write!(f, "not found: {s}"),
            Self::OutOfMemory => f.write_str("OOM"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::WriteZero => Self::Truncated("short read or write"),
            std::io::ErrorKind::OutOfMemory => Self::OutOfMemory,
            _ => Self::InvalidData("i/o error"),
        }
    }
}

impl From<std::num::TryFromIntError> for Error {
    fn from(_: std::num::TryFromIntError) -> Self {
        Self::Overflow("integer conversion failed")
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        let kind = match err {
            Error::InvalidData(_) | Error::Overflow(_) => std::io::ErrorKind::InvalidData,
            Error::Truncated(_) => std::io::ErrorKind::UnexpectedEof,
            Error::NotFound(_) => std::io::ErrorKind::NotFound,
            Error::OutOfMemory => std::io::ErrorKind::OutOfMemory,
        };
        Self::new(kind, err)
    }
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Self::OutOfMemory
    }
}

/// Result shorthand using our Error enum.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Options for parsing box structures.
///
/// The default is strict: anything the box grammar forbids is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Accept full boxes whose flags are required to be zero but aren't.
    ///
    /// Such files are technically invalid, but some encoders write them.
    /// The deviation is logged at `warn` level instead of failing.
    pub lenient: bool,
}

#[test]
fn io_error_conversion() {
    let eof = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
    assert!(matches!(Error::from(eof), Error::Truncated(_)));

    let back: std::io::Error = Error::NotFound("sequence header").into();
    assert_eq!(back.kind(), std::io::ErrorKind::NotFound);
}

#[test]
fn error_display() {
    assert_eq!(Error::Overflow("leb128").to_string(), "overflow: leb128");
    assert_eq!(Error::InvalidData("seq_profile > 2").to_string(), "seq_profile > 2");
}
