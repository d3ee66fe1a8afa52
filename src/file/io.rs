//! Low-level byte order and safe reading/writing utilities for PE structures.
//!
//! This module provides bounds-checked, endian-aware binary data access used by every
//! structure wrapper and by the edit engine. All multi-byte PE fields are little-endian,
//! so only the little-endian direction is provided.
//!
//! # Key Components
//!
//! - [`crate::file::io::PeIO`] - Trait tying primitive integer types to their byte encodings
//! - [`crate::file::io::read_le`] / [`crate::file::io::read_le_at`] - Safe reads
//! - [`crate::file::io::write_le`] / [`crate::file::io::write_le_at`] - Safe writes
//!
//! # Examples
//!
//! ```rust,ignore
//! use peforge::file::io::{read_le_at, write_le_at};
//!
//! let mut data = [0u8; 8];
//! let mut offset = 0;
//! write_le_at(&mut data, &mut offset, 0xDEAD_BEEF_u32)?;
//!
//! let mut offset = 0;
//! let value: u32 = read_le_at(&data, &mut offset)?;
//! assert_eq!(value, 0xDEAD_BEEF);
//! # Ok::<(), peforge::Error>(())
//! ```

use crate::{Error::OutOfBounds, Result};

/// Trait for types that can be read from and written to little-endian byte buffers.
///
/// Implemented for the unsigned integer widths that occur as PE header fields. The
/// associated `Bytes` type is the fixed-size array matching the integer width, which
/// lets the read/write helpers stay fully bounds-checked without unsafe code.
pub trait PeIO: Sized + Copy {
    /// The fixed-size byte array representation of this type.
    type Bytes: for<'a> TryFrom<&'a [u8]> + AsRef<[u8]>;

    /// Decodes a value from its little-endian byte representation.
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Encodes this value into its little-endian byte representation.
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_pe_io {
    ($($t:ty),*) => {
        $(
            impl PeIO for $t {
                type Bytes = [u8; std::mem::size_of::<$t>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$t>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$t>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_pe_io!(u8, u16, u32, u64);

/// Safely reads a value of type `T` in little-endian byte order from the start of a buffer.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if the buffer holds fewer bytes than `T` requires.
pub fn read_le<T: PeIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Safely reads a value of type `T` in little-endian byte order at a specific offset.
///
/// The offset is advanced by the number of bytes read, allowing sequential field decoding.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes at `offset`.
pub fn read_le_at<T: PeIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    if (type_len + *offset) > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..*offset + type_len].try_into() else {
        return Err(OutOfBounds);
    };

    *offset += type_len;

    Ok(T::from_le_bytes(read))
}

/// Reads an unsigned value of the given byte width at an offset, zero-extended to `u64`.
///
/// Structure wrappers describe their fields as `(offset, width)` pairs; this helper decodes
/// a field of width 1, 2, 4 or 8 without the caller having to dispatch on the type.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] on truncation, and a malformed error for widths
/// outside the supported set.
pub fn read_le_dyn(data: &[u8], offset: usize, width: u8) -> Result<u64> {
    let mut cursor = offset;
    match width {
        1 => Ok(u64::from(read_le_at::<u8>(data, &mut cursor)?)),
        2 => Ok(u64::from(read_le_at::<u16>(data, &mut cursor)?)),
        4 => Ok(u64::from(read_le_at::<u32>(data, &mut cursor)?)),
        8 => read_le_at::<u64>(data, &mut cursor),
        _ => Err(malformed_error!("Unsupported field width - {}", width)),
    }
}

/// Safely writes a value of type `T` in little-endian byte order at the start of a buffer.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if the buffer is too small for `T`.
pub fn write_le<T: PeIO>(data: &mut [u8], value: T) -> Result<()> {
    let mut offset = 0_usize;
    write_le_at(data, &mut offset, value)
}

/// Safely writes a value of type `T` in little-endian byte order at a specific offset.
///
/// The offset is advanced by the number of bytes written.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there is insufficient room at `offset`.
pub fn write_le_at<T: PeIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let type_len = std::mem::size_of::<T>();
    if (type_len + *offset) > data.len() {
        return Err(OutOfBounds);
    }

    data[*offset..*offset + type_len].copy_from_slice(value.to_le_bytes().as_ref());

    *offset += type_len;

    Ok(())
}

/// Writes an unsigned value of the given byte width at an offset, truncating from `u64`.
///
/// The counterpart of [`read_le_dyn`] used by journaled header field writes.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] on truncation, and a malformed error for widths
/// outside the supported set.
#[allow(clippy::cast_possible_truncation)]
pub fn write_le_dyn(data: &mut [u8], offset: usize, width: u8, value: u64) -> Result<()> {
    let mut cursor = offset;
    match width {
        1 => write_le_at(data, &mut cursor, value as u8),
        2 => write_le_at(data, &mut cursor, value as u16),
        4 => write_le_at(data, &mut cursor, value as u32),
        8 => write_le_at(data, &mut cursor, value),
        _ => Err(malformed_error!("Unsupported field width - {}", width)),
    }
}
