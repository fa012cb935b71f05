//! Bounds-checked accessors for the fixed-size part of lowered data.
//!
//! Every accessor takes an explicit offset and reports `BufferTooSmall`
//! instead of panicking, so a corrupt layout surfaces as a decode error.
//! Multi-byte accessors are little-endian and expect pre-aligned offsets;
//! callers align with [`align_to`] first.

use super::CanonicalAbiError;

fn too_small(needed: usize, buffer: &[u8]) -> CanonicalAbiError {
    CanonicalAbiError::BufferTooSmall {
        needed,
        available: buffer.len(),
    }
}

/// Round `offset` up to the next multiple of `align` (a power of two).
#[inline]
pub fn align_to(offset: usize, align: usize) -> usize {
    (offset + align - 1) & !(align - 1)
}

#[inline]
pub fn read_byte(buffer: &[u8], offset: usize) -> Result<u8, CanonicalAbiError> {
    buffer
        .get(offset)
        .copied()
        .ok_or_else(|| too_small(offset + 1, buffer))
}

#[inline]
pub fn write_byte(buffer: &mut [u8], offset: usize, value: u8) -> Result<(), CanonicalAbiError> {
    let err = too_small(offset + 1, buffer);
    *buffer.get_mut(offset).ok_or(err)? = value;
    Ok(())
}

#[inline]
pub fn read_slice(buffer: &[u8], offset: usize, len: usize) -> Result<&[u8], CanonicalAbiError> {
    let end = offset + len;
    buffer.get(offset..end).ok_or_else(|| too_small(end, buffer))
}

#[inline]
pub fn write_slice(
    buffer: &mut [u8],
    offset: usize,
    data: &[u8],
) -> Result<(), CanonicalAbiError> {
    let end = offset + data.len();
    let err = too_small(end, buffer);
    buffer.get_mut(offset..end).ok_or(err)?.copy_from_slice(data);
    Ok(())
}

/// Read a fixed-width little-endian field as a byte array.
#[inline]
pub fn read_array<const N: usize>(
    buffer: &[u8],
    offset: usize,
) -> Result<[u8; N], CanonicalAbiError> {
    read_slice(buffer, offset, N)?
        .try_into()
        .map_err(|_| too_small(offset + N, buffer))
}

/// Read the u32 half of a (ptr, len) pair or a discriminant word.
#[inline]
pub fn read_u32(buffer: &[u8], offset: usize) -> Result<u32, CanonicalAbiError> {
    Ok(u32::from_le_bytes(read_array(buffer, offset)?))
}

#[inline]
pub fn write_u32(buffer: &mut [u8], offset: usize, value: u32) -> Result<(), CanonicalAbiError> {
    write_slice(buffer, offset, &value.to_le_bytes())
}
