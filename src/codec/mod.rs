//! SSZ wire format.
//!
//! [`encode`] walks a view's tree and never fails on well-formed views.
//! [`decode`] treats its input as hostile: every length, offset, sentinel
//! and selector is checked before any node is built.

mod decode;
mod encode;

pub use decode::decode;
pub use encode::encode;

/// Reads the little-endian `u32` offset at `pos`.
///
/// Caller must ensure `pos + 4 <= bytes.len()`.
fn read_offset(bytes: &[u8], pos: usize) -> usize {
    let mut le = [0u8; crate::BYTES_PER_LENGTH_OFFSET];
    le.copy_from_slice(&bytes[pos..pos + crate::BYTES_PER_LENGTH_OFFSET]);
    u32::from_le_bytes(le) as usize
}
