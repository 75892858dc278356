//! Big-endian scalar readers for the robot's binary state protocol
//!
//! The secondary interface sends everything big-endian regardless of host
//! byte order. Each reader returns `None` only when the value would run past
//! the end of the buffer.

/// Read a big-endian i32 at `offset`.
pub fn read_i32(buf: &[u8], offset: usize) -> Option<i32> {
    let bytes = buf.get(offset..offset + 4)?;
    Some(i32::from_be_bytes(bytes.try_into().ok()?))
}

/// Read a big-endian IEEE754 double at `offset`.
pub fn read_f64(buf: &[u8], offset: usize) -> Option<f64> {
    let bytes = buf.get(offset..offset + 8)?;
    Some(f64::from_be_bytes(bytes.try_into().ok()?))
}

/// Read a big-endian IEEE754 single at `offset`.
pub fn read_f32(buf: &[u8], offset: usize) -> Option<f32> {
    let bytes = buf.get(offset..offset + 4)?;
    Some(f32::from_be_bytes(bytes.try_into().ok()?))
}
