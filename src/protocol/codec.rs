//! Binary codec
//!
//! Fixed-width big-endian integers embedded in otherwise textual frames.
//!
//! ```text
//! ┌──────────┬──────────┐
//! │ MSB (1)  │ LSB (1)  │   u16 = (b0 << 8) | b1
//! └──────────┴──────────┘
//! ```
//!
//! Readers never consume anything on a short read, so a caller can retry once
//! more bytes arrive.

use bytes::{Buf, BufMut};

use crate::error::{CtlError, Result};

/// Width of an encoded u16
pub const U16_LEN: usize = 2;

/// Width of an encoded u32
pub const U32_LEN: usize = 4;

fn ensure<B: Buf>(buf: &B, needed: usize) -> Result<()> {
    let available = buf.remaining();
    if available < needed {
        return Err(CtlError::BufferUnderflow { needed, available });
    }
    Ok(())
}

/// Read one big-endian u16 from the cursor
pub fn get_u16<B: Buf>(buf: &mut B) -> Result<u16> {
    ensure(buf, U16_LEN)?;
    Ok(buf.get_u16())
}

/// Append one big-endian u16
pub fn put_u16<B: BufMut>(buf: &mut B, value: u16) {
    buf.put_u16(value);
}

/// Read one big-endian u32 from the cursor
pub fn get_u32<B: Buf>(buf: &mut B) -> Result<u32> {
    ensure(buf, U32_LEN)?;
    Ok(buf.get_u32())
}

/// Append one big-endian u32
pub fn put_u32<B: BufMut>(buf: &mut B, value: u32) {
    buf.put_u32(value);
}
