//! Host byte order detection and fixed-order word packing
//!
//! The Z80 side of the machine stores 16-bit words little endian and the 68000 side stores them
//! big endian, so every device that touches raw memory goes through this layer rather than
//! relying on the host's native layout.

use crate::error::Error;
use crate::devices::{read_beu16, read_beu32, read_leu16, read_leu32, write_beu16, write_beu32, write_leu16, write_leu32};


#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

/// True when the target stores the least significant byte first.  Resolved at compile time
pub const HOST_IS_LITTLE_ENDIAN: bool = cfg!(target_endian = "little");

pub const HOST_BYTE_ORDER: ByteOrder = if HOST_IS_LITTLE_ENDIAN { ByteOrder::Little } else { ByteOrder::Big };

/// Determine the byte order at run time by laying out the pattern 0x01020304 in native order
pub fn probe_byte_order() -> ByteOrder {
    match 0x0102_0304_u32.to_ne_bytes() {
        [0x04, 0x03, 0x02, 0x01] => ByteOrder::Little,
        _ => ByteOrder::Big,
    }
}

/// Check that the compiled-in byte order agrees with what the host actually does.  Front ends
/// call this before constructing any devices and refuse to run if it fails
pub fn verify_host_byte_order() -> Result<ByteOrder, Error> {
    let probed = probe_byte_order();
    if probed != HOST_BYTE_ORDER {
        return Err(Error::assertion(format!(
            "host byte order mismatch: compiled for {:?} but probed {:?}",
            HOST_BYTE_ORDER, probed
        )));
    }
    Ok(probed)
}

impl ByteOrder {
    #[inline]
    pub fn host() -> Self {
        HOST_BYTE_ORDER
    }

    #[inline]
    pub fn read_u16(self, data: &[u8]) -> u16 {
        match self {
            ByteOrder::Little => read_leu16(data),
            ByteOrder::Big => read_beu16(data),
        }
    }

    #[inline]
    pub fn read_u32(self, data: &[u8]) -> u32 {
        match self {
            ByteOrder::Little => read_leu32(data),
            ByteOrder::Big => read_beu32(data),
        }
    }

    #[inline]
    pub fn write_u16(self, data: &mut [u8], value: u16) {
        match self {
            ByteOrder::Little => write_leu16(data, value),
            ByteOrder::Big => write_beu16(data, value),
        };
    }

    #[inline]
    pub fn write_u32(self, data: &mut [u8], value: u32) {
        match self {
            ByteOrder::Little => write_leu32(data, value),
            ByteOrder::Big => write_beu32(data, value),
        };
    }

    /// Convert a word between this order and the host's native order
    #[inline]
    pub fn to_host_u16(self, value: u16) -> u16 {
        if self == HOST_BYTE_ORDER {
            value
        } else {
            value.swap_bytes()
        }
    }
}
