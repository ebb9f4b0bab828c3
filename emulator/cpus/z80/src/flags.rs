//! Flag bit definitions and the precomputed flag lookup tables
//!
//! Bits 5 and 3 of F are undocumented.  On real silicon they usually receive copies of bits 5
//! and 3 of the result, and are called X and Y here.

use lazy_static::lazy_static;

pub const FLAG_C: u8 = 0x01;
pub const FLAG_N: u8 = 0x02;
pub const FLAG_PV: u8 = 0x04;
pub const FLAG_Y: u8 = 0x08;
pub const FLAG_H: u8 = 0x10;
pub const FLAG_X: u8 = 0x20;
pub const FLAG_Z: u8 = 0x40;
pub const FLAG_S: u8 = 0x80;

pub const FLAGS_XY: u8 = FLAG_X | FLAG_Y;
pub const FLAGS_SZXY: u8 = FLAG_S | FLAG_Z | FLAG_X | FLAG_Y;

lazy_static! {
    /// Process-wide flag tables, built on first use
    pub static ref FLAG_TABLES: FlagTables = FlagTables::new();
}

/// The 256-entry tables indexed by an 8-bit result
#[derive(Clone)]
pub struct FlagTables {
    /// S, Z, X, Y and even parity of the value
    pub szxyp: [u8; 256],
    /// S, Z, X, Y of the value, with P/V mirroring Z (the layout BIT produces)
    pub szxy_bit: [u8; 256],
    /// Flags after an INC whose result is the index (C not included)
    pub inc: [u8; 256],
    /// Flags after a DEC whose result is the index (C not included)
    pub dec: [u8; 256],
}

impl FlagTables {
    pub fn new() -> Self {
        let mut tables = Self {
            szxyp: [0; 256],
            szxy_bit: [0; 256],
            inc: [0; 256],
            dec: [0; 256],
        };

        for i in 0..256 {
            let value = i as u8;
            let szxy = szxy_of(value);

            tables.szxyp[i] = szxy | parity_of(value);
            tables.szxy_bit[i] = if value == 0 { szxy | FLAG_PV } else { szxy };

            tables.inc[i] = szxy;
            if value & 0x0F == 0x00 {
                tables.inc[i] |= FLAG_H;
            }
            if value == 0x80 {
                tables.inc[i] |= FLAG_PV;
            }

            tables.dec[i] = szxy | FLAG_N;
            if value & 0x0F == 0x0F {
                tables.dec[i] |= FLAG_H;
            }
            if value == 0x7F {
                tables.dec[i] |= FLAG_PV;
            }
        }

        tables
    }
}

impl Default for FlagTables {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
pub fn szxy_of(value: u8) -> u8 {
    let zero = if value == 0 { FLAG_Z } else { 0 };
    (value & (FLAG_S | FLAGS_XY)) | zero
}

/// P/V set when the value has an even number of set bits
#[inline]
pub fn parity_of(value: u8) -> u8 {
    if value.count_ones() % 2 == 0 {
        FLAG_PV
    } else {
        0
    }
}

#[inline]
pub fn szxyp(value: u8) -> u8 {
    FLAG_TABLES.szxyp[value as usize]
}
