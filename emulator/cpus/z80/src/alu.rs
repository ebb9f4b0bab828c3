//! Arithmetic and logic helpers shared by the executor and the indexed bit-op dispatcher
//!
//! Each helper is a pure function of its operands and returns the result together with the
//! complete flag byte it produces, including the undocumented X and Y bits.

use crate::flags::{FLAG_C, FLAG_H, FLAG_N, FLAG_PV, FLAG_S, FLAG_Z, FLAGS_XY, FLAG_TABLES, szxy_of, szxyp};


#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RotateOp {
    Rlc,
    Rrc,
    Rl,
    Rr,
    Sla,
    Sra,
    Sll,
    Srl,
}

impl RotateOp {
    /// Decode bits 5-3 of a CB or XYCB opcode in the 0x00-0x3F range
    pub fn from_field(y: u8) -> Self {
        match y & 0x07 {
            0 => RotateOp::Rlc,
            1 => RotateOp::Rrc,
            2 => RotateOp::Rl,
            3 => RotateOp::Rr,
            4 => RotateOp::Sla,
            5 => RotateOp::Sra,
            6 => RotateOp::Sll,
            7 => RotateOp::Srl,
            _ => unreachable!(),
        }
    }
}

/// Rotate or shift a byte, returning the result and the bit shifted out
#[inline]
pub fn rotate_shift(op: RotateOp, value: u8, carry_in: bool) -> (u8, bool) {
    match op {
        RotateOp::Rlc => (value.rotate_left(1), value & 0x80 != 0),
        RotateOp::Rrc => (value.rotate_right(1), value & 0x01 != 0),
        RotateOp::Rl => ((value << 1) | carry_in as u8, value & 0x80 != 0),
        RotateOp::Rr => ((value >> 1) | ((carry_in as u8) << 7), value & 0x01 != 0),
        RotateOp::Sla => (value << 1, value & 0x80 != 0),
        RotateOp::Sra => ((value >> 1) | (value & 0x80), value & 0x01 != 0),
        RotateOp::Sll => ((value << 1) | 0x01, value & 0x80 != 0),
        RotateOp::Srl => (value >> 1, value & 0x01 != 0),
    }
}

/// The CB-style rotate/shift: returns the result and the full flag byte
#[inline]
pub fn rotate_shift_flags(op: RotateOp, value: u8, flags: u8) -> (u8, u8) {
    let (result, carry) = rotate_shift(op, value, flags & FLAG_C != 0);
    (result, szxyp(result) | carry as u8)
}

/// The accumulator rotates (RLCA, RRCA, RLA, RRA) only touch H, N, C and X/Y
#[inline]
pub fn rotate_accumulator(op: RotateOp, acc: u8, flags: u8) -> (u8, u8) {
    let (result, carry) = rotate_shift(op, acc, flags & FLAG_C != 0);
    let preserved = flags & (FLAG_S | FLAG_Z | FLAG_PV);
    (result, preserved | (result & FLAGS_XY) | carry as u8)
}

pub fn add8(a: u8, b: u8, carry_in: bool) -> (u8, u8) {
    let sum = a as u16 + b as u16 + carry_in as u16;
    let result = sum as u8;
    let mut flags = szxy_of(result);
    if (a ^ b ^ result) & 0x10 != 0 {
        flags |= FLAG_H;
    }
    if (a ^ result) & (b ^ result) & 0x80 != 0 {
        flags |= FLAG_PV;
    }
    if sum > 0xFF {
        flags |= FLAG_C;
    }
    (result, flags)
}

pub fn sub8(a: u8, b: u8, carry_in: bool) -> (u8, u8) {
    let diff = (a as u16).wrapping_sub(b as u16).wrapping_sub(carry_in as u16);
    let result = diff as u8;
    let mut flags = szxy_of(result) | FLAG_N;
    if (a ^ b ^ result) & 0x10 != 0 {
        flags |= FLAG_H;
    }
    if (a ^ b) & (a ^ result) & 0x80 != 0 {
        flags |= FLAG_PV;
    }
    if diff > 0xFF {
        flags |= FLAG_C;
    }
    (result, flags)
}

/// CP behaves like SUB but X and Y come from the operand rather than the result
pub fn cp8(a: u8, b: u8) -> u8 {
    let (_, flags) = sub8(a, b, false);
    (flags & !FLAGS_XY) | (b & FLAGS_XY)
}

pub fn and8(a: u8, b: u8) -> (u8, u8) {
    let result = a & b;
    (result, szxyp(result) | FLAG_H)
}

pub fn xor8(a: u8, b: u8) -> (u8, u8) {
    let result = a ^ b;
    (result, szxyp(result))
}

pub fn or8(a: u8, b: u8) -> (u8, u8) {
    let result = a | b;
    (result, szxyp(result))
}

/// INC preserves C, everything else comes from the table
#[inline]
pub fn inc8(value: u8, flags: u8) -> (u8, u8) {
    let result = value.wrapping_add(1);
    (result, FLAG_TABLES.inc[result as usize] | (flags & FLAG_C))
}

#[inline]
pub fn dec8(value: u8, flags: u8) -> (u8, u8) {
    let result = value.wrapping_sub(1);
    (result, FLAG_TABLES.dec[result as usize] | (flags & FLAG_C))
}

/// ADD HL,rr: S, Z and P/V are preserved, H comes from bit 11, X/Y from the high byte
pub fn add16(a: u16, b: u16, flags: u8) -> (u16, u8) {
    let sum = a as u32 + b as u32;
    let result = sum as u16;
    let mut new_flags = (flags & (FLAG_S | FLAG_Z | FLAG_PV)) | ((result >> 8) as u8 & FLAGS_XY);
    if (a ^ b ^ result) & 0x1000 != 0 {
        new_flags |= FLAG_H;
    }
    if sum > 0xFFFF {
        new_flags |= FLAG_C;
    }
    (result, new_flags)
}

pub fn adc16(a: u16, b: u16, carry_in: bool) -> (u16, u8) {
    let sum = a as u32 + b as u32 + carry_in as u32;
    let result = sum as u16;
    let mut flags = word_szxy(result);
    if (a ^ b ^ result) & 0x1000 != 0 {
        flags |= FLAG_H;
    }
    if (a ^ result) & (b ^ result) & 0x8000 != 0 {
        flags |= FLAG_PV;
    }
    if sum > 0xFFFF {
        flags |= FLAG_C;
    }
    (result, flags)
}

pub fn sbc16(a: u16, b: u16, carry_in: bool) -> (u16, u8) {
    let diff = (a as u32).wrapping_sub(b as u32).wrapping_sub(carry_in as u32);
    let result = diff as u16;
    let mut flags = word_szxy(result) | FLAG_N;
    if (a ^ b ^ result) & 0x1000 != 0 {
        flags |= FLAG_H;
    }
    if (a ^ b) & (a ^ result) & 0x8000 != 0 {
        flags |= FLAG_PV;
    }
    if diff > 0xFFFF {
        flags |= FLAG_C;
    }
    (result, flags)
}

fn word_szxy(value: u16) -> u8 {
    let high = (value >> 8) as u8;
    let zero = if value == 0 { FLAG_Z } else { 0 };
    (high & (FLAG_S | FLAGS_XY)) | zero
}

/// Decimal adjust the accumulator after a BCD add or subtract
pub fn daa(acc: u8, flags: u8) -> (u8, u8) {
    let carry = flags & FLAG_C != 0;
    let half = flags & FLAG_H != 0;
    let subtract = flags & FLAG_N != 0;

    let mut correction = 0;
    let mut new_carry = false;
    if half || (acc & 0x0F) > 0x09 {
        correction |= 0x06;
    }
    if carry || acc > 0x99 {
        correction |= 0x60;
        new_carry = true;
    }

    let result = if subtract { acc.wrapping_sub(correction) } else { acc.wrapping_add(correction) };
    let new_half = if subtract {
        half && (acc & 0x0F) < 0x06
    } else {
        (acc & 0x0F) > 0x09
    };

    let mut new_flags = szxyp(result) | (flags & FLAG_N);
    if new_half {
        new_flags |= FLAG_H;
    }
    if new_carry {
        new_flags |= FLAG_C;
    }
    (result, new_flags)
}
