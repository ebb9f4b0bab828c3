//! The DD CB d op / FD CB d op instruction family
//!
//! Every one of the 256 opcodes reads the byte at the effective address once, transforms it,
//! and writes a byte back once, even BIT, which writes back the unchanged value.  For the
//! rotate, shift, RES and SET groups, a register field other than 6 also receives a copy of the
//! result.  The dispatch is driven by a table built once from the opcode bit fields.

use femtos::Instant;
use lazy_static::lazy_static;

use gens_core::{Address, Addressable};

use crate::alu::{RotateOp, rotate_shift_flags};
use crate::flags::{FLAG_C, FLAG_H, FLAGS_XY, FLAG_TABLES};
use crate::instructions::Register;
use crate::state::{Z80Error, Z80State};

/// Cycles spent by the dispatcher for every opcode, not counting the DD/FD prefix fetch
pub const XYCB_CYCLES: u16 = 19;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum XycbOp {
    Rotate(RotateOp),
    Bit,
    Res,
    Set,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct XycbEntry {
    pub op: XycbOp,
    pub bit: u8,
    pub copy: Option<Register>,
}

impl XycbEntry {
    pub fn decode(opcode: u8) -> Self {
        let field = (opcode >> 3) & 0x07;
        let op = match opcode >> 6 {
            0 => XycbOp::Rotate(RotateOp::from_field(field)),
            1 => XycbOp::Bit,
            2 => XycbOp::Res,
            _ => XycbOp::Set,
        };

        let copy = match (op, opcode & 0x07) {
            (XycbOp::Bit, _) | (_, 6) => None,
            (_, 0) => Some(Register::B),
            (_, 1) => Some(Register::C),
            (_, 2) => Some(Register::D),
            (_, 3) => Some(Register::E),
            (_, 4) => Some(Register::H),
            (_, 5) => Some(Register::L),
            _ => Some(Register::A),
        };

        Self {
            op,
            bit: field,
            copy,
        }
    }
}

lazy_static! {
    pub static ref XYCB_TABLE: [XycbEntry; 256] = {
        let mut table = [XycbEntry::decode(0); 256];
        for (opcode, entry) in table.iter_mut().enumerate() {
            *entry = XycbEntry::decode(opcode as u8);
        }
        table
    };
}

/// Execute one XYCB opcode against the byte at `wz`, returning the cycles consumed
///
/// `wz` is the effective address (index register plus signed displacement), which has already
/// been computed by the caller.  Errors only come from the memory bus.
pub fn execute_indexed_bit_op(
    state: &mut Z80State,
    memory: &mut dyn Addressable,
    clock: Instant,
    opcode: u8,
    wz: u16,
) -> Result<u16, Z80Error> {
    let entry = XYCB_TABLE[opcode as usize];
    let src = memory.read_u8(clock, wz as Address)?;

    let flags = state.reg[Register::F as usize];
    let result = match entry.op {
        XycbOp::Rotate(rot) => {
            let (result, new_flags) = rotate_shift_flags(rot, src, flags);
            state.reg[Register::F as usize] = new_flags;
            result
        },
        XycbOp::Bit => {
            let tested = FLAG_TABLES.szxy_bit[(src & (1 << entry.bit)) as usize];
            let xy = (wz >> 8) as u8 & FLAGS_XY;
            state.reg[Register::F as usize] = (flags & FLAG_C) | FLAG_H | (tested & !FLAGS_XY) | xy;
            src
        },
        XycbOp::Res => src & !(1 << entry.bit),
        XycbOp::Set => src | (1 << entry.bit),
    };

    memory.write_u8(clock, wz as Address, result)?;
    if let Some(reg) = entry.copy {
        state.reg[reg as usize] = result;
    }

    Ok(XYCB_CYCLES)
}


#[cfg(test)]
mod tests {
    use super::*;

    use gens_core::Error;
    use crate::flags::{FLAG_N, FLAG_PV, FLAG_S, FLAG_X, FLAG_Y, FLAG_Z};

    const WZ: u16 = 0x0834;

    /// A single byte of memory that records every access made to it
    struct TracingByte {
        value: u8,
        reads: Vec<u16>,
        writes: Vec<(u16, u8)>,
    }

    impl TracingByte {
        fn new(value: u8) -> Self {
            Self {
                value,
                reads: vec![],
                writes: vec![],
            }
        }
    }

    impl Addressable for TracingByte {
        fn size(&self) -> usize {
            0x10000
        }

        fn read(&mut self, _clock: Instant, addr: Address, data: &mut [u8]) -> Result<(), Error> {
            self.reads.push(addr as u16);
            data.fill(self.value);
            Ok(())
        }

        fn write(&mut self, _clock: Instant, addr: Address, data: &[u8]) -> Result<(), Error> {
            self.writes.push((addr as u16, data[0]));
            self.value = data[0];
            Ok(())
        }
    }

    fn run(state: &mut Z80State, src: u8, opcode: u8) -> (TracingByte, u16) {
        let mut memory = TracingByte::new(src);
        let cycles = execute_indexed_bit_op(state, &mut memory, Instant::START, opcode, WZ).unwrap();
        (memory, cycles)
    }

    fn opcode(group: u8, field: u8, reg: u8) -> u8 {
        (group << 6) | (field << 3) | reg
    }

    #[test]
    fn rlc_into_b() {
        let mut state = Z80State::default();
        let (memory, _) = run(&mut state, 0x80, 0x00);
        assert_eq!(memory.value, 0x01);
        assert_eq!(state.reg[Register::B as usize], 0x01);
        assert_eq!(state.reg[Register::F as usize] & FLAG_C, FLAG_C);
    }

    #[test]
    fn srl_memory_only() {
        let mut state = Z80State::default();
        state.reg = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x00];
        let before = state.reg;

        let (memory, _) = run(&mut state, 0x01, 0x3E);
        assert_eq!(memory.value, 0x00);
        let flags = state.reg[Register::F as usize];
        assert_eq!(flags & (FLAG_C | FLAG_Z), FLAG_C | FLAG_Z);
        assert_eq!(state.reg[..7], before[..7]);
    }

    #[test]
    fn bit_tests_on_alternating_pattern() {
        let mut state = Z80State::default();
        run(&mut state, 0x55, 0x46);
        assert_eq!(state.reg[Register::F as usize] & FLAG_Z, 0);

        run(&mut state, 0x55, 0x4E);
        assert_eq!(state.reg[Register::F as usize] & FLAG_Z, FLAG_Z);
    }

    #[test]
    fn bit_zero_flag_for_all_bits() {
        for bit in 0..8 {
            for src in [0x00u8, 0xFF, 0x55, 0xAA, 1 << bit] {
                let mut state = Z80State::default();
                run(&mut state, src, opcode(1, bit, 6));
                let zero = state.reg[Register::F as usize] & FLAG_Z != 0;
                assert_eq!(zero, src & (1 << bit) == 0, "bit {} of {:#04x}", bit, src);
            }
        }
    }

    #[test]
    fn bit_flags_come_from_wz_and_preserve_carry() {
        let mut state = Z80State::default();
        state.reg[Register::F as usize] = FLAG_C | FLAG_N;

        // WZ high byte 0x08 has bit 3 set (Y) and bit 5 clear (X)
        run(&mut state, 0x80, opcode(1, 7, 6));
        assert_eq!(state.reg[Register::F as usize], FLAG_S | FLAG_H | FLAG_Y | FLAG_C);

        state.reg[Register::F as usize] = 0;
        run(&mut state, 0x28, opcode(1, 0, 6));
        assert_eq!(state.reg[Register::F as usize], FLAG_Z | FLAG_PV | FLAG_H | FLAG_Y);
        assert_eq!(state.reg[Register::F as usize] & FLAG_X, 0);
    }

    #[test]
    fn bit_writes_back_unchanged_and_never_copies() {
        for register_field in 0..8 {
            let mut state = Z80State::default();
            let before = state.reg;
            let (memory, _) = run(&mut state, 0xA5, opcode(1, 2, register_field));
            assert_eq!(memory.writes, vec![(WZ, 0xA5)]);
            assert_eq!(state.reg[..7], before[..7]);
        }
    }

    #[test]
    fn every_opcode_reads_and_writes_once() {
        for op in 0..=255u8 {
            let mut state = Z80State::default();
            let (memory, cycles) = run(&mut state, 0x3C, op);
            assert_eq!(memory.reads, vec![WZ], "opcode {:#04x}", op);
            assert_eq!(memory.writes.len(), 1, "opcode {:#04x}", op);
            assert_eq!(memory.writes[0].0, WZ);
            assert_eq!(cycles, XYCB_CYCLES);
        }
    }

    #[test]
    fn register_copy_receives_result() {
        let targets = [Register::B, Register::C, Register::D, Register::E, Register::H, Register::L];
        for (field, reg) in targets.iter().enumerate() {
            let mut state = Z80State::default();
            let (memory, _) = run(&mut state, 0x00, opcode(3, 4, field as u8));
            assert_eq!(memory.value, 0x10);
            assert_eq!(state.reg[*reg as usize], 0x10);
        }

        let mut state = Z80State::default();
        run(&mut state, 0xFF, opcode(2, 0, 7));
        assert_eq!(state.reg[Register::A as usize], 0xFE);
    }

    #[test]
    fn res_and_set_leave_flags_alone() {
        let mut state = Z80State::default();
        state.reg[Register::F as usize] = 0xD7;
        run(&mut state, 0x00, opcode(3, 0, 6));
        run(&mut state, 0xFF, opcode(2, 0, 6));
        assert_eq!(state.reg[Register::F as usize], 0xD7);
    }

    #[test]
    fn res_then_set_restores_set_bits() {
        for bit in 0..8 {
            for src in 0..=255u8 {
                if src & (1 << bit) == 0 {
                    continue;
                }
                let mut state = Z80State::default();
                let (memory, _) = run(&mut state, src, opcode(2, bit, 6));
                let (memory, _) = run(&mut state, memory.value, opcode(3, bit, 6));
                assert_eq!(memory.value, src);
            }
        }
    }

    #[test]
    fn rlc_eight_times_is_identity() {
        for src in 0..=255u8 {
            let mut state = Z80State::default();
            let mut value = src;
            for _ in 0..8 {
                value = run(&mut state, value, 0x06).0.value;
            }
            assert_eq!(value, src);
            assert_eq!(state.reg[Register::F as usize] & FLAG_C, src & 0x01);
        }
    }

    #[test]
    fn rrc_undoes_rlc() {
        for src in 0..=255u8 {
            let mut state = Z80State::default();
            let rotated = run(&mut state, src, 0x06).0.value;
            let restored = run(&mut state, rotated, 0x0E).0.value;
            assert_eq!(restored, src);
        }
    }

    #[test]
    fn sll_sets_bit_zero() {
        for src in 0..=255u8 {
            let mut state = Z80State::default();
            let (memory, _) = run(&mut state, src, 0x36);
            assert_eq!(memory.value & 0x01, 0x01);
            assert_eq!(memory.value, (src << 1) | 0x01);
        }
    }

    #[test]
    fn rl_and_rr_shift_through_carry() {
        let mut state = Z80State::default();
        state.reg[Register::F as usize] = FLAG_C;
        let (memory, _) = run(&mut state, 0x00, 0x16);
        assert_eq!(memory.value, 0x01);
        assert_eq!(state.reg[Register::F as usize] & FLAG_C, 0);

        state.reg[Register::F as usize] = FLAG_C;
        let (memory, _) = run(&mut state, 0x01, 0x1E);
        assert_eq!(memory.value, 0x80);
        assert_eq!(state.reg[Register::F as usize], FLAG_S | FLAG_C);
    }

    #[test]
    fn table_decodes_fields() {
        assert_eq!(XYCB_TABLE[0x00], XycbEntry { op: XycbOp::Rotate(RotateOp::Rlc), bit: 0, copy: Some(Register::B) });
        assert_eq!(XYCB_TABLE[0x3E], XycbEntry { op: XycbOp::Rotate(RotateOp::Srl), bit: 7, copy: None });
        assert_eq!(XYCB_TABLE[0x7F], XycbEntry { op: XycbOp::Bit, bit: 7, copy: None });
        assert_eq!(XYCB_TABLE[0x87], XycbEntry { op: XycbOp::Res, bit: 0, copy: Some(Register::A) });
        assert_eq!(XYCB_TABLE[0xFD], XycbEntry { op: XycbOp::Set, bit: 7, copy: Some(Register::L) });
    }
}
