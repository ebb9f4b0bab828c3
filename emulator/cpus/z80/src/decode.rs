use core::fmt::{self, Write};
use femtos::Instant;

use gens_core::{Address, Addressable};

use crate::state::Z80Error;
use crate::instructions::{
    Direction, Condition, Register, RegisterPair, IndexRegister, IndexRegisterHalf, SpecialRegister, InterruptMode, Target,
    LoadTarget, Instruction,
};

/// Cycles added for every DD or FD prefix byte
const INDEX_PREFIX_CYCLES: u16 = 4;
/// Cycles added when an ED prefixed opcode has no defined meaning and acts as a two byte NOP
const ED_NOP_CYCLES: u16 = 4;

#[derive(Clone)]
pub struct Z80Decoder {
    pub clock: Instant,
    pub start: u16,
    pub end: u16,
    /// Cycles spent on prefixes, added to the instruction's own cost
    pub extra_cycles: u16,
    /// Number of opcode fetch (M1) cycles, each of which refreshes R
    pub opcode_fetches: u8,
    pub instruction: Instruction,
}

impl Default for Z80Decoder {
    fn default() -> Self {
        Self {
            clock: Instant::START,
            start: 0,
            end: 0,
            extra_cycles: 0,
            opcode_fetches: 0,
            instruction: Instruction::NOP,
        }
    }
}

impl Z80Decoder {
    pub fn decode_at(&mut self, memory: &mut dyn Addressable, clock: Instant, start: u16) -> Result<(), Z80Error> {
        self.clock = clock;
        self.start = start;
        self.end = start;
        self.extra_cycles = 0;
        self.opcode_fetches = 0;
        self.instruction = self.decode_one(memory)?;
        Ok(())
    }

    pub fn decode_one(&mut self, memory: &mut dyn Addressable) -> Result<Instruction, Z80Error> {
        let ins = self.read_opcode_byte(memory)?;
        self.decode_bare(memory, ins, None)
    }

    /// Decode an opcode in the main table.  When `index` is given, the opcode followed a DD or
    /// FD prefix and references to HL, H, L and (HL) are replaced by the index register
    pub fn decode_bare(&mut self, memory: &mut dyn Addressable, ins: u8, index: Option<IndexRegister>) -> Result<Instruction, Z80Error> {
        let (x, y, z, p, q) = (get_ins_x(ins), get_ins_y(ins), get_ins_z(ins), get_ins_p(ins), get_ins_q(ins));

        let instruction = match x {
            0 => match z {
                0 => match y {
                    0 => Instruction::NOP,
                    1 => Instruction::EXafaf,
                    2 => Instruction::DJNZ(self.read_instruction_byte(memory)? as i8),
                    3 => Instruction::JR(self.read_instruction_byte(memory)? as i8),
                    _ => Instruction::JRcc(get_condition(y - 4), self.read_instruction_byte(memory)? as i8),
                },
                1 => {
                    if q == 0 {
                        let data = self.read_instruction_word(memory)?;
                        Instruction::LD(LoadTarget::DirectRegWord(get_register_pair(p, index)), LoadTarget::ImmediateWord(data))
                    } else {
                        Instruction::ADD16(get_register_pair(2, index), get_register_pair(p, index))
                    }
                },
                2 => match (p, q) {
                    (0, 0) => Instruction::LD(LoadTarget::IndirectRegByte(RegisterPair::BC), LoadTarget::DirectRegByte(Register::A)),
                    (0, _) => Instruction::LD(LoadTarget::DirectRegByte(Register::A), LoadTarget::IndirectRegByte(RegisterPair::BC)),
                    (1, 0) => Instruction::LD(LoadTarget::IndirectRegByte(RegisterPair::DE), LoadTarget::DirectRegByte(Register::A)),
                    (1, _) => Instruction::LD(LoadTarget::DirectRegByte(Register::A), LoadTarget::IndirectRegByte(RegisterPair::DE)),
                    (2, q) => {
                        let addr = self.read_instruction_word(memory)?;
                        let regpair = LoadTarget::DirectRegWord(get_register_pair(2, index));
                        if q == 0 {
                            Instruction::LD(LoadTarget::IndirectWord(addr), regpair)
                        } else {
                            Instruction::LD(regpair, LoadTarget::IndirectWord(addr))
                        }
                    },
                    (_, q) => {
                        let addr = self.read_instruction_word(memory)?;
                        if q == 0 {
                            Instruction::LD(LoadTarget::IndirectByte(addr), LoadTarget::DirectRegByte(Register::A))
                        } else {
                            Instruction::LD(LoadTarget::DirectRegByte(Register::A), LoadTarget::IndirectByte(addr))
                        }
                    },
                },
                3 => {
                    if q == 0 {
                        Instruction::INC16(get_register_pair(p, index))
                    } else {
                        Instruction::DEC16(get_register_pair(p, index))
                    }
                },
                4 => Instruction::INC8(self.decode_operand(memory, y, index)?),
                5 => Instruction::DEC8(self.decode_operand(memory, y, index)?),
                6 => {
                    let dest = self.decode_operand(memory, y, index)?;
                    let data = self.read_instruction_byte(memory)?;
                    Instruction::LD(dest.into(), LoadTarget::ImmediateByte(data))
                },
                _ => match y {
                    0 => Instruction::RLCA,
                    1 => Instruction::RRCA,
                    2 => Instruction::RLA,
                    3 => Instruction::RRA,
                    4 => Instruction::DAA,
                    5 => Instruction::CPL,
                    6 => Instruction::SCF,
                    _ => Instruction::CCF,
                },
            },
            1 => {
                if ins == 0x76 {
                    Instruction::HALT
                } else if y == 6 || z == 6 {
                    // With a memory operand, H and L keep their meaning even after a prefix
                    let dest = self.decode_operand(memory, y, index.filter(|_| y == 6))?;
                    let src = self.decode_operand(memory, z, index.filter(|_| z == 6))?;
                    Instruction::LD(dest.into(), src.into())
                } else {
                    let dest = self.decode_operand(memory, y, index)?;
                    let src = self.decode_operand(memory, z, index)?;
                    Instruction::LD(dest.into(), src.into())
                }
            },
            2 => get_alu_instruction(y, self.decode_operand(memory, z, index)?),
            _ => match z {
                0 => Instruction::RETcc(get_condition(y)),
                1 => {
                    if q == 0 {
                        Instruction::POP(get_register_pair_alt(p, index))
                    } else {
                        match p {
                            0 => Instruction::RET,
                            1 => Instruction::EXX,
                            2 => Instruction::JPIndirect(get_register_pair(2, index)),
                            _ => Instruction::LD(
                                LoadTarget::DirectRegWord(RegisterPair::SP),
                                LoadTarget::DirectRegWord(get_register_pair(2, index)),
                            ),
                        }
                    }
                },
                2 => Instruction::JPcc(get_condition(y), self.read_instruction_word(memory)?),
                3 => match y {
                    0 => Instruction::JP(self.read_instruction_word(memory)?),
                    1 => self.decode_prefix_cb(memory)?,
                    2 => Instruction::OUTx(self.read_instruction_byte(memory)?),
                    3 => Instruction::INx(self.read_instruction_byte(memory)?),
                    4 => Instruction::EXsp(get_register_pair(2, index)),
                    5 => Instruction::EXhlde,
                    6 => Instruction::DI,
                    _ => Instruction::EI,
                },
                4 => Instruction::CALLcc(get_condition(y), self.read_instruction_word(memory)?),
                5 => {
                    if q == 0 {
                        Instruction::PUSH(get_register_pair_alt(p, index))
                    } else {
                        match p {
                            0 => Instruction::CALL(self.read_instruction_word(memory)?),
                            1 => self.decode_prefix_dd_fd(memory, IndexRegister::IX)?,
                            2 => self.decode_prefix_ed(memory)?,
                            _ => self.decode_prefix_dd_fd(memory, IndexRegister::IY)?,
                        }
                    }
                },
                6 => get_alu_instruction(y, Target::Immediate(self.read_instruction_byte(memory)?)),
                _ => Instruction::RST(y * 8),
            },
        };
        Ok(instruction)
    }

    pub fn decode_prefix_cb(&mut self, memory: &mut dyn Addressable) -> Result<Instruction, Z80Error> {
        let ins = self.read_opcode_byte(memory)?;
        let target = get_register(get_ins_z(ins));
        let instruction = match get_ins_x(ins) {
            0 => get_rot_instruction(get_ins_y(ins), target),
            1 => Instruction::BIT(get_ins_y(ins), target),
            2 => Instruction::RES(get_ins_y(ins), target),
            _ => Instruction::SET(get_ins_y(ins), target),
        };
        Ok(instruction)
    }

    pub fn decode_prefix_ed(&mut self, memory: &mut dyn Addressable) -> Result<Instruction, Z80Error> {
        let ins = self.read_opcode_byte(memory)?;
        let (y, z, p, q) = (get_ins_y(ins), get_ins_z(ins), get_ins_p(ins), get_ins_q(ins));

        let instruction = match get_ins_x(ins) {
            1 => match z {
                0 => Instruction::INc(get_register_or_none(y)),
                1 => Instruction::OUTc(get_register_or_none(y)),
                2 => {
                    if q == 0 {
                        Instruction::SBC16(RegisterPair::HL, get_register_pair(p, None))
                    } else {
                        Instruction::ADC16(RegisterPair::HL, get_register_pair(p, None))
                    }
                },
                3 => {
                    let addr = self.read_instruction_word(memory)?;
                    let regpair = get_register_pair(p, None);
                    if regpair == RegisterPair::HL {
                        // The ED encodings of LD (nn),HL and LD HL,(nn) take the long path
                        self.extra_cycles += 4;
                    }
                    if q == 0 {
                        Instruction::LD(LoadTarget::IndirectWord(addr), LoadTarget::DirectRegWord(regpair))
                    } else {
                        Instruction::LD(LoadTarget::DirectRegWord(regpair), LoadTarget::IndirectWord(addr))
                    }
                },
                4 => Instruction::NEG,
                5 => {
                    if y == 1 {
                        Instruction::RETI
                    } else {
                        Instruction::RETN
                    }
                },
                6 => match y & 0x03 {
                    0 | 1 => Instruction::IM(InterruptMode::Mode0),
                    2 => Instruction::IM(InterruptMode::Mode1),
                    _ => Instruction::IM(InterruptMode::Mode2),
                },
                _ => match y {
                    0 => Instruction::LDsr(SpecialRegister::I, Direction::FromAcc),
                    1 => Instruction::LDsr(SpecialRegister::R, Direction::FromAcc),
                    2 => Instruction::LDsr(SpecialRegister::I, Direction::ToAcc),
                    3 => Instruction::LDsr(SpecialRegister::R, Direction::ToAcc),
                    4 => Instruction::RRD,
                    5 => Instruction::RLD,
                    _ => self.undefined_ed(),
                },
            },
            2 => match ins {
                0xA0 => Instruction::LDI,
                0xA1 => Instruction::CPI,
                0xA2 => Instruction::INI,
                0xA3 => Instruction::OUTI,
                0xA8 => Instruction::LDD,
                0xA9 => Instruction::CPD,
                0xAA => Instruction::IND,
                0xAB => Instruction::OUTD,
                0xB0 => Instruction::LDIR,
                0xB1 => Instruction::CPIR,
                0xB2 => Instruction::INIR,
                0xB3 => Instruction::OTIR,
                0xB8 => Instruction::LDDR,
                0xB9 => Instruction::CPDR,
                0xBA => Instruction::INDR,
                0xBB => Instruction::OTDR,
                _ => self.undefined_ed(),
            },
            _ => self.undefined_ed(),
        };
        Ok(instruction)
    }

    fn undefined_ed(&mut self) -> Instruction {
        self.extra_cycles += ED_NOP_CYCLES;
        Instruction::NOP
    }

    pub fn decode_prefix_dd_fd(&mut self, memory: &mut dyn Addressable, index: IndexRegister) -> Result<Instruction, Z80Error> {
        self.extra_cycles += INDEX_PREFIX_CYCLES;
        let ins = self.read_opcode_byte(memory)?;

        match ins {
            0xCB => {
                // the displacement and the final opcode are ordinary reads, not opcode fetches
                let offset = self.read_instruction_byte(memory)? as i8;
                let opcode = self.read_instruction_byte(memory)?;
                Ok(Instruction::XYCB(index, offset, opcode))
            },
            // a later prefix overrides an earlier one, and ED ignores it entirely
            0xDD => self.decode_prefix_dd_fd(memory, IndexRegister::IX),
            0xFD => self.decode_prefix_dd_fd(memory, IndexRegister::IY),
            0xED => self.decode_prefix_ed(memory),
            _ => self.decode_bare(memory, ins, Some(index)),
        }
    }

    /// Decode the 3-bit register field of an opcode, substituting the index register if given
    fn decode_operand(&mut self, memory: &mut dyn Addressable, field: u8, index: Option<IndexRegister>) -> Result<Target, Z80Error> {
        let target = match (index, field) {
            (Some(index), 4) => Target::DirectRegHalf(get_index_register_half(index, 0)),
            (Some(index), 5) => Target::DirectRegHalf(get_index_register_half(index, 1)),
            (Some(index), 6) => {
                let offset = self.read_instruction_byte(memory)? as i8;
                Target::IndirectOffset(index, offset)
            },
            (_, field) => get_register(field),
        };
        Ok(target)
    }

    fn read_opcode_byte(&mut self, device: &mut dyn Addressable) -> Result<u8, Z80Error> {
        self.opcode_fetches = self.opcode_fetches.saturating_add(1);
        self.read_instruction_byte(device)
    }

    fn read_instruction_byte(&mut self, device: &mut dyn Addressable) -> Result<u8, Z80Error> {
        let byte = device.read_u8(self.clock, self.end as Address)?;
        self.end = self.end.wrapping_add(1);
        Ok(byte)
    }

    fn read_instruction_word(&mut self, device: &mut dyn Addressable) -> Result<u16, Z80Error> {
        let low = self.read_instruction_byte(device)?;
        let high = self.read_instruction_byte(device)?;
        Ok(((high as u16) << 8) | low as u16)
    }

    pub fn format_instruction_bytes(&self, memory: &mut dyn Addressable) -> String {
        let mut ins_data = String::new();
        let length = self.end.wrapping_sub(self.start);
        for offset in 0..length {
            let addr = self.start.wrapping_add(offset) as Address;
            match memory.read_u8(self.clock, addr) {
                Ok(byte) => {
                    let _ = write!(ins_data, "{:02x} ", byte);
                },
                Err(_) => ins_data.push_str("?? "),
            }
        }
        ins_data
    }

    pub fn dump_decoded<W: Write>(&self, writer: &mut W, memory: &mut dyn Addressable) -> fmt::Result {
        let ins_data = self.format_instruction_bytes(memory);
        writeln!(writer, "{:#06x}: {:<12} {:?}", self.start, ins_data, self.instruction)
    }

    /// Decode and print `count` instructions starting at `start`
    pub fn dump_disassembly<W: Write>(&mut self, writer: &mut W, memory: &mut dyn Addressable, start: u16, count: usize) -> fmt::Result {
        let mut next = start;
        for _ in 0..count {
            match self.decode_at(memory, self.clock, next) {
                Ok(()) => {
                    self.dump_decoded(writer, memory)?;
                    next = self.end;
                },
                Err(err) => {
                    return writeln!(writer, "{:#06x}: {}", next, err);
                },
            }
        }
        Ok(())
    }
}

fn get_alu_instruction(alu: u8, target: Target) -> Instruction {
    match alu {
        0 => Instruction::ADDa(target),
        1 => Instruction::ADCa(target),
        2 => Instruction::SUB(target),
        3 => Instruction::SBCa(target),
        4 => Instruction::AND(target),
        5 => Instruction::XOR(target),
        6 => Instruction::OR(target),
        7 => Instruction::CP(target),
        _ => panic!("InternalError: impossible value"),
    }
}

fn get_rot_instruction(rot: u8, target: Target) -> Instruction {
    match rot {
        0 => Instruction::RLC(target),
        1 => Instruction::RRC(target),
        2 => Instruction::RL(target),
        3 => Instruction::RR(target),
        4 => Instruction::SLA(target),
        5 => Instruction::SRA(target),
        6 => Instruction::SLL(target),
        7 => Instruction::SRL(target),
        _ => panic!("InternalError: impossible value"),
    }
}

fn get_register(reg: u8) -> Target {
    match reg {
        0 => Target::DirectReg(Register::B),
        1 => Target::DirectReg(Register::C),
        2 => Target::DirectReg(Register::D),
        3 => Target::DirectReg(Register::E),
        4 => Target::DirectReg(Register::H),
        5 => Target::DirectReg(Register::L),
        6 => Target::IndirectReg(RegisterPair::HL),
        7 => Target::DirectReg(Register::A),
        _ => panic!("InternalError: impossible value"),
    }
}

/// Register field for the ED IN/OUT (C) group, where 6 means no register
fn get_register_or_none(reg: u8) -> Option<Register> {
    match get_register(reg) {
        Target::DirectReg(reg) => Some(reg),
        _ => None,
    }
}

fn get_register_pair(reg: u8, index: Option<IndexRegister>) -> RegisterPair {
    match (reg, index) {
        (0, _) => RegisterPair::BC,
        (1, _) => RegisterPair::DE,
        (2, None) => RegisterPair::HL,
        (2, Some(index)) => index.into(),
        (3, _) => RegisterPair::SP,
        _ => panic!("InternalError: impossible value"),
    }
}

fn get_register_pair_alt(reg: u8, index: Option<IndexRegister>) -> RegisterPair {
    match reg {
        3 => RegisterPair::AF,
        _ => get_register_pair(reg, index),
    }
}

fn get_index_register_half(reg: IndexRegister, q: u8) -> IndexRegisterHalf {
    match (reg, q) {
        (IndexRegister::IX, 0) => IndexRegisterHalf::IXH,
        (IndexRegister::IX, _) => IndexRegisterHalf::IXL,
        (IndexRegister::IY, 0) => IndexRegisterHalf::IYH,
        (IndexRegister::IY, _) => IndexRegisterHalf::IYL,
    }
}

fn get_condition(cond: u8) -> Condition {
    match cond {
        0 => Condition::NotZero,
        1 => Condition::Zero,
        2 => Condition::NotCarry,
        3 => Condition::Carry,
        4 => Condition::ParityOdd,
        5 => Condition::ParityEven,
        6 => Condition::Positive,
        7 => Condition::Negative,
        _ => panic!("InternalError: impossible value"),
    }
}


/// Z80 Decode
///
/// Instructions are broken up into x, y, and z parts, or alternatively into x, p, q, and z parts
/// (see <http://www.z80.info/decoding.htm>)
/// +----------------------+
/// Bits : 7 6 5 4 3 2 1 0
///       | X |  Y  |  Z  |
///             P  Q
/// +----------------------+

fn get_ins_x(ins: u8) -> u8 {
    (ins >> 6) & 0x03
}

fn get_ins_y(ins: u8) -> u8 {
    (ins >> 3) & 0x07
}

fn get_ins_z(ins: u8) -> u8 {
    ins & 0x07
}

fn get_ins_p(ins: u8) -> u8 {
    (ins >> 4) & 0x03
}

fn get_ins_q(ins: u8) -> u8 {
    (ins >> 3) & 0x01
}
