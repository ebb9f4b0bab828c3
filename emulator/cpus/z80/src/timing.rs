use crate::instructions::{Instruction, Target, LoadTarget, RegisterPair};
use crate::xycb::XYCB_CYCLES;

/// Cycles taken when an interrupt is accepted
pub const NMI_CYCLES: u16 = 11;
pub const IM0_CYCLES: u16 = 13;
pub const IM1_CYCLES: u16 = 13;
pub const IM2_CYCLES: u16 = 19;
pub const RESET_CYCLES: u16 = 3;
/// Cycles that pass while the CPU is halted or has released the bus
pub const IDLE_CYCLES: u16 = 4;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Z80InstructionCycles {
    Single(u16),
    Branch { taken: u16, not_taken: u16 },
    Repeating { repeating: u16, terminating: u16 },
}

impl Z80InstructionCycles {
    pub fn calculate_cycles(&self, took_branch: bool) -> u16 {
        match self {
            Z80InstructionCycles::Single(cycles) => *cycles,

            Z80InstructionCycles::Branch {
                taken,
                not_taken,
            } => {
                if took_branch {
                    *taken
                } else {
                    *not_taken
                }
            },

            Z80InstructionCycles::Repeating {
                repeating,
                terminating,
            } => {
                if took_branch {
                    *repeating
                } else {
                    *terminating
                }
            },
        }
    }

    /// The cost of an instruction in T-states.  `extra` is the prefix overhead counted by the
    /// decoder.  Costs given here for IX/IY forms exclude the DD/FD prefix, so most of them are
    /// the same as the HL form
    pub fn from_instruction(instruction: &Instruction, extra: u16) -> Z80InstructionCycles {
        let cycles = match instruction {
            Instruction::ADCa(target)
            | Instruction::ADDa(target)
            | Instruction::AND(target)
            | Instruction::CP(target)
            | Instruction::SBCa(target)
            | Instruction::SUB(target)
            | Instruction::OR(target)
            | Instruction::XOR(target) => match target {
                Target::DirectReg(_) | Target::DirectRegHalf(_) => 4,
                Target::IndirectReg(_) | Target::Immediate(_) => 7,
                Target::IndirectOffset(_, _) => 15,
            },

            Instruction::ADC16(_, _) | Instruction::SBC16(_, _) => 15,
            Instruction::ADD16(_, _) => 11,

            Instruction::BIT(_, target) => match target {
                Target::IndirectReg(_) | Target::IndirectOffset(_, _) => 12,
                _ => 8,
            },

            Instruction::CALL(_) => 17,
            Instruction::CALLcc(_, _) => {
                return Z80InstructionCycles::Branch {
                    taken: 17 + extra,
                    not_taken: 10 + extra,
                };
            },

            Instruction::CCF | Instruction::SCF | Instruction::CPL | Instruction::DAA => 4,

            Instruction::CPD
            | Instruction::CPI
            | Instruction::IND
            | Instruction::INI
            | Instruction::LDD
            | Instruction::LDI
            | Instruction::OUTD
            | Instruction::OUTI => 16,

            Instruction::CPDR
            | Instruction::CPIR
            | Instruction::INDR
            | Instruction::INIR
            | Instruction::LDDR
            | Instruction::LDIR
            | Instruction::OTDR
            | Instruction::OTIR => {
                return Z80InstructionCycles::Repeating {
                    repeating: 21 + extra,
                    terminating: 16 + extra,
                };
            },

            Instruction::DEC8(target) | Instruction::INC8(target) => match target {
                Target::IndirectReg(_) => 11,
                Target::IndirectOffset(_, _) => 19,
                _ => 4,
            },

            Instruction::DEC16(_) | Instruction::INC16(_) => 6,

            Instruction::DI | Instruction::EI => 4,

            Instruction::DJNZ(_) => {
                return Z80InstructionCycles::Branch {
                    taken: 13 + extra,
                    not_taken: 8 + extra,
                };
            },

            Instruction::EXX | Instruction::EXafaf | Instruction::EXhlde => 4,
            Instruction::EXsp(_) => 19,

            Instruction::HALT => 4,
            Instruction::IM(_) => 8,

            Instruction::INc(_) | Instruction::OUTc(_) => 12,
            Instruction::INx(_) | Instruction::OUTx(_) => 11,

            Instruction::JP(_) | Instruction::JPcc(_, _) => 10,
            Instruction::JPIndirect(_) => 4,
            Instruction::JR(_) => 12,
            Instruction::JRcc(_, _) => {
                return Z80InstructionCycles::Branch {
                    taken: 12 + extra,
                    not_taken: 7 + extra,
                };
            },

            Instruction::LD(dest, src) => match (dest, src) {
                // 8-Bit Operations
                (LoadTarget::IndirectOffsetByte(_, _), _) | (_, LoadTarget::IndirectOffsetByte(_, _)) => 15,
                (LoadTarget::IndirectRegByte(_), LoadTarget::ImmediateByte(_)) => 10,
                (_, LoadTarget::ImmediateByte(_)) => 7,
                (LoadTarget::IndirectRegByte(_), _) | (_, LoadTarget::IndirectRegByte(_)) => 7,
                (LoadTarget::IndirectByte(_), _) | (_, LoadTarget::IndirectByte(_)) => 13,

                // 16-Bit Operations
                (LoadTarget::DirectRegWord(_), LoadTarget::ImmediateWord(_)) => 10,
                (LoadTarget::DirectRegWord(RegisterPair::SP), LoadTarget::DirectRegWord(_)) => 6,
                (LoadTarget::IndirectWord(_), LoadTarget::DirectRegWord(regpair))
                | (LoadTarget::DirectRegWord(regpair), LoadTarget::IndirectWord(_)) => {
                    if regpair.is_hl_or_index() {
                        16
                    } else {
                        20
                    }
                },

                // register to register, including the index register halves
                _ => 4,
            },

            Instruction::LDsr(_, _) => 9,

            Instruction::NEG => 8,
            Instruction::NOP => 4,

            Instruction::POP(_) => 10,
            Instruction::PUSH(_) => 11,

            Instruction::RES(_, target)
            | Instruction::SET(_, target)
            | Instruction::RL(target)
            | Instruction::RLC(target)
            | Instruction::RR(target)
            | Instruction::RRC(target)
            | Instruction::SLA(target)
            | Instruction::SLL(target)
            | Instruction::SRA(target)
            | Instruction::SRL(target) => match target {
                Target::IndirectReg(_) | Target::IndirectOffset(_, _) => 15,
                _ => 8,
            },

            Instruction::RET => 10,
            Instruction::RETI | Instruction::RETN => 14,
            Instruction::RETcc(_) => {
                return Z80InstructionCycles::Branch {
                    taken: 11 + extra,
                    not_taken: 5 + extra,
                };
            },

            Instruction::RLA | Instruction::RLCA | Instruction::RRA | Instruction::RRCA => 4,
            Instruction::RLD | Instruction::RRD => 18,
            Instruction::RST(_) => 11,

            Instruction::XYCB(_, _, _) => XYCB_CYCLES,
        };
        Z80InstructionCycles::Single(cycles + extra)
    }
}

impl RegisterPair {
    pub(crate) fn is_hl_or_index(&self) -> bool {
        matches!(self, RegisterPair::HL | RegisterPair::IX | RegisterPair::IY)
    }
}
