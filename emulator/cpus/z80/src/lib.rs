//! Zilog Z80 core as used for the Sega Genesis sound coprocessor

mod alu;
mod debugger;
mod decode;
mod execute;
mod flags;
mod instructions;
mod port;
mod state;
mod timing;
mod xycb;

pub use crate::state::{Z80, Z80Type, Z80Error, Z80State, Z80Signals, Status, Flags, GENESIS_Z80_FREQUENCY};
pub use crate::debugger::Z80Debugger;
pub use crate::decode::Z80Decoder;
pub use crate::execute::{Z80Cycle, Z80Executor};
pub use crate::flags::{
    FlagTables, FLAG_TABLES, FLAG_C, FLAG_N, FLAG_PV, FLAG_Y, FLAG_H, FLAG_X, FLAG_Z, FLAG_S, FLAGS_XY, FLAGS_SZXY, szxyp,
};
pub use crate::instructions::{
    Direction, Condition, Register, RegisterPair, IndexRegister, IndexRegisterHalf, SpecialRegister, InterruptMode, Target,
    LoadTarget, Instruction,
};
pub use crate::port::Z80Port;
pub use crate::timing::{Z80InstructionCycles, NMI_CYCLES, IM0_CYCLES, IM1_CYCLES, IM2_CYCLES, RESET_CYCLES, IDLE_CYCLES};
pub use crate::xycb::{XycbEntry, XycbOp, XYCB_CYCLES, XYCB_TABLE, execute_indexed_bit_op};
pub use crate::alu::RotateOp;
