use core::fmt::{self, Write};
use femtos::{Duration, Frequency, Instant};

use gens_core::{Addressable, Signal, EdgeSignal, read_beu16, write_beu16};

use crate::debugger::Z80Debugger;
use crate::execute::{Z80Cycle, Z80Executor};
use crate::instructions::{InterruptMode, Register, RegisterPair};
use crate::timing::{IDLE_CYCLES, RESET_CYCLES};


/// The Genesis runs its sound CPU from the NTSC colour burst clock
pub const GENESIS_Z80_FREQUENCY: Frequency = Frequency::from_hz(3_579_545);

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Z80Type {
    Z80,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Init,
    Running,
    Halted,
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[rustfmt::skip]
pub enum Flags {
    Carry       = 0x01,
    AddSubtract = 0x02,
    Parity      = 0x04,
    /// Undocumented Y, a copy of bit 3
    F3          = 0x08,
    HalfCarry   = 0x10,
    /// Undocumented X, a copy of bit 5
    F5          = 0x20,
    Zero        = 0x40,
    Sign        = 0x80,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Z80State {
    pub status: Status,

    pub pc: u16,
    pub sp: u16,
    pub ix: u16,
    pub iy: u16,

    pub reg: [u8; 8],
    pub shadow_reg: [u8; 8],

    pub i: u8,
    pub r: u8,
    /// The internal address latch, also called MEMPTR
    pub wz: u16,

    pub iff1: bool,
    pub iff2: bool,
    pub im: InterruptMode,
    /// Set by EI so that interrupts are not accepted until after the following instruction
    pub interrupt_delay: bool,
}

impl Default for Z80State {
    fn default() -> Self {
        Self {
            status: Status::Init,

            pc: 0,
            sp: 0,
            ix: 0,
            iy: 0,

            reg: [0; 8],
            shadow_reg: [0; 8],

            i: 0,
            r: 0,
            wz: 0,

            iff1: false,
            iff2: false,
            im: InterruptMode::Mode0,
            interrupt_delay: false,
        }
    }
}

impl Z80State {
    #[inline]
    pub fn get_register(&self, reg: Register) -> u8 {
        self.reg[reg as usize]
    }

    #[inline]
    pub fn set_register(&mut self, reg: Register, value: u8) {
        self.reg[reg as usize] = value;
    }

    #[inline]
    pub fn get_flag(&self, flag: Flags) -> bool {
        self.reg[Register::F as usize] & (flag as u8) != 0
    }

    #[inline]
    pub fn set_flag(&mut self, flag: Flags, value: bool) {
        self.reg[Register::F as usize] &= !(flag as u8);
        if value {
            self.reg[Register::F as usize] |= flag as u8;
        }
    }

    pub fn get_register_pair(&self, regpair: RegisterPair) -> u16 {
        match regpair {
            RegisterPair::BC => read_beu16(&self.reg[0..2]),
            RegisterPair::DE => read_beu16(&self.reg[2..4]),
            RegisterPair::HL => read_beu16(&self.reg[4..6]),
            RegisterPair::AF => read_beu16(&self.reg[6..8]),
            RegisterPair::SP => self.sp,
            RegisterPair::IX => self.ix,
            RegisterPair::IY => self.iy,
        }
    }

    pub fn set_register_pair(&mut self, regpair: RegisterPair, value: u16) {
        match regpair {
            RegisterPair::BC => {
                write_beu16(&mut self.reg[0..2], value);
            },
            RegisterPair::DE => {
                write_beu16(&mut self.reg[2..4], value);
            },
            RegisterPair::HL => {
                write_beu16(&mut self.reg[4..6], value);
            },
            RegisterPair::AF => {
                write_beu16(&mut self.reg[6..8], value);
            },
            RegisterPair::SP => self.sp = value,
            RegisterPair::IX => self.ix = value,
            RegisterPair::IY => self.iy = value,
        }
    }

    /// Refresh register: the low 7 bits count opcode fetches and bit 7 is only set by LD R,A
    #[inline]
    pub fn increment_refresh(&mut self, count: u8) {
        self.r = (self.r & 0x80) | (self.r.wrapping_add(count) & 0x7F);
    }

    /// Put the registers into the state the CPU has after its reset line is released
    pub fn reset(&mut self) {
        *self = Self {
            status: Status::Running,
            sp: 0xFFFF,
            reg: [0xFF; 8],
            shadow_reg: [0xFF; 8],
            ..Default::default()
        };
    }
}

/// Control lines of the CPU, shared with whatever device drives them
#[derive(Clone, Debug)]
pub struct Z80Signals {
    /// Level triggered reset.  The CPU does nothing while it is asserted
    pub reset: Signal<bool>,
    /// Level triggered bus request.  The CPU does nothing while it is asserted
    pub bus_request: Signal<bool>,
    /// The maskable interrupt line (level triggered)
    pub interrupt: Signal<bool>,
    pub nmi: EdgeSignal,
    /// The byte a device places on the data bus when an interrupt is acknowledged
    pub interrupt_vector: Signal<u8>,
}

impl Default for Z80Signals {
    fn default() -> Self {
        Self {
            reset: Signal::new(false),
            bus_request: Signal::new(false),
            interrupt: Signal::new(false),
            nmi: EdgeSignal::default(),
            interrupt_vector: Signal::new(0xFF),
        }
    }
}

#[derive(Clone, Debug, thiserror::Error)]
pub enum Z80Error {
    #[error("breakpoint reached")]
    Breakpoint,
    #[error("bus error: {0}")]
    BusError(String),
    #[error("{0}")]
    Other(String),
}

impl From<gens_core::Error> for Z80Error {
    fn from(err: gens_core::Error) -> Self {
        match err {
            gens_core::Error::Breakpoint(_) => Z80Error::Breakpoint,
            gens_core::Error::Emulator(_, msg) => Z80Error::BusError(msg),
            err => Z80Error::Other(err.to_string()),
        }
    }
}


#[derive(Clone)]
pub struct Z80 {
    pub cputype: Z80Type,
    pub frequency: Frequency,
    pub state: Z80State,
    pub debugger: Z80Debugger,
    pub previous_cycle: Z80Cycle,
    pub signals: Z80Signals,
}

impl Z80 {
    pub fn new(cputype: Z80Type, frequency: Frequency) -> Self {
        Self {
            cputype,
            frequency,
            state: Z80State::default(),
            debugger: Z80Debugger::default(),
            previous_cycle: Z80Cycle::at_time(Instant::START),
            signals: Z80Signals::default(),
        }
    }

    pub fn from_type(cputype: Z80Type, frequency: Frequency) -> Self {
        match cputype {
            Z80Type::Z80 => Self::new(cputype, frequency),
        }
    }

    /// Return to the power-on state.  The reset sequence itself runs on the next step
    pub fn reset(&mut self) {
        self.state = Z80State::default();
        self.debugger.skip_breakpoint = 0;
    }

    pub fn add_breakpoint(&mut self, addr: u16) {
        self.debugger.breakpoints.push(addr);
    }

    pub fn remove_breakpoint(&mut self, addr: u16) {
        self.debugger.breakpoints.retain(|breakpoint| *breakpoint != addr);
    }

    /// Start executing at `clock`, with `memory` and `io` as the two address spaces
    pub fn begin<'a>(&'a mut self, clock: Instant, memory: &'a mut dyn Addressable, io: &'a mut dyn Addressable) -> Z80Executor<'a> {
        Z80Executor::at_time(self, clock, memory, io)
    }

    /// Run one instruction (or accept one interrupt), honouring the reset and bus request lines,
    /// and return how much emulated time it took
    pub fn step(&mut self, clock: Instant, memory: &mut dyn Addressable, io: &mut dyn Addressable) -> Result<Duration, Z80Error> {
        let cycles = if self.signals.reset.get() {
            self.reset();
            RESET_CYCLES
        } else if self.signals.bus_request.get() {
            IDLE_CYCLES
        } else {
            let mut executor = self.begin(clock, memory, io);
            executor.step_one()?
        };

        Ok(self.frequency.period_duration() * cycles as u64)
    }

    pub fn dump_state<W>(&mut self, writer: &mut W, clock: Instant, memory: &mut dyn Addressable) -> Result<(), fmt::Error>
    where
        W: Write,
    {
        writeln!(writer, "Status: {:?}", self.state.status)?;
        writeln!(writer, "PC: {:#06x}", self.state.pc)?;
        writeln!(writer, "SP: {:#06x}", self.state.sp)?;
        writeln!(writer, "IX: {:#06x}", self.state.ix)?;
        writeln!(writer, "IY: {:#06x}", self.state.iy)?;
        writeln!(writer, "WZ: {:#06x}", self.state.wz)?;

        let pairs = [(Register::A, Register::F), (Register::B, Register::C), (Register::D, Register::E), (Register::H, Register::L)];
        for (high, low) in pairs {
            writeln!(
                writer,
                "{:?}: {:#04x}    {:?}:  {:#04x}           {:?}': {:#04x}    {:?}':  {:#04x}",
                high,
                self.state.reg[high as usize],
                low,
                self.state.reg[low as usize],
                high,
                self.state.shadow_reg[high as usize],
                low,
                self.state.shadow_reg[low as usize],
            )?;
        }

        writeln!(writer, "I: {:#04x}    R:  {:#04x}", self.state.i, self.state.r)?;
        writeln!(writer, "IM: {:?}  IFF1: {:?}  IFF2: {:?}", self.state.im, self.state.iff1, self.state.iff2)?;

        let mut decoder = self.previous_cycle.decoder.clone();
        writeln!(
            writer,
            "Previous Instruction: {} {:?}",
            decoder.format_instruction_bytes(memory),
            decoder.instruction
        )?;
        match decoder.decode_at(memory, clock, self.state.pc) {
            Ok(()) => writeln!(writer, "Current Instruction: {} {:?}", decoder.format_instruction_bytes(memory), decoder.instruction)?,
            Err(err) => writeln!(writer, "Current Instruction: {}", err)?,
        }
        writeln!(writer)?;
        Ok(())
    }
}
