use femtos::Instant;

use gens_core::Addressable;

use crate::alu::{self, RotateOp};
use crate::debugger::Z80Debugger;
use crate::decode::Z80Decoder;
use crate::flags::{FLAG_C, FLAG_H, FLAG_N, FLAG_PV, FLAG_S, FLAG_X, FLAG_Y, FLAG_Z, FLAGS_XY, FLAG_TABLES, parity_of, szxy_of, szxyp};
use crate::instructions::{
    Condition, Direction, IndexRegister, IndexRegisterHalf, Instruction, InterruptMode, LoadTarget, Register, RegisterPair,
    SpecialRegister, Target,
};
use crate::port::Z80Port;
use crate::state::{Status, Z80, Z80Error, Z80Signals, Z80State};
use crate::timing::{Z80InstructionCycles, IDLE_CYCLES, IM0_CYCLES, IM1_CYCLES, IM2_CYCLES, NMI_CYCLES, RESET_CYCLES};
use crate::xycb::execute_indexed_bit_op;

const NMI_VECTOR: u16 = 0x0066;
const IM1_VECTOR: u16 = 0x0038;

/// The record of the last instruction the CPU executed
#[derive(Clone)]
pub struct Z80Cycle {
    pub clock: Instant,
    pub decoder: Z80Decoder,
    pub took_branch: bool,
}

impl Z80Cycle {
    pub fn at_time(clock: Instant) -> Self {
        Self {
            clock,
            decoder: Default::default(),
            took_branch: false,
        }
    }
}

enum Step {
    Next,
    Repeat,
}

/// Borrows the CPU and its buses for the duration of one step
pub struct Z80Executor<'a> {
    pub state: &'a mut Z80State,
    pub debugger: &'a mut Z80Debugger,
    pub signals: &'a mut Z80Signals,
    previous_cycle: &'a mut Z80Cycle,
    port: Z80Port<'a>,
    cycle: Z80Cycle,
}

impl<'a> Z80Executor<'a> {
    pub fn at_time(cpu: &'a mut Z80, clock: Instant, memory: &'a mut dyn Addressable, io: &'a mut dyn Addressable) -> Self {
        let Z80 {
            state,
            debugger,
            signals,
            previous_cycle,
            ..
        } = cpu;

        Self {
            state,
            debugger,
            signals,
            previous_cycle,
            port: Z80Port::new(memory, io),
            cycle: Z80Cycle::at_time(clock),
        }
    }

    /// Execute one instruction, or accept one interrupt, and return the number of cycles used
    pub fn step_one(&mut self) -> Result<u16, Z80Error> {
        let cycles = match self.state.status {
            Status::Init => self.init(),
            Status::Running | Status::Halted => match self.check_interrupts()? {
                Some(cycles) => cycles,
                None if self.state.status == Status::Halted => {
                    // the halted CPU keeps fetching NOPs, which still refresh memory
                    self.state.increment_refresh(1);
                    IDLE_CYCLES
                },
                None => self.cycle_one()?,
            },
        };
        Ok(cycles)
    }

    fn init(&mut self) -> u16 {
        self.state.reset();
        RESET_CYCLES
    }

    fn check_interrupts(&mut self) -> Result<Option<u16>, Z80Error> {
        if self.signals.nmi.get() {
            log::trace!("accepting nmi at {:#06x}", self.state.pc);
            self.leave_halt();
            self.state.iff2 = self.state.iff1;
            self.state.iff1 = false;
            self.push_word(self.state.pc)?;
            self.jump_to(NMI_VECTOR);
            return Ok(Some(NMI_CYCLES));
        }

        if !self.signals.interrupt.get() || !self.state.iff1 || self.state.interrupt_delay {
            return Ok(None);
        }

        log::trace!("accepting interrupt in {:?} at {:#06x}", self.state.im, self.state.pc);
        self.leave_halt();
        self.state.iff1 = false;
        self.state.iff2 = false;
        self.push_word(self.state.pc)?;

        let vector = self.signals.interrupt_vector.get();
        let cycles = match self.state.im {
            InterruptMode::Mode0 => {
                // only the RST instructions are supported as the opcode on the data bus
                let addr = if vector & 0xC7 == 0xC7 {
                    (vector & 0x38) as u16
                } else {
                    log::warn!("z80: unsupported opcode {:#04x} on the data bus in interrupt mode 0, using RST 38h", vector);
                    IM1_VECTOR
                };
                self.jump_to(addr);
                IM0_CYCLES
            },
            InterruptMode::Mode1 => {
                self.jump_to(IM1_VECTOR);
                IM1_CYCLES
            },
            InterruptMode::Mode2 => {
                let table_addr = ((self.state.i as u16) << 8) | vector as u16;
                let addr = self.read_word(table_addr)?;
                self.jump_to(addr);
                IM2_CYCLES
            },
        };
        Ok(Some(cycles))
    }

    fn leave_halt(&mut self) {
        self.state.status = Status::Running;
        self.state.increment_refresh(1);
    }

    fn cycle_one(&mut self) -> Result<u16, Z80Error> {
        self.debugger.check_breakpoints(self.state.pc)?;
        self.state.interrupt_delay = false;

        self.cycle.decoder.decode_at(self.port.memory, self.cycle.clock, self.state.pc)?;
        self.state.increment_refresh(self.cycle.decoder.opcode_fetches);
        self.state.pc = self.cycle.decoder.end;
        self.cycle.took_branch = false;

        if log::log_enabled!(log::Level::Trace) {
            log::trace!("{:#06x}: {:?}", self.cycle.decoder.start, self.cycle.decoder.instruction);
        }

        let instruction = self.cycle.decoder.instruction.clone();
        let extra = self.cycle.decoder.extra_cycles;
        let cycles = match self.execute_instruction(&instruction)? {
            Some(cycles) => cycles + extra,
            None => Z80InstructionCycles::from_instruction(&instruction, extra).calculate_cycles(self.cycle.took_branch),
        };

        *self.previous_cycle = self.cycle.clone();
        Ok(cycles)
    }

    /// Perform the instruction.  Returns the cycle count only for instructions that report their
    /// own timing, otherwise the timing table is used
    fn execute_instruction(&mut self, instruction: &Instruction) -> Result<Option<u16>, Z80Error> {
        match *instruction {
            Instruction::ADCa(target) => {
                let src = self.get_target_value(target)?;
                self.arithmetic(alu::add8, src, true);
            },
            Instruction::ADC16(dest_pair, src_pair) => {
                let dest = self.get_register_pair_value(dest_pair);
                let src = self.get_register_pair_value(src_pair);
                let (result, flags) = alu::adc16(dest, src, self.carry());
                self.state.wz = dest.wrapping_add(1);
                self.set_register_pair_value(dest_pair, result);
                self.set_flags_byte(flags);
            },
            Instruction::ADDa(target) => {
                let src = self.get_target_value(target)?;
                self.arithmetic(alu::add8, src, false);
            },
            Instruction::ADD16(dest_pair, src_pair) => {
                let dest = self.get_register_pair_value(dest_pair);
                let src = self.get_register_pair_value(src_pair);
                let (result, flags) = alu::add16(dest, src, self.flags_byte());
                self.state.wz = dest.wrapping_add(1);
                self.set_register_pair_value(dest_pair, result);
                self.set_flags_byte(flags);
            },
            Instruction::AND(target) => {
                let src = self.get_target_value(target)?;
                self.logic(alu::and8, src);
            },
            Instruction::BIT(bit, target) => {
                let value = self.get_target_value(target)?;
                let tested = FLAG_TABLES.szxy_bit[(value & (1 << bit)) as usize];
                let xy = match target {
                    Target::DirectReg(_) | Target::DirectRegHalf(_) => value & FLAGS_XY,
                    _ => (self.state.wz >> 8) as u8 & FLAGS_XY,
                };
                let flags = (self.flags_byte() & FLAG_C) | FLAG_H | (tested & !FLAGS_XY) | xy;
                self.set_flags_byte(flags);
            },
            Instruction::CALL(addr) => {
                self.push_word(self.state.pc)?;
                self.jump_to(addr);
            },
            Instruction::CALLcc(cond, addr) => {
                self.state.wz = addr;
                if self.get_current_condition(cond) {
                    self.push_word(self.state.pc)?;
                    self.jump_to(addr);
                    self.cycle.took_branch = true;
                }
            },
            Instruction::CCF => {
                let flags = self.flags_byte();
                let half = if flags & FLAG_C != 0 { FLAG_H } else { 0 };
                let new_flags = (flags & (FLAG_S | FLAG_Z | FLAG_PV)) | half | ((flags & FLAG_C) ^ FLAG_C) | (self.accumulator() & FLAGS_XY);
                self.set_flags_byte(new_flags);
            },
            Instruction::CP(target) => {
                let src = self.get_target_value(target)?;
                self.set_flags_byte(alu::cp8(self.accumulator(), src));
            },
            Instruction::CPI => {
                self.compare_block(1)?;
            },
            Instruction::CPIR => {
                if let Step::Repeat = self.compare_block(1)? {
                    self.repeat_block();
                }
            },
            Instruction::CPD => {
                self.compare_block(-1)?;
            },
            Instruction::CPDR => {
                if let Step::Repeat = self.compare_block(-1)? {
                    self.repeat_block();
                }
            },
            Instruction::CPL => {
                let result = !self.accumulator();
                self.set_accumulator(result);
                let flags = (self.flags_byte() & (FLAG_S | FLAG_Z | FLAG_PV | FLAG_C)) | FLAG_H | FLAG_N | (result & FLAGS_XY);
                self.set_flags_byte(flags);
            },
            Instruction::DAA => {
                let (result, flags) = alu::daa(self.accumulator(), self.flags_byte());
                self.set_accumulator(result);
                self.set_flags_byte(flags);
            },
            Instruction::DEC16(regpair) => {
                let value = self.get_register_pair_value(regpair);
                self.set_register_pair_value(regpair, value.wrapping_sub(1));
            },
            Instruction::DEC8(target) => {
                let value = self.get_target_value(target)?;
                let (result, flags) = alu::dec8(value, self.flags_byte());
                self.set_target_value(target, result)?;
                self.set_flags_byte(flags);
            },
            Instruction::DI => {
                self.state.iff1 = false;
                self.state.iff2 = false;
            },
            Instruction::DJNZ(offset) => {
                let result = self.state.get_register(Register::B).wrapping_sub(1);
                self.state.set_register(Register::B, result);
                if result != 0 {
                    self.jump_relative(offset);
                    self.cycle.took_branch = true;
                }
            },
            Instruction::EI => {
                self.state.iff1 = true;
                self.state.iff2 = true;
                self.state.interrupt_delay = true;
            },
            Instruction::EXX => {
                for i in 0..6 {
                    std::mem::swap(&mut self.state.reg[i], &mut self.state.shadow_reg[i]);
                }
            },
            Instruction::EXafaf => {
                for i in 6..8 {
                    std::mem::swap(&mut self.state.reg[i], &mut self.state.shadow_reg[i]);
                }
            },
            Instruction::EXhlde => {
                let (hl, de) = (self.get_register_pair_value(RegisterPair::HL), self.get_register_pair_value(RegisterPair::DE));
                self.set_register_pair_value(RegisterPair::DE, hl);
                self.set_register_pair_value(RegisterPair::HL, de);
            },
            Instruction::EXsp(regpair) => {
                let reg_value = self.get_register_pair_value(regpair);
                let sp_value = self.read_word(self.state.sp)?;
                self.write_word(self.state.sp, reg_value)?;
                self.set_register_pair_value(regpair, sp_value);
                self.state.wz = sp_value;
            },
            Instruction::HALT => {
                self.state.status = Status::Halted;
            },
            Instruction::IM(mode) => {
                self.state.im = mode;
            },
            Instruction::INC16(regpair) => {
                let value = self.get_register_pair_value(regpair);
                self.set_register_pair_value(regpair, value.wrapping_add(1));
            },
            Instruction::INC8(target) => {
                let value = self.get_target_value(target)?;
                let (result, flags) = alu::inc8(value, self.flags_byte());
                self.set_target_value(target, result)?;
                self.set_flags_byte(flags);
            },
            Instruction::IND => {
                self.input_block(-1)?;
            },
            Instruction::INDR => {
                if let Step::Repeat = self.input_block(-1)? {
                    self.repeat_block();
                }
            },
            Instruction::INI => {
                self.input_block(1)?;
            },
            Instruction::INIR => {
                if let Step::Repeat = self.input_block(1)? {
                    self.repeat_block();
                }
            },
            Instruction::INc(opt_reg) => {
                let bc = self.get_register_pair_value(RegisterPair::BC);
                let value = self.read_port(bc)?;
                self.state.wz = bc.wrapping_add(1);
                if let Some(reg) = opt_reg {
                    self.state.set_register(reg, value);
                }
                self.set_flags_byte(szxyp(value) | (self.flags_byte() & FLAG_C));
            },
            Instruction::INx(n) => {
                let port = ((self.accumulator() as u16) << 8) | n as u16;
                let value = self.read_port(port)?;
                self.state.wz = port.wrapping_add(1);
                self.set_accumulator(value);
            },
            Instruction::JP(addr) => {
                self.jump_to(addr);
            },
            Instruction::JPIndirect(regpair) => {
                self.state.pc = self.get_register_pair_value(regpair);
            },
            Instruction::JPcc(cond, addr) => {
                self.state.wz = addr;
                if self.get_current_condition(cond) {
                    self.state.pc = addr;
                }
            },
            Instruction::JR(offset) => {
                self.jump_relative(offset);
            },
            Instruction::JRcc(cond, offset) => {
                if self.get_current_condition(cond) {
                    self.jump_relative(offset);
                    self.cycle.took_branch = true;
                }
            },
            Instruction::LD(dest, src) => {
                let src_value = self.get_load_target_value(src)?;
                self.set_load_target_value(dest, src_value)?;
                self.update_load_memptr(dest, src);
            },
            Instruction::LDsr(special_reg, dir) => match (special_reg, dir) {
                (SpecialRegister::I, Direction::FromAcc) => {
                    self.state.i = self.accumulator();
                },
                (SpecialRegister::R, Direction::FromAcc) => {
                    self.state.r = self.accumulator();
                },
                (SpecialRegister::I, Direction::ToAcc) => {
                    self.load_special_to_accumulator(self.state.i);
                },
                (SpecialRegister::R, Direction::ToAcc) => {
                    self.load_special_to_accumulator(self.state.r);
                },
            },
            Instruction::LDD => {
                self.transfer_block(-1)?;
            },
            Instruction::LDDR => {
                if let Step::Repeat = self.transfer_block(-1)? {
                    self.repeat_block();
                }
            },
            Instruction::LDI => {
                self.transfer_block(1)?;
            },
            Instruction::LDIR => {
                if let Step::Repeat = self.transfer_block(1)? {
                    self.repeat_block();
                }
            },
            Instruction::NEG => {
                let (result, flags) = alu::sub8(0, self.accumulator(), false);
                self.set_accumulator(result);
                self.set_flags_byte(flags);
            },
            Instruction::NOP => {},
            Instruction::OR(target) => {
                let src = self.get_target_value(target)?;
                self.logic(alu::or8, src);
            },
            Instruction::OTDR => {
                if let Step::Repeat = self.output_block(-1)? {
                    self.repeat_block();
                }
            },
            Instruction::OTIR => {
                if let Step::Repeat = self.output_block(1)? {
                    self.repeat_block();
                }
            },
            Instruction::OUTD => {
                self.output_block(-1)?;
            },
            Instruction::OUTI => {
                self.output_block(1)?;
            },
            Instruction::OUTc(opt_reg) => {
                let bc = self.get_register_pair_value(RegisterPair::BC);
                let value = opt_reg.map(|reg| self.state.get_register(reg)).unwrap_or(0);
                self.write_port(bc, value)?;
                self.state.wz = bc.wrapping_add(1);
            },
            Instruction::OUTx(n) => {
                let acc = self.accumulator();
                let port = ((acc as u16) << 8) | n as u16;
                self.write_port(port, acc)?;
                self.state.wz = ((acc as u16) << 8) | n.wrapping_add(1) as u16;
            },
            Instruction::POP(regpair) => {
                let value = self.pop_word()?;
                self.set_register_pair_value(regpair, value);
            },
            Instruction::PUSH(regpair) => {
                let value = self.get_register_pair_value(regpair);
                self.push_word(value)?;
            },
            Instruction::RES(bit, target) => {
                let value = self.get_target_value(target)?;
                self.set_target_value(target, value & !(1 << bit))?;
            },
            Instruction::RET => {
                let addr = self.pop_word()?;
                self.jump_to(addr);
            },
            Instruction::RETI | Instruction::RETN => {
                let addr = self.pop_word()?;
                self.jump_to(addr);
                self.state.iff1 = self.state.iff2;
            },
            Instruction::RETcc(cond) => {
                if self.get_current_condition(cond) {
                    let addr = self.pop_word()?;
                    self.jump_to(addr);
                    self.cycle.took_branch = true;
                }
            },
            Instruction::RL(target) => self.rotate_target(RotateOp::Rl, target)?,
            Instruction::RLC(target) => self.rotate_target(RotateOp::Rlc, target)?,
            Instruction::RR(target) => self.rotate_target(RotateOp::Rr, target)?,
            Instruction::RRC(target) => self.rotate_target(RotateOp::Rrc, target)?,
            Instruction::SLA(target) => self.rotate_target(RotateOp::Sla, target)?,
            Instruction::SLL(target) => self.rotate_target(RotateOp::Sll, target)?,
            Instruction::SRA(target) => self.rotate_target(RotateOp::Sra, target)?,
            Instruction::SRL(target) => self.rotate_target(RotateOp::Srl, target)?,
            Instruction::RLA => self.rotate_accumulator(RotateOp::Rl),
            Instruction::RLCA => self.rotate_accumulator(RotateOp::Rlc),
            Instruction::RRA => self.rotate_accumulator(RotateOp::Rr),
            Instruction::RRCA => self.rotate_accumulator(RotateOp::Rrc),
            Instruction::RLD => {
                let hl = self.get_register_pair_value(RegisterPair::HL);
                let value = self.read_byte(hl)?;
                let acc = self.accumulator();
                self.write_byte(hl, (value << 4) | (acc & 0x0F))?;
                self.set_rotated_digits(hl, (acc & 0xF0) | (value >> 4));
            },
            Instruction::RRD => {
                let hl = self.get_register_pair_value(RegisterPair::HL);
                let value = self.read_byte(hl)?;
                let acc = self.accumulator();
                self.write_byte(hl, (acc << 4) | (value >> 4))?;
                self.set_rotated_digits(hl, (acc & 0xF0) | (value & 0x0F));
            },
            Instruction::RST(addr) => {
                self.push_word(self.state.pc)?;
                self.jump_to(addr as u16);
            },
            Instruction::SBCa(target) => {
                let src = self.get_target_value(target)?;
                self.arithmetic(alu::sub8, src, true);
            },
            Instruction::SBC16(dest_pair, src_pair) => {
                let dest = self.get_register_pair_value(dest_pair);
                let src = self.get_register_pair_value(src_pair);
                let (result, flags) = alu::sbc16(dest, src, self.carry());
                self.state.wz = dest.wrapping_add(1);
                self.set_register_pair_value(dest_pair, result);
                self.set_flags_byte(flags);
            },
            Instruction::SCF => {
                let flags = (self.flags_byte() & (FLAG_S | FLAG_Z | FLAG_PV)) | FLAG_C | (self.accumulator() & FLAGS_XY);
                self.set_flags_byte(flags);
            },
            Instruction::SET(bit, target) => {
                let value = self.get_target_value(target)?;
                self.set_target_value(target, value | (1 << bit))?;
            },
            Instruction::SUB(target) => {
                let src = self.get_target_value(target)?;
                self.arithmetic(alu::sub8, src, false);
            },
            Instruction::XOR(target) => {
                let src = self.get_target_value(target)?;
                self.logic(alu::xor8, src);
            },
            Instruction::XYCB(index, offset, opcode) => {
                let wz = self.get_index_register_value(index).wrapping_add_signed(offset as i16);
                self.state.wz = wz;
                let cycles = execute_indexed_bit_op(self.state, self.port.memory, self.cycle.clock, opcode, wz)?;
                return Ok(Some(cycles));
            },
        }

        Ok(None)
    }

    fn arithmetic(&mut self, op: fn(u8, u8, bool) -> (u8, u8), src: u8, use_carry: bool) {
        let carry = use_carry && self.carry();
        let (result, flags) = op(self.accumulator(), src, carry);
        self.set_accumulator(result);
        self.set_flags_byte(flags);
    }

    fn logic(&mut self, op: fn(u8, u8) -> (u8, u8), src: u8) {
        let (result, flags) = op(self.accumulator(), src);
        self.set_accumulator(result);
        self.set_flags_byte(flags);
    }

    fn rotate_target(&mut self, op: RotateOp, target: Target) -> Result<(), Z80Error> {
        let value = self.get_target_value(target)?;
        let (result, flags) = alu::rotate_shift_flags(op, value, self.flags_byte());
        self.set_target_value(target, result)?;
        self.set_flags_byte(flags);
        Ok(())
    }

    fn rotate_accumulator(&mut self, op: RotateOp) {
        let (result, flags) = alu::rotate_accumulator(op, self.accumulator(), self.flags_byte());
        self.set_accumulator(result);
        self.set_flags_byte(flags);
    }

    fn set_rotated_digits(&mut self, hl: u16, acc: u8) {
        self.set_accumulator(acc);
        self.set_flags_byte(szxyp(acc) | (self.flags_byte() & FLAG_C));
        self.state.wz = hl.wrapping_add(1);
    }

    fn load_special_to_accumulator(&mut self, value: u8) {
        self.set_accumulator(value);
        let parity = if self.state.iff2 { FLAG_PV } else { 0 };
        self.set_flags_byte((self.flags_byte() & FLAG_C) | szxy_of(value) | parity);
    }

    /// LDI and LDD, returning whether the repeating form should go around again
    fn transfer_block(&mut self, step: i16) -> Result<Step, Z80Error> {
        let hl = self.get_register_pair_value(RegisterPair::HL);
        let de = self.get_register_pair_value(RegisterPair::DE);
        let value = self.read_byte(hl)?;
        self.write_byte(de, value)?;

        self.set_register_pair_value(RegisterPair::HL, hl.wrapping_add_signed(step));
        self.set_register_pair_value(RegisterPair::DE, de.wrapping_add_signed(step));
        let bc = self.decrement_bc();

        let n = value.wrapping_add(self.accumulator());
        let mut flags = (self.flags_byte() & (FLAG_S | FLAG_Z | FLAG_C)) | (n & FLAG_Y) | ((n << 4) & FLAG_X);
        if bc != 0 {
            flags |= FLAG_PV;
        }
        self.set_flags_byte(flags);

        Ok(if bc != 0 { Step::Repeat } else { Step::Next })
    }

    /// CPI and CPD
    fn compare_block(&mut self, step: i16) -> Result<Step, Z80Error> {
        let hl = self.get_register_pair_value(RegisterPair::HL);
        let value = self.read_byte(hl)?;
        let acc = self.accumulator();
        let result = acc.wrapping_sub(value);
        let half = (acc ^ value ^ result) & FLAG_H;

        self.set_register_pair_value(RegisterPair::HL, hl.wrapping_add_signed(step));
        self.state.wz = self.state.wz.wrapping_add_signed(step);
        let bc = self.decrement_bc();

        let n = result.wrapping_sub(if half != 0 { 1 } else { 0 });
        let mut flags = (self.flags_byte() & FLAG_C) | FLAG_N | half | (szxy_of(result) & (FLAG_S | FLAG_Z)) | (n & FLAG_Y) | ((n << 4) & FLAG_X);
        if bc != 0 {
            flags |= FLAG_PV;
        }
        self.set_flags_byte(flags);

        Ok(if bc != 0 && result != 0 { Step::Repeat } else { Step::Next })
    }

    /// INI and IND
    fn input_block(&mut self, step: i16) -> Result<Step, Z80Error> {
        let bc = self.get_register_pair_value(RegisterPair::BC);
        let hl = self.get_register_pair_value(RegisterPair::HL);
        let value = self.read_port(bc)?;
        self.write_byte(hl, value)?;

        self.state.wz = bc.wrapping_add_signed(step);
        self.set_register_pair_value(RegisterPair::HL, hl.wrapping_add_signed(step));
        let b = self.state.get_register(Register::B).wrapping_sub(1);
        self.state.set_register(Register::B, b);

        let c = self.state.get_register(Register::C).wrapping_add_signed(step as i8);
        self.set_block_io_flags(value, value as u16 + c as u16, b);
        Ok(if b != 0 { Step::Repeat } else { Step::Next })
    }

    /// OUTI and OUTD
    fn output_block(&mut self, step: i16) -> Result<Step, Z80Error> {
        let hl = self.get_register_pair_value(RegisterPair::HL);
        let value = self.read_byte(hl)?;
        let b = self.state.get_register(Register::B).wrapping_sub(1);
        self.state.set_register(Register::B, b);

        let bc = self.get_register_pair_value(RegisterPair::BC);
        self.write_port(bc, value)?;
        self.state.wz = bc.wrapping_add_signed(step);
        let hl = hl.wrapping_add_signed(step);
        self.set_register_pair_value(RegisterPair::HL, hl);

        self.set_block_io_flags(value, value as u16 + (hl & 0xFF), b);
        Ok(if b != 0 { Step::Repeat } else { Step::Next })
    }

    fn set_block_io_flags(&mut self, value: u8, k: u16, b: u8) {
        let mut flags = szxy_of(b) | parity_of((k as u8 & 0x07) ^ b);
        if value & 0x80 != 0 {
            flags |= FLAG_N;
        }
        if k > 0xFF {
            flags |= FLAG_H | FLAG_C;
        }
        self.set_flags_byte(flags);
    }

    /// Rewind to the start of a repeating block instruction so it runs again
    fn repeat_block(&mut self) {
        self.state.pc = self.cycle.decoder.start;
        self.state.wz = self.state.pc.wrapping_add(1);
        self.cycle.took_branch = true;
    }

    fn decrement_bc(&mut self) -> u16 {
        let bc = self.get_register_pair_value(RegisterPair::BC).wrapping_sub(1);
        self.set_register_pair_value(RegisterPair::BC, bc);
        bc
    }

    fn update_load_memptr(&mut self, dest: LoadTarget, src: LoadTarget) {
        let acc = (self.accumulator() as u16) << 8;
        match (dest, src) {
            (LoadTarget::DirectRegByte(Register::A), LoadTarget::IndirectRegByte(regpair)) if regpair != RegisterPair::HL => {
                self.state.wz = self.get_register_pair_value(regpair).wrapping_add(1);
            },
            (LoadTarget::IndirectRegByte(regpair), LoadTarget::DirectRegByte(Register::A)) if regpair != RegisterPair::HL => {
                let addr = self.get_register_pair_value(regpair).wrapping_add(1);
                self.state.wz = acc | (addr & 0xFF);
            },
            (LoadTarget::DirectRegByte(Register::A), LoadTarget::IndirectByte(addr)) => {
                self.state.wz = addr.wrapping_add(1);
            },
            (LoadTarget::IndirectByte(addr), LoadTarget::DirectRegByte(Register::A)) => {
                self.state.wz = acc | (addr.wrapping_add(1) & 0xFF);
            },
            (LoadTarget::IndirectWord(addr), _) | (_, LoadTarget::IndirectWord(addr)) => {
                self.state.wz = addr.wrapping_add(1);
            },
            _ => {},
        }
    }

    fn jump_to(&mut self, addr: u16) {
        self.state.pc = addr;
        self.state.wz = addr;
    }

    fn jump_relative(&mut self, offset: i8) {
        let addr = self.state.pc.wrapping_add_signed(offset as i16);
        self.jump_to(addr);
    }

    fn push_word(&mut self, value: u16) -> Result<(), Z80Error> {
        self.state.sp = self.state.sp.wrapping_sub(1);
        self.write_byte(self.state.sp, (value >> 8) as u8)?;
        self.state.sp = self.state.sp.wrapping_sub(1);
        self.write_byte(self.state.sp, value as u8)
    }

    fn pop_word(&mut self) -> Result<u16, Z80Error> {
        let value = self.read_word(self.state.sp)?;
        self.state.sp = self.state.sp.wrapping_add(2);
        Ok(value)
    }

    #[inline]
    fn read_byte(&mut self, addr: u16) -> Result<u8, Z80Error> {
        self.port.read_u8(self.cycle.clock, addr)
    }

    #[inline]
    fn write_byte(&mut self, addr: u16, value: u8) -> Result<(), Z80Error> {
        self.port.write_u8(self.cycle.clock, addr, value)
    }

    #[inline]
    fn read_word(&mut self, addr: u16) -> Result<u16, Z80Error> {
        self.port.read_leu16(self.cycle.clock, addr)
    }

    #[inline]
    fn write_word(&mut self, addr: u16, value: u16) -> Result<(), Z80Error> {
        self.port.write_leu16(self.cycle.clock, addr, value)
    }

    #[inline]
    fn read_port(&mut self, port: u16) -> Result<u8, Z80Error> {
        self.port.read_io(self.cycle.clock, port)
    }

    #[inline]
    fn write_port(&mut self, port: u16, value: u8) -> Result<(), Z80Error> {
        self.port.write_io(self.cycle.clock, port, value)
    }

    fn get_load_target_value(&mut self, target: LoadTarget) -> Result<u16, Z80Error> {
        let value = match target {
            LoadTarget::DirectRegByte(reg) => self.state.get_register(reg) as u16,
            LoadTarget::DirectRegHalfByte(reg) => self.get_index_register_half_value(reg) as u16,
            LoadTarget::DirectRegWord(regpair) => self.get_register_pair_value(regpair),
            LoadTarget::IndirectRegByte(regpair) => {
                let addr = self.get_register_pair_value(regpair);
                self.read_byte(addr)? as u16
            },
            LoadTarget::IndirectOffsetByte(index_reg, offset) => {
                let addr = self.get_indexed_address(index_reg, offset);
                self.read_byte(addr)? as u16
            },
            LoadTarget::IndirectByte(addr) => self.read_byte(addr)? as u16,
            LoadTarget::IndirectWord(addr) => self.read_word(addr)?,
            LoadTarget::ImmediateByte(data) => data as u16,
            LoadTarget::ImmediateWord(data) => data,
        };
        Ok(value)
    }

    fn set_load_target_value(&mut self, target: LoadTarget, value: u16) -> Result<(), Z80Error> {
        match target {
            LoadTarget::DirectRegByte(reg) => self.state.set_register(reg, value as u8),
            LoadTarget::DirectRegHalfByte(reg) => self.set_index_register_half_value(reg, value as u8),
            LoadTarget::DirectRegWord(regpair) => self.set_register_pair_value(regpair, value),
            LoadTarget::IndirectRegByte(regpair) => {
                let addr = self.get_register_pair_value(regpair);
                self.write_byte(addr, value as u8)?;
            },
            LoadTarget::IndirectOffsetByte(index_reg, offset) => {
                let addr = self.get_indexed_address(index_reg, offset);
                self.write_byte(addr, value as u8)?;
            },
            LoadTarget::IndirectByte(addr) => self.write_byte(addr, value as u8)?,
            LoadTarget::IndirectWord(addr) => self.write_word(addr, value)?,
            LoadTarget::ImmediateByte(_) | LoadTarget::ImmediateWord(_) => {
                return Err(Z80Error::Other(format!("cannot store to an immediate operand {:?}", target)));
            },
        }
        Ok(())
    }

    fn get_target_value(&mut self, target: Target) -> Result<u8, Z80Error> {
        match target {
            Target::DirectReg(reg) => Ok(self.state.get_register(reg)),
            Target::DirectRegHalf(reg) => Ok(self.get_index_register_half_value(reg)),
            Target::IndirectReg(regpair) => {
                let addr = self.get_register_pair_value(regpair);
                self.read_byte(addr)
            },
            Target::IndirectOffset(index_reg, offset) => {
                let addr = self.get_indexed_address(index_reg, offset);
                self.read_byte(addr)
            },
            Target::Immediate(data) => Ok(data),
        }
    }

    fn set_target_value(&mut self, target: Target, value: u8) -> Result<(), Z80Error> {
        match target {
            Target::DirectReg(reg) => self.state.set_register(reg, value),
            Target::DirectRegHalf(reg) => self.set_index_register_half_value(reg, value),
            Target::IndirectReg(regpair) => {
                let addr = self.get_register_pair_value(regpair);
                self.write_byte(addr, value)?;
            },
            Target::IndirectOffset(index_reg, offset) => {
                let addr = self.get_indexed_address(index_reg, offset);
                self.write_byte(addr, value)?;
            },
            Target::Immediate(_) => {
                return Err(Z80Error::Other(format!("cannot store to an immediate operand {:?}", target)));
            },
        }
        Ok(())
    }

    /// The effective address of an (IX+d) or (IY+d) operand, which is also latched into WZ
    fn get_indexed_address(&mut self, index_reg: IndexRegister, offset: i8) -> u16 {
        let addr = self.get_index_register_value(index_reg).wrapping_add_signed(offset as i16);
        self.state.wz = addr;
        addr
    }

    fn get_index_register_half_value(&self, reg: IndexRegisterHalf) -> u8 {
        match reg {
            IndexRegisterHalf::IXH => (self.state.ix >> 8) as u8,
            IndexRegisterHalf::IXL => self.state.ix as u8,
            IndexRegisterHalf::IYH => (self.state.iy >> 8) as u8,
            IndexRegisterHalf::IYL => self.state.iy as u8,
        }
    }

    fn set_index_register_half_value(&mut self, reg: IndexRegisterHalf, value: u8) {
        match reg {
            IndexRegisterHalf::IXH => self.state.ix = (self.state.ix & 0x00FF) | ((value as u16) << 8),
            IndexRegisterHalf::IXL => self.state.ix = (self.state.ix & 0xFF00) | value as u16,
            IndexRegisterHalf::IYH => self.state.iy = (self.state.iy & 0x00FF) | ((value as u16) << 8),
            IndexRegisterHalf::IYL => self.state.iy = (self.state.iy & 0xFF00) | value as u16,
        }
    }

    #[inline]
    fn get_register_pair_value(&self, regpair: RegisterPair) -> u16 {
        self.state.get_register_pair(regpair)
    }

    #[inline]
    fn set_register_pair_value(&mut self, regpair: RegisterPair, value: u16) {
        self.state.set_register_pair(regpair, value);
    }

    fn get_index_register_value(&self, reg: IndexRegister) -> u16 {
        match reg {
            IndexRegister::IX => self.state.ix,
            IndexRegister::IY => self.state.iy,
        }
    }

    fn get_current_condition(&self, cond: Condition) -> bool {
        let flags = self.flags_byte();
        match cond {
            Condition::NotZero => flags & FLAG_Z == 0,
            Condition::Zero => flags & FLAG_Z != 0,
            Condition::NotCarry => flags & FLAG_C == 0,
            Condition::Carry => flags & FLAG_C != 0,
            Condition::ParityOdd => flags & FLAG_PV == 0,
            Condition::ParityEven => flags & FLAG_PV != 0,
            Condition::Positive => flags & FLAG_S == 0,
            Condition::Negative => flags & FLAG_S != 0,
        }
    }

    #[inline(always)]
    fn accumulator(&self) -> u8 {
        self.state.reg[Register::A as usize]
    }

    #[inline(always)]
    fn set_accumulator(&mut self, value: u8) {
        self.state.reg[Register::A as usize] = value;
    }

    #[inline(always)]
    fn carry(&self) -> bool {
        self.flags_byte() & FLAG_C != 0
    }

    #[inline(always)]
    fn flags_byte(&self) -> u8 {
        self.state.reg[Register::F as usize]
    }

    #[inline(always)]
    fn set_flags_byte(&mut self, flags: u8) {
        self.state.reg[Register::F as usize] = flags;
    }
}
