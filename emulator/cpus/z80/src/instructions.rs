#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    ToAcc,
    FromAcc,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Condition {
    NotZero,
    Zero,
    NotCarry,
    Carry,
    ParityOdd,
    ParityEven,
    Positive,
    Negative,
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Register {
    B = 0,
    C = 1,
    D = 2,
    E = 3,
    H = 4,
    L = 5,
    A = 6,
    F = 7,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RegisterPair {
    BC,
    DE,
    HL,
    AF,
    SP,
    IX,
    IY,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IndexRegister {
    IX,
    IY,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IndexRegisterHalf {
    IXH,
    IXL,
    IYH,
    IYL,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SpecialRegister {
    I,
    R,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InterruptMode {
    Mode0,
    Mode1,
    Mode2,
}

/// An 8-bit operand
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Target {
    DirectReg(Register),
    DirectRegHalf(IndexRegisterHalf),
    IndirectReg(RegisterPair),
    IndirectOffset(IndexRegister, i8),
    Immediate(u8),
}

/// An operand of the LD instruction, which can be either 8 or 16 bits wide
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoadTarget {
    DirectRegByte(Register),
    DirectRegHalfByte(IndexRegisterHalf),
    DirectRegWord(RegisterPair),
    IndirectRegByte(RegisterPair),
    IndirectOffsetByte(IndexRegister, i8),
    IndirectByte(u16),
    IndirectWord(u16),
    ImmediateByte(u8),
    ImmediateWord(u16),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    ADCa(Target),
    ADC16(RegisterPair, RegisterPair),
    ADDa(Target),
    ADD16(RegisterPair, RegisterPair),
    AND(Target),
    BIT(u8, Target),
    CALL(u16),
    CALLcc(Condition, u16),
    CCF,
    CP(Target),
    CPD,
    CPDR,
    CPI,
    CPIR,
    CPL,
    DAA,
    DEC16(RegisterPair),
    DEC8(Target),
    DI,
    DJNZ(i8),
    EI,
    EXX,
    EXafaf,
    EXhlde,
    EXsp(RegisterPair),
    HALT,
    IM(InterruptMode),
    INC16(RegisterPair),
    INC8(Target),
    IND,
    INDR,
    INI,
    INIR,
    /// IN r,(C), or IN (C) which only sets the flags
    INc(Option<Register>),
    INx(u8),
    JP(u16),
    JPIndirect(RegisterPair),
    JPcc(Condition, u16),
    JR(i8),
    JRcc(Condition, i8),
    LD(LoadTarget, LoadTarget),
    LDsr(SpecialRegister, Direction),
    LDD,
    LDDR,
    LDI,
    LDIR,
    NEG,
    NOP,
    OR(Target),
    OTDR,
    OTIR,
    OUTD,
    OUTI,
    /// OUT (C),r, or OUT (C),0
    OUTc(Option<Register>),
    OUTx(u8),
    POP(RegisterPair),
    PUSH(RegisterPair),
    RES(u8, Target),
    RET,
    RETI,
    RETN,
    RETcc(Condition),
    RL(Target),
    RLA,
    RLC(Target),
    RLCA,
    RLD,
    RR(Target),
    RRA,
    RRC(Target),
    RRCA,
    RRD,
    RST(u8),
    SBCa(Target),
    SBC16(RegisterPair, RegisterPair),
    SCF,
    SET(u8, Target),
    SLA(Target),
    SLL(Target),
    SRA(Target),
    SRL(Target),
    SUB(Target),
    XOR(Target),
    /// DD CB d op / FD CB d op, executed through the indexed bit-op table
    XYCB(IndexRegister, i8, u8),
}

impl From<IndexRegister> for RegisterPair {
    fn from(value: IndexRegister) -> Self {
        match value {
            IndexRegister::IX => RegisterPair::IX,
            IndexRegister::IY => RegisterPair::IY,
        }
    }
}

impl From<Target> for LoadTarget {
    fn from(target: Target) -> Self {
        match target {
            Target::DirectReg(reg) => LoadTarget::DirectRegByte(reg),
            Target::DirectRegHalf(reg) => LoadTarget::DirectRegHalfByte(reg),
            Target::IndirectReg(reg) => LoadTarget::IndirectRegByte(reg),
            Target::IndirectOffset(reg, offset) => LoadTarget::IndirectOffsetByte(reg, offset),
            Target::Immediate(data) => LoadTarget::ImmediateByte(data),
        }
    }
}
