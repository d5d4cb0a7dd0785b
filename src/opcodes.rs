use std::{collections::HashMap, fmt, sync::OnceLock};

use crate::addressing::AddressingMode;

// -------------------------------------------------------------------------------------------------

/// Every mnemonic the assembler understands: the 88 real 65816 mnemonics
/// plus the two pseudo-mnemonics `ADD` and `SUB`, which expand to `CLC/ADC`
/// and `SEC/SBC` at emission time.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Mnemonic {
    // Inert operations: opcodes the static analysis does not need to
    // understand.
    /// Add with carry
    ADC,
    /// AND accumulator
    AND,
    /// Left-shift accumulator or memory
    ASL,
    /// Bit test
    BIT,
    /// Clear decimal flag
    CLD,
    /// Clear interrupt flag
    CLI,
    /// Clear overflow flag
    CLV,
    /// Compare accumulator with memory
    CMP,
    /// Compare X with memory
    CPX,
    /// Compare Y with memory
    CPY,
    /// Decrement accumulator or memory
    DEC,
    /// Decrement X
    DEX,
    /// Decrement Y
    DEY,
    /// Exclusive-OR accumulator
    EOR,
    /// Increment accumulator or memory
    INC,
    /// Increment X
    INX,
    /// Increment Y
    INY,
    /// Load accumulator
    LDA,
    /// Load X
    LDX,
    /// Load Y
    LDY,
    /// Right-shift accumulator or memory
    LSR,
    /// Block move negative
    MVN,
    /// Block move positive
    MVP,
    /// No operation
    NOP,
    /// OR accumulator with memory
    ORA,
    /// Push effective address
    PEA,
    /// Push effective indirect address
    PEI,
    /// Push program counter relative
    PER,
    /// Push accumulator
    PHA,
    /// Push data bank register
    PHB,
    /// Push direct page register
    PHD,
    /// Push program bank
    PHK,
    /// Push X
    PHX,
    /// Push Y
    PHY,
    /// Pull accumulator
    PLA,
    /// Pull data bank register
    PLB,
    /// Pull direct page register
    PLD,
    /// Pull X
    PLX,
    /// Pull Y
    PLY,
    /// Rotate left
    ROL,
    /// Rotate right
    ROR,
    /// Subtract with carry
    SBC,
    /// Set decimal flag
    SED,
    /// Set interrupt flag
    SEI,
    /// Store accumulator
    STA,
    /// Stop the clock
    STP,
    /// Store X
    STX,
    /// Store Y
    STY,
    /// Store zero
    STZ,
    /// Transfer A to X
    TAX,
    /// Transfer A to Y
    TAY,
    /// Transfer A to direct page
    TCD,
    /// Transfer A to stack pointer
    TCS,
    /// Transfer direct page to A
    TDC,
    /// Test and reset bits
    TRB,
    /// Test and set bits
    TSB,
    /// Transfer stack pointer to A
    TSC,
    /// Transfer stack pointer to X
    TSX,
    /// Transfer X to A
    TXA,
    /// Transfer X to stack pointer
    TXS,
    /// Transfer X to Y
    TXY,
    /// Transfer Y to A
    TYA,
    /// Transfer Y to X
    TYX,
    /// Wait for interrupt
    WAI,
    /// Reserved for future expansion
    WDM,
    /// Exchange accumulator bytes
    XBA,

    // Flow control operations: conditional and unconditional jumps,
    // subroutine calls, and returns.
    /// Branch if carry clear
    BCC,
    /// Branch if carry set
    BCS,
    /// Branch if equal
    BEQ,
    /// Branch if minus
    BMI,
    /// Branch if not equal
    BNE,
    /// Branch if plus
    BPL,
    /// Branch always
    BRA,
    /// Software break
    BRK,
    /// Branch always long
    BRL,
    /// Branch if overflow clear
    BVC,
    /// Branch if overflow set
    BVS,
    /// Coprocessor call
    COP,
    /// Jump
    JMP,
    /// Jump to subroutine long
    JSL,
    /// Jump to subroutine
    JSR,
    /// Return from interrupt
    RTI,
    /// Return from subroutine long
    RTL,
    /// Return from subroutine
    RTS,

    // Status operations: instructions that can change the m and x bits or
    // move the processor between native and emulation mode. (CLC and SEC
    // matter because they prime XCE.)
    /// Clear carry flag
    CLC,
    /// Push processor status
    PHP,
    /// Pull processor status
    PLP,
    /// Reset status bits
    REP,
    /// Set carry flag
    SEC,
    /// Set status bits
    SEP,
    /// Exchange carry with emulation bit
    XCE,

    // Pseudo-mnemonics.
    /// CLC then ADC
    ADD,
    /// SEC then SBC
    SUB,
}

pub const ALL_MNEMONICS: [Mnemonic; 93] = {
    use Mnemonic::*;
    [
        ADC, AND, ASL, BIT, CLD, CLI, CLV, CMP, CPX, CPY, DEC, DEX, DEY, EOR, INC, INX, INY, LDA,
        LDX, LDY, LSR, MVN, MVP, NOP, ORA, PEA, PEI, PER, PHA, PHB, PHD, PHK, PHX, PHY, PLA, PLB,
        PLD, PLX, PLY, ROL, ROR, SBC, SED, SEI, STA, STP, STX, STY, STZ, TAX, TAY, TCD, TCS, TDC,
        TRB, TSB, TSC, TSX, TXA, TXS, TXY, TYA, TYX, WAI, WDM, XBA, BCC, BCS, BEQ, BMI, BNE, BPL,
        BRA, BRK, BRL, BVC, BVS, COP, JMP, JSL, JSR, RTI, RTL, RTS, CLC, PHP, PLP, REP, SEC, SEP,
        XCE, ADD, SUB,
    ]
};

impl Mnemonic {
    pub fn is_pseudo(self) -> bool {
        matches!(self, Mnemonic::ADD | Mnemonic::SUB)
    }

    /// Parses a mnemonic name, case-insensitively.
    pub fn parse(s: &str) -> Option<Mnemonic> {
        use Mnemonic::*;
        let lower = s.to_ascii_lowercase();
        Some(match lower.as_str() {
            "adc" => ADC,
            "and" => AND,
            "asl" => ASL,
            "bit" => BIT,
            "cld" => CLD,
            "cli" => CLI,
            "clv" => CLV,
            "cmp" => CMP,
            "cpx" => CPX,
            "cpy" => CPY,
            "dec" => DEC,
            "dex" => DEX,
            "dey" => DEY,
            "eor" => EOR,
            "inc" => INC,
            "inx" => INX,
            "iny" => INY,
            "lda" => LDA,
            "ldx" => LDX,
            "ldy" => LDY,
            "lsr" => LSR,
            "mvn" => MVN,
            "mvp" => MVP,
            "nop" => NOP,
            "ora" => ORA,
            "pea" => PEA,
            "pei" => PEI,
            "per" => PER,
            "pha" => PHA,
            "phb" => PHB,
            "phd" => PHD,
            "phk" => PHK,
            "phx" => PHX,
            "phy" => PHY,
            "pla" => PLA,
            "plb" => PLB,
            "pld" => PLD,
            "plx" => PLX,
            "ply" => PLY,
            "rol" => ROL,
            "ror" => ROR,
            "sbc" => SBC,
            "sed" => SED,
            "sei" => SEI,
            "sta" => STA,
            "stp" => STP,
            "stx" => STX,
            "sty" => STY,
            "stz" => STZ,
            "tax" => TAX,
            "tay" => TAY,
            "tcd" => TCD,
            "tcs" => TCS,
            "tdc" => TDC,
            "trb" => TRB,
            "tsb" => TSB,
            "tsc" => TSC,
            "tsx" => TSX,
            "txa" => TXA,
            "txs" => TXS,
            "txy" => TXY,
            "tya" => TYA,
            "tyx" => TYX,
            "wai" => WAI,
            "wdm" => WDM,
            "xba" => XBA,
            "bcc" => BCC,
            "bcs" => BCS,
            "beq" => BEQ,
            "bmi" => BMI,
            "bne" => BNE,
            "bpl" => BPL,
            "bra" => BRA,
            "brk" => BRK,
            "brl" => BRL,
            "bvc" => BVC,
            "bvs" => BVS,
            "cop" => COP,
            "jmp" => JMP,
            "jsl" => JSL,
            "jsr" => JSR,
            "rti" => RTI,
            "rtl" => RTL,
            "rts" => RTS,
            "clc" => CLC,
            "php" => PHP,
            "plp" => PLP,
            "rep" => REP,
            "sec" => SEC,
            "sep" => SEP,
            "xce" => XCE,
            "add" => ADD,
            "sub" => SUB,
            _ => return None,
        })
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format!("{self:?}").to_ascii_lowercase())
    }
}

// -------------------------------------------------------------------------------------------------

/// Explicit operand-width suffix on a mnemonic (`lda.b`, `lda.w`). Only
/// legal on mnemonics whose immediate width follows a status bit.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum Suffix {
    #[default]
    None,
    B,
    W,
}

impl Suffix {
    pub fn parse(s: &str) -> Option<Suffix> {
        match s.to_ascii_lowercase().as_str() {
            ".b" => Some(Suffix::B),
            ".w" => Some(Suffix::W),
            _ => None,
        }
    }
}

impl fmt::Display for Suffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Suffix::None => Ok(()),
            Suffix::B => write!(f, ".b"),
            Suffix::W => write!(f, ".w"),
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Opcode {
    pub mnemonic: Mnemonic,
    pub mode:     AddressingMode,
}

impl Opcode {
    pub const fn new(mnemonic: Mnemonic, mode: AddressingMode) -> Self {
        Self { mnemonic, mode }
    }
}

use AddressingMode::*;
use Mnemonic::*;

/// The forward opcode map: byte value to (mnemonic, addressing mode).
#[rustfmt::skip]
pub static OPCODES: [Opcode; 0x100] = [
    /* 00 */ Opcode::new(BRK, Immediate8),
    /* 01 */ Opcode::new(ORA, DirectPageXIndirect),
    /* 02 */ Opcode::new(COP, Immediate8),
    /* 03 */ Opcode::new(ORA, StackRelative),
    /* 04 */ Opcode::new(TSB, DirectPage),
    /* 05 */ Opcode::new(ORA, DirectPage),
    /* 06 */ Opcode::new(ASL, DirectPage),
    /* 07 */ Opcode::new(ORA, DirectPageIndirectLong),
    /* 08 */ Opcode::new(PHP, Implied),
    /* 09 */ Opcode::new(ORA, ImmediateMFlag),
    /* 0A */ Opcode::new(ASL, Accumulator),
    /* 0B */ Opcode::new(PHD, Implied),
    /* 0C */ Opcode::new(TSB, Absolute),
    /* 0D */ Opcode::new(ORA, Absolute),
    /* 0E */ Opcode::new(ASL, Absolute),
    /* 0F */ Opcode::new(ORA, AbsoluteLong),
    /* 10 */ Opcode::new(BPL, Relative8),
    /* 11 */ Opcode::new(ORA, DirectPageIndirectY),
    /* 12 */ Opcode::new(ORA, DirectPageIndirect),
    /* 13 */ Opcode::new(ORA, StackRelativeIndirectY),
    /* 14 */ Opcode::new(TRB, DirectPage),
    /* 15 */ Opcode::new(ORA, DirectPageX),
    /* 16 */ Opcode::new(ASL, DirectPageX),
    /* 17 */ Opcode::new(ORA, DirectPageIndirectLongY),
    /* 18 */ Opcode::new(CLC, Implied),
    /* 19 */ Opcode::new(ORA, AbsoluteY),
    /* 1A */ Opcode::new(INC, Accumulator),
    /* 1B */ Opcode::new(TCS, Implied),
    /* 1C */ Opcode::new(TRB, Absolute),
    /* 1D */ Opcode::new(ORA, AbsoluteX),
    /* 1E */ Opcode::new(ASL, AbsoluteX),
    /* 1F */ Opcode::new(ORA, AbsoluteLongX),
    /* 20 */ Opcode::new(JSR, Absolute),
    /* 21 */ Opcode::new(AND, DirectPageXIndirect),
    /* 22 */ Opcode::new(JSL, AbsoluteLong),
    /* 23 */ Opcode::new(AND, StackRelative),
    /* 24 */ Opcode::new(BIT, DirectPage),
    /* 25 */ Opcode::new(AND, DirectPage),
    /* 26 */ Opcode::new(ROL, DirectPage),
    /* 27 */ Opcode::new(AND, DirectPageIndirectLong),
    /* 28 */ Opcode::new(PLP, Implied),
    /* 29 */ Opcode::new(AND, ImmediateMFlag),
    /* 2A */ Opcode::new(ROL, Accumulator),
    /* 2B */ Opcode::new(PLD, Implied),
    /* 2C */ Opcode::new(BIT, Absolute),
    /* 2D */ Opcode::new(AND, Absolute),
    /* 2E */ Opcode::new(ROL, Absolute),
    /* 2F */ Opcode::new(AND, AbsoluteLong),
    /* 30 */ Opcode::new(BMI, Relative8),
    /* 31 */ Opcode::new(AND, DirectPageIndirectY),
    /* 32 */ Opcode::new(AND, DirectPageIndirect),
    /* 33 */ Opcode::new(AND, StackRelativeIndirectY),
    /* 34 */ Opcode::new(BIT, DirectPageX),
    /* 35 */ Opcode::new(AND, DirectPageX),
    /* 36 */ Opcode::new(ROL, DirectPageX),
    /* 37 */ Opcode::new(AND, DirectPageIndirectLongY),
    /* 38 */ Opcode::new(SEC, Implied),
    /* 39 */ Opcode::new(AND, AbsoluteY),
    /* 3A */ Opcode::new(DEC, Accumulator),
    /* 3B */ Opcode::new(TSC, Implied),
    /* 3C */ Opcode::new(BIT, AbsoluteX),
    /* 3D */ Opcode::new(AND, AbsoluteX),
    /* 3E */ Opcode::new(ROL, AbsoluteX),
    /* 3F */ Opcode::new(AND, AbsoluteLongX),
    /* 40 */ Opcode::new(RTI, Implied),
    /* 41 */ Opcode::new(EOR, DirectPageXIndirect),
    /* 42 */ Opcode::new(WDM, Immediate8),
    /* 43 */ Opcode::new(EOR, StackRelative),
    /* 44 */ Opcode::new(MVP, BlockMove),
    /* 45 */ Opcode::new(EOR, DirectPage),
    /* 46 */ Opcode::new(LSR, DirectPage),
    /* 47 */ Opcode::new(EOR, DirectPageIndirectLong),
    /* 48 */ Opcode::new(PHA, Implied),
    /* 49 */ Opcode::new(EOR, ImmediateMFlag),
    /* 4A */ Opcode::new(LSR, Accumulator),
    /* 4B */ Opcode::new(PHK, Implied),
    /* 4C */ Opcode::new(JMP, Absolute),
    /* 4D */ Opcode::new(EOR, Absolute),
    /* 4E */ Opcode::new(LSR, Absolute),
    /* 4F */ Opcode::new(EOR, AbsoluteLong),
    /* 50 */ Opcode::new(BVC, Relative8),
    /* 51 */ Opcode::new(EOR, DirectPageIndirectY),
    /* 52 */ Opcode::new(EOR, DirectPageIndirect),
    /* 53 */ Opcode::new(EOR, StackRelativeIndirectY),
    /* 54 */ Opcode::new(MVN, BlockMove),
    /* 55 */ Opcode::new(EOR, DirectPageX),
    /* 56 */ Opcode::new(LSR, DirectPageX),
    /* 57 */ Opcode::new(EOR, DirectPageIndirectLongY),
    /* 58 */ Opcode::new(CLI, Implied),
    /* 59 */ Opcode::new(EOR, AbsoluteY),
    /* 5A */ Opcode::new(PHY, Implied),
    /* 5B */ Opcode::new(TCD, Implied),
    /* 5C */ Opcode::new(JMP, AbsoluteLong),
    /* 5D */ Opcode::new(EOR, AbsoluteX),
    /* 5E */ Opcode::new(LSR, AbsoluteX),
    /* 5F */ Opcode::new(EOR, AbsoluteLongX),
    /* 60 */ Opcode::new(RTS, Implied),
    /* 61 */ Opcode::new(ADC, DirectPageXIndirect),
    /* 62 */ Opcode::new(PER, Relative16),
    /* 63 */ Opcode::new(ADC, StackRelative),
    /* 64 */ Opcode::new(STZ, DirectPage),
    /* 65 */ Opcode::new(ADC, DirectPage),
    /* 66 */ Opcode::new(ROR, DirectPage),
    /* 67 */ Opcode::new(ADC, DirectPageIndirectLong),
    /* 68 */ Opcode::new(PLA, Implied),
    /* 69 */ Opcode::new(ADC, ImmediateMFlag),
    /* 6A */ Opcode::new(ROR, Accumulator),
    /* 6B */ Opcode::new(RTL, Implied),
    /* 6C */ Opcode::new(JMP, AbsoluteIndirect),
    /* 6D */ Opcode::new(ADC, Absolute),
    /* 6E */ Opcode::new(ROR, Absolute),
    /* 6F */ Opcode::new(ADC, AbsoluteLong),
    /* 70 */ Opcode::new(BVS, Relative8),
    /* 71 */ Opcode::new(ADC, DirectPageIndirectY),
    /* 72 */ Opcode::new(ADC, DirectPageIndirect),
    /* 73 */ Opcode::new(ADC, StackRelativeIndirectY),
    /* 74 */ Opcode::new(STZ, DirectPageX),
    /* 75 */ Opcode::new(ADC, DirectPageX),
    /* 76 */ Opcode::new(ROR, DirectPageX),
    /* 77 */ Opcode::new(ADC, DirectPageIndirectLongY),
    /* 78 */ Opcode::new(SEI, Implied),
    /* 79 */ Opcode::new(ADC, AbsoluteY),
    /* 7A */ Opcode::new(PLY, Implied),
    /* 7B */ Opcode::new(TDC, Implied),
    /* 7C */ Opcode::new(JMP, AbsoluteXIndirect),
    /* 7D */ Opcode::new(ADC, AbsoluteX),
    /* 7E */ Opcode::new(ROR, AbsoluteX),
    /* 7F */ Opcode::new(ADC, AbsoluteLongX),
    /* 80 */ Opcode::new(BRA, Relative8),
    /* 81 */ Opcode::new(STA, DirectPageXIndirect),
    /* 82 */ Opcode::new(BRL, Relative16),
    /* 83 */ Opcode::new(STA, StackRelative),
    /* 84 */ Opcode::new(STY, DirectPage),
    /* 85 */ Opcode::new(STA, DirectPage),
    /* 86 */ Opcode::new(STX, DirectPage),
    /* 87 */ Opcode::new(STA, DirectPageIndirectLong),
    /* 88 */ Opcode::new(DEY, Implied),
    /* 89 */ Opcode::new(BIT, ImmediateMFlag),
    /* 8A */ Opcode::new(TXA, Implied),
    /* 8B */ Opcode::new(PHB, Implied),
    /* 8C */ Opcode::new(STY, Absolute),
    /* 8D */ Opcode::new(STA, Absolute),
    /* 8E */ Opcode::new(STX, Absolute),
    /* 8F */ Opcode::new(STA, AbsoluteLong),
    /* 90 */ Opcode::new(BCC, Relative8),
    /* 91 */ Opcode::new(STA, DirectPageIndirectY),
    /* 92 */ Opcode::new(STA, DirectPageIndirect),
    /* 93 */ Opcode::new(STA, StackRelativeIndirectY),
    /* 94 */ Opcode::new(STY, DirectPageX),
    /* 95 */ Opcode::new(STA, DirectPageX),
    /* 96 */ Opcode::new(STX, DirectPageY),
    /* 97 */ Opcode::new(STA, DirectPageIndirectLongY),
    /* 98 */ Opcode::new(TYA, Implied),
    /* 99 */ Opcode::new(STA, AbsoluteY),
    /* 9A */ Opcode::new(TXS, Implied),
    /* 9B */ Opcode::new(TXY, Implied),
    /* 9C */ Opcode::new(STZ, Absolute),
    /* 9D */ Opcode::new(STA, AbsoluteX),
    /* 9E */ Opcode::new(STZ, AbsoluteX),
    /* 9F */ Opcode::new(STA, AbsoluteLongX),
    /* A0 */ Opcode::new(LDY, ImmediateXFlag),
    /* A1 */ Opcode::new(LDA, DirectPageXIndirect),
    /* A2 */ Opcode::new(LDX, ImmediateXFlag),
    /* A3 */ Opcode::new(LDA, StackRelative),
    /* A4 */ Opcode::new(LDY, DirectPage),
    /* A5 */ Opcode::new(LDA, DirectPage),
    /* A6 */ Opcode::new(LDX, DirectPage),
    /* A7 */ Opcode::new(LDA, DirectPageIndirectLong),
    /* A8 */ Opcode::new(TAY, Implied),
    /* A9 */ Opcode::new(LDA, ImmediateMFlag),
    /* AA */ Opcode::new(TAX, Implied),
    /* AB */ Opcode::new(PLB, Implied),
    /* AC */ Opcode::new(LDY, Absolute),
    /* AD */ Opcode::new(LDA, Absolute),
    /* AE */ Opcode::new(LDX, Absolute),
    /* AF */ Opcode::new(LDA, AbsoluteLong),
    /* B0 */ Opcode::new(BCS, Relative8),
    /* B1 */ Opcode::new(LDA, DirectPageIndirectY),
    /* B2 */ Opcode::new(LDA, DirectPageIndirect),
    /* B3 */ Opcode::new(LDA, StackRelativeIndirectY),
    /* B4 */ Opcode::new(LDY, DirectPageX),
    /* B5 */ Opcode::new(LDA, DirectPageX),
    /* B6 */ Opcode::new(LDX, DirectPageY),
    /* B7 */ Opcode::new(LDA, DirectPageIndirectLongY),
    /* B8 */ Opcode::new(CLV, Implied),
    /* B9 */ Opcode::new(LDA, AbsoluteY),
    /* BA */ Opcode::new(TSX, Implied),
    /* BB */ Opcode::new(TYX, Implied),
    /* BC */ Opcode::new(LDY, AbsoluteX),
    /* BD */ Opcode::new(LDA, AbsoluteX),
    /* BE */ Opcode::new(LDX, AbsoluteY),
    /* BF */ Opcode::new(LDA, AbsoluteLongX),
    /* C0 */ Opcode::new(CPY, ImmediateXFlag),
    /* C1 */ Opcode::new(CMP, DirectPageXIndirect),
    /* C2 */ Opcode::new(REP, Immediate8),
    /* C3 */ Opcode::new(CMP, StackRelative),
    /* C4 */ Opcode::new(CPY, DirectPage),
    /* C5 */ Opcode::new(CMP, DirectPage),
    /* C6 */ Opcode::new(DEC, DirectPage),
    /* C7 */ Opcode::new(CMP, DirectPageIndirectLong),
    /* C8 */ Opcode::new(INY, Implied),
    /* C9 */ Opcode::new(CMP, ImmediateMFlag),
    /* CA */ Opcode::new(DEX, Implied),
    /* CB */ Opcode::new(WAI, Implied),
    /* CC */ Opcode::new(CPY, Absolute),
    /* CD */ Opcode::new(CMP, Absolute),
    /* CE */ Opcode::new(DEC, Absolute),
    /* CF */ Opcode::new(CMP, AbsoluteLong),
    /* D0 */ Opcode::new(BNE, Relative8),
    /* D1 */ Opcode::new(CMP, DirectPageIndirectY),
    /* D2 */ Opcode::new(CMP, DirectPageIndirect),
    /* D3 */ Opcode::new(CMP, StackRelativeIndirectY),
    /* D4 */ Opcode::new(PEI, DirectPage),
    /* D5 */ Opcode::new(CMP, DirectPageX),
    /* D6 */ Opcode::new(DEC, DirectPageX),
    /* D7 */ Opcode::new(CMP, DirectPageIndirectLongY),
    /* D8 */ Opcode::new(CLD, Implied),
    /* D9 */ Opcode::new(CMP, AbsoluteY),
    /* DA */ Opcode::new(PHX, Implied),
    /* DB */ Opcode::new(STP, Implied),
    /* DC */ Opcode::new(JMP, AbsoluteIndirectLong),
    /* DD */ Opcode::new(CMP, AbsoluteX),
    /* DE */ Opcode::new(DEC, AbsoluteX),
    /* DF */ Opcode::new(CMP, AbsoluteLongX),
    /* E0 */ Opcode::new(CPX, ImmediateXFlag),
    /* E1 */ Opcode::new(SBC, DirectPageXIndirect),
    /* E2 */ Opcode::new(SEP, Immediate8),
    /* E3 */ Opcode::new(SBC, StackRelative),
    /* E4 */ Opcode::new(CPX, DirectPage),
    /* E5 */ Opcode::new(SBC, DirectPage),
    /* E6 */ Opcode::new(INC, DirectPage),
    /* E7 */ Opcode::new(SBC, DirectPageIndirectLong),
    /* E8 */ Opcode::new(INX, Implied),
    /* E9 */ Opcode::new(SBC, ImmediateMFlag),
    /* EA */ Opcode::new(NOP, Implied),
    /* EB */ Opcode::new(XBA, Implied),
    /* EC */ Opcode::new(CPX, Absolute),
    /* ED */ Opcode::new(SBC, Absolute),
    /* EE */ Opcode::new(INC, Absolute),
    /* EF */ Opcode::new(SBC, AbsoluteLong),
    /* F0 */ Opcode::new(BEQ, Relative8),
    /* F1 */ Opcode::new(SBC, DirectPageIndirectY),
    /* F2 */ Opcode::new(SBC, DirectPageIndirect),
    /* F3 */ Opcode::new(SBC, StackRelativeIndirectY),
    /* F4 */ Opcode::new(PEA, Immediate16),
    /* F5 */ Opcode::new(SBC, DirectPageX),
    /* F6 */ Opcode::new(INC, DirectPageX),
    /* F7 */ Opcode::new(SBC, DirectPageIndirectLongY),
    /* F8 */ Opcode::new(SED, Implied),
    /* F9 */ Opcode::new(SBC, AbsoluteY),
    /* FA */ Opcode::new(PLX, Implied),
    /* FB */ Opcode::new(XCE, Implied),
    /* FC */ Opcode::new(JSR, AbsoluteXIndirect),
    /* FD */ Opcode::new(SBC, AbsoluteX),
    /* FE */ Opcode::new(INC, AbsoluteX),
    /* FF */ Opcode::new(SBC, AbsoluteLongX),
];

// -------------------------------------------------------------------------------------------------

/// Reverse map, built once at first use. Flex-immediate table entries
/// register three reverse keys: the sentinel itself plus `Immediate8` and
/// `Immediate16`, all encoding to the same byte.
fn reverse_opcode_map() -> &'static HashMap<(Mnemonic, AddressingMode), u8> {
    static MAP: OnceLock<HashMap<(Mnemonic, AddressingMode), u8>> = OnceLock::new();
    MAP.get_or_init(|| {
        let mut reverse = HashMap::with_capacity(256 + 2 * 16);
        for (byte, opcode) in OPCODES.iter().enumerate() {
            let byte = byte as u8;
            reverse.insert((opcode.mnemonic, opcode.mode), byte);
            if opcode.mode.is_flex_immediate() {
                reverse.insert((opcode.mnemonic, Immediate8), byte);
                reverse.insert((opcode.mnemonic, Immediate16), byte);
            }
        }
        reverse
    })
}

pub fn decode_opcode(byte: u8) -> Opcode {
    OPCODES[byte as usize]
}

pub fn encode_opcode(mnemonic: Mnemonic, mode: AddressingMode) -> Option<u8> {
    reverse_opcode_map().get(&(mnemonic, mode)).copied()
}

/// The reverse map is the sole authority on legal pairs.
pub fn is_legal_combination(mnemonic: Mnemonic, mode: AddressingMode) -> bool {
    reverse_opcode_map().contains_key(&(mnemonic, mode))
}

/// True if this mnemonic's immediate operand width follows the `m` bit.
/// The pseudo-mnemonics inherit ADC's behavior.
pub fn immediate_uses_m_bit(mnemonic: Mnemonic) -> bool {
    mnemonic.is_pseudo() || is_legal_combination(mnemonic, ImmediateMFlag)
}

/// True if this mnemonic's immediate operand width follows the `x` bit.
pub fn immediate_uses_x_bit(mnemonic: Mnemonic) -> bool {
    is_legal_combination(mnemonic, ImmediateXFlag)
}

/// True if this mnemonic takes a PC-relative offset argument.
pub fn takes_offset_argument(mnemonic: Mnemonic) -> bool {
    is_legal_combination(mnemonic, Relative8) || is_legal_combination(mnemonic, Relative16)
}

/// True if this mnemonic takes a 16-bit PC-relative offset argument.
pub fn takes_long_offset_argument(mnemonic: Mnemonic) -> bool {
    is_legal_combination(mnemonic, Relative16)
}

/// Which status bit, if any, controls this mnemonic's immediate width.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VariableSizeFlag {
    NotVariable,
    UsesMFlag,
    UsesXFlag,
}

pub fn flag_controlling_instruction_size(mnemonic: Mnemonic) -> VariableSizeFlag {
    if immediate_uses_m_bit(mnemonic) {
        VariableSizeFlag::UsesMFlag
    } else if immediate_uses_x_bit(mnemonic) {
        VariableSizeFlag::UsesXFlag
    } else {
        VariableSizeFlag::NotVariable
    }
}

// -------------------------------------------------------------------------------------------------

/// The processor generation an opcode first appeared in.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Family {
    F6502,
    F65C02,
    F65816,
}

/// Classifies an opcode by the generation that introduced its mnemonic or
/// addressing mode.
pub fn family_for_opcode(byte: u8) -> Family {
    let Opcode { mnemonic, mode } = decode_opcode(byte);

    // 24-bit addressing modes and the other 65816-only operand shapes.
    if matches!(
        mode,
        AbsoluteLong
            | AbsoluteLongX
            | DirectPageIndirectLong
            | DirectPageIndirectLongY
            | AbsoluteIndirectLong
            | StackRelative
            | StackRelativeIndirectY
            | Relative16
            | BlockMove
    ) {
        return Family::F65816;
    }

    // Instructions new to the 65816.
    if matches!(
        mnemonic,
        BRL | COP
            | JSL
            | MVN
            | MVP
            | PEA
            | PEI
            | PER
            | PHB
            | PHD
            | PHK
            | PLB
            | PLD
            | REP
            | RTL
            | SEP
            | STP
            | TCD
            | TCS
            | TDC
            | TSC
            | TXY
            | TYX
            | WAI
            | WDM
            | XBA
            | XCE
    ) {
        return Family::F65816;
    }

    // JSR ($0000, X) is a 65816 extension.
    if mnemonic == JSR && mode == AbsoluteXIndirect {
        return Family::F65816;
    }

    // 65C02 extension addressing modes.
    if matches!(mode, DirectPageIndirect | AbsoluteXIndirect) {
        return Family::F65C02;
    }

    // 65C02 new instructions.
    if matches!(mnemonic, BRA | PHX | PHY | PLX | PLY | STZ | TRB | TSB) {
        return Family::F65C02;
    }

    // INC A and DEC A arrived with the 65C02.
    if matches!(mnemonic, INC | DEC) && mode == Accumulator {
        return Family::F65C02;
    }

    // The 65C02 also taught BIT three new addressing modes.
    if mnemonic == BIT && matches!(mode, DirectPageX | AbsoluteX | ImmediateMFlag) {
        return Family::F65C02;
    }

    Family::F6502
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::ALL_ADDRESSING_MODES;

    #[test]
    fn every_opcode_round_trips() {
        for byte in 0..=0xFFu8 {
            let opcode = decode_opcode(byte);
            assert_eq!(
                encode_opcode(opcode.mnemonic, opcode.mode),
                Some(byte),
                "opcode {byte:#04x}"
            );
        }
    }

    #[test]
    fn flex_immediates_encode_both_widths() {
        for byte in 0..=0xFFu8 {
            let opcode = decode_opcode(byte);
            if opcode.mode.is_flex_immediate() {
                assert_eq!(encode_opcode(opcode.mnemonic, Immediate8), Some(byte));
                assert_eq!(encode_opcode(opcode.mnemonic, Immediate16), Some(byte));
            }
        }
    }

    #[test]
    fn pseudo_mnemonics_have_no_encodings() {
        for mode in ALL_ADDRESSING_MODES {
            assert_eq!(encode_opcode(ADD, mode), None);
            assert_eq!(encode_opcode(SUB, mode), None);
        }
    }

    #[test]
    fn mnemonic_names_round_trip() {
        for mnemonic in ALL_MNEMONICS {
            let name = mnemonic.to_string();
            assert_eq!(Mnemonic::parse(&name), Some(mnemonic));
            assert_eq!(Mnemonic::parse(&name.to_ascii_uppercase()), Some(mnemonic));
        }
        assert_eq!(Mnemonic::parse("xyzzy"), None);
    }

    #[test]
    fn classification_queries() {
        assert!(immediate_uses_m_bit(LDA));
        assert!(immediate_uses_m_bit(ADD));
        assert!(immediate_uses_m_bit(SUB));
        assert!(!immediate_uses_m_bit(LDX));
        assert!(immediate_uses_x_bit(LDX));
        assert!(immediate_uses_x_bit(CPY));
        assert!(!immediate_uses_x_bit(LDA));
        assert!(takes_offset_argument(BCC));
        assert!(takes_offset_argument(BRL));
        assert!(!takes_offset_argument(JMP));
        assert!(takes_long_offset_argument(BRL));
        assert!(takes_long_offset_argument(PER));
        assert!(!takes_long_offset_argument(BRA));
        assert_eq!(flag_controlling_instruction_size(LDA), VariableSizeFlag::UsesMFlag);
        assert_eq!(flag_controlling_instruction_size(CPX), VariableSizeFlag::UsesXFlag);
        assert_eq!(flag_controlling_instruction_size(RTS), VariableSizeFlag::NotVariable);
    }

    #[test]
    fn flag_dependent_immediates_match_their_sentinels() {
        for byte in 0..=0xFFu8 {
            let opcode = decode_opcode(byte);
            match opcode.mode {
                ImmediateMFlag => assert_eq!(
                    flag_controlling_instruction_size(opcode.mnemonic),
                    VariableSizeFlag::UsesMFlag
                ),
                ImmediateXFlag => assert_eq!(
                    flag_controlling_instruction_size(opcode.mnemonic),
                    VariableSizeFlag::UsesXFlag
                ),
                _ => {}
            }
        }
    }

    #[test]
    fn family_spot_checks() {
        assert_eq!(family_for_opcode(0xA9), Family::F6502); // LDA #imm
        assert_eq!(family_for_opcode(0x60), Family::F6502); // RTS
        assert_eq!(family_for_opcode(0x80), Family::F65C02); // BRA
        assert_eq!(family_for_opcode(0x89), Family::F65C02); // BIT #imm
        assert_eq!(family_for_opcode(0x1A), Family::F65C02); // INC A
        assert_eq!(family_for_opcode(0x92), Family::F65C02); // STA (dp)
        assert_eq!(family_for_opcode(0x22), Family::F65816); // JSL long
        assert_eq!(family_for_opcode(0xC2), Family::F65816); // REP
        assert_eq!(family_for_opcode(0x03), Family::F65816); // ORA sr,S
        assert_eq!(family_for_opcode(0x44), Family::F65816); // MVP
        assert_eq!(family_for_opcode(0xFC), Family::F65816); // JSR (abs,X)
        assert_eq!(family_for_opcode(0xFB), Family::F65816); // XCE
    }

    #[test]
    fn every_family_is_assigned() {
        let mut counts = [0usize; 3];
        for byte in 0..=0xFFu8 {
            counts[family_for_opcode(byte) as usize] += 1;
        }
        // All three generations are represented across the table.
        assert!(counts.iter().all(|&n| n > 0), "{counts:?}");
    }
}
