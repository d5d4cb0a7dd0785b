use std::fmt;

use smallvec::SmallVec;

use crate::{
    addr::{Addr, NumericType},
    addressing::{args_to_string, instruction_length, AddressingMode},
    error::{err, Location, Result},
    expr::{Expression, LookupContext, NullLookupContext},
    flags::{BitState, StatusFlags},
    opcodes::{
        decode_opcode,
        encode_opcode,
        immediate_uses_m_bit,
        immediate_uses_x_bit,
        is_legal_combination,
        Mnemonic,
        Suffix,
    },
    sink::OutputSink,
};

// -------------------------------------------------------------------------------------------------

/// How a subroutine returns: preserving the caller's status bits
/// (`Default`), forcing them to a known state (`Yields`), or never
/// (`NoReturn`). Attachable to `jsl`/`jsr` and to `.entry`/`.remote`.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ReturnConvention {
    #[default]
    Default,
    Yields(StatusFlags),
    NoReturn,
}

impl ReturnConvention {
    pub fn yield_state(&self) -> Option<&StatusFlags> {
        match self {
            ReturnConvention::Yields(flags) => Some(flags),
            _ => None,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, ReturnConvention::Default)
    }

    pub fn is_exit_call(&self) -> bool {
        matches!(self, ReturnConvention::NoReturn)
    }

    /// Merges conventions recorded for the same target. Conflicting
    /// non-default conventions are an error.
    pub fn merge(&self, rhs: &ReturnConvention) -> Result<ReturnConvention> {
        match (self, rhs) {
            (ReturnConvention::Default, other) | (other, ReturnConvention::Default) => {
                Ok(other.clone())
            }
            (lhs, rhs) if lhs == rhs => Ok(lhs.clone()),
            (lhs, rhs) => Err(err!("Conflicting return conventions: {lhs} vs {rhs}")),
        }
    }
}

impl fmt::Display for ReturnConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnConvention::Default => Ok(()),
            ReturnConvention::Yields(flags) => write!(f, " yields {}", flags.name()),
            ReturnConvention::NoReturn => write!(f, " noreturn"),
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// One machine instruction, in either direction of translation.
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    pub mnemonic:          Mnemonic,
    pub suffix:            Suffix,
    pub mode:              AddressingMode,
    pub arg1:              Option<Expression>,
    pub arg2:              Option<Expression>,
    pub return_convention: ReturnConvention,
    pub location:          Location,
}

impl Instruction {
    pub fn new(mnemonic: Mnemonic, mode: AddressingMode) -> Self {
        Self {
            mnemonic,
            suffix: Suffix::None,
            mode,
            arg1: None,
            arg2: None,
            return_convention: ReturnConvention::Default,
            location: Location::default(),
        }
    }

    fn effective_mnemonic(&self) -> Mnemonic {
        // ADD and SUB aren't real mnemonics, but follow ADC's addressing
        // rules.
        match self.mnemonic {
            Mnemonic::ADD | Mnemonic::SUB => Mnemonic::ADC,
            m => m,
        }
    }

    /// Checks that this instruction is expressible at all, and that its
    /// immediate width agrees with the flag state in force.
    pub fn check_consistency(&self, flags: &StatusFlags) -> Result<()> {
        use AddressingMode::*;

        if !is_legal_combination(self.effective_mnemonic(), self.mode) {
            return Err(err!(
                "logic error: instruction {} with addressing mode {:?} is inconsistent",
                self.mnemonic,
                self.mode
            ));
        }

        match self.mode {
            ImmediateMFlag => {
                if !flags.m_bit().is_known() {
                    return Err(err!(
                        "instruction {} with immediate argument depends on `m` flag state, \
                         which is unknown here",
                        self.mnemonic
                    ));
                }
            }
            ImmediateXFlag => {
                if !flags.x_bit().is_known() {
                    return Err(err!(
                        "instruction {} with immediate argument depends on `x` flag state, \
                         which is unknown here",
                        self.mnemonic
                    ));
                }
            }
            Immediate8 | Immediate16 => {
                let (target_flag, actual_bit) = if immediate_uses_m_bit(self.mnemonic) {
                    ('m', flags.m_bit())
                } else if immediate_uses_x_bit(self.mnemonic) {
                    ('x', flags.x_bit())
                } else {
                    // This instruction has a fixed-width immediate; there is
                    // no flag state to agree with.
                    return Ok(());
                };
                let needed_bit =
                    if self.mode == Immediate8 { BitState::On } else { BitState::Off };
                if !actual_bit.is_known() {
                    return Err(err!(
                        "instruction {} with immediate argument depends on `{target_flag}` flag \
                         state, which is unknown here",
                        self.mnemonic
                    ));
                }
                if actual_bit == BitState::On && needed_bit == BitState::Off {
                    return Err(err!(
                        "instruction {} has 16-bit immediate argument, but `{target_flag}` \
                         status flag is on here (so an 8-bit argument is required)",
                        self.mnemonic
                    ));
                }
                if actual_bit == BitState::Off && needed_bit == BitState::On {
                    return Err(err!(
                        "instruction {} has 8-bit immediate argument, but `{target_flag}` \
                         status flag is off here (so a 16-bit argument is required)",
                        self.mnemonic
                    ));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Rewrites a flex-immediate mode to its concrete width using the
    /// governing flag bit. No-op for every other mode.
    pub fn fix_addressing_mode(&mut self, flags: &StatusFlags) -> Result<()> {
        use AddressingMode::*;
        let (target_flag, bit) = match self.mode {
            ImmediateMFlag => ('m', flags.m_bit()),
            ImmediateXFlag => ('x', flags.x_bit()),
            _ => return Ok(()),
        };
        match bit {
            BitState::On => self.mode = Immediate8,
            BitState::Off => self.mode = Immediate16,
            _ => {
                return Err(err!(
                    "instruction {} with immediate argument depends on `{target_flag}` flag \
                     state, which is unknown here",
                    self.mnemonic
                ))
            }
        }
        Ok(())
    }

    /// Resolves this instruction's encoded width during sizing: a `.b`/`.w`
    /// suffix forces the immediate width, otherwise a flex immediate
    /// follows the flag state. Ends with a consistency check either way.
    pub fn resolve_width(&mut self, flags: &StatusFlags) -> Result<()> {
        if self.mode.is_flex_immediate() {
            match self.suffix {
                Suffix::B => self.mode = AddressingMode::Immediate8,
                Suffix::W => self.mode = AddressingMode::Immediate16,
                Suffix::None => self.fix_addressing_mode(flags)?,
            }
        }
        self.check_consistency(flags)
    }

    /// Computes the flag state after this instruction, for the fallthrough
    /// path of a branch.
    pub fn execute(&self, flags_in: &StatusFlags) -> Result<StatusFlags> {
        use Mnemonic::*;

        self.check_consistency(flags_in)?;

        // A call with a `yields` convention attached forces the post-state.
        if let Some(yielded) = self.return_convention.yield_state() {
            return Ok(*yielded);
        }

        let mut flags = *flags_in;
        match self.mnemonic {
            // Instructions that prime the carry bit for XCE. After a taken
            // BCC the carry is known set on the fallthrough, and vice
            // versa.
            SEC | BCC => flags.set_c_bit(BitState::On),
            CLC | BCS => flags.set_c_bit(BitState::Off),

            // Explicit status-bit writes. Bit 0x20 is `m`, 0x10 is `x`,
            // 0x01 is `c`.
            REP | SEP => {
                let target =
                    if self.mnemonic == REP { BitState::Off } else { BitState::On };
                let arg = self
                    .arg1
                    .as_ref()
                    .map(|a| a.evaluate(&NullLookupContext))
                    .transpose();
                match arg {
                    Ok(Some(mask)) => {
                        if mask & 0x01 != 0 {
                            flags.set_c_bit(target);
                        }
                        if mask & 0x10 != 0 {
                            flags.set_x_bit(target);
                        }
                        if mask & 0x20 != 0 {
                            flags.set_m_bit(target);
                        }
                    }
                    // With an unknown mask each bit either becomes `target`
                    // or stays put, so bits already at `target` survive and
                    // the rest become ambiguous.
                    _ => {
                        if flags.c_bit() != target {
                            flags.set_c_bit(BitState::Unknown);
                        }
                        if flags.x_bit() != target {
                            flags.set_x_bit(BitState::Unknown);
                        }
                        if flags.m_bit() != target {
                            flags.set_m_bit(BitState::Unknown);
                        }
                    }
                }
            }

            // The stack-tracking heuristic: a PLP gets whatever the last
            // PHP pushed.
            PHP => flags.push_flags(),
            PLP => flags.pull_flags(),

            XCE => flags.exchange_c_e(),

            // Arithmetic leaves the carry in a data-dependent state.
            ADC | SBC | ADD | SUB | CMP | CPX | CPY | ASL | LSR | ROL | ROR => {
                flags.set_c_bit(BitState::Unknown)
            }

            // Subroutine and interrupt calls trash the carry unless a
            // convention says otherwise.
            JMP | JSL | JSR | BRK | COP => flags.set_c_bit(BitState::Unknown),

            _ => {}
        }
        Ok(flags)
    }

    /// Computes the flag state on the taken side of a branch.
    pub fn execute_branch(&self, flags_in: &StatusFlags) -> Result<StatusFlags> {
        let mut flags = self.execute(flags_in)?;
        if self.mnemonic == Mnemonic::BCC {
            flags.set_c_bit(BitState::Off);
        } else if self.mnemonic == Mnemonic::BCS {
            flags.set_c_bit(BitState::On);
        }
        Ok(flags)
    }

    /// Encoded size in bytes. Pseudo-mnemonics cost one prefix byte; an
    /// unresolved flex immediate sizes to zero.
    pub fn serialized_size(&self) -> u32 {
        let overhead = if self.mnemonic.is_pseudo() { 1 } else { 0 };
        instruction_length(self.mode) + overhead
    }

    /// True if control never continues to the following instruction.
    pub fn is_exit_instruction(&self) -> bool {
        use Mnemonic::*;
        matches!(self.mnemonic, JMP | RTL | RTS | RTI | STP | BRA | BRL)
            || self.return_convention.is_exit_call()
    }

    fn eval_arg1(&self, context: &dyn LookupContext) -> Result<i32> {
        self.arg1
            .as_ref()
            .ok_or_else(|| err!("logic error: instruction {} is missing an argument", self.mnemonic))?
            .evaluate(context)
    }

    /// Emits this instruction at `address` into `sink`. The addressing
    /// mode must already be concrete.
    pub fn assemble(
        &self,
        address: Addr,
        context: &dyn LookupContext,
        sink: &mut dyn OutputSink,
    ) -> Result<()> {
        use AddressingMode::*;

        let mut output: SmallVec<[u8; 5]> = SmallVec::new();

        let true_mnemonic = match self.mnemonic {
            // Expand the pseudo-mnemonic prefix: CLC before ADC, SEC
            // before SBC.
            Mnemonic::ADD => {
                output.push(0x18);
                Mnemonic::ADC
            }
            Mnemonic::SUB => {
                output.push(0x38);
                Mnemonic::SBC
            }
            m => m,
        };

        if self.mode.is_flex_immediate() {
            return Err(err!("logic error: size of immediate argument not known"));
        }

        let opcode = encode_opcode(true_mnemonic, self.mode).ok_or_else(|| {
            err!("logic error: illegal mnemonic / addressing mode pair")
        })?;
        output.push(opcode);

        match self.mode {
            Implied | Accumulator => {}
            Immediate8 | DirectPage | DirectPageX | DirectPageY | DirectPageIndirect
            | DirectPageXIndirect | DirectPageIndirectY | DirectPageIndirectLong
            | DirectPageIndirectLongY | StackRelative | StackRelativeIndirectY => {
                let value = self.eval_arg1(context)?;
                output.push((value & 0xFF) as u8);
            }
            Immediate16 | Absolute | AbsoluteX | AbsoluteY | AbsoluteIndirect
            | AbsoluteXIndirect | AbsoluteIndirectLong => {
                let value = self.eval_arg1(context)?;
                output.push((value & 0xFF) as u8);
                output.push(((value >> 8) & 0xFF) as u8);
            }
            AbsoluteLong | AbsoluteLongX => {
                let value = self.eval_arg1(context)?;
                output.push((value & 0xFF) as u8);
                output.push(((value >> 8) & 0xFF) as u8);
                output.push(((value >> 16) & 0xFF) as u8);
            }
            BlockMove => {
                let src = self.eval_arg1(context)?;
                let dst = self
                    .arg2
                    .as_ref()
                    .ok_or_else(|| err!("logic error: block move missing second argument"))?
                    .evaluate(context)?;
                // Destination bank is encoded first, reversing the source
                // text's order.
                output.push((dst & 0xFF) as u8);
                output.push((src & 0xFF) as u8);
            }
            Relative8 => {
                let target = self.eval_arg1(context)?;
                let branch_base = address.add_wrapped(self.serialized_size() as i32);
                let offset = target - branch_base.raw() as i32;
                if !(-128..=127).contains(&offset) {
                    return Err(err!("Relative branch too far"));
                }
                output.push((offset & 0xFF) as u8);
            }
            Relative16 => {
                let target = self.eval_arg1(context)?;
                let branch_base = address.add_wrapped(self.serialized_size() as i32);
                let offset = target - branch_base.raw() as i32;
                if !(-32768..=32767).contains(&offset) {
                    return Err(err!("Relative branch too far"));
                }
                output.push((offset & 0xFF) as u8);
                output.push(((offset >> 8) & 0xFF) as u8);
            }
            ImmediateMFlag | ImmediateXFlag => unreachable!(),
        }

        sink.write(address, &output)
    }

    /// The statically known destination of a far jump or call, if any.
    /// Word-mode jumps stay in the bank they were issued from.
    pub fn far_branch_target(&self, source_address: Addr) -> Option<Addr> {
        self.far_branch_target_with(source_address, &NullLookupContext)
    }

    /// As [`far_branch_target`], with operands resolved against `context`.
    ///
    /// [`far_branch_target`]: Instruction::far_branch_target
    pub fn far_branch_target_with(
        &self,
        source_address: Addr,
        context: &dyn LookupContext,
    ) -> Option<Addr> {
        use Mnemonic::*;
        match (self.mnemonic, self.mode) {
            (JMP | JSL, AddressingMode::AbsoluteLong) => {
                let target = self.arg1.as_ref()?.evaluate(context).ok()?;
                Some(Addr::new(target as u32 & 0xFF_FFFF))
            }
            (JMP | JSR, AddressingMode::Absolute) => {
                let target = self.arg1.as_ref()?.evaluate(context).ok()?;
                Some(Addr::new(
                    (source_address.raw() & 0xFF0000) | (target as u32 & 0xFFFF),
                ))
            }
            _ => None,
        }
    }

    /// Decodes one instruction from a byte stream. Flex immediates resolve
    /// through the incoming flag state; an unknown governing bit is a
    /// decode failure.
    pub fn decode(bytes: &[u8], flags: &StatusFlags) -> Result<Instruction> {
        use AddressingMode::*;

        let (&opcode_byte, mut operands) = bytes
            .split_first()
            .ok_or_else(|| err!("Not enough bytes to decode an instruction"))?;
        let opcode = decode_opcode(opcode_byte);
        let mut instruction = Instruction::new(opcode.mnemonic, opcode.mode);

        if instruction.mode.is_flex_immediate() {
            let narrow_register = if instruction.mode == ImmediateMFlag {
                flags.m_bit()
            } else {
                flags.x_bit()
            };
            instruction.mode = match narrow_register {
                BitState::On => Immediate8,
                BitState::Off => Immediate16,
                _ => {
                    return Err(err!(
                        "Cannot decode {}: immediate width depends on an unknown flag state",
                        opcode.mnemonic
                    ))
                }
            };
        }

        fn take<'a>(operands: &mut &'a [u8], n: usize) -> Result<&'a [u8]> {
            if operands.len() < n {
                return Err(err!("Not enough bytes to decode an instruction"));
            }
            let (head, tail) = operands.split_at(n);
            *operands = tail;
            Ok(head)
        }

        match instruction.mode {
            Implied | Accumulator => {}
            AbsoluteLong | AbsoluteLongX => {
                let b = take(&mut operands, 3)?;
                let value = b[0] as i32 | (b[1] as i32) << 8 | (b[2] as i32) << 16;
                instruction.arg1 = Some(Expression::literal(value, NumericType::Long));
            }
            Immediate16 | Absolute | AbsoluteX | AbsoluteY | AbsoluteIndirect
            | AbsoluteXIndirect | AbsoluteIndirectLong => {
                let b = take(&mut operands, 2)?;
                let value = b[0] as i32 | (b[1] as i32) << 8;
                instruction.arg1 = Some(Expression::literal(value, NumericType::Word));
            }
            Immediate8 | DirectPage | DirectPageX | DirectPageY | DirectPageIndirect
            | DirectPageXIndirect | DirectPageIndirectY | DirectPageIndirectLong
            | DirectPageIndirectLongY | StackRelative | StackRelativeIndirectY => {
                let b = take(&mut operands, 1)?;
                instruction.arg1 = Some(Expression::literal(b[0] as i32, NumericType::Byte));
            }
            BlockMove => {
                let b = take(&mut operands, 2)?;
                // The destination bank is stored first; arg1 is the source,
                // as in source text.
                instruction.arg1 = Some(Expression::literal(b[1] as i32, NumericType::Byte));
                instruction.arg2 = Some(Expression::literal(b[0] as i32, NumericType::Byte));
            }
            Relative8 => {
                let b = take(&mut operands, 1)?;
                instruction.arg1 =
                    Some(Expression::literal(b[0] as i32, NumericType::SignedByte));
            }
            Relative16 => {
                let b = take(&mut operands, 2)?;
                let value = b[0] as i32 | (b[1] as i32) << 8;
                instruction.arg1 = Some(Expression::literal(value, NumericType::SignedWord));
            }
            ImmediateMFlag | ImmediateXFlag => unreachable!(),
        }
        Ok(instruction)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}",
            self.mnemonic,
            self.suffix,
            args_to_string(self.mode, self.arg1.as_ref(), self.arg2.as_ref()),
            self.return_convention
        )
    }
}

// -------------------------------------------------------------------------------------------------
