use smallvec::SmallVec;

use crate::{
    error::Result,
    expr::NullLookupContext,
    flags::{BitState, StatusFlags},
    instruction::Instruction,
    opcodes::Mnemonic,
};

// -------------------------------------------------------------------------------------------------

/// Static knowledge about a 16-bit register: a concrete value, "still holds
/// whatever it held at subroutine entry", or nothing.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum RegisterValue {
    #[default]
    Unknown,
    Original,
    Value(u16),
}

impl RegisterValue {
    pub fn value(self) -> Option<u16> {
        match self {
            RegisterValue::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Adjusts a known value in place, wrapping within `mask`. Anything
    /// else degrades to unknown.
    pub fn add(&mut self, offset: i32, mask: u16) {
        *self = match *self {
            RegisterValue::Value(v) => {
                RegisterValue::Value((v.wrapping_add(offset as u16)) & mask)
            }
            _ => RegisterValue::Unknown,
        };
    }

    pub fn merge(&mut self, rhs: RegisterValue) {
        if *self != rhs {
            *self = RegisterValue::Unknown;
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Which architectural register a tracked stack slot belongs to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RegisterKind {
    A,
    X,
    Y,
}

/// One symbolic stack slot.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum StackValue {
    Unknown,
    /// A known literal byte.
    Byte(u8),
    /// A pushed status-flags snapshot.
    Flags(StatusFlags),
    /// High byte of a register still holding its original value.
    RegHigh(RegisterKind),
    /// Low byte of a register still holding its original value.
    RegLow(RegisterKind),
    /// A whole register pushed while its width was `Original`; `original`
    /// records whether the register still held its entry value.
    RegVarSize { kind: RegisterKind, original: bool },
    /// The data bank register's original value.
    Dbr,
}

impl StackValue {
    /// Builds the slot for one pushed byte of `reg`.
    fn reg_byte(kind: RegisterKind, reg: RegisterValue, high: bool) -> StackValue {
        match reg {
            RegisterValue::Original => {
                if high {
                    StackValue::RegHigh(kind)
                } else {
                    StackValue::RegLow(kind)
                }
            }
            RegisterValue::Unknown => StackValue::Unknown,
            RegisterValue::Value(v) => {
                StackValue::Byte(if high { (v >> 8) as u8 } else { v as u8 })
            }
        }
    }

    pub fn is_var_size(&self) -> bool {
        matches!(self, StackValue::RegVarSize { .. })
    }

    /// Slots of different variable-size classes cannot coexist after a
    /// merge; everything fixed-size can collapse to `Unknown` instead.
    pub fn can_merge_with(&self, rhs: &StackValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(rhs)
            || (!self.is_var_size() && !rhs.is_var_size())
    }

    pub fn merge(&mut self, rhs: &StackValue) {
        match (&mut *self, rhs) {
            (StackValue::Byte(lhs), StackValue::Byte(rhs)) => {
                if lhs != rhs {
                    *self = StackValue::Unknown;
                }
            }
            (StackValue::Flags(lhs), StackValue::Flags(rhs)) => {
                *lhs = lhs.merge(rhs);
            }
            (
                StackValue::RegVarSize { kind, original },
                StackValue::RegVarSize { kind: rhs_kind, original: rhs_original },
            ) if kind == rhs_kind => {
                *original = *original && *rhs_original;
            }
            (lhs, rhs) if *lhs == *rhs => {}
            _ => *self = StackValue::Unknown,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Static-analysis model of the hardware stack. Inconsistent use (popping
/// a variable-sized slot under a fixed-size regime, popping from empty)
/// abandons the model, silencing further stack reasoning.
#[derive(Clone, Debug, PartialEq)]
pub struct Stack {
    abandoned: bool,
    slots:     SmallVec<[StackValue; 16]>,
}

impl Default for Stack {
    fn default() -> Self {
        Self { abandoned: false, slots: SmallVec::new() }
    }
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned
    }

    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    /// Gives up on stack tracking for this code path.
    pub fn abandon(&mut self) {
        self.abandoned = true;
        self.slots.clear();
    }

    pub fn push_byte(&mut self, value: u8) {
        if !self.abandoned {
            self.slots.push(StackValue::Byte(value));
        }
    }

    pub fn push_unknown_byte(&mut self) {
        if !self.abandoned {
            self.slots.push(StackValue::Unknown);
        }
    }

    pub fn push_word(&mut self, value: u16) {
        // The stack grows downward, so pushing the high byte first leaves
        // the word little-endian in memory.
        self.push_byte((value >> 8) as u8);
        self.push_byte(value as u8);
    }

    pub fn push_unknown_word(&mut self) {
        self.push_unknown_byte();
        self.push_unknown_byte();
    }

    pub fn push_flags(&mut self, flags: StatusFlags) {
        if !self.abandoned {
            self.slots.push(StackValue::Flags(flags));
        }
    }

    pub fn push_dbr(&mut self, dbr: RegisterValue) {
        if !self.abandoned {
            self.slots.push(match dbr {
                RegisterValue::Original => StackValue::Dbr,
                RegisterValue::Unknown => StackValue::Unknown,
                RegisterValue::Value(v) => StackValue::Byte(v as u8),
            });
        }
    }

    pub fn pull_byte(&mut self) -> StackValue {
        if self.abandoned || self.slots.is_empty() {
            self.abandon();
            return StackValue::Unknown;
        }
        let top = *self.slots.last().unwrap();
        if top.is_var_size() {
            self.abandon();
            return StackValue::Unknown;
        }
        self.slots.pop();
        top
    }

    fn pull_var_size(&mut self) -> StackValue {
        if self.abandoned || self.slots.is_empty() {
            self.abandon();
            return StackValue::Unknown;
        }
        let top = *self.slots.last().unwrap();
        if !top.is_var_size() {
            self.abandon();
            return StackValue::Unknown;
        }
        self.slots.pop();
        top
    }

    /// Pushes `reg` under the width regime of `bit` (the `m` or `x` bit).
    pub fn push_register(&mut self, kind: RegisterKind, reg: RegisterValue, bit: BitState) {
        if self.abandoned {
            return;
        }
        match bit {
            BitState::Original => self.slots.push(StackValue::RegVarSize {
                kind,
                original: reg == RegisterValue::Original,
            }),
            BitState::Unknown => self.abandon(),
            BitState::On => self.slots.push(StackValue::reg_byte(kind, reg, false)),
            BitState::Off => {
                self.slots.push(StackValue::reg_byte(kind, reg, true));
                self.slots.push(StackValue::reg_byte(kind, reg, false));
            }
        }
    }

    /// Pulls a register under the width regime of `bit`.
    pub fn pull_register(&mut self, kind: RegisterKind, bit: BitState) -> RegisterValue {
        if self.abandoned || bit == BitState::Unknown {
            self.abandon();
            return RegisterValue::Unknown;
        }
        match bit {
            BitState::Original => match self.pull_var_size() {
                StackValue::RegVarSize { kind: pulled_kind, original }
                    if pulled_kind == kind =>
                {
                    if original {
                        RegisterValue::Original
                    } else {
                        RegisterValue::Unknown
                    }
                }
                _ => {
                    self.abandon();
                    RegisterValue::Unknown
                }
            },
            BitState::On => match self.pull_byte() {
                StackValue::RegLow(pulled_kind) if pulled_kind == kind => RegisterValue::Original,
                StackValue::Byte(value) => RegisterValue::Value(value as u16),
                _ => RegisterValue::Unknown,
            },
            _ => {
                let lo = self.pull_byte();
                let hi = self.pull_byte();
                match (lo, hi) {
                    (StackValue::RegLow(lo_kind), StackValue::RegHigh(hi_kind))
                        if lo_kind == kind && hi_kind == kind =>
                    {
                        RegisterValue::Original
                    }
                    (StackValue::Byte(lo), StackValue::Byte(hi)) => {
                        RegisterValue::Value(((hi as u16) << 8) | lo as u16)
                    }
                    _ => RegisterValue::Unknown,
                }
            }
        }
    }

    /// Merges two stack models; any structural disagreement abandons.
    pub fn merge(&mut self, rhs: &Stack) {
        let compatible = !self.abandoned
            && !rhs.abandoned
            && self.slots.len() == rhs.slots.len()
            && self
                .slots
                .iter()
                .zip(rhs.slots.iter())
                .all(|(slot, rhs_slot)| slot.can_merge_with(rhs_slot));
        if !compatible {
            self.abandon();
            return;
        }
        for (slot, rhs_slot) in self.slots.iter_mut().zip(rhs.slots.iter()) {
            slot.merge(rhs_slot);
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// The full statically tracked machine state on a line: registers, status
/// flags, and the symbolic stack.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExecutionState {
    a_reg: RegisterValue,
    x_reg: RegisterValue,
    y_reg: RegisterValue,
    dbr:   RegisterValue,
    flags: StatusFlags,
    stack: Stack,
}

impl ExecutionState {
    /// The state at a subroutine entry with the given flags: unknown flag
    /// bits become `Original`, the stack is empty.
    pub fn with_flags(mut flags: StatusFlags) -> Self {
        flags.set_incoming();
        Self { flags, ..Self::default() }
    }

    pub fn flags(&self) -> &StatusFlags {
        &self.flags
    }

    pub fn set_flags(&mut self, flags: StatusFlags) {
        self.flags = flags;
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn accumulator(&self) -> RegisterValue {
        self.a_reg
    }

    pub fn x_register(&self) -> RegisterValue {
        self.x_reg
    }

    pub fn y_register(&self) -> RegisterValue {
        self.y_reg
    }

    /// Advances this state across one instruction: stack pushes and pulls
    /// are modeled first, then the flag transition is delegated to the
    /// instruction itself.
    pub fn execute(&mut self, instruction: &Instruction) -> Result<()> {
        use Mnemonic::*;

        let x_mask = |flags: &StatusFlags| match flags.x_bit() {
            BitState::On => Some(0xFFu16),
            BitState::Off => Some(0xFFFF),
            _ => None,
        };

        match instruction.mnemonic {
            PHP => self.stack.push_flags(self.flags),
            PHA => self.stack.push_register(RegisterKind::A, self.a_reg, self.flags.m_bit()),
            PHX => self.stack.push_register(RegisterKind::X, self.x_reg, self.flags.x_bit()),
            PHY => self.stack.push_register(RegisterKind::Y, self.y_reg, self.flags.x_bit()),
            PHB => self.stack.push_dbr(self.dbr),
            PHK => self.stack.push_unknown_byte(),
            PHD => self.stack.push_unknown_word(),
            PEA => {
                let value = instruction
                    .arg1
                    .as_ref()
                    .and_then(|a| a.evaluate(&NullLookupContext).ok());
                match value {
                    Some(v) => self.stack.push_word(v as u16),
                    None => self.stack.push_unknown_word(),
                }
            }
            PEI | PER => self.stack.push_unknown_word(),
            PLA => {
                self.a_reg = self.stack.pull_register(RegisterKind::A, self.flags.m_bit())
            }
            PLX => {
                self.x_reg = self.stack.pull_register(RegisterKind::X, self.flags.x_bit())
            }
            PLY => {
                self.y_reg = self.stack.pull_register(RegisterKind::Y, self.flags.x_bit())
            }
            PLB => {
                self.dbr = match self.stack.pull_byte() {
                    StackValue::Dbr => RegisterValue::Original,
                    StackValue::Byte(v) => RegisterValue::Value(v as u16),
                    _ => RegisterValue::Unknown,
                };
            }
            PLD => {
                self.stack.pull_byte();
                self.stack.pull_byte();
            }
            PLP => {
                // The slot is consumed for bookkeeping; the flag effect
                // itself comes from the pushed-flags shadow below.
                self.stack.pull_byte();
            }

            LDA => {
                self.a_reg = immediate_value(instruction).unwrap_or_default();
            }
            LDX => {
                self.x_reg = immediate_value(instruction).unwrap_or_default();
            }
            LDY => {
                self.y_reg = immediate_value(instruction).unwrap_or_default();
            }

            TAX => self.x_reg = self.a_reg,
            TAY => self.y_reg = self.a_reg,
            TXA => self.a_reg = self.x_reg,
            TYA => self.a_reg = self.y_reg,
            TXY => self.y_reg = self.x_reg,
            TYX => self.x_reg = self.y_reg,

            INX | DEX => {
                let delta = if instruction.mnemonic == INX { 1 } else { -1 };
                match x_mask(&self.flags) {
                    Some(mask) => self.x_reg.add(delta, mask),
                    None => self.x_reg = RegisterValue::Unknown,
                }
            }
            INY | DEY => {
                let delta = if instruction.mnemonic == INY { 1 } else { -1 };
                match x_mask(&self.flags) {
                    Some(mask) => self.y_reg.add(delta, mask),
                    None => self.y_reg = RegisterValue::Unknown,
                }
            }

            // Anything else that writes the accumulator leaves it opaque.
            ADC | SBC | ADD | SUB | AND | ORA | EOR | ASL | LSR | ROL | ROR | XBA | TDC
            | TSC => self.a_reg = RegisterValue::Unknown,

            _ => {}
        }

        self.flags = instruction.execute(&self.flags)?;
        Ok(())
    }

    pub fn merge(&mut self, rhs: &ExecutionState) {
        self.a_reg.merge(rhs.a_reg);
        self.x_reg.merge(rhs.x_reg);
        self.y_reg.merge(rhs.y_reg);
        self.dbr.merge(rhs.dbr);
        self.flags = self.flags.merge(&rhs.flags);
        self.stack.merge(&rhs.stack);
    }
}

/// The literal operand of an immediate-mode instruction, as a register
/// value.
fn immediate_value(instruction: &Instruction) -> Option<RegisterValue> {
    use crate::addressing::AddressingMode::*;
    if !matches!(instruction.mode, Immediate8 | Immediate16 | ImmediateMFlag | ImmediateXFlag) {
        return None;
    }
    let value = instruction.arg1.as_ref()?.evaluate(&NullLookupContext).ok()?;
    Some(RegisterValue::Value(value as u16))
}

// -------------------------------------------------------------------------------------------------
