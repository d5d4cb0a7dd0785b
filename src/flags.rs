use std::fmt;

// The status-flag state tracks whether the 65816 is in emulation mode or
// native mode, and in native mode the values of the `m` and `x` size bits.
// The `c` (carry) bit is tracked too, because the emulation bit can only be
// set through it, and a limited record is kept of the `m` and `x` bits as
// last pushed on the stack.
//
// Bit states convert to names and back for use in assembler directives and
// error messages. The naming scheme:
//   unk    (entirely unknown)
//   emu    (`e` bit on)
//   native (`e` bit off, `m` and `x` unknown)
//   m8x8, m8x16, m16x8, m16x16, m8, x16, ... (native, with the named
//   halves pinned and the omitted ones unknown)

/// Compile-time knowledge about one status bit.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum BitState {
    /// Known to be zero.
    Off,
    /// Known to be one.
    On,
    /// Still holds whatever value it had on subroutine entry.
    Original,
    /// Nothing is known.
    #[default]
    Unknown,
}

impl BitState {
    /// Merges knowledge about the same bit arriving over two code paths.
    #[must_use]
    pub fn merge(self, rhs: BitState) -> BitState {
        if self == rhs {
            self
        } else {
            BitState::Unknown
        }
    }

    /// Constrains an `m` or `x` bit through the current `e` bit. Emulation
    /// mode forces both size bits on; otherwise the bit passes through,
    /// except that an unknown `e` leaves only a known-on bit intact.
    #[must_use]
    pub fn constrain(self, e: BitState) -> BitState {
        use BitState::*;
        match e {
            On => On,
            Off | Original => self,
            Unknown => {
                if self == On {
                    On
                } else {
                    Unknown
                }
            }
        }
    }

    #[must_use]
    pub fn is_known(self) -> bool {
        matches!(self, BitState::On | BitState::Off)
    }
}

// -------------------------------------------------------------------------------------------------

/// The statically tracked `(e, m, x, c)` state, plus the shadow copy of the
/// size bits most recently pushed with `php`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct StatusFlags {
    e_bit:        BitState,
    m_bit:        BitState,
    x_bit:        BitState,
    pushed_m_bit: BitState,
    pushed_x_bit: BitState,
    c_bit:        BitState,
}

impl StatusFlags {
    pub fn new(e_bit: BitState, m_bit: BitState, x_bit: BitState) -> Self {
        Self {
            e_bit,
            m_bit: m_bit.constrain(e_bit),
            x_bit: x_bit.constrain(e_bit),
            pushed_m_bit: BitState::Unknown,
            pushed_x_bit: BitState::Unknown,
            c_bit: BitState::Unknown,
        }
    }

    pub fn e_bit(&self) -> BitState {
        self.e_bit
    }

    pub fn m_bit(&self) -> BitState {
        self.m_bit
    }

    pub fn x_bit(&self) -> BitState {
        self.x_bit
    }

    pub fn c_bit(&self) -> BitState {
        self.c_bit
    }

    pub fn set_m_bit(&mut self, state: BitState) {
        self.m_bit = state.constrain(self.e_bit);
    }

    pub fn set_x_bit(&mut self, state: BitState) {
        self.x_bit = state.constrain(self.e_bit);
    }

    pub fn set_c_bit(&mut self, state: BitState) {
        self.c_bit = state;
    }

    /// Snapshots the size bits, as `php` does.
    pub fn push_flags(&mut self) {
        self.pushed_m_bit = self.m_bit;
        self.pushed_x_bit = self.x_bit;
    }

    /// Restores the size bits from the shadow, as `plp` is modeled. Both
    /// halves restore from the pushed `m` shadow; the `x` shadow is written
    /// but never read back. This matches the observable behavior the rest
    /// of the analysis is calibrated against.
    pub fn pull_flags(&mut self) {
        self.m_bit = self.pushed_m_bit.constrain(self.e_bit);
        self.x_bit = self.pushed_m_bit.constrain(self.e_bit);
        self.pushed_m_bit = BitState::Unknown;
        self.pushed_x_bit = BitState::Unknown;
    }

    /// Swaps `c` and `e`, then re-constrains the size bits. This is the
    /// `xce` instruction.
    pub fn exchange_c_e(&mut self) {
        std::mem::swap(&mut self.c_bit, &mut self.e_bit);
        self.m_bit = self.m_bit.constrain(self.e_bit);
        self.x_bit = self.x_bit.constrain(self.e_bit);
    }

    /// Converts this state into an "incoming" state at a subroutine entry:
    /// every unknown bit becomes `Original`.
    pub fn set_incoming(&mut self) {
        for bit in [&mut self.e_bit, &mut self.m_bit, &mut self.x_bit, &mut self.c_bit] {
            if *bit == BitState::Unknown {
                *bit = BitState::Original;
            }
        }
    }

    /// Merges two flag states into the superposition of both, for
    /// instructions reachable over multiple code paths.
    #[must_use]
    pub fn merge(&self, rhs: &StatusFlags) -> StatusFlags {
        StatusFlags {
            e_bit:        self.e_bit.merge(rhs.e_bit),
            m_bit:        self.m_bit.merge(rhs.m_bit),
            x_bit:        self.x_bit.merge(rhs.x_bit),
            pushed_m_bit: self.pushed_m_bit.merge(rhs.pushed_m_bit),
            pushed_x_bit: self.pushed_x_bit.merge(rhs.pushed_x_bit),
            c_bit:        self.c_bit.merge(rhs.c_bit),
        }
    }

    /// Parses a flag-state name: `unk`, `emu`, `native`, or some
    /// combination of `m8`/`m16` and `x8`/`x16` with either half omitted.
    /// Case-insensitive; the whole name must be consumed.
    pub fn from_name(name: &str) -> Option<StatusFlags> {
        use BitState::*;
        let lower = name.to_ascii_lowercase();
        match lower.as_str() {
            "unk" => return Some(StatusFlags::new(Unknown, Unknown, Unknown)),
            "emu" => return Some(StatusFlags::new(On, On, On)),
            "native" => return Some(StatusFlags::new(Off, Unknown, Unknown)),
            "" => return None,
            _ => {}
        }

        let mut rest = lower.as_str();
        let mut m_bit = Unknown;
        let mut x_bit = Unknown;
        if let Some(tail) = rest.strip_prefix('m') {
            let (bit, tail) = consume_width(tail)?;
            m_bit = bit;
            rest = tail;
        }
        if let Some(tail) = rest.strip_prefix('x') {
            let (bit, tail) = consume_width(tail)?;
            x_bit = bit;
            rest = tail;
        }
        if !rest.is_empty() {
            return None;
        }
        Some(StatusFlags::new(Off, m_bit, x_bit))
    }

    /// The canonical name of this state; the inverse of [`from_name`]
    /// wherever one exists.
    ///
    /// [`from_name`]: StatusFlags::from_name
    pub fn name(&self) -> String {
        use BitState::*;
        if !self.e_bit.is_known() {
            return "unk".to_string();
        }
        if self.e_bit == On {
            return "emu".to_string();
        }
        let m_str = match self.m_bit {
            On => "m8",
            Off => "m16",
            _ => "",
        };
        let x_str = match self.x_bit {
            On => "x8",
            Off => "x16",
            _ => "",
        };
        if m_str.is_empty() && x_str.is_empty() {
            return "native".to_string();
        }
        format!("{m_str}{x_str}")
    }
}

/// Reads an `8` or `16` width suffix off the front of a flag name.
fn consume_width(s: &str) -> Option<(BitState, &str)> {
    if let Some(tail) = s.strip_prefix("16") {
        Some((BitState::Off, tail))
    } else if let Some(tail) = s.strip_prefix('8') {
        Some((BitState::On, tail))
    } else {
        None
    }
}

impl fmt::Display for StatusFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c_str = match self.c_bit {
            BitState::On => ", c=1",
            BitState::Off => ", c=0",
            _ => "",
        };
        write!(f, "{}{}", self.name(), c_str)
    }
}

// -------------------------------------------------------------------------------------------------
