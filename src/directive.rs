use std::fmt;

use itertools::Itertools;

use crate::{
    addr::Addr,
    error::{err, Location, Result},
    expr::{Expression, LookupContext},
    flags::StatusFlags,
    instruction::ReturnConvention,
    sink::OutputSink,
};

// -------------------------------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DirectiveName {
    Begin,
    Db,
    Dl,
    Dw,
    End,
    Entry,
    Equ,
    Halt,
    Mode,
    Module,
    Org,
    Remote,
}

impl DirectiveName {
    /// Parses a directive spelling, leading dot included, case-insensitively.
    pub fn parse(s: &str) -> Option<DirectiveName> {
        use DirectiveName::*;
        Some(match s.to_ascii_lowercase().as_str() {
            ".begin" => Begin,
            ".db" => Db,
            ".dl" => Dl,
            ".dw" => Dw,
            ".end" => End,
            ".entry" => Entry,
            ".equ" => Equ,
            ".halt" => Halt,
            ".mode" => Mode,
            ".module" => Module,
            ".org" => Org,
            ".remote" => Remote,
            _ => return None,
        })
    }
}

impl fmt::Display for DirectiveName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use DirectiveName::*;
        let text = match self {
            Begin => ".begin",
            Db => ".db",
            Dl => ".dl",
            Dw => ".dw",
            End => ".end",
            Entry => ".entry",
            Equ => ".equ",
            Halt => ".halt",
            Mode => ".mode",
            Module => ".module",
            Org => ".org",
            Remote => ".remote",
        };
        write!(f, "{text}")
    }
}

/// The argument shape a directive accepts.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DirectiveKind {
    /// `.begin`, `.end`, `.halt`
    NoArg,
    /// `.equ EXPR` — may reference names resolved later
    SingleArg,
    /// `.org EXPR` — must evaluate without lookup
    ConstantArg,
    /// `.mode FLAGS`
    FlagArg,
    /// `.entry FLAGS [yields FLAGS | noreturn]`
    CallingConventionArg,
    /// `.db/.dw/.dl EXPR, EXPR, ...`
    ListArg,
    /// `.module NAME`
    NameArg,
    /// `.remote EXPR FLAGS [yields FLAGS | noreturn]`
    RemoteArg,
}

pub fn directive_kind(name: DirectiveName) -> DirectiveKind {
    use DirectiveName::*;
    match name {
        Begin | End | Halt => DirectiveKind::NoArg,
        Db | Dl | Dw => DirectiveKind::ListArg,
        Equ => DirectiveKind::SingleArg,
        Org => DirectiveKind::ConstantArg,
        Mode => DirectiveKind::FlagArg,
        Entry => DirectiveKind::CallingConventionArg,
        Module => DirectiveKind::NameArg,
        Remote => DirectiveKind::RemoteArg,
    }
}

// -------------------------------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct Directive {
    pub name:              DirectiveName,
    pub argument:          Option<Expression>,
    pub list_argument:     Vec<Expression>,
    pub flag_argument:     Option<StatusFlags>,
    pub return_convention: ReturnConvention,
    pub location:          Location,
}

impl Directive {
    pub fn new(name: DirectiveName) -> Self {
        Self {
            name,
            argument: None,
            list_argument: Vec::new(),
            flag_argument: None,
            return_convention: ReturnConvention::Default,
            location: Location::default(),
        }
    }

    /// Bytes this directive contributes to the output image.
    pub fn serialized_size(&self) -> u32 {
        let per_entry = match self.name {
            DirectiveName::Db => 1,
            DirectiveName::Dw => 2,
            DirectiveName::Dl => 3,
            _ => return 0,
        };
        per_entry * self.list_argument.len() as u32
    }

    /// Emits `.db`/`.dw`/`.dl` payloads little-endian; all other
    /// directives emit nothing.
    pub fn assemble(
        &self,
        address: Addr,
        context: &dyn LookupContext,
        sink: &mut dyn OutputSink,
    ) -> Result<()> {
        let width = match self.name {
            DirectiveName::Db => 1,
            DirectiveName::Dw => 2,
            DirectiveName::Dl => 3,
            _ => return Ok(()),
        };
        let mut bytes = Vec::with_capacity(self.list_argument.len() * width);
        for expr in &self.list_argument {
            let value = expr.evaluate(context)?;
            for i in 0..width {
                bytes.push(((value >> (8 * i)) & 0xFF) as u8);
            }
        }
        sink.write(address, &bytes)
    }

    pub fn is_exit_instruction(&self) -> bool {
        self.name == DirectiveName::Halt
    }

    /// The expression argument, or a logic error for directives that must
    /// have one.
    pub fn required_argument(&self) -> Result<&Expression> {
        self.argument.as_ref().ok_or_else(|| {
            err!("logic error: {} directive is missing its argument", self.name)
                .with_location(&self.location)
        })
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(argument) = &self.argument {
            write!(f, " {argument}")?;
        }
        if !self.list_argument.is_empty() {
            write!(f, " {}", self.list_argument.iter().map(|e| e.to_string()).join(", "))?;
        }
        if let Some(flags) = &self.flag_argument {
            write!(f, " {}", flags.name())?;
        }
        write!(f, "{}", self.return_convention)
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{addr::NumericType, expr::NullLookupContext, sink::VecSink};

    fn data_directive(name: DirectiveName, values: &[i32]) -> Directive {
        let mut d = Directive::new(name);
        d.list_argument =
            values.iter().map(|v| Expression::literal(*v, NumericType::Unknown)).collect();
        d
    }

    #[test]
    fn sizes() {
        assert_eq!(data_directive(DirectiveName::Db, &[1, 2, 3]).serialized_size(), 3);
        assert_eq!(data_directive(DirectiveName::Dw, &[1, 2]).serialized_size(), 4);
        assert_eq!(data_directive(DirectiveName::Dl, &[1]).serialized_size(), 3);
        assert_eq!(Directive::new(DirectiveName::Org).serialized_size(), 0);
    }

    #[test]
    fn data_emission_is_little_endian() {
        let mut sink = VecSink::new();
        data_directive(DirectiveName::Dw, &[0x1234, 0x5678])
            .assemble(Addr::new(0x8000), &NullLookupContext, &mut sink)
            .unwrap();
        assert_eq!(
            sink.range(Addr::new(0x8000), 4).unwrap(),
            vec![0x34, 0x12, 0x78, 0x56]
        );

        let mut sink = VecSink::new();
        data_directive(DirectiveName::Dl, &[0x123456])
            .assemble(Addr::new(0x8000), &NullLookupContext, &mut sink)
            .unwrap();
        assert_eq!(sink.range(Addr::new(0x8000), 3).unwrap(), vec![0x56, 0x34, 0x12]);
    }

    #[test]
    fn directive_names_round_trip() {
        use DirectiveName::*;
        for name in [Begin, Db, Dl, Dw, End, Entry, Equ, Halt, Mode, Module, Org, Remote] {
            assert_eq!(DirectiveName::parse(&name.to_string()), Some(name));
            assert_eq!(DirectiveName::parse(&name.to_string().to_ascii_uppercase()), Some(name));
        }
        assert_eq!(DirectiveName::parse(".bogus"), None);
    }
}
