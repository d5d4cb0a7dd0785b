use std::fmt;

use crate::{
    addr::Addr,
    directive::Directive,
    error::{Location, Result},
    expr::LookupContext,
    instruction::Instruction,
    sink::OutputSink,
};

/// One line of an assembly module: a machine instruction or a directive.
#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    Instruction(Instruction),
    Directive(Directive),
}

impl Statement {
    pub fn instruction(&self) -> Option<&Instruction> {
        match self {
            Statement::Instruction(i) => Some(i),
            _ => None,
        }
    }

    pub fn instruction_mut(&mut self) -> Option<&mut Instruction> {
        match self {
            Statement::Instruction(i) => Some(i),
            _ => None,
        }
    }

    pub fn directive(&self) -> Option<&Directive> {
        match self {
            Statement::Directive(d) => Some(d),
            _ => None,
        }
    }

    pub fn location(&self) -> &Location {
        match self {
            Statement::Instruction(i) => &i.location,
            Statement::Directive(d) => &d.location,
        }
    }

    pub fn serialized_size(&self) -> u32 {
        match self {
            Statement::Instruction(i) => i.serialized_size(),
            Statement::Directive(d) => d.serialized_size(),
        }
    }

    /// True if control never continues past this statement.
    pub fn is_exit_instruction(&self) -> bool {
        match self {
            Statement::Instruction(i) => i.is_exit_instruction(),
            Statement::Directive(d) => d.is_exit_instruction(),
        }
    }

    pub fn assemble(
        &self,
        address: Addr,
        context: &dyn LookupContext,
        sink: &mut dyn OutputSink,
    ) -> Result<()> {
        match self {
            Statement::Instruction(i) => i.assemble(address, context, sink),
            Statement::Directive(d) => d.assemble(address, context, sink),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Instruction(i) => write!(f, "{i}"),
            Statement::Directive(d) => write!(f, "{d}"),
        }
    }
}
