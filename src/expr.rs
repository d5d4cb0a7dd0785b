use std::{collections::BTreeSet, fmt};

use crate::{
    addr::NumericType,
    error::{err, Result},
};

// -------------------------------------------------------------------------------------------------

/// An identifier, optionally qualified with the module that defines it.
/// `mod::name` carries `Some("mod")`; `::name` carries `Some("")`, pinning
/// the name to the global registry; a bare `name` carries `None`.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FullIdentifier {
    module: Option<String>,
    name:   String,
}

impl FullIdentifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self { module: None, name: name.into() }
    }

    pub fn qualified(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self { module: Some(module.into()), name: name.into() }
    }

    pub fn is_qualified(&self) -> bool {
        self.module.is_some()
    }

    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for FullIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module {
            Some(module) => write!(f, "{module}::{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Resolves identifiers during expression evaluation.
pub trait LookupContext {
    fn lookup(&self, id: &FullIdentifier) -> Result<i32>;
}

/// A context with no names in it. Evaluation against it succeeds exactly
/// for expressions that don't need a lookup.
pub struct NullLookupContext;

impl LookupContext for NullLookupContext {
    fn lookup(&self, _id: &FullIdentifier) -> Result<i32> {
        Err(err!("Can't perform name lookup in this context"))
    }
}

// -------------------------------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl BinaryOp {
    pub fn apply(self, lhs: i32, rhs: i32) -> Result<i32> {
        match self {
            BinaryOp::Add => Ok(lhs.wrapping_add(rhs)),
            BinaryOp::Subtract => Ok(lhs.wrapping_sub(rhs)),
            BinaryOp::Multiply => Ok(lhs.wrapping_mul(rhs)),
            BinaryOp::Divide => {
                if rhs == 0 {
                    Err(err!("division by zero"))
                } else {
                    Ok(lhs / rhs)
                }
            }
        }
    }

    pub fn symbol(self) -> char {
        match self {
            BinaryOp::Add => '+',
            BinaryOp::Subtract => '-',
            BinaryOp::Multiply => '*',
            BinaryOp::Divide => '/',
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum UnaryOp {
    Negate,
    LowByte,
    HighByte,
    BankByte,
}

impl UnaryOp {
    pub fn apply(self, value: i32) -> i32 {
        match self {
            UnaryOp::Negate => value.wrapping_neg(),
            UnaryOp::LowByte => value & 0xFF,
            UnaryOp::HighByte => (value >> 8) & 0xFF,
            UnaryOp::BankByte => (value >> 16) & 0xFF,
        }
    }

    pub fn result_type(self, operand: NumericType) -> NumericType {
        match self {
            UnaryOp::Negate => operand.signed(),
            UnaryOp::LowByte | UnaryOp::HighByte | UnaryOp::BankByte => NumericType::Byte,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            UnaryOp::Negate => '-',
            UnaryOp::LowByte => '<',
            UnaryOp::HighByte => '>',
            UnaryOp::BankByte => '^',
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// An owned expression tree. Shared operations are implemented by
/// exhaustive match; trees never share nodes, so a deep `Clone` is the
/// copy operation.
#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    Literal {
        value: i32,
        ty:    NumericType,
    },
    Identifier {
        id: FullIdentifier,
        ty: NumericType,
    },
    Binary {
        op:  BinaryOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Unary {
        op:  UnaryOp,
        arg: Box<Expression>,
    },
    /// Disassembly-only wrapper: replaces how the wrapped expression
    /// displays, but defers to it for type and value.
    Label {
        name:  String,
        inner: Box<Expression>,
    },
}

impl Expression {
    /// A literal, coerced to its declared type up front.
    pub fn literal(value: i32, ty: NumericType) -> Expression {
        Expression::Literal { value: ty.cast(value), ty }
    }

    pub fn identifier(id: FullIdentifier, ty: NumericType) -> Expression {
        Expression::Identifier { id, ty }
    }

    pub fn binary(op: BinaryOp, lhs: Expression, rhs: Expression) -> Expression {
        Expression::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
    }

    pub fn unary(op: UnaryOp, arg: Expression) -> Expression {
        Expression::Unary { op, arg: Box::new(arg) }
    }

    pub fn evaluate(&self, context: &dyn LookupContext) -> Result<i32> {
        match self {
            Expression::Literal { value, .. } => Ok(*value),
            Expression::Identifier { id, .. } => context.lookup(id),
            Expression::Binary { op, lhs, rhs } => {
                op.apply(lhs.evaluate(context)?, rhs.evaluate(context)?)
            }
            Expression::Unary { op, arg } => Ok(op.apply(arg.evaluate(context)?)),
            Expression::Label { inner, .. } => inner.evaluate(context),
        }
    }

    pub fn ty(&self) -> NumericType {
        match self {
            Expression::Literal { ty, .. } => *ty,
            Expression::Identifier { ty, .. } => *ty,
            Expression::Binary { lhs, rhs, .. } => lhs.ty().arithmetic_conversion(rhs.ty()),
            Expression::Unary { op, arg } => op.result_type(arg.ty()),
            Expression::Label { inner, .. } => inner.ty(),
        }
    }

    /// True if evaluating this expression consults the lookup context.
    pub fn requires_lookup(&self) -> bool {
        match self {
            Expression::Literal { .. } => false,
            Expression::Identifier { .. } => true,
            Expression::Binary { lhs, rhs, .. } => lhs.requires_lookup() || rhs.requires_lookup(),
            Expression::Unary { arg, .. } => arg.requires_lookup(),
            Expression::Label { .. } => true,
        }
    }

    /// The set of module names this expression's identifiers are qualified
    /// with. Global-forced (`::name`) and bare identifiers contribute none.
    pub fn module_references(&self) -> BTreeSet<String> {
        match self {
            Expression::Literal { .. } | Expression::Label { .. } => BTreeSet::new(),
            Expression::Identifier { id, .. } => match id.module() {
                Some(module) if !module.is_empty() => BTreeSet::from([module.to_string()]),
                _ => BTreeSet::new(),
            },
            Expression::Binary { lhs, rhs, .. } => {
                let mut refs = lhs.module_references();
                refs.extend(rhs.module_references());
                refs
            }
            Expression::Unary { arg, .. } => arg.module_references(),
        }
    }

    /// The identifier's name, iff this is a bare unqualified identifier.
    pub fn simple_identifier(&self) -> Option<&str> {
        match self {
            Expression::Identifier { id, .. } if !id.is_qualified() => Some(id.name()),
            _ => None,
        }
    }

    pub fn is_label(&self) -> bool {
        matches!(self, Expression::Label { .. })
    }

    /// Renames the expression for display. Wraps a bare expression in a
    /// `Label`, or renames an existing one; labels never nest.
    pub fn apply_label(&mut self, label: impl Into<String>) {
        match self {
            Expression::Label { name, .. } => *name = label.into(),
            _ => {
                let inner = std::mem::replace(
                    self,
                    Expression::Literal { value: 0, ty: NumericType::Unknown },
                );
                *self = Expression::Label { name: label.into(), inner: Box::new(inner) };
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal { value, ty } => match ty.width() {
                Some(1) => write!(f, "${:02x}", value & 0xFF),
                Some(2) => write!(f, "${:04x}", value & 0xFFFF),
                Some(3) => write!(f, "${:06x}", value & 0xFF_FFFF),
                _ => write!(f, "{value}"),
            },
            Expression::Identifier { id, .. } => write!(f, "{id}"),
            Expression::Binary { op, lhs, rhs } => {
                write!(f, "({lhs} {} {rhs})", op.symbol())
            }
            Expression::Unary { op, arg } => write!(f, "{}{arg}", op.symbol()),
            Expression::Label { name, .. } => write!(f, "{name}"),
        }
    }
}

// -------------------------------------------------------------------------------------------------
