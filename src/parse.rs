use crate::{
    addr::NumericType,
    addressing::{deduce_mode, SyntacticAddressingMode},
    directive::{directive_kind, Directive, DirectiveKind, DirectiveName},
    error::{err, Location, Result},
    expr::{BinaryOp, Expression, FullIdentifier, UnaryOp},
    flags::StatusFlags,
    instruction::{Instruction, ReturnConvention},
    opcodes::{flag_controlling_instruction_size, Mnemonic, Suffix, VariableSizeFlag},
    statement::Statement,
    token::{Punct, Token},
};

// -------------------------------------------------------------------------------------------------

/// A label preceding a statement, with its optional `export` marker.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParsedLabel {
    pub name:     String,
    pub exported: bool,
}

/// What one source line parses into: labels and at most one statement.
#[derive(Clone, Debug, PartialEq)]
pub enum LineEntry {
    Label(ParsedLabel),
    Statement(Statement),
}

// -------------------------------------------------------------------------------------------------

// The expression grammar:
//   expr   -> term (+|-) term (+|-) term...
//   term   -> factor (*|/) factor (*|/) factor...
//   factor -> comp | -factor | <factor | >factor | ^factor
//   comp   -> literal | identifier | (expr)

struct TokenStream<'a> {
    tokens: &'a [Token],
    pos:    usize,
}

impl<'a> TokenStream<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn front(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn location(&self) -> Location {
        self.front().location.clone()
    }

    /// The end of a statement: end of line or a `:` separator.
    fn at_end(&self) -> bool {
        self.front().is_end_of_line() || self.front().is_punct(Punct::Colon)
    }

    /// As `at_end`, but a return-convention suffix also terminates the
    /// instruction body.
    fn at_end_or_suffix(&self) -> bool {
        self.at_end()
            || self.front().is_punct(Punct::Yields)
            || self.front().is_punct(Punct::NoReturn)
    }

    fn consume(&mut self, punct: Punct, expected: &str) -> Result<()> {
        if !self.front().is_punct(punct) {
            return Err(err!("Expected {expected}, found {}", self.front().description())
                .with_location(&self.location()));
        }
        self.advance();
        Ok(())
    }

    fn confirm_at_end(&self, context: &str) -> Result<()> {
        if !self.at_end() {
            return Err(err!("Unexpected {} {context}", self.front().description())
                .with_location(&self.location()));
        }
        Ok(())
    }

    fn confirm_at_end_or_suffix(&self, context: &str) -> Result<()> {
        if !self.at_end_or_suffix() {
            return Err(err!("Unexpected {} {context}", self.front().description())
                .with_location(&self.location()));
        }
        Ok(())
    }

    /// Rejects register tokens not in `allowed`, with a mode-specific
    /// message.
    fn confirm_legal_register(&self, allowed: &[Punct], context: &str) -> Result<()> {
        if self.front().is_register() {
            let register = self.front().punct().unwrap();
            if !allowed.contains(&register) {
                return Err(err!("Register {register} cannot be used {context}")
                    .with_location(&self.location()));
            }
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

fn parse_expr(pos: &mut TokenStream) -> Result<Expression> {
    let mut term = parse_term(pos)?;
    while !pos.at_end() {
        let op = if pos.front().is_punct(Punct::Plus) {
            BinaryOp::Add
        } else if pos.front().is_punct(Punct::Minus) {
            BinaryOp::Subtract
        } else {
            break;
        };
        pos.advance();
        let rhs = parse_term(pos)?;
        term = Expression::binary(op, term, rhs);
    }
    Ok(term)
}

fn parse_term(pos: &mut TokenStream) -> Result<Expression> {
    let mut factor = parse_factor(pos)?;
    while !pos.at_end() {
        let op = if pos.front().is_punct(Punct::Star) {
            BinaryOp::Multiply
        } else if pos.front().is_punct(Punct::Slash) {
            BinaryOp::Divide
        } else {
            break;
        };
        pos.advance();
        let rhs = parse_factor(pos)?;
        factor = Expression::binary(op, factor, rhs);
    }
    Ok(factor)
}

fn parse_factor(pos: &mut TokenStream) -> Result<Expression> {
    let op = if pos.front().is_punct(Punct::Minus) {
        Some(UnaryOp::Negate)
    } else if pos.front().is_punct(Punct::LessThan) {
        Some(UnaryOp::LowByte)
    } else if pos.front().is_punct(Punct::GreaterThan) {
        Some(UnaryOp::HighByte)
    } else if pos.front().is_punct(Punct::Caret) {
        Some(UnaryOp::BankByte)
    } else {
        None
    };
    if let Some(op) = op {
        pos.advance();
        let arg = parse_factor(pos)?;
        return Ok(Expression::unary(op, arg));
    }
    parse_comp(pos)
}

fn parse_comp(pos: &mut TokenStream) -> Result<Expression> {
    if let Some((value, ty)) = pos.front().literal() {
        pos.advance();
        return Ok(Expression::literal(value, ty));
    }

    // An `@` prefix widens the identifier to 24 bits.
    let mut long_identifier = false;
    if pos.front().is_punct(Punct::At) {
        pos.advance();
        if pos.front().identifier().is_none() && !pos.front().is_punct(Punct::Scope) {
            return Err(err!(
                "Expected identifier after '@', found {}",
                pos.front().description()
            )
            .with_location(&pos.location()));
        }
        long_identifier = true;
    }
    let ty = if long_identifier { NumericType::Long } else { NumericType::Word };

    if pos.front().is_punct(Punct::Scope) {
        // Globally qualified name ("::foo").
        pos.advance();
        let name = pos
            .front()
            .identifier()
            .ok_or_else(|| {
                err!("Expected identifier after '::', found {}", pos.front().description())
                    .with_location(&pos.location())
            })?
            .to_string();
        pos.advance();
        return Ok(Expression::identifier(FullIdentifier::qualified("", name), ty));
    }

    if let Some(first) = pos.front().identifier() {
        let first = first.to_string();
        pos.advance();
        if pos.front().is_punct(Punct::Scope) {
            pos.advance();
            let second = pos
                .front()
                .identifier()
                .ok_or_else(|| {
                    err!("Expected identifier after '::', found {}", pos.front().description())
                        .with_location(&pos.location())
                })?
                .to_string();
            pos.advance();
            return Ok(Expression::identifier(FullIdentifier::qualified(first, second), ty));
        }
        return Ok(Expression::identifier(FullIdentifier::new(first), ty));
    }

    if pos.front().is_punct(Punct::LParen) {
        pos.advance();
        let parenthesized = parse_expr(pos)?;
        pos.consume(Punct::RParen, "close parenthesis")?;
        return Ok(parenthesized);
    }

    Err(err!("Expected expression, found {}", pos.front().description())
        .with_location(&pos.location()))
}

// -------------------------------------------------------------------------------------------------

/// Parses a flag-state name argument.
fn parse_mode_name(pos: &mut TokenStream) -> Result<StatusFlags> {
    let location = pos.location();
    let name = pos
        .front()
        .identifier()
        .ok_or_else(|| {
            err!("Expected mode name, found {}", pos.front().description())
                .with_location(&location)
        })?
        .to_string();
    pos.advance();
    StatusFlags::from_name(&name)
        .ok_or_else(|| err!("\"{name}\" does not name a flag state").with_location(&location))
}

fn parse_return_convention(pos: &mut TokenStream) -> Result<ReturnConvention> {
    if pos.front().is_punct(Punct::NoReturn) {
        pos.advance();
        return Ok(ReturnConvention::NoReturn);
    }
    if pos.front().is_punct(Punct::Yields) {
        pos.advance();
        let flags = parse_mode_name(pos)?;
        return Ok(ReturnConvention::Yields(flags));
    }
    Ok(ReturnConvention::Default)
}

fn create_instruction(
    mnemonic: Mnemonic,
    suffix: Suffix,
    syn: SyntacticAddressingMode,
    location: Location,
    arg1: Option<Expression>,
    arg2: Option<Expression>,
) -> Result<Instruction> {
    let mode = deduce_mode(mnemonic, syn, arg1.as_ref(), arg2.as_ref())
        .map_err(|e| e.with_location(&location))?;
    if suffix != Suffix::None
        && flag_controlling_instruction_size(mnemonic) == VariableSizeFlag::NotVariable
    {
        return Err(err!("Instruction `{mnemonic}` does not support a length suffix")
            .with_location(&location));
    }
    let mut instruction = Instruction::new(mnemonic, mode);
    instruction.suffix = suffix;
    instruction.arg1 = arg1;
    instruction.arg2 = arg2;
    instruction.location = location;
    Ok(instruction)
}

/// Reads the body of an instruction; `yields`/`noreturn` suffixes are
/// handled by the caller.
fn parse_instruction_core(pos: &mut TokenStream) -> Result<Instruction> {
    use Punct::*;
    use SyntacticAddressingMode as S;

    let mnemonic = pos
        .front()
        .mnemonic()
        .ok_or_else(|| err!("logic error: parse_instruction() called on non-mnemonic"))?;
    let location = pos.location();
    pos.advance();

    let mut suffix = Suffix::None;
    if let Some(s) = pos.front().suffix() {
        suffix = s;
        pos.advance();
    }

    if pos.at_end_or_suffix() {
        return create_instruction(mnemonic, suffix, S::Implied, location, None, None);
    }

    pos.confirm_legal_register(&[RegisterA], "directly")?;
    if pos.front().is_punct(RegisterA) {
        pos.advance();
        pos.confirm_at_end_or_suffix("after A operand")?;
        return create_instruction(mnemonic, suffix, S::Accumulator, location, None, None);
    }

    if pos.front().is_punct(Hash) {
        pos.advance();
        let arg1 = parse_expr(pos)?;
        if pos.at_end_or_suffix() {
            return create_instruction(mnemonic, suffix, S::Immediate, location, Some(arg1), None);
        }
        pos.consume(Comma, "comma or end of line")?;
        pos.consume(Hash, "#")?;
        let arg2 = parse_expr(pos)?;
        pos.confirm_at_end_or_suffix("after immediate arguments")?;
        return create_instruction(
            mnemonic,
            suffix,
            S::BlockMove,
            location,
            Some(arg1),
            Some(arg2),
        );
    }

    if pos.front().is_punct(LBracket) {
        pos.advance();
        let arg1 = parse_expr(pos)?;
        pos.consume(RBracket, "close bracket")?;
        if pos.at_end_or_suffix() {
            return create_instruction(
                mnemonic,
                suffix,
                S::IndirectLong,
                location,
                Some(arg1),
                None,
            );
        }
        pos.consume(Comma, "comma or end of line")?;
        pos.confirm_legal_register(&[RegisterY], "with indirect long indexing")?;
        pos.consume(RegisterY, "register Y")?;
        pos.confirm_at_end_or_suffix("after indirect long indexed argument")?;
        return create_instruction(
            mnemonic,
            suffix,
            S::IndirectLongY,
            location,
            Some(arg1),
            None,
        );
    }

    // The one ambiguity in the grammar: a leading '(' is either an indirect
    // argument or a parenthesized subexpression. Indirect is chosen when
    // possible; otherwise back up and reparse as an expression.
    if pos.front().is_punct(LParen) {
        let backup_pos = pos.pos;

        pos.advance();
        // If this doesn't scan as an expression, the subexpression reading
        // wouldn't succeed either.
        let arg1 = parse_expr(pos)?;
        if pos.front().is_punct(Comma) {
            // A comma inside the outermost parentheses: this must be some
            // manner of indexing syntax. "(arg1, X)", "(arg1, S), Y", or
            // an error.
            pos.advance();
            pos.confirm_legal_register(&[RegisterX, RegisterS], "with indexed indirect mode")?;
            if pos.front().is_punct(RegisterX) {
                pos.advance();
                pos.consume(RParen, "close parenthesis")?;
                pos.confirm_at_end_or_suffix("after indexed indirect argument")?;
                return create_instruction(
                    mnemonic,
                    suffix,
                    S::IndirectX,
                    location,
                    Some(arg1),
                    None,
                );
            }
            pos.consume(RegisterS, "X or S register")?;
            pos.consume(RParen, "close parenthesis")?;
            pos.consume(Comma, "comma after stack relative indirect")?;
            pos.confirm_legal_register(&[RegisterY], "with stack relative indirect indexing")?;
            pos.consume(RegisterY, "register Y")?;
            pos.confirm_at_end_or_suffix("after stack relative indirect indexed argument")?;
            return create_instruction(
                mnemonic,
                suffix,
                S::StackRelativeY,
                location,
                Some(arg1),
                None,
            );
        }
        if pos.front().is_punct(RParen) {
            // "(arg1)" is legal alone or followed by ", Y". Anything else
            // reparses as a direct expression below.
            pos.advance();
            if pos.at_end_or_suffix() {
                return create_instruction(
                    mnemonic,
                    suffix,
                    S::Indirect,
                    location,
                    Some(arg1),
                    None,
                );
            }
            if pos.front().is_punct(Comma) {
                pos.advance();
                pos.confirm_legal_register(&[RegisterY], "with indirect indexing")?;
                pos.consume(RegisterY, "register Y")?;
                pos.confirm_at_end_or_suffix("after indirect indexed argument")?;
                return create_instruction(
                    mnemonic,
                    suffix,
                    S::IndirectY,
                    location,
                    Some(arg1),
                    None,
                );
            }
            // Abandon the indirect reading.
            pos.pos = backup_pos;
        }
    }

    // Everything else failed; this is a bare expression.
    let arg1 = parse_expr(pos)?;
    if pos.at_end_or_suffix() {
        return create_instruction(mnemonic, suffix, S::Direct, location, Some(arg1), None);
    }
    pos.consume(Comma, "comma or end of line")?;
    pos.confirm_legal_register(&[RegisterX, RegisterY, RegisterS], "with direct indexing")?;
    if pos.front().is_punct(RegisterX) {
        pos.advance();
        pos.confirm_at_end_or_suffix("after indexed argument")?;
        create_instruction(mnemonic, suffix, S::DirectX, location, Some(arg1), None)
    } else if pos.front().is_punct(RegisterY) {
        pos.advance();
        pos.confirm_at_end_or_suffix("after indexed argument")?;
        create_instruction(mnemonic, suffix, S::DirectY, location, Some(arg1), None)
    } else {
        pos.consume(RegisterS, "X, Y, or S register")?;
        pos.confirm_at_end_or_suffix("after stack relative argument")?;
        create_instruction(mnemonic, suffix, S::StackRelative, location, Some(arg1), None)
    }
}

fn parse_instruction(pos: &mut TokenStream) -> Result<Instruction> {
    let mut instruction = parse_instruction_core(pos)?;
    let return_convention = parse_return_convention(pos)?;
    if !return_convention.is_default()
        && instruction.mnemonic != Mnemonic::JSL
        && instruction.mnemonic != Mnemonic::JSR
    {
        return Err(err!(
            "return calling convention not supported on instruction {}",
            instruction.mnemonic
        )
        .with_location(&instruction.location));
    }
    instruction.return_convention = return_convention;
    Ok(instruction)
}

fn parse_directive(pos: &mut TokenStream) -> Result<Directive> {
    let name = pos
        .front()
        .directive()
        .ok_or_else(|| err!("logic error: parse_directive() called on non-directive-name"))?;
    let location = pos.location();
    pos.advance();

    let mut directive = Directive::new(name);
    directive.location = location;

    match directive_kind(name) {
        DirectiveKind::NoArg => {
            pos.confirm_at_end("after no-arg directive")?;
        }
        DirectiveKind::SingleArg | DirectiveKind::ConstantArg | DirectiveKind::NameArg => {
            let kind = directive_kind(name);
            let arg = parse_expr(pos)?;
            if kind == DirectiveKind::ConstantArg && arg.requires_lookup() {
                return Err(err!("{name} directive requires a constant value argument")
                    .with_location(&pos.location()));
            }
            if kind == DirectiveKind::NameArg && arg.simple_identifier().is_none() {
                return Err(err!("{name} directive requires a simple name argument")
                    .with_location(&pos.location()));
            }
            directive.argument = Some(arg);
            pos.confirm_at_end("after directive argument")?;
        }
        DirectiveKind::ListArg => {
            // At least one argument; more after commas.
            loop {
                let arg = parse_expr(pos)?;
                directive.list_argument.push(arg);
                if pos.at_end() {
                    break;
                }
                pos.consume(Punct::Comma, "comma or end of line")?;
            }
        }
        DirectiveKind::FlagArg => {
            directive.flag_argument = Some(parse_mode_name(pos)?);
            pos.confirm_at_end("after flag state")?;
        }
        DirectiveKind::CallingConventionArg => {
            directive.flag_argument = Some(parse_mode_name(pos)?);
            directive.return_convention = parse_return_convention(pos)?;
            pos.confirm_at_end("after calling convention")?;
        }
        DirectiveKind::RemoteArg => {
            directive.argument = Some(parse_expr(pos)?);
            directive.flag_argument = Some(parse_mode_name(pos)?);
            directive.return_convention = parse_return_convention(pos)?;
            pos.confirm_at_end("after calling convention")?;
        }
    }
    Ok(directive)
}

// -------------------------------------------------------------------------------------------------

/// Parses one tokenized line into labels and statements.
pub fn parse_line(tokens: &[Token]) -> Result<Vec<LineEntry>> {
    let mut entries = Vec::new();
    let mut pos = TokenStream::new(tokens);

    loop {
        // An identifier at the start of a statement is a label, but
        // multiples need colons:
        //   foo adc #$12       ; okay
        //   foo: adc #$12      ; okay
        //   foo bar adc #$12   ; unexpected 'bar'
        //   foo: bar adc #$12  ; okay
        let mut exported = false;
        if pos.front().is_punct(Punct::Export) {
            pos.advance();
            exported = true;
            if pos.front().identifier().is_none() {
                return Err(err!(
                    "Expected label name after `export` keyword but found {}",
                    pos.front().description()
                )
                .with_location(&pos.location()));
            }
        }
        if let Some(name) = pos.front().identifier() {
            entries.push(LineEntry::Label(ParsedLabel { name: name.to_string(), exported }));
            pos.advance();
            if pos.front().is_punct(Punct::Colon) {
                pos.advance();
                continue;
            }
        }

        if pos.front().is_end_of_line() {
            return Ok(entries);
        }
        if pos.front().is_punct(Punct::Colon) {
            pos.advance();
            continue;
        }

        // Brace spellings of the scope directives.
        if pos.front().is_punct(Punct::LBrace) || pos.front().is_punct(Punct::RBrace) {
            let name = if pos.front().is_punct(Punct::LBrace) {
                DirectiveName::Begin
            } else {
                DirectiveName::End
            };
            let mut directive = Directive::new(name);
            directive.location = pos.location();
            pos.advance();
            entries.push(LineEntry::Statement(Statement::Directive(directive)));
            continue;
        }

        if pos.front().directive().is_some() {
            let directive = parse_directive(&mut pos)?;
            if !pos.at_end() {
                return Err(err!("logic error: parse_directive() did not read to a line end"));
            }
            entries.push(LineEntry::Statement(Statement::Directive(directive)));
            continue;
        }

        if pos.front().mnemonic().is_none() {
            return Err(err!(
                "Expected mnemonic or directive but found {}",
                pos.front().description()
            )
            .with_location(&pos.location()));
        }
        let instruction = parse_instruction(&mut pos)?;
        if !pos.at_end() {
            return Err(err!("logic error: parse_instruction() did not read to a line end"));
        }
        entries.push(LineEntry::Statement(Statement::Instruction(instruction)));
    }
}

/// Parses a standalone expression, for tools and tests.
pub fn parse_expression(source: &str) -> Result<Expression> {
    let tokens = crate::token::tokenize(source, &Location::default())?;
    let mut pos = TokenStream::new(&tokens);
    let expr = parse_expr(&mut pos)?;
    pos.confirm_at_end("after expression")?;
    Ok(expr)
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{addressing::AddressingMode, error::Location, expr::NullLookupContext, token::tokenize};

    fn parse(line: &str) -> Result<Vec<LineEntry>> {
        let tokens = tokenize(line, &Location::default())?;
        parse_line(&tokens)
    }

    fn single_instruction(line: &str) -> Instruction {
        let entries = parse(line).unwrap();
        assert_eq!(entries.len(), 1, "{line}");
        match entries.into_iter().next().unwrap() {
            LineEntry::Statement(Statement::Instruction(i)) => i,
            other => panic!("expected instruction for {line}, got {other:?}"),
        }
    }

    fn single_directive(line: &str) -> Directive {
        let entries = parse(line).unwrap();
        assert_eq!(entries.len(), 1, "{line}");
        match entries.into_iter().next().unwrap() {
            LineEntry::Statement(Statement::Directive(d)) => d,
            other => panic!("expected directive for {line}, got {other:?}"),
        }
    }

    #[test]
    fn addressing_mode_shapes() {
        use AddressingMode::*;
        let cases: &[(&str, AddressingMode)] = &[
            ("rts", Implied),
            ("asl", Accumulator),
            ("asl A", Accumulator),
            ("lda #$12", ImmediateMFlag),
            ("ldx #$12", ImmediateXFlag),
            ("rep #$30", Immediate8),
            ("lda $12", DirectPage),
            ("lda $1234", Absolute),
            ("lda $123456", AbsoluteLong),
            ("lda $12, X", DirectPageX),
            ("ldx $12, Y", DirectPageY),
            ("lda $1234, X", AbsoluteX),
            ("lda $1234, Y", AbsoluteY),
            ("lda $123456, X", AbsoluteLongX),
            ("lda ($12)", DirectPageIndirect),
            ("jmp ($1234)", AbsoluteIndirect),
            ("lda ($12, X)", DirectPageXIndirect),
            ("lda ($12), Y", DirectPageIndirectY),
            ("jmp ($1234, X)", AbsoluteXIndirect),
            ("lda [$12]", DirectPageIndirectLong),
            ("jmp [$1234]", AbsoluteIndirectLong),
            ("lda [$12], Y", DirectPageIndirectLongY),
            ("lda $12, S", StackRelative),
            ("lda ($12, S), Y", StackRelativeIndirectY),
            ("mvn #$12, #$34", BlockMove),
            ("bra $8000", Relative8),
            ("brl $8000", Relative16),
        ];
        for (line, expected) in cases {
            assert_eq!(single_instruction(line).mode, *expected, "{line}");
        }
    }

    #[test]
    fn parenthesized_expression_is_not_indirect() {
        // `(…) * 2` cannot be indirect syntax, so the parser backtracks
        // and reads a direct argument.
        let i = single_instruction("lda ($12 + $34) * 2");
        assert_eq!(i.mode, AddressingMode::DirectPage);
        let value = i.arg1.unwrap().evaluate(&NullLookupContext).unwrap();
        assert_eq!(value, 0x8C);
    }

    #[test]
    fn illegal_registers_are_rejected() {
        assert!(parse("lda $12, A").is_err());
        assert!(parse("lda ($12, Y)").is_err());
        assert!(parse("lda [$12], X").is_err());
        assert!(parse("sta #$12").is_err());
    }

    #[test]
    fn labels_with_and_without_colons() {
        let entries = parse("foo: bar adc #$12").unwrap();
        assert_eq!(entries.len(), 3);
        assert!(matches!(&entries[0], LineEntry::Label(l) if l.name == "foo" && !l.exported));
        assert!(matches!(&entries[1], LineEntry::Label(l) if l.name == "bar"));
        assert!(matches!(&entries[2], LineEntry::Statement(_)));

        assert!(parse("foo bar adc #$12").is_err());

        let entries = parse("export start: rts").unwrap();
        assert!(matches!(&entries[0], LineEntry::Label(l) if l.name == "start" && l.exported));
    }

    #[test]
    fn expressions_follow_precedence() {
        let expr = parse_expression("1 + 2 * 3").unwrap();
        assert_eq!(expr.evaluate(&NullLookupContext).unwrap(), 7);
        let expr = parse_expression("(1 + 2) * 3").unwrap();
        assert_eq!(expr.evaluate(&NullLookupContext).unwrap(), 9);
        let expr = parse_expression("<$1234 + >$1234").unwrap();
        assert_eq!(expr.evaluate(&NullLookupContext).unwrap(), 0x34 + 0x12);
        let expr = parse_expression("-$10 + ^$123456").unwrap();
        assert_eq!(expr.evaluate(&NullLookupContext).unwrap(), 0x02);
    }

    #[test]
    fn qualified_identifiers() {
        let expr = parse_expression("m1::value").unwrap();
        assert!(expr.module_references().contains("m1"));
        let expr = parse_expression("::value").unwrap();
        assert!(expr.module_references().is_empty());
        assert!(expr.requires_lookup());
        let expr = parse_expression("@table").unwrap();
        assert_eq!(expr.ty(), NumericType::Long);
    }

    #[test]
    fn directive_arguments() {
        let d = single_directive(".org $8000");
        assert_eq!(d.name, DirectiveName::Org);
        assert!(d.argument.is_some());

        assert!(parse(".org some_label").is_err());

        let d = single_directive(".db 1, 2, 3");
        assert_eq!(d.list_argument.len(), 3);

        let d = single_directive(".mode m8x8");
        assert_eq!(d.flag_argument.unwrap().name(), "m8x8");

        let d = single_directive(".entry m8x8 yields m16x16");
        assert_eq!(d.flag_argument.unwrap().name(), "m8x8");
        assert!(matches!(d.return_convention, ReturnConvention::Yields(_)));

        let d = single_directive(".remote $9000 native noreturn");
        assert!(d.argument.is_some());
        assert!(matches!(d.return_convention, ReturnConvention::NoReturn));

        let d = single_directive(".module main");
        assert_eq!(d.argument.unwrap().simple_identifier(), Some("main"));

        assert!(parse(".mode bogus").is_err());
    }

    #[test]
    fn scope_braces_read_as_directives() {
        let entries = parse("{").unwrap();
        assert!(matches!(
            &entries[0],
            LineEntry::Statement(Statement::Directive(d)) if d.name == DirectiveName::Begin
        ));
        let entries = parse("}").unwrap();
        assert!(matches!(
            &entries[0],
            LineEntry::Statement(Statement::Directive(d)) if d.name == DirectiveName::End
        ));
    }

    #[test]
    fn return_convention_suffixes() {
        let i = single_instruction("jsr $8000 yields m8x8");
        assert!(matches!(i.return_convention, ReturnConvention::Yields(_)));
        let i = single_instruction("jsl $018000 noreturn");
        assert!(matches!(i.return_convention, ReturnConvention::NoReturn));
        assert!(parse("lda #$12 noreturn").is_err());
    }

    #[test]
    fn suffixes_only_on_flag_variable_mnemonics() {
        let i = single_instruction("lda.b #$12");
        assert_eq!(i.suffix, Suffix::B);
        assert!(parse("rts.b").is_err());
    }
}
