use std::fmt;

use nom::{
    character::complete::{digit1, hex_digit1, satisfy},
    combinator::recognize,
    sequence::pair,
    IResult,
};

use crate::{
    addr::NumericType,
    directive::DirectiveName,
    error::{err, Location, Result},
    opcodes::{Mnemonic, Suffix},
};

// -------------------------------------------------------------------------------------------------

/// Punctuation, operators, reserved register letters, and keywords.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Punct {
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Hash,
    Plus,
    Minus,
    Star,
    Slash,
    At,
    LessThan,
    GreaterThan,
    Caret,
    /// `::`
    Scope,
    /// The reserved register names.
    RegisterA,
    RegisterS,
    RegisterX,
    RegisterY,
    /// `export` label prefix.
    Export,
    /// `yields` return-convention keyword.
    Yields,
    /// `noreturn` return-convention keyword.
    NoReturn,
}

impl fmt::Display for Punct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Punct::*;
        let text = match self {
            LParen => "(",
            RParen => ")",
            LBracket => "[",
            RBracket => "]",
            LBrace => "{",
            RBrace => "}",
            Comma => ",",
            Colon => ":",
            Hash => "#",
            Plus => "+",
            Minus => "-",
            Star => "*",
            Slash => "/",
            At => "@",
            LessThan => "<",
            GreaterThan => ">",
            Caret => "^",
            Scope => "::",
            RegisterA => "A",
            RegisterS => "S",
            RegisterX => "X",
            RegisterY => "Y",
            Export => "export",
            Yields => "yields",
            NoReturn => "noreturn",
        };
        write!(f, "{text}")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Mnemonic(Mnemonic),
    Suffix(Suffix),
    Directive(DirectiveName),
    Identifier(String),
    Literal { value: i32, ty: NumericType },
    Punct(Punct),
    EndOfLine,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind:     TokenKind,
    pub location: Location,
}

impl Token {
    pub fn is_end_of_line(&self) -> bool {
        matches!(self.kind, TokenKind::EndOfLine)
    }

    pub fn punct(&self) -> Option<Punct> {
        match self.kind {
            TokenKind::Punct(p) => Some(p),
            _ => None,
        }
    }

    pub fn is_punct(&self, punct: Punct) -> bool {
        self.punct() == Some(punct)
    }

    pub fn mnemonic(&self) -> Option<Mnemonic> {
        match self.kind {
            TokenKind::Mnemonic(m) => Some(m),
            _ => None,
        }
    }

    pub fn suffix(&self) -> Option<Suffix> {
        match self.kind {
            TokenKind::Suffix(s) => Some(s),
            _ => None,
        }
    }

    pub fn directive(&self) -> Option<DirectiveName> {
        match self.kind {
            TokenKind::Directive(d) => Some(d),
            _ => None,
        }
    }

    pub fn identifier(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Identifier(name) => Some(name),
            _ => None,
        }
    }

    pub fn literal(&self) -> Option<(i32, NumericType)> {
        match self.kind {
            TokenKind::Literal { value, ty } => Some((value, ty)),
            _ => None,
        }
    }

    pub fn is_register(&self) -> bool {
        matches!(
            self.punct(),
            Some(Punct::RegisterA | Punct::RegisterS | Punct::RegisterX | Punct::RegisterY)
        )
    }

    /// Renders this token for an error message.
    pub fn description(&self) -> String {
        match &self.kind {
            TokenKind::EndOfLine => "end of line".to_string(),
            TokenKind::Mnemonic(m) => format!("mnemonic {m}"),
            TokenKind::Suffix(s) => format!("suffix {s}"),
            TokenKind::Directive(d) => format!("directive {d}"),
            TokenKind::Identifier(name) => format!("identifier {name}"),
            TokenKind::Literal { value, .. } => format!("literal {value}"),
            TokenKind::Punct(p) => match p {
                Punct::Export | Punct::Yields | Punct::NoReturn => format!("keyword `{p}`"),
                Punct::RegisterA | Punct::RegisterS | Punct::RegisterX | Punct::RegisterY => {
                    format!("register {p}")
                }
                _ => format!("symbol `{p}`"),
            },
        }
    }
}

// -------------------------------------------------------------------------------------------------

fn is_identifier_first_char(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_identifier_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

/// `$1f`, `0x1f` — type deduced from the digit count, so `$00` is a byte
/// and `$0000` a word.
fn hex_literal(input: &str) -> IResult<&str, TokenKind> {
    let rest = if let Some(rest) = input.strip_prefix('$') {
        rest
    } else if let Some(rest) = input.strip_prefix("0x").or_else(|| input.strip_prefix("0X")) {
        rest
    } else {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
    };
    let (rest, digits) = hex_digit1(rest)?;
    let value = i64::from_str_radix(digits, 16).unwrap_or(0) as i32;
    let ty = match digits.len() {
        0..=2 => NumericType::Byte,
        3..=4 => NumericType::Word,
        _ => NumericType::Long,
    };
    Ok((rest, TokenKind::Literal { value: ty.cast(value), ty }))
}

/// Plain decimal; the type is left unknown.
fn decimal_literal(input: &str) -> IResult<&str, TokenKind> {
    let (rest, digits) = digit1(input)?;
    let value = digits.parse::<i64>().unwrap_or(0) as i32;
    Ok((rest, TokenKind::Literal { value, ty: NumericType::Unknown }))
}

/// An identifier-shaped word (no leading dot).
fn word(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(is_identifier_first_char),
        nom::bytes::complete::take_while(is_identifier_char),
    ))(input)
}

/// A `.`-prefixed name: a directive or a width suffix.
fn dotted_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|ch| ch == '.'),
        nom::bytes::complete::take_while1(is_identifier_char),
    ))(input)
}

fn single_punct(ch: char) -> Option<Punct> {
    use Punct::*;
    Some(match ch {
        '(' => LParen,
        ')' => RParen,
        '[' => LBracket,
        ']' => RBracket,
        '{' => LBrace,
        '}' => RBrace,
        ',' => Comma,
        ':' => Colon,
        '#' => Hash,
        '+' => Plus,
        '-' => Minus,
        '*' => Star,
        '/' => Slash,
        '@' => At,
        '<' => LessThan,
        '>' => GreaterThan,
        '^' => Caret,
        _ => return None,
    })
}

/// Splits one source line into tokens. The result always ends with an
/// `EndOfLine` token; `;` starts a comment that runs to the end.
pub fn tokenize(line: &str, location: &Location) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut rest = line;

    let token = |kind: TokenKind| Token { kind, location: location.clone() };

    loop {
        rest = rest.trim_start();
        if rest.is_empty() || rest.starts_with(';') {
            tokens.push(token(TokenKind::EndOfLine));
            return Ok(tokens);
        }

        // Two-character punctuation first.
        if let Some(tail) = rest.strip_prefix("::") {
            tokens.push(token(TokenKind::Punct(Punct::Scope)));
            rest = tail;
            continue;
        }

        if let Ok((tail, kind)) = hex_literal(rest) {
            tokens.push(token(kind));
            rest = tail;
            continue;
        }
        if let Ok((tail, kind)) = decimal_literal(rest) {
            tokens.push(token(kind));
            rest = tail;
            continue;
        }

        if let Ok((tail, name)) = dotted_name(rest) {
            if let Some(directive) = DirectiveName::parse(name) {
                tokens.push(token(TokenKind::Directive(directive)));
            } else if let Some(suffix) = Suffix::parse(name) {
                tokens.push(token(TokenKind::Suffix(suffix)));
            } else {
                return Err(err!("Unrecognized dotted name '{name}' in input")
                    .with_location(location));
            }
            rest = tail;
            continue;
        }

        if let Ok((tail, name)) = word(rest) {
            if let Some(mnemonic) = Mnemonic::parse(name) {
                tokens.push(token(TokenKind::Mnemonic(mnemonic)));
            } else if name.len() == 1 {
                let kind = match name.chars().next().unwrap().to_ascii_uppercase() {
                    'A' => TokenKind::Punct(Punct::RegisterA),
                    'S' => TokenKind::Punct(Punct::RegisterS),
                    'X' => TokenKind::Punct(Punct::RegisterX),
                    'Y' => TokenKind::Punct(Punct::RegisterY),
                    _ => TokenKind::Identifier(name.to_string()),
                };
                tokens.push(token(kind));
            } else {
                let kind = match name.to_ascii_lowercase().as_str() {
                    "export" => TokenKind::Punct(Punct::Export),
                    "yields" => TokenKind::Punct(Punct::Yields),
                    "noreturn" => TokenKind::Punct(Punct::NoReturn),
                    _ => TokenKind::Identifier(name.to_string()),
                };
                tokens.push(token(kind));
            }
            rest = tail;
            continue;
        }

        let next = rest.chars().next().unwrap();
        if let Some(punct) = single_punct(next) {
            tokens.push(token(TokenKind::Punct(punct)));
            rest = &rest[next.len_utf8()..];
            continue;
        }

        return Err(err!("Unexpected character '{next}' in input").with_location(location));
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(line: &str) -> Vec<TokenKind> {
        tokenize(line, &Location::default())
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn literals_carry_width_types() {
        assert_eq!(
            kinds("$12 $1234 $123456 0x7f 42"),
            vec![
                TokenKind::Literal { value: 0x12, ty: NumericType::Byte },
                TokenKind::Literal { value: 0x1234, ty: NumericType::Word },
                TokenKind::Literal { value: 0x123456, ty: NumericType::Long },
                TokenKind::Literal { value: 0x7F, ty: NumericType::Byte },
                TokenKind::Literal { value: 42, ty: NumericType::Unknown },
                TokenKind::EndOfLine,
            ]
        );
        // Leading zeros count toward the deduced width.
        assert_eq!(
            kinds("$0012")[0],
            TokenKind::Literal { value: 0x12, ty: NumericType::Word }
        );
    }

    #[test]
    fn mnemonics_registers_and_identifiers() {
        assert_eq!(
            kinds("LDA foo"),
            vec![
                TokenKind::Mnemonic(Mnemonic::LDA),
                TokenKind::Identifier("foo".to_string()),
                TokenKind::EndOfLine,
            ]
        );
        assert_eq!(
            kinds("asl a"),
            vec![
                TokenKind::Mnemonic(Mnemonic::ASL),
                TokenKind::Punct(Punct::RegisterA),
                TokenKind::EndOfLine,
            ]
        );
        assert_eq!(kinds("x")[0], TokenKind::Punct(Punct::RegisterX));
        assert_eq!(kinds("_tmp")[0], TokenKind::Identifier("_tmp".to_string()));
    }

    #[test]
    fn directives_and_suffixes() {
        assert_eq!(
            kinds(".org $8000"),
            vec![
                TokenKind::Directive(DirectiveName::Org),
                TokenKind::Literal { value: 0x8000, ty: NumericType::Word },
                TokenKind::EndOfLine,
            ]
        );
        assert_eq!(
            kinds("lda.b #$12")[..2],
            [TokenKind::Mnemonic(Mnemonic::LDA), TokenKind::Suffix(Suffix::B)]
        );
        assert!(tokenize(".bogus", &Location::default()).is_err());
    }

    #[test]
    fn punctuation_and_scope() {
        assert_eq!(
            kinds("mod::name"),
            vec![
                TokenKind::Identifier("mod".to_string()),
                TokenKind::Punct(Punct::Scope),
                TokenKind::Identifier("name".to_string()),
                TokenKind::EndOfLine,
            ]
        );
        assert_eq!(
            kinds("(<a), y"),
            vec![
                TokenKind::Punct(Punct::LParen),
                TokenKind::Punct(Punct::LessThan),
                TokenKind::Punct(Punct::RegisterA),
                TokenKind::Punct(Punct::RParen),
                TokenKind::Punct(Punct::Comma),
                TokenKind::Punct(Punct::RegisterY),
                TokenKind::EndOfLine,
            ]
        );
    }

    #[test]
    fn keywords_and_comments() {
        assert_eq!(
            kinds("export start ; a label"),
            vec![
                TokenKind::Punct(Punct::Export),
                TokenKind::Identifier("start".to_string()),
                TokenKind::EndOfLine,
            ]
        );
        assert_eq!(
            kinds("jsr foo yields m8x8")[2..4],
            [TokenKind::Punct(Punct::Yields), TokenKind::Identifier("m8x8".to_string())]
        );
        assert_eq!(kinds(";only a comment"), vec![TokenKind::EndOfLine]);
        assert!(tokenize("lda !", &Location::default()).is_err());
    }
}
