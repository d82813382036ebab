//! Lexical classes of the source language

use std::fmt;

/// Every class of token the lexer can produce.
/// ***Keywords are matched case-insensitively***
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum Kind {
    Program,
    Var,
    Procedure,
    Begin,
    End,
    If,
    Then,
    Else,
    While,
    Do,
    Read,
    Write,
    Real,
    Integer,

    Ident,
    IntLiteral,
    RealLiteral,

    Plus,
    Minus,
    Star,
    Slash,
    Assign,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,

    Dot,
    Comma,
    Semicolon,
    Colon,
    LeftParen,
    RightParen,
    Dollar,

    Eof,
}

impl Kind {
    /// Returns the keyword spelled by `word`, ignoring case.
    pub fn keyword(word: &str) -> Option<Kind> {
        let kind = match word.to_ascii_lowercase().as_str() {
            "program" => Kind::Program,
            "var" => Kind::Var,
            "procedure" => Kind::Procedure,
            "begin" => Kind::Begin,
            "end" => Kind::End,
            "if" => Kind::If,
            "then" => Kind::Then,
            "else" => Kind::Else,
            "while" => Kind::While,
            "do" => Kind::Do,
            "read" => Kind::Read,
            "write" => Kind::Write,
            "real" => Kind::Real,
            "integer" => Kind::Integer,
            _ => return None,
        };
        Some(kind)
    }

    /// Whether a command can start with this token.
    pub fn starts_command(self) -> bool {
        matches!(
            self,
            Kind::Read | Kind::Write | Kind::If | Kind::While | Kind::Ident
        )
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Kind::Program => "'program'",
            Kind::Var => "'var'",
            Kind::Procedure => "'procedure'",
            Kind::Begin => "'begin'",
            Kind::End => "'end'",
            Kind::If => "'if'",
            Kind::Then => "'then'",
            Kind::Else => "'else'",
            Kind::While => "'while'",
            Kind::Do => "'do'",
            Kind::Read => "'read'",
            Kind::Write => "'write'",
            Kind::Real => "'real'",
            Kind::Integer => "'integer'",
            Kind::Ident => "identifier",
            Kind::IntLiteral => "integer literal",
            Kind::RealLiteral => "real literal",
            Kind::Plus => "'+'",
            Kind::Minus => "'-'",
            Kind::Star => "'*'",
            Kind::Slash => "'/'",
            Kind::Assign => "':='",
            Kind::Equal => "'='",
            Kind::NotEqual => "'<>'",
            Kind::Less => "'<'",
            Kind::LessEqual => "'<='",
            Kind::Greater => "'>'",
            Kind::GreaterEqual => "'>='",
            Kind::Dot => "'.'",
            Kind::Comma => "','",
            Kind::Semicolon => "';'",
            Kind::Colon => "':'",
            Kind::LeftParen => "'('",
            Kind::RightParen => "')'",
            Kind::Dollar => "'$'",
            Kind::Eof => "end of input",
        };
        f.write_str(text)
    }
}

/// A classified slice of the source text.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Token<'a> {
    pub kind: Kind,
    pub lexeme: &'a str,
    /// 1-based source line
    pub line: usize,
}

impl<'a> Token<'a> {
    pub fn new(kind: Kind, lexeme: &'a str, line: usize) -> Self {
        Token { kind, lexeme, line }
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<14} {:<12} line {}", format!("{:?}", self.kind), self.lexeme, self.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_ignore_case() {
        assert_eq!(Kind::keyword("BEGIN"), Some(Kind::Begin));
        assert_eq!(Kind::keyword("Procedure"), Some(Kind::Procedure));
        assert_eq!(Kind::keyword("integer"), Some(Kind::Integer));
        assert_eq!(Kind::keyword("beginx"), None);
        assert_eq!(Kind::keyword("x"), None);
    }
}
