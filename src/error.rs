//! Errors raised while compiling or running a program.
//!
//! Every error is fatal: the phase that raised it stops and nothing is recovered.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error of the compiler and the virtual machine.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("lexical error on line {line}: {kind}")]
    Lexical { line: usize, kind: LexErrorKind },
    #[error("syntax error on line {line}: expected {expected}, found {found}")]
    Syntax {
        line: usize,
        expected: String,
        found: String,
    },
    #[error("semantic error on line {line}: {kind}")]
    Semantic { line: usize, kind: SemanticErrorKind },
    #[error("runtime error at instruction {pc}: {kind}")]
    Runtime { pc: usize, kind: RuntimeErrorKind },
    /// Broken compiler invariant, should never happen
    #[error("internal compiler error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl Error {
    /// Source line the error points at, for compile-time errors.
    pub fn line(&self) -> Option<usize> {
        match self {
            Error::Lexical { line, .. }
            | Error::Syntax { line, .. }
            | Error::Semantic { line, .. } => Some(*line),
            Error::Runtime { .. } | Error::Internal(_) => None,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum LexErrorKind {
    UnexpectedChar(char),
    UnterminatedComment,
}

impl fmt::Display for LexErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexErrorKind::UnexpectedChar(ch) => write!(f, "unexpected character '{}'", ch),
            LexErrorKind::UnterminatedComment => write!(f, "unterminated comment"),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SemanticErrorKind {
    Undeclared(String),
    Redeclared(String),
    NotAVariable(String),
    NotAProcedure(String),
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },
}

impl fmt::Display for SemanticErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use SemanticErrorKind::*;
        match self {
            Undeclared(name) => write!(f, "'{}' is not declared", name),
            Redeclared(name) => write!(f, "'{}' is already declared in this scope", name),
            NotAVariable(name) => write!(f, "'{}' is not a variable", name),
            NotAProcedure(name) => write!(f, "'{}' is not a procedure", name),
            Arity {
                name,
                expected,
                found,
            } => write!(
                f,
                "procedure '{}' takes {} argument(s), {} given",
                name, expected, found
            ),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RuntimeErrorKind {
    #[error("operand stack is empty")]
    StackUnderflow,
    #[error("return without a pending return address")]
    ReturnStackUnderflow,
    #[error("memory address {0} is out of range")]
    AddressOutOfRange(usize),
    #[error("jump target {0} is out of range")]
    JumpOutOfRange(usize),
    #[error("'{0}' is not a numeric literal")]
    InvalidLiteral(String),
    #[error("input exhausted while reading a value")]
    MissingInput,
    #[error("'{0}' is not a number")]
    InvalidInput(String),
    #[error("ran past the last instruction without PARA")]
    RanOffEnd,
    #[error("program has already halted")]
    AlreadyHalted,
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}
