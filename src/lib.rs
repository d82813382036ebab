//! Compiler and stack-based virtual machine for a small Pascal-like language.
//!
//! # Example
//!
//! ```text
//! program square;
//! var x: integer;
//! procedure show(v: integer);
//! begin
//!     write(v * v);
//! end;
//! begin
//!     read(x);
//!     while x > 0 do
//!         show(x);
//!         x := x - 1;
//!     $
//! end.
//! ```
//!
//! Compilation is a single pass: the parser emits bytecode while it reads the
//! source, patching forward jumps once their destination is known.
//!
//! ```
//! let compiled = pvm::compile("program p; var x: integer; begin read(x); write(x); end.").unwrap();
//! let mut output = Vec::new();
//! pvm::run(compiled.bytecode, &mut "5\n".as_bytes(), &mut output).unwrap();
//! assert_eq!(output, b"5\n");
//! ```
//!
//! # Instructions
//!
//! | Instruction | Usage          | Brief   |
//! |-------------|----------------|---------|
//! | Start       | INPP           | Start of the program. Does nothing. |
//! | Halt        | PARA           | Stop the machine. |
//! | Alloc       | ALME _n_       | Reserve `n` memory cells. Cells are sized at compile time so it does nothing when run. |
//! | LoadConst   | CRCT _number_  | Push `number` on top of the stack. |
//! | LoadVar     | CRVL _cell_    | Push the value of memory `cell`. |
//! | Store       | ARMZ _cell_    | Pop a value into memory `cell`. |
//! | Add         | SOMA           | Pop `rhs` then `lhs`, push `lhs + rhs`. |
//! | Sub         | SUBT           | Pop `rhs` then `lhs`, push `lhs - rhs`. |
//! | Mul         | MULT           | Pop `rhs` then `lhs`, push `lhs * rhs`. |
//! | Div         | DIVI           | Pop `rhs` then `lhs`, push `lhs / rhs`. |
//! | Equal       | CMIG           | Pop `rhs` then `lhs`, push `1` if `lhs = rhs`, else `0`. |
//! | NotEqual    | CMDG           | Same for `lhs <> rhs`. |
//! | GreaterEqual| CMAI           | Same for `lhs >= rhs`. |
//! | LessEqual   | CPMI           | Same for `lhs <= rhs`. |
//! | Greater     | CMMA           | Same for `lhs > rhs`. |
//! | Less        | CMME           | Same for `lhs < rhs`. |
//! | Read        | LEIT           | Read a number from input and push it. |
//! | Print       | IMPR           | Pop a number and print it on its own line. |
//! | Jump        | DSVI _index_   | Continue at instruction `index`. |
//! | JumpFalse   | DSVF _index_   | Pop a value, continue at `index` if it is `0`. |
//! | PushReturn  | PUSHER _index_ | Push `index` on the return stack. |
//! | Call        | CHPR _index_   | Continue at the procedure entry `index`. |
//! | Return      | RTPR           | Pop the return stack and continue there. |
//! | Param       | PARAM _cell_   | Push the value of memory `cell` as an argument. |
//! | Free        | DESM _n_       | Release the `n` cells of an activation record. |
//!
//! # Calling convention
//!
//! - The caller pushes the return address (`PUSHER`), then every argument in
//!   order (`PARAM`), then jumps to the entry (`CHPR`).
//! - The callee pops its parameters into their cells, last one first.
//! - Parameters and locals have fixed cells, so a procedure cannot recurse while
//!   its own parameters are still needed.
//!
//! # Object files
//!
//! The `Display` form of a [`bytecode::Bytecode`] is its object file: one
//! `MNEMONIC [ARGUMENT]` per line. [`bytecode::Bytecode::load`] reads it back.

pub mod bytecode;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod symbol;
pub mod token;
pub mod vm;

use std::io::{BufRead, Write};

pub use crate::{
    bytecode::{Bytecode, Instruction},
    error::{Error, Result},
    lexer::Lexer,
    parser::{Compiled, Parser},
    symbol::SymbolTable,
    vm::Vm,
};

/// Token stream over `source`.
pub fn tokenize(source: &str) -> Lexer<'_> {
    Lexer::new(source)
}

/// Compile `source` into bytecode, failing on the first error.
pub fn compile(source: &str) -> Result<Compiled> {
    Parser::new(tokenize(source))?.parse()
}

/// Run `bytecode` to completion and hand back the halted machine.
pub fn run(bytecode: Bytecode, input: &mut dyn BufRead, output: &mut dyn Write) -> Result<Vm> {
    let mut vm = Vm::new(bytecode);
    vm.run(input, output)?;
    Ok(vm)
}
