//! Recursive-descent parser that emits bytecode while it parses.
//!
//! There is no syntax tree: every production consumes its tokens and appends
//! the instructions for its construct to the [`Bytecode`] straight away. Jumps
//! whose destination is not known yet are emitted with a placeholder target and
//! patched once the destination has been emitted.

use log::debug;

use crate::{
    bytecode::{Bytecode, Instruction},
    error::{Error, Result, SemanticErrorKind},
    lexer::Lexer,
    symbol::{Category, Scope, Symbol, SymbolTable, Type},
    token::{Kind, Token},
};

/// Output of a successful compilation
#[derive(Debug)]
pub struct Compiled {
    pub bytecode: Bytecode,
    pub symbols: SymbolTable,
}

/// Placeholder target of a jump that is patched later
const UNRESOLVED: usize = 0;

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token<'a>,
    symbols: SymbolTable,
    bytecode: Bytecode,
}

impl<'a> Parser<'a> {
    /// Prime the parser with the first token of `lexer`.
    pub fn new(mut lexer: Lexer<'a>) -> Result<Self> {
        let current = lexer.next_token()?;
        Ok(Parser {
            lexer,
            current,
            symbols: SymbolTable::new(),
            bytecode: Bytecode::new(),
        })
    }

    /// Parse a whole program. Stops at the first error.
    pub fn parse(mut self) -> Result<Compiled> {
        self.program()?;
        debug!(
            "compiled {} instructions, {} symbols, {} memory cells",
            self.bytecode.len(),
            self.symbols.len(),
            self.bytecode.cells()
        );
        Ok(Compiled {
            bytecode: self.bytecode,
            symbols: self.symbols,
        })
    }

    // program IDENT [;] <declarations> begin <commands> end .
    fn program(&mut self) -> Result<()> {
        self.consume(Kind::Program)?;
        self.consume(Kind::Ident)?;
        self.skip(Kind::Semicolon)?;

        self.bytecode.emit(Instruction::Start);
        self.declarations()?;

        self.consume(Kind::Begin)?;
        self.commands()?;
        self.consume(Kind::End)?;
        self.consume(Kind::Dot)?;
        self.consume(Kind::Eof)?;

        self.bytecode.emit(Instruction::Halt);
        Ok(())
    }

    fn declarations(&mut self) -> Result<()> {
        loop {
            match self.current.kind {
                Kind::Var => {
                    self.variables()?;
                }
                Kind::Procedure => self.procedures()?,
                _ => return Ok(()),
            }
        }
    }

    /// `var` followed by one or more `names : type [;]` groups.
    /// Returns how many variables were declared.
    fn variables(&mut self) -> Result<usize> {
        self.consume(Kind::Var)?;

        let mut count = 0;
        loop {
            let names = self.names()?;
            self.consume(Kind::Colon)?;
            let ty = self.type_name()?;

            for name in names {
                self.declare_storage(name, ty, Category::Variable)?;
                self.bytecode.emit(Instruction::Alloc(1));
                count += 1;
            }

            self.skip(Kind::Semicolon)?;
            if !self.check(Kind::Ident) {
                return Ok(count);
            }
        }
    }

    /// A run of sibling procedures. Each one is preceded by a jump that is
    /// patched to the first instruction after the last of them, so control
    /// entering the block sequentially never falls into a procedure body.
    fn procedures(&mut self) -> Result<()> {
        let mut skips = Vec::new();
        while self.check(Kind::Procedure) {
            skips.push(self.bytecode.emit(Instruction::Jump(UNRESOLVED)));
            self.procedure()?;
        }

        let after = self.bytecode.next_index();
        for skip in skips {
            self.bytecode.patch(skip, after)?;
        }
        Ok(())
    }

    // procedure IDENT [( <params> )] [;] [var ...] begin <commands> end [;]
    fn procedure(&mut self) -> Result<()> {
        self.consume(Kind::Procedure)?;
        let name = self.consume(Kind::Ident)?;
        if self.symbols.exists_in_current_scope(name.lexeme) {
            return Err(semantic(&name, SemanticErrorKind::Redeclared));
        }

        let entry = self.bytecode.next_index();
        self.symbols.enter_scope(name.lexeme);
        let params = self.parameters()?;

        // Visible to its own body for recursive calls
        self.symbols.declare(Symbol {
            name: name.lexeme.to_string(),
            ty: None,
            category: Category::Procedure {
                params: params.len(),
            },
            scope: Scope::Global,
            address: entry,
        });

        // Arguments were pushed in order, so the last one is on top
        for &cell in params.iter().rev() {
            self.bytecode.emit(Instruction::Store(cell));
        }

        self.skip(Kind::Semicolon)?;
        let mut locals = 0;
        while self.check(Kind::Var) {
            locals += self.variables()?;
        }

        self.consume(Kind::Begin)?;
        self.commands()?;
        self.consume(Kind::End)?;

        let frame = params.len() + locals;
        if frame > 0 {
            self.bytecode.emit(Instruction::Free(frame));
        }
        self.bytecode.emit(Instruction::Return);

        self.symbols.exit_scope();
        self.skip(Kind::Semicolon)
    }

    /// Formal parameters, returned as their memory cells in declaration order.
    fn parameters(&mut self) -> Result<Vec<usize>> {
        let mut cells = Vec::new();
        if !self.check(Kind::LeftParen) {
            return Ok(cells);
        }
        self.advance()?;

        loop {
            let names = self.names()?;
            self.consume(Kind::Colon)?;
            let ty = self.type_name()?;
            for name in names {
                cells.push(self.declare_storage(name, ty, Category::Parameter)?);
            }

            if !self.check(Kind::Semicolon) {
                break;
            }
            self.advance()?;
        }

        self.consume(Kind::RightParen)?;
        Ok(cells)
    }

    // IDENT {, IDENT}
    fn names(&mut self) -> Result<Vec<Token<'a>>> {
        let mut names = vec![self.consume(Kind::Ident)?];
        while self.check(Kind::Comma) {
            self.advance()?;
            names.push(self.consume(Kind::Ident)?);
        }
        Ok(names)
    }

    fn type_name(&mut self) -> Result<Type> {
        let ty = match self.current.kind {
            Kind::Integer => Type::Integer,
            Kind::Real => Type::Real,
            _ => return Err(self.expected("'real' or 'integer'")),
        };
        self.advance()?;
        Ok(ty)
    }

    fn declare_storage(&mut self, name: Token<'a>, ty: Type, category: Category) -> Result<usize> {
        if self.symbols.exists_in_current_scope(name.lexeme) {
            return Err(semantic(&name, SemanticErrorKind::Redeclared));
        }

        let address = self.bytecode.allocate();
        self.symbols.declare(Symbol {
            name: name.lexeme.to_string(),
            ty: Some(ty),
            category,
            scope: self.symbols.current_scope().clone(),
            address,
        });
        Ok(address)
    }

    fn commands(&mut self) -> Result<()> {
        while self.current.kind.starts_command() {
            self.command()?;
        }
        Ok(())
    }

    fn command(&mut self) -> Result<()> {
        match self.current.kind {
            Kind::Read => self.read(),
            Kind::Write => self.write(),
            Kind::If => self.if_command(),
            Kind::While => self.while_command(),
            Kind::Ident => {
                let name = self.consume(Kind::Ident)?;
                if self.check(Kind::Assign) {
                    self.advance()?;
                    let cell = self.storage(&name)?;
                    self.expression()?;
                    self.bytecode.emit(Instruction::Store(cell));
                } else {
                    self.call(&name)?;
                }
                self.end_simple()
            }
            _ => Err(self.expected("a command")),
        }
    }

    // read ( IDENT {, IDENT} )
    fn read(&mut self) -> Result<()> {
        self.consume(Kind::Read)?;
        self.consume(Kind::LeftParen)?;
        loop {
            let name = self.consume(Kind::Ident)?;
            let cell = self.storage(&name)?;
            self.bytecode.emit(Instruction::Read);
            self.bytecode.emit(Instruction::Store(cell));

            if !self.check(Kind::Comma) {
                break;
            }
            self.advance()?;
        }
        self.consume(Kind::RightParen)?;
        self.end_simple()
    }

    // write ( <expression> {, <expression>} )
    fn write(&mut self) -> Result<()> {
        self.consume(Kind::Write)?;
        self.consume(Kind::LeftParen)?;
        loop {
            self.expression()?;
            self.bytecode.emit(Instruction::Print);

            if !self.check(Kind::Comma) {
                break;
            }
            self.advance()?;
        }
        self.consume(Kind::RightParen)?;
        self.end_simple()
    }

    // if <condition> then <commands> [else <commands>] [$]
    fn if_command(&mut self) -> Result<()> {
        self.consume(Kind::If)?;
        self.condition()?;
        self.consume(Kind::Then)?;

        let jump_false = self.bytecode.emit(Instruction::JumpFalse(UNRESOLVED));
        self.commands()?;
        let skip_else = self.bytecode.emit(Instruction::Jump(UNRESOLVED));

        self.bytecode.patch(jump_false, self.bytecode.next_index())?;
        if self.check(Kind::Else) {
            self.advance()?;
            self.commands()?;
        }
        self.bytecode.patch(skip_else, self.bytecode.next_index())?;

        self.skip(Kind::Dollar)
    }

    // while <condition> do <commands> [$]
    fn while_command(&mut self) -> Result<()> {
        self.consume(Kind::While)?;

        let entry = self.bytecode.next_index();
        self.condition()?;
        self.consume(Kind::Do)?;

        let exit = self.bytecode.emit(Instruction::JumpFalse(UNRESOLVED));
        self.commands()?;
        self.bytecode.emit(Instruction::Jump(entry));
        self.bytecode.patch(exit, self.bytecode.next_index())?;

        self.skip(Kind::Dollar)
    }

    // IDENT [( IDENT {, IDENT} )]
    fn call(&mut self, name: &Token<'a>) -> Result<()> {
        let (entry, params) = match self.resolve(name)? {
            Symbol {
                category: Category::Procedure { params },
                address,
                ..
            } => (*address, *params),
            _ => return Err(self.unexpected_after(name)),
        };

        let push_return = self.bytecode.emit(Instruction::PushReturn(UNRESOLVED));

        let mut args = 0;
        if self.check(Kind::LeftParen) {
            self.advance()?;
            loop {
                let arg = self.consume(Kind::Ident)?;
                let cell = self.storage(&arg)?;
                self.bytecode.emit(Instruction::Param(cell));
                args += 1;

                if !self.check(Kind::Comma) {
                    break;
                }
                self.advance()?;
            }
            self.consume(Kind::RightParen)?;
        }

        if args != params {
            return Err(semantic(
                name,
                |name| SemanticErrorKind::Arity {
                    name,
                    expected: params,
                    found: args,
                },
            ));
        }

        // Resume right after the call instruction
        self.bytecode
            .patch(push_return, self.bytecode.next_index() + 1)?;
        self.bytecode.emit(Instruction::Call(entry));
        Ok(())
    }

    /// `name` starts a command but is not a procedure. A variable not followed
    /// by `(` is reported as a missing `:=`.
    fn unexpected_after(&self, name: &Token<'a>) -> Error {
        match self.symbols.lookup(name.lexeme) {
            Some(symbol) if symbol.category.is_storage() && !self.check(Kind::LeftParen) => {
                self.expected("':='")
            }
            _ => semantic(name, SemanticErrorKind::NotAProcedure),
        }
    }

    // <expression> <relation> <expression>
    fn condition(&mut self) -> Result<()> {
        self.expression()?;
        let relation = match self.current.kind {
            Kind::Equal => Instruction::Equal,
            Kind::NotEqual => Instruction::NotEqual,
            Kind::GreaterEqual => Instruction::GreaterEqual,
            Kind::LessEqual => Instruction::LessEqual,
            Kind::Greater => Instruction::Greater,
            Kind::Less => Instruction::Less,
            _ => return Err(self.expected("a relational operator")),
        };
        self.advance()?;
        self.expression()?;
        self.bytecode.emit(relation);
        Ok(())
    }

    // <term> {(+|-) <term>}
    fn expression(&mut self) -> Result<()> {
        self.term()?;
        loop {
            let op = match self.current.kind {
                Kind::Plus => Instruction::Add,
                Kind::Minus => Instruction::Sub,
                _ => return Ok(()),
            };
            self.advance()?;
            self.term()?;
            self.bytecode.emit(op);
        }
    }

    // [-] <factor> {(*|/) <factor>}
    fn term(&mut self) -> Result<()> {
        let negate = self.check(Kind::Minus);
        if negate {
            self.advance()?;
            self.bytecode.emit(Instruction::LoadConst("0".to_string()));
        }
        self.factor()?;
        if negate {
            self.bytecode.emit(Instruction::Sub);
        }

        loop {
            let op = match self.current.kind {
                Kind::Star => Instruction::Mul,
                Kind::Slash => Instruction::Div,
                _ => return Ok(()),
            };
            self.advance()?;
            self.factor()?;
            self.bytecode.emit(op);
        }
    }

    // IDENT | number | ( <expression> )
    fn factor(&mut self) -> Result<()> {
        match self.current.kind {
            Kind::Ident => {
                let name = self.consume(Kind::Ident)?;
                let cell = self.storage(&name)?;
                self.bytecode.emit(Instruction::LoadVar(cell));
            }
            Kind::IntLiteral | Kind::RealLiteral => {
                let literal = self.current.lexeme.to_string();
                self.advance()?;
                self.bytecode.emit(Instruction::LoadConst(literal));
            }
            Kind::LeftParen => {
                self.advance()?;
                self.expression()?;
                self.consume(Kind::RightParen)?;
            }
            _ => return Err(self.expected("an identifier, a number or '('")),
        }
        Ok(())
    }

    fn resolve(&self, name: &Token<'a>) -> Result<&Symbol> {
        self.symbols
            .lookup(name.lexeme)
            .ok_or_else(|| semantic(name, SemanticErrorKind::Undeclared))
    }

    /// Memory cell of a variable or parameter
    fn storage(&self, name: &Token<'a>) -> Result<usize> {
        let symbol = self.resolve(name)?;
        if symbol.category.is_storage() {
            Ok(symbol.address)
        } else {
            Err(semantic(name, SemanticErrorKind::NotAVariable))
        }
    }

    /// `;` after a simple command, optional right before `else`, `$` or `end`
    fn end_simple(&mut self) -> Result<()> {
        match self.current.kind {
            Kind::Semicolon => self.advance(),
            Kind::Else | Kind::Dollar | Kind::End => Ok(()),
            _ => Err(self.expected("';'")),
        }
    }

    fn advance(&mut self) -> Result<()> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn check(&self, kind: Kind) -> bool {
        self.current.kind == kind
    }

    /// Consume `kind` if it is the current token
    fn skip(&mut self, kind: Kind) -> Result<()> {
        if self.check(kind) {
            self.advance()?;
        }
        Ok(())
    }

    fn consume(&mut self, kind: Kind) -> Result<Token<'a>> {
        if !self.check(kind) {
            return Err(self.expected(&kind.to_string()));
        }
        let token = self.current;
        self.advance()?;
        Ok(token)
    }

    fn expected(&self, what: &str) -> Error {
        let found = match self.current.kind {
            Kind::Eof => Kind::Eof.to_string(),
            _ => format!("'{}'", self.current.lexeme),
        };
        Error::Syntax {
            line: self.current.line,
            expected: what.to_string(),
            found,
        }
    }
}

fn semantic<F>(name: &Token<'_>, kind: F) -> Error
where
    F: FnOnce(String) -> SemanticErrorKind,
{
    Error::Semantic {
        line: name.line,
        kind: kind(name.lexeme.to_string()),
    }
}
