//! Symbol table with a global scope and at most one active procedure scope

use std::fmt;

/// Declared type of a variable or parameter
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Type {
    Integer,
    Real,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Category {
    Variable,
    Parameter,
    /// Procedure taking `params` arguments
    Procedure { params: usize },
}

impl Category {
    /// Variables and parameters own a memory cell, procedures don't.
    pub fn is_storage(self) -> bool {
        !matches!(self, Category::Procedure { .. })
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Scope {
    Global,
    Procedure(String),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => f.pad("global"),
            Scope::Procedure(name) => f.pad(name),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Symbol {
    pub name: String,
    /// `None` for procedures
    pub ty: Option<Type>,
    pub category: Category,
    pub scope: Scope,
    /// Memory cell of a variable or parameter, entry instruction of a procedure
    pub address: usize,
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ty = match self.ty {
            Some(Type::Integer) => "integer",
            Some(Type::Real) => "real",
            None => "-",
        };
        let category = match self.category {
            Category::Variable => "variable".to_string(),
            Category::Parameter => "parameter".to_string(),
            Category::Procedure { params } => format!("procedure/{}", params),
        };
        write!(
            f,
            "{:<12} {:<8} {:<14} {:<12} {}",
            self.name, ty, category, self.scope, self.address
        )
    }
}

/// Flat list of every symbol declared during one compilation.
///
/// Entering a procedure scope replaces the previous one; there is no nesting.
#[derive(Debug)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    scope: Scope,
}

impl Default for SymbolTable {
    fn default() -> Self {
        SymbolTable::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            symbols: Vec::new(),
            scope: Scope::Global,
        }
    }

    pub fn enter_scope(&mut self, procedure: &str) {
        self.scope = Scope::Procedure(procedure.to_string());
    }

    pub fn exit_scope(&mut self) {
        self.scope = Scope::Global;
    }

    pub fn current_scope(&self) -> &Scope {
        &self.scope
    }

    /// Appends without checking; callers reject redeclarations beforehand with
    /// [`SymbolTable::exists_in_current_scope`].
    pub fn declare(&mut self, symbol: Symbol) {
        self.symbols.push(symbol);
    }

    /// Finds `name` in the current scope first, then in the global scope.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.find(name, &self.scope)
            .or_else(|| self.find(name, &Scope::Global))
    }

    pub fn exists_in_current_scope(&self, name: &str) -> bool {
        self.find(name, &self.scope).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    fn find(&self, name: &str, scope: &Scope) -> Option<&Symbol> {
        self.symbols
            .iter()
            .find(|s| s.name == name && &s.scope == scope)
    }
}

/// One row per symbol in declaration order. A procedure is declared once its
/// parameter list is known, so its parameters are listed right above it.
impl fmt::Display for SymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<12} {:<8} {:<14} {:<12} address",
            "name", "type", "category", "scope"
        )?;
        for symbol in &self.symbols {
            writeln!(f, "{}", symbol)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str, scope: Scope, address: usize) -> Symbol {
        Symbol {
            name: name.to_string(),
            ty: Some(Type::Integer),
            category: Category::Variable,
            scope,
            address,
        }
    }

    #[test]
    fn local_shadows_global() {
        let mut table = SymbolTable::new();
        table.declare(var("x", Scope::Global, 0));
        table.enter_scope("p");
        table.declare(var("x", Scope::Procedure("p".to_string()), 1));

        assert_eq!(table.lookup("x").unwrap().address, 1);
        table.exit_scope();
        assert_eq!(table.lookup("x").unwrap().address, 0);
    }

    #[test]
    fn falls_back_to_global() {
        let mut table = SymbolTable::new();
        table.declare(var("g", Scope::Global, 0));
        table.enter_scope("p");
        assert_eq!(table.lookup("g").unwrap().scope, Scope::Global);
        assert!(table.lookup("missing").is_none());
    }

    #[test]
    fn other_procedure_is_invisible() {
        let mut table = SymbolTable::new();
        table.enter_scope("p");
        table.declare(var("a", Scope::Procedure("p".to_string()), 0));
        table.enter_scope("q");
        assert!(table.lookup("a").is_none());
        assert!(!table.exists_in_current_scope("a"));
    }

    #[test]
    fn exists_only_checks_current_scope() {
        let mut table = SymbolTable::new();
        table.declare(var("x", Scope::Global, 0));
        assert!(table.exists_in_current_scope("x"));
        table.enter_scope("p");
        assert!(!table.exists_in_current_scope("x"));
        assert_eq!(table.current_scope(), &Scope::Procedure("p".to_string()));
    }
}
