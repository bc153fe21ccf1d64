//! Symbol table and scope tree (pass 1)
//!
//! Scopes live in an arena and reference each other by index, so the
//! parent/child cycle needs no reference counting. Each scope owns its
//! symbols; pass 2 stamps resolved types onto them in place.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{Decl, Expr, NodeId, Program, StorageClass, Stmt};
use crate::diagnostics::{DiagnosticCode, Diagnostic, Diagnostics, Severity};
use crate::intrinsics;
use crate::source::SourceSpan;
use crate::types::TypeInfo;

pub type ScopeId = u32;
pub type SymbolId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Variable,
    Constant,
    Parameter,
    Function,
    EnumMember,
    ImportedSymbol,
    Intrinsic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Module,
    Function,
    Block,
    Loop,
}

/// A named entity. Owned by exactly one scope.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    pub kind: SymbolKind,
    /// Resolved type; `None` until pass 2 has run.
    pub ty: Option<TypeInfo>,
    pub scope: ScopeId,
    /// Declaring AST node.
    pub decl: Option<NodeId>,
    pub init: Option<Rc<Expr>>,
    pub storage: Option<StorageClass>,
    pub map_address: Option<u32>,
    pub exported: bool,
    pub is_loop_counter: bool,
    pub is_callback: bool,
    /// Owning enum's name for `EnumMember` symbols.
    pub enum_owner: Option<String>,
    /// Computed value for `EnumMember` symbols (stamped by pass 2).
    pub enum_value: Option<u32>,
    pub span: SourceSpan,
}

#[derive(Debug)]
pub struct Scope {
    pub id: ScopeId,
    pub kind: ScopeKind,
    /// AST node that opened this scope (function, block or loop).
    pub node: Option<NodeId>,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    symbols: HashMap<String, SymbolId>,
    /// Declaration order, for deterministic iteration.
    order: Vec<SymbolId>,
}

#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    symbols: Vec<Symbol>,
    pub module_scope: ScopeId,
    /// Scope opened by a given AST node (function decl, block, for loop).
    node_scopes: HashMap<NodeId, ScopeId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut table = SymbolTable {
            scopes: Vec::new(),
            symbols: Vec::new(),
            module_scope: 0,
            node_scopes: HashMap::new(),
        };
        table.module_scope = table.create_scope(ScopeKind::Module, None, None);
        table.seed_intrinsics();
        table
    }

    fn seed_intrinsics(&mut self) {
        for def in intrinsics::all() {
            let id = self.symbols.len() as SymbolId;
            let symbol = Symbol {
                id,
                name: def.name.to_string(),
                kind: SymbolKind::Intrinsic,
                ty: Some(def.function_type()),
                scope: self.module_scope,
                decl: None,
                init: None,
                storage: None,
                map_address: None,
                exported: false,
                is_loop_counter: false,
                is_callback: false,
                enum_owner: None,
                enum_value: None,
                span: SourceSpan::unknown(),
            };
            self.symbols.push(symbol);
            let scope = &mut self.scopes[self.module_scope as usize];
            scope.symbols.insert(def.name.to_string(), id);
            scope.order.push(id);
        }
    }

    pub fn create_scope(
        &mut self,
        kind: ScopeKind,
        node: Option<NodeId>,
        parent: Option<ScopeId>,
    ) -> ScopeId {
        let id = self.scopes.len() as ScopeId;
        self.scopes.push(Scope {
            id,
            kind,
            node,
            parent,
            children: Vec::new(),
            symbols: HashMap::new(),
            order: Vec::new(),
        });
        if let Some(parent) = parent {
            self.scopes[parent as usize].children.push(id);
        }
        if let Some(node) = node {
            self.node_scopes.insert(node, id);
        }
        id
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id as usize]
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id as usize]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id as usize]
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    /// Scope opened by the given AST node, if any.
    pub fn scope_of_node(&self, node: NodeId) -> Option<ScopeId> {
        self.node_scopes.get(&node).copied()
    }

    /// Symbols declared directly in a scope, in declaration order.
    pub fn symbols_in(&self, scope: ScopeId) -> impl Iterator<Item = &Symbol> {
        self.scopes[scope as usize]
            .order
            .iter()
            .map(|id| &self.symbols[*id as usize])
    }

    /// Declare a symbol, failing with the existing symbol's id on a
    /// duplicate in the same scope.
    pub fn declare(&mut self, mut symbol: Symbol) -> Result<SymbolId, SymbolId> {
        let scope = symbol.scope;
        if let Some(&existing) = self.scopes[scope as usize].symbols.get(&symbol.name) {
            return Err(existing);
        }
        let id = self.symbols.len() as SymbolId;
        symbol.id = id;
        let name = symbol.name.clone();
        self.symbols.push(symbol);
        let scope = &mut self.scopes[scope as usize];
        scope.symbols.insert(name, id);
        scope.order.push(id);
        Ok(id)
    }

    /// Look up a name only in the given scope, without walking parents.
    pub fn lookup_local(&self, scope: ScopeId, name: &str) -> Option<&Symbol> {
        self.scopes[scope as usize]
            .symbols
            .get(name)
            .map(|id| &self.symbols[*id as usize])
    }

    /// Innermost-first lookup along the parent chain.
    ///
    /// Crossing a function boundary hides locals of outer functions: after
    /// the nearest enclosing function scope, only module scopes are
    /// consulted. Module-level names stay visible everywhere.
    pub fn lookup_from(&self, scope: ScopeId, name: &str) -> Option<&Symbol> {
        let mut current = Some(scope);
        let mut crossed_function = false;
        while let Some(id) = current {
            let scope = &self.scopes[id as usize];
            if !crossed_function || scope.kind == ScopeKind::Module {
                if let Some(&symbol) = scope.symbols.get(name) {
                    return Some(&self.symbols[symbol as usize]);
                }
            }
            if scope.kind == ScopeKind::Function {
                crossed_function = true;
            }
            current = scope.parent;
        }
        None
    }

    /// The non-function symbol a given AST node declares (variable
    /// declaration, parameter, or for-loop counter), if any.
    pub fn symbol_declared_by(&self, node: NodeId) -> Option<&Symbol> {
        self.symbols
            .iter()
            .find(|s| s.decl == Some(node) && s.kind != SymbolKind::Function)
    }

    /// Exported symbols of the module scope, in declaration order.
    pub fn exports(&self) -> Vec<&Symbol> {
        self.symbols_in(self.module_scope)
            .filter(|s| s.exported)
            .collect()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        SymbolTable::new()
    }
}

/// Blank symbol with the bookkeeping fields defaulted.
fn symbol(name: &str, kind: SymbolKind, scope: ScopeId, span: SourceSpan) -> Symbol {
    Symbol {
        id: 0,
        name: name.to_string(),
        kind,
        ty: None,
        scope,
        decl: None,
        init: None,
        storage: None,
        map_address: None,
        exported: false,
        is_loop_counter: false,
        is_callback: false,
        enum_owner: None,
        enum_value: None,
        span,
    }
}

/// Pass 1: walk the program and populate the symbol table.
pub struct SymbolTableBuilder<'a> {
    table: SymbolTable,
    diagnostics: &'a mut Diagnostics,
}

impl<'a> SymbolTableBuilder<'a> {
    pub fn new(diagnostics: &'a mut Diagnostics) -> Self {
        SymbolTableBuilder {
            table: SymbolTable::new(),
            diagnostics,
        }
    }

    pub fn build(mut self, program: &Program) -> SymbolTable {
        let module_scope = self.table.module_scope;
        for decl in &program.decls {
            self.collect_decl(decl, module_scope);
        }
        self.table
    }

    fn report_duplicate(&mut self, name: &str, span: SourceSpan, existing: SymbolId) {
        let previous = self.table.symbol(existing).span;
        self.diagnostics.push(
            Diagnostic::new(
                Severity::Error,
                DiagnosticCode::DuplicateSymbol,
                format!("Duplicate declaration of '{name}'"),
                span,
            )
            .with_related(previous, "previous declaration here"),
        );
    }

    fn declare_or_report(&mut self, sym: Symbol) -> Option<SymbolId> {
        let name = sym.name.clone();
        let span = sym.span;
        match self.table.declare(sym) {
            Ok(id) => Some(id),
            Err(existing) => {
                self.report_duplicate(&name, span, existing);
                None
            }
        }
    }

    fn collect_decl(&mut self, decl: &Rc<Decl>, module_scope: ScopeId) {
        match &**decl {
            Decl::Function(func) => {
                let mut sym = symbol(
                    &func.name,
                    SymbolKind::Function,
                    module_scope,
                    func.name_span,
                );
                sym.decl = Some(func.id);
                sym.exported = func.exported;
                sym.is_callback = func.is_callback;
                self.declare_or_report(sym);

                let func_scope =
                    self.table
                        .create_scope(ScopeKind::Function, Some(func.id), Some(module_scope));
                for param in &func.params {
                    let mut sym =
                        symbol(&param.name, SymbolKind::Parameter, func_scope, param.span);
                    sym.decl = Some(param.id);
                    // Duplicate parameters were already reported by the
                    // parser; avoid a second diagnostic for the same name
                    let _ = self.table.declare(sym);
                }
                if let Some(body) = &func.body {
                    self.collect_stmt(body, func_scope);
                }
            }
            Decl::Variable(var) => {
                let kind = if var.is_const {
                    SymbolKind::Constant
                } else {
                    SymbolKind::Variable
                };
                let mut sym = symbol(&var.name, kind, module_scope, var.name_span);
                sym.decl = Some(var.id);
                sym.init = var.init.clone();
                sym.storage = var.storage;
                sym.map_address = var.map_address;
                sym.exported = var.exported;
                self.declare_or_report(sym);
            }
            Decl::Enum(decl_enum) => {
                // Members live directly in the module scope; their enum type
                // and values are stamped by type resolution
                for member in &decl_enum.members {
                    let mut sym = symbol(
                        &member.name,
                        SymbolKind::EnumMember,
                        module_scope,
                        member.span,
                    );
                    sym.decl = Some(member.id);
                    sym.exported = decl_enum.exported;
                    sym.enum_owner = Some(decl_enum.name.clone());
                    self.declare_or_report(sym);
                }
            }
            Decl::Import(import) => {
                for name in &import.names {
                    let mut sym = symbol(
                        &name.name,
                        SymbolKind::ImportedSymbol,
                        module_scope,
                        name.span,
                    );
                    sym.decl = Some(import.id);
                    self.declare_or_report(sym);
                }
            }
            // Type aliases live in the type namespace, not the value one
            Decl::TypeAlias(_) => {}
        }
    }

    fn collect_stmt(&mut self, stmt: &Rc<Stmt>, scope: ScopeId) {
        match &**stmt {
            Stmt::Block(block) => {
                let block_scope =
                    self.table
                        .create_scope(ScopeKind::Block, Some(block.id), Some(scope));
                for child in &block.stmts {
                    self.collect_stmt(child, block_scope);
                }
            }
            Stmt::Var(var) => {
                let kind = if var.is_const {
                    SymbolKind::Constant
                } else {
                    SymbolKind::Variable
                };
                let mut sym = symbol(&var.name, kind, scope, var.name_span);
                sym.decl = Some(var.id);
                sym.init = var.init.clone();
                sym.storage = var.storage;
                self.declare_or_report(sym);
            }
            Stmt::If(s) => {
                self.collect_stmt(&s.then_branch, scope);
                if let Some(else_branch) = &s.else_branch {
                    self.collect_stmt(else_branch, scope);
                }
            }
            Stmt::While(s) => {
                let loop_scope = self
                    .table
                    .create_scope(ScopeKind::Loop, Some(s.id), Some(scope));
                self.collect_stmt(&s.body, loop_scope);
            }
            Stmt::DoWhile(s) => {
                let loop_scope = self
                    .table
                    .create_scope(ScopeKind::Loop, Some(s.id), Some(scope));
                self.collect_stmt(&s.body, loop_scope);
            }
            Stmt::For(s) => {
                // The counter lives in a dedicated loop scope wrapping the body
                let loop_scope = self
                    .table
                    .create_scope(ScopeKind::Loop, Some(s.id), Some(scope));
                let mut sym = symbol(&s.counter, SymbolKind::Variable, loop_scope, s.counter_span);
                sym.decl = Some(s.id);
                sym.is_loop_counter = true;
                self.declare_or_report(sym);
                self.collect_stmt(&s.body, loop_scope);
            }
            Stmt::Switch(s) => {
                for arm in &s.arms {
                    for child in &arm.body {
                        self.collect_stmt(child, scope);
                    }
                }
            }
            Stmt::Match(s) => {
                for arm in &s.arms {
                    for child in &arm.body {
                        self.collect_stmt(child, scope);
                    }
                }
            }
            Stmt::Expr(_) | Stmt::Return(_) | Stmt::Break(_) | Stmt::Continue(_) => {}
        }
    }
}

/// Convenience entry point for pass 1.
pub fn build_symbol_table(program: &Program, diagnostics: &mut Diagnostics) -> SymbolTable {
    SymbolTableBuilder::new(diagnostics).build(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn build(source: &str) -> (SymbolTable, Diagnostics) {
        let mut diags = Diagnostics::new();
        let program = Parser::new(source, &mut diags).parse();
        let table = build_symbol_table(&program, &mut diags);
        (table, diags)
    }

    #[test]
    fn test_globals_and_functions() {
        let (table, diags) = build(
            "let score: word = 0;\n\
             const LIVES: byte = 3;\n\
             function reset(): void { }",
        );
        assert!(!diags.has_errors());
        let score = table.lookup_from(table.module_scope, "score").unwrap();
        assert_eq!(score.kind, SymbolKind::Variable);
        assert!(score.init.is_some());
        let lives = table.lookup_from(table.module_scope, "LIVES").unwrap();
        assert_eq!(lives.kind, SymbolKind::Constant);
        let reset = table.lookup_from(table.module_scope, "reset").unwrap();
        assert_eq!(reset.kind, SymbolKind::Function);
    }

    #[test]
    fn test_intrinsics_seeded() {
        let (table, _) = build("");
        let peek = table.lookup_from(table.module_scope, "peek").unwrap();
        assert_eq!(peek.kind, SymbolKind::Intrinsic);
        assert!(peek.ty.is_some());
    }

    #[test]
    fn test_duplicate_in_same_scope() {
        let (_, diags) = build("let x: byte = 1;\nlet x: word = 2;");
        assert!(diags.has_errors());
        let diag = &diags.items()[0];
        assert_eq!(diag.code, DiagnosticCode::DuplicateSymbol);
        assert_eq!(diag.related.len(), 1);
    }

    #[test]
    fn test_shadowing_in_child_scope_allowed() {
        let (table, diags) = build(
            "let x: byte = 1;\n\
             function f(): void { let x: word = 2; }",
        );
        assert!(!diags.has_errors());
        // Module x and function-local x are distinct symbols
        let module_x = table.lookup_from(table.module_scope, "x").unwrap();
        assert_eq!(module_x.scope, table.module_scope);
        let count = table.symbols().filter(|s| s.name == "x").count();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_parameters_in_function_scope() {
        let (table, diags) = build("function f(a: byte, b: word): void { }");
        assert!(!diags.has_errors());
        let func = table.lookup_from(table.module_scope, "f").unwrap();
        let func_scope = table.scope_of_node(func.decl.unwrap()).unwrap();
        let a = table.lookup_from(func_scope, "a").unwrap();
        assert_eq!(a.kind, SymbolKind::Parameter);
        // Parameters are invisible from the module scope
        assert!(table.lookup_from(table.module_scope, "a").is_none());
    }

    #[test]
    fn test_for_counter_in_loop_scope() {
        let (table, diags) = build(
            "function f(): void { for (i = 0 to 7) { } }",
        );
        assert!(!diags.has_errors());
        let counter = table.symbols().find(|s| s.name == "i").unwrap();
        assert!(counter.is_loop_counter);
        assert_eq!(table.scope(counter.scope).kind, ScopeKind::Loop);
    }

    #[test]
    fn test_enum_members_in_module_scope() {
        let (table, diags) = build("enum Direction { UP, DOWN }");
        assert!(!diags.has_errors());
        let up = table.lookup_from(table.module_scope, "UP").unwrap();
        assert_eq!(up.kind, SymbolKind::EnumMember);
        assert_eq!(up.enum_owner.as_deref(), Some("Direction"));
    }

    #[test]
    fn test_imported_symbols() {
        let (table, diags) = build("import add from Lib.Math;");
        assert!(!diags.has_errors());
        let add = table.lookup_from(table.module_scope, "add").unwrap();
        assert_eq!(add.kind, SymbolKind::ImportedSymbol);
    }

    #[test]
    fn test_function_boundary_hides_outer_locals() {
        let (table, diags) = build(
            "function outer(): void { let hidden: byte = 1; }\n\
             function inner(): void { }",
        );
        assert!(!diags.has_errors());
        let inner = table.lookup_from(table.module_scope, "inner").unwrap();
        let inner_scope = table.scope_of_node(inner.decl.unwrap()).unwrap();
        // `hidden` lives in outer's body block, unreachable from inner
        assert!(table.lookup_from(inner_scope, "hidden").is_none());
        // But module-level names remain visible
        assert!(table.lookup_from(inner_scope, "outer").is_some());
    }

    #[test]
    fn test_exports() {
        let (table, diags) = build(
            "export function api(): void { }\nlet private_var: byte = 0;",
        );
        assert!(!diags.has_errors());
        let exports = table.exports();
        assert_eq!(exports.len(), 1);
        assert_eq!(exports[0].name, "api");
    }
}
