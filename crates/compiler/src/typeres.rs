//! Type resolution (pass 2)
//!
//! Collects type aliases and enums first so named types resolve in any
//! declaration order, then walks the program stamping resolved types onto
//! the symbols pass 1 created. Aliases resolve transitively (cycles are an
//! error); enum member values follow C rules - explicit value or
//! previous + 1, starting at 0.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::ast::{Decl, Program, Stmt, TypeRef};
use crate::diagnostics::{DiagnosticCode, Diagnostics};
use crate::symbols::{ScopeId, SymbolTable};
use crate::types::TypeInfo;

/// Registry of named types (builtins, enums, aliases), kept for later
/// passes to resolve annotations against.
pub struct TypeResolver {
    named: HashMap<String, TypeInfo>,
}

impl TypeResolver {
    /// Run pass 2 over a program, stamping symbol types in place.
    pub fn run(
        program: &Program,
        table: &mut SymbolTable,
        diagnostics: &mut Diagnostics,
    ) -> TypeResolver {
        let mut resolver = TypeResolver {
            named: HashMap::new(),
        };
        resolver.collect_named_types(program, diagnostics);
        resolver.stamp_program(program, table, diagnostics);
        resolver
    }

    /// Resolver with builtins only; used by tests and tooling.
    pub fn empty() -> TypeResolver {
        TypeResolver {
            named: HashMap::new(),
        }
    }

    pub fn named_type(&self, name: &str) -> Option<&TypeInfo> {
        self.named.get(name)
    }

    // ------------------------------------------------------------------
    // Named type collection
    // ------------------------------------------------------------------

    fn collect_named_types(&mut self, program: &Program, diagnostics: &mut Diagnostics) {
        // Enums first: they resolve without reference to other named types
        for decl in &program.decls {
            if let Decl::Enum(decl_enum) = &**decl {
                let mut members = Vec::new();
                let mut next_value: u32 = 0;
                for member in &decl_enum.members {
                    let value = member.value.unwrap_or(next_value);
                    next_value = value.wrapping_add(1);
                    members.push((member.name.clone(), value));
                }
                let info = TypeInfo::Enum {
                    name: decl_enum.name.clone(),
                    members,
                };
                if self
                    .named
                    .insert(decl_enum.name.clone(), info)
                    .is_some()
                {
                    diagnostics.error(
                        DiagnosticCode::DuplicateSymbol,
                        format!("Duplicate type name '{}'", decl_enum.name),
                        decl_enum.span,
                    );
                }
            }
        }

        // Aliases may chain onto enums, builtins or other aliases
        let alias_decls: Vec<_> = program
            .decls
            .iter()
            .filter_map(|d| match &**d {
                Decl::TypeAlias(alias) => Some(alias.clone()),
                _ => None,
            })
            .collect();
        let alias_targets: HashMap<String, TypeRef> = alias_decls
            .iter()
            .map(|a| (a.name.clone(), a.target.clone()))
            .collect();

        for alias in &alias_decls {
            if self.named.contains_key(&alias.name) {
                // Either a duplicate alias or a clash with an enum name
                if !alias_targets.contains_key(&alias.name)
                    || self
                        .named
                        .get(&alias.name)
                        .is_some_and(|t| !matches!(t, TypeInfo::Alias { .. }))
                {
                    diagnostics.error(
                        DiagnosticCode::DuplicateSymbol,
                        format!("Duplicate type name '{}'", alias.name),
                        alias.span,
                    );
                }
                continue;
            }
            let mut visiting = HashSet::new();
            let resolved =
                self.resolve_alias(&alias.name, &alias_targets, &mut visiting, diagnostics);
            self.named.insert(alias.name.clone(), resolved);
        }
    }

    fn resolve_alias(
        &mut self,
        name: &str,
        alias_targets: &HashMap<String, TypeRef>,
        visiting: &mut HashSet<String>,
        diagnostics: &mut Diagnostics,
    ) -> TypeInfo {
        if let Some(existing) = self.named.get(name) {
            return existing.clone();
        }
        let Some(target_ref) = alias_targets.get(name) else {
            // Not an alias; resolve as an ordinary annotation
            return TypeInfo::Byte;
        };
        if !visiting.insert(name.to_string()) {
            diagnostics.error(
                DiagnosticCode::CyclicAlias,
                format!("Type alias '{name}' is part of a cycle"),
                target_ref.span,
            );
            return TypeInfo::Byte;
        }

        let target = if alias_targets.contains_key(&target_ref.name)
            && !self.named.contains_key(&target_ref.name)
        {
            let inner =
                self.resolve_alias(&target_ref.name, alias_targets, visiting, diagnostics);
            self.named.insert(target_ref.name.clone(), inner.clone());
            self.wrap_array(inner, target_ref, diagnostics)
        } else {
            self.resolve_type_ref(target_ref, diagnostics)
        };
        visiting.remove(name);

        TypeInfo::Alias {
            name: name.to_string(),
            target: Box::new(target),
        }
    }

    // ------------------------------------------------------------------
    // Annotation resolution
    // ------------------------------------------------------------------

    /// Resolve a syntactic annotation to a structural type. Unknown names
    /// report a diagnostic and recover as `byte` so checking continues.
    pub fn resolve_type_ref(&self, tr: &TypeRef, diagnostics: &mut Diagnostics) -> TypeInfo {
        let base = match tr.name.as_str() {
            "byte" => TypeInfo::Byte,
            "word" => TypeInfo::Word,
            "bool" => TypeInfo::Bool,
            "void" => TypeInfo::Void,
            "string" => TypeInfo::Str,
            name => match self.named.get(name) {
                Some(info) => info.clone(),
                None => {
                    diagnostics.error(
                        DiagnosticCode::UnknownType,
                        format!("Unknown type '{name}'"),
                        tr.span,
                    );
                    TypeInfo::Byte
                }
            },
        };
        self.wrap_array(base, tr, diagnostics)
    }

    fn wrap_array(
        &self,
        base: TypeInfo,
        tr: &TypeRef,
        diagnostics: &mut Diagnostics,
    ) -> TypeInfo {
        match tr.array_size {
            None => base,
            Some(count) => {
                if count == Some(0) {
                    diagnostics.error(
                        DiagnosticCode::InvalidArraySize,
                        "Array size must be greater than zero".to_string(),
                        tr.span,
                    );
                    return TypeInfo::array(base, None);
                }
                TypeInfo::array(base, count)
            }
        }
    }

    // ------------------------------------------------------------------
    // Symbol stamping
    // ------------------------------------------------------------------

    fn stamp_program(
        &self,
        program: &Program,
        table: &mut SymbolTable,
        diagnostics: &mut Diagnostics,
    ) {
        let module_scope = table.module_scope;
        for decl in &program.decls {
            match &**decl {
                Decl::Variable(var) => {
                    let ty = self.resolve_type_ref(&var.ty, diagnostics);
                    self.stamp(table, module_scope, &var.name, var.id, ty);
                }
                Decl::Function(func) => {
                    let mut params = Vec::new();
                    let mut param_names = Vec::new();
                    for param in &func.params {
                        let ty = self.resolve_type_ref(&param.ty, diagnostics);
                        params.push(ty);
                        param_names.push(param.name.clone());
                    }
                    let return_type = self.resolve_type_ref(&func.return_type, diagnostics);

                    if let Some(scope) = table.scope_of_node(func.id) {
                        for (param, ty) in func.params.iter().zip(params.iter()) {
                            self.stamp(table, scope, &param.name, param.id, ty.clone());
                        }
                        if let Some(body) = &func.body {
                            self.stamp_stmt(body, table, scope, diagnostics);
                        }
                    }

                    let func_type = TypeInfo::Function {
                        params,
                        param_names,
                        return_type: Box::new(return_type),
                    };
                    self.stamp(table, module_scope, &func.name, func.id, func_type);
                }
                Decl::Enum(decl_enum) => {
                    let Some(info) = self.named.get(&decl_enum.name).cloned() else {
                        continue;
                    };
                    for member in &decl_enum.members {
                        let value = info.enum_member(&member.name);
                        if let Some(sym) = table.lookup_local(module_scope, &member.name) {
                            if sym.decl == Some(member.id) {
                                let id = sym.id;
                                let sym = table.symbol_mut(id);
                                sym.ty = Some(info.clone());
                                sym.enum_value = value;
                            }
                        }
                    }
                }
                Decl::TypeAlias(_) | Decl::Import(_) => {}
            }
        }
    }

    fn stamp_stmt(
        &self,
        stmt: &Rc<Stmt>,
        table: &mut SymbolTable,
        scope: ScopeId,
        diagnostics: &mut Diagnostics,
    ) {
        match &**stmt {
            Stmt::Block(block) => {
                let block_scope = table.scope_of_node(block.id).unwrap_or(scope);
                for child in &block.stmts {
                    self.stamp_stmt(child, table, block_scope, diagnostics);
                }
            }
            Stmt::Var(var) => {
                let ty = self.resolve_type_ref(&var.ty, diagnostics);
                self.stamp(table, scope, &var.name, var.id, ty);
            }
            Stmt::If(s) => {
                self.stamp_stmt(&s.then_branch, table, scope, diagnostics);
                if let Some(else_branch) = &s.else_branch {
                    self.stamp_stmt(else_branch, table, scope, diagnostics);
                }
            }
            Stmt::While(s) => {
                let loop_scope = table.scope_of_node(s.id).unwrap_or(scope);
                self.stamp_stmt(&s.body, table, loop_scope, diagnostics);
            }
            Stmt::DoWhile(s) => {
                let loop_scope = table.scope_of_node(s.id).unwrap_or(scope);
                self.stamp_stmt(&s.body, table, loop_scope, diagnostics);
            }
            Stmt::For(s) => {
                let loop_scope = table.scope_of_node(s.id).unwrap_or(scope);
                // Unannotated counters default to byte
                let counter_type = match &s.counter_type {
                    Some(tr) => self.resolve_type_ref(tr, diagnostics),
                    None => TypeInfo::Byte,
                };
                self.stamp(table, loop_scope, &s.counter, s.id, counter_type);
                self.stamp_stmt(&s.body, table, loop_scope, diagnostics);
            }
            Stmt::Switch(s) => {
                for arm in &s.arms {
                    for child in &arm.body {
                        self.stamp_stmt(child, table, scope, diagnostics);
                    }
                }
            }
            Stmt::Match(s) => {
                for arm in &s.arms {
                    for child in &arm.body {
                        self.stamp_stmt(child, table, scope, diagnostics);
                    }
                }
            }
            Stmt::Expr(_) | Stmt::Return(_) | Stmt::Break(_) | Stmt::Continue(_) => {}
        }
    }

    fn stamp(
        &self,
        table: &mut SymbolTable,
        scope: ScopeId,
        name: &str,
        decl: crate::ast::NodeId,
        ty: TypeInfo,
    ) {
        if let Some(sym) = table.lookup_local(scope, name) {
            if sym.decl == Some(decl) {
                let id = sym.id;
                table.symbol_mut(id).ty = Some(ty);
            }
        }
    }
}
