//! Definite assignment analysis (tier 1)
//!
//! Forward walk over each function body tracking two facts per local:
//! *definitely* assigned (on every path) and *possibly* assigned (on some
//! path). Branch merges intersect the definite set and union the possible
//! set; loop bodies contribute possible assignments only, since they may
//! run zero times. A read of a never-assigned local is an error; a read of
//! a possibly-unassigned one is a warning.

use std::collections::HashSet;
use std::rc::Rc;

use crate::ast::{AssignOp, Decl, Expr, Program, Stmt};
use crate::diagnostics::{DiagnosticCode, Diagnostics};
use crate::source::SourceSpan;
use crate::symbols::{SymbolId, SymbolKind, SymbolTable};
use crate::typechecker::CheckResult;
use crate::walker::{self, AstVisitor, WalkControl, WalkState};

use super::decl_symbol;

#[derive(Debug, Clone, Default)]
struct State {
    definite: HashSet<SymbolId>,
    maybe: HashSet<SymbolId>,
    /// Control cannot continue past this point (return/break/continue).
    terminated: bool,
}

impl State {
    fn assign(&mut self, symbol: SymbolId) {
        self.definite.insert(symbol);
        self.maybe.insert(symbol);
    }

    /// Merge two branch outcomes back together.
    fn merge(a: State, b: State) -> State {
        if a.terminated && !b.terminated {
            return b;
        }
        if b.terminated && !a.terminated {
            return a;
        }
        State {
            definite: a.definite.intersection(&b.definite).copied().collect(),
            maybe: a.maybe.union(&b.maybe).copied().collect(),
            terminated: a.terminated && b.terminated,
        }
    }
}

/// One identifier read with its site, plus the writes of the expression.
#[derive(Default)]
struct Accesses {
    reads: Vec<(SymbolId, SourceSpan)>,
    writes: Vec<SymbolId>,
}

struct AccessSites<'a> {
    check: &'a CheckResult,
    out: Accesses,
}

impl AccessSites<'_> {
    fn read_all(&mut self, expr: &Rc<Expr>) {
        let mut nested = AccessSites {
            check: self.check,
            out: std::mem::take(&mut self.out),
        };
        walker::walk_expr(expr, &mut nested);
        self.out = nested.out;
    }
}

impl AstVisitor for AccessSites<'_> {
    fn enter_expr(&mut self, expr: &Rc<Expr>, _state: &WalkState) -> WalkControl {
        match &**expr {
            Expr::Assign(assign) => {
                // Evaluate the RHS reads before the target write
                self.read_all(&assign.value);
                match &*assign.target {
                    Expr::Ident(ident) => {
                        if let Some(symbol) = self.check.symbol_of(ident.id) {
                            if assign.op != AssignOp::Assign {
                                self.out.reads.push((symbol, ident.span));
                            }
                            self.out.writes.push(symbol);
                        }
                    }
                    // Element stores read the index; the array itself was
                    // fully reserved at declaration
                    Expr::Index(index) => {
                        self.read_all(&index.index);
                        if assign.op != AssignOp::Assign {
                            self.read_all(&index.target);
                        }
                    }
                    other_target => {
                        let rc = Rc::new(other_target.clone());
                        self.read_all(&rc);
                    }
                }
                WalkControl::SkipChildren
            }
            Expr::Ident(ident) => {
                if let Some(symbol) = self.check.symbol_of(ident.id) {
                    self.out.reads.push((symbol, ident.span));
                }
                WalkControl::Continue
            }
            // `@x` takes an address without reading the value
            Expr::AddrOf(_) => WalkControl::SkipChildren,
            _ => WalkControl::Continue,
        }
    }
}

fn expr_accesses(expr: &Rc<Expr>, check: &CheckResult) -> Accesses {
    let mut sites = AccessSites {
        check,
        out: Accesses::default(),
    };
    walker::walk_expr(expr, &mut sites);
    sites.out
}

struct Analyzer<'a> {
    table: &'a SymbolTable,
    check: &'a CheckResult,
    diagnostics: &'a mut Diagnostics,
    /// Locals and parameters of the current function.
    tracked: HashSet<SymbolId>,
    report_warnings: bool,
}

impl Analyzer<'_> {
    fn apply_expr(&mut self, expr: &Rc<Expr>, state: &mut State) {
        let accesses = expr_accesses(expr, self.check);
        for (symbol, span) in &accesses.reads {
            self.check_read(*symbol, *span, state);
        }
        for symbol in accesses.writes {
            if self.tracked.contains(&symbol) {
                state.assign(symbol);
            }
        }
    }

    fn check_read(&mut self, symbol: SymbolId, span: SourceSpan, state: &State) {
        if !self.tracked.contains(&symbol) || state.definite.contains(&symbol) {
            return;
        }
        let name = &self.table.symbol(symbol).name;
        if state.maybe.contains(&symbol) {
            if self.report_warnings {
                self.diagnostics.warning(
                    DiagnosticCode::PossiblyUnassigned,
                    format!("Variable '{name}' may be uninitialized here"),
                    span,
                );
            }
        } else {
            self.diagnostics.error(
                DiagnosticCode::UsedBeforeAssigned,
                format!("Variable '{name}' is used before being assigned"),
                span,
            );
        }
    }

    fn visit_stmt(&mut self, stmt: &Rc<Stmt>, state: &mut State) {
        if state.terminated {
            // Unreachable statements are reported by dead-code analysis;
            // no assignment facts flow out of them
            return;
        }
        match &**stmt {
            Stmt::Block(block) => {
                for child in &block.stmts {
                    self.visit_stmt(child, state);
                }
            }
            Stmt::Var(var) => {
                if let Some(init) = &var.init {
                    self.apply_expr(init, state);
                }
                if let Some(symbol) = decl_symbol(self.table, var.id) {
                    if var.init.is_some() {
                        state.assign(symbol);
                    }
                }
            }
            Stmt::Expr(s) => self.apply_expr(&s.expr, state),
            Stmt::Return(s) => {
                if let Some(value) = &s.value {
                    self.apply_expr(value, state);
                }
                state.terminated = true;
            }
            Stmt::Break(_) | Stmt::Continue(_) => {
                state.terminated = true;
            }
            Stmt::If(s) => {
                self.apply_expr(&s.cond, state);
                let mut then_state = state.clone();
                self.visit_stmt(&s.then_branch, &mut then_state);
                let mut else_state = state.clone();
                if let Some(else_branch) = &s.else_branch {
                    self.visit_stmt(else_branch, &mut else_state);
                }
                *state = State::merge(then_state, else_state);
            }
            Stmt::While(s) => {
                self.apply_expr(&s.cond, state);
                // The body may run zero times: its assignments are only
                // possible, never definite
                let mut body_state = state.clone();
                self.visit_stmt(&s.body, &mut body_state);
                state.maybe.extend(body_state.maybe);
            }
            Stmt::DoWhile(s) => {
                // The body runs at least once
                let mut body_state = state.clone();
                self.visit_stmt(&s.body, &mut body_state);
                if !body_state.terminated {
                    self.apply_expr(&s.cond, &mut body_state);
                }
                body_state.terminated = false;
                *state = body_state;
            }
            Stmt::For(s) => {
                self.apply_expr(&s.start, state);
                self.apply_expr(&s.end, state);
                if let Some(step) = &s.step {
                    self.apply_expr(step, state);
                }
                if let Some(counter) = decl_symbol(self.table, s.id) {
                    self.tracked.insert(counter);
                    state.assign(counter);
                }
                let mut body_state = state.clone();
                self.visit_stmt(&s.body, &mut body_state);
                state.maybe.extend(body_state.maybe);
            }
            Stmt::Switch(s) => self.visit_arms(&s.scrutinee, &s.arms, state),
            Stmt::Match(s) => self.visit_arms(&s.scrutinee, &s.arms, state),
        }
    }

    /// Switch and match share merge behavior here: every arm starts from
    /// the pre-state (sound for fall-through, which only adds assignments)
    /// and non-returning arms intersect at the merge point.
    fn visit_arms(
        &mut self,
        scrutinee: &Rc<Expr>,
        arms: &[crate::ast::CaseArm],
        state: &mut State,
    ) {
        self.apply_expr(scrutinee, state);
        let mut has_default = false;
        let mut merged: Option<State> = None;
        for arm in arms {
            if arm.value.is_none() {
                has_default = true;
            }
            if let Some(value) = &arm.value {
                self.apply_expr(value, state);
            }
            let mut arm_state = state.clone();
            for child in &arm.body {
                self.visit_stmt(child, &mut arm_state);
            }
            // A break-terminated arm still flows to the merge point; only
            // a trailing return truly leaves the function
            arm_state.terminated = arm_state.terminated
                && matches!(arm.body.last().map(|last| &**last), Some(Stmt::Return(_)));
            merged = Some(match merged {
                None => arm_state,
                Some(prev) => State::merge(prev, arm_state),
            });
        }
        if let Some(mut merged) = merged {
            if !has_default {
                // The scrutinee may match no arm at all
                merged = State::merge(merged, state.clone());
            }
            *state = merged;
        }
    }
}

/// Run definite assignment over every function body.
pub fn analyze(
    program: &Program,
    table: &SymbolTable,
    check: &CheckResult,
    diagnostics: &mut Diagnostics,
    report_warnings: bool,
) {
    for decl in &program.decls {
        let Decl::Function(func) = &**decl else {
            continue;
        };
        let Some(body) = &func.body else {
            continue;
        };
        let Some(func_scope) = table.scope_of_node(func.id) else {
            continue;
        };

        // Everything declared at or below the function scope is tracked
        let tracked: HashSet<SymbolId> = table
            .symbols()
            .filter(|s| {
                matches!(s.kind, SymbolKind::Variable | SymbolKind::Parameter)
                    && scope_within(table, s.scope, func_scope)
            })
            .map(|s| s.id)
            .collect();

        let mut state = State::default();
        // Parameters arrive assigned
        for symbol in table.symbols_in(func_scope) {
            if symbol.kind == SymbolKind::Parameter {
                state.assign(symbol.id);
            }
        }

        let mut analyzer = Analyzer {
            table,
            check,
            diagnostics,
            tracked,
            report_warnings,
        };
        analyzer.visit_stmt(body, &mut state);
    }
}

fn scope_within(table: &SymbolTable, scope: crate::symbols::ScopeId, root: crate::symbols::ScopeId) -> bool {
    let mut current = Some(scope);
    while let Some(id) = current {
        if id == root {
            return true;
        }
        current = table.scope(id).parent;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::symbols::build_symbol_table;
    use crate::typechecker::{TypeCheckOptions, check_program};
    use crate::typeres::TypeResolver;

    fn run(source: &str) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let program = Parser::new(source, &mut diags).parse();
        let mut table = build_symbol_table(&program, &mut diags);
        let resolver = TypeResolver::run(&program, &mut table, &mut diags);
        let check = check_program(
            &program,
            &table,
            &resolver,
            &mut diags,
            TypeCheckOptions::default(),
        );
        analyze(&program, &table, &check, &mut diags, true);
        diags
    }

    fn codes(diags: &Diagnostics) -> Vec<DiagnosticCode> {
        diags.iter().map(|d| d.code).collect()
    }

    #[test]
    fn test_initialized_variable_clean() {
        let diags = run("function f(): void { let x: byte = 1; let y: byte = x; }");
        assert!(diags.is_empty(), "unexpected: {:?}", diags.items());
    }

    #[test]
    fn test_never_assigned_is_error() {
        let diags = run("function f(): void { let x: byte; let y: byte = x; }");
        assert_eq!(codes(&diags), vec![DiagnosticCode::UsedBeforeAssigned]);
    }

    #[test]
    fn test_one_branch_assignment_warns() {
        let diags = run(
            "function main(): void {\n\
               let i: byte;\n\
               if (true) { i = 1; }\n\
               let j: byte = i;\n\
             }",
        );
        assert_eq!(codes(&diags), vec![DiagnosticCode::PossiblyUnassigned]);
        assert!(diags.items()[0].message.contains("'i'"));
    }

    #[test]
    fn test_both_branches_assign_is_definite() {
        let diags = run(
            "function f(c: bool): void {\n\
               let x: byte;\n\
               if (c) { x = 1; } else { x = 2; }\n\
               let y: byte = x;\n\
             }",
        );
        assert!(diags.is_empty(), "unexpected: {:?}", diags.items());
    }

    #[test]
    fn test_terminating_branch_does_not_dilute() {
        let diags = run(
            "function f(c: bool): byte {\n\
               let x: byte;\n\
               if (c) { return 0; } else { x = 2; }\n\
               return x;\n\
             }",
        );
        assert!(diags.is_empty(), "unexpected: {:?}", diags.items());
    }

    #[test]
    fn test_loop_body_assignment_is_only_possible() {
        let diags = run(
            "function f(n: byte): void {\n\
               let x: byte;\n\
               while (n > 0) { x = 1; }\n\
               let y: byte = x;\n\
             }",
        );
        assert_eq!(codes(&diags), vec![DiagnosticCode::PossiblyUnassigned]);
    }

    #[test]
    fn test_do_while_body_assignment_is_definite() {
        let diags = run(
            "function f(n: byte): void {\n\
               let x: byte;\n\
               do { x = 1; } while (n > 0);\n\
               let y: byte = x;\n\
             }",
        );
        assert!(diags.is_empty(), "unexpected: {:?}", diags.items());
    }

    #[test]
    fn test_parameters_start_assigned() {
        let diags = run("function f(a: byte): byte { return a; }");
        assert!(diags.is_empty(), "unexpected: {:?}", diags.items());
    }

    #[test]
    fn test_for_counter_assigned_by_header() {
        let diags = run(
            "function f(): void { for (i = 0 to 7) { let x: byte = i; } }",
        );
        assert!(diags.is_empty(), "unexpected: {:?}", diags.items());
    }

    #[test]
    fn test_compound_assignment_reads_before_writing() {
        let diags = run("function f(): void { let x: byte; x += 1; }");
        assert_eq!(codes(&diags), vec![DiagnosticCode::UsedBeforeAssigned]);
    }

    #[test]
    fn test_rhs_read_before_target_write() {
        // `x = x + 1` on an unassigned x reads it first
        let diags = run("function f(): void { let x: byte; x = x + 1; }");
        assert_eq!(codes(&diags), vec![DiagnosticCode::UsedBeforeAssigned]);
    }

    #[test]
    fn test_switch_all_arms_assign_with_default() {
        let diags = run(
            "function f(k: byte): void {\n\
               let x: byte;\n\
               match (k) { case 1: x = 1; case 2: x = 2; default: x = 0; }\n\
               let y: byte = x;\n\
             }",
        );
        assert!(diags.is_empty(), "unexpected: {:?}", diags.items());
    }

    #[test]
    fn test_switch_without_default_is_possible_only() {
        let diags = run(
            "function f(k: byte): void {\n\
               let x: byte;\n\
               match (k) { case 1: x = 1; }\n\
               let y: byte = x;\n\
             }",
        );
        assert_eq!(codes(&diags), vec![DiagnosticCode::PossiblyUnassigned]);
    }

    #[test]
    fn test_globals_not_tracked() {
        let diags = run(
            "let score: word;\nfunction f(): word { return score; }",
        );
        assert!(diags.is_empty(), "unexpected: {:?}", diags.items());
    }
}
