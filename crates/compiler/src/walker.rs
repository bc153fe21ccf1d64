//! Generic depth-first AST traversal
//!
//! Visitors implement [`AstVisitor`] hooks per node family and dispatch on
//! the variant tag where they need finer granularity. The driver owns the
//! ancestor path and a typed context stack (function/loop/block), so
//! visitors that need structural context don't have to re-derive it.

use std::rc::Rc;

use crate::ast::{Decl, Expr, Program, Stmt};

/// What a visitor hook wants the driver to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalkControl {
    /// Descend into children as usual.
    #[default]
    Continue,
    /// Do not descend into this node's children (its exit hook still runs).
    SkipChildren,
    /// Abort the whole walk immediately.
    Stop,
}

/// A reference to any AST node the walker can visit.
#[derive(Debug, Clone)]
pub enum AstRef {
    Decl(Rc<Decl>),
    Stmt(Rc<Stmt>),
    Expr(Rc<Expr>),
}

/// A structural context the walk is currently inside.
#[derive(Debug, Clone)]
pub enum WalkContext {
    /// Innermost function declaration.
    Function(Rc<Decl>),
    /// Innermost `while`/`do`/`for` statement.
    Loop(Rc<Stmt>),
    /// Innermost block statement.
    Block(Rc<Stmt>),
}

/// Driver-owned state available to every hook: ancestor path plus the
/// typed context stack.
#[derive(Debug, Default)]
pub struct WalkState {
    path: Vec<AstRef>,
    contexts: Vec<WalkContext>,
}

impl WalkState {
    /// Immediate parent of the node currently being visited.
    pub fn parent(&self) -> Option<&AstRef> {
        self.path.last()
    }

    /// Full ancestor path, outermost first. The node being visited is not
    /// included.
    pub fn path(&self) -> &[AstRef] {
        &self.path
    }

    pub fn contexts(&self) -> &[WalkContext] {
        &self.contexts
    }

    /// Innermost enclosing function declaration, if any.
    pub fn current_function(&self) -> Option<&Rc<Decl>> {
        self.contexts.iter().rev().find_map(|c| match c {
            WalkContext::Function(decl) => Some(decl),
            _ => None,
        })
    }

    /// True when the walk is inside a loop body of the current function.
    pub fn in_loop(&self) -> bool {
        for context in self.contexts.iter().rev() {
            match context {
                WalkContext::Loop(_) => return true,
                WalkContext::Function(_) => return false,
                WalkContext::Block(_) => continue,
            }
        }
        false
    }
}

/// Depth-first visitor with enter/exit hooks per node family.
///
/// All hooks default to [`WalkControl::Continue`] / no-op, so visitors only
/// override what they care about.
pub trait AstVisitor {
    fn enter_program(&mut self, _program: &Program) -> WalkControl {
        WalkControl::Continue
    }

    fn exit_program(&mut self, _program: &Program) {}

    fn enter_decl(&mut self, _decl: &Rc<Decl>, _state: &WalkState) -> WalkControl {
        WalkControl::Continue
    }

    fn exit_decl(&mut self, _decl: &Rc<Decl>, _state: &WalkState) {}

    fn enter_stmt(&mut self, _stmt: &Rc<Stmt>, _state: &WalkState) -> WalkControl {
        WalkControl::Continue
    }

    fn exit_stmt(&mut self, _stmt: &Rc<Stmt>, _state: &WalkState) {}

    fn enter_expr(&mut self, _expr: &Rc<Expr>, _state: &WalkState) -> WalkControl {
        WalkControl::Continue
    }

    fn exit_expr(&mut self, _expr: &Rc<Expr>, _state: &WalkState) {}
}

/// Internal marker for an aborted walk.
struct Stopped;

type WalkResult = Result<(), Stopped>;

/// Walk a whole program. Returns `false` if a hook stopped the walk early.
pub fn walk_program<V: AstVisitor>(program: &Program, visitor: &mut V) -> bool {
    let mut state = WalkState::default();
    match walk_program_inner(program, visitor, &mut state) {
        Ok(()) => true,
        Err(Stopped) => false,
    }
}

/// Walk a single expression tree outside of any program context.
pub fn walk_expr<V: AstVisitor>(expr: &Rc<Expr>, visitor: &mut V) -> bool {
    let mut state = WalkState::default();
    visit_expr(expr, visitor, &mut state).is_ok()
}

/// Walk a single statement tree outside of any program context.
pub fn walk_stmt<V: AstVisitor>(stmt: &Rc<Stmt>, visitor: &mut V) -> bool {
    let mut state = WalkState::default();
    visit_stmt(stmt, visitor, &mut state).is_ok()
}

fn walk_program_inner<V: AstVisitor>(
    program: &Program,
    visitor: &mut V,
    state: &mut WalkState,
) -> WalkResult {
    match visitor.enter_program(program) {
        WalkControl::Stop => return Err(Stopped),
        WalkControl::SkipChildren => {
            visitor.exit_program(program);
            return Ok(());
        }
        WalkControl::Continue => {}
    }
    for decl in &program.decls {
        visit_decl(decl, visitor, state)?;
    }
    visitor.exit_program(program);
    Ok(())
}

fn visit_decl<V: AstVisitor>(decl: &Rc<Decl>, visitor: &mut V, state: &mut WalkState) -> WalkResult {
    match visitor.enter_decl(decl, state) {
        WalkControl::Stop => return Err(Stopped),
        WalkControl::SkipChildren => {
            visitor.exit_decl(decl, state);
            return Ok(());
        }
        WalkControl::Continue => {}
    }

    state.path.push(AstRef::Decl(Rc::clone(decl)));
    let result = (|| -> WalkResult {
        match &**decl {
            Decl::Function(func) => {
                if let Some(body) = &func.body {
                    state.contexts.push(WalkContext::Function(Rc::clone(decl)));
                    let r = visit_stmt(body, visitor, state);
                    state.contexts.pop();
                    r?;
                }
            }
            Decl::Variable(var) => {
                if let Some(init) = &var.init {
                    visit_expr(init, visitor, state)?;
                }
            }
            Decl::TypeAlias(_) | Decl::Enum(_) | Decl::Import(_) => {}
        }
        Ok(())
    })();
    state.path.pop();
    result?;

    visitor.exit_decl(decl, state);
    Ok(())
}

fn visit_stmt<V: AstVisitor>(stmt: &Rc<Stmt>, visitor: &mut V, state: &mut WalkState) -> WalkResult {
    match visitor.enter_stmt(stmt, state) {
        WalkControl::Stop => return Err(Stopped),
        WalkControl::SkipChildren => {
            visitor.exit_stmt(stmt, state);
            return Ok(());
        }
        WalkControl::Continue => {}
    }

    state.path.push(AstRef::Stmt(Rc::clone(stmt)));
    let result = visit_stmt_children(stmt, visitor, state);
    state.path.pop();
    result?;

    visitor.exit_stmt(stmt, state);
    Ok(())
}

fn visit_stmt_children<V: AstVisitor>(
    stmt: &Rc<Stmt>,
    visitor: &mut V,
    state: &mut WalkState,
) -> WalkResult {
    match &**stmt {
        Stmt::Block(block) => {
            state.contexts.push(WalkContext::Block(Rc::clone(stmt)));
            let result = (|| -> WalkResult {
                for child in &block.stmts {
                    visit_stmt(child, visitor, state)?;
                }
                Ok(())
            })();
            state.contexts.pop();
            result
        }
        Stmt::Expr(s) => visit_expr(&s.expr, visitor, state),
        Stmt::Return(s) => match &s.value {
            Some(value) => visit_expr(value, visitor, state),
            None => Ok(()),
        },
        Stmt::If(s) => {
            visit_expr(&s.cond, visitor, state)?;
            visit_stmt(&s.then_branch, visitor, state)?;
            match &s.else_branch {
                Some(else_branch) => visit_stmt(else_branch, visitor, state),
                None => Ok(()),
            }
        }
        Stmt::While(s) => {
            visit_expr(&s.cond, visitor, state)?;
            state.contexts.push(WalkContext::Loop(Rc::clone(stmt)));
            let result = visit_stmt(&s.body, visitor, state);
            state.contexts.pop();
            result
        }
        Stmt::DoWhile(s) => {
            state.contexts.push(WalkContext::Loop(Rc::clone(stmt)));
            let result = visit_stmt(&s.body, visitor, state);
            state.contexts.pop();
            result?;
            visit_expr(&s.cond, visitor, state)
        }
        Stmt::For(s) => {
            visit_expr(&s.start, visitor, state)?;
            visit_expr(&s.end, visitor, state)?;
            if let Some(step) = &s.step {
                visit_expr(step, visitor, state)?;
            }
            state.contexts.push(WalkContext::Loop(Rc::clone(stmt)));
            let result = visit_stmt(&s.body, visitor, state);
            state.contexts.pop();
            result
        }
        Stmt::Switch(s) => {
            visit_expr(&s.scrutinee, visitor, state)?;
            for arm in &s.arms {
                if let Some(value) = &arm.value {
                    visit_expr(value, visitor, state)?;
                }
                for child in &arm.body {
                    visit_stmt(child, visitor, state)?;
                }
            }
            Ok(())
        }
        Stmt::Match(s) => {
            visit_expr(&s.scrutinee, visitor, state)?;
            for arm in &s.arms {
                if let Some(value) = &arm.value {
                    visit_expr(value, visitor, state)?;
                }
                for child in &arm.body {
                    visit_stmt(child, visitor, state)?;
                }
            }
            Ok(())
        }
        Stmt::Break(_) | Stmt::Continue(_) => Ok(()),
        Stmt::Var(var) => match &var.init {
            Some(init) => visit_expr(init, visitor, state),
            None => Ok(()),
        },
    }
}

fn visit_expr<V: AstVisitor>(expr: &Rc<Expr>, visitor: &mut V, state: &mut WalkState) -> WalkResult {
    match visitor.enter_expr(expr, state) {
        WalkControl::Stop => return Err(Stopped),
        WalkControl::SkipChildren => {
            visitor.exit_expr(expr, state);
            return Ok(());
        }
        WalkControl::Continue => {}
    }

    state.path.push(AstRef::Expr(Rc::clone(expr)));
    let result = (|| -> WalkResult {
        match &**expr {
            Expr::Number(_) | Expr::Str(_) | Expr::Bool(_) | Expr::Char(_) | Expr::Ident(_) => {}
            Expr::Array(array) => {
                for element in &array.elements {
                    visit_expr(element, visitor, state)?;
                }
            }
            Expr::Unary(u) => visit_expr(&u.operand, visitor, state)?,
            Expr::AddrOf(a) => visit_expr(&a.operand, visitor, state)?,
            Expr::Binary(b) => {
                visit_expr(&b.lhs, visitor, state)?;
                visit_expr(&b.rhs, visitor, state)?;
            }
            Expr::Ternary(t) => {
                visit_expr(&t.cond, visitor, state)?;
                visit_expr(&t.then_expr, visitor, state)?;
                visit_expr(&t.else_expr, visitor, state)?;
            }
            Expr::Call(call) => {
                visit_expr(&call.callee, visitor, state)?;
                for arg in &call.args {
                    visit_expr(arg, visitor, state)?;
                }
            }
            Expr::Index(index) => {
                visit_expr(&index.target, visitor, state)?;
                visit_expr(&index.index, visitor, state)?;
            }
            Expr::Member(member) => visit_expr(&member.target, visitor, state)?,
            Expr::Assign(assign) => {
                visit_expr(&assign.target, visitor, state)?;
                visit_expr(&assign.value, visitor, state)?;
            }
        }
        Ok(())
    })();
    state.path.pop();
    result?;

    visitor.exit_expr(expr, state);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::parser::Parser;

    fn parse(source: &str) -> Program {
        let mut diags = Diagnostics::new();
        let program = Parser::new(source, &mut diags).parse();
        assert!(!diags.has_errors(), "errors: {:?}", diags.items());
        program
    }

    #[derive(Default)]
    struct Counter {
        decls: usize,
        stmts: usize,
        exprs: usize,
        exits: usize,
    }

    impl AstVisitor for Counter {
        fn enter_decl(&mut self, _decl: &Rc<Decl>, _state: &WalkState) -> WalkControl {
            self.decls += 1;
            WalkControl::Continue
        }

        fn enter_stmt(&mut self, _stmt: &Rc<Stmt>, _state: &WalkState) -> WalkControl {
            self.stmts += 1;
            WalkControl::Continue
        }

        fn enter_expr(&mut self, _expr: &Rc<Expr>, _state: &WalkState) -> WalkControl {
            self.exprs += 1;
            WalkControl::Continue
        }

        fn exit_expr(&mut self, _expr: &Rc<Expr>, _state: &WalkState) {
            self.exits += 1;
        }
    }

    #[test]
    fn test_counts_all_nodes() {
        let program = parse("function f(): byte { let x: byte = 1 + 2; return x; }");
        let mut counter = Counter::default();
        assert!(walk_program(&program, &mut counter));
        assert_eq!(counter.decls, 1);
        // block, var, return
        assert_eq!(counter.stmts, 3);
        // (1 + 2), 1, 2, x
        assert_eq!(counter.exprs, 4);
        assert_eq!(counter.exits, counter.exprs);
    }

    struct SkipLoops {
        exprs: usize,
    }

    impl AstVisitor for SkipLoops {
        fn enter_stmt(&mut self, stmt: &Rc<Stmt>, _state: &WalkState) -> WalkControl {
            if matches!(&**stmt, Stmt::While(_)) {
                WalkControl::SkipChildren
            } else {
                WalkControl::Continue
            }
        }

        fn enter_expr(&mut self, _expr: &Rc<Expr>, _state: &WalkState) -> WalkControl {
            self.exprs += 1;
            WalkControl::Continue
        }
    }

    #[test]
    fn test_skip_children() {
        let program = parse("function f(): void { while (a < b) { c = d; } e = 1; }");
        let mut visitor = SkipLoops { exprs: 0 };
        assert!(walk_program(&program, &mut visitor));
        // Only the trailing assignment's nodes are seen: e = 1, e, 1
        assert_eq!(visitor.exprs, 3);
    }

    struct StopAtFirstExpr;

    impl AstVisitor for StopAtFirstExpr {
        fn enter_expr(&mut self, _expr: &Rc<Expr>, _state: &WalkState) -> WalkControl {
            WalkControl::Stop
        }
    }

    #[test]
    fn test_stop_aborts_walk() {
        let program = parse("let a: byte = 1;\nlet b: byte = 2;");
        assert!(!walk_program(&program, &mut StopAtFirstExpr));
    }

    struct ContextProbe {
        saw_loop_expr: bool,
        function_name: Option<String>,
        max_path_depth: usize,
    }

    impl AstVisitor for ContextProbe {
        fn enter_expr(&mut self, expr: &Rc<Expr>, state: &WalkState) -> WalkControl {
            self.max_path_depth = self.max_path_depth.max(state.path().len());
            if expr.as_ident() == Some("inside") {
                self.saw_loop_expr = state.in_loop();
                self.function_name = state.current_function().and_then(|d| match &**d {
                    Decl::Function(f) => Some(f.name.clone()),
                    _ => None,
                });
                assert!(state.parent().is_some());
            }
            WalkControl::Continue
        }
    }

    #[test]
    fn test_context_stack() {
        let program = parse("function outer(): void { while (true) { inside = 1; } }");
        let mut probe = ContextProbe {
            saw_loop_expr: false,
            function_name: None,
            max_path_depth: 0,
        };
        walk_program(&program, &mut probe);
        assert!(probe.saw_loop_expr);
        assert_eq!(probe.function_name.as_deref(), Some("outer"));
        assert!(probe.max_path_depth >= 3);
    }

    #[test]
    fn test_walker_reusable_across_walks() {
        let program = parse("let a: byte = 1;");
        let mut counter = Counter::default();
        walk_program(&program, &mut counter);
        let first = counter.exprs;
        walk_program(&program, &mut counter);
        assert_eq!(counter.exprs, first * 2);
    }
}
