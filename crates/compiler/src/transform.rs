//! Generic AST rewriting with structural sharing
//!
//! The driver rewrites children bottom-up and reconstructs a parent only
//! when at least one child actually changed; otherwise the original node is
//! returned by identity (the same `Rc`). Hooks run after child rewriting on
//! the candidate node; returning `None` keeps it. Rebuilt nodes inherit the
//! original node's id and span.

use std::rc::Rc;

use crate::ast::{
    ArrayLit, AssignExpr, BinaryExpr, BlockStmt, CallExpr, CaseArm, Decl, DoWhileStmt, Expr,
    ExprStmt, ForStmt, FunctionDecl, IfStmt, IndexExpr, MatchStmt, MemberExpr, Program,
    ReturnStmt, Stmt, SwitchStmt, TernaryExpr, UnaryExpr, VarDecl, WhileStmt,
};

/// Rewrite hooks. Every hook defaults to "no change".
pub trait AstTransformer {
    fn transform_decl(&mut self, _decl: &Rc<Decl>) -> Option<Rc<Decl>> {
        None
    }

    fn transform_stmt(&mut self, _stmt: &Rc<Stmt>) -> Option<Rc<Stmt>> {
        None
    }

    fn transform_expr(&mut self, _expr: &Rc<Expr>) -> Option<Rc<Expr>> {
        None
    }
}

/// The identity transformer; useful as a baseline and in tests.
pub struct IdentityTransformer;

impl AstTransformer for IdentityTransformer {}

/// Rewrite a whole program. Unchanged declarations are shared with the
/// input program by identity.
pub fn transform_program<T: AstTransformer>(program: &Program, transformer: &mut T) -> Program {
    let mut decls = Vec::with_capacity(program.decls.len());
    let mut changed = false;
    for decl in &program.decls {
        let rewritten = rewrite_decl(decl, transformer);
        changed |= !Rc::ptr_eq(&rewritten, decl);
        decls.push(rewritten);
    }
    if !changed {
        return program.clone();
    }
    Program {
        id: program.id,
        span: program.span,
        module: program.module.clone(),
        decls,
    }
}

pub fn rewrite_decl<T: AstTransformer>(decl: &Rc<Decl>, transformer: &mut T) -> Rc<Decl> {
    let candidate = match &**decl {
        Decl::Function(func) => {
            let body = func.body.as_ref().map(|b| rewrite_stmt(b, transformer));
            let body_changed = match (&func.body, &body) {
                (Some(old), Some(new)) => !Rc::ptr_eq(old, new),
                _ => false,
            };
            if body_changed {
                Rc::new(Decl::Function(FunctionDecl {
                    body,
                    ..func.clone()
                }))
            } else {
                Rc::clone(decl)
            }
        }
        Decl::Variable(var) => rewrite_var_decl(decl, var, transformer),
        Decl::TypeAlias(_) | Decl::Enum(_) | Decl::Import(_) => Rc::clone(decl),
    };
    transformer.transform_decl(&candidate).unwrap_or(candidate)
}

fn rewrite_var_decl<T: AstTransformer>(
    decl: &Rc<Decl>,
    var: &VarDecl,
    transformer: &mut T,
) -> Rc<Decl> {
    let Some(init) = &var.init else {
        return Rc::clone(decl);
    };
    let rewritten = rewrite_expr(init, transformer);
    if Rc::ptr_eq(&rewritten, init) {
        return Rc::clone(decl);
    }
    Rc::new(Decl::Variable(VarDecl {
        init: Some(rewritten),
        ..var.clone()
    }))
}

/// Rewrite an optional child, reporting whether it changed.
fn rewrite_opt_expr<T: AstTransformer>(
    expr: &Option<Rc<Expr>>,
    transformer: &mut T,
    changed: &mut bool,
) -> Option<Rc<Expr>> {
    expr.as_ref().map(|e| {
        let rewritten = rewrite_expr(e, transformer);
        *changed |= !Rc::ptr_eq(&rewritten, e);
        rewritten
    })
}

fn rewrite_stmt_list<T: AstTransformer>(
    stmts: &[Rc<Stmt>],
    transformer: &mut T,
    changed: &mut bool,
) -> Vec<Rc<Stmt>> {
    stmts
        .iter()
        .map(|s| {
            let rewritten = rewrite_stmt(s, transformer);
            *changed |= !Rc::ptr_eq(&rewritten, s);
            rewritten
        })
        .collect()
}

fn rewrite_case_arms<T: AstTransformer>(
    arms: &[CaseArm],
    transformer: &mut T,
    changed: &mut bool,
) -> Vec<CaseArm> {
    arms.iter()
        .map(|arm| {
            let value = rewrite_opt_expr(&arm.value, transformer, changed);
            let body = rewrite_stmt_list(&arm.body, transformer, changed);
            CaseArm {
                span: arm.span,
                value,
                body,
            }
        })
        .collect()
}

pub fn rewrite_stmt<T: AstTransformer>(stmt: &Rc<Stmt>, transformer: &mut T) -> Rc<Stmt> {
    let mut changed = false;
    let candidate = match &**stmt {
        Stmt::Block(block) => {
            let stmts = rewrite_stmt_list(&block.stmts, transformer, &mut changed);
            if changed {
                Rc::new(Stmt::Block(BlockStmt {
                    stmts,
                    ..block.clone()
                }))
            } else {
                Rc::clone(stmt)
            }
        }
        Stmt::Expr(s) => {
            let expr = rewrite_expr(&s.expr, transformer);
            if Rc::ptr_eq(&expr, &s.expr) {
                Rc::clone(stmt)
            } else {
                Rc::new(Stmt::Expr(ExprStmt { expr, ..s.clone() }))
            }
        }
        Stmt::Return(s) => {
            let value = rewrite_opt_expr(&s.value, transformer, &mut changed);
            if changed {
                Rc::new(Stmt::Return(ReturnStmt { value, ..s.clone() }))
            } else {
                Rc::clone(stmt)
            }
        }
        Stmt::If(s) => {
            let cond = rewrite_expr(&s.cond, transformer);
            let then_branch = rewrite_stmt(&s.then_branch, transformer);
            changed |= !Rc::ptr_eq(&cond, &s.cond) || !Rc::ptr_eq(&then_branch, &s.then_branch);
            let else_branch = s.else_branch.as_ref().map(|e| {
                let rewritten = rewrite_stmt(e, transformer);
                changed |= !Rc::ptr_eq(&rewritten, e);
                rewritten
            });
            if changed {
                Rc::new(Stmt::If(IfStmt {
                    cond,
                    then_branch,
                    else_branch,
                    ..s.clone()
                }))
            } else {
                Rc::clone(stmt)
            }
        }
        Stmt::While(s) => {
            let cond = rewrite_expr(&s.cond, transformer);
            let body = rewrite_stmt(&s.body, transformer);
            if Rc::ptr_eq(&cond, &s.cond) && Rc::ptr_eq(&body, &s.body) {
                Rc::clone(stmt)
            } else {
                Rc::new(Stmt::While(WhileStmt {
                    cond,
                    body,
                    ..s.clone()
                }))
            }
        }
        Stmt::DoWhile(s) => {
            let body = rewrite_stmt(&s.body, transformer);
            let cond = rewrite_expr(&s.cond, transformer);
            if Rc::ptr_eq(&cond, &s.cond) && Rc::ptr_eq(&body, &s.body) {
                Rc::clone(stmt)
            } else {
                Rc::new(Stmt::DoWhile(DoWhileStmt {
                    body,
                    cond,
                    ..s.clone()
                }))
            }
        }
        Stmt::For(s) => {
            let start = rewrite_expr(&s.start, transformer);
            let end = rewrite_expr(&s.end, transformer);
            changed |= !Rc::ptr_eq(&start, &s.start) || !Rc::ptr_eq(&end, &s.end);
            let step = rewrite_opt_expr(&s.step, transformer, &mut changed);
            let body = rewrite_stmt(&s.body, transformer);
            changed |= !Rc::ptr_eq(&body, &s.body);
            if changed {
                Rc::new(Stmt::For(ForStmt {
                    start,
                    end,
                    step,
                    body,
                    ..s.clone()
                }))
            } else {
                Rc::clone(stmt)
            }
        }
        Stmt::Switch(s) => {
            let scrutinee = rewrite_expr(&s.scrutinee, transformer);
            changed |= !Rc::ptr_eq(&scrutinee, &s.scrutinee);
            let arms = rewrite_case_arms(&s.arms, transformer, &mut changed);
            if changed {
                Rc::new(Stmt::Switch(SwitchStmt {
                    scrutinee,
                    arms,
                    ..s.clone()
                }))
            } else {
                Rc::clone(stmt)
            }
        }
        Stmt::Match(s) => {
            let scrutinee = rewrite_expr(&s.scrutinee, transformer);
            changed |= !Rc::ptr_eq(&scrutinee, &s.scrutinee);
            let arms = rewrite_case_arms(&s.arms, transformer, &mut changed);
            if changed {
                Rc::new(Stmt::Match(MatchStmt {
                    scrutinee,
                    arms,
                    ..s.clone()
                }))
            } else {
                Rc::clone(stmt)
            }
        }
        Stmt::Break(_) | Stmt::Continue(_) => Rc::clone(stmt),
        Stmt::Var(var) => {
            let init = rewrite_opt_expr(&var.init, transformer, &mut changed);
            if changed {
                Rc::new(Stmt::Var(VarDecl {
                    init,
                    ..var.clone()
                }))
            } else {
                Rc::clone(stmt)
            }
        }
    };
    transformer.transform_stmt(&candidate).unwrap_or(candidate)
}

pub fn rewrite_expr<T: AstTransformer>(expr: &Rc<Expr>, transformer: &mut T) -> Rc<Expr> {
    let mut changed = false;
    let candidate = match &**expr {
        Expr::Number(_) | Expr::Str(_) | Expr::Bool(_) | Expr::Char(_) | Expr::Ident(_) => {
            Rc::clone(expr)
        }
        Expr::Array(array) => {
            let elements: Vec<Rc<Expr>> = array
                .elements
                .iter()
                .map(|e| {
                    let rewritten = rewrite_expr(e, transformer);
                    changed |= !Rc::ptr_eq(&rewritten, e);
                    rewritten
                })
                .collect();
            if changed {
                Rc::new(Expr::Array(ArrayLit {
                    elements,
                    ..array.clone()
                }))
            } else {
                Rc::clone(expr)
            }
        }
        Expr::Unary(u) => {
            let operand = rewrite_expr(&u.operand, transformer);
            if Rc::ptr_eq(&operand, &u.operand) {
                Rc::clone(expr)
            } else {
                Rc::new(Expr::Unary(UnaryExpr {
                    operand,
                    ..u.clone()
                }))
            }
        }
        Expr::AddrOf(a) => {
            let operand = rewrite_expr(&a.operand, transformer);
            if Rc::ptr_eq(&operand, &a.operand) {
                Rc::clone(expr)
            } else {
                Rc::new(Expr::AddrOf(crate::ast::AddrOfExpr {
                    operand,
                    ..a.clone()
                }))
            }
        }
        Expr::Binary(b) => {
            let lhs = rewrite_expr(&b.lhs, transformer);
            let rhs = rewrite_expr(&b.rhs, transformer);
            if Rc::ptr_eq(&lhs, &b.lhs) && Rc::ptr_eq(&rhs, &b.rhs) {
                Rc::clone(expr)
            } else {
                Rc::new(Expr::Binary(BinaryExpr {
                    lhs,
                    rhs,
                    ..b.clone()
                }))
            }
        }
        Expr::Ternary(t) => {
            let cond = rewrite_expr(&t.cond, transformer);
            let then_expr = rewrite_expr(&t.then_expr, transformer);
            let else_expr = rewrite_expr(&t.else_expr, transformer);
            if Rc::ptr_eq(&cond, &t.cond)
                && Rc::ptr_eq(&then_expr, &t.then_expr)
                && Rc::ptr_eq(&else_expr, &t.else_expr)
            {
                Rc::clone(expr)
            } else {
                Rc::new(Expr::Ternary(TernaryExpr {
                    cond,
                    then_expr,
                    else_expr,
                    ..t.clone()
                }))
            }
        }
        Expr::Call(call) => {
            let callee = rewrite_expr(&call.callee, transformer);
            changed |= !Rc::ptr_eq(&callee, &call.callee);
            let args: Vec<Rc<Expr>> = call
                .args
                .iter()
                .map(|a| {
                    let rewritten = rewrite_expr(a, transformer);
                    changed |= !Rc::ptr_eq(&rewritten, a);
                    rewritten
                })
                .collect();
            if changed {
                Rc::new(Expr::Call(CallExpr {
                    callee,
                    args,
                    ..call.clone()
                }))
            } else {
                Rc::clone(expr)
            }
        }
        Expr::Index(index) => {
            let target = rewrite_expr(&index.target, transformer);
            let idx = rewrite_expr(&index.index, transformer);
            if Rc::ptr_eq(&target, &index.target) && Rc::ptr_eq(&idx, &index.index) {
                Rc::clone(expr)
            } else {
                Rc::new(Expr::Index(IndexExpr {
                    target,
                    index: idx,
                    ..index.clone()
                }))
            }
        }
        Expr::Member(member) => {
            let target = rewrite_expr(&member.target, transformer);
            if Rc::ptr_eq(&target, &member.target) {
                Rc::clone(expr)
            } else {
                Rc::new(Expr::Member(MemberExpr {
                    target,
                    ..member.clone()
                }))
            }
        }
        Expr::Assign(assign) => {
            let target = rewrite_expr(&assign.target, transformer);
            let value = rewrite_expr(&assign.value, transformer);
            if Rc::ptr_eq(&target, &assign.target) && Rc::ptr_eq(&value, &assign.value) {
                Rc::clone(expr)
            } else {
                Rc::new(Expr::Assign(AssignExpr {
                    target,
                    value,
                    ..assign.clone()
                }))
            }
        }
    };
    transformer.transform_expr(&candidate).unwrap_or(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NumberLit;
    use crate::diagnostics::Diagnostics;
    use crate::parser::Parser;

    fn parse(source: &str) -> Program {
        let mut diags = Diagnostics::new();
        let program = Parser::new(source, &mut diags).parse();
        assert!(!diags.has_errors(), "errors: {:?}", diags.items());
        program
    }

    #[test]
    fn test_identity_preserves_node_identity() {
        let program = parse(
            "function f(x: byte): byte {\n\
               if (x > 1) { return x * 2; } else { return x; }\n\
             }\n\
             let table: byte[3] = [1, 2, 3];",
        );
        let result = transform_program(&program, &mut IdentityTransformer);
        assert_eq!(result.decls.len(), program.decls.len());
        for (old, new) in program.decls.iter().zip(result.decls.iter()) {
            assert!(Rc::ptr_eq(old, new), "identity transform must share nodes");
        }
    }

    /// Replaces every numeric literal with its value plus one.
    struct Increment;

    impl AstTransformer for Increment {
        fn transform_expr(&mut self, expr: &Rc<Expr>) -> Option<Rc<Expr>> {
            match &**expr {
                Expr::Number(n) => Some(Rc::new(Expr::Number(NumberLit {
                    id: n.id,
                    span: n.span,
                    value: n.value + 1,
                    lexeme: n.lexeme.clone(),
                }))),
                _ => None,
            }
        }
    }

    #[test]
    fn test_rewrite_rebuilds_ancestors_only() {
        let program = parse("let a: byte = 1 + 2;\nlet b: bool = true;");
        let result = transform_program(&program, &mut Increment);

        // First declaration changed: new node, incremented leaves
        assert!(!Rc::ptr_eq(&program.decls[0], &result.decls[0]));
        let Decl::Variable(var) = &*result.decls[0] else {
            panic!("Expected variable");
        };
        let Some(Expr::Binary(add)) = var.init.as_deref() else {
            panic!("Expected binary initializer");
        };
        assert!(matches!(&*add.lhs, Expr::Number(n) if n.value == 2));
        assert!(matches!(&*add.rhs, Expr::Number(n) if n.value == 3));

        // Second declaration untouched: shared by identity
        assert!(Rc::ptr_eq(&program.decls[1], &result.decls[1]));
    }

    #[test]
    fn test_rebuilt_node_keeps_span_and_id() {
        let program = parse("let a: byte = 7;");
        let result = transform_program(&program, &mut Increment);
        let (Decl::Variable(old), Decl::Variable(new)) =
            (&*program.decls[0], &*result.decls[0])
        else {
            panic!("Expected variables");
        };
        assert_eq!(old.id, new.id);
        assert_eq!(old.span, new.span);
    }

    #[test]
    fn test_absent_optional_children_flow_through() {
        let program = parse("function f(): void { if (true) { } return; }");
        let result = transform_program(&program, &mut IdentityTransformer);
        assert!(Rc::ptr_eq(&program.decls[0], &result.decls[0]));
    }

    #[test]
    fn test_unchanged_subtree_shared_inside_changed_parent() {
        let program = parse("function f(): void { g(5); h(name); }");
        let result = transform_program(&program, &mut Increment);
        let (Decl::Function(old), Decl::Function(new)) =
            (&*program.decls[0], &*result.decls[0])
        else {
            panic!("Expected functions");
        };
        let (Some(old_body), Some(new_body)) = (&old.body, &new.body) else {
            panic!("Expected bodies");
        };
        let (Stmt::Block(old_block), Stmt::Block(new_block)) = (&**old_body, &**new_body) else {
            panic!("Expected blocks");
        };
        // g(5) changed, h(name) shared by identity
        assert!(!Rc::ptr_eq(&old_block.stmts[0], &new_block.stmts[0]));
        assert!(Rc::ptr_eq(&old_block.stmts[1], &new_block.stmts[1]));
    }
}
