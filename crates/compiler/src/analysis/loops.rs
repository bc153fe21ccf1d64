//! Loop analysis (tier 3)
//!
//! Computes trip counts for counted loops with compile-time bounds and
//! flags the loops worth unrolling or strength-reducing. Output is
//! advisory for the code generator.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{BinaryOp, Decl, Expr, NodeId, Program, Stmt};
use crate::walker::{self, AstVisitor, WalkControl, WalkState};

/// Facts about one loop.
#[derive(Debug, Clone)]
pub struct LoopInfo {
    /// The loop statement's node id.
    pub stmt: NodeId,
    /// Function containing the loop.
    pub function: String,
    /// Iteration count when all bounds are compile-time constants.
    pub trip_count: Option<u32>,
    /// `while (true)` and friends.
    pub infinite: bool,
    /// Short constant trip count and a small body: worth unrolling.
    pub unroll_candidate: bool,
    /// The body multiplies by the counter: worth strength reduction.
    pub strength_reduction_candidate: bool,
}

/// How many statements a loop body contains, nested ones included.
fn body_size(body: &Rc<Stmt>) -> usize {
    struct Counter {
        count: usize,
    }
    impl AstVisitor for Counter {
        fn enter_stmt(&mut self, _stmt: &Rc<Stmt>, _state: &WalkState) -> WalkControl {
            self.count += 1;
            WalkControl::Continue
        }
    }
    let mut counter = Counter { count: 0 };
    walker::walk_stmt(body, &mut counter);
    // The body block itself is not an interesting statement
    counter.count.saturating_sub(1)
}

/// Does the body contain `counter * x` or `x * counter`?
fn multiplies_counter(body: &Rc<Stmt>, counter: &str) -> bool {
    struct Finder<'a> {
        counter: &'a str,
        found: bool,
    }
    impl AstVisitor for Finder<'_> {
        fn enter_expr(&mut self, expr: &Rc<Expr>, _state: &WalkState) -> WalkControl {
            if let Expr::Binary(b) = &**expr {
                if b.op == BinaryOp::Mul
                    && (b.lhs.as_ident() == Some(self.counter)
                        || b.rhs.as_ident() == Some(self.counter))
                {
                    self.found = true;
                    return WalkControl::Stop;
                }
            }
            WalkControl::Continue
        }
    }
    let mut finder = Finder {
        counter,
        found: false,
    };
    walker::walk_stmt(body, &mut finder);
    finder.found
}

fn const_value(expr: &Rc<Expr>) -> Option<u32> {
    match &**expr {
        Expr::Number(n) => Some(n.value),
        _ => None,
    }
}

/// Trip count of `for (c = start to/downto end step k)` when constant.
fn for_trip_count(start: u32, end: u32, step: u32, down: bool) -> Option<u32> {
    if step == 0 {
        return None;
    }
    let distance = if down {
        start.checked_sub(end)?
    } else {
        end.checked_sub(start)?
    };
    Some(distance / step + 1)
}

const UNROLL_MAX_TRIPS: u32 = 8;
const UNROLL_MAX_BODY: usize = 4;

struct LoopWalker {
    current_function: String,
    loops: Vec<LoopInfo>,
}

impl AstVisitor for LoopWalker {
    fn enter_stmt(&mut self, stmt: &Rc<Stmt>, _state: &WalkState) -> WalkControl {
        match &**stmt {
            Stmt::For(s) => {
                let trip_count = match (
                    const_value(&s.start),
                    const_value(&s.end),
                    s.step.as_ref().map_or(Some(1), const_value),
                ) {
                    (Some(start), Some(end), Some(step)) => {
                        for_trip_count(start, end, step, s.down)
                    }
                    _ => None,
                };
                let size = body_size(&s.body);
                self.loops.push(LoopInfo {
                    stmt: s.id,
                    function: self.current_function.clone(),
                    trip_count,
                    infinite: false,
                    unroll_candidate: trip_count
                        .is_some_and(|n| n <= UNROLL_MAX_TRIPS && size <= UNROLL_MAX_BODY),
                    strength_reduction_candidate: multiplies_counter(&s.body, &s.counter),
                });
            }
            Stmt::While(s) => {
                let infinite = matches!(&*s.cond, Expr::Bool(b) if b.value)
                    || matches!(&*s.cond, Expr::Number(n) if n.value != 0);
                self.loops.push(LoopInfo {
                    stmt: s.id,
                    function: self.current_function.clone(),
                    trip_count: None,
                    infinite,
                    unroll_candidate: false,
                    strength_reduction_candidate: false,
                });
            }
            Stmt::DoWhile(s) => {
                let infinite = matches!(&*s.cond, Expr::Bool(b) if b.value);
                self.loops.push(LoopInfo {
                    stmt: s.id,
                    function: self.current_function.clone(),
                    trip_count: None,
                    infinite,
                    unroll_candidate: false,
                    strength_reduction_candidate: false,
                });
            }
            _ => {}
        }
        WalkControl::Continue
    }
}

pub fn analyze(program: &Program) -> Vec<LoopInfo> {
    let mut all = Vec::new();
    for decl in &program.decls {
        let Decl::Function(func) = &**decl else {
            continue;
        };
        let Some(body) = &func.body else {
            continue;
        };
        let mut lw = LoopWalker {
            current_function: func.name.clone(),
            loops: Vec::new(),
        };
        walker::walk_stmt(body, &mut lw);
        all.extend(lw.loops);
    }
    all
}

/// Index loops by statement id, for consumers that join on the AST.
pub fn by_statement(loops: &[LoopInfo]) -> HashMap<NodeId, &LoopInfo> {
    loops.iter().map(|l| (l.stmt, l)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::parser::Parser;

    fn run(source: &str) -> Vec<LoopInfo> {
        let mut diags = Diagnostics::new();
        let program = Parser::new(source, &mut diags).parse();
        assert!(!diags.has_errors(), "errors: {:?}", diags.items());
        analyze(&program)
    }

    #[test]
    fn test_constant_trip_count() {
        let loops = run("function f(): void { for (i = 0 to 7) { nop(); } }");
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].trip_count, Some(8));
        assert!(loops[0].unroll_candidate);
    }

    #[test]
    fn test_downto_and_step() {
        let loops = run(
            "function f(): void {\n\
               for (i = 10 downto 0 step 2) { nop(); }\n\
               for (j = 0 to 39 step 8) { nop(); }\n\
             }",
        );
        assert_eq!(loops[0].trip_count, Some(6));
        assert_eq!(loops[1].trip_count, Some(5));
    }

    #[test]
    fn test_dynamic_bound_has_no_trip_count() {
        let loops = run("function f(n: byte): void { for (i = 0 to n) { nop(); } }");
        assert_eq!(loops[0].trip_count, None);
        assert!(!loops[0].unroll_candidate);
    }

    #[test]
    fn test_large_loop_not_unroll_candidate() {
        let loops = run("function f(): void { for (i = 0 to 99) { nop(); } }");
        assert_eq!(loops[0].trip_count, Some(100));
        assert!(!loops[0].unroll_candidate);
    }

    #[test]
    fn test_infinite_while() {
        let loops = run("function f(): void { while (true) { nop(); } }");
        assert!(loops[0].infinite);
        assert_eq!(loops[0].trip_count, None);
    }

    #[test]
    fn test_strength_reduction_candidate() {
        let loops = run(
            "let screen: byte[240];\n\
             function f(): void {\n\
               for (row = 0 to 5) { screen[row * 40] = 0; }\n\
             }",
        );
        assert!(loops[0].strength_reduction_candidate);
    }

    #[test]
    fn test_nested_loops_both_reported() {
        let loops = run(
            "function f(): void {\n\
               for (y = 0 to 4) { for (x = 0 to 4) { nop(); } }\n\
             }",
        );
        assert_eq!(loops.len(), 2);
    }
}
