//! Purity analysis (tier 3)
//!
//! A function is pure iff it writes no global memory, performs no I/O
//! (impure intrinsics), calls only pure functions, and is not an interrupt
//! handler. Computed as a fixed point over the call graph: impurity
//! propagates from callees to callers until nothing changes.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::ast::{Decl, Expr, Program};
use crate::call_graph::CallGraph;
use crate::intrinsics;
use crate::symbols::SymbolTable;
use crate::typechecker::CheckResult;
use crate::walker::{self, AstVisitor, WalkControl, WalkState};

/// Detects direct impurity inside one function body.
struct DirectImpurity<'a> {
    check: &'a CheckResult,
    table: &'a SymbolTable,
    functions: &'a HashSet<String>,
    impure: bool,
}

impl DirectImpurity<'_> {
    fn is_global(&self, expr: &Rc<Expr>) -> bool {
        self.check
            .symbol_of(expr.id())
            .is_some_and(|id| self.table.symbol(id).scope == self.table.module_scope)
    }
}

impl AstVisitor for DirectImpurity<'_> {
    fn enter_expr(&mut self, expr: &Rc<Expr>, _state: &WalkState) -> WalkControl {
        match &**expr {
            Expr::Call(call) => {
                if let Some(name) = call.callee.as_ident() {
                    if let Some(def) = intrinsics::lookup(name) {
                        if def.is_impure {
                            self.impure = true;
                            return WalkControl::Stop;
                        }
                    } else if !self.functions.contains(name) {
                        // Imported or unresolved callee: assume the worst
                        self.impure = true;
                        return WalkControl::Stop;
                    }
                }
            }
            Expr::Assign(assign) => {
                let target = match &*assign.target {
                    Expr::Index(index) => &index.target,
                    _ => &assign.target,
                };
                if self.is_global(target) {
                    self.impure = true;
                    return WalkControl::Stop;
                }
            }
            // A global whose address escapes may be written through it
            Expr::AddrOf(addr) => {
                let target = match &*addr.operand {
                    Expr::Index(index) => &index.target,
                    _ => &addr.operand,
                };
                if self.is_global(target) {
                    self.impure = true;
                    return WalkControl::Stop;
                }
            }
            _ => {}
        }
        WalkControl::Continue
    }
}

/// Compute the set of pure functions.
pub fn analyze(
    program: &Program,
    table: &SymbolTable,
    check: &CheckResult,
    call_graph: &CallGraph,
) -> HashSet<String> {
    let functions: HashSet<String> = call_graph.functions().clone();

    // Start from direct facts, then let impurity flow up the call graph
    let mut impure: HashMap<String, bool> = HashMap::new();
    for decl in &program.decls {
        let Decl::Function(func) = &**decl else {
            continue;
        };
        let directly_impure = if func.is_callback {
            true
        } else {
            match &func.body {
                Some(body) => {
                    let mut detector = DirectImpurity {
                        check,
                        table,
                        functions: &functions,
                        impure: false,
                    };
                    walker::walk_stmt(body, &mut detector);
                    detector.impure
                }
                // Stubs are external code: assume impure
                None => true,
            }
        };
        impure.insert(func.name.clone(), directly_impure);
    }

    let mut changed = true;
    while changed {
        changed = false;
        for name in &functions {
            if impure.get(name).copied().unwrap_or(true) {
                continue;
            }
            let callee_impure = call_graph
                .callees(name)
                .is_some_and(|callees| {
                    callees.iter().any(|c| impure.get(c).copied().unwrap_or(true))
                });
            if callee_impure {
                impure.insert(name.clone(), true);
                changed = true;
            }
        }
    }

    impure
        .into_iter()
        .filter_map(|(name, impure)| (!impure).then_some(name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_graph::CallGraph;
    use crate::diagnostics::Diagnostics;
    use crate::parser::Parser;
    use crate::symbols::build_symbol_table;
    use crate::typechecker::{TypeCheckOptions, check_program};
    use crate::typeres::TypeResolver;

    fn run(source: &str) -> HashSet<String> {
        let mut diags = Diagnostics::new();
        let program = Parser::new(source, &mut diags).parse();
        assert!(!diags.has_errors(), "errors: {:?}", diags.items());
        let mut table = build_symbol_table(&program, &mut diags);
        let resolver = TypeResolver::run(&program, &mut table, &mut diags);
        let check = check_program(
            &program,
            &table,
            &resolver,
            &mut diags,
            TypeCheckOptions::default(),
        );
        let graph = CallGraph::build(&program);
        analyze(&program, &table, &check, &graph)
    }

    #[test]
    fn test_arithmetic_function_is_pure() {
        let pure = run("function double(x: byte): byte { return x * 2; }");
        assert!(pure.contains("double"));
    }

    #[test]
    fn test_global_write_is_impure() {
        let pure = run(
            "let score: word = 0;\n\
             function bump(): void { score += 1; }",
        );
        assert!(!pure.contains("bump"));
    }

    #[test]
    fn test_global_read_is_allowed() {
        let pure = run(
            "let limit: byte = 10;\n\
             function over(x: byte): bool { return x > limit; }",
        );
        assert!(pure.contains("over"));
    }

    #[test]
    fn test_io_intrinsic_is_impure() {
        let pure = run("function flash(): void { poke($D020, 1); }");
        assert!(!pure.contains("flash"));
    }

    #[test]
    fn test_impurity_propagates_through_calls() {
        let pure = run(
            "function sink(): void { poke($D020, 1); }\n\
             function middle(): void { sink(); }\n\
             function top(): void { middle(); }\n\
             function clean(x: byte): byte { return x + 1; }",
        );
        assert!(!pure.contains("sink"));
        assert!(!pure.contains("middle"));
        assert!(!pure.contains("top"));
        assert!(pure.contains("clean"));
    }

    #[test]
    fn test_callback_is_impure() {
        let pure = run("callback vblank(): void { }");
        assert!(!pure.contains("vblank"));
    }

    #[test]
    fn test_stub_is_impure() {
        let pure = run(
            "function external(): void;\n\
             function caller(): void { external(); }",
        );
        assert!(!pure.contains("external"));
        assert!(!pure.contains("caller"));
    }

    #[test]
    fn test_pure_recursion_stays_pure() {
        let pure = run(
            "function fib(n: byte): word {\n\
               if (n < 2) { return n; }\n\
               return fib(n - 1) + fib(n - 2);\n\
             }",
        );
        assert!(pure.contains("fib"));
    }
}
