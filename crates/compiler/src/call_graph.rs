//! Call graph analysis (pass 5)
//!
//! Builds the direct-call graph of a program and detects strongly connected
//! components to identify recursion. The 6502 has no practical hardware
//! stack for deep call chains, so every recursive cycle - direct or mutual -
//! is reported as a warning.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::ast::{Decl, Expr, Program, Stmt};
use crate::diagnostics::{DiagnosticCode, Diagnostics};
use crate::walker::{self, AstVisitor, WalkControl, WalkState};

/// A call graph representing which functions call which other functions.
#[derive(Debug, Clone)]
pub struct CallGraph {
    /// Map from function name to the set of functions it calls
    edges: HashMap<String, HashSet<String>>,
    /// All function names in the program
    functions: HashSet<String>,
    /// SCCs with more than one member (mutual recursion) or single members
    /// that call themselves (direct recursion)
    recursive_sccs: Vec<HashSet<String>>,
}

/// Collects direct callees inside one function body. Intrinsics and
/// unresolved names are sinks and never become edges.
struct CallCollector<'a> {
    functions: &'a HashSet<String>,
    callees: HashSet<String>,
}

impl AstVisitor for CallCollector<'_> {
    fn enter_expr(&mut self, expr: &Rc<Expr>, _state: &WalkState) -> WalkControl {
        if let Expr::Call(call) = &**expr {
            if let Some(name) = call.callee.as_ident() {
                if self.functions.contains(name) {
                    self.callees.insert(name.to_string());
                }
            }
        }
        WalkControl::Continue
    }
}

impl CallGraph {
    /// Build a call graph from a program, including calls inside nested
    /// blocks, loops and match arms.
    pub fn build(program: &Program) -> Self {
        let functions: HashSet<String> = program
            .decls
            .iter()
            .filter_map(|d| match &**d {
                Decl::Function(f) => Some(f.name.clone()),
                _ => None,
            })
            .collect();

        let mut edges: HashMap<String, HashSet<String>> = HashMap::new();
        for decl in &program.decls {
            let Decl::Function(func) = &**decl else {
                continue;
            };
            let callees = match &func.body {
                Some(body) => extract_calls(body, &functions),
                None => HashSet::new(),
            };
            edges.insert(func.name.clone(), callees);
        }

        let mut graph = CallGraph {
            edges,
            functions,
            recursive_sccs: Vec::new(),
        };
        graph.recursive_sccs = graph.find_sccs();
        graph
    }

    /// Check if a function is part of any recursive cycle.
    pub fn is_recursive(&self, name: &str) -> bool {
        self.recursive_sccs.iter().any(|scc| scc.contains(name))
    }

    /// Check if two functions are in the same recursive cycle.
    pub fn are_mutually_recursive(&self, a: &str, b: &str) -> bool {
        self.recursive_sccs
            .iter()
            .any(|scc| scc.contains(a) && scc.contains(b))
    }

    /// Get the recursive cycle containing a function, if any.
    pub fn get_cycle(&self, name: &str) -> Option<&HashSet<String>> {
        self.recursive_sccs.iter().find(|scc| scc.contains(name))
    }

    pub fn recursive_cycles(&self) -> &[HashSet<String>] {
        &self.recursive_sccs
    }

    /// Functions that a given function calls directly.
    pub fn callees(&self, name: &str) -> Option<&HashSet<String>> {
        self.edges.get(name)
    }

    /// Functions that directly call the given function.
    pub fn callers(&self, name: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(_, callees)| callees.contains(name))
            .map(|(caller, _)| caller.as_str())
            .collect()
    }

    pub fn functions(&self) -> &HashSet<String> {
        &self.functions
    }

    /// Find strongly connected components using Tarjan's algorithm,
    /// keeping only the ones that represent recursion.
    fn find_sccs(&self) -> Vec<HashSet<String>> {
        let mut index_counter = 0;
        let mut stack: Vec<String> = Vec::new();
        let mut on_stack: HashSet<String> = HashSet::new();
        let mut indices: HashMap<String, usize> = HashMap::new();
        let mut lowlinks: HashMap<String, usize> = HashMap::new();
        let mut sccs: Vec<HashSet<String>> = Vec::new();

        let mut names: Vec<&String> = self.functions.iter().collect();
        names.sort();
        for name in names {
            if !indices.contains_key(name) {
                self.tarjan_visit(
                    name,
                    &mut index_counter,
                    &mut stack,
                    &mut on_stack,
                    &mut indices,
                    &mut lowlinks,
                    &mut sccs,
                );
            }
        }

        sccs.into_iter()
            .filter(|scc| {
                if scc.len() > 1 {
                    return true;
                }
                let name = scc.iter().next().unwrap();
                self.edges
                    .get(name)
                    .map(|callees| callees.contains(name))
                    .unwrap_or(false)
            })
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn tarjan_visit(
        &self,
        node: &str,
        index_counter: &mut usize,
        stack: &mut Vec<String>,
        on_stack: &mut HashSet<String>,
        indices: &mut HashMap<String, usize>,
        lowlinks: &mut HashMap<String, usize>,
        sccs: &mut Vec<HashSet<String>>,
    ) {
        indices.insert(node.to_string(), *index_counter);
        lowlinks.insert(node.to_string(), *index_counter);
        *index_counter += 1;
        stack.push(node.to_string());
        on_stack.insert(node.to_string());

        if let Some(callees) = self.edges.get(node) {
            let mut sorted: Vec<&String> = callees.iter().collect();
            sorted.sort();
            for callee in sorted {
                if !indices.contains_key(callee) {
                    self.tarjan_visit(
                        callee,
                        index_counter,
                        stack,
                        on_stack,
                        indices,
                        lowlinks,
                        sccs,
                    );
                    let callee_low = lowlinks[callee];
                    let node_low = lowlinks[node];
                    lowlinks.insert(node.to_string(), node_low.min(callee_low));
                } else if on_stack.contains(callee) {
                    let callee_index = indices[callee];
                    let node_low = lowlinks[node];
                    lowlinks.insert(node.to_string(), node_low.min(callee_index));
                }
            }
        }

        if lowlinks[node] == indices[node] {
            let mut scc = HashSet::new();
            while let Some(member) = stack.pop() {
                on_stack.remove(&member);
                let done = member == node;
                scc.insert(member);
                if done {
                    break;
                }
            }
            sccs.push(scc);
        }
    }
}

fn extract_calls(body: &Rc<Stmt>, functions: &HashSet<String>) -> HashSet<String> {
    let mut collector = CallCollector {
        functions,
        callees: HashSet::new(),
    };
    walker::walk_stmt(body, &mut collector);
    collector.callees
}

/// Run pass 5: build the graph and warn on every recursive function.
pub fn analyze_call_graph(
    program: &Program,
    diagnostics: &mut Diagnostics,
    report_warnings: bool,
) -> CallGraph {
    let graph = CallGraph::build(program);
    if report_warnings {
        for decl in &program.decls {
            let Decl::Function(func) = &**decl else {
                continue;
            };
            if let Some(cycle) = graph.get_cycle(&func.name) {
                let message = if cycle.len() == 1 {
                    format!("Function '{}' calls itself; the target has no stack for deep recursion", func.name)
                } else {
                    let mut members: Vec<&str> = cycle.iter().map(|s| s.as_str()).collect();
                    members.sort_unstable();
                    format!(
                        "Function '{}' is mutually recursive with {}",
                        func.name,
                        members
                            .iter()
                            .filter(|m| **m != func.name)
                            .map(|m| format!("'{m}'"))
                            .collect::<Vec<_>>()
                            .join(", ")
                    )
                };
                diagnostics.warning(DiagnosticCode::RecursionDetected, message, func.name_span);
            }
        }
    }
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn build(source: &str) -> CallGraph {
        let mut diags = Diagnostics::new();
        let program = Parser::new(source, &mut diags).parse();
        assert!(!diags.has_errors(), "parse errors: {:?}", diags.items());
        CallGraph::build(&program)
    }

    #[test]
    fn test_simple_edges() {
        let graph = build(
            "function a(): void { b(); }\n\
             function b(): void { c(); }\n\
             function c(): void { }",
        );
        assert!(graph.callees("a").unwrap().contains("b"));
        assert!(graph.callees("b").unwrap().contains("c"));
        assert!(graph.callees("c").unwrap().is_empty());
        assert!(!graph.is_recursive("a"));
    }

    #[test]
    fn test_direct_recursion() {
        let graph = build("function f(): void { f(); }");
        assert!(graph.is_recursive("f"));
        assert_eq!(graph.recursive_cycles().len(), 1);
    }

    #[test]
    fn test_mutual_recursion() {
        let graph = build(
            "function even(n: byte): void { odd(n); }\n\
             function odd(n: byte): void { even(n); }\n\
             function other(): void { }",
        );
        assert!(graph.is_recursive("even"));
        assert!(graph.is_recursive("odd"));
        assert!(graph.are_mutually_recursive("even", "odd"));
        assert!(!graph.is_recursive("other"));
        let cycle = graph.get_cycle("even").unwrap();
        assert_eq!(cycle.len(), 2);
    }

    #[test]
    fn test_intrinsics_are_sinks() {
        let graph = build("function f(): void { poke($D020, 0); nop(); }");
        assert!(graph.callees("f").unwrap().is_empty());
    }

    #[test]
    fn test_calls_inside_nested_structures() {
        let graph = build(
            "function helper(): void { }\n\
             function f(x: byte): void {\n\
               if (x > 0) { helper(); }\n\
               while (x > 0) { helper(); }\n\
               switch (x) { case 1: helper(); }\n\
             }",
        );
        assert!(graph.callees("f").unwrap().contains("helper"));
    }

    #[test]
    fn test_callers() {
        let graph = build(
            "function api(): void { }\n\
             function a(): void { api(); }\n\
             function b(): void { api(); }",
        );
        let mut callers = graph.callers("api");
        callers.sort_unstable();
        assert_eq!(callers, vec!["a", "b"]);
    }

    #[test]
    fn test_recursion_warnings() {
        let mut diags = Diagnostics::new();
        let program = Parser::new(
            "function f(): void { f(); }\nfunction ok(): void { }",
            &mut diags,
        )
        .parse();
        analyze_call_graph(&program, &mut diags, true);
        let warnings: Vec<_> = diags
            .iter()
            .filter(|d| d.code == DiagnosticCode::RecursionDetected)
            .collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("'f'"));
    }

    #[test]
    fn test_three_way_cycle() {
        let graph = build(
            "function a(): void { b(); }\n\
             function b(): void { c(); }\n\
             function c(): void { a(); }",
        );
        let cycle = graph.get_cycle("a").unwrap();
        assert_eq!(cycle.len(), 3);
        assert!(graph.are_mutually_recursive("a", "c"));
    }
}
