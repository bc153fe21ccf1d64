//! 6502 target hints (tier 3)
//!
//! Ranks variables by estimated dynamic access frequency (loop nesting
//! weighs accesses up), proposes zero-page placements, and marks inline
//! and tail-call candidates. Everything here is advisory; the code
//! generator is free to ignore it.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::ast::{Decl, Expr, Program, Stmt};
use crate::call_graph::CallGraph;
use crate::symbols::{SymbolId, SymbolKind, SymbolTable};
use crate::typechecker::CheckResult;
use crate::walker::{self, AstVisitor, WalkContext, WalkControl, WalkState};

use crate::ast::StorageClass as AstStorage;

/// A variable that would profit from zero-page placement.
#[derive(Debug, Clone, PartialEq)]
pub struct ZeroPageCandidate {
    pub name: String,
    /// Estimated dynamic access count; higher is hotter.
    pub score: u32,
    /// Its address is taken, so indirect addressing needs it in the zero
    /// page anyway.
    pub pointer_use: bool,
}

/// Aggregated hints for the code generator.
#[derive(Debug, Default)]
pub struct TargetHints {
    /// Hot variables worth zero-page slots, hottest first.
    pub zero_page_candidates: Vec<ZeroPageCandidate>,
    /// Small, non-recursive, called functions worth inlining.
    pub inline_candidates: Vec<String>,
    /// Functions whose last action is a plain call.
    pub tail_call_candidates: Vec<String>,
    /// All variables ranked by estimated access frequency.
    pub hot_variables: Vec<(String, u32)>,
}

/// Extra weight per loop nesting level when estimating frequency.
const LOOP_WEIGHT: u32 = 10;
const MAX_LOOP_DEPTH: u32 = 3;

struct FrequencyCounter<'a> {
    check: &'a CheckResult,
    counts: HashMap<SymbolId, u32>,
    address_taken: HashSet<SymbolId>,
}

impl FrequencyCounter<'_> {
    fn weight(state: &WalkState) -> u32 {
        let depth = state
            .contexts()
            .iter()
            .filter(|c| matches!(c, WalkContext::Loop(_)))
            .count() as u32;
        LOOP_WEIGHT.pow(depth.min(MAX_LOOP_DEPTH))
    }
}

impl AstVisitor for FrequencyCounter<'_> {
    fn enter_expr(&mut self, expr: &Rc<Expr>, state: &WalkState) -> WalkControl {
        match &**expr {
            Expr::Ident(ident) => {
                if let Some(symbol) = self.check.symbol_of(ident.id) {
                    *self.counts.entry(symbol).or_insert(0) += Self::weight(state);
                }
            }
            Expr::AddrOf(addr) => {
                let target = match &*addr.operand {
                    Expr::Index(index) => &index.target,
                    _ => &addr.operand,
                };
                if let Some(symbol) = self.check.symbol_of(target.id()) {
                    self.address_taken.insert(symbol);
                    *self.counts.entry(symbol).or_insert(0) += Self::weight(state);
                }
            }
            _ => {}
        }
        WalkControl::Continue
    }
}

/// Number of statements in a function body, block nodes excluded.
fn function_size(body: &Rc<Stmt>) -> usize {
    struct Counter {
        count: usize,
    }
    impl AstVisitor for Counter {
        fn enter_stmt(&mut self, stmt: &Rc<Stmt>, _state: &WalkState) -> WalkControl {
            if !matches!(&**stmt, Stmt::Block(_)) {
                self.count += 1;
            }
            WalkControl::Continue
        }
    }
    let mut counter = Counter { count: 0 };
    walker::walk_stmt(body, &mut counter);
    counter.count
}

const INLINE_MAX_STATEMENTS: usize = 3;

/// Does the function end in a plain call to another known function?
fn ends_in_tail_call(body: &Rc<Stmt>, functions: &HashSet<String>, name: &str) -> bool {
    let Stmt::Block(block) = &**body else {
        return false;
    };
    let Some(last) = block.stmts.last() else {
        return false;
    };
    let callee = match &**last {
        Stmt::Expr(s) => match &*s.expr {
            Expr::Call(call) => call.callee.as_ident(),
            _ => None,
        },
        Stmt::Return(s) => match s.value.as_deref() {
            Some(Expr::Call(call)) => call.callee.as_ident(),
            _ => None,
        },
        _ => None,
    };
    callee.is_some_and(|c| functions.contains(c) && c != name)
}

pub fn analyze(
    program: &Program,
    table: &SymbolTable,
    check: &CheckResult,
    call_graph: &CallGraph,
    pure_functions: &HashSet<String>,
) -> TargetHints {
    let mut counter = FrequencyCounter {
        check,
        counts: HashMap::new(),
        address_taken: HashSet::new(),
    };
    walker::walk_program(program, &mut counter);

    // Rank variables; hardware-mapped globals have fixed addresses and are
    // never placement candidates
    let mut ranked: Vec<(&crate::symbols::Symbol, u32)> = counter
        .counts
        .iter()
        .map(|(id, count)| (table.symbol(*id), *count))
        .filter(|(symbol, _)| {
            matches!(symbol.kind, SymbolKind::Variable | SymbolKind::Parameter)
        })
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.name.cmp(&b.0.name)));

    let hot_variables: Vec<(String, u32)> = ranked
        .iter()
        .map(|(symbol, count)| (symbol.name.clone(), *count))
        .collect();

    let zero_page_candidates: Vec<ZeroPageCandidate> = ranked
        .iter()
        .filter(|(symbol, _)| {
            !matches!(
                symbol.storage,
                Some(AstStorage::Zp) | Some(AstStorage::Map)
            )
        })
        .filter(|(symbol, count)| {
            counter.address_taken.contains(&symbol.id) || *count >= LOOP_WEIGHT
        })
        .map(|(symbol, count)| ZeroPageCandidate {
            name: symbol.name.clone(),
            score: *count,
            pointer_use: counter.address_taken.contains(&symbol.id),
        })
        .collect();

    let mut inline_candidates = Vec::new();
    let mut tail_call_candidates = Vec::new();
    for decl in &program.decls {
        let Decl::Function(func) = &**decl else {
            continue;
        };
        let Some(body) = &func.body else {
            continue;
        };
        if !call_graph.is_recursive(&func.name)
            && !func.is_callback
            && function_size(body) <= INLINE_MAX_STATEMENTS
            && !call_graph.callers(&func.name).is_empty()
        {
            inline_candidates.push(func.name.clone());
        }
        if ends_in_tail_call(body, call_graph.functions(), &func.name) {
            tail_call_candidates.push(func.name.clone());
        }
    }
    inline_candidates.sort();
    tail_call_candidates.sort();

    // Pure leaf functions are especially cheap to inline; keep them at the
    // front of the list
    inline_candidates.sort_by_key(|name| !pure_functions.contains(name));

    TargetHints {
        zero_page_candidates,
        inline_candidates,
        tail_call_candidates,
        hot_variables,
    }
}
