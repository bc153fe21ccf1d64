//! Advanced analyses (pass 6)
//!
//! Three tiers, individually disableable:
//! - Tier 1 needs only the symbol table: definite assignment, variable usage.
//! - Tier 2 needs CFGs: dead code, liveness.
//! - Tier 3 needs the call graph and the earlier tiers: purity, loop
//!   analysis, 6502 target hints.

pub mod definite_assignment;
pub mod hints;
pub mod liveness;
pub mod loops;
pub mod purity;
pub mod usage;

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::ast::{AssignOp, Expr, NodeId, Program, Stmt};
use crate::call_graph::CallGraph;
use crate::cfg::Cfg;
use crate::diagnostics::{DiagnosticCode, Diagnostics};
use crate::symbols::{SymbolId, SymbolTable};
use crate::typechecker::CheckResult;
use crate::walker::{self, AstVisitor, WalkControl, WalkState};

pub use hints::TargetHints;
pub use liveness::LivenessInfo;
pub use loops::LoopInfo;

/// Which analysis tiers to run.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisTiers {
    pub tier1: bool,
    pub tier2: bool,
    pub tier3: bool,
}

impl Default for AnalysisTiers {
    fn default() -> Self {
        AnalysisTiers {
            tier1: true,
            tier2: true,
            tier3: true,
        }
    }
}

impl AnalysisTiers {
    pub fn none() -> Self {
        AnalysisTiers {
            tier1: false,
            tier2: false,
            tier3: false,
        }
    }
}

/// Aggregated output of pass 6, consumed by the code generator.
#[derive(Debug, Default)]
pub struct AnalysisResult {
    /// Liveness per function (tier 2).
    pub liveness: HashMap<String, LivenessInfo>,
    /// Pure functions (tier 3).
    pub pure_functions: HashSet<String>,
    /// Per-loop facts (tier 3).
    pub loops: Vec<LoopInfo>,
    /// 6502-specific placement and call hints (tier 3).
    pub hints: TargetHints,
}

/// Run the configured tiers in order. With `report_warnings` off, the
/// advisory diagnostics are suppressed but error-level findings (a read
/// that can never see a value) still surface.
#[allow(clippy::too_many_arguments)]
pub fn run_analyses(
    program: &Program,
    table: &SymbolTable,
    check: &CheckResult,
    cfgs: &HashMap<String, Cfg>,
    call_graph: &CallGraph,
    diagnostics: &mut Diagnostics,
    tiers: AnalysisTiers,
    report_warnings: bool,
) -> AnalysisResult {
    let mut result = AnalysisResult::default();

    if tiers.tier1 {
        definite_assignment::analyze(program, table, check, diagnostics, report_warnings);
        if report_warnings {
            usage::analyze(program, table, check, diagnostics);
        }
    }

    if tiers.tier2 {
        if report_warnings {
            report_dead_code(cfgs, diagnostics);
        }
        let stmt_index = index_statements(program);
        for (name, cfg) in cfgs {
            result.liveness.insert(
                name.clone(),
                liveness::analyze(cfg, &stmt_index, check, table),
            );
        }
    }

    if tiers.tier3 {
        result.pure_functions = purity::analyze(program, table, check, call_graph);
        result.loops = loops::analyze(program);
        result.hints = hints::analyze(program, table, check, call_graph, &result.pure_functions);
    }

    result
}

/// Tier 2 dead code: any CFG node unreachable from entry, deduplicated by
/// source position. (When this tier is disabled, CFG construction itself
/// reports unreachable statements instead.)
fn report_dead_code(cfgs: &HashMap<String, Cfg>, diagnostics: &mut Diagnostics) {
    let mut names: Vec<&String> = cfgs.keys().collect();
    names.sort();
    for name in names {
        let cfg = &cfgs[name];
        let mut reported: HashSet<i64> = HashSet::new();
        for id in cfg.unreachable_nodes() {
            let node = cfg.node(id);
            if node
                .preds
                .iter()
                .any(|p| !cfg.node(*p).reachable)
            {
                continue;
            }
            if node.span.is_unknown() || !reported.insert(node.span.start.offset) {
                continue;
            }
            diagnostics.warning(
                DiagnosticCode::UnreachableCode,
                "Unreachable code".to_string(),
                node.span,
            );
        }
    }
}

// ----------------------------------------------------------------------
// Shared read/write collection
// ----------------------------------------------------------------------

/// Reads and writes of symbols inside one expression, resolved through the
/// checker's identifier map. Assignment targets count as writes (compound
/// assignment as read + write); array stores read the index but write the
/// array symbol.
#[derive(Debug, Default)]
pub struct AccessSet {
    pub reads: HashSet<SymbolId>,
    pub writes: HashSet<SymbolId>,
    /// Symbols whose address is taken with `@`; they are "used" without
    /// being read, and they disqualify some register-style optimizations.
    pub address_taken: HashSet<SymbolId>,
}

struct AccessCollector<'a> {
    check: &'a CheckResult,
    access: AccessSet,
}

impl AccessCollector<'_> {
    fn resolve(&self, expr: &Rc<Expr>) -> Option<SymbolId> {
        self.check.symbol_of(expr.id())
    }

    fn collect_target(&mut self, target: &Rc<Expr>, compound: bool) {
        match &**target {
            Expr::Ident(_) => {
                if let Some(symbol) = self.resolve(target) {
                    self.access.writes.insert(symbol);
                    if compound {
                        self.access.reads.insert(symbol);
                    }
                }
            }
            Expr::Index(index) => {
                // Storing through an element reads the index and writes
                // (part of) the array
                if let Some(symbol) = self.resolve(&index.target) {
                    self.access.writes.insert(symbol);
                    if compound {
                        self.access.reads.insert(symbol);
                    }
                }
                collect_expr_into(&index.index, self.check, &mut self.access);
            }
            _ => collect_expr_into(target, self.check, &mut self.access),
        }
    }
}

impl AstVisitor for AccessCollector<'_> {
    fn enter_expr(&mut self, expr: &Rc<Expr>, _state: &WalkState) -> WalkControl {
        match &**expr {
            Expr::Assign(assign) => {
                collect_expr_into(&assign.value, self.check, &mut self.access);
                self.collect_target(&assign.target, assign.op != AssignOp::Assign);
                WalkControl::SkipChildren
            }
            Expr::Ident(_) => {
                if let Some(symbol) = self.resolve(expr) {
                    self.access.reads.insert(symbol);
                }
                WalkControl::Continue
            }
            // Taking an address is neither a read nor a write of the value,
            // but the location itself is used
            Expr::AddrOf(addr) => {
                let target = match &*addr.operand {
                    Expr::Index(index) => {
                        collect_expr_into(&index.index, self.check, &mut self.access);
                        &index.target
                    }
                    _ => &addr.operand,
                };
                if let Some(symbol) = self.resolve(target) {
                    self.access.address_taken.insert(symbol);
                }
                WalkControl::SkipChildren
            }
            _ => WalkControl::Continue,
        }
    }
}

fn collect_expr_into(expr: &Rc<Expr>, check: &CheckResult, into: &mut AccessSet) {
    let mut collector = AccessCollector {
        check,
        access: std::mem::take(into),
    };
    walker::walk_expr(expr, &mut collector);
    *into = collector.access;
}

/// Collect symbol reads and writes of an expression tree.
pub fn collect_accesses(expr: &Rc<Expr>, check: &CheckResult) -> AccessSet {
    let mut access = AccessSet::default();
    collect_expr_into(expr, check, &mut access);
    access
}

/// Collect every symbol access in the whole program, including global
/// initializers and all function bodies.
pub fn collect_program_accesses(program: &Program, check: &CheckResult) -> AccessSet {
    let mut collector = AccessCollector {
        check,
        access: AccessSet::default(),
    };
    walker::walk_program(program, &mut collector);
    collector.access
}

/// Reads and writes performed directly by a statement, not descending into
/// nested statements (children have their own CFG nodes).
pub fn stmt_accesses(stmt: &Stmt, check: &CheckResult, table: &SymbolTable) -> AccessSet {
    let mut access = AccessSet::default();
    match stmt {
        Stmt::Var(var) => {
            if let Some(init) = &var.init {
                collect_expr_into(init, check, &mut access);
            }
            if let Some(symbol) = decl_symbol(table, var.id) {
                if var.init.is_some() {
                    access.writes.insert(symbol);
                }
            }
        }
        Stmt::Expr(s) => collect_expr_into(&s.expr, check, &mut access),
        Stmt::Return(s) => {
            if let Some(value) = &s.value {
                collect_expr_into(value, check, &mut access);
            }
        }
        Stmt::If(s) => collect_expr_into(&s.cond, check, &mut access),
        Stmt::While(s) => collect_expr_into(&s.cond, check, &mut access),
        Stmt::DoWhile(s) => collect_expr_into(&s.cond, check, &mut access),
        Stmt::For(s) => {
            collect_expr_into(&s.start, check, &mut access);
            collect_expr_into(&s.end, check, &mut access);
            if let Some(step) = &s.step {
                collect_expr_into(step, check, &mut access);
            }
            if let Some(symbol) = decl_symbol(table, s.id) {
                access.writes.insert(symbol);
                // The counter is re-read on every iteration
                access.reads.insert(symbol);
            }
        }
        Stmt::Switch(s) => collect_expr_into(&s.scrutinee, check, &mut access),
        Stmt::Match(s) => collect_expr_into(&s.scrutinee, check, &mut access),
        Stmt::Block(_) | Stmt::Break(_) | Stmt::Continue(_) => {}
    }
    access
}

/// Symbol declared by the given AST node (variable declaration or for
/// loop), if any.
pub fn decl_symbol(table: &SymbolTable, decl: NodeId) -> Option<SymbolId> {
    table.symbol_declared_by(decl).map(|s| s.id)
}

/// Index from statement node id to the statement itself, for analyses that
/// join CFG nodes back to the AST.
pub fn index_statements(program: &Program) -> HashMap<NodeId, Rc<Stmt>> {
    struct Indexer {
        map: HashMap<NodeId, Rc<Stmt>>,
    }
    impl AstVisitor for Indexer {
        fn enter_stmt(&mut self, stmt: &Rc<Stmt>, _state: &WalkState) -> WalkControl {
            self.map.insert(stmt.id(), Rc::clone(stmt));
            WalkControl::Continue
        }
    }
    let mut indexer = Indexer {
        map: HashMap::new(),
    };
    walker::walk_program(program, &mut indexer);
    indexer.map
}
