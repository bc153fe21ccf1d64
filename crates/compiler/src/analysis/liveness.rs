//! Liveness analysis (tier 2)
//!
//! Classical iterative backward data-flow over the CFG:
//! `live_out(n) = U live_in(succ)`, `live_in(n) = use(n) U (live_out(n) - def(n))`.
//! The result is advisory input for the code generator's register and
//! zero-page decisions; it never produces diagnostics.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::ast::{NodeId, Stmt};
use crate::cfg::{Cfg, CfgNodeId};
use crate::symbols::{SymbolId, SymbolTable};
use crate::typechecker::CheckResult;

use super::stmt_accesses;

/// Per-node live sets for one function.
#[derive(Debug, Default)]
pub struct LivenessInfo {
    pub live_in: HashMap<CfgNodeId, HashSet<SymbolId>>,
    pub live_out: HashMap<CfgNodeId, HashSet<SymbolId>>,
}

impl LivenessInfo {
    /// True if the symbol is live on entry to the given node.
    pub fn is_live_in(&self, node: CfgNodeId, symbol: SymbolId) -> bool {
        self.live_in
            .get(&node)
            .is_some_and(|set| set.contains(&symbol))
    }

    pub fn is_live_out(&self, node: CfgNodeId, symbol: SymbolId) -> bool {
        self.live_out
            .get(&node)
            .is_some_and(|set| set.contains(&symbol))
    }
}

pub fn analyze(
    cfg: &Cfg,
    stmt_index: &HashMap<NodeId, Rc<Stmt>>,
    check: &CheckResult,
    table: &SymbolTable,
) -> LivenessInfo {
    // Use/def per node, computed once
    let mut uses: HashMap<CfgNodeId, HashSet<SymbolId>> = HashMap::new();
    let mut defs: HashMap<CfgNodeId, HashSet<SymbolId>> = HashMap::new();
    for node in cfg.nodes() {
        let (node_uses, node_defs) = match node.stmt.and_then(|id| stmt_index.get(&id)) {
            Some(stmt) => {
                let access = stmt_accesses(stmt, check, table);
                (access.reads, access.writes)
            }
            None => (HashSet::new(), HashSet::new()),
        };
        uses.insert(node.id, node_uses);
        defs.insert(node.id, node_defs);
    }

    let mut info = LivenessInfo::default();
    for node in cfg.nodes() {
        info.live_in.insert(node.id, HashSet::new());
        info.live_out.insert(node.id, HashSet::new());
    }

    // Iterate to a fixed point; reverse node order converges quickly on
    // reducible graphs
    let mut changed = true;
    while changed {
        changed = false;
        for node in cfg.nodes().iter().rev() {
            let mut out = HashSet::new();
            for succ in &node.succs {
                out.extend(info.live_in[succ].iter().copied());
            }
            let mut live_in = uses[&node.id].clone();
            for symbol in out.difference(&defs[&node.id]) {
                live_in.insert(*symbol);
            }
            if out != info.live_out[&node.id] {
                info.live_out.insert(node.id, out);
                changed = true;
            }
            if live_in != info.live_in[&node.id] {
                info.live_in.insert(node.id, live_in);
                changed = true;
            }
        }
    }
    info
}
