//! Control-flow graph construction (pass 4)
//!
//! One graph per function body. The builder keeps a current insertion
//! point; a `None` insertion point means the following statements are
//! unreachable - they still get nodes (so diagnostics and later analyses
//! can see them) but nothing links to them, and the reachability sweep
//! reports them once per source position.

use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use crate::ast::{Decl, FunctionDecl, NodeId, Program, Stmt};
use crate::diagnostics::{DiagnosticCode, Diagnostics};
use crate::source::SourceSpan;

pub type CfgNodeId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfgNodeKind {
    Entry,
    Exit,
    Statement,
    Branch,
    /// Loop header
    Loop,
    Case,
    Return,
    Break,
    Continue,
}

#[derive(Debug)]
pub struct CfgNode {
    pub id: CfgNodeId,
    pub kind: CfgNodeKind,
    /// The AST statement this node represents, for diagnostics.
    pub stmt: Option<NodeId>,
    pub span: SourceSpan,
    pub succs: Vec<CfgNodeId>,
    pub preds: Vec<CfgNodeId>,
    pub reachable: bool,
}

#[derive(Debug)]
pub struct Cfg {
    pub function: String,
    nodes: Vec<CfgNode>,
    pub entry: CfgNodeId,
    pub exit: CfgNodeId,
}

impl Cfg {
    fn new(function: &str) -> Self {
        let mut cfg = Cfg {
            function: function.to_string(),
            nodes: Vec::new(),
            entry: 0,
            exit: 0,
        };
        cfg.entry = cfg.add_node(CfgNodeKind::Entry, None, SourceSpan::unknown());
        cfg.exit = cfg.add_node(CfgNodeKind::Exit, None, SourceSpan::unknown());
        cfg
    }

    pub fn add_node(&mut self, kind: CfgNodeKind, stmt: Option<NodeId>, span: SourceSpan) -> CfgNodeId {
        let id = self.nodes.len() as CfgNodeId;
        self.nodes.push(CfgNode {
            id,
            kind,
            stmt,
            span,
            succs: Vec::new(),
            preds: Vec::new(),
            reachable: false,
        });
        id
    }

    /// Add an edge, maintaining both directions.
    pub fn add_edge(&mut self, from: CfgNodeId, to: CfgNodeId) {
        if !self.nodes[from as usize].succs.contains(&to) {
            self.nodes[from as usize].succs.push(to);
            self.nodes[to as usize].preds.push(from);
        }
    }

    pub fn node(&self, id: CfgNodeId) -> &CfgNode {
        &self.nodes[id as usize]
    }

    pub fn nodes(&self) -> &[CfgNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Mark every node reachable from the entry.
    pub fn compute_reachability(&mut self) {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([self.entry]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            self.nodes[id as usize].reachable = true;
            for succ in self.nodes[id as usize].succs.clone() {
                queue.push_back(succ);
            }
        }
    }

    /// Node ids of unreachable statements, in creation order.
    pub fn unreachable_nodes(&self) -> Vec<CfgNodeId> {
        self.nodes
            .iter()
            .filter(|n| !n.reachable && n.stmt.is_some())
            .map(|n| n.id)
            .collect()
    }
}

/// Break/continue targets of the innermost enclosing loop or switch.
struct LoopCtx {
    /// `None` for switch contexts: continue binds further out.
    continue_target: Option<CfgNodeId>,
    break_target: CfgNodeId,
}

pub struct CfgBuilder<'a> {
    cfg: Cfg,
    /// Insertion point; `None` while the walk is in unreachable code.
    current: Option<CfgNodeId>,
    loops: Vec<LoopCtx>,
    diagnostics: &'a mut Diagnostics,
    report_warnings: bool,
}

impl<'a> CfgBuilder<'a> {
    pub fn new(function: &str, diagnostics: &'a mut Diagnostics, report_warnings: bool) -> Self {
        CfgBuilder {
            cfg: Cfg::new(function),
            current: None,
            loops: Vec::new(),
            diagnostics,
            report_warnings,
        }
    }

    pub fn build(mut self, func: &FunctionDecl) -> Cfg {
        self.current = Some(self.cfg.entry);
        if let Some(body) = &func.body {
            self.visit_stmt(body);
        }
        // Fall-through off the last statement reaches the exit
        if let Some(current) = self.current {
            self.cfg.add_edge(current, self.cfg.exit);
        }
        self.cfg.compute_reachability();
        self.report_unreachable();
        self.cfg
    }

    fn report_unreachable(&mut self) {
        if !self.report_warnings {
            return;
        }
        // One warning per source position, not one per node
        let mut reported: HashSet<i64> = HashSet::new();
        for id in self.cfg.unreachable_nodes() {
            let node = self.cfg.node(id);
            // Only the head of an unreachable island warns: a node whose
            // predecessors are all unreachable too is covered by the head
            let has_unreachable_pred = node
                .preds
                .iter()
                .any(|p| !self.cfg.node(*p).reachable);
            if has_unreachable_pred {
                continue;
            }
            let span = node.span;
            if span.is_unknown() || !reported.insert(span.start.offset) {
                continue;
            }
            self.diagnostics.warning(
                DiagnosticCode::UnreachableCode,
                "Unreachable code".to_string(),
                span,
            );
        }
    }

    /// Create a node and link it from the insertion point. While
    /// unreachable, the node starts a disconnected island.
    fn append(&mut self, kind: CfgNodeKind, stmt: Option<NodeId>, span: SourceSpan) -> CfgNodeId {
        let node = self.cfg.add_node(kind, stmt, span);
        if let Some(current) = self.current {
            self.cfg.add_edge(current, node);
        }
        self.current = Some(node);
        node
    }

    fn visit_stmt(&mut self, stmt: &Rc<Stmt>) {
        match &**stmt {
            Stmt::Block(block) => {
                for child in &block.stmts {
                    self.visit_stmt(child);
                }
            }
            Stmt::Expr(_) | Stmt::Var(_) => {
                self.append(CfgNodeKind::Statement, Some(stmt.id()), stmt.span());
            }
            Stmt::If(s) => {
                let branch = self.append(CfgNodeKind::Branch, Some(s.id), s.cond.span());

                self.current = Some(branch);
                self.visit_stmt(&s.then_branch);
                let then_exit = self.current;

                let else_exit = match &s.else_branch {
                    Some(else_branch) => {
                        self.current = Some(branch);
                        self.visit_stmt(else_branch);
                        self.current
                    }
                    // Without an else, control can fall around the branch
                    None => Some(branch),
                };

                match (then_exit, else_exit) {
                    (None, None) => self.current = None,
                    (then_exit, else_exit) => {
                        let merge =
                            self.cfg
                                .add_node(CfgNodeKind::Statement, None, SourceSpan::unknown());
                        if let Some(id) = then_exit {
                            self.cfg.add_edge(id, merge);
                        }
                        if let Some(id) = else_exit {
                            self.cfg.add_edge(id, merge);
                        }
                        self.current = Some(merge);
                    }
                }
            }
            Stmt::While(s) => {
                let header = self.append(CfgNodeKind::Loop, Some(s.id), s.cond.span());
                let exit = self
                    .cfg
                    .add_node(CfgNodeKind::Statement, None, SourceSpan::unknown());
                self.cfg.add_edge(header, exit);

                self.loops.push(LoopCtx {
                    continue_target: Some(header),
                    break_target: exit,
                });
                self.current = Some(header);
                self.visit_stmt(&s.body);
                if let Some(tail) = self.current {
                    self.cfg.add_edge(tail, header);
                }
                self.loops.pop();
                self.current = Some(exit);
            }
            Stmt::For(s) => {
                let header = self.append(CfgNodeKind::Loop, Some(s.id), s.counter_span);
                let exit = self
                    .cfg
                    .add_node(CfgNodeKind::Statement, None, SourceSpan::unknown());
                self.cfg.add_edge(header, exit);

                self.loops.push(LoopCtx {
                    continue_target: Some(header),
                    break_target: exit,
                });
                self.current = Some(header);
                self.visit_stmt(&s.body);
                if let Some(tail) = self.current {
                    self.cfg.add_edge(tail, header);
                }
                self.loops.pop();
                self.current = Some(exit);
            }
            Stmt::DoWhile(s) => {
                let body_entry = self.append(CfgNodeKind::Loop, Some(s.id), s.span);
                let cond = self
                    .cfg
                    .add_node(CfgNodeKind::Branch, Some(s.id), s.cond.span());
                let exit = self
                    .cfg
                    .add_node(CfgNodeKind::Statement, None, SourceSpan::unknown());

                self.loops.push(LoopCtx {
                    // continue in a do-while re-tests the condition
                    continue_target: Some(cond),
                    break_target: exit,
                });
                self.current = Some(body_entry);
                self.visit_stmt(&s.body);
                if let Some(tail) = self.current {
                    self.cfg.add_edge(tail, cond);
                }
                self.loops.pop();

                self.cfg.add_edge(cond, body_entry);
                self.cfg.add_edge(cond, exit);
                self.current = Some(exit);
            }
            Stmt::Switch(s) => self.visit_switch_like(stmt, &s.arms, true),
            Stmt::Match(s) => self.visit_switch_like(stmt, &s.arms, false),
            Stmt::Return(s) => {
                let node = self.append(CfgNodeKind::Return, Some(s.id), s.span);
                self.cfg.add_edge(node, self.cfg.exit);
                self.current = None;
            }
            Stmt::Break(s) => {
                let node = self.append(CfgNodeKind::Break, Some(s.id), s.span);
                if let Some(ctx) = self.loops.last() {
                    let target = ctx.break_target;
                    self.cfg.add_edge(node, target);
                }
                self.current = None;
            }
            Stmt::Continue(s) => {
                let node = self.append(CfgNodeKind::Continue, Some(s.id), s.span);
                let target = self
                    .loops
                    .iter()
                    .rev()
                    .find_map(|ctx| ctx.continue_target);
                if let Some(target) = target {
                    self.cfg.add_edge(node, target);
                }
                self.current = None;
            }
        }
    }

    fn visit_switch_like(&mut self, stmt: &Rc<Stmt>, arms: &[crate::ast::CaseArm], fall_through: bool) {
        let dispatch = self.append(CfgNodeKind::Branch, Some(stmt.id()), stmt.span());
        let exit = self
            .cfg
            .add_node(CfgNodeKind::Statement, None, SourceSpan::unknown());

        self.loops.push(LoopCtx {
            continue_target: None,
            break_target: exit,
        });

        let mut prev_exit: Option<CfgNodeId> = None;
        let mut has_default = false;
        for arm in arms {
            if arm.value.is_none() {
                has_default = true;
            }
            let case_entry = self.cfg.add_node(CfgNodeKind::Case, None, arm.span);
            self.cfg.add_edge(dispatch, case_entry);
            // C-style fall-through: the previous arm's tail runs into this
            // arm's body
            if fall_through {
                if let Some(prev) = prev_exit {
                    self.cfg.add_edge(prev, case_entry);
                }
            } else if let Some(prev) = prev_exit {
                self.cfg.add_edge(prev, exit);
            }
            self.current = Some(case_entry);
            for child in &arm.body {
                self.visit_stmt(child);
            }
            prev_exit = self.current;
        }
        if let Some(prev) = prev_exit {
            self.cfg.add_edge(prev, exit);
        }
        if !has_default {
            // No default arm: the scrutinee may match nothing
            self.cfg.add_edge(dispatch, exit);
        }
        self.loops.pop();
        self.current = Some(exit);
    }
}

/// Build a CFG for every function with a body.
pub fn build_cfgs(
    program: &Program,
    diagnostics: &mut Diagnostics,
    report_warnings: bool,
) -> HashMap<String, Cfg> {
    let mut cfgs = HashMap::new();
    for decl in &program.decls {
        if let Decl::Function(func) = &**decl {
            if func.body.is_none() {
                continue;
            }
            let builder = CfgBuilder::new(&func.name, diagnostics, report_warnings);
            cfgs.insert(func.name.clone(), builder.build(func));
        }
    }
    cfgs
}
