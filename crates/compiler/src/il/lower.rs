//! AST to IL lowering
//!
//! Walks the type-checked AST and drives the [`Builder`]. Every front-end
//! coercion becomes an explicit instruction: `byte` widens with
//! `zero_extend`, conditions test numerics with `cmp_ne 0`, and `bool`
//! reuses byte registers unchanged. Globals are placed by storage class;
//! the zero-page allocator bumps from a configurable base and refuses
//! allocations past its limit.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{
    BinaryOp, CaseArm, Decl, Expr, ForStmt, FunctionDecl, Program, Stmt,
    StorageClass as AstStorage, UnaryOp,
};
use crate::diagnostics::{DiagnosticCode, Diagnostics};
use crate::intrinsics::{self, IntrinsicKind};
use crate::symbols::{Symbol, SymbolId, SymbolKind, SymbolTable};
use crate::typechecker::CheckResult;
use crate::types::TypeInfo;

use super::builder::Builder;
use super::instr::{BinOp, CmpOp, CpuOp, MapInfo, VirtualRegister};
use super::types::{IlType, il_type_of};
use super::{IlGlobal, IlModule, IlParameter, LabelId, StorageClass};

/// Zero-page placement parameters. The default band starts at `$0A`,
/// leaving `$00-$09` for the runtime and everything from `$90` up for the
/// KERNAL.
#[derive(Debug, Clone, Copy)]
pub struct LowerOptions {
    pub zp_base: u32,
    pub zp_limit: u32,
}

impl Default for LowerOptions {
    fn default() -> Self {
        LowerOptions {
            zp_base: 0x0A,
            zp_limit: 0x8F,
        }
    }
}

/// Jump targets for `break`/`continue`. Switch bodies push an entry with
/// no continue target so `continue` binds to the enclosing loop.
struct LoopTargets {
    continue_block: Option<LabelId>,
    break_block: LabelId,
}

pub struct Lowerer<'a> {
    table: &'a SymbolTable,
    check: &'a CheckResult,
    diagnostics: &'a mut Diagnostics,
    options: LowerOptions,
    builder: Builder,
    loops: Vec<LoopTargets>,
    /// Storage name per symbol (locals mangled on collision).
    names: HashMap<SymbolId, String>,
    /// Interned string literals, emitted as data globals at the end.
    strings: Vec<(String, String)>,
}

/// Lower a fully checked program to an IL module.
pub fn lower_program(
    program: &Program,
    table: &SymbolTable,
    check: &CheckResult,
    diagnostics: &mut Diagnostics,
    options: LowerOptions,
) -> IlModule {
    let mut lowerer = Lowerer {
        table,
        check,
        diagnostics,
        options,
        builder: Builder::new(),
        loops: Vec::new(),
        names: HashMap::new(),
        strings: Vec::new(),
    };
    lowerer.run(program)
}

impl Lowerer<'_> {
    fn run(&mut self, program: &Program) -> IlModule {
        let mut module = IlModule::new(&program.module.name);
        self.emit_globals(&mut module);

        for decl in &program.decls {
            if let Decl::Function(func) = &**decl {
                if func.body.is_some() {
                    let lowered = self.lower_function(func);
                    module.functions.push(lowered);
                }
            }
        }

        // String pool: one data global per distinct literal, NUL-terminated
        for (label, text) in std::mem::take(&mut self.strings) {
            let mut bytes: Vec<u32> = text.bytes().map(u32::from).collect();
            bytes.push(0);
            module.globals.push(IlGlobal {
                size: bytes.len() as u32,
                name: label.clone(),
                ty: IlType::Pointer,
                storage: StorageClass::Data,
                address: None,
                label: Some(format!("_{label}")),
                initializer: Some(bytes),
            });
        }

        module
    }

    // ------------------------------------------------------------------
    // Globals
    // ------------------------------------------------------------------

    fn emit_globals(&mut self, module: &mut IlModule) {
        let mut zp_next = self.options.zp_base;
        let symbols: Vec<SymbolId> = self
            .table
            .symbols_in(self.table.module_scope)
            .filter(|s| matches!(s.kind, SymbolKind::Variable | SymbolKind::Constant))
            .map(|s| s.id)
            .collect();

        for id in symbols {
            let symbol = self.table.symbol(id).clone();
            let ty = symbol.ty.clone().unwrap_or(TypeInfo::Byte);
            let il_ty = il_type_of(&ty);
            let size = self.global_size(&symbol, &ty);

            let global = match symbol.storage {
                Some(AstStorage::Map) => IlGlobal {
                    name: symbol.name.clone(),
                    ty: il_ty,
                    size,
                    storage: StorageClass::Map,
                    address: symbol.map_address,
                    label: None,
                    initializer: None,
                },
                Some(AstStorage::Zp) => {
                    if zp_next + size > self.options.zp_limit + 1 {
                        self.diagnostics.error(
                            DiagnosticCode::ZeroPageOverflow,
                            format!(
                                "Zero page exhausted: '{}' needs {} byte(s) but only {} remain",
                                symbol.name,
                                size,
                                (self.options.zp_limit + 1).saturating_sub(zp_next)
                            ),
                            symbol.span,
                        );
                        continue;
                    }
                    let address = zp_next;
                    zp_next += size;
                    IlGlobal {
                        name: symbol.name.clone(),
                        ty: il_ty,
                        size,
                        storage: StorageClass::ZeroPage,
                        address: Some(address),
                        label: None,
                        initializer: None,
                    }
                }
                Some(AstStorage::Ram) => IlGlobal {
                    name: symbol.name.clone(),
                    ty: il_ty,
                    size,
                    storage: StorageClass::Ram,
                    address: None,
                    label: Some(format!("_{}", symbol.name)),
                    initializer: None,
                },
                // Unannotated globals and `@data` land in the data section
                Some(AstStorage::Data) | None => IlGlobal {
                    name: symbol.name.clone(),
                    ty: il_ty,
                    size,
                    storage: StorageClass::Data,
                    address: None,
                    label: Some(format!("_{}", symbol.name)),
                    initializer: Some(self.global_initializer(&symbol, &ty)),
                },
            };
            module.globals.push(global);
        }
    }

    fn global_size(&self, symbol: &Symbol, ty: &TypeInfo) -> u32 {
        if let Some(size) = ty.size() {
            return size;
        }
        // Unsized arrays take their extent from the initializer
        if let Some(Expr::Array(array)) = symbol.init.as_deref() {
            let element = ty.element_type().and_then(|e| e.size()).unwrap_or(1);
            return element * array.elements.len() as u32;
        }
        if let Some(Expr::Str(s)) = symbol.init.as_deref() {
            return s.value.len() as u32 + 1;
        }
        0
    }

    fn global_initializer(&self, symbol: &Symbol, ty: &TypeInfo) -> Vec<u32> {
        match symbol.init.as_deref() {
            Some(Expr::Array(array)) => array
                .elements
                .iter()
                .map(|e| self.const_eval(e).unwrap_or(0))
                .collect(),
            Some(Expr::Str(s)) => {
                let mut bytes: Vec<u32> = s.value.bytes().map(u32::from).collect();
                bytes.push(0);
                bytes
            }
            Some(expr_init) => {
                let value = self
                    .const_eval(&Rc::new(expr_init.clone()))
                    .unwrap_or(0);
                vec![value]
            }
            None => {
                let count = match ty.canonical() {
                    TypeInfo::Array { count, .. } => count.unwrap_or(0),
                    _ => 1,
                };
                vec![0; count as usize]
            }
        }
    }

    /// Compile-time evaluation for initializer images: literals, enum
    /// members, constants and arithmetic over them.
    fn const_eval(&self, expr: &Rc<Expr>) -> Option<u32> {
        match &**expr {
            Expr::Number(n) => Some(n.value),
            Expr::Bool(b) => Some(u32::from(b.value)),
            Expr::Char(c) => Some(c.value as u32),
            Expr::Ident(ident) => {
                let symbol = self.check.symbol_of(ident.id).map(|id| self.table.symbol(id))?;
                match symbol.kind {
                    SymbolKind::EnumMember => symbol.enum_value,
                    SymbolKind::Constant => symbol.init.as_ref().and_then(|i| self.const_eval(i)),
                    _ => None,
                }
            }
            Expr::Member(member) => {
                let ty = self.check.type_of(member.id)?;
                ty.enum_member(&member.member)
            }
            Expr::Unary(u) if u.op == UnaryOp::BitNot => {
                Some(!self.const_eval(&u.operand)? & 0xFFFF)
            }
            Expr::Binary(b) => {
                let lhs = self.const_eval(&b.lhs)?;
                let rhs = self.const_eval(&b.rhs)?;
                let value = match b.op {
                    BinaryOp::Add => lhs.wrapping_add(rhs),
                    BinaryOp::Sub => lhs.wrapping_sub(rhs),
                    BinaryOp::Mul => lhs.wrapping_mul(rhs),
                    BinaryOp::Div => lhs.checked_div(rhs)?,
                    BinaryOp::Mod => lhs.checked_rem(rhs)?,
                    BinaryOp::BitAnd => lhs & rhs,
                    BinaryOp::BitOr => lhs | rhs,
                    BinaryOp::BitXor => lhs ^ rhs,
                    BinaryOp::Shl => lhs.wrapping_shl(rhs),
                    BinaryOp::Shr => lhs.wrapping_shr(rhs),
                    _ => return None,
                };
                Some(value & 0xFFFF)
            }
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    fn lower_function(&mut self, func: &FunctionDecl) -> super::IlFunction {
        let (params, return_type) = self.function_signature(func);

        self.assign_local_names(func);
        self.builder
            .begin_function(&func.name, params, return_type);
        self.builder.set_interrupt(func.is_callback);
        self.loops.clear();

        if let Some(body) = &func.body {
            self.lower_stmt(body);
        }

        if !self.builder.current_block_terminated() {
            if return_type == IlType::Void {
                self.builder.emit_return_void();
            } else {
                let filler = self.builder.emit_undef(return_type);
                self.builder.emit_return(Some(filler));
            }
        }

        let lowered = self.builder.end_function();
        if let Err(diag) = super::verify::verify_register_id_uniqueness(&lowered) {
            self.diagnostics.push(diag);
        }
        lowered
    }

    fn function_signature(&self, func: &FunctionDecl) -> (Vec<IlParameter>, IlType) {
        let symbol_type = self
            .table
            .lookup_local(self.table.module_scope, &func.name)
            .and_then(|s| s.ty.clone());
        match symbol_type.as_ref().map(|t| t.canonical()) {
            Some(TypeInfo::Function {
                params,
                param_names,
                return_type,
            }) => {
                let params = param_names
                    .iter()
                    .zip(params.iter())
                    .map(|(name, ty)| IlParameter {
                        name: name.clone(),
                        ty: il_type_of(ty),
                    })
                    .collect();
                (params, il_type_of(return_type))
            }
            _ => (Vec::new(), IlType::Void),
        }
    }

    /// Locals load and store by name; shadowed names get a symbol-id
    /// suffix so every storage slot stays distinct.
    fn assign_local_names(&mut self, func: &FunctionDecl) {
        self.names.clear();
        let Some(func_scope) = self.table.scope_of_node(func.id) else {
            return;
        };
        let locals: Vec<&Symbol> = self
            .table
            .symbols()
            .filter(|s| {
                matches!(s.kind, SymbolKind::Variable | SymbolKind::Parameter)
                    && self.scope_within(s.scope, func_scope)
            })
            .collect();
        let mut name_counts: HashMap<&str, usize> = HashMap::new();
        for symbol in &locals {
            *name_counts.entry(symbol.name.as_str()).or_insert(0) += 1;
        }
        for symbol in locals {
            // Parameters keep their declared name (it is the IlParameter
            // name); shadowing locals get a symbol-id suffix
            let name = if name_counts[symbol.name.as_str()] == 1
                || symbol.kind == SymbolKind::Parameter
            {
                symbol.name.clone()
            } else {
                format!("{}_{}", symbol.name, symbol.id)
            };
            self.names.insert(symbol.id, name);
        }
    }

    fn scope_within(&self, scope: crate::symbols::ScopeId, root: crate::symbols::ScopeId) -> bool {
        let mut current = Some(scope);
        while let Some(id) = current {
            if id == root {
                return true;
            }
            current = self.table.scope(id).parent;
        }
        false
    }

    fn storage_name(&self, symbol: &Symbol) -> String {
        self.names
            .get(&symbol.id)
            .cloned()
            .unwrap_or_else(|| symbol.name.clone())
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn lower_stmt(&mut self, stmt: &Rc<Stmt>) {
        self.builder.set_span(stmt.span());
        match &**stmt {
            Stmt::Block(block) => {
                for child in &block.stmts {
                    self.lower_stmt(child);
                }
            }
            Stmt::Var(var) => {
                let Some(symbol) = self.table.symbol_declared_by(var.id).cloned() else {
                    return;
                };
                let Some(init) = &var.init else {
                    return;
                };
                let declared = symbol.ty.clone().unwrap_or(TypeInfo::Byte);
                if let (Expr::Array(array), true) = (&**init, declared.is_array()) {
                    // Element-wise stores into the local array slot
                    let element_ty = declared
                        .element_type()
                        .map(il_type_of)
                        .unwrap_or(IlType::Byte);
                    let name = self.storage_name(&symbol);
                    for (i, element) in array.elements.iter().enumerate() {
                        let value = self.lower_expr(element);
                        let value = self.coerce(value, element_ty);
                        let index = self.builder.emit_const(IlType::Word, i as u32);
                        self.builder.emit_store_elem(&name, index, value);
                    }
                    return;
                }
                let value = self.lower_expr(init);
                let value = self.coerce(value, il_type_of(&declared));
                self.store_symbol(&symbol, value, None);
            }
            Stmt::Expr(s) => {
                self.lower_expr(&s.expr);
            }
            Stmt::Return(s) => {
                let return_type = self.builder.function().return_type;
                match &s.value {
                    Some(value) => {
                        let reg = self.lower_expr(value);
                        let reg = self.coerce(reg, return_type);
                        self.builder.emit_return(Some(reg));
                    }
                    None => self.builder.emit_return_void(),
                }
            }
            Stmt::If(s) => {
                let cond = self.lower_condition(&s.cond);
                let then_block = self.builder.create_block(Some("then"));
                let merge = self.builder.create_block(Some("endif"));
                let else_block = match &s.else_branch {
                    Some(_) => self.builder.create_block(Some("else")),
                    None => merge,
                };
                self.builder.emit_branch(cond, then_block, else_block);

                self.builder.set_current_block(then_block);
                self.lower_stmt(&s.then_branch);
                self.builder.emit_jump(merge);

                if let Some(else_branch) = &s.else_branch {
                    self.builder.set_current_block(else_block);
                    self.lower_stmt(else_branch);
                    self.builder.emit_jump(merge);
                }
                self.builder.set_current_block(merge);
            }
            Stmt::While(s) => {
                let header = self.builder.create_block(Some("while_head"));
                let body = self.builder.create_block(Some("while_body"));
                let exit = self.builder.create_block(Some("while_end"));

                self.builder.emit_jump(header);
                self.builder.set_current_block(header);
                let cond = self.lower_condition(&s.cond);
                self.builder.emit_branch(cond, body, exit);

                self.builder.set_current_block(body);
                self.loops.push(LoopTargets {
                    continue_block: Some(header),
                    break_block: exit,
                });
                self.lower_stmt(&s.body);
                self.loops.pop();
                self.builder.emit_jump(header);

                self.builder.set_current_block(exit);
            }
            Stmt::DoWhile(s) => {
                let body = self.builder.create_block(Some("do_body"));
                let cond_block = self.builder.create_block(Some("do_cond"));
                let exit = self.builder.create_block(Some("do_end"));

                self.builder.emit_jump(body);
                self.builder.set_current_block(body);
                self.loops.push(LoopTargets {
                    continue_block: Some(cond_block),
                    break_block: exit,
                });
                self.lower_stmt(&s.body);
                self.loops.pop();
                self.builder.emit_jump(cond_block);

                self.builder.set_current_block(cond_block);
                let cond = self.lower_condition(&s.cond);
                self.builder.emit_branch(cond, body, exit);

                self.builder.set_current_block(exit);
            }
            Stmt::For(s) => self.lower_for(s),
            Stmt::Switch(s) => self.lower_switch_like(&s.scrutinee, &s.arms, true),
            Stmt::Match(s) => self.lower_switch_like(&s.scrutinee, &s.arms, false),
            Stmt::Break(_) => {
                if let Some(target) = self.loops.last().map(|l| l.break_block) {
                    self.builder.emit_jump(target);
                }
            }
            Stmt::Continue(_) => {
                let target = self
                    .loops
                    .iter()
                    .rev()
                    .find_map(|l| l.continue_block);
                if let Some(target) = target {
                    self.builder.emit_jump(target);
                }
            }
        }
    }

    fn lower_for(&mut self, s: &ForStmt) {
        let Some(counter) = self.table.symbol_declared_by(s.id).cloned() else {
            return;
        };
        let counter_ty = counter
            .ty
            .as_ref()
            .map(il_type_of)
            .unwrap_or(IlType::Byte);
        let counter_name = self.storage_name(&counter);

        let start = self.lower_expr(&s.start);
        let start = self.coerce(start, counter_ty);
        self.builder.emit_store_var(&counter_name, start);

        let header = self.builder.create_block(Some("for_head"));
        let body = self.builder.create_block(Some("for_body"));
        let step_block = self.builder.create_block(Some("for_step"));
        let exit = self.builder.create_block(Some("for_end"));

        self.builder.emit_jump(header);
        self.builder.set_current_block(header);
        let current = self.builder.emit_load_var(&counter_name, counter_ty);
        let bound = self.lower_expr(&s.end);
        let bound = self.coerce(bound, counter_ty);
        let op = if s.down { CmpOp::Ge } else { CmpOp::Le };
        let cond = self.builder.emit_compare(op, current, bound);
        self.builder.emit_branch(cond, body, exit);

        self.builder.set_current_block(body);
        self.loops.push(LoopTargets {
            continue_block: Some(step_block),
            break_block: exit,
        });
        self.lower_stmt(&s.body);
        self.loops.pop();
        self.builder.emit_jump(step_block);

        self.builder.set_current_block(step_block);
        let current = self.builder.emit_load_var(&counter_name, counter_ty);
        let step = match &s.step {
            Some(step) => {
                let reg = self.lower_expr(step);
                self.coerce(reg, counter_ty)
            }
            None => self.builder.emit_const(counter_ty, 1),
        };
        let op = if s.down { BinOp::Sub } else { BinOp::Add };
        let next = self.builder.emit_binary(op, current, step);
        let next = self.coerce(next, counter_ty);
        self.builder.emit_store_var(&counter_name, next);
        self.builder.emit_jump(header);

        self.builder.set_current_block(exit);
    }

    fn lower_switch_like(&mut self, scrutinee: &Rc<Expr>, arms: &[CaseArm], fall_through: bool) {
        let scrutinee_reg = self.lower_expr(scrutinee);
        let exit = self.builder.create_block(Some("switch_end"));
        let bodies: Vec<LabelId> = arms
            .iter()
            .map(|_| self.builder.create_block(Some("case")))
            .collect();
        let default_index = arms.iter().position(|a| a.value.is_none());

        // Dispatch chain: each valued arm tests and falls to the next test
        for (i, arm) in arms.iter().enumerate() {
            let Some(value) = &arm.value else {
                continue;
            };
            let value_reg = self.lower_expr(value);
            let (lhs, rhs) = self.widen_pair(scrutinee_reg.clone(), value_reg);
            let matched = self.builder.emit_compare(CmpOp::Eq, lhs, rhs);
            let next_test = self.builder.create_block(Some("case_test"));
            self.builder.emit_branch(matched, bodies[i], next_test);
            self.builder.set_current_block(next_test);
        }
        // End of the chain: default body or straight out
        match default_index {
            Some(i) => self.builder.emit_jump(bodies[i]),
            None => self.builder.emit_jump(exit),
        }

        for (i, arm) in arms.iter().enumerate() {
            self.builder.set_current_block(bodies[i]);
            self.loops.push(LoopTargets {
                continue_block: None,
                break_block: exit,
            });
            for child in &arm.body {
                self.lower_stmt(child);
            }
            self.loops.pop();
            // C-style switch runs into the next arm's body; match exits
            let next = if fall_through && i + 1 < arms.len() {
                bodies[i + 1]
            } else {
                exit
            };
            self.builder.emit_jump(next);
        }
        self.builder.set_current_block(exit);
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expr_il_type(&self, expr: &Rc<Expr>) -> IlType {
        self.check
            .type_of(expr.id())
            .map(il_type_of)
            .unwrap_or(IlType::Byte)
    }

    fn lower_expr(&mut self, expr: &Rc<Expr>) -> VirtualRegister {
        self.builder.set_span(expr.span());
        match &**expr {
            Expr::Number(n) => {
                let ty = self.expr_il_type(expr);
                self.builder.emit_const(ty, n.value)
            }
            Expr::Bool(b) => self.builder.emit_const(IlType::Bool, u32::from(b.value)),
            Expr::Char(c) => self.builder.emit_const(IlType::Byte, c.value as u32),
            Expr::Str(s) => {
                let label = self.intern_string(&s.value);
                self.builder.emit_load_address(&label)
            }
            Expr::Array(_) => {
                // Array literals only exist in initializer position; any
                // other use was rejected during checking
                self.builder.emit_undef(IlType::Pointer)
            }
            Expr::Ident(_) => self.lower_ident_read(expr),
            Expr::Unary(u) => {
                let operand = self.lower_expr(&u.operand);
                match u.op {
                    UnaryOp::Not => {
                        let operand = self.to_bool(operand);
                        self.builder.emit_logical_not(operand)
                    }
                    UnaryOp::BitNot => self.builder.emit_not(operand),
                    UnaryOp::Neg => {
                        let zero = self.builder.emit_const(operand.ty, 0);
                        self.builder.emit_binary(BinOp::Sub, zero, operand)
                    }
                }
            }
            Expr::Binary(b) => self.lower_binary(b),
            Expr::Ternary(t) => {
                let cond = self.lower_condition(&t.cond);
                let then_block = self.builder.create_block(Some("tern_then"));
                let else_block = self.builder.create_block(Some("tern_else"));
                let merge = self.builder.create_block(Some("tern_end"));
                self.builder.emit_branch(cond, then_block, else_block);

                let result_ty = self.expr_il_type(expr);
                self.builder.set_current_block(then_block);
                let then_value = self.lower_expr(&t.then_expr);
                let then_value = self.coerce(then_value, result_ty);
                let then_end = self.builder.current_block();
                self.builder.emit_jump(merge);

                self.builder.set_current_block(else_block);
                let else_value = self.lower_expr(&t.else_expr);
                let else_value = self.coerce(else_value, result_ty);
                let else_end = self.builder.current_block();
                self.builder.emit_jump(merge);

                self.builder.set_current_block(merge);
                self.builder.emit_phi(
                    result_ty,
                    vec![(then_value, then_end), (else_value, else_end)],
                )
            }
            Expr::Call(call) => self.lower_call(call),
            Expr::Index(index) => self.lower_index_read(index),
            Expr::Member(member) => {
                let ty = self.expr_il_type(expr);
                let value = self
                    .check
                    .type_of(member.id)
                    .and_then(|t| t.enum_member(&member.member))
                    .unwrap_or(0);
                self.builder.emit_const(ty, value)
            }
            Expr::Assign(assign) => self.lower_assign(assign),
            Expr::AddrOf(addr) => match &*addr.operand {
                Expr::Ident(_) => {
                    let name = self.operand_storage_name(&addr.operand);
                    self.builder.emit_load_address(&name)
                }
                Expr::Index(index) => {
                    let name = self.operand_storage_name(&index.target);
                    let base = self.builder.emit_load_address(&name);
                    let idx = self.lower_expr(&index.index);
                    let idx = self.coerce(idx, IlType::Word);
                    self.builder.emit_binary(BinOp::Add, base, idx)
                }
                _ => self.builder.emit_undef(IlType::Pointer),
            },
        }
    }

    fn lower_binary(&mut self, b: &crate::ast::BinaryExpr) -> VirtualRegister {
        if b.op.is_logical() {
            return self.lower_short_circuit(b);
        }
        let lhs = self.lower_expr(&b.lhs);
        let rhs = self.lower_expr(&b.rhs);
        let (lhs, rhs) = self.widen_pair(lhs, rhs);
        match b.op {
            BinaryOp::Eq => self.builder.emit_compare(CmpOp::Eq, lhs, rhs),
            BinaryOp::Ne => self.builder.emit_compare(CmpOp::Ne, lhs, rhs),
            BinaryOp::Lt => self.builder.emit_compare(CmpOp::Lt, lhs, rhs),
            BinaryOp::Le => self.builder.emit_compare(CmpOp::Le, lhs, rhs),
            BinaryOp::Gt => self.builder.emit_compare(CmpOp::Gt, lhs, rhs),
            BinaryOp::Ge => self.builder.emit_compare(CmpOp::Ge, lhs, rhs),
            BinaryOp::Add => self.builder.emit_binary(BinOp::Add, lhs, rhs),
            BinaryOp::Sub => self.builder.emit_binary(BinOp::Sub, lhs, rhs),
            BinaryOp::Mul => self.builder.emit_binary(BinOp::Mul, lhs, rhs),
            BinaryOp::Div => self.builder.emit_binary(BinOp::Div, lhs, rhs),
            BinaryOp::Mod => self.builder.emit_binary(BinOp::Mod, lhs, rhs),
            BinaryOp::BitAnd => self.builder.emit_binary(BinOp::And, lhs, rhs),
            BinaryOp::BitOr => self.builder.emit_binary(BinOp::Or, lhs, rhs),
            BinaryOp::BitXor => self.builder.emit_binary(BinOp::Xor, lhs, rhs),
            BinaryOp::Shl => self.builder.emit_binary(BinOp::Shl, lhs, rhs),
            BinaryOp::Shr => self.builder.emit_binary(BinOp::Shr, lhs, rhs),
            BinaryOp::And | BinaryOp::Or => unreachable!("handled as short-circuit"),
        }
    }

    /// `a && b` / `a || b` evaluate `b` only when needed; the merged
    /// result arrives through a phi.
    fn lower_short_circuit(&mut self, b: &crate::ast::BinaryExpr) -> VirtualRegister {
        let lhs = self.lower_expr(&b.lhs);
        let lhs = self.to_bool(lhs);

        let rhs_block = self.builder.create_block(Some("sc_rhs"));
        let short_block = self.builder.create_block(Some("sc_short"));
        let merge = self.builder.create_block(Some("sc_end"));

        if b.op == BinaryOp::And {
            self.builder.emit_branch(lhs, rhs_block, short_block);
        } else {
            self.builder.emit_branch(lhs, short_block, rhs_block);
        }

        self.builder.set_current_block(short_block);
        let short_value = self
            .builder
            .emit_const(IlType::Bool, u32::from(b.op == BinaryOp::Or));
        self.builder.emit_jump(merge);

        self.builder.set_current_block(rhs_block);
        let rhs = self.lower_expr(&b.rhs);
        let rhs = self.to_bool(rhs);
        let rhs_end = self.builder.current_block();
        self.builder.emit_jump(merge);

        self.builder.set_current_block(merge);
        self.builder.emit_phi(
            IlType::Bool,
            vec![(short_value, short_block), (rhs, rhs_end)],
        )
    }

    fn lower_call(&mut self, call: &crate::ast::CallExpr) -> VirtualRegister {
        let Some(name) = call.callee.as_ident().map(|n| n.to_string()) else {
            return self.builder.emit_undef(IlType::Byte);
        };

        if let Some(def) = intrinsics::lookup(&name) {
            return self.lower_intrinsic(def.kind, call);
        }

        let (param_types, return_type) = match self
            .table
            .lookup_local(self.table.module_scope, &name)
            .and_then(|s| s.ty.clone())
        {
            Some(ty) => match ty.canonical() {
                TypeInfo::Function {
                    params,
                    return_type,
                    ..
                } => (
                    params.iter().map(il_type_of).collect::<Vec<_>>(),
                    il_type_of(return_type),
                ),
                _ => (Vec::new(), IlType::Byte),
            },
            None => (Vec::new(), IlType::Byte),
        };

        let mut args = Vec::new();
        for (i, arg) in call.args.iter().enumerate() {
            let reg = self.lower_expr(arg);
            let reg = match param_types.get(i) {
                Some(ty) => self.coerce(reg, *ty),
                None => reg,
            };
            args.push(reg);
        }

        match self.builder.emit_call(&name, args, return_type) {
            Some(result) => result,
            None => self.void_value(),
        }
    }

    fn lower_intrinsic(&mut self, kind: IntrinsicKind, call: &crate::ast::CallExpr) -> VirtualRegister {
        let mut arg = |lowerer: &mut Self, i: usize, ty: IlType| -> VirtualRegister {
            match call.args.get(i) {
                Some(expr) => {
                    let reg = lowerer.lower_expr(expr);
                    lowerer.coerce(reg, ty)
                }
                None => lowerer.builder.emit_undef(ty),
            }
        };
        match kind {
            IntrinsicKind::Peek => {
                let addr = arg(self, 0, IlType::Word);
                self.builder.emit_peek(addr)
            }
            IntrinsicKind::Poke => {
                let addr = arg(self, 0, IlType::Word);
                let value = arg(self, 1, IlType::Byte);
                self.builder.emit_poke(addr, value);
                self.void_value()
            }
            IntrinsicKind::PeekW => {
                let addr = arg(self, 0, IlType::Word);
                self.builder.emit_peekw(addr)
            }
            IntrinsicKind::PokeW => {
                let addr = arg(self, 0, IlType::Word);
                let value = arg(self, 1, IlType::Word);
                self.builder.emit_pokew(addr, value);
                self.void_value()
            }
            IntrinsicKind::Length => {
                let name = call
                    .args
                    .first()
                    .map(|a| self.operand_storage_name(a))
                    .unwrap_or_default();
                self.builder.emit_length(&name)
            }
            IntrinsicKind::Lo => {
                let value = arg(self, 0, IlType::Word);
                self.builder.emit_lo(value)
            }
            IntrinsicKind::Hi => {
                let value = arg(self, 0, IlType::Word);
                self.builder.emit_hi(value)
            }
            IntrinsicKind::Sei => self.cpu(CpuOp::Sei),
            IntrinsicKind::Cli => self.cpu(CpuOp::Cli),
            IntrinsicKind::Nop => self.cpu(CpuOp::Nop),
            IntrinsicKind::Brk => self.cpu(CpuOp::Brk),
            IntrinsicKind::Pha => self.cpu(CpuOp::Pha),
            IntrinsicKind::Pla => self.cpu(CpuOp::Pla),
            IntrinsicKind::Php => self.cpu(CpuOp::Php),
            IntrinsicKind::Plp => self.cpu(CpuOp::Plp),
            IntrinsicKind::Barrier => {
                self.builder.emit_opt_barrier();
                self.void_value()
            }
            IntrinsicKind::VolatileRead => {
                let addr = arg(self, 0, IlType::Word);
                self.builder.emit_volatile_read(addr)
            }
            IntrinsicKind::VolatileWrite => {
                let addr = arg(self, 0, IlType::Word);
                let value = arg(self, 1, IlType::Byte);
                self.builder.emit_volatile_write(addr, value);
                self.void_value()
            }
        }
    }

    fn cpu(&mut self, op: CpuOp) -> VirtualRegister {
        self.builder.emit_cpu(op);
        self.void_value()
    }

    /// Register standing in for "no value"; never defined by an
    /// instruction, only returned so expression lowering stays total.
    fn void_value(&mut self) -> VirtualRegister {
        self.builder.create_register(IlType::Void, None)
    }

    fn symbol_of(&self, expr: &Rc<Expr>) -> Option<&Symbol> {
        self.check
            .symbol_of(expr.id())
            .map(|id| self.table.symbol(id))
    }

    fn operand_storage_name(&self, expr: &Rc<Expr>) -> String {
        match self.symbol_of(expr) {
            Some(symbol) => self.storage_name(symbol),
            None => expr.as_ident().unwrap_or("").to_string(),
        }
    }

    fn lower_ident_read(&mut self, expr: &Rc<Expr>) -> VirtualRegister {
        let Some(symbol) = self.symbol_of(expr).cloned() else {
            return self.builder.emit_undef(IlType::Byte);
        };
        let ty = symbol
            .ty
            .as_ref()
            .map(il_type_of)
            .unwrap_or(IlType::Byte);
        match symbol.kind {
            SymbolKind::EnumMember => {
                let value = symbol.enum_value.unwrap_or(0);
                self.builder.emit_const(ty, value)
            }
            _ => {
                if let Some(address) = symbol.map_address {
                    let info = MapInfo {
                        map: symbol.name.clone(),
                        field: None,
                        base_address: address,
                    };
                    self.builder.emit_hardware_read(address, ty, Some(info))
                } else {
                    let name = self.storage_name(&symbol);
                    self.builder.emit_load_var(&name, ty)
                }
            }
        }
    }

    fn lower_index_read(&mut self, index: &crate::ast::IndexExpr) -> VirtualRegister {
        let element_ty = self
            .check
            .type_of(index.id)
            .map(il_type_of)
            .unwrap_or(IlType::Byte);
        let idx = self.lower_expr(&index.index);
        let idx = self.coerce(idx, IlType::Word);
        match self.symbol_of(&index.target).cloned() {
            Some(symbol) => match symbol.map_address {
                Some(base) => self
                    .builder
                    .emit_map_load_range(&symbol.name, base, idx, element_ty),
                None => {
                    let name = self.storage_name(&symbol);
                    self.builder.emit_load_elem(&name, idx, element_ty)
                }
            },
            None => self.builder.emit_undef(element_ty),
        }
    }

    fn lower_assign(&mut self, assign: &crate::ast::AssignExpr) -> VirtualRegister {
        match &*assign.target {
            Expr::Ident(_) => {
                let Some(symbol) = self.symbol_of(&assign.target).cloned() else {
                    return self.builder.emit_undef(IlType::Byte);
                };
                let target_ty = symbol
                    .ty
                    .as_ref()
                    .map(il_type_of)
                    .unwrap_or(IlType::Byte);

                let value = match assign.op.binary_op() {
                    Some(op) => {
                        let current = self.read_symbol(&symbol, target_ty);
                        let rhs = self.lower_expr(&assign.value);
                        let (current, rhs) = self.widen_pair(current, rhs);
                        let combined = self.builder.emit_binary(ast_binop(op), current, rhs);
                        self.coerce(combined, target_ty)
                    }
                    None => {
                        let value = self.lower_expr(&assign.value);
                        self.coerce(value, target_ty)
                    }
                };
                self.store_symbol(&symbol, value.clone(), None);
                value
            }
            Expr::Index(index) => {
                let element_ty = self
                    .check
                    .type_of(index.id)
                    .map(il_type_of)
                    .unwrap_or(IlType::Byte);
                let Some(symbol) = self.symbol_of(&index.target).cloned() else {
                    return self.builder.emit_undef(element_ty);
                };
                let idx = self.lower_expr(&index.index);
                let idx = self.coerce(idx, IlType::Word);

                let value = match assign.op.binary_op() {
                    Some(op) => {
                        let current = match symbol.map_address {
                            Some(base) => self.builder.emit_map_load_range(
                                &symbol.name,
                                base,
                                idx.clone(),
                                element_ty,
                            ),
                            None => {
                                let name = self.storage_name(&symbol);
                                self.builder.emit_load_elem(&name, idx.clone(), element_ty)
                            }
                        };
                        let rhs = self.lower_expr(&assign.value);
                        let (current, rhs) = self.widen_pair(current, rhs);
                        let combined = self.builder.emit_binary(ast_binop(op), current, rhs);
                        self.coerce(combined, element_ty)
                    }
                    None => {
                        let value = self.lower_expr(&assign.value);
                        self.coerce(value, element_ty)
                    }
                };

                match symbol.map_address {
                    Some(base) => self.builder.emit_map_store_range(
                        &symbol.name,
                        base,
                        idx,
                        value.clone(),
                    ),
                    None => {
                        let name = self.storage_name(&symbol);
                        self.builder.emit_store_elem(&name, idx, value.clone());
                    }
                }
                value
            }
            _ => self.builder.emit_undef(IlType::Byte),
        }
    }

    fn read_symbol(&mut self, symbol: &Symbol, ty: IlType) -> VirtualRegister {
        match symbol.map_address {
            Some(address) => {
                let info = MapInfo {
                    map: symbol.name.clone(),
                    field: None,
                    base_address: address,
                };
                self.builder.emit_hardware_read(address, ty, Some(info))
            }
            None => {
                let name = self.storage_name(symbol);
                self.builder.emit_load_var(&name, ty)
            }
        }
    }

    fn store_symbol(&mut self, symbol: &Symbol, value: VirtualRegister, _ty: Option<IlType>) {
        match symbol.map_address {
            Some(address) => {
                let info = MapInfo {
                    map: symbol.name.clone(),
                    field: None,
                    base_address: address,
                };
                self.builder.emit_hardware_write(address, value, Some(info));
            }
            None => {
                let name = self.storage_name(symbol);
                self.builder.emit_store_var(&name, value);
            }
        }
    }

    // ------------------------------------------------------------------
    // Coercions
    // ------------------------------------------------------------------

    /// The coercion table: byte widens with `zero_extend`, explicit
    /// narrowing truncates, bool and byte share a layout.
    fn coerce(&mut self, reg: VirtualRegister, target: IlType) -> VirtualRegister {
        if reg.ty == target {
            return reg;
        }
        match (reg.ty, target) {
            // Same 1-byte layout, no code needed
            (IlType::Bool, IlType::Byte) | (IlType::Byte, IlType::Bool) => reg,
            // Same 2-byte layout
            (IlType::Word, IlType::Pointer) | (IlType::Pointer, IlType::Word) => reg,
            (IlType::Byte | IlType::Bool, IlType::Word | IlType::Pointer) => {
                self.builder.emit_zero_extend(reg)
            }
            (IlType::Word | IlType::Pointer, IlType::Byte | IlType::Bool) => {
                self.builder.emit_truncate(reg)
            }
            _ => reg,
        }
    }

    /// Widen a mixed byte/word pair so a binary operator sees one width.
    fn widen_pair(
        &mut self,
        lhs: VirtualRegister,
        rhs: VirtualRegister,
    ) -> (VirtualRegister, VirtualRegister) {
        let wide = lhs.ty.size().max(rhs.ty.size()) > 1;
        if !wide {
            return (lhs, rhs);
        }
        let lhs = self.coerce(lhs, IlType::Word);
        let rhs = self.coerce(rhs, IlType::Word);
        (lhs, rhs)
    }

    /// Conditions want a bool register; numerics test against zero.
    fn to_bool(&mut self, reg: VirtualRegister) -> VirtualRegister {
        if reg.ty == IlType::Bool {
            return reg;
        }
        let zero = self.builder.emit_const(reg.ty, 0);
        self.builder.emit_compare(CmpOp::Ne, reg, zero)
    }

    fn lower_condition(&mut self, cond: &Rc<Expr>) -> VirtualRegister {
        let reg = self.lower_expr(cond);
        self.to_bool(reg)
    }

    fn intern_string(&mut self, text: &str) -> String {
        if let Some((label, _)) = self.strings.iter().find(|(_, t)| t == text) {
            return label.clone();
        }
        let label = format!("str_{}", self.strings.len());
        self.strings.push((label.clone(), text.to_string()));
        label
    }
}

fn ast_binop(op: BinaryOp) -> BinOp {
    match op {
        BinaryOp::Add => BinOp::Add,
        BinaryOp::Sub => BinOp::Sub,
        BinaryOp::Mul => BinOp::Mul,
        BinaryOp::Div => BinOp::Div,
        BinaryOp::Mod => BinOp::Mod,
        BinaryOp::BitAnd => BinOp::And,
        BinaryOp::BitOr => BinOp::Or,
        BinaryOp::BitXor => BinOp::Xor,
        BinaryOp::Shl => BinOp::Shl,
        BinaryOp::Shr => BinOp::Shr,
        _ => unreachable!("not an arithmetic operator"),
    }
}
