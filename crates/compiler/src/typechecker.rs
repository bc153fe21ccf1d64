//! Type checking (pass 3)
//!
//! Computes the type of every expression, records it in a per-node map for
//! IL construction, and reports mismatches. Numeric literals infer the
//! smallest fitting unsigned type (0-255 byte, 256-65535 word); `byte`
//! widens to `word` implicitly; narrowing is always an error. Logical
//! operators accept numeric operands and coerce non-zero to true.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{
    AssignOp, BinaryOp, Decl, Expr, ForStmt, NodeId, Program, Stmt, UnaryOp, VarDecl,
};
use crate::diagnostics::{DiagnosticCode, Diagnostics};
use crate::intrinsics;
use crate::source::SourceSpan;
use crate::symbols::{ScopeId, SymbolId, SymbolKind, SymbolTable};
use crate::typeres::TypeResolver;
use crate::types::TypeInfo;

/// Knobs for the checking pass.
#[derive(Debug, Clone)]
pub struct TypeCheckOptions {
    /// Abort the walk after the first error this pass emits.
    pub stop_on_first_error: bool,
    /// Emit warnings in addition to errors.
    pub report_warnings: bool,
}

impl Default for TypeCheckOptions {
    fn default() -> Self {
        TypeCheckOptions {
            stop_on_first_error: false,
            report_warnings: true,
        }
    }
}

/// Output of the checking pass, consumed by CFG construction, the
/// analyzers and IL lowering.
#[derive(Debug, Default)]
pub struct CheckResult {
    /// Type of every expression node.
    pub expr_types: HashMap<NodeId, TypeInfo>,
    /// Resolved symbol for every identifier expression.
    pub expr_symbols: HashMap<NodeId, SymbolId>,
}

impl CheckResult {
    pub fn type_of(&self, id: NodeId) -> Option<&TypeInfo> {
        self.expr_types.get(&id)
    }

    pub fn symbol_of(&self, id: NodeId) -> Option<SymbolId> {
        self.expr_symbols.get(&id).copied()
    }
}

pub struct TypeChecker<'a> {
    table: &'a SymbolTable,
    resolver: &'a TypeResolver,
    diagnostics: &'a mut Diagnostics,
    options: TypeCheckOptions,
    result: CheckResult,
    scope_stack: Vec<ScopeId>,
    return_stack: Vec<TypeInfo>,
    initial_errors: usize,
}

impl<'a> TypeChecker<'a> {
    pub fn new(
        table: &'a SymbolTable,
        resolver: &'a TypeResolver,
        diagnostics: &'a mut Diagnostics,
        options: TypeCheckOptions,
    ) -> Self {
        let initial_errors = diagnostics.error_count();
        TypeChecker {
            table,
            resolver,
            diagnostics,
            options,
            result: CheckResult::default(),
            scope_stack: Vec::new(),
            return_stack: Vec::new(),
            initial_errors,
        }
    }

    pub fn check_program(mut self, program: &Program) -> CheckResult {
        self.scope_stack.push(self.table.module_scope);
        for decl in &program.decls {
            if self.halted() {
                break;
            }
            self.check_decl(decl);
        }
        self.scope_stack.pop();
        self.result
    }

    fn halted(&self) -> bool {
        (self.options.stop_on_first_error && self.diagnostics.error_count() > self.initial_errors)
            || self.diagnostics.at_error_limit()
    }

    fn scope(&self) -> ScopeId {
        *self.scope_stack.last().expect("scope stack never empty")
    }

    fn error(&mut self, code: DiagnosticCode, message: String, span: SourceSpan) {
        self.diagnostics.error(code, message, span);
    }

    // ------------------------------------------------------------------
    // Declarations and statements
    // ------------------------------------------------------------------

    fn check_decl(&mut self, decl: &Rc<Decl>) {
        match &**decl {
            Decl::Variable(var) => self.check_var_decl(var),
            Decl::Function(func) => {
                let Some(body) = &func.body else {
                    return;
                };
                let Some(scope) = self.table.scope_of_node(func.id) else {
                    return;
                };
                let return_type = self
                    .table
                    .lookup_local(self.table.module_scope, &func.name)
                    .and_then(|s| s.ty.as_ref())
                    .and_then(|t| match t.canonical() {
                        TypeInfo::Function { return_type, .. } => Some((**return_type).clone()),
                        _ => None,
                    })
                    .unwrap_or(TypeInfo::Void);
                self.scope_stack.push(scope);
                self.return_stack.push(return_type);
                self.check_stmt(body);
                self.return_stack.pop();
                self.scope_stack.pop();
            }
            Decl::TypeAlias(_) | Decl::Enum(_) | Decl::Import(_) => {}
        }
    }

    fn declared_type(&self, var: &VarDecl) -> TypeInfo {
        self.table
            .lookup_local(self.scope(), &var.name)
            .filter(|s| s.decl == Some(var.id))
            .and_then(|s| s.ty.clone())
            .unwrap_or(TypeInfo::Byte)
    }

    fn check_var_decl(&mut self, var: &VarDecl) {
        let declared = self.declared_type(var);
        if let Some(init) = &var.init {
            let actual = self.check_expr(init);
            self.check_assignment(&declared, &actual, init, "initializer");
        }
    }

    fn check_stmt(&mut self, stmt: &Rc<Stmt>) {
        if self.halted() {
            return;
        }
        match &**stmt {
            Stmt::Block(block) => {
                let scope = self
                    .table
                    .scope_of_node(block.id)
                    .unwrap_or_else(|| self.scope());
                self.scope_stack.push(scope);
                for child in &block.stmts {
                    self.check_stmt(child);
                }
                self.scope_stack.pop();
            }
            Stmt::Var(var) => self.check_var_decl(var),
            Stmt::Expr(s) => {
                // A bare call may be void; any other void value is caught
                // at its use site
                self.check_expr(&s.expr);
            }
            Stmt::Return(s) => self.check_return(s.value.as_ref(), s.span),
            Stmt::If(s) => {
                self.check_condition(&s.cond);
                self.check_stmt(&s.then_branch);
                if let Some(else_branch) = &s.else_branch {
                    self.check_stmt(else_branch);
                }
            }
            Stmt::While(s) => {
                self.check_condition(&s.cond);
                self.in_loop_scope(s.id, |checker| checker.check_stmt(&s.body));
            }
            Stmt::DoWhile(s) => {
                self.in_loop_scope(s.id, |checker| checker.check_stmt(&s.body));
                self.check_condition(&s.cond);
            }
            Stmt::For(s) => self.check_for(s),
            Stmt::Switch(s) => self.check_switch_like(&s.scrutinee, &s.arms),
            Stmt::Match(s) => self.check_switch_like(&s.scrutinee, &s.arms),
            Stmt::Break(_) | Stmt::Continue(_) => {}
        }
    }

    fn in_loop_scope(&mut self, node: NodeId, f: impl FnOnce(&mut Self)) {
        let scope = self
            .table
            .scope_of_node(node)
            .unwrap_or_else(|| self.scope());
        self.scope_stack.push(scope);
        f(self);
        self.scope_stack.pop();
    }

    fn check_return(&mut self, value: Option<&Rc<Expr>>, span: SourceSpan) {
        let expected = self
            .return_stack
            .last()
            .cloned()
            .unwrap_or(TypeInfo::Void);
        match value {
            Some(expr) => {
                let actual = self.check_expr(expr);
                if expected.canonical() == &TypeInfo::Void {
                    self.error(
                        DiagnosticCode::TypeMismatch,
                        "Cannot return a value from a void function".to_string(),
                        expr.span(),
                    );
                } else {
                    self.check_assignment(&expected, &actual, expr, "return value");
                }
            }
            None => {
                if expected.canonical() != &TypeInfo::Void {
                    self.error(
                        DiagnosticCode::TypeMismatch,
                        format!("Expected a return value of type {expected}"),
                        span,
                    );
                }
            }
        }
    }

    fn check_for(&mut self, s: &ForStmt) {
        let scope = self
            .table
            .scope_of_node(s.id)
            .unwrap_or_else(|| self.scope());
        self.scope_stack.push(scope);

        let counter_type = self
            .table
            .lookup_local(scope, &s.counter)
            .and_then(|sym| sym.ty.clone())
            .unwrap_or(TypeInfo::Byte);

        let start = self.check_expr(&s.start);
        self.check_assignment(&counter_type, &start, &s.start, "loop start");
        let end = self.check_expr(&s.end);
        self.check_assignment(&counter_type, &end, &s.end, "loop bound");
        if let Some(step) = &s.step {
            let step_ty = self.check_expr(step);
            self.check_assignment(&counter_type, &step_ty, step, "loop step");
        }

        self.check_stmt(&s.body);
        self.scope_stack.pop();
    }

    fn check_switch_like(&mut self, scrutinee: &Rc<Expr>, arms: &[crate::ast::CaseArm]) {
        let scrutinee_type = self.check_expr(scrutinee);
        let comparable = scrutinee_type.is_numeric()
            || matches!(
                scrutinee_type.canonical(),
                TypeInfo::Enum { .. } | TypeInfo::Bool
            );
        if !comparable {
            self.error(
                DiagnosticCode::TypeMismatch,
                format!("Cannot switch on a value of type {scrutinee_type}"),
                scrutinee.span(),
            );
        }
        for arm in arms {
            if let Some(value) = &arm.value {
                let value_type = self.check_expr(value);
                if comparable && TypeInfo::common_type(&scrutinee_type, &value_type).is_none() {
                    self.error(
                        DiagnosticCode::TypeMismatch,
                        format!(
                            "Case value of type {value_type} does not match scrutinee type {scrutinee_type}"
                        ),
                        value.span(),
                    );
                }
            }
            for stmt in &arm.body {
                self.check_stmt(stmt);
            }
        }
    }

    /// Conditions accept `bool` and, by documented looseness, any numeric
    /// value (non-zero is true). Everything else is an error.
    fn check_condition(&mut self, cond: &Rc<Expr>) {
        let ty = self.check_expr(cond);
        if !self.bool_coercible(&ty) {
            self.error(
                DiagnosticCode::TypeMismatch,
                format!("Condition must be bool or numeric, found {ty}"),
                cond.span(),
            );
        }
    }

    fn bool_coercible(&self, ty: &TypeInfo) -> bool {
        matches!(
            ty.canonical(),
            TypeInfo::Bool | TypeInfo::Byte | TypeInfo::Word | TypeInfo::Enum { .. }
        )
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn record(&mut self, id: NodeId, ty: TypeInfo) -> TypeInfo {
        self.result.expr_types.insert(id, ty.clone());
        ty
    }

    pub(crate) fn check_expr(&mut self, expr: &Rc<Expr>) -> TypeInfo {
        let ty = self.infer_expr(expr);
        self.record(expr.id(), ty)
    }

    fn infer_expr(&mut self, expr: &Rc<Expr>) -> TypeInfo {
        match &**expr {
            Expr::Number(n) => {
                if n.value <= 0xFF {
                    TypeInfo::Byte
                } else if n.value <= 0xFFFF {
                    TypeInfo::Word
                } else {
                    self.error(
                        DiagnosticCode::LiteralOutOfRange,
                        format!("Literal {} does not fit in 16 bits", n.lexeme),
                        n.span,
                    );
                    TypeInfo::Word
                }
            }
            Expr::Str(_) => TypeInfo::Str,
            Expr::Bool(_) => TypeInfo::Bool,
            Expr::Char(_) => TypeInfo::Byte,
            Expr::Array(array) => self.infer_array_literal(array),
            Expr::Ident(ident) => {
                match self.table.lookup_from(self.scope(), &ident.name) {
                    Some(symbol) => {
                        self.result.expr_symbols.insert(ident.id, symbol.id);
                        symbol.ty.clone().unwrap_or(TypeInfo::Byte)
                    }
                    None => {
                        self.error(
                            DiagnosticCode::UnknownSymbol,
                            format!("Unknown identifier '{}'", ident.name),
                            ident.span,
                        );
                        TypeInfo::Byte
                    }
                }
            }
            Expr::Unary(u) => {
                let operand = self.check_expr(&u.operand);
                self.expect_value(&operand, u.operand.span());
                match u.op {
                    UnaryOp::Not => {
                        if !self.bool_coercible(&operand) {
                            self.error(
                                DiagnosticCode::TypeMismatch,
                                format!("Operator '!' expects bool or numeric, found {operand}"),
                                u.operand.span(),
                            );
                        }
                        TypeInfo::Bool
                    }
                    UnaryOp::Neg | UnaryOp::BitNot => {
                        if !operand.is_numeric() && operand.canonical() != &TypeInfo::Bool {
                            self.error(
                                DiagnosticCode::TypeMismatch,
                                format!(
                                    "Operator '{}' expects a numeric operand, found {operand}",
                                    u.op.as_str()
                                ),
                                u.operand.span(),
                            );
                            return TypeInfo::Byte;
                        }
                        widen_bool(&operand)
                    }
                }
            }
            Expr::Binary(b) => self.infer_binary(b),
            Expr::Ternary(t) => {
                self.check_condition(&t.cond);
                let then_ty = self.check_expr(&t.then_expr);
                let else_ty = self.check_expr(&t.else_expr);
                match TypeInfo::common_type(&then_ty, &else_ty) {
                    Some(common) => common,
                    None => {
                        self.error(
                            DiagnosticCode::TypeMismatch,
                            format!(
                                "Ternary branches have incompatible types {then_ty} and {else_ty}"
                            ),
                            t.else_expr.span(),
                        );
                        then_ty
                    }
                }
            }
            Expr::Call(call) => self.infer_call(call),
            Expr::Index(index) => {
                let target = self.check_expr(&index.target);
                let index_ty = self.check_expr(&index.index);
                if !index_ty.is_numeric() && index_ty.canonical() != &TypeInfo::Bool {
                    self.error(
                        DiagnosticCode::TypeMismatch,
                        format!("Array index must be numeric, found {index_ty}"),
                        index.index.span(),
                    );
                }
                match target.element_type() {
                    Some(element) => element.clone(),
                    None => {
                        self.error(
                            DiagnosticCode::NotIndexable,
                            format!("Cannot index a value of type {target}"),
                            index.target.span(),
                        );
                        TypeInfo::Byte
                    }
                }
            }
            Expr::Member(member) => self.infer_member(member),
            Expr::Assign(assign) => self.infer_assign(assign),
            Expr::AddrOf(addr) => {
                // The operand must be a named location; its address is a word
                match &*addr.operand {
                    Expr::Ident(_) | Expr::Index(_) => {
                        self.check_expr(&addr.operand);
                        TypeInfo::Word
                    }
                    _ => {
                        self.error(
                            DiagnosticCode::NotAssignable,
                            "'@' requires a variable or array element".to_string(),
                            addr.operand.span(),
                        );
                        TypeInfo::Word
                    }
                }
            }
        }
    }

    fn infer_array_literal(&mut self, array: &crate::ast::ArrayLit) -> TypeInfo {
        if array.elements.is_empty() {
            self.error(
                DiagnosticCode::EmptyArrayLiteral,
                "Array literal must have at least one element".to_string(),
                array.span,
            );
            return TypeInfo::array(TypeInfo::Byte, None);
        }
        let mut element_type = self.check_expr(&array.elements[0]);
        for element in &array.elements[1..] {
            let ty = self.check_expr(element);
            match TypeInfo::common_type(&element_type, &ty) {
                Some(common) => element_type = common,
                None => {
                    self.error(
                        DiagnosticCode::MixedArrayLiteral,
                        format!(
                            "Array literal mixes incompatible element types {element_type} and {ty}"
                        ),
                        element.span(),
                    );
                    break;
                }
            }
        }
        TypeInfo::array(widen_bool(&element_type), Some(array.elements.len() as u32))
    }

    fn infer_binary(&mut self, b: &crate::ast::BinaryExpr) -> TypeInfo {
        let lhs = self.check_expr(&b.lhs);
        let rhs = self.check_expr(&b.rhs);
        self.expect_value(&lhs, b.lhs.span());
        self.expect_value(&rhs, b.rhs.span());

        if b.op.is_logical() {
            for (ty, span) in [(&lhs, b.lhs.span()), (&rhs, b.rhs.span())] {
                if !self.bool_coercible(ty) {
                    self.error(
                        DiagnosticCode::TypeMismatch,
                        format!(
                            "Operator '{}' expects bool or numeric operands, found {ty}",
                            b.op.as_str()
                        ),
                        span,
                    );
                }
            }
            return TypeInfo::Bool;
        }

        if b.op.is_comparison() {
            if TypeInfo::common_type(&lhs, &rhs).is_none() {
                self.error(
                    DiagnosticCode::TypeMismatch,
                    format!(
                        "Cannot compare values of types {lhs} and {rhs}"
                    ),
                    b.rhs.span(),
                );
            }
            return TypeInfo::Bool;
        }

        // Arithmetic, bitwise and shift operators
        for (ty, span) in [(&lhs, b.lhs.span()), (&rhs, b.rhs.span())] {
            if !ty.is_numeric() && ty.canonical() != &TypeInfo::Bool {
                self.error(
                    DiagnosticCode::TypeMismatch,
                    format!(
                        "Operator '{}' expects numeric operands, found {ty}",
                        b.op.as_str()
                    ),
                    span,
                );
                return TypeInfo::Byte;
            }
        }

        if matches!(b.op, BinaryOp::Div | BinaryOp::Mod) {
            if let Expr::Number(n) = &*b.rhs {
                if n.value == 0 {
                    self.error(
                        DiagnosticCode::DivisionByZero,
                        "Division by constant zero".to_string(),
                        b.rhs.span(),
                    );
                }
            }
        }

        TypeInfo::common_type(&lhs, &rhs).unwrap_or(TypeInfo::Byte)
    }

    fn infer_member(&mut self, member: &crate::ast::MemberExpr) -> TypeInfo {
        // Member access is limited to enum-qualified names: `Direction.UP`
        if let Expr::Ident(target) = &*member.target {
            if let Some(info) = self.resolver.named_type(&target.name) {
                if matches!(info.canonical(), TypeInfo::Enum { .. }) {
                    if info.enum_member(&member.member).is_none() {
                        self.error(
                            DiagnosticCode::UnknownSymbol,
                            format!("Enum '{}' has no member '{}'", target.name, member.member),
                            member.member_span,
                        );
                    }
                    return info.clone();
                }
            }
        }
        self.error(
            DiagnosticCode::TypeMismatch,
            "Member access is only valid on enum types".to_string(),
            member.span,
        );
        TypeInfo::Byte
    }

    fn infer_call(&mut self, call: &crate::ast::CallExpr) -> TypeInfo {
        let Expr::Ident(callee) = &*call.callee else {
            self.error(
                DiagnosticCode::NotCallable,
                "Only named functions can be called".to_string(),
                call.callee.span(),
            );
            for arg in &call.args {
                self.check_expr(arg);
            }
            return TypeInfo::Byte;
        };

        // `length` accepts any array and is typed specially
        if let Some(def) = intrinsics::lookup(&callee.name) {
            if def.takes_any_array() {
                return self.infer_length_call(call);
            }
        }

        let Some(symbol) = self.table.lookup_from(self.scope(), &callee.name) else {
            self.error(
                DiagnosticCode::UnknownSymbol,
                format!("Unknown function '{}'", callee.name),
                callee.span,
            );
            for arg in &call.args {
                self.check_expr(arg);
            }
            return TypeInfo::Byte;
        };
        self.result.expr_symbols.insert(callee.id, symbol.id);

        let symbol_type = symbol.ty.clone();
        let Some(TypeInfo::Function {
            params,
            return_type,
            ..
        }) = symbol_type.as_ref().map(|t| t.canonical().clone())
        else {
            // Imported symbols without resolved signatures stay permissive
            if symbol.kind == SymbolKind::ImportedSymbol {
                for arg in &call.args {
                    self.check_expr(arg);
                }
                return TypeInfo::Byte;
            }
            self.error(
                DiagnosticCode::NotCallable,
                format!("'{}' is not a function", callee.name),
                callee.span,
            );
            for arg in &call.args {
                self.check_expr(arg);
            }
            return TypeInfo::Byte;
        };

        if call.args.len() != params.len() {
            self.error(
                DiagnosticCode::WrongArgumentCount,
                format!(
                    "'{}' expects {} argument(s) but got {}",
                    callee.name,
                    params.len(),
                    call.args.len()
                ),
                call.span,
            );
        }
        for (arg, param) in call.args.iter().zip(params.iter()) {
            let actual = self.check_expr(arg);
            self.check_assignment(param, &actual, arg, "argument");
        }
        // Arguments beyond the declared arity still get types recorded
        for arg in call.args.iter().skip(params.len()) {
            self.check_expr(arg);
        }

        (*return_type).clone()
    }

    fn infer_length_call(&mut self, call: &crate::ast::CallExpr) -> TypeInfo {
        if call.args.len() != 1 {
            self.error(
                DiagnosticCode::WrongArgumentCount,
                format!("'length' expects 1 argument but got {}", call.args.len()),
                call.span,
            );
        }
        if let Some(arg) = call.args.first() {
            let ty = self.check_expr(arg);
            if !ty.is_array() {
                self.error(
                    DiagnosticCode::TypeMismatch,
                    format!("'length' expects an array, found {ty}"),
                    arg.span(),
                );
            }
        }
        TypeInfo::Word
    }

    fn infer_assign(&mut self, assign: &crate::ast::AssignExpr) -> TypeInfo {
        let target_type = self.check_assign_target(&assign.target);
        let value_type = self.check_expr(&assign.value);

        if assign.op != AssignOp::Assign {
            // Compound assignment: LHS op RHS must be numeric, result
            // inherits the LHS type
            for (ty, span) in [
                (&target_type, assign.target.span()),
                (&value_type, assign.value.span()),
            ] {
                if !ty.is_numeric() && ty.canonical() != &TypeInfo::Bool {
                    self.error(
                        DiagnosticCode::TypeMismatch,
                        format!("Compound assignment expects numeric operands, found {ty}"),
                        span,
                    );
                    return target_type.clone();
                }
            }
            // RHS wider than the target narrows the result back: reject
            if !target_type.assignable_from(&value_type) {
                self.error(
                    DiagnosticCode::TypeMismatch,
                    format!(
                        "Cannot assign {value_type} to {target_type} without an explicit conversion"
                    ),
                    assign.value.span(),
                );
            }
        } else {
            self.check_assignment(&target_type, &value_type, &assign.value, "assignment");
        }
        target_type
    }

    /// Type of an assignment target, with lvalue validation.
    fn check_assign_target(&mut self, target: &Rc<Expr>) -> TypeInfo {
        match &**target {
            Expr::Ident(ident) => {
                let ty = self.check_expr(target);
                if let Some(symbol) = self.table.lookup_from(self.scope(), &ident.name) {
                    match symbol.kind {
                        SymbolKind::Constant => {
                            self.error(
                                DiagnosticCode::NotAssignable,
                                format!("Cannot assign to constant '{}'", ident.name),
                                ident.span,
                            );
                        }
                        SymbolKind::Function
                        | SymbolKind::EnumMember
                        | SymbolKind::Intrinsic => {
                            self.error(
                                DiagnosticCode::NotAssignable,
                                format!("'{}' is not assignable", ident.name),
                                ident.span,
                            );
                        }
                        _ => {}
                    }
                }
                ty
            }
            Expr::Index(_) => self.check_expr(target),
            _ => {
                let ty = self.check_expr(target);
                self.error(
                    DiagnosticCode::NotAssignable,
                    "Assignment target must be a variable or array element".to_string(),
                    target.span(),
                );
                ty
            }
        }
    }

    // ------------------------------------------------------------------
    // Shared checks
    // ------------------------------------------------------------------

    fn expect_value(&mut self, ty: &TypeInfo, span: SourceSpan) {
        if ty.canonical() == &TypeInfo::Void {
            self.error(
                DiagnosticCode::VoidValueUsed,
                "A void value cannot be used here".to_string(),
                span,
            );
        }
    }

    /// Check that `actual` can flow into a slot of type `expected`,
    /// with a sharper diagnostic for out-of-range literals.
    fn check_assignment(
        &mut self,
        expected: &TypeInfo,
        actual: &TypeInfo,
        value: &Rc<Expr>,
        context: &str,
    ) {
        self.expect_value(actual, value.span());
        if expected.assignable_from(actual) {
            return;
        }
        if let Expr::Number(n) = &**value {
            if expected.is_numeric() {
                let max = match expected.size() {
                    Some(1) => 0xFF,
                    _ => 0xFFFF,
                };
                if n.value > max {
                    self.error(
                        DiagnosticCode::LiteralOutOfRange,
                        format!(
                            "Literal {} does not fit in {expected} (max {max})",
                            n.lexeme
                        ),
                        n.span,
                    );
                    return;
                }
            }
        }
        self.error(
            DiagnosticCode::TypeMismatch,
            format!("Expected {expected} for {context} but found {actual}"),
            value.span(),
        );
    }
}

/// Bool operands widen to byte in arithmetic positions.
fn widen_bool(ty: &TypeInfo) -> TypeInfo {
    if ty.canonical() == &TypeInfo::Bool {
        TypeInfo::Byte
    } else {
        ty.canonical().clone()
    }
}

/// Convenience entry point for pass 3.
pub fn check_program(
    program: &Program,
    table: &SymbolTable,
    resolver: &TypeResolver,
    diagnostics: &mut Diagnostics,
    options: TypeCheckOptions,
) -> CheckResult {
    TypeChecker::new(table, resolver, diagnostics, options).check_program(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::symbols::build_symbol_table;
    use crate::typeres::TypeResolver;

    fn check(source: &str) -> (CheckResult, Diagnostics) {
        let mut diags = Diagnostics::new();
        let program = Parser::new(source, &mut diags).parse();
        let mut table = build_symbol_table(&program, &mut diags);
        let resolver = TypeResolver::run(&program, &mut table, &mut diags);
        let result = check_program(
            &program,
            &table,
            &resolver,
            &mut diags,
            TypeCheckOptions::default(),
        );
        (result, diags)
    }

    fn assert_clean(source: &str) {
        let (_, diags) = check(source);
        assert!(!diags.has_errors(), "unexpected errors: {:?}", diags.items());
    }

    fn first_error(source: &str) -> DiagnosticCode {
        let (_, diags) = check(source);
        assert!(diags.has_errors(), "expected errors, got none");
        diags
            .iter()
            .find(|d| d.severity == crate::diagnostics::Severity::Error)
            .unwrap()
            .code
    }

    #[test]
    fn test_literal_inference_boundaries() {
        assert_clean("let x: byte = 255;");
        assert_eq!(first_error("let x: byte = 256;"), DiagnosticCode::LiteralOutOfRange);
        assert_clean("let y: word = 65535;");
        assert_eq!(
            first_error("let y: word = 65536;"),
            DiagnosticCode::LiteralOutOfRange
        );
    }

    #[test]
    fn test_widening_and_narrowing() {
        assert_clean("let b: byte = 5;\nlet w: word = b;");
        assert_eq!(
            first_error("let w: word = 300;\nlet b: byte = w;"),
            DiagnosticCode::TypeMismatch
        );
    }

    #[test]
    fn test_narrowing_via_lo_hi() {
        assert_clean("let w: word = $D020;\nlet low: byte = lo(w);\nlet high: byte = hi(w);");
    }

    #[test]
    fn test_binary_widening() {
        let (result, diags) = check("let b: byte = 5;\nlet w: word = 300;\nlet sum: word = b + w;");
        assert!(!diags.has_errors());
        // The sum expression is typed word
        assert!(result
            .expr_types
            .values()
            .any(|t| t == &TypeInfo::Word));
    }

    #[test]
    fn test_comparison_yields_bool() {
        assert_clean("let a: byte = 1;\nlet ok: bool = a < 10;");
        assert_eq!(
            first_error("let s: string = \"x\";\nlet ok: bool = s < 10;"),
            DiagnosticCode::TypeMismatch
        );
    }

    #[test]
    fn test_logical_operators_accept_numerics() {
        // Documented looseness: numeric operands coerce to bool
        assert_clean("let a: byte = 1;\nlet ok: bool = a && true;");
        assert_eq!(
            first_error("let s: string = \"x\";\nlet ok: bool = s || true;"),
            DiagnosticCode::TypeMismatch
        );
    }

    #[test]
    fn test_division_by_constant_zero() {
        assert_eq!(
            first_error("let x: byte = 10 / 0;"),
            DiagnosticCode::DivisionByZero
        );
        assert_eq!(
            first_error("let x: byte = 10 % 0;"),
            DiagnosticCode::DivisionByZero
        );
        assert_clean("let d: byte = 2;\nlet x: byte = 10 / d;");
    }

    #[test]
    fn test_array_literal_common_type() {
        // byte + word elements widen to word
        assert_clean("let t: word[3] = [1, 256, 3];");
        // all-byte literals stay byte and do not satisfy a word slot
        assert_eq!(
            first_error("let t: word[3] = [$0000, $0000, $0000];"),
            DiagnosticCode::TypeMismatch
        );
    }

    #[test]
    fn test_empty_and_mixed_array_literals() {
        assert_eq!(first_error("let t: byte[] = [];"), DiagnosticCode::EmptyArrayLiteral);
        assert_eq!(
            first_error("let t: byte[2] = [1, \"two\"];"),
            DiagnosticCode::MixedArrayLiteral
        );
    }

    #[test]
    fn test_call_checking() {
        assert_clean(
            "function add(a: byte, b: byte): byte { return a + b; }\n\
             let s: byte = add(1, 2);",
        );
        assert_eq!(
            first_error(
                "function add(a: byte, b: byte): byte { return a + b; }\n\
                 let s: byte = add(1);"
            ),
            DiagnosticCode::WrongArgumentCount
        );
        assert_eq!(
            first_error(
                "function add(a: byte, b: byte): byte { return a + b; }\n\
                 let s: byte = add(1, \"two\");"
            ),
            DiagnosticCode::TypeMismatch
        );
    }

    #[test]
    fn test_void_call_as_value() {
        assert_eq!(
            first_error(
                "function beep(): void { }\n\
                 let x: byte = beep();"
            ),
            DiagnosticCode::VoidValueUsed
        );
        // Bare void call as a statement is fine
        assert_clean("function beep(): void { }\nfunction f(): void { beep(); }");
    }

    #[test]
    fn test_not_callable() {
        assert_eq!(
            first_error("let x: byte = 1;\nfunction f(): void { x(); }"),
            DiagnosticCode::NotCallable
        );
    }

    #[test]
    fn test_index_checking() {
        assert_clean(
            "let table: byte[8];\n\
             function f(): byte { return table[3]; }",
        );
        assert_eq!(
            first_error("let x: byte = 1;\nfunction f(): byte { return x[0]; }"),
            DiagnosticCode::NotIndexable
        );
    }

    #[test]
    fn test_enum_member_access() {
        assert_clean("enum Dir { UP, DOWN }\nlet d: Dir = Dir.DOWN;");
        assert_eq!(
            first_error("enum Dir { UP, DOWN }\nlet d: Dir = Dir.LEFT;"),
            DiagnosticCode::UnknownSymbol
        );
    }

    #[test]
    fn test_assignment_rules() {
        assert_clean(
            "function f(): void { let x: byte; x = 5; x += 1; }",
        );
        assert_eq!(
            first_error("const MAX: byte = 10;\nfunction f(): void { MAX = 5; }"),
            DiagnosticCode::NotAssignable
        );
        assert_eq!(
            first_error("function f(): void { 5 = 1; }"),
            DiagnosticCode::NotAssignable
        );
    }

    #[test]
    fn test_return_type_checking() {
        assert_clean("function f(): byte { return 5; }");
        assert_eq!(
            first_error("function f(): void { return 5; }"),
            DiagnosticCode::TypeMismatch
        );
        assert_eq!(
            first_error("function f(): byte { return; }"),
            DiagnosticCode::TypeMismatch
        );
        assert_eq!(
            first_error("function f(): byte { return \"text\"; }"),
            DiagnosticCode::TypeMismatch
        );
    }

    #[test]
    fn test_unknown_identifier() {
        assert_eq!(
            first_error("function f(): void { ghost = 1; }"),
            DiagnosticCode::UnknownSymbol
        );
    }

    #[test]
    fn test_address_of() {
        assert_clean("let buf: byte[4];\nlet addr: word = @buf;");
        assert_eq!(
            first_error("let addr: word = @(1 + 2);"),
            DiagnosticCode::NotAssignable
        );
    }

    #[test]
    fn test_intrinsic_calls() {
        assert_clean(
            "function f(): void {\n\
               poke($D020, 0);\n\
               let v: byte = peek($D020);\n\
               let w: word = peekw($00FB);\n\
               sei();\n\
               cli();\n\
             }",
        );
        assert_eq!(
            first_error("function f(): void { poke($D020); }"),
            DiagnosticCode::WrongArgumentCount
        );
    }

    #[test]
    fn test_length_intrinsic() {
        assert_clean("let t: byte[4];\nlet n: word = length(t);");
        assert_eq!(
            first_error("let x: byte = 1;\nlet n: word = length(x);"),
            DiagnosticCode::TypeMismatch
        );
    }

    #[test]
    fn test_stop_on_first_error() {
        let mut diags = Diagnostics::new();
        let source = "function f(): void { ghost1 = 1; ghost2 = 2; ghost3 = 3; }";
        let program = Parser::new(source, &mut diags).parse();
        let mut table = build_symbol_table(&program, &mut diags);
        let resolver = TypeResolver::run(&program, &mut table, &mut diags);
        check_program(
            &program,
            &table,
            &resolver,
            &mut diags,
            TypeCheckOptions {
                stop_on_first_error: true,
                report_warnings: true,
            },
        );
        assert_eq!(diags.error_count(), 1);
    }

    #[test]
    fn test_ternary_type() {
        assert_clean("let a: byte = 1;\nlet x: word = a > 0 ? 300 : 2;");
        assert_eq!(
            first_error("let a: byte = 1;\nlet x: byte = a > 0 ? 1 : \"two\";"),
            DiagnosticCode::TypeMismatch
        );
    }

    #[test]
    fn test_for_loop_bounds() {
        assert_clean("function f(): void { for (i = 0 to 255) { } }");
        // 300 does not fit the default byte counter
        assert_eq!(
            first_error("function f(): void { for (i = 0 to 300) { } }"),
            DiagnosticCode::LiteralOutOfRange
        );
        assert_clean("function f(): void { for (let i: word = 0 to 300) { } }");
    }

    #[test]
    fn test_alias_in_checking() {
        assert_clean(
            "type Address = word;\n\
             let screen: Address = $0400;\n\
             function f(): void { poke(screen, 32); }",
        );
    }
}
