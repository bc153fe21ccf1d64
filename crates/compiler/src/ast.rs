//! Abstract syntax tree for Vic
//!
//! Nodes are structurally immutable after parse. Child links are `Rc` so
//! transformers can rebuild a parent while sharing unchanged subtrees by
//! identity. Every node carries a stable `NodeId` assigned by the parser and
//! a source span set by its producer and never mutated afterwards.

use crate::source::SourceSpan;
use std::rc::Rc;

/// Stable node identifier, unique within one parsed program.
pub type NodeId = u32;

/// Storage class annotation on a global declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    /// `@zp` - allocated in the zero page user band
    Zp,
    /// `@ram` - labeled, bump-allocated, uninitialized
    Ram,
    /// `@data` - labeled, bump-allocated, with initializer image
    Data,
    /// `@map at $addr` - fixed hardware address, never allocated
    Map,
}

/// A syntactic type annotation, resolved to a `TypeInfo` in the semantic
/// phase.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeRef {
    pub id: NodeId,
    pub span: SourceSpan,
    pub name: String,
    /// `None` for scalars; `Some(None)` for `T[]`; `Some(Some(n))` for `T[n]`.
    pub array_size: Option<Option<u32>>,
}

impl std::fmt::Display for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.array_size {
            None => write!(f, "{}", self.name),
            Some(None) => write!(f, "{}[]", self.name),
            Some(Some(n)) => write!(f, "{}[{}]", self.name, n),
        }
    }
}

// ============================================================================
//                              DECLARATIONS
// ============================================================================

/// `module a.b.c` - at most one per file; an implicit `global` module is
/// synthesized when absent.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleDecl {
    pub id: NodeId,
    pub span: SourceSpan,
    pub name: String,
    pub implicit: bool,
}

/// One imported name with its own span for per-identifier errors.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportName {
    pub name: String,
    pub span: SourceSpan,
}

/// `import a, b from x.y;` or `import * from x.y;`
#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub id: NodeId,
    pub span: SourceSpan,
    pub names: Vec<ImportName>,
    pub wildcard: bool,
    pub module: String,
    pub module_span: SourceSpan,
}

/// A function parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub id: NodeId,
    pub span: SourceSpan,
    pub name: String,
    pub ty: TypeRef,
}

/// `function name(params): type { ... }` or a stub terminated with `;`.
///
/// `callback` functions are interrupt handlers: same shape, but the code
/// generator emits register save/restore and `rti`.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub id: NodeId,
    pub span: SourceSpan,
    pub name: String,
    pub name_span: SourceSpan,
    pub params: Vec<Param>,
    pub return_type: TypeRef,
    /// `None` for stub declarations (`function f(): void;`)
    pub body: Option<Rc<Stmt>>,
    pub exported: bool,
    pub is_callback: bool,
}

/// `[storage] (let|const) name: type [= init];` - top-level or block-local.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub id: NodeId,
    pub span: SourceSpan,
    pub name: String,
    pub name_span: SourceSpan,
    pub is_const: bool,
    pub storage: Option<StorageClass>,
    pub ty: TypeRef,
    pub init: Option<Rc<Expr>>,
    /// Fixed address for `@map at $D020` declarations.
    pub map_address: Option<u32>,
    pub exported: bool,
}

/// `type Name = existing;`
#[derive(Debug, Clone, PartialEq)]
pub struct TypeAliasDecl {
    pub id: NodeId,
    pub span: SourceSpan,
    pub name: String,
    pub target: TypeRef,
    pub exported: bool,
}

/// One member of an enum declaration. The resolved value (explicit or
/// previous + 1) is computed in the semantic phase, not stored here.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumMemberDecl {
    pub id: NodeId,
    pub span: SourceSpan,
    pub name: String,
    pub value: Option<u32>,
}

/// `enum Name { A = 3, B, C }`
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDecl {
    pub id: NodeId,
    pub span: SourceSpan,
    pub name: String,
    pub members: Vec<EnumMemberDecl>,
    pub exported: bool,
}

/// A top-level declaration. The `export` modifier is a flag on the target
/// declaration rather than a wrapper node.
#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Function(FunctionDecl),
    Variable(VarDecl),
    TypeAlias(TypeAliasDecl),
    Enum(EnumDecl),
    Import(ImportDecl),
}

impl Decl {
    pub fn id(&self) -> NodeId {
        match self {
            Decl::Function(d) => d.id,
            Decl::Variable(d) => d.id,
            Decl::TypeAlias(d) => d.id,
            Decl::Enum(d) => d.id,
            Decl::Import(d) => d.id,
        }
    }

    pub fn span(&self) -> SourceSpan {
        match self {
            Decl::Function(d) => d.span,
            Decl::Variable(d) => d.span,
            Decl::TypeAlias(d) => d.span,
            Decl::Enum(d) => d.span,
            Decl::Import(d) => d.span,
        }
    }

    /// Declared name, if the declaration introduces one.
    pub fn name(&self) -> Option<&str> {
        match self {
            Decl::Function(d) => Some(&d.name),
            Decl::Variable(d) => Some(&d.name),
            Decl::TypeAlias(d) => Some(&d.name),
            Decl::Enum(d) => Some(&d.name),
            Decl::Import(_) => None,
        }
    }

    pub fn exported(&self) -> bool {
        match self {
            Decl::Function(d) => d.exported,
            Decl::Variable(d) => d.exported,
            Decl::TypeAlias(d) => d.exported,
            Decl::Enum(d) => d.exported,
            Decl::Import(_) => false,
        }
    }
}

/// Root of a parsed file: exactly one module declaration plus an ordered
/// list of top-level declarations.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub id: NodeId,
    pub span: SourceSpan,
    pub module: ModuleDecl,
    pub decls: Vec<Rc<Decl>>,
}

// ============================================================================
//                               STATEMENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct BlockStmt {
    pub id: NodeId,
    pub span: SourceSpan,
    pub stmts: Vec<Rc<Stmt>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExprStmt {
    pub id: NodeId,
    pub span: SourceSpan,
    pub expr: Rc<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStmt {
    pub id: NodeId,
    pub span: SourceSpan,
    pub value: Option<Rc<Expr>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    pub id: NodeId,
    pub span: SourceSpan,
    pub cond: Rc<Expr>,
    pub then_branch: Rc<Stmt>,
    pub else_branch: Option<Rc<Stmt>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileStmt {
    pub id: NodeId,
    pub span: SourceSpan,
    pub cond: Rc<Expr>,
    pub body: Rc<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DoWhileStmt {
    pub id: NodeId,
    pub span: SourceSpan,
    pub body: Rc<Stmt>,
    pub cond: Rc<Expr>,
}

/// Counted loop: `for (i = start to end step k) { ... }`.
///
/// `downto` flips the direction; the counter lives in a dedicated loop
/// scope and defaults to `byte` when unannotated.
#[derive(Debug, Clone, PartialEq)]
pub struct ForStmt {
    pub id: NodeId,
    pub span: SourceSpan,
    pub counter: String,
    pub counter_span: SourceSpan,
    pub counter_type: Option<TypeRef>,
    pub start: Rc<Expr>,
    pub end: Rc<Expr>,
    pub down: bool,
    pub step: Option<Rc<Expr>>,
    pub body: Rc<Stmt>,
}

/// One `case v:` (or `default:` when `value` is `None`) arm.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseArm {
    pub span: SourceSpan,
    pub value: Option<Rc<Expr>>,
    pub body: Vec<Rc<Stmt>>,
}

/// C-style switch: control falls through from one case to the next unless
/// `break` intervenes.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchStmt {
    pub id: NodeId,
    pub span: SourceSpan,
    pub scrutinee: Rc<Expr>,
    pub arms: Vec<CaseArm>,
}

/// Like switch, but each arm exits to the merge point - no fall-through.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchStmt {
    pub id: NodeId,
    pub span: SourceSpan,
    pub scrutinee: Rc<Expr>,
    pub arms: Vec<CaseArm>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BreakStmt {
    pub id: NodeId,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContinueStmt {
    pub id: NodeId,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Block(BlockStmt),
    Expr(ExprStmt),
    Return(ReturnStmt),
    If(IfStmt),
    While(WhileStmt),
    DoWhile(DoWhileStmt),
    For(ForStmt),
    Switch(SwitchStmt),
    Match(MatchStmt),
    Break(BreakStmt),
    Continue(ContinueStmt),
    Var(VarDecl),
}

impl Stmt {
    pub fn id(&self) -> NodeId {
        match self {
            Stmt::Block(s) => s.id,
            Stmt::Expr(s) => s.id,
            Stmt::Return(s) => s.id,
            Stmt::If(s) => s.id,
            Stmt::While(s) => s.id,
            Stmt::DoWhile(s) => s.id,
            Stmt::For(s) => s.id,
            Stmt::Switch(s) => s.id,
            Stmt::Match(s) => s.id,
            Stmt::Break(s) => s.id,
            Stmt::Continue(s) => s.id,
            Stmt::Var(s) => s.id,
        }
    }

    pub fn span(&self) -> SourceSpan {
        match self {
            Stmt::Block(s) => s.span,
            Stmt::Expr(s) => s.span,
            Stmt::Return(s) => s.span,
            Stmt::If(s) => s.span,
            Stmt::While(s) => s.span,
            Stmt::DoWhile(s) => s.span,
            Stmt::For(s) => s.span,
            Stmt::Switch(s) => s.span,
            Stmt::Match(s) => s.span,
            Stmt::Break(s) => s.span,
            Stmt::Continue(s) => s.span,
            Stmt::Var(s) => s.span,
        }
    }
}

// ============================================================================
//                              EXPRESSIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `!x`
    Not,
    /// `~x`
    BitNot,
}

impl UnaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl AssignOp {
    /// The binary operation a compound assignment expands to.
    pub fn binary_op(&self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Sub => Some(BinaryOp::Sub),
            AssignOp::Mul => Some(BinaryOp::Mul),
            AssignOp::Div => Some(BinaryOp::Div),
            AssignOp::Mod => Some(BinaryOp::Mod),
            AssignOp::BitAnd => Some(BinaryOp::BitAnd),
            AssignOp::BitOr => Some(BinaryOp::BitOr),
            AssignOp::BitXor => Some(BinaryOp::BitXor),
            AssignOp::Shl => Some(BinaryOp::Shl),
            AssignOp::Shr => Some(BinaryOp::Shr),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumberLit {
    pub id: NodeId,
    pub span: SourceSpan,
    pub value: u32,
    /// Raw lexeme, preserving the base the programmer wrote (`$D020`, `0b1010`).
    pub lexeme: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringLit {
    pub id: NodeId,
    pub span: SourceSpan,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoolLit {
    pub id: NodeId,
    pub span: SourceSpan,
    pub value: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CharLit {
    pub id: NodeId,
    pub span: SourceSpan,
    pub value: char,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayLit {
    pub id: NodeId,
    pub span: SourceSpan,
    pub elements: Vec<Rc<Expr>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub id: NodeId,
    pub span: SourceSpan,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnaryExpr {
    pub id: NodeId,
    pub span: SourceSpan,
    pub op: UnaryOp,
    pub operand: Rc<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpr {
    pub id: NodeId,
    pub span: SourceSpan,
    pub op: BinaryOp,
    pub lhs: Rc<Expr>,
    pub rhs: Rc<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TernaryExpr {
    pub id: NodeId,
    pub span: SourceSpan,
    pub cond: Rc<Expr>,
    pub then_expr: Rc<Expr>,
    pub else_expr: Rc<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    pub id: NodeId,
    pub span: SourceSpan,
    pub callee: Rc<Expr>,
    pub args: Vec<Rc<Expr>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexExpr {
    pub id: NodeId,
    pub span: SourceSpan,
    pub target: Rc<Expr>,
    pub index: Rc<Expr>,
}

/// Qualified member access; only enum members (`Direction.UP`) survive
/// semantic analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberExpr {
    pub id: NodeId,
    pub span: SourceSpan,
    pub target: Rc<Expr>,
    pub member: String,
    pub member_span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignExpr {
    pub id: NodeId,
    pub span: SourceSpan,
    pub op: AssignOp,
    pub target: Rc<Expr>,
    pub value: Rc<Expr>,
}

/// Address-of: `@buffer`
#[derive(Debug, Clone, PartialEq)]
pub struct AddrOfExpr {
    pub id: NodeId,
    pub span: SourceSpan,
    pub operand: Rc<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(NumberLit),
    Str(StringLit),
    Bool(BoolLit),
    Char(CharLit),
    Array(ArrayLit),
    Ident(Ident),
    Unary(UnaryExpr),
    Binary(BinaryExpr),
    Ternary(TernaryExpr),
    Call(CallExpr),
    Index(IndexExpr),
    Member(MemberExpr),
    Assign(AssignExpr),
    AddrOf(AddrOfExpr),
}

impl Expr {
    pub fn id(&self) -> NodeId {
        match self {
            Expr::Number(e) => e.id,
            Expr::Str(e) => e.id,
            Expr::Bool(e) => e.id,
            Expr::Char(e) => e.id,
            Expr::Array(e) => e.id,
            Expr::Ident(e) => e.id,
            Expr::Unary(e) => e.id,
            Expr::Binary(e) => e.id,
            Expr::Ternary(e) => e.id,
            Expr::Call(e) => e.id,
            Expr::Index(e) => e.id,
            Expr::Member(e) => e.id,
            Expr::Assign(e) => e.id,
            Expr::AddrOf(e) => e.id,
        }
    }

    pub fn span(&self) -> SourceSpan {
        match self {
            Expr::Number(e) => e.span,
            Expr::Str(e) => e.span,
            Expr::Bool(e) => e.span,
            Expr::Char(e) => e.span,
            Expr::Array(e) => e.span,
            Expr::Ident(e) => e.span,
            Expr::Unary(e) => e.span,
            Expr::Binary(e) => e.span,
            Expr::Ternary(e) => e.span,
            Expr::Call(e) => e.span,
            Expr::Index(e) => e.span,
            Expr::Member(e) => e.span,
            Expr::Assign(e) => e.span,
            Expr::AddrOf(e) => e.span,
        }
    }

    /// Identifier name if this expression is a bare identifier.
    pub fn as_ident(&self) -> Option<&str> {
        match self {
            Expr::Ident(id) => Some(&id.name),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceSpan;

    fn num(id: NodeId, value: u32) -> Rc<Expr> {
        Rc::new(Expr::Number(NumberLit {
            id,
            span: SourceSpan::unknown(),
            value,
            lexeme: value.to_string(),
        }))
    }

    #[test]
    fn test_expr_accessors() {
        let lhs = num(1, 2);
        let rhs = num(2, 3);
        let add = Expr::Binary(BinaryExpr {
            id: 3,
            span: SourceSpan::unknown(),
            op: BinaryOp::Add,
            lhs: Rc::clone(&lhs),
            rhs,
        });
        assert_eq!(add.id(), 3);
        assert!(add.as_ident().is_none());
        assert_eq!(lhs.as_ident(), None);
    }

    #[test]
    fn test_compound_assign_expansion() {
        assert_eq!(AssignOp::Add.binary_op(), Some(BinaryOp::Add));
        assert_eq!(AssignOp::Shr.binary_op(), Some(BinaryOp::Shr));
        assert_eq!(AssignOp::Assign.binary_op(), None);
    }

    #[test]
    fn test_type_ref_display() {
        let scalar = TypeRef {
            id: 0,
            span: SourceSpan::unknown(),
            name: "byte".to_string(),
            array_size: None,
        };
        let sized = TypeRef {
            array_size: Some(Some(8)),
            ..scalar.clone()
        };
        let unsized_arr = TypeRef {
            array_size: Some(None),
            ..scalar.clone()
        };
        assert_eq!(scalar.to_string(), "byte");
        assert_eq!(sized.to_string(), "byte[8]");
        assert_eq!(unsized_arr.to_string(), "byte[]");
    }

    #[test]
    fn test_rc_sharing_identity() {
        let shared = num(7, 42);
        let a = Rc::clone(&shared);
        assert!(Rc::ptr_eq(&shared, &a));
    }
}
