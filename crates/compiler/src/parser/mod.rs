//! Recursive-descent parser for Vic
//!
//! Layered bottom-up: this module owns the token cursor, error recovery and
//! parse-time scope tracking; `expressions`, `statements` and `declarations`
//! each own their grammar fragment on top of it. The parser always produces
//! a well-formed [`Program`] - on errors it synchronizes to the next
//! statement or declaration boundary and substitutes placeholder nodes so
//! later passes still have a tree to work with.

mod declarations;
mod expressions;
mod statements;

use crate::ast::{ModuleDecl, NodeId, Program, TypeRef};
use crate::diagnostics::{DiagnosticCode, Diagnostics};
use crate::lexer::{self, Token, TokenKind};
use crate::source::{SourcePos, SourceSpan};

/// Message catalog for parse errors, grouped by grammar layer so phrasing
/// stays consistent ("Expected X but found Y", "Expected X after Y").
pub(crate) mod messages {
    pub(crate) mod base {
        pub fn expected_but_found(expected: &str, found: &str) -> String {
            format!("Expected {expected} but found {found}")
        }

        pub fn expected_after(expected: &str, after: &str) -> String {
            format!("Expected {expected} after {after}")
        }
    }

    pub(crate) mod expression {
        pub fn expected_expression(found: &str) -> String {
            format!("Expected expression but found {found}")
        }

        pub fn unclosed_group() -> String {
            "Expected ')' to close grouped expression".to_string()
        }

        pub fn unclosed_array_literal() -> String {
            "Expected ']' to close array literal".to_string()
        }
    }

    pub(crate) mod statement {
        pub fn break_outside_loop() -> String {
            "'break' outside of a loop or switch".to_string()
        }

        pub fn continue_outside_loop() -> String {
            "'continue' outside of a loop".to_string()
        }

        pub fn return_outside_function() -> String {
            "'return' outside of a function".to_string()
        }

        pub fn expected_block(construct: &str) -> String {
            format!("Expected '{{' or statement list after {construct}")
        }
    }

    pub(crate) mod declaration {
        pub fn duplicate_parameter(name: &str) -> String {
            format!("Duplicate parameter name '{name}'")
        }

        pub fn const_requires_initializer(name: &str) -> String {
            format!("Constant '{name}' requires an initializer")
        }

        pub fn storage_on_local() -> String {
            "Storage class annotations are only allowed on top-level declarations".to_string()
        }

        pub fn map_requires_address() -> String {
            "Expected 'at <address>' after '@map'".to_string()
        }
    }

    pub(crate) mod module {
        pub fn expected_module_name() -> String {
            "Expected module name after 'module'".to_string()
        }

        pub fn expected_import_source() -> String {
            "Expected module path after 'from'".to_string()
        }
    }
}

/// What kind of construct a parse-time scope represents.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ParseScope {
    /// Function body; carries the declared return type for later validation.
    Function { return_type: TypeRef },
    /// `while`/`do`/`for` body - valid target for break and continue.
    Loop,
    /// `switch`/`match` body - valid target for break only.
    Switch,
}

/// Stack of enclosing constructs, used for early validation of `break`,
/// `continue` and `return` placement during the parse itself.
#[derive(Debug, Default)]
pub(crate) struct ScopeManager {
    stack: Vec<ParseScope>,
}

impl ScopeManager {
    pub fn push(&mut self, scope: ParseScope) {
        self.stack.push(scope);
    }

    pub fn pop(&mut self) {
        self.stack.pop();
    }

    /// A `break` binds to the nearest loop or switch, but never across a
    /// function boundary.
    pub fn in_break_target(&self) -> bool {
        for scope in self.stack.iter().rev() {
            match scope {
                ParseScope::Loop | ParseScope::Switch => return true,
                ParseScope::Function { .. } => return false,
            }
        }
        false
    }

    /// A `continue` binds to the nearest loop only.
    pub fn in_continue_target(&self) -> bool {
        for scope in self.stack.iter().rev() {
            match scope {
                ParseScope::Loop => return true,
                ParseScope::Switch => continue,
                ParseScope::Function { .. } => return false,
            }
        }
        false
    }

    /// Declared return type of the innermost enclosing function; `None`
    /// outside of any function.
    pub fn current_return_type(&self) -> Option<&TypeRef> {
        self.stack.iter().rev().find_map(|s| match s {
            ParseScope::Function { return_type } => Some(return_type),
            _ => None,
        })
    }
}

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    next_node_id: NodeId,
    pub(crate) scopes: ScopeManager,
    pub(crate) diagnostics: &'a mut Diagnostics,
}

impl<'a> Parser<'a> {
    pub fn new(source: &str, diagnostics: &'a mut Diagnostics) -> Self {
        let tokens = lexer::tokenize(source, diagnostics);
        Parser {
            tokens,
            pos: 0,
            next_node_id: 0,
            scopes: ScopeManager::default(),
            diagnostics,
        }
    }

    /// Parse a whole file into a [`Program`].
    ///
    /// Never fails: syntax errors are reported through the diagnostic sink
    /// and recovered from, so the returned tree is always well-formed.
    pub fn parse(&mut self) -> Program {
        self.parse_program()
    }

    // ------------------------------------------------------------------
    // Token cursor
    // ------------------------------------------------------------------

    pub(crate) fn fresh_id(&mut self) -> NodeId {
        let id = self.next_node_id;
        self.next_node_id += 1;
        id
    }

    pub(crate) fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub(crate) fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    pub(crate) fn peek_at(&self, n: usize) -> &Token {
        &self.tokens[(self.pos + n).min(self.tokens.len() - 1)]
    }

    pub(crate) fn at_end(&self) -> bool {
        self.peek_kind() == TokenKind::Eof
    }

    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    pub(crate) fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    /// Consume the next token if it matches.
    pub(crate) fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    /// Consume a required token, reporting a consistent diagnostic when the
    /// input has something else.
    pub(crate) fn expect(&mut self, kind: TokenKind, context: &str) -> Option<Token> {
        if self.check(kind) {
            return Some(self.advance());
        }
        let found = self.describe_current();
        let message = if context.is_empty() {
            messages::base::expected_but_found(kind.describe(), &found)
        } else {
            messages::base::expected_after(kind.describe(), context)
        };
        self.error_here(DiagnosticCode::ExpectedToken, message);
        None
    }

    pub(crate) fn describe_current(&self) -> String {
        let token = self.peek();
        match token.kind {
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::Identifier => format!("identifier '{}'", token.lexeme),
            _ => format!("'{}'", token.lexeme),
        }
    }

    // ------------------------------------------------------------------
    // Spans and errors
    // ------------------------------------------------------------------

    pub(crate) fn here(&self) -> SourceSpan {
        self.peek().span
    }

    /// Span from `start` through the end of the previously consumed token.
    pub(crate) fn span_from(&self, start: SourceSpan) -> SourceSpan {
        let prev_end = if self.pos > 0 {
            self.tokens[self.pos - 1].span.end
        } else {
            start.end
        };
        if prev_end.offset >= start.start.offset {
            SourceSpan::new(start.start, prev_end)
        } else {
            start
        }
    }

    pub(crate) fn error_here(&mut self, code: DiagnosticCode, message: String) {
        let span = self.here();
        self.diagnostics.error(code, message, span);
    }

    pub(crate) fn error_at(&mut self, span: SourceSpan, code: DiagnosticCode, message: String) {
        self.diagnostics.error(code, message, span);
    }

    // ------------------------------------------------------------------
    // Recovery
    // ------------------------------------------------------------------

    /// Skip ahead to the next statement/declaration boundary: just past a
    /// semicolon, or stopping before a closing brace or a token that can
    /// begin a new statement or declaration.
    pub(crate) fn synchronize(&mut self) {
        while !self.at_end() {
            match self.peek_kind() {
                TokenKind::Semicolon => {
                    self.advance();
                    return;
                }
                TokenKind::RBrace
                | TokenKind::LBrace
                | TokenKind::Function
                | TokenKind::Callback
                | TokenKind::Let
                | TokenKind::Const
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Do
                | TokenKind::For
                | TokenKind::Switch
                | TokenKind::Match
                | TokenKind::Return
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::Enum
                | TokenKind::Type
                | TokenKind::Import
                | TokenKind::Export
                | TokenKind::Module
                | TokenKind::End => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// Build the implicit `module global` declaration used when a file has
    /// no module header.
    pub(crate) fn implicit_module(&mut self) -> ModuleDecl {
        ModuleDecl {
            id: self.fresh_id(),
            span: SourceSpan::new(SourcePos::start(), SourcePos::start()),
            name: "global".to_string(),
            implicit: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Decl;

    pub(crate) fn parse_ok(source: &str) -> Program {
        let mut diags = Diagnostics::new();
        let program = Parser::new(source, &mut diags).parse();
        assert!(
            !diags.has_errors(),
            "unexpected errors: {:?}",
            diags.items()
        );
        program
    }

    #[test]
    fn test_empty_source_gets_implicit_module() {
        let program = parse_ok("");
        assert_eq!(program.module.name, "global");
        assert!(program.module.implicit);
        assert!(program.decls.is_empty());
    }

    #[test]
    fn test_recovery_produces_tree() {
        let mut diags = Diagnostics::new();
        let program = Parser::new("let = 5;\nlet y: byte = 1;", &mut diags).parse();
        assert!(diags.has_errors());
        // The bad declaration is recovered from; the good one still parses
        assert!(program
            .decls
            .iter()
            .any(|d| matches!(&**d, Decl::Variable(v) if v.name == "y")));
    }

    #[test]
    fn test_scope_manager_break_targets() {
        let mut scopes = ScopeManager::default();
        assert!(!scopes.in_break_target());
        scopes.push(ParseScope::Function {
            return_type: TypeRef {
                id: 0,
                span: SourceSpan::unknown(),
                name: "void".to_string(),
                array_size: None,
            },
        });
        assert!(!scopes.in_break_target());
        scopes.push(ParseScope::Loop);
        assert!(scopes.in_break_target());
        assert!(scopes.in_continue_target());
        scopes.push(ParseScope::Switch);
        // Switch admits break but continue still binds to the loop
        assert!(scopes.in_break_target());
        assert!(scopes.in_continue_target());
        scopes.pop();
        scopes.pop();
        // Function boundary isolates outer loops
        scopes.push(ParseScope::Loop);
        scopes.push(ParseScope::Function {
            return_type: TypeRef {
                id: 1,
                span: SourceSpan::unknown(),
                name: "void".to_string(),
                array_size: None,
            },
        });
        assert!(!scopes.in_break_target());
        assert!(!scopes.in_continue_target());
    }
}
