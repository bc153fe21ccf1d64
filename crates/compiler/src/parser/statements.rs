//! Statement grammar
//!
//! Blocks come in two surface forms: C-style `{ ... }` and
//! keyword-terminated (`... end if`). Both produce the same block node;
//! the form is chosen by lookahead after the construct header.

use std::rc::Rc;

use super::{ParseScope, Parser, messages};
use crate::ast::{
    BlockStmt, BreakStmt, CaseArm, ContinueStmt, DoWhileStmt, ExprStmt, ForStmt, IfStmt,
    MatchStmt, ReturnStmt, Stmt, SwitchStmt, WhileStmt,
};
use crate::diagnostics::DiagnosticCode;
use crate::lexer::TokenKind;

impl Parser<'_> {
    pub(crate) fn parse_statement(&mut self) -> Rc<Stmt> {
        match self.peek_kind() {
            TokenKind::LBrace => self.parse_block(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Do => self.parse_do_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Switch => self.parse_switch_like(false),
            TokenKind::Match => self.parse_switch_like(true),
            TokenKind::Return => self.parse_return(),
            TokenKind::Break => self.parse_break(),
            TokenKind::Continue => self.parse_continue(),
            TokenKind::Let | TokenKind::Const => self.parse_local_var(),
            TokenKind::AtZp | TokenKind::AtRam | TokenKind::AtData | TokenKind::AtMap => {
                self.error_here(
                    DiagnosticCode::UnexpectedToken,
                    messages::declaration::storage_on_local(),
                );
                // Skip the sigil (and a map address clause) and parse the
                // declaration itself so the body stays analyzable
                let sigil = self.advance();
                if sigil.kind == TokenKind::AtMap && self.eat(TokenKind::At).is_some() {
                    self.eat(TokenKind::Number);
                }
                self.parse_local_var()
            }
            _ => self.parse_expr_statement(),
        }
    }

    /// Placeholder statement substituted at unrecoverable error sites.
    pub(crate) fn error_stmt(&mut self) -> Rc<Stmt> {
        let span = self.here();
        Rc::new(Stmt::Block(BlockStmt {
            id: self.fresh_id(),
            span,
            stmts: Vec::new(),
        }))
    }

    /// `{ stmt* }`
    pub(crate) fn parse_block(&mut self) -> Rc<Stmt> {
        let start = self.here();
        if self.expect(TokenKind::LBrace, "").is_none() {
            self.synchronize();
            return self.error_stmt();
        }
        let mut stmts = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.at_end() {
            stmts.push(self.parse_statement());
        }
        self.expect(TokenKind::RBrace, "block");
        Rc::new(Stmt::Block(BlockStmt {
            id: self.fresh_id(),
            span: self.span_from(start),
            stmts,
        }))
    }

    /// Either a braced block or a keyword-terminated statement list that
    /// runs up to one of `stops` (the stop token is not consumed).
    pub(crate) fn parse_block_or_until(&mut self, construct: &str, stops: &[TokenKind]) -> Rc<Stmt> {
        if self.check(TokenKind::LBrace) {
            return self.parse_block();
        }
        let start = self.here();
        let mut stmts = Vec::new();
        while !stops.contains(&self.peek_kind()) && !self.at_end() {
            if self.check(TokenKind::RBrace) {
                break;
            }
            stmts.push(self.parse_statement());
        }
        if self.at_end() || self.check(TokenKind::RBrace) {
            self.error_here(
                DiagnosticCode::ExpectedToken,
                messages::statement::expected_block(construct),
            );
        }
        Rc::new(Stmt::Block(BlockStmt {
            id: self.fresh_id(),
            span: self.span_from(start),
            stmts,
        }))
    }

    /// Consume `end <keyword>` closing a keyword-form block.
    pub(crate) fn expect_end(&mut self, keyword: TokenKind) {
        if self.eat(TokenKind::End).is_some() {
            self.eat(keyword);
        }
    }

    fn parse_if(&mut self) -> Rc<Stmt> {
        let start = self.here();
        self.advance(); // if
        self.expect(TokenKind::LParen, "'if'");
        let cond = self.parse_expression();
        self.expect(TokenKind::RParen, "if condition");

        let braced = self.check(TokenKind::LBrace);
        let then_branch =
            self.parse_block_or_until("if condition", &[TokenKind::Else, TokenKind::End]);

        let else_branch = if self.eat(TokenKind::Else).is_some() {
            let branch = if self.check(TokenKind::If) {
                // else-if chain
                self.parse_if()
            } else if braced {
                self.parse_block()
            } else {
                self.parse_block_or_until("'else'", &[TokenKind::End])
            };
            Some(branch)
        } else {
            None
        };
        if !braced {
            self.expect_end(TokenKind::If);
        }
        Rc::new(Stmt::If(IfStmt {
            id: self.fresh_id(),
            span: self.span_from(start),
            cond,
            then_branch,
            else_branch,
        }))
    }

    fn parse_while(&mut self) -> Rc<Stmt> {
        let start = self.here();
        self.advance(); // while
        self.expect(TokenKind::LParen, "'while'");
        let cond = self.parse_expression();
        self.expect(TokenKind::RParen, "while condition");

        self.scopes.push(ParseScope::Loop);
        let braced = self.check(TokenKind::LBrace);
        let body = self.parse_block_or_until("while condition", &[TokenKind::End]);
        self.scopes.pop();
        if !braced {
            self.expect_end(TokenKind::While);
        }
        Rc::new(Stmt::While(WhileStmt {
            id: self.fresh_id(),
            span: self.span_from(start),
            cond,
            body,
        }))
    }

    fn parse_do_while(&mut self) -> Rc<Stmt> {
        let start = self.here();
        self.advance(); // do
        self.scopes.push(ParseScope::Loop);
        let body = self.parse_block();
        self.scopes.pop();
        self.expect(TokenKind::While, "do-while body");
        self.expect(TokenKind::LParen, "'while'");
        let cond = self.parse_expression();
        self.expect(TokenKind::RParen, "do-while condition");
        self.expect(TokenKind::Semicolon, "do-while statement");
        Rc::new(Stmt::DoWhile(DoWhileStmt {
            id: self.fresh_id(),
            span: self.span_from(start),
            body,
            cond,
        }))
    }

    /// `for (i = start to end [step k]) body` with optional `let` and type
    /// annotation on the counter; `downto` flips direction.
    fn parse_for(&mut self) -> Rc<Stmt> {
        let start = self.here();
        self.advance(); // for
        self.expect(TokenKind::LParen, "'for'");
        self.eat(TokenKind::Let);
        let counter_span = self.here();
        let counter = match self.expect(TokenKind::Identifier, "'for ('") {
            Some(token) => token.text().unwrap_or(&token.lexeme).to_string(),
            None => {
                self.synchronize();
                return self.error_stmt();
            }
        };
        let counter_type = if self.eat(TokenKind::Colon).is_some() {
            self.parse_type_ref()
        } else {
            None
        };
        self.expect(TokenKind::Assign, "loop counter");
        let start_expr = self.parse_expression();
        let down = match self.peek_kind() {
            TokenKind::To => {
                self.advance();
                false
            }
            TokenKind::Downto => {
                self.advance();
                true
            }
            _ => {
                let found = self.describe_current();
                self.error_here(
                    DiagnosticCode::ExpectedToken,
                    messages::base::expected_but_found("'to' or 'downto'", &found),
                );
                false
            }
        };
        let end_expr = self.parse_expression();
        let step = if self.eat(TokenKind::Step).is_some() {
            Some(self.parse_expression())
        } else {
            None
        };
        self.expect(TokenKind::RParen, "for header");

        self.scopes.push(ParseScope::Loop);
        let braced = self.check(TokenKind::LBrace);
        let body = self.parse_block_or_until("for header", &[TokenKind::End]);
        self.scopes.pop();
        if !braced {
            self.expect_end(TokenKind::For);
        }
        Rc::new(Stmt::For(ForStmt {
            id: self.fresh_id(),
            span: self.span_from(start),
            counter,
            counter_span,
            counter_type,
            start: start_expr,
            end: end_expr,
            down,
            step,
            body,
        }))
    }

    /// Shared grammar for `switch` and `match`; the two differ only in
    /// fall-through semantics downstream.
    fn parse_switch_like(&mut self, is_match: bool) -> Rc<Stmt> {
        let start = self.here();
        self.advance(); // switch | match
        let keyword = if is_match { "'match'" } else { "'switch'" };
        self.expect(TokenKind::LParen, keyword);
        let scrutinee = self.parse_expression();
        self.expect(TokenKind::RParen, "scrutinee");
        if self.expect(TokenKind::LBrace, "scrutinee").is_none() {
            self.synchronize();
            return self.error_stmt();
        }

        self.scopes.push(ParseScope::Switch);
        let mut arms = Vec::new();
        let mut seen_default = false;
        while !self.check(TokenKind::RBrace) && !self.at_end() {
            match self.peek_kind() {
                TokenKind::Case => {
                    let arm_start = self.here();
                    self.advance();
                    let value = self.parse_expression();
                    self.expect(TokenKind::Colon, "case value");
                    let body = self.parse_case_body();
                    arms.push(CaseArm {
                        span: self.span_from(arm_start),
                        value: Some(value),
                        body,
                    });
                }
                TokenKind::Default => {
                    let arm_start = self.here();
                    self.advance();
                    self.expect(TokenKind::Colon, "'default'");
                    if seen_default {
                        self.error_at(
                            arm_start,
                            DiagnosticCode::UnexpectedToken,
                            "Duplicate 'default' arm".to_string(),
                        );
                    }
                    seen_default = true;
                    let body = self.parse_case_body();
                    arms.push(CaseArm {
                        span: self.span_from(arm_start),
                        value: None,
                        body,
                    });
                }
                _ => {
                    let found = self.describe_current();
                    self.error_here(
                        DiagnosticCode::UnexpectedToken,
                        messages::base::expected_but_found("'case' or 'default'", &found),
                    );
                    self.synchronize();
                    break;
                }
            }
        }
        self.scopes.pop();
        self.expect(TokenKind::RBrace, "case arms");

        let id = self.fresh_id();
        let span = self.span_from(start);
        let stmt = if is_match {
            Stmt::Match(MatchStmt {
                id,
                span,
                scrutinee,
                arms,
            })
        } else {
            Stmt::Switch(SwitchStmt {
                id,
                span,
                scrutinee,
                arms,
            })
        };
        Rc::new(stmt)
    }

    fn parse_case_body(&mut self) -> Vec<Rc<Stmt>> {
        let mut body = Vec::new();
        while !matches!(
            self.peek_kind(),
            TokenKind::Case | TokenKind::Default | TokenKind::RBrace | TokenKind::Eof
        ) {
            body.push(self.parse_statement());
        }
        body
    }

    fn parse_return(&mut self) -> Rc<Stmt> {
        let start = self.here();
        let keyword_span = self.here();
        self.advance(); // return
        if self.scopes.current_return_type().is_none() {
            self.error_at(
                keyword_span,
                DiagnosticCode::ReturnOutsideFunction,
                messages::statement::return_outside_function(),
            );
        }
        let value = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression())
        };
        self.expect(TokenKind::Semicolon, "return statement");
        Rc::new(Stmt::Return(ReturnStmt {
            id: self.fresh_id(),
            span: self.span_from(start),
            value,
        }))
    }

    fn parse_break(&mut self) -> Rc<Stmt> {
        let keyword_span = self.here();
        self.advance(); // break
        if !self.scopes.in_break_target() {
            self.error_at(
                keyword_span,
                DiagnosticCode::BreakOutsideLoop,
                messages::statement::break_outside_loop(),
            );
        }
        self.expect(TokenKind::Semicolon, "'break'");
        Rc::new(Stmt::Break(BreakStmt {
            id: self.fresh_id(),
            span: keyword_span,
        }))
    }

    fn parse_continue(&mut self) -> Rc<Stmt> {
        let keyword_span = self.here();
        self.advance(); // continue
        if !self.scopes.in_continue_target() {
            self.error_at(
                keyword_span,
                DiagnosticCode::ContinueOutsideLoop,
                messages::statement::continue_outside_loop(),
            );
        }
        self.expect(TokenKind::Semicolon, "'continue'");
        Rc::new(Stmt::Continue(ContinueStmt {
            id: self.fresh_id(),
            span: keyword_span,
        }))
    }

    fn parse_expr_statement(&mut self) -> Rc<Stmt> {
        let start = self.here();
        let expr = self.parse_expression();
        if self.expect(TokenKind::Semicolon, "expression").is_none() {
            self.synchronize();
        }
        Rc::new(Stmt::Expr(ExprStmt {
            id: self.fresh_id(),
            span: self.span_from(start),
            expr,
        }))
    }

    /// Local `let`/`const` inside a function body.
    fn parse_local_var(&mut self) -> Rc<Stmt> {
        let start = self.here();
        let is_const = self.advance().kind == TokenKind::Const;
        match self.parse_var_rest(start, is_const, None, false) {
            Some(decl) => Rc::new(Stmt::Var(decl)),
            None => {
                self.synchronize();
                self.error_stmt()
            }
        }
    }

    /// Statement used as the body of switch-like tests below; kept here so
    /// the statement tests exercise spans uniformly.
    #[cfg(test)]
    pub(crate) fn parse_statement_for_test(source: &str) -> (Rc<Stmt>, crate::diagnostics::Diagnostics) {
        let mut diags = crate::diagnostics::Diagnostics::new();
        let stmt = {
            let mut parser = Parser::new(source, &mut diags);
            parser.scopes.push(ParseScope::Function {
                return_type: crate::ast::TypeRef {
                    id: u32::MAX,
                    span: crate::source::SourceSpan::unknown(),
                    name: "void".to_string(),
                    array_size: None,
                },
            });
            parser.parse_statement()
        };
        (stmt, diags)
    }
}
