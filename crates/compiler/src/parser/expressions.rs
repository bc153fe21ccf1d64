//! Expression grammar
//!
//! Precedence climbing over the operator grid: assignment < ternary <
//! logical < bitwise < equality < comparison < shift < additive <
//! multiplicative < unary < postfix < primary.

use std::rc::Rc;

use super::{Parser, messages};
use crate::ast::{
    AddrOfExpr, ArrayLit, AssignExpr, AssignOp, BinaryExpr, BinaryOp, BoolLit, CallExpr, CharLit,
    Expr, Ident, IndexExpr, MemberExpr, NumberLit, StringLit, TernaryExpr, UnaryExpr, UnaryOp,
};
use crate::diagnostics::DiagnosticCode;
use crate::lexer::TokenKind;

/// Binary operator levels, loosest binding first. Each level is
/// left-associative.
const BINARY_LEVELS: &[&[(TokenKind, BinaryOp)]] = &[
    &[(TokenKind::PipePipe, BinaryOp::Or)],
    &[(TokenKind::AmpAmp, BinaryOp::And)],
    &[(TokenKind::Pipe, BinaryOp::BitOr)],
    &[(TokenKind::Caret, BinaryOp::BitXor)],
    &[(TokenKind::Amp, BinaryOp::BitAnd)],
    &[
        (TokenKind::EqEq, BinaryOp::Eq),
        (TokenKind::BangEq, BinaryOp::Ne),
    ],
    &[
        (TokenKind::Lt, BinaryOp::Lt),
        (TokenKind::Le, BinaryOp::Le),
        (TokenKind::Gt, BinaryOp::Gt),
        (TokenKind::Ge, BinaryOp::Ge),
    ],
    &[
        (TokenKind::Shl, BinaryOp::Shl),
        (TokenKind::Shr, BinaryOp::Shr),
    ],
    &[
        (TokenKind::Plus, BinaryOp::Add),
        (TokenKind::Minus, BinaryOp::Sub),
    ],
    &[
        (TokenKind::Star, BinaryOp::Mul),
        (TokenKind::Slash, BinaryOp::Div),
        (TokenKind::Percent, BinaryOp::Mod),
    ],
];

fn assign_op(kind: TokenKind) -> Option<AssignOp> {
    let op = match kind {
        TokenKind::Assign => AssignOp::Assign,
        TokenKind::PlusAssign => AssignOp::Add,
        TokenKind::MinusAssign => AssignOp::Sub,
        TokenKind::StarAssign => AssignOp::Mul,
        TokenKind::SlashAssign => AssignOp::Div,
        TokenKind::PercentAssign => AssignOp::Mod,
        TokenKind::AmpAssign => AssignOp::BitAnd,
        TokenKind::PipeAssign => AssignOp::BitOr,
        TokenKind::CaretAssign => AssignOp::BitXor,
        TokenKind::ShlAssign => AssignOp::Shl,
        TokenKind::ShrAssign => AssignOp::Shr,
        _ => return None,
    };
    Some(op)
}

impl Parser<'_> {
    pub(crate) fn parse_expression(&mut self) -> Rc<Expr> {
        self.parse_assignment()
    }

    /// Placeholder expression substituted at error sites so downstream
    /// passes still see a well-formed tree.
    pub(crate) fn error_expr(&mut self) -> Rc<Expr> {
        let span = self.here();
        Rc::new(Expr::Number(NumberLit {
            id: self.fresh_id(),
            span,
            value: 0,
            lexeme: String::new(),
        }))
    }

    /// Assignment is right-associative: `a = b = c` parses as `a = (b = c)`.
    fn parse_assignment(&mut self) -> Rc<Expr> {
        let start = self.here();
        let target = self.parse_ternary();
        let Some(op) = assign_op(self.peek_kind()) else {
            return target;
        };
        self.advance();
        let value = self.parse_assignment();
        Rc::new(Expr::Assign(AssignExpr {
            id: self.fresh_id(),
            span: self.span_from(start),
            op,
            target,
            value,
        }))
    }

    fn parse_ternary(&mut self) -> Rc<Expr> {
        let start = self.here();
        let cond = self.parse_binary(0);
        if self.eat(TokenKind::Question).is_none() {
            return cond;
        }
        let then_expr = self.parse_expression();
        self.expect(TokenKind::Colon, "ternary true branch");
        let else_expr = self.parse_expression();
        Rc::new(Expr::Ternary(TernaryExpr {
            id: self.fresh_id(),
            span: self.span_from(start),
            cond,
            then_expr,
            else_expr,
        }))
    }

    fn parse_binary(&mut self, level: usize) -> Rc<Expr> {
        if level >= BINARY_LEVELS.len() {
            return self.parse_unary();
        }
        let start = self.here();
        let mut lhs = self.parse_binary(level + 1);
        loop {
            let Some(&(_, op)) = BINARY_LEVELS[level]
                .iter()
                .find(|(kind, _)| *kind == self.peek_kind())
            else {
                return lhs;
            };
            self.advance();
            let rhs = self.parse_binary(level + 1);
            lhs = Rc::new(Expr::Binary(BinaryExpr {
                id: self.fresh_id(),
                span: self.span_from(start),
                op,
                lhs,
                rhs,
            }));
        }
    }

    fn parse_unary(&mut self) -> Rc<Expr> {
        let start = self.here();
        let op = match self.peek_kind() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::AddressOf => None,
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.parse_unary();
        let node = match op {
            Some(op) => Expr::Unary(UnaryExpr {
                id: self.fresh_id(),
                span: self.span_from(start),
                op,
                operand,
            }),
            None => Expr::AddrOf(AddrOfExpr {
                id: self.fresh_id(),
                span: self.span_from(start),
                operand,
            }),
        };
        Rc::new(node)
    }

    fn parse_postfix(&mut self) -> Rc<Expr> {
        let start = self.here();
        let mut expr = self.parse_primary();
        loop {
            match self.peek_kind() {
                TokenKind::LParen => {
                    self.advance();
                    let mut args = Vec::new();
                    if !self.check(TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expression());
                            if self.eat(TokenKind::Comma).is_none() {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::RParen, "call arguments");
                    expr = Rc::new(Expr::Call(CallExpr {
                        id: self.fresh_id(),
                        span: self.span_from(start),
                        callee: expr,
                        args,
                    }));
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expression();
                    self.expect(TokenKind::RBracket, "index expression");
                    expr = Rc::new(Expr::Index(IndexExpr {
                        id: self.fresh_id(),
                        span: self.span_from(start),
                        target: expr,
                        index,
                    }));
                }
                TokenKind::Dot => {
                    self.advance();
                    let member_span = self.here();
                    let member = match self.expect(TokenKind::Identifier, "'.'") {
                        Some(token) => token.text().unwrap_or(&token.lexeme).to_string(),
                        None => String::new(),
                    };
                    expr = Rc::new(Expr::Member(MemberExpr {
                        id: self.fresh_id(),
                        span: self.span_from(start),
                        target: expr,
                        member,
                        member_span,
                    }));
                }
                _ => return expr,
            }
        }
    }

    fn parse_primary(&mut self) -> Rc<Expr> {
        let start = self.here();
        match self.peek_kind() {
            TokenKind::Number => {
                let token = self.advance();
                Rc::new(Expr::Number(NumberLit {
                    id: self.fresh_id(),
                    span: token.span,
                    value: token.number().unwrap_or(0),
                    lexeme: token.lexeme,
                }))
            }
            TokenKind::String => {
                let token = self.advance();
                Rc::new(Expr::Str(StringLit {
                    id: self.fresh_id(),
                    span: token.span,
                    value: token.text().unwrap_or_default().to_string(),
                }))
            }
            TokenKind::Char => {
                let token = self.advance();
                let value = token.text().and_then(|t| t.chars().next()).unwrap_or('\0');
                Rc::new(Expr::Char(CharLit {
                    id: self.fresh_id(),
                    span: token.span,
                    value,
                }))
            }
            TokenKind::True | TokenKind::False => {
                let token = self.advance();
                Rc::new(Expr::Bool(BoolLit {
                    id: self.fresh_id(),
                    span: token.span,
                    value: token.kind == TokenKind::True,
                }))
            }
            TokenKind::Identifier => {
                let token = self.advance();
                Rc::new(Expr::Ident(Ident {
                    id: self.fresh_id(),
                    span: token.span,
                    name: token.text().unwrap_or(&token.lexeme).to_string(),
                }))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression();
                if self.eat(TokenKind::RParen).is_none() {
                    self.error_here(
                        DiagnosticCode::ExpectedToken,
                        messages::expression::unclosed_group(),
                    );
                }
                inner
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                if !self.check(TokenKind::RBracket) {
                    loop {
                        elements.push(self.parse_expression());
                        if self.eat(TokenKind::Comma).is_none() {
                            break;
                        }
                    }
                }
                if self.eat(TokenKind::RBracket).is_none() {
                    self.error_here(
                        DiagnosticCode::ExpectedToken,
                        messages::expression::unclosed_array_literal(),
                    );
                }
                Rc::new(Expr::Array(ArrayLit {
                    id: self.fresh_id(),
                    span: self.span_from(start),
                    elements,
                }))
            }
            TokenKind::Error => {
                // Lexical error already reported; consume and move on
                self.advance();
                self.error_expr()
            }
            _ => {
                let found = self.describe_current();
                self.error_here(
                    DiagnosticCode::UnexpectedToken,
                    messages::expression::expected_expression(&found),
                );
                self.advance();
                self.error_expr()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;

    fn parse_expr(source: &str) -> Rc<Expr> {
        let mut diags = Diagnostics::new();
        let mut parser = Parser::new(source, &mut diags);
        let expr = parser.parse_expression();
        assert!(!diags.has_errors(), "errors: {:?}", diags.items());
        expr
    }

    #[test]
    fn test_precedence_mul_over_add() {
        let expr = parse_expr("1 + 2 * 3");
        let Expr::Binary(add) = &*expr else {
            panic!("Expected binary expression");
        };
        assert_eq!(add.op, BinaryOp::Add);
        assert!(matches!(&*add.rhs, Expr::Binary(m) if m.op == BinaryOp::Mul));
    }

    #[test]
    fn test_left_associativity() {
        let expr = parse_expr("10 - 4 - 3");
        let Expr::Binary(outer) = &*expr else {
            panic!("Expected binary expression");
        };
        assert_eq!(outer.op, BinaryOp::Sub);
        assert!(matches!(&*outer.lhs, Expr::Binary(inner) if inner.op == BinaryOp::Sub));
    }

    #[test]
    fn test_comparison_below_logical() {
        let expr = parse_expr("a < b && c >= d");
        let Expr::Binary(and) = &*expr else {
            panic!("Expected binary expression");
        };
        assert_eq!(and.op, BinaryOp::And);
        assert!(matches!(&*and.lhs, Expr::Binary(l) if l.op == BinaryOp::Lt));
        assert!(matches!(&*and.rhs, Expr::Binary(r) if r.op == BinaryOp::Ge));
    }

    #[test]
    fn test_shift_between_comparison_and_additive() {
        let expr = parse_expr("x >> 2 + 1");
        // Additive binds tighter than shift
        let Expr::Binary(shift) = &*expr else {
            panic!("Expected binary expression");
        };
        assert_eq!(shift.op, BinaryOp::Shr);
        assert!(matches!(&*shift.rhs, Expr::Binary(a) if a.op == BinaryOp::Add));
    }

    #[test]
    fn test_assignment_right_associative() {
        let expr = parse_expr("a = b = 1");
        let Expr::Assign(outer) = &*expr else {
            panic!("Expected assignment");
        };
        assert_eq!(outer.op, AssignOp::Assign);
        assert_eq!(outer.target.as_ident(), Some("a"));
        assert!(matches!(&*outer.value, Expr::Assign(_)));
    }

    #[test]
    fn test_compound_assignment() {
        let expr = parse_expr("mask <<= 1");
        let Expr::Assign(assign) = &*expr else {
            panic!("Expected assignment");
        };
        assert_eq!(assign.op, AssignOp::Shl);
    }

    #[test]
    fn test_ternary() {
        let expr = parse_expr("flag ? 1 : 2");
        assert!(matches!(&*expr, Expr::Ternary(_)));
    }

    #[test]
    fn test_unary_chain() {
        let expr = parse_expr("!~-x");
        let Expr::Unary(not) = &*expr else {
            panic!("Expected unary");
        };
        assert_eq!(not.op, UnaryOp::Not);
        let Expr::Unary(bitnot) = &*not.operand else {
            panic!("Expected nested unary");
        };
        assert_eq!(bitnot.op, UnaryOp::BitNot);
        assert!(matches!(&*bitnot.operand, Expr::Unary(n) if n.op == UnaryOp::Neg));
    }

    #[test]
    fn test_address_of() {
        let expr = parse_expr("@buffer");
        let Expr::AddrOf(addr) = &*expr else {
            panic!("Expected address-of");
        };
        assert_eq!(addr.operand.as_ident(), Some("buffer"));
    }

    #[test]
    fn test_postfix_chain() {
        let expr = parse_expr("table[i].name(1, 2)");
        let Expr::Call(call) = &*expr else {
            panic!("Expected call");
        };
        assert_eq!(call.args.len(), 2);
        let Expr::Member(member) = &*call.callee else {
            panic!("Expected member access");
        };
        assert_eq!(member.member, "name");
        assert!(matches!(&*member.target, Expr::Index(_)));
    }

    #[test]
    fn test_array_literal() {
        let expr = parse_expr("[1, 256, 3]");
        let Expr::Array(arr) = &*expr else {
            panic!("Expected array literal");
        };
        assert_eq!(arr.elements.len(), 3);
    }

    #[test]
    fn test_hex_literal_keeps_lexeme() {
        let expr = parse_expr("$D020");
        let Expr::Number(num) = &*expr else {
            panic!("Expected number");
        };
        assert_eq!(num.value, 0xD020);
        assert_eq!(num.lexeme, "$D020");
    }

    #[test]
    fn test_grouping_overrides_precedence() {
        let expr = parse_expr("(1 + 2) * 3");
        let Expr::Binary(mul) = &*expr else {
            panic!("Expected binary expression");
        };
        assert_eq!(mul.op, BinaryOp::Mul);
        assert!(matches!(&*mul.lhs, Expr::Binary(a) if a.op == BinaryOp::Add));
    }

    #[test]
    fn test_error_expression_placeholder() {
        let mut diags = Diagnostics::new();
        let mut parser = Parser::new("1 + ;", &mut diags);
        let expr = parser.parse_expression();
        assert!(diags.has_errors());
        // Still a well-formed binary node with a placeholder rhs
        assert!(matches!(&*expr, Expr::Binary(_)));
    }
}
