//! # 式の解析
//!
//! 束縛力（binding power）表による Pratt パーサーです。
//! 二項演算子はすべて左結合で、右束縛力は左束縛力 + 1 です。
//!
//! | 演算子                  | 左 | 右 |
//! |-------------------------|----|----|
//! | `or`                    | 0  | 1  |
//! | `xor`                   | 1  | 2  |
//! | `and`                   | 2  | 3  |
//! | `< <= > >= = /=`        | 3  | 4  |
//! | `+ -`                   | 4  | 5  |
//! | `* / %`                 | 5  | 6  |
//!
//! 単項 `+ - not` のオペランドは束縛力 6 で解析するため、どの二項演算子よりも強く結びつきます。
//! 後置の `.field` と `[index]` は一次式の解析中に処理されます。

use crate::frontend::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use crate::frontend::lexer::{TokenKind, TokenSource};
use crate::frontend::source::Span;

use super::Parser;

/// 単項演算子のオペランドを解析する束縛力
const PREFIX_BINDING_POWER: u8 = 6;

/// 二項演算子トークンの (演算子, 左束縛力, 右束縛力)
pub fn binding_power(kind: TokenKind) -> Option<(BinaryOp, u8, u8)> {
    let (op, left) = match kind {
        TokenKind::Or => (BinaryOp::Or, 0),
        TokenKind::Xor => (BinaryOp::Xor, 1),
        TokenKind::And => (BinaryOp::And, 2),
        TokenKind::Less => (BinaryOp::Less, 3),
        TokenKind::LessEqual => (BinaryOp::LessEqual, 3),
        TokenKind::Greater => (BinaryOp::Greater, 3),
        TokenKind::GreaterEqual => (BinaryOp::GreaterEqual, 3),
        TokenKind::Equal => (BinaryOp::Equal, 3),
        TokenKind::NotEqual => (BinaryOp::NotEqual, 3),
        TokenKind::Plus => (BinaryOp::Add, 4),
        TokenKind::Minus => (BinaryOp::Sub, 4),
        TokenKind::Star => (BinaryOp::Mul, 5),
        TokenKind::Slash => (BinaryOp::Div, 5),
        TokenKind::Percent => (BinaryOp::Mod, 5),
        _ => return None,
    };
    Some((op, left, left + 1))
}

fn prefix_operator(kind: TokenKind) -> Option<UnaryOp> {
    match kind {
        TokenKind::Plus => Some(UnaryOp::Plus),
        TokenKind::Minus => Some(UnaryOp::Minus),
        TokenKind::Not => Some(UnaryOp::Not),
        _ => None,
    }
}

impl<S: TokenSource> Parser<S> {
    pub(super) fn parse_expression(&mut self) -> Expr {
        self.parse_expression_bp(0)
    }

    fn parse_expression_bp(&mut self, min_bp: u8) -> Expr {
        let mut left = self.parse_prefix();

        while let Some((op, left_bp, right_bp)) = binding_power(self.current.kind) {
            if left_bp < min_bp {
                break;
            }
            self.next();
            let right = self.parse_expression_bp(right_bp);
            let span = left.span.cover(right.span);
            left = Expr::new(span, ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) });
        }

        left
    }

    fn parse_prefix(&mut self) -> Expr {
        match prefix_operator(self.current.kind) {
            Some(op) => {
                let start = self.next().span;
                let operand = self.parse_expression_bp(PREFIX_BINDING_POWER);
                let span = start.cover(operand.span);
                Expr::new(span, ExprKind::Unary { op, operand: Box::new(operand) })
            }
            None => self.parse_primary(),
        }
    }

    /// 一次式と、それに続く `.field` / `[index]` の連鎖
    pub(super) fn parse_primary(&mut self) -> Expr {
        let start = self.current.span;

        let mut expr = match self.current.kind {
            TokenKind::IntegerLiteral => {
                let token = self.next();
                Expr::integer(token.span, token.int_value().unwrap_or_default())
            }
            TokenKind::RealLiteral => {
                let token = self.next();
                Expr::real(token.span, token.real_value().unwrap_or_default())
            }
            TokenKind::BooleanLiteral => {
                let token = self.next();
                Expr::boolean(token.span, token.bool_value().unwrap_or_default())
            }
            TokenKind::Identifier => {
                let token = self.next();
                let name = token.text.unwrap_or_default();
                if self.accept(TokenKind::LParen) {
                    let args = self.parse_arguments();
                    Expr::new(self.span_from(start), ExprKind::Call { name, args })
                } else {
                    Expr::new(token.span, ExprKind::Name(name))
                }
            }
            TokenKind::LParen => {
                self.next();
                let inner = self.parse_expression();
                self.expect(TokenKind::RParen, "expected ')'");
                Expr { span: self.span_from(start), ..inner }
            }
            _ => return self.primary_error(),
        };

        loop {
            if self.accept(TokenKind::Dot) {
                let field = self.expect_identifier("field name expected");
                let span = self.span_from(start);
                expr = Expr::new(span, ExprKind::Field { receiver: Box::new(expr), field });
            } else if self.accept(TokenKind::LBracket) {
                let index = self.parse_expression();
                self.expect(TokenKind::RBracket, "expected ']'");
                let span = self.span_from(start);
                expr = Expr::new(span, ExprKind::Index { receiver: Box::new(expr), index: Box::new(index) });
            } else {
                break;
            }
        }

        expr
    }

    /// `(` の直後から `)` までの実引数
    fn parse_arguments(&mut self) -> Vec<Expr> {
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                args.push(self.parse_expression());
                if !self.accept(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "expected ')'");
        args
    }

    /// 一次式が無い場合は整数 0 を返す。
    /// 区切り・ブロック終端・ファイル終端以外の不正トークンは消費する。
    fn primary_error(&mut self) -> Expr {
        let span = self.current.span;
        self.error_at_current("primary expression expected");

        let keep = self.current.kind.is_separator()
            || matches!(self.current.kind, TokenKind::End | TokenKind::Else | TokenKind::Eof);
        if keep {
            return Expr::integer(Span::new(span.start, 0, span.line, span.column), 0);
        }
        self.next();
        Expr::integer(span, 0)
    }
}
