//! # 文の解析
//!
//! ブロックと各種の文（if / while / for / return / print / 代入・呼び出し）を解析します。

use crate::frontend::ast::{Block, BlockItem, ExprKind, Stmt, StmtKind};
use crate::frontend::lexer::{TokenKind, TokenSource};

use super::Parser;

impl<S: TokenSource> Parser<S> {
    /// `end` / `else` / 終端までのブロック
    pub(super) fn parse_block(&mut self) -> Block {
        let start = self.current.span;
        let mut items = Vec::new();
        self.skip_separators();

        while !matches!(self.current.kind, TokenKind::End | TokenKind::Else | TokenKind::Eof) {
            if matches!(self.current.kind, TokenKind::Var | TokenKind::Type) {
                items.push(BlockItem::Decl(self.parse_simple_decl()));
            } else {
                items.push(BlockItem::Stmt(self.parse_statement()));
            }
            self.skip_separators();
        }

        Block { span: self.span_from(start), items }
    }

    fn parse_statement(&mut self) -> Stmt {
        match self.current.kind {
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Return => self.parse_return(),
            TokenKind::Print => self.parse_print(),
            TokenKind::Identifier => self.parse_assign_or_call(),
            _ => {
                let span = self.current.span;
                self.error_at_current("statement expected");
                self.recover_to(&[TokenKind::End]);
                Stmt::empty(span)
            }
        }
    }

    /// 名前から始まる文。まず後置付きの一次式を読み、`:=` の有無で判別する。
    fn parse_assign_or_call(&mut self) -> Stmt {
        let start = self.current.span;
        let target = self.parse_primary();

        if self.accept(TokenKind::Assign) {
            let value = self.parse_expression();
            let span = self.span_from(start);
            return Stmt::new(span, StmtKind::Assign { target, value });
        }

        match target.kind {
            ExprKind::Call { name, args } => Stmt::new(target.span, StmtKind::Call { name, args }),
            _ => {
                self.error_at(target.span, "expected ':=' or '(' after identifier");
                self.recover_to(&[TokenKind::End]);
                Stmt::empty(target.span)
            }
        }
    }

    /// `if cond then block [else block] end`
    fn parse_if(&mut self) -> Stmt {
        let start = self.current.span;
        self.expect(TokenKind::If, "expected 'if'");
        let condition = self.parse_expression();
        self.expect(TokenKind::Then, "expected 'then'");
        let then_block = self.parse_block();
        let else_block = if self.accept(TokenKind::Else) { Some(self.parse_block()) } else { None };
        self.expect(TokenKind::End, "expected 'end'");

        Stmt::new(self.span_from(start), StmtKind::If { condition, then_block, else_block })
    }

    /// `while cond loop block end`
    fn parse_while(&mut self) -> Stmt {
        let start = self.current.span;
        self.expect(TokenKind::While, "expected 'while'");
        let condition = self.parse_expression();
        self.expect(TokenKind::Loop, "expected 'loop'");
        let body = self.parse_block();
        self.expect(TokenKind::End, "expected 'end'");

        Stmt::new(self.span_from(start), StmtKind::While { condition, body })
    }

    /// `for name in first [.. second] [reverse] loop block end`
    fn parse_for(&mut self) -> Stmt {
        let start = self.current.span;
        self.expect(TokenKind::For, "expected 'for'");
        let iterator = self.expect_identifier("iterator name expected");
        self.expect(TokenKind::In, "expected 'in'");
        let first = self.parse_expression();
        let second = if self.accept(TokenKind::DotDot) { Some(self.parse_expression()) } else { None };
        let reverse = self.accept(TokenKind::Reverse);
        self.expect(TokenKind::Loop, "expected 'loop'");
        let body = self.parse_block();
        self.expect(TokenKind::End, "expected 'end'");

        Stmt::new(
            self.span_from(start),
            StmtKind::For { iterator, first, second, reverse, body },
        )
    }

    /// `return [expr]`。区切りや `end` が続けば値なし。
    fn parse_return(&mut self) -> Stmt {
        let start = self.current.span;
        self.expect(TokenKind::Return, "expected 'return'");

        let has_value = !self.current.kind.is_separator()
            && !matches!(self.current.kind, TokenKind::End | TokenKind::Else | TokenKind::Eof);
        let value = if has_value { Some(self.parse_expression()) } else { None };

        Stmt::new(self.span_from(start), StmtKind::Return(value))
    }

    /// `print expr {, expr}`
    fn parse_print(&mut self) -> Stmt {
        let start = self.current.span;
        self.expect(TokenKind::Print, "expected 'print'");

        let mut items = vec![self.parse_expression()];
        while self.accept(TokenKind::Comma) {
            items.push(self.parse_expression());
        }

        Stmt::new(self.span_from(start), StmtKind::Print(items))
    }
}
