//! # パーサー（構文解析器）
//!
//! トークン列から抽象構文木を構築する再帰下降パーサーです。
//! 式の解析は束縛力表を使う Pratt パーサー（`expression` モジュール）に委譲します。
//!
//! パーサーは決して中断しません。想定外のトークンに出会うと診断情報を記録し、
//! 期待した種類の合成トークンを返すか、区切りまで読み飛ばして解析を続けます。

use std::mem;

use crate::diagnostics::Diagnostic;
use crate::frontend::ast::{Decl, Expr, Param, Program, RoutineBody, RoutineDecl, TypeDecl, VarDecl};
use crate::frontend::lexer::{Lexer, Token, TokenBuffer, TokenKind, TokenSource};
use crate::frontend::source::Span;

mod expression;
mod statement;
mod types;

pub use expression::binding_power;

/// 構文解析の結果
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// 構築されたプログラム（エラーがあっても部分的に構築される）
    pub program: Program,
    /// 字句・構文の診断情報
    pub diagnostics: Vec<Diagnostic>,
}

impl ParseResult {
    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

/// パーサー
pub struct Parser<S: TokenSource> {
    /// トークンの供給元
    tokens: S,
    /// 現在のトークン
    current: Token,
    /// 直前に消費したトークンの範囲
    previous_span: Span,
    /// 診断情報
    diagnostics: Vec<Diagnostic>,
}

impl<S: TokenSource> Parser<S> {
    /// 新しいパーサーを作成
    pub fn new(tokens: S) -> Self {
        let mut parser = Self {
            tokens,
            current: Token::new(TokenKind::Eof, Span::default(), None),
            previous_span: Span::default(),
            diagnostics: Vec::new(),
        };
        parser.current = parser.fetch();
        parser
    }

    /// プログラム全体を解析
    pub fn parse_program(mut self) -> ParseResult {
        let start = self.current.span;
        let mut declarations = Vec::new();
        self.skip_separators();

        while !self.check(TokenKind::Eof) {
            match self.current.kind {
                TokenKind::Var | TokenKind::Type => declarations.push(self.parse_simple_decl()),
                TokenKind::Routine => declarations.push(Decl::Routine(self.parse_routine_decl())),
                _ => {
                    self.error_at_current("declaration expected");
                    self.recover_to(&[TokenKind::Var, TokenKind::Type, TokenKind::Routine]);
                }
            }
            self.skip_separators();
        }

        let end = self.current.span.end().max(start.start);
        let span = Span::new(start.start, end - start.start, start.line, start.column);
        log::debug!("構文解析完了: 宣言 {} 件, 診断 {} 件", declarations.len(), self.diagnostics.len());

        ParseResult {
            program: Program { span, declarations },
            diagnostics: self.diagnostics,
        }
    }

    /// 単独の式を解析（残りのトークンは無視しない：末尾に余りがあれば診断）
    pub fn parse_standalone_expression(mut self) -> (Expr, Vec<Diagnostic>) {
        self.skip_separators();
        let expr = self.parse_expression();
        self.skip_separators();
        if !self.check(TokenKind::Eof) {
            self.error_at_current("unexpected token after expression");
        }
        (expr, self.diagnostics)
    }

    // ---- トークン操作 ----

    /// 供給元から次のトークンを取り出す。字句エラーは診断にして読み飛ばす。
    fn fetch(&mut self) -> Token {
        loop {
            let token = self.tokens.next_token();
            if token.is(TokenKind::Error) {
                self.diagnostics.push(Diagnostic::lexical(token.span, token.text()));
                continue;
            }
            return token;
        }
    }

    /// 現在のトークンを消費して返す
    fn next(&mut self) -> Token {
        let upcoming = self.fetch();
        let token = mem::replace(&mut self.current, upcoming);
        self.previous_span = token.span;
        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.is(kind)
    }

    /// 一致すれば消費する（診断なし）
    fn accept(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.next();
            true
        } else {
            false
        }
    }

    /// 一致すれば消費し、しなければ診断を記録して合成トークンを返す
    fn expect(&mut self, kind: TokenKind, message: &str) -> Token {
        if self.check(kind) {
            return self.next();
        }
        let found = self.current.kind;
        self.error_at_current(format!("{} (got: {})", message, found));
        Token::new(kind, self.current.span, None)
    }

    /// 識別子を期待し、その名前を返す
    fn expect_identifier(&mut self, message: &str) -> String {
        let token = self.expect(TokenKind::Identifier, message);
        token.text.unwrap_or_else(|| "<error>".to_string())
    }

    fn error_at_current(&mut self, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::syntax(self.current.span, message));
    }

    fn error_at(&mut self, span: Span, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::syntax(span, message));
    }

    fn skip_separators(&mut self) {
        while self.current.kind.is_separator() {
            self.next();
        }
    }

    /// 区切り・番兵・終端のいずれかまで読み飛ばす
    fn recover_to(&mut self, sentinels: &[TokenKind]) {
        while !self.check(TokenKind::Eof)
            && !self.current.kind.is_separator()
            && !sentinels.contains(&self.current.kind)
        {
            self.next();
        }
        self.skip_separators();
    }

    /// `start` から直前に消費したトークンの終端までの範囲
    fn span_from(&self, start: Span) -> Span {
        let end = self.previous_span.end().max(start.start);
        Span::new(start.start, end - start.start, start.line, start.column)
    }

    // ---- 宣言 ----

    fn parse_simple_decl(&mut self) -> Decl {
        if self.check(TokenKind::Type) {
            Decl::Type(self.parse_type_decl())
        } else {
            Decl::Var(self.parse_var_decl())
        }
    }

    /// `var name [: type] [is expr]`
    fn parse_var_decl(&mut self) -> VarDecl {
        let start = self.current.span;
        self.expect(TokenKind::Var, "expected 'var'");
        let name = self.expect_identifier("variable name expected");

        let ty = if self.accept(TokenKind::Colon) { Some(self.parse_type()) } else { None };
        let initializer = if self.accept(TokenKind::Is) { Some(self.parse_expression()) } else { None };

        VarDecl { span: self.span_from(start), name, ty, initializer }
    }

    /// `type Name is type`
    fn parse_type_decl(&mut self) -> TypeDecl {
        let start = self.current.span;
        self.expect(TokenKind::Type, "expected 'type'");
        let name = self.expect_identifier("type name expected");
        self.expect(TokenKind::Is, "expected 'is'");
        let ty = self.parse_type();
        TypeDecl { span: self.span_from(start), name, ty }
    }

    /// ルーチン宣言。続くトークンで前方宣言・式本体・ブロック本体を判別する。
    fn parse_routine_decl(&mut self) -> RoutineDecl {
        let start = self.current.span;
        self.expect(TokenKind::Routine, "expected 'routine'");
        let name = self.expect_identifier("routine name expected");
        let params = self.parse_params();

        let return_type = if self.accept(TokenKind::Colon) { Some(self.parse_type()) } else { None };

        let body = if self.current.kind.is_separator() || self.check(TokenKind::Eof) {
            None
        } else if self.accept(TokenKind::Arrow) {
            Some(RoutineBody::Expr(self.parse_expression()))
        } else {
            self.expect(TokenKind::Is, "expected 'is'");
            let block = self.parse_block();
            self.expect(TokenKind::End, "expected 'end'");
            Some(RoutineBody::Block(block))
        };

        RoutineDecl { span: self.span_from(start), name, params, return_type, body }
    }

    fn parse_params(&mut self) -> Vec<Param> {
        let mut params = Vec::new();
        self.expect(TokenKind::LParen, "expected '('");
        if !self.check(TokenKind::RParen) {
            loop {
                let start = self.current.span;
                let name = self.expect_identifier("parameter name expected");
                self.expect(TokenKind::Colon, "expected ':'");
                let ty = self.parse_type();
                params.push(Param { span: self.span_from(start), name, ty });
                if !self.accept(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "expected ')'");
        params
    }
}

/// ソースを構文解析する
pub fn parse(source: &str) -> ParseResult {
    Parser::new(Lexer::new(source)).parse_program()
}

/// 用意済みのトークン列を構文解析する
pub fn parse_tokens(tokens: Vec<Token>) -> ParseResult {
    Parser::new(TokenBuffer::new(tokens)).parse_program()
}

/// 単独の式を構文解析する
pub fn parse_expression(source: &str) -> (Expr, Vec<Diagnostic>) {
    Parser::new(Lexer::new(source)).parse_standalone_expression()
}
