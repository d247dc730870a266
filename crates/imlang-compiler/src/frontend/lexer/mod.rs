//! # レキサー（字句解析器）
//!
//! ソースコードを字句解析し、トークン列に変換するモジュールです。
//! 改行は文の区切りとして意味を持つため `NewLine` トークンとして返します。
//! エラーは例外ではなく `Error` トークンとしてストリーム中に現れ、
//! 呼び出し側はその後も `next_token` を呼び続けることができます。

use std::collections::{HashMap, VecDeque};

use crate::frontend::source::{SourceCursor, Span};

pub mod token;

pub use token::{Token, TokenKind, TokenValue, KEYWORDS};

/// トークンの供給元
///
/// パーサーはレキサーにも、事前に用意されたトークン列にも対応する。
pub trait TokenSource {
    /// 次のトークンを取得する。終端に達した後は `Eof` を返し続ける。
    fn next_token(&mut self) -> Token;
}

/// レキサー
pub struct Lexer<'a> {
    /// 文字カーソル
    cursor: SourceCursor<'a>,
    /// キーワード表
    keywords: HashMap<&'static str, TokenKind>,
    /// 先読みバッファ
    lookahead: VecDeque<Token>,
    /// イテレータとして `Eof` を返し終えたか
    finished: bool,
}

impl<'a> Lexer<'a> {
    /// 新しいレキサーを作成
    pub fn new(source: &'a str) -> Self {
        Self {
            cursor: SourceCursor::new(source),
            keywords: KEYWORDS.iter().copied().collect(),
            lookahead: VecDeque::new(),
            finished: false,
        }
    }

    /// 次のトークンを取得して消費する
    pub fn next_token(&mut self) -> Token {
        match self.lookahead.pop_front() {
            Some(token) => token,
            None => self.scan(),
        }
    }

    /// k番目（1始まり）の未消費トークンを覗く
    pub fn peek(&mut self, k: usize) -> &Token {
        let k = k.max(1);
        while self.lookahead.len() < k {
            let token = self.scan();
            self.lookahead.push_back(token);
        }
        &self.lookahead[k - 1]
    }

    /// 先読みを破棄して指定位置から再開する
    pub fn reset(&mut self, position: usize) {
        self.lookahead.clear();
        self.cursor.reset(position);
        self.finished = false;
    }

    fn scan(&mut self) -> Token {
        self.skip_trivia();

        let start = self.cursor.position();
        let line = self.cursor.line();
        let column = self.cursor.column();

        let c = match self.cursor.peek() {
            Some(c) => c,
            None => return Token::new(TokenKind::Eof, Span::new(start, 0, line, column), None),
        };

        if c == '\n' || c == '\r' {
            self.cursor.advance();
            if c == '\r' {
                self.cursor.match_char('\n');
            }
            return self.make_token(TokenKind::NewLine, start, line, column);
        }

        if c.is_ascii_alphabetic() || c == '_' {
            return self.identifier(start, line, column);
        }

        if c.is_ascii_digit() {
            return self.number(start, line, column);
        }

        self.operator(c, start, line, column)
    }

    /// 空白と行コメントを読み飛ばす（改行は残す）
    fn skip_trivia(&mut self) {
        loop {
            match self.cursor.peek() {
                Some(' ') | Some('\t') => {
                    self.cursor.advance();
                }
                Some('/') if self.cursor.peek_ahead() == Some('/') => {
                    while let Some(c) = self.cursor.peek() {
                        if c == '\n' || c == '\r' {
                            break;
                        }
                        self.cursor.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn make_token(&self, kind: TokenKind, start: usize, line: usize, column: usize) -> Token {
        let span = self.cursor.span_from(start, line, column);
        Token::new(kind, span, Some(self.cursor.slice_from(start).to_string()))
    }

    fn error_token(&self, message: impl Into<String>, start: usize, line: usize, column: usize) -> Token {
        Token::error(self.cursor.span_from(start, line, column), message)
    }

    fn identifier(&mut self, start: usize, line: usize, column: usize) -> Token {
        while matches!(self.cursor.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.cursor.advance();
        }

        let text = self.cursor.slice_from(start);
        match text {
            "true" | "false" => self
                .make_token(TokenKind::BooleanLiteral, start, line, column)
                .with_value(TokenValue::Boolean(text == "true")),
            _ => {
                let kind = self.keywords.get(text).copied().unwrap_or(TokenKind::Identifier);
                self.make_token(kind, start, line, column)
            }
        }
    }

    fn skip_digits(&mut self) {
        while matches!(self.cursor.peek(), Some(c) if c.is_ascii_digit()) {
            self.cursor.advance();
        }
    }

    fn number(&mut self, start: usize, line: usize, column: usize) -> Token {
        self.skip_digits();

        // `1..3` の `.` は範囲演算子に属するので消費しない
        let is_real = self.cursor.peek() == Some('.')
            && matches!(self.cursor.peek_ahead(), Some(c) if c.is_ascii_digit());
        if !is_real {
            return self.integer_token(start, line, column);
        }

        self.cursor.advance();
        self.skip_digits();
        self.try_exponent();

        if self.at_extra_fraction() {
            while self.at_extra_fraction() {
                self.cursor.advance();
                self.skip_digits();
            }
            return self.error_token(
                "Invalid number literal: multiple decimal points",
                start,
                line,
                column,
            );
        }

        self.real_token(start, line, column)
    }

    fn at_extra_fraction(&self) -> bool {
        self.cursor.peek() == Some('.')
            && matches!(self.cursor.peek_ahead(), Some(c) if c.is_ascii_digit())
    }

    /// 指数部 `[eE][+-]?digits` を読む。不正なら読む前の位置に戻す。
    fn try_exponent(&mut self) {
        if !matches!(self.cursor.peek(), Some('e') | Some('E')) {
            return;
        }

        let saved = self.cursor.clone();
        self.cursor.advance();
        if matches!(self.cursor.peek(), Some('+') | Some('-')) {
            self.cursor.advance();
        }
        if matches!(self.cursor.peek(), Some(c) if c.is_ascii_digit()) {
            self.skip_digits();
        } else {
            self.cursor = saved;
        }
    }

    fn integer_token(&self, start: usize, line: usize, column: usize) -> Token {
        match self.cursor.slice_from(start).parse::<i64>() {
            Ok(value) => self
                .make_token(TokenKind::IntegerLiteral, start, line, column)
                .with_value(TokenValue::Integer(value)),
            Err(_) => self.error_token("Malformed integer literal", start, line, column),
        }
    }

    fn real_token(&self, start: usize, line: usize, column: usize) -> Token {
        match self.cursor.slice_from(start).parse::<f64>() {
            Ok(value) if value.is_finite() => self
                .make_token(TokenKind::RealLiteral, start, line, column)
                .with_value(TokenValue::Real(value)),
            _ => self.error_token("Malformed real literal", start, line, column),
        }
    }

    fn operator(&mut self, c: char, start: usize, line: usize, column: usize) -> Token {
        self.cursor.advance();
        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '%' => TokenKind::Percent,
            ':' => self.either('=', TokenKind::Assign, TokenKind::Colon),
            '=' => self.either('>', TokenKind::Arrow, TokenKind::Equal),
            '.' => self.either('.', TokenKind::DotDot, TokenKind::Dot),
            '<' => self.either('=', TokenKind::LessEqual, TokenKind::Less),
            '>' => self.either('=', TokenKind::GreaterEqual, TokenKind::Greater),
            '/' => self.either('=', TokenKind::NotEqual, TokenKind::Slash),
            other => {
                return self.error_token(format!("Unexpected char '{}'", other), start, line, column);
            }
        };
        self.make_token(kind, start, line, column)
    }

    /// 最長一致：次の文字が `next` なら二文字の演算子
    fn either(&mut self, next: char, long: TokenKind, short: TokenKind) -> TokenKind {
        if self.cursor.match_char(next) {
            long
        } else {
            short
        }
    }
}

impl TokenSource for Lexer<'_> {
    fn next_token(&mut self) -> Token {
        Lexer::next_token(self)
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    /// 最初の `Eof` までを返し、その後は `reset` されるまで `None`
    fn next(&mut self) -> Option<Token> {
        if self.finished {
            return None;
        }
        let token = self.next_token();
        if token.is(TokenKind::Eof) {
            self.finished = true;
        }
        Some(token)
    }
}

/// 事前に用意されたトークン列
///
/// 末尾に `Eof` が無くても、尽きた後は最後の位置の `Eof` を返し続ける。
pub struct TokenBuffer {
    tokens: std::vec::IntoIter<Token>,
    eof_span: Span,
}

impl TokenBuffer {
    pub fn new(tokens: Vec<Token>) -> Self {
        let eof_span = tokens
            .last()
            .map(|t| Span::new(t.span.end(), 0, t.span.line, t.span.column + t.span.length))
            .unwrap_or_default();
        Self { tokens: tokens.into_iter(), eof_span }
    }
}

impl TokenSource for TokenBuffer {
    fn next_token(&mut self) -> Token {
        match self.tokens.next() {
            Some(token) => {
                if token.is(TokenKind::Eof) {
                    self.eof_span = token.span;
                }
                token
            }
            None => Token::new(TokenKind::Eof, self.eof_span, None),
        }
    }
}

/// ソースをトークン化するストリームを作成
pub fn tokenize(source: &str) -> Lexer<'_> {
    Lexer::new(source)
}

/// ソースを `Eof` まで一括でトークン化する
pub fn tokenize_all(source: &str) -> Vec<Token> {
    let tokens: Vec<Token> = Lexer::new(source).collect();
    log::debug!("字句解析完了: {} トークン", tokens.len());
    tokens
}
