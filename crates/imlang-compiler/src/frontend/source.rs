//! # ソースカーソル
//!
//! 生のソーステキスト上を1文字ずつ進むカーソルと、位置情報 `Span` を提供します。
//! 行・列はカーソルが進むたびに更新され、任意位置への巻き戻しでは先頭から再計算します。

use std::fmt;

/// ソース上の範囲
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// 開始バイトオフセット
    pub start: usize,
    /// バイト長
    pub length: usize,
    /// 行番号（1始まり）
    pub line: usize,
    /// 列番号（1始まり）
    pub column: usize,
}

impl Span {
    /// 新しい範囲を作成
    pub fn new(start: usize, length: usize, line: usize, column: usize) -> Self {
        Self { start, length, line, column }
    }

    /// 終端オフセット（排他的）
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    /// 二つの範囲を包含する範囲を返す
    pub fn cover(&self, other: Span) -> Span {
        let first = if other.start < self.start { other } else { *self };
        let end = self.end().max(other.end());
        Span::new(first.start, end - first.start, first.line, first.column)
    }

    /// `other` がこの範囲に含まれるか
    pub fn contains(&self, other: Span) -> bool {
        self.start <= other.start && other.end() <= self.end()
    }

    /// 範囲に対応するソース文字列を取り出す
    pub fn extract_source<'a>(&self, source: &'a str) -> &'a str {
        let end = self.end().min(source.len());
        source.get(self.start.min(end)..end).unwrap_or("")
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// 文字単位のソースカーソル
#[derive(Debug, Clone)]
pub struct SourceCursor<'a> {
    text: &'a str,
    position: usize,
    line: usize,
    column: usize,
}

impl<'a> SourceCursor<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text, position: 0, line: 1, column: 1 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn column(&self) -> usize {
        self.column
    }

    /// 現在の文字を覗く
    pub fn peek(&self) -> Option<char> {
        self.text[self.position..].chars().next()
    }

    /// 次の文字を覗く
    pub fn peek_ahead(&self) -> Option<char> {
        let mut chars = self.text[self.position..].chars();
        chars.next();
        chars.next()
    }

    /// 1文字進める
    ///
    /// 改行は `\n` と単独の `\r` のどちらでも行を進める。
    /// `\r\n` の場合は `\r` の時点では列だけ進み、続く `\n` で行が進む。
    pub fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.position += c.len_utf8();
        match c {
            '\n' => {
                self.line += 1;
                self.column = 1;
            }
            '\r' if self.peek() != Some('\n') => {
                self.line += 1;
                self.column = 1;
            }
            _ => self.column += 1,
        }
        Some(c)
    }

    /// 期待する文字なら消費する
    pub fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// 任意位置へ移動する
    ///
    /// 行・列は先頭から再生して求め直す。文字境界の途中を指した場合は直前の境界に丸める。
    pub fn reset(&mut self, position: usize) {
        let mut target = position.min(self.text.len());
        while !self.text.is_char_boundary(target) {
            target -= 1;
        }
        self.position = 0;
        self.line = 1;
        self.column = 1;
        while self.position < target {
            self.advance();
        }
    }

    /// `start` から現在位置までの範囲
    pub fn span_from(&self, start: usize, line: usize, column: usize) -> Span {
        Span::new(start, self.position - start, line, column)
    }

    /// `start` から現在位置までのテキスト
    pub fn slice_from(&self, start: usize) -> &'a str {
        &self.text[start..self.position]
    }
}
