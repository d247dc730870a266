//! # トークン定義
//!
//! レキサーが生成するトークンの種類、位置情報、リテラル値を定義します。

use std::fmt;

use crate::frontend::source::Span;

/// トークンの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // 特殊
    /// ファイル終端
    Eof,
    /// 字句エラー
    Error,
    /// 改行（文の区切り）
    NewLine,

    // 識別子とリテラル
    /// 識別子
    Identifier,
    /// 整数リテラル
    IntegerLiteral,
    /// 実数リテラル
    RealLiteral,
    /// 真偽値リテラル
    BooleanLiteral,

    // キーワード
    Var,
    Type,
    Record,
    Array,
    Routine,
    Is,
    End,
    If,
    Then,
    Else,
    While,
    For,
    In,
    Reverse,
    Loop,
    Return,
    Print,
    And,
    Or,
    Xor,
    Not,

    // 区切り記号
    /// 左括弧 (
    LParen,
    /// 右括弧 )
    RParen,
    /// 左角括弧 [
    LBracket,
    /// 右角括弧 ]
    RBracket,
    /// カンマ ,
    Comma,
    /// コロン :
    Colon,
    /// セミコロン ;
    Semicolon,
    /// ドット .
    Dot,

    // 演算子
    /// 範囲 ..
    DotDot,
    /// 代入 :=
    Assign,
    /// 矢印 =>
    Arrow,
    /// 加算 +
    Plus,
    /// 減算 -
    Minus,
    /// 乗算 *
    Star,
    /// 除算 /
    Slash,
    /// 剰余 %
    Percent,
    /// 小なり <
    Less,
    /// 以下 <=
    LessEqual,
    /// 大なり >
    Greater,
    /// 以上 >=
    GreaterEqual,
    /// 等価 =
    Equal,
    /// 非等価 /=
    NotEqual,
}

impl TokenKind {
    /// 宣言の開始トークンかどうか
    pub fn is_declaration_start(&self) -> bool {
        matches!(self, TokenKind::Var | TokenKind::Type | TokenKind::Routine)
    }

    /// 文・宣言の区切りかどうか
    pub fn is_separator(&self) -> bool {
        matches!(self, TokenKind::NewLine | TokenKind::Semicolon)
    }

    pub fn is_keyword(&self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Var | Type | Record | Array | Routine | Is | End | If | Then | Else | While | For
                | In | Reverse | Loop | Return | Print | And | Or | Xor | Not
        )
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            TokenKind::IntegerLiteral | TokenKind::RealLiteral | TokenKind::BooleanLiteral
        )
    }

    pub fn is_operator(&self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            DotDot | Assign | Arrow | Plus | Minus | Star | Slash | Percent | Less | LessEqual
                | Greater | GreaterEqual | Equal | NotEqual | And | Or | Xor | Not
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use TokenKind::*;
        let text = match self {
            Eof => "end of file",
            Error => "error",
            NewLine => "newline",
            Identifier => "identifier",
            IntegerLiteral => "integer literal",
            RealLiteral => "real literal",
            BooleanLiteral => "boolean literal",
            Var => "'var'",
            Type => "'type'",
            Record => "'record'",
            Array => "'array'",
            Routine => "'routine'",
            Is => "'is'",
            End => "'end'",
            If => "'if'",
            Then => "'then'",
            Else => "'else'",
            While => "'while'",
            For => "'for'",
            In => "'in'",
            Reverse => "'reverse'",
            Loop => "'loop'",
            Return => "'return'",
            Print => "'print'",
            And => "'and'",
            Or => "'or'",
            Xor => "'xor'",
            Not => "'not'",
            LParen => "'('",
            RParen => "')'",
            LBracket => "'['",
            RBracket => "']'",
            Comma => "','",
            Colon => "':'",
            Semicolon => "';'",
            Dot => "'.'",
            DotDot => "'..'",
            Assign => "':='",
            Arrow => "'=>'",
            Plus => "'+'",
            Minus => "'-'",
            Star => "'*'",
            Slash => "'/'",
            Percent => "'%'",
            Less => "'<'",
            LessEqual => "'<='",
            Greater => "'>'",
            GreaterEqual => "'>='",
            Equal => "'='",
            NotEqual => "'/='",
        };
        f.write_str(text)
    }
}

/// リテラルトークンが保持する値
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenValue {
    Integer(i64),
    Real(f64),
    Boolean(bool),
}

/// トークン
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// 種類
    pub kind: TokenKind,
    /// 位置
    pub span: Span,
    /// ソース上の文字列（エラートークンではメッセージ）
    pub text: Option<String>,
    /// 解析済みのリテラル値
    pub value: Option<TokenValue>,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span, text: Option<String>) -> Self {
        Self { kind, span, text, value: None }
    }

    /// 値付きトークンを作成
    pub fn with_value(mut self, value: TokenValue) -> Self {
        self.value = Some(value);
        self
    }

    /// 字句エラートークンを作成
    pub fn error(span: Span, message: impl Into<String>) -> Self {
        Self::new(TokenKind::Error, span, Some(message.into()))
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    pub fn int_value(&self) -> Option<i64> {
        match self.value {
            Some(TokenValue::Integer(v)) => Some(v),
            _ => None,
        }
    }

    pub fn real_value(&self) -> Option<f64> {
        match self.value {
            Some(TokenValue::Real(v)) => Some(v),
            _ => None,
        }
    }

    pub fn bool_value(&self) -> Option<bool> {
        match self.value {
            Some(TokenValue::Boolean(v)) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.text) {
            (TokenKind::NewLine, _) | (TokenKind::Eof, _) => write!(f, "{:?} @{}", self.kind, self.span),
            (_, Some(text)) => write!(f, "{:?}({}) @{}", self.kind, text, self.span),
            (_, None) => write!(f, "{:?} @{}", self.kind, self.span),
        }
    }
}

/// キーワード表
pub const KEYWORDS: &[(&str, TokenKind)] = &[
    ("var", TokenKind::Var),
    ("type", TokenKind::Type),
    ("record", TokenKind::Record),
    ("array", TokenKind::Array),
    ("routine", TokenKind::Routine),
    ("is", TokenKind::Is),
    ("end", TokenKind::End),
    ("if", TokenKind::If),
    ("then", TokenKind::Then),
    ("else", TokenKind::Else),
    ("while", TokenKind::While),
    ("for", TokenKind::For),
    ("in", TokenKind::In),
    ("reverse", TokenKind::Reverse),
    ("loop", TokenKind::Loop),
    ("return", TokenKind::Return),
    ("print", TokenKind::Print),
    ("and", TokenKind::And),
    ("or", TokenKind::Or),
    ("xor", TokenKind::Xor),
    ("not", TokenKind::Not),
];
