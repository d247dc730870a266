//! # エラー処理モジュール
//!
//! 利用者の入力ミスは診断情報（`Diagnostic`）として扱い、ここでは扱いません。
//! このモジュールのエラーは処理を継続できない失敗（コード生成不能、内部不整合、I/O、設定）を表します。

use std::io;

use thiserror::Error;

use crate::frontend::source::Span;

/// コンパイラエラー
#[derive(Debug, Error)]
pub enum CompilerError {
    /// コード生成エラー
    #[error("コード生成エラー: {message}")]
    CodeGen {
        message: String,
        span: Option<Span>,
    },

    /// 内部エラー（解析器自身の不変条件違反）
    #[error("内部エラー: {0}")]
    Internal(String),

    /// I/Oエラー
    #[error("I/Oエラー: {0}")]
    Io(#[from] io::Error),

    /// 設定エラー
    #[error("設定エラー: {0}")]
    Config(String),
}

impl CompilerError {
    pub fn codegen(message: impl Into<String>, span: Option<Span>) -> Self {
        CompilerError::CodeGen { message: message.into(), span }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        CompilerError::Internal(message.into())
    }

    /// エラーに位置情報があれば返す
    pub fn span(&self) -> Option<Span> {
        match self {
            CompilerError::CodeGen { span, .. } => *span,
            _ => None,
        }
    }
}

impl From<toml::de::Error> for CompilerError {
    fn from(error: toml::de::Error) -> Self {
        CompilerError::Config(error.to_string())
    }
}

/// コンパイラの結果型
pub type Result<T> = std::result::Result<T, CompilerError>;
