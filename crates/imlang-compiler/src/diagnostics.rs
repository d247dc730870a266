//! 診断情報モジュール
//!
//! 各ステージが報告する診断情報（位置とメッセージ）を保持し、ログへ出力します。
//! 重大度はエラーのみで、整形表示は呼び出し側の責務です。

use std::fmt;

use crate::frontend::source::Span;

/// 診断を報告したステージ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// 字句解析
    Lexical,
    /// 構文解析
    Syntax,
    /// 意味解析
    Semantic,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Lexical => write!(f, "字句エラー"),
            Stage::Syntax => write!(f, "構文エラー"),
            Stage::Semantic => write!(f, "意味エラー"),
        }
    }
}

/// 診断情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// ステージ
    pub stage: Stage,
    /// 位置
    pub span: Span,
    /// メッセージ
    pub message: String,
}

impl Diagnostic {
    pub fn new(stage: Stage, span: Span, message: impl Into<String>) -> Self {
        Self { stage, span, message: message.into() }
    }

    pub fn lexical(span: Span, message: impl Into<String>) -> Self {
        Self::new(Stage::Lexical, span, message)
    }

    pub fn syntax(span: Span, message: impl Into<String>) -> Self {
        Self::new(Stage::Syntax, span, message)
    }

    pub fn semantic(span: Span, message: impl Into<String>) -> Self {
        Self::new(Stage::Semantic, span, message)
    }

    pub fn line(&self) -> usize {
        self.span.line
    }

    pub fn column(&self) -> usize {
        self.span.column
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.span.line, self.span.column, self.message)
    }
}

/// 診断情報エミッタ - 診断情報を蓄積してログに出力する
#[derive(Debug, Default)]
pub struct DiagnosticEmitter {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 診断情報をログに出力
    pub fn emit(&self, diagnostic: &Diagnostic) {
        log::error!("[{}] {}", diagnostic.stage, diagnostic);
    }

    /// 診断情報を追加
    pub fn add_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// まとめて追加
    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.diagnostics.extend(diagnostics);
    }

    /// 蓄積済みのものを全て出力
    pub fn emit_all(&self) {
        for diagnostic in &self.diagnostics {
            self.emit(diagnostic);
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    /// 指定ステージの診断数
    pub fn count(&self, stage: Stage) -> usize {
        self.diagnostics.iter().filter(|d| d.stage == stage).count()
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}
