//! # 意味解析モジュール
//!
//! 構文解析で得られたASTに対してスコープ検査と型検査を行います。

pub mod analyzer;
pub mod symbol_table;
pub mod types;

pub use analyzer::{AnalysisResult, SemanticAnalyzer};
pub use symbol_table::{RoutineSignature, ScopeKind, Symbol, SymbolTable};
pub use types::{PrimitiveType, RecordType, TypeInfo, TypeResolver};

use crate::frontend::ast::Program;

/// プログラムを意味解析する
pub fn analyze(program: &Program) -> AnalysisResult {
    SemanticAnalyzer::new().analyze(program)
}
