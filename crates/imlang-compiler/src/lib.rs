// imlang Compiler Library
// 小さな手続き型言語のコンパイララリブラリ

//! # imlang Compiler
//!
//! 小さな手続き型言語のソースコードを WebAssembly モジュールへ変換するライブラリです。
//!
//! パイプラインは次の順に進みます。
//!
//! 1. 字句解析（`frontend::lexer`）
//! 2. 構文解析（`frontend::parser`）：再帰下降 + Pratt 法
//! 3. 意味解析（`frontend::semantic`）：スコープ検査と型検査
//! 4. 最適化（`middleend::optimization`）：定数畳み込みと不要コード除去
//! 5. コード生成（`backend::wasm`）：モジュールIRの構築と、バイナリ・テキスト形式での出力
//!
//! 入力の誤りは例外ではなく診断情報として返り、各ステージは常に最後まで実行されます。

pub mod backend;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod frontend;
pub mod middleend;

// 再エクスポート
pub use self::backend::wasm::{CodegenOptions, Module};
pub use self::config::{CompilerConfig, EmitKind, OptimizationLevel};
pub use self::diagnostics::{Diagnostic, DiagnosticEmitter, Stage};
pub use self::driver::{CompilationOutput, CompilationStats, Driver};
pub use self::frontend::ast;
pub use self::frontend::error::{CompilerError, Result};
pub use self::frontend::lexer::{Lexer, Token, TokenKind};
pub use self::frontend::parser::ParseResult;
pub use self::frontend::semantic::AnalysisResult;
pub use self::frontend::source::Span;

/// コンパイラのバージョン
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// ソースをトークン列に分解する（遅延、`reset` で再開可能）
pub fn tokenize(source: &str) -> Lexer<'_> {
    frontend::lexer::tokenize(source)
}

/// ソースを構文解析する
pub fn parse(source: &str) -> ParseResult {
    frontend::parser::parse(source)
}

/// ASTを意味解析する（ASTは変更しない）
pub fn analyze(program: &ast::Program) -> AnalysisResult {
    frontend::semantic::analyze(program)
}

/// 定数畳み込みと不要コード除去を行った新しいASTを返す
pub fn optimize(program: &ast::Program) -> ast::Program {
    middleend::optimize(program)
}

/// 既定のオプションでモジュールIRを生成する
///
/// 意味解析で診断が出たASTを渡した場合の結果は規定しない。
pub fn generate(program: &ast::Program) -> Result<Module> {
    backend::wasm::generate(program, &CodegenOptions::default())
}

/// モジュールIRをバイナリ形式にする
pub fn encode_binary(module: &Module) -> Result<Vec<u8>> {
    backend::wasm::encode_binary(module)
}

/// モジュールIRをテキスト形式にする
pub fn encode_text(module: &Module) -> String {
    backend::wasm::encode_text(module)
}

/// 既定の設定で全ステージを実行する
pub fn compile(source: &str) -> Result<CompilationOutput> {
    Driver::default().compile(source)
}
