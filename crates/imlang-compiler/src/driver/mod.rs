//! # コンパイラドライバー
//!
//! コンパイルパイプライン全体を管理するモジュールです。
//! フロントエンド、ミドルエンド、バックエンドの各段階を調整します。

pub mod compiler;

pub use self::compiler::{CompilationOutput, CompilationStats, Driver};

use std::fs;
use std::path::Path;

use crate::config::CompilerConfig;
use crate::frontend::error::Result;

/// ソースファイルを読み込んでコンパイルする
///
/// # 例
///
/// ```no_run
/// use imlang_compiler::config::CompilerConfig;
/// use imlang_compiler::driver::compile_file;
///
/// let output = compile_file("demo/main.iml", CompilerConfig::default())?;
/// for diagnostic in &output.diagnostics {
///     eprintln!("{}", diagnostic);
/// }
/// # Ok::<(), imlang_compiler::CompilerError>(())
/// ```
pub fn compile_file(path: impl AsRef<Path>, config: CompilerConfig) -> Result<CompilationOutput> {
    let path = path.as_ref();
    let source = fs::read_to_string(path)?;
    log::info!("コンパイル開始: {}", path.display());
    Driver::new(config).compile(&source)
}
