//! # コンパイラドライバー本体
//!
//! 字句解析から出力まで全ステージを順に実行し、診断情報と統計を集めます。

use std::time::{Duration, Instant};

use crate::backend::wasm::{self, Module};
use crate::config::CompilerConfig;
use crate::diagnostics::{Diagnostic, DiagnosticEmitter, Stage};
use crate::frontend::ast::Program;
use crate::frontend::error::Result;
use crate::frontend::lexer;
use crate::frontend::parser;
use crate::frontend::semantic;
use crate::middleend::ProgramOptimizer;

/// コンパイル時の統計情報
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CompilationStats {
    /// 字句解析にかかった時間
    pub lexing_time: Duration,
    /// 構文解析にかかった時間
    pub parsing_time: Duration,
    /// 意味解析にかかった時間
    pub semantic_time: Duration,
    /// 最適化にかかった時間
    pub optimization_time: Duration,
    /// コード生成にかかった時間
    pub codegen_time: Duration,
    /// 合計時間
    pub total_time: Duration,
    /// ソースの行数
    pub source_lines: usize,
    /// トークン数（EOFを含む）
    pub token_count: usize,
    /// トップレベル宣言の数
    pub declaration_count: usize,
    /// 字句エラー数
    pub lexical_errors: usize,
    /// 構文エラー数
    pub syntax_errors: usize,
    /// 意味エラー数
    pub semantic_errors: usize,
    /// 畳み込まれた式の数
    pub constants_folded: usize,
    /// 除去された文の数
    pub statements_removed: usize,
    /// 生成した関数の数
    pub function_count: usize,
}

impl CompilationStats {
    pub fn error_count(&self) -> usize {
        self.lexical_errors + self.syntax_errors + self.semantic_errors
    }
}

/// コンパイル結果
#[derive(Debug, Clone)]
pub struct CompilationOutput {
    /// 最終的なAST（最適化を行った場合は最適化後）
    pub program: Program,
    /// 全ステージの診断情報（報告順）
    pub diagnostics: Vec<Diagnostic>,
    /// 生成したモジュール。診断があればコード生成は行わない。
    pub module: Option<Module>,
    /// 統計情報
    pub stats: CompilationStats,
}

impl CompilationOutput {
    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    /// バイナリ形式。モジュールが無ければ `None`。
    pub fn to_binary(&self) -> Result<Option<Vec<u8>>> {
        self.module.as_ref().map(wasm::encode_binary).transpose()
    }

    /// テキスト形式。モジュールが無ければ `None`。
    pub fn to_text(&self) -> Option<String> {
        self.module.as_ref().map(wasm::encode_text)
    }
}

/// コンパイラドライバー
#[derive(Debug, Clone, Default)]
pub struct Driver {
    config: CompilerConfig,
}

impl Driver {
    /// 新しいドライバーを作成
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// ソース文字列をコンパイル
    ///
    /// 入力の誤りは診断情報として返し、`Err` にはならない。
    /// `Err` はコード生成不能や内部エラーの場合のみ。
    pub fn compile(&self, source: &str) -> Result<CompilationOutput> {
        let total_start = Instant::now();
        let mut stats = CompilationStats {
            source_lines: source.lines().count(),
            ..CompilationStats::default()
        };
        let mut emitter = DiagnosticEmitter::new();

        // 字句解析
        let start = Instant::now();
        let tokens = lexer::tokenize_all(source);
        stats.lexing_time = start.elapsed();
        stats.token_count = tokens.len();

        // 構文解析
        let start = Instant::now();
        let parsed = parser::parse_tokens(tokens);
        stats.parsing_time = start.elapsed();
        emitter.extend(parsed.diagnostics);
        let mut program = parsed.program;
        stats.declaration_count = program.declarations.len();
        log::info!("構文解析完了: 宣言 {} 個 ({:?})", stats.declaration_count, stats.parsing_time);

        // 意味解析
        let start = Instant::now();
        let analysis = semantic::analyze(&program);
        stats.semantic_time = start.elapsed();
        emitter.extend(analysis.diagnostics);
        log::info!("意味解析完了 ({:?})", stats.semantic_time);

        stats.lexical_errors = emitter.count(Stage::Lexical);
        stats.syntax_errors = emitter.count(Stage::Syntax);
        stats.semantic_errors = emitter.count(Stage::Semantic);

        let module = if emitter.has_errors() {
            emitter.emit_all();
            log::warn!("診断が {} 件あるため、コード生成を行いません", stats.error_count());
            None
        } else {
            // 最適化
            if self.config.should_optimize() {
                let start = Instant::now();
                let mut optimizer = ProgramOptimizer::new();
                program = optimizer.optimize(&program);
                let optimization = optimizer.stats();
                stats.optimization_time = start.elapsed();
                stats.constants_folded = optimization.constants_folded;
                stats.statements_removed = optimization.statements_removed;
                log::info!(
                    "最適化完了: 畳み込み {} 件, 除去 {} 件 ({:?})",
                    stats.constants_folded,
                    stats.statements_removed,
                    stats.optimization_time
                );
            }

            // コード生成
            let start = Instant::now();
            let module = wasm::generate(&program, &self.config.codegen_options())?;
            stats.codegen_time = start.elapsed();
            stats.function_count = module.functions.len();
            log::info!("コード生成完了: 関数 {} 個 ({:?})", stats.function_count, stats.codegen_time);
            Some(module)
        };

        stats.total_time = total_start.elapsed();
        log::info!("コンパイル完了: {:?}", stats.total_time);

        Ok(CompilationOutput {
            program,
            diagnostics: emitter.into_diagnostics(),
            module,
            stats,
        })
    }
}
