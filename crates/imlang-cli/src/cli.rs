/*
 * imlang CLI - コマンドライン定義
 *
 * サブコマンドの定義と、各コマンドの処理を実装します。
 * 診断情報の整形表示もここで行います。
 */

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;

use imlang_compiler::frontend::lexer;
use imlang_compiler::{
    CompilationOutput, CompilerConfig, Diagnostic, Driver, EmitKind, OptimizationLevel, TokenKind,
    VERSION,
};

/// imlang言語コンパイラ
#[derive(Parser)]
#[command(name = "imlang")]
#[command(version = VERSION)]
#[command(about = "imlang言語のコンパイラ（WebAssembly 出力）", long_about = None)]
pub struct Cli {
    /// 詳細なログを出力（-vv でデバッグログと診断ログも出力）
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// 設定ファイルのパス（TOML）
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// サブコマンド
    #[command(subcommand)]
    pub command: Commands,
}

/// 利用可能なサブコマンド
#[derive(Subcommand)]
pub enum Commands {
    /// ソースコードをコンパイル
    Build(BuildArgs),

    /// 構文と型のチェックのみ実行
    Check(CheckArgs),

    /// トークン列を表示
    Tokens(TokensArgs),
}

/// ビルドコマンドの引数
#[derive(Args)]
pub struct BuildArgs {
    /// 入力ファイル
    #[arg(required = true)]
    pub input: PathBuf,

    /// 出力ファイル（省略時は入力ファイルの拡張子を置き換える）
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// 出力形式（binary, text, both）
    #[arg(long, value_name = "KIND")]
    pub emit: Option<EmitKind>,

    /// 最適化を無効化
    #[arg(long)]
    pub no_opt: bool,

    /// エントリポイントのルーチン名
    #[arg(long, value_name = "NAME")]
    pub entry: Option<String>,

    /// 本体を持つ全ルーチンをエクスポート
    #[arg(long)]
    pub export_all: bool,

    /// 統計情報を表示
    #[arg(long)]
    pub stats: bool,
}

/// チェックコマンドの引数
#[derive(Args)]
pub struct CheckArgs {
    /// 入力ファイル
    #[arg(required = true)]
    pub input: PathBuf,
}

/// トークン表示コマンドの引数
#[derive(Args)]
pub struct TokensArgs {
    /// 入力ファイル
    #[arg(required = true)]
    pub input: PathBuf,

    /// 改行トークンも表示
    #[arg(long)]
    pub newlines: bool,
}

/// コマンドを実行する。診断が出た場合は `false` を返す。
pub fn run(cli: &Cli) -> Result<bool> {
    let config = load_config(cli.config.as_deref())?;
    match &cli.command {
        Commands::Build(args) => build(args, config),
        Commands::Check(args) => check(args, config),
        Commands::Tokens(args) => tokens(args),
    }
}

fn load_config(path: Option<&Path>) -> Result<CompilerConfig> {
    match path {
        Some(path) => CompilerConfig::load(path)
            .with_context(|| format!("設定ファイルの読み込みに失敗しました: {}", path.display())),
        None => Ok(CompilerConfig::default()),
    }
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("ソースファイルの読み込みに失敗しました: {}", path.display()))
}

fn build(args: &BuildArgs, mut config: CompilerConfig) -> Result<bool> {
    if args.no_opt {
        config.opt_level = OptimizationLevel::None;
    }
    if let Some(emit) = args.emit {
        config.emit = emit;
    }
    if let Some(entry) = &args.entry {
        config.entry_point = entry.clone();
    }
    if args.export_all {
        config.export_all_routines = true;
    }

    let source = read_source(&args.input)?;
    let emit = config.emit;
    let output = Driver::new(config)
        .compile(&source)
        .with_context(|| format!("コンパイルに失敗しました: {}", args.input.display()))?;

    if output.has_errors() {
        report(&args.input, &source, &output.diagnostics);
        return Ok(false);
    }

    let base = args.output.clone().unwrap_or_else(|| args.input.clone());
    if emit.includes_binary() {
        let bytes = output
            .to_binary()?
            .context("モジュールが生成されていません")?;
        let path = output_path(&base, args.output.is_some() && emit == EmitKind::Binary, "wasm");
        write_output(&path, &bytes)?;
    }
    if emit.includes_text() {
        let text = output.to_text().context("モジュールが生成されていません")?;
        let path = output_path(&base, args.output.is_some() && emit == EmitKind::Text, "wat");
        write_output(&path, text.as_bytes())?;
    }

    if args.stats {
        print_stats(&output);
    }
    Ok(true)
}

fn check(args: &CheckArgs, config: CompilerConfig) -> Result<bool> {
    let source = read_source(&args.input)?;
    // 検査だけなので最適化は省く
    let config = CompilerConfig { optimize: false, ..config };
    let output = Driver::new(config)
        .compile(&source)
        .with_context(|| format!("チェックに失敗しました: {}", args.input.display()))?;

    if output.has_errors() {
        report(&args.input, &source, &output.diagnostics);
        return Ok(false);
    }
    println!("{} {}", "ok:".green().bold(), args.input.display());
    Ok(true)
}

fn tokens(args: &TokensArgs) -> Result<bool> {
    let source = read_source(&args.input)?;
    let mut success = true;
    for token in lexer::tokenize_all(&source) {
        match token.kind {
            TokenKind::NewLine if !args.newlines => {}
            TokenKind::Error => {
                success = false;
                println!("{:>5}:{:<4} {} {}", token.span.line, token.span.column, "Error".red(), token.text());
            }
            _ => println!(
                "{:>5}:{:<4} {:?} {}",
                token.span.line,
                token.span.column,
                token.kind,
                token.span.extract_source(&source).escape_debug()
            ),
        }
    }
    Ok(success)
}

/// 出力先を決める。明示指定をそのまま使えない場合は拡張子を差し替える。
fn output_path(base: &Path, exact: bool, extension: &str) -> PathBuf {
    if exact {
        base.to_path_buf()
    } else {
        base.with_extension(extension)
    }
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes)
        .with_context(|| format!("出力ファイルの書き込みに失敗しました: {}", path.display()))?;
    log::info!("出力: {} ({} バイト)", path.display(), bytes.len());
    Ok(())
}

/// 診断を `path:line:col: error: message` 形式で表示する
fn report(path: &Path, source: &str, diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        eprintln!(
            "{}:{}:{}: {} {}",
            path.display(),
            diagnostic.line(),
            diagnostic.column(),
            "error:".red().bold(),
            diagnostic.message
        );
        if let Some(line) = source.lines().nth(diagnostic.line().saturating_sub(1)) {
            let column = diagnostic.column().saturating_sub(1);
            let width = diagnostic.span.length.clamp(1, line.len().saturating_sub(column).max(1));
            eprintln!("  {}", line);
            eprintln!(
                "  {}{}",
                " ".repeat(column),
                "^".repeat(width).yellow()
            );
        }
    }
    eprintln!("{}: {} 件のエラー", "失敗".red().bold(), diagnostics.len());
}

fn print_stats(output: &CompilationOutput) {
    let stats = &output.stats;
    println!("{}", "統計情報".bold());
    println!("  行数:             {}", stats.source_lines);
    println!("  トークン数:       {}", stats.token_count);
    println!("  宣言数:           {}", stats.declaration_count);
    println!("  関数数:           {}", stats.function_count);
    println!("  畳み込み:         {}", stats.constants_folded);
    println!("  除去した文:       {}", stats.statements_removed);
    println!("  合計時間:         {:?}", stats.total_time);
}
