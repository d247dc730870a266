/*
 * imlang CLI - メインエントリーポイント
 *
 * imlang言語のコンパイラCLIツールのエントリーポイントです。
 * コマンドライン引数の解析とロギングの初期化を行い、処理ロジックを呼び出します。
 */

use clap::Parser;
use env_logger::Builder;
use log::LevelFilter;

mod cli;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    // ロギングの初期化
    let mut builder = Builder::new();
    builder.filter_level(log_level(cli.verbose));
    if cli.verbose < 2 {
        // 診断は CLI が整形して表示する
        builder.filter_module("imlang_compiler::diagnostics", LevelFilter::Off);
    }
    builder.parse_default_env();
    builder.init();

    log::debug!("imlang コンパイラ v{} を起動しています", imlang_compiler::VERSION);

    let success = cli::run(&cli)?;
    if !success {
        std::process::exit(1);
    }
    Ok(())
}

fn log_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    }
}
