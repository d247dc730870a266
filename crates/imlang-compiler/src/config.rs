//! コンパイラ設定モジュール
//!
//! コンパイラの動作を設定するためのオプションを提供します。
//! 設定は TOML ファイルから読み込めます。省略した項目は既定値になります。

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::backend::wasm::CodegenOptions;
use crate::frontend::error::{CompilerError, Result};

/// コンパイラの設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// 定数畳み込みと不要コード除去を行うか
    pub optimize: bool,

    /// 最適化レベル
    pub opt_level: OptimizationLevel,

    /// ホスト関数のインポート元モジュール名
    pub host_module: String,

    /// 整数・真偽値の出力関数名
    pub print_int_import: String,

    /// 実数の出力関数名
    pub print_real_import: String,

    /// エントリポイントのルーチン名
    pub entry_point: String,

    /// 本体を持つ全ルーチンをエクスポートするか
    pub export_all_routines: bool,

    /// 線形メモリのエクスポート名
    pub memory_export_name: String,

    /// 出力形式
    pub emit: EmitKind,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        let codegen = CodegenOptions::default();
        Self {
            optimize: true,
            opt_level: OptimizationLevel::Basic,
            host_module: codegen.host_module,
            print_int_import: codegen.print_int_import,
            print_real_import: codegen.print_real_import,
            entry_point: codegen.entry_point,
            export_all_routines: codegen.export_all_routines,
            memory_export_name: codegen.memory_export_name,
            emit: EmitKind::Binary,
        }
    }
}

impl CompilerConfig {
    /// TOML 文字列から読み込む
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: CompilerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML ファイルから読み込む
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        log::debug!("設定ファイルを読み込み: {}", path.display());
        Self::from_toml_str(&text)
    }

    /// 最適化パスを実行するか
    pub fn should_optimize(&self) -> bool {
        self.optimize && self.opt_level != OptimizationLevel::None
    }

    /// コード生成オプションに変換
    pub fn codegen_options(&self) -> CodegenOptions {
        CodegenOptions {
            host_module: self.host_module.clone(),
            print_int_import: self.print_int_import.clone(),
            print_real_import: self.print_real_import.clone(),
            entry_point: self.entry_point.clone(),
            export_all_routines: self.export_all_routines,
            memory_export_name: self.memory_export_name.clone(),
        }
    }

    fn validate(&self) -> Result<()> {
        let names = [
            ("host_module", &self.host_module),
            ("print_int_import", &self.print_int_import),
            ("print_real_import", &self.print_real_import),
            ("entry_point", &self.entry_point),
            ("memory_export_name", &self.memory_export_name),
        ];
        if let Some((key, _)) = names.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(CompilerError::Config(format!("'{}' に空文字列は指定できません", key)));
        }
        if self.print_int_import == self.print_real_import {
            return Err(CompilerError::Config(format!(
                "整数と実数の出力関数が同じ名前です: {}",
                self.print_int_import
            )));
        }
        Ok(())
    }
}

/// 最適化レベル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationLevel {
    /// 最適化なし
    None,

    /// 定数畳み込みと不要コード除去
    Basic,
}

impl FromStr for OptimizationLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "0" | "none" => Ok(OptimizationLevel::None),
            "1" | "basic" => Ok(OptimizationLevel::Basic),
            _ => Err(format!("無効な最適化レベル: {}", s)),
        }
    }
}

impl From<u8> for OptimizationLevel {
    fn from(level: u8) -> Self {
        match level {
            0 => OptimizationLevel::None,
            _ => OptimizationLevel::Basic,
        }
    }
}

impl fmt::Display for OptimizationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizationLevel::None => write!(f, "none"),
            OptimizationLevel::Basic => write!(f, "basic"),
        }
    }
}

/// 出力形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmitKind {
    /// `.wasm` バイナリ
    Binary,

    /// `.wat` テキスト
    Text,

    /// 両方
    Both,
}

impl EmitKind {
    pub fn includes_binary(&self) -> bool {
        matches!(self, EmitKind::Binary | EmitKind::Both)
    }

    pub fn includes_text(&self) -> bool {
        matches!(self, EmitKind::Text | EmitKind::Both)
    }
}

impl FromStr for EmitKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "binary" | "wasm" => Ok(EmitKind::Binary),
            "text" | "wat" => Ok(EmitKind::Text),
            "both" => Ok(EmitKind::Both),
            _ => Err(format!("無効な出力形式: {}", s)),
        }
    }
}

impl fmt::Display for EmitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmitKind::Binary => write!(f, "binary"),
            EmitKind::Text => write!(f, "text"),
            EmitKind::Both => write!(f, "both"),
        }
    }
}
