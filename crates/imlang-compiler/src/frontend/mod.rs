//! # フロントエンド
//!
//! ソースカーソル、字句解析、構文解析、AST、意味解析をまとめたモジュールです。

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod semantic;
pub mod source;
