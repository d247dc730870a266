//! # バックエンド
//!
//! コード生成と出力形式を担当します。ターゲットは WebAssembly のみです。

pub mod wasm;
