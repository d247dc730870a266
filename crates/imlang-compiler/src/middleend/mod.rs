//! # ミドルエンド
//!
//! 意味解析済みのASTに対する最適化を担当します。

pub mod optimization;

pub use optimization::{optimize, OptimizationStats, ProgramOptimizer};
