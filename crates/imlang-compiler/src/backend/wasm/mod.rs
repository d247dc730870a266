//! # WebAssembly バックエンド
//!
//! ASTからモジュールIRへの変換（`codegen`）と、IRのバイナリ・テキスト出力を提供します。

pub mod binary;
pub mod codegen;
pub mod layout;
pub mod module;
pub mod text;

pub use binary::encode_binary;
pub use codegen::{generate, CodeGenerator, CodegenOptions};
pub use module::{
    BlockType, DataSegment, Export, ExportKind, FuncType, Function, Global, Import, Instruction,
    Limits, MemArg, Module, ValueType,
};
pub use text::encode_text;
