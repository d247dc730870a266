//! # テキストライター
//!
//! モジュールIRを WebAssembly テキスト形式（S式）で書き出します。
//! 添字はバイナリ形式と同じ番号を `(;N;)` 注釈で示します。

use std::fmt::Write;

use super::module::{FuncType, Instruction, Limits, MemArg, Module};

const INDENT: &str = "  ";

/// モジュールをテキスト形式にする
pub fn encode_text(module: &Module) -> String {
    let mut out = String::from("(module\n");

    for (index, func_type) in module.types.iter().enumerate() {
        let _ = writeln!(out, "{}(type (;{};) (func{}))", INDENT, index, signature(func_type));
    }

    for (index, import) in module.imports.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}(import \"{}\" \"{}\" (func (;{};) (type {})))",
            INDENT,
            escape(import.module.as_bytes()),
            escape(import.name.as_bytes()),
            index,
            import.type_index
        );
    }

    if let Some(limits) = &module.memory {
        let _ = writeln!(out, "{}(memory (;0;) {})", INDENT, limits_text(limits));
    }

    for (index, global) in module.globals.iter().enumerate() {
        let ty = if global.mutable { format!("(mut {})", global.ty) } else { global.ty.to_string() };
        let _ = writeln!(out, "{}(global (;{};) {} ({}))", INDENT, index, ty, instruction_text(&global.init));
    }

    for (position, function) in module.functions.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}(func (;{};) (type {})",
            INDENT,
            module.function_index(position),
            function.type_index
        );
        if !function.locals.is_empty() {
            let locals: Vec<String> = function.locals.iter().map(ToString::to_string).collect();
            let _ = writeln!(out, "{0}{0}(local {1})", INDENT, locals.join(" "));
        }
        write_body(&mut out, &function.body, 2);
        let _ = writeln!(out, "{})", INDENT);
    }

    for export in &module.exports {
        let _ = writeln!(
            out,
            "{}(export \"{}\" ({} {}))",
            INDENT,
            escape(export.name.as_bytes()),
            export.kind.keyword(),
            export.index
        );
    }

    for (index, segment) in module.data.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}(data (;{};) (i32.const {}) \"{}\")",
            INDENT,
            index,
            segment.offset,
            escape(&segment.bytes)
        );
    }

    out.push_str(")\n");
    out
}

fn signature(func_type: &FuncType) -> String {
    let mut text = String::new();
    if !func_type.params.is_empty() {
        let params: Vec<String> = func_type.params.iter().map(ToString::to_string).collect();
        let _ = write!(text, " (param {})", params.join(" "));
    }
    if !func_type.results.is_empty() {
        let results: Vec<String> = func_type.results.iter().map(ToString::to_string).collect();
        let _ = write!(text, " (result {})", results.join(" "));
    }
    text
}

fn limits_text(limits: &Limits) -> String {
    match limits.max {
        Some(max) => format!("{} {}", limits.min, max),
        None => limits.min.to_string(),
    }
}

fn write_body(out: &mut String, body: &[Instruction], depth: usize) {
    let indent = INDENT.repeat(depth);
    for instruction in body {
        match instruction {
            Instruction::Block { body, .. } | Instruction::Loop { body, .. } => {
                let _ = writeln!(out, "{}{}", indent, instruction.mnemonic());
                write_body(out, body, depth + 1);
                let _ = writeln!(out, "{}end", indent);
            }
            Instruction::If { then_body, else_body, .. } => {
                let _ = writeln!(out, "{}if", indent);
                write_body(out, then_body, depth + 1);
                if !else_body.is_empty() {
                    let _ = writeln!(out, "{}else", indent);
                    write_body(out, else_body, depth + 1);
                }
                let _ = writeln!(out, "{}end", indent);
            }
            _ => {
                let _ = writeln!(out, "{}{}", indent, instruction_text(instruction));
            }
        }
    }
}

/// 構造化制御以外の命令一つ
fn instruction_text(instruction: &Instruction) -> String {
    let mnemonic = instruction.mnemonic();
    match instruction {
        Instruction::Br(index)
        | Instruction::BrIf(index)
        | Instruction::Call(index)
        | Instruction::LocalGet(index)
        | Instruction::LocalSet(index)
        | Instruction::GlobalGet(index)
        | Instruction::GlobalSet(index) => format!("{} {}", mnemonic, index),
        Instruction::I32Load(arg) | Instruction::I32Store(arg) => memarg_text(mnemonic, arg, 2),
        Instruction::F64Load(arg) | Instruction::F64Store(arg) => memarg_text(mnemonic, arg, 3),
        Instruction::I32Const(value) => format!("{} {}", mnemonic, value),
        Instruction::F64Const(value) => format!("{} {}", mnemonic, float_text(*value)),
        _ => mnemonic.to_string(),
    }
}

fn memarg_text(mnemonic: &str, arg: &MemArg, natural_align: u32) -> String {
    let mut text = mnemonic.to_string();
    if arg.offset != 0 {
        let _ = write!(text, " offset={}", arg.offset);
    }
    if arg.align != natural_align {
        let _ = write!(text, " align={}", 1u32 << arg.align);
    }
    text
}

/// f64 定数の表記。NaN は `nan`、無限大は `inf` / `-inf`。
pub fn float_text(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value == f64::INFINITY {
        "inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        format!("{:?}", value)
    }
}

/// 文字列リテラル用のエスケープ。印字可能なASCII以外は `\hh`。
fn escape(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    for byte in bytes {
        match byte {
            b'"' | b'\\' => {
                let _ = write!(text, "\\{:02x}", byte);
            }
            0x20..=0x7E => text.push(*byte as char),
            _ => {
                let _ = write!(text, "\\{:02x}", byte);
            }
        }
    }
    text
}
