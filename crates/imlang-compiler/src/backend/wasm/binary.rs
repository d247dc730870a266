//! # バイナリライター
//!
//! モジュールIRを WebAssembly バイナリ形式へ書き出します。
//! セクションは type, import, function, memory, global, export, code, data の順で、
//! 空のセクションは出力しません。サイズと個数は符号なしLEB128、定数即値は符号付きLEB128です。

use crate::frontend::error::Result;

use super::module::{BlockType, FuncType, Instruction, Limits, Module, ValueType};

/// マジックナンバー "\0asm"
pub const MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6D];
/// バージョン 1
pub const VERSION: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

const SECTION_TYPE: u8 = 1;
const SECTION_IMPORT: u8 = 2;
const SECTION_FUNCTION: u8 = 3;
const SECTION_MEMORY: u8 = 5;
const SECTION_GLOBAL: u8 = 6;
const SECTION_EXPORT: u8 = 7;
const SECTION_CODE: u8 = 10;
const SECTION_DATA: u8 = 11;

const FUNC_TYPE_TAG: u8 = 0x60;
const BLOCK_TYPE_EMPTY: u8 = 0x40;
const OPCODE_ELSE: u8 = 0x05;
const OPCODE_END: u8 = 0x0B;

/// モジュールをバイナリにエンコードする
pub fn encode_binary(module: &Module) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&VERSION);

    if !module.types.is_empty() {
        let mut payload = Vec::new();
        write_u32(&mut payload, module.types.len() as u32)?;
        for func_type in &module.types {
            write_func_type(&mut payload, func_type)?;
        }
        write_section(&mut out, SECTION_TYPE, &payload)?;
    }

    if !module.imports.is_empty() {
        let mut payload = Vec::new();
        write_u32(&mut payload, module.imports.len() as u32)?;
        for import in &module.imports {
            write_name(&mut payload, &import.module)?;
            write_name(&mut payload, &import.name)?;
            payload.push(0x00); // 関数インポート
            write_u32(&mut payload, import.type_index)?;
        }
        write_section(&mut out, SECTION_IMPORT, &payload)?;
    }

    if !module.functions.is_empty() {
        let mut payload = Vec::new();
        write_u32(&mut payload, module.functions.len() as u32)?;
        for function in &module.functions {
            write_u32(&mut payload, function.type_index)?;
        }
        write_section(&mut out, SECTION_FUNCTION, &payload)?;
    }

    if let Some(limits) = &module.memory {
        let mut payload = Vec::new();
        write_u32(&mut payload, 1)?;
        write_limits(&mut payload, limits)?;
        write_section(&mut out, SECTION_MEMORY, &payload)?;
    }

    if !module.globals.is_empty() {
        let mut payload = Vec::new();
        write_u32(&mut payload, module.globals.len() as u32)?;
        for global in &module.globals {
            payload.push(global.ty.code());
            payload.push(u8::from(global.mutable));
            write_instruction(&mut payload, &global.init)?;
            payload.push(OPCODE_END);
        }
        write_section(&mut out, SECTION_GLOBAL, &payload)?;
    }

    if !module.exports.is_empty() {
        let mut payload = Vec::new();
        write_u32(&mut payload, module.exports.len() as u32)?;
        for export in &module.exports {
            write_name(&mut payload, &export.name)?;
            payload.push(export.kind.code());
            write_u32(&mut payload, export.index)?;
        }
        write_section(&mut out, SECTION_EXPORT, &payload)?;
    }

    if !module.functions.is_empty() {
        let mut payload = Vec::new();
        write_u32(&mut payload, module.functions.len() as u32)?;
        for function in &module.functions {
            let mut body = Vec::new();
            let runs = compress_locals(&function.locals);
            write_u32(&mut body, runs.len() as u32)?;
            for (count, ty) in runs {
                write_u32(&mut body, count)?;
                body.push(ty.code());
            }
            for instruction in &function.body {
                write_instruction(&mut body, instruction)?;
            }
            body.push(OPCODE_END);

            write_u32(&mut payload, body.len() as u32)?;
            payload.extend_from_slice(&body);
        }
        write_section(&mut out, SECTION_CODE, &payload)?;
    }

    if !module.data.is_empty() {
        let mut payload = Vec::new();
        write_u32(&mut payload, module.data.len() as u32)?;
        for segment in &module.data {
            write_u32(&mut payload, 0)?; // メモリ0
            write_instruction(&mut payload, &Instruction::I32Const(segment.offset as i32))?;
            payload.push(OPCODE_END);
            write_u32(&mut payload, segment.bytes.len() as u32)?;
            payload.extend_from_slice(&segment.bytes);
        }
        write_section(&mut out, SECTION_DATA, &payload)?;
    }

    log::debug!("バイナリ出力完了: {} バイト", out.len());
    Ok(out)
}

/// 連続する同じ型のローカル変数を (個数, 型) にまとめる
pub fn compress_locals(locals: &[ValueType]) -> Vec<(u32, ValueType)> {
    let mut runs: Vec<(u32, ValueType)> = Vec::new();
    for ty in locals {
        match runs.last_mut() {
            Some((count, last)) if last == ty => *count += 1,
            _ => runs.push((1, *ty)),
        }
    }
    runs
}

fn write_u32(out: &mut Vec<u8>, value: u32) -> Result<()> {
    leb128::write::unsigned(out, u64::from(value))?;
    Ok(())
}

fn write_i64(out: &mut Vec<u8>, value: i64) -> Result<()> {
    leb128::write::signed(out, value)?;
    Ok(())
}

fn write_name(out: &mut Vec<u8>, name: &str) -> Result<()> {
    write_u32(out, name.len() as u32)?;
    out.extend_from_slice(name.as_bytes());
    Ok(())
}

fn write_section(out: &mut Vec<u8>, id: u8, payload: &[u8]) -> Result<()> {
    out.push(id);
    write_u32(out, payload.len() as u32)?;
    out.extend_from_slice(payload);
    Ok(())
}

fn write_func_type(out: &mut Vec<u8>, func_type: &FuncType) -> Result<()> {
    out.push(FUNC_TYPE_TAG);
    write_u32(out, func_type.params.len() as u32)?;
    out.extend(func_type.params.iter().map(ValueType::code));
    write_u32(out, func_type.results.len() as u32)?;
    out.extend(func_type.results.iter().map(ValueType::code));
    Ok(())
}

fn write_limits(out: &mut Vec<u8>, limits: &Limits) -> Result<()> {
    match limits.max {
        Some(max) => {
            out.push(0x01);
            write_u32(out, limits.min)?;
            write_u32(out, max)?;
        }
        None => {
            out.push(0x00);
            write_u32(out, limits.min)?;
        }
    }
    Ok(())
}

fn write_block_type(out: &mut Vec<u8>, ty: BlockType) {
    match ty {
        BlockType::Empty => out.push(BLOCK_TYPE_EMPTY),
    }
}

fn write_instruction(out: &mut Vec<u8>, instruction: &Instruction) -> Result<()> {
    out.push(instruction.opcode());
    match instruction {
        Instruction::Block { ty, body } | Instruction::Loop { ty, body } => {
            write_block_type(out, *ty);
            for inner in body {
                write_instruction(out, inner)?;
            }
            out.push(OPCODE_END);
        }
        Instruction::If { ty, then_body, else_body } => {
            write_block_type(out, *ty);
            for inner in then_body {
                write_instruction(out, inner)?;
            }
            if !else_body.is_empty() {
                out.push(OPCODE_ELSE);
                for inner in else_body {
                    write_instruction(out, inner)?;
                }
            }
            out.push(OPCODE_END);
        }
        Instruction::Br(index)
        | Instruction::BrIf(index)
        | Instruction::Call(index)
        | Instruction::LocalGet(index)
        | Instruction::LocalSet(index)
        | Instruction::GlobalGet(index)
        | Instruction::GlobalSet(index) => write_u32(out, *index)?,
        Instruction::I32Load(arg)
        | Instruction::F64Load(arg)
        | Instruction::I32Store(arg)
        | Instruction::F64Store(arg) => {
            write_u32(out, arg.align)?;
            write_u32(out, arg.offset)?;
        }
        Instruction::I32Const(value) => write_i64(out, i64::from(*value))?,
        Instruction::F64Const(value) => out.extend_from_slice(&value.to_le_bytes()),
        _ => {}
    }
    Ok(())
}
