//! # WebAssembly モジュールIR
//!
//! コード生成の出力となる型付きモジュール表現です。
//! バイナリ・テキストの両ライターはこのIRだけを入力にします。

use std::collections::HashMap;
use std::fmt;

/// 値型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    I32,
    F64,
}

impl ValueType {
    /// バイナリ表現
    pub fn code(&self) -> u8 {
        match self {
            ValueType::I32 => 0x7F,
            ValueType::F64 => 0x7C,
        }
    }

    /// メモリ上のバイト数
    pub fn byte_size(&self) -> u32 {
        match self {
            ValueType::I32 => 4,
            ValueType::F64 => 8,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueType::I32 => "i32",
            ValueType::F64 => "f64",
        })
    }
}

/// 構造化制御命令のブロック型。生成するブロックは値を残さない。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Empty,
}

/// 関数型
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FuncType {
    pub params: Vec<ValueType>,
    pub results: Vec<ValueType>,
}

impl FuncType {
    pub fn new(params: Vec<ValueType>, results: Vec<ValueType>) -> Self {
        Self { params, results }
    }
}

/// メモリアクセスの即値
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemArg {
    /// アラインメント（2の冪の指数）
    pub align: u32,
    pub offset: u32,
}

impl MemArg {
    /// 値型の自然なアラインメント
    pub fn natural(ty: ValueType, offset: u32) -> Self {
        let align = match ty.byte_size() {
            8 => 3,
            _ => 2,
        };
        Self { align, offset }
    }
}

/// 命令。構造化制御は入れ子の木として持ち、`end` はエンコード時に付ける。
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Unreachable,
    Nop,
    Block { ty: BlockType, body: Vec<Instruction> },
    Loop { ty: BlockType, body: Vec<Instruction> },
    If { ty: BlockType, then_body: Vec<Instruction>, else_body: Vec<Instruction> },
    Br(u32),
    BrIf(u32),
    Return,
    Call(u32),
    Drop,

    LocalGet(u32),
    LocalSet(u32),
    GlobalGet(u32),
    GlobalSet(u32),

    I32Load(MemArg),
    F64Load(MemArg),
    I32Store(MemArg),
    F64Store(MemArg),

    I32Const(i32),
    F64Const(f64),

    I32Eqz,
    I32Eq,
    I32Ne,
    I32LtS,
    I32GtS,
    I32LeS,
    I32GeS,
    I32Add,
    I32Sub,
    I32Mul,
    I32DivS,
    I32RemS,
    I32And,
    I32Or,
    I32Xor,

    F64Eq,
    F64Ne,
    F64Lt,
    F64Gt,
    F64Le,
    F64Ge,
    F64Neg,
    F64Trunc,
    F64Add,
    F64Sub,
    F64Mul,
    F64Div,

    I32TruncF64S,
    F64ConvertI32S,
}

impl Instruction {
    /// オペコード
    pub fn opcode(&self) -> u8 {
        use Instruction::*;
        match self {
            Unreachable => 0x00,
            Nop => 0x01,
            Block { .. } => 0x02,
            Loop { .. } => 0x03,
            If { .. } => 0x04,
            Br(_) => 0x0C,
            BrIf(_) => 0x0D,
            Return => 0x0F,
            Call(_) => 0x10,
            Drop => 0x1A,
            LocalGet(_) => 0x20,
            LocalSet(_) => 0x21,
            GlobalGet(_) => 0x23,
            GlobalSet(_) => 0x24,
            I32Load(_) => 0x28,
            F64Load(_) => 0x2B,
            I32Store(_) => 0x36,
            F64Store(_) => 0x39,
            I32Const(_) => 0x41,
            F64Const(_) => 0x44,
            I32Eqz => 0x45,
            I32Eq => 0x46,
            I32Ne => 0x47,
            I32LtS => 0x48,
            I32GtS => 0x4A,
            I32LeS => 0x4C,
            I32GeS => 0x4E,
            F64Eq => 0x61,
            F64Ne => 0x62,
            F64Lt => 0x63,
            F64Gt => 0x64,
            F64Le => 0x65,
            F64Ge => 0x66,
            I32Add => 0x6A,
            I32Sub => 0x6B,
            I32Mul => 0x6C,
            I32DivS => 0x6D,
            I32RemS => 0x6F,
            I32And => 0x71,
            I32Or => 0x72,
            I32Xor => 0x73,
            F64Neg => 0x9A,
            F64Trunc => 0x9D,
            F64Add => 0xA0,
            F64Sub => 0xA1,
            F64Mul => 0xA2,
            F64Div => 0xA3,
            I32TruncF64S => 0xAA,
            F64ConvertI32S => 0xB7,
        }
    }

    /// テキスト形式のニーモニック
    pub fn mnemonic(&self) -> &'static str {
        use Instruction::*;
        match self {
            Unreachable => "unreachable",
            Nop => "nop",
            Block { .. } => "block",
            Loop { .. } => "loop",
            If { .. } => "if",
            Br(_) => "br",
            BrIf(_) => "br_if",
            Return => "return",
            Call(_) => "call",
            Drop => "drop",
            LocalGet(_) => "local.get",
            LocalSet(_) => "local.set",
            GlobalGet(_) => "global.get",
            GlobalSet(_) => "global.set",
            I32Load(_) => "i32.load",
            F64Load(_) => "f64.load",
            I32Store(_) => "i32.store",
            F64Store(_) => "f64.store",
            I32Const(_) => "i32.const",
            F64Const(_) => "f64.const",
            I32Eqz => "i32.eqz",
            I32Eq => "i32.eq",
            I32Ne => "i32.ne",
            I32LtS => "i32.lt_s",
            I32GtS => "i32.gt_s",
            I32LeS => "i32.le_s",
            I32GeS => "i32.ge_s",
            F64Eq => "f64.eq",
            F64Ne => "f64.ne",
            F64Lt => "f64.lt",
            F64Gt => "f64.gt",
            F64Le => "f64.le",
            F64Ge => "f64.ge",
            I32Add => "i32.add",
            I32Sub => "i32.sub",
            I32Mul => "i32.mul",
            I32DivS => "i32.div_s",
            I32RemS => "i32.rem_s",
            I32And => "i32.and",
            I32Or => "i32.or",
            I32Xor => "i32.xor",
            F64Neg => "f64.neg",
            F64Trunc => "f64.trunc",
            F64Add => "f64.add",
            F64Sub => "f64.sub",
            F64Mul => "f64.mul",
            F64Div => "f64.div",
            I32TruncF64S => "i32.trunc_f64_s",
            F64ConvertI32S => "f64.convert_i32_s",
        }
    }
}

/// インポート（関数のみ）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub module: String,
    pub name: String,
    pub type_index: u32,
}

/// 定義関数
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    /// デバッグ用の名前（エンコードには含めない）
    pub name: String,
    pub type_index: u32,
    /// 引数を除くローカル変数の型
    pub locals: Vec<ValueType>,
    pub body: Vec<Instruction>,
}

/// メモリの上下限（ページ単位）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub min: u32,
    pub max: Option<u32>,
}

/// グローバル変数
#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub ty: ValueType,
    pub mutable: bool,
    /// 初期化式（定数命令一つ）
    pub init: Instruction,
}

/// エクスポートの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Function,
    Memory,
}

impl ExportKind {
    pub fn code(&self) -> u8 {
        match self {
            ExportKind::Function => 0x00,
            ExportKind::Memory => 0x02,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            ExportKind::Function => "func",
            ExportKind::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub name: String,
    pub kind: ExportKind,
    pub index: u32,
}

/// データセグメント（メモリ0への能動セグメント）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSegment {
    pub offset: u32,
    pub bytes: Vec<u8>,
}

/// モジュール
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub types: Vec<FuncType>,
    pub imports: Vec<Import>,
    pub functions: Vec<Function>,
    pub memory: Option<Limits>,
    pub globals: Vec<Global>,
    pub exports: Vec<Export>,
    pub data: Vec<DataSegment>,
    /// 型の重複排除用
    type_lookup: HashMap<FuncType, u32>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// 関数型を登録し、その添字を返す。構造的に同じ型は同じ添字を共有する。
    pub fn intern_type(&mut self, func_type: FuncType) -> u32 {
        if let Some(index) = self.type_lookup.get(&func_type) {
            return *index;
        }
        let index = self.types.len() as u32;
        self.type_lookup.insert(func_type.clone(), index);
        self.types.push(func_type);
        index
    }

    /// 関数インポートを追加し、その関数添字を返す
    ///
    /// インポートは定義関数より前の添字を占めるため、定義関数の追加前に呼ぶこと。
    pub fn add_import(&mut self, module: &str, name: &str, func_type: FuncType) -> u32 {
        let type_index = self.intern_type(func_type);
        self.imports.push(Import {
            module: module.to_string(),
            name: name.to_string(),
            type_index,
        });
        (self.imports.len() - 1) as u32
    }

    /// 定義関数の添字 = インポート数 + 定義順
    pub fn function_index(&self, position: usize) -> u32 {
        (self.imports.len() + position) as u32
    }

    pub fn add_global(&mut self, global: Global) -> u32 {
        self.globals.push(global);
        (self.globals.len() - 1) as u32
    }

    pub fn add_export(&mut self, name: &str, kind: ExportKind, index: u32) {
        self.exports.push(Export { name: name.to_string(), kind, index });
    }

    /// 名前からエクスポートを引く
    pub fn export(&self, name: &str) -> Option<&Export> {
        self.exports.iter().find(|export| export.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_signatures_share_one_type() {
        let mut module = Module::new();
        let a = module.intern_type(FuncType::new(vec![ValueType::I32], vec![]));
        let b = module.intern_type(FuncType::new(vec![ValueType::F64], vec![]));
        let c = module.intern_type(FuncType::new(vec![ValueType::I32], vec![]));
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(module.types.len(), 2);
    }
}
