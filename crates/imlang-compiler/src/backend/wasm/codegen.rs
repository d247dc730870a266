//! # WebAssembly コード生成器
//!
//! 意味解析済みのASTをモジュールIRへ変換します。
//! テキスト出力とバイナリ出力はどちらもここで作ったIRから生成します。
//!
//! 値の表現:
//! - `integer` / `boolean` は i32、`real` は f64
//! - 配列とレコードは線形メモリ上の静的領域に置き、スタック上ではアドレス（i32）で扱う
//! - 配列は1始まりで、範囲外の添字は `unreachable` でトラップする
//!
//! 集約型の静的領域は宣言ごとに一つだけ確保されるため、再帰呼び出しの間では共有されます。

use std::collections::{HashMap, HashSet};

use crate::frontend::ast::{
    BinaryOp, Block, BlockItem, Decl, Expr, ExprKind, Program, RoutineBody, RoutineDecl, Stmt,
    StmtKind, TypeRef, UnaryOp, VarDecl,
};
use crate::frontend::error::{CompilerError, Result};
use crate::frontend::semantic::{TypeInfo, TypeResolver};
use crate::frontend::source::Span;

use super::layout::{self, StaticMemory};
use super::module::{
    BlockType, ExportKind, FuncType, Function, Global, Instruction, Limits, MemArg, Module, ValueType,
};

/// コード生成オプション
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodegenOptions {
    /// ホスト関数のインポート元モジュール名
    pub host_module: String,
    /// 整数・真偽値を出力するインポート関数名
    pub print_int_import: String,
    /// 実数を出力するインポート関数名
    pub print_real_import: String,
    /// エントリポイントのルーチン名
    pub entry_point: String,
    /// 本体を持つ全ルーチンをエクスポートするか
    pub export_all_routines: bool,
    /// 線形メモリのエクスポート名
    pub memory_export_name: String,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            host_module: "env".to_string(),
            print_int_import: "print_i32".to_string(),
            print_real_import: "print_f64".to_string(),
            entry_point: "main".to_string(),
            export_all_routines: false,
            memory_export_name: "memory".to_string(),
        }
    }
}

/// 変数の格納場所
#[derive(Debug, Clone, Copy)]
enum Storage {
    Local(u32),
    Global(u32),
    /// 静的領域（固定アドレス）
    Static(u32),
    /// アドレスを保持するローカル変数（サイズ不定の配列引数、集約型要素の反復変数）
    Pointer(u32),
}

#[derive(Debug, Clone)]
struct Variable {
    ty: TypeInfo,
    storage: Storage,
}

#[derive(Debug, Default)]
struct Scope {
    variables: HashMap<String, Variable>,
    types: HashMap<String, TypeInfo>,
}

/// ルーチンの呼び出し情報
#[derive(Debug, Clone)]
struct RoutineInfo {
    /// 関数添字（本体が無ければ `None`）
    index: Option<u32>,
    params: Vec<TypeInfo>,
    return_type: TypeInfo,
}

/// 読み書きの対象
#[derive(Debug, Clone, Copy)]
enum Place {
    Local(u32),
    Global(u32),
    /// スタック上のアドレス + オフセット
    Memory(u32),
}

/// 生成中の関数の状態
#[derive(Debug)]
struct FunctionState {
    param_count: u32,
    /// 引数を除くローカル変数
    locals: Vec<ValueType>,
    /// 解放済みの一時ローカル
    free: Vec<(ValueType, u32)>,
    return_type: TypeInfo,
}

impl FunctionState {
    fn new(param_count: u32, return_type: TypeInfo) -> Self {
        Self { param_count, locals: Vec::new(), free: Vec::new(), return_type }
    }

    /// 宣言用の新しいローカル
    fn add_local(&mut self, ty: ValueType) -> u32 {
        let index = self.param_count + self.locals.len() as u32;
        self.locals.push(ty);
        index
    }

    /// 一時ローカルを借りる
    fn acquire(&mut self, ty: ValueType) -> u32 {
        match self.free.iter().rposition(|(free_ty, _)| *free_ty == ty) {
            Some(position) => self.free.swap_remove(position).1,
            None => self.add_local(ty),
        }
    }

    fn release(&mut self, ty: ValueType, index: u32) {
        self.free.push((ty, index));
    }
}

/// WebAssembly コード生成器
pub struct CodeGenerator<'o> {
    /// 生成オプション
    options: &'o CodegenOptions,
    /// 生成中のモジュール
    module: Module,
    /// 集約型の静的領域
    memory: StaticMemory,
    /// スコープスタック（先頭はグローバル）
    scopes: Vec<Scope>,
    /// ルーチン名 → 呼び出し情報
    routines: HashMap<String, RoutineInfo>,
    /// 生成中の関数
    function: FunctionState,
    /// 整数出力関数の添字
    print_int: u32,
    /// 実数出力関数の添字
    print_real: u32,
    /// エントリポイントの先頭で実行するグローバル変数の初期化
    global_inits: Vec<(Expr, Variable)>,
    /// グローバル初期化を出力済みか
    entry_initialized: bool,
}

impl<'o> CodeGenerator<'o> {
    /// 新しいコード生成器を作成
    pub fn new(options: &'o CodegenOptions) -> Self {
        Self {
            options,
            module: Module::new(),
            memory: StaticMemory::new(),
            scopes: vec![Scope::default()],
            routines: HashMap::new(),
            function: FunctionState::new(0, TypeInfo::VOID),
            print_int: 0,
            print_real: 0,
            global_inits: Vec::new(),
            entry_initialized: false,
        }
    }

    /// プログラムからモジュールを生成
    pub fn generate_module(mut self, program: &Program) -> Result<Module> {
        // ホスト関数のインポート
        let host = self.options.host_module.clone();
        self.print_int = self.module.add_import(
            &host,
            &self.options.print_int_import,
            FuncType::new(vec![ValueType::I32], vec![]),
        );
        self.print_real = self.module.add_import(
            &host,
            &self.options.print_real_import,
            FuncType::new(vec![ValueType::F64], vec![]),
        );

        // 型宣言
        for decl in &program.declarations {
            if let Decl::Type(type_decl) = decl {
                let ty = self.resolve_type(&type_decl.ty, Some(&type_decl.name));
                self.scopes[0].types.insert(type_decl.name.clone(), ty);
            }
        }

        // ルーチンの登録（本体を持つものに宣言順で添字を振る）
        let mut bodies: Vec<&RoutineDecl> = Vec::new();
        for decl in &program.declarations {
            if let Decl::Routine(routine) = decl {
                let index = match routine.body {
                    Some(_) => {
                        bodies.push(routine);
                        Some(self.module.function_index(bodies.len() - 1))
                    }
                    None => None,
                };
                self.register_routine(routine, index);
            }
        }

        // グローバル変数
        for decl in &program.declarations {
            if let Decl::Var(var) = decl {
                self.declare_global(var)?;
            }
        }

        // 関数本体
        let mut exported = HashSet::new();
        for (position, routine) in bodies.iter().enumerate() {
            let function = self.generate_routine(routine)?;
            log::debug!(
                "関数を生成: {} (ローカル {} 個, 命令 {} 個)",
                function.name,
                function.locals.len(),
                function.body.len()
            );
            self.module.functions.push(function);

            let is_entry = routine.name == self.options.entry_point;
            if (is_entry || self.options.export_all_routines) && exported.insert(routine.name.clone()) {
                let index = self.module.function_index(position);
                self.module.add_export(&routine.name, ExportKind::Function, index);
            }
        }

        if !self.entry_initialized && !self.global_inits.is_empty() {
            log::warn!(
                "エントリポイント '{}' が無いため、グローバル変数の初期化式 {} 件を出力しません",
                self.options.entry_point,
                self.global_inits.len()
            );
        }

        // 線形メモリ
        if self.memory.is_used() {
            self.module.memory = Some(Limits { min: self.memory.pages(), max: None });
            let name = self.options.memory_export_name.clone();
            self.module.add_export(&name, ExportKind::Memory, 0);
            self.module.data = self.memory.data_segments();
        }

        Ok(self.module)
    }

    // ---- 登録 ----

    fn register_routine(&mut self, decl: &RoutineDecl, index: Option<u32>) {
        let params = decl.params.iter().map(|param| self.resolve_type(&param.ty, None)).collect();
        let return_type = match &decl.return_type {
            Some(ty) => self.resolve_type(ty, None),
            None => TypeInfo::VOID,
        };
        let info = RoutineInfo { index, params, return_type };
        // 本体付きの登録を後続の前方宣言で上書きしない
        let defined = self.routines.get(&decl.name).is_some_and(|existing| existing.index.is_some());
        if !(defined && index.is_none()) {
            self.routines.insert(decl.name.clone(), info);
        }
    }

    fn declare_global(&mut self, decl: &VarDecl) -> Result<()> {
        let ty = match (&decl.ty, &decl.initializer) {
            (Some(ty), _) => self.resolve_type(ty, None),
            (None, Some(init)) => self.infer_type(init)?,
            (None, None) => return Err(untyped_variable(decl)),
        };

        let (variable, deferred) = if ty.is_aggregate() {
            let address = self.allocate(&ty, decl.span)?;
            let variable = Variable { ty, storage: Storage::Static(address) };
            (variable, decl.initializer.is_some())
        } else {
            let value_type = scalar_type(&ty, decl.span)?;
            let constant = decl.initializer.as_ref().and_then(|init| constant_initializer(init, &ty));
            let deferred = decl.initializer.is_some() && constant.is_none();
            let index = self.module.add_global(Global {
                ty: value_type,
                mutable: true,
                init: constant.unwrap_or_else(|| zero(value_type)),
            });
            (Variable { ty, storage: Storage::Global(index) }, deferred)
        };

        if let (true, Some(init)) = (deferred, &decl.initializer) {
            self.global_inits.push((init.clone(), variable.clone()));
        }
        self.scopes[0].variables.insert(decl.name.clone(), variable);
        Ok(())
    }

    // ---- 関数 ----

    fn generate_routine(&mut self, decl: &RoutineDecl) -> Result<Function> {
        let info = self
            .routines
            .get(&decl.name)
            .cloned()
            .ok_or_else(|| CompilerError::internal(format!("ルーチン '{}' が未登録です", decl.name)))?;

        let mut params = Vec::with_capacity(info.params.len());
        for (param, ty) in decl.params.iter().zip(&info.params) {
            params.push(scalar_type(ty, param.span)?);
        }
        let results = match layout::value_type(&info.return_type) {
            Some(ty) => vec![ty],
            None => vec![],
        };
        let type_index = self.module.intern_type(FuncType::new(params.clone(), results));

        self.function = FunctionState::new(params.len() as u32, info.return_type.clone());
        self.scopes.push(Scope::default());
        let mut code = Vec::new();

        if decl.name == self.options.entry_point && !self.entry_initialized {
            self.entry_initialized = true;
            self.emit_global_inits(&mut code)?;
        }

        // 引数。集約型は自分の静的領域を空にしてから呼び出し側の値をコピーする。
        for (index, (param, ty)) in decl.params.iter().zip(&info.params).enumerate() {
            let index = index as u32;
            let storage = match ty {
                TypeInfo::Array { size: None, .. } => Storage::Pointer(index),
                ty if ty.is_aggregate() => {
                    let address = self.allocate(ty, param.span)?;
                    code.push(Instruction::I32Const(address as i32));
                    self.clear_aggregate(ty, &mut code)?;
                    code.push(Instruction::I32Const(address as i32));
                    code.push(Instruction::LocalGet(index));
                    self.copy_aggregate(ty, &mut code)?;
                    Storage::Static(address)
                }
                _ => Storage::Local(index),
            };
            self.define(&param.name, Variable { ty: ty.clone(), storage });
        }

        match &decl.body {
            Some(RoutineBody::Expr(expr)) => {
                let ty = self.expression(expr, &mut code)?;
                if info.return_type.is_void() {
                    if layout::value_type(&ty).is_some() {
                        code.push(Instruction::Drop);
                    }
                } else {
                    coerce(&mut code, &ty, &info.return_type);
                }
            }
            Some(RoutineBody::Block(block)) => {
                self.items(&block.items, &mut code)?;
                if !info.return_type.is_void() {
                    // 値を返さずに末尾へ到達した場合
                    code.push(Instruction::Unreachable);
                }
            }
            None => {
                return Err(CompilerError::internal(format!("ルーチン '{}' に本体がありません", decl.name)));
            }
        }

        self.scopes.pop();
        let state = std::mem::replace(&mut self.function, FunctionState::new(0, TypeInfo::VOID));
        Ok(Function {
            name: decl.name.clone(),
            type_index,
            locals: state.locals,
            body: code,
        })
    }

    fn emit_global_inits(&mut self, code: &mut Vec<Instruction>) -> Result<()> {
        let inits = std::mem::take(&mut self.global_inits);
        for (init, variable) in &inits {
            match variable.storage {
                Storage::Global(index) => {
                    let ty = self.expression(init, code)?;
                    coerce(code, &ty, &variable.ty);
                    code.push(Instruction::GlobalSet(index));
                }
                Storage::Static(address) => {
                    code.push(Instruction::I32Const(address as i32));
                    self.expression(init, code)?;
                    self.copy_aggregate(&variable.ty, code)?;
                }
                Storage::Local(_) | Storage::Pointer(_) => {
                    return Err(CompilerError::internal("グローバル変数の格納場所が不正です"));
                }
            }
        }
        self.global_inits = inits;
        Ok(())
    }

    // ---- 文 ----

    fn block(&mut self, block: &Block, code: &mut Vec<Instruction>) -> Result<()> {
        self.scopes.push(Scope::default());
        let result = self.items(&block.items, code);
        self.scopes.pop();
        result
    }

    fn items(&mut self, items: &[BlockItem], code: &mut Vec<Instruction>) -> Result<()> {
        for item in items {
            match item {
                BlockItem::Decl(Decl::Var(var)) => self.declare_local(var, code)?,
                BlockItem::Decl(Decl::Type(type_decl)) => {
                    let ty = self.resolve_type(&type_decl.ty, Some(&type_decl.name));
                    if let Some(scope) = self.scopes.last_mut() {
                        scope.types.insert(type_decl.name.clone(), ty);
                    }
                }
                BlockItem::Decl(Decl::Routine(routine)) => {
                    return Err(CompilerError::codegen(
                        "Routines can only be declared at the top level",
                        Some(routine.span),
                    ));
                }
                BlockItem::Stmt(stmt) => self.statement(stmt, code)?,
            }
        }
        Ok(())
    }

    fn declare_local(&mut self, decl: &VarDecl, code: &mut Vec<Instruction>) -> Result<()> {
        let mut init_code = Vec::new();
        let init_type = match &decl.initializer {
            Some(init) => Some(self.expression(init, &mut init_code)?),
            None => None,
        };
        let ty = match (&decl.ty, &init_type) {
            (Some(ty), _) => self.resolve_type(ty, None),
            (None, Some(ty)) => ty.clone(),
            (None, None) => return Err(untyped_variable(decl)),
        };

        let storage = if ty.is_aggregate() {
            let address = self.allocate(&ty, decl.span)?;
            // 宣言を実行するたびに既定値から始める
            code.push(Instruction::I32Const(address as i32));
            self.clear_aggregate(&ty, code)?;
            if init_type.is_some() {
                code.push(Instruction::I32Const(address as i32));
                code.extend(init_code);
                self.copy_aggregate(&ty, code)?;
            }
            Storage::Static(address)
        } else {
            let value_type = scalar_type(&ty, decl.span)?;
            let index = self.function.add_local(value_type);
            match &init_type {
                Some(init_type) => {
                    code.extend(init_code);
                    coerce(code, init_type, &ty);
                }
                None => code.push(zero(value_type)),
            }
            code.push(Instruction::LocalSet(index));
            Storage::Local(index)
        };

        self.define(&decl.name, Variable { ty, storage });
        Ok(())
    }

    fn statement(&mut self, stmt: &Stmt, code: &mut Vec<Instruction>) -> Result<()> {
        match &stmt.kind {
            StmtKind::Assign { target, value } => {
                let (place, target_type) = self.place(target, code)?;
                if target_type.is_aggregate() {
                    self.address(place, code);
                    self.expression(value, code)?;
                    self.copy_aggregate(&target_type, code)?;
                } else {
                    let value_type = self.expression(value, code)?;
                    coerce(code, &value_type, &target_type);
                    self.store(place, &target_type, stmt.span, code)?;
                }
            }
            StmtKind::Call { name, args } => {
                let ty = self.call(name, args, stmt.span, code)?;
                if layout::value_type(&ty).is_some() {
                    code.push(Instruction::Drop);
                }
            }
            StmtKind::If { condition, then_block, else_block } => {
                self.condition(condition, code)?;
                let mut then_body = Vec::new();
                self.block(then_block, &mut then_body)?;
                let mut else_body = Vec::new();
                if let Some(else_block) = else_block {
                    self.block(else_block, &mut else_body)?;
                }
                code.push(Instruction::If { ty: BlockType::Empty, then_body, else_body });
            }
            StmtKind::While { condition, body } => {
                let mut loop_body = Vec::new();
                self.condition(condition, &mut loop_body)?;
                loop_body.push(Instruction::I32Eqz);
                loop_body.push(Instruction::BrIf(1));
                self.block(body, &mut loop_body)?;
                loop_body.push(Instruction::Br(0));
                code.push(loop_block(loop_body));
            }
            StmtKind::For { iterator, first, second: Some(second), reverse, body } => {
                self.scopes.push(Scope::default());
                let result = self.range_loop(iterator, first, second, *reverse, body, code);
                self.scopes.pop();
                result?;
            }
            StmtKind::For { iterator, first, second: None, reverse, body } => {
                self.scopes.push(Scope::default());
                let result = self.array_loop(iterator, first, *reverse, body, code);
                self.scopes.pop();
                result?;
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    let ty = self.expression(value, code)?;
                    let expected = self.function.return_type.clone();
                    coerce(code, &ty, &expected);
                }
                code.push(Instruction::Return);
            }
            StmtKind::Print(items) => {
                for item in items {
                    let ty = self.expression(item, code)?;
                    if ty.is_real() {
                        code.push(Instruction::Call(self.print_real));
                    } else if ty.is_integer() || ty.is_boolean() {
                        code.push(Instruction::Call(self.print_int));
                    } else {
                        return Err(CompilerError::codegen(
                            format!("Cannot print a value of type '{}'", ty),
                            Some(item.span),
                        ));
                    }
                }
            }
            StmtKind::Empty => {}
            StmtKind::Block(block) => self.block(block, code)?,
        }
        Ok(())
    }

    /// `for i in a .. b [reverse]`。範囲は一度だけ評価する。
    fn range_loop(
        &mut self,
        iterator: &str,
        first: &Expr,
        second: &Expr,
        reverse: bool,
        body: &Block,
        code: &mut Vec<Instruction>,
    ) -> Result<()> {
        let counter = self.function.add_local(ValueType::I32);
        let bound = self.function.acquire(ValueType::I32);
        let (first_target, second_target) = if reverse { (bound, counter) } else { (counter, bound) };

        let ty = self.expression(first, code)?;
        coerce(code, &ty, &TypeInfo::INTEGER);
        code.push(Instruction::LocalSet(first_target));
        let ty = self.expression(second, code)?;
        coerce(code, &ty, &TypeInfo::INTEGER);
        code.push(Instruction::LocalSet(second_target));

        self.define(iterator, Variable { ty: TypeInfo::INTEGER, storage: Storage::Local(counter) });

        let (exit_test, last_test, step) = if reverse {
            (Instruction::I32LtS, Instruction::I32LeS, Instruction::I32Sub)
        } else {
            (Instruction::I32GtS, Instruction::I32GeS, Instruction::I32Add)
        };
        let mut loop_body = vec![
            Instruction::LocalGet(counter),
            Instruction::LocalGet(bound),
            exit_test,
            Instruction::BrIf(1),
        ];
        self.items(&body.items, &mut loop_body)?;
        // 終端に達したら進める前に抜ける。i32 の端で折り返さないため。
        loop_body.extend([
            Instruction::LocalGet(counter),
            Instruction::LocalGet(bound),
            last_test,
            Instruction::BrIf(1),
            Instruction::LocalGet(counter),
            Instruction::I32Const(1),
            step,
            Instruction::LocalSet(counter),
            Instruction::Br(0),
        ]);
        code.push(loop_block(loop_body));

        self.function.release(ValueType::I32, bound);
        Ok(())
    }

    /// `for x in arr [reverse]`。要素を1番目から（reverse なら末尾から）順に取り出す。
    fn array_loop(
        &mut self,
        iterator: &str,
        array: &Expr,
        reverse: bool,
        body: &Block,
        code: &mut Vec<Instruction>,
    ) -> Result<()> {
        let element = match self.expression(array, code)? {
            TypeInfo::Array { element, .. } => *element,
            other => {
                return Err(CompilerError::codegen(
                    format!("For-in loop expects an array, got '{}'", other),
                    Some(array.span),
                ));
            }
        };
        let stride = layout::size_of(&element).map_err(|error| with_span(error, array.span))?;
        let data_offset = layout::array_data_offset(&element);

        let base = self.function.acquire(ValueType::I32);
        let length = self.function.acquire(ValueType::I32);
        let position = self.function.acquire(ValueType::I32);

        code.extend([
            Instruction::LocalSet(base),
            Instruction::LocalGet(base),
            Instruction::I32Load(word(0)),
            Instruction::LocalSet(length),
        ]);
        if reverse {
            code.extend([Instruction::LocalGet(length), Instruction::LocalSet(position)]);
        } else {
            code.extend([Instruction::I32Const(1), Instruction::LocalSet(position)]);
        }

        let mut loop_body = vec![Instruction::LocalGet(position)];
        if reverse {
            loop_body.extend([Instruction::I32Const(1), Instruction::I32LtS]);
        } else {
            loop_body.extend([Instruction::LocalGet(length), Instruction::I32GtS]);
        }
        loop_body.push(Instruction::BrIf(1));

        // 要素のアドレス
        loop_body.extend([
            Instruction::LocalGet(base),
            Instruction::LocalGet(position),
            Instruction::I32Const(1),
            Instruction::I32Sub,
            Instruction::I32Const(stride as i32),
            Instruction::I32Mul,
            Instruction::I32Add,
        ]);
        let storage = if element.is_aggregate() {
            let local = self.function.add_local(ValueType::I32);
            loop_body.extend([
                Instruction::I32Const(data_offset as i32),
                Instruction::I32Add,
                Instruction::LocalSet(local),
            ]);
            Storage::Pointer(local)
        } else {
            let value_type = scalar_type(&element, array.span)?;
            let local = self.function.add_local(value_type);
            loop_body.push(load_instruction(value_type, data_offset));
            loop_body.push(Instruction::LocalSet(local));
            Storage::Local(local)
        };
        self.define(iterator, Variable { ty: element, storage });

        self.items(&body.items, &mut loop_body)?;
        loop_body.extend([
            Instruction::LocalGet(position),
            Instruction::I32Const(1),
            if reverse { Instruction::I32Sub } else { Instruction::I32Add },
            Instruction::LocalSet(position),
            Instruction::Br(0),
        ]);
        code.push(loop_block(loop_body));

        for local in [base, length, position] {
            self.function.release(ValueType::I32, local);
        }
        Ok(())
    }

    /// 条件式。実数は 0.0 との比較で真偽値にする。
    fn condition(&mut self, expr: &Expr, code: &mut Vec<Instruction>) -> Result<()> {
        let ty = self.expression(expr, code)?;
        if ty.is_real() {
            coerce(code, &ty, &TypeInfo::BOOLEAN);
        }
        Ok(())
    }

    // ---- 式 ----

    /// 式の値をスタックに積み、その型を返す
    fn expression(&mut self, expr: &Expr, code: &mut Vec<Instruction>) -> Result<TypeInfo> {
        match &expr.kind {
            ExprKind::Integer(value) => {
                code.push(Instruction::I32Const(integer_constant(*value, expr.span)?));
                Ok(TypeInfo::INTEGER)
            }
            ExprKind::Real(value) => {
                code.push(Instruction::F64Const(*value));
                Ok(TypeInfo::REAL)
            }
            ExprKind::Boolean(value) => {
                code.push(Instruction::I32Const(i32::from(*value)));
                Ok(TypeInfo::BOOLEAN)
            }
            ExprKind::Name(_) | ExprKind::Field { .. } | ExprKind::Index { .. } => {
                let (place, ty) = self.place(expr, code)?;
                self.load(place, &ty, expr.span, code)?;
                Ok(ty)
            }
            ExprKind::Call { name, args } => self.call(name, args, expr.span, code),
            ExprKind::Unary { op, operand } => self.unary(*op, operand, code),
            ExprKind::Binary { op, left, right } => self.binary(*op, left, right, code),
        }
    }

    /// 命令を捨てて式の型だけを求める
    fn infer_type(&mut self, expr: &Expr) -> Result<TypeInfo> {
        let saved = std::mem::replace(&mut self.function, FunctionState::new(0, TypeInfo::VOID));
        let result = self.expression(expr, &mut Vec::new());
        self.function = saved;
        result
    }

    fn unary(&mut self, op: UnaryOp, operand: &Expr, code: &mut Vec<Instruction>) -> Result<TypeInfo> {
        match op {
            UnaryOp::Plus => self.expression(operand, code),
            UnaryOp::Minus => {
                if let ExprKind::Integer(value) = &operand.kind {
                    // 負のリテラルは一つの定数にする。-2147483648 もここで表せる。
                    code.push(Instruction::I32Const(integer_constant(value.saturating_neg(), operand.span)?));
                    return Ok(TypeInfo::INTEGER);
                }
                let mut inner = Vec::new();
                let ty = self.expression(operand, &mut inner)?;
                if ty.is_real() {
                    code.extend(inner);
                    code.push(Instruction::F64Neg);
                } else {
                    code.push(Instruction::I32Const(0));
                    code.extend(inner);
                    code.push(Instruction::I32Sub);
                }
                Ok(ty)
            }
            UnaryOp::Not => {
                let ty = self.expression(operand, code)?;
                coerce(code, &ty, &TypeInfo::BOOLEAN);
                code.push(Instruction::I32Eqz);
                Ok(TypeInfo::BOOLEAN)
            }
        }
    }

    fn binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr, code: &mut Vec<Instruction>) -> Result<TypeInfo> {
        let mut left_code = Vec::new();
        let left_type = self.expression(left, &mut left_code)?;
        let mut right_code = Vec::new();
        let right_type = self.expression(right, &mut right_code)?;

        // 論理演算は両辺を評価し、0/1 に正規化してから演算する
        if op.is_logical() {
            code.extend(left_code);
            coerce(code, &left_type, &TypeInfo::BOOLEAN);
            code.extend(right_code);
            coerce(code, &right_type, &TypeInfo::BOOLEAN);
            code.push(match op {
                BinaryOp::And => Instruction::I32And,
                BinaryOp::Or => Instruction::I32Or,
                _ => Instruction::I32Xor,
            });
            return Ok(TypeInfo::BOOLEAN);
        }

        let real = left_type.is_real() || right_type.is_real();
        code.extend(left_code);
        if real {
            coerce(code, &left_type, &TypeInfo::REAL);
        }
        code.extend(right_code);
        if real {
            coerce(code, &right_type, &TypeInfo::REAL);
        }

        if real && op == BinaryOp::Mod {
            self.real_remainder(code);
        } else {
            code.push(binary_instruction(op, real));
        }

        Ok(if op.is_comparison() {
            TypeInfo::BOOLEAN
        } else if real {
            TypeInfo::REAL
        } else {
            TypeInfo::INTEGER
        })
    }

    /// a - trunc(a / b) * b
    fn real_remainder(&mut self, code: &mut Vec<Instruction>) {
        let divisor = self.function.acquire(ValueType::F64);
        let dividend = self.function.acquire(ValueType::F64);
        code.extend([
            Instruction::LocalSet(divisor),
            Instruction::LocalSet(dividend),
            Instruction::LocalGet(dividend),
            Instruction::LocalGet(dividend),
            Instruction::LocalGet(divisor),
            Instruction::F64Div,
            Instruction::F64Trunc,
            Instruction::LocalGet(divisor),
            Instruction::F64Mul,
            Instruction::F64Sub,
        ]);
        self.function.release(ValueType::F64, dividend);
        self.function.release(ValueType::F64, divisor);
    }

    fn call(&mut self, name: &str, args: &[Expr], span: Span, code: &mut Vec<Instruction>) -> Result<TypeInfo> {
        let info = self
            .routines
            .get(name)
            .cloned()
            .ok_or_else(|| CompilerError::codegen(format!("Undeclared routine '{}'", name), Some(span)))?;
        let index = info.index.ok_or_else(|| {
            CompilerError::codegen(format!("Routine '{}' is declared but never defined", name), Some(span))
        })?;
        if info.params.len() != args.len() {
            return Err(CompilerError::codegen(
                format!("'{}' expects {} arguments but got {}", name, info.params.len(), args.len()),
                Some(span),
            ));
        }

        for (arg, param_type) in args.iter().zip(&info.params) {
            let ty = self.expression(arg, code)?;
            coerce(code, &ty, param_type);
        }
        code.push(Instruction::Call(index));
        Ok(info.return_type)
    }

    // ---- 読み書きの対象 ----

    /// 左辺値の場所を求める。メモリ上の場合はベースアドレスをスタックに積む。
    fn place(&mut self, expr: &Expr, code: &mut Vec<Instruction>) -> Result<(Place, TypeInfo)> {
        match &expr.kind {
            ExprKind::Name(name) => {
                let variable = self.lookup_variable(name).cloned().ok_or_else(|| {
                    CompilerError::codegen(format!("Undeclared identifier '{}'", name), Some(expr.span))
                })?;
                let place = match variable.storage {
                    Storage::Local(index) => Place::Local(index),
                    Storage::Global(index) => Place::Global(index),
                    Storage::Static(address) => {
                        code.push(Instruction::I32Const(address as i32));
                        Place::Memory(0)
                    }
                    Storage::Pointer(local) => {
                        code.push(Instruction::LocalGet(local));
                        Place::Memory(0)
                    }
                };
                Ok((place, variable.ty))
            }
            ExprKind::Field { receiver, field } => {
                let (base, receiver_type) = self.aggregate_base(receiver, code)?;
                let TypeInfo::Record(record) = &receiver_type else {
                    return Err(CompilerError::codegen(
                        format!("Cannot access field '{}' of non-record type '{}'", field, receiver_type),
                        Some(expr.span),
                    ));
                };
                let (offset, field_type) =
                    layout::field_offset(record, field).map_err(|error| with_span(error, expr.span))?;
                Ok((Place::Memory(base + offset), field_type.clone()))
            }
            ExprKind::Index { receiver, index } => {
                let (base, receiver_type) = self.aggregate_base(receiver, code)?;
                let element = match receiver_type {
                    TypeInfo::Array { element, .. } => *element,
                    other => {
                        return Err(CompilerError::codegen(
                            format!("Cannot index non-array type '{}'", other),
                            Some(expr.span),
                        ));
                    }
                };
                self.element_address(base, &element, index, code)?;
                Ok((Place::Memory(layout::array_data_offset(&element)), element))
            }
            _ => Err(CompilerError::codegen(
                "Left side of assignment must be a variable, field or array element",
                Some(expr.span),
            )),
        }
    }

    /// 集約型の式のアドレスをスタックに積み、未加算のオフセットを返す
    fn aggregate_base(&mut self, expr: &Expr, code: &mut Vec<Instruction>) -> Result<(u32, TypeInfo)> {
        if expr.is_lvalue() {
            let (place, ty) = self.place(expr, code)?;
            match place {
                Place::Memory(offset) if ty.is_aggregate() => Ok((offset, ty)),
                _ => Err(CompilerError::codegen(
                    format!("Value of type '{}' has no address", ty),
                    Some(expr.span),
                )),
            }
        } else {
            let ty = self.expression(expr, code)?;
            Ok((0, ty))
        }
    }

    /// スタック上の配列アドレス（+ `offset`）から要素の先頭アドレスを求める
    fn element_address(
        &mut self,
        offset: u32,
        element: &TypeInfo,
        index: &Expr,
        code: &mut Vec<Instruction>,
    ) -> Result<()> {
        let stride = layout::size_of(element).map_err(|error| with_span(error, index.span))?;
        if offset != 0 {
            code.extend([Instruction::I32Const(offset as i32), Instruction::I32Add]);
        }
        let array = self.function.acquire(ValueType::I32);
        code.push(Instruction::LocalSet(array));

        let index_type = self.expression(index, code)?;
        coerce(code, &index_type, &TypeInfo::INTEGER);
        let position = self.function.acquire(ValueType::I32);
        code.push(Instruction::LocalSet(position));

        // 1 <= position <= length でなければトラップ
        code.extend([
            Instruction::LocalGet(position),
            Instruction::I32Const(1),
            Instruction::I32LtS,
            Instruction::LocalGet(position),
            Instruction::LocalGet(array),
            Instruction::I32Load(word(0)),
            Instruction::I32GtS,
            Instruction::I32Or,
            Instruction::If {
                ty: BlockType::Empty,
                then_body: vec![Instruction::Unreachable],
                else_body: vec![],
            },
            Instruction::LocalGet(array),
            Instruction::LocalGet(position),
            Instruction::I32Const(1),
            Instruction::I32Sub,
            Instruction::I32Const(stride as i32),
            Instruction::I32Mul,
            Instruction::I32Add,
        ]);

        self.function.release(ValueType::I32, position);
        self.function.release(ValueType::I32, array);
        Ok(())
    }

    fn load(&mut self, place: Place, ty: &TypeInfo, span: Span, code: &mut Vec<Instruction>) -> Result<()> {
        match place {
            Place::Local(index) => code.push(Instruction::LocalGet(index)),
            Place::Global(index) => code.push(Instruction::GlobalGet(index)),
            Place::Memory(_) if ty.is_aggregate() => self.address(place, code),
            Place::Memory(offset) => code.push(load_instruction(scalar_type(ty, span)?, offset)),
        }
        Ok(())
    }

    fn store(&mut self, place: Place, ty: &TypeInfo, span: Span, code: &mut Vec<Instruction>) -> Result<()> {
        match place {
            Place::Local(index) => code.push(Instruction::LocalSet(index)),
            Place::Global(index) => code.push(Instruction::GlobalSet(index)),
            Place::Memory(offset) => code.push(store_instruction(scalar_type(ty, span)?, offset)),
        }
        Ok(())
    }

    /// メモリ上の場所のオフセットをアドレスに加える
    fn address(&mut self, place: Place, code: &mut Vec<Instruction>) {
        if let Place::Memory(offset) = place {
            if offset != 0 {
                code.extend([Instruction::I32Const(offset as i32), Instruction::I32Add]);
            }
        }
    }

    /// スタック上の [コピー先, コピー元] のアドレスの間で値をコピーする
    ///
    /// レコードは全体を、配列は短い方の長さ分の要素をワード単位でコピーする。配列ヘッダはコピーしない。
    fn copy_aggregate(&mut self, ty: &TypeInfo, code: &mut Vec<Instruction>) -> Result<()> {
        let source = self.function.acquire(ValueType::I32);
        let target = self.function.acquire(ValueType::I32);
        let remaining = self.function.acquire(ValueType::I32);
        code.extend([Instruction::LocalSet(source), Instruction::LocalSet(target)]);

        match ty {
            TypeInfo::Array { element, .. } => {
                let stride = layout::size_of(element)?;
                let data_offset = layout::array_data_offset(element) as i32;
                code.extend([
                    Instruction::LocalGet(target),
                    Instruction::I32Load(word(0)),
                    Instruction::LocalSet(remaining),
                    Instruction::LocalGet(source),
                    Instruction::I32Load(word(0)),
                    Instruction::LocalGet(remaining),
                    Instruction::I32LtS,
                    Instruction::If {
                        ty: BlockType::Empty,
                        then_body: vec![
                            Instruction::LocalGet(source),
                            Instruction::I32Load(word(0)),
                            Instruction::LocalSet(remaining),
                        ],
                        else_body: vec![],
                    },
                    Instruction::LocalGet(remaining),
                    Instruction::I32Const(stride as i32),
                    Instruction::I32Mul,
                    Instruction::LocalSet(remaining),
                ]);
                for local in [target, source] {
                    code.extend([
                        Instruction::LocalGet(local),
                        Instruction::I32Const(data_offset),
                        Instruction::I32Add,
                        Instruction::LocalSet(local),
                    ]);
                }
            }
            _ => {
                let size = layout::size_of(ty)?;
                code.extend([Instruction::I32Const(size as i32), Instruction::LocalSet(remaining)]);
            }
        }

        let mut loop_body = vec![
            Instruction::LocalGet(remaining),
            Instruction::I32Const(0),
            Instruction::I32LeS,
            Instruction::BrIf(1),
            Instruction::LocalGet(target),
            Instruction::LocalGet(source),
            Instruction::I32Load(word(0)),
            Instruction::I32Store(word(0)),
        ];
        for (local, step) in [(target, Instruction::I32Add), (source, Instruction::I32Add), (remaining, Instruction::I32Sub)] {
            loop_body.extend([
                Instruction::LocalGet(local),
                Instruction::I32Const(4),
                step,
                Instruction::LocalSet(local),
            ]);
        }
        loop_body.push(Instruction::Br(0));
        code.push(loop_block(loop_body));

        for local in [remaining, target, source] {
            self.function.release(ValueType::I32, local);
        }
        Ok(())
    }

    /// スタック上のアドレスにある集約型の値を 0 で埋める。配列ヘッダは残す。
    fn clear_aggregate(&mut self, ty: &TypeInfo, code: &mut Vec<Instruction>) -> Result<()> {
        let base = self.function.acquire(ValueType::I32);
        code.push(Instruction::LocalSet(base));

        match ty {
            TypeInfo::Record(record) => {
                for (name, field) in &record.fields {
                    let (offset, _) = layout::field_offset(record, name)?;
                    code.push(Instruction::LocalGet(base));
                    if field.is_aggregate() {
                        code.extend([Instruction::I32Const(offset as i32), Instruction::I32Add]);
                        self.clear_aggregate(field, code)?;
                    } else {
                        let value_type = runtime_type(field)?;
                        code.extend([zero(value_type), store_instruction(value_type, offset)]);
                    }
                }
            }
            TypeInfo::Array { element, .. } => {
                let stride = layout::size_of(element)?;
                let data_offset = layout::array_data_offset(element) as i32;
                let remaining = self.function.acquire(ValueType::I32);
                code.extend([
                    Instruction::LocalGet(base),
                    Instruction::I32Load(word(0)),
                    Instruction::LocalSet(remaining),
                    Instruction::LocalGet(base),
                    Instruction::I32Const(data_offset),
                    Instruction::I32Add,
                    Instruction::LocalSet(base),
                ]);

                let mut loop_body = vec![
                    Instruction::LocalGet(remaining),
                    Instruction::I32Const(0),
                    Instruction::I32LeS,
                    Instruction::BrIf(1),
                    Instruction::LocalGet(base),
                ];
                if element.is_aggregate() {
                    self.clear_aggregate(element, &mut loop_body)?;
                } else {
                    let value_type = runtime_type(element)?;
                    loop_body.extend([zero(value_type), store_instruction(value_type, 0)]);
                }
                loop_body.extend([
                    Instruction::LocalGet(base),
                    Instruction::I32Const(stride as i32),
                    Instruction::I32Add,
                    Instruction::LocalSet(base),
                    Instruction::LocalGet(remaining),
                    Instruction::I32Const(1),
                    Instruction::I32Sub,
                    Instruction::LocalSet(remaining),
                    Instruction::Br(0),
                ]);
                code.push(loop_block(loop_body));
                self.function.release(ValueType::I32, remaining);
            }
            other => {
                return Err(CompilerError::internal(format!("型 '{}' は集約型ではありません", other)));
            }
        }

        self.function.release(ValueType::I32, base);
        Ok(())
    }

    // ---- スコープと型 ----

    fn define(&mut self, name: &str, variable: Variable) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.variables.insert(name.to_string(), variable);
        }
    }

    fn lookup_variable(&self, name: &str) -> Option<&Variable> {
        self.scopes.iter().rev().find_map(|scope| scope.variables.get(name))
    }

    fn lookup_type(&self, name: &str) -> Option<TypeInfo> {
        self.scopes.iter().rev().find_map(|scope| scope.types.get(name)).cloned()
    }

    /// 型参照を解決する。問題は意味解析で報告済みなので、ここでは報告しない。
    fn resolve_type(&self, type_ref: &TypeRef, name_hint: Option<&str>) -> TypeInfo {
        let lookup = |name: &str| self.lookup_type(name);
        let mut report = |_: Span, _: String| {};
        TypeResolver::new(&lookup, &mut report).resolve(type_ref, name_hint)
    }

    fn allocate(&mut self, ty: &TypeInfo, span: Span) -> Result<u32> {
        self.memory.allocate(ty).map_err(|error| with_span(error, span))
    }
}

/// プログラムからモジュールを生成する
pub fn generate(program: &Program, options: &CodegenOptions) -> Result<Module> {
    CodeGenerator::new(options).generate_module(program)
}

fn scalar_type(ty: &TypeInfo, span: Span) -> Result<ValueType> {
    layout::value_type(ty).ok_or_else(|| {
        CompilerError::codegen(format!("Type '{}' has no runtime representation", ty), Some(span))
    })
}

/// 位置情報の無い場面で使う `scalar_type`
fn runtime_type(ty: &TypeInfo) -> Result<ValueType> {
    layout::value_type(ty).ok_or_else(|| CompilerError::internal(format!("型 '{}' は実行時の値を持ちません", ty)))
}

fn untyped_variable(decl: &VarDecl) -> CompilerError {
    CompilerError::codegen(
        format!("Variable '{}' must have either a type or an initializer", decl.name),
        Some(decl.span),
    )
}

/// 位置情報の無いコード生成エラーに位置を付ける
fn with_span(error: CompilerError, span: Span) -> CompilerError {
    match error {
        CompilerError::CodeGen { message, span: None } => CompilerError::codegen(message, Some(span)),
        other => other,
    }
}

/// 型変換。integer/boolean → real は変換命令、integer → boolean は 0 との比較で 0/1 にする。
fn coerce(code: &mut Vec<Instruction>, from: &TypeInfo, to: &TypeInfo) {
    if to.is_real() && (from.is_integer() || from.is_boolean()) {
        code.push(Instruction::F64ConvertI32S);
    } else if to.is_boolean() && from.is_integer() {
        code.extend([Instruction::I32Const(0), Instruction::I32Ne]);
    } else if to.is_boolean() && from.is_real() {
        code.extend([Instruction::F64Const(0.0), Instruction::F64Ne]);
    } else if to.is_integer() && from.is_real() {
        code.push(Instruction::I32TruncF64S);
    }
}

fn binary_instruction(op: BinaryOp, real: bool) -> Instruction {
    use Instruction::*;
    match (op, real) {
        (BinaryOp::Add, false) => I32Add,
        (BinaryOp::Sub, false) => I32Sub,
        (BinaryOp::Mul, false) => I32Mul,
        (BinaryOp::Div, false) => I32DivS,
        (BinaryOp::Mod, false) => I32RemS,
        (BinaryOp::Less, false) => I32LtS,
        (BinaryOp::LessEqual, false) => I32LeS,
        (BinaryOp::Greater, false) => I32GtS,
        (BinaryOp::GreaterEqual, false) => I32GeS,
        (BinaryOp::Equal, false) => I32Eq,
        (BinaryOp::NotEqual, false) => I32Ne,
        (BinaryOp::Add, true) => F64Add,
        (BinaryOp::Sub, true) => F64Sub,
        (BinaryOp::Mul, true) => F64Mul,
        (BinaryOp::Div | BinaryOp::Mod, true) => F64Div,
        (BinaryOp::Less, true) => F64Lt,
        (BinaryOp::LessEqual, true) => F64Le,
        (BinaryOp::Greater, true) => F64Gt,
        (BinaryOp::GreaterEqual, true) => F64Ge,
        (BinaryOp::Equal, true) => F64Eq,
        (BinaryOp::NotEqual, true) => F64Ne,
        (BinaryOp::And, _) => I32And,
        (BinaryOp::Or, _) => I32Or,
        (BinaryOp::Xor, _) => I32Xor,
    }
}

/// リテラル初期化式をグローバルの定数初期化命令にする
fn constant_initializer(init: &Expr, ty: &TypeInfo) -> Option<Instruction> {
    let instruction = match (&init.kind, ty.is_real()) {
        (ExprKind::Integer(value), true) => Instruction::F64Const(*value as f64),
        (ExprKind::Integer(value), false) if ty.is_boolean() => Instruction::I32Const(i32::from(*value != 0)),
        (ExprKind::Integer(value), false) => Instruction::I32Const(i32::try_from(*value).ok()?),
        (ExprKind::Real(value), true) => Instruction::F64Const(*value),
        (ExprKind::Boolean(value), true) => Instruction::F64Const(f64::from(u8::from(*value))),
        (ExprKind::Boolean(value), false) => Instruction::I32Const(i32::from(*value)),
        _ => return None,
    };
    Some(instruction)
}

/// 整数リテラルを i32 の定数にする。範囲外は切り詰めずにエラーにする。
fn integer_constant(value: i64, span: Span) -> Result<i32> {
    i32::try_from(value).map_err(|_| {
        CompilerError::codegen(format!("Integer literal {} does not fit in 32 bits", value), Some(span))
    })
}

fn zero(ty: ValueType) -> Instruction {
    match ty {
        ValueType::F64 => Instruction::F64Const(0.0),
        ValueType::I32 => Instruction::I32Const(0),
    }
}

fn word(offset: u32) -> MemArg {
    MemArg::natural(ValueType::I32, offset)
}

fn load_instruction(ty: ValueType, offset: u32) -> Instruction {
    let arg = MemArg::natural(ty, offset);
    match ty {
        ValueType::F64 => Instruction::F64Load(arg),
        _ => Instruction::I32Load(arg),
    }
}

fn store_instruction(ty: ValueType, offset: u32) -> Instruction {
    let arg = MemArg::natural(ty, offset);
    match ty {
        ValueType::F64 => Instruction::F64Store(arg),
        _ => Instruction::I32Store(arg),
    }
}

/// `block (loop body)`。本体の `br 1` で脱出、`br 0` で先頭へ戻る。
fn loop_block(body: Vec<Instruction>) -> Instruction {
    Instruction::Block {
        ty: BlockType::Empty,
        body: vec![Instruction::Loop { ty: BlockType::Empty, body }],
    }
}
