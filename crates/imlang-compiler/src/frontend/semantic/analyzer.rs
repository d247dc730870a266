//! # 意味解析器
//!
//! スコープ付きの型検査を二つのパスで行います。
//!
//! 1. トップレベルの `type` と `routine` のシグネチャを登録する（前方参照・相互再帰のため）
//! 2. 変数宣言とルーチン本体を順に検査する
//!
//! 検査に失敗すると診断情報を一件追加し、その式の型をエラー型で置き換えて続行します。
//! ASTは変更しません。

use std::collections::HashMap;

use crate::diagnostics::Diagnostic;
use crate::frontend::ast::{
    BinaryOp, Block, BlockItem, Decl, Expr, ExprKind, Program, RoutineBody, RoutineDecl, Stmt,
    StmtKind, TypeDecl, TypeRef, UnaryOp, VarDecl,
};
use crate::frontend::source::Span;

use super::symbol_table::{RoutineSignature, ScopeKind, Symbol, SymbolTable};
use super::types::{TypeInfo, TypeResolver};

/// 意味解析の結果
#[derive(Debug, Clone, Default)]
pub struct AnalysisResult {
    /// 意味エラー
    pub diagnostics: Vec<Diagnostic>,
    /// 各式の推論型（式の範囲をキーとする）
    pub expression_types: HashMap<Span, TypeInfo>,
}

impl AnalysisResult {
    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    /// 指定範囲の式に推論された型
    pub fn type_of(&self, span: Span) -> Option<&TypeInfo> {
        self.expression_types.get(&span)
    }
}

/// 前方宣言との照合結果
enum RoutineRegistration {
    New,
    Duplicate,
    Mismatch,
    CompletesForward,
    Unchanged,
}

/// 意味解析器
pub struct SemanticAnalyzer {
    symbols: SymbolTable,
    diagnostics: Vec<Diagnostic>,
    expression_types: HashMap<Span, TypeInfo>,
    /// 解析中のルーチンの戻り値型（ルーチン外では `None`）
    current_return: Option<TypeInfo>,
}

impl SemanticAnalyzer {
    pub fn new() -> Self {
        let mut symbols = SymbolTable::new();
        symbols.define("integer", Symbol::Type { ty: TypeInfo::INTEGER });
        symbols.define("real", Symbol::Type { ty: TypeInfo::REAL });
        symbols.define("boolean", Symbol::Type { ty: TypeInfo::BOOLEAN });

        Self {
            symbols,
            diagnostics: Vec::new(),
            expression_types: HashMap::new(),
            current_return: None,
        }
    }

    /// プログラム全体を解析
    pub fn analyze(mut self, program: &Program) -> AnalysisResult {
        for decl in &program.declarations {
            match decl {
                Decl::Type(type_decl) => self.declare_type(type_decl),
                Decl::Routine(routine) => self.declare_routine(routine),
                Decl::Var(_) => {}
            }
        }

        for decl in &program.declarations {
            match decl {
                Decl::Var(var) => self.analyze_var_decl(var),
                Decl::Type(_) => {}
                Decl::Routine(routine) => self.analyze_routine(routine),
            }
        }

        log::debug!("意味解析完了: 診断 {} 件", self.diagnostics.len());
        AnalysisResult {
            diagnostics: self.diagnostics,
            expression_types: self.expression_types,
        }
    }

    fn error(&mut self, span: Span, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::semantic(span, message));
    }

    // ---- 型の解決 ----

    fn resolve_type(&mut self, type_ref: &TypeRef, name_hint: Option<&str>) -> TypeInfo {
        let symbols = &self.symbols;
        let diagnostics = &mut self.diagnostics;
        let lookup = |name: &str| symbols.lookup_type(name);
        let mut report = |span: Span, message: String| diagnostics.push(Diagnostic::semantic(span, message));
        TypeResolver::new(&lookup, &mut report).resolve(type_ref, name_hint)
    }

    /// 既に報告済みの型参照を診断なしで解決する
    fn resolve_type_silently(&self, type_ref: &TypeRef) -> TypeInfo {
        let lookup = |name: &str| self.symbols.lookup_type(name);
        let mut report = |_: Span, _: String| {};
        TypeResolver::new(&lookup, &mut report).resolve(type_ref, None)
    }

    // ---- パス1：登録 ----

    fn declare_type(&mut self, decl: &TypeDecl) {
        let ty = self.resolve_type(&decl.ty, Some(&decl.name));
        if !self.symbols.define(&decl.name, Symbol::Type { ty }) {
            self.error(decl.span, format!("Type '{}' is already defined", decl.name));
        }
    }

    fn declare_routine(&mut self, decl: &RoutineDecl) {
        let params = decl
            .params
            .iter()
            .map(|param| (param.name.clone(), self.resolve_type(&param.ty, None)))
            .collect();
        let return_type = match &decl.return_type {
            Some(ty) => self.resolve_type(ty, None),
            None => TypeInfo::VOID,
        };
        let signature = RoutineSignature { params, return_type, has_body: !decl.is_forward() };

        let registration = match self.symbols.global_mut(&decl.name) {
            None => RoutineRegistration::New,
            Some(Symbol::Routine(existing)) => {
                if existing.has_body && signature.has_body {
                    RoutineRegistration::Duplicate
                } else if !existing.matches(&signature) {
                    RoutineRegistration::Mismatch
                } else if signature.has_body {
                    *existing = signature.clone();
                    RoutineRegistration::CompletesForward
                } else {
                    RoutineRegistration::Unchanged
                }
            }
            Some(_) => RoutineRegistration::Duplicate,
        };

        match registration {
            RoutineRegistration::New => {
                self.symbols.define(&decl.name, Symbol::Routine(signature));
            }
            RoutineRegistration::Duplicate => {
                self.error(decl.span, format!("Routine '{}' is already defined", decl.name));
            }
            RoutineRegistration::Mismatch => {
                self.error(
                    decl.span,
                    format!("Routine '{}' does not match its forward declaration", decl.name),
                );
            }
            RoutineRegistration::CompletesForward | RoutineRegistration::Unchanged => {}
        }
    }

    // ---- パス2：検査 ----

    fn analyze_routine(&mut self, decl: &RoutineDecl) {
        let Some(body) = &decl.body else {
            return;
        };

        let return_type = decl
            .return_type
            .as_ref()
            .map(|ty| self.resolve_type_silently(ty))
            .unwrap_or(TypeInfo::VOID);

        self.symbols.enter_scope(ScopeKind::Routine);
        for param in &decl.params {
            let ty = self.resolve_type_silently(&param.ty);
            if !self.symbols.define(&param.name, Symbol::Var { ty }) {
                self.error(param.span, format!("Parameter '{}' is already defined", param.name));
            }
        }

        let previous = self.current_return.replace(return_type.clone());
        match body {
            RoutineBody::Expr(expr) => {
                let ty = self.analyze_expression(expr);
                if !return_type.is_void() && !ty.is_assignable_to(&return_type) {
                    self.error(
                        expr.span,
                        format!("Cannot return '{}' from function expecting '{}'", ty, return_type),
                    );
                }
            }
            RoutineBody::Block(block) => self.analyze_items(&block.items),
        }
        self.current_return = previous;
        self.symbols.exit_scope();
    }

    fn analyze_var_decl(&mut self, decl: &VarDecl) {
        let declared = decl.ty.as_ref().map(|ty| self.resolve_type(ty, None));
        let initialized = decl.initializer.as_ref().map(|init| self.analyze_expression(init));

        let ty = match (declared, initialized) {
            (Some(declared), Some(initialized)) => {
                if !initialized.is_assignable_to(&declared) {
                    self.error(decl.span, format!("Cannot assign '{}' to '{}'", initialized, declared));
                }
                declared
            }
            (Some(declared), None) => declared,
            (None, Some(initialized)) => {
                if initialized.is_void() {
                    self.error(decl.span, format!("Variable '{}' cannot have type 'void'", decl.name));
                    TypeInfo::Error
                } else {
                    initialized
                }
            }
            (None, None) => {
                self.error(
                    decl.span,
                    format!("Variable '{}' must have either a type or an initializer", decl.name),
                );
                TypeInfo::Error
            }
        };

        if !self.symbols.define(&decl.name, Symbol::Var { ty }) {
            self.error(decl.span, format!("Variable '{}' is already defined", decl.name));
        }
    }

    fn analyze_block(&mut self, block: &Block, kind: ScopeKind) {
        self.symbols.enter_scope(kind);
        self.analyze_items(&block.items);
        self.symbols.exit_scope();
    }

    fn analyze_items(&mut self, items: &[BlockItem]) {
        for item in items {
            match item {
                BlockItem::Decl(Decl::Var(var)) => self.analyze_var_decl(var),
                BlockItem::Decl(Decl::Type(type_decl)) => self.declare_type(type_decl),
                BlockItem::Decl(Decl::Routine(routine)) => {
                    self.error(routine.span, "Routines can only be declared at the top level");
                }
                BlockItem::Stmt(stmt) => self.analyze_statement(stmt),
            }
        }
    }

    fn analyze_statement(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Assign { target, value } => {
                let target_type = self.analyze_expression(target);
                let value_type = self.analyze_expression(value);
                if !target.is_lvalue() {
                    self.error(stmt.span, "Left side of assignment must be a variable, field or array element");
                } else if !value_type.is_assignable_to(&target_type) {
                    self.error(stmt.span, format!("Cannot assign '{}' to '{}'", value_type, target_type));
                }
            }
            StmtKind::Call { name, args } => {
                let ty = self.analyze_call(stmt.span, name, args);
                self.expression_types.insert(stmt.span, ty);
            }
            StmtKind::If { condition, then_block, else_block } => {
                let ty = self.analyze_expression(condition);
                if !ty.is_assignable_to(&TypeInfo::BOOLEAN) {
                    self.error(condition.span, format!("Condition must be of type 'boolean', got '{}'", ty));
                }
                self.analyze_block(then_block, ScopeKind::Block);
                if let Some(else_block) = else_block {
                    self.analyze_block(else_block, ScopeKind::Block);
                }
            }
            StmtKind::While { condition, body } => {
                let ty = self.analyze_expression(condition);
                if !ty.is_assignable_to(&TypeInfo::BOOLEAN) {
                    self.error(
                        condition.span,
                        format!("Loop condition must be of type 'boolean', got '{}'", ty),
                    );
                }
                self.analyze_block(body, ScopeKind::Loop);
            }
            StmtKind::For { iterator, first, second, body, .. } => {
                let iterator_type = self.analyze_for_header(first, second.as_ref());
                self.symbols.enter_scope(ScopeKind::Loop);
                self.symbols.define(iterator, Symbol::Var { ty: iterator_type });
                self.analyze_items(&body.items);
                self.symbols.exit_scope();
            }
            StmtKind::Return(value) => self.analyze_return(stmt.span, value.as_ref()),
            StmtKind::Print(items) => {
                for item in items {
                    let ty = self.analyze_expression(item);
                    if ty.is_void() || ty.is_aggregate() {
                        self.error(item.span, format!("Cannot print a value of type '{}'", ty));
                    }
                }
            }
            StmtKind::Empty => {}
            StmtKind::Block(block) => self.analyze_block(block, ScopeKind::Block),
        }
    }

    /// 範囲・配列を検査し、反復変数の型を返す。範囲は外側のスコープで評価する。
    fn analyze_for_header(&mut self, first: &Expr, second: Option<&Expr>) -> TypeInfo {
        let first_type = self.analyze_expression(first);
        match second {
            Some(second) => {
                if !first_type.is_assignable_to(&TypeInfo::INTEGER) {
                    self.error(first.span, format!("Range start must be 'integer', got '{}'", first_type));
                }
                let second_type = self.analyze_expression(second);
                if !second_type.is_assignable_to(&TypeInfo::INTEGER) {
                    self.error(second.span, format!("Range end must be 'integer', got '{}'", second_type));
                }
                TypeInfo::INTEGER
            }
            None => match first_type {
                TypeInfo::Array { element, .. } => *element,
                TypeInfo::Error => TypeInfo::Error,
                other => {
                    self.error(first.span, format!("For-in loop expects an array, got '{}'", other));
                    TypeInfo::Error
                }
            },
        }
    }

    fn analyze_return(&mut self, span: Span, value: Option<&Expr>) {
        let Some(expected) = self.current_return.clone() else {
            self.error(span, "Return statement outside of routine");
            return;
        };

        match value {
            Some(value) => {
                let ty = self.analyze_expression(value);
                if expected.is_void() {
                    self.error(span, "Cannot return a value from a void routine");
                } else if !ty.is_assignable_to(&expected) {
                    self.error(span, format!("Cannot return '{}' from routine expecting '{}'", ty, expected));
                }
            }
            None if !expected.is_void() => {
                self.error(span, format!("Must return a value of type '{}'", expected));
            }
            None => {}
        }
    }

    // ---- 式 ----

    /// 式の型を推論し、結果を記録する
    pub fn analyze_expression(&mut self, expr: &Expr) -> TypeInfo {
        let ty = self.infer_expression(expr);
        self.expression_types.insert(expr.span, ty.clone());
        ty
    }

    fn infer_expression(&mut self, expr: &Expr) -> TypeInfo {
        match &expr.kind {
            ExprKind::Integer(_) => TypeInfo::INTEGER,
            ExprKind::Real(_) => TypeInfo::REAL,
            ExprKind::Boolean(_) => TypeInfo::BOOLEAN,
            ExprKind::Name(name) => match self.symbols.lookup(name) {
                Some(Symbol::Var { ty }) => ty.clone(),
                Some(_) => {
                    self.error(expr.span, format!("'{}' is not a variable", name));
                    TypeInfo::Error
                }
                None => {
                    self.error(expr.span, format!("Undeclared identifier '{}'", name));
                    TypeInfo::Error
                }
            },
            ExprKind::Field { receiver, field } => match self.analyze_expression(receiver) {
                TypeInfo::Record(record) => match record.field(field) {
                    Some(ty) => ty.clone(),
                    None => {
                        self.error(
                            expr.span,
                            format!("Record type '{}' does not have field '{}'", record.name, field),
                        );
                        TypeInfo::Error
                    }
                },
                TypeInfo::Error => TypeInfo::Error,
                other => {
                    self.error(
                        expr.span,
                        format!("Cannot access field '{}' of non-record type '{}'", field, other),
                    );
                    TypeInfo::Error
                }
            },
            ExprKind::Index { receiver, index } => {
                let receiver_type = self.analyze_expression(receiver);
                let index_type = self.analyze_expression(index);
                if !index_type.is_assignable_to(&TypeInfo::INTEGER) {
                    self.error(index.span, format!("Array index must be 'integer', got '{}'", index_type));
                }
                match receiver_type {
                    TypeInfo::Array { element, .. } => *element,
                    TypeInfo::Error => TypeInfo::Error,
                    other => {
                        self.error(expr.span, format!("Cannot index non-array type '{}'", other));
                        TypeInfo::Error
                    }
                }
            }
            ExprKind::Call { name, args } => self.analyze_call(expr.span, name, args),
            ExprKind::Unary { op, operand } => {
                let ty = self.analyze_expression(operand);
                self.check_unary(expr.span, *op, ty)
            }
            ExprKind::Binary { op, left, right } => {
                let left_type = self.analyze_expression(left);
                let right_type = self.analyze_expression(right);
                self.check_binary(expr.span, *op, left_type, right_type)
            }
        }
    }

    fn analyze_call(&mut self, span: Span, name: &str, args: &[Expr]) -> TypeInfo {
        let arg_types: Vec<TypeInfo> = args.iter().map(|arg| self.analyze_expression(arg)).collect();

        let signature = match self.symbols.lookup(name) {
            Some(Symbol::Routine(signature)) => signature.clone(),
            Some(_) => {
                self.error(span, format!("'{}' is not a routine", name));
                return TypeInfo::Error;
            }
            None => {
                self.error(span, format!("Undeclared routine '{}'", name));
                return TypeInfo::Error;
            }
        };

        if signature.params.len() != args.len() {
            self.error(
                span,
                format!("'{}' expects {} arguments but got {}", name, signature.params.len(), args.len()),
            );
            return TypeInfo::Error;
        }

        for (i, ((arg, arg_type), (_, param_type))) in
            args.iter().zip(&arg_types).zip(&signature.params).enumerate()
        {
            if !arg_type.is_assignable_to(param_type) {
                self.error(
                    arg.span,
                    format!(
                        "Argument {} type '{}' is not assignable to parameter type '{}'",
                        i + 1,
                        arg_type,
                        param_type
                    ),
                );
            }
        }

        signature.return_type
    }

    fn check_unary(&mut self, span: Span, op: UnaryOp, ty: TypeInfo) -> TypeInfo {
        if ty.is_error() {
            return TypeInfo::Error;
        }
        let valid = match op {
            UnaryOp::Plus | UnaryOp::Minus => ty.is_numeric(),
            UnaryOp::Not => ty.is_assignable_to(&TypeInfo::BOOLEAN),
        };
        if !valid {
            self.error(span, format!("Operator '{}' cannot be applied to type '{}'", op, ty));
            return TypeInfo::Error;
        }
        match op {
            UnaryOp::Not => TypeInfo::BOOLEAN,
            _ => ty,
        }
    }

    fn check_binary(&mut self, span: Span, op: BinaryOp, left: TypeInfo, right: TypeInfo) -> TypeInfo {
        if op.is_logical() {
            let mut ok = true;
            if !left.is_assignable_to(&TypeInfo::BOOLEAN) {
                self.error(span, format!("Left operand of '{}' must be 'boolean', got '{}'", op, left));
                ok = false;
            }
            if !right.is_assignable_to(&TypeInfo::BOOLEAN) {
                self.error(span, format!("Right operand of '{}' must be 'boolean', got '{}'", op, right));
                ok = false;
            }
            return if ok { TypeInfo::BOOLEAN } else { TypeInfo::Error };
        }

        if left.is_error() || right.is_error() {
            return TypeInfo::Error;
        }

        if op.is_arithmetic() && left.is_numeric() && right.is_numeric() {
            return if left.is_integer() && right.is_integer() { TypeInfo::INTEGER } else { TypeInfo::REAL };
        }

        let comparable = (left.is_numeric() && right.is_numeric()) || (left.is_boolean() && right.is_boolean());
        if op.is_comparison() && comparable {
            return TypeInfo::BOOLEAN;
        }

        self.error(
            span,
            format!("Operator '{}' cannot be applied to types '{}' and '{}'", op, left, right),
        );
        TypeInfo::Error
    }
}

impl Default for SemanticAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
