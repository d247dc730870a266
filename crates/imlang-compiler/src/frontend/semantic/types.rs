//! # 型情報
//!
//! 意味解析とコード生成が共有する型表現と、代入可能性の判定、型参照の解決を提供します。

use std::fmt;

use crate::frontend::ast::{ExprKind, PrimitiveName, TypeRef, TypeRefKind};
use crate::frontend::source::Span;
use crate::middleend::optimization::constant_folding;

/// 基本型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Integer,
    Real,
    Boolean,
    Void,
}

impl From<PrimitiveName> for PrimitiveType {
    fn from(name: PrimitiveName) -> Self {
        match name {
            PrimitiveName::Integer => PrimitiveType::Integer,
            PrimitiveName::Real => PrimitiveType::Real,
            PrimitiveName::Boolean => PrimitiveType::Boolean,
        }
    }
}

/// レコード型。フィールドは宣言順に保持する。
#[derive(Debug, Clone, PartialEq)]
pub struct RecordType {
    pub name: String,
    pub fields: Vec<(String, TypeInfo)>,
}

impl RecordType {
    pub fn field(&self, name: &str) -> Option<&TypeInfo> {
        self.fields.iter().find(|(field, _)| field == name).map(|(_, ty)| ty)
    }
}

/// 型情報
#[derive(Debug, Clone, PartialEq)]
pub enum TypeInfo {
    Primitive(PrimitiveType),
    Array { element: Box<TypeInfo>, size: Option<usize> },
    Record(RecordType),
    /// エラー型。あらゆる型と互換として扱い、連鎖的な診断を抑える。
    Error,
}

impl TypeInfo {
    pub const INTEGER: TypeInfo = TypeInfo::Primitive(PrimitiveType::Integer);
    pub const REAL: TypeInfo = TypeInfo::Primitive(PrimitiveType::Real);
    pub const BOOLEAN: TypeInfo = TypeInfo::Primitive(PrimitiveType::Boolean);
    pub const VOID: TypeInfo = TypeInfo::Primitive(PrimitiveType::Void);

    pub fn array(element: TypeInfo, size: Option<usize>) -> Self {
        TypeInfo::Array { element: Box::new(element), size }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, TypeInfo::Error)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, TypeInfo::Primitive(PrimitiveType::Integer))
    }

    pub fn is_real(&self) -> bool {
        matches!(self, TypeInfo::Primitive(PrimitiveType::Real))
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, TypeInfo::Primitive(PrimitiveType::Boolean))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeInfo::Primitive(PrimitiveType::Void))
    }

    /// 整数または実数
    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_real()
    }

    /// 配列またはレコード
    pub fn is_aggregate(&self) -> bool {
        matches!(self, TypeInfo::Array { .. } | TypeInfo::Record(_))
    }

    /// 同一の型か。配列のサイズは無視し、レコードは名前で比較する。
    pub fn same_as(&self, other: &TypeInfo) -> bool {
        match (self, other) {
            (TypeInfo::Error, _) | (_, TypeInfo::Error) => true,
            (TypeInfo::Primitive(a), TypeInfo::Primitive(b)) => a == b,
            (TypeInfo::Array { element: a, .. }, TypeInfo::Array { element: b, .. }) => a.same_as(b),
            (TypeInfo::Record(a), TypeInfo::Record(b)) => a.name == b.name,
            _ => false,
        }
    }

    /// `self` の値を `target` 型の場所へ代入できるか（方向性あり）
    ///
    /// integer → integer / real / boolean、real → real、boolean → boolean / integer / real。
    /// real → integer と real → boolean は不可。
    pub fn is_assignable_to(&self, target: &TypeInfo) -> bool {
        use PrimitiveType::*;

        match (self, target) {
            (TypeInfo::Error, _) | (_, TypeInfo::Error) => true,
            (TypeInfo::Primitive(source), TypeInfo::Primitive(target)) => matches!(
                (source, target),
                (Integer, Integer)
                    | (Integer, Real)
                    | (Integer, Boolean)
                    | (Real, Real)
                    | (Boolean, Boolean)
                    | (Boolean, Integer)
                    | (Boolean, Real)
            ),
            (TypeInfo::Array { element: a, .. }, TypeInfo::Array { element: b, .. }) => a.same_as(b),
            (TypeInfo::Record(a), TypeInfo::Record(b)) => a.name == b.name,
            _ => false,
        }
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeInfo::Primitive(PrimitiveType::Integer) => write!(f, "integer"),
            TypeInfo::Primitive(PrimitiveType::Real) => write!(f, "real"),
            TypeInfo::Primitive(PrimitiveType::Boolean) => write!(f, "boolean"),
            TypeInfo::Primitive(PrimitiveType::Void) => write!(f, "void"),
            TypeInfo::Array { element, size: Some(size) } => write!(f, "array[{}] {}", size, element),
            TypeInfo::Array { element, size: None } => write!(f, "array[] {}", element),
            TypeInfo::Record(record) => write!(f, "{}", record.name),
            TypeInfo::Error => write!(f, "<error>"),
        }
    }
}

/// 型参照の解決
///
/// `lookup` は名前付き型の検索、`report` は問題の報告先。
/// `name_hint` は `type N is record ... end` のレコードに付ける名前。
pub struct TypeResolver<'a> {
    lookup: &'a dyn Fn(&str) -> Option<TypeInfo>,
    report: &'a mut dyn FnMut(Span, String),
}

impl<'a> TypeResolver<'a> {
    pub fn new(
        lookup: &'a dyn Fn(&str) -> Option<TypeInfo>,
        report: &'a mut dyn FnMut(Span, String),
    ) -> Self {
        Self { lookup, report }
    }

    pub fn resolve(&mut self, type_ref: &TypeRef, name_hint: Option<&str>) -> TypeInfo {
        match &type_ref.kind {
            TypeRefKind::Primitive(name) => TypeInfo::Primitive((*name).into()),
            TypeRefKind::Named(name) if name == "<error>" => TypeInfo::Error,
            TypeRefKind::Named(name) => match (self.lookup)(name) {
                Some(ty) => ty,
                None => {
                    (self.report)(type_ref.span, format!("Undefined type '{}'", name));
                    TypeInfo::Error
                }
            },
            TypeRefKind::Record { fields } => {
                let mut resolved: Vec<(String, TypeInfo)> = Vec::with_capacity(fields.len());
                for field in fields {
                    let ty = match &field.ty {
                        Some(ty) => self.resolve(ty, None),
                        None => {
                            (self.report)(field.span, "Record field must have a type".to_string());
                            TypeInfo::Error
                        }
                    };
                    if resolved.iter().any(|(name, _)| name == &field.name) {
                        (self.report)(field.span, format!("Duplicate field '{}' in record", field.name));
                        continue;
                    }
                    resolved.push((field.name.clone(), ty));
                }
                let name = match name_hint {
                    Some(name) => name.to_string(),
                    None => format!(
                        "<anonymous record at {}:{}>",
                        type_ref.span.line, type_ref.span.column
                    ),
                };
                TypeInfo::Record(RecordType { name, fields: resolved })
            }
            TypeRefKind::Array { element, size } => {
                let element = self.resolve(element, None);
                let size = match size {
                    None => None,
                    Some(expr) => {
                        let folded = constant_folding::fold_expression(expr);
                        match &folded.kind {
                            ExprKind::Integer(n) if *n > 0 => Some(*n as usize),
                            ExprKind::Integer(_) => {
                                (self.report)(expr.span, "Array size must be positive".to_string());
                                None
                            }
                            _ => {
                                (self.report)(
                                    expr.span,
                                    "Array size must be a constant integer expression".to_string(),
                                );
                                None
                            }
                        }
                    }
                };
                TypeInfo::array(element, size)
            }
        }
    }
}
