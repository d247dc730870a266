//! # 抽象構文木（AST）
//!
//! 宣言・文・式・型参照のノードを定義します。
//! 各親ノードは子ノードを排他的に所有し、ノードの範囲は常に子の範囲を包含します。
//! 構築後は変更されず、最適化は新しいノードを生成します。

use std::fmt;

use crate::frontend::source::Span;

/// プログラム全体
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub span: Span,
    /// トップレベル宣言
    pub declarations: Vec<Decl>,
}

impl Program {
    /// 名前でルーチン宣言を探す（本体を持つものを優先）
    pub fn routine(&self, name: &str) -> Option<&RoutineDecl> {
        let mut found = None;
        for decl in &self.declarations {
            if let Decl::Routine(routine) = decl {
                if routine.name == name {
                    if routine.body.is_some() {
                        return Some(routine);
                    }
                    found = Some(routine);
                }
            }
        }
        found
    }
}

/// 宣言
#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Var(VarDecl),
    Type(TypeDecl),
    Routine(RoutineDecl),
}

impl Decl {
    pub fn span(&self) -> Span {
        match self {
            Decl::Var(decl) => decl.span,
            Decl::Type(decl) => decl.span,
            Decl::Routine(decl) => decl.span,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Decl::Var(decl) => &decl.name,
            Decl::Type(decl) => &decl.name,
            Decl::Routine(decl) => &decl.name,
        }
    }
}

/// 変数宣言 `var name [: type] [is expr]`
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub span: Span,
    pub name: String,
    pub ty: Option<TypeRef>,
    pub initializer: Option<Expr>,
}

/// 型宣言 `type Name is type`
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    pub span: Span,
    pub name: String,
    pub ty: TypeRef,
}

/// ルーチン宣言。本体が無ければ前方宣言。
#[derive(Debug, Clone, PartialEq)]
pub struct RoutineDecl {
    pub span: Span,
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<TypeRef>,
    pub body: Option<RoutineBody>,
}

impl RoutineDecl {
    pub fn is_forward(&self) -> bool {
        self.body.is_none()
    }
}

/// 仮引数 `name : type`
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub span: Span,
    pub name: String,
    pub ty: TypeRef,
}

/// ルーチン本体
#[derive(Debug, Clone, PartialEq)]
pub enum RoutineBody {
    /// `=> expr`
    Expr(Expr),
    /// `is ... end`
    Block(Block),
}

/// 組み込みの基本型名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveName {
    Integer,
    Real,
    Boolean,
}

impl PrimitiveName {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "integer" => Some(PrimitiveName::Integer),
            "real" => Some(PrimitiveName::Real),
            "boolean" => Some(PrimitiveName::Boolean),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveName::Integer => "integer",
            PrimitiveName::Real => "real",
            PrimitiveName::Boolean => "boolean",
        }
    }
}

/// 型参照
#[derive(Debug, Clone, PartialEq)]
pub struct TypeRef {
    pub span: Span,
    pub kind: TypeRefKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeRefKind {
    /// 基本型
    Primitive(PrimitiveName),
    /// 名前付き型（意味解析で解決）
    Named(String),
    /// レコード型
    Record { fields: Vec<VarDecl> },
    /// 配列型。サイズ省略は引数位置などで使う。
    Array { element: Box<TypeRef>, size: Option<Box<Expr>> },
}

/// ブロック。宣言と文が混在し、宣言はブロック内にスコープを持つ。
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub span: Span,
    pub items: Vec<BlockItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockItem {
    Decl(Decl),
    Stmt(Stmt),
}

/// 文
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub span: Span,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// 代入 `target := value`
    Assign { target: Expr, value: Expr },
    /// 呼び出し文
    Call { name: String, args: Vec<Expr> },
    /// 条件分岐
    If { condition: Expr, then_block: Block, else_block: Option<Block> },
    /// whileループ
    While { condition: Expr, body: Block },
    /// forループ。`second` が無ければ配列の走査。
    For { iterator: String, first: Expr, second: Option<Expr>, reverse: bool, body: Block },
    /// return文
    Return(Option<Expr>),
    /// print文
    Print(Vec<Expr>),
    /// エラー回復や除去された文の跡
    Empty,
    /// 最適化で差し込まれたブロック
    Block(Block),
}

impl Stmt {
    pub fn new(span: Span, kind: StmtKind) -> Self {
        Self { span, kind }
    }

    pub fn empty(span: Span) -> Self {
        Self::new(span, StmtKind::Empty)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.kind, StmtKind::Empty)
    }
}

/// 式
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Name(String),
    Field { receiver: Box<Expr>, field: String },
    Index { receiver: Box<Expr>, index: Box<Expr> },
    Call { name: String, args: Vec<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
}

impl Expr {
    pub fn new(span: Span, kind: ExprKind) -> Self {
        Self { span, kind }
    }

    pub fn integer(span: Span, value: i64) -> Self {
        Self::new(span, ExprKind::Integer(value))
    }

    pub fn real(span: Span, value: f64) -> Self {
        Self::new(span, ExprKind::Real(value))
    }

    pub fn boolean(span: Span, value: bool) -> Self {
        Self::new(span, ExprKind::Boolean(value))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.kind, ExprKind::Integer(_) | ExprKind::Real(_) | ExprKind::Boolean(_))
    }

    /// 代入の左辺になれる形か
    pub fn is_lvalue(&self) -> bool {
        matches!(self.kind, ExprKind::Name(_) | ExprKind::Field { .. } | ExprKind::Index { .. })
    }
}

/// 単項演算子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnaryOp::Plus => "+",
            UnaryOp::Minus => "-",
            UnaryOp::Not => "not",
        })
    }
}

/// 二項演算子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
    And,
    Or,
    Xor,
}

impl BinaryOp {
    pub fn is_arithmetic(&self) -> bool {
        matches!(self, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod)
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Less
                | BinaryOp::LessEqual
                | BinaryOp::Greater
                | BinaryOp::GreaterEqual
                | BinaryOp::Equal
                | BinaryOp::NotEqual
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or | BinaryOp::Xor)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::Equal => "=",
            BinaryOp::NotEqual => "/=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
