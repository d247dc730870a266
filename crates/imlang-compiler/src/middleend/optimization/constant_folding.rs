//! # 定数畳み込み
//!
//! リテラル同士の演算をコンパイル時に評価します。
//! 変化が無い部分木は元のノードをそのまま（借用で）返し、変化があれば新しいノードを作ります。
//!
//! 実数の等値比較は `REAL_EPSILON` の許容誤差で判定します。実行時の `f64.eq` は厳密比較なので、
//! 畳み込み結果と実行時の結果が食い違う場合があります。

use std::borrow::Cow;

use crate::frontend::ast::{BinaryOp, Expr, ExprKind, UnaryOp};

/// 実数の等値比較の許容誤差
pub const REAL_EPSILON: f64 = 1e-10;

/// 定数畳み込み器
#[derive(Debug, Default)]
pub struct ConstantFolder {
    folded: usize,
}

impl ConstantFolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// これまでに畳み込んだノード数
    pub fn folded_count(&self) -> usize {
        self.folded
    }

    pub fn fold<'e>(&mut self, expr: &'e Expr) -> Cow<'e, Expr> {
        match &expr.kind {
            ExprKind::Integer(_) | ExprKind::Real(_) | ExprKind::Boolean(_) | ExprKind::Name(_) => {
                Cow::Borrowed(expr)
            }
            ExprKind::Unary { op, operand } => {
                let operand = self.fold(operand);
                if let Some(kind) = fold_unary(*op, &operand.kind) {
                    self.folded += 1;
                    return Cow::Owned(Expr::new(expr.span, kind));
                }
                match operand {
                    Cow::Borrowed(_) => Cow::Borrowed(expr),
                    Cow::Owned(operand) => Cow::Owned(Expr::new(
                        expr.span,
                        ExprKind::Unary { op: *op, operand: Box::new(operand) },
                    )),
                }
            }
            ExprKind::Binary { op, left, right } => {
                let left = self.fold(left);

                // false and X → false, true or X → true
                if let ExprKind::Boolean(value) = &left.kind {
                    let short = match op {
                        BinaryOp::And => !*value,
                        BinaryOp::Or => *value,
                        _ => false,
                    };
                    if short {
                        self.folded += 1;
                        return Cow::Owned(Expr::boolean(expr.span, *value));
                    }
                }

                let right = self.fold(right);
                if let Some(kind) = fold_binary(*op, &left.kind, &right.kind) {
                    self.folded += 1;
                    return Cow::Owned(Expr::new(expr.span, kind));
                }

                if matches!((&left, &right), (Cow::Borrowed(_), Cow::Borrowed(_))) {
                    return Cow::Borrowed(expr);
                }
                Cow::Owned(Expr::new(
                    expr.span,
                    ExprKind::Binary {
                        op: *op,
                        left: Box::new(left.into_owned()),
                        right: Box::new(right.into_owned()),
                    },
                ))
            }
            ExprKind::Call { name, args } => {
                let folded: Vec<Cow<'e, Expr>> = args.iter().map(|arg| self.fold(arg)).collect();
                if folded.iter().all(|arg| matches!(arg, Cow::Borrowed(_))) {
                    return Cow::Borrowed(expr);
                }
                let args = folded.into_iter().map(Cow::into_owned).collect();
                Cow::Owned(Expr::new(expr.span, ExprKind::Call { name: name.clone(), args }))
            }
            ExprKind::Field { receiver, field } => match self.fold(receiver) {
                Cow::Borrowed(_) => Cow::Borrowed(expr),
                Cow::Owned(receiver) => Cow::Owned(Expr::new(
                    expr.span,
                    ExprKind::Field { receiver: Box::new(receiver), field: field.clone() },
                )),
            },
            ExprKind::Index { receiver, index } => {
                let receiver = self.fold(receiver);
                let index = self.fold(index);
                if matches!((&receiver, &index), (Cow::Borrowed(_), Cow::Borrowed(_))) {
                    return Cow::Borrowed(expr);
                }
                Cow::Owned(Expr::new(
                    expr.span,
                    ExprKind::Index {
                        receiver: Box::new(receiver.into_owned()),
                        index: Box::new(index.into_owned()),
                    },
                ))
            }
        }
    }
}

/// 式を畳み込む
pub fn fold_expression(expr: &Expr) -> Cow<'_, Expr> {
    ConstantFolder::new().fold(expr)
}

fn fold_unary(op: UnaryOp, operand: &ExprKind) -> Option<ExprKind> {
    match (op, operand) {
        (UnaryOp::Plus, ExprKind::Integer(v)) => Some(ExprKind::Integer(*v)),
        (UnaryOp::Plus, ExprKind::Real(v)) => Some(ExprKind::Real(*v)),
        (UnaryOp::Minus, ExprKind::Integer(v)) => v.checked_neg().map(ExprKind::Integer),
        (UnaryOp::Minus, ExprKind::Real(v)) => Some(ExprKind::Real(-v)),
        (UnaryOp::Not, ExprKind::Boolean(b)) => Some(ExprKind::Boolean(!b)),
        _ => None,
    }
}

fn fold_binary(op: BinaryOp, left: &ExprKind, right: &ExprKind) -> Option<ExprKind> {
    match (left, right) {
        (ExprKind::Integer(a), ExprKind::Integer(b)) => fold_integer(op, *a, *b),
        (ExprKind::Real(a), ExprKind::Real(b)) => fold_real(op, *a, *b),
        // 片方が実数なら実数に昇格して計算・比較する
        (ExprKind::Integer(a), ExprKind::Real(b)) => fold_real(op, *a as f64, *b),
        (ExprKind::Real(a), ExprKind::Integer(b)) => fold_real(op, *a, *b as f64),
        (ExprKind::Boolean(a), ExprKind::Boolean(b)) => fold_boolean(op, *a, *b),
        _ => None,
    }
}

/// 整数演算。オーバーフローとゼロ除算は畳み込まない。
fn fold_integer(op: BinaryOp, a: i64, b: i64) -> Option<ExprKind> {
    let kind = match op {
        BinaryOp::Add => ExprKind::Integer(a.checked_add(b)?),
        BinaryOp::Sub => ExprKind::Integer(a.checked_sub(b)?),
        BinaryOp::Mul => ExprKind::Integer(a.checked_mul(b)?),
        BinaryOp::Div if b != 0 => ExprKind::Integer(a.checked_div(b)?),
        BinaryOp::Mod if b != 0 => ExprKind::Integer(a.checked_rem(b)?),
        BinaryOp::Less => ExprKind::Boolean(a < b),
        BinaryOp::LessEqual => ExprKind::Boolean(a <= b),
        BinaryOp::Greater => ExprKind::Boolean(a > b),
        BinaryOp::GreaterEqual => ExprKind::Boolean(a >= b),
        BinaryOp::Equal => ExprKind::Boolean(a == b),
        BinaryOp::NotEqual => ExprKind::Boolean(a != b),
        _ => return None,
    };
    Some(kind)
}

fn real_arithmetic(op: BinaryOp, a: f64, b: f64) -> Option<f64> {
    let value = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div if b != 0.0 => a / b,
        BinaryOp::Mod if b != 0.0 => a % b,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

fn fold_real(op: BinaryOp, a: f64, b: f64) -> Option<ExprKind> {
    if op.is_arithmetic() {
        return real_arithmetic(op, a, b).map(ExprKind::Real);
    }
    let result = match op {
        BinaryOp::Less => a < b,
        BinaryOp::LessEqual => a <= b,
        BinaryOp::Greater => a > b,
        BinaryOp::GreaterEqual => a >= b,
        BinaryOp::Equal => (a - b).abs() < REAL_EPSILON,
        BinaryOp::NotEqual => (a - b).abs() >= REAL_EPSILON,
        _ => return None,
    };
    Some(ExprKind::Boolean(result))
}

fn fold_boolean(op: BinaryOp, a: bool, b: bool) -> Option<ExprKind> {
    let result = match op {
        BinaryOp::And => a && b,
        BinaryOp::Or => a || b,
        BinaryOp::Xor => a != b,
        BinaryOp::Equal => a == b,
        BinaryOp::NotEqual => a != b,
        _ => return None,
    };
    Some(ExprKind::Boolean(result))
}
