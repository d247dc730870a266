use std::borrow::Cow;

use imlang_compiler::ast::{BinaryOp, BlockItem, Expr, ExprKind, RoutineBody, StmtKind};
use imlang_compiler::backend::wasm::Instruction;
use imlang_compiler::frontend::parser;
use imlang_compiler::middleend::optimization::constant_folding::{fold_expression, REAL_EPSILON};
use imlang_compiler::middleend::ProgramOptimizer;
use imlang_compiler::{analyze, generate, parse};

fn expression(source: &str) -> Expr {
    let (expr, diagnostics) = parser::parse_expression(source);
    assert!(diagnostics.is_empty(), "式 '{}' の診断: {:?}", source, diagnostics);
    expr
}

fn folded(source: &str) -> ExprKind {
    fold_expression(&expression(source)).into_owned().kind
}

#[test]
fn test_fold_arithmetic() {
    assert_eq!(folded("2 * 3 + 4"), ExprKind::Integer(10));
    assert_eq!(folded("7 / 2"), ExprKind::Integer(3));
    assert_eq!(folded("7 % 3"), ExprKind::Integer(1));
    assert_eq!(folded("-(4 - 6)"), ExprKind::Integer(2));
    assert_eq!(folded("1 + 2.5"), ExprKind::Real(3.5));
    assert_eq!(folded("5.0 / 2"), ExprKind::Real(2.5));
}

#[test]
fn test_fold_comparisons_and_logic() {
    assert_eq!(folded("3 < 5"), ExprKind::Boolean(true));
    assert_eq!(folded("2 + 2 /= 4"), ExprKind::Boolean(false));
    assert_eq!(folded("true xor false"), ExprKind::Boolean(true));
    assert_eq!(folded("not (1 >= 2) and true"), ExprKind::Boolean(true));
}

#[test]
fn test_fold_short_circuit_on_constant_left() {
    assert_eq!(folded("false and x"), ExprKind::Boolean(false));
    assert_eq!(folded("true or f(1)"), ExprKind::Boolean(true));

    // 右辺が定数でも左辺が変数なら畳み込まない
    assert!(matches!(folded("x and false"), ExprKind::Binary { op: BinaryOp::And, .. }));
}

#[test]
fn test_fold_division_by_zero_is_kept() {
    assert!(matches!(folded("1 / 0"), ExprKind::Binary { op: BinaryOp::Div, .. }));
    assert!(matches!(folded("1.5 % 0.0"), ExprKind::Binary { op: BinaryOp::Mod, .. }));
}

#[test]
fn test_fold_is_idempotent() {
    let expr = expression("(1 + 2) * (10 - 4) / 3");
    let once = fold_expression(&expr).into_owned();
    let twice = fold_expression(&once).into_owned();

    assert_eq!(once.kind, ExprKind::Integer(6));
    assert_eq!(once, twice);
    assert_eq!(once.span, expr.span, "畳み込み後も元の範囲を保つ");
}

#[test]
fn test_fold_preserves_non_constant_subtrees() {
    let expr = expression("a[i] + f(x, y).z * b");
    let result = fold_expression(&expr);

    assert!(matches!(result, Cow::Borrowed(_)), "変化の無い式は借用のまま返す");
    assert_eq!(result.as_ref(), &expr);
}

#[test]
fn test_fold_partially_constant_expression() {
    let expr = expression("x + 2 * 3");
    let ExprKind::Binary { op, left, right } = folded("x + 2 * 3") else {
        panic!("二項演算ではない");
    };
    assert_eq!(op, BinaryOp::Add);
    assert_eq!(left.kind, ExprKind::Name("x".to_string()));
    assert_eq!(right.kind, ExprKind::Integer(6));

    let ExprKind::Binary { right: original, .. } = &expr.kind else {
        panic!("二項演算ではない");
    };
    assert_eq!(right.span, original.span);
}

#[test]
fn test_real_equality_folding_uses_tolerance_unlike_runtime() {
    // 畳み込みは許容誤差付きで比較する
    assert_eq!(folded("0.1 + 0.2 = 0.3"), ExprKind::Boolean(true));
    assert_eq!(folded("1.0 = 1.00000000001"), ExprKind::Boolean(true));
    assert_eq!(folded("1.0 /= 1.00000000001"), ExprKind::Boolean(false));
    assert!((1.0f64 - 1.00000000001).abs() < REAL_EPSILON);

    // 実行時の比較は厳密な f64.eq なので、同じ比較でも結果が食い違う
    assert_ne!(0.1 + 0.2, 0.3);
    let source = "routine main() is\n  var a : real is 0.1\n  print a + 0.2 = 0.3\nend\n";
    let parsed = parse(source);
    assert!(parsed.diagnostics.is_empty());
    assert!(analyze(&parsed.program).diagnostics.is_empty());
    let module = generate(&parsed.program).expect("コード生成に失敗");
    let main = &module.functions[0];
    assert!(main.body.contains(&Instruction::F64Eq), "実行時は f64.eq で比較する");
}

#[test]
fn test_dead_branches_are_removed() {
    let source = "\
routine main() is
  if false then
    print 1
  end
  if 1 < 2 then
    print 2
  else
    print 3
  end
  while 2 > 3 loop
    print 4
  end
  if 0 = 1 then print 5 else print 6 end
end
";
    let parsed = parse(source);
    assert!(parsed.diagnostics.is_empty(), "診断: {:?}", parsed.diagnostics);

    let mut optimizer = ProgramOptimizer::new();
    let optimized = optimizer.optimize(&parsed.program);
    let stats = optimizer.stats();

    let Some(RoutineBody::Block(block)) = &optimized.routine("main").expect("main が無い").body else {
        panic!("ブロック本体ではない");
    };
    let kinds: Vec<&StmtKind> = block
        .items
        .iter()
        .filter_map(|item| match item {
            BlockItem::Stmt(stmt) => Some(&stmt.kind),
            BlockItem::Decl(_) => None,
        })
        .collect();

    // if false と while は消え、残りの if は選ばれた側のブロックになる
    assert_eq!(kinds.len(), 2, "残った文: {:?}", kinds);
    for (kind, expected) in kinds.iter().zip([2, 6]) {
        let StmtKind::Block(inner) = kind else {
            panic!("ブロック文ではない: {:?}", kind);
        };
        let Some(BlockItem::Stmt(print)) = inner.items.first() else {
            panic!("文が無い");
        };
        let StmtKind::Print(items) = &print.kind else {
            panic!("print 文ではない");
        };
        assert_eq!(items[0].kind, ExprKind::Integer(expected));
    }

    assert_eq!(stats.statements_removed, 4);
    assert_eq!(stats.constants_folded, 3);
}

#[test]
fn test_optimizer_does_not_modify_input() {
    let parsed = parse("var g is 2 * 21\nroutine main() is\n  if true then print g end\nend\n");
    let before = parsed.program.clone();

    let optimized = imlang_compiler::optimize(&parsed.program);

    assert_eq!(parsed.program, before);
    assert_ne!(optimized, before);
    let imlang_compiler::ast::Decl::Var(global) = &optimized.declarations[0] else {
        panic!("変数宣言ではない");
    };
    assert_eq!(global.initializer.as_ref().map(|e| &e.kind), Some(&ExprKind::Integer(42)));
}

#[test]
fn test_loops_with_non_constant_conditions_are_kept() {
    let source = "routine main() is\n  var i is 0\n  while i < 3 + 1 loop\n    i := i + 1\n  end\nend\n";
    let parsed = parse(source);
    let optimized = imlang_compiler::optimize(&parsed.program);

    let Some(RoutineBody::Block(block)) = &optimized.routine("main").expect("main が無い").body else {
        panic!("ブロック本体ではない");
    };
    let condition = block.items.iter().find_map(|item| match item {
        BlockItem::Stmt(stmt) => match &stmt.kind {
            StmtKind::While { condition, .. } => Some(condition),
            _ => None,
        },
        BlockItem::Decl(_) => None,
    });
    let Some(Expr { kind: ExprKind::Binary { right, .. }, .. }) = condition else {
        panic!("while 文が残っていない");
    };
    assert_eq!(right.kind, ExprKind::Integer(4));
}
