use imlang_compiler::ast::{
    BinaryOp, BlockItem, Decl, Expr, ExprKind, PrimitiveName, RoutineBody, StmtKind, TypeRefKind, UnaryOp,
};
use imlang_compiler::frontend::parser;
use imlang_compiler::{parse, Stage};

fn expression(source: &str) -> Expr {
    let (expr, diagnostics) = parser::parse_expression(source);
    assert!(diagnostics.is_empty(), "式 '{}' の診断: {:?}", source, diagnostics);
    expr
}

fn binary(expr: &Expr) -> (BinaryOp, &Expr, &Expr) {
    match &expr.kind {
        ExprKind::Binary { op, left, right } => (*op, left, right),
        other => panic!("二項演算ではない: {:?}", other),
    }
}

#[test]
fn test_parse_print_routine() {
    let result = parse("routine main() is\n  print 42\nend");
    assert!(result.diagnostics.is_empty(), "診断: {:?}", result.diagnostics);
    assert_eq!(result.program.declarations.len(), 1);

    let Decl::Routine(routine) = &result.program.declarations[0] else {
        panic!("ルーチン宣言ではない");
    };
    assert_eq!(routine.name, "main");
    assert!(routine.params.is_empty());
    assert!(routine.return_type.is_none());

    let Some(RoutineBody::Block(block)) = &routine.body else {
        panic!("ブロック本体ではない");
    };
    assert_eq!(block.items.len(), 1);
    let BlockItem::Stmt(stmt) = &block.items[0] else {
        panic!("文ではない");
    };
    let StmtKind::Print(items) = &stmt.kind else {
        panic!("print 文ではない");
    };
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].kind, ExprKind::Integer(42));
}

#[test]
fn test_parse_precedence() {
    // 1 + 2 * 3 は 1 + (2 * 3)
    let expr = expression("1 + 2 * 3");
    let (op, left, right) = binary(&expr);
    assert_eq!(op, BinaryOp::Add);
    assert_eq!(left.kind, ExprKind::Integer(1));
    assert_eq!(binary(right).0, BinaryOp::Mul);

    // 比較は算術より弱く、論理積より強い
    let expr = expression("a < b + 1 and c");
    let (op, left, _) = binary(&expr);
    assert_eq!(op, BinaryOp::And);
    assert_eq!(binary(left).0, BinaryOp::Less);

    // or が最も弱い
    let expr = expression("a xor b or c and d");
    let (op, left, right) = binary(&expr);
    assert_eq!(op, BinaryOp::Or);
    assert_eq!(binary(left).0, BinaryOp::Xor);
    assert_eq!(binary(right).0, BinaryOp::And);
}

#[test]
fn test_parse_left_associativity() {
    let expr = expression("10 - 4 - 3");
    let (op, left, right) = binary(&expr);
    assert_eq!(op, BinaryOp::Sub);
    assert_eq!(right.kind, ExprKind::Integer(3));
    let (inner, a, b) = binary(left);
    assert_eq!(inner, BinaryOp::Sub);
    assert_eq!(a.kind, ExprKind::Integer(10));
    assert_eq!(b.kind, ExprKind::Integer(4));
}

#[test]
fn test_parse_unary_binds_tighter() {
    let expr = expression("-a * b");
    let (op, left, _) = binary(&expr);
    assert_eq!(op, BinaryOp::Mul);
    assert!(matches!(left.kind, ExprKind::Unary { op: UnaryOp::Minus, .. }));

    let expr = expression("not x = y");
    let (op, left, _) = binary(&expr);
    assert_eq!(op, BinaryOp::Equal);
    assert!(matches!(left.kind, ExprKind::Unary { op: UnaryOp::Not, .. }));
}

#[test]
fn test_parse_postfix_chain() {
    let expr = expression("a.b[i + 1].c");
    let ExprKind::Field { receiver, field } = &expr.kind else {
        panic!("フィールド参照ではない");
    };
    assert_eq!(field, "c");
    let ExprKind::Index { receiver, index } = &receiver.kind else {
        panic!("添字参照ではない");
    };
    assert_eq!(binary(index).0, BinaryOp::Add);
    assert!(matches!(&receiver.kind, ExprKind::Field { field, .. } if field == "b"));
}

#[test]
fn test_parse_spans_cover_children() {
    let source = "(1 + foo(2, 3)) * x[4]";
    let expr = expression(source);
    assert_eq!(expr.span.extract_source(source), source);

    let (_, left, right) = binary(&expr);
    assert!(expr.span.contains(left.span));
    assert!(expr.span.contains(right.span));
    assert_eq!(left.span.extract_source(source), "(1 + foo(2, 3))");
    assert_eq!(right.span.extract_source(source), "x[4]");
}

#[test]
fn test_parse_declarations() {
    let source = "\
type Point is record
  var x : integer
  var y : real
end
type Row is array[3 + 1] Point
var count : integer is 0
routine f(a: integer): integer
routine f(a: integer): integer => a * 2
";
    let result = parse(source);
    assert!(result.diagnostics.is_empty(), "診断: {:?}", result.diagnostics);

    let names: Vec<&str> = result.program.declarations.iter().map(|d| d.name()).collect();
    assert_eq!(names, vec!["Point", "Row", "count", "f", "f"]);

    let Decl::Type(point) = &result.program.declarations[0] else {
        panic!("型宣言ではない");
    };
    let TypeRefKind::Record { fields } = &point.ty.kind else {
        panic!("レコード型ではない");
    };
    assert_eq!(fields.len(), 2);
    assert!(matches!(
        fields[1].ty.as_ref().map(|t| &t.kind),
        Some(TypeRefKind::Primitive(PrimitiveName::Real))
    ));

    let Decl::Type(row) = &result.program.declarations[1] else {
        panic!("型宣言ではない");
    };
    assert!(matches!(&row.ty.kind, TypeRefKind::Array { size: Some(_), .. }));

    let Decl::Routine(forward) = &result.program.declarations[3] else {
        panic!("ルーチン宣言ではない");
    };
    assert!(forward.is_forward(), "本体の無い宣言は前方宣言");
    let Decl::Routine(full) = &result.program.declarations[4] else {
        panic!("ルーチン宣言ではない");
    };
    assert!(matches!(full.body, Some(RoutineBody::Expr(_))));
    assert_eq!(result.program.routine("f").map(|r| r.is_forward()), Some(false));
}

#[test]
fn test_parse_statements() {
    let source = "\
routine main() is
  var a : array[5] integer
  for i in 1 .. 5 reverse loop
    a[i] := i
  end
  for v in a loop print v end
  while false loop end
  if a[1] > 2 then print 1 else print 2, 3.5 end
  show(a[2]);
  return
end
";
    let result = parse(source);
    assert!(result.diagnostics.is_empty(), "診断: {:?}", result.diagnostics);

    let routine = result.program.routine("main").expect("main が無い");
    let Some(RoutineBody::Block(block)) = &routine.body else {
        panic!("ブロック本体ではない");
    };
    let statements: Vec<&StmtKind> = block
        .items
        .iter()
        .filter_map(|item| match item {
            BlockItem::Stmt(stmt) => Some(&stmt.kind),
            BlockItem::Decl(_) => None,
        })
        .collect();
    assert_eq!(statements.len(), 6);

    assert!(matches!(statements[0], StmtKind::For { reverse: true, second: Some(_), .. }));
    assert!(matches!(statements[1], StmtKind::For { reverse: false, second: None, .. }));
    assert!(matches!(statements[2], StmtKind::While { .. }));
    match statements[3] {
        StmtKind::If { else_block: Some(else_block), .. } => assert_eq!(else_block.items.len(), 1),
        other => panic!("else 付きの if ではない: {:?}", other),
    }
    assert!(matches!(statements[4], StmtKind::Call { name, args } if name == "show" && args.len() == 1));
    assert!(matches!(statements[5], StmtKind::Return(None)));
}

#[test]
fn test_parse_recovers_from_missing_expression() {
    let source = "routine main() is\n  var x is\n  x := 1\nend\nroutine other() is\n  print 2\nend\n";
    let result = parse(source);

    assert_eq!(result.diagnostics.len(), 1, "診断: {:?}", result.diagnostics);
    let diagnostic = &result.diagnostics[0];
    assert_eq!(diagnostic.stage, Stage::Syntax);
    assert!(diagnostic.message.contains("primary expression expected"));
    assert_eq!(diagnostic.line(), 2);

    // 後続の宣言も解析される
    assert!(result.program.routine("other").is_some());
}

#[test]
fn test_parse_reports_missing_keyword() {
    let result = parse("routine main() is\n  if true print 1 end\nend\n");

    assert!(
        result.diagnostics.iter().any(|d| d.message.contains("expected 'then'")),
        "診断: {:?}",
        result.diagnostics
    );
    assert!(result.program.routine("main").is_some());
}

#[test]
fn test_parse_skips_stray_tokens_at_top_level() {
    let result = parse("42 + x\nroutine main() is\n  print 1\nend\n");

    assert!(result.diagnostics.iter().any(|d| d.message.contains("declaration expected")));
    assert_eq!(result.program.declarations.len(), 1);
}

#[test]
fn test_parse_lexical_errors_become_diagnostics() {
    let result = parse("var x is 1.3.5\n");

    assert_eq!(result.diagnostics.len(), 2, "診断: {:?}", result.diagnostics);
    assert_eq!(result.diagnostics[0].stage, Stage::Lexical);
    assert!(result.diagnostics[0].message.contains("multiple decimal points"));
}

#[test]
fn test_parse_assignment_requires_lvalue_form() {
    let result = parse("routine main() is\n  x\nend\n");

    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.message.contains("expected ':=' or '(' after identifier")));
}
