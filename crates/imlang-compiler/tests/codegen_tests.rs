use imlang_compiler::backend::wasm::{
    generate, BlockType, CodegenOptions, DataSegment, ExportKind, FuncType, Global, Instruction, Limits, MemArg,
    Module, ValueType,
};
use imlang_compiler::{analyze, parse, CompilerError};

use Instruction::*;

/// 構文・意味解析を通してから既定のオプションで生成する
fn module(source: &str) -> Module {
    module_with(source, &CodegenOptions::default())
}

fn module_with(source: &str, options: &CodegenOptions) -> Module {
    let parsed = parse(source);
    assert!(parsed.diagnostics.is_empty(), "構文エラー: {:?}", parsed.diagnostics);
    let analysis = analyze(&parsed.program);
    assert!(!analysis.has_errors(), "意味エラー: {:?}", analysis.diagnostics);
    generate(&parsed.program, options).expect("コード生成に失敗")
}

fn body<'m>(module: &'m Module, name: &str) -> &'m [Instruction] {
    &module
        .functions
        .iter()
        .find(|function| function.name == name)
        .unwrap_or_else(|| panic!("関数 '{}' が無い", name))
        .body
}

/// 入れ子の命令列も含めて条件に合う命令があるか
fn contains(code: &[Instruction], predicate: &dyn Fn(&Instruction) -> bool) -> bool {
    code.iter().any(|instruction| {
        predicate(instruction)
            || match instruction {
                Block { body, .. } | Loop { body, .. } => contains(body, predicate),
                If { then_body, else_body, .. } => contains(then_body, predicate) || contains(else_body, predicate),
                _ => false,
            }
    })
}

fn loop_block(body: Vec<Instruction>) -> Instruction {
    Block { ty: BlockType::Empty, body: vec![Loop { ty: BlockType::Empty, body }] }
}

#[test]
fn test_codegen_print_routine() {
    let module = module("routine main() is\n  print 42\nend");

    let imports: Vec<(&str, &str, u32)> = module
        .imports
        .iter()
        .map(|import| (import.module.as_str(), import.name.as_str(), import.type_index))
        .collect();
    assert_eq!(imports, vec![("env", "print_i32", 0), ("env", "print_f64", 1)]);

    assert_eq!(module.types[0], FuncType::new(vec![ValueType::I32], vec![]));
    assert_eq!(module.types[1], FuncType::new(vec![ValueType::F64], vec![]));
    assert_eq!(module.types[2], FuncType::new(vec![], vec![]));

    assert_eq!(module.functions.len(), 1);
    assert_eq!(module.functions[0].type_index, 2);
    assert_eq!(body(&module, "main"), &[I32Const(42), Call(0)]);

    // 関数添字はインポートの後から数える
    let export = module.export("main").expect("main がエクスポートされていない");
    assert_eq!((export.kind, export.index), (ExportKind::Function, 2));
    assert!(module.memory.is_none(), "集約型が無ければメモリは不要");
    assert!(module.data.is_empty());
}

#[test]
fn test_codegen_print_real_uses_real_import() {
    let module = module("routine main() is\n  print 1.5, true\nend");
    assert_eq!(body(&module, "main"), &[F64Const(1.5), Call(1), I32Const(1), Call(0)]);
}

#[test]
fn test_codegen_function_types_are_interned() {
    let source = "\
routine a(x: integer): integer => x
routine b(y: integer): integer => y + 1
routine main() is
  print a(b(1))
end
";
    let module = module(source);

    assert_eq!(module.functions[0].type_index, module.functions[1].type_index, "同じシグネチャは同じ型");
    assert_eq!(module.types.len(), 4);
    assert_eq!(
        module.types[module.functions[0].type_index as usize],
        FuncType::new(vec![ValueType::I32], vec![ValueType::I32])
    );
    assert_eq!(body(&module, "a"), &[LocalGet(0)]);
    assert_eq!(body(&module, "b"), &[LocalGet(0), I32Const(1), I32Add]);
    assert_eq!(body(&module, "main"), &[I32Const(1), Call(3), Call(2), Call(0)]);
}

#[test]
fn test_codegen_export_options() {
    let source = "routine helper(): integer => 7\nroutine main() is\n  print helper()\nend\n";

    let default = module(source);
    let names: Vec<&str> = default.exports.iter().map(|export| export.name.as_str()).collect();
    assert_eq!(names, vec!["main"]);

    let options = CodegenOptions { export_all_routines: true, ..CodegenOptions::default() };
    let all = module_with(source, &options);
    let exports: Vec<(&str, u32)> = all.exports.iter().map(|export| (export.name.as_str(), export.index)).collect();
    assert_eq!(exports, vec![("helper", 2), ("main", 3)]);

    let options = CodegenOptions { entry_point: "helper".to_string(), ..CodegenOptions::default() };
    let renamed = module_with(source, &options);
    assert!(renamed.export("helper").is_some());
    assert!(renamed.export("main").is_none());
}

#[test]
fn test_codegen_local_coercions() {
    let module = module("routine main() is\n  var r : real is 1\n  var b : boolean is 2\n  var i : integer\nend\n");

    assert_eq!(module.functions[0].locals, vec![ValueType::F64, ValueType::I32, ValueType::I32]);
    assert_eq!(
        body(&module, "main"),
        &[
            I32Const(1),
            F64ConvertI32S,
            LocalSet(0),
            I32Const(2),
            I32Const(0),
            I32Ne,
            LocalSet(1),
            I32Const(0),
            LocalSet(2),
        ]
    );
}

#[test]
fn test_codegen_shadowed_variables_get_separate_locals() {
    let source = "\
routine main() is
  var x : integer is 1
  if true then
    var x : real is 2.5
    print x
  end
  print x
end
";
    let module = module(source);

    assert_eq!(module.functions[0].locals, vec![ValueType::I32, ValueType::F64]);
    assert_eq!(
        body(&module, "main"),
        &[
            I32Const(1),
            LocalSet(0),
            I32Const(1),
            If {
                ty: BlockType::Empty,
                then_body: vec![F64Const(2.5), LocalSet(1), LocalGet(1), Call(1)],
                else_body: vec![],
            },
            LocalGet(0),
            Call(0),
        ]
    );
}

#[test]
fn test_codegen_while_loop() {
    let module = module("routine main() is\n  var i is 0\n  while i < 3 loop\n    i := i + 1\n  end\nend\n");

    assert_eq!(
        body(&module, "main"),
        &[
            I32Const(0),
            LocalSet(0),
            loop_block(vec![
                LocalGet(0),
                I32Const(3),
                I32LtS,
                I32Eqz,
                BrIf(1),
                LocalGet(0),
                I32Const(1),
                I32Add,
                LocalSet(0),
                Br(0),
            ]),
        ]
    );
}

#[test]
fn test_codegen_range_loops() {
    let module = module("routine main() is\n  for i in 1 .. 3 loop print i end\nend\n");
    assert_eq!(
        body(&module, "main"),
        &[
            I32Const(1),
            LocalSet(0),
            I32Const(3),
            LocalSet(1),
            loop_block(vec![
                LocalGet(0),
                LocalGet(1),
                I32GtS,
                BrIf(1),
                LocalGet(0),
                Call(0),
                LocalGet(0),
                LocalGet(1),
                I32GeS,
                BrIf(1),
                LocalGet(0),
                I32Const(1),
                I32Add,
                LocalSet(0),
                Br(0),
            ]),
        ]
    );

    // reverse は上限から始めて下限を下回ったら抜ける。下限に達した回は減らす前に抜ける
    let module = crate::module("routine main() is\n  for i in 1 .. 3 reverse loop print i end\nend\n");
    assert_eq!(
        body(&module, "main"),
        &[
            I32Const(1),
            LocalSet(1),
            I32Const(3),
            LocalSet(0),
            loop_block(vec![
                LocalGet(0),
                LocalGet(1),
                I32LtS,
                BrIf(1),
                LocalGet(0),
                Call(0),
                LocalGet(0),
                LocalGet(1),
                I32LeS,
                BrIf(1),
                LocalGet(0),
                I32Const(1),
                I32Sub,
                LocalSet(0),
                Br(0),
            ]),
        ]
    );
}

#[test]
fn test_codegen_globals() {
    let source = "\
var g : integer is 5
var r : real is 3
var k is g * 2
routine main() is
  print k
end
";
    let module = module(source);

    assert_eq!(
        module.globals,
        vec![
            Global { ty: ValueType::I32, mutable: true, init: I32Const(5) },
            Global { ty: ValueType::F64, mutable: true, init: F64Const(3.0) },
            Global { ty: ValueType::I32, mutable: true, init: I32Const(0) },
        ]
    );
    // 定数でない初期化式はエントリポイントの先頭で実行する
    assert_eq!(
        body(&module, "main"),
        &[GlobalGet(0), I32Const(2), I32Mul, GlobalSet(2), GlobalGet(2), Call(0)]
    );
}

#[test]
fn test_codegen_arrays_use_static_memory() {
    let source = "\
routine main() is
  var a : array[3] integer
  a[2] := 7
  print a[2]
end
";
    let module = module(source);

    assert_eq!(module.memory, Some(Limits { min: 1, max: None }));
    let export = module.export("memory").expect("メモリがエクスポートされていない");
    assert_eq!((export.kind, export.index), (ExportKind::Memory, 0));
    // 配列ヘッダ（長さ 3）だけが初期値を持つ
    assert_eq!(module.data, vec![DataSegment { offset: 0, bytes: vec![3] }]);

    let main = body(&module, "main");
    let traps = |instruction: &Instruction| {
        matches!(instruction, If { then_body, .. } if then_body.as_slice() == [Unreachable])
    };
    assert!(contains(main, &traps), "範囲検査が無い");
    assert!(contains(main, &|instruction| matches!(instruction, I32Store(_))));
    assert!(contains(main, &|instruction| matches!(instruction, I32Load(_))));
}

#[test]
fn test_codegen_aggregate_declaration_clears_elements() {
    let module = module("routine main() is\n  var a : array[2] integer\nend\n");

    // ヘッダは残し、要素だけを先頭から 0 で埋める
    assert_eq!(module.functions[0].locals, vec![ValueType::I32, ValueType::I32]);
    assert_eq!(
        body(&module, "main"),
        &[
            I32Const(0),
            LocalSet(0),
            LocalGet(0),
            I32Load(MemArg::natural(ValueType::I32, 0)),
            LocalSet(1),
            LocalGet(0),
            I32Const(4),
            I32Add,
            LocalSet(0),
            loop_block(vec![
                LocalGet(1),
                I32Const(0),
                I32LeS,
                BrIf(1),
                LocalGet(0),
                I32Const(0),
                I32Store(MemArg::natural(ValueType::I32, 0)),
                LocalGet(0),
                I32Const(4),
                I32Add,
                LocalSet(0),
                LocalGet(1),
                I32Const(1),
                I32Sub,
                LocalSet(1),
                Br(0),
            ]),
        ]
    );
}

#[test]
fn test_codegen_record_declaration_clears_fields() {
    let source = "\
type Point is record
  var x : integer
  var y : real
end
routine main() is
  var p : Point
end
";
    let module = module(source);

    assert_eq!(
        body(&module, "main"),
        &[
            I32Const(0),
            LocalSet(0),
            LocalGet(0),
            I32Const(0),
            I32Store(MemArg::natural(ValueType::I32, 0)),
            LocalGet(0),
            F64Const(0.0),
            F64Store(MemArg::natural(ValueType::F64, 8)),
        ]
    );
}

#[test]
fn test_codegen_static_memory_overflow_is_error() {
    let source = "\
routine main() is
  var a : array[600000000] integer
  var b : array[600000000] integer
end
";
    let parsed = parse(source);
    assert!(parsed.diagnostics.is_empty());

    let error = generate(&parsed.program, &CodegenOptions::default()).expect_err("エラーになるはず");
    match error {
        CompilerError::CodeGen { message, span } => {
            assert_eq!(message, "Aggregate type is too large for linear memory");
            assert_eq!(span.map(|span| span.line), Some(3));
        }
        other => panic!("コード生成エラーではない: {:?}", other),
    }
}

#[test]
fn test_codegen_integer_literals_must_fit_in_i32() {
    let module = module("routine main() is\n  print -2147483648\n  print 2147483647\nend\n");
    assert_eq!(body(&module, "main"), &[I32Const(i32::MIN), Call(0), I32Const(i32::MAX), Call(0)]);

    for (source, literal) in [
        ("routine main() is\n  print 2147483648\nend\n", "2147483648"),
        ("routine main() is\n  print -2147483649\nend\n", "2147483649"),
        ("routine main() is\n  var x : integer is 3 + 4294967296\nend\n", "4294967296"),
    ] {
        let parsed = parse(source);
        assert!(parsed.diagnostics.is_empty());
        let error = generate(&parsed.program, &CodegenOptions::default()).expect_err("エラーになるはず");
        match error {
            CompilerError::CodeGen { message, span } => {
                assert!(message.contains(literal), "{}", message);
                assert!(message.ends_with("does not fit in 32 bits"), "{}", message);
                assert_eq!(span.map(|span| span.line), Some(2));
            }
            other => panic!("コード生成エラーではない: {:?}", other),
        }
    }
}

#[test]
fn test_codegen_records_and_for_each() {
    let source = "\
type Point is record
  var x : integer
  var y : real
end
routine main() is
  var p : Point
  var items : array[2] real
  p.y := 1.5
  for v in items loop
    print v + p.y
  end
end
";
    let module = module(source);

    assert!(module.memory.is_some());
    let main = body(&module, "main");
    assert!(contains(main, &|instruction| matches!(instruction, F64Store(_))));
    assert!(contains(main, &|instruction| matches!(instruction, F64Load(_))));
    assert!(contains(main, &|instruction| *instruction == Call(1)));
}

#[test]
fn test_codegen_call_statement_drops_result() {
    let module = module("routine f(): integer => 1\nroutine main() is\n  f()\nend\n");

    assert_eq!(body(&module, "f"), &[I32Const(1)]);
    assert_eq!(body(&module, "main"), &[Call(2), Drop]);
}

#[test]
fn test_codegen_block_routine_ends_with_trap() {
    let module = module("routine g(): integer is\n  return 1\nend\n");
    assert_eq!(body(&module, "g"), &[I32Const(1), Return, Unreachable]);
}

#[test]
fn test_codegen_real_remainder_and_comparison() {
    let module = module("routine main() is\n  var a : real is 7.5\n  print a % 2\n  print a = 7.5\nend\n");

    let main = body(&module, "main");
    assert!(main.contains(&F64Trunc), "実数の剰余は trunc で求める");
    assert!(main.contains(&F64ConvertI32S));
    assert!(main.contains(&F64Eq));
}

#[test]
fn test_codegen_undefined_routine_is_error() {
    let parsed = parse("routine f(): integer\nroutine main() is\n  print f()\nend\n");
    assert!(parsed.diagnostics.is_empty());

    let error = generate(&parsed.program, &CodegenOptions::default()).expect_err("エラーになるはず");
    match error {
        CompilerError::CodeGen { message, span } => {
            assert_eq!(message, "Routine 'f' is declared but never defined");
            assert_eq!(span.map(|span| span.line), Some(3));
        }
        other => panic!("コード生成エラーではない: {:?}", other),
    }
}
