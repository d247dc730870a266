use imlang_compiler::backend::wasm::binary::{compress_locals, MAGIC, VERSION};
use imlang_compiler::backend::wasm::{
    encode_binary, encode_text, BlockType, DataSegment, ExportKind, FuncType, Function, Global, Instruction, Limits, MemArg,
    Module, ValueType,
};
use imlang_compiler::{analyze, generate, parse};

fn compile(source: &str) -> Module {
    let parsed = parse(source);
    assert!(parsed.diagnostics.is_empty(), "構文エラー: {:?}", parsed.diagnostics);
    assert!(!analyze(&parsed.program).has_errors());
    generate(&parsed.program).expect("コード生成に失敗")
}

/// ヘッダ以降をセクション (id, 内容) に分ける
fn sections(bytes: &[u8]) -> Vec<(u8, Vec<u8>)> {
    let mut rest = &bytes[8..];
    let mut sections = Vec::new();
    while let Some((&id, tail)) = rest.split_first() {
        let mut reader = tail;
        let size = leb128::read::unsigned(&mut reader).expect("セクションサイズが読めない") as usize;
        sections.push((id, reader[..size].to_vec()));
        rest = &reader[size..];
    }
    sections
}

fn section(bytes: &[u8], id: u8) -> Vec<u8> {
    sections(bytes)
        .into_iter()
        .find(|(section_id, _)| *section_id == id)
        .map(|(_, payload)| payload)
        .unwrap_or_else(|| panic!("セクション {} が無い", id))
}

/// 引数無し・戻り値無しの関数一つだけのモジュール
fn single_function(locals: Vec<ValueType>, body: Vec<Instruction>) -> Module {
    let mut module = Module::new();
    let type_index = module.intern_type(FuncType::new(vec![], vec![]));
    module.functions.push(Function { name: "f".to_string(), type_index, locals, body });
    module
}

#[test]
fn test_binary_print_routine_bytes() {
    let bytes = encode_binary(&compile("routine main() is\n  print 42\nend")).unwrap();

    let mut expected = Vec::new();
    expected.extend_from_slice(&MAGIC);
    expected.extend_from_slice(&VERSION);
    // type: (i32)->(), (f64)->(), ()->()
    expected.extend_from_slice(&[0x01, 0x0C, 0x03, 0x60, 0x01, 0x7F, 0x00, 0x60, 0x01, 0x7C, 0x00, 0x60, 0x00, 0x00]);
    // import: env.print_i32, env.print_f64
    expected.extend_from_slice(&[0x02, 0x21, 0x02]);
    expected.extend_from_slice(&[0x03, b'e', b'n', b'v', 0x09]);
    expected.extend_from_slice(b"print_i32");
    expected.extend_from_slice(&[0x00, 0x00]);
    expected.extend_from_slice(&[0x03, b'e', b'n', b'v', 0x09]);
    expected.extend_from_slice(b"print_f64");
    expected.extend_from_slice(&[0x00, 0x01]);
    // function
    expected.extend_from_slice(&[0x03, 0x02, 0x01, 0x02]);
    // export "main" (func 2)
    expected.extend_from_slice(&[0x07, 0x08, 0x01, 0x04, b'm', b'a', b'i', b'n', 0x00, 0x02]);
    // code: i32.const 42; call 0; end
    expected.extend_from_slice(&[0x0A, 0x08, 0x01, 0x06, 0x00, 0x41, 0x2A, 0x10, 0x00, 0x0B]);

    assert_eq!(bytes, expected);
}

#[test]
fn test_binary_section_order_and_empty_sections() {
    let source = "\
var total : integer is 0
routine main() is
  var a : array[2] integer
  a[1] := 5
  total := a[1]
  print total
end
";
    let bytes = encode_binary(&compile(source)).unwrap();
    let ids: Vec<u8> = sections(&bytes).iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![1, 2, 3, 5, 6, 7, 10, 11]);

    // メモリもグローバルも無ければそのセクションは出ない
    let bytes = encode_binary(&compile("routine main() is\n  print 1\nend")).unwrap();
    let ids: Vec<u8> = sections(&bytes).iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![1, 2, 3, 7, 10]);

    // 空のモジュールはヘッダだけ
    assert_eq!(encode_binary(&Module::new()).unwrap(), [MAGIC, VERSION].concat());
}

#[test]
fn test_binary_memory_global_and_data_sections() {
    let mut module = Module::new();
    module.memory = Some(Limits { min: 1, max: Some(2) });
    module.add_global(Global { ty: ValueType::F64, mutable: true, init: Instruction::F64Const(1.5) });
    module.add_export("memory", ExportKind::Memory, 0);
    module.data.push(DataSegment { offset: 16, bytes: vec![1, 2, 3] });

    let bytes = encode_binary(&module).unwrap();

    assert_eq!(section(&bytes, 5), vec![0x01, 0x01, 0x01, 0x02]);
    let mut global = vec![0x01, 0x7C, 0x01, 0x44];
    global.extend_from_slice(&1.5f64.to_le_bytes());
    global.push(0x0B);
    assert_eq!(section(&bytes, 6), global);
    assert_eq!(section(&bytes, 7), vec![0x01, 0x06, b'm', b'e', b'm', b'o', b'r', b'y', 0x02, 0x00]);
    assert_eq!(section(&bytes, 11), vec![0x01, 0x00, 0x41, 0x10, 0x0B, 0x03, 0x01, 0x02, 0x03]);
}

#[test]
fn test_binary_leb128_immediates() {
    let module = single_function(
        vec![],
        vec![
            Instruction::I32Const(-1),
            Instruction::I32Const(624485),
            Instruction::I32Const(-123456),
            Instruction::Drop,
            Instruction::Drop,
            Instruction::Drop,
        ],
    );
    let bytes = encode_binary(&module).unwrap();

    let code = section(&bytes, 10);
    let body = &code[2..];
    assert_eq!(
        body,
        &[0x00, 0x41, 0x7F, 0x41, 0xE5, 0x8E, 0x26, 0x41, 0xC0, 0xBB, 0x78, 0x1A, 0x1A, 0x1A, 0x0B]
    );
}

#[test]
fn test_binary_large_section_size_uses_multiple_bytes() {
    let body = vec![Instruction::Nop; 200];
    let bytes = encode_binary(&single_function(vec![], body)).unwrap();

    let code = section(&bytes, 10);
    // 関数本体のサイズ 202 (ローカル宣言数 + nop×200 + end) は2バイトになる
    assert_eq!(&code[..3], &[0x01, 0xCA, 0x01]);
    assert_eq!(code.len(), 3 + 202);
}

#[test]
fn test_binary_locals_are_compressed() {
    let locals = vec![ValueType::I32, ValueType::I32, ValueType::F64, ValueType::I32];
    assert_eq!(
        compress_locals(&locals),
        vec![(2, ValueType::I32), (1, ValueType::F64), (1, ValueType::I32)]
    );
    assert!(compress_locals(&[]).is_empty());

    let bytes = encode_binary(&single_function(locals, vec![])).unwrap();
    let code = section(&bytes, 10);
    assert_eq!(&code[2..], &[0x03, 0x02, 0x7F, 0x01, 0x7C, 0x01, 0x7F, 0x0B]);
}

#[test]
fn test_binary_structured_control() {
    let module = single_function(
        vec![],
        vec![
            Instruction::I32Const(1),
            Instruction::If {
                ty: BlockType::Empty,
                then_body: vec![Instruction::Nop],
                else_body: vec![Instruction::Unreachable],
            },
            Instruction::Block {
                ty: BlockType::Empty,
                body: vec![Instruction::Loop {
                    ty: BlockType::Empty,
                    body: vec![Instruction::Br(1)],
                }],
            },
        ],
    );
    let bytes = encode_binary(&module).unwrap();

    let code = section(&bytes, 10);
    assert_eq!(
        &code[2..],
        &[
            0x00, 0x41, 0x01, 0x04, 0x40, 0x01, 0x05, 0x00, 0x0B, 0x02, 0x40, 0x03, 0x40, 0x0C, 0x01, 0x0B, 0x0B,
            0x0B
        ]
    );
}

#[test]
fn test_binary_memory_access_immediates() {
    let module = single_function(
        vec![],
        vec![
            Instruction::I32Const(0),
            Instruction::F64Load(MemArg::natural(ValueType::F64, 8)),
            Instruction::Drop,
        ],
    );
    let bytes = encode_binary(&module).unwrap();

    let code = section(&bytes, 10);
    // align は 2 の指数（f64 は 3）
    assert_eq!(&code[2..], &[0x00, 0x41, 0x00, 0x2B, 0x03, 0x08, 0x1A, 0x0B]);
}

#[test]
fn test_text_print_routine() {
    let text = encode_text(&compile("routine main() is\n  print 42\nend"));

    let expected = "\
(module
  (type (;0;) (func (param i32)))
  (type (;1;) (func (param f64)))
  (type (;2;) (func))
  (import \"env\" \"print_i32\" (func (;0;) (type 0)))
  (import \"env\" \"print_f64\" (func (;1;) (type 1)))
  (func (;2;) (type 2)
    i32.const 42
    call 0
  )
  (export \"main\" (func 2))
)
";
    assert_eq!(text, expected);
}

#[test]
fn test_text_structure_and_mnemonics() {
    let source = "\
var scale : real is 2.5
routine main() is
  var a : array[3] integer
  var i is 0
  while i < 3 loop
    i := i + 1
    a[i] := i
  end
  print scale * a[2]
end
";
    let text = encode_text(&compile(source));

    assert!(text.starts_with("(module\n"));
    assert!(text.ends_with(")\n"));
    for fragment in [
        "(memory (;0;) 1)",
        "(global (;0;) (mut f64) (f64.const 2.5))",
        "(local i32",
        "    block\n      loop\n",
        "br_if 1",
        "br 0",
        "i32.lt_s",
        "i32.store offset=4",
        "i32.load offset=4",
        "f64.convert_i32_s",
        "unreachable",
        "(export \"main\" (func 2))",
        "(export \"memory\" (memory 0))",
        "(data (;0;) (i32.const 0) \"\\03\")",
    ] {
        assert!(text.contains(fragment), "'{}' が無い:\n{}", fragment, text);
    }

    // 開き括弧と閉じ括弧の数が一致する
    let open = text.matches('(').count();
    let close = text.matches(')').count();
    assert_eq!(open, close);
}
