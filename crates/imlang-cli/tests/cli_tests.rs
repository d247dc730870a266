use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const VALID: &str = "routine add(a: integer, b: integer): integer is\n  return a + b\nend\n\nroutine main() is\n  print add(1, 2)\nend\n";

const INVALID: &str = "routine main() is\n  print missing\nend\n";

fn write_source(dir: &TempDir, name: &str, source: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, source).expect("ソースファイルを書き込めない");
    path
}

fn imlang() -> Command {
    Command::cargo_bin("imlang").expect("バイナリが見つからない")
}

#[test]
fn test_build_writes_wasm_binary() {
    let dir = TempDir::new().unwrap();
    let input = write_source(&dir, "main.iml", VALID);

    imlang().arg("build").arg(&input).assert().success();

    let bytes = fs::read(dir.path().join("main.wasm")).expect("出力ファイルが無い");
    assert_eq!(&bytes[..4], b"\0asm", "マジックナンバーが違う");
    assert_eq!(&bytes[4..8], &[1, 0, 0, 0], "バージョンが違う");
}

#[test]
fn test_build_emits_text_to_explicit_output() {
    let dir = TempDir::new().unwrap();
    let input = write_source(&dir, "main.iml", VALID);
    let output = dir.path().join("out.wat");

    imlang()
        .args(["build", "--emit", "text", "-o"])
        .arg(&output)
        .arg(&input)
        .assert()
        .success();

    let text = fs::read_to_string(&output).expect("出力ファイルが無い");
    assert!(text.starts_with("(module"), "テキスト形式になっていない: {}", text);
    assert!(text.contains("(export \"main\""), "main がエクスポートされていない");
    assert!(!dir.path().join("main.wasm").exists(), "バイナリは出力しないはず");
}

#[test]
fn test_build_both_formats() {
    let dir = TempDir::new().unwrap();
    let input = write_source(&dir, "prog.iml", VALID);

    imlang().args(["build", "--emit", "both"]).arg(&input).assert().success();

    assert!(dir.path().join("prog.wasm").exists(), "バイナリが無い");
    assert!(dir.path().join("prog.wat").exists(), "テキストが無い");
}

#[test]
fn test_build_reports_diagnostics() {
    let dir = TempDir::new().unwrap();
    let input = write_source(&dir, "bad.iml", INVALID);

    imlang()
        .arg("build")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("bad.iml:2:9:"))
        .stderr(predicate::str::contains("Undeclared identifier 'missing'"));

    assert!(!dir.path().join("bad.wasm").exists(), "エラー時は出力しないはず");
}

#[test]
fn test_check_accepts_valid_program() {
    let dir = TempDir::new().unwrap();
    let input = write_source(&dir, "main.iml", VALID);

    imlang().arg("check").arg(&input).assert().success();
}

#[test]
fn test_check_rejects_arity_mismatch() {
    let dir = TempDir::new().unwrap();
    let source = "routine add(a: integer, b: integer): integer is\n  return a + b\nend\n\nroutine main() is\n  print add(1)\nend\n";
    let input = write_source(&dir, "main.iml", source);

    imlang()
        .arg("check")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("expects 2 arguments but got 1"));
}

#[test]
fn test_tokens_lists_keywords() {
    let dir = TempDir::new().unwrap();
    let input = write_source(&dir, "main.iml", "var x : integer is 5\n");

    imlang()
        .arg("tokens")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("Var"))
        .stdout(predicate::str::contains("IntegerLiteral"));
}

#[test]
fn test_tokens_fails_on_lexical_error() {
    let dir = TempDir::new().unwrap();
    let input = write_source(&dir, "main.iml", "var x is 1.3.5\n");

    imlang().arg("tokens").arg(&input).assert().failure();
}

#[test]
fn test_config_file_changes_entry_point() {
    let dir = TempDir::new().unwrap();
    let source = "routine start() is\n  print 1\nend\n";
    let input = write_source(&dir, "main.iml", source);
    let config = write_source(&dir, "imlang.toml", "entry_point = \"start\"\nemit = \"text\"\n");

    imlang()
        .arg("--config")
        .arg(&config)
        .arg("build")
        .arg(&input)
        .assert()
        .success();

    let text = fs::read_to_string(dir.path().join("main.wat")).expect("出力ファイルが無い");
    assert!(text.contains("(export \"start\""), "設定したエントリポイントがエクスポートされていない");
}

#[test]
fn test_invalid_config_is_reported() {
    let dir = TempDir::new().unwrap();
    let input = write_source(&dir, "main.iml", VALID);
    let config = write_source(&dir, "imlang.toml", "entry_point = \"\"\n");

    imlang()
        .arg("--config")
        .arg(&config)
        .arg("check")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("設定ファイルの読み込みに失敗しました"));
}

#[test]
fn test_missing_input_file() {
    imlang()
        .args(["check", "does-not-exist.iml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ソースファイルの読み込みに失敗しました"));
}
