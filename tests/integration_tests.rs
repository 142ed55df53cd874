use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use assert_cmd::Command;

const R0: u16 = 32768;

/// Write `words` as a little-endian image under the target's temporary directory.
fn image(name: &str, words: &[u16]) -> PathBuf {
    let path = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join(name);
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    fs::write(&path, bytes).unwrap();
    path
}

fn text_file(name: &str, contents: &str) -> PathBuf {
    let path = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn requires_a_subcommand() {
    let mut cmd = Command::cargo_bin("synacor").unwrap();
    cmd.assert().failure();
}

#[test]
fn runs_image() {
    let path = image("out_a.bin", &[19, 65, 0]);
    let mut cmd = Command::cargo_bin("synacor").unwrap();
    cmd.arg("run").arg(&path).arg("--minimal");
    cmd.assert().success().stdout("A");
}

#[test]
fn reports_halt() {
    let path = image("halt_status.bin", &[21, 0]);
    let mut cmd = Command::cargo_bin("synacor").unwrap();
    cmd.arg("run").arg(&path);
    cmd.assert()
        .success()
        .stderr(predicate::str::contains("hlt requested at 1"));
}

#[test]
fn echoes_piped_input() {
    let path = image("echo.bin", &[20, R0, 19, R0, 0]);
    let mut cmd = Command::cargo_bin("synacor").unwrap();
    cmd.arg("run").arg(&path).arg("--minimal").write_stdin("B");
    cmd.assert().success().stdout("B");
}

#[test]
fn fails_when_input_runs_out() {
    let path = image("starved.bin", &[20, R0, 0]);
    let mut cmd = Command::cargo_bin("synacor").unwrap();
    cmd.arg("run").arg(&path).arg("--minimal").write_stdin("");
    cmd.assert().failure();
}

#[test]
fn reports_failure_address() {
    // 0: nop / 1: pop r0
    let path = image("underflow.bin", &[21, 3, R0]);
    let mut cmd = Command::cargo_bin("synacor").unwrap();
    cmd.arg("run").arg(&path);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("stopped at 1"))
        .stderr(predicate::str::contains("Pop from empty stack at 1"));
}

#[test]
fn fails_on_missing_image() {
    let mut cmd = Command::cargo_bin("synacor").unwrap();
    cmd.arg("run").arg("does/not/exist.bin");
    cmd.assert().failure();
}

#[test]
fn runs_with_flags() {
    // 0: set r0 66 / 3: out r0 / 5: out 'Z' / 7: hlt
    let path = image("flags.bin", &[1, R0, 66, 19, R0, 19, 90, 0]);
    let symtab = text_file("flags.sym", "setup 0-2\nprint 3-4 # echo r0\n");
    let dump = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("flags.ram");

    let mut cmd = Command::cargo_bin("synacor").unwrap();
    cmd.arg("run")
        .arg(&path)
        .arg("--minimal")
        .arg("--symtab")
        .arg(&symtab)
        .arg("--start")
        .arg("print")
        .arg("--halt-at")
        .arg("print")
        .arg("--init-reg")
        .arg("r0=67")
        .arg("--ram-dump")
        .arg(&dump);
    cmd.assert().success().stdout("C");

    let bytes = fs::read(&dump).unwrap();
    assert_eq!(bytes.len(), 0x8000 * 2);
    assert_eq!(&bytes[..4], &[1, 0, 0, 0x80]);
}

#[test]
fn overrides_memory() {
    let path = image("override.bin", &[19, 65, 0]);
    let mut cmd = Command::cargo_bin("synacor").unwrap();
    cmd.arg("run")
        .arg(&path)
        .arg("--minimal")
        .arg("--override-ram")
        .arg("1=66");
    cmd.assert().success().stdout("B");
}

#[test]
fn traces_to_file() {
    let path = image("traced.bin", &[21, 0]);
    let trace = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("traced.log");
    let mut cmd = Command::cargo_bin("synacor").unwrap();
    cmd.arg("run")
        .arg(&path)
        .arg("--minimal")
        .arg("--verbose")
        .arg("--trace-file")
        .arg(&trace);
    cmd.assert().success();

    let log = fs::read_to_string(&trace).unwrap();
    assert!(log.contains(&format!("{:>30}: nop", "0")));
    assert!(log.contains(&format!("{:>30}: hlt", "1")));
}

#[test]
fn disassembles_image() {
    let path = image("listing.bin", &[9, R0, 5, 6, 19, 65, 0]);
    let mut cmd = Command::cargo_bin("synacor").unwrap();
    cmd.arg("dis").arg(&path);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("add r0, 5, 6"))
        .stdout(predicate::str::contains("out 'A'"))
        .stdout(predicate::str::contains("hlt"));
}

#[test]
fn disassembles_with_annotations() {
    let path = image("annotated.bin", &[17, 4, 21, 0, 19, 65, 18]);
    let symtab = text_file("annotated.sym", "main 0-3\nprint 4-6\n");
    let notes = text_file("annotated.txt", "main // entry point\n// Prints a letter\n");
    let mut cmd = Command::cargo_bin("synacor").unwrap();
    cmd.arg("dis")
        .arg(&path)
        .arg("--symtab")
        .arg(&symtab)
        .arg("--annotations")
        .arg(&notes)
        .arg("--start")
        .arg("main")
        .arg("--len")
        .arg("4");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("call 4 <print>"))
        .stdout(predicate::str::contains("// entry point"))
        .stdout(predicate::str::contains("// Prints a letter"))
        .stdout(predicate::str::contains("out 'A'").not());
}

#[test]
fn rejects_bad_symtab() {
    let path = image("bad_symtab.bin", &[0]);
    let symtab = text_file("bad.sym", "main 0-3\nother 2-5\n");
    let mut cmd = Command::cargo_bin("synacor").unwrap();
    cmd.arg("dis").arg(&path).arg("--symtab").arg(&symtab);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("line 2"))
        .stderr(predicate::str::contains("overlaps with `main`"));
}

#[test]
fn reads_string() {
    let path = image("string.bin", &[3, 72, 105, 33, 0]);
    let mut cmd = Command::cargo_bin("synacor").unwrap();
    cmd.arg("read-string").arg(&path).arg("0");
    cmd.assert().success().stdout("Hi!\n");
}

#[test]
fn reads_string_indirectly() {
    let path = image("indirect.bin", &[2, 0, 2, 10, 65]);
    let mut cmd = Command::cargo_bin("synacor").unwrap();
    cmd.arg("read-string").arg(&path).arg("0").arg("--indirect");
    cmd.assert().success().stdout("\\0aA\n");
}
