use assert_cmd::Command;
use predicates::str::{contains, diff};

fn tuca() -> Command {
    Command::cargo_bin("tuca").unwrap()
}

#[test]
fn runs_without_arguments() {
    tuca().assert().success().stdout(contains("tuca"));
}

#[test]
fn runs_reference_program() {
    tuca()
        .arg("run")
        .arg("tests/files/sum.tuca")
        .arg("--minimal")
        .assert()
        .success()
        .stdout(diff("0x00=0x08\n"));
}

#[test]
fn run_reports_final_state() {
    tuca()
        .arg("run")
        .arg("tests/files/sum.tuca")
        .assert()
        .success()
        .stdout(contains("Halted"))
        .stdout(contains("after 5 instruction(s)"))
        .stdout(contains("r2=0x08"))
        .stdout(contains("0x00=0x08"));
}

#[test]
fn run_with_memory_file() {
    tuca()
        .arg("run")
        .arg("tests/files/double.tuca")
        .arg("--memory")
        .arg("tests/files/double_mem.txt")
        .arg("--minimal")
        .assert()
        .success()
        .stdout(diff("0x00=0x05\n0x01=0x0a\n"));
}

#[test]
fn run_limit_stops_infinite_loop() {
    tuca()
        .arg("run")
        .arg("tests/files/loop.tuca")
        .arg("--limit")
        .arg("5")
        .assert()
        .success()
        .stdout(contains("Ceiling"))
        .stdout(contains("after 5 instruction(s)"));
}

#[test]
fn run_reports_fault() {
    tuca()
        .arg("run")
        .arg("tests/files/fault.tuca")
        .assert()
        .failure()
        .stdout(contains("unknown instruction `frobnicate`"));
}

#[test]
fn assembles_then_runs_words() {
    let dest = std::env::temp_dir().join("tuca_it_sum.hex");
    tuca()
        .arg("asm")
        .arg("tests/files/sum.tuca")
        .arg(&dest)
        .assert()
        .success()
        .stdout(contains("Saved"));
    assert_eq!(
        std::fs::read_to_string(&dest).unwrap(),
        "2050\n2031\n4012\n3200\nf000\n"
    );

    tuca()
        .arg("run")
        .arg(&dest)
        .arg("--minimal")
        .assert()
        .success()
        .stdout(diff("0x00=0x08\n"));
}

#[test]
fn check_accepts_good_and_rejects_bad() {
    tuca()
        .arg("check")
        .arg("tests/files/sum.tuca")
        .assert()
        .success()
        .stdout(contains("Success"));

    tuca()
        .arg("check")
        .arg("tests/files/bad.tuca")
        .assert()
        .failure();
}

#[test]
fn compare_matches_and_mismatches() {
    let dump = std::env::temp_dir().join("tuca_it_double.out");
    tuca()
        .arg("run")
        .arg("tests/files/double.tuca")
        .arg("--memory")
        .arg("tests/files/double_mem.txt")
        .arg("--output")
        .arg(&dump)
        .assert()
        .success();

    tuca()
        .arg("compare")
        .arg(&dump)
        .arg("tests/files/double_expected.txt")
        .assert()
        .success()
        .stdout(contains("Success"));

    tuca()
        .arg("compare")
        .arg(&dump)
        .arg("tests/files/wrong_expected.txt")
        .assert()
        .failure()
        .stdout(contains("Mismatch"));
}
