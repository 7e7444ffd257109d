use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;
use tempfile::TempDir;

const SEED: &str = r#"
[[payers]]
id = "alice"
email = "alice@example.com"
balance = 20000000

[[students]]
id = "20120129"
name = "Nguyen Van A"
tuition = 12500000
"#;

fn write_files(dir: &TempDir, script: &str) -> (std::path::PathBuf, std::path::PathBuf) {
    let seed_path = dir.path().join("seed.toml");
    let script_path = dir.path().join("script.csv");
    let mut seed = std::fs::File::create(&seed_path).unwrap();
    write!(seed, "{SEED}").unwrap();
    let mut file = std::fs::File::create(&script_path).unwrap();
    write!(file, "{script}").unwrap();
    (seed_path, script_path)
}

#[test]
fn test_full_payment_flow() {
    let dir = TempDir::new().unwrap();
    let (seed, script) = write_files(
        &dir,
        "op, payer, student, amount, code\n\
         initiate, alice, 20120129, 12500000,\n\
         verify, alice, 20120129, , auto\n",
    );

    let mut cmd = Command::new(cargo_bin!("tuition-engine"));
    cmd.arg(&script).arg("--seed").arg(&seed);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("alice,7500000"))
        .stdout(predicate::str::contains("20120129,true,12500000"))
        .stdout(predicate::str::contains("VERIFIED"));
}

#[test]
fn test_wrong_code_leaves_bill_unpaid() {
    let dir = TempDir::new().unwrap();
    let (seed, script) = write_files(
        &dir,
        "op, payer, student, amount, code\n\
         initiate, alice, 20120129, 12500000,\n\
         verify, alice, 20120129, , zzzzzz\n",
    );

    let mut cmd = Command::new(cargo_bin!("tuition-engine"));
    cmd.arg(&script).arg("--seed").arg(&seed);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("alice,20000000"))
        .stdout(predicate::str::contains("20120129,false,"))
        .stdout(predicate::str::contains("PENDING_OTP"));
}

#[test]
fn test_malformed_rows_are_skipped() {
    let dir = TempDir::new().unwrap();
    let (seed, script) = write_files(
        &dir,
        "op, payer, student, amount, code\n\
         refund, alice, 20120129, ,\n\
         initiate, alice, 20120129, 12500000,\n",
    );

    let mut cmd = Command::new(cargo_bin!("tuition-engine"));
    cmd.arg(&script).arg("--seed").arg(&seed);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("PENDING_OTP"));
}

#[test]
fn test_missing_seed_file_fails() {
    let dir = TempDir::new().unwrap();
    let (_, script) = write_files(&dir, "op, payer, student, amount, code\n");

    let mut cmd = Command::new(cargo_bin!("tuition-engine"));
    cmd.arg(&script).arg("--seed").arg(dir.path().join("absent.toml"));

    cmd.assert().failure();
}

#[test]
fn test_custom_config_shortens_window() {
    let dir = TempDir::new().unwrap();
    let (seed, script) = write_files(
        &dir,
        "op, payer, student, amount, code\n\
         initiate, alice, 20120129, 12500000,\n",
    );
    let config_path = dir.path().join("engine.toml");
    std::fs::write(&config_path, "otp_ttl_secs = 120\n").unwrap();

    let mut cmd = Command::new(cargo_bin!("tuition-engine"));
    cmd.arg(&script)
        .arg("--seed")
        .arg(&seed)
        .arg("--config")
        .arg(&config_path);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("\"expiresIn\":120"));
}
