// cli/tests/cli.rs — black-box runs of bg_setenv / bg_printenv

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::assert::Assert;
use assert_cmd::Command;
use pretty_assertions::assert_eq;
use tempfile::{tempdir, TempDir};

fn bgenvctl() -> Command {
    let mut cmd = Command::cargo_bin("bgenvctl").unwrap();
    cmd.env_remove("BG_ENV_CONFIG").env_remove("RUST_LOG");
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let out = cmd.assert().success().get_output().stdout.clone();
    String::from_utf8(out).unwrap()
}

/// Two slot files with the given revisions plus a config naming them.
struct Slots {
    dir: TempDir,
}

impl Slots {
    fn new(revisions: [u32; 2]) -> Self {
        let dir = tempdir().unwrap();
        let config = "slots = [\"slot0/BGENV.DAT\", \"slot1/BGENV.DAT\"]\n";
        fs::write(dir.path().join("bgenv.toml"), config).unwrap();
        let slots = Slots { dir };
        for (i, rev) in revisions.iter().enumerate() {
            fs::create_dir(slots.dir.path().join(format!("slot{}", i))).unwrap();
            let rev = rev.to_string();
            let kernel = format!("kernel-{}", rev);
            bgenvctl()
                .args(["setenv", "-f"])
                .arg(slots.slot(i))
                .args(["-r", rev.as_str(), "-k", kernel.as_str(), "-w", "30"])
                .assert()
                .success();
        }
        slots
    }

    fn config(&self) -> PathBuf {
        self.dir.path().join("bgenv.toml")
    }

    fn slot(&self, i: usize) -> PathBuf {
        self.dir.path().join(format!("slot{}", i)).join("BGENV.DAT")
    }
}

fn printenv_file(path: &Path, fields: &str) -> String {
    stdout_of(bgenvctl().args(["printenv", "-o", fields, "-f"]).arg(path))
}

#[test]
fn file_mode_writes_a_fresh_record() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("BGENV.DAT");

    let out = stdout_of(
        bgenvctl()
            .args(["setenv", "-f"])
            .arg(&file)
            .args(["-k", "vmlinuz", "-a", "root=/dev/sda2", "-r", "3", "-x", "board=rev-c"]),
    );
    assert_eq!(out, format!("Output written to {}.\n", file.display()));

    let printed = printenv_file(&file, "revision,kernel,kernelargs,user");
    assert_eq!(
        printed,
        "Values:\n\
         revision:         3\n\
         kernel:           vmlinuz\n\
         kernelargs:       root=/dev/sda2\n\
         \n\
         user variables:\n\
         board = rev-c\n\
         \n\n"
    );
}

#[test]
fn file_mode_without_preserve_starts_over() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("BGENV.DAT");
    bgenvctl().args(["setenv", "-f"]).arg(&file).args(["-r", "9", "-w", "60"]).assert().success();

    bgenvctl().args(["setenv", "-f"]).arg(&file).args(["-k", "other"]).assert().success();
    assert!(printenv_file(&file, "revision,watchdog_timeout").contains("revision:         0\n"));

    bgenvctl().args(["setenv", "-f"]).arg(&file).args(["-r", "9", "-w", "60"]).assert().success();
    bgenvctl().args(["setenv", "-P", "-f"]).arg(&file).args(["-k", "other"]).assert().success();
    let printed = printenv_file(&file, "revision,watchdog_timeout");
    assert!(printed.contains("revision:         9\n"));
    assert!(printed.contains("watchdog timeout: 60 seconds\n"));
}

#[test]
fn directory_as_filepath_is_deprecated_but_works() {
    let dir = tempdir().unwrap();
    let assert =
        bgenvctl().args(["setenv", "-f"]).arg(dir.path()).args(["-r", "1"]).assert().success();
    assert_stderr_contains(assert, "deprecated");
    assert!(dir.path().join("BGENV.DAT").is_file());
}

#[test]
fn auto_update_clones_latest_into_oldest() {
    let slots = Slots::new([2, 5]);
    let latest_before = fs::read(slots.slot(1)).unwrap();

    let out = stdout_of(
        bgenvctl()
            .arg("setenv")
            .arg("--config")
            .arg(slots.config())
            .args(["-u", "-k", "vmlinuz-5", "-s", "testing"]),
    );
    assert_eq!(out, "Environment update was successful.\n");
    assert_eq!(fs::read(slots.slot(1)).unwrap(), latest_before);

    let printed = stdout_of(
        bgenvctl()
            .arg("printenv")
            .arg("--config")
            .arg(slots.config())
            .args(["-p", "0", "-o", "revision,kernel,watchdog_timeout,ustate"]),
    );
    assert_eq!(
        printed,
        "Using config partition #0\n\
         Values:\n\
         revision:         6\n\
         kernel:           vmlinuz-5\n\
         watchdog timeout: 30 seconds\n\
         ustate:           2 (TESTING)\n\
         \n\n"
    );
}

#[test]
fn plain_update_edits_latest_in_place() {
    let slots = Slots::new([4, 1]);
    let oldest_before = fs::read(slots.slot(1)).unwrap();
    bgenvctl().arg("setenv").arg("--config").arg(slots.config()).args(["-c"]).assert().success();
    assert_eq!(fs::read(slots.slot(1)).unwrap(), oldest_before);

    let printed = stdout_of(
        bgenvctl()
            .arg("printenv")
            .arg("--config")
            .arg(slots.config())
            .args(["-c", "-o", "revision,ustate"]),
    );
    assert!(printed.contains("revision:         4\n"));
    assert!(printed.contains("ustate:           0 (OK)\n"));
}

#[test]
fn printenv_lists_every_partition() {
    let slots = Slots::new([1, 2]);
    let printed = stdout_of(
        bgenvctl().arg("printenv").arg("--config").arg(slots.config()).args(["-o", "revision"]),
    );
    assert_eq!(
        printed,
        "\n----------------------------\n Config Partition #0 Values:\nrevision:         1\n\n\n\
         \n----------------------------\n Config Partition #1 Values:\nrevision:         2\n\n\n"
    );
}

#[test]
fn printenv_json() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("BGENV.DAT");
    bgenvctl()
        .args(["setenv", "-f"])
        .arg(&file)
        .args(["-k", "vmlinuz", "-x", "a=b"])
        .assert()
        .success();

    let out =
        stdout_of(bgenvctl().args(["printenv", "--json", "-o", "kernel,user", "-f"]).arg(&file));
    let value: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(value, serde_json::json!({ "kernel": "vmlinuz", "user": { "a": "b" } }));
}

#[test]
fn no_task_is_a_usage_error() {
    assert_stderr_contains(bgenvctl().arg("setenv").assert().code(2), "No task to perform");
}

#[test]
fn part_and_update_together_are_refused() {
    let slots = Slots::new([1, 2]);
    let before = fs::read(slots.slot(0)).unwrap();
    bgenvctl()
        .arg("setenv")
        .arg("--config")
        .arg(slots.config())
        .args(["-p", "0", "-u", "-r", "7"])
        .assert()
        .code(2);
    assert_eq!(fs::read(slots.slot(0)).unwrap(), before);
}

#[test]
fn partition_out_of_range_fails_before_io() {
    let dir = tempdir().unwrap();
    let assert = bgenvctl()
        .arg("setenv")
        .arg("--config")
        .arg(dir.path().join("missing.toml"))
        .args(["-p", "2", "-r", "1"])
        .assert()
        .code(3);
    assert_stderr_contains(assert, "out of range");
}

#[test]
fn bad_values_are_validation_errors() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("BGENV.DAT");
    let cases =
        [["-s", "9"], ["-s", "bogus"], ["-i", "2"], ["-r", "x"], ["--revision=4", "--watchdog=-1"]];
    for bad in cases {
        bgenvctl().args(["setenv", "-f"]).arg(&file).args(bad).assert().code(3);
    }
    let long = "k".repeat(256);
    bgenvctl().args(["setenv", "-f"]).arg(&file).args(["-k", long.as_str()]).assert().code(3);
    assert!(!file.exists());

    bgenvctl().args(["printenv", "-o", "revision,nope", "-f"]).arg(&file).assert().code(3);
}

#[test]
fn every_slot_corrupt_means_no_environment() {
    let slots = Slots::new([1, 2]);
    for i in 0..2 {
        let mut bytes = fs::read(slots.slot(i)).unwrap();
        bytes[0] ^= 0xFF;
        fs::write(slots.slot(i), bytes).unwrap();
    }
    bgenvctl()
        .arg("setenv")
        .arg("--config")
        .arg(slots.config())
        .args(["-u", "-r", "3"])
        .assert()
        .code(4);
}

#[test]
fn missing_config_is_a_config_error() {
    let dir = tempdir().unwrap();
    let assert = bgenvctl()
        .arg("printenv")
        .arg("--config")
        .arg(dir.path().join("missing.toml"))
        .assert()
        .code(6);
    assert_stderr_contains(assert, "Error initializing FAT environment");
}

#[test]
fn config_from_environment_variable() {
    let slots = Slots::new([3, 8]);
    let printed = stdout_of(
        bgenvctl().env("BG_ENV_CONFIG", slots.config()).args(["printenv", "-c", "-o", "revision"]),
    );
    assert!(printed.contains("revision:         8\n"));
}

#[test]
fn printenv_selectors_are_exclusive() {
    bgenvctl().args(["printenv", "-c", "-p", "0"]).assert().code(2);
}

#[cfg(unix)]
#[test]
fn personality_follows_program_name() {
    let dir = tempdir().unwrap();
    let bin = assert_cmd::cargo::cargo_bin("bgenvctl");
    let setenv = dir.path().join("bg_setenv");
    let printenv = dir.path().join("bg_printenv");
    std::os::unix::fs::symlink(&bin, &setenv).unwrap();
    std::os::unix::fs::symlink(&bin, &printenv).unwrap();
    let file = dir.path().join("env.dat");

    Command::new(&setenv).arg("-f").arg(&file).args(["-r", "11"]).assert().success();
    let out = Command::new(&printenv).args(["-o", "revision", "-f"]).arg(&file).assert().success();
    let out = String::from_utf8(out.get_output().stdout.clone()).unwrap();
    assert_eq!(out, "Values:\nrevision:         11\n\n\n");

    let version = Command::new(&printenv).arg("-V").assert().success();
    let version = String::from_utf8(version.get_output().stdout.clone()).unwrap();
    assert!(version.starts_with("EFI Boot Guard "));
}

fn assert_stderr_contains(assert: Assert, needle: &str) {
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).into_owned();
    assert!(stderr.contains(needle), "stderr was: {}", stderr);
}
