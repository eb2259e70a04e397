//! Integration tests for top-level CLI behavior.

use std::fs;
use std::path::Path;
use std::process::Command;

fn run_jspipe(dir: &Path, args: &[&str], env: &[(&str, &str)]) -> std::process::Output {
    let bin = env!("CARGO_BIN_EXE_jspipe");
    Command::new(bin)
        .args(args)
        .envs(env.iter().copied())
        .current_dir(dir)
        .output()
        .expect("failed to run jspipe binary")
}

#[test]
fn help_lists_pipeline_commands() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_jspipe(dir.path(), &["--help"], &[]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    for command in ["strip", "transpile", "compile", "generate-tests", "compile-tests", "test"] {
        assert!(stdout.contains(command), "missing {command}");
    }
}

#[test]
fn unknown_subcommand_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_jspipe(dir.path(), &["deploy"], &[]);
    assert!(!output.status.success());
}

#[test]
fn strip_without_sources_shows_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_jspipe(dir.path(), &["strip", "-d", "out"], &[]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("--source"));
}

#[test]
fn invalid_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("jspipe.yaml"), "compile:\n  compilation_level: TURBO\n").unwrap();
    let output = run_jspipe(dir.path(), &["test", "--tests", "t", "--reports", "r"], &[]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("unknown compilation level"));
}

#[test]
fn test_without_bundles_does_no_work() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_jspipe(dir.path(), &["test", "--tests", "missing", "--reports", "r"], &[]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("No tests to run."));
    assert!(!dir.path().join("r").exists());
}

#[cfg(unix)]
#[test]
fn strip_is_incremental_across_invocations() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("strip.sh"), "cp \"$3\" \"$2\"\n").unwrap();
    fs::create_dir_all(dir.path().join("src/a")).unwrap();
    fs::write(dir.path().join("src/a/A.java"), "class A {}").unwrap();
    fs::write(dir.path().join("src/B.java"), "class B {}").unwrap();
    let env = [("JSPIPE_STRIPPER", "sh strip.sh")];
    let args = ["strip", "--source", "src", "-d", "out"];

    let first = run_jspipe(dir.path(), &args, &env);
    assert!(first.status.success(), "{}", String::from_utf8_lossy(&first.stderr));
    assert!(String::from_utf8_lossy(&first.stdout).contains("Stripped 2 file(s)"));
    assert_eq!(fs::read_to_string(dir.path().join("out/a/A.java")).unwrap(), "class A {}");

    fs::remove_file(dir.path().join("src/B.java")).unwrap();
    let second = run_jspipe(dir.path(), &args, &env);
    assert!(String::from_utf8_lossy(&second.stdout).contains("Stripped 0 file(s), removed 1"));
    assert!(!dir.path().join("out/B.java").exists());
    assert!(dir.path().join(".jspipe/state").is_dir());
}

#[cfg(unix)]
#[test]
fn transpiler_failure_names_stage_and_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("src/A.java"), "class A {}").unwrap();
    fs::write(dir.path().join("j2cl.sh"), "echo 'A.java:1: error' >&2\nexit 3\n").unwrap();
    let env = [("JSPIPE_TRANSPILER", "sh j2cl.sh")];

    let output = run_jspipe(dir.path(), &["transpile", "--source", "src", "-d", "out"], &env);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("transpile failed with exit code 3"), "{stderr}");
}
