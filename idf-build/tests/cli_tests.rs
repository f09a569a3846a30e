#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::io::Read;
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;

const SIZE_JSON: &str = r#"{"used_dram":16096,"available_dram":164640,"used_iram":52243,"available_iram":78829,"flash_code":102431,"flash_rodata":40132,"total_size":206638}"#;

fn write_tool(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
}

/// Project dir with a configured build and a tool dir for fake binaries.
fn project() -> (TempDir, TempDir) {
    let ws = TempDir::new().unwrap();
    let build = ws.path().join("build");
    fs::create_dir_all(&build).unwrap();
    fs::write(build.join("CMakeCache.txt"), "").unwrap();
    fs::write(
        build.join("project_description.json"),
        r#"{"project_name":"blink","app_elf":"blink.elf","build_components":["main"]}"#,
    )
    .unwrap();
    fs::write(build.join("blink.map"), "").unwrap();
    fs::write(
        ws.path().join(".idf-build.toml"),
        "[idf]\nespIdfPath = \"/opt/esp-idf\"\n",
    )
    .unwrap();
    (ws, TempDir::new().unwrap())
}

fn idf_build(ws: &Path, tools: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_idf-build"))
        .arg("--workspace")
        .arg(ws)
        .args(args)
        .env("PATH", format!("{}:/bin:/usr/bin", tools.display()))
        .env_remove("RUST_LOG")
        .env_remove("IDF_PATH")
        .output()
        .expect("failed to run idf-build binary")
}

#[test]
fn help_lists_subcommands() {
    let output = Command::new(env!("CARGO_BIN_EXE_idf-build"))
        .arg("--help")
        .output()
        .expect("failed to run idf-build binary");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("build"));
    assert!(stdout.contains("size"));
}

#[test]
fn build_with_working_tools_succeeds() {
    let (ws, tools) = project();
    write_tool(tools.path(), "cmake", "exit 0");
    write_tool(tools.path(), "python3", &format!("echo '{}'", SIZE_JSON));
    let log = ws.path().join("logs").join("build.log");

    let output = idf_build(
        ws.path(),
        tools.path(),
        &["--log-file", log.to_str().unwrap(), "build"],
    );

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let logged = fs::read_to_string(&log).unwrap();
    assert!(logged.contains("Build Successfully"));
}

#[test]
fn failing_compiler_exits_non_zero_with_generic_error() {
    let (ws, tools) = project();
    write_tool(tools.path(), "cmake", "echo 'ninja: build stopped' >&2; exit 1");

    let output = idf_build(ws.path(), tools.path(), &["build"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Something went wrong while trying to build the project"));
    assert!(stderr.contains("ninja: build stopped"));
}

#[test]
fn dfu_on_default_target_warns_and_succeeds() {
    let (ws, tools) = project();
    write_tool(tools.path(), "cmake", "exit 0");
    write_tool(tools.path(), "python3", &format!("echo '{}'", SIZE_JSON));
    fs::write(ws.path().join("build").join("flasher_args.json"), "{}").unwrap();

    let output = idf_build(ws.path(), tools.path(), &["build", "--flash-type", "dfu"]);

    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("is not compatible for DFU"));
}

#[test]
fn size_prints_report() {
    let (ws, tools) = project();
    write_tool(tools.path(), "python3", &format!("echo '{}'", SIZE_JSON));

    let output = idf_build(ws.path(), tools.path(), &["size"]);

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("206638"));
}

#[test]
fn size_without_build_fails() {
    let ws = TempDir::new().unwrap();
    let tools = TempDir::new().unwrap();

    let output = idf_build(ws.path(), tools.path(), &["size"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to compute size information"));
}

#[test]
fn missing_explicit_config_is_an_error() {
    let ws = TempDir::new().unwrap();
    let tools = TempDir::new().unwrap();

    let output = idf_build(ws.path(), tools.path(), &["--config", "nope.toml", "build"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to read settings file"));
}

#[test]
fn ctrl_c_terminates_a_hanging_build_promptly() {
    let (ws, tools) = project();
    let started_marker = tools.path().join("cmake.started");
    // `sleep` is a grandchild of idf-build and holds the output pipes.
    write_tool(tools.path(), "cmake", "touch \"$0.started\"; sleep 30; true");

    let mut child = Command::new(env!("CARGO_BIN_EXE_idf-build"))
        .arg("--workspace")
        .arg(ws.path())
        .arg("build")
        .env("PATH", format!("{}:/bin:/usr/bin", tools.path().display()))
        .env_remove("RUST_LOG")
        .env_remove("IDF_PATH")
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to run idf-build binary");

    let deadline = Instant::now() + Duration::from_secs(10);
    while !started_marker.exists() {
        assert!(Instant::now() < deadline, "cmake was never started");
        std::thread::sleep(Duration::from_millis(20));
    }

    let interrupted = Instant::now();
    kill(Pid::from_raw(child.id() as i32), Signal::SIGINT).unwrap();
    let status = loop {
        if let Some(status) = child.try_wait().unwrap() {
            break status;
        }
        if interrupted.elapsed() > Duration::from_secs(10) {
            let _ = child.kill();
            panic!("idf-build did not exit after SIGINT");
        }
        std::thread::sleep(Duration::from_millis(20));
    };

    assert!(interrupted.elapsed() < Duration::from_secs(5));
    assert!(!status.success());
    let mut stderr = String::new();
    child
        .stderr
        .take()
        .unwrap()
        .read_to_string(&mut stderr)
        .unwrap();
    assert!(stderr.contains("Build is Terminated"), "stderr: {}", stderr);
}
