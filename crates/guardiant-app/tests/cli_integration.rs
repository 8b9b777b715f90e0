//! Integration tests for the guardiant binary.
//!
//! Each test gets its own state directory and a stub backend that accepts
//! every call.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::process::{Command, Output, Stdio};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use guardiant_core::security::RemoteCommand;
use guardiant_crypto::command::{CommandKey, SignedCommand};

const STUB_REPLY: &str = r#"{"result":{"success":true,"message":"ok","apps":[{"appName":"Bank","packageName":"bank.app"}]}}"#;

/// Answers every request with `STUB_REPLY` and records the request paths.
fn stub_backend() -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let paths = Arc::new(Mutex::new(Vec::new()));
    let seen = paths.clone();

    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let mut reader = BufReader::new(stream.try_clone().unwrap());

            let mut request_line = String::new();
            if reader.read_line(&mut request_line).is_err() {
                continue;
            }
            let mut content_length = 0usize;
            loop {
                let mut header = String::new();
                if reader.read_line(&mut header).unwrap_or(0) == 0 || header == "\r\n" {
                    break;
                }
                if let Some((name, value)) = header.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap_or(0);
                    }
                }
            }
            let mut body = vec![0u8; content_length];
            let _ = reader.read_exact(&mut body);

            if let Some(path) = request_line.split_whitespace().nth(1) {
                seen.lock().unwrap().push(path.to_string());
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                STUB_REPLY.len(),
                STUB_REPLY
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });

    (format!("http://{addr}/"), paths)
}

struct Device {
    _dir: tempfile::TempDir,
    config_path: std::path::PathBuf,
    paths: Arc<Mutex<Vec<String>>>,
}

impl Device {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let (base_url, paths) = stub_backend();
        let config = format!(
            "[device]\ndevice_id = \"test-device\"\nstate_dir = \"{}\"\n\n[backend]\nbase_url = \"{}\"\nbearer_token = \"test-token\"\n\n[alerts]\nbase_delay_ms = 10\nmax_delay_ms = 50\n",
            dir.path().join("state").display(),
            base_url
        );
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, config).unwrap();
        Self {
            _dir: dir,
            config_path,
            paths,
        }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_guardiant"));
        cmd.arg("--config").arg(&self.config_path);
        cmd
    }

    fn provision(&self) -> Output {
        self.cmd()
            .args(["provision", "--normal-pin", "1234", "--security-pin", "9876"])
            .args(["--app", "bank.app=Bank"])
            .output()
            .expect("Failed to execute command")
    }

    /// Feed `lines` to `run` on stdin and return its stdout.
    fn run_lines(&self, lines: &[String]) -> String {
        let mut child = self
            .cmd()
            .arg("run")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        {
            let stdin = child.stdin.as_mut().unwrap();
            for line in lines {
                writeln!(stdin, "{line}").unwrap();
            }
        }
        drop(child.stdin.take());
        stdout_of(&child.wait_with_output().unwrap())
    }

    fn called(&self, endpoint: &str) -> bool {
        self.paths
            .lock()
            .unwrap()
            .iter()
            .any(|p| p.ends_with(endpoint))
    }
}

fn stdout_of(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    if !output.status.success() {
        panic!(
            "Command failed with status {:?}\nstdout: {stdout}\nstderr: {stderr}",
            output.status
        );
    }
    stdout
}

fn command_key_of(provision_out: &str) -> CommandKey {
    let encoded = provision_out
        .lines()
        .find_map(|line| line.strip_prefix("command_key "))
        .expect("provision prints the command key");
    CommandKey::from_base64(encoded.trim()).unwrap()
}

fn command_line(signed: &SignedCommand) -> String {
    serde_json::json!({ "type": "command", "signed": signed }).to_string()
}

#[test]
fn test_provision_then_status() {
    let device = Device::new();

    let status = stdout_of(&device.cmd().arg("status").output().unwrap());
    assert!(status.contains("provisioned: no"), "Got: {status}");

    let out = stdout_of(&device.provision());
    assert!(out.contains("provisioned test-device"), "Got: {out}");
    assert!(out.contains("command_key "), "Got: {out}");
    assert!(device.called("saveProtectedApps"));
    assert!(device.called("setProtectionLevel"));

    let status = stdout_of(&device.cmd().arg("status").output().unwrap());
    assert!(status.contains("provisioned: yes"), "Got: {status}");
    assert!(!status.to_lowercase().contains("coercion"));
    assert!(!status.to_lowercase().contains("mode"));
}

#[test]
fn test_second_provision_fails() {
    let device = Device::new();
    stdout_of(&device.provision());
    let again = device.provision();
    assert!(!again.status.success());
}

#[test]
fn test_state_file_is_sealed() {
    let device = Device::new();
    stdout_of(&device.provision());
    let state_dir = device.config_path.parent().unwrap().join("state");
    let sealed = std::fs::read(state_dir.join("security_state.sealed")).unwrap();
    let text = String::from_utf8_lossy(&sealed);
    assert!(!text.contains("bank.app"));
    assert!(!text.contains("test-device"));
}

#[test]
fn test_no_local_deactivation_subcommand() {
    let device = Device::new();
    stdout_of(&device.provision());
    let output = device
        .cmd()
        .args(["deactivate-token", "--alert-id", "test-device:1"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_run_applies_backend_signed_commands() {
    let device = Device::new();
    let key = command_key_of(&stdout_of(&device.provision()));
    let deactivate = SignedCommand::sign(
        RemoteCommand::Deactivate {
            alert_id: "test-device:1".into(),
        },
        Utc::now(),
        &key,
    )
    .unwrap();

    let out = device.run_lines(&[
        r#"{"type":"pin","pin":"9876"}"#.to_string(),
        command_line(&deactivate),
        // Processed in order, so this reply follows the deactivation.
        r#"{"type":"pin","pin":"0000"}"#.to_string(),
        r#"{"type":"foreground","app_id":"com.guardiant.app"}"#.to_string(),
    ]);
    assert_eq!(out.matches(r#"{"unlock":"#).count(), 2, "Got: {out}");
    assert!(!out.contains("go_home"), "Got: {out}");

    let lock = SignedCommand::sign(RemoteCommand::Lock, Utc::now(), &key).unwrap();
    let out = device.run_lines(&[
        command_line(&lock),
        r#"{"type":"pin","pin":"0000"}"#.to_string(),
    ]);
    assert!(out.contains(r#""go_home""#), "Got: {out}");
}

#[test]
fn test_run_duress_unlock_redirects() {
    let device = Device::new();
    stdout_of(&device.provision());

    let mut child = device
        .cmd()
        .arg("run")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    {
        let stdin = child.stdin.as_mut().unwrap();
        writeln!(stdin, "not json").unwrap();
        writeln!(stdin, r#"{{"type":"pin","pin":"9876"}}"#).unwrap();
        writeln!(stdin, r#"{{"type":"foreground","app_id":"com.guardiant.app"}}"#).unwrap();
    }
    drop(child.stdin.take());

    let out = stdout_of(&child.wait_with_output().unwrap());
    assert!(out.contains(r#"{"unlock":{"granted":true}}"#), "Got: {out}");
    assert!(out.contains(r#""go_home""#), "Got: {out}");
}

#[test]
fn test_run_wrong_pin_denied() {
    let device = Device::new();
    stdout_of(&device.provision());

    let mut child = device
        .cmd()
        .arg("run")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    {
        let stdin = child.stdin.as_mut().unwrap();
        writeln!(stdin, r#"{{"type":"pin","pin":"0000"}}"#).unwrap();
        writeln!(stdin, r#"{{"type":"foreground","app_id":"bank.app"}}"#).unwrap();
    }
    drop(child.stdin.take());

    let out = stdout_of(&child.wait_with_output().unwrap());
    assert!(out.contains(r#"{"unlock":{"granted":false}}"#), "Got: {out}");
    assert!(!out.contains("go_home"), "Got: {out}");
}

#[test]
fn test_run_requires_provisioning() {
    let device = Device::new();
    let output = device
        .cmd()
        .arg("run")
        .stdin(Stdio::null())
        .output()
        .unwrap();
    assert!(!output.status.success());
}
