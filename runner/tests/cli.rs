//! CLI tests for the `machine` binary.
//!
//! Spawns the binary and verifies output and exit codes for `check`,
//! `constraints`, `init` and `run`.

use std::fs;
use std::io::Write;
use std::process::{Command, Output, Stdio};

use machine_runner::exit_codes;
use machine_runner::io::config::{RunnerConfig, load_config, write_config};
use serde_json::{Value, json};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn machine() -> Command {
    Command::new(env!("CARGO_BIN_EXE_machine"))
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn check_valid_text_exits_ok() {
    let output = machine()
        .args(["check", "--constraint", "lipogram", "--param", "e", "Un chat gris"])
        .output()
        .expect("machine check");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(stdout(&output).contains("valid: 10 letters, 3 words"));
}

#[test]
fn check_violation_exits_failed() {
    let output = machine()
        .args(["check", "--constraint", "lipogram", "--param", "e", "--lang", "en"])
        .arg("Un chat mange")
        .output()
        .expect("machine check");

    assert_eq!(output.status.code(), Some(exit_codes::FAILED));
    let out = stdout(&output);
    assert!(out.contains("forbidden letter detected"), "{out}");
    assert!(out.contains("\"mange\""), "{out}");
}

#[test]
fn check_reads_stdin_and_prints_json() {
    let mut child = machine()
        .args(["check", "--constraint", "tautogram", "--param", "s", "--json"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("spawn machine check");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all("Sept serpents sifflent\n".as_bytes())
        .expect("write stdin");
    let output = child.wait_with_output().expect("wait");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let report: Value = serde_json::from_slice(&output.stdout).expect("json report");
    assert_eq!(report["constraint"], "tautogram");
    assert_eq!(report["valid"], true);
    assert_eq!(report["valid_prefix"], "Sept serpents sifflent");
}

#[test]
fn check_reports_reason_in_french_by_default() {
    let output = machine()
        .args(["check", "--constraint", "tautogram", "--param", "s", "Six chats"])
        .output()
        .expect("machine check");

    assert_eq!(output.status.code(), Some(exit_codes::FAILED));
    let out = stdout(&output);
    assert!(out.contains("le mot \"chats\" ne commence pas par \"s\""), "{out}");
}

#[test]
fn unknown_constraint_exits_invalid() {
    let output = machine()
        .args(["check", "--constraint", "sonnet", "texte"])
        .output()
        .expect("machine check");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown constraint"));
}

#[test]
fn constraints_lists_catalog() {
    let output = machine().arg("constraints").output().expect("machine constraints");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let out = stdout(&output);
    for id in ["lipogram", "monovocalism", "snowball", "beau-present", "pangram"] {
        assert!(out.contains(id), "missing {id} in {out}");
    }
}

#[test]
fn init_writes_default_config_once() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("machine.toml");

    let status = machine()
        .args(["init", "--config"])
        .arg(&path)
        .status()
        .expect("machine init");
    assert_eq!(status.code(), Some(exit_codes::OK));
    assert_eq!(load_config(&path).expect("load"), RunnerConfig::default());

    fs::write(&path, "hard_max_attempts = 3\n").expect("edit config");
    let status = machine()
        .args(["init", "--config"])
        .arg(&path)
        .status()
        .expect("machine init");
    assert_eq!(status.code(), Some(exit_codes::OK));
    assert_eq!(load_config(&path).expect("load").hard_max_attempts, 3);
}

#[test]
fn run_without_api_key_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut config = RunnerConfig::default();
    config.generator.api_key_env = "MACHINE_TEST_MISSING_KEY".into();
    let path = temp.path().join("machine.toml");
    write_config(&path, &config).expect("write config");

    let output = machine()
        .env_remove("MACHINE_TEST_MISSING_KEY")
        .args(["run", "--constraint", "lipogram", "--param", "e", "--config"])
        .arg(&path)
        .output()
        .expect("machine run");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(
        String::from_utf8_lossy(&output.stderr).contains("missing API key: set MACHINE_TEST_MISSING_KEY")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn run_streams_text_and_writes_transcript() {
    let server = MockServer::start().await;
    let event = json!({ "choices": [{ "delta": { "content": "Un chat gris dort." } }] });
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(format!("data: {event}\n\ndata: [DONE]\n\n"), "text/event-stream"),
        )
        .mount(&server)
        .await;

    let temp = tempfile::tempdir().expect("tempdir");
    let mut config = RunnerConfig::default();
    config.generator.base_url = server.uri();
    config.generator.api_key_env = "MACHINE_TEST_KEY".into();
    let config_path = temp.path().join("machine.toml");
    write_config(&config_path, &config).expect("write config");
    let transcript = temp.path().join("runs/run.jsonl");

    let mut command = machine();
    command
        .env("MACHINE_TEST_KEY", "test-key")
        .args(["run", "--constraint", "lipogram", "--param", "e", "--config"])
        .arg(&config_path)
        .arg("--transcript")
        .arg(&transcript);
    let output = tokio::task::spawn_blocking(move || command.output())
        .await
        .expect("join")
        .expect("machine run");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(stdout(&output).contains("Un chat gris dort."));

    let lines = fs::read_to_string(&transcript).expect("transcript");
    let last: Value = serde_json::from_str(lines.lines().last().expect("summary line"))
        .expect("summary json");
    assert_eq!(last["summary"]["status"], "stopped");
    assert_eq!(last["summary"]["words"], 4);
}
