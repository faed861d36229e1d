//! CLI subprocess integration tests.
//!
//! These tests invoke the `caravel` binary as a subprocess and verify exit
//! codes, stdout content, and JSON output against a local artifact server and
//! the mock session transport.

use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const EXIT_DESCRIPTOR_ERROR: i32 = 2;
const EXIT_UNRESOLVED_IMAGE: i32 = 3;
const EXIT_FETCH_FAILED: i32 = 4;
const EXIT_INTEGRITY_MISMATCH: i32 = 5;
const EXIT_PROVISIONING_FAILED: i32 = 6;
const EXIT_UNREACHABLE: i32 = 7;
const EXIT_AUTH_FAILED: i32 = 8;

fn spawn_server() -> (String, Arc<AtomicUsize>) {
    let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = Arc::clone(&hits);
    std::thread::spawn(move || {
        for request in server.incoming_requests() {
            hits_clone.fetch_add(1, Ordering::SeqCst);
            let body = body_for(request.url());
            let _ = request.respond(tiny_http::Response::from_data(body));
        }
    });
    (format!("http://{addr}"), hits)
}

fn body_for(path: &str) -> Vec<u8> {
    path.trim_start_matches('/').repeat(32).into_bytes()
}

fn checksum_for(path: &str) -> String {
    blake3::hash(&body_for(path)).to_hex().to_string()
}

struct Fixture {
    dir: tempfile::TempDir,
    registry_path: PathBuf,
    descriptor_path: PathBuf,
    cache_dir: PathBuf,
    base_url: String,
    hits: Arc<AtomicUsize>,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let (base_url, hits) = spawn_server();

        let registry_path = dir.path().join("registry.toml");
        std::fs::write(
            &registry_path,
            format!(
                "[images.\"base-10.04\"]\nurl = \"{base_url}/base-10.04\"\nchecksum = \"{}\"\n",
                checksum_for("/base-10.04")
            ),
        )
        .unwrap();

        let cache_dir = dir.path().join("store");
        let descriptor_path = dir.path().join("caravel.toml");

        Self {
            dir,
            registry_path,
            descriptor_path,
            cache_dir,
            base_url,
            hits,
        }
    }

    fn write_descriptor(&self, image_id: &str, extra: &str) {
        std::fs::write(
            &self.descriptor_path,
            format!(
                r#"
descriptor_version = 1

[image]
id = "{image_id}"

[session]
user = "ubuntu"
transport = "mock"
{extra}
"#
            ),
        )
        .unwrap();
    }

    fn caravel(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_caravel"));
        cmd.current_dir(self.dir.path())
            .arg("--cache-dir")
            .arg(&self.cache_dir)
            .env("CARAVEL_REGISTRY", &self.registry_path)
            .env("CARAVEL_READINESS_ATTEMPTS", "2")
            .env("CARAVEL_READINESS_DELAY_MS", "10")
            .env_remove("CARAVEL_MOCK_UNREACHABLE")
            .env_remove("CARAVEL_MOCK_AUTH_FAIL")
            .env_remove("CARAVEL_MOCK_FAIL_EXEC")
            .env_remove("CARAVEL_MOCK_EXEC_LOG");
        cmd
    }

    fn exec_log(&self) -> PathBuf {
        self.dir.path().join("exec.log")
    }
}

fn stdout_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn version_exits_zero() {
    let fx = Fixture::new();
    let output = fx.caravel().arg("--version").output().unwrap();
    assert!(output.status.success());
    assert!(stdout_of(&output).contains("caravel"));
}

#[test]
fn help_lists_core_commands() {
    let fx = Fixture::new();
    let output = fx.caravel().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert!(stdout.contains("up"), "help must list 'up'");
    assert!(stdout.contains("ssh"), "help must list 'ssh'");
    assert!(stdout.contains("destroy"), "help must list 'destroy'");
}

#[test]
fn up_provisions_and_reports_ready() {
    let fx = Fixture::new();
    fx.write_descriptor(
        "base-10.04",
        r#"
[[steps]]
kind = "install_package"
package = "git-core"
"#,
    );

    let output = fx
        .caravel()
        .env("CARAVEL_MOCK_EXEC_LOG", fx.exec_log())
        .args(["up", "--json"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "up must succeed: {}",
        stderr_of(&output)
    );

    let payload: serde_json::Value = serde_json::from_str(&stdout_of(&output)).unwrap();
    assert_eq!(payload["state"], "ready");
    assert_eq!(payload["downloaded"], 1);
    assert_eq!(payload["steps_applied"], 1);
    assert_eq!(payload["already_ready"], false);

    let log = std::fs::read_to_string(fx.exec_log()).unwrap();
    assert!(log.contains("apt-get install"));
    assert!(log.contains("git-core"));
}

#[test]
fn second_up_is_idempotent_and_offline_capable() {
    let fx = Fixture::new();
    fx.write_descriptor("base-10.04", "");

    assert!(fx.caravel().arg("up").output().unwrap().status.success());
    let downloads = fx.hits.load(Ordering::SeqCst);

    // Ready environment: up again is a no-op.
    let output = fx.caravel().args(["up", "--json"]).output().unwrap();
    assert!(output.status.success());
    let payload: serde_json::Value = serde_json::from_str(&stdout_of(&output)).unwrap();
    assert_eq!(payload["already_ready"], true);
    assert_eq!(fx.hits.load(Ordering::SeqCst), downloads);

    // Forget the environment; the cached artifact still satisfies an
    // offline run.
    let status = fx.caravel().args(["status", "--json"]).output().unwrap();
    let record: serde_json::Value = serde_json::from_str(&stdout_of(&status)).unwrap();
    let short_id = record["short_id"].as_str().unwrap().to_owned();
    assert!(fx
        .caravel()
        .args(["destroy", &short_id])
        .output()
        .unwrap()
        .status
        .success());

    let output = fx.caravel().args(["up", "--offline", "--json"]).output().unwrap();
    assert!(output.status.success(), "offline up must use the cache");
    let payload: serde_json::Value = serde_json::from_str(&stdout_of(&output)).unwrap();
    assert_eq!(payload["cached"], 1);
    assert_eq!(fx.hits.load(Ordering::SeqCst), downloads);
}

#[test]
fn status_and_list_reflect_the_record() {
    let fx = Fixture::new();
    fx.write_descriptor("base-10.04", "");
    assert!(fx.caravel().arg("up").output().unwrap().status.success());

    let output = fx.caravel().args(["status", "--json"]).output().unwrap();
    assert!(output.status.success());
    let record: serde_json::Value = serde_json::from_str(&stdout_of(&output)).unwrap();
    assert_eq!(record["state"], "Ready");
    assert_eq!(record["image"], "base-10.04");
    let short_id = record["short_id"].as_str().unwrap().to_owned();

    let output = fx.caravel().arg("list").output().unwrap();
    assert!(output.status.success());
    assert!(stdout_of(&output).contains(&short_id));
}

#[test]
fn status_before_up_fails() {
    let fx = Fixture::new();
    fx.write_descriptor("base-10.04", "");
    let output = fx.caravel().arg("status").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr_of(&output).contains("not found"));
}

#[test]
fn checksum_mismatch_has_its_own_exit_code() {
    let fx = Fixture::new();
    std::fs::write(
        &fx.registry_path,
        format!(
            "[images.\"base-10.04\"]\nurl = \"{}/base-10.04\"\nchecksum = \"{}\"\n",
            fx.base_url,
            "0".repeat(64)
        ),
    )
    .unwrap();
    fx.write_descriptor(
        "base-10.04",
        r#"
[[steps]]
kind = "run_command"
command = "never-runs"
"#,
    );

    let output = fx
        .caravel()
        .env("CARAVEL_MOCK_EXEC_LOG", fx.exec_log())
        .arg("up")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(EXIT_INTEGRITY_MISMATCH));
    assert!(stderr_of(&output).contains("integrity mismatch"));
    assert!(
        !fx.exec_log().exists(),
        "no provisioning after a rejected artifact"
    );

    let status = fx.caravel().args(["status", "--json"]).output().unwrap();
    let record: serde_json::Value = serde_json::from_str(&stdout_of(&status)).unwrap();
    assert_eq!(record["state"], "Failed");
}

#[test]
fn unresolved_image_has_its_own_exit_code() {
    let fx = Fixture::new();
    fx.write_descriptor("ghost-os", "");
    let output = fx.caravel().arg("up").output().unwrap();
    assert_eq!(output.status.code(), Some(EXIT_UNRESOLVED_IMAGE));
    assert!(stderr_of(&output).contains("ghost-os"));
}

#[test]
fn fetch_failure_has_its_own_exit_code() {
    let fx = Fixture::new();
    // Registry points at a port that nothing listens on.
    std::fs::write(
        &fx.registry_path,
        format!(
            "[images.\"base-10.04\"]\nurl = \"http://127.0.0.1:1/img\"\nchecksum = \"{}\"\n",
            "a".repeat(64)
        ),
    )
    .unwrap();
    fx.write_descriptor("base-10.04", "");
    let output = fx.caravel().arg("up").output().unwrap();
    assert_eq!(output.status.code(), Some(EXIT_FETCH_FAILED));
}

#[test]
fn offline_without_cache_fails_as_fetch_error() {
    let fx = Fixture::new();
    fx.write_descriptor("base-10.04", "");
    let output = fx.caravel().args(["up", "--offline"]).output().unwrap();
    assert_eq!(output.status.code(), Some(EXIT_FETCH_FAILED));
    assert_eq!(fx.hits.load(Ordering::SeqCst), 0);
}

#[test]
fn provisioning_failure_has_its_own_exit_code() {
    let fx = Fixture::new();
    fx.write_descriptor(
        "base-10.04",
        r#"
[[steps]]
kind = "run_command"
command = "step-one"

[[steps]]
kind = "run_command"
command = "step-two"

[[steps]]
kind = "run_command"
command = "step-three"
"#,
    );

    let output = fx
        .caravel()
        .env("CARAVEL_MOCK_FAIL_EXEC", "step-two")
        .env("CARAVEL_MOCK_EXEC_LOG", fx.exec_log())
        .arg("up")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(EXIT_PROVISIONING_FAILED));
    assert!(stderr_of(&output).contains("step-two"));

    let log = std::fs::read_to_string(fx.exec_log()).unwrap();
    let lines: Vec<_> = log.lines().collect();
    assert_eq!(
        lines,
        vec!["step-one", "step-two"],
        "steps after the failure must never run"
    );
}

#[test]
fn unreachable_environment_has_its_own_exit_code() {
    let fx = Fixture::new();
    fx.write_descriptor("base-10.04", "");
    let output = fx
        .caravel()
        .env("CARAVEL_MOCK_UNREACHABLE", "1")
        .arg("up")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(EXIT_UNREACHABLE));
}

#[test]
fn authentication_failure_has_its_own_exit_code() {
    let fx = Fixture::new();
    fx.write_descriptor("base-10.04", "");
    let output = fx
        .caravel()
        .env("CARAVEL_MOCK_AUTH_FAIL", "1")
        .arg("up")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(EXIT_AUTH_FAILED));
}

#[test]
fn malformed_descriptor_has_its_own_exit_code() {
    let fx = Fixture::new();
    std::fs::write(&fx.descriptor_path, "this is not a descriptor [").unwrap();
    let output = fx.caravel().arg("up").output().unwrap();
    assert_eq!(output.status.code(), Some(EXIT_DESCRIPTOR_ERROR));
}

#[test]
fn ssh_runs_one_shot_commands_in_ready_environments() {
    let fx = Fixture::new();
    fx.write_descriptor("base-10.04", "");
    assert!(fx.caravel().arg("up").output().unwrap().status.success());

    let output = fx
        .caravel()
        .env("CARAVEL_MOCK_EXEC_LOG", fx.exec_log())
        .args(["ssh", "caravel.toml", "--", "uname", "-a"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr_of(&output));
    let log = std::fs::read_to_string(fx.exec_log()).unwrap();
    assert!(log.contains("uname -a"));
}

#[test]
fn ssh_refuses_environments_that_are_not_ready() {
    let fx = Fixture::new();
    fx.write_descriptor("base-10.04", "");
    let output = fx.caravel().arg("ssh").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr_of(&output).contains("not found"));
}

#[test]
fn destroy_forgets_an_environment() {
    let fx = Fixture::new();
    fx.write_descriptor("base-10.04", "");
    assert!(fx.caravel().arg("up").output().unwrap().status.success());

    let status = fx.caravel().args(["status", "--json"]).output().unwrap();
    let record: serde_json::Value = serde_json::from_str(&stdout_of(&status)).unwrap();
    let short_id = record["short_id"].as_str().unwrap().to_owned();

    let output = fx.caravel().args(["destroy", &short_id]).output().unwrap();
    assert!(output.status.success());

    let output = fx.caravel().arg("list").output().unwrap();
    assert!(stdout_of(&output).contains("no environments found"));

    // Unknown environments fail.
    let output = fx.caravel().args(["destroy", "nonexistent"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn cache_commands_roundtrip() {
    let fx = Fixture::new();
    fx.write_descriptor("base-10.04", "");

    let output = fx.caravel().args(["cache", "list"]).output().unwrap();
    assert!(output.status.success());
    assert!(stdout_of(&output).contains("cache is empty"));

    assert!(fx.caravel().arg("up").output().unwrap().status.success());

    let output = fx.caravel().args(["cache", "list"]).output().unwrap();
    assert!(stdout_of(&output).contains(&checksum_for("/base-10.04")));

    let output = fx.caravel().args(["cache", "verify"]).output().unwrap();
    assert!(output.status.success());

    let output = fx.caravel().args(["cache", "clear"]).output().unwrap();
    assert!(output.status.success());
    let output = fx.caravel().args(["cache", "list"]).output().unwrap();
    assert!(stdout_of(&output).contains("cache is empty"));
}

#[test]
fn cache_verify_detects_corruption() {
    let fx = Fixture::new();
    fx.write_descriptor("base-10.04", "");
    assert!(fx.caravel().arg("up").output().unwrap().status.success());

    let artifact = fx
        .cache_dir
        .join("cache/artifacts")
        .join(checksum_for("/base-10.04"));
    std::fs::write(&artifact, b"tampered").unwrap();

    let output = fx.caravel().args(["cache", "verify"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn images_lists_builtins() {
    let fx = Fixture::new();
    // Point the registry env at a missing file: built-ins only.
    let output = fx
        .caravel()
        .env("CARAVEL_REGISTRY", fx.dir.path().join("absent.toml"))
        .arg("images")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(stdout_of(&output).contains("ubuntu-24.04"));
}

#[test]
fn images_includes_user_registry_entries() {
    let fx = Fixture::new();
    let output = fx.caravel().arg("images").output().unwrap();
    assert!(output.status.success());
    assert!(stdout_of(&output).contains("base-10.04"));
}

#[test]
fn new_writes_a_starter_descriptor() {
    let fx = Fixture::new();
    let dest = fx.dir.path().join("fresh.toml");
    let output = fx
        .caravel()
        .args(["new", dest.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr_of(&output));
    let content = std::fs::read_to_string(&dest).unwrap();
    assert!(content.contains("descriptor_version = 1"));

    // Refuses to overwrite without --force when not a TTY.
    let output = fx
        .caravel()
        .args(["new", dest.to_str().unwrap()])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));

    let output = fx
        .caravel()
        .args(["new", dest.to_str().unwrap(), "--force"])
        .output()
        .unwrap();
    assert!(output.status.success());
}

#[test]
fn json_output_is_stable_for_scripting(){
    let fx = Fixture::new();
    fx.write_descriptor("base-10.04", "");
    assert!(fx.caravel().arg("up").output().unwrap().status.success());

    let output = fx.caravel().args(["list", "--json"]).output().unwrap();
    let records: serde_json::Value = serde_json::from_str(&stdout_of(&output)).unwrap();
    let list = records.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert!(list[0]["env_id"].is_string());
    assert!(list[0]["artifacts"].is_array());
}
