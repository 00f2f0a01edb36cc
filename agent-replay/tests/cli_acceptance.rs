use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    data_dir: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let data_dir = base.join("transcripts");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&data_dir).expect("failed to create data dir");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            _temp_dir: temp_dir,
            home,
            data_dir,
            xdg_config,
            xdg_state,
        }
    }

    /// Copy the fixture into `<data_dir>/<project>/<name>`
    fn seed_transcript(&self, project: &str, name: &str) -> PathBuf {
        let target = self.data_dir.join(project).join(name);
        fs::create_dir_all(target.parent().expect("missing fixture parent"))
            .expect("failed to create project directory");
        fs::copy(fixture_path(), &target).expect("failed to copy fixture");
        target
    }
}

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../agent-replay-core/tests/fixtures/claude-code/spawn-session.jsonl")
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("agent-replay"));

    Command::new(bin_path)
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .env("AGENT_REPLAY_DATA_DIR", &env.data_dir)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("failed to execute agent-replay: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "agent-replay {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[test]
fn dump_summary_reports_events_and_agents() {
    let env = CliTestEnv::new();
    let fixture = path_arg(&fixture_path());
    let args = ["dump", fixture.as_str(), "--summary"];

    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let summary: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("summary should be JSON");
    assert_eq!(summary["session_id"], "sess-001");
    assert_eq!(summary["total_events"], 13);
    assert_eq!(summary["events_by_type"]["tool_result"], 2);
    assert_eq!(summary["events_by_type"]["error"], 2);
    assert_eq!(summary["agents"].as_array().map(Vec::len), Some(2));
}

#[test]
fn dump_prints_timeline() {
    let env = CliTestEnv::new();
    let fixture = path_arg(&fixture_path());
    let args = ["dump", fixture.as_str()];

    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Session sess-001"), "got:\n{stdout}");
    assert!(stdout.contains("Explore parser module"));
    assert!(stdout.contains("cargo test"));
}

#[test]
fn dump_missing_file_fails() {
    let env = CliTestEnv::new();
    let missing = path_arg(&env.data_dir.join("nope.jsonl"));
    let output = run_bin(&env, &["dump", missing.as_str()]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to parse"), "got:\n{stderr}");
}

#[test]
fn list_shows_discovered_sessions() {
    let env = CliTestEnv::new();
    env.seed_transcript("-home-dev-app", "sess-001.jsonl");
    env.seed_transcript("-home-dev-app", "subagents/agent-a1b2c3d.jsonl");

    let args = ["list", "--json"];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    let rows: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line is JSON"))
        .collect();
    assert_eq!(rows.len(), 1, "subagent transcripts are not sessions");
    assert_eq!(rows[0]["project"], "-home-dev-app");
    assert_eq!(rows[0]["session_id"], "sess-001");
    assert_eq!(rows[0]["event_count"], 13);
    assert_eq!(rows[0]["is_active"], true);
}

#[test]
fn list_without_sessions() {
    let env = CliTestEnv::new();
    let output = run_bin(&env, &["list"]);
    assert_success(&["list"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No sessions found"), "got:\n{stdout}");
}
