#![allow(dead_code)]

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

/// Run the binary with `args`, feeding `stdin` and returning
/// `(exit code, stdout, stderr)`.
pub fn run_cli(args: &[&str], stdin: &str) -> (i32, String, String) {
    let mut child = Command::new(env!("CARGO_BIN_EXE_helpx"))
        .args(args)
        .env_remove("HELPX_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn binary");

    child
        .stdin
        .as_mut()
        .unwrap()
        .write_all(stdin.as_bytes())
        .unwrap();

    let output = child.wait_with_output().unwrap();
    (
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

/// Run `helpx serve` against `data_dir` with one event per line and return
/// the parsed replies.
pub fn serve(data_dir: &Path, events: &[serde_json::Value]) -> Vec<serde_json::Value> {
    let stdin = events
        .iter()
        .map(|e| serde_json::to_string(e).unwrap())
        .collect::<Vec<_>>()
        .join("\n");
    let dir = data_dir.to_str().unwrap();
    let (code, stdout, stderr) = run_cli(&["--data-dir", dir, "serve"], &stdin);
    assert_eq!(code, 0, "serve failed: {stderr}");
    stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

/// Create a temp data dir configured to replay `script` (JSONL) as the
/// conversation round. The `TempDir` must be kept alive for the test.
pub fn scripted_data_dir(script: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("helpx.toml"),
        "[conversation]\nscript = \"round.jsonl\"\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("round.jsonl"), script).unwrap();
    dir
}

/// `TKT-` followed by six uppercase letters or digits.
pub fn is_ticket_id(id: &str) -> bool {
    id.len() == 10
        && id.starts_with("TKT-")
        && id[4..]
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}
