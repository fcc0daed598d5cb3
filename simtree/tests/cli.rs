use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use simtree::core::types::{Party, RoleLabels};
use simtree::exit_codes;
use simtree::test_support::{candidate, reply_json};

fn simtree(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_simtree"))
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("spawn simtree")
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

#[test]
fn init_creates_config_and_store() {
    let dir = tempfile::tempdir().expect("tempdir");

    let output = simtree(dir.path(), &["init"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(dir.path().join("simtree.toml").exists());
    assert!(dir.path().join(".simtree/store.json").exists());
}

#[test]
fn case_add_prints_the_stored_case() {
    let dir = tempfile::tempdir().expect("tempdir");
    simtree(dir.path(), &["init"]);

    let output = simtree(
        dir.path(),
        &["case", "add", "--name", "Deposit dispute", "--context", "Tenant owes rent."],
    );

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let case = stdout_json(&output);
    assert_eq!(case["id"], 1);
    assert_eq!(case["name"], "Deposit dispute");
}

#[test]
fn missing_and_invalid_inputs_map_to_exit_codes() {
    let dir = tempfile::tempdir().expect("tempdir");
    simtree(dir.path(), &["init"]);

    let output = simtree(dir.path(), &["frontier", "7"]);
    assert_eq!(output.status.code(), Some(exit_codes::NOT_FOUND));
    assert!(String::from_utf8_lossy(&output.stderr).contains("tree 7"));

    let output = simtree(dir.path(), &["range", "5", "2"]);
    assert_eq!(output.status.code(), Some(exit_codes::NOT_FOUND));

    let output = simtree(dir.path(), &["select", "3"]);
    assert_eq!(output.status.code(), Some(exit_codes::NOT_FOUND));
}

#[cfg(unix)]
#[test]
fn generate_then_inspect_the_selected_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let reply = reply_json(&candidate(&RoleLabels::default(), Party::A, "Opening offer"));
    fs::write(dir.path().join("reply.json"), reply).expect("write reply");
    fs::write(
        dir.path().join("simtree.toml"),
        "[model]\ncommand = [\"cat\", \"reply.json\"]\ntimeout_secs = 10\n",
    )
    .expect("write config");
    simtree(dir.path(), &["init"]);
    simtree(dir.path(), &["case", "add", "--name", "Deposit dispute", "--context", "facts"]);

    let output = simtree(dir.path(), &["generate", "--case", "1", "--goal", "Settle"]);
    assert_eq!(
        output.status.code(),
        Some(exit_codes::OK),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(stdout_json(&output)["tree_id"], 1);

    let path = stdout_json(&simtree(dir.path(), &["tree", "path", "1"]));
    let lines: Vec<&str> = path
        .as_array()
        .expect("array")
        .iter()
        .map(|n| n["content"].as_str().expect("content"))
        .collect();
    assert_eq!(lines, vec!["Opening offer", "reply 1", "follow-up 1.1"]);

    let output = simtree(dir.path(), &["validate", "1"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout_json(&output)["valid"], true);
}

#[cfg(unix)]
#[test]
fn unparsable_model_output_exits_upstream_without_a_tree() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(
        dir.path().join("simtree.toml"),
        "[model]\ncommand = [\"sh\", \"-c\", \"cat >/dev/null; echo not json\"]\ntimeout_secs = 10\n",
    )
    .expect("write config");
    simtree(dir.path(), &["init"]);
    simtree(dir.path(), &["case", "add", "--name", "Deposit dispute", "--context", "facts"]);

    let output = simtree(dir.path(), &["continue", "--case", "1"]);

    assert_eq!(output.status.code(), Some(exit_codes::UPSTREAM));
    let result = stdout_json(&output);
    assert!(result["tree_id"].is_null());
    assert_eq!(result["raw_response"], "not json\n");
    assert_eq!(
        simtree(dir.path(), &["tree", "summary", "1"]).status.code(),
        Some(exit_codes::NOT_FOUND)
    );
}

#[test]
fn empty_tree_takes_a_custom_root() {
    let dir = tempfile::tempdir().expect("tempdir");
    simtree(dir.path(), &["init"]);
    simtree(dir.path(), &["case", "add", "--name", "Deposit dispute", "--context", "facts"]);

    let output = simtree(dir.path(), &["tree", "new", "--case", "1", "--headline", "Mediation"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout_json(&output)["headline"], "Mediation");

    let output = simtree(
        dir.path(),
        &["node", "add", "--tree", "1", "--role", "Client", "Return the deposit."],
    );
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let root = stdout_json(&output);
    assert_eq!(root["selected"], true);
    assert!(root["parent_id"].is_null());

    let frontier = stdout_json(&simtree(dir.path(), &["frontier", "1"]));
    assert_eq!(frontier["id"], root["id"]);

    let output = simtree(
        dir.path(),
        &["node", "add", "--tree", "1", "--role", "Client", "A second root."],
    );
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));

    let output = simtree(dir.path(), &["tree", "new", "--case", "9"]);
    assert_eq!(output.status.code(), Some(exit_codes::NOT_FOUND));
}
