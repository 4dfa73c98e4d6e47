use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

fn binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("arena-mcp");
    path
}

fn run(args: &[&str]) -> (String, String, bool) {
    let output = Command::new(binary())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run arena-mcp binary: {e}"));
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

#[test]
fn help_lists_commands() {
    let (stdout, _stderr, success) = run(&["--help"]);
    assert!(success);
    for command in ["serve", "search", "get", "resolve"] {
        assert!(stdout.contains(command), "help missing {command}");
    }
}

#[test]
fn missing_config_file_fails_with_path() {
    let (_stdout, stderr, success) = run(&["--config", "/nonexistent/arena.toml", "search", "x"]);
    assert!(!success);
    assert!(stderr.contains("/nonexistent/arena.toml"));
}

#[test]
fn invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("arena.toml");
    fs::write(&config_path, "[api]\nmax_concurrent_requests = 0\n").unwrap();

    let (_stdout, stderr, success) = run(&[
        "--config",
        config_path.to_str().unwrap(),
        "search",
        "anything",
    ]);
    assert!(!success);
    assert!(stderr.contains("max_concurrent_requests"));
}

#[test]
fn unknown_entity_type_is_rejected() {
    let (_stdout, stderr, success) = run(&["search", "maps", "--type", "Hologram"]);
    assert!(!success);
    assert!(stderr.contains("Hologram"));
}
