use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn codepilot_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_codepilot"))
}

fn setup_test_env(extra: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let workspace = root.join("workspace");
    fs::create_dir_all(workspace.join("src")).unwrap();
    fs::write(workspace.join("src/main.py"), "print('hello')\n").unwrap();
    fs::write(workspace.join("README.md"), "# not indexed\n").unwrap();

    let config_content = format!(
        r#"[llm]
provider = "ollama"
model = "llama3"
url = "http://127.0.0.1:9"

[embedding]
provider = "disabled"

[index]
path = "{}/vectorstores/codebase.sqlite"

{}
"#,
        root.display(),
        extra
    );

    let config_path = config_dir.join("codepilot.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_codepilot(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = codepilot_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run codepilot binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_help_lists_commands() {
    let (_tmp, config) = setup_test_env("");
    let (stdout, _, success) = run_codepilot(&config, &["--help"]);
    assert!(success);
    for cmd in ["serve", "boilerplate", "edit", "explain", "index", "chat", "stats"] {
        assert!(stdout.contains(cmd), "help is missing {}: {}", cmd, stdout);
    }
}

#[test]
fn test_invalid_chunking_config_rejected() {
    let (_tmp, config) = setup_test_env("[chunking]\nchunk_size = 100\nchunk_overlap = 100\n");
    let (_, stderr, success) = run_codepilot(&config, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("chunk_overlap"), "stderr: {}", stderr);
}

#[test]
fn test_stats_without_index() {
    let (_tmp, config) = setup_test_env("");
    let (_, stderr, success) = run_codepilot(&config, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("no embedding index found"), "stderr: {}", stderr);
}

#[test]
fn test_index_with_embeddings_disabled() {
    let (tmp, config) = setup_test_env("");
    let workspace = tmp.path().join("workspace");
    let (_, stderr, success) = run_codepilot(&config, &["index", workspace.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("disabled"), "stderr: {}", stderr);
    assert!(!tmp.path().join("vectorstores/codebase.sqlite").exists());
}

#[test]
fn test_index_defaults_to_gemini_embeddings() {
    let tmp = TempDir::new().unwrap();
    let workspace = tmp.path().join("workspace");
    fs::create_dir_all(&workspace).unwrap();
    fs::write(workspace.join("main.py"), "print('hello')\n").unwrap();
    let config = tmp.path().join("codepilot.toml");
    fs::write(
        &config,
        format!(
            "[llm]\nprovider = \"ollama\"\nmodel = \"llama3\"\n\n[index]\npath = \"{}/idx.sqlite\"\n",
            tmp.path().display()
        ),
    )
    .unwrap();

    let output = Command::new(codepilot_binary())
        .env_remove("GOOGLE_API_KEY")
        .arg("--config")
        .arg(&config)
        .arg("index")
        .arg(&workspace)
        .output()
        .unwrap();
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("GOOGLE_API_KEY"), "stderr: {}", stderr);
    assert!(!stderr.contains("disabled"), "stderr: {}", stderr);
}

#[test]
fn test_index_empty_workspace() {
    let (tmp, config) = setup_test_env("");
    let empty = tmp.path().join("empty");
    fs::create_dir_all(&empty).unwrap();
    let (_, stderr, success) = run_codepilot(&config, &["index", empty.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("No source files found"), "stderr: {}", stderr);
}

#[test]
fn test_edit_rejects_bad_line_range() {
    let (tmp, config) = setup_test_env("");
    let file = tmp.path().join("workspace/src/main.py");
    let (_, stderr, success) = run_codepilot(
        &config,
        &[
            "edit",
            file.to_str().unwrap(),
            "--lines",
            "5:3",
            "--instruction",
            "noop",
        ],
    );
    assert!(!success);
    assert!(stderr.contains("invalid line range"), "stderr: {}", stderr);
}

#[test]
fn test_missing_config_file_uses_defaults() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");
    // Defaults point at a relative index path that does not exist here.
    let output = Command::new(codepilot_binary())
        .current_dir(tmp.path())
        .arg("--config")
        .arg(&missing)
        .arg("stats")
        .output()
        .unwrap();
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("no embedding index found"), "stderr: {}", stderr);
}
