// Captures Git commit hash, branch, and build timestamp for the version
// banner. Falls back to version.toml when git is not available (e.g.
// Docker builds).

use std::fs;
use std::path::Path;
use std::process::Command;

fn main() {
    let fallback = read_version_toml(Path::new("version.toml"));

    let commit_hash = git_output(&["rev-parse", "--short", "HEAD"])
        .unwrap_or_else(|| fallback.0.clone());
    let branch = git_output(&["rev-parse", "--abbrev-ref", "HEAD"])
        .unwrap_or_else(|| fallback.1.clone());
    let build_date = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();

    println!("cargo:rustc-env=GIT_COMMIT_HASH={}", commit_hash);
    println!("cargo:rustc-env=GIT_BRANCH={}", branch);
    println!("cargo:rustc-env=BUILD_DATE={}", build_date);

    // Re-run on new commits or version.toml edits
    for path in [".git/HEAD", ".git/refs/heads", "version.toml"] {
        if Path::new(path).exists() {
            println!("cargo:rerun-if-changed={}", path);
        }
    }
}

fn git_output(args: &[&str]) -> Option<String> {
    Command::new("git")
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Fallback values from version.toml: (commit_hash, branch).
fn read_version_toml(path: &Path) -> (String, String) {
    let default = ("unknown".to_string(), "unknown".to_string());
    let Ok(content) = fs::read_to_string(path) else {
        return default;
    };

    let mut commit = default.0.clone();
    let mut branch = default.1.clone();
    for line in content.lines() {
        let line = line.trim();
        if line.starts_with("git_commit_hash") {
            if let Some(val) = extract_toml_value(line) {
                commit = val;
            }
        } else if line.starts_with("git_branch") {
            if let Some(val) = extract_toml_value(line) {
                branch = val;
            }
        }
    }
    (commit, branch)
}

fn extract_toml_value(line: &str) -> Option<String> {
    let (_, value) = line.split_once('=')?;
    let value = value.trim().trim_matches('"');
    (!value.is_empty() && value != "unknown").then(|| value.to_string())
}
