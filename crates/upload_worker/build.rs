use std::process::Command;

const COMMIT_ENV_OVERRIDE: &str = "SOURCE_COMMIT_HASH";
const COMMIT_ENV_OUT: &str = "UPLOAD_WORKER_GIT_COMMIT_HASH";

fn main() {
    println!("cargo:rerun-if-env-changed={COMMIT_ENV_OVERRIDE}");
    for head in [".git/HEAD", "../.git/HEAD", "../../.git/HEAD"] {
        println!("cargo:rerun-if-changed={head}");
    }

    let commit = std::env::var(COMMIT_ENV_OVERRIDE)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .or_else(git_head)
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env={COMMIT_ENV_OUT}={commit}");
}

/// Reads the checked-out commit, returning `None` outside a git work tree.
fn git_head() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--verify", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())?;

    let hash = String::from_utf8(output.stdout).ok()?;
    Some(hash.trim().to_string()).filter(|hash| !hash.is_empty())
}
