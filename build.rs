use std::{fs, path::Path, process::Command, time::SystemTime};

fn main() {
  let now = SystemTime::now()
    .duration_since(std::time::UNIX_EPOCH)
    .map(|d| d.as_secs())
    .unwrap_or(0);
  println!("cargo:rustc-env=BUILD_TIME={}", now);

  println!("cargo:rerun-if-changed=.git/HEAD");
  if Path::new(".git/refs/heads").exists() {
    println!("cargo:rerun-if-changed=.git/refs/heads");
  }

  let git = read_git_info();

  println!("cargo:rustc-env=GIT_BRANCH={}", git.branch);
  println!("cargo:rustc-env=GIT_COMMIT={}", git.commit);
  println!(
    "cargo:rustc-env=GIT_COMMIT_SHORT={}",
    git.commit.chars().take(7).collect::<String>()
  );
  println!("cargo:rustc-env=GIT_DIRTY={}", git.dirty);

  if let Some(version) = run("rustc", &["--version"]) {
    println!("cargo:rustc-env=RUST_VERSION={}", version);
  }
}

struct GitInfo {
  branch: String,
  commit: String,
  dirty: bool,
}

fn run(program: &str, args: &[&str]) -> Option<String> {
  let output = Command::new(program).args(args).output().ok()?;
  if !output.status.success() {
    return None;
  }
  Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn read_git_info() -> GitInfo {
  let mut info = GitInfo {
    branch: run("git", &["rev-parse", "--abbrev-ref", "HEAD"]).unwrap_or_else(|| "unknown".into()),
    commit: run("git", &["rev-parse", "HEAD"]).unwrap_or_else(|| "unknown".into()),
    dirty: run("git", &["status", "--porcelain"]).is_some_and(|s| !s.is_empty()),
  };

  // No git binary: read the refs by hand.
  if info.commit == "unknown" {
    if let Ok(head) = fs::read_to_string(".git/HEAD") {
      if let Some(ref_path) = head.strip_prefix("ref: ") {
        let ref_path = ref_path.trim();
        info.branch = ref_path.rsplit('/').next().unwrap_or("unknown").to_string();
        if let Ok(commit) = fs::read_to_string(format!(".git/{}", ref_path)) {
          info.commit = commit.trim().to_string();
        }
      } else {
        info.commit = head.trim().to_string();
      }
    }
  }

  info
}
