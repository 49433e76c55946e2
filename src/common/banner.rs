use crate::common::types::VoiceTarget;
use crate::configs::SourceMode;

const GREEN: &str = "\x1b[32m";
const CYAN: &str = "\x1b[36m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";

macro_rules! env_or {
    ($key:literal, $default:literal) => {
        option_env!($key).unwrap_or($default)
    };
}

pub struct BannerInfo {
    pub version: &'static str,
    pub branch: &'static str,
    pub commit_short: &'static str,
    pub rust_version: &'static str,
    pub dirty: bool,
    pub profile: &'static str,
}

impl Default for BannerInfo {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            branch: env_or!("GIT_BRANCH", "unknown"),
            commit_short: env_or!("GIT_COMMIT_SHORT", "unknown"),
            rust_version: env_or!("RUST_VERSION", "unknown"),
            dirty: matches!(option_env!("GIT_DIRTY"), Some("true")),
            profile: if cfg!(debug_assertions) {
                "debug"
            } else {
                "release"
            },
        }
    }
}

pub fn print_banner(info: &BannerInfo, target: VoiceTarget, mode: SourceMode) {
    println!();
    println!("{GREEN}    _   _                               {RESET}");
    println!("{GREEN}   /_\\ (_)_ ____ __ ____ ___ _____       {RESET}");
    println!("{GREEN}  / _ \\| | '_\\ V  V / _` \\ V / -_)      {RESET}");
    println!("{GREEN} /_/ \\_\\_|_|  \\_/\\_/\\__,_|\\_/\\___|      {RESET}");
    println!("{DIM}========================================{RESET}");
    println!();

    print_row("Version", info.version, CYAN);
    print_row("Branch", info.branch, RESET);

    let commit_display = if info.dirty {
        format!("{}{YELLOW} (dirty){RESET}", info.commit_short)
    } else {
        info.commit_short.to_owned()
    };
    print_row_owned("Commit", &commit_display);
    print_row("Rust", info.rust_version, RESET);
    print_row("Profile", info.profile, YELLOW);
    print_row_owned("Channel", &target.to_string());
    print_row_owned("Source", mode.as_str());
    println!();
}

fn print_row(label: &str, value: &'static str, color: &str) {
    println!("  {BOLD}{label:<14}{RESET}{color}{value}{RESET}");
}

fn print_row_owned(label: &str, value: &str) {
    println!("  {BOLD}{label:<14}{RESET}{value}");
}
