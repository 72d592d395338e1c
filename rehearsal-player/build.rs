//! Build script for rehearsal-player
//!
//! Stamps the binary with its source revision, build time and profile, which
//! the `/health` endpoint reports.

use std::process::Command;

/// Short commit hash, or "unknown" outside a git checkout
fn git_revision() -> String {
    Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|rev| rev.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn main() {
    let stamp = [
        ("GIT_HASH", git_revision()),
        (
            "BUILD_TIMESTAMP",
            chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        ),
        (
            "BUILD_PROFILE",
            std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string()),
        ),
    ];
    for (key, value) in stamp {
        println!("cargo:rustc-env={}={}", key, value);
    }
    println!("cargo:rerun-if-changed=.git/HEAD");
}
