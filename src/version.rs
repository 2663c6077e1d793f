//! Build identity of the crate, printed by `flowmeta version` and logged
//! when a lookup session starts. Git fields come from vergen (see
//! `build.rs`) and read "unknown" when the crate is built outside a
//! checkout.

pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const GIT_BRANCH: &str = match option_env!("VERGEN_GIT_BRANCH") {
    Some(branch) => branch,
    None => "unknown",
};

pub const GIT_SHA: &str = match option_env!("VERGEN_GIT_SHA") {
    Some(sha) => sha,
    None => "unknown",
};

const SHORT_SHA_LEN: usize = 7;

pub fn git_dirty() -> bool {
    option_env!("VERGEN_GIT_DIRTY") == Some("true")
}

/// `0.1.0+main.abc1234`, or `0.1.0+main.abc1234.dirty` when built from a
/// modified tree.
pub fn version_string() -> String {
    build_identity(PKG_VERSION, GIT_BRANCH, GIT_SHA, git_dirty())
}

fn build_identity(version: &str, branch: &str, sha: &str, dirty: bool) -> String {
    let short_sha = sha.get(..SHORT_SHA_LEN).unwrap_or(sha);
    let suffix = if dirty { ".dirty" } else { "" };
    format!("{version}+{branch}.{short_sha}{suffix}")
}
