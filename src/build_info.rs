/// Build-time git commit SHA stamped by build.rs when available.
pub fn git_sha() -> Option<&'static str> {
    option_env!("TASKLANE_BUILD_GIT_SHA")
}

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// `0.1.0` or `0.1.0 (abcdef123456)` when a commit is known.
pub fn version_line() -> String {
    match git_sha() {
        Some(sha) => format!("{} ({})", version(), &sha[..sha.len().min(12)]),
        None => version().to_string(),
    }
}
