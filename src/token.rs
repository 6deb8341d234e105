pub const TOKEN_ENV: &str = "TASKLANE_TOKEN";

/// Resolve the session token for `tasklane call`.
///
/// An explicit `--token` wins; otherwise `TASKLANE_TOKEN` is read. Blank
/// values count as unset so callers can fall through to public procedures.
pub fn resolve_token(explicit: Option<String>) -> Option<String> {
    explicit
        .or_else(|| std::env::var(TOKEN_ENV).ok())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}
