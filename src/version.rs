//! Version information with embedded git metadata.

/// Package version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Git branch at build time, or "unknown" if unavailable.
pub const GIT_BRANCH: &str = match option_env!("VERGEN_GIT_BRANCH") {
    Some(branch) => branch,
    None => "unknown",
};

/// Git commit SHA (short) at build time, or "unknown" if unavailable.
pub const GIT_SHA: &str = match option_env!("VERGEN_GIT_SHA") {
    Some(sha) => sha,
    None => "unknown",
};

/// Whether the working tree was dirty at build time.
pub fn git_dirty() -> bool {
    option_env!("VERGEN_GIT_DIRTY") == Some("true")
}

/// Full version string: `{version}+{branch}.{sha}`, with a `.dirty` suffix
/// for builds from a modified tree.
///
/// Logged once at startup by the `mimir` binary and used as the User-Agent
/// suffix for upstream requests.
pub fn version_string() -> String {
    let dirty_suffix = if git_dirty() { ".dirty" } else { "" };
    let sha: String = GIT_SHA.chars().take(7).collect();
    format!("{PKG_VERSION}+{GIT_BRANCH}.{sha}{dirty_suffix}")
}

/// User-Agent header value sent to upstream providers.
pub(crate) fn user_agent() -> String {
    format!("mimir/{}", version_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_pkg_version() {
        assert!(version_string().starts_with(PKG_VERSION));
    }

    #[test]
    fn version_string_contains_branch() {
        assert!(version_string().contains(GIT_BRANCH));
    }

    #[test]
    fn user_agent_names_the_crate() {
        assert!(user_agent().starts_with("mimir/"));
    }
}
