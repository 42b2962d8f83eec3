/// Build identity reported by `--version`, the bootstrap log event and the build-info metric.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_COMMIT_HASH: &str = env!("UPLOAD_WORKER_GIT_COMMIT_HASH");
pub const VERSION_WITH_COMMIT: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "+",
    env!("UPLOAD_WORKER_GIT_COMMIT_HASH")
);

const UNKNOWN_COMMIT: &str = "unknown";
const SHORT_HASH_LEN: usize = 12;

/// Returns the abbreviated commit hash, or `"unknown"` when the build had no git metadata.
pub fn short_commit_hash() -> &'static str {
    if GIT_COMMIT_HASH == UNKNOWN_COMMIT {
        return GIT_COMMIT_HASH;
    }

    &GIT_COMMIT_HASH[..SHORT_HASH_LEN.min(GIT_COMMIT_HASH.len())]
}

#[cfg(test)]
mod tests {
    use super::{short_commit_hash, GIT_COMMIT_HASH, VERSION, VERSION_WITH_COMMIT};

    #[test]
    fn version_with_commit_is_semver_plus_hash() {
        assert!(VERSION_WITH_COMMIT.starts_with(VERSION));
        assert!(VERSION_WITH_COMMIT.ends_with(GIT_COMMIT_HASH));
        assert!(VERSION_WITH_COMMIT.contains('+'));
    }

    #[test]
    fn short_hash_is_a_prefix_of_the_full_hash() {
        assert!(!short_commit_hash().is_empty());
        assert!(GIT_COMMIT_HASH.starts_with(short_commit_hash()));
        assert!(short_commit_hash().len() <= 12);
    }
}
