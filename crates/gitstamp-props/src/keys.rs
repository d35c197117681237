//! Canonical property names exposed by gitstamp.
//!
//! Keys are stored without the configurable prefix; [`prefixed`] applies
//! one (`"git"` turns `branch` into `git.branch`).

/// The current branch name; falls back to the commit id for detached HEAD.
pub const BRANCH: &str = "branch";

/// Whether the working tree holds uncommitted modifications.
pub const DIRTY: &str = "dirty";

/// The commit's full SHA-1 hash.
pub const COMMIT_ID: &str = "commit.id";

/// The abbreviated commit hash.
pub const COMMIT_ID_ABBREV: &str = "commit.id.abbrev";

/// A human-readable name for the commit (`git describe`).
pub const COMMIT_DESCRIBE: &str = "commit.id.describe";

/// The git user name configured where the properties were generated.
pub const BUILD_USER_NAME: &str = "build.user.name";

/// The git user email configured where the properties were generated.
pub const BUILD_USER_EMAIL: &str = "build.user.email";

/// The formatted timestamp of the build that generated the properties.
pub const BUILD_TIME: &str = "build.time";

/// The hostname where the properties were generated.
pub const BUILD_HOST: &str = "build.host";

/// The project version of the current build.
pub const BUILD_VERSION: &str = "build.version";

/// A project-specific build number, when a CI server supplies one.
pub const BUILD_NUMBER: &str = "build.number";

/// A server-wide unique build number, when a CI server supplies one.
pub const BUILD_NUMBER_UNIQUE: &str = "build.number.unique";

/// Apply a dotted prefix to a property key.
///
/// An empty prefix leaves the key untouched.
///
/// # Examples
///
/// ```
/// use gitstamp_props::keys;
///
/// assert_eq!(keys::prefixed("git", keys::BRANCH), "git.branch");
/// assert_eq!(keys::prefixed("", keys::BRANCH), "branch");
/// ```
pub fn prefixed(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}
