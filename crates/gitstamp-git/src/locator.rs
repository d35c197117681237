//! Locating the `.git` directory a caller should operate against.
//!
//! A checkout's `.git` entry is not always a plain directory: submodules
//! and worktrees replace it with a link file containing a `gitdir: <path>`
//! pointer to the real location, and that pointer itself nests one level
//! too deep for worktrees. This module resolves all of those shapes, and
//! additionally adapts the result for callers that shell out to the native
//! `git` executable (which must run one level above the metadata directory
//! itself).
//!
//! The search is purely filesystem-based and synchronous; nothing is
//! cached between lookups, since the working tree may change between calls
//! in a long-lived process.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// The name of the git metadata directory (or link file).
pub const DOT_GIT: &str = ".git";

/// The key expected on the single line of a `.git` link file.
const GITDIR_KEY: &str = "gitdir";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur while locating a git directory.
#[derive(Debug, Error)]
pub enum LocateError {
    /// No git directory was found and the locator was configured to treat
    /// that as fatal.
    #[error("no .git directory found; specify a valid git directory (configured: {configured})")]
    NoRepositoryFound {
        /// The manually configured candidate, or `"none"` if the lookup
        /// relied on the upward search alone.
        configured: String,
    },
}

/// A specialized `Result` type for locator operations.
pub type Result<T> = std::result::Result<T, LocateError>;

// ---------------------------------------------------------------------------
// GitDirLocator
// ---------------------------------------------------------------------------

/// Resolves the on-disk `.git` directory for a project.
#[derive(Debug, Clone)]
pub struct GitDirLocator {
    base_dir: PathBuf,
    use_native_git: bool,
    fail_if_missing: bool,
}

impl GitDirLocator {
    /// Create a locator.
    ///
    /// `base_dir` is the starting point for the upward search when no
    /// usable manually configured candidate is given. With
    /// `use_native_git` the result is adapted for invoking the `git`
    /// executable (see [`GitDirLocator::lookup`]). With `fail_if_missing`
    /// an unresolvable lookup becomes [`LocateError::NoRepositoryFound`]
    /// instead of `None`.
    pub fn new(base_dir: impl Into<PathBuf>, use_native_git: bool, fail_if_missing: bool) -> Self {
        Self {
            base_dir: base_dir.into(),
            use_native_git,
            fail_if_missing,
        }
    }

    /// Look up the git directory, starting from the manually configured
    /// candidate if one is given.
    ///
    /// A candidate that exists as a directory is used as-is. A candidate
    /// that exists as a file is read as a `gitdir:` link and resolved,
    /// without falling back to the upward search. A missing candidate
    /// falls back to walking up from the base directory, checking each
    /// level for a `.git` entry until the filesystem root.
    ///
    /// For the native-git strategy the resolved directory is post-processed:
    /// a submodule layout (`<repo>/.git/modules/<name>`) is swapped back to
    /// the submodule's own `.git` link file, since relative worktree
    /// configuration inside the module store only resolves from there, and
    /// the final result is the parent of whatever directory is held, since
    /// `git` cannot run inside the metadata directory itself.
    ///
    /// # Errors
    ///
    /// Returns [`LocateError::NoRepositoryFound`] if nothing usable was
    /// found and the locator was configured with `fail_if_missing`.
    pub fn lookup(&self, manually_configured: Option<&Path>) -> Result<Option<PathBuf>> {
        let mut git_dir = self.run_search(manually_configured, true);

        if self.fail_if_missing && !is_existing_directory(git_dir.as_deref()) {
            return Err(LocateError::NoRepositoryFound {
                configured: manually_configured
                    .map_or_else(|| "none".to_string(), |p| p.display().to_string()),
            });
        }

        if self.use_native_git {
            if let Some(found) = git_dir.as_deref() {
                if is_submodule_git_dir(found) {
                    // Re-run the search without resolving link files to
                    // recover the submodule's own `.git` file location.
                    if let Some(unresolved) = self.run_search(manually_configured, false) {
                        if unresolved.is_file() {
                            debug!(
                                link = %unresolved.display(),
                                "submodule layout detected, using the unresolved .git link"
                            );
                            git_dir = Some(unresolved);
                        }
                    }
                }
            }
            git_dir = git_dir.and_then(|dir| parent_dir(&dir));
        }

        Ok(git_dir)
    }

    /// Search for the git directory, preferring the manually configured
    /// candidate over the upward walk.
    ///
    /// With `resolve_link_files` a `.git` file is read as a `gitdir:` link
    /// and replaced by its target; without it the file path itself is
    /// returned.
    fn run_search(&self, manually_configured: Option<&Path>, resolve_link_files: bool) -> Option<PathBuf> {
        if let Some(candidate) = manually_configured {
            if candidate.exists() {
                if candidate.is_dir() {
                    return Some(candidate.to_path_buf());
                }
                if !resolve_link_files {
                    return Some(candidate.to_path_buf());
                }
                // An existing candidate that is not a directory is taken as
                // a link file; the upward walk is never consulted for it.
                return resolve_gitdir_link(candidate);
            }
        }
        self.find_project_git_directory(resolve_link_files)
    }

    /// Walk up from the base directory until a `.git` entry is found or
    /// the filesystem root is reached.
    fn find_project_git_directory(&self, resolve_link_files: bool) -> Option<PathBuf> {
        let start = self.base_dir.canonicalize().ok()?;

        let mut current = Some(start.as_path());
        while let Some(dir) = current {
            let candidate = dir.join(DOT_GIT);
            if candidate.exists() {
                if candidate.is_dir() {
                    debug!(git_dir = %candidate.display(), "found .git directory");
                    return Some(candidate);
                }
                if candidate.is_file() {
                    if resolve_link_files {
                        return resolve_gitdir_link(&candidate);
                    }
                    return Some(candidate);
                }
                // Exists but is neither a file nor a directory; give up.
                return None;
            }
            current = dir.parent();
        }

        None
    }
}

// ---------------------------------------------------------------------------
// Link file resolution
// ---------------------------------------------------------------------------

/// Read a `.git` link file and resolve the `gitdir:` pointer in it.
///
/// The file is expected to hold a single `gitdir: <path>` line. Anything
/// else (unreadable file, wrong key, more than one `": "` separator)
/// resolves to `None` rather than an error; the caller decides how to
/// treat absence. A relative pointer is resolved against the link file's
/// own parent directory.
fn resolve_gitdir_link(link_file: &Path) -> Option<PathBuf> {
    let contents = fs::read_to_string(link_file).ok()?;
    let line = contents.lines().next()?;

    // Split on the literal `": "`; the line must produce exactly a key and
    // a value. Windows-style values with other colons pass through intact
    // because the separator requires the trailing space.
    let mut parts = line.split(": ");
    let key = parts.next()?;
    let value = parts.next()?;
    if parts.next().is_some() || key != GITDIR_KEY {
        return None;
    }

    let target = collapse_worktree(Path::new(value));
    let resolved = if target.is_absolute() {
        target
    } else {
        link_file.parent()?.join(target)
    };
    debug!(link = %link_file.display(), target = %resolved.display(), "resolved gitdir link");
    Some(resolved)
}

/// Collapse a worktree-private metadata path to its shared `.git`.
///
/// A worktree's `gitdir:` pointer targets `<repo>/.git/worktrees/<name>`,
/// one level deeper than is useful for general git operations; for such a
/// path this returns `<repo>/.git`. Only the exact `(.git, worktrees)`
/// parent pair triggers the collapse; every other path is returned
/// unchanged.
fn collapse_worktree(path: &Path) -> PathBuf {
    if let Some(parent) = path.parent() {
        if parent.ends_with(Path::new(DOT_GIT).join("worktrees")) {
            if let Some(shared) = parent.parent() {
                return shared.to_path_buf();
            }
        }
    }
    path.to_path_buf()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Whether `path` looks like a submodule's resolved metadata directory,
/// i.e. `<repo>/.git/modules/<name>`.
fn is_submodule_git_dir(path: &Path) -> bool {
    let Some(parent) = path.parent() else {
        return false;
    };
    let Some(grandparent) = parent.parent() else {
        return false;
    };
    parent.file_name() == Some(OsStr::new("modules"))
        && grandparent.file_name() == Some(OsStr::new(DOT_GIT))
}

/// The parent of `path`, mapping an empty parent (single-component
/// relative path) to `None`.
fn parent_dir(path: &Path) -> Option<PathBuf> {
    path.parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

fn is_existing_directory(path: Option<&Path>) -> bool {
    path.is_some_and(Path::is_dir)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
