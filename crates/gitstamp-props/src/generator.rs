//! Regenerate-on-change property file generation.
//!
//! Build tools re-run stamping on every build, but most builds do not
//! change the underlying git state. Rewriting an identical file would
//! still bump its mtime and ripple through downstream up-to-date checks,
//! so the generator compares against the existing file first and only
//! writes when the content differs. The build timestamp is ignored in the
//! comparison; it changes on every run by definition.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::format::{self, FormatError, OutputFormat};
use crate::keys;
use crate::set::PropertySet;

/// Writes a property set to a file, skipping the write when nothing
/// relevant changed.
#[derive(Debug, Clone)]
pub struct PropertiesFileGenerator {
    format: OutputFormat,
    prefix: String,
    project_name: String,
}

impl PropertiesFileGenerator {
    /// Create a generator.
    ///
    /// `prefix` is the dotted property prefix in use (e.g. `"git"`), needed
    /// to identify the build-time property during comparison.
    /// `project_name` only labels log output.
    pub fn new(
        format: OutputFormat,
        prefix: impl Into<String>,
        project_name: impl Into<String>,
    ) -> Self {
        Self {
            format,
            prefix: prefix.into(),
            project_name: project_name.into(),
        }
    }

    /// Write `properties` to `output_file` (resolved against `project_dir`
    /// when relative), unless the existing file already holds the same
    /// entries. Returns whether the file was (re)written.
    ///
    /// An existing file that cannot be read or parsed is treated as stale
    /// and overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError`] when encoding or writing the file fails.
    pub fn maybe_generate(
        &self,
        properties: &PropertySet,
        project_dir: &Path,
        output_file: &Path,
    ) -> Result<bool, FormatError> {
        let output_path = output_path(project_dir, output_file);

        if output_path.exists() && self.is_up_to_date(properties, &output_path) {
            info!(
                path = %output_path.display(),
                project = %self.project_name,
                "properties file is up-to-date"
            );
            return Ok(false);
        }

        info!(
            path = %output_path.display(),
            project = %self.project_name,
            "writing properties file"
        );
        format::write_properties_file(&output_path, self.format, properties)?;
        Ok(true)
    }

    fn is_up_to_date(&self, properties: &PropertySet, output_path: &Path) -> bool {
        let persisted = match format::read_properties_file(output_path, self.format) {
            Ok(persisted) => persisted,
            Err(error) => {
                warn!(
                    path = %output_path.display(),
                    %error,
                    "could not read existing properties file, regenerating"
                );
                return false;
            }
        };

        // The build time differs on every run; blank it on both sides so
        // it does not force a rewrite by itself.
        let build_time_key = keys::prefixed(&self.prefix, keys::BUILD_TIME);
        let mut current = properties.clone();
        let mut persisted = persisted;
        current.put(build_time_key.clone(), "");
        persisted.put(build_time_key, "");

        current == persisted
    }
}

/// Resolve the output file location: an absolute path is used as-is, a
/// relative one is anchored at the project directory.
pub fn output_path(project_dir: &Path, output_file: &Path) -> PathBuf {
    if output_file.is_absolute() {
        output_file.to_path_buf()
    } else {
        project_dir.join(output_file)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
