//! Loading build-server metadata into a property set.

use chrono::{DateTime, Local, Utc};
use tracing::info;

use gitstamp_props::filter::PropertyFilter;
use gitstamp_props::keys;
use gitstamp_props::set::PropertySet;

use crate::env::EnvSnapshot;
use crate::server::BuildServer;

/// Default build-time format, ISO-8601 with a numeric offset.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Collects build time, host, and build-server numbers into a property
/// set, honoring a property filter and a configurable key prefix.
///
/// Properties already present in the target set are kept as-is, so a
/// caller can seed values (e.g. from an earlier pipeline stage) without
/// having them recomputed.
#[derive(Debug, Clone)]
pub struct BuildDataLoader {
    env: EnvSnapshot,
    server: Option<BuildServer>,
    prefix: String,
    date_format: String,
    build_timestamp: Option<DateTime<Utc>>,
    filter: PropertyFilter,
}

impl BuildDataLoader {
    /// Create a loader over an environment snapshot, detecting the build
    /// server from it.
    pub fn new(env: EnvSnapshot) -> Self {
        let server = BuildServer::detect(&env);
        Self {
            env,
            server,
            prefix: String::new(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            build_timestamp: None,
            filter: PropertyFilter::allow_all(),
        }
    }

    /// Set the dotted property prefix (e.g. `"git"`).
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the chrono format string used for the build time.
    pub fn with_date_format(mut self, date_format: impl Into<String>) -> Self {
        self.date_format = date_format.into();
        self
    }

    /// Pin the build time to a fixed instant for reproducible builds.
    pub fn with_build_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.build_timestamp = Some(timestamp);
        self
    }

    /// Restrict which properties are loaded.
    pub fn with_filter(mut self, filter: PropertyFilter) -> Self {
        self.filter = filter;
        self
    }

    /// The detected build server, if any.
    pub fn server(&self) -> Option<BuildServer> {
        self.server
    }

    /// The branch name the detected build server reports, if any.
    ///
    /// On CI the checkout is frequently a detached HEAD, so the server's
    /// own branch convention is more reliable than asking git.
    pub fn build_branch(&self) -> Option<String> {
        self.server.and_then(|server| server.build_branch(&self.env))
    }

    /// Load build time, build host, and build-server numbers into
    /// `properties`.
    pub fn load_build_data(&self, properties: &mut PropertySet) {
        self.maybe_put(properties, keys::BUILD_TIME, || Some(self.formatted_build_time()));
        self.maybe_put(properties, keys::BUILD_HOST, || self.build_host());

        if let Some(server) = self.server {
            self.maybe_put(properties, keys::BUILD_NUMBER, || {
                server.build_number(&self.env)
            });
            if let Some(unique) = server.unique_build_number(&self.env) {
                self.maybe_put(properties, keys::BUILD_NUMBER_UNIQUE, || Some(unique.clone()));
            }
        }
    }

    /// Store a property unless it is already present or filtered out. A
    /// supplier returning nothing records the placeholder value so the
    /// generated file keeps a stable shape.
    fn maybe_put<F>(&self, properties: &mut PropertySet, key: &str, supplier: F)
    where
        F: FnOnce() -> Option<String>,
    {
        let prefixed_key = keys::prefixed(&self.prefix, key);
        if properties.contains_key(&prefixed_key) {
            info!(key = %prefixed_key, "using cached property value");
            return;
        }
        if !self.filter.is_included(&prefixed_key) {
            return;
        }
        properties.put_or_unknown(prefixed_key, supplier().as_deref());
    }

    fn formatted_build_time(&self) -> String {
        match self.build_timestamp {
            Some(timestamp) => timestamp.format(&self.date_format).to_string(),
            None => Local::now().format(&self.date_format).to_string(),
        }
    }

    fn build_host(&self) -> Option<String> {
        self.env
            .get_non_empty("HOSTNAME")
            .or_else(|| self.env.get_non_empty("COMPUTERNAME"))
            .map(str::to_string)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use gitstamp_props::set::UNKNOWN_VALUE;
    use pretty_assertions::assert_eq;

    fn github_env() -> EnvSnapshot {
        EnvSnapshot::from([
            ("GITHUB_ACTIONS", "true"),
            ("GITHUB_REF", "refs/heads/main"),
            ("GITHUB_RUN_NUMBER", "42"),
            ("HOSTNAME", "runner-1"),
        ])
    }

    fn fixed_timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_loads_build_data_with_prefix() {
        let loader = BuildDataLoader::new(github_env())
            .with_prefix("git")
            .with_build_timestamp(fixed_timestamp());

        let mut props = PropertySet::new();
        loader.load_build_data(&mut props);

        assert_eq!(props.get("git.build.time"), Some("2026-08-07T12:00:00+0000"));
        assert_eq!(props.get("git.build.host"), Some("runner-1"));
        assert_eq!(props.get("git.build.number"), Some("42"));
        assert_eq!(props.get("git.build.number.unique"), None);
        assert_eq!(loader.build_branch(), Some("main".to_string()));
    }

    #[test]
    fn test_cached_properties_are_not_overwritten() {
        let loader = BuildDataLoader::new(github_env())
            .with_prefix("git")
            .with_build_timestamp(fixed_timestamp());

        let mut props = PropertySet::new();
        props.put("git.build.number", "seeded");
        loader.load_build_data(&mut props);

        assert_eq!(props.get("git.build.number"), Some("seeded"));
    }

    #[test]
    fn test_filter_excludes_properties() {
        let filter = PropertyFilter::new::<&str>(&[], &[r"^git\.build\.host$"]).unwrap();
        let loader = BuildDataLoader::new(github_env())
            .with_prefix("git")
            .with_build_timestamp(fixed_timestamp())
            .with_filter(filter);

        let mut props = PropertySet::new();
        loader.load_build_data(&mut props);

        assert_eq!(props.get("git.build.host"), None);
        assert_eq!(props.get("git.build.number"), Some("42"));
    }

    #[test]
    fn test_missing_host_records_placeholder() {
        let env = EnvSnapshot::from([("GITLAB_CI", "true"), ("CI_PIPELINE_ID", "1234")]);
        let loader = BuildDataLoader::new(env).with_build_timestamp(fixed_timestamp());

        let mut props = PropertySet::new();
        loader.load_build_data(&mut props);

        assert_eq!(props.get("build.host"), Some(UNKNOWN_VALUE));
        assert_eq!(props.get("build.number"), Some("1234"));
    }

    #[test]
    fn test_no_server_loads_no_build_number() {
        let env = EnvSnapshot::from([("HOSTNAME", "dev-box")]);
        let loader = BuildDataLoader::new(env).with_build_timestamp(fixed_timestamp());

        let mut props = PropertySet::new();
        loader.load_build_data(&mut props);

        assert_eq!(props.get("build.number"), None);
        assert_eq!(props.get("build.host"), Some("dev-box"));
        assert_eq!(loader.build_branch(), None);
    }

    #[test]
    fn test_unique_build_number_when_server_provides_one() {
        let env = EnvSnapshot::from([
            ("GITLAB_CI", "true"),
            ("CI_PIPELINE_ID", "1234"),
            ("CI_JOB_ID", "98765"),
        ]);
        let loader = BuildDataLoader::new(env).with_build_timestamp(fixed_timestamp());

        let mut props = PropertySet::new();
        loader.load_build_data(&mut props);

        assert_eq!(props.get("build.number.unique"), Some("98765"));
    }
}
