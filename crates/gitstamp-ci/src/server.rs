//! Known CI build servers and their environment conventions.

use std::fmt;

use tracing::debug;

use crate::env::EnvSnapshot;

/// Prefix of a branch ref as reported in `refs/...` form.
pub const BRANCH_REF_PREFIX: &str = "refs/heads/";
/// Prefix of a pull-request ref.
pub const PULL_REQUEST_REF_PREFIX: &str = "refs/pull/";
/// Prefix of a tag ref.
pub const TAG_REF_PREFIX: &str = "refs/tags/";

/// A hosted CI system gitstamp knows how to read build metadata from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildServer {
    AwsCodeBuild,
    AzureDevOps,
    Bamboo,
    Bitbucket,
    CircleCi,
    GitHubActions,
    GitLab,
    Jenkins,
    TeamCity,
    Travis,
}

/// Detection precedence. Some servers run on top of others (a Jenkins
/// agent may export generic `BUILD_NUMBER`, Bamboo agents often run under
/// other orchestrators), so the more specific markers are checked first.
const DETECTION_ORDER: [BuildServer; 10] = [
    BuildServer::Bamboo,
    BuildServer::GitLab,
    BuildServer::Jenkins,
    BuildServer::TeamCity,
    BuildServer::Travis,
    BuildServer::AzureDevOps,
    BuildServer::CircleCi,
    BuildServer::GitHubActions,
    BuildServer::AwsCodeBuild,
    BuildServer::Bitbucket,
];

impl BuildServer {
    /// Identify the build server the given environment belongs to, if any.
    pub fn detect(env: &EnvSnapshot) -> Option<BuildServer> {
        let server = DETECTION_ORDER
            .into_iter()
            .find(|server| server.is_active(env));
        if let Some(server) = server {
            debug!(%server, "detected CI build server");
        }
        server
    }

    /// Whether the environment carries this server's marker variables.
    ///
    /// Pure: only the snapshot is consulted.
    pub fn is_active(self, env: &EnvSnapshot) -> bool {
        match self {
            BuildServer::AwsCodeBuild => env.contains("CODEBUILD_BUILD_ID"),
            BuildServer::AzureDevOps => {
                env.contains("AZURE_HTTP_USER_AGENT") || env.contains("TF_BUILD")
            }
            BuildServer::Bamboo => {
                env.contains("bamboo_buildKey")
                    || env.contains("bamboo.buildKey")
                    || env.contains("BAMBOO_BUILDKEY")
            }
            BuildServer::Bitbucket => env.contains("BITBUCKET_BUILD_NUMBER"),
            BuildServer::CircleCi => env.contains("CIRCLECI"),
            BuildServer::GitHubActions => env.contains("GITHUB_ACTIONS"),
            BuildServer::GitLab => env.contains("GITLAB_CI"),
            BuildServer::Jenkins => {
                env.contains("JENKINS_URL")
                    || env.contains("JENKINS_HOME")
                    || env.contains("HUDSON_URL")
                    || env.contains("HUDSON_HOME")
            }
            BuildServer::TeamCity => env.contains("TEAMCITY_VERSION"),
            BuildServer::Travis => env.contains("TRAVIS"),
        }
    }

    /// The project-specific build number, per this server's convention.
    pub fn build_number(self, env: &EnvSnapshot) -> Option<String> {
        let number = match self {
            BuildServer::AwsCodeBuild => env.get("CODEBUILD_BUILD_NUMBER"),
            BuildServer::AzureDevOps => env.get("BUILD_BUILDNUMBER"),
            BuildServer::Bamboo => env
                .get("bamboo.buildNumber")
                .or_else(|| env.get("BAMBOO_BUILDNUMBER"))
                .or_else(|| env.get("bamboo_buildNumber")),
            BuildServer::Bitbucket => env.get("BITBUCKET_BUILD_NUMBER"),
            BuildServer::CircleCi => env.get("CIRCLE_BUILD_NUM"),
            BuildServer::GitHubActions => env.get("GITHUB_RUN_NUMBER"),
            BuildServer::GitLab => env.get("CI_PIPELINE_ID"),
            BuildServer::Jenkins | BuildServer::TeamCity => env.get("BUILD_NUMBER"),
            BuildServer::Travis => env.get("TRAVIS_BUILD_NUMBER"),
        };
        number.map(str::to_string)
    }

    /// The server-wide unique build number, where the server exposes one.
    pub fn unique_build_number(self, env: &EnvSnapshot) -> Option<String> {
        let number = match self {
            BuildServer::GitLab => env.get("CI_JOB_ID"),
            BuildServer::Travis => env.get("TRAVIS_BUILD_ID"),
            _ => None,
        };
        number.map(str::to_string)
    }

    /// The branch name the server reports for this build, if any.
    ///
    /// Servers that report a full ref (`refs/heads/...`) have the prefix
    /// stripped; pull-request and tag refs follow each server's own
    /// convention. TeamCity only exposes the branch through its build
    /// properties file, not the environment, and always yields `None`.
    pub fn build_branch(self, env: &EnvSnapshot) -> Option<String> {
        let branch = match self {
            BuildServer::AwsCodeBuild => env
                .get_non_empty("CODEBUILD_WEBHOOK_HEAD_REF")
                .map(|r| strip_ref_prefix(r)),
            BuildServer::AzureDevOps => {
                env.get_non_empty("BUILD_SOURCEBRANCH").and_then(|source| {
                    for prefix in [BRANCH_REF_PREFIX, PULL_REQUEST_REF_PREFIX, TAG_REF_PREFIX] {
                        if let Some(branch) = source.strip_prefix(prefix) {
                            debug!(source, branch, "using Azure DevOps branch name");
                            return Some(branch);
                        }
                    }
                    None
                })
            }
            BuildServer::Bamboo => [
                "bamboo.planRepository.branchName",
                "bamboo.planRepository.<position>.branchName",
                "BAMBOO_PLANREPOSITORY_BRANCH",
            ]
            .into_iter()
            .find_map(|key| env.get(key)),
            BuildServer::Bitbucket => env.get("BITBUCKET_BRANCH"),
            BuildServer::CircleCi => env.get("CIRCLE_BRANCH"),
            BuildServer::GitHubActions => {
                let github_ref = env.get_non_empty("GITHUB_REF")?;
                if let Some(branch) = github_ref.strip_prefix(BRANCH_REF_PREFIX) {
                    debug!(github_ref, branch, "using GitHub Actions branch name");
                    Some(branch)
                } else if github_ref.starts_with(PULL_REQUEST_REF_PREFIX) {
                    env.get("GITHUB_HEAD_REF")
                } else {
                    None
                }
            }
            BuildServer::GitLab => env.get("CI_COMMIT_REF_NAME"),
            BuildServer::Jenkins => env
                .get_non_empty("GIT_LOCAL_BRANCH")
                .or_else(|| env.get("GIT_BRANCH")),
            BuildServer::TeamCity => None,
            BuildServer::Travis => env.get("TRAVIS_BRANCH"),
        };
        branch.map(str::to_string)
    }
}

impl fmt::Display for BuildServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildServer::AwsCodeBuild => "AWS CodeBuild",
            BuildServer::AzureDevOps => "Azure DevOps",
            BuildServer::Bamboo => "Bamboo",
            BuildServer::Bitbucket => "Bitbucket Pipelines",
            BuildServer::CircleCi => "CircleCI",
            BuildServer::GitHubActions => "GitHub Actions",
            BuildServer::GitLab => "GitLab CI",
            BuildServer::Jenkins => "Hudson/Jenkins",
            BuildServer::TeamCity => "TeamCity",
            BuildServer::Travis => "Travis CI",
        };
        f.write_str(name)
    }
}

fn strip_ref_prefix(full_ref: &str) -> &str {
    full_ref
        .strip_prefix(BRANCH_REF_PREFIX)
        .unwrap_or(full_ref)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_detects_each_server_from_its_marker() {
        let cases = [
            ("CODEBUILD_BUILD_ID", BuildServer::AwsCodeBuild),
            ("TF_BUILD", BuildServer::AzureDevOps),
            ("bamboo_buildKey", BuildServer::Bamboo),
            ("BITBUCKET_BUILD_NUMBER", BuildServer::Bitbucket),
            ("CIRCLECI", BuildServer::CircleCi),
            ("GITHUB_ACTIONS", BuildServer::GitHubActions),
            ("GITLAB_CI", BuildServer::GitLab),
            ("JENKINS_URL", BuildServer::Jenkins),
            ("TEAMCITY_VERSION", BuildServer::TeamCity),
            ("TRAVIS", BuildServer::Travis),
        ];
        for (marker, expected) in cases {
            let env = EnvSnapshot::from([(marker, "x")]);
            assert_eq!(BuildServer::detect(&env), Some(expected), "marker {marker}");
        }
    }

    #[test]
    fn test_detection_precedence() {
        // Bamboo agents can run inside other CI containers; the more
        // specific marker wins.
        let env = EnvSnapshot::from([("bamboo_buildKey", "K"), ("GITHUB_ACTIONS", "true")]);
        assert_eq!(BuildServer::detect(&env), Some(BuildServer::Bamboo));
    }

    #[test]
    fn test_nothing_detected_on_plain_environment() {
        let env = EnvSnapshot::from([("PATH", "/usr/bin"), ("HOME", "/home/u")]);
        assert_eq!(BuildServer::detect(&env), None);
    }

    #[test]
    fn test_github_branch_ref() {
        let env = EnvSnapshot::from([("GITHUB_REF", "refs/heads/main")]);
        assert_eq!(
            BuildServer::GitHubActions.build_branch(&env),
            Some("main".to_string())
        );
    }

    #[test]
    fn test_github_pull_request_uses_head_ref() {
        let env = EnvSnapshot::from([
            ("GITHUB_REF", "refs/pull/7/merge"),
            ("GITHUB_HEAD_REF", "feature/props"),
        ]);
        assert_eq!(
            BuildServer::GitHubActions.build_branch(&env),
            Some("feature/props".to_string())
        );
    }

    #[test]
    fn test_azure_strips_branch_and_tag_refs() {
        let env = EnvSnapshot::from([("BUILD_SOURCEBRANCH", "refs/heads/main")]);
        assert_eq!(
            BuildServer::AzureDevOps.build_branch(&env),
            Some("main".to_string())
        );

        let env = EnvSnapshot::from([("BUILD_SOURCEBRANCH", "refs/tags/v1.2.3")]);
        assert_eq!(
            BuildServer::AzureDevOps.build_branch(&env),
            Some("v1.2.3".to_string())
        );

        // TFVC-style refs have no recognized prefix.
        let env = EnvSnapshot::from([("BUILD_SOURCEBRANCH", "$/teamproject/main")]);
        assert_eq!(BuildServer::AzureDevOps.build_branch(&env), None);
    }

    #[test]
    fn test_jenkins_prefers_local_branch() {
        let env = EnvSnapshot::from([
            ("GIT_LOCAL_BRANCH", "main"),
            ("GIT_BRANCH", "origin/main"),
        ]);
        assert_eq!(
            BuildServer::Jenkins.build_branch(&env),
            Some("main".to_string())
        );

        let env = EnvSnapshot::from([("GIT_LOCAL_BRANCH", ""), ("GIT_BRANCH", "origin/main")]);
        assert_eq!(
            BuildServer::Jenkins.build_branch(&env),
            Some("origin/main".to_string())
        );
    }

    #[test]
    fn test_bamboo_branch_key_fallbacks() {
        let env = EnvSnapshot::from([("BAMBOO_PLANREPOSITORY_BRANCH", "develop")]);
        assert_eq!(
            BuildServer::Bamboo.build_branch(&env),
            Some("develop".to_string())
        );
    }

    #[test]
    fn test_build_numbers() {
        let env = EnvSnapshot::from([
            ("TRAVIS_BUILD_NUMBER", "88"),
            ("TRAVIS_BUILD_ID", "123456"),
        ]);
        assert_eq!(BuildServer::Travis.build_number(&env), Some("88".to_string()));
        assert_eq!(
            BuildServer::Travis.unique_build_number(&env),
            Some("123456".to_string())
        );

        let env = EnvSnapshot::from([("GITHUB_RUN_NUMBER", "42")]);
        assert_eq!(
            BuildServer::GitHubActions.build_number(&env),
            Some("42".to_string())
        );
        assert_eq!(BuildServer::GitHubActions.unique_build_number(&env), None);
    }
}
