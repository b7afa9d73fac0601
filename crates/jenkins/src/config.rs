use std::time::Duration;

/// Connection settings for the Jenkins executor.
#[derive(Debug, Clone)]
pub struct JenkinsConfig {
    /// Base URL, e.g. `https://ci.example.com`. No trailing slash.
    pub base_url: String,
    pub user: String,
    /// API token used as the basic-auth password.
    pub token: String,
    pub timeout: Duration,
}

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

impl JenkinsConfig {
    pub fn new(base_url: impl Into<String>, user: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user: user.into(),
            token: token.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Load from environment variables.
    ///
    /// | Env var                | Default |
    /// |------------------------|---------|
    /// | `JENKINS_URL`          | required |
    /// | `JENKINS_USER`         | `""`    |
    /// | `JENKINS_TOKEN`        | `""`    |
    /// | `JENKINS_TIMEOUT_SECS` | `10`    |
    ///
    /// Panics if `JENKINS_URL` is missing or the timeout is not a number.
    pub fn from_env() -> Self {
        let base_url = std::env::var("JENKINS_URL").expect("JENKINS_URL must be set");
        let user = std::env::var("JENKINS_USER").unwrap_or_default();
        let token = std::env::var("JENKINS_TOKEN").unwrap_or_default();
        let timeout_secs: u64 = std::env::var("JENKINS_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_TIMEOUT_SECS.to_string())
            .parse()
            .expect("JENKINS_TIMEOUT_SECS must be a valid u64");

        let mut config = Self::new(base_url, user, token);
        config.timeout = Duration::from_secs(timeout_secs);
        config
    }

    pub fn has_credentials(&self) -> bool {
        !self.user.is_empty() && !self.token.is_empty()
    }
}
