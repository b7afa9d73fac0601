//! REST client for the Jenkins remote-access API.
//!
//! Triggering a parameterized job returns a queue item, not a build. The
//! queue item gains an `executable` once an executor picks it up, and the
//! build record then carries `building` and, when done, a `result`.

use serde::Deserialize;

use crate::config::JenkinsConfig;

/// HTTP client for one Jenkins controller.
pub struct JenkinsApi {
    client: reqwest::Client,
    config: JenkinsConfig,
}

/// Response of `GET /queue/item/{id}/api/json`.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueItem {
    pub id: i64,
    #[serde(default)]
    pub cancelled: bool,
    /// Present once the item left the queue and a build started.
    #[serde(default)]
    pub executable: Option<Executable>,
    /// Human-readable reason the item is still waiting.
    #[serde(default)]
    pub why: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Executable {
    pub number: i64,
    #[serde(default)]
    pub url: Option<String>,
}

/// Response of `GET /job/{name}/{number}/api/json`.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildInfo {
    pub number: i64,
    #[serde(default)]
    pub building: bool,
    /// `SUCCESS`, `FAILURE`, `UNSTABLE`, `ABORTED`, `NOT_BUILT`; null while running.
    #[serde(default)]
    pub result: Option<String>,
}

/// Errors from the Jenkins REST layer.
#[derive(Debug, thiserror::Error)]
pub enum JenkinsApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Jenkins returned a non-2xx status code.
    #[error("Jenkins API error ({status}): {body}")]
    ApiError { status: u16, body: String },

    /// A trigger succeeded but the queue location could not be read.
    #[error("Missing or malformed queue location: {0}")]
    MissingQueueLocation(String),
}

impl JenkinsApi {
    /// Build a client with the configured timeout.
    pub fn new(config: JenkinsConfig) -> Result<Self, JenkinsApiError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Queue a build of `job` with `params`.
    ///
    /// Sends `POST /job/{job}/buildWithParameters` and returns the queue
    /// item id parsed from the `Location` header.
    pub async fn build_with_parameters<'a, I>(
        &self,
        job: &str,
        params: I,
    ) -> Result<i64, JenkinsApiError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let query: Vec<(&str, &str)> = params.into_iter().collect();
        let url = format!("{}/buildWithParameters", self.job_url(job));

        let response = self
            .authorized(self.client.post(url))
            .query(&query)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;

        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        parse_queue_id(&location).ok_or(JenkinsApiError::MissingQueueLocation(location))
    }

    pub async fn queue_item(&self, queue_id: i64) -> Result<QueueItem, JenkinsApiError> {
        let url = format!("{}/queue/item/{queue_id}/api/json", self.config.base_url);
        let response = self.authorized(self.client.get(url)).send().await?;
        Self::parse_response(response).await
    }

    pub async fn build_info(&self, job: &str, number: i64) -> Result<BuildInfo, JenkinsApiError> {
        let url = format!("{}/{number}/api/json", self.job_url(job));
        let response = self.authorized(self.client.get(url)).send().await?;
        Self::parse_response(response).await
    }

    // ---- private helpers ----

    /// `a/b` becomes `{base}/job/a/job/b`.
    fn job_url(&self, job: &str) -> String {
        let path: String = job
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|segment| format!("/job/{segment}"))
            .collect();
        format!("{}{path}", self.config.base_url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.config.has_credentials() {
            request.basic_auth(&self.config.user, Some(&self.config.token))
        } else {
            request
        }
    }

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, JenkinsApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(JenkinsApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, JenkinsApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

/// Extract the queue id from `.../queue/item/{id}/`.
fn parse_queue_id(location: &str) -> Option<i64> {
    let rest = location.split("/queue/item/").nth(1)?;
    rest.trim_end_matches('/').split('/').next()?.parse().ok()
}
