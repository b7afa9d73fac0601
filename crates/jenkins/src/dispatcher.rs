//! [`JobDispatcher`] backed by Jenkins.
//!
//! Job handles have the form `{job}#{queue_id}` so a later state query knows
//! both which job to look at and which queue item it started as.

use async_trait::async_trait;
use chalops_core::pipeline::JobParameters;
use chalops_core::ports::{DispatchError, ExternalJobState, JobDispatcher, JobHandle};

use crate::api::{JenkinsApi, JenkinsApiError};
use crate::config::JenkinsConfig;

pub struct JenkinsDispatcher {
    api: JenkinsApi,
}

impl JenkinsDispatcher {
    pub fn new(config: JenkinsConfig) -> Result<Self, DispatchError> {
        let api = JenkinsApi::new(config).map_err(DispatchError::from)?;
        Ok(Self { api })
    }

    pub fn from_api(api: JenkinsApi) -> Self {
        Self { api }
    }
}

/// Format a handle for `job` queued as `queue_id`.
pub fn format_handle(job: &str, queue_id: i64) -> JobHandle {
    JobHandle::new(format!("{job}#{queue_id}"))
}

/// Split a handle into job name and queue id.
pub fn parse_handle(handle: &JobHandle) -> Option<(&str, i64)> {
    let (job, id) = handle.as_str().rsplit_once('#')?;
    if job.is_empty() {
        return None;
    }
    Some((job, id.parse().ok()?))
}

impl From<JenkinsApiError> for DispatchError {
    fn from(err: JenkinsApiError) -> Self {
        match err {
            JenkinsApiError::ApiError { status, body } => DispatchError::Rejected { status, body },
            other => DispatchError::Transport(other.to_string()),
        }
    }
}

#[async_trait]
impl JobDispatcher for JenkinsDispatcher {
    async fn trigger_pipeline(
        &self,
        pipeline: &str,
        params: &JobParameters,
    ) -> Result<JobHandle, DispatchError> {
        let queue_id = self
            .api
            .build_with_parameters(pipeline, params.iter())
            .await
            .map_err(|e| {
                tracing::error!(pipeline, error = %e, "Jenkins trigger failed");
                DispatchError::from(e)
            })?;
        let handle = format_handle(pipeline, queue_id);
        tracing::info!(pipeline, queue_id, handle = %handle, "Jenkins job queued");
        Ok(handle)
    }

    async fn job_state(&self, handle: &JobHandle) -> Result<ExternalJobState, DispatchError> {
        let (job, queue_id) =
            parse_handle(handle).ok_or_else(|| DispatchError::UnknownJob(handle.to_string()))?;

        let item = match self.api.queue_item(queue_id).await {
            Ok(item) => item,
            Err(JenkinsApiError::ApiError { status: 404, .. }) => {
                return Err(DispatchError::UnknownJob(handle.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if item.cancelled {
            return Ok(ExternalJobState::Aborted);
        }
        let Some(executable) = item.executable else {
            return Ok(ExternalJobState::Queued);
        };

        let build = self.api.build_info(job, executable.number).await?;
        if build.building {
            return Ok(ExternalJobState::Running);
        }
        Ok(build
            .result
            .as_deref()
            .and_then(ExternalJobState::parse)
            .unwrap_or(ExternalJobState::Running))
    }
}
