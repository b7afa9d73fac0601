//! Bounded in-process record of accepted lifecycle jobs.
//!
//! Every request answered with a job id gets a record here, so a caller can
//! learn that a deploy failed even though no deployment was persisted for
//! it. The oldest records are evicted once `capacity` is exceeded.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use chalops_core::error::CoreError;
use chalops_core::pipeline::JobKind;
use chalops_core::types::Timestamp;
use serde::Serialize;

/// Progress of an accepted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub job_id: String,
    pub kind: JobKind,
    pub user_id: String,
    pub deployment_id: Option<String>,
    pub status: JobStatus,
    /// Caller-safe failure description.
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

pub struct JobLedger {
    capacity: usize,
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    records: HashMap<String, JobRecord>,
    order: VecDeque<String>,
}

impl JobLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Record a newly accepted job in the `pending` state.
    pub fn open(
        &self,
        job_id: &str,
        kind: JobKind,
        user_id: &str,
        deployment_id: Option<&str>,
    ) -> JobRecord {
        let now = chrono::Utc::now();
        let record = JobRecord {
            job_id: job_id.to_string(),
            kind,
            user_id: user_id.to_string(),
            deployment_id: deployment_id.map(str::to_string),
            status: JobStatus::Pending,
            error: None,
            created_at: now,
            updated_at: now,
        };
        let Ok(mut inner) = self.inner.write() else {
            tracing::error!(job_id, "Job ledger lock poisoned, record dropped");
            return record;
        };
        if inner.records.insert(job_id.to_string(), record.clone()).is_none() {
            inner.order.push_back(job_id.to_string());
        }
        while inner.order.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.records.remove(&evicted);
            }
        }
        record
    }

    pub fn succeed(&self, job_id: &str, deployment_id: Option<&str>) {
        self.finish(job_id, JobStatus::Succeeded, None, deployment_id);
    }

    pub fn fail(&self, job_id: &str, error: &CoreError) {
        self.finish(job_id, JobStatus::Failed, Some(public_message(error)), None);
    }

    pub fn get(&self, job_id: &str) -> Option<JobRecord> {
        self.inner
            .read()
            .ok()
            .and_then(|inner| inner.records.get(job_id).cloned())
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn finish(
        &self,
        job_id: &str,
        status: JobStatus,
        error: Option<String>,
        deployment_id: Option<&str>,
    ) {
        let Ok(mut inner) = self.inner.write() else {
            tracing::error!(job_id, "Job ledger lock poisoned, outcome dropped");
            return;
        };
        if let Some(record) = inner.records.get_mut(job_id) {
            record.status = status;
            record.error = error;
            if let Some(id) = deployment_id {
                record.deployment_id = Some(id.to_string());
            }
            record.updated_at = chrono::Utc::now();
        }
    }
}

/// Message safe to show the caller. Executor and store failures are
/// reported generically; the detail is in the logs.
pub fn public_message(error: &CoreError) -> String {
    match error {
        CoreError::Dispatch(_) => "The external executor could not run the job".to_string(),
        CoreError::Persistence(_) | CoreError::Internal(_) => {
            "An internal error occurred".to_string()
        }
        other => other.to_string(),
    }
}
