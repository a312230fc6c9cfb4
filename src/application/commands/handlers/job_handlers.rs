//! Job Command Handlers

use std::sync::Arc;

use crate::application::commands::{CancelJob, SubmitJob};
use crate::application::error::ApplicationError;
use crate::application::scheduler::JobManager;
use crate::domain::job::Job;

// ============================================================================
// SubmitJob
// ============================================================================

/// SubmitJob Handler
pub struct SubmitJobHandler {
    manager: Arc<JobManager>,
}

impl SubmitJobHandler {
    pub fn new(manager: Arc<JobManager>) -> Self {
        Self { manager }
    }

    pub async fn handle(&self, command: SubmitJob) -> Result<Job, ApplicationError> {
        self.manager.submit(command.into_request()).await
    }
}

// ============================================================================
// CancelJob
// ============================================================================

/// CancelJob Handler
///
/// 幂等：已终结的任务原样返回
pub struct CancelJobHandler {
    manager: Arc<JobManager>,
}

impl CancelJobHandler {
    pub fn new(manager: Arc<JobManager>) -> Self {
        Self { manager }
    }

    pub async fn handle(&self, command: CancelJob) -> Result<Job, ApplicationError> {
        self.manager
            .cancel_job(&command.job_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Job", command.job_id))
    }
}
