//! Dataset formatting and training job submission.
//!
//! Unlike prediction, every failure here propagates to the caller as an error.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::proto::image::training::{Data, TrainRequest, TrainResponse};
use crate::transport::{DoFormat, DoTrain, Invoke};

/// Parameters of a training job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainJob {
    /// Job identifier assigned by the caller.
    pub id: String,
    /// Number of training steps.
    pub steps: u64,
    /// Share of the data held out for testing, 0–100.
    pub test_percent: u32,
    /// Number of data shards, at least 1.
    pub shard_count: u32,
}

impl TrainJob {
    #[must_use]
    pub fn new(id: impl Into<String>, steps: u64, test_percent: u32, shard_count: u32) -> Self {
        Self { id: id.into(), steps, test_percent, shard_count }
    }

    pub fn validate(&self) -> Result<()> {
        if self.test_percent > 100 {
            return Err(ClientError::InvalidArgument(format!(
                "test_percent must be 0-100, got {}",
                self.test_percent
            )));
        }
        if self.shard_count == 0 {
            return Err(ClientError::InvalidArgument("shard_count must be >= 1".to_string()));
        }
        if i32::try_from(self.shard_count).is_err() {
            return Err(ClientError::InvalidArgument(format!(
                "shard_count {} does not fit the wire field",
                self.shard_count
            )));
        }
        if i64::try_from(self.steps).is_err() {
            return Err(ClientError::InvalidArgument(format!(
                "steps {} does not fit the wire field",
                self.steps
            )));
        }
        Ok(())
    }

    /// The wire request. Call [`validate`](Self::validate) first.
    fn to_request(&self) -> TrainRequest {
        TrainRequest {
            train_no: self.id.clone(),
            train_step: self.steps as i64,
            train_test_percent: self.test_percent as i32,
            train_shard_num: self.shard_count as i32,
        }
    }
}

/// What the training service reported for a submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainStatus {
    /// Correlation key for the job.
    pub key: String,
    pub message: String,
}

impl From<TrainResponse> for TrainStatus {
    fn from(response: TrainResponse) -> Self {
        Self { key: response.key, message: response.message }
    }
}

/// Sends format and train calls over a shared transport.
pub struct TrainingClient<C = Connection> {
    transport: Arc<C>,
    default_deadline: Duration,
}

impl<C> Clone for TrainingClient<C> {
    fn clone(&self) -> Self {
        Self { transport: Arc::clone(&self.transport), default_deadline: self.default_deadline }
    }
}

impl<C> TrainingClient<C>
where
    C: Invoke<DoFormat> + Invoke<DoTrain>,
{
    /// `default_deadline` applies to calls that do not take their own.
    pub fn new(transport: Arc<C>, default_deadline: Duration) -> Self {
        Self { transport, default_deadline }
    }

    pub fn default_deadline(&self) -> Duration {
        self.default_deadline
    }

    /// Ask the format service to prepare the files of `job_name`; returns its status text.
    pub async fn format_files(&self, job_name: &str) -> Result<String> {
        self.format_files_with_deadline(job_name, self.default_deadline).await
    }

    pub async fn format_files_with_deadline(&self, job_name: &str, deadline: Duration) -> Result<String> {
        info!(job = job_name, "Requesting dataset formatting");

        let request = Data { text: job_name.to_string() };
        let response = Invoke::<DoFormat>::invoke(&*self.transport, request, deadline)
            .await
            .inspect_err(|e| warn!(job = job_name, kind = ?e.kind(), error = %e, "Format call failed"))?;

        info!(job = job_name, status = %response.text, "Format call completed");
        Ok(response.text)
    }

    /// Submit a training job under the default deadline.
    pub async fn train(&self, job: &TrainJob) -> Result<TrainStatus> {
        self.train_with_deadline(job, self.default_deadline).await
    }

    pub async fn train_with_deadline(&self, job: &TrainJob, deadline: Duration) -> Result<TrainStatus> {
        job.validate()?;

        info!(
            job = %job.id,
            steps = job.steps,
            test_percent = job.test_percent,
            shards = job.shard_count,
            "Submitting training job"
        );

        let response = Invoke::<DoTrain>::invoke(&*self.transport, job.to_request(), deadline)
            .await
            .inspect_err(|e| warn!(job = %job.id, kind = ?e.kind(), error = %e, "Train call failed"))?;

        let status = TrainStatus::from(response);
        info!(job = %job.id, key = %status.key, "Training job accepted");
        Ok(status)
    }
}
