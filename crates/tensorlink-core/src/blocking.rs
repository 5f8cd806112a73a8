//! A blocking client for callers without an async runtime.
//!
//! [`Client`] owns a small multi-threaded Tokio runtime and parks the calling
//! thread for the duration of each call. Do not use it from inside an async
//! context; use [`PredictionClient`] and [`TrainingClient`] there instead.

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Runtime;

use crate::config::ClientConfig;
use crate::connection::{Connection, ConnectionState, ShutdownReport};
use crate::error::{ClientError, Result};
use crate::prediction::{PredictCall, PredictOutcome, PredictionClient};
use crate::training::{TrainJob, TrainStatus, TrainingClient};

/// One connection serving prediction, format and train calls synchronously.
pub struct Client {
    connection: Arc<Connection>,
    prediction: PredictionClient,
    training: TrainingClient,
    // Dropped last so the channel is released while its runtime still exists
    runtime: Runtime,
}

impl Client {
    /// Start the runtime and open the connection. Does not contact the server.
    pub fn connect(config: ClientConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("tensorlink-io")
            .enable_all()
            .build()
            .map_err(|e| ClientError::Runtime(e.to_string()))?;

        let default_deadline = config.default_deadline();
        let connection = {
            let _guard = runtime.enter();
            Arc::new(Connection::open(config)?)
        };

        Ok(Self {
            prediction: PredictionClient::new(Arc::clone(&connection)),
            training: TrainingClient::new(Arc::clone(&connection), default_deadline),
            connection,
            runtime,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// See [`PredictionClient::predict`]. Async streams are not accepted here;
    /// use [`predict_reader`](Self::predict_reader) for `std::io::Read` sources.
    pub fn predict(&self, call: PredictCall<'_>) -> Result<PredictOutcome> {
        self.runtime.block_on(self.prediction.predict(call))
    }

    /// Predict from a synchronous reader, read to the end on the calling thread.
    ///
    /// A reader passed by value is dropped after reading; pass `&mut reader` to keep it.
    pub fn predict_reader<R: Read>(&self, call: PredictCall<'_>, mut reader: R) -> Result<PredictOutcome> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        drop(reader);
        self.predict(call.bytes(buf))
    }

    pub fn format_files(&self, job_name: &str) -> Result<String> {
        self.runtime.block_on(self.training.format_files(job_name))
    }

    pub fn train(&self, job: &TrainJob) -> Result<TrainStatus> {
        self.runtime.block_on(self.training.train(job))
    }

    pub fn train_with_deadline(&self, job: &TrainJob, deadline: Duration) -> Result<TrainStatus> {
        self.runtime.block_on(self.training.train_with_deadline(job, deadline))
    }

    /// See [`Connection::shutdown`].
    pub fn shutdown(&self, timeout: Duration) -> ShutdownReport {
        self.runtime.block_on(self.connection.shutdown(timeout))
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }
}
