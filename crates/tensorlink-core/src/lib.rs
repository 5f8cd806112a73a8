//! Tensorlink Core - deadline-bound gRPC client for image prediction and training.
//!
//! This crate provides:
//! - A [`Connection`] to one service address with a bounded graceful shutdown
//! - Tensor encoding for binary image payloads ([`tensor`])
//! - A [`PredictionClient`] for TensorFlow-Serving style `Predict` calls
//! - A [`TrainingClient`] for dataset formatting and training job submission
//! - A [`blocking::Client`] for callers without an async runtime
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use tensorlink_core::{ClientConfig, Connection, PredictCall, PredictOutcome, PredictionClient};
//!
//! #[tokio::main]
//! async fn main() -> tensorlink_core::Result<()> {
//!     let connection = Arc::new(Connection::open(ClientConfig::new("127.0.0.1", 8500))?);
//!     let client = PredictionClient::new(Arc::clone(&connection));
//!
//!     let call = PredictCall::new("inception", "predict_images")
//!         .path("/data/images/1.jpg")
//!         .deadline(Duration::from_secs(5));
//!     if let PredictOutcome::Success(outputs) = client.predict(call).await? {
//!         for (name, tensor) in &outputs {
//!             println!("{name}: {tensor}");
//!         }
//!     }
//!
//!     connection.shutdown(Duration::from_secs(5)).await;
//!     Ok(())
//! }
//! ```

pub mod blocking;
pub mod config;
pub mod connection;
pub mod error;
pub mod logging;
pub mod prediction;
pub mod tensor;
pub mod training;
pub mod transport;

/// Generated protobuf code for the prediction and training services.
#[allow(clippy::similar_names)]
#[allow(clippy::doc_markdown)]
#[allow(clippy::derive_partial_eq_without_eq)]
#[allow(clippy::large_enum_variant)]
pub mod proto {
    pub mod tensorflow {
        tonic::include_proto!("tensorflow");

        pub mod serving {
            tonic::include_proto!("tensorflow.serving");
        }
    }

    pub mod image {
        pub mod training {
            tonic::include_proto!("image.training");
        }
    }
}

pub use config::{ClientConfig, DEFAULT_DEADLINE, DEFAULT_MAX_MESSAGE_SIZE, SecurityMode};
pub use connection::{Connection, ConnectionState, ShutdownReport};
pub use error::{ClientError, FailureKind, Result};
pub use prediction::{DEFAULT_INPUT_NAME, InputSource, PredictCall, PredictOutcome, PredictionClient};
pub use tensor::{DType, Shape, Tensor, TensorValues, decode_outputs, encode_binary};
pub use training::{TrainJob, TrainStatus, TrainingClient};
pub use transport::{DoFormat, DoTrain, Invoke, Predict, ServiceMethod};
