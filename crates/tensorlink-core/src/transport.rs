//! The capability seam between the clients and the network.
//!
//! Each remote method is a zero-sized marker implementing [`ServiceMethod`]. A
//! transport advertises the methods it can carry by implementing [`Invoke`] for
//! them; [`Connection`](crate::Connection) carries all three, and tests substitute
//! in-memory doubles without touching client logic.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::proto::image::training::{Data, TrainRequest, TrainResponse};
use crate::proto::tensorflow::serving::{PredictRequest, PredictResponse};

/// A unary remote method: its request and response types and wire path.
pub trait ServiceMethod: Send + Sync + 'static {
    type Request: Send + 'static;
    type Response: Send + 'static;

    /// Fully qualified gRPC path, used in logs.
    const PATH: &'static str;
}

/// `PredictionService/Predict`
#[derive(Debug, Clone, Copy)]
pub struct Predict;

impl ServiceMethod for Predict {
    type Request = PredictRequest;
    type Response = PredictResponse;
    const PATH: &'static str = "/tensorflow.serving.PredictionService/Predict";
}

/// `FormatData/DoFormat`
#[derive(Debug, Clone, Copy)]
pub struct DoFormat;

impl ServiceMethod for DoFormat {
    type Request = Data;
    type Response = Data;
    const PATH: &'static str = "/image.training.FormatData/DoFormat";
}

/// `TrainService/DoTrain`
#[derive(Debug, Clone, Copy)]
pub struct DoTrain;

impl ServiceMethod for DoTrain {
    type Request = TrainRequest;
    type Response = TrainResponse;
    const PATH: &'static str = "/image.training.TrainService/DoTrain";
}

/// Invoke method `M` with a request and a deadline.
///
/// Implementations must return within roughly `deadline`, reporting expiry as
/// [`ClientError::DeadlineExceeded`](crate::ClientError::DeadlineExceeded).
#[async_trait]
pub trait Invoke<M: ServiceMethod>: Send + Sync {
    async fn invoke(&self, request: M::Request, deadline: Duration) -> Result<M::Response>;
}
