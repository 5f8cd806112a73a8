//! Shared test utilities for Tensorlink Core integration tests.
//!
//! Starts in-process mock prediction, format and train services on an ephemeral
//! port and records what they receive.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tensorlink_core::proto::image::training::format_data_server::{FormatData, FormatDataServer};
use tensorlink_core::proto::image::training::train_service_server::{TrainService, TrainServiceServer};
use tensorlink_core::proto::image::training::{Data, TrainRequest, TrainResponse};
use tensorlink_core::proto::tensorflow::serving::prediction_service_server::{
    PredictionService, PredictionServiceServer,
};
use tensorlink_core::proto::tensorflow::serving::{PredictRequest, PredictResponse};
use tensorlink_core::proto::tensorflow::{DataType, TensorProto};
use tensorlink_core::{ClientConfig, DEFAULT_MAX_MESSAGE_SIZE};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

/// Model name that makes the mock stall for [`SLOW_DELAY`].
pub const SLOW_MODEL: &str = "slow";
/// Model name that makes the mock stall briefly before answering.
pub const BRIEF_MODEL: &str = "brief";
/// Model name the mock reports as not found.
pub const MISSING_MODEL: &str = "missing";
/// Format job name that makes the mock fail.
pub const BROKEN_JOB: &str = "broken";

pub const SLOW_DELAY: Duration = Duration::from_secs(5);
pub const BRIEF_DELAY: Duration = Duration::from_millis(300);

/// Everything the mock services have received.
#[derive(Default)]
pub struct Recorded {
    pub predict: Mutex<Vec<PredictRequest>>,
    pub format: Mutex<Vec<String>>,
    pub train: Mutex<Vec<TrainRequest>>,
}

#[derive(Clone)]
struct MockServices {
    recorded: Arc<Recorded>,
}

#[tonic::async_trait]
impl PredictionService for MockServices {
    async fn predict(
        &self,
        request: Request<PredictRequest>,
    ) -> Result<Response<PredictResponse>, Status> {
        let request = request.into_inner();
        let model = request.model_spec.as_ref().map(|s| s.name.clone()).unwrap_or_default();
        self.recorded.predict.lock().unwrap().push(request);

        match model.as_str() {
            MISSING_MODEL => return Err(Status::not_found("model not loaded")),
            SLOW_MODEL => tokio::time::sleep(SLOW_DELAY).await,
            BRIEF_MODEL => tokio::time::sleep(BRIEF_DELAY).await,
            _ => {}
        }

        let mut outputs = HashMap::new();
        outputs.insert(
            "scores".to_string(),
            TensorProto {
                dtype: DataType::DtFloat as i32,
                float_val: vec![0.8, 0.15, 0.05],
                ..Default::default()
            },
        );
        Ok(Response::new(PredictResponse { model_spec: None, outputs }))
    }
}

#[tonic::async_trait]
impl FormatData for MockServices {
    async fn do_format(&self, request: Request<Data>) -> Result<Response<Data>, Status> {
        let text = request.into_inner().text;
        self.recorded.format.lock().unwrap().push(text.clone());

        if text == BROKEN_JOB {
            return Err(Status::internal("format failed"));
        }
        Ok(Response::new(Data { text: "done".to_string() }))
    }
}

#[tonic::async_trait]
impl TrainService for MockServices {
    async fn do_train(
        &self,
        request: Request<TrainRequest>,
    ) -> Result<Response<TrainResponse>, Status> {
        let request = request.into_inner();
        let key = format!("key-{}", request.train_no);
        self.recorded.train.lock().unwrap().push(request);
        Ok(Response::new(TrainResponse { key, message: "training started".to_string() }))
    }
}

/// Starts the mock services on an available port.
///
/// # Returns
/// The bound address and the shared request log.
///
/// # Panics
/// Panics if the listener cannot be bound.
pub async fn start_mock_server() -> (SocketAddr, Arc<Recorded>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind to port 0");
    let addr = listener.local_addr().unwrap();

    let recorded = Arc::new(Recorded::default());
    let services = MockServices { recorded: Arc::clone(&recorded) };

    tokio::spawn(async move {
        Server::builder()
            .add_service(
                PredictionServiceServer::new(services.clone())
                    .max_decoding_message_size(DEFAULT_MAX_MESSAGE_SIZE),
            )
            .add_service(FormatDataServer::new(services.clone()))
            .add_service(TrainServiceServer::new(services))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .expect("Mock server failed to run");
    });

    (addr, recorded)
}

/// Client configuration pointing at `addr`.
pub fn config_for(addr: SocketAddr) -> ClientConfig {
    ClientConfig::new(addr.ip().to_string(), addr.port())
}

/// Client configuration for a port nothing listens on.
pub fn unreachable_config() -> ClientConfig {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind to port 0");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    ClientConfig::new("127.0.0.1", port)
}

/// Install a test subscriber once so failures come with client logs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
