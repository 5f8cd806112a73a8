//! Image prediction calls.
//!
//! A [`PredictCall`] names the served model and signature and carries the input
//! source. [`PredictionClient::predict`] reads the source fully into memory,
//! wraps it as a string tensor, and invokes the prediction method with the
//! resolved deadline.
//!
//! Remote failures never disappear: they come back as
//! [`PredictOutcome::Failure`], separate from [`PredictOutcome::NoInput`] and
//! from a successful response with no outputs.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

use crate::config::DEFAULT_DEADLINE;
use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::proto::tensorflow::serving::{ModelSpec, PredictRequest};
use crate::tensor::{Tensor, decode_outputs, encode_binary};
use crate::transport::{Invoke, Predict};

/// Input name used when the caller leaves it blank.
pub const DEFAULT_INPUT_NAME: &str = "images";

/// Where the image bytes come from.
///
/// A stream passed by value is dropped, and so closed, once it has been read to
/// the end. To keep a stream, pass `&mut stream` instead: the call then only
/// borrows it.
pub enum InputSource<'a> {
    /// A file on disk. A blank path counts as no input.
    Path(PathBuf),
    /// An open byte stream.
    Stream(Box<dyn AsyncRead + Send + Unpin + 'a>),
    /// Bytes already in memory.
    Bytes(Bytes),
}

impl<'a> InputSource<'a> {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn stream<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'a,
    {
        Self::Stream(Box::new(reader))
    }

    pub fn bytes(bytes: impl Into<Bytes>) -> Self {
        Self::Bytes(bytes.into())
    }
}

impl std::fmt::Debug for InputSource<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(p) => f.debug_tuple("Path").field(p).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
            Self::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
        }
    }
}

/// Parameters of one prediction call.
#[derive(Debug)]
pub struct PredictCall<'a> {
    pub model_name: String,
    pub signature_name: String,
    pub input_name: String,
    pub input: Option<InputSource<'a>>,
    /// Only strictly positive values are sent.
    pub model_version: Option<i64>,
    /// Non-positive or absent means [`DEFAULT_DEADLINE`].
    pub deadline: Option<Duration>,
}

impl<'a> PredictCall<'a> {
    #[must_use]
    pub fn new(model_name: impl Into<String>, signature_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            signature_name: signature_name.into(),
            input_name: String::new(),
            input: None,
            model_version: None,
            deadline: None,
        }
    }

    #[must_use]
    pub fn input_name(mut self, name: impl Into<String>) -> Self {
        self.input_name = name.into();
        self
    }

    #[must_use]
    pub fn input(mut self, source: InputSource<'a>) -> Self {
        self.input = Some(source);
        self
    }

    #[must_use]
    pub fn path(self, path: impl Into<PathBuf>) -> Self {
        self.input(InputSource::path(path))
    }

    #[must_use]
    pub fn stream<R>(self, reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'a,
    {
        self.input(InputSource::stream(reader))
    }

    #[must_use]
    pub fn bytes(self, bytes: impl Into<Bytes>) -> Self {
        self.input(InputSource::bytes(bytes))
    }

    #[must_use]
    pub fn version(mut self, version: i64) -> Self {
        self.model_version = Some(version);
        self
    }

    #[must_use]
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Result of a prediction call that got as far as resolving its input.
#[derive(Debug)]
pub enum PredictOutcome {
    /// The service answered; outputs by name.
    Success(HashMap<String, Tensor>),
    /// No input source was supplied, so nothing was sent.
    NoInput,
    /// The call was sent and failed.
    Failure(ClientError),
}

impl PredictOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    #[must_use]
    pub fn outputs(&self) -> Option<&HashMap<String, Tensor>> {
        match self {
            Self::Success(outputs) => Some(outputs),
            _ => None,
        }
    }

    /// Fold the outcome into a `Result`, mapping `NoInput` to [`ClientError::InvalidInput`].
    pub fn into_result(self) -> Result<HashMap<String, Tensor>> {
        match self {
            Self::Success(outputs) => Ok(outputs),
            Self::NoInput => Err(ClientError::InvalidInput),
            Self::Failure(err) => Err(err),
        }
    }
}

/// The deadline a call runs under.
pub fn resolve_deadline(requested: Option<Duration>) -> Duration {
    requested.filter(|d| !d.is_zero()).unwrap_or(DEFAULT_DEADLINE)
}

/// The input name a call sends, defaulting blank names.
pub fn resolve_input_name(name: &str) -> &str {
    if name.trim().is_empty() { DEFAULT_INPUT_NAME } else { name }
}

/// Build the model spec; the version is omitted unless strictly positive.
pub fn model_spec(name: &str, signature_name: &str, version: Option<i64>) -> ModelSpec {
    ModelSpec {
        name: name.to_string(),
        version: version.filter(|v| *v > 0),
        signature_name: signature_name.to_string(),
    }
}

/// Read the whole input into memory. `None` when there is nothing to read.
async fn read_input(input: Option<InputSource<'_>>) -> Result<Option<Bytes>> {
    match input {
        Some(InputSource::Path(path)) if !path.as_os_str().to_string_lossy().trim().is_empty() => {
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|source| ClientError::ResourceIo { path, source })?;
            Ok(Some(Bytes::from(bytes)))
        }
        Some(InputSource::Stream(mut reader)) => {
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf).await?;
            drop(reader);
            Ok(Some(Bytes::from(buf)))
        }
        Some(InputSource::Bytes(bytes)) => Ok(Some(bytes)),
        Some(InputSource::Path(_)) | None => Ok(None),
    }
}

/// Sends prediction calls over a shared transport.
pub struct PredictionClient<C = Connection> {
    transport: Arc<C>,
}

impl<C> Clone for PredictionClient<C> {
    fn clone(&self) -> Self {
        Self { transport: Arc::clone(&self.transport) }
    }
}

impl<C> PredictionClient<C>
where
    C: Invoke<Predict>,
{
    pub fn new(transport: Arc<C>) -> Self {
        Self { transport }
    }

    /// Run one prediction call.
    ///
    /// # Errors
    ///
    /// Only input problems are errors: [`ClientError::ResourceIo`] when the path
    /// cannot be read and [`ClientError::Io`] when the stream fails. Everything
    /// that goes wrong after the request is built is a
    /// [`PredictOutcome::Failure`].
    pub async fn predict(&self, call: PredictCall<'_>) -> Result<PredictOutcome> {
        let PredictCall { model_name, signature_name, input_name, input, model_version, deadline } =
            call;

        let Some(payload) = read_input(input).await? else {
            debug!(model = %model_name, "No input supplied, skipping prediction call");
            return Ok(PredictOutcome::NoInput);
        };

        let input_name = resolve_input_name(&input_name);
        let deadline = resolve_deadline(deadline);
        let payload_len = payload.len();

        let mut inputs = HashMap::with_capacity(1);
        inputs.insert(input_name.to_string(), encode_binary(payload).to_proto());
        let request = PredictRequest {
            model_spec: Some(model_spec(&model_name, &signature_name, model_version)),
            inputs,
            output_filter: Vec::new(),
        };

        info!(
            model = %model_name,
            signature = %signature_name,
            input = input_name,
            version = ?request.model_spec.as_ref().and_then(|s| s.version),
            payload_bytes = payload_len,
            deadline_ms = deadline.as_millis() as u64,
            "Sending prediction request"
        );

        match self.transport.invoke(request, deadline).await {
            Ok(response) => {
                let outputs = decode_outputs(response.outputs);
                debug!(model = %model_name, outputs = outputs.len(), "Prediction succeeded");
                Ok(PredictOutcome::Success(outputs))
            }
            Err(err) => {
                warn!(model = %model_name, kind = ?err.kind(), error = %err, "Prediction call failed");
                Ok(PredictOutcome::Failure(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::error::FailureKind;
    use crate::proto::tensorflow::serving::PredictResponse;
    use crate::proto::tensorflow::{DataType, TensorProto};

    /// Records every request and answers from a canned reply.
    struct MockPredict {
        calls: AtomicUsize,
        last: Mutex<Option<(PredictRequest, Duration)>>,
        fail_with: Option<tonic::Code>,
    }

    impl MockPredict {
        fn ok() -> Self {
            Self { calls: AtomicUsize::new(0), last: Mutex::new(None), fail_with: None }
        }

        fn failing(code: tonic::Code) -> Self {
            Self { fail_with: Some(code), ..Self::ok() }
        }

        fn last_request(&self) -> (PredictRequest, Duration) {
            self.last.lock().unwrap().clone().expect("no request recorded")
        }
    }

    #[async_trait]
    impl Invoke<Predict> for MockPredict {
        async fn invoke(
            &self,
            request: PredictRequest,
            deadline: Duration,
        ) -> Result<PredictResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some((request, deadline));
            if let Some(code) = self.fail_with {
                return Err(ClientError::from_status(&tonic::Status::new(code, "mock failure"), deadline));
            }
            let mut outputs = HashMap::new();
            outputs.insert(
                "scores".to_string(),
                TensorProto {
                    dtype: DataType::DtFloat as i32,
                    float_val: vec![0.9, 0.1],
                    ..Default::default()
                },
            );
            Ok(PredictResponse { model_spec: None, outputs })
        }
    }

    fn client(mock: &Arc<MockPredict>) -> PredictionClient<MockPredict> {
        PredictionClient::new(Arc::clone(mock))
    }

    #[test]
    fn test_resolve_deadline() {
        assert_eq!(resolve_deadline(Some(Duration::from_secs(3))), Duration::from_secs(3));
        assert_eq!(resolve_deadline(Some(Duration::from_millis(1))), Duration::from_millis(1));
        assert_eq!(resolve_deadline(Some(Duration::ZERO)), Duration::from_secs(10));
        assert_eq!(resolve_deadline(None), Duration::from_secs(10));
    }

    #[test]
    fn test_model_spec_version_only_when_positive() {
        assert_eq!(model_spec("inception", "predict_images", Some(2)).version, Some(2));
        assert_eq!(model_spec("inception", "predict_images", Some(0)).version, None);
        assert_eq!(model_spec("inception", "predict_images", Some(-1)).version, None);
        assert_eq!(model_spec("inception", "predict_images", None).version, None);

        let spec = model_spec("inception", "predict_images", None);
        assert_eq!(spec.name, "inception");
        assert_eq!(spec.signature_name, "predict_images");
    }

    #[test]
    fn test_resolve_input_name() {
        assert_eq!(resolve_input_name(""), "images");
        assert_eq!(resolve_input_name("   "), "images");
        assert_eq!(resolve_input_name("image_bytes"), "image_bytes");
    }

    #[tokio::test]
    async fn test_no_input_makes_no_call() {
        let mock = Arc::new(MockPredict::ok());
        let outcome = client(&mock).predict(PredictCall::new("inception", "predict_images")).await.unwrap();

        assert!(matches!(outcome, PredictOutcome::NoInput));
        assert_eq!(mock.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blank_path_is_no_input() {
        let mock = Arc::new(MockPredict::ok());
        let call = PredictCall::new("inception", "predict_images").path("  ");
        let outcome = client(&mock).predict(call).await.unwrap();

        assert!(matches!(outcome, PredictOutcome::NoInput));
        assert_eq!(mock.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_file_is_resource_error() {
        let mock = Arc::new(MockPredict::ok());
        let call = PredictCall::new("inception", "predict_images").path("/nonexistent/tensorlink/1.jpg");
        let err = client(&mock).predict(call).await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::ResourceIo);
        assert_eq!(mock.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_request_assembly() {
        let mock = Arc::new(MockPredict::ok());
        let call = PredictCall::new("inception", "predict_images")
            .bytes(Bytes::from_static(b"\xff\xd8jpeg"))
            .version(3)
            .deadline(Duration::from_secs(2));
        let outcome = client(&mock).predict(call).await.unwrap();
        assert!(outcome.is_success());

        let (request, deadline) = mock.last_request();
        assert_eq!(deadline, Duration::from_secs(2));
        assert_eq!(request.model_spec.as_ref().unwrap().version, Some(3));
        assert_eq!(request.inputs.len(), 1);

        let tensor = &request.inputs["images"];
        assert_eq!(tensor.dtype, DataType::DtString as i32);
        assert_eq!(tensor.string_val, vec![Bytes::from_static(b"\xff\xd8jpeg")]);
    }

    #[tokio::test]
    async fn test_stream_by_value_and_by_reference() {
        let mock = Arc::new(MockPredict::ok());

        let owned: &[u8] = b"owned-stream";
        let call = PredictCall::new("m", "s").input_name("raw").stream(owned);
        client(&mock).predict(call).await.unwrap();
        assert_eq!(mock.last_request().0.inputs["raw"].string_val, vec![Bytes::from_static(b"owned-stream")]);

        let mut kept: &[u8] = b"borrowed-stream";
        let call = PredictCall::new("m", "s").stream(&mut kept);
        client(&mock).predict(call).await.unwrap();
        // Still usable by the caller, and fully consumed
        assert!(kept.is_empty());
        assert_eq!(
            mock.last_request().0.inputs["images"].string_val,
            vec![Bytes::from_static(b"borrowed-stream")]
        );
    }

    #[tokio::test]
    async fn test_remote_failure_is_distinguishable() {
        let mock = Arc::new(MockPredict::failing(tonic::Code::NotFound));
        let call = PredictCall::new("missing", "predict_images").bytes(vec![1u8]);
        let outcome = client(&mock).predict(call).await.unwrap();

        match outcome {
            PredictOutcome::Failure(err) => assert_eq!(err.kind(), FailureKind::RemoteStatus),
            other => panic!("Expected Failure, got {:?}", other),
        }
        assert_eq!(mock.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deadline_failure_outcome() {
        let mock = Arc::new(MockPredict::failing(tonic::Code::DeadlineExceeded));
        let call = PredictCall::new("inception", "predict_images").bytes(vec![1u8]);
        let outcome = client(&mock).predict(call).await.unwrap();

        let err = outcome.into_result().unwrap_err();
        assert_eq!(err.kind(), FailureKind::DeadlineExceeded);
        assert_eq!(mock.last_request().1, Duration::from_secs(10));
    }

    #[test]
    fn test_into_result_maps_no_input() {
        let err = PredictOutcome::NoInput.into_result().unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidInput);
    }
}
