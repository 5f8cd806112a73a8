//! A long-lived connection to one remote service address.
//!
//! The connection owns a single lazily-connected `tonic` channel and serves all
//! three remote capabilities over it. Shutdown is a barrier: once it begins no new
//! call may start, and calls already dispatched get until the drain timeout to
//! finish. Calls that outlive the window are not cancelled.

use std::future::Future;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Notify;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tonic::{Request, Response, Status};
use tower::ServiceBuilder;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, SecurityMode};
use crate::error::{ClientError, Result};
use crate::logging::{RequestLoggerLayer, RequestLoggerService};
use crate::proto::image::training::format_data_client::FormatDataClient;
use crate::proto::image::training::train_service_client::TrainServiceClient;
use crate::proto::image::training::{Data, TrainRequest, TrainResponse};
use crate::proto::tensorflow::serving::prediction_service_client::PredictionServiceClient;
use crate::proto::tensorflow::serving::{PredictRequest, PredictResponse};
use crate::transport::{DoFormat, DoTrain, Invoke, Predict, ServiceMethod};

/// The channel as seen by the generated clients.
type LoggedChannel = RequestLoggerService<Channel>;

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Open = 0,
    ShuttingDown = 1,
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Open,
            1 => Self::ShuttingDown,
            _ => Self::Closed,
        }
    }
}

/// What a call to [`Connection::shutdown`] observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// All in-flight calls finished inside the drain window.
    pub drained: bool,
    /// Calls still running when the window closed.
    pub abandoned: usize,
    /// The connection had already been shut down; nothing was done.
    pub already_closed: bool,
}

/// Decrements the in-flight count when a call finishes, however it finishes.
struct CallGuard<'a> {
    connection: &'a Connection,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if self.connection.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.connection.drained.notify_waiters();
        }
    }
}

/// One transport channel to a `host:port` pair.
pub struct Connection {
    config: ClientConfig,
    channel: RwLock<Option<Channel>>,
    state: AtomicU8,
    in_flight: AtomicUsize,
    drained: Notify,
}

impl Connection {
    /// Open a connection described by `config`.
    ///
    /// Reachability is not checked here; an unreachable service surfaces on the
    /// first call. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if the address or TLS settings are invalid.
    pub fn open(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let uri = config.endpoint_uri();
        let mut endpoint = Endpoint::from_shared(uri.clone())
            .map_err(|e| ClientError::Config(format!("Invalid server address: {}", e)))?;

        if config.security == SecurityMode::Tls {
            let domain = config.tls_domain.clone().unwrap_or_else(|| config.host.clone());
            let tls = ClientTlsConfig::new().domain_name(domain).with_webpki_roots();
            endpoint = endpoint
                .tls_config(tls)
                .map_err(|e| ClientError::Config(format!("Invalid TLS configuration: {}", e)))?;
        }

        let channel = endpoint.connect_lazy();

        info!(
            address = %uri,
            security = ?config.security,
            max_message_size = config.max_message_size,
            "Opened connection"
        );

        Ok(Self {
            config,
            channel: RwLock::new(Some(channel)),
            state: AtomicU8::new(ConnectionState::Open as u8),
            in_flight: AtomicUsize::new(0),
            drained: Notify::new(),
        })
    }

    /// The configuration this connection was opened with.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Number of calls currently in progress.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Stop accepting calls, wait up to `timeout` for in-flight calls, then close.
    ///
    /// Returns within `timeout`. Calling it again is a no-op.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownReport {
        if self
            .state
            .compare_exchange(
                ConnectionState::Open as u8,
                ConnectionState::ShuttingDown as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            debug!(address = %self.config.endpoint_uri(), "Connection already shut down");
            return ShutdownReport { drained: true, abandoned: 0, already_closed: true };
        }

        info!(
            address = %self.config.endpoint_uri(),
            in_flight = self.in_flight(),
            "Shutting down connection"
        );

        let drained = tokio::time::timeout(timeout, self.wait_drained()).await.is_ok();

        self.channel.write().unwrap_or_else(PoisonError::into_inner).take();
        self.state.store(ConnectionState::Closed as u8, Ordering::SeqCst);

        let abandoned = self.in_flight();
        if drained {
            info!("Connection closed");
        } else {
            warn!(abandoned, ?timeout, "Shutdown timed out, calls may still be running");
        }

        ShutdownReport { drained, abandoned, already_closed: false }
    }

    async fn wait_drained(&self) {
        loop {
            // Register before checking so a wakeup between the check and the await is not lost
            let notified = self.drained.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Admit a call, or refuse it once shutdown has begun.
    fn begin_call(&self) -> Result<(CallGuard<'_>, Channel)> {
        if self.state() != ConnectionState::Open {
            return Err(ClientError::Closed);
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = CallGuard { connection: self };

        // Shutdown may have started between the check and the increment
        if self.state() != ConnectionState::Open {
            return Err(ClientError::Closed);
        }

        let channel = self
            .channel
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ClientError::Closed)?;

        Ok((guard, channel))
    }

    /// Run one unary call under `deadline` and classify its outcome.
    async fn dispatch<T, F, Fut>(&self, path: &'static str, deadline: Duration, call: F) -> Result<T>
    where
        F: FnOnce(LoggedChannel) -> Fut,
        Fut: Future<Output = std::result::Result<Response<T>, Status>>,
    {
        let (_guard, channel) = self.begin_call()?;
        let service = ServiceBuilder::new().layer(RequestLoggerLayer).service(channel);
        let start = Instant::now();

        debug!(path, deadline_ms = deadline.as_millis() as u64, "Dispatching call");

        // The grpc-timeout header tells the server; this timer guarantees the caller
        // is released even when no connection can be established.
        let result = match tokio::time::timeout(deadline, call(service)).await {
            Ok(Ok(response)) => Ok(response.into_inner()),
            // The server enforces grpc-timeout too; its cancellation can race our timer
            Ok(Err(_)) if start.elapsed() >= deadline => Err(ClientError::DeadlineExceeded(deadline)),
            Ok(Err(status)) => Err(ClientError::from_status(&status, deadline)),
            Err(_) => Err(ClientError::DeadlineExceeded(deadline)),
        };

        match &result {
            Ok(_) => debug!(path, elapsed_ms = start.elapsed().as_millis() as u64, "Call completed"),
            Err(e) => debug!(path, kind = ?e.kind(), error = %e, "Call failed"),
        }
        result
    }

    fn limit(&self) -> usize {
        self.config.max_message_size
    }
}

/// Largest value the `grpc-timeout` header can carry (eight digits of hours).
const MAX_WIRE_TIMEOUT: Duration = Duration::from_secs(99_999_999 * 3600);

fn with_deadline<T>(message: T, deadline: Duration) -> Request<T> {
    let mut request = Request::new(message);
    request.set_timeout(deadline.min(MAX_WIRE_TIMEOUT));
    request
}

#[async_trait]
impl Invoke<Predict> for Connection {
    async fn invoke(&self, request: PredictRequest, deadline: Duration) -> Result<PredictResponse> {
        let limit = self.limit();
        self.dispatch(Predict::PATH, deadline, |service| async move {
            let mut client = PredictionServiceClient::new(service)
                .max_encoding_message_size(limit)
                .max_decoding_message_size(limit);
            client.predict(with_deadline(request, deadline)).await
        })
        .await
    }
}

#[async_trait]
impl Invoke<DoFormat> for Connection {
    async fn invoke(&self, request: Data, deadline: Duration) -> Result<Data> {
        let limit = self.limit();
        self.dispatch(DoFormat::PATH, deadline, |service| async move {
            let mut client = FormatDataClient::new(service)
                .max_encoding_message_size(limit)
                .max_decoding_message_size(limit);
            client.do_format(with_deadline(request, deadline)).await
        })
        .await
    }
}

#[async_trait]
impl Invoke<DoTrain> for Connection {
    async fn invoke(&self, request: TrainRequest, deadline: Duration) -> Result<TrainResponse> {
        let limit = self.limit();
        self.dispatch(DoTrain::PATH, deadline, |service| async move {
            let mut client = TrainServiceClient::new(service)
                .max_encoding_message_size(limit)
                .max_decoding_message_size(limit);
            client.do_train(with_deadline(request, deadline)).await
        })
        .await
    }
}
