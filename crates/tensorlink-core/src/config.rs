//! Configuration module for Tensorlink Core.
//!
//! Everything here is supplied by the caller at construction time. The core never
//! reads configuration from the environment or from disk; front ends that want a
//! config file deserialize a [`ClientConfig`] themselves.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{ClientError, Result};

/// Default upper bound for a single gRPC message, large enough for image payloads.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Deadline applied when a call does not supply a positive one.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(10);

/// Drain window used by front ends that do not pick their own.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Transport security mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// Unencrypted HTTP/2.
    #[default]
    Plaintext,
    /// TLS using the webpki root store.
    Tls,
}

/// Connection configuration for a single remote service address.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    /// Host name or IP address of the service.
    pub host: String,
    /// TCP port of the service.
    pub port: u16,
    /// Maximum encoded or decoded message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Plaintext or TLS.
    #[serde(default)]
    pub security: SecurityMode,
    /// Server name to verify when it differs from `host`.
    #[serde(default)]
    pub tls_domain: Option<String>,
    /// Deadline for calls that do not take one explicitly, in milliseconds.
    #[serde(default = "default_deadline_ms")]
    pub default_deadline_ms: u64,
}

fn default_max_message_size() -> usize {
    DEFAULT_MAX_MESSAGE_SIZE
}

fn default_deadline_ms() -> u64 {
    DEFAULT_DEADLINE.as_millis() as u64
}

impl ClientConfig {
    /// Create a plaintext configuration for `host:port` with default limits.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            security: SecurityMode::Plaintext,
            tls_domain: None,
            default_deadline_ms: default_deadline_ms(),
        }
    }

    /// Set the maximum message size.
    #[must_use]
    pub fn with_max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }

    /// Switch to TLS, optionally overriding the server name to verify.
    #[must_use]
    pub fn with_tls(mut self, domain: Option<String>) -> Self {
        self.security = SecurityMode::Tls;
        self.tls_domain = domain;
        self
    }

    /// Set the deadline used by calls without their own, at millisecond precision.
    #[must_use]
    pub fn with_default_deadline(mut self, deadline: Duration) -> Self {
        self.default_deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// The default deadline, falling back to [`DEFAULT_DEADLINE`] when unset.
    #[must_use]
    pub fn default_deadline(&self) -> Duration {
        if self.default_deadline_ms == 0 {
            DEFAULT_DEADLINE
        } else {
            Duration::from_millis(self.default_deadline_ms)
        }
    }

    /// Check the configuration for values the transport cannot use.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ClientError::Config("host is required".to_string()));
        }
        if self.port == 0 {
            return Err(ClientError::Config("port must be non-zero".to_string()));
        }
        if self.max_message_size == 0 {
            return Err(ClientError::Config("max_message_size must be > 0".to_string()));
        }
        Ok(())
    }

    /// The endpoint URI for this configuration.
    ///
    /// IPv6 literals are bracketed; the scheme follows the security mode.
    #[must_use]
    pub fn endpoint_uri(&self) -> String {
        let scheme = match self.security {
            SecurityMode::Plaintext => "http",
            SecurityMode::Tls => "https",
        };
        let host = self.host.trim();
        if host.contains(':') && !host.starts_with('[') {
            format!("{}://[{}]:{}", scheme, host, self.port)
        } else {
            format!("{}://{}:{}", scheme, host, self.port)
        }
    }
}
