// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Engine configuration.
//!
//! Provides the configuration surface of the adapter:
//! - [`EngineConfig`] - certificate/key paths, peer verification, timeouts
//! - [`EngineConfigBuilder`] - consuming builder
//! - [`Timeouts`] - hello/receive timeouts, longer in debug builds
//!
//! # Environment
//!
//! [`EngineConfig::from_env`] reads:
//! - `TLSGATE_CERTIFICATE`: Path to the server certificate chain (PEM)
//! - `TLSGATE_KEY`: Path to the server private key (PEM)
//! - `TLSGATE_CA_CERTIFICATES`: Path to CA certificates for client verification (PEM)
//! - `TLSGATE_VERIFY_PEER`: Require a client certificate ("1" or "true")
//! - `TLSGATE_HELLO_TIMEOUT_MS`: Handshake timeout in milliseconds
//! - `TLSGATE_RECEIVE_TIMEOUT_MS`: Receive timeout in milliseconds
//!
//! # Example
//!
//! ```
//! use tlsgate::EngineConfig;
//!
//! let config = EngineConfig::builder()
//!     .with_certificate("server.crt")
//!     .with_key("server.key")
//!     .build()
//!     .unwrap();
//! assert!(!config.verify_peer());
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Path to the server certificate chain (PEM).
pub const ENV_CERTIFICATE: &str = "TLSGATE_CERTIFICATE";
/// Path to the server private key (PEM).
pub const ENV_KEY: &str = "TLSGATE_KEY";
/// Path to the CA bundle that client certificates must chain to.
pub const ENV_CA_CERTIFICATES: &str = "TLSGATE_CA_CERTIFICATES";
/// `1`, `true`, `yes` or `on` to require client certificates.
pub const ENV_VERIFY_PEER: &str = "TLSGATE_VERIFY_PEER";
/// Handshake timeout override, in milliseconds.
pub const ENV_HELLO_TIMEOUT_MS: &str = "TLSGATE_HELLO_TIMEOUT_MS";
/// Receive timeout override, in milliseconds.
pub const ENV_RECEIVE_TIMEOUT_MS: &str = "TLSGATE_RECEIVE_TIMEOUT_MS";

// ============================================================================
// Timeouts
// ============================================================================

/// Handshake timeout for release builds.
pub const HELLO_TIMEOUT: Duration = Duration::from_millis(15_000);
/// Receive timeout for release builds.
pub const RECEIVE_TIMEOUT: Duration = Duration::from_millis(300_000);
/// Handshake timeout for debug builds (tolerates stepping through a debugger).
pub const DEBUG_HELLO_TIMEOUT: Duration = Duration::from_millis(15_000_000);
/// Receive timeout for debug builds.
pub const DEBUG_RECEIVE_TIMEOUT: Duration = Duration::from_millis(30_000_000);

/// Global engine timeouts.
///
/// Enforced by the engine while it waits on the transport: `hello` bounds a
/// handshake, `receive` bounds a single receive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    /// Handshake (ClientHello through Finished) timeout
    pub hello: Duration,
    /// Application data receive timeout
    pub receive: Duration,
}

impl Timeouts {
    /// Release-build timeouts.
    pub const fn production() -> Self {
        Self {
            hello: HELLO_TIMEOUT,
            receive: RECEIVE_TIMEOUT,
        }
    }

    /// Debug-build timeouts.
    pub const fn debug() -> Self {
        Self {
            hello: DEBUG_HELLO_TIMEOUT,
            receive: DEBUG_RECEIVE_TIMEOUT,
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::debug()
        } else {
            Self::production()
        }
    }
}

// ============================================================================
// Engine Configuration
// ============================================================================

/// Adapter configuration.
///
/// One configuration per process: the engine holds a single certificate/key
/// pair shared by every session.
#[derive(Clone, Debug, Default)]
pub struct EngineConfig {
    /// Server certificate chain (PEM)
    pub(crate) certificate: Option<PathBuf>,

    /// Server private key (PEM)
    pub(crate) key: Option<PathBuf>,

    /// CA certificates trusted for client certificates (PEM)
    pub(crate) ca_certificates: Option<PathBuf>,

    /// Whether to require a client certificate during the handshake
    pub(crate) verify_peer: bool,

    /// Hello/receive timeouts
    pub(crate) timeouts: Timeouts,
}

impl EngineConfig {
    /// Create a configuration builder.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    /// Build a configuration from `TLSGATE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut builder = EngineConfigBuilder::new();

        if let Some(path) = env_path(ENV_CERTIFICATE) {
            builder = builder.with_certificate(path);
        }
        if let Some(path) = env_path(ENV_KEY) {
            builder = builder.with_key(path);
        }
        if let Some(path) = env_path(ENV_CA_CERTIFICATES) {
            builder = builder.with_ca_certificates(path);
        }
        if env::var(ENV_VERIFY_PEER).map(|v| parse_bool(&v)).unwrap_or(false) {
            builder = builder.require_peer_certificate();
        }

        let mut timeouts = Timeouts::default();
        if let Some(ms) = env_millis(ENV_HELLO_TIMEOUT_MS)? {
            timeouts.hello = ms;
        }
        if let Some(ms) = env_millis(ENV_RECEIVE_TIMEOUT_MS)? {
            timeouts.receive = ms;
        }

        builder.with_timeouts(timeouts).build()
    }

    /// Configured certificate path.
    pub fn certificate(&self) -> Option<&Path> {
        self.certificate.as_deref()
    }

    /// Configured private key path.
    pub fn key(&self) -> Option<&Path> {
        self.key.as_deref()
    }

    /// Configured CA bundle path.
    pub fn ca_certificates(&self) -> Option<&Path> {
        self.ca_certificates.as_deref()
    }

    /// Whether peers must present a certificate.
    pub fn verify_peer(&self) -> bool {
        self.verify_peer
    }

    /// Engine timeouts.
    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`EngineConfig`].
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    certificate: Option<PathBuf>,
    key: Option<PathBuf>,
    ca_certificates: Option<PathBuf>,
    verify_peer: bool,
    timeouts: Timeouts,
}

impl EngineConfigBuilder {
    /// Create a builder with no credentials and build-profile timeouts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the certificate chain file (PEM).
    pub fn with_certificate(mut self, path: impl Into<PathBuf>) -> Self {
        self.certificate = Some(path.into());
        self
    }

    /// Set the private key file (PEM).
    pub fn with_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.key = Some(path.into());
        self
    }

    /// Set the CA bundle used to verify client certificates (PEM).
    pub fn with_ca_certificates(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_certificates = Some(path.into());
        self
    }

    /// Require peers to present a certificate (mutual TLS).
    pub fn require_peer_certificate(mut self) -> Self {
        self.verify_peer = true;
        self
    }

    /// Set peer verification explicitly.
    pub fn verify_peer(mut self, verify: bool) -> Self {
        self.verify_peer = verify;
        self
    }

    /// Override the hello/receive timeouts.
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Build the configuration.
    ///
    /// Only checks that the settings are consistent; files are read by
    /// [`EngineContext::open`](crate::EngineContext::open).
    pub fn build(self) -> Result<EngineConfig> {
        if self.verify_peer && self.ca_certificates.is_none() {
            return Err(Error::Config(
                "peer verification requires a CA certificate bundle".to_string(),
            ));
        }
        if self.timeouts.hello.is_zero() || self.timeouts.receive.is_zero() {
            return Err(Error::Config("timeouts must be non-zero".to_string()));
        }

        Ok(EngineConfig {
            certificate: self.certificate,
            key: self.key,
            ca_certificates: self.ca_certificates,
            verify_peer: self.verify_peer,
            timeouts: self.timeouts,
        })
    }
}

// ============================================================================
// Env helpers
// ============================================================================

fn env_path(name: &str) -> Option<PathBuf> {
    env::var_os(name)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn env_millis(name: &str) -> Result<Option<Duration>> {
    match env::var(name) {
        Ok(v) => v
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|_| Error::Config(format!("{} must be a number of milliseconds", name))),
        Err(_) => Ok(None),
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

// ============================================================================
// Tests
// ============================================================================
