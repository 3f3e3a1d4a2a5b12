// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the TLS adapter.
//!
//! Errors are grouped the way they affect the process:
//!
//! - **Initialization** - fatal to startup, no TLS connection may be accepted
//! - **Upgrade** - fatal to one connection
//! - **Handshake** - classified for diagnostics, reported as one protocol error
//! - **Transfer** - read/write failures; only some of them end the stream
//!
//! Every error is returned synchronously by the call that hit it. Logging is
//! a side channel and never the only report.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::engine::EngineError;
use crate::handshake::HandshakeFailure;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Adapter error.
#[derive(Debug, Error)]
pub enum Error {
    // ========================================================================
    // Initialization Errors
    // ========================================================================
    /// The TLS engine refused to initialize.
    #[error("TLS engine initialization failed: {0}")]
    EngineInit(EngineError),

    /// Certificate file could not be read.
    #[error("Unable to read certificate {}: {source}", path.display())]
    CertificateRead {
        /// Path that was configured.
        path: PathBuf,
        /// Underlying read failure.
        source: io::Error,
    },

    /// Certificate file was read but holds no usable PEM certificate.
    #[error("Unable to decode PEM certificate {}: {reason}", path.display())]
    CertificateDecode {
        /// Path that was configured.
        path: PathBuf,
        /// Decoder message.
        reason: String,
    },

    /// Private key file could not be read.
    #[error("Unable to read key file {}: {source}", path.display())]
    KeyRead {
        /// Path that was configured.
        path: PathBuf,
        /// Underlying read failure.
        source: io::Error,
    },

    /// Private key file was read but holds no usable PEM key.
    #[error("Unable to decode PEM key file {}: {reason}", path.display())]
    KeyDecode {
        /// Path that was configured.
        path: PathBuf,
        /// Decoder message.
        reason: String,
    },

    /// Only one half of the certificate/key pair was configured.
    #[error("Incomplete credentials: {0}")]
    IncompleteCredentials(&'static str),

    /// Configuration is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The engine context cannot be closed while sessions still use it.
    #[error("Engine context still referenced by {0} session(s)")]
    ContextInUse(usize),

    // ========================================================================
    // Upgrade Errors
    // ========================================================================
    /// The engine could not allocate a session for the transport.
    #[error("TLS upgrade failed: {0}")]
    Upgrade(EngineError),

    // ========================================================================
    // Handshake Errors
    // ========================================================================
    /// Generic protocol failure reported for every failed handshake.
    ///
    /// The classified reason is kept for diagnostics only.
    #[error("TLS protocol error ({0})")]
    Protocol(HandshakeFailure),

    // ========================================================================
    // Transfer Errors
    // ========================================================================
    /// Transport-level read failure. The stream is not marked end-of-file.
    #[error("Transport read error: {0}")]
    Transport(#[from] io::Error),

    /// The socket has no data yet (non-blocking transport).
    #[error("Operation would block")]
    WouldBlock,

    /// The engine failed to deliver plaintext. The stream is marked end-of-file.
    #[error("TLS read failed: {0}")]
    Read(EngineError),

    /// The engine failed to accept plaintext. The stream is marked end-of-file.
    #[error("TLS write failed: {0}")]
    Write(EngineError),

    /// Write called with an empty buffer.
    #[error("Write length must be greater than zero")]
    InvalidLength,

    /// Session was already closed.
    #[error("TLS session is closed")]
    Closed,
}

impl Error {
    /// Check if the error tears the connection down.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Transport(_) | Error::WouldBlock)
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Transport(e) => e,
            Error::WouldBlock => io::Error::new(io::ErrorKind::WouldBlock, "would block"),
            Error::Closed => io::Error::new(io::ErrorKind::NotConnected, err),
            Error::Protocol(_) => io::Error::new(io::ErrorKind::InvalidData, err),
            Error::Read(_) => io::Error::new(io::ErrorKind::ConnectionAborted, err),
            Error::Write(_) => io::Error::new(io::ErrorKind::BrokenPipe, err),
            Error::InvalidLength => io::Error::new(io::ErrorKind::InvalidInput, err),
            other => io::Error::other(other),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
