// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TLS engine call surface.
//!
//! The adapter reaches the engine only through [`Engine`]: open/release of
//! global state, session accept/close, flags, negotiate, send/receive and the
//! two pending-byte queries. Failures come back as [`EngineError`], a numeric
//! [`ErrorCode`] plus optional detail text.
//!
//! [`rustls::RustlsEngine`] is the production engine.

pub mod rustls;

#[cfg(test)]
pub mod mock;

use std::fmt;

use ::rustls::pki_types::CertificateDer;

use crate::bridge::LogSink;
use crate::config::Timeouts;
use crate::credentials::Credentials;
use crate::transport::Transport;

// ============================================================================
// Error Codes
// ============================================================================

/// Engine numeric error code. Failures are negative.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    /// Peer certificate chains to an unknown authority
    pub const UNKNOWN_CERTIFICATE_AUTHORITY: ErrorCode = ErrorCode(-7501);
    /// No cipher suite in common with the peer
    pub const NO_CIPHER_MATCH: ErrorCode = ErrorCode(-7502);
    /// Peer certificate could not be processed
    pub const PROTOCOL_PROCESS_CERTIFICATE: ErrorCode = ErrorCode(-7503);
    /// Peer presented a self-signed certificate
    pub const NO_SELF_SIGNED_CERTIFICATES: ErrorCode = ErrorCode(-7504);
    /// Peer certificate failed validation (dates, usage, revocation)
    pub const CERT_VALIDATION_FAILED: ErrorCode = ErrorCode(-7505);
    /// Generic TLS protocol violation
    pub const PROTOCOL_ERROR: ErrorCode = ErrorCode(-7510);
    /// Operation on a session the engine does not know
    pub const NO_SESSION: ErrorCode = ErrorCode(-7520);
    /// Engine global initialization failed
    pub const INIT_FAILED: ErrorCode = ErrorCode(-7521);

    /// Peer closed the TCP connection
    pub const TCP_SOCKET_CLOSED: ErrorCode = ErrorCode(-7601);
    /// Transport read failed
    pub const TCP_READ_ERROR: ErrorCode = ErrorCode(-7602);
    /// Transport write failed
    pub const TCP_WRITE_ERROR: ErrorCode = ErrorCode(-7603);
    /// Non-blocking transport has nothing to deliver yet
    pub const WOULD_BLOCK: ErrorCode = ErrorCode(-7604);
    /// Hello or receive timeout expired
    pub const TIMEOUT: ErrorCode = ErrorCode(-7605);

    /// Symbolic name, if the code is known.
    pub fn name(&self) -> Option<&'static str> {
        let name = match *self {
            Self::UNKNOWN_CERTIFICATE_AUTHORITY => "UNKNOWN_CERTIFICATE_AUTHORITY",
            Self::NO_CIPHER_MATCH => "NO_CIPHER_MATCH",
            Self::PROTOCOL_PROCESS_CERTIFICATE => "PROTOCOL_PROCESS_CERTIFICATE",
            Self::NO_SELF_SIGNED_CERTIFICATES => "NO_SELF_SIGNED_CERTIFICATES",
            Self::CERT_VALIDATION_FAILED => "CERT_VALIDATION_FAILED",
            Self::PROTOCOL_ERROR => "PROTOCOL_ERROR",
            Self::NO_SESSION => "NO_SESSION",
            Self::INIT_FAILED => "INIT_FAILED",
            Self::TCP_SOCKET_CLOSED => "TCP_SOCKET_CLOSED",
            Self::TCP_READ_ERROR => "TCP_READ_ERROR",
            Self::TCP_WRITE_ERROR => "TCP_WRITE_ERROR",
            Self::WOULD_BLOCK => "WOULD_BLOCK",
            Self::TIMEOUT => "TIMEOUT",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "engine error {}", self.0),
        }
    }
}

/// Engine failure: code plus optional detail from the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineError {
    /// Numeric code
    pub code: ErrorCode,
    /// Engine-provided detail
    pub detail: Option<String>,
}

impl EngineError {
    /// Create an error with no detail.
    pub fn new(code: ErrorCode) -> Self {
        Self { code, detail: None }
    }

    /// Attach detail text.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {}", self.code, detail),
            None => write!(f, "{}", self.code),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<ErrorCode> for EngineError {
    fn from(code: ErrorCode) -> Self {
        Self::new(code)
    }
}

// ============================================================================
// Session Flags
// ============================================================================

/// Per-session engine flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SessionFlags(u32);

impl SessionFlags {
    /// No flags set
    pub const NONE: SessionFlags = SessionFlags(0);

    /// Client must present a certificate
    pub const REQUIRE_MUTUAL_AUTH: SessionFlags = SessionFlags(1 << 0);

    /// Do not send a CertificateRequest at all
    pub const NO_MUTUAL_AUTH_REQUEST: SessionFlags = SessionFlags(1 << 1);

    /// Create from raw bits
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        SessionFlags(bits)
    }

    /// Raw bits value
    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Check if every bit of `other` is set
    #[must_use]
    pub const fn contains(&self, other: SessionFlags) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for SessionFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        SessionFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for SessionFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl std::ops::BitAnd for SessionFlags {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        SessionFlags(self.0 & rhs.0)
    }
}

impl std::ops::Not for SessionFlags {
    type Output = Self;
    fn not(self) -> Self {
        SessionFlags(!self.0)
    }
}

// ============================================================================
// Engine Settings
// ============================================================================

/// Global settings handed to [`Engine::open`].
#[derive(Clone, Debug)]
pub struct EngineSettings {
    /// Server certificate and key, if configured
    pub credentials: Option<Credentials>,
    /// Trust anchors for client certificates
    pub client_roots: Vec<CertificateDer<'static>>,
    /// Hello/receive timeouts
    pub timeouts: Timeouts,
}

/// Result of one negotiate call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Negotiation {
    /// Handshake finished
    Complete,
    /// Transport has no data yet; call again when it is readable
    Pending,
}

// ============================================================================
// Engine Trait
// ============================================================================

/// Narrow call surface of a server-side TLS engine.
///
/// `open` and `release` run once per context. Every other call is scoped to
/// one session and never runs concurrently for the same session.
pub trait Engine: Send + Sync {
    /// Per-connection engine state.
    type Session: Send;

    /// Engine name for diagnostics.
    fn name(&self) -> &'static str;

    /// Initialize global state. Diagnostics go to `sink`.
    fn open(&mut self, settings: &EngineSettings, sink: LogSink) -> Result<(), EngineError>;

    /// Release global state and key material.
    fn release(&mut self);

    /// Allocate a session bound to `transport`.
    fn accept<T: Transport>(&self, transport: &T) -> Result<Self::Session, EngineError>;

    /// Current session flags.
    fn session_flags(&self, session: &Self::Session) -> SessionFlags;

    /// Replace session flags. Takes effect at negotiation.
    fn set_session_flags(&self, session: &mut Self::Session, flags: SessionFlags);

    /// Drive the handshake. May block on the transport.
    fn negotiate<T: Transport>(
        &self,
        session: &mut Self::Session,
        transport: &mut T,
    ) -> Result<Negotiation, EngineError>;

    /// Receive up to `buf.len()` plaintext bytes. May block on the transport.
    fn recv<T: Transport>(
        &self,
        session: &mut Self::Session,
        transport: &mut T,
        buf: &mut [u8],
    ) -> Result<usize, EngineError>;

    /// Decrypted bytes buffered and not yet returned by `recv`.
    fn recv_pending(&self, session: &mut Self::Session) -> usize;

    /// Send plaintext. Returns how many bytes the engine accepted.
    fn send<T: Transport>(
        &self,
        session: &mut Self::Session,
        transport: &mut T,
        buf: &[u8],
    ) -> Result<usize, EngineError>;

    /// Encrypted bytes buffered and not yet written to the transport.
    fn send_pending(&self, session: &Self::Session) -> usize;

    /// Write buffered encrypted bytes to the transport.
    fn flush<T: Transport>(
        &self,
        session: &mut Self::Session,
        transport: &mut T,
    ) -> Result<(), EngineError>;

    /// Queue and write a close_notify alert.
    fn close_notify<T: Transport>(
        &self,
        session: &mut Self::Session,
        transport: &mut T,
    ) -> Result<(), EngineError>;

    /// Release the session.
    fn close(&self, session: Self::Session);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_display() {
        assert_eq!(
            ErrorCode::NO_CIPHER_MATCH.to_string(),
            "NO_CIPHER_MATCH (-7502)"
        );
        assert_eq!(ErrorCode(-1).to_string(), "engine error -1");
        assert!(ErrorCode(-1).name().is_none());
    }

    #[test]
    fn test_engine_error_detail() {
        let err = EngineError::new(ErrorCode::TCP_READ_ERROR).with_detail("connection reset");
        assert!(err.to_string().ends_with(": connection reset"));
        assert_eq!(EngineError::from(ErrorCode::TIMEOUT).code, ErrorCode::TIMEOUT);
    }

    #[test]
    fn test_session_flags() {
        let mut flags = SessionFlags::NONE;
        flags |= SessionFlags::REQUIRE_MUTUAL_AUTH;
        assert!(flags.contains(SessionFlags::REQUIRE_MUTUAL_AUTH));
        assert!(!flags.contains(SessionFlags::NO_MUTUAL_AUTH_REQUEST));

        let cleared = flags & !SessionFlags::REQUIRE_MUTUAL_AUTH;
        assert_eq!(cleared, SessionFlags::NONE);
        assert_eq!(SessionFlags::from_bits(3).bits(), 3);
    }
}
