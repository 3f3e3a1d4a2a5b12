// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Handshake state machine.
//!
//! ```text
//! NotStarted --> Handshaking --> Connected   (terminal)
//!                     |
//!                     +--------> Failed      (terminal, never retried)
//! ```
//!
//! The handshake is entered lazily by the first read or write. While the
//! engine negotiates, the transport carries [`SocketFlags::HANDSHAKING`].
//! Negotiation may block on the transport until the hello timeout.

use std::fmt;
use std::ops::{Deref, DerefMut};

use crate::engine::{Engine, ErrorCode, Negotiation, SessionFlags};
use crate::session::Session;
use crate::transport::{SocketFlags, Transport};

// ============================================================================
// States and Outcomes
// ============================================================================

/// Handshake progress of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandshakeState {
    /// No negotiation yet
    NotStarted,
    /// Negotiation started, not finished
    Handshaking,
    /// Secure channel established
    Connected,
    /// Negotiation failed; the connection is torn down
    Failed,
}

impl HandshakeState {
    /// Check if the state can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, HandshakeState::Connected | HandshakeState::Failed)
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeState::NotStarted => write!(f, "NotStarted"),
            HandshakeState::Handshaking => write!(f, "Handshaking"),
            HandshakeState::Connected => write!(f, "Connected"),
            HandshakeState::Failed => write!(f, "Failed"),
        }
    }
}

/// Result of one handshake step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// Negotiation failed
    Failed,
    /// Negotiation needs more transport data
    InProgress,
    /// Negotiation finished
    Complete,
}

// ============================================================================
// Failure Classification
// ============================================================================

/// Classified handshake failure, kept for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandshakeFailure {
    /// Peer certificate chains to an unknown authority
    UnknownCertificateAuthority,
    /// No cipher suite in common
    NoCipherMatch,
    /// Peer certificate could not be processed
    BadCertificate,
    /// Peer certificate is self-signed
    SelfSignedCertificate,
    /// Peer certificate failed validation
    CertificateValidation,
    /// Peer closed the connection mid-handshake
    PeerClosed,
    /// Any other engine code
    Other(i32),
}

impl HandshakeFailure {
    /// Map an engine error code to a failure class.
    pub fn from_code(code: ErrorCode) -> Self {
        match code {
            ErrorCode::UNKNOWN_CERTIFICATE_AUTHORITY => Self::UnknownCertificateAuthority,
            ErrorCode::NO_CIPHER_MATCH => Self::NoCipherMatch,
            ErrorCode::PROTOCOL_PROCESS_CERTIFICATE => Self::BadCertificate,
            ErrorCode::NO_SELF_SIGNED_CERTIFICATES => Self::SelfSignedCertificate,
            ErrorCode::CERT_VALIDATION_FAILED => Self::CertificateValidation,
            ErrorCode::TCP_SOCKET_CLOSED => Self::PeerClosed,
            ErrorCode(other) => Self::Other(other),
        }
    }
}

impl fmt::Display for HandshakeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCertificateAuthority => write!(f, "Unknown certificate authority"),
            Self::NoCipherMatch => write!(f, "No cipher match"),
            Self::BadCertificate => write!(f, "Bad certificate"),
            Self::SelfSignedCertificate => write!(f, "Self-signed certificate"),
            Self::CertificateValidation => write!(f, "Certificate does not validate"),
            Self::PeerClosed => write!(f, "Peer closed connection"),
            Self::Other(code) => write!(f, "Handshake failed with engine code {}", code),
        }
    }
}

// ============================================================================
// Handshaking marker
// ============================================================================

/// Keeps [`SocketFlags::HANDSHAKING`] set for as long as it lives.
struct HandshakingGuard<'a, T: Transport> {
    transport: &'a mut T,
}

impl<'a, T: Transport> HandshakingGuard<'a, T> {
    fn new(transport: &'a mut T) -> Self {
        transport.set_flag(SocketFlags::HANDSHAKING);
        Self { transport }
    }
}

impl<T: Transport> Deref for HandshakingGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.transport
    }
}

impl<T: Transport> DerefMut for HandshakingGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.transport
    }
}

impl<T: Transport> Drop for HandshakingGuard<'_, T> {
    fn drop(&mut self) {
        self.transport.clear_flag(SocketFlags::HANDSHAKING);
    }
}

// ============================================================================
// Handshake step
// ============================================================================

impl<E: Engine> Session<E> {
    /// Run one handshake step.
    ///
    /// Terminal states return immediately without reaching the engine, so a
    /// failed handshake is never retried. On failure the transport is marked
    /// end-of-file.
    pub fn handshake<T: Transport>(&mut self, transport: &mut T) -> HandshakeOutcome {
        match self.state {
            HandshakeState::Connected => return HandshakeOutcome::Complete,
            HandshakeState::Failed => return HandshakeOutcome::Failed,
            HandshakeState::NotStarted | HandshakeState::Handshaking => {}
        }

        let verify_peer = self.ctx.config().verify_peer();
        let engine = self.ctx.engine();
        let Some(handle) = self.handle.as_mut() else {
            return HandshakeOutcome::Failed;
        };

        self.state = HandshakeState::Handshaking;
        self.attempts += 1;

        let result = {
            let mut guard = HandshakingGuard::new(transport);

            let mutual = SessionFlags::REQUIRE_MUTUAL_AUTH | SessionFlags::NO_MUTUAL_AUTH_REQUEST;
            let mut flags = engine.session_flags(handle) & !mutual;
            flags |= if verify_peer {
                SessionFlags::REQUIRE_MUTUAL_AUTH
            } else {
                SessionFlags::NO_MUTUAL_AUTH_REQUEST
            };
            engine.set_session_flags(handle, flags);

            engine.negotiate(handle, &mut *guard)
        };

        match result {
            Ok(Negotiation::Complete) => {
                self.state = HandshakeState::Connected;
                log::debug!("[TLS] {} handshake complete", self.sid);
                HandshakeOutcome::Complete
            }
            Ok(Negotiation::Pending) => HandshakeOutcome::InProgress,
            Err(err) if err.code == ErrorCode::WOULD_BLOCK => HandshakeOutcome::InProgress,
            Err(err) => {
                let failure = HandshakeFailure::from_code(err.code);
                log::info!("[TLS] {} handshake failed: {}", self.sid, failure);
                log::debug!("[TLS] {} negotiate error {}", self.sid, err);

                transport.set_flag(SocketFlags::EOF);
                self.failure = Some(failure);
                self.state = HandshakeState::Failed;
                HandshakeOutcome::Failed
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
