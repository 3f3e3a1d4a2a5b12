// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! rustls-backed engine.
//!
//! A session starts as a [`rustls::server::Acceptor`] so the server
//! configuration can be chosen from the session flags once the ClientHello is
//! in, then becomes a [`rustls::ServerConnection`]. Encrypted output goes
//! through a per-session outbox so the adapter can ask how many bytes are
//! still unsent. The outbox is bounded: once it holds [`MAX_OUTBOX`] bytes,
//! `send` reports `WOULD_BLOCK` until the transport drains it.
//!
//! Session resumption is disabled. No cache or ticket state is shared between
//! sessions.
//!
//! Transport I/O is plain `read`/`write` on the borrowed transport: it blocks
//! when the transport blocks and reports `WouldBlock` when it does not.

use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Instant;

use ::rustls::server::{Acceptor, NoServerSessionStorage, WebPkiClientVerifier};
use ::rustls::{
    AlertDescription, CertificateError, RootCertStore, ServerConfig, ServerConnection,
};

use super::{Engine, EngineError, EngineSettings, ErrorCode, Negotiation, SessionFlags};
use crate::bridge::{self, EngineModule, LogSink, Severity};
use crate::config::Timeouts;
use crate::transport::{SocketId, Transport};

/// Plaintext chunk accepted per `send` call.
const MAX_SEND_CHUNK: usize = 16 * 1024;

/// Unsent encrypted bytes a session may hold before `send` pushes back.
pub const MAX_OUTBOX: usize = 64 * 1024;

// ============================================================================
// Session
// ============================================================================

enum Phase {
    /// Waiting for a complete ClientHello
    Accepting(Acceptor),
    /// Server connection created, handshake running or done
    Established(Box<ServerConnection>),
}

/// Per-connection rustls state.
pub struct RustlsSession {
    id: SocketId,
    phase: Phase,
    flags: SessionFlags,
    /// TLS records produced but not yet written to the transport
    outbox: Vec<u8>,
    /// Decrypted bytes rustls holds that `recv` has not returned yet
    plaintext: usize,
    hello_started: Option<Instant>,
}

impl RustlsSession {
    /// Transport the session was accepted on.
    pub fn id(&self) -> SocketId {
        self.id
    }

    /// Check if the handshake has finished.
    pub fn is_established(&self) -> bool {
        match &self.phase {
            Phase::Established(conn) => !conn.is_handshaking(),
            Phase::Accepting(_) => false,
        }
    }
}

impl fmt::Debug for RustlsSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RustlsSession")
            .field("id", &self.id)
            .field("established", &self.is_established())
            .field("flags", &self.flags)
            .field("outbox", &self.outbox.len())
            .finish()
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Server-side TLS engine over rustls.
pub struct RustlsEngine {
    /// Configuration used when no client certificate is requested
    plain: Option<Arc<ServerConfig>>,
    /// Configuration that requires a client certificate
    mutual: Option<Arc<ServerConfig>>,
    timeouts: Timeouts,
    sink: LogSink,
}

impl RustlsEngine {
    /// Create an engine with no configuration loaded.
    pub fn new() -> Self {
        Self {
            plain: None,
            mutual: None,
            timeouts: Timeouts::default(),
            sink: bridge::discard,
        }
    }

    /// Check if a server certificate is loaded.
    pub fn has_certificate(&self) -> bool {
        self.plain.is_some()
    }

    fn log(&self, module: EngineModule, severity: Severity, message: &str) {
        (self.sink)(module, severity, message);
    }

    fn config_for(&self, flags: SessionFlags) -> Result<Arc<ServerConfig>, EngineError> {
        if flags.contains(SessionFlags::REQUIRE_MUTUAL_AUTH) {
            return self.mutual.clone().ok_or_else(|| {
                EngineError::new(ErrorCode::PROTOCOL_ERROR)
                    .with_detail("mutual authentication requested without client trust anchors")
            });
        }
        self.plain.clone().ok_or_else(|| {
            EngineError::new(ErrorCode::NO_SESSION).with_detail("no server certificate loaded")
        })
    }

    fn drive_handshake<T: Transport>(
        &self,
        session: &mut RustlsSession,
        transport: &mut T,
    ) -> Result<Negotiation, EngineError> {
        loop {
            match &mut session.phase {
                Phase::Accepting(acceptor) => {
                    match acceptor.read_tls(transport) {
                        Ok(0) => {
                            return Err(EngineError::new(ErrorCode::TCP_SOCKET_CLOSED)
                                .with_detail("peer closed before ClientHello"));
                        }
                        Ok(_) => {}
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                            return Ok(Negotiation::Pending);
                        }
                        Err(e) => return Err(read_failure(e)),
                    }

                    let accepted = match acceptor.accept() {
                        Ok(None) => continue,
                        Ok(Some(accepted)) => accepted,
                        Err((err, mut alert)) => {
                            let _ = alert.write_all(transport);
                            return Err(tls_failure(&err));
                        }
                    };

                    let server_name = accepted
                        .client_hello()
                        .server_name()
                        .map(str::to_owned)
                        .unwrap_or_default();
                    self.log(
                        EngineModule::HANDSHAKE,
                        Severity::Debug,
                        &format!("{} ClientHello (server name '{}')", session.id, server_name),
                    );

                    let config = self.config_for(session.flags)?;
                    match accepted.into_connection(config) {
                        Ok(conn) => session.phase = Phase::Established(Box::new(conn)),
                        Err((err, mut alert)) => {
                            let _ = alert.write_all(transport);
                            return Err(tls_failure(&err));
                        }
                    }
                }
                Phase::Established(conn) => {
                    stage(conn, &mut session.outbox)?;
                    if !drain(&mut session.outbox, transport)? {
                        return Ok(Negotiation::Pending);
                    }
                    if !conn.is_handshaking() {
                        return Ok(Negotiation::Complete);
                    }

                    match conn.read_tls(transport) {
                        Ok(0) => {
                            return Err(EngineError::new(ErrorCode::TCP_SOCKET_CLOSED)
                                .with_detail("peer closed during handshake"));
                        }
                        Ok(_) => match conn.process_new_packets() {
                            // Early application data may arrive with the Finished flight.
                            Ok(state) => session.plaintext = state.plaintext_bytes_to_read(),
                            Err(err) => {
                                // Deliver the alert rustls queued for the peer.
                                let _ = stage(conn, &mut session.outbox)
                                    .and_then(|()| drain(&mut session.outbox, transport));
                                return Err(tls_failure(&err));
                            }
                        },
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                            return Ok(Negotiation::Pending);
                        }
                        Err(e) => return Err(read_failure(e)),
                    }
                }
            }
        }
    }
}

impl Default for RustlsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RustlsEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RustlsEngine")
            .field("certificate", &self.plain.is_some())
            .field("mutual_auth", &self.mutual.is_some())
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl Engine for RustlsEngine {
    type Session = RustlsSession;

    fn name(&self) -> &'static str {
        "rustls"
    }

    fn open(&mut self, settings: &EngineSettings, sink: LogSink) -> Result<(), EngineError> {
        self.sink = sink;
        self.timeouts = settings.timeouts;

        let Some(credentials) = &settings.credentials else {
            self.log(
                EngineModule::CORE,
                Severity::Warning,
                "no server certificate configured; sessions cannot be accepted",
            );
            return Ok(());
        };

        let plain = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(credentials.chain().to_vec(), credentials.key().clone_key())
            .map_err(|e| init_failure("server certificate rejected", e))?;
        self.plain = Some(Arc::new(without_resumption(plain)));

        if !settings.client_roots.is_empty() {
            let mut roots = RootCertStore::empty();
            for cert in &settings.client_roots {
                roots
                    .add(cert.clone())
                    .map_err(|e| init_failure("client CA certificate rejected", e))?;
            }

            let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
                .build()
                .map_err(|e| init_failure("client verifier", e))?;

            let mutual = ServerConfig::builder()
                .with_client_cert_verifier(verifier)
                .with_single_cert(credentials.chain().to_vec(), credentials.key().clone_key())
                .map_err(|e| init_failure("server certificate rejected", e))?;
            self.mutual = Some(Arc::new(without_resumption(mutual)));
        }

        self.log(
            EngineModule::CORE,
            Severity::Info,
            &format!(
                "rustls engine ready ({} certificate(s), {} client trust anchor(s))",
                credentials.chain().len(),
                settings.client_roots.len()
            ),
        );
        Ok(())
    }

    fn release(&mut self) {
        self.plain = None;
        self.mutual = None;
        self.log(EngineModule::CORE, Severity::Info, "rustls engine released");
    }

    fn accept<T: Transport>(&self, transport: &T) -> Result<RustlsSession, EngineError> {
        if self.plain.is_none() {
            return Err(EngineError::new(ErrorCode::NO_SESSION)
                .with_detail("no server certificate loaded"));
        }

        Ok(RustlsSession {
            id: transport.id(),
            phase: Phase::Accepting(Acceptor::default()),
            flags: SessionFlags::NONE,
            outbox: Vec::new(),
            plaintext: 0,
            hello_started: None,
        })
    }

    fn session_flags(&self, session: &RustlsSession) -> SessionFlags {
        session.flags
    }

    fn set_session_flags(&self, session: &mut RustlsSession, flags: SessionFlags) {
        session.flags = flags;
    }

    fn negotiate<T: Transport>(
        &self,
        session: &mut RustlsSession,
        transport: &mut T,
    ) -> Result<Negotiation, EngineError> {
        if let Err(e) = transport.set_read_timeout(Some(self.timeouts.hello)) {
            log::debug!("[TLS] {} hello timeout not applied: {}", session.id, e);
        }
        let started = *session.hello_started.get_or_insert_with(Instant::now);

        match self.drive_handshake(session, transport) {
            Ok(Negotiation::Complete) => {
                if let Err(e) = transport.set_read_timeout(Some(self.timeouts.receive)) {
                    log::debug!("[TLS] {} receive timeout not applied: {}", session.id, e);
                }
                self.log(
                    EngineModule::HANDSHAKE,
                    Severity::Debug,
                    &format!("{} handshake complete", session.id),
                );
                Ok(Negotiation::Complete)
            }
            Ok(Negotiation::Pending) if started.elapsed() >= self.timeouts.hello => {
                Err(EngineError::new(ErrorCode::TIMEOUT).with_detail("hello timeout expired"))
            }
            Ok(Negotiation::Pending) => Ok(Negotiation::Pending),
            Err(err) => {
                self.log(
                    failure_module(err.code),
                    Severity::Error,
                    &format!("{} handshake failed: {}", session.id, err),
                );
                Err(err)
            }
        }
    }

    fn recv<T: Transport>(
        &self,
        session: &mut RustlsSession,
        transport: &mut T,
        buf: &mut [u8],
    ) -> Result<usize, EngineError> {
        let conn = established(&mut session.phase)?;
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            match conn.reader().read(buf) {
                Ok(0) => {
                    self.log(
                        EngineModule::RECORD,
                        Severity::Debug,
                        &format!("{} close_notify received", session.id),
                    );
                    return Err(EngineError::new(ErrorCode::TCP_SOCKET_CLOSED)
                        .with_detail("close_notify received"));
                }
                Ok(n) => {
                    session.plaintext = session.plaintext.saturating_sub(n);
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Err(EngineError::new(ErrorCode::TCP_SOCKET_CLOSED)
                        .with_detail("peer closed without close_notify"));
                }
                Err(e) => {
                    return Err(
                        EngineError::new(ErrorCode::PROTOCOL_ERROR).with_detail(e.to_string())
                    );
                }
            }

            match conn.read_tls(transport) {
                // rustls records the EOF; the next reader() call reports it.
                Ok(0) => {}
                Ok(_) => {
                    match conn.process_new_packets() {
                        Ok(state) => session.plaintext = state.plaintext_bytes_to_read(),
                        Err(err) => {
                            let _ = stage(conn, &mut session.outbox)
                                .and_then(|()| drain(&mut session.outbox, transport));
                            let failure = tls_failure(&err);
                            self.log(
                                EngineModule::RECORD,
                                Severity::Error,
                                &format!("{} record rejected: {}", session.id, failure),
                            );
                            return Err(failure);
                        }
                    }
                    // Key updates and alerts produce output while reading.
                    stage(conn, &mut session.outbox)?;
                    drain(&mut session.outbox, transport)?;
                }
                Err(e) => return Err(read_failure(e)),
            }
        }
    }

    fn recv_pending(&self, session: &mut RustlsSession) -> usize {
        match &session.phase {
            Phase::Established(_) => session.plaintext,
            Phase::Accepting(_) => 0,
        }
    }

    fn send<T: Transport>(
        &self,
        session: &mut RustlsSession,
        transport: &mut T,
        buf: &[u8],
    ) -> Result<usize, EngineError> {
        let conn = established(&mut session.phase)?;

        // Backpressure: no new plaintext while the outbox is full.
        if session.outbox.len() >= MAX_OUTBOX && !drain(&mut session.outbox, transport)? {
            log::trace!(
                "[TLS] {} outbox full ({} bytes unsent)",
                session.id,
                session.outbox.len()
            );
            return Err(EngineError::new(ErrorCode::WOULD_BLOCK).with_detail("outbox full"));
        }

        let chunk = &buf[..buf.len().min(MAX_SEND_CHUNK)];
        let accepted = conn
            .writer()
            .write(chunk)
            .map_err(|e| EngineError::new(ErrorCode::PROTOCOL_ERROR).with_detail(e.to_string()))?;

        stage(conn, &mut session.outbox)?;
        drain(&mut session.outbox, transport)?;

        log::trace!(
            "[TLS] {} accepted {} plaintext bytes, {} encrypted bytes pending",
            session.id,
            accepted,
            session.outbox.len()
        );
        Ok(accepted)
    }

    fn send_pending(&self, session: &RustlsSession) -> usize {
        session.outbox.len()
    }

    fn flush<T: Transport>(
        &self,
        session: &mut RustlsSession,
        transport: &mut T,
    ) -> Result<(), EngineError> {
        if let Phase::Established(conn) = &mut session.phase {
            stage(conn, &mut session.outbox)?;
        }
        drain(&mut session.outbox, transport)?;
        Ok(())
    }

    fn close_notify<T: Transport>(
        &self,
        session: &mut RustlsSession,
        transport: &mut T,
    ) -> Result<(), EngineError> {
        if let Phase::Established(conn) = &mut session.phase {
            conn.send_close_notify();
            stage(conn, &mut session.outbox)?;
            drain(&mut session.outbox, transport)?;
        }
        Ok(())
    }

    fn close(&self, session: RustlsSession) {
        if !session.outbox.is_empty() {
            log::debug!(
                "[TLS] {} closed with {} unsent bytes",
                session.id,
                session.outbox.len()
            );
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn established(phase: &mut Phase) -> Result<&mut ServerConnection, EngineError> {
    match phase {
        Phase::Established(conn) => Ok(&mut **conn),
        Phase::Accepting(_) => Err(EngineError::new(ErrorCode::NO_SESSION)
            .with_detail("handshake has not produced a connection")),
    }
}

/// Move queued TLS records from rustls into the outbox.
fn stage(conn: &mut ServerConnection, outbox: &mut Vec<u8>) -> Result<(), EngineError> {
    while conn.wants_write() {
        conn.write_tls(outbox)
            .map_err(|e| EngineError::new(ErrorCode::PROTOCOL_ERROR).with_detail(e.to_string()))?;
    }
    Ok(())
}

/// Write the outbox to the transport. Returns `false` if the transport
/// would block before the outbox emptied.
fn drain<T: Transport>(outbox: &mut Vec<u8>, transport: &mut T) -> Result<bool, EngineError> {
    while !outbox.is_empty() {
        match transport.write(&outbox[..]) {
            Ok(0) => {
                return Err(EngineError::new(ErrorCode::TCP_WRITE_ERROR)
                    .with_detail("transport accepted no bytes"));
            }
            Ok(n) => {
                outbox.drain(..n);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                return Err(EngineError::new(ErrorCode::TCP_WRITE_ERROR).with_detail(e.to_string()));
            }
        }
    }
    Ok(true)
}

fn read_failure(err: io::Error) -> EngineError {
    let code = match err.kind() {
        io::ErrorKind::WouldBlock => ErrorCode::WOULD_BLOCK,
        io::ErrorKind::TimedOut => ErrorCode::TIMEOUT,
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted => ErrorCode::TCP_SOCKET_CLOSED,
        _ => ErrorCode::TCP_READ_ERROR,
    };
    EngineError::new(code).with_detail(err.to_string())
}

fn init_failure(context: &str, err: impl fmt::Display) -> EngineError {
    EngineError::new(ErrorCode::INIT_FAILED).with_detail(format!("{}: {}", context, err))
}

/// Strip the resumption state rustls enables by default.
fn without_resumption(mut config: ServerConfig) -> ServerConfig {
    config.session_storage = Arc::new(NoServerSessionStorage {});
    config.send_tls13_tickets = 0;
    config
}

/// Engine module a handshake failure is reported under.
fn failure_module(code: ErrorCode) -> EngineModule {
    match code {
        ErrorCode::UNKNOWN_CERTIFICATE_AUTHORITY
        | ErrorCode::PROTOCOL_PROCESS_CERTIFICATE
        | ErrorCode::NO_SELF_SIGNED_CERTIFICATES
        | ErrorCode::CERT_VALIDATION_FAILED => EngineModule::CERTIFICATE,
        _ => EngineModule::HANDSHAKE,
    }
}

fn tls_failure(err: &::rustls::Error) -> EngineError {
    EngineError::new(error_code(err)).with_detail(err.to_string())
}

/// Map a rustls error onto the engine error codes.
pub fn error_code(err: &::rustls::Error) -> ErrorCode {
    use ::rustls::Error as TlsError;

    match err {
        TlsError::InvalidCertificate(CertificateError::UnknownIssuer)
        | TlsError::AlertReceived(AlertDescription::UnknownCA) => {
            ErrorCode::UNKNOWN_CERTIFICATE_AUTHORITY
        }
        TlsError::PeerIncompatible(_) => ErrorCode::NO_CIPHER_MATCH,
        TlsError::NoCertificatesPresented
        | TlsError::InvalidCertificate(CertificateError::BadEncoding)
        | TlsError::InvalidCertificate(CertificateError::BadSignature)
        | TlsError::AlertReceived(AlertDescription::BadCertificate)
        | TlsError::AlertReceived(AlertDescription::UnsupportedCertificate) => {
            ErrorCode::PROTOCOL_PROCESS_CERTIFICATE
        }
        TlsError::InvalidCertificate(_)
        | TlsError::AlertReceived(AlertDescription::CertificateExpired)
        | TlsError::AlertReceived(AlertDescription::CertificateRevoked)
        | TlsError::AlertReceived(AlertDescription::CertificateUnknown) => {
            ErrorCode::CERT_VALIDATION_FAILED
        }
        _ => ErrorCode::PROTOCOL_ERROR,
    }
}

// ============================================================================
// Tests
// ============================================================================
