// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-connection TLS session.
//!
//! A session is created by upgrading a plain transport and owns exactly one
//! engine session handle. The transport itself is borrowed per call and never
//! stored. Closing is idempotent and also happens on drop.

use std::fmt;
use std::sync::Arc;

use crate::context::EngineContext;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::handshake::{HandshakeFailure, HandshakeState};
use crate::transport::{SocketId, Transport};

/// TLS state of one connection.
pub struct Session<E: Engine> {
    pub(crate) ctx: Arc<EngineContext<E>>,
    /// Engine handle; `None` once closed
    pub(crate) handle: Option<E::Session>,
    pub(crate) state: HandshakeState,
    /// Negotiate calls issued so far
    pub(crate) attempts: u32,
    pub(crate) failure: Option<HandshakeFailure>,
    pub(crate) sid: SocketId,
}

impl<E: Engine> Session<E> {
    /// Upgrade a plain transport to TLS.
    ///
    /// Only allocates the engine session; the handshake runs on the first
    /// read or write. On failure the connection must not be used for TLS.
    pub fn upgrade<T: Transport>(ctx: &Arc<EngineContext<E>>, transport: &mut T) -> Result<Self> {
        let sid = transport.id();
        match ctx.engine().accept(&*transport) {
            Ok(handle) => {
                log::debug!("[TLS] {} upgraded ({} engine)", sid, ctx.engine().name());
                Ok(Self {
                    ctx: Arc::clone(ctx),
                    handle: Some(handle),
                    state: HandshakeState::NotStarted,
                    attempts: 0,
                    failure: None,
                    sid,
                })
            }
            Err(err) => {
                log::warn!("[TLS] {} upgrade failed: {}", sid, err);
                Err(Error::Upgrade(err))
            }
        }
    }

    /// Identifier of the transport this session was upgraded from.
    pub fn id(&self) -> SocketId {
        self.sid
    }

    /// Handshake state.
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Check if the handshake completed.
    pub fn is_connected(&self) -> bool {
        self.state == HandshakeState::Connected
    }

    /// Check if the engine handle is still held.
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Classified reason of a failed handshake.
    pub fn handshake_failure(&self) -> Option<HandshakeFailure> {
        self.failure
    }

    /// Number of negotiate calls issued for this session.
    pub fn handshake_attempts(&self) -> u32 {
        self.attempts
    }

    /// Engine context this session belongs to.
    pub fn context(&self) -> &Arc<EngineContext<E>> {
        &self.ctx
    }

    /// Send a close_notify if the session is connected, then close it.
    ///
    /// A failed close_notify is only logged: the peer may already be gone.
    pub fn shutdown<T: Transport>(&mut self, transport: &mut T) {
        if self.is_connected() {
            if let Some(handle) = self.handle.as_mut() {
                if let Err(err) = self.ctx.engine().close_notify(handle, transport) {
                    log::debug!("[TLS] {} close_notify not delivered: {}", self.sid, err);
                }
            }
        }
        self.close();
    }

    /// Release the engine session. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.ctx.engine().close(handle);
            log::debug!("[TLS] {} session closed", self.sid);
        }
    }

    /// Engine and handle, or [`Error::Closed`].
    pub(crate) fn engine_parts(&mut self) -> Result<(&E, &mut E::Session)> {
        let handle = self.handle.as_mut().ok_or(Error::Closed)?;
        Ok((self.ctx.engine(), handle))
    }
}

impl<E: Engine> Drop for Session<E> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<E: Engine> fmt::Debug for Session<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("sid", &self.sid)
            .field("state", &self.state)
            .field("open", &self.handle.is_some())
            .field("attempts", &self.attempts)
            .field("failure", &self.failure)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::mock::{RecordingTransport, Script, ScriptedEngine};
    use crate::engine::{EngineError, ErrorCode};
    use std::sync::atomic::Ordering;

    fn context(script: Script) -> Arc<EngineContext<ScriptedEngine>> {
        EngineContext::open(ScriptedEngine::new(script), EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_upgrade_binds_transport() {
        let ctx = context(Script::default());
        let mut transport = RecordingTransport::new();

        let session = Session::upgrade(&ctx, &mut transport).unwrap();
        assert_eq!(session.id(), transport.id());
        assert_eq!(session.state(), HandshakeState::NotStarted);
        assert!(session.is_open());
        assert!(!session.is_connected());
    }

    #[test]
    fn test_upgrade_failure() {
        let ctx = context(Script {
            accept: Some(EngineError::new(ErrorCode::NO_SESSION)),
            ..Script::default()
        });
        let mut transport = RecordingTransport::new();

        let err = Session::upgrade(&ctx, &mut transport).unwrap_err();
        assert!(matches!(err, Error::Upgrade(_)));
    }

    #[test]
    fn test_close_is_idempotent() {
        let ctx = context(Script::default());
        let counters = ctx.engine().counters();
        let mut transport = RecordingTransport::new();

        let mut session = Session::upgrade(&ctx, &mut transport).unwrap();
        session.close();
        session.close();
        assert!(!session.is_open());
        drop(session);

        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_closes() {
        let ctx = context(Script::default());
        let counters = ctx.engine().counters();
        let mut transport = RecordingTransport::new();

        drop(Session::upgrade(&ctx, &mut transport).unwrap());
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shutdown_sends_close_notify_when_connected() {
        let ctx = context(Script::default());
        let counters = ctx.engine().counters();
        let mut transport = RecordingTransport::new();

        let mut idle = Session::upgrade(&ctx, &mut transport).unwrap();
        idle.shutdown(&mut transport);
        assert_eq!(counters.close_notifies.load(Ordering::SeqCst), 0);

        let mut session = Session::upgrade(&ctx, &mut transport).unwrap();
        session.write(&mut transport, b"bye").unwrap();
        session.shutdown(&mut transport);
        session.shutdown(&mut transport);
        assert_eq!(counters.close_notifies.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_sessions_keep_context_alive() {
        let ctx = context(Script::default());
        let counters = ctx.engine().counters();
        let mut transport = RecordingTransport::new();

        let session = Session::upgrade(&ctx, &mut transport).unwrap();
        assert!(matches!(ctx.close(), Err(Error::ContextInUse(1))));
        assert_eq!(counters.releases.load(Ordering::SeqCst), 0);

        drop(session);
        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
    }
}
