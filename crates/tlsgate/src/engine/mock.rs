// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Scripted engine and recording transport for tests.
//!
//! Each session gets a copy of the engine's [`Script`] at accept time and
//! pops one entry per call. Counters are shared across sessions so tests can
//! check how often the adapter reached the engine.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{Engine, EngineError, EngineSettings, ErrorCode, Negotiation, SessionFlags};
use crate::bridge::{EngineModule, LogSink, Severity};
use crate::transport::{SocketFlags, SocketId, Transport};

/// Per-session behavior.
#[derive(Clone, Debug, Default)]
pub struct Script {
    /// Error returned by `open`
    pub open: Option<EngineError>,
    /// Error returned by `accept`
    pub accept: Option<EngineError>,
    /// Negotiate results; `Complete` once exhausted
    pub negotiate: VecDeque<Result<Negotiation, EngineError>>,
    /// Send results; the whole buffer is accepted once exhausted
    pub send: VecDeque<Result<usize, EngineError>>,
    /// Receive results; `WOULD_BLOCK` once exhausted
    pub recv: VecDeque<Result<Vec<u8>, EngineError>>,
    /// Values reported by `recv_pending`; 0 once exhausted
    pub recv_pending: VecDeque<usize>,
    /// Value reported by `send_pending`
    pub send_pending: usize,
}

/// Calls observed across all sessions.
#[derive(Debug, Default)]
pub struct Counters {
    pub opens: AtomicUsize,
    pub releases: AtomicUsize,
    pub accepts: AtomicUsize,
    pub closes: AtomicUsize,
    pub negotiations: AtomicUsize,
    pub sends: AtomicUsize,
    pub recvs: AtomicUsize,
    pub close_notifies: AtomicUsize,
    /// Flags in effect at the last negotiation
    pub negotiated_flags: AtomicU32,
    /// Whether the transport was marked handshaking during negotiation
    pub saw_handshaking: AtomicBool,
}

/// Engine driven by a [`Script`].
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    script: Script,
    counters: Arc<Counters>,
}

impl ScriptedEngine {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }
}

/// Session state of [`ScriptedEngine`].
#[derive(Debug)]
pub struct ScriptedSession {
    script: Script,
    flags: SessionFlags,
    /// Plaintext accepted by `send`
    pub sent: Vec<u8>,
}

impl Engine for ScriptedEngine {
    type Session = ScriptedSession;

    fn name(&self) -> &'static str {
        "scripted"
    }

    fn open(&mut self, _settings: &EngineSettings, sink: LogSink) -> Result<(), EngineError> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        match self.script.open.clone() {
            Some(err) => Err(err),
            None => {
                sink(EngineModule::CORE, Severity::Info, "scripted engine ready");
                Ok(())
            }
        }
    }

    fn release(&mut self) {
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
    }

    fn accept<T: Transport>(&self, _transport: &T) -> Result<ScriptedSession, EngineError> {
        if let Some(err) = self.script.accept.clone() {
            return Err(err);
        }
        self.counters.accepts.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedSession {
            script: self.script.clone(),
            flags: SessionFlags::NONE,
            sent: Vec::new(),
        })
    }

    fn session_flags(&self, session: &ScriptedSession) -> SessionFlags {
        session.flags
    }

    fn set_session_flags(&self, session: &mut ScriptedSession, flags: SessionFlags) {
        session.flags = flags;
    }

    fn negotiate<T: Transport>(
        &self,
        session: &mut ScriptedSession,
        transport: &mut T,
    ) -> Result<Negotiation, EngineError> {
        self.counters.negotiations.fetch_add(1, Ordering::SeqCst);
        self.counters
            .negotiated_flags
            .store(session.flags.bits(), Ordering::SeqCst);
        if transport.flags().contains(SocketFlags::HANDSHAKING) {
            self.counters.saw_handshaking.store(true, Ordering::SeqCst);
        }
        session
            .script
            .negotiate
            .pop_front()
            .unwrap_or(Ok(Negotiation::Complete))
    }

    fn recv<T: Transport>(
        &self,
        session: &mut ScriptedSession,
        _transport: &mut T,
        buf: &mut [u8],
    ) -> Result<usize, EngineError> {
        self.counters.recvs.fetch_add(1, Ordering::SeqCst);
        let chunk = session
            .script
            .recv
            .pop_front()
            .unwrap_or(Err(EngineError::new(ErrorCode::WOULD_BLOCK)))?;
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        Ok(n)
    }

    fn recv_pending(&self, session: &mut ScriptedSession) -> usize {
        session.script.recv_pending.pop_front().unwrap_or(0)
    }

    fn send<T: Transport>(
        &self,
        session: &mut ScriptedSession,
        _transport: &mut T,
        buf: &[u8],
    ) -> Result<usize, EngineError> {
        self.counters.sends.fetch_add(1, Ordering::SeqCst);
        let accepted = session
            .script
            .send
            .pop_front()
            .unwrap_or(Ok(buf.len()))?
            .min(buf.len());
        session.sent.extend_from_slice(&buf[..accepted]);
        Ok(accepted)
    }

    fn send_pending(&self, session: &ScriptedSession) -> usize {
        session.script.send_pending
    }

    fn flush<T: Transport>(
        &self,
        session: &mut ScriptedSession,
        _transport: &mut T,
    ) -> Result<(), EngineError> {
        session.script.send_pending = 0;
        Ok(())
    }

    fn close_notify<T: Transport>(
        &self,
        _session: &mut ScriptedSession,
        _transport: &mut T,
    ) -> Result<(), EngineError> {
        self.counters.close_notifies.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self, _session: ScriptedSession) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Transport that records every signal it receives.
#[derive(Debug)]
pub struct RecordingTransport {
    id: SocketId,
    flags: SocketFlags,
    /// Counts passed to `hidden_data`, one entry per signal
    pub hidden_signals: Vec<usize>,
    /// Counts passed to `reservice`, one entry per signal
    pub reservice_signals: Vec<usize>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            id: SocketId::next(),
            flags: SocketFlags::NONE,
            hidden_signals: Vec::new(),
            reservice_signals: Vec::new(),
        }
    }
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Read for RecordingTransport {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::WouldBlock, "would block"))
    }
}

impl Write for RecordingTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for RecordingTransport {
    fn id(&self) -> SocketId {
        self.id
    }

    fn flags(&self) -> SocketFlags {
        self.flags
    }

    fn set_flag(&mut self, flag: SocketFlags) {
        self.flags.insert(flag);
    }

    fn clear_flag(&mut self, flag: SocketFlags) {
        self.flags.remove(flag);
    }

    fn hidden_data(&mut self, count: usize) {
        self.hidden_signals.push(count);
    }

    fn reservice(&mut self, count: usize) {
        self.reservice_signals.push(count);
    }

    fn set_read_timeout(&mut self, _timeout: Option<Duration>) -> io::Result<()> {
        Ok(())
    }
}
