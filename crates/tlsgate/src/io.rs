// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Read/write transfer over an established session.
//!
//! Both directions drive the handshake first when the session is not yet
//! connected. A read issues exactly one engine receive; a write loops until
//! the engine has accepted the whole buffer. Bytes the engine still buffers
//! afterwards are reported to the transport so the event loop does not stall:
//!
//! - decrypted bytes after a read: [`Transport::hidden_data`]
//! - encrypted bytes after a write: [`Transport::reservice`]

use std::io;

use crate::engine::{Engine, EngineError, ErrorCode};
use crate::error::{Error, Result};
use crate::handshake::{HandshakeFailure, HandshakeOutcome};
use crate::session::Session;
use crate::transport::{SocketFlags, Transport};

impl<E: Engine> Session<E> {
    /// Read decrypted bytes into `buf`.
    ///
    /// Returns `Ok(0)` while the handshake is still in progress. A transport
    /// read failure or an empty non-blocking socket leaves the stream open;
    /// every other engine failure marks the transport end-of-file.
    pub fn read<T: Transport>(&mut self, transport: &mut T, buf: &mut [u8]) -> Result<usize> {
        if !self.is_open() {
            return Err(Error::Closed);
        }
        if let Some(pending) = self.drive_handshake(transport)? {
            return Ok(pending);
        }

        let sid = self.sid;
        let (engine, handle) = self.engine_parts()?;

        match engine.recv(handle, transport, buf) {
            Ok(n) => {
                let buffered = engine.recv_pending(handle);
                log::trace!("[TLS] {} read {} bytes, {} buffered", sid, n, buffered);
                if buffered > 0 {
                    transport.hidden_data(buffered);
                }
                Ok(n)
            }
            Err(err) if err.code == ErrorCode::WOULD_BLOCK => Err(Error::WouldBlock),
            Err(err) if err.code == ErrorCode::TCP_READ_ERROR => {
                log::debug!("[TLS] {} transport read error: {}", sid, err);
                Err(Error::Transport(io::Error::other(err)))
            }
            Err(err) => {
                log::debug!("[TLS] {} receive failed: {}", sid, err);
                transport.set_flag(SocketFlags::EOF);
                Err(Error::Read(err))
            }
        }
    }

    /// Encrypt and send all of `buf`.
    ///
    /// Returns `Ok(0)` while the handshake is still in progress, otherwise
    /// the full length. Partial engine sends are retried with the remainder.
    /// When the engine's outbox is full the bytes accepted so far are
    /// returned, or `Error::WouldBlock` if there were none, and a re-service
    /// is requested. A send that accepts nothing or fails marks the transport
    /// end-of-file.
    pub fn write<T: Transport>(&mut self, transport: &mut T, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Err(Error::InvalidLength);
        }
        if !self.is_open() {
            return Err(Error::Closed);
        }
        if let Some(pending) = self.drive_handshake(transport)? {
            return Ok(pending);
        }

        let sid = self.sid;
        let (engine, handle) = self.engine_parts()?;

        let mut remaining = buf;
        let mut total = 0usize;
        while !remaining.is_empty() {
            let result = match engine.send(handle, transport, remaining) {
                Ok(0) => Err(EngineError::new(ErrorCode::TCP_WRITE_ERROR)
                    .with_detail("engine accepted no bytes")),
                other => other,
            };

            match result {
                Ok(n) => {
                    let n = n.min(remaining.len());
                    total += n;
                    remaining = &remaining[n..];
                }
                Err(err) if err.code == ErrorCode::WOULD_BLOCK => {
                    let unsent = engine.send_pending(handle);
                    log::trace!(
                        "[TLS] {} send blocked after {} of {} bytes, {} unsent",
                        sid,
                        total,
                        buf.len(),
                        unsent
                    );
                    if unsent > 0 {
                        transport.reservice(unsent);
                    }
                    return if total > 0 { Ok(total) } else { Err(Error::WouldBlock) };
                }
                Err(err) => {
                    log::warn!(
                        "[TLS] {} send failed after {} of {} bytes: {}",
                        sid,
                        total,
                        buf.len(),
                        err
                    );
                    transport.set_flag(SocketFlags::EOF);
                    return Err(Error::Write(err));
                }
            }
        }

        let unsent = engine.send_pending(handle);
        log::trace!("[TLS] {} wrote {} bytes, {} unsent", sid, total, unsent);
        if unsent > 0 {
            transport.reservice(unsent);
        }
        Ok(total)
    }

    /// Push encrypted bytes the engine still holds to the transport.
    ///
    /// Requests another re-service if some remain.
    pub fn flush<T: Transport>(&mut self, transport: &mut T) -> Result<()> {
        if !self.is_connected() {
            return Ok(());
        }
        let sid = self.sid;
        let (engine, handle) = self.engine_parts()?;

        if let Err(err) = engine.flush(handle, transport) {
            log::warn!("[TLS] {} flush failed: {}", sid, err);
            transport.set_flag(SocketFlags::EOF);
            return Err(Error::Write(err));
        }

        let unsent = engine.send_pending(handle);
        if unsent > 0 {
            transport.reservice(unsent);
        }
        Ok(())
    }

    /// Bind the session to a transport as a `std::io` stream.
    pub fn stream<'a, T: Transport>(&'a mut self, transport: &'a mut T) -> SessionStream<'a, E, T> {
        SessionStream {
            session: self,
            transport,
        }
    }

    /// Run the handshake if needed. `Some(0)` means the caller must return
    /// zero bytes because negotiation is still in progress.
    fn drive_handshake<T: Transport>(&mut self, transport: &mut T) -> Result<Option<usize>> {
        if self.is_connected() {
            return Ok(None);
        }
        match self.handshake(transport) {
            HandshakeOutcome::Complete => Ok(None),
            HandshakeOutcome::InProgress => Ok(Some(0)),
            HandshakeOutcome::Failed => Err(Error::Protocol(
                self.handshake_failure()
                    .unwrap_or(HandshakeFailure::Other(ErrorCode::PROTOCOL_ERROR.0)),
            )),
        }
    }
}

// ============================================================================
// std::io adapter
// ============================================================================

/// A session bound to its transport for the length of a borrow.
///
/// Implements `std::io::Read` and `std::io::Write`. A handshake still in
/// progress surfaces as `ErrorKind::WouldBlock`; a peer that closed the
/// connection reads as end of stream.
pub struct SessionStream<'a, E: Engine, T: Transport> {
    session: &'a mut Session<E>,
    transport: &'a mut T,
}

impl<E: Engine, T: Transport> SessionStream<'_, E, T> {
    /// The bound session.
    pub fn session(&self) -> &Session<E> {
        self.session
    }

    /// The bound transport.
    pub fn transport(&self) -> &T {
        self.transport
    }
}

fn in_progress() -> io::Error {
    io::Error::new(io::ErrorKind::WouldBlock, "TLS handshake in progress")
}

impl<E: Engine, T: Transport> io::Read for SessionStream<'_, E, T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.session.read(self.transport, buf) {
            Ok(0) if !self.session.is_connected() => Err(in_progress()),
            Ok(n) => Ok(n),
            Err(Error::Read(err)) if err.code == ErrorCode::TCP_SOCKET_CLOSED => Ok(0),
            Err(err) => Err(err.into()),
        }
    }
}

impl<E: Engine, T: Transport> io::Write for SessionStream<'_, E, T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.session.write(self.transport, buf) {
            Ok(0) => Err(in_progress()),
            Ok(n) => Ok(n),
            Err(err) => Err(err.into()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.session.flush(self.transport)?;
        self.transport.flush()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::context::EngineContext;
    use crate::engine::mock::{RecordingTransport, Script, ScriptedEngine};
    use crate::engine::Negotiation;
    use std::collections::VecDeque;
    use std::io::{Read, Write};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn context(script: Script) -> Arc<EngineContext<ScriptedEngine>> {
        EngineContext::open(ScriptedEngine::new(script), EngineConfig::default()).unwrap()
    }

    fn connected(
        ctx: &Arc<EngineContext<ScriptedEngine>>,
        transport: &mut RecordingTransport,
    ) -> Session<ScriptedEngine> {
        let mut session = Session::upgrade(ctx, transport).unwrap();
        assert_eq!(session.handshake(transport), HandshakeOutcome::Complete);
        session
    }

    #[test]
    fn test_partial_sends_drain_the_buffer() {
        let ctx = context(Script {
            send: VecDeque::from([Ok(4), Ok(6)]),
            ..Script::default()
        });
        let counters = ctx.engine().counters();
        let mut transport = RecordingTransport::new();
        let mut session = Session::upgrade(&ctx, &mut transport).unwrap();

        let written = session.write(&mut transport, b"0123456789").unwrap();
        assert_eq!(written, 10);
        assert_eq!(counters.sends.load(Ordering::SeqCst), 2);
        assert_eq!(session.handle.as_ref().unwrap().sent, b"0123456789");
    }

    #[test]
    fn test_many_small_chunks() {
        let ctx = context(Script {
            send: (0..10).map(|_| Ok(1)).collect(),
            ..Script::default()
        });
        let mut transport = RecordingTransport::new();
        let mut session = connected(&ctx, &mut transport);

        assert_eq!(session.write(&mut transport, b"abcdefghij").unwrap(), 10);
        assert_eq!(session.handle.as_ref().unwrap().sent, b"abcdefghij");
    }

    #[test]
    fn test_send_failure_is_fatal() {
        let ctx = context(Script {
            send: VecDeque::from([Ok(3), Err(EngineError::new(ErrorCode::TCP_WRITE_ERROR))]),
            ..Script::default()
        });
        let mut transport = RecordingTransport::new();
        let mut session = connected(&ctx, &mut transport);

        let err = session.write(&mut transport, b"0123456789").unwrap_err();
        assert!(matches!(err, Error::Write(_)));
        assert!(transport.is_eof());
    }

    #[test]
    fn test_zero_byte_send_is_fatal() {
        let ctx = context(Script {
            send: VecDeque::from([Ok(0)]),
            ..Script::default()
        });
        let mut transport = RecordingTransport::new();
        let mut session = connected(&ctx, &mut transport);

        let err = session.write(&mut transport, b"abc").unwrap_err();
        assert!(matches!(err, Error::Write(ref e) if e.code == ErrorCode::TCP_WRITE_ERROR));
        assert!(transport.is_eof());
    }

    #[test]
    fn test_full_outbox_is_backpressure() {
        let ctx = context(Script {
            send: VecDeque::from([
                Ok(4),
                Err(EngineError::new(ErrorCode::WOULD_BLOCK)),
                Err(EngineError::new(ErrorCode::WOULD_BLOCK)),
            ]),
            send_pending: 512,
            ..Script::default()
        });
        let mut transport = RecordingTransport::new();
        let mut session = connected(&ctx, &mut transport);

        assert_eq!(session.write(&mut transport, b"0123456789").unwrap(), 4);
        assert!(matches!(
            session.write(&mut transport, b"456789"),
            Err(Error::WouldBlock)
        ));
        assert!(!transport.is_eof());
        assert!(session.is_connected());
        assert_eq!(transport.reservice_signals, vec![512, 512]);
    }

    #[test]
    fn test_empty_write_rejected() {
        let ctx = context(Script::default());
        let counters = ctx.engine().counters();
        let mut transport = RecordingTransport::new();
        let mut session = Session::upgrade(&ctx, &mut transport).unwrap();

        assert!(matches!(
            session.write(&mut transport, b""),
            Err(Error::InvalidLength)
        ));
        assert_eq!(counters.negotiations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsent_bytes_request_reservice() {
        let ctx = context(Script {
            send_pending: 37,
            ..Script::default()
        });
        let mut transport = RecordingTransport::new();
        let mut session = connected(&ctx, &mut transport);

        session.write(&mut transport, b"payload").unwrap();
        assert_eq!(transport.reservice_signals, vec![37]);

        session.flush(&mut transport).unwrap();
        assert_eq!(transport.reservice_signals, vec![37]);
    }

    #[test]
    fn test_pending_signal_once_per_read() {
        let ctx = context(Script {
            recv: VecDeque::from([Ok(b"abcd".to_vec()), Ok(b"ef".to_vec())]),
            recv_pending: VecDeque::from([12, 0]),
            ..Script::default()
        });
        let mut transport = RecordingTransport::new();
        let mut session = connected(&ctx, &mut transport);

        let mut buf = [0u8; 4];
        assert_eq!(session.read(&mut transport, &mut buf).unwrap(), 4);
        assert_eq!(transport.hidden_signals, vec![12]);

        assert_eq!(session.read(&mut transport, &mut buf).unwrap(), 2);
        assert_eq!(transport.hidden_signals, vec![12]);
    }

    #[test]
    fn test_read_is_a_single_receive() {
        let ctx = context(Script {
            recv: VecDeque::from([Ok(b"hello".to_vec()), Ok(b"world".to_vec())]),
            ..Script::default()
        });
        let counters = ctx.engine().counters();
        let mut transport = RecordingTransport::new();
        let mut session = connected(&ctx, &mut transport);

        let mut buf = [0u8; 64];
        let n = session.read(&mut transport, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
        assert_eq!(counters.recvs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_transport_read_error_keeps_stream_open() {
        let ctx = context(Script {
            recv: VecDeque::from([Err(EngineError::new(ErrorCode::TCP_READ_ERROR))]),
            ..Script::default()
        });
        let mut transport = RecordingTransport::new();
        let mut session = connected(&ctx, &mut transport);

        let mut buf = [0u8; 8];
        let err = session.read(&mut transport, &mut buf).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(!err.is_fatal());
        assert!(!transport.is_eof());
    }

    #[test]
    fn test_would_block_keeps_stream_open() {
        let ctx = context(Script::default());
        let mut transport = RecordingTransport::new();
        let mut session = connected(&ctx, &mut transport);

        let mut buf = [0u8; 8];
        assert!(matches!(
            session.read(&mut transport, &mut buf),
            Err(Error::WouldBlock)
        ));
        assert!(!transport.is_eof());
    }

    #[test]
    fn test_protocol_read_error_sets_eof() {
        let ctx = context(Script {
            recv: VecDeque::from([Err(EngineError::new(ErrorCode::PROTOCOL_ERROR))]),
            ..Script::default()
        });
        let mut transport = RecordingTransport::new();
        let mut session = connected(&ctx, &mut transport);

        let mut buf = [0u8; 8];
        assert!(matches!(
            session.read(&mut transport, &mut buf),
            Err(Error::Read(_))
        ));
        assert!(transport.is_eof());
        assert!(transport.hidden_signals.is_empty());
    }

    #[test]
    fn test_closed_session_rejects_io() {
        let ctx = context(Script::default());
        let mut transport = RecordingTransport::new();
        let mut session = connected(&ctx, &mut transport);
        session.close();

        let mut buf = [0u8; 8];
        assert!(matches!(
            session.read(&mut transport, &mut buf),
            Err(Error::Closed)
        ));
        assert!(matches!(
            session.write(&mut transport, b"x"),
            Err(Error::Closed)
        ));
    }

    #[test]
    fn test_stream_maps_handshake_in_progress() {
        let ctx = context(Script {
            negotiate: VecDeque::from([Ok(Negotiation::Pending), Ok(Negotiation::Pending)]),
            ..Script::default()
        });
        let mut transport = RecordingTransport::new();
        let mut session = Session::upgrade(&ctx, &mut transport).unwrap();
        let mut stream = session.stream(&mut transport);

        let mut buf = [0u8; 8];
        assert_eq!(
            stream.read(&mut buf).unwrap_err().kind(),
            io::ErrorKind::WouldBlock
        );
        assert_eq!(
            stream.write(b"hi").unwrap_err().kind(),
            io::ErrorKind::WouldBlock
        );
    }

    #[test]
    fn test_stream_reads_peer_close_as_eof() {
        let ctx = context(Script {
            recv: VecDeque::from([
                Ok(b"last".to_vec()),
                Err(EngineError::new(ErrorCode::TCP_SOCKET_CLOSED)),
            ]),
            ..Script::default()
        });
        let mut transport = RecordingTransport::new();
        let mut session = Session::upgrade(&ctx, &mut transport).unwrap();

        let mut received = Vec::new();
        {
            let mut stream = session.stream(&mut transport);
            stream.read_to_end(&mut received).unwrap();
            stream.write_all(b"ack").unwrap();
            stream.flush().unwrap();
            assert!(stream.session().is_connected());
        }
        assert_eq!(received, b"last");
        assert!(transport.is_eof());
    }
}
