// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # tlsgate - TLS session adapter for socket-driven servers
//!
//! Bridges a server's socket abstraction to a TLS engine: one process-wide
//! engine context (certificate, key, timeouts), one session per upgraded
//! connection, a lazily-driven handshake, and read/write calls that keep the
//! event loop informed about bytes the engine is still buffering.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::net::TcpListener;
//! use tlsgate::{EngineConfig, EngineContext, RustlsEngine, Session, Socket};
//!
//! fn main() -> tlsgate::Result<()> {
//!     let config = EngineConfig::builder()
//!         .with_certificate("server.crt")
//!         .with_key("server.key")
//!         .build()?;
//!     let ctx = EngineContext::open(RustlsEngine::new(), config)?;
//!
//!     let listener = TcpListener::bind("127.0.0.1:8443")?;
//!     let (stream, _) = listener.accept()?;
//!     let mut socket = Socket::new(stream);
//!
//!     let mut session = Session::upgrade(&ctx, &mut socket)?;
//!     let mut buf = [0u8; 4096];
//!     let n = session.read(&mut socket, &mut buf)?; // drives the handshake first
//!     session.write(&mut socket, &buf[..n])?;
//!     session.shutdown(&mut socket);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                    host server / event loop                  |
//! +--------------------------------------------------------------+
//! |  Session::read / Session::write        (io)                  |
//! |        |                                                     |
//! |        +--> Session::handshake (lazy)  (handshake)           |
//! +--------------------------------------------------------------+
//! |  Session (upgrade / close)             (session)             |
//! |  EngineContext (open / close)          (context)             |
//! +--------------------------------------------------------------+
//! |  Engine trait  --->  RustlsEngine      (engine)              |
//! |  Transport trait --> Socket<ByteStream> (transport)          |
//! +--------------------------------------------------------------+
//! ```
//!
//! ## Blocking behavior
//!
//! Handshake negotiation and the engine's send/receive primitives perform
//! blocking I/O against the transport. The adapter is non-blocking only in
//! the sense that the handshake is started lazily on first use. A session is
//! not reentrant: one thread per connection, or an external lock.

pub mod bridge;
pub mod config;
pub mod context;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod handshake;
pub mod io;
pub mod session;
pub mod transport;

pub use config::{EngineConfig, EngineConfigBuilder, Timeouts};
pub use context::EngineContext;
pub use credentials::Credentials;
pub use engine::rustls::RustlsEngine;
pub use engine::{Engine, EngineError, EngineSettings, ErrorCode, Negotiation, SessionFlags};
pub use error::{Error, Result};
pub use handshake::{HandshakeFailure, HandshakeOutcome, HandshakeState};
pub use io::SessionStream;
pub use session::Session;
pub use transport::{ByteStream, Socket, SocketFlags, SocketId, Transport};

/// tlsgate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
