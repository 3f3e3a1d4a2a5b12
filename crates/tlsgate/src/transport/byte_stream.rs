// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Raw stream under a [`Socket`](super::Socket).
//!
//! Only what the socket wrapper needs beyond `Read`/`Write`: teardown, the
//! peer address for diagnostics, and the read timeout the engine installs
//! for the hello and receive phases.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

/// Byte-oriented stream a [`Socket`](super::Socket) can wrap.
///
/// A stream in non-blocking mode reports `WouldBlock`; the engine passes it
/// through as backpressure.
pub trait ByteStream: Read + Write + Send {
    /// Close one or both directions.
    fn shutdown(&mut self, how: Shutdown) -> io::Result<()>;

    /// Remote address, if connected.
    fn peer_addr(&self) -> io::Result<SocketAddr>;

    /// Bound how long a blocking read may wait. `None` waits forever.
    fn set_read_timeout(&self, dur: Option<Duration>) -> io::Result<()>;
}

impl ByteStream for TcpStream {
    fn shutdown(&mut self, how: Shutdown) -> io::Result<()> {
        TcpStream::shutdown(self, how)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::peer_addr(self)
    }

    fn set_read_timeout(&self, dur: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, dur)
    }
}

// ============================================================================
// Test double
// ============================================================================
