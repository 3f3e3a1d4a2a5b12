// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Socket handle over a [`ByteStream`].
//!
//! Carries the flag word and the two pending-data signals for an event loop
//! that polls the stream. The loop consumes the signals with
//! [`Socket::take_hidden`] and [`Socket::take_reservice`].

use std::fmt;
use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::time::Duration;

use super::{ByteStream, SocketFlags, SocketId, Transport};

/// Plain socket wrapped for the adapter.
pub struct Socket<S: ByteStream> {
    stream: S,
    id: SocketId,
    flags: SocketFlags,
    /// Decrypted bytes the engine reported at the last signal
    hidden: usize,
    /// Encrypted bytes the engine reported at the last signal
    unsent: usize,
}

impl<S: ByteStream> Socket<S> {
    /// Wrap a stream with a fresh identifier.
    pub fn new(stream: S) -> Self {
        Self::with_id(stream, SocketId::next())
    }

    /// Wrap a stream with an identifier chosen by the caller.
    pub fn with_id(stream: S, id: SocketId) -> Self {
        Self {
            stream,
            id,
            flags: SocketFlags::NONE,
            hidden: 0,
            unsent: 0,
        }
    }

    /// Underlying stream.
    pub fn stream(&self) -> &S {
        &self.stream
    }

    /// Underlying stream, mutably.
    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Unwrap the stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Check if the socket must be treated as readable without new traffic.
    pub fn is_readable(&self) -> bool {
        self.flags.contains(SocketFlags::READABLE)
    }

    /// Consume the "readable now" signal, returning the buffered byte count.
    pub fn take_hidden(&mut self) -> Option<usize> {
        if !self.flags.contains(SocketFlags::READABLE) {
            return None;
        }
        self.flags.remove(SocketFlags::READABLE);
        Some(std::mem::take(&mut self.hidden))
    }

    /// Consume the "re-service for output" signal, returning the unsent count.
    pub fn take_reservice(&mut self) -> Option<usize> {
        if !self.flags.contains(SocketFlags::RESERVICE) {
            return None;
        }
        self.flags.remove(SocketFlags::RESERVICE);
        Some(std::mem::take(&mut self.unsent))
    }

    /// Shut the stream down in both directions.
    ///
    /// Shutdown errors are ignored: the peer may already be gone.
    pub fn close(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
        self.flags.insert(SocketFlags::EOF);
    }
}

impl<S: ByteStream> Read for Socket<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl<S: ByteStream> Write for Socket<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl<S: ByteStream> Transport for Socket<S> {
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
        self.hidden = count;
        self.flags.insert(SocketFlags::READABLE);
    }

    fn reservice(&mut self, count: usize) {
        self.unsent = count;
        self.flags.insert(SocketFlags::RESERVICE);
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.set_read_timeout(timeout)
    }
}

impl<S: ByteStream> fmt::Debug for Socket<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("id", &self.id)
            .field("flags", &self.flags)
            .field("peer", &self.stream.peer_addr().ok())
            .finish()
    }
}
