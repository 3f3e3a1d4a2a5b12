// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Socket layer interface.
//!
//! The adapter never owns the socket. It borrows a [`Transport`] per call and
//! talks to the event loop only through its flags and two signals:
//!
//! - [`Transport::hidden_data`] - the engine holds decrypted bytes, treat the
//!   socket as readable now
//! - [`Transport::reservice`] - the engine holds encrypted bytes, poll the
//!   socket for writability again
//!
//! [`Socket`] is the in-crate implementation over any [`ByteStream`].

pub mod byte_stream;
pub mod socket;

use std::fmt;
use std::io::{self, Read, Write};
use std::time::Duration;

pub use byte_stream::ByteStream;
pub use socket::Socket;

// ============================================================================
// Socket Identity
// ============================================================================

/// Identifier of a transport, used in diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(pub u64);

impl SocketId {
    /// Allocate a process-unique identifier.
    pub fn next() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        SocketId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sid-{}", self.0)
    }
}

// ============================================================================
// Socket Flags
// ============================================================================

/// Socket state bits shared between the adapter and the event loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SocketFlags(u32);

impl SocketFlags {
    /// No flags set
    pub const NONE: SocketFlags = SocketFlags(0);

    /// Stream has ended; the connection must be closed
    pub const EOF: SocketFlags = SocketFlags(1 << 0);

    /// Current I/O is protocol negotiation, not application data
    pub const HANDSHAKING: SocketFlags = SocketFlags(1 << 1);

    /// Socket is known readable without waiting for OS activity
    pub const READABLE: SocketFlags = SocketFlags(1 << 2);

    /// Socket must be polled for writability again
    pub const RESERVICE: SocketFlags = SocketFlags(1 << 3);

    /// Create from raw bits
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        SocketFlags(bits)
    }

    /// Raw bits value
    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Check if every bit of `other` is set
    #[must_use]
    pub const fn contains(&self, other: SocketFlags) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Set the bits of `other`
    pub fn insert(&mut self, other: SocketFlags) {
        self.0 |= other.0;
    }

    /// Clear the bits of `other`
    pub fn remove(&mut self, other: SocketFlags) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for SocketFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        SocketFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitAnd for SocketFlags {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        SocketFlags(self.0 & rhs.0)
    }
}

// ============================================================================
// Transport Trait
// ============================================================================

/// Socket handle as seen by the adapter.
///
/// `Read`/`Write` are the blocking send/receive primitives the engine drives.
pub trait Transport: Read + Write {
    /// Identifier for diagnostics.
    fn id(&self) -> SocketId;

    /// Current flags.
    fn flags(&self) -> SocketFlags;

    /// Set flag bits.
    fn set_flag(&mut self, flag: SocketFlags);

    /// Clear flag bits.
    fn clear_flag(&mut self, flag: SocketFlags);

    /// Engine holds `count` decrypted bytes: mark the socket readable.
    fn hidden_data(&mut self, count: usize);

    /// Engine holds `count` encrypted bytes: poll for writability again.
    fn reservice(&mut self, count: usize);

    /// Bound the time a blocking read may wait.
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    /// Check if the end-of-file flag is set.
    fn is_eof(&self) -> bool {
        self.flags().contains(SocketFlags::EOF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_flags() {
        let mut flags = SocketFlags::NONE;
        assert!(!flags.contains(SocketFlags::EOF));

        flags.insert(SocketFlags::EOF | SocketFlags::HANDSHAKING);
        assert!(flags.contains(SocketFlags::EOF));
        assert!(flags.contains(SocketFlags::HANDSHAKING));

        flags.remove(SocketFlags::HANDSHAKING);
        assert!(!flags.contains(SocketFlags::HANDSHAKING));
        assert_eq!(flags & SocketFlags::EOF, SocketFlags::EOF);
        assert_eq!(SocketFlags::from_bits(flags.bits()), flags);
    }

    #[test]
    fn test_socket_ids_are_unique() {
        let a = SocketId::next();
        let b = SocketId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("sid-"));
    }
}
