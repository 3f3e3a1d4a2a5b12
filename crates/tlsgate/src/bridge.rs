// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Engine log bridge.
//!
//! The TLS engine reports diagnostics through a callback taking a module id,
//! a severity and a message. [`forward`] is the callback installed by
//! [`EngineContext::open`](crate::EngineContext::open): it hands the message
//! to the `log` facade at one fixed level, under the `tlsgate::engine`
//! target. No filtering happens here beyond what the engine applies.

use std::fmt;

/// Log target used for forwarded engine messages.
pub const ENGINE_LOG_TARGET: &str = "tlsgate::engine";

/// Level every forwarded engine message is logged at.
pub const ENGINE_LOG_LEVEL: log::Level = log::Level::Info;

/// Callback signature the engine uses to emit diagnostics.
pub type LogSink = fn(EngineModule, Severity, &str);

/// Engine subsystem that produced a log message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EngineModule(pub u32);

impl EngineModule {
    /// Engine-wide initialization and teardown.
    pub const CORE: EngineModule = EngineModule(0);
    /// Handshake negotiation.
    pub const HANDSHAKE: EngineModule = EngineModule(1);
    /// Record layer (encrypt/decrypt, alerts).
    pub const RECORD: EngineModule = EngineModule(2);
    /// Certificate handling.
    pub const CERTIFICATE: EngineModule = EngineModule(3);
}

impl fmt::Display for EngineModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            EngineModule::CORE => write!(f, "core"),
            EngineModule::HANDSHAKE => write!(f, "handshake"),
            EngineModule::RECORD => write!(f, "record"),
            EngineModule::CERTIFICATE => write!(f, "certificate"),
            EngineModule(id) => write!(f, "module-{}", id),
        }
    }
}

/// Severity attached by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Fatal condition inside the engine
    Fatal,
    /// Recoverable error
    Error,
    /// Warning
    Warning,
    /// Informational
    Info,
    /// Debug detail
    Debug,
}

/// Forward one engine log record to the host logger.
///
/// Only the message text is forwarded; module and severity are ignored so
/// every engine message lands at [`ENGINE_LOG_LEVEL`].
pub fn forward(_module: EngineModule, _severity: Severity, message: &str) {
    log::log!(target: ENGINE_LOG_TARGET, ENGINE_LOG_LEVEL, "{}", message);
}

/// Sink that drops everything. Useful for engines under test.
pub fn discard(_module: EngineModule, _severity: Severity, _message: &str) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_display() {
        assert_eq!(EngineModule::HANDSHAKE.to_string(), "handshake");
        assert_eq!(EngineModule(42).to_string(), "module-42");
    }

    #[test]
    fn test_forward_is_a_log_sink() {
        let sink: LogSink = forward;
        // No logger installed: the call must still be harmless.
        sink(EngineModule::RECORD, Severity::Warning, "received alert");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Fatal < Severity::Debug);
    }
}
