// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process-wide engine context.
//!
//! Created once at startup with [`EngineContext::open`], shared by every
//! session through an `Arc`, and released once at shutdown. The context is
//! read-only after `open`: sessions only borrow the engine.

use std::fmt;
use std::sync::Arc;

use crate::bridge;
use crate::config::EngineConfig;
use crate::credentials::{self, Credentials};
use crate::engine::{Engine, EngineSettings};
use crate::error::{Error, Result};

/// Initialized engine plus the configuration it was opened with.
pub struct EngineContext<E: Engine> {
    engine: E,
    config: EngineConfig,
    released: bool,
}

impl<E: Engine> EngineContext<E> {
    /// Load credentials and initialize the engine.
    ///
    /// The certificate and key are both optional, but setting only one of
    /// them fails. On any failure the engine is released and nothing stays
    /// active for future connections. The log bridge is installed as the
    /// engine's diagnostics sink.
    pub fn open(mut engine: E, config: EngineConfig) -> Result<Arc<Self>> {
        if config.verify_peer() && config.ca_certificates().is_none() {
            return Err(Error::Config(
                "peer verification requires a CA certificate bundle".to_string(),
            ));
        }

        let credentials = Credentials::load(config.certificate(), config.key())?;
        let client_roots = match config.ca_certificates() {
            Some(path) => credentials::load_certificates(path)?,
            None => Vec::new(),
        };

        let settings = EngineSettings {
            credentials,
            client_roots,
            timeouts: config.timeouts(),
        };

        if let Err(err) = engine.open(&settings, bridge::forward) {
            log::error!("[TLS] {} engine initialization failed: {}", engine.name(), err);
            engine.release();
            return Err(Error::EngineInit(err));
        }

        log::info!(
            "[TLS] {} engine opened (certificate: {}, verify peer: {}, hello timeout: {:?})",
            engine.name(),
            settings.credentials.is_some(),
            config.verify_peer(),
            settings.timeouts.hello
        );

        Ok(Arc::new(Self {
            engine,
            config,
            released: false,
        }))
    }

    /// Release the engine.
    ///
    /// Fails with [`Error::ContextInUse`] while sessions still hold the
    /// context; the engine is then released when the last session drops.
    pub fn close(self: Arc<Self>) -> Result<()> {
        match Arc::try_unwrap(self) {
            Ok(mut ctx) => {
                ctx.release();
                Ok(())
            }
            Err(shared) => {
                let users = Arc::strong_count(&shared) - 1;
                log::warn!("[TLS] Engine close deferred: {} session(s) still open", users);
                Err(Error::ContextInUse(users))
            }
        }
    }

    /// The engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The configuration the engine was opened with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.engine.release();
        log::info!("[TLS] {} engine closed", self.engine.name());
    }
}

impl<E: Engine> Drop for EngineContext<E> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<E: Engine> fmt::Debug for EngineContext<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineContext")
            .field("engine", &self.engine.name())
            .field("config", &self.config)
            .field("released", &self.released)
            .finish()
    }
}
