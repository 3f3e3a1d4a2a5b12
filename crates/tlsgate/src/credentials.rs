// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! PEM credential loading.
//!
//! Files are read first and decoded second so that a missing file and a
//! malformed file surface as different errors. A failed read is fatal on the
//! spot: nothing is decoded from a file that could not be read.

use std::fmt;
use std::fs;
use std::path::Path;

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::error::{Error, Result};

/// Decoded server certificate chain and private key.
pub struct Credentials {
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl Credentials {
    /// Create credentials from already decoded material.
    pub fn new(chain: Vec<CertificateDer<'static>>, key: PrivateKeyDer<'static>) -> Self {
        Self { chain, key }
    }

    /// Load the optional certificate/key pair.
    ///
    /// Returns `Ok(None)` when neither path is set. Setting only one of them
    /// is an incomplete configuration.
    pub fn load(certificate: Option<&Path>, key: Option<&Path>) -> Result<Option<Self>> {
        match (certificate, key) {
            (None, None) => Ok(None),
            (Some(_), None) => Err(Error::IncompleteCredentials(
                "certificate configured without a private key",
            )),
            (None, Some(_)) => Err(Error::IncompleteCredentials(
                "private key configured without a certificate",
            )),
            (Some(cert_path), Some(key_path)) => {
                let chain = load_certificates(cert_path)?;
                let key = load_private_key(key_path)?;
                log::debug!(
                    "[TLS] loaded {} certificate(s) from {}",
                    chain.len(),
                    cert_path.display()
                );
                Ok(Some(Self { chain, key }))
            }
        }
    }

    /// Certificate chain, leaf first.
    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }

    /// Private key.
    pub fn key(&self) -> &PrivateKeyDer<'static> {
        &self.key
    }
}

impl Clone for Credentials {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            key: self.key.clone_key(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("chain_len", &self.chain.len())
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Read and decode every certificate in a PEM file.
pub fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let pem = fs::read(path).map_err(|source| Error::CertificateRead {
        path: path.to_path_buf(),
        source,
    })?;

    let certs = CertificateDer::pem_slice_iter(&pem)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::CertificateDecode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if certs.is_empty() {
        return Err(Error::CertificateDecode {
            path: path.to_path_buf(),
            reason: "no certificates found in PEM data".to_string(),
        });
    }

    Ok(certs)
}

/// Read and decode the first private key in a PEM file.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let pem = fs::read(path).map_err(|source| Error::KeyRead {
        path: path.to_path_buf(),
        source,
    })?;

    PrivateKeyDer::from_pem_slice(&pem).map_err(|e| Error::KeyDecode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
