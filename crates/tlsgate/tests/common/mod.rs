// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared fixtures for loopback tests: PEM files on disk and a rustls client.

#![allow(dead_code)]

use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};
use tempfile::NamedTempFile;

/// Self-signed certificate with its PEM files.
pub struct Identity {
    pub cert_der: CertificateDer<'static>,
    pub key_der: PrivateKeyDer<'static>,
    pub cert_pem: NamedTempFile,
    pub key_pem: NamedTempFile,
}

impl Identity {
    pub fn generate(name: &str) -> Self {
        let certified = rcgen::generate_simple_self_signed(vec![name.to_string()]).unwrap();

        let mut cert_pem = NamedTempFile::new().unwrap();
        cert_pem
            .write_all(certified.cert.pem().as_bytes())
            .unwrap();
        let mut key_pem = NamedTempFile::new().unwrap();
        key_pem
            .write_all(certified.key_pair.serialize_pem().as_bytes())
            .unwrap();

        Self {
            cert_der: CertificateDer::from(certified.cert.der().to_vec()),
            key_der: PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der()).into(),
            cert_pem,
            key_pem,
        }
    }
}

pub type ClientStream = StreamOwned<ClientConnection, TcpStream>;

/// Client configuration that trusts `server`, optionally presenting `client`.
pub fn client_config(server: &Identity, client: Option<&Identity>) -> Arc<ClientConfig> {
    let mut roots = RootCertStore::empty();
    roots.add(server.cert_der.clone()).unwrap();

    let builder = ClientConfig::builder().with_root_certificates(roots);
    let config = match client {
        Some(id) => builder
            .with_client_auth_cert(vec![id.cert_der.clone()], id.key_der.clone_key())
            .unwrap(),
        None => builder.with_no_client_auth(),
    };
    Arc::new(config)
}

/// Connect a rustls client that trusts `server`, optionally presenting `client`.
pub fn connect(addr: SocketAddr, server: &Identity, client: Option<&Identity>) -> ClientStream {
    connect_with(addr, client_config(server, client))
}

/// Connect with a caller-built configuration, e.g. one shared across connections.
pub fn connect_with(addr: SocketAddr, config: Arc<ClientConfig>) -> ClientStream {
    let conn = ClientConnection::new(config, ServerName::try_from("localhost").unwrap()).unwrap();
    let sock = TcpStream::connect(addr).unwrap();
    sock.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
    StreamOwned::new(conn, sock)
}
