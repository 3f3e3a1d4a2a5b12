// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! tlsgate-echo - TLS echo server
//!
//! Accepts TCP connections, upgrades each one to TLS on its own thread and
//! echoes every byte back until the peer closes. Ctrl+C stops accepting and
//! closes the engine context.

use clap::Parser;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tlsgate::{
    EngineConfig, EngineContext, Error, ErrorCode, RustlsEngine, Session, Socket, Timeouts,
};

/// Accept loop poll interval while no connection is pending.
const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// TLS echo server
#[derive(Parser, Debug)]
#[command(name = "tlsgate-echo")]
#[command(version)]
#[command(about = "Echo bytes back over TLS, one thread per connection")]
struct Args {
    /// PEM server certificate chain
    #[arg(long)]
    cert: Option<PathBuf>,

    /// PEM private key matching --cert
    #[arg(long)]
    key: Option<PathBuf>,

    /// PEM CA bundle used to verify client certificates
    #[arg(long)]
    ca: Option<PathBuf>,

    /// Require a client certificate signed by --ca
    #[arg(long)]
    verify_peer: bool,

    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8443")]
    listen: SocketAddr,

    /// Read settings from TLSGATE_* environment variables instead
    #[arg(long, conflicts_with_all = ["cert", "key", "ca", "verify_peer"])]
    from_env: bool,

    /// Use release timeouts even in debug builds
    #[arg(long)]
    production_timeouts: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(args)?;
    let ctx = EngineContext::open(RustlsEngine::new(), config)?;

    let listener = TcpListener::bind(args.listen)?;
    listener.set_nonblocking(true)?;
    log::info!("[echo] listening on {}", listener.local_addr()?);

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let mut workers: Vec<JoinHandle<()>> = Vec::new();
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                stream.set_nonblocking(false)?;
                let ctx = Arc::clone(&ctx);
                workers.push(thread::spawn(move || serve(&ctx, stream, peer)));
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(e) => log::warn!("[echo] accept failed: {}", e),
        }
        workers.retain(|w| !w.is_finished());
    }

    log::info!("[echo] shutting down");
    match ctx.close() {
        Ok(()) => Ok(()),
        Err(Error::ContextInUse(open)) => {
            log::warn!("[echo] exiting with {} connection(s) still open", open);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn build_config(args: &Args) -> tlsgate::Result<EngineConfig> {
    if args.from_env {
        return EngineConfig::from_env();
    }

    let mut builder = EngineConfig::builder().verify_peer(args.verify_peer);
    if let Some(cert) = &args.cert {
        builder = builder.with_certificate(cert);
    }
    if let Some(key) = &args.key {
        builder = builder.with_key(key);
    }
    if let Some(ca) = &args.ca {
        builder = builder.with_ca_certificates(ca);
    }
    if args.production_timeouts {
        builder = builder.with_timeouts(Timeouts::production());
    }
    builder.build()
}

fn serve(ctx: &Arc<EngineContext<RustlsEngine>>, stream: TcpStream, peer: SocketAddr) {
    let mut socket = Socket::new(stream);
    let mut session = match Session::upgrade(ctx, &mut socket) {
        Ok(session) => session,
        Err(e) => {
            log::warn!("[echo] {} rejected: {}", peer, e);
            socket.close();
            return;
        }
    };
    log::info!("[echo] {} connected as {}", peer, session.id());

    let mut echoed = 0usize;
    if let Err(e) = echo(&mut session, &mut socket, &mut echoed) {
        log::info!("[echo] {} dropped: {}", peer, e);
        if let Some(failure) = session.handshake_failure() {
            log::debug!("[echo] {} handshake failure: {:?}", peer, failure);
        }
    }

    session.shutdown(&mut socket);
    socket.close();
    log::info!("[echo] {} closed after {} bytes", peer, echoed);
}

fn echo(
    session: &mut Session<RustlsEngine>,
    socket: &mut Socket<TcpStream>,
    echoed: &mut usize,
) -> tlsgate::Result<()> {
    let mut buf = [0u8; 16 * 1024];
    loop {
        let n = match session.read(socket, &mut buf) {
            // Handshake still running
            Ok(0) => continue,
            Ok(n) => n,
            Err(Error::Read(e)) if e.code == ErrorCode::TCP_SOCKET_CLOSED => return Ok(()),
            Err(e) => return Err(e),
        };

        session.write(socket, &buf[..n])?;
        *echoed += n;

        if socket.take_reservice().is_some() {
            session.flush(socket)?;
        }
    }
}
