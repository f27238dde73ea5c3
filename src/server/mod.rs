//! Static asset server for a built output directory
//!
//! Serves files over plain HTTP on a loopback address with a single-page
//! application fallback: any path that does not resolve to a file inside the
//! output directory is answered with the entry document. The server is
//! disposable and meant to live for exactly one prerender run.

pub mod mime;
pub mod resolve;

pub use resolve::{Resolution, Resolver};

use crate::{Error, Result};
use log::{debug, info, trace, warn};
use std::io::Cursor;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tiny_http::{Header, Request, Response, Server};
use url::Url;

/// Upper bound for request worker threads when sized automatically
const MAX_AUTO_WORKERS: usize = 8;

/// Static server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Output directory to serve
    pub root: PathBuf,
    /// Entry document name inside `root`
    pub entry: String,
    /// Bind host; must be a loopback address
    pub host: String,
    /// Bind port; `0` lets the OS choose
    pub port: u16,
    /// Request worker threads; `0` sizes the pool from the CPU count
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("dist"),
            entry: "index.html".to_string(),
            host: "127.0.0.1".to_string(),
            port: 4173,
            workers: 0,
        }
    }
}

/// Refuse anything that is not a loopback address
pub fn ensure_loopback(host: &str) -> Result<()> {
    if host.eq_ignore_ascii_case("localhost") {
        return Ok(());
    }
    match host.parse::<IpAddr>() {
        Ok(ip) if ip.is_loopback() => Ok(()),
        Ok(ip) => Err(Error::Config(format!("refusing to serve on non-loopback address {}", ip))),
        Err(_) => Err(Error::Config(format!("invalid bind host `{}`", host))),
    }
}

/// A running static server
///
/// Stopping (explicitly or on drop) unblocks and joins every worker thread;
/// the listening socket is released once the last handle to the underlying
/// server is gone.
pub struct StaticServer {
    server: Arc<Server>,
    addr: SocketAddr,
    running: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl StaticServer {
    /// Bind the configured address and start answering requests.
    ///
    /// Returns once the socket is bound; an address already in use is an
    /// `Error::Bind`.
    pub fn start(config: &ServerConfig) -> Result<Self> {
        ensure_loopback(&config.host)?;
        let resolver = Resolver::new(&config.root, &config.entry)
            .map_err(|e| Error::MissingOutput(format!("{}: {}", config.root.display(), e)))?;

        let bind = match config.host.parse::<IpAddr>() {
            Ok(ip) => SocketAddr::new(ip, config.port).to_string(),
            Err(_) => format!("{}:{}", config.host, config.port),
        };
        let server = Server::http(bind.as_str()).map_err(|e| Error::Bind {
            addr: bind.clone(),
            reason: e.to_string(),
        })?;
        let addr = server.server_addr().to_ip().ok_or_else(|| Error::Bind {
            addr: bind,
            reason: "listener is not an IP socket".into(),
        })?;

        let count = match config.workers {
            0 => num_cpus::get().clamp(2, MAX_AUTO_WORKERS),
            n => n,
        };

        let mut handle = Self {
            server: Arc::new(server),
            addr,
            running: Arc::new(AtomicBool::new(true)),
            workers: Vec::with_capacity(count),
        };

        let resolver = Arc::new(resolver);
        for i in 0..count {
            let server = Arc::clone(&handle.server);
            let running = Arc::clone(&handle.running);
            let resolver = Arc::clone(&resolver);
            let worker = thread::Builder::new()
                .name(format!("static-server-{}", i))
                .spawn(move || serve(&server, &resolver, &running))
                .map_err(|e| Error::Other(format!("Failed to spawn server worker: {}", e)))?;
            handle.workers.push(worker);
        }

        info!("Serving {} on http://{} ({} workers)", resolver.root().display(), addr, count);
        Ok(handle)
    }

    /// Bound socket address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Root URL of the served site
    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&format!("http://{}/", self.addr))
            .map_err(|e| Error::Other(format!("Invalid server URL for {}: {}", self.addr, e)))
    }

    /// Stop listening and release the port
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        for _ in &self.workers {
            self.server.unblock();
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("A static server worker panicked");
            }
        }
        info!("Static server on {} stopped", self.addr);
    }
}

impl Drop for StaticServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn serve(server: &Server, resolver: &Resolver, running: &AtomicBool) {
    loop {
        match server.recv() {
            Ok(request) => handle(resolver, request),
            Err(e) => {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                debug!("Static server accept error: {}", e);
            }
        }
    }
}

fn handle(resolver: &Resolver, request: Request) {
    let response = respond_to(resolver, request.url());
    if let Err(e) = request.respond(response) {
        debug!("Failed to send response: {}", e);
    }
}

/// Build the response for one request target
pub fn respond_to(resolver: &Resolver, target: &str) -> Response<Cursor<Vec<u8>>> {
    if let Resolution::File(path) = resolver.resolve(target) {
        match std::fs::read(&path) {
            Ok(bytes) => {
                trace!("GET {} -> {}", target, path.display());
                return with_content_type(Response::from_data(bytes), &mime::content_type(&path));
            }
            Err(e) => debug!("Failed to read {}: {}", path.display(), e),
        }
    }

    trace!("GET {} -> SPA fallback", target);
    match std::fs::read(resolver.entry()) {
        Ok(bytes) => with_content_type(Response::from_data(bytes), mime::HTML),
        Err(e) => {
            warn!("Entry document {} unreadable: {}", resolver.entry().display(), e);
            Response::from_data(Vec::new()).with_status_code(500)
        }
    }
}

fn with_content_type(response: Response<Cursor<Vec<u8>>>, content_type: &str) -> Response<Cursor<Vec<u8>>> {
    match Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes()) {
        Ok(header) => response.with_header(header),
        Err(_) => response,
    }
}
