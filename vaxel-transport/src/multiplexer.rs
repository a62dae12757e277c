//! ## vaxel-transport::multiplexer
//! **Listeners, accept loops and per-connection reader/writer tasks**
//!
//! Every socket lives on one dedicated `vaxel-io` thread running a
//! current-thread tokio runtime. Each accepted connection gets a reader
//! task, which feeds bounded chunks to the connection's codec, and a writer
//! task draining the connection's outbound queue.

use std::fmt;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::os::unix::net::UnixListener as StdUnixListener;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UnixListener};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace, warn};
use vaxel_core::cleanup::{Cleanup, CleanupError};

use crate::error::TransportError;
use crate::link::{ConnId, Link, StreamCodec};
use crate::table::ConnectionTable;

/// Builds the codec for a freshly accepted connection.
pub type CodecFactory = Arc<dyn Fn(&Link) -> Box<dyn StreamCodec> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Upper bound on bytes per read.
    pub read_chunk: usize,
    /// Outbound queue depth per connection.
    pub send_queue_depth: usize,
    pub tcp_nodelay: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            read_chunk: 2048,
            send_queue_depth: 256,
            tcp_nodelay: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindSpec {
    Tcp(SocketAddr),
    /// Local domain socket. With `force_unlink`, a stale socket file at
    /// `path` is removed and the bind retried.
    Unix { path: PathBuf, force_unlink: bool },
}

impl fmt::Display for BindSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindSpec::Tcp(addr) => write!(f, "tcp:{addr}"),
            BindSpec::Unix { path, .. } => write!(f, "unix:{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

/// Handle to an open listening endpoint.
#[derive(Debug, Clone)]
pub struct Listener {
    pub id: ConnId,
    pub endpoint: Endpoint,
}

impl Listener {
    /// Bound address of a TCP listener (useful after binding port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.endpoint {
            Endpoint::Tcp(addr) => Some(*addr),
            Endpoint::Unix(_) => None,
        }
    }
}

struct Shared {
    config: TransportConfig,
    table: ConnectionTable,
    next_id: AtomicU64,
    socket_paths: Mutex<Vec<PathBuf>>,
}

impl Shared {
    fn next_id(&self) -> ConnId {
        ConnId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

pub struct Multiplexer {
    handle: Handle,
    shared: Arc<Shared>,
    shutdown: Arc<watch::Sender<bool>>,
    thread: Option<JoinHandle<()>>,
}

impl Multiplexer {
    /// Spawns the I/O thread.
    pub fn start(config: TransportConfig) -> Result<Self, TransportError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(TransportError::Runtime)?;
        let handle = runtime.handle().clone();
        let (shutdown, mut stop) = watch::channel(false);

        let thread = std::thread::Builder::new()
            .name("vaxel-io".into())
            .spawn(move || {
                runtime.block_on(async move {
                    let _ = stop.wait_for(|stopped| *stopped).await;
                });
                debug!("I/O thread stopped");
            })
            .map_err(TransportError::Runtime)?;

        Ok(Self {
            handle,
            shared: Arc::new(Shared {
                config,
                table: ConnectionTable::new(),
                next_id: AtomicU64::new(1),
                socket_paths: Mutex::new(Vec::new()),
            }),
            shutdown: Arc::new(shutdown),
            thread: Some(thread),
        })
    }

    pub fn table(&self) -> ConnectionTable {
        self.shared.table.clone()
    }

    pub fn config(&self) -> &TransportConfig {
        &self.shared.config
    }

    pub fn is_running(&self) -> bool {
        !*self.shutdown.borrow()
    }

    /// Opens a listening endpoint; every accepted connection is served by a
    /// codec from `factory`.
    pub fn listen(&self, spec: BindSpec, factory: CodecFactory) -> Result<Listener, TransportError> {
        if !self.is_running() {
            return Err(TransportError::Stopped);
        }
        let id = self.shared.next_id();
        let shared = self.shared.clone();

        match spec {
            BindSpec::Tcp(addr) => {
                let std_listener =
                    std::net::TcpListener::bind(addr).map_err(|source| TransportError::Bind {
                        endpoint: format!("tcp:{addr}"),
                        source,
                    })?;
                std_listener.set_nonblocking(true)?;
                let local = std_listener.local_addr()?;
                info!(listener = %id, addr = %local, "Listening");

                self.handle.spawn(async move {
                    match TcpListener::from_std(std_listener) {
                        Ok(listener) => accept_tcp(listener, shared, factory).await,
                        Err(e) => error!(listener = %id, error = %e, "Cannot register listener"),
                    }
                });
                Ok(Listener {
                    id,
                    endpoint: Endpoint::Tcp(local),
                })
            }
            BindSpec::Unix { path, force_unlink } => {
                let std_listener = bind_unix(&path, force_unlink)?;
                std_listener.set_nonblocking(true)?;
                self.shared.socket_paths.lock().push(path.clone());
                info!(listener = %id, path = %path.display(), "Listening");

                let label = format!("unix:{}", path.display());
                self.handle.spawn(async move {
                    match UnixListener::from_std(std_listener) {
                        Ok(listener) => accept_unix(listener, label, shared, factory).await,
                        Err(e) => error!(listener = %id, error = %e, "Cannot register listener"),
                    }
                });
                Ok(Listener {
                    id,
                    endpoint: Endpoint::Unix(path),
                })
            }
        }
    }

    /// Registers an already-connected socket, served by a codec from
    /// `factory`.
    pub fn add_connection(
        &self,
        stream: std::net::TcpStream,
        factory: CodecFactory,
    ) -> Result<ConnId, TransportError> {
        if !self.is_running() {
            return Err(TransportError::Stopped);
        }
        stream.set_nonblocking(true)?;
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".into());
        let id = self.shared.next_id();
        let shared = self.shared.clone();

        self.handle.spawn(async move {
            match TcpStream::from_std(stream) {
                Ok(stream) => {
                    configure_tcp(&stream, &shared.config);
                    serve(&shared, id, stream, peer, &factory);
                }
                Err(e) => warn!(conn = %id, error = %e, "Cannot register connection"),
            }
        });
        Ok(id)
    }

    /// Cleanup component that stops the I/O thread and removes socket files.
    pub fn cleanup_handle(&self) -> TransportCleanup {
        TransportCleanup {
            shutdown: self.shutdown.clone(),
            shared: self.shared.clone(),
        }
    }

    /// Stops the I/O thread and waits for it to exit. Open connections are
    /// dropped without close notifications.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.shutdown.send_replace(true);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("I/O thread panicked");
            }
        }
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

pub struct TransportCleanup {
    shutdown: Arc<watch::Sender<bool>>,
    shared: Arc<Shared>,
}

impl Cleanup for TransportCleanup {
    fn name(&self) -> &str {
        "transport"
    }

    fn cleanup(&mut self) -> Result<(), CleanupError> {
        self.shutdown.send_replace(true);
        self.shared.table.clear();

        let mut first_error = None;
        for path in self.shared.socket_paths.lock().drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "Removed socket file"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot remove socket file");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

fn bind_unix(path: &Path, force_unlink: bool) -> Result<StdUnixListener, TransportError> {
    let bind_error = |source| TransportError::Bind {
        endpoint: format!("unix:{}", path.display()),
        source,
    };
    match StdUnixListener::bind(path) {
        Ok(listener) => Ok(listener),
        Err(e) if e.kind() == ErrorKind::AddrInUse && force_unlink => {
            warn!(path = %path.display(), "Socket path in use, unlinking and rebinding");
            std::fs::remove_file(path).map_err(bind_error)?;
            StdUnixListener::bind(path).map_err(bind_error)
        }
        Err(e) if e.kind() == ErrorKind::AddrInUse => Err(TransportError::PathInUse(path.to_path_buf())),
        Err(e) => Err(bind_error(e)),
    }
}

fn configure_tcp(stream: &TcpStream, config: &TransportConfig) {
    if config.tcp_nodelay {
        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "Cannot disable Nagle");
        }
    }
}

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);
const WRITER_DRAIN: Duration = Duration::from_secs(5);

async fn accept_tcp(listener: TcpListener, shared: Arc<Shared>, factory: CodecFactory) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                configure_tcp(&stream, &shared.config);
                let id = shared.next_id();
                serve(&shared, id, stream, peer.to_string(), &factory);
            }
            Err(e) => {
                warn!(error = %e, "Accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

async fn accept_unix(listener: UnixListener, label: String, shared: Arc<Shared>, factory: CodecFactory) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let id = shared.next_id();
                serve(&shared, id, stream, label.clone(), &factory);
            }
            Err(e) => {
                warn!(error = %e, "Accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

/// Starts the reader and writer tasks for one connection. Must run on the
/// I/O runtime.
fn serve<S>(shared: &Arc<Shared>, id: ConnId, stream: S, peer: String, factory: &CodecFactory)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (tx, rx) = mpsc::channel(shared.config.send_queue_depth);
    let link = Link::new(id, peer, tx);
    let mut codec = factory(&link);
    let (reader, writer) = tokio::io::split(stream);

    let writer_task = tokio::spawn(write_loop(writer, rx, id));
    shared.table.insert(link.clone());
    debug!(conn = %id, peer = %link.peer(), "Connection opened");
    codec.on_open(&link);

    let shared = shared.clone();
    let read_chunk = shared.config.read_chunk;
    tokio::spawn(async move {
        read_loop(reader, codec.as_mut(), &link, read_chunk).await;
        shared.table.remove(id);
        codec.on_close(&link);
        debug!(conn = %id, peer = %link.peer(), "Connection closed");

        // The writer stops once every sender is gone and the queue is empty.
        drop(codec);
        drop(link);
        let abort = writer_task.abort_handle();
        if tokio::time::timeout(WRITER_DRAIN, writer_task).await.is_err() {
            warn!(conn = %id, "Outbound queue not drained in time, discarding");
            abort.abort();
        }
    });
}

async fn read_loop<R>(mut reader: R, codec: &mut dyn StreamCodec, link: &Link, read_chunk: usize)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; read_chunk];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                debug!(conn = %link.id(), "Peer closed connection");
                break;
            }
            Ok(n) => {
                trace!(conn = %link.id(), bytes = n, "Read");
                codec.on_bytes(&buf[..n], link);
            }
            Err(e) => {
                warn!(conn = %link.id(), error = %e, "Read failed, closing connection");
                break;
            }
        }
    }
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::Receiver<Bytes>, id: ConnId)
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        if let Err(e) = writer.write_all(&message).await {
            warn!(conn = %id, error = %e, "Broken pipe, send dropped");
            return;
        }
    }
    if let Err(e) = writer.shutdown().await {
        debug!(conn = %id, error = %e, "Write shutdown failed");
    }
}
