//! The connection manager: listener, accept loop, connection table, idle
//! reaper, and graceful shutdown.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use rand::rngs::OsRng;
use rand::RngCore;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{interval, sleep, Duration};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::connection::Connection;
use crate::error::Result;
use crate::executor::QueryExecutor;
use crate::mock::MockExecutor;
use crate::net::tls;
use crate::options::{AuthMethod, PgMockOptions};
use crate::scram::ScramCredentials;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Default)]
pub(crate) struct Stats {
    pub(crate) connections_accepted: AtomicU64,
    pub(crate) connections_rejected: AtomicU64,
    pub(crate) queries_executed: AtomicU64,
}

/// A point-in-time view of the server counters.
#[derive(Debug, Clone, Copy)]
pub struct ServerStats {
    pub connections_accepted: u64,
    pub connections_rejected: u64,
    pub connections_active: usize,
    pub queries_executed: u64,
}

pub(crate) struct ConnectionEntry {
    pub(crate) remote_addr: SocketAddr,
    pub(crate) connected_at: Instant,

    // milliseconds since `ServerShared::started`, written by the
    // connection's task on every frame
    pub(crate) last_activity: Arc<AtomicU64>,

    pub(crate) abort: AbortHandle,
}

/// State shared between the server handle, the accept loop, the reaper,
/// and every connection. Connections receive an `Arc` of this; they hold
/// no other reference back into the server.
pub(crate) struct ServerShared {
    pub(crate) options: PgMockOptions,
    pub(crate) tls: Option<tokio_rustls::TlsAcceptor>,
    pub(crate) credentials: Option<ScramCredentials>,

    pub(crate) connections: Mutex<HashMap<u32, ConnectionEntry>>,
    pub(crate) stats: Stats,

    pub(crate) started: Instant,
    pub(crate) shutting_down: AtomicBool,
}

/// A running mock server.
///
/// # Example
///
/// ```rust,no_run
/// # async fn example() -> Result<(), pgmock::Error> {
/// use pgmock::{PgMockOptions, PgMockServer};
///
/// let server = PgMockServer::bind(PgMockOptions::new().port(15432)).await?;
/// println!("listening on {}", server.local_addr());
///
/// // ... run driver tests against it ...
///
/// server.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct PgMockServer {
    shared: Arc<ServerShared>,
    local_addr: SocketAddr,

    accept_task: JoinHandle<()>,
    reaper_task: JoinHandle<()>,

    shutdown_tx: watch::Sender<bool>,
    drained_tx: watch::Sender<bool>,
}

impl PgMockServer {
    /// Bind the listener and start serving with the built-in
    /// [`MockExecutor`].
    pub async fn bind(options: PgMockOptions) -> Result<Self> {
        Self::bind_with(options, MockExecutor).await
    }

    /// Bind the listener and start serving with a custom executor.
    pub async fn bind_with<E>(options: PgMockOptions, executor: E) -> Result<Self>
    where
        E: QueryExecutor,
    {
        // derive SCRAM credentials once, up front; PBKDF2 is too expensive
        // to re-run per connection
        let credentials = match options.auth_method {
            AuthMethod::ScramSha256 => Some(ScramCredentials::derive(
                &options.password,
                options.scram_iterations,
            )?),

            AuthMethod::Trust => None,
        };

        // unusable certificate material downgrades SSLRequest answers to
        // `N` rather than refusing to serve plaintext
        let tls = match &options.tls {
            Some(tls_options) => match tls::configure(tls_options) {
                Ok(acceptor) => Some(acceptor),

                Err(err) => {
                    warn!("TLS disabled: {err}");
                    None
                }
            },

            None => None,
        };

        let listener = TcpListener::bind((options.host.as_str(), options.port)).await?;
        let local_addr = listener.local_addr()?;

        let shared = Arc::new(ServerShared {
            options,
            tls,
            credentials,
            connections: Mutex::new(HashMap::new()),
            stats: Stats::default(),
            started: Instant::now(),
            shutting_down: AtomicBool::new(false),
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (drained_tx, _) = watch::channel(false);

        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&shared),
            Arc::new(executor),
            shutdown_rx,
        ));

        let reaper_task = tokio::spawn(reaper_loop(Arc::clone(&shared)));

        info!(%local_addr, "server listening");

        Ok(Self {
            shared,
            local_addr,
            accept_task,
            reaper_task,
            shutdown_tx,
            drained_tx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            connections_accepted: self
                .shared
                .stats
                .connections_accepted
                .load(Ordering::Relaxed),
            connections_rejected: self
                .shared
                .stats
                .connections_rejected
                .load(Ordering::Relaxed),
            connections_active: self.shared.connections.lock().unwrap().len(),
            queries_executed: self.shared.stats.queries_executed.load(Ordering::Relaxed),
        }
    }

    /// Gracefully shut down: stop accepting, notify every connection, wait
    /// up to the drain timeout, then force-close stragglers.
    ///
    /// Idempotent; concurrent calls wait on the same drain.
    pub async fn shutdown(&self) {
        if self.shared.shutting_down.swap(true, Ordering::SeqCst) {
            // someone else is draining (or has drained); wait for them
            let mut drained = self.drained_tx.subscribe();

            while !*drained.borrow() {
                if drained.changed().await.is_err() {
                    break;
                }
            }

            return;
        }

        info!("shutting down");

        // stop accepting; aborting the task closes the listener
        self.accept_task.abort();
        self.reaper_task.abort();

        // connections answer with a notice + ReadyForQuery and close
        let _ = self.shutdown_tx.send(true);

        let deadline = Instant::now() + self.shared.options.shutdown_drain_timeout;

        while Instant::now() < deadline {
            if self.shared.connections.lock().unwrap().is_empty() {
                break;
            }

            sleep(DRAIN_POLL_INTERVAL).await;
        }

        // whatever is left gets force-closed
        let remaining: Vec<_> = self
            .shared
            .connections
            .lock()
            .unwrap()
            .drain()
            .collect();

        if !remaining.is_empty() {
            warn!(count = remaining.len(), "force-closing connections");

            for (_, entry) in remaining {
                entry.abort.abort();
            }
        }

        let _ = self.drained_tx.send(true);

        info!("shutdown complete");
    }
}

impl Drop for PgMockServer {
    fn drop(&mut self) {
        self.accept_task.abort();
        self.reaper_task.abort();

        for (_, entry) in self.shared.connections.lock().unwrap().drain() {
            entry.abort.abort();
        }
    }
}

async fn accept_loop<E>(
    listener: TcpListener,
    shared: Arc<ServerShared>,
    executor: Arc<E>,
    shutdown_rx: watch::Receiver<bool>,
) where
    E: QueryExecutor,
{
    let mut next_pid: u32 = 1;

    loop {
        let (socket, remote_addr) = match listener.accept().await {
            Ok(accepted) => accepted,

            Err(err) => {
                warn!("accept failed: {err}");
                continue;
            }
        };

        shared
            .stats
            .connections_accepted
            .fetch_add(1, Ordering::Relaxed);

        let at_capacity = shared.connections.lock().unwrap().len()
            >= shared.options.max_connections;

        if at_capacity || shared.shutting_down.load(Ordering::SeqCst) {
            shared
                .stats
                .connections_rejected
                .fetch_add(1, Ordering::Relaxed);

            debug!(%remote_addr, "rejecting connection");

            // accept-and-close; dropping the socket sends the FIN
            drop(socket);
            continue;
        }

        let backend_pid = next_pid;
        next_pid = next_pid.wrapping_add(1);

        spawn_connection(
            socket,
            remote_addr,
            backend_pid,
            &shared,
            &executor,
            shutdown_rx.clone(),
        );
    }
}

fn spawn_connection<E>(
    socket: TcpStream,
    remote_addr: SocketAddr,
    backend_pid: u32,
    shared: &Arc<ServerShared>,
    executor: &Arc<E>,
    shutdown_rx: watch::Receiver<bool>,
) where
    E: QueryExecutor,
{
    let backend_secret = OsRng.next_u32();

    let last_activity = Arc::new(AtomicU64::new(
        shared.started.elapsed().as_millis() as u64,
    ));

    let connection = Connection::new(
        socket,
        backend_pid,
        backend_secret,
        Arc::clone(executor),
        Arc::clone(shared),
        Arc::clone(&last_activity),
        shutdown_rx,
    );

    let table_shared = Arc::clone(shared);

    let handle = tokio::spawn(
        async move {
            connection.run().await;
            table_shared.connections.lock().unwrap().remove(&backend_pid);
        }
        .instrument(info_span!("connection", backend_pid, %remote_addr)),
    );

    shared.connections.lock().unwrap().insert(
        backend_pid,
        ConnectionEntry {
            remote_addr,
            connected_at: Instant::now(),
            last_activity,
            abort: handle.abort_handle(),
        },
    );

    debug!(%remote_addr, backend_pid, "connection accepted");
}

/// Close connections idle past the configured timeout, and sweep entries
/// whose task already finished.
async fn reaper_loop(shared: Arc<ServerShared>) {
    let mut ticker = interval(shared.options.reaper_interval);

    // the first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let now = shared.started.elapsed().as_millis() as u64;
        let timeout = shared.options.connection_timeout.as_millis() as u64;

        let mut table = shared.connections.lock().unwrap();

        table.retain(|backend_pid, entry| {
            if entry.abort.is_finished() {
                return false;
            }

            let idle = now.saturating_sub(entry.last_activity.load(Ordering::Relaxed));

            if idle > timeout {
                info!(
                    backend_pid,
                    remote_addr = %entry.remote_addr,
                    idle_ms = idle,
                    age_ms = entry.connected_at.elapsed().as_millis() as u64,
                    "closing idle connection"
                );

                entry.abort.abort();
                return false;
            }

            true
        });
    }
}
