//! Bounded per-endpoint connection pool with blocking acquisition.
//!
//! A pool owns every TCP connection to one endpoint. Capacity is enforced
//! with a fair semaphore: one permit per allowed live socket, so waiters are
//! served in arrival order once a connection is released. The configured
//! `cache_method` only decides which idle socket a successful acquire gets.
//!
//! A background task sweeps the idle set and closes sockets that sat unused
//! past `idle_timeout`. The task holds a weak reference and exits when the
//! pool is closed or dropped.

mod connection;

pub use connection::PooledConnection;

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;

use crate::config::{CacheMethod, PoolConfig};
use crate::error::{ErrorKind, FdfsError};

/// How often the background reaper sweeps the idle set.
const REAP_INTERVAL: Duration = Duration::from_millis(250);

/// An idle socket with its parking time.
#[derive(Debug)]
struct IdleConn {
    stream: TcpStream,
    parked_at: Instant,
}

#[derive(Debug)]
struct PoolState {
    idle: VecDeque<IdleConn>,
    /// Live sockets: idle plus checked out.
    total: usize,
    /// Permits to take out of circulation on release, left over from a
    /// capacity shrink that found them in use.
    permit_debt: usize,
    closed: bool,
}

#[derive(Debug)]
struct PoolInner {
    address: String,
    config: RwLock<PoolConfig>,
    state: Mutex<PoolState>,
    /// One permit per allowed live socket. The semaphore is fair, so a
    /// released slot goes to the longest-waiting acquirer.
    slots: Arc<Semaphore>,
}

impl PoolInner {
    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn snapshot(&self) -> PoolConfig {
        *self.config.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// Bounded pool of TCP connections to a single endpoint.
///
/// Cloning is cheap and shares the same pool.
#[derive(Clone, Debug)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Opens a pool to `address`, eagerly dialing `init_cap` connections.
    /// Unset config fields fall back to [`PoolConfig::defaults`].
    ///
    /// # Errors
    ///
    /// [`ErrorKind::CreatePool`] if any eager dial fails.
    pub async fn new(address: impl Into<String>, config: PoolConfig) -> Result<Self, FdfsError> {
        let config = PoolConfig::defaults().merge(config);
        let address = address.into();
        let inner = Arc::new(PoolInner {
            slots: Arc::new(Semaphore::new(config.max_cap)),
            state: Mutex::new(PoolState {
                idle: VecDeque::with_capacity(config.max_cap),
                total: 0,
                permit_debt: 0,
                closed: false,
            }),
            config: RwLock::new(config),
            address,
        });

        let eager = config.init_cap.min(config.max_cap);
        for _ in 0..eager {
            let stream = dial(&inner.address, config.dial_timeout).await.map_err(|e| {
                FdfsError::new(
                    ErrorKind::CreatePool,
                    format!("dial {}: {e}", inner.address),
                )
            })?;
            let mut state = inner.lock_state();
            state.total += 1;
            state.idle.push_back(IdleConn {
                stream,
                parked_at: Instant::now(),
            });
        }

        tokio::spawn(reap_loop(Arc::downgrade(&inner)));
        Ok(Self { inner })
    }

    /// Takes a connection, waiting up to `wait_timeout` for a slot.
    ///
    /// Prefers an idle connection in the configured reuse order; dials a
    /// fresh socket when nothing usable is parked. Dropping the returned
    /// handle gives the connection back.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::GetConn`] if no slot frees up within `wait_timeout`, the
    /// dial fails, or the pool is closed.
    pub async fn acquire(&self) -> Result<PooledConnection, FdfsError> {
        let config = self.inner.snapshot();
        let permit = match timeout(
            config.wait_timeout,
            Arc::clone(&self.inner.slots).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(FdfsError::new(
                    ErrorKind::GetConn,
                    format!("pool for {} is closed", self.inner.address),
                ));
            }
            Err(_) => {
                return Err(FdfsError::new(
                    ErrorKind::GetConn,
                    format!(
                        "no connection to {} within {:?}",
                        self.inner.address, config.wait_timeout
                    ),
                ));
            }
        };

        // Prefer a parked connection; expired ones are closed on the way.
        loop {
            let candidate = {
                let mut state = self.inner.lock_state();
                if state.closed {
                    return Err(FdfsError::new(
                        ErrorKind::GetConn,
                        format!("pool for {} is closed", self.inner.address),
                    ));
                }
                match config.cache_method {
                    CacheMethod::Fifo => state.idle.pop_front(),
                    CacheMethod::Filo => state.idle.pop_back(),
                }
            };
            let Some(idle) = candidate else { break };
            if idle.parked_at.elapsed() > config.idle_timeout {
                self.inner.lock_state().total -= 1;
                drop(idle.stream);
                continue;
            }
            return Ok(PooledConnection::checked_out(
                idle.stream,
                permit,
                Arc::clone(&self.inner),
                config.io_timeout,
            ));
        }

        // Nothing parked: the permit authorizes one fresh socket.
        let stream = dial(&self.inner.address, config.dial_timeout)
            .await
            .map_err(|e| {
                FdfsError::new(
                    ErrorKind::GetConn,
                    format!("dial {}: {e}", self.inner.address),
                )
            })?;
        self.inner.lock_state().total += 1;
        Ok(PooledConnection::checked_out(
            stream,
            permit,
            Arc::clone(&self.inner),
            config.io_timeout,
        ))
    }

    /// Atomically adopts new capacity and timeout values.
    ///
    /// Growing `max_cap` admits more dials immediately. Shrinking closes
    /// excess idle connections now and drains in-use ones as they release.
    /// New timeouts govern connections acquired after the call; zero fields
    /// keep the current values.
    pub fn update(&self, config: PoolConfig) {
        let (old_cap, new_cap) = {
            let mut current = self.inner.config.write().unwrap_or_else(|e| e.into_inner());
            let old = current.max_cap;
            *current = current.merge(config);
            (old, current.max_cap)
        };

        if new_cap > old_cap {
            self.inner.slots.add_permits(new_cap - old_cap);
        } else if new_cap < old_cap {
            let shrink = old_cap - new_cap;
            let forgotten = self.inner.slots.forget_permits(shrink);
            let mut victims = Vec::new();
            {
                let mut state = self.inner.lock_state();
                state.permit_debt += shrink - forgotten;
                while state.total > new_cap {
                    let Some(idle) = state.idle.pop_front() else {
                        break;
                    };
                    victims.push(idle.stream);
                    state.total -= 1;
                }
            }
            if !victims.is_empty() {
                tracing::debug!(
                    address = %self.inner.address,
                    closed = victims.len(),
                    "idle connections closed by capacity shrink"
                );
            }
        }
    }

    /// Closes the pool: drains every idle socket and fails all subsequent
    /// and waiting acquires. Checked-out connections are closed on release.
    pub fn close(&self) {
        self.inner.slots.close();
        let victims = {
            let mut state = self.inner.lock_state();
            state.closed = true;
            let drained = state.idle.len();
            state.total -= drained;
            state.idle.drain(..).collect::<Vec<_>>()
        };
        drop(victims);
        tracing::debug!(address = %self.inner.address, "pool closed");
    }

    /// Endpoint this pool dials.
    pub fn address(&self) -> &str {
        &self.inner.address
    }

    /// Number of live sockets, idle plus checked out.
    pub fn live_connections(&self) -> usize {
        self.inner.lock_state().total
    }

    /// Number of parked idle sockets.
    pub fn idle_connections(&self) -> usize {
        self.inner.lock_state().idle.len()
    }
}

/// Returns a released connection to the pool or closes it.
fn release(
    inner: &Arc<PoolInner>,
    stream: TcpStream,
    permit: OwnedSemaphorePermit,
    unusable: bool,
) {
    let config = inner.snapshot();
    let mut state = inner.lock_state();
    if state.closed {
        state.total -= 1;
        return;
    }
    if state.permit_debt > 0 {
        state.permit_debt -= 1;
        state.total -= 1;
        permit.forget();
        drop(state);
        drop(stream);
        tracing::debug!(address = %inner.address, "connection drained after capacity shrink");
        return;
    }
    if unusable {
        state.total -= 1;
        drop(state);
        drop(stream);
        tracing::debug!(address = %inner.address, "unusable connection discarded");
        return;
    }
    if state.total > config.max_cap {
        state.total -= 1;
        return;
    }
    state.idle.push_back(IdleConn {
        stream,
        parked_at: Instant::now(),
    });
    // The permit drops here and hands the slot to the longest waiter.
}

/// Closes idle sockets that sat unused past `idle_timeout`.
///
/// Parked connections are pushed to the back, so the front of the deque is
/// always the oldest and expiry is a prefix scan.
async fn reap_loop(weak: Weak<PoolInner>) {
    loop {
        tokio::time::sleep(REAP_INTERVAL).await;
        let Some(inner) = weak.upgrade() else { return };
        let config = inner.snapshot();
        let mut victims = Vec::new();
        {
            let mut state = inner.lock_state();
            if state.closed {
                return;
            }
            while let Some(front) = state.idle.front() {
                let expired = front.parked_at.elapsed() > config.idle_timeout;
                if !expired && state.total <= config.max_cap {
                    break;
                }
                let Some(idle) = state.idle.pop_front() else {
                    break;
                };
                victims.push(idle.stream);
                state.total -= 1;
            }
        }
        if !victims.is_empty() {
            tracing::debug!(
                address = %inner.address,
                closed = victims.len(),
                "idle connections reaped"
            );
        }
    }
}

/// Connects to `address` within `dial_timeout`.
async fn dial(address: &str, dial_timeout: Duration) -> io::Result<TcpStream> {
    match timeout(dial_timeout, TcpStream::connect(address)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("connect to {address} timed out"),
        )),
    }
}
