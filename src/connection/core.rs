use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use tracing::debug;

use crate::config::{ConnectOptions, IsolationLevel};
use crate::error::{ErrorKind, SqlBridgeError};
use crate::results::{Factories, RowFactory, TextFactory};
use crate::worker::{CursorId, SharedProperties, SqliteWorker};

const UNOPENED: u8 = 0;
const OPEN: u8 = 1;
const CLOSED: u8 = 2;

/// Lifecycle of a [`Connection`]. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unopened,
    Open,
    Closed,
}

/// Asynchronous handle to one SQLite connection.
///
/// Every operation is queued to a dedicated worker thread that owns the driver handle and runs
/// queued operations one at a time in submission order, so clones of a `Connection` can be used
/// from any number of tasks.
///
/// Cancelling an operation (dropping its future, or a `tokio::time::timeout` firing) only stops
/// the wait: the statement was already queued and still runs on the worker, and its result is
/// thrown away. Use [`Connection::interrupt`] to abort a statement that is already executing.
///
/// When the last clone (including clones held by cursors) is dropped without
/// [`Connection::close`], the worker finishes the queued operations and closes the handle on
/// its own.
#[derive(Clone)]
pub struct Connection {
    pub(crate) inner: Arc<ConnectionInner>,
}

pub(crate) struct ConnectionInner {
    pub(crate) options: ConnectOptions,
    pub(crate) worker: SqliteWorker,
    props: Arc<SharedProperties>,
    // Shared with the open command, which settles the state even if its caller gave up.
    state: Arc<AtomicU8>,
    factories: RwLock<Factories>,
    interrupt: Arc<OnceLock<rusqlite::InterruptHandle>>,
    next_cursor_id: AtomicU64,
}

impl Connection {
    /// Spawn the worker for a connection without opening the database yet.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::ConfigError`] for invalid options and
    /// [`SqlBridgeError::ConnectionError`] if the worker thread cannot be spawned.
    pub fn new(options: impl Into<ConnectOptions>) -> Result<Self, SqlBridgeError> {
        let options = options.into();
        options.validate()?;
        let props = Arc::new(SharedProperties::new(options.isolation_level));
        let worker = SqliteWorker::spawn(Arc::clone(&props))?;
        Ok(Self {
            inner: Arc::new(ConnectionInner {
                options,
                worker,
                props,
                state: Arc::new(AtomicU8::new(UNOPENED)),
                factories: RwLock::new(Factories::default()),
                interrupt: Arc::new(OnceLock::new()),
                next_cursor_id: AtomicU64::new(1),
            }),
        })
    }

    /// Open the database on the worker thread.
    ///
    /// The state change happens on the worker, so a cancelled `open` (for example under
    /// `tokio::time::timeout`) still leaves the connection `Open` once the queued command ran.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::OpenError`] if the driver cannot open the target (the worker is
    /// then shut down and the connection is `Closed`), or [`SqlBridgeError::UsageError`] if the
    /// connection is not `Unopened`.
    pub async fn open(&self) -> Result<(), SqlBridgeError> {
        match self.state() {
            ConnectionState::Unopened => {}
            ConnectionState::Open => return Err(SqlBridgeError::usage("connection already open")),
            ConnectionState::Closed => return Err(SqlBridgeError::closed()),
        }

        let options = self.inner.options.clone();
        let lifecycle = Arc::clone(&self.inner.state);
        let interrupt = Arc::clone(&self.inner.interrupt);
        let opened = self
            .inner
            .worker
            .call("open", move |state| match state.open(&options) {
                Ok(handle) => {
                    let _ = interrupt.set(handle);
                    lifecycle
                        .compare_exchange(UNOPENED, OPEN, Ordering::SeqCst, Ordering::SeqCst)
                        .map(|_| ())
                        .map_err(|_| SqlBridgeError::closed())
                }
                Err(err) => {
                    if err.kind() == ErrorKind::Connection {
                        lifecycle.store(CLOSED, Ordering::SeqCst);
                    }
                    Err(err)
                }
            })
            .await;

        match opened {
            Ok(()) => {
                debug!(
                    worker_id = self.inner.worker.id(),
                    database = %self.inner.options.target,
                    "SQLite connection opened"
                );
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::Connection => {
                debug!(database = %self.inner.options.target, error = %err, "SQLite open failed");
                self.inner.worker.stop().await;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Close the database once every operation queued before this call has finished.
    ///
    /// Operations submitted after `close` has begun fail with [`SqlBridgeError::UsageError`].
    /// Calling `close` again only waits for the worker thread to finish, which also completes a
    /// shutdown whose first `close` was cancelled.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::ConnectionError`] if the driver reports a failure while closing.
    pub async fn close(&self) -> Result<(), SqlBridgeError> {
        let previous = self.inner.state.swap(CLOSED, Ordering::SeqCst);
        if previous == CLOSED {
            self.inner.worker.stop().await;
            return Ok(());
        }

        let outcome = if previous == OPEN {
            self.inner
                .worker
                .call("close", |state| state.close())
                .await
        } else {
            Ok(())
        };
        self.inner.worker.stop().await;
        debug!(
            worker_id = self.inner.worker.id(),
            database = %self.inner.options.target,
            "SQLite connection closed"
        );
        outcome
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        match self.inner.state.load(Ordering::SeqCst) {
            UNOPENED => ConnectionState::Unopened,
            OPEN => ConnectionState::Open,
            _ => ConnectionState::Closed,
        }
    }

    pub(crate) fn ensure_open(&self) -> Result<(), SqlBridgeError> {
        match self.state() {
            ConnectionState::Open => Ok(()),
            ConnectionState::Unopened => Err(SqlBridgeError::usage("connection not opened")),
            ConnectionState::Closed => Err(SqlBridgeError::closed()),
        }
    }

    /// The options this connection was created with.
    #[must_use]
    pub fn options(&self) -> &ConnectOptions {
        &self.inner.options
    }

    /// Rows changed since the connection was opened, as of the last completed operation.
    #[must_use]
    pub fn total_changes(&self) -> u64 {
        self.inner.props.total_changes()
    }

    /// Whether a transaction is open, as of the last completed operation.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.inner.props.in_transaction()
    }

    #[must_use]
    pub fn isolation_level(&self) -> IsolationLevel {
        self.inner.props.isolation_level()
    }

    #[must_use]
    pub fn row_factory(&self) -> RowFactory {
        self.factories().row
    }

    /// Change how rows fetched from now on are shaped. Rows already fetched keep their shape.
    pub fn set_row_factory(&self, factory: RowFactory) {
        self.inner
            .factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .row = factory;
    }

    #[must_use]
    pub fn text_factory(&self) -> TextFactory {
        self.factories().text
    }

    /// Change how TEXT values fetched from now on are decoded.
    pub fn set_text_factory(&self, factory: TextFactory) {
        self.inner
            .factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .text = factory;
    }

    pub(crate) fn factories(&self) -> Factories {
        *self
            .inner
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Abort the statement the worker is currently running, if any.
    ///
    /// This goes straight to the driver instead of through the queue; the interrupted operation
    /// fails with an `SQLITE_INTERRUPT` [`SqlBridgeError::OperationalError`]. Queued operations
    /// are not affected.
    pub fn interrupt(&self) {
        if let Some(handle) = self.inner.interrupt.get() {
            handle.interrupt();
        }
    }

    pub(crate) fn next_cursor_id(&self) -> CursorId {
        self.inner.next_cursor_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("worker_id", &self.inner.worker.id())
            .field("target", &self.inner.options.target)
            .field("state", &self.state())
            .finish()
    }
}
