use std::time::Duration;

use clap::ValueEnum;
use rusqlite::OpenFlags;
use serde::{Deserialize, Deserializer};

use crate::error::SqlBridgeError;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// How the worker opens transactions on behalf of the caller.
///
/// With any level other than [`IsolationLevel::Autocommit`], an `INSERT`, `UPDATE`, `DELETE`
/// or `REPLACE` issued while no transaction is active first runs `BEGIN <level>`; the
/// transaction then stays open until `commit()` or `rollback()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, ValueEnum, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    #[default]
    Deferred,
    Immediate,
    Exclusive,
    /// Never open transactions implicitly.
    Autocommit,
}

impl IsolationLevel {
    pub(crate) fn begin_statement(self) -> Option<&'static str> {
        match self {
            IsolationLevel::Deferred => Some("BEGIN DEFERRED"),
            IsolationLevel::Immediate => Some("BEGIN IMMEDIATE"),
            IsolationLevel::Exclusive => Some("BEGIN EXCLUSIVE"),
            IsolationLevel::Autocommit => None,
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            IsolationLevel::Deferred => 0,
            IsolationLevel::Immediate => 1,
            IsolationLevel::Exclusive => 2,
            IsolationLevel::Autocommit => 3,
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => IsolationLevel::Immediate,
            2 => IsolationLevel::Exclusive,
            3 => IsolationLevel::Autocommit,
            _ => IsolationLevel::Deferred,
        }
    }
}

/// Options forwarded to the driver when a connection is opened.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConnectOptions {
    /// Database path, `:memory:`, or a `file:` URI when `uri` is set.
    pub target: String,
    /// How long the driver waits on a locked database before failing, in seconds.
    #[serde(default = "default_busy_timeout", deserialize_with = "seconds")]
    pub busy_timeout: Duration,
    #[serde(default)]
    pub isolation_level: IsolationLevel,
    #[serde(default)]
    pub uri: bool,
    #[serde(default)]
    pub read_only: bool,
    /// `PRAGMA` assignments applied right after opening, in order.
    #[serde(default)]
    pub pragmas: Vec<(String, String)>,
}

fn default_busy_timeout() -> Duration {
    DEFAULT_BUSY_TIMEOUT
}

fn seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

impl ConnectOptions {
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            isolation_level: IsolationLevel::default(),
            uri: false,
            read_only: false,
            pragmas: Vec::new(),
        }
    }

    #[must_use]
    pub fn builder(target: impl Into<String>) -> ConnectOptionsBuilder {
        ConnectOptionsBuilder::new(target)
    }

    /// Check the options before a worker is spawned for them.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::ConfigError`] for an empty target or one containing NUL.
    pub fn validate(&self) -> Result<(), SqlBridgeError> {
        if self.target.is_empty() {
            return Err(SqlBridgeError::ConfigError(
                "database target must not be empty".into(),
            ));
        }
        if self.target.contains('\0') {
            return Err(SqlBridgeError::ConfigError(
                "database target must not contain NUL bytes".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn open_flags(&self) -> OpenFlags {
        let mut flags = if self.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
        };
        // The worker thread is the only user of the handle.
        flags |= OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if self.uri {
            flags |= OpenFlags::SQLITE_OPEN_URI;
        }
        flags
    }
}

impl From<&str> for ConnectOptions {
    fn from(target: &str) -> Self {
        ConnectOptions::new(target)
    }
}

impl From<String> for ConnectOptions {
    fn from(target: String) -> Self {
        ConnectOptions::new(target)
    }
}

impl From<&std::path::Path> for ConnectOptions {
    fn from(path: &std::path::Path) -> Self {
        ConnectOptions::new(path.to_string_lossy().into_owned())
    }
}

/// Fluent builder for [`ConnectOptions`].
#[derive(Debug, Clone)]
pub struct ConnectOptionsBuilder {
    opts: ConnectOptions,
}

impl ConnectOptionsBuilder {
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            opts: ConnectOptions::new(target),
        }
    }

    #[must_use]
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.opts.busy_timeout = timeout;
        self
    }

    #[must_use]
    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.opts.isolation_level = level;
        self
    }

    #[must_use]
    pub fn uri(mut self, uri: bool) -> Self {
        self.opts.uri = uri;
        self
    }

    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.opts.read_only = read_only;
        self
    }

    #[must_use]
    pub fn pragma(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.opts.pragmas.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn finish(self) -> ConnectOptions {
        self.opts
    }

    /// Open a connection with the built options.
    ///
    /// # Errors
    ///
    /// Returns `SqlBridgeError` if the options are invalid or the database cannot be opened.
    pub async fn connect(self) -> Result<crate::Connection, SqlBridgeError> {
        crate::connect(self.finish()).await
    }
}
