//! Scoped acquisition of connections and cursors.
//!
//! [`using`] hands a resource to an async body and releases it afterwards on every path,
//! including when the body fails:
//!
//! ```rust,no_run
//! use sqlite_bridge::prelude::*;
//! use sqlite_bridge::scope::using;
//!
//! # async fn demo() -> Result<(), SqlBridgeError> {
//! let conn = sqlite_bridge::connect(":memory:").await?;
//! let rows = using(conn, async |conn| conn.execute_fetchall("SELECT 1", ()).await).await?;
//! assert_eq!(rows.len(), 1);
//! # Ok(())
//! # }
//! ```

use std::future::Future;

use tracing::warn;

use crate::connection::Connection;
use crate::cursor::Cursor;
use crate::error::SqlBridgeError;

/// A handle that must be released when a scope ends.
pub trait Scoped: Send {
    /// Release the handle. Releasing an already released handle is a no-op.
    fn release(&mut self) -> impl Future<Output = Result<(), SqlBridgeError>> + Send;
}

impl Scoped for Connection {
    fn release(&mut self) -> impl Future<Output = Result<(), SqlBridgeError>> + Send {
        self.close()
    }
}

impl Scoped for Cursor {
    fn release(&mut self) -> impl Future<Output = Result<(), SqlBridgeError>> + Send {
        self.close()
    }
}

/// Run `body` with `resource`, then release it.
///
/// # Errors
/// Returns the body's error if it failed (a release failure is then only logged), otherwise the
/// release error, if any.
pub async fn using<R, T>(
    mut resource: R,
    body: impl AsyncFnOnce(&mut R) -> Result<T, SqlBridgeError>,
) -> Result<T, SqlBridgeError>
where
    R: Scoped,
{
    let outcome = body(&mut resource).await;
    let released = resource.release().await;
    match (outcome, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(release_err)) => {
            warn!(error = %release_err, "release after failed scope body failed");
            Err(err)
        }
    }
}

/// Open a connection for the duration of `body` and close it afterwards.
///
/// # Errors
/// Fails like [`crate::connect`] if the connection cannot be opened; otherwise see [`using`].
pub async fn with_connect<T>(
    options: impl Into<crate::ConnectOptions>,
    body: impl AsyncFnOnce(&mut Connection) -> Result<T, SqlBridgeError>,
) -> Result<T, SqlBridgeError> {
    let conn = crate::connect(options).await?;
    using(conn, body).await
}
