use tracing::warn;

use crate::config::IsolationLevel;
use crate::error::SqlBridgeError;

use super::Connection;

impl Connection {
    /// Start a transaction explicitly.
    ///
    /// Uses the connection's isolation level, or a deferred transaction under
    /// [`IsolationLevel::Autocommit`].
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::UsageError`] if a transaction is already active.
    pub async fn begin(&self) -> Result<(), SqlBridgeError> {
        self.ensure_open()?;
        self.inner
            .worker
            .call("begin", |state| state.begin(false))
            .await
    }

    /// Commit the current transaction. Does nothing when no transaction is active.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::OperationalError`] if the driver cannot commit.
    pub async fn commit(&self) -> Result<(), SqlBridgeError> {
        self.ensure_open()?;
        self.inner
            .worker
            .call("commit", |state| state.commit())
            .await
    }

    /// Roll back the current transaction. Does nothing when no transaction is active.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::OperationalError`] if the driver cannot roll back.
    pub async fn rollback(&self) -> Result<(), SqlBridgeError> {
        self.ensure_open()?;
        self.inner
            .worker
            .call("rollback", |state| state.rollback())
            .await
    }

    /// Change how transactions are opened for subsequent statements.
    ///
    /// Switching to [`IsolationLevel::Autocommit`] commits a pending transaction first.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::OperationalError`] if that commit fails.
    pub async fn set_isolation_level(&self, level: IsolationLevel) -> Result<(), SqlBridgeError> {
        self.ensure_open()?;
        self.inner
            .worker
            .call("set_isolation_level", move |state| {
                state.set_isolation_level(level)
            })
            .await
    }

    /// Run `body` inside a transaction: commit when it returns `Ok`, roll back when it returns
    /// `Err`. A transaction that is already open is joined, and finished by this call.
    ///
    /// If the returned future is dropped before `body` finishes (including while the `BEGIN` is
    /// still queued), the rollback is queued without waiting for it.
    ///
    /// # Errors
    /// Returns the error from `body`, or from beginning or committing the transaction.
    pub async fn transaction<T>(
        &self,
        body: impl AsyncFnOnce(&Connection) -> Result<T, SqlBridgeError>,
    ) -> Result<T, SqlBridgeError> {
        self.ensure_open()?;
        // Armed before the BEGIN is awaited: if this future is dropped while BEGIN is still
        // queued, the rollback is queued behind it.
        let mut guard = RollbackOnDrop {
            conn: self,
            armed: true,
        };
        if let Err(err) = self
            .inner
            .worker
            .call("begin", |state| state.begin(true))
            .await
        {
            guard.armed = false;
            return Err(err);
        }

        let outcome = body(self).await;
        guard.armed = false;
        match outcome {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback().await {
                    warn!(error = %rollback_err, "rollback after failed transaction body failed");
                }
                Err(err)
            }
        }
    }
}

struct RollbackOnDrop<'a> {
    conn: &'a Connection,
    armed: bool,
}

impl Drop for RollbackOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed
            && !self
                .conn
                .inner
                .worker
                .submit_detached("rollback", |state| {
                    if let Err(err) = state.rollback() {
                        warn!(error = %err, "rollback of abandoned transaction failed");
                    }
                })
        {
            warn!("abandoned transaction could not be rolled back: worker closed");
        }
    }
}
