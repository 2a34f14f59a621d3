//! Database transaction wrapper: begin, run callback, commit or roll back on
//! every exit path (including panic), with optional labeled debug
//! instrumentation over a process-wide open-transaction counter.

use crate::error::LifecycleError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Mutex;
use std::time::Instant;

/// Transactional store seam. Implemented for `sqlx::PgPool`; tests use mocks.
#[async_trait]
pub trait Transactor: Send + Sync {
    type Tx: Send;

    async fn begin(&self) -> Result<Self::Tx, LifecycleError>;
    async fn commit(&self, tx: Self::Tx) -> Result<(), LifecycleError>;
    async fn rollback(&self, tx: Self::Tx) -> Result<(), LifecycleError>;
}

#[async_trait]
impl Transactor for sqlx::PgPool {
    type Tx = sqlx::Transaction<'static, sqlx::Postgres>;

    async fn begin(&self) -> Result<Self::Tx, LifecycleError> {
        sqlx::Pool::begin(self)
            .await
            .map_err(|e| LifecycleError::TxBegin {
                detail: e.to_string(),
            })
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), LifecycleError> {
        tx.commit().await.map_err(|e| LifecycleError::Commit {
            detail: e.to_string(),
        })
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), LifecycleError> {
        tx.rollback().await.map_err(LifecycleError::Db)
    }
}

// Diagnostics only: never consulted for correctness.
static OPEN_TRANSACTIONS: Mutex<i64> = Mutex::new(0);

/// Current count of in-flight wrapped transactions, process-wide.
pub fn open_transaction_count() -> i64 {
    *OPEN_TRANSACTIONS
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

struct OpenTxGuard;

impl OpenTxGuard {
    fn enter() -> (Self, i64) {
        let mut n = OPEN_TRANSACTIONS
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *n += 1;
        (OpenTxGuard, *n)
    }
}

impl Drop for OpenTxGuard {
    fn drop(&mut self) {
        let mut n = OPEN_TRANSACTIONS
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *n -= 1;
    }
}

/// Run `callback` inside a transaction.
///
/// The callback receives the transaction handle and `env`, the borrowed
/// per-request context, both covered by the same quantified lifetime. The
/// context is threaded as an explicit argument because a boxed callback
/// future cannot borrow from the closure's own environment; the wrapper
/// keeps ownership of the handle so rollback still runs on every exit path.
///
/// - begin failure returns immediately; the callback never runs
/// - callback error rolls back and propagates the error unchanged
/// - callback panic rolls back, then resumes the identical panic
/// - on success the commit error, if any, overwrites the success outcome
///
/// Exactly one of commit/rollback executes on every path after a successful
/// begin. When `label` is Some, start and end are logged at debug level with
/// elapsed wall time and the open-transaction count.
pub async fn run_in_transaction<T, C, R, F>(
    transactor: &T,
    env: &mut C,
    label: Option<&str>,
    callback: F,
) -> Result<R, LifecycleError>
where
    T: Transactor,
    C: Send,
    R: Send,
    F: for<'a> FnOnce(&'a mut T::Tx, &'a mut C) -> BoxFuture<'a, Result<R, LifecycleError>>
        + Send,
{
    let started = Instant::now();
    let (_guard, open) = OpenTxGuard::enter();
    if let Some(label) = label {
        tracing::debug!(label, open_transactions = open, "transaction start");
    }
    let mut tx = transactor.begin().await?;
    let outcome = AssertUnwindSafe(callback(&mut tx, env)).catch_unwind().await;
    match outcome {
        Err(panic) => {
            if let Err(e) = transactor.rollback(tx).await {
                tracing::warn!(error = %e, "rollback after panic failed");
            }
            if let Some(label) = label {
                tracing::debug!(
                    label,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "transaction end: rollback on panic"
                );
            }
            std::panic::resume_unwind(panic);
        }
        Ok(Err(err)) => {
            if let Err(e) = transactor.rollback(tx).await {
                tracing::warn!(error = %e, "rollback after error failed");
            }
            if let Some(label) = label {
                tracing::debug!(
                    label,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "transaction end: rollback on error"
                );
            }
            Err(err)
        }
        Ok(Ok(value)) => match transactor.commit(tx).await {
            Ok(()) => {
                if let Some(label) = label {
                    tracing::debug!(
                        label,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "transaction end: commit"
                    );
                }
                Ok(value)
            }
            Err(e) => {
                if let Some(label) = label {
                    tracing::debug!(
                        label,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "transaction end: commit failed"
                    );
                }
                Err(e)
            }
        },
    }
}
