//! Single-writer actor.
//!
//! All mutations run on one dedicated thread holding one pooled connection,
//! each job inside its own transaction. Jobs execute in submission order.

use std::fmt;

use diesel::sqlite::SqliteConnection;
use diesel::Connection;
use log::error;
use tokio::sync::{mpsc, oneshot};

use ledgerline_core::errors::{DatabaseError, Error, Result};

use super::DbPool;
use crate::errors::StorageError;

type Job = Box<dyn FnOnce(&mut SqliteConnection) + Send + 'static>;

#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::UnboundedSender<Job>,
}

impl fmt::Debug for WriteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteHandle")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl WriteHandle {
    /// Run `job` in a transaction on the writer thread and await its result.
    ///
    /// An `Err` from the job rolls the transaction back.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel::<Result<T>>();
        let boxed: Job = Box::new(move |conn: &mut SqliteConnection| {
            let outcome = conn
                .transaction::<T, StorageError, _>(|tx_conn| job(tx_conn).map_err(StorageError::from))
                .map_err(Error::from);
            let _ = reply_tx.send(outcome);
        });

        self.tx.send(boxed).map_err(|_| {
            Error::Database(DatabaseError::WriterUnavailable(
                "database writer has stopped".to_string(),
            ))
        })?;

        reply_rx.await.map_err(|_| {
            Error::Database(DatabaseError::WriterUnavailable(
                "database writer dropped the job".to_string(),
            ))
        })?
    }
}

/// Start the writer thread. It lives until every handle is dropped.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

    let spawned = std::thread::Builder::new()
        .name("ledgerline-db-writer".to_string())
        .spawn(move || {
            let mut conn = match pool.get() {
                Ok(conn) => conn,
                Err(e) => {
                    error!("Database writer could not acquire a connection: {}", e);
                    return;
                }
            };
            while let Some(job) = rx.blocking_recv() {
                job(&mut *conn);
            }
        });
    if let Err(e) = spawned {
        error!("Failed to spawn database writer thread: {}", e);
    }

    WriteHandle { tx }
}
