//! Fixed-size connection pool. Connections live in a bounded channel; checking one out is a
//! `recv`, returning it is a `send` from the guard's `Drop`.

use anyhow::Context;
use crossbeam_channel::{Receiver, Sender, bounded, select};
use log::{debug, error, info};
use rusqlite::Connection;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crate::errors::MetafilerError;
use crate::utils::config::{StorageConfig, is_valid_collection_name};
use crate::{DocumentRecord, Result};

use super::documents::{delete_document, delete_documents_under, upsert_document};
use super::{CollectionSql, DocumentStore, WAL_PRAGMAS, count_documents, find_by_field, find_document};

/// Open one connection: per-call timeout, WAL, liveness check.
fn open_connection(path: &Path, timeout: Duration) -> Result<Connection> {
    let conn = Connection::open(path).context("open database")?;
    conn.busy_timeout(timeout).context("set busy timeout")?;
    conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
        .context("enable WAL")?;
    conn.execute_batch(WAL_PRAGMAS).context("set WAL pragmas")?;
    conn.query_row("SELECT 1", [], |_| Ok(()))
        .context("liveness check")?;
    Ok(conn)
}

pub struct StoragePool {
    database: PathBuf,
    collection: String,
    sql: CollectionSql,
    size: usize,
    conn_tx: Sender<Connection>,
    conn_rx: Receiver<Connection>,
    /// Dropped on close so blocked checkouts wake up.
    closed_tx: Mutex<Option<Sender<()>>>,
    closed_rx: Receiver<()>,
    closed: AtomicBool,
    checked_out: AtomicUsize,
}

impl StoragePool {
    /// Bring up `pool_size` connections in parallel and create the collection's unique path index.
    ///
    /// Every connection is attempted. If any fail, all are dropped and the error reports the
    /// first failure and how many failed.
    pub fn open(cfg: &StorageConfig) -> Result<Self> {
        if !is_valid_collection_name(&cfg.collection) {
            return Err(MetafilerError::Config(format!(
                "invalid collection name {:?}",
                cfg.collection
            ))
            .into());
        }
        let size = cfg.pool_size.max(1);
        let timeout = cfg.timeout();
        info!(
            "Storage pool start: {} (collection {}, {} connections)",
            cfg.database.display(),
            cfg.collection,
            size
        );

        let results: Vec<Result<Connection>> = thread::scope(|s| {
            let handles: Vec<_> = (0..size)
                .map(|_| s.spawn(|| open_connection(&cfg.database, timeout)))
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join()
                        .unwrap_or_else(|_| Err(anyhow::anyhow!("connection thread panicked")))
                })
                .collect()
        });

        let mut conns = Vec::with_capacity(size);
        let mut errors = Vec::new();
        for r in results {
            match r {
                Ok(c) => conns.push(c),
                Err(e) => {
                    error!("Storage connection failed: {:#}", e);
                    errors.push(e);
                }
            }
        }
        if let Some(first) = errors.first() {
            return Err(MetafilerError::StorageStartup {
                failures: errors.len(),
                pool_size: size,
                first: format!("{:#}", first),
            }
            .into());
        }

        let sql = CollectionSql::new(&cfg.collection);
        if let Some(conn) = conns.first() {
            if cfg.drop_on_start {
                info!("Dropping collection {}", cfg.collection);
                conn.execute_batch(&sql.drop).context("drop collection")?;
            }
            conn.execute_batch(&sql.schema).context("create collection index")?;
        }

        let (conn_tx, conn_rx) = bounded(size);
        for c in conns {
            conn_tx
                .send(c)
                .map_err(|_| anyhow::anyhow!("pool channel closed during startup"))?;
        }
        let (closed_tx, closed_rx) = bounded::<()>(0);

        Ok(StoragePool {
            database: cfg.database.clone(),
            collection: cfg.collection.clone(),
            sql,
            size,
            conn_tx,
            conn_rx,
            closed_tx: Mutex::new(Some(closed_tx)),
            closed_rx,
            closed: AtomicBool::new(false),
            checked_out: AtomicUsize::new(0),
        })
    }

    pub fn database(&self) -> &Path {
        &self.database
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Connections currently checked out.
    pub fn checked_out(&self) -> usize {
        self.checked_out.load(Ordering::SeqCst)
    }

    /// Check out a connection, blocking until one is free. Fails once the pool is closed.
    pub fn get(&self) -> Result<PooledConnection<'_>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MetafilerError::PoolClosed.into());
        }
        let conn = select! {
            recv(self.conn_rx) -> conn => conn.map_err(|_| MetafilerError::PoolClosed)?,
            recv(self.closed_rx) -> _ => return Err(MetafilerError::PoolClosed.into()),
        };
        self.checked_out.fetch_add(1, Ordering::SeqCst);
        let guard = PooledConnection {
            pool: self,
            conn: Some(conn),
        };
        if self.closed.load(Ordering::SeqCst) {
            // Raced with close(): hand it back so the drain can finish.
            drop(guard);
            return Err(MetafilerError::PoolClosed.into());
        }
        Ok(guard)
    }

    pub fn find(&self, path: &str) -> Result<Option<DocumentRecord>> {
        let conn = self.get()?;
        find_document(&conn, &self.collection, path)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.get()?;
        count_documents(&conn, &self.collection)
    }

    pub fn find_by_field(&self, field: &str, value: &str) -> Result<Vec<DocumentRecord>> {
        let conn = self.get()?;
        find_by_field(&conn, &self.collection, field, value)
    }

    /// Drain the pool and close every connection. Waits for checked-out connections to come
    /// back. Individual close failures are logged. Calling twice is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Storage pool stop");
        if let Ok(mut tx) = self.closed_tx.lock() {
            tx.take();
        }
        let mut failures = 0_usize;
        for _ in 0..self.size {
            let Ok(conn) = self.conn_rx.recv() else {
                break;
            };
            if let Err((_, e)) = conn.close() {
                failures += 1;
                error!("Storage connection close failed: {}", e);
            }
        }
        debug!(
            "Storage pool closed ({} of {} connections failed to close)",
            failures, self.size
        );
        Ok(())
    }
}

impl DocumentStore for StoragePool {
    fn upsert(&self, record: &DocumentRecord) -> Result<()> {
        let conn = self.get()?;
        upsert_document(&conn, &self.sql, record).map_err(|e| {
            MetafilerError::Storage {
                op: "upsert",
                path: record.path.clone(),
                cause: format!("{:#}", e),
            }
            .into()
        })
    }

    fn delete(&self, path: &str) -> Result<bool> {
        let conn = self.get()?;
        delete_document(&conn, &self.sql, path).map_err(|e| {
            MetafilerError::Storage {
                op: "delete",
                path: path.to_string(),
                cause: format!("{:#}", e),
            }
            .into()
        })
    }

    fn delete_tree(&self, dir: &str) -> Result<usize> {
        let conn = self.get()?;
        delete_documents_under(&conn, &self.sql, dir).map_err(|e| {
            MetafilerError::Storage {
                op: "delete tree",
                path: dir.to_string(),
                cause: format!("{:#}", e),
            }
            .into()
        })
    }
}

/// A checked-out connection. Returned to the pool on drop, whatever the operation's outcome.
pub struct PooledConnection<'a> {
    pool: &'a StoragePool,
    conn: Option<Connection>,
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
            .as_ref()
            .expect("pooled connection is present until drop")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.checked_out.fetch_sub(1, Ordering::SeqCst);
            let _ = self.pool.conn_tx.send(conn);
        }
    }
}
