//! Append-only usage ledger.
//!
//! One background task owns the store. Appends are queued on a channel and
//! group-committed; reads go through the same channel so they observe every
//! append queued before them.

mod file;

pub use file::FileLedgerStore;

use std::io;
use std::path::Path;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, warn};

use crate::limits::LEDGER_CHANNEL_CAPACITY;
use crate::model::LedgerEntry;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger io: {0}")]
    Io(#[from] io::Error),
    #[error("ledger writer shut down")]
    Closed,
    #[error("ledger queue full")]
    Full,
}

/// Durable, append-only storage for ledger rows.
pub trait LedgerStore: Send + 'static {
    /// Buffer one entry without syncing.
    fn append_buffered(&mut self, entry: &LedgerEntry) -> io::Result<()>;

    /// Make every buffered entry durable.
    fn flush_sync(&mut self) -> io::Result<()>;

    /// Drop everything buffered since the last successful `flush_sync`,
    /// including bytes that already reached the medium.
    fn discard_pending(&mut self) -> io::Result<()>;

    /// Every committed entry in append order.
    fn load(&self) -> io::Result<Vec<LedgerEntry>>;
}

/// Volatile store, for tests and throwaway processes.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    committed: Vec<LedgerEntry>,
    pending: Vec<LedgerEntry>,
}

impl LedgerStore for MemoryLedgerStore {
    fn append_buffered(&mut self, entry: &LedgerEntry) -> io::Result<()> {
        self.pending.push(entry.clone());
        Ok(())
    }

    fn flush_sync(&mut self) -> io::Result<()> {
        self.committed.append(&mut self.pending);
        Ok(())
    }

    fn discard_pending(&mut self) -> io::Result<()> {
        self.pending.clear();
        Ok(())
    }

    fn load(&self) -> io::Result<Vec<LedgerEntry>> {
        Ok(self.committed.clone())
    }
}

type Responder = Option<oneshot::Sender<io::Result<()>>>;

enum LedgerCommand {
    Append {
        entry: LedgerEntry,
        response: Responder,
    },
    Entries {
        response: oneshot::Sender<io::Result<Vec<LedgerEntry>>>,
    },
}

/// Background task that owns the store and batches appends for group commit.
/// 1. Block until a command arrives.
/// 2. For an append, drain every immediately available append into the batch.
/// 3. Single flush_sync for the whole batch, then answer all waiters. A batch
///    that fails anywhere is rolled back whole, so no partial record survives.
/// 4. Any other command is handled after the batch in front of it is flushed.
async fn ledger_writer_loop(mut store: Box<dyn LedgerStore>, mut rx: mpsc::Receiver<LedgerCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            LedgerCommand::Append { entry, response } => {
                let mut batch = vec![(entry, response)];
                let mut deferred = None;
                loop {
                    match rx.try_recv() {
                        Ok(LedgerCommand::Append { entry, response }) => batch.push((entry, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break, // channel empty, flush batch
                    }
                }
                commit_batch(store.as_mut(), &mut batch);
                if let Some(other) = deferred {
                    handle_read(store.as_ref(), other);
                }
            }
            other => handle_read(store.as_ref(), other),
        }
    }
}

fn commit_batch(store: &mut dyn LedgerStore, batch: &mut Vec<(LedgerEntry, Responder)>) {
    metrics::histogram!(crate::observability::LEDGER_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();

    let result = batch
        .iter()
        .try_for_each(|(entry, _)| store.append_buffered(entry))
        .and_then(|()| store.flush_sync());
    if result.is_err()
        && let Err(e) = store.discard_pending()
    {
        error!("ledger rollback failed: {e}");
    }

    metrics::histogram!(crate::observability::LEDGER_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    if let Err(e) = &result {
        metrics::counter!(crate::observability::LEDGER_WRITE_FAILURES_TOTAL).increment(batch.len() as u64);
        error!("ledger write failed for {} entries: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        if let Some(tx) = tx {
            let r = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = tx.send(r);
        }
    }
}

fn handle_read(store: &dyn LedgerStore, cmd: LedgerCommand) {
    match cmd {
        LedgerCommand::Entries { response } => {
            let _ = response.send(store.load());
        }
        LedgerCommand::Append { .. } => unreachable!(),
    }
}

/// Handle to the ledger writer. Cheap to share behind an `Arc`.
pub struct UsageLedger {
    tx: mpsc::Sender<LedgerCommand>,
}

impl UsageLedger {
    /// Spawn the writer task over `store`. Must be called inside a tokio runtime.
    pub fn spawn(store: impl LedgerStore) -> Self {
        let (tx, rx) = mpsc::channel(LEDGER_CHANNEL_CAPACITY);
        tokio::spawn(ledger_writer_loop(Box::new(store), rx));
        Self { tx }
    }

    pub fn open_file(path: &Path) -> io::Result<Self> {
        Ok(Self::spawn(FileLedgerStore::open(path)?))
    }

    pub fn in_memory() -> Self {
        Self::spawn(MemoryLedgerStore::default())
    }

    /// Fire-and-forget append. Never waits for the write; failures after
    /// queueing are logged by the writer.
    pub fn record(&self, entry: LedgerEntry) -> Result<(), LedgerError> {
        self.tx
            .try_send(LedgerCommand::Append { entry, response: None })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => LedgerError::Full,
                mpsc::error::TrySendError::Closed(_) => LedgerError::Closed,
            })
    }

    /// Append and wait until the entry is durable.
    pub async fn append(&self, entry: LedgerEntry) -> Result<(), LedgerError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(LedgerCommand::Append {
                entry,
                response: Some(tx),
            })
            .await
            .map_err(|_| LedgerError::Closed)?;
        rx.await.map_err(|_| LedgerError::Closed)?.map_err(LedgerError::from)
    }

    /// Every committed entry, including all appends queued before this call.
    pub async fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(LedgerCommand::Entries { response: tx })
            .await
            .map_err(|_| LedgerError::Closed)?;
        rx.await.map_err(|_| LedgerError::Closed)?.map_err(LedgerError::from)
    }

    /// Wait for everything queued so far to be written.
    pub async fn drain(&self) {
        if let Err(e) = self.entries().await {
            warn!("ledger drain: {e}");
        }
    }
}
