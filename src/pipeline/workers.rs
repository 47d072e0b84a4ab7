//! Bounded worker pool for indexing tasks.
//!
//! Tasks run on a dedicated rayon pool. Admission is a bounded channel of tokens: `submit`
//! sends one before spawning (blocking when `capacity` tasks are already running) and the task
//! takes it back when it finishes. So at most `capacity` tasks are ever in flight and the
//! dispatcher is throttled instead of piling up work.

use crossbeam_channel::{Receiver, Sender, bounded};
use log::error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::Result;

pub struct WorkerPool {
    pool: rayon::ThreadPool,
    capacity: usize,
    slots_tx: Sender<()>,
    slots_rx: Receiver<()>,
    counters: Arc<Counters>,
    idle_lock: Mutex<()>,
}

#[derive(Default)]
struct Counters {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// Held by a running task; frees its admission slot on drop (including unwinding).
struct Slot {
    slots_rx: Receiver<()>,
    counters: Arc<Counters>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
        let _ = self.slots_rx.try_recv();
    }
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = capacity.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(capacity)
            .thread_name(|i| format!("{}-worker-{i}", env!("CARGO_PKG_NAME")))
            .panic_handler(|_| error!("Indexing task panicked"))
            .build()?;
        let (slots_tx, slots_rx) = bounded(capacity);
        Ok(Self {
            pool,
            capacity,
            slots_tx,
            slots_rx,
            counters: Arc::new(Counters::default()),
            idle_lock: Mutex::new(()),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tasks currently running.
    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::SeqCst)
    }

    /// Highest `in_flight` seen since the pool was built.
    pub fn peak_in_flight(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    /// Run `task` on the pool. Blocks while the pool is at capacity.
    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        // Both ends are owned here, so this only ever blocks.
        let _ = self.slots_tx.send(());
        let now = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(now, Ordering::SeqCst);
        let slot = Slot {
            slots_rx: self.slots_rx.clone(),
            counters: Arc::clone(&self.counters),
        };
        self.pool.spawn(move || {
            let _slot = slot;
            task();
        });
    }

    /// Block until every submitted task has finished. Must not be called from inside a task.
    pub fn wait_idle(&self) {
        let _guard = self.idle_lock.lock().unwrap_or_else(PoisonError::into_inner);
        for _ in 0..self.capacity {
            let _ = self.slots_tx.send(());
        }
        for _ in 0..self.capacity {
            let _ = self.slots_rx.recv();
        }
    }
}
