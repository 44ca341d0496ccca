//! Search-index synchronization hooks.
//!
//! The write path only *notifies* that an aggregate's searchable fields
//! changed. Notification is fire-and-forget: a failure is logged by the
//! caller and never affects the facts already committed.
//!
//! [`SearchQueue`] is an in-process sink that hands notifications to a
//! worker thread over a bounded channel without ever blocking the writer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Sender, TrySendError};
use log::warn;
use thiserror::Error;

use crate::fact::AggregateId;

/// Errors a search sink may report. Never propagated to writers.
#[derive(Debug, Error)]
pub enum SearchSyncError {
    /// The queue dropped the notification.
    #[error("Search queue is full")]
    QueueFull,

    /// The worker has stopped.
    #[error("Search worker is disconnected")]
    Disconnected,

    /// Sink-specific failure.
    #[error("Search synchronization failed: {0}")]
    Failed(String),
}

/// Receives "this aggregate's searchable data changed" notifications.
pub trait SearchSync: Send + Sync {
    /// Called after searchable data of `aggregate_id` was written.
    fn notify(&self, aggregate_id: AggregateId) -> Result<(), SearchSyncError>;
}

/// Tuning for [`SearchQueue`].
#[derive(Debug, Clone)]
pub struct SearchQueueConfig {
    /// Max queued notifications before new ones are dropped.
    pub queue_capacity: usize,
}

impl Default for SearchQueueConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
        }
    }
}

/// Background search synchronizer.
///
/// Runs a dedicated worker thread that calls the handler for every queued
/// aggregate id. Dropping the queue closes the channel, lets the worker drain
/// what is already queued, and joins it.
#[derive(Debug)]
pub struct SearchQueue {
    tx: Option<Sender<AggregateId>>,
    dropped: AtomicU64,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl SearchQueue {
    /// Starts the worker.
    ///
    /// # Errors
    ///
    /// Returns `SearchSyncError::Failed` if the worker thread cannot be spawned.
    pub fn spawn<F>(cfg: SearchQueueConfig, handler: F) -> Result<Self, SearchSyncError>
    where
        F: Fn(AggregateId) -> Result<(), SearchSyncError> + Send + 'static,
    {
        let (tx, rx) = bounded::<AggregateId>(cfg.queue_capacity.max(1));

        let join = thread::Builder::new()
            .name("factline-search".to_string())
            .spawn(move || {
                for aggregate_id in rx {
                    if let Err(e) = handler(aggregate_id) {
                        warn!("event=search_sync status=failed aggregate={aggregate_id} error={e}");
                    }
                }
            })
            .map_err(|e| SearchSyncError::Failed(format!("failed to spawn search worker: {e}")))?;

        Ok(Self {
            tx: Some(tx),
            dropped: AtomicU64::new(0),
            join: Mutex::new(Some(join)),
        })
    }

    /// Notifications rejected because the queue was full or closed.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl SearchSync for SearchQueue {
    /// Non-blocking enqueue.
    fn notify(&self, aggregate_id: AggregateId) -> Result<(), SearchSyncError> {
        let Some(tx) = self.tx.as_ref() else {
            return Err(SearchSyncError::Disconnected);
        };
        match tx.try_send(aggregate_id) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(SearchSyncError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(SearchSyncError::Disconnected)
            }
        }
    }
}

impl Drop for SearchQueue {
    fn drop(&mut self) {
        // Close the channel first so the worker's receive loop ends.
        drop(self.tx.take());

        if let Ok(mut guard) = self.join.lock() {
            if let Some(handle) = guard.take() {
                let _ = handle.join();
            }
        }
    }
}
