//! # Lifecycle
//!
//! Background task bookkeeping and the ordered teardown behind
//! [`HyperEmitter::close`].
//!
//! ## Teardown Order
//!
//! 1. Abort every peer connection and listening endpoint
//! 2. Abort startup, dispatch and reconnection tasks, and wait for them
//! 3. Close the log (which closes the store and ends every change feed)
//! 4. Publish `Closed`

use crate::emitter::{HyperEmitter, ReadyState};
use crate::errors::EmitterError;
use futures::future::join_all;
use parking_lot::Mutex;
use shared_bus::{StatusEvent, StatusPublisher};
use std::sync::atomic::Ordering;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Tasks owned by an emitter. Once shut down, newly tracked tasks are
/// aborted immediately.
#[derive(Debug)]
pub(crate) struct TaskSet {
    tasks: Mutex<Option<Vec<(&'static str, JoinHandle<()>)>>>,
}

impl Default for TaskSet {
    fn default() -> Self {
        Self {
            tasks: Mutex::new(Some(Vec::new())),
        }
    }
}

impl TaskSet {
    pub(crate) fn track(&self, name: &'static str, task: JoinHandle<()>) {
        match self.tasks.lock().as_mut() {
            Some(tasks) => {
                tasks.retain(|(_, task)| !task.is_finished());
                tasks.push((name, task));
            }
            None => {
                debug!(task = name, "[emitter] Task started after shutdown, aborting");
                task.abort();
            }
        }
    }

    /// Abort every task and wait until they are gone.
    pub(crate) async fn shutdown(&self) -> usize {
        let tasks = self.tasks.lock().take().unwrap_or_default();
        for (_, task) in &tasks {
            task.abort();
        }
        let count = tasks.len();
        join_all(tasks.into_iter().map(|(_, task)| task)).await;
        count
    }
}

/// Collects teardown failures. Every step runs; the first failure wins.
#[derive(Debug, Default)]
struct Teardown {
    first: Option<EmitterError>,
}

impl Teardown {
    fn record(&mut self, step: &'static str, result: Result<(), EmitterError>) {
        if let Err(error) = result {
            warn!(step, %error, "[emitter] Teardown step failed");
            self.first.get_or_insert(error);
        }
    }

    fn finish(self) -> Result<(), EmitterError> {
        self.first.map_or(Ok(()), Err)
    }
}

impl HyperEmitter {
    /// Tear down every connection, listener, feed and finally the store.
    ///
    /// Safe to call on an emitter that never finished starting. A second
    /// call returns immediately.
    pub async fn close(&self) -> Result<(), EmitterError> {
        let inner = &self.inner;
        if inner.closing.swap(true, Ordering::AcqRel) {
            debug!("[emitter] Close already in progress");
            return Ok(());
        }
        info!("[emitter] Closing emitter");

        let (connections, listeners, tasks) = tokio::join!(
            inner.peers.close_connections(),
            inner.peers.close_listeners(),
            inner.tasks.shutdown(),
        );
        debug!(connections, listeners, tasks, "[emitter] Aborted background work");

        let mut teardown = Teardown::default();
        teardown.record("log", inner.log.close().await);

        inner.ready.send_replace(ReadyState::Closed);
        inner.status.publish(StatusEvent::Closed);
        info!("[emitter] Emitter closed");
        teardown.finish()
    }
}
