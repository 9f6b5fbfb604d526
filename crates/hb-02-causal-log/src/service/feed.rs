//! # Change Feed
//!
//! Streams entries in local change order, optionally following new writes.

use crate::domain::entry::LogEntry;
use crate::domain::errors::LogError;
use crate::service::log::{CausalLog, Position};
use futures::stream::{self, Stream};
use std::pin::Pin;
use tokio::sync::watch;

/// A stream of log entries.
pub type ChangeFeed = Pin<Box<dyn Stream<Item = Result<LogEntry, LogError>> + Send>>;

struct FeedState {
    log: CausalLog,
    position: watch::Receiver<Position>,
    next: u64,
    live: bool,
    done: bool,
}

impl CausalLog {
    /// Entries with a change position greater than `since`.
    ///
    /// With `live`, the feed waits for new entries instead of ending, until
    /// the log is closed. A read error is yielded once and ends the feed.
    pub fn changes(&self, since: u64, live: bool) -> ChangeFeed {
        let state = FeedState {
            log: self.clone(),
            position: self.inner.position.subscribe(),
            next: since + 1,
            live,
            done: false,
        };

        Box::pin(stream::unfold(state, |mut state| async move {
            if state.done {
                return None;
            }
            if let Err(e) = state.log.ready().await {
                state.done = true;
                return Some((Err(e), state));
            }

            loop {
                let position = *state.position.borrow_and_update();
                if position.closed {
                    return None;
                }

                if state.next <= position.changes {
                    let change = state.next;
                    return match state.log.get(change).await {
                        Ok(Some(entry)) => {
                            state.next += 1;
                            Some((Ok(entry), state))
                        }
                        Ok(None) => {
                            state.done = true;
                            let missing = LogError::Corrupt(format!("missing entry {}", change));
                            Some((Err(missing), state))
                        }
                        // closed between the position check and the read
                        Err(LogError::Closed) => None,
                        Err(e) => {
                            state.done = true;
                            Some((Err(e), state))
                        }
                    };
                }

                if !state.live || state.position.changed().await.is_err() {
                    return None;
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use crate::adapters::memory::InMemoryKVStore;
    use crate::service::log::CausalLog;
    use futures::StreamExt;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    fn log() -> CausalLog {
        CausalLog::new(Arc::new(InMemoryKVStore::new()))
    }

    #[tokio::test]
    async fn test_history_feed_ends() {
        let log = log();
        for value in [b"a", b"b", b"c"] {
            log.append(value.to_vec()).await.unwrap();
        }

        let values: Vec<Vec<u8>> = log
            .changes(1, false)
            .map(|entry| entry.unwrap().value)
            .collect()
            .await;
        assert_eq!(values, vec![b"b".to_vec(), b"c".to_vec()]);
    }

    #[tokio::test]
    async fn test_live_feed_follows_writes() {
        let log = log();
        log.append(b"old".to_vec()).await.unwrap();

        let mut feed = log.changes(log.position_now().unwrap(), true);
        let writer = log.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.append(b"new".to_vec()).await.unwrap();
        });

        let entry = timeout(Duration::from_secs(2), feed.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(entry.value, b"new".to_vec());
        assert_eq!(entry.change, 2);
    }

    #[tokio::test]
    async fn test_live_feed_ends_on_close() {
        let log = log();
        log.ready().await.unwrap();
        let mut feed = log.changes(0, true);

        let closer = log.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            closer.close().await.unwrap();
        });

        let next = timeout(Duration::from_secs(2), feed.next()).await.unwrap();
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn test_live_feed_sees_replicated_entries() {
        let log = log();
        log.ready().await.unwrap();
        let mut feed = log.changes(log.position_now().unwrap(), true);

        log.insert_replicated("remote".to_string(), 1, b"r".to_vec())
            .await
            .unwrap();

        let entry = timeout(Duration::from_secs(2), feed.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(entry.origin, "remote");
    }
}
