//! Prefetching sorted-access streams, one task per provider.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::debug;

use crate::error::Result;
use crate::provider::SortedListProvider;
use crate::types::SortedListEntry;

/// Sorted streams fed by background tasks through bounded channels. A slow
/// provider only delays its own channel. Dropping the pool aborts every
/// task.
pub struct StreamPool {
    receivers: Vec<mpsc::Receiver<Result<SortedListEntry>>>,
    _tasks: JoinSet<()>,
}

impl StreamPool {
    pub fn spawn(providers: &[Arc<dyn SortedListProvider>], capacity: usize) -> Self {
        let mut tasks = JoinSet::new();
        let receivers = providers
            .iter()
            .map(|provider| {
                let (tx, rx) = mpsc::channel(capacity.max(1));
                let provider = provider.clone();
                tasks.spawn(async move {
                    let mut produced = 0usize;
                    loop {
                        match provider.next().await {
                            Ok(Some(entry)) => {
                                produced += 1;
                                if tx.send(Ok(entry)).await.is_err() {
                                    break;
                                }
                            }
                            Ok(None) => break,
                            Err(e) => {
                                let _ = tx.send(Err(e)).await;
                                break;
                            }
                        }
                    }
                    debug!(attribute = provider.attribute(), produced, "sorted stream finished");
                });
                rx
            })
            .collect();
        Self {
            receivers,
            _tasks: tasks,
        }
    }

    /// Take the next entry of each listed stream, waiting on all of them
    /// together. `None` marks an exhausted stream. Results come back in
    /// stream index order.
    pub async fn next_round(&mut self, lists: &[usize]) -> Vec<Option<Result<SortedListEntry>>> {
        let pending = self
            .receivers
            .iter_mut()
            .enumerate()
            .filter(|(i, _)| lists.contains(i))
            .map(|(_, rx)| rx.recv());
        futures::future::join_all(pending).await
    }
}
