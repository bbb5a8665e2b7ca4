//! Owned background task execution.
//!
//! Every task the client spawns (the transport's queue driver, coalesced
//! network calls, delayed background refreshes) goes through a
//! [`TaskDispatcher`]. The component owning the dispatcher cancels all of
//! them when it is dropped, so no completion ever fires after its owner is
//! gone.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use rand::Rng;
use smol_str::SmolStr;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info_span};

use crate::metrics;

/// Identifies a dispatched task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskKey {
    /// Kind of the task (e.g. "queue_driver", "customer_info").
    pub kind: SmolStr,
    /// Unique identifier within the dispatcher.
    pub id: u64,
}

#[derive(Debug)]
struct DispatcherInner {
    owner: SmolStr,
    tasks: DashMap<TaskKey, JoinHandle<()>>,
    key_counter: AtomicU64,
}

/// Spawns tasks on the tokio runtime and keeps their handles for cancellation.
///
/// Cloning is cheap; clones track the same set of tasks.
#[derive(Clone, Debug)]
pub struct TaskDispatcher {
    inner: Arc<DispatcherInner>,
}

impl TaskDispatcher {
    /// Creates a dispatcher; `owner` appears in task spans.
    pub fn new(owner: impl Into<SmolStr>) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                owner: owner.into(),
                tasks: DashMap::new(),
                key_counter: AtomicU64::new(0),
            }),
        }
    }

    fn next_key(&self, kind: impl Into<SmolStr>) -> TaskKey {
        let id = self.inner.key_counter.fetch_add(1, Ordering::Relaxed);
        TaskKey {
            kind: kind.into(),
            id,
        }
    }

    /// Spawns `task` immediately.
    pub fn spawn<F>(&self, kind: impl Into<SmolStr>, task: F) -> TaskKey
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn_after(kind, Duration::ZERO, task)
    }

    /// Spawns `task` after a random delay in `0..=max_delay`.
    ///
    /// Spreads load when many clients start work at the same moment.
    pub fn spawn_with_random_delay<F>(
        &self,
        kind: impl Into<SmolStr>,
        max_delay: Duration,
        task: F,
    ) -> TaskKey
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn_after(kind, random_delay(max_delay), task)
    }

    fn spawn_after<F>(&self, kind: impl Into<SmolStr>, delay: Duration, task: F) -> TaskKey
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cleanup_finished();

        let key = self.next_key(kind);
        let inner = self.inner.clone();
        let span = info_span!(
            "dispatched_task",
            owner = %self.inner.owner,
            kind = %key.kind,
            id = key.id,
        );

        // The task leaves the map when it finishes, so it must not run
        // before its handle is in there.
        let (registered, on_registered) = oneshot::channel::<()>();
        let task_key = key.clone();
        let handle = tokio::spawn(
            async move {
                let _ = on_registered.await;
                if !delay.is_zero() {
                    debug!(delay_ms = delay.as_millis() as u64, "Delaying task");
                    tokio::time::sleep(delay).await;
                }
                task.await;
                inner.tasks.remove(&task_key);
                metrics::task_completed(&task_key.kind);
            }
            .instrument(span),
        );
        self.inner.tasks.insert(key.clone(), handle);
        let _ = registered.send(());
        metrics::task_spawned(&key.kind);
        key
    }

    /// Number of tasks that have not finished yet.
    #[cfg(test)]
    fn active_task_count(&self) -> usize {
        self.inner
            .tasks
            .iter()
            .filter(|entry| !entry.value().is_finished())
            .count()
    }

    /// Drops handles of finished tasks.
    pub fn cleanup_finished(&self) {
        self.inner.tasks.retain(|_, handle| !handle.is_finished());
    }

    /// Aborts every tracked task.
    pub fn cancel_all(&self) {
        let mut cancelled = 0usize;
        for entry in self.inner.tasks.iter() {
            entry.value().abort();
            cancelled += 1;
        }
        if cancelled > 0 {
            debug!(owner = %self.inner.owner, cancelled, "Cancelled dispatched tasks");
        }
    }

    /// Waits until every tracked task has finished.
    #[cfg(test)]
    async fn wait_all(&self) {
        loop {
            self.cleanup_finished();
            if self.inner.tasks.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
    }
}

fn random_delay(max_delay: Duration) -> Duration {
    if max_delay.is_zero() {
        return Duration::ZERO;
    }
    let max_millis = u64::try_from(max_delay.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_spawned_task_runs() {
        let dispatcher = TaskDispatcher::new("test");
        let counter = Arc::new(AtomicUsize::new(0));

        let task_counter = counter.clone();
        dispatcher.spawn("increment", async move {
            task_counter.fetch_add(1, Ordering::SeqCst);
        });
        dispatcher.wait_all().await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.active_task_count(), 0);
    }

    /// Cancelled tasks never reach their side effects.
    #[tokio::test]
    async fn test_cancel_all_aborts_pending_work() {
        let dispatcher = TaskDispatcher::new("test");
        let counter = Arc::new(AtomicUsize::new(0));

        let task_counter = counter.clone();
        dispatcher.spawn("slow", async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            task_counter.fetch_add(1, Ordering::SeqCst);
        });
        dispatcher.cancel_all();
        dispatcher.wait_all().await;

        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    /// Finished tasks leave the map on their own, even when they complete
    /// before `spawn` returns.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_finished_tasks_remove_themselves() {
        let dispatcher = TaskDispatcher::new("test");
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..200 {
            let task_counter = counter.clone();
            dispatcher.spawn("instant", async move {
                task_counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        tokio::time::timeout(Duration::from_secs(5), async {
            while !dispatcher.inner.tasks.is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("finished task handles were left in the map");
        assert_eq!(counter.load(Ordering::SeqCst), 200);
    }

    #[test]
    fn test_random_delay_is_bounded() {
        for _ in 0..100 {
            assert!(random_delay(Duration::from_millis(50)) <= Duration::from_millis(50));
        }
        assert_eq!(random_delay(Duration::ZERO), Duration::ZERO);
    }
}
