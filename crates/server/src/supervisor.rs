//! Ownership of background request work.
//!
//! Slack expects an acknowledgement within three seconds, so answers are
//! produced after the HTTP response. Every such task is owned by the
//! supervisor: it is bounded by a deadline, reaped when done, and aborted on
//! shutdown.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinSet;

#[derive(Clone)]
pub struct TaskSupervisor {
    tasks: Arc<Mutex<JoinSet<()>>>,
    deadline: Duration,
}

impl std::fmt::Debug for TaskSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSupervisor")
            .field("deadline", &self.deadline)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl TaskSupervisor {
    /// Tasks still running after `deadline` are cancelled.
    pub fn new(deadline: Duration) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(JoinSet::new())),
            deadline,
        }
    }

    fn lock(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `task` in the background under the supervisor's deadline.
    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let deadline = self.deadline;
        let mut tasks = self.lock();
        reap(&mut tasks);
        tasks.spawn(async move {
            if tokio::time::timeout(deadline, task).await.is_err() {
                tracing::warn!("{} cancelled after {:?}", name, deadline);
            }
        });
    }

    /// Tasks not yet reaped.
    pub fn in_flight(&self) -> usize {
        let mut tasks = self.lock();
        reap(&mut tasks);
        tasks.len()
    }

    /// Abort everything still running and wait for it to unwind.
    pub async fn shutdown(&self) {
        let mut tasks = std::mem::take(&mut *self.lock());
        if !tasks.is_empty() {
            tracing::info!("Aborting {} in-flight requests", tasks.len());
        }
        tasks.shutdown().await;
    }
}

fn reap(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.try_join_next() {
        if let Err(e) = result {
            if e.is_panic() {
                tracing::error!("Background request panicked: {}", e);
            }
        }
    }
}
