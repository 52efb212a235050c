//! Tracking for fire-and-forget dispatch tasks
//!
//! The scanner never awaits the work it launches, but the daemon still has
//! to know what is in flight when it shuts down.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub completed: usize,
    pub aborted: usize,
}

#[derive(Clone, Default)]
pub struct TaskTracker {
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, JoinSet<()>> {
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.lock().spawn(task);
    }

    /// Collect finished tasks without waiting; returns how many were reaped
    pub fn reap(&self) -> usize {
        let mut tasks = self.lock();
        let mut reaped = 0;
        while let Some(result) = tasks.try_join_next() {
            if let Err(e) = result {
                if e.is_panic() {
                    tracing::error!(error = %e, "Dispatch task panicked");
                }
            }
            reaped += 1;
        }
        reaped
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for in-flight tasks, aborting whatever is left after `grace`.
    ///
    /// `None` waits without limit. Tasks spawned while draining are left
    /// to the next drain.
    pub async fn drain(&self, grace: Option<Duration>) -> DrainSummary {
        let mut tasks = std::mem::take(&mut *self.lock());
        let mut completed = 0;

        let finished = {
            let join_all = async {
                while tasks.join_next().await.is_some() {
                    completed += 1;
                }
            };
            match grace {
                None => {
                    join_all.await;
                    true
                }
                Some(grace) => tokio::time::timeout(grace, join_all).await.is_ok(),
            }
        };

        let mut summary = DrainSummary {
            completed,
            aborted: 0,
        };
        if !finished {
            summary.aborted = tasks.len();
            tracing::warn!(
                remaining = summary.aborted,
                "Shutdown grace period elapsed, aborting dispatch tasks"
            );
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        summary
    }
}
