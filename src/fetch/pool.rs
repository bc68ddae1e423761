use crate::config::types::MAX_CONCURRENCY;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Terminal state of a submitted task.
#[derive(Debug)]
pub enum TaskResult<T> {
    Done(T),
    /// Stop was requested before the task got a worker slot.
    Skipped,
    Panicked(String),
}

/// Bounded-concurrency executor for independent page fetches.
///
/// The bound is the configured concurrency capped at [`MAX_CONCURRENCY`], no matter how
/// many tasks are submitted. The pool is reused across poll cycles.
pub struct WorkerPool<T> {
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<TaskResult<T>>,
    token: CancellationToken,
    concurrency: usize,
}

impl<T: Send + 'static> WorkerPool<T> {
    pub fn new(concurrency: usize, token: CancellationToken) -> Self {
        let concurrency = concurrency.clamp(1, MAX_CONCURRENCY);
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            tasks: JoinSet::new(),
            token,
            concurrency,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Tasks submitted and not yet collected by [`WorkerPool::wait_all`].
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Queue `task`. It starts once a worker slot is free, unless stop has been
    /// requested by then, in which case it is dropped unstarted.
    pub fn submit<F>(&mut self, task: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let semaphore = self.semaphore.clone();
        let token = self.token.clone();

        self.tasks.spawn(async move {
            // The semaphore is never closed, so acquisition only fails if that changes.
            let _permit = semaphore.acquire_owned().await.ok();
            if token.is_cancelled() {
                return TaskResult::Skipped;
            }
            TaskResult::Done(task.await)
        });
    }

    /// Wait for every task submitted so far. In-flight tasks are never aborted.
    pub async fn wait_all(&mut self) -> Vec<TaskResult<T>> {
        let mut results = Vec::with_capacity(self.tasks.len());
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::error!(error = %e, "Page task failed to complete");
                    results.push(TaskResult::Panicked(e.to_string()));
                }
            }
        }
        results
    }
}
