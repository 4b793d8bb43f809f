use std::time::Duration;

use futures::future::{AbortHandle, Abortable};
use tokio::runtime::Handle;

/// A unit of work handed to a [`Scheduler`]
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// A task scheduled for later
pub trait ScheduledTask: Send + Sync {
    /// Cancels the task if it has not started yet
    fn cancel(&self);
}

/// Worker pool and timer shared by all module containers of a host
pub trait Scheduler: Send + Sync {
    fn submit(&self, task: Task);

    fn schedule_once(&self, delay: Duration, task: Task) -> Box<dyn ScheduledTask>;
}

/// Runs tasks on the blocking pool of a Tokio runtime
///
/// Driving a module calls factories and the host synchronously,
/// so tasks never run on the async workers themselves.
#[derive(Clone)]
pub struct TokioScheduler {
    handle: Handle,
}
impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Uses the runtime of the caller
    ///
    /// Panics outside of a Tokio runtime, like [`Handle::current`]
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}
impl Scheduler for TokioScheduler {
    fn submit(&self, task: Task) {
        drop(self.handle.spawn_blocking(task));
    }

    fn schedule_once(&self, delay: Duration, task: Task) -> Box<dyn ScheduledTask> {
        let (abort, registration) = AbortHandle::new_pair();
        drop(self.handle.spawn(async move {
            let sleep = Abortable::new(tokio::time::sleep(delay), registration);
            if sleep.await.is_err() {
                tracing::debug!(?delay, "Timer cancelled");
                return;
            }
            if let Err(error) = tokio::task::spawn_blocking(task).await {
                tracing::warn!(%error, "Timer task did not complete");
            }
        }));
        Box::new(TokioTimer(abort))
    }
}

struct TokioTimer(AbortHandle);
impl ScheduledTask for TokioTimer {
    fn cancel(&self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;

    #[tokio::test]
    async fn submitted_tasks_run() {
        let scheduler = TokioScheduler::current();
        let (tx, rx) = futures_channel::oneshot::channel();
        scheduler.submit(Box::new(move || {
            let _ = tx.send(42);
        }));
        assert_eq!(rx.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn cancelled_timer_never_fires() {
        let scheduler = TokioScheduler::current();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        let timer = scheduler.schedule_once(
            Duration::from_millis(20),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        timer.cancel();

        let counter = fired.clone();
        let (tx, rx) = futures_channel::oneshot::channel();
        let _kept = scheduler.schedule_once(
            Duration::from_millis(40),
            Box::new(move || {
                counter.fetch_add(10, Ordering::SeqCst);
                let _ = tx.send(());
            }),
        );

        rx.await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 10);
    }
}
