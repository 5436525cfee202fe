//! Tracked execution of background tasks.
//!
//! Work that must not hold up a request (sending mail after a purchase)
//! is submitted here. Each task runs on its own tokio task; an error is
//! logged with the task name, a panic additionally with the stack trace
//! captured where it was raised. Neither affects other tasks. At
//! shutdown the executor stops accepting work and waits, up to a
//! deadline, for in-flight tasks to finish.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Once;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::task::TaskTracker;

thread_local! {
    static PANIC_BACKTRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chain a panic hook that records a backtrace for the panicking thread.
/// The previous hook still runs.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            // try_with: the slot may already be gone on an exiting thread.
            let _ = PANIC_BACKTRACE
                .try_with(|slot| *slot.borrow_mut() = Some(Backtrace::force_capture()));
            previous(info);
        }));
    });
}

/// The backtrace of the last panic on this thread, if not yet taken.
fn take_panic_backtrace() -> Option<Backtrace> {
    PANIC_BACKTRACE.with(|slot| slot.borrow_mut().take())
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("{pending} background task(s) did not finish within {deadline:?}")]
    DrainTimeout { pending: usize, deadline: Duration },
}

/// Runs background tasks and tracks how many are still live.
#[derive(Debug, Clone, Default)]
pub struct TaskExecutor {
    tracker: TaskTracker,
}

impl TaskExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` in the background.
    ///
    /// Returns `false` without running the task once shutdown has begun.
    pub fn submit<F>(&self, name: &'static str, task: F) -> bool
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if self.tracker.is_closed() {
            tracing::warn!(task = name, "Executor is shutting down, task rejected");
            return false;
        }

        install_panic_hook();
        self.tracker.spawn(async move {
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(())) => tracing::debug!(task = name, "Background task finished"),
                Ok(Err(e)) => tracing::error!(task = name, error = %e, "Background task failed"),
                // catch_unwind resumes on the thread that panicked, so the
                // hook's backtrace is still in this thread's slot.
                Err(payload) => {
                    let backtrace = take_panic_backtrace()
                        .map(|bt| bt.to_string())
                        .unwrap_or_else(|| "unavailable".to_string());
                    tracing::error!(
                        task = name,
                        panic = %panic_message(payload.as_ref()),
                        %backtrace,
                        "Background task panicked"
                    );
                }
            }
        });
        true
    }

    /// Number of tasks that have not finished yet.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting tasks and wait for running ones, up to `deadline`.
    ///
    /// Tasks still running at the deadline are left to run; the error
    /// reports how many there were.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), ExecutorError> {
        self.tracker.close();
        tracing::info!(pending = self.pending(), "Draining background tasks");

        match tokio::time::timeout(deadline, self.tracker.wait()).await {
            Ok(()) => Ok(()),
            Err(_) => Err(ExecutorError::DrainTimeout {
                pending: self.pending(),
                deadline,
            }),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
