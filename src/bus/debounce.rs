use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::trace;

/// Default quiet window before a push-triggered refresh runs.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Trailing-edge debouncer.
///
/// Every `signal()` restarts the window; `action` runs once the window
/// passes with no further signals. Runs of `action` never overlap: signals
/// that arrive while it runs collapse into one more debounced run.
pub struct Debouncer {
    signal: Arc<Notify>,
    task: JoinHandle<()>,
}

/// Cloneable, non-async handle for signalling a `Debouncer` from listener
/// callbacks.
#[derive(Clone)]
pub struct DebounceTrigger {
    signal: Arc<Notify>,
}

impl DebounceTrigger {
    pub fn signal(&self) {
        self.signal.notify_one();
    }
}

impl Debouncer {
    pub fn spawn<F, Fut>(window: Duration, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let signal = Arc::new(Notify::new());
        let task_signal = signal.clone();

        let task = tokio::spawn(async move {
            loop {
                task_signal.notified().await;

                loop {
                    tokio::select! {
                        _ = task_signal.notified() => {
                            trace!("debounce window restarted");
                        }
                        _ = sleep(window) => break,
                    }
                }

                action().await;
            }
        });

        Self { signal, task }
    }

    pub fn signal(&self) {
        self.signal.notify_one();
    }

    pub fn trigger(&self) -> DebounceTrigger {
        DebounceTrigger {
            signal: self.signal.clone(),
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
