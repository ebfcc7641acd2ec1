// src/engine/debounce.rs

//! Trailing-edge debouncer for async actions.
//!
//! Semantics:
//! - Every trigger (re)starts a quiet window; the action runs once the window
//!   elapses with no further trigger.
//! - All triggers of one window share a single execution; callers that used
//!   [`DebounceHandle::call`] all receive its output.
//! - The action never overlaps itself. Triggers arriving while it runs are
//!   buffered and open the next window once it completes, so a burst during
//!   an execution causes at most one more execution.

use std::future::Future;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::debug;

type Waiter<T> = Option<oneshot::Sender<T>>;

/// Clonable entry point into a [`Debouncer`].
#[derive(Debug)]
pub struct DebounceHandle<T> {
    tx: mpsc::UnboundedSender<Waiter<T>>,
}

impl<T> Clone for DebounceHandle<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> DebounceHandle<T> {
    /// Request an execution without waiting for it.
    ///
    /// Returns `false` if the debouncer has been shut down.
    pub fn trigger(&self) -> bool {
        self.tx.send(None).is_ok()
    }

    /// Request an execution and wait for the output of the execution that
    /// covers this request. `None` if the debouncer shut down first.
    pub async fn call(&self) -> Option<T> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(Some(tx)).ok()?;
        rx.await.ok()
    }
}

/// Owns the actor task running the debounced action.
///
/// Dropping the debouncer aborts the actor, including an in-flight action.
#[derive(Debug)]
pub struct Debouncer<T> {
    handle: DebounceHandle<T>,
    task: JoinHandle<()>,
}

impl<T: Clone + Send + 'static> Debouncer<T> {
    pub fn spawn<F, Fut>(window: Duration, mut action: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Waiter<T>>();

        let task = tokio::spawn(async move {
            while let Some(first) = rx.recv().await {
                let mut waiters: Vec<oneshot::Sender<T>> = first.into_iter().collect();
                let mut coalesced = 1usize;
                let mut closed = false;

                // Keep extending the window while triggers keep arriving.
                loop {
                    match timeout(window, rx.recv()).await {
                        Ok(Some(next)) => {
                            coalesced += 1;
                            waiters.extend(next);
                        }
                        Ok(None) => {
                            closed = true;
                            break;
                        }
                        Err(_elapsed) => break,
                    }
                }

                debug!(coalesced, "debounce window closed; executing");
                let output = action().await;

                for waiter in waiters {
                    let _ = waiter.send(output.clone());
                }

                if closed {
                    break;
                }
            }
            debug!("debouncer finished");
        });

        Self {
            handle: DebounceHandle { tx },
            task,
        }
    }
}

impl<T> Debouncer<T> {
    pub fn handle(&self) -> DebounceHandle<T> {
        self.handle.clone()
    }

    pub fn trigger(&self) -> bool {
        self.handle.trigger()
    }

    pub async fn call(&self) -> Option<T> {
        self.handle.call().await
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}
