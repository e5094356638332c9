//! Result handles for work submitted through `submit_with_result`.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use crate::core::ExecutorError;

/// Receives the value produced by one submitted closure.
///
/// If the work is discarded by the rejection policy, or fails before producing
/// a value, waiting yields [`ExecutorError::ResultLost`].
#[derive(Debug)]
pub struct TaskHandle<R> {
    rx: Receiver<R>,
}

impl<R> TaskHandle<R>
where
    R: Send + 'static,
{
    pub(crate) const fn new(rx: Receiver<R>) -> Self {
        Self { rx }
    }

    /// Block until the result is available or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// - `ExecutorError::Timeout` if no result arrived in time
    /// - `ExecutorError::ResultLost` if the work will never produce one
    pub fn wait(self, timeout: Duration) -> Result<R, ExecutorError> {
        match self.rx.recv_timeout(timeout) {
            Ok(value) => Ok(value),
            Err(RecvTimeoutError::Timeout) => Err(ExecutorError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(ExecutorError::ResultLost),
        }
    }

    /// Take the result if it is already available.
    ///
    /// # Errors
    ///
    /// `ExecutorError::ResultLost` if the work will never produce a result.
    pub fn try_take(&self) -> Result<Option<R>, ExecutorError> {
        match self.rx.try_recv() {
            Ok(value) => Ok(Some(value)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(ExecutorError::ResultLost),
        }
    }

    /// Await the result from async code.
    ///
    /// The blocking receive runs on tokio's blocking pool so the calling runtime
    /// is never stalled.
    ///
    /// # Errors
    ///
    /// Same as [`wait`](Self::wait).
    #[cfg(feature = "tokio-runtime")]
    pub async fn wait_async(self, timeout: Duration) -> Result<R, ExecutorError> {
        let rx = self.rx;
        let waited = tokio::time::timeout(timeout, tokio::task::spawn_blocking(move || rx.recv())).await;

        match waited {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(_)) | Err(_)) => Err(ExecutorError::ResultLost),
            Err(_) => Err(ExecutorError::Timeout),
        }
    }
}
