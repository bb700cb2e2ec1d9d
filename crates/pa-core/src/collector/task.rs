//! Capture task handle shared by the collector implementations.

use std::future::Future;

use tokio::task::JoinHandle;

use super::{CollectorError, CollectorKind};

/// Owns at most one running capture loop.
#[derive(Debug, Default)]
pub(super) struct CaptureTask {
    handle: Option<JoinHandle<()>>,
}

impl CaptureTask {
    /// A loop that ended on its own (e.g. panicked) counts as stopped.
    pub(super) fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawns the loop unless one is already running.
    pub(super) fn spawn<F>(&mut self, capture: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_running() {
            return;
        }
        self.handle = Some(tokio::spawn(capture));
    }

    /// Aborts the loop and waits for it to unwind.
    ///
    /// Once this returns the loop cannot run again, so no callback fires afterwards.
    pub(super) async fn stop(&mut self, kind: CollectorKind) -> Result<(), CollectorError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        handle.abort();
        match handle.await {
            Ok(()) => Ok(()),
            Err(err) if err.is_cancelled() => Ok(()),
            Err(source) => Err(CollectorError::Task { kind, source }),
        }
    }
}
