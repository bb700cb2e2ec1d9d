//! Power and session state handling.
//!
//! OS notifications arrive as [`PowerSignal`] messages. The coordinator
//! handles them one at a time: it drives the registry, writes the matching
//! lifecycle event concurrently with the registry action, and on quit closes
//! the final session.

use std::fmt;

use tokio::sync::mpsc;

use crate::collector::{BatchReport, CollectorRegistry};
use crate::event_log::UsageEventLog;
use crate::event_type::UsageEventType;
use crate::session::{Session, SessionReconstructor};
use crate::store::StoreError;

/// An OS power or session-state notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerSignal {
    Suspend,
    Resume,
    LockScreen,
    UnlockScreen,
    Shutdown,
    Quit,
}

/// What the registry does for a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegistryAction {
    StopAll,
    ResumeAll,
}

impl PowerSignal {
    /// The lifecycle event logged for this signal.
    pub const fn event_type(self) -> UsageEventType {
        match self {
            Self::Suspend => UsageEventType::SystemSuspend,
            Self::Resume => UsageEventType::SystemResume,
            Self::LockScreen => UsageEventType::SystemLockScreen,
            Self::UnlockScreen => UsageEventType::SystemUnlockScreen,
            Self::Shutdown => UsageEventType::SystemShutdown,
            Self::Quit => UsageEventType::AppQuit,
        }
    }

    const fn action(self) -> RegistryAction {
        match self {
            Self::Resume | Self::UnlockScreen => RegistryAction::ResumeAll,
            Self::Suspend | Self::LockScreen | Self::Shutdown | Self::Quit => {
                RegistryAction::StopAll
            }
        }
    }
}

impl fmt::Display for PowerSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Suspend => "suspend",
            Self::Resume => "resume",
            Self::LockScreen => "lock-screen",
            Self::UnlockScreen => "unlock-screen",
            Self::Shutdown => "shutdown",
            Self::Quit => "quit",
        };
        f.write_str(name)
    }
}

/// Result of handling one signal.
#[derive(Debug)]
pub enum SignalOutcome {
    /// The registry action ran and the lifecycle event was written (or its
    /// failure logged).
    Handled {
        signal: PowerSignal,
        report: BatchReport,
    },
    /// The coordinator is quitting; the signal was dropped.
    IgnoredAfterQuit { signal: PowerSignal },
    /// Collectors are stopped. `session` is the final session, if one could be built.
    Quit {
        report: BatchReport,
        session: Option<Session>,
    },
}

/// Drives collectors and the event log from power signals.
pub struct PowerStateCoordinator {
    registry: CollectorRegistry,
    event_log: UsageEventLog,
    reconstructor: SessionReconstructor,
    quitting: bool,
}

impl PowerStateCoordinator {
    pub fn new(
        registry: CollectorRegistry,
        event_log: UsageEventLog,
        reconstructor: SessionReconstructor,
    ) -> Self {
        Self {
            registry,
            event_log,
            reconstructor,
            quitting: false,
        }
    }

    pub const fn registry(&self) -> &CollectorRegistry {
        &self.registry
    }

    pub const fn is_quitting(&self) -> bool {
        self.quitting
    }

    /// Records `AppStart` with `payload`, then starts every registered collector.
    ///
    /// A failed `AppStart` write is returned before any collector starts.
    pub async fn start(&mut self, payload: serde_json::Value) -> Result<BatchReport, StoreError> {
        self.event_log
            .record_with_payload(UsageEventType::AppStart, payload)
            .await?;
        let report = self.registry.start_all().await;
        tracing::info!(
            running = ?self.registry.running_names(),
            failed = report.failed.len(),
            "trackers started"
        );
        Ok(report)
    }

    /// Handles one signal. Returns once the registry action has settled.
    pub async fn handle(&mut self, signal: PowerSignal) -> SignalOutcome {
        tracing::debug!(%signal, "power signal received");
        if self.quitting {
            tracing::debug!(%signal, "already quitting, signal ignored");
            return SignalOutcome::IgnoredAfterQuit { signal };
        }
        if signal == PowerSignal::Quit {
            return self.quit().await;
        }

        let registry = &mut self.registry;
        let action = async move {
            match signal.action() {
                RegistryAction::StopAll => registry.stop_all().await,
                RegistryAction::ResumeAll => registry.resume_all().await,
            }
        };
        // A failed write is logged by the event log; collectors still transition.
        let (report, _logged) = tokio::join!(action, self.event_log.record(signal.event_type()));
        tracing::info!(
            %signal,
            running = ?self.registry.running_names(),
            "power state handled"
        );
        SignalOutcome::Handled { signal, report }
    }

    /// Stops every collector and closes the final session. Runs at most once.
    async fn quit(&mut self) -> SignalOutcome {
        self.quitting = true;
        let now = self.event_log.clock().now();
        tracing::info!(running = ?self.registry.running_names(), "quitting, stopping trackers");

        let (report, _logged) = tokio::join!(
            self.registry.stop_all(),
            self.event_log.record_at(UsageEventType::AppQuit, now)
        );
        let session = self
            .reconstructor
            .reconstruct(UsageEventType::AppQuit, now)
            .await
            .ok();
        tracing::info!(
            still_running = self.registry.running_names().len(),
            "trackers stopped"
        );
        SignalOutcome::Quit { report, session }
    }

    /// Consumes signals until quit. A closed channel counts as quit.
    pub async fn run(&mut self, mut signals: mpsc::Receiver<PowerSignal>) -> Option<Session> {
        loop {
            let signal = if let Some(signal) = signals.recv().await {
                signal
            } else {
                tracing::debug!("signal channel closed");
                PowerSignal::Quit
            };
            if let SignalOutcome::Quit { session, .. } = self.handle(signal).await {
                return session;
            }
        }
    }
}
