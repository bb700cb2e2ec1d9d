//! Collector registry: one collector per kind, batch lifecycle operations.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;

use super::{
    Callback, Collector, CollectorKind, IntervalCollector, ParticipationCounter, Probe,
    SelfReportCollector,
};
use crate::config::TrackersConfig;
use crate::event::Clock;

/// Why a kind cannot be registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsupportedReason {
    /// Turned off in configuration.
    Disabled,
    /// No native backend is available on this host.
    NoBackend,
}

impl fmt::Display for UnsupportedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("disabled in configuration"),
            Self::NoBackend => f.write_str("no backend available"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("a {kind} collector is already registered")]
    DuplicateRegistration { kind: CollectorKind },

    #[error("cannot register {kind}: {reason}")]
    UnsupportedKind {
        kind: CollectorKind,
        reason: UnsupportedReason,
    },
}

/// Outcome of one batch operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: Vec<CollectorKind>,
    pub failed: Vec<(CollectorKind, String)>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Builds the collector for a kind. `None` means no backend exists for it.
pub trait CollectorFactory: Send {
    fn create(
        &self,
        kind: CollectorKind,
        config: &TrackersConfig,
        callback: Callback,
    ) -> Option<Box<dyn Collector>>;
}

/// The production factory. Window and input collectors need a probe installed
/// with [`StandardFactory::with_probe`].
pub struct StandardFactory {
    clock: Arc<dyn Clock>,
    probes: HashMap<CollectorKind, Arc<dyn Probe>>,
}

impl StandardFactory {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            probes: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_probe(mut self, kind: CollectorKind, probe: Arc<dyn Probe>) -> Self {
        self.probes.insert(kind, probe);
        self
    }

    /// Whether [`CollectorFactory::create`] can build a collector of `kind`.
    pub fn supports(&self, kind: CollectorKind) -> bool {
        match kind {
            CollectorKind::WindowActivity | CollectorKind::UserInput => {
                self.probes.contains_key(&kind)
            }
            CollectorKind::SelfReport | CollectorKind::ParticipationCounter => true,
        }
    }
}

impl CollectorFactory for StandardFactory {
    fn create(
        &self,
        kind: CollectorKind,
        config: &TrackersConfig,
        callback: Callback,
    ) -> Option<Box<dyn Collector>> {
        let clock = Arc::clone(&self.clock);
        let interval = config.interval(kind);
        match kind {
            CollectorKind::WindowActivity => {
                let probe = Arc::clone(self.probes.get(&kind)?);
                let window = &config.window_activity;
                let mut redacted = Vec::new();
                if !window.track_window_titles {
                    redacted.push("title");
                }
                if !window.track_urls {
                    redacted.push("url");
                }
                Some(Box::new(
                    IntervalCollector::new(kind, interval, probe, callback, clock)
                        .with_redacted_keys(&redacted),
                ))
            }
            CollectorKind::UserInput => {
                let probe = Arc::clone(self.probes.get(&kind)?);
                Some(Box::new(IntervalCollector::new(
                    kind, interval, probe, callback, clock,
                )))
            }
            CollectorKind::SelfReport => Some(Box::new(SelfReportCollector::new(
                config.self_report.clone(),
                callback,
                clock,
            ))),
            CollectorKind::ParticipationCounter => Some(Box::new(ParticipationCounter::new(
                interval, callback, clock,
            ))),
        }
    }
}

#[derive(Clone, Copy)]
enum BatchOp {
    Start,
    Stop,
    Resume,
}

impl BatchOp {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Resume => "resume",
        }
    }

    /// Stop targets running collectors, start and resume target stopped ones.
    const fn targets(self, running: bool) -> bool {
        match self {
            Self::Stop => running,
            Self::Start | Self::Resume => !running,
        }
    }
}

/// Owns the configured collectors, at most one per kind.
pub struct CollectorRegistry {
    config: TrackersConfig,
    factory: Box<dyn CollectorFactory>,
    collectors: Vec<Box<dyn Collector>>,
}

impl CollectorRegistry {
    pub fn new(config: TrackersConfig, factory: Box<dyn CollectorFactory>) -> Self {
        Self {
            config,
            factory,
            collectors: Vec::new(),
        }
    }

    /// Builds and stores the collector for `kind`, bound to `callback`.
    pub fn register(&mut self, kind: CollectorKind, callback: Callback) -> Result<(), RegistryError> {
        if self.collectors.iter().any(|c| c.kind() == kind) {
            return Err(RegistryError::DuplicateRegistration { kind });
        }
        if !self.config.is_enabled(kind) {
            return Err(RegistryError::UnsupportedKind {
                kind,
                reason: UnsupportedReason::Disabled,
            });
        }
        let collector = self.factory.create(kind, &self.config, callback).ok_or(
            RegistryError::UnsupportedKind {
                kind,
                reason: UnsupportedReason::NoBackend,
            },
        )?;
        tracing::debug!(%kind, interval = ?collector.interval(), "collector registered");
        self.collectors.push(collector);
        Ok(())
    }

    pub fn registered_kinds(&self) -> Vec<CollectorKind> {
        self.collectors.iter().map(|c| c.kind()).collect()
    }

    pub fn running_names(&self) -> Vec<&'static str> {
        self.collectors
            .iter()
            .filter(|c| c.is_running())
            .map(|c| c.name())
            .collect()
    }

    pub fn any_running(&self) -> bool {
        self.collectors.iter().any(|c| c.is_running())
    }

    /// Starts every stopped collector concurrently.
    pub async fn start_all(&mut self) -> BatchReport {
        self.run_batch(BatchOp::Start).await
    }

    /// Stops every running collector concurrently.
    pub async fn stop_all(&mut self) -> BatchReport {
        self.run_batch(BatchOp::Stop).await
    }

    /// Resumes every stopped collector concurrently.
    pub async fn resume_all(&mut self) -> BatchReport {
        self.run_batch(BatchOp::Resume).await
    }

    async fn run_batch(&mut self, op: BatchOp) -> BatchReport {
        let attempts = self
            .collectors
            .iter_mut()
            .filter(|c| op.targets(c.is_running()))
            .map(|collector| async move {
                let kind = collector.kind();
                let result = match op {
                    BatchOp::Start => collector.start().await,
                    BatchOp::Stop => collector.stop().await,
                    BatchOp::Resume => collector.resume().await,
                };
                (kind, result)
            });

        let mut report = BatchReport::default();
        for (kind, result) in join_all(attempts).await {
            match result {
                Ok(()) => report.succeeded.push(kind),
                Err(err) => {
                    tracing::warn!(%kind, op = op.as_str(), error = %err, "collector operation failed");
                    report.failed.push((kind, err.to_string()));
                }
            }
        }
        tracing::debug!(
            op = op.as_str(),
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "batch settled"
        );
        report
    }
}
