//! Run command: the long-running tracker host.
//!
//! Records `AppStart`, registers the enabled collectors, and feeds OS signals
//! to the power-state coordinator until quit. Collected data flows through an
//! unbounded channel to a single consumer task, so collector callbacks never
//! block on the database.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use fs2::FileExt;
use pa_core::{
    Callback, Clock, CollectedData, CollectorRegistry, PowerSignal, PowerStateCoordinator,
    SelfReportFlow, SelfReportPrompt, SessionReconstructor, SharedStore, StandardFactory,
    SystemClock, TrackersConfig, UsageEventLog, shared,
};
use pa_db::Database;
use serde_json::json;
use tokio::sync::mpsc;

use super::util::describe_session;
use crate::Config;

pub async fn run(config: &Config, db: Database) -> Result<()> {
    let _lock = acquire_instance_lock(&config.lock_path())?;
    let signals = OsSignals::install().context("failed to install signal handlers")?;

    let store = shared(db);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let event_log = UsageEventLog::new(Arc::clone(&store), Arc::clone(&clock));
    let reconstructor = SessionReconstructor::new(Arc::clone(&store));
    let flow = SelfReportFlow::new(event_log.clone(), reconstructor.clone());

    let (data_tx, data_rx) = mpsc::unbounded_channel();
    let registry = build_registry(&config.trackers, Arc::clone(&clock), data_tx);
    let consumer = tokio::spawn(consume_collected(data_rx, flow, Arc::clone(&store)));

    let mut coordinator = PowerStateCoordinator::new(registry, event_log, reconstructor);
    coordinator
        .start(app_start_payload(clock.now()))
        .await
        .context("failed to record app start")?;
    println!(
        "Tracking started ({}). Press Ctrl-C to quit.",
        coordinator.registry().running_names().join(", ")
    );

    let (signal_tx, signal_rx) = mpsc::channel(8);
    let forwarder = tokio::spawn(signals.forward(signal_tx));
    let session = coordinator.run(signal_rx).await;
    forwarder.abort();

    // Dropping the collectors drops the last senders, which ends the consumer.
    drop(coordinator);
    if let Err(err) = consumer.await {
        tracing::warn!(error = %err, "collected data consumer failed");
    }

    match session {
        Some(session) => println!("Final session: {}", describe_session(&session)),
        None => println!("No final session recorded."),
    }
    Ok(())
}

/// Holds an exclusive lock for as long as the returned file lives.
fn acquire_instance_lock(path: &Path) -> Result<File> {
    let file = File::create(path).context("failed to create lock file")?;
    file.try_lock_exclusive()
        .with_context(|| format!("another `pa run` is already using {}", path.display()))?;
    Ok(file)
}

fn build_registry(
    trackers: &TrackersConfig,
    clock: Arc<dyn Clock>,
    data_tx: mpsc::UnboundedSender<CollectedData>,
) -> CollectorRegistry {
    let callback: Callback = Arc::new(move |data: CollectedData| {
        // Only fails once the consumer is gone, i.e. during shutdown.
        let _ = data_tx.send(data);
    });
    let mut registry = CollectorRegistry::new(trackers.clone(), Box::new(tracker_factory(clock)));
    for kind in trackers.enabled_kinds() {
        if let Err(err) = registry.register(kind, Arc::clone(&callback)) {
            tracing::warn!(%kind, error = %err, "collector not registered");
        }
    }
    registry
}

/// The collector factory `pa run` uses. No native probes are installed on this host.
pub(crate) fn tracker_factory(clock: Arc<dyn Clock>) -> StandardFactory {
    StandardFactory::new(clock)
}

fn app_start_payload(now: DateTime<Utc>) -> serde_json::Value {
    let time_zone = iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string());
    let host = hostname::get()
        .ok()
        .map(|name| name.to_string_lossy().into_owned());
    json!({
        "app_version": env!("CARGO_PKG_VERSION"),
        "time_zone": time_zone,
        "utc": now,
        "host": host,
    })
}

async fn consume_collected(
    mut data_rx: mpsc::UnboundedReceiver<CollectedData>,
    flow: SelfReportFlow,
    store: SharedStore,
) {
    while let Some(data) = data_rx.recv().await {
        match data {
            CollectedData::Prompt(prompt) => match flow.prompt(&prompt).await {
                Ok(_) => println!("{}", format_prompt(&prompt)),
                Err(err) => tracing::error!(error = %err, "failed to record self-report prompt"),
            },
            CollectedData::ParticipationDay(day) => record_participation(&store, day).await,
            CollectedData::Sample {
                kind, captured_at, ..
            } => tracing::trace!(%kind, %captured_at, "sample received"),
        }
    }
}

async fn record_participation(store: &SharedStore, day: NaiveDate) {
    let result = {
        let mut store = store.lock().await;
        store
            .record_participation_day(day)
            .and_then(|added| store.participation_day_count().map(|count| (added, count)))
    };
    match result {
        Ok((true, count)) => tracing::info!(%day, days = count, "participation day recorded"),
        Ok((false, _)) => tracing::debug!(%day, "participation day already recorded"),
        Err(err) => tracing::error!(%day, error = %err, "failed to record participation day"),
    }
}

fn format_prompt(prompt: &SelfReportPrompt) -> String {
    let mut text = format!(
        "Self-report ({}): {}",
        prompt.prompted_at.format("%H:%M:%S UTC"),
        prompt.question
    );
    if let (Some(low), Some(high)) = (
        prompt.response_options.first(),
        prompt.response_options.last(),
    ) {
        text.push_str(&format!("\n  1 = {low}, {} = {high}", prompt.scale));
    }
    text.push_str(&format!(
        "\n  Reply with: pa answer <1-{}> | pa answer --skip",
        prompt.scale
    ));
    text
}

/// OS signals the host listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostSignal {
    Interrupt,
    Terminate,
    User1,
    User2,
}

/// Suspend and resume have no host signal; they come from platform hooks.
const fn power_signals(signal: HostSignal) -> &'static [PowerSignal] {
    match signal {
        HostSignal::Interrupt => &[PowerSignal::Quit],
        HostSignal::Terminate => &[PowerSignal::Shutdown, PowerSignal::Quit],
        HostSignal::User1 => &[PowerSignal::LockScreen],
        HostSignal::User2 => &[PowerSignal::UnlockScreen],
    }
}

#[cfg(unix)]
struct OsSignals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    user1: tokio::signal::unix::Signal,
    user2: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl OsSignals {
    fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            user1: signal(SignalKind::user_defined1())?,
            user2: signal(SignalKind::user_defined2())?,
        })
    }

    async fn forward(mut self, signal_tx: mpsc::Sender<PowerSignal>) {
        loop {
            let received = tokio::select! {
                _ = self.interrupt.recv() => HostSignal::Interrupt,
                _ = self.terminate.recv() => HostSignal::Terminate,
                _ = self.user1.recv() => HostSignal::User1,
                _ = self.user2.recv() => HostSignal::User2,
            };
            tracing::debug!(?received, "host signal received");
            for signal in power_signals(received) {
                if signal_tx.send(*signal).await.is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(not(unix))]
struct OsSignals;

#[cfg(not(unix))]
impl OsSignals {
    const fn install() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn forward(self, signal_tx: mpsc::Sender<PowerSignal>) {
        if tokio::signal::ctrl_c().await.is_ok() {
            for signal in power_signals(HostSignal::Interrupt) {
                let _ = signal_tx.send(*signal).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use insta::assert_snapshot;

    #[test]
    fn terminate_records_shutdown_before_quit() {
        assert_eq!(
            power_signals(HostSignal::Terminate),
            &[PowerSignal::Shutdown, PowerSignal::Quit]
        );
        assert_eq!(power_signals(HostSignal::Interrupt), &[PowerSignal::Quit]);
        assert_eq!(power_signals(HostSignal::User1), &[PowerSignal::LockScreen]);
        assert_eq!(power_signals(HostSignal::User2), &[PowerSignal::UnlockScreen]);
    }

    #[test]
    fn prompt_text_lists_scale_labels() {
        let prompt = SelfReportPrompt {
            prompted_at: Utc.with_ymd_and_hms(2025, 3, 4, 9, 0, 0).unwrap(),
            question: "How well did you spend your time in the previous session?".to_string(),
            scale: 7,
            response_options: vec![
                "not well".to_string(),
                "moderately well".to_string(),
                "very well".to_string(),
            ],
        };
        assert_snapshot!(format_prompt(&prompt), @r"
        Self-report (09:00:00 UTC): How well did you spend your time in the previous session?
          1 = not well, 7 = very well
          Reply with: pa answer <1-7> | pa answer --skip
        ");
    }

    #[test]
    fn app_start_payload_describes_host() {
        let now = Utc.with_ymd_and_hms(2025, 3, 4, 9, 0, 0).unwrap();
        let payload = app_start_payload(now);
        assert_eq!(payload["app_version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(payload["utc"], "2025-03-04T09:00:00Z");
        assert!(payload["time_zone"].is_string());
    }

    #[test]
    fn instance_lock_is_exclusive() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("pa.lock");
        let held = acquire_instance_lock(&path).unwrap();
        let err = acquire_instance_lock(&path).unwrap_err();
        assert!(err.to_string().starts_with("another `pa run` is already using"));
        drop(held);
        assert!(acquire_instance_lock(&path).is_ok());
    }

    #[tokio::test]
    async fn participation_days_are_counted_once() {
        let store = shared(Database::open_in_memory().unwrap());
        let day = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        record_participation(&store, day).await;
        record_participation(&store, day).await;
        assert_eq!(store.lock().await.participation_day_count().unwrap(), 1);
    }
}
