//! A failure streak is reported once, stays quiet while it lasts, and its end
//! is reported once.

#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use trueno_pulse::prelude::*;

// ============================================================================
// Log capture
// ============================================================================

#[derive(Debug, Clone)]
struct Record {
    level: Level,
    message: String,
    sink: Option<String>,
    reader: Option<String>,
}

#[derive(Default)]
struct Fields {
    message: String,
    sink: Option<String>,
    reader: Option<String>,
}

impl Visit for Fields {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{value:?}"),
            "sink" => self.sink = Some(format!("{value:?}")),
            "reader" => self.reader = Some(format!("{value:?}")),
            _ => {}
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "sink" => self.sink = Some(value.to_string()),
            "reader" => self.reader = Some(value.to_string()),
            _ => {}
        }
    }
}

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<Record>>>);

impl Captured {
    fn for_sink(&self, name: &str, level: Level) -> Vec<Record> {
        let records = self.0.lock().unwrap();
        records.iter().filter(|r| r.level == level && r.sink.as_deref() == Some(name)).cloned().collect()
    }

    fn for_reader(&self, level: Level) -> Vec<Record> {
        let records = self.0.lock().unwrap();
        records.iter().filter(|r| r.level == level && r.reader.as_deref() == Some("stumbling")).cloned().collect()
    }
}

impl<S: Subscriber> Layer<S> for Captured {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = Fields::default();
        event.record(&mut fields);
        self.0.lock().unwrap().push(Record {
            level: *event.metadata().level(),
            message: fields.message,
            sink: fields.sink,
            reader: fields.reader,
        });
    }
}

// ============================================================================
// Fakes
// ============================================================================

/// Reader that fails its first `fail_first` samples.
struct StumblingReader {
    calls: usize,
    fail_first: usize,
}

#[async_trait]
impl ResourceReader for StumblingReader {
    fn id(&self) -> &'static str {
        "stumbling"
    }

    async fn initialize(&mut self) -> Result<(), ReaderError> {
        Ok(())
    }

    async fn sample(&mut self) -> Result<Sample, ReaderError> {
        self.calls += 1;
        if self.calls <= self.fail_first {
            return Err(ReaderError::Collection { reader: "stumbling", message: "counters busy".to_string() });
        }
        Ok(Sample::now(1.0, Usage::new(1, 2), Usage::new(1, 2)))
    }
}

/// Sink that rejects its first `fail_first` samples.
struct FlakySink {
    attempts: Arc<AtomicUsize>,
    fail_first: usize,
}

#[async_trait]
impl Sink for FlakySink {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn initialize(&self, _params: &SinkParams) -> Result<(), SinkError> {
        Ok(())
    }

    async fn on_sample(&self, _sample: &Sample) -> Result<(), SinkError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.fail_first {
            return Err(SinkError::write("flaky", "endpoint unreachable"));
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<Option<String>, SinkError> {
        Ok(None)
    }
}

fn scheduler(reader_failures: usize, sink_failures: usize) -> (Scheduler, Arc<AtomicUsize>) {
    let attempts = Arc::new(AtomicUsize::new(0));
    let shared = Arc::clone(&attempts);

    let mut registry = SinkRegistry::new();
    registry.register("flaky", move || {
        Arc::new(FlakySink { attempts: Arc::clone(&shared), fail_first: sink_failures }) as SharedSink
    });

    let mut config = Config {
        interval_seconds: 1,
        retry_delay_seconds: 1,
        enable_console_output: false,
        ..Config::default()
    };
    config.sinks.insert("flaky".to_string(), SinkConfig::enabled(serde_json::Map::new()));

    let scheduler = Scheduler::with_reader_factory(config, registry, move || {
        Box::new(StumblingReader { calls: 0, fail_first: reader_failures }) as BoxedReader
    });
    (scheduler, attempts)
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test(start_paused = true)]
async fn failing_sink_warns_once_then_reports_recovery() {
    let captured = Captured::default();
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(captured.clone()));

    let (scheduler, attempts) = scheduler(0, 4);
    scheduler.start().await.unwrap();

    // Four failing ticks: one warning, the rest quiet
    tokio::time::sleep(Duration::from_millis(4500)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
    let warnings = captured.for_sink("flaky", Level::WARN);
    assert_eq!(warnings.len(), 1, "got {warnings:?}");
    assert!(warnings[0].message.contains("endpoint unreachable"));
    assert!(captured.for_sink("flaky", Level::INFO).is_empty());

    // Fifth tick succeeds
    tokio::time::sleep(Duration::from_secs(2)).await;
    scheduler.stop().await;

    assert_eq!(captured.for_sink("flaky", Level::WARN).len(), 1, "no new warnings after recovery");
    let recovered: Vec<_> =
        captured.for_sink("flaky", Level::INFO).into_iter().filter(|r| r.message == "sink recovered").collect();
    assert_eq!(recovered.len(), 1);
    assert_eq!(captured.for_sink("flaky", Level::DEBUG).iter().filter(|r| r.message.contains("unreachable")).count(), 3);
}

#[tokio::test(start_paused = true)]
async fn failing_reader_warns_once_then_reports_recovery() {
    let captured = Captured::default();
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(captured.clone()));

    let (scheduler, attempts) = scheduler(3, 0);
    scheduler.start().await.unwrap();

    tokio::time::sleep(Duration::from_millis(4500)).await;
    scheduler.stop().await;

    let warnings = captured.for_reader(Level::WARN);
    assert_eq!(warnings.len(), 1, "got {warnings:?}");
    assert!(warnings[0].message.contains("counters busy"));

    let recovered: Vec<_> =
        captured.for_reader(Level::INFO).into_iter().filter(|r| r.message == "sampling recovered").collect();
    assert_eq!(recovered.len(), 1);
    assert_eq!(attempts.load(Ordering::SeqCst), 1, "the sink only sees the successful sample");
}
