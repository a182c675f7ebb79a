pub mod report;

pub use report::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::diagnostics::DiagnosticReport;
use crate::error::ScannerError;
use crate::types::{Signal, TradeEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warn,
    Error,
}

/// Structured records pushed to outbound channels. Formatting into chat
/// messages, emails or report rows happens in sink implementations, never
/// here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OutboundEvent {
    SignalEmitted { signal: Box<Signal> },
    Trade(TradeEvent),
    Diagnostics(Box<DiagnosticReport>),
    OperationalAlert { level: AlertLevel, text: String },
}

impl OutboundEvent {
    /// Diagnostics may be shed under pressure; signals and trade events
    /// never are.
    pub fn droppable(&self) -> bool {
        matches!(
            self,
            OutboundEvent::Diagnostics(_)
                | OutboundEvent::OperationalAlert { level: AlertLevel::Info, .. }
        )
    }
}

/// Outbound transport contract. Implementations live with the deployment
/// wrapper (terminal chat, email, report writers); the crate ships the
/// structured log and event-file sinks.
#[async_trait]
pub trait Sink: Send + Sync {
    fn name(&self) -> &'static str;
    async fn accept(&self, event: &OutboundEvent) -> anyhow::Result<()>;
}

/// Producer handle to the dispatch channel.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<OutboundEvent>,
}

impl Dispatcher {
    pub fn channel(capacity: usize, sinks: Vec<Box<dyn Sink>>) -> (Self, DispatchWorker) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, DispatchWorker { rx, sinks })
    }

    /// Push an event. Droppable events are shed when the channel is
    /// saturated; everything else applies backpressure.
    pub async fn send(&self, event: OutboundEvent) -> Result<(), ScannerError> {
        if event.droppable() {
            match self.tx.try_send(event) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(event)) => {
                    warn!("dispatch channel full; shedding {:?}", discriminant_name(&event));
                    Ok(())
                }
                Err(mpsc::error::TrySendError::Closed(_)) => Err(ScannerError::DispatchClosed),
            }
        } else {
            self.tx
                .send(event)
                .await
                .map_err(|_| ScannerError::DispatchClosed)
        }
    }
}

fn discriminant_name(event: &OutboundEvent) -> &'static str {
    match event {
        OutboundEvent::SignalEmitted { .. } => "signal",
        OutboundEvent::Trade(_) => "trade_event",
        OutboundEvent::Diagnostics(_) => "diagnostics",
        OutboundEvent::OperationalAlert { .. } => "alert",
    }
}

/// Single consumer draining the channel into every sink, with bounded
/// retry per sink before the event is dropped with an alert.
pub struct DispatchWorker {
    rx: mpsc::Receiver<OutboundEvent>,
    sinks: Vec<Box<dyn Sink>>,
}

impl DispatchWorker {
    const MAX_ATTEMPTS: u32 = 3;

    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                maybe = self.rx.recv() => {
                    match maybe {
                        Some(event) => self.deliver(&event).await,
                        None => break,
                    }
                }
                _ = cancel.cancelled() => {
                    // Drain whatever is already queued, then stop.
                    while let Ok(event) = self.rx.try_recv() {
                        self.deliver(&event).await;
                    }
                    break;
                }
            }
        }
        info!("dispatch worker stopped");
    }

    async fn deliver(&self, event: &OutboundEvent) {
        for sink in &self.sinks {
            let mut delay = std::time::Duration::from_millis(100);
            for attempt in 1..=Self::MAX_ATTEMPTS {
                match sink.accept(event).await {
                    Ok(()) => break,
                    Err(err) if attempt < Self::MAX_ATTEMPTS => {
                        warn!("sink {} failed (attempt {attempt}): {err:#}", sink.name());
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                    Err(err) => {
                        error!(
                            "sink {} dropped {} after {} attempts: {err:#}",
                            sink.name(),
                            discriminant_name(event),
                            Self::MAX_ATTEMPTS
                        );
                    }
                }
            }
        }
    }
}

/// Sink that narrates events into the process log.
pub struct LogSink;

#[async_trait]
impl Sink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn accept(&self, event: &OutboundEvent) -> anyhow::Result<()> {
        match event {
            OutboundEvent::SignalEmitted { signal } => {
                info!(
                    "SIGNAL {} {} {} @ {} sl {} tp {} rr {:.2} conf {} [{}]",
                    signal.symbol,
                    signal.timeframe,
                    signal.direction,
                    signal.entry_price,
                    signal.stop_loss,
                    signal.take_profit,
                    signal.risk_reward,
                    signal.confidence,
                    signal.strategy,
                );
            }
            OutboundEvent::Trade(trade) => {
                info!(
                    "TRADE {:?} {} @ {} pnl {:.2}% ({})",
                    trade.kind, trade.trade_id, trade.price, trade.pnl_pct, trade.note
                );
            }
            OutboundEvent::Diagnostics(report) => {
                info!(
                    "DIAGNOSTICS runtime {}s, last signal {:?}, {} recommendation(s)",
                    report.runtime_s,
                    report.last_signal_at,
                    report.recommendations.len()
                );
            }
            OutboundEvent::OperationalAlert { level, text } => match level {
                AlertLevel::Info => info!("ALERT {text}"),
                AlertLevel::Warn => warn!("ALERT {text}"),
                AlertLevel::Error => error!("ALERT {text}"),
            },
        }
        Ok(())
    }
}

/// Append-only, line-oriented JSON event stream. Consumed by external
/// tooling only.
pub struct EventLogSink {
    file: Mutex<File>,
}

impl EventLogSink {
    pub fn create(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl Sink for EventLogSink {
    fn name(&self) -> &'static str {
        "event_log"
    }

    async fn accept(&self, event: &OutboundEvent) -> anyhow::Result<()> {
        let line = serde_json::to_string(event)?;
        let mut file = self.file.lock().expect("event log lock poisoned");
        writeln!(file, "{line}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_support::sample_signal;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSink {
        seen: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Sink for CountingSink {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn accept(&self, _event: &OutboundEvent) -> anyhow::Result<()> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FlakySink {
        failures_left: AtomicUsize,
        delivered: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Sink for FlakySink {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn accept(&self, _event: &OutboundEvent) -> anyhow::Result<()> {
            if self.failures_left.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
                anyhow::bail!("transient failure");
            }
            self.delivered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_events_reach_sinks() {
        let seen = Arc::new(AtomicUsize::new(0));
        let (dispatcher, worker) =
            Dispatcher::channel(16, vec![Box::new(CountingSink { seen: seen.clone() })]);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(worker.run(cancel.clone()));

        dispatcher
            .send(OutboundEvent::SignalEmitted { signal: Box::new(sample_signal()) })
            .await
            .unwrap();
        dispatcher
            .send(OutboundEvent::OperationalAlert {
                level: AlertLevel::Warn,
                text: "test".into(),
            })
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_flaky_sink_retried() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let sink = FlakySink {
            failures_left: AtomicUsize::new(2),
            delivered: delivered.clone(),
        };
        let (dispatcher, worker) = Dispatcher::channel(16, vec![Box::new(sink)]);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(worker.run(cancel.clone()));

        dispatcher
            .send(OutboundEvent::Trade(crate::types::TradeEvent {
                trade_id: uuid::Uuid::new_v4(),
                kind: crate::types::TradeEventKind::Breakeven,
                price: rust_decimal_macros::dec!(100.5),
                pnl_pct: rust_decimal_macros::dec!(0.5),
                note: "test".into(),
            }))
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(600)).await;
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_saturated_channel_sheds_diagnostics_keeps_signals() {
        // No worker draining: the channel stays full.
        let (dispatcher, _worker) = Dispatcher::channel(1, vec![]);
        dispatcher
            .send(OutboundEvent::OperationalAlert {
                level: AlertLevel::Info,
                text: "fills the slot".into(),
            })
            .await
            .unwrap();
        // Droppable event against a full channel: shed without error.
        dispatcher
            .send(OutboundEvent::Diagnostics(Box::new(
                crate::diagnostics::DiagnosticRecorder::new(chrono::Utc::now())
                    .report(chrono::Utc::now()),
            )))
            .await
            .unwrap();
    }

    #[test]
    fn test_event_log_lines_are_json() {
        let dir = std::env::temp_dir().join(format!("event_log_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("events.jsonl");
        let _ = std::fs::remove_file(&path);

        let sink = EventLogSink::create(&path).unwrap();
        tokio_test::block_on(sink.accept(&OutboundEvent::SignalEmitted {
            signal: Box::new(sample_signal()),
        }))
        .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(parsed["event"], "signal_emitted");
        let _ = std::fs::remove_file(&path);
    }
}
