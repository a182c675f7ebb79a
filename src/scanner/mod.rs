use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ResolvedConfig;
use crate::data::DataSource;
use crate::diagnostics::{DataQualityIssue, DiagnosticRecorder, RejectReason};
use crate::dispatch::{AlertLevel, Dispatcher, OutboundEvent, ScanReportWriter};
use crate::error::{ProviderError, ScannerError};
use crate::filter::{FilterVerdict, QualityFilter};
use crate::indicators::{self, EnrichedBuffer};
use crate::regime;
use crate::strategies::{Candidate, Orchestrator, Resolution, StrategyContext, StrategyRegistry};
use crate::types::TimeFrame;

/// Consecutive data failures before the scanner raises an alert and backs
/// off.
const FAILURE_ALERT_THRESHOLD: u32 = 5;
const MAX_BACKOFF_DOUBLINGS: u32 = 3;

/// What one tick produced, for the scan report.
#[derive(Debug)]
enum TickOutcome {
    Signal(String),
    Rejected(RejectReason),
    Conflict,
    NoSignal,
}

impl TickOutcome {
    fn as_report_cell(&self) -> String {
        match self {
            TickOutcome::Signal(strategy) => format!("signal:{strategy}"),
            TickOutcome::Rejected(reason) => format!("reject:{reason}"),
            TickOutcome::Conflict => "reject:conflicting_strategies".to_string(),
            TickOutcome::NoSignal => "none".to_string(),
        }
    }
}

struct TimeframeState {
    timeframe: TimeFrame,
    next_due: Instant,
    consecutive_failures: u32,
    backoff_doublings: u32,
}

/// One scanner: a single (symbol, timeframe-set) driver loop owning its
/// buffers, filter, tracker and diagnostics. Internals run one tick at a
/// time; nothing here needs a lock beyond the shared counters.
pub struct Scanner {
    config: ResolvedConfig,
    source: DataSource,
    registry: StrategyRegistry,
    orchestrator: Orchestrator,
    filter: QualityFilter,
    tracker: crate::tracker::TradeTracker,
    diagnostics: Arc<DiagnosticRecorder>,
    dispatcher: Dispatcher,
    report: Option<ScanReportWriter>,
}

impl Scanner {
    pub fn new(
        config: ResolvedConfig,
        source: DataSource,
        dispatcher: Dispatcher,
        diagnostics: Arc<DiagnosticRecorder>,
        report: Option<ScanReportWriter>,
    ) -> Self {
        let orchestrator = Orchestrator::new(
            config.priority.clone(),
            config.enabled_strategies.clone(),
        );
        let filter = QualityFilter::new(config.filter.clone(), config.overrides.clone());
        Self {
            config,
            source,
            registry: StrategyRegistry::with_all(),
            orchestrator,
            filter,
            tracker: crate::tracker::TradeTracker::new(),
            diagnostics,
            dispatcher,
            report,
        }
    }

    /// Main loop: poll every configured timeframe on its own cadence,
    /// emit a periodic diagnostic summary, finish the in-flight tick on
    /// cancellation and flush.
    pub async fn run(mut self, cancel: CancellationToken) -> anyhow::Result<()> {
        let symbol = self.config.symbol.clone();
        if !symbol.is_recognized() {
            warn!("symbol {symbol} is not in the canonical map; using conservative parameters");
        }
        self.source.connect(&symbol).await?;

        if self.config.bypass.enabled {
            self.filter
                .enable_bypass(Utc::now(), self.config.bypass.auto_disable_after_h);
        }

        let now = Instant::now();
        let mut states: Vec<TimeframeState> = self
            .config
            .timeframes
            .clone()
            .into_iter()
            .map(|timeframe| TimeframeState {
                timeframe,
                next_due: now,
                consecutive_failures: 0,
                backoff_doublings: 0,
            })
            .collect();
        let summary_interval = Duration::from_secs(self.config.summary_interval_s);
        let mut summary_due = now + summary_interval;

        info!(
            "scanner started for {symbol} on {:?}",
            self.config.timeframes
        );

        loop {
            let next_tick = states
                .iter()
                .map(|s| s.next_due)
                .min()
                .unwrap_or_else(Instant::now);
            let wake_at = next_tick.min(summary_due);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep_until(wake_at) => {}
            }

            if Instant::now() >= summary_due {
                self.emit_summary().await;
                summary_due = Instant::now() + summary_interval;
                continue;
            }

            let due_idx = states
                .iter()
                .position(|s| s.next_due <= Instant::now());
            if let Some(idx) = due_idx {
                let timeframe = states[idx].timeframe;
                let ok = self.run_tick(timeframe, Utc::now()).await;
                let state = &mut states[idx];
                if !ok {
                    self.escalate_failures(state).await;
                }
                self.reschedule(state, ok);
            }
        }

        self.shutdown().await;
        Ok(())
    }

    fn reschedule(&self, state: &mut TimeframeState, tick_ok: bool) {
        if tick_ok {
            state.consecutive_failures = 0;
            state.backoff_doublings = 0;
        } else {
            state.consecutive_failures += 1;
        }
        let base = self.config.poll_interval(state.timeframe);
        let factor = 1u32 << state.backoff_doublings;
        state.next_due = Instant::now() + base * factor;
    }

    async fn escalate_failures(&self, state: &mut TimeframeState) {
        if (state.consecutive_failures + 1) % FAILURE_ALERT_THRESHOLD == 0 {
            let text = format!(
                "{} {}: {} consecutive data failures; backing off",
                self.config.symbol,
                state.timeframe,
                FAILURE_ALERT_THRESHOLD,
            );
            error!("{text}");
            let _ = self
                .dispatcher
                .send(OutboundEvent::OperationalAlert {
                    level: AlertLevel::Error,
                    text,
                })
                .await;
            state.backoff_doublings = (state.backoff_doublings + 1).min(MAX_BACKOFF_DOUBLINGS);
        }
    }

    /// One full fetch -> enrich -> evaluate pass for a timeframe. Returns
    /// false when the tick was skipped on a data problem.
    pub(crate) async fn run_tick(&mut self, timeframe: TimeFrame, now: DateTime<Utc>) -> bool {
        let symbol = self.config.symbol.clone();

        let (buffer, is_fresh) = match self
            .source
            .fetch(&symbol, timeframe, self.config.candle_history, now)
            .await
        {
            Ok(result) => result,
            Err(err) => {
                let issue = match &err {
                    ScannerError::Provider(ProviderError::RateLimited { .. }) => {
                        DataQualityIssue::ProviderRatelimited
                    }
                    ScannerError::Provider(ProviderError::Timeout { .. }) => {
                        DataQualityIssue::ProviderTimeout
                    }
                    _ => DataQualityIssue::FetchFailed,
                };
                warn!("fetch failed for {symbol} {timeframe}: {err}");
                self.diagnostics.record_data_quality(issue);
                return false;
            }
        };

        let enriched = match indicators::enrich(&buffer, &self.config.indicators, timeframe, is_fresh)
        {
            Ok(enriched) => enriched,
            Err(err) => {
                let issue = match &err {
                    ScannerError::InvalidData(detail) => {
                        warn!("invalid data for {symbol} {timeframe}: {detail}");
                        DataQualityIssue::InvalidData
                    }
                    ScannerError::InsufficientHistory { rows, min } => {
                        debug!("insufficient history for {symbol} {timeframe}: {rows}/{min}");
                        DataQualityIssue::InsufficientHistory
                    }
                    _ => DataQualityIssue::FetchFailed,
                };
                self.diagnostics.record_data_quality(issue);
                return false;
            }
        };

        // Stale buffers are surfaced for diagnostics but move nothing:
        // no tracker updates, no strategies.
        if !is_fresh {
            self.diagnostics
                .record_data_quality(DataQualityIssue::StaleData);
            self.append_report_row(&enriched, now, "skipped:stale_data");
            return false;
        }

        let last_close = enriched.last().candle.close;
        let trade_events = self.tracker.update(last_close, now);
        for event in trade_events {
            if let Err(err) = self.dispatcher.send(OutboundEvent::Trade(event)).await {
                error!("trade event dispatch failed: {err}");
            }
        }
        let closed = self.tracker.reap();
        if !closed.is_empty() {
            debug!("reaped {} closed trades", closed.len());
        }

        let outcome = self.evaluate(&enriched, now).await;
        self.append_report_row(&enriched, now, &outcome.as_report_cell());
        true
    }

    /// Regime classification, strategy dispatch, conflict resolution and
    /// the quality gate.
    async fn evaluate(&mut self, buffer: &EnrichedBuffer, now: DateTime<Utc>) -> TickOutcome {
        let condition = regime::classify(buffer);
        debug!(
            "regime {:?}: adx {:.1} atr_ratio {:.2} ranging {}",
            condition.regime_key(),
            condition.adx,
            condition.atr_ratio,
            condition.is_ranging
        );

        let ctx = StrategyContext {
            symbol: self.config.symbol.clone(),
            timeframe: buffer.timeframe,
            overrides: self.config.overrides.clone(),
            asian_session: self.config.asian_session.clone(),
        };

        let mut candidates: Vec<Candidate> = Vec::new();
        for id in self.orchestrator.select(&condition) {
            let Some(strategy) = self.registry.get(id) else {
                continue;
            };
            if buffer.len() < strategy.min_history() {
                continue;
            }
            self.diagnostics.record_attempt(id);
            if let Some(candidate) = strategy.detect(buffer, &ctx) {
                debug!("{id} produced a {} candidate", candidate.direction);
                candidates.push(candidate);
            }
        }

        match Orchestrator::resolve(candidates) {
            Resolution::NoSignal => TickOutcome::NoSignal,
            Resolution::Conflict { first, second } => {
                warn!("conflicting strategies this tick: {first} vs {second}");
                self.diagnostics
                    .record_rejection(RejectReason::ConflictingStrategies);
                TickOutcome::Conflict
            }
            Resolution::Winner(candidate) => {
                let strategy = candidate.strategy;
                match self.filter.apply(candidate, &self.config.symbol, buffer, now) {
                    FilterVerdict::Emit(signal) => {
                        self.diagnostics.record_success(strategy, now);
                        self.tracker.track((*signal).clone(), now);
                        if let Err(err) = self
                            .dispatcher
                            .send(OutboundEvent::SignalEmitted { signal })
                            .await
                        {
                            error!("signal dispatch failed: {err}");
                        }
                        TickOutcome::Signal(strategy.to_string())
                    }
                    FilterVerdict::Reject(reason) => {
                        self.diagnostics.record_rejection(reason);
                        TickOutcome::Rejected(reason)
                    }
                }
            }
        }
    }

    fn append_report_row(&self, buffer: &EnrichedBuffer, now: DateTime<Utc>, outcome: &str) {
        if let Some(report) = &self.report {
            let snapshot = buffer.snapshot();
            if let Err(err) = report.append(
                now,
                &self.config.symbol,
                buffer.timeframe,
                buffer.last().candle.close,
                &snapshot,
                outcome,
            ) {
                error!("scan report append failed: {err:#}");
            }
        }
    }

    async fn emit_summary(&self) {
        let report = self.diagnostics.report(Utc::now());
        if let Err(err) = self
            .dispatcher
            .send(OutboundEvent::Diagnostics(Box::new(report)))
            .await
        {
            error!("diagnostics dispatch failed: {err}");
        }
    }

    async fn shutdown(&mut self) {
        info!("scanner for {} shutting down", self.config.symbol);
        self.emit_summary().await;

        let unclosed = self.tracker.unclosed();
        if !unclosed.is_empty() {
            match serde_json::to_string(&unclosed) {
                Ok(json) => {
                    let _ = self
                        .dispatcher
                        .send(OutboundEvent::OperationalAlert {
                            level: AlertLevel::Warn,
                            text: format!("unclosed trades at shutdown: {json}"),
                        })
                        .await;
                }
                Err(err) => error!("failed to serialize unclosed trades: {err}"),
            }
        }
        self.source.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScannerSettings;
    use crate::data::Provider;
    use crate::error::ProviderError;
    use crate::indicators::test_support::flat_enriched;
    use crate::types::test_support::flat_candles;
    use crate::types::{AssetClass, Candle, StrategyId, Symbol};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    struct FixedProvider {
        candles: Vec<Candle>,
    }

    #[async_trait]
    impl Provider for FixedProvider {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn supports(&self, _class: AssetClass) -> bool {
            true
        }

        async fn fetch(
            &self,
            _symbol: &Symbol,
            _timeframe: TimeFrame,
            _count: usize,
        ) -> Result<Vec<Candle>, ProviderError> {
            Ok(self.candles.clone())
        }
    }

    fn scanner_with(candles: Vec<Candle>) -> Scanner {
        let mut settings = ScannerSettings::default();
        settings.quality_filter.min_risk_reward = dec!(0.5);
        let config = settings.resolve().unwrap();
        let source = DataSource::new(vec![Box::new(FixedProvider { candles })]);
        let (dispatcher, _worker) = Dispatcher::channel(64, vec![]);
        let diagnostics = Arc::new(DiagnosticRecorder::new(t0()));
        Scanner::new(config, source, dispatcher, diagnostics, None)
    }

    #[tokio::test]
    async fn test_stale_buffer_skips_tick() {
        // Candles end two hours before "now" on a 5m feed.
        let candles = flat_candles(300, dec!(100), TimeFrame::M5, t0());
        let mut scanner = scanner_with(candles);
        let now = t0() + chrono::Duration::hours(2);

        let ok = scanner.run_tick(TimeFrame::M5, now).await;
        assert!(!ok);
        assert_eq!(
            scanner.diagnostics.data_quality_count(DataQualityIssue::StaleData),
            1
        );
        assert_eq!(scanner.tracker.open_count(), 0);
    }

    #[tokio::test]
    async fn test_negative_volume_counts_invalid_data() {
        let mut candles = flat_candles(300, dec!(100), TimeFrame::M5, t0());
        let idx = candles.len() - 3;
        candles[idx].volume = dec!(-5);
        let mut scanner = scanner_with(candles);

        let ok = scanner.run_tick(TimeFrame::M5, t0()).await;
        assert!(!ok);
        assert_eq!(
            scanner.diagnostics.data_quality_count(DataQualityIssue::InvalidData),
            1
        );
    }

    #[tokio::test]
    async fn test_clean_flat_tick_produces_no_signal() {
        let candles = flat_candles(300, dec!(100), TimeFrame::M5, t0());
        let mut scanner = scanner_with(candles);
        let ok = scanner.run_tick(TimeFrame::M5, t0()).await;
        assert!(ok);
        assert_eq!(scanner.tracker.open_count(), 0);
    }

    /// Buffer sculpted for an EMA crossover with full confluence.
    fn crossover_buffer() -> EnrichedBuffer {
        let mut buf = flat_enriched(70, dec!(65432.5));
        let len = buf.rows().len();
        let rows = buf.rows_mut();
        rows[len - 2].ema_fast = dec!(65400);
        rows[len - 2].ema_slow = dec!(65410);
        let last = &mut rows[len - 1];
        last.ema_fast = dec!(65420);
        last.ema_slow = dec!(65410);
        last.ema_trend = dec!(65300);
        last.vwap = dec!(65300);
        last.volume_ratio = dec!(1.8);
        last.rsi = dec!(58);
        last.atr = dec!(120);
        last.atr_ma = dec!(120);
        last.adx = dec!(22);
        buf
    }

    #[tokio::test]
    async fn test_emission_counts_success_exactly_once() {
        let mut scanner = scanner_with(Vec::new());
        let outcome = scanner.evaluate(&crossover_buffer(), t0()).await;
        assert!(matches!(outcome, TickOutcome::Signal(_)));
        assert_eq!(
            scanner.diagnostics.successes_for(StrategyId::EmaCrossover),
            1
        );
        assert_eq!(scanner.tracker.open_count(), 1);
        let entry = scanner.tracker.trades()[0].signal.entry_price;
        assert_eq!(entry, dec!(65432.5));
        assert_eq!(scanner.tracker.trades()[0].signal.stop_loss, dec!(65252.5));
        assert_eq!(scanner.tracker.trades()[0].signal.take_profit, dec!(65552.5));
    }

    #[tokio::test]
    async fn test_replay_emits_identical_signal() {
        // Two fresh scanners over the same tape agree on everything but
        // the signal id and timestamp.
        let mut a = scanner_with(Vec::new());
        let mut b = scanner_with(Vec::new());
        assert!(matches!(
            a.evaluate(&crossover_buffer(), t0()).await,
            TickOutcome::Signal(_)
        ));
        assert!(matches!(
            b.evaluate(&crossover_buffer(), t0()).await,
            TickOutcome::Signal(_)
        ));

        let sa = &a.tracker.trades()[0].signal;
        let sb = &b.tracker.trades()[0].signal;
        assert_eq!(sa.strategy, sb.strategy);
        assert_eq!(sa.direction, sb.direction);
        assert_eq!(sa.entry_price, sb.entry_price);
        assert_eq!(sa.stop_loss, sb.stop_loss);
        assert_eq!(sa.take_profit, sb.take_profit);
        assert_eq!(sa.risk_reward, sb.risk_reward);
        assert_eq!(sa.confidence, sb.confidence);
        assert_eq!(sa.confluence, sb.confluence);
    }

    #[tokio::test]
    async fn test_duplicate_candidate_rejected_on_second_pass() {
        let mut scanner = scanner_with(Vec::new());
        let build = || {
            let mut buf = flat_enriched(70, dec!(100));
            let len = buf.rows().len();
            let rows = buf.rows_mut();
            rows[len - 2].ema_fast = dec!(99.8);
            rows[len - 2].ema_slow = dec!(99.9);
            let last = &mut rows[len - 1];
            last.ema_fast = dec!(100.2);
            last.ema_slow = dec!(99.9);
            last.ema_trend = dec!(99);
            last.vwap = dec!(99.5);
            last.volume_ratio = dec!(1.8);
            last.rsi = dec!(58);
            last.atr = dec!(1);
            last.adx = dec!(22);
            buf
        };

        let first = scanner.evaluate(&build(), t0()).await;
        assert!(matches!(first, TickOutcome::Signal(_)));
        let second = scanner
            .evaluate(&build(), t0() + chrono::Duration::seconds(300))
            .await;
        assert!(matches!(
            second,
            TickOutcome::Rejected(RejectReason::Duplicate)
        ));
    }
}
