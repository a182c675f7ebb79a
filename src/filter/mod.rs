use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{AssetOverride, FilterSettings};
use crate::diagnostics::RejectReason;
use crate::indicators::EnrichedBuffer;
use crate::strategies::Candidate;
use crate::types::{ConfluenceFactor, Direction, Signal, Symbol, TimeFrame};

/// RSI movement that forces a re-emission even near a prior signal.
const RSI_OVERRIDE_POINTS: Decimal = dec!(15);
/// Entries older than this fall out of the duplicate window regardless of
/// the configured window.
const MAX_WINDOW_S: i64 = 600;
const MAX_WINDOW_LEN: usize = 100;

#[derive(Debug)]
pub enum FilterVerdict {
    Emit(Box<Signal>),
    Reject(RejectReason),
}

/// Bounded per-symbol history of emitted signals used for duplicate
/// suppression.
#[derive(Debug, Default)]
struct RecentSignals {
    entries: VecDeque<Signal>,
}

impl RecentSignals {
    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - chrono::Duration::seconds(MAX_WINDOW_S);
        while let Some(front) = self.entries.front() {
            if front.created_at < cutoff {
                self.entries.pop_front();
            } else {
                break;
            }
        }
        while self.entries.len() > MAX_WINDOW_LEN {
            self.entries.pop_front();
        }
    }

    fn push(&mut self, signal: Signal, now: DateTime<Utc>) {
        self.entries.push_back(signal);
        self.prune(now);
    }

    fn iter(&self) -> impl Iterator<Item = &Signal> {
        self.entries.iter()
    }
}

/// Multi-factor quality gate with duplicate suppression and a
/// self-disarming bypass mode. One filter instance per scanner.
pub struct QualityFilter {
    policy: FilterSettings,
    overrides: AssetOverride,
    bypass_enabled: AtomicBool,
    bypass_disarm_at: Mutex<Option<DateTime<Utc>>>,
    recent: Mutex<RecentSignals>,
}

impl QualityFilter {
    pub fn new(policy: FilterSettings, overrides: AssetOverride) -> Self {
        Self {
            policy,
            overrides,
            bypass_enabled: AtomicBool::new(false),
            bypass_disarm_at: Mutex::new(None),
            recent: Mutex::new(RecentSignals::default()),
        }
    }

    /// Arm bypass mode until `now + hours`. Bypassed emissions are tagged
    /// so downstream consumers can tell them apart.
    pub fn enable_bypass(&self, now: DateTime<Utc>, hours: i64) {
        *self.bypass_disarm_at.lock().expect("bypass lock poisoned") =
            Some(now + chrono::Duration::hours(hours));
        self.bypass_enabled.store(true, Ordering::Release);
        warn!("quality filter bypass enabled for {hours}h");
    }

    pub fn bypass_active(&self, now: DateTime<Utc>) -> bool {
        if !self.bypass_enabled.load(Ordering::Acquire) {
            return false;
        }
        let disarm_at = *self.bypass_disarm_at.lock().expect("bypass lock poisoned");
        match disarm_at {
            Some(at) if now >= at => {
                self.bypass_enabled.store(false, Ordering::Release);
                info!("quality filter bypass auto-disabled");
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Evaluate the seven confluence factors against the newest enriched
    /// candle.
    fn met_factors(
        &self,
        candidate: &Candidate,
        buffer: &EnrichedBuffer,
        now: DateTime<Utc>,
    ) -> Vec<ConfluenceFactor> {
        let last = buffer.last();
        let close = last.candle.close;
        let mut met = Vec::new();

        let vwap_ok = match candidate.direction {
            Direction::Long => close > last.vwap,
            Direction::Short => close < last.vwap,
        };
        if vwap_ok {
            met.push(ConfluenceFactor::PriceVsVwap);
        }

        let ema_ok = match candidate.direction {
            Direction::Long => last.ema_fast > last.ema_slow,
            Direction::Short => last.ema_fast < last.ema_slow,
        };
        if ema_ok {
            met.push(ConfluenceFactor::EmaAlignment);
        }

        if last.volume_ratio >= self.overrides.volume_threshold {
            met.push(ConfluenceFactor::VolumeSpike);
        }

        if last.rsi >= self.overrides.rsi_min && last.rsi <= self.overrides.rsi_max {
            met.push(ConfluenceFactor::RsiBand);
        }

        if last.adx >= dec!(20) {
            met.push(ConfluenceFactor::AdxStrength);
        }

        let trend_ok = match candidate.direction {
            Direction::Long => close > last.ema_trend,
            Direction::Short => close < last.ema_trend,
        };
        if trend_ok {
            met.push(ConfluenceFactor::TrendDirection);
        }

        let opposing = {
            let mut recent = self.recent.lock().expect("recent-signals lock poisoned");
            recent.prune(now);
            let result = recent
                .iter()
                .any(|s| s.direction == candidate.direction.opposite());
            result
        };
        if !opposing {
            met.push(ConfluenceFactor::NoOpposingSignal);
        }

        met
    }

    fn is_duplicate(
        &self,
        candidate: &Candidate,
        timeframe: TimeFrame,
        current_rsi: Decimal,
        now: DateTime<Utc>,
    ) -> bool {
        let window = chrono::Duration::seconds(self.policy.duplicate_window_s);
        let hundred = Decimal::from(100);
        let mut recent = self.recent.lock().expect("recent-signals lock poisoned");
        recent.prune(now);

        let is_dup = recent.iter().any(|prior| {
            if prior.direction != candidate.direction || prior.timeframe != timeframe {
                return false;
            }
            if now - prior.created_at > window {
                return false;
            }
            if prior.entry_price.is_zero() {
                return false;
            }
            let move_pct = (candidate.entry - prior.entry_price).abs() / prior.entry_price * hundred;
            if move_pct >= self.policy.duplicate_price_pct {
                return false;
            }
            // Near-duplicates still re-emit when the tape has changed
            // meaningfully underneath them.
            if (current_rsi - prior.snapshot.rsi).abs() >= RSI_OVERRIDE_POINTS {
                return false;
            }
            if move_pct >= self.policy.significant_move_pct {
                return false;
            }
            true
        });
        is_dup
    }

    fn build_signal(
        &self,
        candidate: Candidate,
        symbol: &Symbol,
        buffer: &EnrichedBuffer,
        confluence: Vec<ConfluenceFactor>,
        confidence: u8,
        now: DateTime<Utc>,
        bypassed: bool,
    ) -> Option<Signal> {
        let risk_reward =
            Signal::risk_reward_of(candidate.entry, candidate.stop_loss, candidate.take_profit)?;
        let reasoning = if bypassed {
            format!("[bypass] {}", candidate.reasoning)
        } else {
            candidate.reasoning
        };
        Some(Signal {
            id: Uuid::new_v4(),
            symbol: symbol.clone(),
            timeframe: buffer.timeframe,
            direction: candidate.direction,
            strategy: candidate.strategy,
            entry_price: candidate.entry,
            stop_loss: candidate.stop_loss,
            take_profit: candidate.take_profit,
            risk_reward,
            confidence,
            confluence,
            reasoning,
            snapshot: buffer.snapshot(),
            metadata: candidate.metadata.clone(),
            created_at: now,
            bypassed_filter: bypassed,
        })
    }

    /// Run the full gate. On emission the signal is recorded into the
    /// duplicate window.
    pub fn apply(
        &self,
        candidate: Candidate,
        symbol: &Symbol,
        buffer: &EnrichedBuffer,
        now: DateTime<Utc>,
    ) -> FilterVerdict {
        let last_rsi = buffer.last().rsi;

        if self.bypass_active(now) {
            let confluence = self.met_factors(&candidate, buffer, now);
            let confidence = candidate.confidence;
            let Some(signal) =
                self.build_signal(candidate, symbol, buffer, confluence, confidence, now, true)
            else {
                return FilterVerdict::Reject(RejectReason::LowRiskReward);
            };
            self.remember(signal.clone(), now);
            return FilterVerdict::Emit(Box::new(signal));
        }

        let confluence = self.met_factors(&candidate, buffer, now);
        if confluence.len() < self.policy.min_confluence {
            return FilterVerdict::Reject(RejectReason::LowConfluence);
        }

        // Base score from the strategy, nudged by how broad the
        // confirmation is.
        let mut confidence = candidate.confidence;
        if confluence.len() >= 6 {
            confidence = (confidence + 1).min(5);
        }
        if confidence < self.policy.min_confidence {
            return FilterVerdict::Reject(RejectReason::LowConfidence);
        }

        if candidate.risk_reward() < self.policy.min_risk_reward {
            return FilterVerdict::Reject(RejectReason::LowRiskReward);
        }

        if self.is_duplicate(&candidate, buffer.timeframe, last_rsi, now) {
            return FilterVerdict::Reject(RejectReason::Duplicate);
        }

        let Some(signal) =
            self.build_signal(candidate, symbol, buffer, confluence, confidence, now, false)
        else {
            return FilterVerdict::Reject(RejectReason::LowRiskReward);
        };
        self.remember(signal.clone(), now);
        FilterVerdict::Emit(Box::new(signal))
    }

    fn remember(&self, signal: Signal, now: DateTime<Utc>) {
        self.recent
            .lock()
            .expect("recent-signals lock poisoned")
            .push(signal, now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::flat_enriched;
    use crate::types::{AssetClass, StrategyId};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn filter() -> QualityFilter {
        QualityFilter::new(
            FilterSettings::default(),
            AssetOverride::defaults_for(AssetClass::Crypto),
        )
    }

    /// Buffer whose last row meets every confluence factor for a long.
    fn strong_buffer() -> EnrichedBuffer {
        let mut buf = flat_enriched(60, dec!(100));
        let len = buf.rows().len();
        let last = &mut buf.rows_mut()[len - 1];
        last.candle.close = dec!(100);
        last.vwap = dec!(99.5);
        last.ema_fast = dec!(99.9);
        last.ema_slow = dec!(99.7);
        last.ema_trend = dec!(99);
        last.volume_ratio = dec!(1.8);
        last.rsi = dec!(58);
        last.adx = dec!(24);
        buf
    }

    fn long_candidate(entry: Decimal) -> Candidate {
        Candidate::new(
            StrategyId::EmaCrossover,
            Direction::Long,
            entry,
            entry - dec!(1),
            entry + dec!(2),
            3,
            "test".into(),
        )
        .unwrap()
    }

    #[test]
    fn test_strong_candidate_emitted_with_boosted_confidence() {
        let f = filter();
        let buf = strong_buffer();
        match f.apply(long_candidate(dec!(100)), &Symbol::parse("BTC"), &buf, t0()) {
            FilterVerdict::Emit(signal) => {
                assert_eq!(signal.confluence.len(), 7);
                assert_eq!(signal.confidence, 4);
                assert_eq!(signal.risk_reward, dec!(2));
                assert!(!signal.bypassed_filter);
            }
            FilterVerdict::Reject(reason) => panic!("unexpected rejection: {reason}"),
        }
    }

    #[test]
    fn test_thin_confluence_rejected() {
        let f = filter();
        let mut buf = strong_buffer();
        let len = buf.rows().len();
        let last = &mut buf.rows_mut()[len - 1];
        // Kill VWAP, EMA, volume, trend and ADX factors.
        last.vwap = dec!(101);
        last.ema_fast = dec!(99);
        last.ema_slow = dec!(99.5);
        last.ema_trend = dec!(101);
        last.volume_ratio = dec!(1.0);
        last.adx = dec!(15);
        match f.apply(long_candidate(dec!(100)), &Symbol::parse("BTC"), &buf, t0()) {
            FilterVerdict::Reject(RejectReason::LowConfluence) => {}
            other => panic!("expected low_confluence, got {other:?}"),
        }
    }

    #[test]
    fn test_poor_risk_reward_rejected() {
        let f = filter();
        let buf = strong_buffer();
        let candidate = Candidate::new(
            StrategyId::EmaCrossover,
            Direction::Long,
            dec!(100),
            dec!(98),
            dec!(101),
            3,
            "test".into(),
        )
        .unwrap();
        match f.apply(candidate, &Symbol::parse("BTC"), &buf, t0()) {
            FilterVerdict::Reject(RejectReason::LowRiskReward) => {}
            other => panic!("expected low_risk_reward, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_within_window_rejected() {
        let f = filter();
        let buf = strong_buffer();
        let sym = Symbol::parse("BTC");
        assert!(matches!(
            f.apply(long_candidate(dec!(100)), &sym, &buf, t0()),
            FilterVerdict::Emit(_)
        ));
        // Five minutes later: same direction, same timeframe, 0.3% away,
        // RSI barely moved.
        let mut buf2 = strong_buffer();
        let len = buf2.rows().len();
        buf2.rows_mut()[len - 1].rsi = dec!(62);
        let again = f.apply(
            long_candidate(dec!(100.3)),
            &sym,
            &buf2,
            t0() + chrono::Duration::seconds(300),
        );
        match again {
            FilterVerdict::Reject(RejectReason::Duplicate) => {}
            other => panic!("expected duplicate, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_offered_again_still_rejected() {
        let f = filter();
        let buf = strong_buffer();
        let sym = Symbol::parse("BTC");
        assert!(matches!(
            f.apply(long_candidate(dec!(100)), &sym, &buf, t0()),
            FilterVerdict::Emit(_)
        ));
        for delay in [300, 310] {
            let verdict = f.apply(
                long_candidate(dec!(100.3)),
                &sym,
                &buf,
                t0() + chrono::Duration::seconds(delay),
            );
            assert!(
                matches!(verdict, FilterVerdict::Reject(RejectReason::Duplicate)),
                "at +{delay}s"
            );
        }
    }

    #[test]
    fn test_rsi_shift_overrides_duplicate() {
        let f = filter();
        let buf = strong_buffer();
        let sym = Symbol::parse("BTC");
        assert!(matches!(
            f.apply(long_candidate(dec!(100)), &sym, &buf, t0()),
            FilterVerdict::Emit(_)
        ));
        let mut buf2 = strong_buffer();
        let len = buf2.rows().len();
        // RSI moved 15+ points since the prior emission (58 -> 74).
        buf2.rows_mut()[len - 1].rsi = dec!(74);
        let verdict = f.apply(
            long_candidate(dec!(100.3)),
            &sym,
            &buf2,
            t0() + chrono::Duration::seconds(300),
        );
        assert!(matches!(verdict, FilterVerdict::Emit(_)));
    }

    #[test]
    fn test_significant_move_overrides_duplicate() {
        let mut policy = FilterSettings::default();
        // Widen the price tolerance so a 2% move would otherwise count as
        // a duplicate, leaving the significant-move escape to fire.
        policy.duplicate_price_pct = dec!(3.0);
        let f = QualityFilter::new(policy, AssetOverride::defaults_for(AssetClass::Crypto));
        let buf = strong_buffer();
        let sym = Symbol::parse("BTC");
        assert!(matches!(
            f.apply(long_candidate(dec!(100)), &sym, &buf, t0()),
            FilterVerdict::Emit(_)
        ));
        let verdict = f.apply(
            long_candidate(dec!(102)),
            &sym,
            &buf,
            t0() + chrono::Duration::seconds(300),
        );
        assert!(matches!(verdict, FilterVerdict::Emit(_)));
    }

    #[test]
    fn test_different_timeframe_not_a_duplicate() {
        let f = filter();
        let sym = Symbol::parse("BTC");
        let buf = strong_buffer();
        assert!(matches!(
            f.apply(long_candidate(dec!(100)), &sym, &buf, t0()),
            FilterVerdict::Emit(_)
        ));
        let mut buf2 = strong_buffer();
        buf2.timeframe = crate::types::TimeFrame::M15;
        let verdict = f.apply(
            long_candidate(dec!(100.1)),
            &sym,
            &buf2,
            t0() + chrono::Duration::seconds(60),
        );
        assert!(matches!(verdict, FilterVerdict::Emit(_)));
    }

    #[test]
    fn test_bypass_emits_tagged_and_auto_disarms() {
        let f = filter();
        let sym = Symbol::parse("BTC");
        let mut buf = strong_buffer();
        let len = buf.rows().len();
        // Gut the confluence so the normal path would reject.
        let last = &mut buf.rows_mut()[len - 1];
        last.vwap = dec!(101);
        last.ema_fast = dec!(99);
        last.ema_slow = dec!(99.5);
        last.ema_trend = dec!(101);
        last.volume_ratio = dec!(1.0);
        last.adx = dec!(15);

        f.enable_bypass(t0(), 2);
        match f.apply(long_candidate(dec!(100)), &sym, &buf, t0()) {
            FilterVerdict::Emit(signal) => {
                assert!(signal.bypassed_filter);
                assert!(signal.reasoning.starts_with("[bypass]"));
            }
            other => panic!("expected bypass emission, got {other:?}"),
        }

        // Past the disarm deadline the filter is back in force.
        let later = t0() + chrono::Duration::hours(3);
        assert!(!f.bypass_active(later));
        match f.apply(long_candidate(dec!(110)), &sym, &buf, later) {
            FilterVerdict::Reject(RejectReason::LowConfluence) => {}
            other => panic!("expected low_confluence after disarm, got {other:?}"),
        }
    }
}
