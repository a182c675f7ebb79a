use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::types::{Direction, Signal, TrackedTrade, TradeEvent, TradeEventKind, TradeStatus};

/// Fraction of the entry->TP distance that arms the breakeven stop.
const BREAKEVEN_TRIGGER: Decimal = dec!(0.5);
/// Peak progress toward TP required before the reversal exit can fire.
const REVERSAL_PEAK_PROGRESS: Decimal = dec!(0.7);
/// Give-back from the peak that triggers the reversal exit.
const REVERSAL_RETRACE: Decimal = dec!(0.5);

/// Watches every emitted signal against live price until a terminal
/// condition fires. Emits structured events only; formatting belongs to
/// the sinks.
pub struct TradeTracker {
    trades: Vec<TrackedTrade>,
}

impl TradeTracker {
    pub fn new() -> Self {
        Self { trades: Vec::new() }
    }

    pub fn track(&mut self, signal: Signal, now: DateTime<Utc>) {
        debug!(
            "tracking {} {} entry {} sl {} tp {}",
            signal.strategy, signal.direction, signal.entry_price, signal.stop_loss, signal.take_profit
        );
        self.trades.push(TrackedTrade::open(signal, now));
    }

    pub fn open_count(&self) -> usize {
        self.trades.iter().filter(|t| !t.status.is_terminal()).count()
    }

    pub fn trades(&self) -> &[TrackedTrade] {
        &self.trades
    }

    /// Drop terminal trades, returning them for reporting.
    pub fn reap(&mut self) -> Vec<TrackedTrade> {
        let (closed, open): (Vec<_>, Vec<_>) =
            self.trades.drain(..).partition(|t| t.status.is_terminal());
        self.trades = open;
        closed
    }

    /// Snapshot of still-open trades, serialization-ready, for the
    /// shutdown report.
    pub fn unclosed(&self) -> Vec<TrackedTrade> {
        self.trades
            .iter()
            .filter(|t| !t.status.is_terminal())
            .cloned()
            .collect()
    }

    /// Advance every open trade against the latest price. Events come out
    /// in trade order; for one trade a breakeven event always precedes any
    /// terminal event.
    pub fn update(&mut self, price: Decimal, now: DateTime<Utc>) -> Vec<TradeEvent> {
        let mut events = Vec::new();

        for trade in &mut self.trades {
            if trade.status.is_terminal() {
                continue;
            }
            trade.last_checked_at = now;

            // Track the most favorable excursion first.
            let improved = match trade.direction() {
                Direction::Long => price > trade.peak_price,
                Direction::Short => price < trade.peak_price,
            };
            if improved {
                trade.peak_price = price;
            }

            let entry = trade.signal.entry_price;
            let tp = trade.signal.take_profit;
            let tp_distance = (tp - entry).abs();

            // 1. Stop (original or moved to entry after breakeven).
            let stopped = match trade.direction() {
                Direction::Long => price <= trade.active_stop,
                Direction::Short => price >= trade.active_stop,
            };
            if stopped {
                trade.status = TradeStatus::Stopped;
                events.push(TradeEvent {
                    trade_id: trade.id(),
                    kind: TradeEventKind::Stop,
                    price,
                    pnl_pct: trade.pnl_pct(price),
                    note: format!("stop at {}", trade.active_stop),
                });
                continue;
            }

            // 2. Breakeven arming at half the distance to target.
            if !trade.breakeven_announced && !tp_distance.is_zero() {
                let progress = trade.direction().favorable(entry, price) / tp_distance;
                if progress >= BREAKEVEN_TRIGGER {
                    trade.breakeven_announced = true;
                    trade.active_stop = entry;
                    trade.status = TradeStatus::BreakevenArmed;
                    events.push(TradeEvent {
                        trade_id: trade.id(),
                        kind: TradeEventKind::Breakeven,
                        price,
                        pnl_pct: trade.pnl_pct(price),
                        note: format!("stop moved to entry {entry}"),
                    });
                }
            }

            // 3. Target.
            let target_hit = match trade.direction() {
                Direction::Long => price >= tp,
                Direction::Short => price <= tp,
            };
            if target_hit {
                trade.status = TradeStatus::TpHit;
                events.push(TradeEvent {
                    trade_id: trade.id(),
                    kind: TradeEventKind::Tp,
                    price,
                    pnl_pct: trade.pnl_pct(price),
                    note: format!("target {tp} reached"),
                });
                continue;
            }

            // 4. Reversal exit: a deep give-back after most of the move
            // was already in hand.
            if !tp_distance.is_zero() {
                let peak_gain = trade.direction().favorable(entry, trade.peak_price);
                let peak_progress = peak_gain / tp_distance;
                if peak_progress >= REVERSAL_PEAK_PROGRESS && peak_gain > Decimal::ZERO {
                    let given_back = trade.direction().favorable(price, trade.peak_price);
                    let retrace = given_back / peak_gain;
                    if retrace >= REVERSAL_RETRACE {
                        trade.status = TradeStatus::ReversalExited;
                        events.push(TradeEvent {
                            trade_id: trade.id(),
                            kind: TradeEventKind::Reversal,
                            price,
                            pnl_pct: trade.pnl_pct(price),
                            note: format!(
                                "peak {}; retrace {:.0}%",
                                trade.peak_price,
                                retrace * dec!(100)
                            ),
                        });
                        continue;
                    }
                }
            }

            // 5. Hold-horizon expiry.
            if trade.age(now) > trade.hold_horizon().max_hold() {
                trade.status = TradeStatus::Expired;
                events.push(TradeEvent {
                    trade_id: trade.id(),
                    kind: TradeEventKind::Expired,
                    price,
                    pnl_pct: trade.pnl_pct(price),
                    note: format!("exceeded {} hold limit", trade.hold_horizon().as_str()),
                });
            }
        }

        events
    }
}

impl Default for TradeTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_support::sample_signal;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn tick(seconds: i64) -> DateTime<Utc> {
        t0() + chrono::Duration::seconds(seconds)
    }

    /// Long at 100 with SL 99 / TP 101, as in the breakeven scenario.
    fn tracker_with_long() -> TradeTracker {
        let mut tracker = TradeTracker::new();
        tracker.track(sample_signal(), t0());
        tracker
    }

    #[test]
    fn test_stop_loss_fires() {
        let mut tracker = tracker_with_long();
        let events = tracker.update(dec!(98.9), tick(60));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, TradeEventKind::Stop);
        assert!(events[0].pnl_pct < Decimal::ZERO);
        assert_eq!(tracker.open_count(), 0);
    }

    #[test]
    fn test_take_profit_fires() {
        let mut tracker = tracker_with_long();
        let events = tracker.update(dec!(101.2), tick(60));
        // Breakeven arms on the way through, then the target prints.
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, TradeEventKind::Breakeven);
        assert_eq!(events[1].kind, TradeEventKind::Tp);
    }

    #[test]
    fn test_breakeven_then_reversal_exit() {
        let mut tracker = tracker_with_long();
        assert!(tracker.update(dec!(100.4), tick(60)).is_empty());

        let events = tracker.update(dec!(100.5), tick(120));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, TradeEventKind::Breakeven);

        assert!(tracker.update(dec!(100.8), tick(180)).is_empty());

        let events = tracker.update(dec!(100.35), tick(240));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, TradeEventKind::Reversal);
        assert_eq!(events[0].price, dec!(100.35));
        assert_eq!(events[0].note, "peak 100.8; retrace 56%");
        assert_eq!(tracker.open_count(), 0);
    }

    #[test]
    fn test_breakeven_announced_once() {
        let mut tracker = tracker_with_long();
        assert_eq!(tracker.update(dec!(100.5), tick(60)).len(), 1);
        assert!(tracker.update(dec!(100.55), tick(120)).is_empty());
        assert!(tracker.update(dec!(100.5), tick(180)).is_empty());
    }

    #[test]
    fn test_breakeven_stop_protects_entry() {
        let mut tracker = tracker_with_long();
        tracker.update(dec!(100.5), tick(60));
        // Price falls back to entry: stopped flat, not at the original SL.
        let events = tracker.update(dec!(100), tick(120));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, TradeEventKind::Stop);
        assert_eq!(events[0].pnl_pct, Decimal::ZERO);
    }

    #[test]
    fn test_breakeven_precedes_terminal_event() {
        let mut tracker = tracker_with_long();
        let mut all = Vec::new();
        for (price, s) in [(dec!(100.5), 60), (dec!(100.9), 120), (dec!(99.9), 180)] {
            all.extend(tracker.update(price, tick(s)));
        }
        let breakeven_pos = all.iter().position(|e| e.kind == TradeEventKind::Breakeven);
        let terminal_pos = all
            .iter()
            .position(|e| matches!(e.kind, TradeEventKind::Stop | TradeEventKind::Reversal));
        assert!(breakeven_pos.unwrap() < terminal_pos.unwrap());
    }

    #[test]
    fn test_expiry_after_hold_horizon() {
        let mut tracker = tracker_with_long();
        // Intraday horizon: 24h. Nothing at 23h, expired at 25h.
        assert!(tracker
            .update(dec!(100.1), t0() + chrono::Duration::hours(23))
            .is_empty());
        let events = tracker.update(dec!(100.1), t0() + chrono::Duration::hours(25));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, TradeEventKind::Expired);
    }

    #[test]
    fn test_short_side_mirrors() {
        let mut signal = sample_signal();
        signal.direction = Direction::Short;
        signal.stop_loss = dec!(101);
        signal.take_profit = dec!(99);
        let mut tracker = TradeTracker::new();
        tracker.track(signal, t0());

        let events = tracker.update(dec!(99.5), tick(60));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, TradeEventKind::Breakeven);

        let events = tracker.update(dec!(98.9), tick(120));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, TradeEventKind::Tp);
    }

    #[test]
    fn test_reap_retains_open_trades() {
        let mut tracker = tracker_with_long();
        tracker.track(sample_signal(), t0());
        tracker.update(dec!(98), tick(60));
        // Both trades stopped.
        let closed = tracker.reap();
        assert_eq!(closed.len(), 2);
        assert!(tracker.trades().is_empty());
    }

    #[test]
    fn test_unclosed_snapshot_serializes() {
        let mut tracker = tracker_with_long();
        tracker.update(dec!(100.2), tick(60));
        let unclosed = tracker.unclosed();
        assert_eq!(unclosed.len(), 1);
        let json = serde_json::to_string(&unclosed).unwrap();
        assert!(json.contains("\"status\":\"open\""));
    }
}
