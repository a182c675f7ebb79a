use chrono::Timelike;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::swing::near_level;
use super::{prologue_ok, Candidate, Strategy, StrategyContext};
use crate::config::AsianSessionSettings;
use crate::indicators::{EnrichedBuffer, EnrichedCandle};
use crate::types::{AssetClass, Direction, HoldHorizon, SignalMetadata, StrategyId, TimeFrame};

/// Breakout of the Asian-session range with a retest entry, for gold and
/// the index contracts that respect that session. The session window and
/// breakout buffer come from configuration.
pub struct AsianRange;

impl AsianRange {
    fn applies_to(class: AssetClass) -> bool {
        matches!(class, AssetClass::Metal | AssetClass::Index)
    }

    fn in_session(row: &EnrichedCandle, session: &AsianSessionSettings) -> bool {
        session.contains(row.candle.open_time.hour())
    }
}

impl Strategy for AsianRange {
    fn id(&self) -> StrategyId {
        StrategyId::AsianRange
    }

    fn detect(&self, buffer: &EnrichedBuffer, ctx: &StrategyContext) -> Option<Candidate> {
        if !Self::applies_to(ctx.symbol.asset_class()) {
            return None;
        }
        // Session structure is meaningless at daily granularity.
        if matches!(ctx.timeframe, TimeFrame::H4 | TimeFrame::D1) {
            return None;
        }
        if !prologue_ok(buffer, self.min_history()) {
            return None;
        }

        let window = &ctx.asian_session;
        let last = buffer.last();
        let close = last.candle.close;
        let today = last.candle.open_time.date_naive();
        if Self::in_session(last, window) {
            return None;
        }

        // Today's completed session range.
        let session: Vec<&EnrichedCandle> = buffer
            .rows()
            .iter()
            .filter(|r| r.candle.open_time.date_naive() == today && Self::in_session(r, window))
            .collect();
        if session.is_empty() {
            return None;
        }
        let range_high = session.iter().map(|r| r.candle.high).max()?;
        let range_low = session.iter().map(|r| r.candle.low).min()?;
        let range_height = range_high - range_low;
        if range_height <= Decimal::ZERO {
            return None;
        }
        let buffer_distance = window.break_buffer_pct / dec!(100) * range_height;

        // Find the breakout bar after the session, then require the last
        // bar to be the retest that respects the broken boundary.
        let post_session: Vec<&EnrichedCandle> = buffer
            .rows()
            .iter()
            .filter(|r| {
                r.candle.open_time.date_naive() == today
                    && !Self::in_session(r, window)
                    && r.candle.open_time < last.candle.open_time
            })
            .collect();

        let mut direction = None;
        for row in &post_session {
            if row.candle.close > range_high + buffer_distance {
                direction = Some(Direction::Long);
                break;
            }
            if row.candle.close < range_low - buffer_distance {
                direction = Some(Direction::Short);
                break;
            }
        }
        let direction = direction?;
        let boundary = match direction {
            Direction::Long => range_high,
            Direction::Short => range_low,
        };

        // A close back inside the range voids the breakout.
        let mut seen_break = false;
        for row in &post_session {
            let outside = match direction {
                Direction::Long => row.candle.close > range_high + buffer_distance,
                Direction::Short => row.candle.close < range_low - buffer_distance,
            };
            if outside {
                seen_break = true;
            } else if seen_break {
                let back_inside = match direction {
                    Direction::Long => row.candle.close < boundary,
                    Direction::Short => row.candle.close > boundary,
                };
                if back_inside {
                    return None;
                }
            }
        }

        let tolerance = ctx.overrides.level_tolerance_pct;
        let retested = match direction {
            Direction::Long => {
                (last.candle.low <= boundary || near_level(last.candle.low, boundary, tolerance))
                    && close > boundary
            }
            Direction::Short => {
                (last.candle.high >= boundary || near_level(last.candle.high, boundary, tolerance))
                    && close < boundary
            }
        };
        if !retested {
            return None;
        }

        let half_atr = dec!(0.5) * last.atr;
        // Measured move: project the range height from the boundary.
        let (stop_loss, take_profit) = match direction {
            Direction::Long => (boundary - half_atr, close + range_height),
            Direction::Short => (boundary + half_atr, close - range_height),
        };

        let reasoning = format!(
            "Asian range {} break: session {:02}:00-{:02}:00 range {:.4}..{:.4}, retest held at {:.4}",
            direction, window.start_hour, window.end_hour, range_low, range_high, close,
        );

        let mut metadata = SignalMetadata::with_horizon(HoldHorizon::Intraday);
        metadata.insert("range_high", range_high);
        metadata.insert("range_low", range_low);

        Candidate::new(self.id(), direction, close, stop_loss, take_profit, 4, reasoning)
            .map(|c| c.with_metadata(metadata))
    }
}
