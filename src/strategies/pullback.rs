use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::swing::{last_swing, staircase, swing_points, SwingKind};
use super::{prologue_ok, Candidate, Strategy, StrategyContext};
use crate::indicators::EnrichedBuffer;
use crate::types::{Direction, HoldHorizon, SignalMetadata, StrategyId};

/// Pullback entry inside an established trend: a staircase of at least
/// three swings, aligned EMAs, a retrace no deeper than 61.8% of the last
/// impulse leg, and a rejection bar at the slow EMA.
pub struct TrendPullback;

const SWING_LOOKBACK: usize = 120;
const FRACTAL_K: usize = 3;
const MAX_RETRACE: Decimal = dec!(0.618);

impl Strategy for TrendPullback {
    fn id(&self) -> StrategyId {
        StrategyId::TrendPullback
    }

    fn min_history(&self) -> usize {
        200
    }

    fn detect(&self, buffer: &EnrichedBuffer, ctx: &StrategyContext) -> Option<Candidate> {
        if !prologue_ok(buffer, self.min_history()) {
            return None;
        }
        let last = buffer.last();
        let close = last.candle.close;

        // Consolidating tape disqualifies the setup outright.
        let (a1, a2, a3) = (
            buffer.from_end(0)?.atr,
            buffer.from_end(1)?.atr,
            buffer.from_end(2)?.atr,
        );
        if a1 < a2 && a2 < a3 {
            return None;
        }

        let points = swing_points(buffer.last_n(SWING_LOOKBACK), FRACTAL_K);
        let uptrend = staircase(&points, 3, true);
        let downtrend = staircase(&points, 3, false);
        let direction = if uptrend {
            Direction::Long
        } else if downtrend {
            Direction::Short
        } else {
            return None;
        };

        // EMAs must agree with the structure.
        let aligned = match direction {
            Direction::Long => last.ema_fast > last.ema_slow && last.ema_slow > last.ema_trend,
            Direction::Short => last.ema_fast < last.ema_slow && last.ema_slow < last.ema_trend,
        };
        if !aligned {
            return None;
        }

        // Retrace depth against the most recent impulse leg.
        let swing_high = last_swing(&points, SwingKind::High)?;
        let swing_low = last_swing(&points, SwingKind::Low)?;
        let leg = swing_high.price - swing_low.price;
        if leg <= Decimal::ZERO {
            return None;
        }
        let retrace = match direction {
            Direction::Long => (swing_high.price - close) / leg,
            Direction::Short => (close - swing_low.price) / leg,
        };
        if retrace < Decimal::ZERO || retrace > MAX_RETRACE {
            return None;
        }

        // Rejection at the slow EMA: the bar probed it and closed back on
        // the trend side.
        let tolerance = ctx.overrides.level_tolerance_pct;
        let probed = match direction {
            Direction::Long => {
                (last.candle.low <= last.ema_slow
                    || super::swing::near_level(last.candle.low, last.ema_slow, tolerance))
                    && close > last.ema_slow
            }
            Direction::Short => {
                (last.candle.high >= last.ema_slow
                    || super::swing::near_level(last.candle.high, last.ema_slow, tolerance))
                    && close < last.ema_slow
            }
        };
        if !probed {
            return None;
        }

        let (stop_loss, take_profit) = match direction {
            Direction::Long => (
                last.candle.low - dec!(0.5) * last.atr,
                close + dec!(2.5) * last.atr,
            ),
            Direction::Short => (
                last.candle.high + dec!(0.5) * last.atr,
                close - dec!(2.5) * last.atr,
            ),
        };

        let reasoning = format!(
            "Trend pullback {}: 3-swing staircase, retrace {:.1}% of leg {:.4}..{:.4}, rejection at slow EMA {:.4}",
            direction,
            retrace * dec!(100),
            swing_low.price,
            swing_high.price,
            last.ema_slow,
        );

        let mut metadata = SignalMetadata::with_horizon(HoldHorizon::MultiDay);
        metadata.insert("retrace_pct", retrace * dec!(100));

        Candidate::new(self.id(), direction, close, stop_loss, take_profit, 4, reasoning)
            .map(|c| c.with_metadata(metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::flat_enriched;
    use crate::strategies::test_support::ctx;

    /// Uptrend staircase of four legs, then a shallow pullback onto the
    /// slow EMA.
    fn pullback_buffer() -> EnrichedBuffer {
        let mut buf = flat_enriched(220, dec!(100));
        let len = buf.rows().len();
        let rows = buf.rows_mut();
        // Rising zigzag: troughs 100.5/103.5/106.5, peaks 105.5/108.5/114.5,
        // with the final peak far enough from the edge to register as a
        // fractal.
        let pattern = [
            dec!(100), dec!(102), dec!(105), dec!(103), dec!(101), dec!(103), dec!(105),
            dec!(108), dec!(106), dec!(104), dec!(106), dec!(108), dec!(111), dec!(109),
            dec!(107), dec!(114), dec!(112.8), dec!(112.2), dec!(111.8), dec!(111.5),
        ];
        for (i, price) in pattern.iter().enumerate() {
            let r = &mut rows[len - 20 + i];
            r.candle.open = price + dec!(0.2);
            r.candle.close = *price;
            r.candle.high = price + dec!(0.5);
            r.candle.low = price - dec!(0.5);
        }
        // Last bar probes the slow EMA and closes back above it.
        let last = &mut rows[len - 1];
        last.candle.open = dec!(111.2);
        last.candle.close = dec!(112);
        last.candle.high = dec!(112.3);
        last.candle.low = dec!(111.2);
        last.ema_fast = dec!(112.5);
        last.ema_slow = dec!(111.4);
        last.ema_trend = dec!(108);
        last.atr = dec!(2);
        // ATR flat, not contracting.
        buf
    }

    #[test]
    fn test_shallow_pullback_in_uptrend_emits_long() {
        let c = TrendPullback.detect(&pullback_buffer(), &ctx()).unwrap();
        assert_eq!(c.direction, Direction::Long);
        assert_eq!(c.stop_loss, dec!(110.2));
        assert_eq!(c.take_profit, dec!(117));
    }

    #[test]
    fn test_contracting_atr_blocks_entry() {
        let mut buf = pullback_buffer();
        let len = buf.rows().len();
        buf.rows_mut()[len - 3].atr = dec!(3);
        buf.rows_mut()[len - 2].atr = dec!(2.5);
        buf.rows_mut()[len - 1].atr = dec!(2.0);
        assert!(TrendPullback.detect(&buf, &ctx()).is_none());
    }

    #[test]
    fn test_misaligned_emas_block_entry() {
        let mut buf = pullback_buffer();
        let len = buf.rows().len();
        buf.rows_mut()[len - 1].ema_trend = dec!(113);
        assert!(TrendPullback.detect(&buf, &ctx()).is_none());
    }

    #[test]
    fn test_deep_retrace_rejected() {
        let mut buf = pullback_buffer();
        let len = buf.rows().len();
        // Close collapses most of the way back down the leg.
        let last = &mut buf.rows_mut()[len - 1];
        last.candle.close = dec!(109.2);
        last.candle.open = dec!(109.1);
        last.candle.high = dec!(109.5);
        last.candle.low = dec!(108.9);
        last.ema_slow = dec!(109.3);
        assert!(TrendPullback.detect(&buf, &ctx()).is_none());
    }

    #[test]
    fn test_short_history_blocks_strategy() {
        let buf = flat_enriched(150, dec!(100));
        assert!(TrendPullback.detect(&buf, &ctx()).is_none());
    }
}
