use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::swing::{cluster_levels, near_level, near_round_number, swing_points, PriceLevel};
use super::{prologue_ok, Candidate, Strategy, StrategyContext};
use crate::indicators::EnrichedBuffer;
use crate::types::{Direction, HoldHorizon, SignalMetadata, StrategyId};

/// Bounce from clustered swing-point levels. Levels need at least two
/// touches; round-number levels are trusted more.
pub struct SupportResistance;

const LOOKBACK: usize = 100;
const FRACTAL_K: usize = 5;
const MIN_TOUCHES: usize = 2;

impl SupportResistance {
    fn qualified_levels(buffer: &EnrichedBuffer, tolerance_pct: Decimal) -> Vec<PriceLevel> {
        let rows = buffer.last_n(LOOKBACK);
        let points = swing_points(rows, FRACTAL_K);
        cluster_levels(&points, tolerance_pct)
            .into_iter()
            .filter(|l| l.touches >= MIN_TOUCHES)
            .collect()
    }
}

impl Strategy for SupportResistance {
    fn id(&self) -> StrategyId {
        StrategyId::SupportResistance
    }

    fn detect(&self, buffer: &EnrichedBuffer, ctx: &StrategyContext) -> Option<Candidate> {
        if !prologue_ok(buffer, self.min_history()) {
            return None;
        }
        let last = buffer.last();
        let close = last.candle.close;
        let tolerance = ctx.overrides.level_tolerance_pct;

        let levels = Self::qualified_levels(buffer, tolerance);
        if levels.is_empty() {
            return None;
        }

        // Bounce off support: the bar probed the level and closed back
        // above it. Rejection at resistance is the mirror image.
        let mut candidate: Option<(Direction, &PriceLevel)> = None;
        for level in &levels {
            if near_level(last.candle.low, level.price, tolerance) && close > level.price {
                candidate = Some((Direction::Long, level));
                break;
            }
            if near_level(last.candle.high, level.price, tolerance) && close < level.price {
                candidate = Some((Direction::Short, level));
                break;
            }
        }
        let (direction, level) = candidate?;

        let half_atr = dec!(0.5) * last.atr;
        // Target the next qualified level on the far side; fall back to a
        // two-ATR projection when the map is empty there.
        let (stop_loss, take_profit) = match direction {
            Direction::Long => {
                let target = levels
                    .iter()
                    .map(|l| l.price)
                    .filter(|p| *p > close)
                    .fold(None::<Decimal>, |acc, p| Some(acc.map_or(p, |a| a.min(p))))
                    .unwrap_or(close + dec!(2) * last.atr);
                (level.price - half_atr, target)
            }
            Direction::Short => {
                let target = levels
                    .iter()
                    .map(|l| l.price)
                    .filter(|p| *p < close)
                    .fold(None::<Decimal>, |acc, p| Some(acc.map_or(p, |a| a.max(p))))
                    .unwrap_or(close - dec!(2) * last.atr);
                (level.price + half_atr, target)
            }
        };

        let round = near_round_number(level.price, ctx.symbol.round_unit(), tolerance);
        let mut confidence = 3;
        if round {
            confidence += 1;
        }
        if level.touches >= 3 {
            confidence += 1;
        }

        let reasoning = format!(
            "{} at {}-touch level {:.4}{}, close {:.4}",
            if direction == Direction::Long { "Support bounce" } else { "Resistance rejection" },
            level.touches,
            level.price,
            if round { " (round number)" } else { "" },
            close,
        );

        let mut metadata = SignalMetadata::with_horizon(HoldHorizon::MultiDay);
        metadata.insert("level_price", level.price);
        metadata.insert("level_touches", level.touches);

        Candidate::new(self.id(), direction, close, stop_loss, take_profit, confidence, reasoning)
            .map(|c| c.with_metadata(metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::flat_enriched;
    use crate::strategies::test_support::ctx;

    /// Two valleys to 1000 (support touches) and a ridge at 1030 between
    /// them, with the last bar probing support and closing back above.
    fn bounce_buffer() -> EnrichedBuffer {
        let mut buf = flat_enriched(80, dec!(1015));
        let len = buf.rows().len();
        let rows = buf.rows_mut();
        let shape = |r: &mut crate::indicators::EnrichedCandle, low: Decimal, high: Decimal| {
            r.candle.low = low;
            r.candle.high = high;
            r.candle.open = (low + high) / dec!(2);
            r.candle.close = (low + high) / dec!(2);
        };
        for r in rows[len - 70..len].iter_mut() {
            shape(r, dec!(1014), dec!(1016));
        }
        // First valley.
        shape(&mut rows[len - 60], dec!(1000), dec!(1012));
        // Two ridge touches so resistance qualifies as a level too.
        shape(&mut rows[len - 45], dec!(1020), dec!(1030));
        shape(&mut rows[len - 15], dec!(1020), dec!(1030));
        // Second valley, clustering with the first.
        shape(&mut rows[len - 30], dec!(1001), dec!(1012));
        // Probe of the level and a close back above it.
        let last = &mut rows[len - 1];
        last.candle.low = dec!(1001.5);
        last.candle.open = dec!(1003);
        last.candle.close = dec!(1005);
        last.candle.high = dec!(1006);
        last.atr = dec!(4);
        buf
    }

    #[test]
    fn test_support_bounce_targets_opposing_level() {
        let c = SupportResistance.detect(&bounce_buffer(), &ctx()).unwrap();
        assert_eq!(c.direction, Direction::Long);
        // Cluster mean of 1000 and 1001, stop half an ATR below it.
        assert_eq!(c.stop_loss, dec!(998.5));
        assert_eq!(c.take_profit, dec!(1030));
        // Two touches + round-number 1000 level.
        assert_eq!(c.confidence, 4);
    }

    #[test]
    fn test_single_touch_level_ignored() {
        let mut buf = bounce_buffer();
        let len = buf.rows().len();
        // Erase the second valley; support now has one touch.
        let r = &mut buf.rows_mut()[len - 30];
        r.candle.low = dec!(1014);
        r.candle.high = dec!(1016);
        assert!(SupportResistance.detect(&buf, &ctx()).is_none());
    }

    #[test]
    fn test_close_below_support_is_not_a_bounce() {
        let mut buf = bounce_buffer();
        let len = buf.rows().len();
        let last = &mut buf.rows_mut()[len - 1];
        last.candle.close = dec!(999);
        last.candle.low = dec!(998.5);
        assert!(SupportResistance.detect(&buf, &ctx()).is_none());
    }
}
