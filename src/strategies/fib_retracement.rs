use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::swing::{last_swing, swing_points, SwingKind};
use super::{prologue_ok, Candidate, Strategy, StrategyContext};
use crate::indicators::EnrichedBuffer;
use crate::types::{Direction, HoldHorizon, SignalMetadata, StrategyId};

/// Retracement of the latest fractal swing leg into a Fibonacci level,
/// entered on a reversal bar with volume behind it. The golden ratios
/// carry full confidence.
pub struct FibRetracement;

const LOOKBACK: usize = 50;
const FRACTAL_K: usize = 5;
const MIN_RISK_REWARD: Decimal = dec!(1.5);

struct FibLevel {
    ratio: Decimal,
    confidence: u8,
}

const LEVELS: [FibLevel; 5] = [
    FibLevel { ratio: dec!(0.236), confidence: 3 },
    FibLevel { ratio: dec!(0.382), confidence: 5 },
    FibLevel { ratio: dec!(0.5), confidence: 4 },
    FibLevel { ratio: dec!(0.618), confidence: 5 },
    FibLevel { ratio: dec!(0.786), confidence: 3 },
];

impl Strategy for FibRetracement {
    fn id(&self) -> StrategyId {
        StrategyId::FibRetracement
    }

    fn detect(&self, buffer: &EnrichedBuffer, ctx: &StrategyContext) -> Option<Candidate> {
        if !prologue_ok(buffer, self.min_history()) {
            return None;
        }
        let rows = buffer.last_n(LOOKBACK);
        let points = swing_points(rows, FRACTAL_K);
        let swing_high = last_swing(&points, SwingKind::High)?;
        let swing_low = last_swing(&points, SwingKind::Low)?;
        let leg = swing_high.price - swing_low.price;
        if leg <= Decimal::ZERO {
            return None;
        }

        let last = buffer.last();
        let close = last.candle.close;
        // Leg direction: the more recent extreme tells us what is being
        // retraced.
        let uptrend = swing_high.index > swing_low.index;
        let direction = if uptrend { Direction::Long } else { Direction::Short };

        let tolerance = ctx.overrides.level_tolerance_pct;
        let mut matched: Option<(&FibLevel, Decimal)> = None;
        for level in &LEVELS {
            let price = if uptrend {
                swing_high.price - level.ratio * leg
            } else {
                swing_low.price + level.ratio * leg
            };
            if super::swing::near_level(close, price, tolerance) {
                matched = Some((level, price));
                break;
            }
        }
        let (level, level_price) = matched?;

        // Reversal bar back in the trend direction, with participation.
        match direction {
            Direction::Long if !last.candle.is_bullish() => return None,
            Direction::Short if !last.candle.is_bearish() => return None,
            _ => {}
        }
        if last.volume_ratio < ctx.overrides.volume_threshold {
            return None;
        }

        // Stop one level deeper; the swing extreme backstops the deepest.
        let next_ratio = LEVELS
            .iter()
            .map(|l| l.ratio)
            .filter(|r| *r > level.ratio)
            .fold(None::<Decimal>, |acc, r| Some(acc.map_or(r, |a| a.min(r))));
        let (stop_loss, take_profit) = if uptrend {
            let stop = match next_ratio {
                Some(r) => swing_high.price - r * leg,
                None => swing_low.price,
            };
            (stop, swing_high.price)
        } else {
            let stop = match next_ratio {
                Some(r) => swing_low.price + r * leg,
                None => swing_high.price,
            };
            (stop, swing_low.price)
        };

        let candidate = Candidate::new(
            self.id(),
            direction,
            close,
            stop_loss,
            take_profit,
            level.confidence,
            format!(
                "Fib {} retrace to {:.1}% ({:.4}) of leg {:.4}..{:.4}, reversal bar on volume x{:.2}",
                direction,
                level.ratio * dec!(100),
                level_price,
                swing_low.price,
                swing_high.price,
                last.volume_ratio,
            ),
        )?;

        if candidate.risk_reward() < MIN_RISK_REWARD {
            return None;
        }

        let mut metadata = SignalMetadata::with_horizon(HoldHorizon::MultiDay);
        metadata.insert("fib_ratio", level.ratio);
        metadata.insert("level_price", level_price);
        Some(candidate.with_metadata(metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::flat_enriched;
    use crate::strategies::test_support::ctx;

    /// Uptrend leg 99.8 -> 120 with clean fractals at both ends, then a
    /// fade back to the level under test where a bullish bar prints.
    fn retrace_buffer(close: Decimal) -> EnrichedBuffer {
        let mut buf = flat_enriched(70, dec!(100));
        let len = buf.rows().len();
        let rows = buf.rows_mut();
        let shape = |r: &mut crate::indicators::EnrichedCandle, low: Decimal, high: Decimal| {
            r.candle.low = low;
            r.candle.high = high;
            r.candle.open = (low + high) / dec!(2);
            r.candle.close = (low + high) / dec!(2);
        };
        // Quiet shelf before the trough.
        for r in rows[len - 50..len - 30].iter_mut() {
            shape(r, dec!(101), dec!(103));
        }
        // Trough with its fractal low at 99.8.
        for r in rows[len - 30..len - 25].iter_mut() {
            shape(r, dec!(100), dec!(102));
        }
        rows[len - 28].candle.low = dec!(99.8);
        // Base of the leg.
        for r in rows[len - 25..len - 20].iter_mut() {
            shape(r, dec!(100.5), dec!(104));
        }
        // Ascent into the swing high at 120.
        for (i, high) in [104, 108, 112, 116, 120].iter().enumerate() {
            let h = Decimal::from(*high as u32);
            shape(&mut rows[len - 20 + i], h - dec!(2), h);
        }
        // Fade back off the high.
        for r in rows[len - 15..len].iter_mut() {
            shape(r, dec!(111), dec!(116));
        }
        let last = &mut rows[len - 1];
        last.candle.open = close - dec!(0.4);
        last.candle.close = close;
        last.candle.low = close - dec!(0.6);
        last.candle.high = close + dec!(0.2);
        last.volume_ratio = dec!(1.5);
        buf
    }

    #[test]
    fn test_golden_ratio_retrace_emits_with_full_confidence() {
        // 38.2% of the 99.8..120 leg: 120 - 0.382 * 20.2 = 112.2836
        let c = FibRetracement.detect(&retrace_buffer(dec!(112.3)), &ctx());
        let c = c.unwrap();
        assert_eq!(c.direction, Direction::Long);
        assert_eq!(c.confidence, 5);
        assert_eq!(c.take_profit, dec!(120));
        // Stop at the 50% level below.
        assert!(c.stop_loss < dec!(112.3) && c.stop_loss > dec!(109));
    }

    #[test]
    fn test_price_between_levels_no_signal() {
        assert!(FibRetracement.detect(&retrace_buffer(dec!(113.8)), &ctx()).is_none());
    }

    #[test]
    fn test_bearish_bar_blocks_long_retrace() {
        let mut buf = retrace_buffer(dec!(112.3));
        let len = buf.rows().len();
        let last = &mut buf.rows_mut()[len - 1];
        last.candle.open = dec!(112.7);
        last.candle.close = dec!(112.3);
        last.candle.high = dec!(112.9);
        assert!(FibRetracement.detect(&buf, &ctx()).is_none());
    }
}
