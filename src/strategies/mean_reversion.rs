use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::{prologue_ok, Candidate, Strategy, StrategyContext};
use crate::indicators::EnrichedBuffer;
use crate::types::{Direction, HoldHorizon, SignalMetadata, StrategyId};

/// Counter-trend fade of a stretched move: price far from VWAP, RSI at an
/// extreme, and a reversal bar already printing back toward VWAP.
pub struct MeanReversion;

const VWAP_STRETCH_ATR: Decimal = dec!(1.5);
const RSI_UPPER: Decimal = dec!(80);
const RSI_LOWER: Decimal = dec!(20);

impl Strategy for MeanReversion {
    fn id(&self) -> StrategyId {
        StrategyId::MeanReversion
    }

    fn detect(&self, buffer: &EnrichedBuffer, _ctx: &StrategyContext) -> Option<Candidate> {
        if !prologue_ok(buffer, self.min_history()) {
            return None;
        }
        let last = buffer.last();
        let close = last.candle.close;
        if last.atr.is_zero() {
            return None;
        }

        let stretch = close - last.vwap;
        if stretch.abs() <= VWAP_STRETCH_ATR * last.atr {
            return None;
        }

        // Price stretched above VWAP and exhausted -> fade short; mirrored
        // for a stretch below.
        let direction = if stretch > Decimal::ZERO && last.rsi > RSI_UPPER {
            Direction::Short
        } else if stretch < Decimal::ZERO && last.rsi < RSI_LOWER {
            Direction::Long
        } else {
            return None;
        };

        // The last bar must already be turning back toward VWAP.
        if !last.candle.closes_toward(last.vwap) {
            return None;
        }
        match direction {
            Direction::Short if !last.candle.is_bearish() => return None,
            Direction::Long if !last.candle.is_bullish() => return None,
            _ => {}
        }

        let half_atr = dec!(0.5) * last.atr;
        let (stop_loss, take_profit) = match direction {
            Direction::Short => (last.candle.high + half_atr, last.vwap),
            Direction::Long => (last.candle.low - half_atr, last.vwap),
        };

        let extreme_rsi = last.rsi > dec!(85) || last.rsi < dec!(15);
        let confidence = if extreme_rsi { 4 } else { 3 };

        let reasoning = format!(
            "Mean reversion {}: close {:.4} is {:.2} ATR from VWAP {:.4}, RSI {:.1}, reversal bar printed",
            direction,
            close,
            (stretch / last.atr).abs(),
            last.vwap,
            last.rsi,
        );

        Candidate::new(self.id(), direction, close, stop_loss, take_profit, confidence, reasoning)
            .map(|c| c.with_metadata(SignalMetadata::with_horizon(HoldHorizon::Intraday)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::flat_enriched;
    use crate::strategies::test_support::ctx;

    fn stretched_short_buffer() -> EnrichedBuffer {
        let mut buf = flat_enriched(70, dec!(100));
        let len = buf.rows().len();
        let last = &mut buf.rows_mut()[len - 1];
        last.vwap = dec!(100);
        last.atr = dec!(2);
        last.rsi = dec!(83);
        last.candle.open = dec!(105.5);
        last.candle.high = dec!(106);
        last.candle.low = dec!(103.8);
        last.candle.close = dec!(104);
        buf
    }

    #[test]
    fn test_stretched_overbought_fades_short() {
        let c = MeanReversion.detect(&stretched_short_buffer(), &ctx()).unwrap();
        assert_eq!(c.direction, Direction::Short);
        assert_eq!(c.take_profit, dec!(100));
        assert_eq!(c.stop_loss, dec!(107));
    }

    #[test]
    fn test_mild_stretch_ignored() {
        let mut buf = stretched_short_buffer();
        let len = buf.rows().len();
        buf.rows_mut()[len - 1].candle.close = dec!(102);
        assert!(MeanReversion.detect(&buf, &ctx()).is_none());
    }

    #[test]
    fn test_neutral_rsi_ignored() {
        let mut buf = stretched_short_buffer();
        let len = buf.rows().len();
        buf.rows_mut()[len - 1].rsi = dec!(65);
        assert!(MeanReversion.detect(&buf, &ctx()).is_none());
    }

    #[test]
    fn test_no_reversal_bar_no_fade() {
        let mut buf = stretched_short_buffer();
        let len = buf.rows().len();
        // Bar still pushing away from VWAP.
        let last = &mut buf.rows_mut()[len - 1];
        last.candle.open = dec!(103.8);
        last.candle.close = dec!(105.8);
        assert!(MeanReversion.detect(&buf, &ctx()).is_none());
    }

    #[test]
    fn test_extreme_rsi_lifts_confidence() {
        let mut buf = stretched_short_buffer();
        let len = buf.rows().len();
        buf.rows_mut()[len - 1].rsi = dec!(88);
        let c = MeanReversion.detect(&buf, &ctx()).unwrap();
        assert_eq!(c.confidence, 4);
    }
}
