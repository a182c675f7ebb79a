use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::swing::{staircase, swing_points};
use super::{prologue_ok, volume_floor, Candidate, Strategy, StrategyContext};
use crate::indicators::EnrichedBuffer;
use crate::types::{Direction, HoldHorizon, SignalMetadata, StrategyId};

/// ADX, RSI momentum and price structure all pulling the same way: a
/// trending ADX, RSI on the right side of 50 and moving, and the last two
/// swings stepping in the trade direction.
pub struct TrendConfluence;

const ADX_FLOOR: Decimal = dec!(20);
const ADX_STRONG: Decimal = dec!(25);
const RSI_STEP: Decimal = dec!(3);
const CONFLUENCE_VOLUME: Decimal = dec!(1.2);
const SWING_LOOKBACK: usize = 40;
const FRACTAL_K: usize = 2;

impl Strategy for TrendConfluence {
    fn id(&self) -> StrategyId {
        StrategyId::TrendConfluence
    }

    fn detect(&self, buffer: &EnrichedBuffer, ctx: &StrategyContext) -> Option<Candidate> {
        if !prologue_ok(buffer, self.min_history()) {
            return None;
        }
        let last = buffer.last();
        let prev3 = buffer.from_end(3)?;
        let close = last.candle.close;

        if last.adx < ADX_FLOOR {
            return None;
        }

        // RSI side of 50 picks the direction; it must also have moved at
        // least RSI_STEP points across the last three bars that way.
        let rsi_delta = last.rsi - prev3.rsi;
        let direction = if last.rsi > dec!(50) && rsi_delta >= RSI_STEP {
            Direction::Long
        } else if last.rsi < dec!(50) && rsi_delta <= -RSI_STEP {
            Direction::Short
        } else {
            return None;
        };

        if last.volume_ratio < volume_floor(CONFLUENCE_VOLUME, &ctx.overrides) {
            return None;
        }

        // Price structure: the last two swings must step the same way.
        let points = swing_points(buffer.last_n(SWING_LOOKBACK), FRACTAL_K);
        if !staircase(&points, 2, direction == Direction::Long) {
            return None;
        }

        let adx_rising = last.adx > buffer.from_end(1)?.adx;
        let mut confidence = if last.adx >= ADX_STRONG { 5 } else { 4 };
        if !adx_rising {
            confidence -= 1;
        }

        let sl_distance = dec!(1.5) * last.atr;
        let tp_distance = dec!(2.5) * last.atr;
        let (stop_loss, take_profit) = match direction {
            Direction::Long => (close - sl_distance, close + tp_distance),
            Direction::Short => (close + sl_distance, close - tp_distance),
        };

        let reasoning = format!(
            "Trend confluence {}: ADX {:.1}{}, RSI {:.1} moved {:+.1} over 3 bars, swings aligned, volume x{:.2}",
            direction,
            last.adx,
            if adx_rising { " rising" } else { "" },
            last.rsi,
            rsi_delta,
            last.volume_ratio,
        );

        Candidate::new(self.id(), direction, close, stop_loss, take_profit, confidence, reasoning)
            .map(|c| c.with_metadata(SignalMetadata::with_horizon(HoldHorizon::MultiDay)))
    }
}
