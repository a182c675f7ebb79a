use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::{prologue_ok, volume_floor, Candidate, Strategy, StrategyContext};
use crate::indicators::EnrichedBuffer;
use crate::types::{Direction, HoldHorizon, SignalMetadata, StrategyId};

/// Breakout from a compressed EMA band: the fast/slow pair squeezed tight
/// for a stretch of bars, then a close outside the cloud on expanding
/// volume.
pub struct EmaCloudBreakout;

const SQUEEZE_BARS: usize = 10;
const SQUEEZE_WIDTH_ATR: Decimal = dec!(0.5);
const BREAKOUT_VOLUME: Decimal = dec!(1.4);

impl Strategy for EmaCloudBreakout {
    fn id(&self) -> StrategyId {
        StrategyId::EmaCloudBreakout
    }

    fn detect(&self, buffer: &EnrichedBuffer, ctx: &StrategyContext) -> Option<Candidate> {
        if !prologue_ok(buffer, self.min_history()) {
            return None;
        }
        let last = buffer.last();
        let close = last.candle.close;

        // The squeeze is measured on the bars before the breakout bar.
        for n in 1..=SQUEEZE_BARS {
            let row = buffer.from_end(n)?;
            let width = (row.ema_fast - row.ema_slow).abs();
            if width >= SQUEEZE_WIDTH_ATR * row.atr {
                return None;
            }
        }

        let cloud_top = last.ema_fast.max(last.ema_slow);
        let cloud_bottom = last.ema_fast.min(last.ema_slow);
        let direction = if close > cloud_top {
            Direction::Long
        } else if close < cloud_bottom {
            Direction::Short
        } else {
            return None;
        };

        if last.volume_ratio < volume_floor(BREAKOUT_VOLUME, &ctx.overrides) {
            return None;
        }

        let half_atr = dec!(0.5) * last.atr;
        let tp_distance = dec!(2.0) * last.atr;
        let (stop_loss, take_profit) = match direction {
            Direction::Long => (cloud_bottom - half_atr, close + tp_distance),
            Direction::Short => (cloud_top + half_atr, close - tp_distance),
        };

        let reasoning = format!(
            "Cloud breakout {}: {} bars squeezed under {:.2} ATR, close {:.4} left band {:.4}..{:.4} on volume x{:.2}",
            direction,
            SQUEEZE_BARS,
            SQUEEZE_WIDTH_ATR,
            close,
            cloud_bottom,
            cloud_top,
            last.volume_ratio,
        );

        Candidate::new(self.id(), direction, close, stop_loss, take_profit, 3, reasoning)
            .map(|c| c.with_metadata(SignalMetadata::with_horizon(HoldHorizon::Intraday)))
    }
}
