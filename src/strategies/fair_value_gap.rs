use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::swing::{last_swing, swing_points, SwingKind};
use super::{prologue_ok, volume_floor, Candidate, Strategy, StrategyContext};
use crate::indicators::EnrichedBuffer;
use crate::types::{Direction, HoldHorizon, SignalMetadata, StrategyId, TimeFrame};

/// Three-bar imbalance combined with a market-structure break and a volume
/// spike. The hold-period classification rides along as metadata; the
/// tracker's expiry rule stays authoritative.
pub struct FairValueGap;

const GAP_SCAN_BARS: usize = 20;
const MIN_GAP_PCT: Decimal = dec!(0.1);
const FVG_VOLUME: Decimal = dec!(1.2);
const FRACTAL_K: usize = 3;
const STRUCTURE_LOOKBACK: usize = 60;

/// TP multiple and advisory horizon by timeframe bucket.
fn regime_for(timeframe: TimeFrame) -> (Decimal, HoldHorizon) {
    match timeframe {
        TimeFrame::M1 | TimeFrame::M5 => (dec!(2.0), HoldHorizon::Intraday),
        TimeFrame::M15 | TimeFrame::H1 => (dec!(2.5), HoldHorizon::MultiDay),
        TimeFrame::H4 | TimeFrame::D1 => (dec!(3.75), HoldHorizon::MultiWeek),
    }
}

struct Gap {
    direction: Direction,
    /// Near edge of the imbalance (closest to current price).
    upper: Decimal,
    /// Far edge, used to anchor the stop.
    lower: Decimal,
    size_pct: Decimal,
}

impl FairValueGap {
    /// Most recent three-bar imbalance within the scan window.
    fn find_gap(buffer: &EnrichedBuffer) -> Option<Gap> {
        let rows = buffer.rows();
        let len = rows.len();
        let start = len.saturating_sub(GAP_SCAN_BARS).max(2);

        for i in (start..len).rev() {
            let close = rows[i].candle.close;
            if close.is_zero() {
                continue;
            }
            let low_i = rows[i].candle.low;
            let high_i2 = rows[i - 2].candle.high;
            // Bullish: the middle bar drove hard enough that bar i's low
            // never overlapped bar i-2's high.
            if low_i > high_i2 {
                let size_pct = (low_i - high_i2) / close * dec!(100);
                if size_pct >= MIN_GAP_PCT {
                    return Some(Gap {
                        direction: Direction::Long,
                        upper: low_i,
                        lower: high_i2,
                        size_pct,
                    });
                }
            }
            let high_i = rows[i].candle.high;
            let low_i2 = rows[i - 2].candle.low;
            if high_i < low_i2 {
                let size_pct = (low_i2 - high_i) / close * dec!(100);
                if size_pct >= MIN_GAP_PCT {
                    return Some(Gap {
                        direction: Direction::Short,
                        upper: low_i2,
                        lower: high_i,
                        size_pct,
                    });
                }
            }
        }
        None
    }
}

impl Strategy for FairValueGap {
    fn id(&self) -> StrategyId {
        StrategyId::FairValueGap
    }

    fn detect(&self, buffer: &EnrichedBuffer, ctx: &StrategyContext) -> Option<Candidate> {
        if !prologue_ok(buffer, self.min_history()) {
            return None;
        }
        let last = buffer.last();
        let close = last.candle.close;

        let gap = Self::find_gap(buffer)?;

        // Structure break in the gap direction: a close beyond the latest
        // swing extreme.
        let points = swing_points(buffer.last_n(STRUCTURE_LOOKBACK), FRACTAL_K);
        let broke_structure = match gap.direction {
            Direction::Long => {
                let swing_high = last_swing(&points, SwingKind::High)?;
                close > swing_high.price
            }
            Direction::Short => {
                let swing_low = last_swing(&points, SwingKind::Low)?;
                close < swing_low.price
            }
        };
        if !broke_structure {
            return None;
        }

        if last.volume_ratio < volume_floor(FVG_VOLUME, &ctx.overrides) {
            return None;
        }

        let (tp_multiple, horizon) = regime_for(ctx.timeframe);
        let half_atr = dec!(0.5) * last.atr;
        let (stop_loss, take_profit) = match gap.direction {
            Direction::Long => (gap.lower - half_atr, close + tp_multiple * last.atr),
            Direction::Short => (gap.upper + half_atr, close - tp_multiple * last.atr),
        };

        let reasoning = format!(
            "FVG {}: {:.2}% imbalance {:.4}..{:.4} with structure break at {:.4}, volume x{:.2}",
            gap.direction, gap.size_pct, gap.lower, gap.upper, close, last.volume_ratio,
        );

        let mut metadata = SignalMetadata::with_horizon(horizon);
        metadata.insert("gap_pct", gap.size_pct);
        metadata.insert("hold_period", horizon.as_str());

        Candidate::new(
            self.id(),
            gap.direction,
            close,
            stop_loss,
            take_profit,
            4,
            reasoning,
        )
        .map(|c| c.with_metadata(metadata))
    }
}
