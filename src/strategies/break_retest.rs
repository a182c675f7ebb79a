use chrono::Datelike;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::swing::near_level;
use super::{prologue_ok, volume_floor, Candidate, Strategy, StrategyContext};
use crate::indicators::{EnrichedBuffer, EnrichedCandle};
use crate::types::{Direction, HoldHorizon, SignalMetadata, StrategyId};

/// Break of a key reference level (prior day/week extremes, round numbers)
/// on volume, followed by a retest that respects the broken level. The
/// entry bar is the retest confirmation itself.
pub struct BreakRetest;

const BREAK_LOOKBACK: usize = 12;
const RETEST_MAX_BARS: usize = 10;
const BREAK_VOLUME: Decimal = dec!(1.5);

#[derive(Debug, Clone)]
struct KeyLevel {
    price: Decimal,
    label: &'static str,
}

impl BreakRetest {
    fn key_levels(buffer: &EnrichedBuffer, ctx: &StrategyContext) -> Vec<KeyLevel> {
        let rows = buffer.rows();
        let last = buffer.last();
        let today = last.candle.open_time.date_naive();
        let this_week = last.candle.open_time.iso_week();

        let mut levels = Vec::new();
        let mut push_extremes = |bars: Vec<&EnrichedCandle>, high_label, low_label| {
            if bars.is_empty() {
                return;
            }
            if let Some(high) = bars.iter().map(|r| r.candle.high).max() {
                levels.push(KeyLevel { price: high, label: high_label });
            }
            if let Some(low) = bars.iter().map(|r| r.candle.low).min() {
                levels.push(KeyLevel { price: low, label: low_label });
            }
        };

        let prior_day = rows
            .iter()
            .filter(|r| r.candle.open_time.date_naive() < today)
            .map(|r| r.candle.open_time.date_naive())
            .max();
        if let Some(day) = prior_day {
            push_extremes(
                rows.iter()
                    .filter(|r| r.candle.open_time.date_naive() == day)
                    .collect(),
                "prior day high",
                "prior day low",
            );
        }

        push_extremes(
            rows.iter()
                .filter(|r| {
                    let week = r.candle.open_time.iso_week();
                    week != this_week && r.candle.open_time < last.candle.open_time
                })
                .collect(),
            "prior week high",
            "prior week low",
        );

        // Round numbers bracketing the current price.
        let unit = ctx.symbol.round_unit();
        if !unit.is_zero() {
            let below = (last.candle.close / unit).floor() * unit;
            levels.push(KeyLevel { price: below, label: "round number" });
            levels.push(KeyLevel { price: below + unit, label: "round number" });
        }

        levels.retain(|l| l.price > Decimal::ZERO);
        levels
    }

    /// Find a volume-backed close through `level` within the lookback, and
    /// check every later bar kept the break honest.
    fn confirm(
        buffer: &EnrichedBuffer,
        level: &KeyLevel,
        direction: Direction,
        floor: Decimal,
        tolerance: Decimal,
    ) -> Option<usize> {
        let len = buffer.len();
        let start = len.saturating_sub(BREAK_LOOKBACK);
        let rows = buffer.rows();

        let mut break_idx = None;
        for i in start.max(1)..len - 1 {
            let through = match direction {
                Direction::Long => {
                    rows[i - 1].candle.close <= level.price && rows[i].candle.close > level.price
                }
                Direction::Short => {
                    rows[i - 1].candle.close >= level.price && rows[i].candle.close < level.price
                }
            };
            if through && rows[i].volume_ratio >= floor {
                break_idx = Some(i);
            }
        }
        let break_idx = break_idx?;
        if len - 1 - break_idx > RETEST_MAX_BARS {
            return None;
        }

        // A close back through the level voids the break.
        for row in &rows[break_idx + 1..len] {
            let failed = match direction {
                Direction::Long => row.candle.close < level.price,
                Direction::Short => row.candle.close > level.price,
            };
            if failed {
                return None;
            }
        }

        // The last bar must be the retest: it touched the level zone and
        // closed onward in the break direction.
        let last = buffer.last();
        let touched = match direction {
            Direction::Long => {
                near_level(last.candle.low, level.price, tolerance)
                    || last.candle.low <= level.price
            }
            Direction::Short => {
                near_level(last.candle.high, level.price, tolerance)
                    || last.candle.high >= level.price
            }
        };
        if !touched {
            return None;
        }
        Some(break_idx)
    }
}

impl Strategy for BreakRetest {
    fn id(&self) -> StrategyId {
        StrategyId::BreakRetest
    }

    fn detect(&self, buffer: &EnrichedBuffer, ctx: &StrategyContext) -> Option<Candidate> {
        if !prologue_ok(buffer, self.min_history()) {
            return None;
        }
        let last = buffer.last();
        let close = last.candle.close;
        let floor = volume_floor(BREAK_VOLUME, &ctx.overrides);
        let tolerance = ctx.overrides.level_tolerance_pct;

        for level in Self::key_levels(buffer, ctx) {
            let direction = if close > level.price {
                Direction::Long
            } else if close < level.price {
                Direction::Short
            } else {
                continue;
            };

            let Some(break_idx) = Self::confirm(buffer, &level, direction, floor, tolerance)
            else {
                continue;
            };
            let break_row = &buffer.rows()[break_idx];

            let half_atr = dec!(0.5) * last.atr;
            let tp_distance = dec!(2.0) * last.atr;
            let (stop_loss, take_profit) = match direction {
                Direction::Long => (level.price - half_atr, close + tp_distance),
                Direction::Short => (level.price + half_atr, close - tp_distance),
            };

            let confidence = if break_row.volume_ratio >= dec!(2.0) { 4 } else { 3 };
            let reasoning = format!(
                "Break and retest {} of {} {:.4}: break on volume x{:.2}, retest respected at {:.4}",
                direction, level.label, level.price, break_row.volume_ratio, close,
            );

            let mut metadata = SignalMetadata::with_horizon(HoldHorizon::MultiDay);
            metadata.insert("level_price", level.price);
            metadata.insert("level_kind", level.label);

            if let Some(candidate) = Candidate::new(
                self.id(),
                direction,
                close,
                stop_loss,
                take_profit,
                confidence,
                reasoning,
            ) {
                return Some(candidate.with_metadata(metadata));
            }
        }
        None
    }
}
