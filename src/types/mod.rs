pub mod candle;
pub mod market;
pub mod signal;
pub mod trade;

pub use candle::*;
pub use market::*;
pub use signal::*;
pub use trade::*;

/// Shared builders for unit tests across modules.
#[cfg(test)]
pub mod test_support {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    pub fn sample_snapshot() -> IndicatorSnapshot {
        IndicatorSnapshot {
            ema_fast: dec!(100.5),
            ema_slow: dec!(100.2),
            ema_trend: dec!(99.8),
            rsi: dec!(58),
            adx: dec!(24),
            atr: dec!(1.2),
            vwap: dec!(100.1),
            volume_ratio: dec!(1.5),
        }
    }

    pub fn sample_signal() -> Signal {
        Signal {
            id: Uuid::new_v4(),
            symbol: Symbol::parse("BTC"),
            timeframe: TimeFrame::M5,
            direction: Direction::Long,
            strategy: StrategyId::EmaCrossover,
            entry_price: dec!(100),
            stop_loss: dec!(99),
            take_profit: dec!(101),
            risk_reward: dec!(1),
            confidence: 3,
            confluence: vec![
                ConfluenceFactor::PriceVsVwap,
                ConfluenceFactor::VolumeSpike,
                ConfluenceFactor::RsiBand,
            ],
            reasoning: "test signal".to_string(),
            snapshot: sample_snapshot(),
            metadata: SignalMetadata::with_horizon(HoldHorizon::Intraday),
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            bypassed_filter: false,
        }
    }

    /// Build a flat candle series at `base` price, one per `timeframe`
    /// interval, ending at `end`.
    pub fn flat_candles(
        n: usize,
        base: Decimal,
        timeframe: TimeFrame,
        end: chrono::DateTime<Utc>,
    ) -> Vec<Candle> {
        let step = timeframe.interval();
        (0..n)
            .map(|i| {
                let open_time = end - step * ((n - 1 - i) as i32);
                Candle {
                    open_time,
                    open: base,
                    high: base + dec!(0.5),
                    low: base - dec!(0.5),
                    close: base,
                    volume: dec!(100),
                }
            })
            .collect()
    }
}
