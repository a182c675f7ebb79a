#![allow(dead_code)]
use rust_decimal::Decimal;

use super::{sma, Adx, Atr, Ema, Rsi, Stochastic, VolumeMa, Vwap};
use crate::config::IndicatorSettings;
use crate::error::ScannerError;
use crate::types::{Candle, CandleBuffer, IndicatorSnapshot, TimeFrame};

/// How many enriched rows must survive warmup for the buffer to be usable.
pub const MIN_ENRICHED_ROWS: usize = 50;

/// A candle with every computed indicator attached. Fields that are part
/// of the critical set are plain values because warmup rows are dropped;
/// long-period and optional indicators stay `Option`.
#[derive(Debug, Clone)]
pub struct EnrichedCandle {
    pub candle: Candle,
    pub ema_fast: Decimal,
    pub ema_slow: Decimal,
    pub ema_trend: Decimal,
    pub ema_long: Option<Decimal>,
    pub atr: Decimal,
    /// 20-bar mean of ATR, for the volatility ratio.
    pub atr_ma: Decimal,
    pub rsi: Decimal,
    pub adx: Decimal,
    pub plus_di: Decimal,
    pub minus_di: Decimal,
    pub volume_ma: Decimal,
    pub volume_ratio: Decimal,
    pub vwap: Decimal,
    pub stoch: Option<(Decimal, Decimal)>,
}

/// Indicator-enriched candle sequence for one (symbol, timeframe) fetch.
/// Guaranteed non-empty with at least [`MIN_ENRICHED_ROWS`] rows.
#[derive(Debug, Clone)]
pub struct EnrichedBuffer {
    pub timeframe: TimeFrame,
    pub is_fresh: bool,
    candles: Vec<EnrichedCandle>,
}

impl EnrichedBuffer {
    /// Assemble a buffer from precomputed rows. Used by the engine and by
    /// synthetic fixtures; rows must be non-empty and time-ordered.
    pub fn from_rows(timeframe: TimeFrame, is_fresh: bool, candles: Vec<EnrichedCandle>) -> Self {
        debug_assert!(!candles.is_empty());
        Self {
            timeframe,
            is_fresh,
            candles,
        }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn rows(&self) -> &[EnrichedCandle] {
        &self.candles
    }

    /// Test-only hook for sculpting fixture buffers; production code treats
    /// an enriched buffer as immutable.
    #[cfg(test)]
    pub fn rows_mut(&mut self) -> &mut [EnrichedCandle] {
        &mut self.candles
    }

    pub fn last(&self) -> &EnrichedCandle {
        &self.candles[self.candles.len() - 1]
    }

    /// Row counting back from the newest: `from_end(0)` is the last row.
    pub fn from_end(&self, n: usize) -> Option<&EnrichedCandle> {
        self.candles.len().checked_sub(n + 1).map(|i| &self.candles[i])
    }

    pub fn last_n(&self, n: usize) -> &[EnrichedCandle] {
        let len = self.candles.len();
        if n >= len {
            &self.candles
        } else {
            &self.candles[len - n..]
        }
    }

    /// Raw candles back out, for re-enrichment or reporting.
    pub fn raw(&self) -> CandleBuffer {
        CandleBuffer::from_candles(self.candles.iter().map(|c| c.candle.clone()).collect())
    }

    pub fn snapshot(&self) -> IndicatorSnapshot {
        let last = self.last();
        IndicatorSnapshot {
            ema_fast: last.ema_fast,
            ema_slow: last.ema_slow,
            ema_trend: last.ema_trend,
            rsi: last.rsi,
            adx: last.adx,
            atr: last.atr,
            vwap: last.vwap,
            volume_ratio: last.volume_ratio,
        }
    }
}

/// Smallest input the engine accepts for the given parameters: enough bars
/// to warm up every critical indicator plus the minimum surviving rows.
pub fn min_rows(params: &IndicatorSettings, timeframe: TimeFrame) -> usize {
    let warmup = params
        .ema_trend
        .max(params.atr_period + 1)
        .max(params.rsi_period(timeframe) + 1)
        .max(2 * params.adx_period + 1)
        .max(params.volume_ma_period);
    warmup + MIN_ENRICHED_ROWS
}

/// Compute the full indicator set over `buffer`. The input is never
/// mutated; malformed input fails loudly instead of propagating silent
/// garbage downstream.
pub fn enrich(
    buffer: &CandleBuffer,
    params: &IndicatorSettings,
    timeframe: TimeFrame,
    is_fresh: bool,
) -> Result<EnrichedBuffer, ScannerError> {
    validate(buffer, params, timeframe)?;

    let mut ema_fast = Ema::new(params.ema_fast);
    let mut ema_slow = Ema::new(params.ema_slow);
    let mut ema_trend = Ema::new(params.ema_trend);
    let mut ema_long = Ema::new(params.ema_long);
    let mut atr = Atr::new(params.atr_period);
    let mut rsi = Rsi::new(params.rsi_period(timeframe));
    let mut adx = Adx::new(params.adx_period);
    let mut volume_ma = VolumeMa::new(params.volume_ma_period);
    let mut vwap = Vwap::new(params.vwap_reset);
    let mut stoch = params
        .stochastic_enabled
        .then(|| Stochastic::new(params.stoch_k, params.stoch_d, params.stoch_smooth));

    let mut atr_history: Vec<Decimal> = Vec::with_capacity(buffer.len());
    let mut rows = Vec::with_capacity(buffer.len());

    for candle in &buffer.candles {
        let fast = ema_fast.update(candle.close);
        let slow = ema_slow.update(candle.close);
        let trend = ema_trend.update(candle.close);
        let long = ema_long.update(candle.close);
        let atr_v = atr.update(candle.high, candle.low, candle.close);
        let rsi_v = rsi.update(candle.close);
        let adx_v = adx.update(candle.high, candle.low, candle.close);
        let vol_ma = volume_ma.update(candle.volume);
        let vwap_v = vwap.update(
            candle.open_time,
            candle.high,
            candle.low,
            candle.close,
            candle.volume,
        );
        let stoch_v = stoch.as_mut().and_then(|s| s.update(candle.high, candle.low, candle.close));

        if let Some(a) = atr_v {
            atr_history.push(a);
        }

        // Warmup rows where any critical indicator is still undefined are
        // dropped from the output.
        let (Some(fast), Some(slow), Some(trend), Some(atr_v), Some(rsi_v), Some(adx_v), Some(vol_ma), Some(vwap_v)) =
            (fast, slow, trend, atr_v, rsi_v, adx_v, vol_ma, vwap_v)
        else {
            continue;
        };

        let atr_ma = sma(&atr_history, 20.min(atr_history.len())).unwrap_or(atr_v);
        let volume_ratio = if vol_ma.is_zero() {
            Decimal::ONE
        } else {
            candle.volume / vol_ma
        };

        rows.push(EnrichedCandle {
            candle: candle.clone(),
            ema_fast: fast,
            ema_slow: slow,
            ema_trend: trend,
            ema_long: long,
            atr: atr_v,
            atr_ma,
            rsi: rsi_v,
            adx: adx_v,
            plus_di: adx.plus_di().unwrap_or(Decimal::ZERO),
            minus_di: adx.minus_di().unwrap_or(Decimal::ZERO),
            volume_ma: vol_ma,
            volume_ratio,
            vwap: vwap_v,
            stoch: stoch_v,
        });
    }

    if rows.len() < MIN_ENRICHED_ROWS {
        return Err(ScannerError::InsufficientHistory {
            rows: rows.len(),
            min: MIN_ENRICHED_ROWS,
        });
    }

    Ok(EnrichedBuffer::from_rows(timeframe, is_fresh, rows))
}

fn validate(
    buffer: &CandleBuffer,
    params: &IndicatorSettings,
    timeframe: TimeFrame,
) -> Result<(), ScannerError> {
    let required = min_rows(params, timeframe);
    if buffer.len() < required {
        return Err(ScannerError::InsufficientHistory {
            rows: buffer.len(),
            min: required,
        });
    }

    for pair in buffer.candles.windows(2) {
        if pair[1].open_time <= pair[0].open_time {
            return Err(ScannerError::InvalidData(format!(
                "timestamps not strictly increasing at {}",
                pair[1].open_time
            )));
        }
    }

    for candle in &buffer.candles {
        if candle.volume < Decimal::ZERO {
            return Err(ScannerError::InvalidData(format!(
                "negative volume at {}",
                candle.open_time
            )));
        }
        if candle.high < candle.low {
            return Err(ScannerError::InvalidData(format!(
                "high below low at {}",
                candle.open_time
            )));
        }
    }

    // A dead tape inside the volume-MA window poisons every volume ratio.
    for candle in buffer.last_n(params.volume_ma_period) {
        if candle.volume.is_zero() {
            return Err(ScannerError::InvalidData(format!(
                "zero volume within last {} bars at {}",
                params.volume_ma_period, candle.open_time
            )));
        }
    }

    Ok(())
}
