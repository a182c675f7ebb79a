use rust_decimal::Decimal;

use super::{highest, lowest, sma, Indicator};

/// Full stochastic oscillator: raw %K over `k_period` highs/lows, smoothed
/// by `smooth`, with %D as a `d_period` mean of the smoothed %K.
#[derive(Debug, Clone)]
pub struct Stochastic {
    k_period: usize,
    d_period: usize,
    smooth: usize,
    highs: Vec<Decimal>,
    lows: Vec<Decimal>,
    raw_k: Vec<Decimal>,
    smoothed_k: Vec<Decimal>,
    value: Option<(Decimal, Decimal)>,
}

impl Stochastic {
    pub fn new(k_period: usize, d_period: usize, smooth: usize) -> Self {
        Self {
            k_period,
            d_period,
            smooth,
            highs: Vec::with_capacity(k_period + 1),
            lows: Vec::with_capacity(k_period + 1),
            raw_k: Vec::with_capacity(smooth + 1),
            smoothed_k: Vec::with_capacity(d_period + 1),
            value: None,
        }
    }

    pub fn update(&mut self, high: Decimal, low: Decimal, close: Decimal) -> Option<(Decimal, Decimal)> {
        self.highs.push(high);
        self.lows.push(low);
        if self.highs.len() > self.k_period {
            self.highs.remove(0);
            self.lows.remove(0);
        }
        if self.highs.len() < self.k_period {
            return None;
        }

        let high = highest(&self.highs, self.k_period)?;
        let low = lowest(&self.lows, self.k_period)?;
        let range = high - low;
        let k = if range.is_zero() {
            Decimal::from(50)
        } else {
            (close - low) / range * Decimal::from(100)
        };

        self.raw_k.push(k);
        if self.raw_k.len() > self.smooth {
            self.raw_k.remove(0);
        }
        let Some(smoothed) = sma(&self.raw_k, self.smooth) else {
            return None;
        };

        self.smoothed_k.push(smoothed);
        if self.smoothed_k.len() > self.d_period {
            self.smoothed_k.remove(0);
        }
        let d = sma(&self.smoothed_k, self.d_period)?;

        self.value = Some((smoothed, d));
        self.value
    }

    pub fn value(&self) -> Option<(Decimal, Decimal)> {
        self.value
    }
}

impl Indicator for Stochastic {
    fn name(&self) -> &'static str {
        "Stochastic"
    }

    fn is_ready(&self) -> bool {
        self.value.is_some()
    }

    fn reset(&mut self) {
        self.highs.clear();
        self.lows.clear();
        self.raw_k.clear();
        self.smoothed_k.clear();
        self.value = None;
    }
}
