use rust_decimal::Decimal;

use super::Indicator;

/// Average True Range, Wilder-smoothed over `period` bars.
#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    prev_close: Option<Decimal>,
    true_ranges: Vec<Decimal>,
    value: Option<Decimal>,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev_close: None,
            true_ranges: Vec::with_capacity(period),
            value: None,
        }
    }

    pub fn update(&mut self, high: Decimal, low: Decimal, close: Decimal) -> Option<Decimal> {
        let tr = self.true_range(high, low);
        self.prev_close = Some(close);

        if self.value.is_none() {
            self.true_ranges.push(tr);
            if self.true_ranges.len() == self.period {
                let sum: Decimal = self.true_ranges.iter().sum();
                self.value = Some(sum / Decimal::from(self.period as u32));
                self.true_ranges.clear();
            }
        } else if let Some(prev) = self.value {
            let period_dec = Decimal::from(self.period as u32);
            self.value = Some((prev * (period_dec - Decimal::ONE) + tr) / period_dec);
        }

        self.value
    }

    fn true_range(&self, high: Decimal, low: Decimal) -> Decimal {
        let hl = high - low;
        match self.prev_close {
            Some(prev_close) => {
                let hc = (high - prev_close).abs();
                let lc = (low - prev_close).abs();
                hl.max(hc).max(lc)
            }
            None => hl,
        }
    }

    pub fn value(&self) -> Option<Decimal> {
        self.value
    }
}

impl Indicator for Atr {
    fn name(&self) -> &'static str {
        "ATR"
    }

    fn is_ready(&self) -> bool {
        self.value.is_some()
    }

    fn reset(&mut self) {
        self.prev_close = None;
        self.true_ranges.clear();
        self.value = None;
    }
}
