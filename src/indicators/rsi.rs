use rust_decimal::Decimal;

use super::Indicator;

/// Wilder-smoothed RSI. When the average loss is zero the output pins at
/// 100; when gains and losses are both zero (a flat window) it reads 50.
#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    avg_gain: Option<Decimal>,
    avg_loss: Option<Decimal>,
    prev_price: Option<Decimal>,
    gains: Vec<Decimal>,
    losses: Vec<Decimal>,
    value: Option<Decimal>,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            avg_gain: None,
            avg_loss: None,
            prev_price: None,
            gains: Vec::with_capacity(period),
            losses: Vec::with_capacity(period),
            value: None,
        }
    }

    pub fn update(&mut self, price: Decimal) -> Option<Decimal> {
        if let Some(prev) = self.prev_price {
            let change = price - prev;
            let gain = change.max(Decimal::ZERO);
            let loss = (-change).max(Decimal::ZERO);

            if self.gains.len() < self.period {
                self.gains.push(gain);
                self.losses.push(loss);

                if self.gains.len() == self.period {
                    let period_dec = Decimal::from(self.period as u32);
                    self.avg_gain = Some(self.gains.iter().sum::<Decimal>() / period_dec);
                    self.avg_loss = Some(self.losses.iter().sum::<Decimal>() / period_dec);
                    self.value = self.compute();
                }
            } else if let (Some(avg_gain), Some(avg_loss)) = (self.avg_gain, self.avg_loss) {
                let period_dec = Decimal::from(self.period as u32);
                self.avg_gain = Some((avg_gain * (period_dec - Decimal::ONE) + gain) / period_dec);
                self.avg_loss = Some((avg_loss * (period_dec - Decimal::ONE) + loss) / period_dec);
                self.value = self.compute();
            }
        }

        self.prev_price = Some(price);
        self.value
    }

    fn compute(&self) -> Option<Decimal> {
        let (avg_gain, avg_loss) = (self.avg_gain?, self.avg_loss?);
        if avg_loss.is_zero() {
            if avg_gain.is_zero() {
                return Some(Decimal::from(50));
            }
            return Some(Decimal::from(100));
        }
        let rs = avg_gain / avg_loss;
        Some(Decimal::from(100) - Decimal::from(100) / (Decimal::ONE + rs))
    }

    pub fn value(&self) -> Option<Decimal> {
        self.value
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &'static str {
        "RSI"
    }

    fn is_ready(&self) -> bool {
        self.value.is_some()
    }

    fn reset(&mut self) {
        self.avg_gain = None;
        self.avg_loss = None;
        self.prev_price = None;
        self.gains.clear();
        self.losses.clear();
        self.value = None;
    }
}
