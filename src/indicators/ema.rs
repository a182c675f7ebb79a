use rust_decimal::Decimal;

use super::Indicator;

/// Exponential moving average, seeded with the simple mean of the first
/// `period` inputs. Undefined until the seed window fills.
#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    multiplier: Decimal,
    value: Option<Decimal>,
    count: usize,
    seed_sum: Decimal,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        let multiplier = Decimal::from(2) / Decimal::from(period as u32 + 1);
        Self {
            period,
            multiplier,
            value: None,
            count: 0,
            seed_sum: Decimal::ZERO,
        }
    }

    pub fn update(&mut self, price: Decimal) -> Option<Decimal> {
        self.count += 1;

        if self.count < self.period {
            self.seed_sum += price;
            return None;
        }
        if self.count == self.period {
            self.seed_sum += price;
            self.value = Some(self.seed_sum / Decimal::from(self.period as u32));
            return self.value;
        }

        if let Some(prev) = self.value {
            self.value = Some((price - prev) * self.multiplier + prev);
        }
        self.value
    }

    pub fn value(&self) -> Option<Decimal> {
        self.value
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl Indicator for Ema {
    fn name(&self) -> &'static str {
        "EMA"
    }

    fn is_ready(&self) -> bool {
        self.value.is_some()
    }

    fn reset(&mut self) {
        self.value = None;
        self.count = 0;
        self.seed_sum = Decimal::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_seeded_with_simple_mean() {
        let mut ema = Ema::new(3);
        assert!(ema.update(dec!(10)).is_none());
        assert!(ema.update(dec!(20)).is_none());
        assert_eq!(ema.update(dec!(30)), Some(dec!(20)));
    }

    #[test]
    fn test_smoothing_constant() {
        let mut ema = Ema::new(3);
        ema.update(dec!(10));
        ema.update(dec!(20));
        ema.update(dec!(30));
        // alpha = 2/(3+1) = 0.5 -> (40-20)*0.5 + 20 = 30
        assert_eq!(ema.update(dec!(40)), Some(dec!(30)));
    }

    #[test]
    fn test_reset_clears_state() {
        let mut ema = Ema::new(2);
        ema.update(dec!(1));
        ema.update(dec!(2));
        assert!(ema.is_ready());
        ema.reset();
        assert!(!ema.is_ready());
        assert!(ema.update(dec!(5)).is_none());
    }
}
