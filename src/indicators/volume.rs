use rust_decimal::Decimal;

use super::{sma, Indicator};

/// Rolling simple mean of volume plus the relative-volume ratio strategies
/// key their volume confirmations on.
#[derive(Debug, Clone)]
pub struct VolumeMa {
    period: usize,
    volumes: Vec<Decimal>,
    value: Option<Decimal>,
}

impl VolumeMa {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            volumes: Vec::with_capacity(period + 1),
            value: None,
        }
    }

    pub fn update(&mut self, volume: Decimal) -> Option<Decimal> {
        self.volumes.push(volume);
        if self.volumes.len() > self.period {
            self.volumes.remove(0);
        }
        if self.volumes.len() >= self.period {
            self.value = sma(&self.volumes, self.period);
        }
        self.value
    }

    pub fn value(&self) -> Option<Decimal> {
        self.value
    }

    pub fn ratio(&self, current_volume: Decimal) -> Option<Decimal> {
        self.value.map(|avg| {
            if avg.is_zero() {
                Decimal::ONE
            } else {
                current_volume / avg
            }
        })
    }
}

impl Indicator for VolumeMa {
    fn name(&self) -> &'static str {
        "VolumeMA"
    }

    fn is_ready(&self) -> bool {
        self.value.is_some()
    }

    fn reset(&mut self) {
        self.volumes.clear();
        self.value = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rolling_mean() {
        let mut ma = VolumeMa::new(3);
        assert!(ma.update(dec!(10)).is_none());
        assert!(ma.update(dec!(20)).is_none());
        assert_eq!(ma.update(dec!(30)), Some(dec!(20)));
        assert_eq!(ma.update(dec!(40)), Some(dec!(30)));
    }

    #[test]
    fn test_relative_volume() {
        let mut ma = VolumeMa::new(2);
        ma.update(dec!(100));
        ma.update(dec!(100));
        assert_eq!(ma.ratio(dec!(180)), Some(dec!(1.8)));
    }
}
