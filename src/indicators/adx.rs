use rust_decimal::Decimal;

use super::Indicator;

/// Average Directional Index with the conventional +DI/-DI pair, Wilder
/// smoothing throughout. Needs roughly `2 * period` bars before the ADX
/// itself is ready; the DI pair becomes available after `period + 1`.
#[derive(Debug, Clone)]
pub struct Adx {
    period: usize,
    prev: Option<(Decimal, Decimal, Decimal)>,
    // warmup accumulation of the first `period` DM/TR values
    warmup_plus_dm: Vec<Decimal>,
    warmup_minus_dm: Vec<Decimal>,
    warmup_tr: Vec<Decimal>,
    smoothed_plus_dm: Option<Decimal>,
    smoothed_minus_dm: Option<Decimal>,
    smoothed_tr: Option<Decimal>,
    warmup_dx: Vec<Decimal>,
    plus_di: Option<Decimal>,
    minus_di: Option<Decimal>,
    value: Option<Decimal>,
}

impl Adx {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev: None,
            warmup_plus_dm: Vec::with_capacity(period),
            warmup_minus_dm: Vec::with_capacity(period),
            warmup_tr: Vec::with_capacity(period),
            smoothed_plus_dm: None,
            smoothed_minus_dm: None,
            smoothed_tr: None,
            warmup_dx: Vec::with_capacity(period),
            plus_di: None,
            minus_di: None,
            value: None,
        }
    }

    pub fn update(&mut self, high: Decimal, low: Decimal, close: Decimal) -> Option<Decimal> {
        let Some((prev_high, prev_low, prev_close)) = self.prev else {
            self.prev = Some((high, low, close));
            return None;
        };
        self.prev = Some((high, low, close));

        let up_move = high - prev_high;
        let down_move = prev_low - low;
        let plus_dm = if up_move > down_move && up_move > Decimal::ZERO {
            up_move
        } else {
            Decimal::ZERO
        };
        let minus_dm = if down_move > up_move && down_move > Decimal::ZERO {
            down_move
        } else {
            Decimal::ZERO
        };
        let tr = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());

        let period_dec = Decimal::from(self.period as u32);

        match (self.smoothed_tr, self.smoothed_plus_dm, self.smoothed_minus_dm) {
            (Some(str_), Some(spd), Some(smd)) => {
                self.smoothed_tr = Some(str_ - str_ / period_dec + tr);
                self.smoothed_plus_dm = Some(spd - spd / period_dec + plus_dm);
                self.smoothed_minus_dm = Some(smd - smd / period_dec + minus_dm);
            }
            _ => {
                self.warmup_plus_dm.push(plus_dm);
                self.warmup_minus_dm.push(minus_dm);
                self.warmup_tr.push(tr);
                if self.warmup_tr.len() == self.period {
                    self.smoothed_plus_dm = Some(self.warmup_plus_dm.iter().sum());
                    self.smoothed_minus_dm = Some(self.warmup_minus_dm.iter().sum());
                    self.smoothed_tr = Some(self.warmup_tr.iter().sum());
                    self.warmup_plus_dm.clear();
                    self.warmup_minus_dm.clear();
                    self.warmup_tr.clear();
                } else {
                    return None;
                }
            }
        }

        let smoothed_tr = self.smoothed_tr?;
        if smoothed_tr.is_zero() {
            return self.value;
        }
        let hundred = Decimal::from(100);
        let plus_di = hundred * self.smoothed_plus_dm? / smoothed_tr;
        let minus_di = hundred * self.smoothed_minus_dm? / smoothed_tr;
        self.plus_di = Some(plus_di);
        self.minus_di = Some(minus_di);

        let di_sum = plus_di + minus_di;
        let dx = if di_sum.is_zero() {
            Decimal::ZERO
        } else {
            hundred * (plus_di - minus_di).abs() / di_sum
        };

        match self.value {
            Some(prev_adx) => {
                self.value = Some((prev_adx * (period_dec - Decimal::ONE) + dx) / period_dec);
            }
            None => {
                self.warmup_dx.push(dx);
                if self.warmup_dx.len() == self.period {
                    self.value =
                        Some(self.warmup_dx.iter().sum::<Decimal>() / period_dec);
                    self.warmup_dx.clear();
                }
            }
        }

        self.value
    }

    pub fn value(&self) -> Option<Decimal> {
        self.value
    }

    pub fn plus_di(&self) -> Option<Decimal> {
        self.plus_di
    }

    pub fn minus_di(&self) -> Option<Decimal> {
        self.minus_di
    }
}

impl Indicator for Adx {
    fn name(&self) -> &'static str {
        "ADX"
    }

    fn is_ready(&self) -> bool {
        self.value.is_some()
    }

    fn reset(&mut self) {
        *self = Self::new(self.period);
    }
}
