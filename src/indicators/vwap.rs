use chrono::{DateTime, NaiveDate, Timelike, Utc};
use rust_decimal::Decimal;

use super::Indicator;
use crate::config::VwapReset;

/// Volume-weighted average price over the current accumulation bucket.
/// The bucket restarts at the UTC day boundary or, in session mode, at the
/// configured session start hour.
#[derive(Debug, Clone)]
pub struct Vwap {
    reset: VwapReset,
    bucket: Option<NaiveDate>,
    cumulative_pv: Decimal,
    cumulative_volume: Decimal,
    value: Option<Decimal>,
}

impl Vwap {
    pub fn new(reset: VwapReset) -> Self {
        Self {
            reset,
            bucket: None,
            cumulative_pv: Decimal::ZERO,
            cumulative_volume: Decimal::ZERO,
            value: None,
        }
    }

    /// Bucket identity for a timestamp: the UTC date, shifted back one day
    /// for session mode when the bar lands before the session start.
    fn bucket_for(&self, ts: DateTime<Utc>) -> NaiveDate {
        match self.reset {
            VwapReset::Daily => ts.date_naive(),
            VwapReset::Session { start_hour, .. } => {
                if ts.hour() < start_hour {
                    ts.date_naive().pred_opt().unwrap_or_else(|| ts.date_naive())
                } else {
                    ts.date_naive()
                }
            }
        }
    }

    pub fn update(
        &mut self,
        open_time: DateTime<Utc>,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Option<Decimal> {
        let bucket = self.bucket_for(open_time);
        if self.bucket != Some(bucket) {
            self.bucket = Some(bucket);
            self.cumulative_pv = Decimal::ZERO;
            self.cumulative_volume = Decimal::ZERO;
            self.value = None;
        }

        let typical = (high + low + close) / Decimal::from(3);
        self.cumulative_pv += typical * volume;
        self.cumulative_volume += volume;

        if !self.cumulative_volume.is_zero() {
            self.value = Some(self.cumulative_pv / self.cumulative_volume);
        }
        self.value
    }

    pub fn value(&self) -> Option<Decimal> {
        self.value
    }
}

impl Indicator for Vwap {
    fn name(&self) -> &'static str {
        "VWAP"
    }

    fn is_ready(&self) -> bool {
        self.value.is_some()
    }

    fn reset(&mut self) {
        self.bucket = None;
        self.cumulative_pv = Decimal::ZERO;
        self.cumulative_volume = Decimal::ZERO;
        self.value = None;
    }
}
