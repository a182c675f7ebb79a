#![allow(dead_code)]
pub mod adx;
pub mod atr;
pub mod ema;
pub mod engine;
pub mod rsi;
pub mod stochastic;
pub mod volume;
pub mod vwap;

pub use adx::*;
pub use atr::*;
pub use ema::*;
pub use engine::*;
pub use rsi::*;
pub use stochastic::*;
pub use volume::*;
pub use vwap::*;

use rust_decimal::Decimal;

/// Common surface of every incremental indicator. Each one is fed candles
/// oldest-first via its `update` method and reports a value only once its
/// warmup window has filled.
pub trait Indicator {
    fn name(&self) -> &'static str;
    fn is_ready(&self) -> bool;
    fn reset(&mut self);
}

pub fn sma(values: &[Decimal], period: usize) -> Option<Decimal> {
    if values.len() < period || period == 0 {
        return None;
    }
    let sum: Decimal = values.iter().rev().take(period).sum();
    Some(sum / Decimal::from(period as u32))
}

pub fn highest(values: &[Decimal], period: usize) -> Option<Decimal> {
    if values.len() < period {
        return None;
    }
    values.iter().rev().take(period).max().copied()
}

pub fn lowest(values: &[Decimal], period: usize) -> Option<Decimal> {
    if values.len() < period {
        return None;
    }
    values.iter().rev().take(period).min().copied()
}
