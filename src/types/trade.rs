#![allow(dead_code)]
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Direction, HoldHorizon, Signal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Open,
    BreakevenArmed,
    Stopped,
    TpHit,
    ReversalExited,
    Expired,
}

impl TradeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TradeStatus::Stopped
                | TradeStatus::TpHit
                | TradeStatus::ReversalExited
                | TradeStatus::Expired
        )
    }
}

/// Lifecycle event emitted by the trade tracker. Structured only; outbound
/// sinks own all user-facing formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeEventKind {
    Breakeven,
    Stop,
    Tp,
    Reversal,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeEvent {
    pub trade_id: Uuid,
    pub kind: TradeEventKind,
    pub price: Decimal,
    pub pnl_pct: Decimal,
    pub note: String,
}

/// A signal under live-price tracking. Serde-serializable end to end so a
/// persistence layer can be added without touching the tracker itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedTrade {
    pub signal: Signal,
    pub status: TradeStatus,
    /// Current protective stop; moves to entry once breakeven arms.
    pub active_stop: Decimal,
    /// Maximum favorable excursion seen so far.
    pub peak_price: Decimal,
    pub breakeven_announced: bool,
    pub opened_at: DateTime<Utc>,
    pub last_checked_at: DateTime<Utc>,
}

impl TrackedTrade {
    pub fn open(signal: Signal, now: DateTime<Utc>) -> Self {
        let active_stop = signal.stop_loss;
        let peak_price = signal.entry_price;
        Self {
            signal,
            status: TradeStatus::Open,
            active_stop,
            peak_price,
            breakeven_announced: false,
            opened_at: now,
            last_checked_at: now,
        }
    }

    pub fn id(&self) -> Uuid {
        self.signal.id
    }

    pub fn direction(&self) -> Direction {
        self.signal.direction
    }

    /// Signed percentage move from entry, positive when favorable.
    pub fn pnl_pct(&self, price: Decimal) -> Decimal {
        if self.signal.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        self.direction().favorable(self.signal.entry_price, price)
            / self.signal.entry_price
            * Decimal::from(100)
    }

    pub fn hold_horizon(&self) -> HoldHorizon {
        self.signal
            .metadata
            .hold_horizon
            .unwrap_or(HoldHorizon::Intraday)
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.opened_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_terminal_statuses() {
        assert!(!TradeStatus::Open.is_terminal());
        assert!(!TradeStatus::BreakevenArmed.is_terminal());
        assert!(TradeStatus::Stopped.is_terminal());
        assert!(TradeStatus::TpHit.is_terminal());
        assert!(TradeStatus::ReversalExited.is_terminal());
        assert!(TradeStatus::Expired.is_terminal());
    }

    #[test]
    fn test_pnl_sign_follows_direction() {
        use crate::types::test_support::sample_signal;
        let mut sig = sample_signal();
        sig.direction = Direction::Short;
        sig.stop_loss = dec!(101);
        sig.take_profit = dec!(98);
        let trade = TrackedTrade::open(sig, Utc::now());
        assert!(trade.pnl_pct(dec!(99)) > Decimal::ZERO);
        assert!(trade.pnl_pct(dec!(101)) < Decimal::ZERO);
    }
}
