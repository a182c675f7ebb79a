#![allow(dead_code)]
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad instrument category. Providers advertise which classes they can
/// serve and parameter overrides are keyed by class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Crypto,
    Metal,
    Index,
    Forex,
    Other,
}

impl AssetClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::Crypto => "crypto",
            AssetClass::Metal => "metal",
            AssetClass::Index => "index",
            AssetClass::Forex => "forex",
            AssetClass::Other => "other",
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical instrument identity. Built through [`Symbol::parse`] so every
/// alias used in config files lands on one canonical code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    code: String,
    asset_class: AssetClass,
}

impl Symbol {
    /// Canonicalize a user-facing symbol string. Unknown symbols are
    /// accepted but classed as `Other`; the caller is expected to warn.
    pub fn parse(raw: &str) -> Self {
        let upper = raw.trim().to_uppercase().replace(['/', '-', ' '], "");
        let (code, asset_class) = match upper.as_str() {
            "BTC" | "BTCUSD" | "BTCUSDT" | "XBT" => ("BTC", AssetClass::Crypto),
            "ETH" | "ETHUSD" | "ETHUSDT" => ("ETH", AssetClass::Crypto),
            "SOL" | "SOLUSD" | "SOLUSDT" => ("SOL", AssetClass::Crypto),
            "XAU" | "XAUUSD" | "GOLD" => ("XAU", AssetClass::Metal),
            "US30" | "DOW" | "DJI" | "DJIA" => ("US30", AssetClass::Index),
            "US100" | "NAS100" | "NASDAQ" | "NDX" => ("US100", AssetClass::Index),
            "EURUSD" => ("EURUSD", AssetClass::Forex),
            "GBPUSD" => ("GBPUSD", AssetClass::Forex),
            _ => return Self { code: upper, asset_class: AssetClass::Other },
        };
        Self { code: code.to_string(), asset_class }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn asset_class(&self) -> AssetClass {
        self.asset_class
    }

    pub fn is_recognized(&self) -> bool {
        self.asset_class != AssetClass::Other
    }

    /// Price increment considered a "round number" for key-level detection.
    pub fn round_unit(&self) -> Decimal {
        match self.code.as_str() {
            "BTC" => dec!(1000),
            "ETH" => dec!(100),
            "SOL" => dec!(10),
            "XAU" => dec!(100),
            "US30" | "US100" => dec!(1000),
            "EURUSD" | "GBPUSD" => dec!(0.01),
            _ => dec!(100),
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeFrame {
    M1,
    M5,
    M15,
    H1,
    H4,
    D1,
}

impl TimeFrame {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFrame::M1 => "1m",
            TimeFrame::M5 => "5m",
            TimeFrame::M15 => "15m",
            TimeFrame::H1 => "1h",
            TimeFrame::H4 => "4h",
            TimeFrame::D1 => "1d",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "1m" | "m1" => Some(TimeFrame::M1),
            "5m" | "m5" => Some(TimeFrame::M5),
            "15m" | "m15" => Some(TimeFrame::M15),
            "1h" | "h1" => Some(TimeFrame::H1),
            "4h" | "h4" => Some(TimeFrame::H4),
            "1d" | "d1" => Some(TimeFrame::D1),
            _ => None,
        }
    }

    pub fn to_minutes(&self) -> i64 {
        match self {
            TimeFrame::M1 => 1,
            TimeFrame::M5 => 5,
            TimeFrame::M15 => 15,
            TimeFrame::H1 => 60,
            TimeFrame::H4 => 240,
            TimeFrame::D1 => 1440,
        }
    }

    pub fn interval(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.to_minutes())
    }

    /// A buffer whose last candle is older than this is considered stale.
    pub fn staleness_limit(&self) -> chrono::Duration {
        self.interval() * 2
    }

    /// Intraday timeframes are scanned on a tighter loop than the default.
    pub fn is_scalp(&self) -> bool {
        matches!(self, TimeFrame::M1 | TimeFrame::M5)
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn opposite(&self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }

    /// Sign the given distance so that positive means "favorable move".
    pub fn favorable(&self, from: Decimal, to: Decimal) -> Decimal {
        match self {
            Direction::Long => to - from,
            Direction::Short => from - to,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
