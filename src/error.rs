#![allow(dead_code)]
use thiserror::Error;

/// Errors produced by provider adapters. The data-source layer uses the
/// classification to decide between retry, fallback and hard failure.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("rate limited by {provider}")]
    RateLimited { provider: &'static str },

    #[error("{provider} unavailable: {detail}")]
    Unavailable { provider: &'static str, detail: String },

    #[error("{provider} rejected credentials")]
    Auth { provider: &'static str },

    #[error("request to {provider} timed out after {seconds}s")]
    Timeout { provider: &'static str, seconds: u64 },

    #[error("transient error from {provider}: {detail}")]
    Transient { provider: &'static str, detail: String },

    #[error("unexpected error from {provider}: {detail}")]
    Unknown { provider: &'static str, detail: String },
}

impl ProviderError {
    pub fn provider(&self) -> &'static str {
        match self {
            ProviderError::RateLimited { provider }
            | ProviderError::Unavailable { provider, .. }
            | ProviderError::Auth { provider }
            | ProviderError::Timeout { provider, .. }
            | ProviderError::Transient { provider, .. }
            | ProviderError::Unknown { provider, .. } => provider,
        }
    }

    /// Whether the data source should move on to the next provider.
    pub fn should_fall_back(&self) -> bool {
        !matches!(self, ProviderError::Auth { .. })
    }
}

/// Scanner-level errors. Within a tick these are caught, counted and the
/// tick is skipped; only startup failures are fatal.
#[derive(Debug, Error)]
pub enum ScannerError {
    #[error("failed to connect to any data provider for {symbol}")]
    Connect { symbol: String },

    #[error("invalid candle data: {0}")]
    InvalidData(String),

    #[error("insufficient history: {rows} rows after enrichment, need {min}")]
    InsufficientHistory { rows: usize, min: usize },

    #[error("all providers exhausted for {symbol} {timeframe}")]
    ProvidersExhausted { symbol: String, timeframe: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("dispatch channel closed")]
    DispatchClosed,
}

/// Configuration problems are collected and reported together so a bad
/// config file surfaces every violation in one startup failure.
#[derive(Debug, Error)]
#[error("invalid configuration:\n  {}", .violations.join("\n  "))]
pub struct ConfigError {
    pub violations: Vec<String>,
}

impl ConfigError {
    pub fn new(violations: Vec<String>) -> Self {
        Self { violations }
    }
}
