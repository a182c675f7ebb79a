#![allow(dead_code)]
pub mod binance;
pub mod coingecko;
pub mod yahoo;

pub use binance::BinanceProvider;
pub use coingecko::CoinGeckoProvider;
pub use yahoo::YahooProvider;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ProviderError, ScannerError};
use crate::types::{AssetClass, Candle, CandleBuffer, Symbol, TimeFrame};

/// One upstream market-data adapter. Rate limiting is each adapter's own
/// concern; the source layer only classifies failures and falls back.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports(&self, asset_class: AssetClass) -> bool;

    async fn fetch(
        &self,
        symbol: &Symbol,
        timeframe: TimeFrame,
        count: usize,
    ) -> Result<Vec<Candle>, ProviderError>;

    /// Cheap reachability probe used by `connect`. Adapters without a
    /// dedicated endpoint just succeed.
    async fn healthcheck(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Priority-ordered provider chain for one scanner. Falls back across
/// providers on empty responses, rate limits and transient failures;
/// credential rejections bench the provider for the session.
pub struct DataSource {
    providers: Vec<Box<dyn Provider>>,
    call_timeout: Duration,
    benched: Mutex<HashSet<&'static str>>,
}

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

impl DataSource {
    pub fn new(providers: Vec<Box<dyn Provider>>) -> Self {
        Self {
            providers,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            benched: Mutex::new(HashSet::new()),
        }
    }

    /// Build the chain from validated config names.
    pub fn from_names(names: &[String]) -> Self {
        let client = reqwest::Client::new();
        let providers = names
            .iter()
            .filter_map(|name| -> Option<Box<dyn Provider>> {
                match name.as_str() {
                    "binance" => Some(Box::new(BinanceProvider::new(client.clone()))),
                    "coingecko" => Some(Box::new(CoinGeckoProvider::new(client.clone()))),
                    "yahoo" => Some(Box::new(YahooProvider::new(client.clone()))),
                    other => {
                        warn!("ignoring unknown data provider '{other}'");
                        None
                    }
                }
            })
            .collect();
        Self::new(providers)
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Verify at least one provider serving this asset class answers.
    pub async fn connect(&self, symbol: &Symbol) -> Result<(), ScannerError> {
        let class = symbol.asset_class();
        for provider in self.providers.iter().filter(|p| p.supports(class)) {
            match tokio::time::timeout(self.call_timeout, provider.healthcheck()).await {
                Ok(Ok(())) => {
                    info!("connected via provider {}", provider.name());
                    return Ok(());
                }
                Ok(Err(err)) => warn!("healthcheck failed for {}: {err}", provider.name()),
                Err(_) => warn!("healthcheck timed out for {}", provider.name()),
            }
        }
        Err(ScannerError::Connect {
            symbol: symbol.code().to_string(),
        })
    }

    pub fn close(&self) {
        // REST adapters hold no sessions; the hook exists for symmetry
        // with stateful providers.
        debug!("data source closed");
    }

    /// Fetch the last `count` candles, walking the provider chain in
    /// priority order. The buffer is returned even when stale; the
    /// freshness flag tells downstream what it may do with it.
    pub async fn fetch(
        &self,
        symbol: &Symbol,
        timeframe: TimeFrame,
        count: usize,
        now: DateTime<Utc>,
    ) -> Result<(CandleBuffer, bool), ScannerError> {
        let class = symbol.asset_class();
        let mut last_error: Option<ProviderError> = None;

        for provider in self.providers.iter().filter(|p| p.supports(class)) {
            if self.benched.lock().expect("bench lock poisoned").contains(provider.name()) {
                continue;
            }

            let result = tokio::time::timeout(
                self.call_timeout,
                provider.fetch(symbol, timeframe, count),
            )
            .await;

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(_) => Err(ProviderError::Timeout {
                    provider: provider.name(),
                    seconds: self.call_timeout.as_secs(),
                }),
            };

            match outcome {
                Ok(candles) if candles.is_empty() => {
                    warn!("{} returned no candles for {symbol} {timeframe}", provider.name());
                    continue;
                }
                Ok(mut candles) => {
                    candles.sort_by_key(|c| c.open_time);
                    candles.dedup_by_key(|c| c.open_time);
                    if candles.len() > count {
                        candles.drain(..candles.len() - count);
                    }
                    let buffer = CandleBuffer::from_candles(candles);
                    let is_fresh = buffer.is_fresh(timeframe, now);
                    info!(
                        "{} answered for {symbol} {timeframe}: {} candles, fresh={is_fresh}",
                        provider.name(),
                        buffer.len(),
                    );
                    return Ok((buffer, is_fresh));
                }
                Err(err) => {
                    warn!("{} failed for {symbol} {timeframe}: {err}", provider.name());
                    if !err.should_fall_back() {
                        self.benched
                            .lock()
                            .expect("bench lock poisoned")
                            .insert(provider.name());
                    }
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(err) => Err(ScannerError::Provider(err)),
            None => Err(ScannerError::ProvidersExhausted {
                symbol: symbol.code().to_string(),
                timeframe: timeframe.to_string(),
            }),
        }
    }
}
