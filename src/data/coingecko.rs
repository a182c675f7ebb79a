use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::num::NonZeroU32;
use tracing::{debug, warn};

use super::Provider;
use crate::error::ProviderError;
use crate::types::{AssetClass, Candle, Symbol, TimeFrame};

const COINGECKO_API: &str = "https://api.coingecko.com";
const NAME: &str = "coingecko";
/// Free-tier budget is ~10-30 calls/min; each fetch spends two.
const REQUESTS_PER_MINUTE: u32 = 10;

/// Aggregator fallback for crypto. OHLC and volume come from two
/// endpoints and are stitched together by timestamp; when the volume
/// series cannot be matched the candle carries a unit volume and the
/// degradation is logged.
pub struct CoinGeckoProvider {
    client: Client,
    base_url: String,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

#[derive(Debug, Deserialize)]
struct MarketChart {
    total_volumes: Vec<(i64, f64)>,
}

impl CoinGeckoProvider {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, COINGECKO_API.to_string())
    }

    pub fn with_base_url(client: Client, base_url: String) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(REQUESTS_PER_MINUTE).expect("nonzero quota"));
        Self {
            client,
            base_url,
            limiter: RateLimiter::direct(quota),
        }
    }

    fn coin_id(symbol: &Symbol) -> Option<&'static str> {
        match symbol.code() {
            "BTC" => Some("bitcoin"),
            "ETH" => Some("ethereum"),
            "SOL" => Some("solana"),
            _ => None,
        }
    }

    /// Smallest `days` window that still covers `count` bars of
    /// `timeframe`. CoinGecko picks candle granularity from the window.
    fn days_for(timeframe: TimeFrame, count: usize) -> u32 {
        let minutes = timeframe.to_minutes() as u64 * count as u64;
        ((minutes / (60 * 24)) + 1).min(90) as u32
    }

    fn classify(status: StatusCode) -> Option<ProviderError> {
        match status {
            StatusCode::TOO_MANY_REQUESTS => Some(ProviderError::RateLimited { provider: NAME }),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Some(ProviderError::Auth { provider: NAME })
            }
            s if s.is_server_error() => Some(ProviderError::Unavailable {
                provider: NAME,
                detail: s.to_string(),
            }),
            s if !s.is_success() => Some(ProviderError::Unknown {
                provider: NAME,
                detail: s.to_string(),
            }),
            _ => None,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ProviderError> {
        self.limiter.until_ready().await;
        debug!("GET {url}");
        let response = self.client.get(url).send().await.map_err(|e| {
            ProviderError::Transient {
                provider: NAME,
                detail: e.to_string(),
            }
        })?;
        if let Some(err) = Self::classify(response.status()) {
            return Err(err);
        }
        response.json().await.map_err(|e| ProviderError::Unknown {
            provider: NAME,
            detail: format!("decode: {e}"),
        })
    }

    fn decimal(value: f64, what: &str) -> Result<Decimal, ProviderError> {
        Decimal::from_f64(value).ok_or_else(|| ProviderError::Unknown {
            provider: NAME,
            detail: format!("non-finite {what}: {value}"),
        })
    }

    /// Nearest volume reading at or before the candle timestamp.
    fn volume_at(volumes: &[(i64, f64)], ts_millis: i64) -> Option<f64> {
        volumes
            .iter()
            .take_while(|(t, _)| *t <= ts_millis)
            .last()
            .map(|(_, v)| *v)
    }
}

#[async_trait]
impl Provider for CoinGeckoProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn supports(&self, asset_class: AssetClass) -> bool {
        asset_class == AssetClass::Crypto
    }

    async fn fetch(
        &self,
        symbol: &Symbol,
        timeframe: TimeFrame,
        count: usize,
    ) -> Result<Vec<Candle>, ProviderError> {
        let coin = Self::coin_id(symbol).ok_or_else(|| ProviderError::Unavailable {
            provider: NAME,
            detail: format!("no coin mapping for {symbol}"),
        })?;
        let days = Self::days_for(timeframe, count);

        let ohlc: Vec<(i64, f64, f64, f64, f64)> = self
            .get_json(&format!(
                "{}/api/v3/coins/{coin}/ohlc?vs_currency=usd&days={days}",
                self.base_url
            ))
            .await?;

        let volumes = match self
            .get_json::<MarketChart>(&format!(
                "{}/api/v3/coins/{coin}/market_chart?vs_currency=usd&days={days}",
                self.base_url
            ))
            .await
        {
            Ok(chart) => chart.total_volumes,
            Err(err) => {
                warn!("volume series unavailable from {NAME}: {err}; emitting unit volumes");
                Vec::new()
            }
        };

        let mut candles = Vec::with_capacity(ohlc.len());
        for (ts, open, high, low, close) in ohlc {
            let volume = Self::volume_at(&volumes, ts).unwrap_or(1.0);
            candles.push(Candle {
                open_time: Utc
                    .timestamp_millis_opt(ts)
                    .single()
                    .ok_or_else(|| ProviderError::Unknown {
                        provider: NAME,
                        detail: format!("bad timestamp {ts}"),
                    })?,
                open: Self::decimal(open, "open")?,
                high: Self::decimal(high, "high")?,
                low: Self::decimal(low, "low")?,
                close: Self::decimal(close, "close")?,
                volume: Self::decimal(volume.max(1.0), "volume")?,
            });
        }

        if candles.len() > count {
            candles.drain(..candles.len() - count);
        }
        Ok(candles)
    }
}
