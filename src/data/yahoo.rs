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
use tracing::debug;

use super::Provider;
use crate::error::ProviderError;
use crate::types::{AssetClass, Candle, Symbol, TimeFrame};

const YAHOO_API: &str = "https://query1.finance.yahoo.com";
const NAME: &str = "yahoo";
const REQUESTS_PER_MINUTE: u32 = 30;

/// Chart-API provider for indices, forex and gold (and anything else the
/// crypto chain cannot serve).
pub struct YahooProvider {
    client: Client,
    base_url: String,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize, Default)]
struct Quote {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<f64>>,
}

impl YahooProvider {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, YAHOO_API.to_string())
    }

    pub fn with_base_url(client: Client, base_url: String) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(REQUESTS_PER_MINUTE).expect("nonzero quota"));
        Self {
            client,
            base_url,
            limiter: RateLimiter::direct(quota),
        }
    }

    fn ticker(symbol: &Symbol) -> String {
        match symbol.code() {
            "XAU" => "GC=F".to_string(),
            "US30" => "^DJI".to_string(),
            "US100" => "^NDX".to_string(),
            "EURUSD" => "EURUSD=X".to_string(),
            "GBPUSD" => "GBPUSD=X".to_string(),
            other => other.to_string(),
        }
    }

    /// Smallest supported range string covering `count` bars.
    fn range_for(timeframe: TimeFrame, count: usize) -> &'static str {
        let minutes = timeframe.to_minutes() as u64 * count as u64;
        let days = minutes / (60 * 24) + 1;
        match days {
            0..=5 => "5d",
            6..=30 => "1mo",
            31..=90 => "3mo",
            91..=365 => "1y",
            _ => "5y",
        }
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

    fn build_candles(result: &ChartResult) -> Vec<Candle> {
        let Some(timestamps) = &result.timestamp else {
            return Vec::new();
        };
        let Some(quote) = result.indicators.quote.first() else {
            return Vec::new();
        };

        let mut candles = Vec::with_capacity(timestamps.len());
        for (i, ts) in timestamps.iter().enumerate() {
            // Yahoo pads illiquid intervals with nulls; skip those bars
            // rather than invent prices.
            let (Some(open), Some(high), Some(low), Some(close)) = (
                quote.open.get(i).copied().flatten(),
                quote.high.get(i).copied().flatten(),
                quote.low.get(i).copied().flatten(),
                quote.close.get(i).copied().flatten(),
            ) else {
                continue;
            };
            let volume = quote.volume.get(i).copied().flatten().unwrap_or(0.0);
            let (Some(open), Some(high), Some(low), Some(close), Some(volume)) = (
                Decimal::from_f64(open),
                Decimal::from_f64(high),
                Decimal::from_f64(low),
                Decimal::from_f64(close),
                Decimal::from_f64(volume.max(1.0)),
            ) else {
                continue;
            };
            let Some(open_time) = Utc.timestamp_opt(*ts, 0).single() else {
                continue;
            };
            candles.push(Candle {
                open_time,
                open,
                high,
                low,
                close,
                volume,
            });
        }
        candles
    }
}

#[async_trait]
impl Provider for YahooProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn supports(&self, asset_class: AssetClass) -> bool {
        matches!(
            asset_class,
            AssetClass::Metal | AssetClass::Index | AssetClass::Forex | AssetClass::Other
        )
    }

    async fn fetch(
        &self,
        symbol: &Symbol,
        timeframe: TimeFrame,
        count: usize,
    ) -> Result<Vec<Candle>, ProviderError> {
        self.limiter.until_ready().await;

        let url = format!(
            "{}/v8/finance/chart/{}?interval={}&range={}",
            self.base_url,
            Self::ticker(symbol),
            timeframe.as_str(),
            Self::range_for(timeframe, count),
        );
        debug!("GET {url}");

        let response = self.client.get(&url).send().await.map_err(|e| {
            ProviderError::Transient {
                provider: NAME,
                detail: e.to_string(),
            }
        })?;
        if let Some(err) = Self::classify(response.status()) {
            return Err(err);
        }

        let chart: ChartResponse = response.json().await.map_err(|e| ProviderError::Unknown {
            provider: NAME,
            detail: format!("chart decode: {e}"),
        })?;

        if let Some(error) = &chart.chart.error {
            if !error.is_null() {
                return Err(ProviderError::Unavailable {
                    provider: NAME,
                    detail: error.to_string(),
                });
            }
        }

        let mut candles = chart
            .chart
            .result
            .as_deref()
            .and_then(|results| results.first())
            .map(Self::build_candles)
            .unwrap_or_default();

        if candles.len() > count {
            candles.drain(..candles.len() - count);
        }
        Ok(candles)
    }
}
