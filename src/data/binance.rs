use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use std::num::NonZeroU32;
use std::str::FromStr;
use tracing::debug;

use super::Provider;
use crate::error::ProviderError;
use crate::types::{AssetClass, Candle, Symbol, TimeFrame};

const BINANCE_API: &str = "https://api.binance.com";
const NAME: &str = "binance";
/// Public klines weight allows far more, but 60 req/min keeps a scanner
/// fleet comfortably under the IP budget.
const REQUESTS_PER_MINUTE: u32 = 60;

/// Primary crypto provider: spot klines over REST.
pub struct BinanceProvider {
    client: Client,
    base_url: String,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl BinanceProvider {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, BINANCE_API.to_string())
    }

    pub fn with_base_url(client: Client, base_url: String) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(REQUESTS_PER_MINUTE).expect("nonzero quota"));
        Self {
            client,
            base_url,
            limiter: RateLimiter::direct(quota),
        }
    }

    fn pair(symbol: &Symbol) -> String {
        format!("{}USDT", symbol.code())
    }

    fn classify_status(status: StatusCode) -> Option<ProviderError> {
        match status {
            StatusCode::TOO_MANY_REQUESTS => Some(ProviderError::RateLimited { provider: NAME }),
            // 418 is Binance's repeat-offender IP ban.
            StatusCode::IM_A_TEAPOT => Some(ProviderError::RateLimited { provider: NAME }),
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

    fn parse_kline(kline: &[serde_json::Value]) -> Result<Candle, ProviderError> {
        let bad = |what: &str| ProviderError::Unknown {
            provider: NAME,
            detail: format!("malformed kline field: {what}"),
        };
        let open_time = kline
            .first()
            .and_then(|v| v.as_i64())
            .ok_or_else(|| bad("open_time"))?;
        let field = |idx: usize, what: &str| -> Result<Decimal, ProviderError> {
            let raw = kline.get(idx).and_then(|v| v.as_str()).ok_or_else(|| bad(what))?;
            Decimal::from_str(raw).map_err(|_| bad(what))
        };
        Ok(Candle {
            open_time: Utc
                .timestamp_millis_opt(open_time)
                .single()
                .ok_or_else(|| bad("open_time"))?,
            open: field(1, "open")?,
            high: field(2, "high")?,
            low: field(3, "low")?,
            close: field(4, "close")?,
            volume: field(5, "volume")?,
        })
    }
}

#[async_trait]
impl Provider for BinanceProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn supports(&self, asset_class: AssetClass) -> bool {
        asset_class == AssetClass::Crypto
    }

    async fn healthcheck(&self) -> Result<(), ProviderError> {
        let url = format!("{}/api/v3/time", self.base_url);
        let response = self.client.get(&url).send().await.map_err(|e| {
            ProviderError::Transient {
                provider: NAME,
                detail: e.to_string(),
            }
        })?;
        match Self::classify_status(response.status()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn fetch(
        &self,
        symbol: &Symbol,
        timeframe: TimeFrame,
        count: usize,
    ) -> Result<Vec<Candle>, ProviderError> {
        self.limiter.until_ready().await;

        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            Self::pair(symbol),
            timeframe.as_str(),
            count.min(1000),
        );
        debug!("GET {url}");

        let response = self.client.get(&url).send().await.map_err(|e| {
            ProviderError::Transient {
                provider: NAME,
                detail: e.to_string(),
            }
        })?;
        if let Some(err) = Self::classify_status(response.status()) {
            return Err(err);
        }

        let klines: Vec<Vec<serde_json::Value>> =
            response.json().await.map_err(|e| ProviderError::Unknown {
                provider: NAME,
                detail: format!("kline decode: {e}"),
            })?;

        klines.iter().map(|k| Self::parse_kline(k)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_kline_parsing() {
        let kline: Vec<serde_json::Value> = serde_json::from_str(
            r#"[1700000000000, "65432.5", "65500.0", "65400.1", "65480.2", "123.45", 1700000299999, "0", 10, "0", "0", "0"]"#,
        )
        .unwrap();
        let candle = BinanceProvider::parse_kline(&kline).unwrap();
        assert_eq!(candle.open, dec!(65432.5));
        assert_eq!(candle.close, dec!(65480.2));
        assert_eq!(candle.volume, dec!(123.45));
        assert_eq!(candle.open_time.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_malformed_kline_is_an_error() {
        let kline: Vec<serde_json::Value> = serde_json::from_str(r#"[1700000000000, "not-a-number"]"#).unwrap();
        assert!(BinanceProvider::parse_kline(&kline).is_err());
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            BinanceProvider::classify_status(StatusCode::TOO_MANY_REQUESTS),
            Some(ProviderError::RateLimited { .. })
        ));
        assert!(matches!(
            BinanceProvider::classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            Some(ProviderError::Unavailable { .. })
        ));
        assert!(BinanceProvider::classify_status(StatusCode::OK).is_none());
    }

    #[test]
    fn test_supports_crypto_only() {
        let provider = BinanceProvider::new(Client::new());
        assert!(provider.supports(AssetClass::Crypto));
        assert!(!provider.supports(AssetClass::Index));
    }
}
