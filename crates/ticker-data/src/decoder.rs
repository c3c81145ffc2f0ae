//! Provider payload 디코더.
//!
//! 디코딩은 I/O나 공유 상태가 없는 순수 함수입니다. 같은 payload는 항상 같은
//! 결과를 냅니다 (스냅샷은 provider ID 오름차순).
//!
//! 응답 본문 구조:
//!
//! ```text
//! {
//!   "status": { "error_code": 0, "error_message": null, "credit_count": 1 },
//!   "data": { "1": { "id": 1, "symbol": "BTC", "quote": { "USD": { "price": ... } } } }
//! }
//! ```
//!
//! `error_code != 0`이면 HTTP 200이라도 provider 애플리케이션 에러입니다.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;

use ticker_core::{AssetIdentity, QuoteSnapshot, Result, TickerError};

/// 시세에 사용하는 환산 통화.
pub const QUOTE_CURRENCY: &str = "USD";

/// 원본 payload -> 스냅샷 디코더.
pub trait QuoteDecoder: Send + Sync {
    /// payload를 스냅샷 목록으로 변환.
    ///
    /// `fetched_at`은 모든 스냅샷에 그대로 부여됩니다.
    /// 사용 가능한 USD 가격이 없는 자산은 결과에서 빠집니다.
    fn decode(&self, payload: &[u8], fetched_at: DateTime<Utc>) -> Result<Vec<QuoteSnapshot>>;
}

/// CoinMarketCap 시세 응답 디코더.
#[derive(Debug, Clone, Copy, Default)]
pub struct CmcQuoteDecoder;

impl QuoteDecoder for CmcQuoteDecoder {
    fn decode(&self, payload: &[u8], fetched_at: DateTime<Utc>) -> Result<Vec<QuoteSnapshot>> {
        let response: QuotesResponse = parse(payload)?;
        response.status.check()?;

        let data = response
            .data
            .ok_or_else(|| TickerError::decode("missing `data` object", payload.len()))?;

        let mut snapshots = Vec::with_capacity(data.len());
        for (key, coin) in data {
            if key.parse::<i64>().ok() != Some(coin.id) {
                return Err(TickerError::decode(
                    format!("data key `{}` does not match id {}", key, coin.id),
                    payload.len(),
                ));
            }
            if let Some(snapshot) = coin.into_snapshot(fetched_at) {
                snapshots.push(snapshot);
            }
        }

        snapshots.sort_by_key(|s| s.provider_id);
        Ok(snapshots)
    }
}

/// ID 맵 응답 디코딩.
///
/// 비활성(`is_active == 0`) 항목은 제외합니다.
pub fn decode_identity_map(payload: &[u8]) -> Result<Vec<AssetIdentity>> {
    let response: MapResponse = parse(payload)?;
    response.status.check()?;

    let entries = response
        .data
        .ok_or_else(|| TickerError::decode("missing `data` array", payload.len()))?;

    Ok(entries
        .into_iter()
        .filter(|e| e.is_active != Some(0))
        .map(|e| AssetIdentity {
            provider_id: e.id,
            symbol: e.symbol,
            name: e.name,
            slug: e.slug,
            rank: e.rank,
        })
        .collect())
}

fn parse<'a, T: Deserialize<'a>>(payload: &'a [u8]) -> Result<T> {
    serde_json::from_slice(payload).map_err(|e| TickerError::decode(e.to_string(), payload.len()))
}

// ============================================================================
// 응답 타입
// ============================================================================
//
// null이 올 수 있는 필드는 모두 Option입니다.

#[derive(Debug, Deserialize)]
struct ApiStatus {
    error_code: i64,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    credit_count: i64,
}

impl ApiStatus {
    fn check(&self) -> Result<()> {
        if self.error_code == 0 {
            return Ok(());
        }
        Err(TickerError::ProviderApplication {
            code: self.error_code,
            message: self
                .error_message
                .clone()
                .unwrap_or_else(|| "API error".to_string()),
            credit_count: self.credit_count,
        })
    }
}

#[derive(Debug, Deserialize)]
struct QuotesResponse {
    status: ApiStatus,
    #[serde(default)]
    data: Option<BTreeMap<String, CoinInfo>>,
}

#[derive(Debug, Deserialize)]
struct CoinInfo {
    id: i64,
    name: String,
    symbol: String,
    #[serde(default)]
    circulating_supply: Option<f64>,
    #[serde(default)]
    total_supply: Option<f64>,
    #[serde(default)]
    quote: HashMap<String, CoinQuote>,
}

#[derive(Debug, Deserialize)]
struct CoinQuote {
    price: Option<f64>,
    #[serde(default)]
    market_cap: Option<f64>,
    #[serde(default)]
    volume_24h: Option<f64>,
    #[serde(default)]
    percent_change_1h: Option<f64>,
    #[serde(default)]
    percent_change_24h: Option<f64>,
    #[serde(default)]
    percent_change_7d: Option<f64>,
    #[serde(default)]
    last_updated: Option<String>,
}

impl CoinInfo {
    fn into_snapshot(mut self, fetched_at: DateTime<Utc>) -> Option<QuoteSnapshot> {
        let quote = self.quote.remove(QUOTE_CURRENCY)?;
        let price = quote.price.and_then(to_decimal)?;

        Some(QuoteSnapshot {
            provider_id: self.id,
            symbol: self.symbol,
            name: self.name,
            price,
            market_cap: quote.market_cap.and_then(to_decimal),
            volume_24h: quote.volume_24h.and_then(to_decimal),
            percent_change_1h: quote.percent_change_1h.and_then(to_decimal),
            percent_change_24h: quote.percent_change_24h.and_then(to_decimal),
            percent_change_7d: quote.percent_change_7d.and_then(to_decimal),
            circulating_supply: self.circulating_supply.and_then(to_decimal),
            total_supply: self.total_supply.and_then(to_decimal),
            provider_timestamp: quote.last_updated.as_deref().and_then(parse_timestamp),
            fetched_at,
        })
    }
}

#[derive(Debug, Deserialize)]
struct MapResponse {
    status: ApiStatus,
    #[serde(default)]
    data: Option<Vec<MapEntry>>,
}

#[derive(Debug, Deserialize)]
struct MapEntry {
    id: i64,
    symbol: String,
    name: String,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    rank: Option<i64>,
    #[serde(default)]
    is_active: Option<i64>,
}

/// f64 -> Decimal (가장 짧은 십진 표현 기준).
fn to_decimal(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_str(&value.to_string())
        .ok()
        .or_else(|| Decimal::from_f64(value))
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}
