//! 시세 스냅샷.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 한 사이클에서 수집된 단일 자산의 시세.
///
/// `fetched_at`은 provider가 아니라 오케스트레이터가 부여하며, 한 사이클의
/// 모든 스냅샷이 같은 값을 공유합니다. 저장 키는 `(provider_id, fetched_at)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    pub provider_id: i64,
    pub symbol: String,
    pub name: String,
    /// USD 가격
    pub price: Decimal,
    pub market_cap: Option<Decimal>,
    pub volume_24h: Option<Decimal>,
    pub percent_change_1h: Option<Decimal>,
    pub percent_change_24h: Option<Decimal>,
    pub percent_change_7d: Option<Decimal>,
    pub circulating_supply: Option<Decimal>,
    pub total_supply: Option<Decimal>,
    /// Provider가 보고한 마지막 갱신 시각
    pub provider_timestamp: Option<DateTime<Utc>>,
    /// 사이클 타임스탬프
    pub fetched_at: DateTime<Utc>,
}

impl QuoteSnapshot {
    /// 저장 키.
    pub fn key(&self) -> (i64, DateTime<Utc>) {
        (self.provider_id, self.fetched_at)
    }

    /// provider 시계 기준 지연 시간 (provider 시각이 없으면 `None`).
    pub fn staleness(&self) -> Option<chrono::Duration> {
        self.provider_timestamp.map(|ts| self.fetched_at - ts)
    }
}
