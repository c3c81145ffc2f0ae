//! 스냅샷 및 추적 자산 저장소.
//!
//! 모든 쓰기는 멱등 upsert입니다:
//! - 시세: `(provider_id, fetched_at)` 키
//! - 자산: `provider_id` 키 (`enabled`, `created_at`은 덮어쓰지 않음)

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use ticker_core::{AssetIdentity, QuoteSnapshot, RequestContext, Result, TrackedAsset};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// 데드라인 경과로 저장하지 못한 자산의 실패 사유.
pub const DEADLINE_EXCEEDED: &str = "deadline exceeded before write";

/// 자산 단위 저장 실패.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetFailure {
    pub provider_id: i64,
    pub reason: String,
}

/// 스냅샷 저장 결과.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistReport {
    /// 저장된 자산
    pub persisted: Vec<i64>,
    /// 저장 실패 자산
    pub failed: Vec<AssetFailure>,
}

impl PersistReport {
    /// 모든 자산이 저장되었는지 확인.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_ids(&self) -> Vec<i64> {
        self.failed.iter().map(|f| f.provider_id).collect()
    }

    /// 데드라인 경과로 쓰지 못한 자산 기록.
    pub fn deadline_exceeded(&mut self, remaining: &[QuoteSnapshot]) {
        self.failed.extend(remaining.iter().map(|s| AssetFailure {
            provider_id: s.provider_id,
            reason: DEADLINE_EXCEEDED.to_string(),
        }));
    }
}

/// 스냅샷 저장.
#[async_trait]
pub trait Persister: Send + Sync {
    /// 스냅샷 집합 upsert.
    ///
    /// 같은 집합을 여러 번 적용해도 한 번 적용한 것과 같은 상태가 됩니다.
    /// 일부 자산만 실패하면 `Ok`로 반환하고 `PersistReport::failed`에 기록합니다.
    ///
    /// `ctx`의 데드라인이 지나면 남은 자산을 쓰지 않고 `failed`로 보고합니다.
    /// 취소 신호는 무시합니다.
    async fn apply(&self, ctx: &RequestContext, snapshots: &[QuoteSnapshot]) -> Result<PersistReport>;
}

/// 추적 자산 레지스트리 저장소.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// 식별자 조회 결과 upsert. 신규 자산은 활성 상태로 생성됩니다.
    ///
    /// 쓰기는 한 번에 반영되어 읽는 쪽이 일부만 쓰인 상태를 보지 않습니다.
    async fn upsert_assets(&self, identities: &[AssetIdentity]) -> Result<Vec<TrackedAsset>>;

    /// 전체 자산 (생성 순).
    async fn list_assets(&self) -> Result<Vec<TrackedAsset>>;

    /// 활성 여부 변경. 자산이 없으면 `false`.
    async fn set_enabled(&self, provider_id: i64, enabled: bool) -> Result<bool>;
}
