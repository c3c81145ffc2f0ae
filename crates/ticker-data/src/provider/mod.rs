//! 외부 데이터 소스 클라이언트.
//!
//! 각 호출은 provider와의 왕복 1회이며 내부 재시도를 하지 않습니다.
//! 재시도는 오케스트레이터의 다음 tick이 담당합니다.

pub mod cmc;

use async_trait::async_trait;
use ticker_core::{AssetIdentity, AssetSet, RequestContext, Result};

pub use cmc::{CmcClient, CmcConfig};

/// 시세 조회 클라이언트.
#[async_trait]
pub trait QuoteFetcher: Send + Sync {
    /// Provider 이름.
    fn name(&self) -> &str;

    /// 자산 집합의 시세 원본 payload 조회.
    ///
    /// `ctx`의 데드라인을 지키고, 취소 후에는 즉시 반환해야 합니다.
    async fn fetch(&self, ctx: &RequestContext, assets: &AssetSet) -> Result<Vec<u8>>;
}

/// 심볼 -> provider ID 매핑 조회.
#[async_trait]
pub trait IdentitySource: Send + Sync {
    /// 심볼 목록 조회. 같은 심볼에 여러 항목이 올 수 있습니다.
    async fn lookup_symbols(
        &self,
        ctx: &RequestContext,
        symbols: &[String],
    ) -> Result<Vec<AssetIdentity>>;

    /// 순위 기준 상위 `limit`개 자산 조회.
    async fn top_assets(&self, ctx: &RequestContext, limit: usize) -> Result<Vec<AssetIdentity>>;
}
