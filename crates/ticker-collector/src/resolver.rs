//! 심볼 -> provider ID 해석.
//!
//! 시세 사이클보다 훨씬 긴 자체 주기로 실행됩니다. 해석에 실패하면 레지스트리를
//! 건드리지 않으므로, 시세 사이클은 마지막으로 유효했던 자산 집합으로 계속 동작합니다.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ticker_core::{AssetIdentity, AssetSet, RequestContext, TickerError, TrackedAsset};
use ticker_data::{AssetStore, IdentitySource};

use crate::error::CollectorError;
use crate::registry::AssetRegistry;
use crate::schedule::{Job, Scheduler, TaskState};
use crate::Result;

struct ResolverCore {
    source: Arc<dyn IdentitySource>,
    store: Arc<dyn AssetStore>,
    registry: AssetRegistry,
    symbols: Vec<String>,
    bootstrap_top_n: usize,
}

/// 식별자 해석기.
pub struct IdentityResolver {
    core: Arc<ResolverCore>,
    scheduler: Scheduler,
}

impl IdentityResolver {
    /// `symbols`: 주기적으로 해석할 심볼.
    /// `bootstrap_top_n`: 추적 자산이 하나도 없을 때 가져올 상위 자산 수 (0이면 사용 안 함).
    pub fn new(
        source: Arc<dyn IdentitySource>,
        store: Arc<dyn AssetStore>,
        registry: AssetRegistry,
        symbols: Vec<String>,
        bootstrap_top_n: usize,
        shutdown: &CancellationToken,
    ) -> Self {
        Self {
            core: Arc::new(ResolverCore {
                source,
                store,
                registry,
                symbols,
                bootstrap_top_n,
            }),
            scheduler: Scheduler::new("identity-resolver", shutdown),
        }
    }

    /// 심볼 해석 후 추적 자산으로 등록.
    pub async fn resolve(
        &self,
        ctx: &RequestContext,
        symbols: &[String],
    ) -> ticker_core::Result<Vec<TrackedAsset>> {
        self.core.resolve(ctx, symbols).await
    }

    /// 순위 상위 `n`개 자산 등록 (초기 구성용).
    pub async fn top_n(&self, ctx: &RequestContext, n: usize) -> ticker_core::Result<Vec<TrackedAsset>> {
        self.core.top_n(ctx, n).await
    }

    /// 설정된 심볼 해석 (또는 초기 구성) 후 레지스트리 갱신.
    pub async fn refresh(&self, ctx: &RequestContext) -> ticker_core::Result<Arc<AssetSet>> {
        self.core.refresh(ctx).await
    }

    /// 저장소에서 레지스트리 다시 읽기.
    pub async fn reload_registry(&self, ctx: &RequestContext) -> ticker_core::Result<Arc<AssetSet>> {
        self.core.reload_registry(ctx).await
    }

    /// 주기 실행 시작. 첫 실행은 `every` 이후입니다.
    pub fn start(&self, every: Duration, timeout: Duration) -> Result<()> {
        if timeout >= every {
            return Err(CollectorError::Config(format!(
                "resolver timeout {:?} must be shorter than interval {:?}",
                timeout, every
            )));
        }
        self.scheduler.start(self.core.clone(), every, timeout)
    }

    pub async fn stop(&self) {
        self.scheduler.stop().await;
    }

    pub fn state(&self) -> TaskState {
        self.scheduler.state()
    }
}

#[async_trait]
impl Job for ResolverCore {
    async fn run(&self, ctx: &RequestContext) {
        match self.refresh(ctx).await {
            Ok(set) => info!(assets = set.len(), "식별자 해석 완료"),
            Err(TickerError::Cancelled) => debug!("식별자 해석 중단 (종료 신호)"),
            Err(e) => warn!(
                error = %e,
                error_kind = %e.kind(),
                assets = self.registry.len(),
                "식별자 해석 실패, 기존 자산 집합으로 진행"
            ),
        }
    }
}

impl ResolverCore {
    async fn resolve(
        &self,
        ctx: &RequestContext,
        symbols: &[String],
    ) -> ticker_core::Result<Vec<TrackedAsset>> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }

        let identities = ctx.run(self.source.lookup_symbols(ctx, symbols)).await??;
        let picked = pick_canonical(symbols, identities);

        let unresolved: Vec<&String> = symbols
            .iter()
            .filter(|s| !picked.iter().any(|i| i.symbol.eq_ignore_ascii_case(s)))
            .collect();
        if !unresolved.is_empty() {
            warn!(symbols = ?unresolved, "provider ID를 찾지 못한 심볼");
        }

        self.register(ctx, &picked).await
    }

    async fn top_n(&self, ctx: &RequestContext, n: usize) -> ticker_core::Result<Vec<TrackedAsset>> {
        let identities = ctx.run(self.source.top_assets(ctx, n)).await??;
        self.register(ctx, &identities).await
    }

    async fn refresh(&self, ctx: &RequestContext) -> ticker_core::Result<Arc<AssetSet>> {
        if !self.symbols.is_empty() {
            self.resolve(ctx, &self.symbols).await?;
        } else if self.bootstrap_top_n > 0 && self.list_assets(ctx).await?.is_empty() {
            info!(n = self.bootstrap_top_n, "추적 자산 없음, 상위 자산으로 초기 구성");
            self.top_n(ctx, self.bootstrap_top_n).await?;
        }
        self.reload_registry(ctx).await
    }

    async fn reload_registry(&self, ctx: &RequestContext) -> ticker_core::Result<Arc<AssetSet>> {
        let assets = self.list_assets(ctx).await?;
        Ok(self.registry.replace(&assets))
    }

    async fn list_assets(&self, ctx: &RequestContext) -> ticker_core::Result<Vec<TrackedAsset>> {
        ctx.run_until_deadline(self.store.list_assets()).await?
    }

    /// 조회 결과 저장 후 레지스트리 반영.
    async fn register(
        &self,
        ctx: &RequestContext,
        identities: &[AssetIdentity],
    ) -> ticker_core::Result<Vec<TrackedAsset>> {
        if identities.is_empty() {
            return Ok(Vec::new());
        }

        let tracked = ctx
            .run_until_deadline(self.store.upsert_assets(identities))
            .await??;
        debug!(count = tracked.len(), "추적 자산 upsert 완료");

        self.reload_registry(ctx).await?;
        Ok(tracked)
    }
}

/// 심볼마다 하나의 항목 선택.
///
/// 같은 심볼을 쓰는 자산이 여럿이면 순위가 가장 높은(숫자가 작은) 항목을 고르고,
/// 순위가 없거나 같으면 ID가 작은 쪽을 고릅니다. 결과는 요청한 심볼 순서를 따릅니다.
pub fn pick_canonical(symbols: &[String], identities: Vec<AssetIdentity>) -> Vec<AssetIdentity> {
    let mut best: HashMap<String, AssetIdentity> = HashMap::new();
    for identity in identities {
        let key = identity.symbol.to_uppercase();
        let replace = match best.get(&key) {
            Some(current) => rank_key(&identity) < rank_key(current),
            None => true,
        };
        if replace {
            best.insert(key, identity);
        }
    }

    symbols
        .iter()
        .filter_map(|s| best.remove(&s.to_uppercase()))
        .collect()
}

fn rank_key(identity: &AssetIdentity) -> (i64, i64) {
    (identity.rank.unwrap_or(i64::MAX), identity.provider_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(provider_id: i64, symbol: &str, rank: Option<i64>) -> AssetIdentity {
        AssetIdentity {
            provider_id,
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            slug: None,
            rank,
        }
    }

    #[test]
    fn test_pick_canonical_prefers_best_rank() {
        let symbols = vec!["ETH".to_string(), "BTC".to_string()];
        let picked = pick_canonical(
            &symbols,
            vec![
                identity(1, "BTC", Some(1)),
                identity(31469, "BTC", Some(4210)),
                identity(29991, "ETH", None),
                identity(1027, "ETH", Some(2)),
            ],
        );

        let ids: Vec<i64> = picked.iter().map(|i| i.provider_id).collect();
        assert_eq!(ids, vec![1027, 1]);
    }

    #[test]
    fn test_pick_canonical_without_rank_uses_lowest_id() {
        let symbols = vec!["sol".to_string()];
        let picked = pick_canonical(
            &symbols,
            vec![identity(16116, "SOL", None), identity(5994, "SOL", None)],
        );
        assert_eq!(picked[0].provider_id, 5994);
    }

    #[test]
    fn test_pick_canonical_skips_unknown() {
        let symbols = vec!["BTC".to_string(), "NOPE".to_string()];
        let picked = pick_canonical(&symbols, vec![identity(1, "BTC", Some(1))]);
        assert_eq!(picked.len(), 1);
    }
}
