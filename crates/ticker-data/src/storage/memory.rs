//! 인메모리 저장소.
//!
//! `USE_DB=false`일 때와 테스트에서 사용합니다. 키 규칙은 PostgreSQL 구현과 같습니다.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ticker_core::{AssetIdentity, QuoteSnapshot, RequestContext, Result, TickerError, TrackedAsset};

use super::{AssetStore, PersistReport, Persister};

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    /// provider_id -> 자산
    assets: BTreeMap<i64, TrackedAsset>,
    quotes: BTreeMap<(i64, DateTime<Utc>), QuoteSnapshot>,
}

/// 인메모리 저장소.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장된 시세 스냅샷 (키 순).
    pub fn quotes(&self) -> Vec<QuoteSnapshot> {
        self.state
            .read()
            .map(|s| s.quotes.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn quote_count(&self) -> usize {
        self.state.read().map(|s| s.quotes.len()).unwrap_or(0)
    }

    fn poisoned() -> TickerError {
        TickerError::Persistence("memory store lock poisoned".to_string())
    }
}

#[async_trait]
impl Persister for MemoryStore {
    async fn apply(&self, ctx: &RequestContext, snapshots: &[QuoteSnapshot]) -> Result<PersistReport> {
        let mut report = PersistReport::default();
        if ctx.is_expired() {
            report.deadline_exceeded(snapshots);
            return Ok(report);
        }

        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        for snapshot in snapshots {
            state.quotes.insert(snapshot.key(), snapshot.clone());
            report.persisted.push(snapshot.provider_id);
        }

        Ok(report)
    }
}

#[async_trait]
impl AssetStore for MemoryStore {
    async fn upsert_assets(&self, identities: &[AssetIdentity]) -> Result<Vec<TrackedAsset>> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        let now = Utc::now();
        let mut upserted = Vec::with_capacity(identities.len());

        for identity in identities {
            let existing = state.assets.get(&identity.provider_id).cloned();
            let asset = match existing {
                Some(existing) => TrackedAsset {
                    symbol: identity.symbol.clone(),
                    name: identity.name.clone(),
                    slug: identity.slug.clone(),
                    ..existing
                },
                None => {
                    state.next_id += 1;
                    TrackedAsset {
                        id: state.next_id,
                        provider_id: identity.provider_id,
                        symbol: identity.symbol.clone(),
                        name: identity.name.clone(),
                        slug: identity.slug.clone(),
                        enabled: true,
                        created_at: now,
                    }
                }
            };
            state.assets.insert(asset.provider_id, asset.clone());
            upserted.push(asset);
        }

        Ok(upserted)
    }

    async fn list_assets(&self) -> Result<Vec<TrackedAsset>> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        let mut assets: Vec<TrackedAsset> = state.assets.values().cloned().collect();
        assets.sort_by_key(|a| a.id);
        Ok(assets)
    }

    async fn set_enabled(&self, provider_id: i64, enabled: bool) -> Result<bool> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        match state.assets.get_mut(&provider_id) {
            Some(asset) => {
                asset.enabled = enabled;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn identity(provider_id: i64, symbol: &str) -> AssetIdentity {
        AssetIdentity {
            provider_id,
            symbol: symbol.to_string(),
            name: symbol.to_lowercase(),
            slug: None,
            rank: None,
        }
    }

    fn snapshot(provider_id: i64, fetched_at: DateTime<Utc>) -> QuoteSnapshot {
        QuoteSnapshot {
            provider_id,
            symbol: format!("S{}", provider_id),
            name: format!("Asset {}", provider_id),
            price: dec!(10.5),
            market_cap: Some(dec!(1000)),
            volume_24h: None,
            percent_change_1h: None,
            percent_change_24h: Some(dec!(-1.25)),
            percent_change_7d: None,
            circulating_supply: None,
            total_supply: None,
            provider_timestamp: None,
            fetched_at,
        }
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let ctx = RequestContext::background();
        let store = MemoryStore::new();
        let cycle = Utc::now();
        let snapshots = vec![snapshot(1, cycle), snapshot(1027, cycle), snapshot(5994, cycle)];

        store.apply(&ctx, &snapshots).await.unwrap();
        let once = store.quotes();
        store.apply(&ctx, &snapshots).await.unwrap();

        assert_eq!(store.quotes(), once);
        assert_eq!(store.quote_count(), 3);
    }

    #[tokio::test]
    async fn test_distinct_cycles_are_kept() {
        let ctx = RequestContext::background();
        let store = MemoryStore::new();
        let first = Utc::now();
        let second = first + chrono::Duration::minutes(2);

        store.apply(&ctx, &[snapshot(1, first)]).await.unwrap();
        store.apply(&ctx, &[snapshot(1, second)]).await.unwrap();

        assert_eq!(store.quote_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_after_deadline_writes_nothing() {
        let store = MemoryStore::new();
        let ctx = RequestContext::background().with_timeout(std::time::Duration::from_secs(1));
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;

        let report = store
            .apply(&ctx, &[snapshot(1, Utc::now()), snapshot(1027, Utc::now())])
            .await
            .unwrap();

        assert!(report.persisted.is_empty());
        assert_eq!(report.failed_ids(), vec![1, 1027]);
        assert_eq!(store.quote_count(), 0);
    }

    #[tokio::test]
    async fn test_upsert_keeps_enabled_and_created_at() {
        let store = MemoryStore::new();
        let created = store.upsert_assets(&[identity(1, "BTC")]).await.unwrap();
        assert!(created[0].enabled);

        store.set_enabled(1, false).await.unwrap();
        let updated = store
            .upsert_assets(&[AssetIdentity {
                name: "Bitcoin".to_string(),
                ..identity(1, "BTC")
            }])
            .await
            .unwrap();

        assert_eq!(updated[0].id, created[0].id);
        assert_eq!(updated[0].created_at, created[0].created_at);
        assert_eq!(updated[0].name, "Bitcoin");
        assert!(!updated[0].enabled);
    }

    #[tokio::test]
    async fn test_list_assets_in_creation_order() {
        let store = MemoryStore::new();
        store
            .upsert_assets(&[identity(5994, "SOL"), identity(1, "BTC")])
            .await
            .unwrap();
        store.upsert_assets(&[identity(1027, "ETH")]).await.unwrap();

        let ids: Vec<i64> = store
            .list_assets()
            .await
            .unwrap()
            .iter()
            .map(|a| a.provider_id)
            .collect();
        assert_eq!(ids, vec![5994, 1, 1027]);
        assert!(!store.set_enabled(42, false).await.unwrap());
    }
}
