//! 추적 자산 레지스트리.
//!
//! 식별자 해석 작업이 쓰고 시세 사이클이 읽습니다. 쓰기는 새 `AssetSet`을
//! 만들어 포인터만 교체하므로 읽는 쪽은 일부만 갱신된 상태를 보지 않습니다.

use std::sync::{Arc, RwLock};

use ticker_core::{AssetSet, TrackedAsset};

/// 공유 자산 집합.
#[derive(Debug, Clone, Default)]
pub struct AssetRegistry {
    current: Arc<RwLock<Arc<AssetSet>>>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 현재 자산 집합 스냅샷.
    ///
    /// 반환된 집합은 이후 레지스트리가 바뀌어도 변하지 않습니다.
    pub fn snapshot(&self) -> Arc<AssetSet> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    /// 활성 자산으로 집합 교체.
    pub fn replace(&self, assets: &[TrackedAsset]) -> Arc<AssetSet> {
        self.set(AssetSet::from_assets(assets))
    }

    /// 집합 교체.
    pub fn set(&self, set: AssetSet) -> Arc<AssetSet> {
        let next = Arc::new(set);
        match self.current.write() {
            Ok(mut guard) => *guard = Arc::clone(&next),
            Err(poisoned) => *poisoned.into_inner() = Arc::clone(&next),
        }
        next
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn asset(provider_id: i64, enabled: bool) -> TrackedAsset {
        TrackedAsset {
            id: provider_id,
            provider_id,
            symbol: format!("S{}", provider_id),
            name: format!("Asset {}", provider_id),
            slug: None,
            enabled,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_snapshot_is_stable_across_replace() {
        let registry = AssetRegistry::new();
        registry.set(AssetSet::new([1, 1027]));

        let before = registry.snapshot();
        registry.replace(&[asset(1, true), asset(1027, false), asset(5994, true)]);

        assert_eq!(before.ids(), &[1, 1027]);
        assert_eq!(registry.snapshot().ids(), &[1, 5994]);
    }

    #[test]
    fn test_clones_share_state() {
        let registry = AssetRegistry::new();
        let reader = registry.clone();
        assert!(reader.is_empty());

        registry.set(AssetSet::new([1]));
        assert_eq!(reader.len(), 1);
    }
}
