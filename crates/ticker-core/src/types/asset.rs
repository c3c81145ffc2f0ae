//! 추적 자산 타입.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 추적 중인 자산 (tracked_assets 테이블의 한 행).
///
/// 식별자 해석에 처음 성공했을 때 생성되며, 이후에는 `enabled`만 변경됩니다.
/// 과거 시세와의 조인을 보존하기 위해 삭제하지 않고 비활성화만 합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedAsset {
    /// 저장소 기본 키
    pub id: i64,
    /// Provider 숫자 ID (예: BTC -> 1, ETH -> 1027)
    pub provider_id: i64,
    pub symbol: String,
    /// 표시 이름 (예: Bitcoin)
    pub name: String,
    pub slug: Option<String>,
    /// 시세 수집 대상 여부
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// 식별자 맵 조회 결과 (저장 전).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetIdentity {
    pub provider_id: i64,
    pub symbol: String,
    pub name: String,
    pub slug: Option<String>,
    /// Provider 순위 (top-N 조회 시에만 존재)
    pub rank: Option<i64>,
}

/// 한 사이클에서 조회할 provider ID 목록.
///
/// 사이클 시작 시점에 활성 자산으로부터 만들어지는 읽기 전용 스냅샷입니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssetSet {
    ids: Vec<i64>,
}

impl AssetSet {
    /// ID 목록에서 생성 (순서 유지, 중복 제거).
    pub fn new(ids: impl IntoIterator<Item = i64>) -> Self {
        let mut seen = HashSet::new();
        let ids = ids.into_iter().filter(|id| seen.insert(*id)).collect();
        Self { ids }
    }

    /// 활성화된 자산만 추려 생성.
    pub fn from_assets<'a>(assets: impl IntoIterator<Item = &'a TrackedAsset>) -> Self {
        Self::new(
            assets
                .into_iter()
                .filter(|a| a.enabled)
                .map(|a| a.provider_id),
        )
    }

    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, provider_id: i64) -> bool {
        self.ids.contains(&provider_id)
    }

    /// 쿼리 파라미터 형식 (`1,1027,5994`).
    pub fn to_query_param(&self) -> String {
        self.ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}
