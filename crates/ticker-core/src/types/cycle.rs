//! 사이클 결과.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{ErrorKind, TickerError};

/// 사이클 결과 분류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    Success,
    /// 일부 자산만 저장됨
    PartialFailure,
    Failure,
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PartialFailure => "partial_failure",
            Self::Failure => "failure",
        }
    }
}

/// tick 한 번에 대한 결과. 로그/통계에서 소비되며 저장되지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleResult {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcome: CycleOutcome,
    pub error_kind: Option<ErrorKind>,
    /// 에러 상세 메시지
    pub error: Option<String>,
    /// 요청한 자산 수
    pub requested: usize,
    /// 저장된 스냅샷 수
    pub snapshot_count: usize,
    /// 저장에 실패한 자산 (다음 사이클에서 다시 upsert됨)
    pub failed_assets: Vec<i64>,
}

impl CycleResult {
    /// 성공 결과.
    pub fn success(started_at: DateTime<Utc>, requested: usize, snapshot_count: usize) -> Self {
        Self {
            started_at,
            ended_at: Utc::now(),
            outcome: CycleOutcome::Success,
            error_kind: None,
            error: None,
            requested,
            snapshot_count,
            failed_assets: Vec::new(),
        }
    }

    /// 실패 결과 (스냅샷 저장 없음).
    pub fn failure(started_at: DateTime<Utc>, requested: usize, error: &TickerError) -> Self {
        Self {
            started_at,
            ended_at: Utc::now(),
            outcome: CycleOutcome::Failure,
            error_kind: Some(error.kind()),
            error: Some(error.to_string()),
            requested,
            snapshot_count: 0,
            failed_assets: Vec::new(),
        }
    }

    /// 일부 자산만 저장된 결과.
    pub fn partial(
        started_at: DateTime<Utc>,
        requested: usize,
        snapshot_count: usize,
        failed_assets: Vec<i64>,
        error: &TickerError,
    ) -> Self {
        Self {
            started_at,
            ended_at: Utc::now(),
            outcome: CycleOutcome::PartialFailure,
            error_kind: Some(error.kind()),
            error: Some(error.to_string()),
            requested,
            snapshot_count,
            failed_assets,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == CycleOutcome::Success
    }

    /// 소요 시간.
    pub fn duration(&self) -> std::time::Duration {
        (self.ended_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_records_kind() {
        let err = TickerError::ProviderApplication {
            code: 1002,
            message: "rate limited".into(),
            credit_count: 0,
        };
        let result = CycleResult::failure(Utc::now(), 3, &err);

        assert_eq!(result.outcome, CycleOutcome::Failure);
        assert_eq!(result.error_kind, Some(ErrorKind::ProviderApplication));
        assert_eq!(result.snapshot_count, 0);
        assert!(result.ended_at >= result.started_at);
    }

    #[test]
    fn test_partial_keeps_failed_assets() {
        let err = TickerError::Persistence("1 of 3 failed".into());
        let result = CycleResult::partial(Utc::now(), 3, 2, vec![5994], &err);

        assert_eq!(result.outcome, CycleOutcome::PartialFailure);
        assert_eq!(result.failed_assets, vec![5994]);
        assert!(!result.is_success());
    }
}
