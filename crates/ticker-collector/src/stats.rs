//! 사이클 통계 구조체.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use ticker_core::{CycleOutcome, CycleResult, ErrorKind};

/// 시세 사이클 누적 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleStats {
    /// 총 사이클 수
    pub total: usize,
    /// 성공 횟수
    pub success: usize,
    /// 일부 실패 횟수
    pub partial: usize,
    /// 실패 횟수
    pub failure: usize,
    /// 에러 분류별 횟수
    pub by_kind: HashMap<ErrorKind, usize>,
    /// 저장된 총 스냅샷 수
    pub snapshots_persisted: usize,
    /// 사이클 소요 시간 합계
    #[serde(skip)]
    pub elapsed: Duration,
}

impl CycleStats {
    /// 새 통계 객체 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 사이클 결과 반영
    pub fn record(&mut self, result: &CycleResult) {
        self.total += 1;
        match result.outcome {
            CycleOutcome::Success => self.success += 1,
            CycleOutcome::PartialFailure => self.partial += 1,
            CycleOutcome::Failure => self.failure += 1,
        }
        if let Some(kind) = result.error_kind {
            *self.by_kind.entry(kind).or_default() += 1;
        }
        self.snapshots_persisted += result.snapshot_count;
        self.elapsed += result.duration();
    }

    /// 특정 분류의 에러 횟수
    pub fn count(&self, kind: ErrorKind) -> usize {
        self.by_kind.get(&kind).copied().unwrap_or(0)
    }

    /// 성공률 계산 (%)
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.success as f64 / self.total as f64) * 100.0
        }
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation = operation,
            total = self.total,
            success = self.success,
            partial = self.partial,
            failure = self.failure,
            transport = self.count(ErrorKind::Transport),
            provider_application = self.count(ErrorKind::ProviderApplication),
            decode = self.count(ErrorKind::Decode),
            persistence = self.count(ErrorKind::Persistence),
            snapshots = self.snapshots_persisted,
            success_rate = format!("{:.1}%", self.success_rate()),
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "사이클 통계"
        );
    }
}
