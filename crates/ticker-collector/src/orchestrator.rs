//! 시세 사이클 오케스트레이터.
//!
//! tick마다 사이클 하나를 실행합니다: 자산 집합 스냅샷 -> fetch -> decode -> persist.
//!
//! - 사이클 본문은 인스턴스당 한 번에 하나만 실행됩니다.
//! - 어느 단계의 실패도 해당 사이클만 중단시키며, 분류되어 [`CycleResult`]로 남습니다.
//! - 종료 신호는 대기 중인 fetch를 즉시 중단시킵니다. 이미 시작된 저장은
//!   데드라인 안에서 끝까지 진행되어 종료로 인한 부분 저장이 생기지 않습니다.
//! - 데드라인 때문에 쓰지 못한 자산은 `PartialFailure`의 실패 자산으로 보고됩니다.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use ticker_core::{CycleOutcome, CycleResult, ErrorKind, RequestContext, TickerError};
use ticker_data::{Persister, QuoteDecoder, QuoteFetcher};

use crate::error::CollectorError;
use crate::registry::AssetRegistry;
use crate::schedule::{Job, Scheduler, TaskState};
use crate::stats::CycleStats;
use crate::Result;

/// 사이클 본문과 협력자.
struct CycleRunner {
    fetcher: Arc<dyn QuoteFetcher>,
    decoder: Arc<dyn QuoteDecoder>,
    persister: Arc<dyn Persister>,
    registry: AssetRegistry,
    /// 재진입 방지 (대기하지 않고 try_lock)
    guard: tokio::sync::Mutex<()>,
    stats: Mutex<CycleStats>,
    last: Mutex<Option<CycleResult>>,
}

/// 시세 사이클 오케스트레이터.
pub struct CycleOrchestrator {
    runner: Arc<CycleRunner>,
    scheduler: Scheduler,
}

impl CycleOrchestrator {
    /// 협력자를 주입받아 생성.
    ///
    /// `shutdown`은 프로세스 종료 토큰이며, 오케스트레이터는 그 하위 토큰을 사용합니다.
    pub fn new(
        fetcher: Arc<dyn QuoteFetcher>,
        decoder: Arc<dyn QuoteDecoder>,
        persister: Arc<dyn Persister>,
        registry: AssetRegistry,
        shutdown: &CancellationToken,
    ) -> Self {
        Self {
            runner: Arc::new(CycleRunner {
                fetcher,
                decoder,
                persister,
                registry,
                guard: tokio::sync::Mutex::new(()),
                stats: Mutex::new(CycleStats::new()),
                last: Mutex::new(None),
            }),
            scheduler: Scheduler::new("quote-cycle", shutdown),
        }
    }

    /// 주기 실행 시작. 첫 사이클은 `tick_interval` 이후에 실행됩니다.
    pub fn start(&self, tick_interval: Duration, cycle_timeout: Duration) -> Result<()> {
        if cycle_timeout >= tick_interval {
            return Err(CollectorError::Config(format!(
                "cycle timeout {:?} must be shorter than tick interval {:?}",
                cycle_timeout, tick_interval
            )));
        }
        self.scheduler
            .start(self.runner.clone(), tick_interval, cycle_timeout)
    }

    /// 사이클 한 번 실행.
    ///
    /// 데드라인은 `cycle_timeout`과 `ctx`의 데드라인 중 이른 쪽입니다.
    /// 다른 사이클이 실행 중이면 기다리지 않고 `CycleInProgress`를 반환합니다.
    pub async fn run_once(
        &self,
        ctx: &RequestContext,
        cycle_timeout: Duration,
    ) -> Result<CycleResult> {
        self.runner.cycle(&ctx.with_timeout(cycle_timeout)).await
    }

    /// 종료 신호 후 실행 중인 사이클이 끝날 때까지 대기. 여러 번 호출해도 안전합니다.
    pub async fn stop(&self) {
        self.scheduler.stop().await;
    }

    pub fn state(&self) -> TaskState {
        self.scheduler.state()
    }

    /// 누적 통계.
    pub fn stats(&self) -> CycleStats {
        lock(&self.runner.stats).clone()
    }

    /// 마지막 사이클 결과.
    pub fn last_result(&self) -> Option<CycleResult> {
        lock(&self.runner.last).clone()
    }

    pub fn registry(&self) -> &AssetRegistry {
        &self.runner.registry
    }
}

#[async_trait]
impl Job for CycleRunner {
    async fn run(&self, ctx: &RequestContext) {
        if let Err(e) = self.cycle(ctx).await {
            warn!(error = %e, "tick 건너뜀");
        }
    }
}

impl CycleRunner {
    async fn cycle(&self, ctx: &RequestContext) -> Result<CycleResult> {
        let _guard = self
            .guard
            .try_lock()
            .map_err(|_| CollectorError::CycleInProgress)?;

        let result = self.execute(ctx).await;
        log_result(&result);

        lock(&self.stats).record(&result);
        *lock(&self.last) = Some(result.clone());
        Ok(result)
    }

    async fn execute(&self, ctx: &RequestContext) -> CycleResult {
        let started_at = Utc::now();
        // PostgreSQL TIMESTAMPTZ 정밀도
        let fetched_at = started_at.trunc_subsecs(6);

        // 1. 자산 집합 스냅샷 (사이클 도중 바뀌지 않음)
        let assets = self.registry.snapshot();
        if assets.is_empty() {
            warn!("추적 중인 자산이 없습니다. 사이클 건너뜀");
            return CycleResult::success(started_at, 0, 0);
        }
        let requested = assets.len();

        // 2. fetch
        let payload = match ctx.run(self.fetcher.fetch(ctx, &assets)).await {
            Ok(Ok(payload)) => payload,
            Ok(Err(e)) => return CycleResult::failure(started_at, requested, &e),
            Err(interrupted) => {
                return CycleResult::failure(started_at, requested, &interrupted.into())
            }
        };
        debug!(
            provider = self.fetcher.name(),
            bytes = payload.len(),
            "시세 응답 수신"
        );

        // 3. decode
        let snapshots = match self.decoder.decode(&payload, fetched_at) {
            Ok(snapshots) => snapshots,
            Err(e) => return CycleResult::failure(started_at, requested, &e),
        };

        if let Some(lag) = snapshots.iter().filter_map(|s| s.staleness()).max() {
            debug!(max_staleness_secs = lag.num_seconds(), "provider 시세 지연");
        }

        let missing: Vec<i64> = assets
            .ids()
            .iter()
            .copied()
            .filter(|id| !snapshots.iter().any(|s| s.provider_id == *id))
            .collect();

        if snapshots.is_empty() {
            let err = TickerError::decode("no usable quotes in payload", payload.len());
            return CycleResult::failure(started_at, requested, &err);
        }

        if ctx.is_cancelled() {
            return CycleResult::failure(started_at, requested, &TickerError::Cancelled);
        }

        // 4. persist (취소는 무시, 데드라인은 저장소가 행 단위로 적용)
        let report = match ctx
            .run_until_deadline(self.persister.apply(ctx, &snapshots))
            .await
        {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => return CycleResult::failure(started_at, requested, &e),
            Err(_) => {
                // 저장소가 데드라인 안에 보고하지 못함: 어떤 행이 쓰였는지 알 수 없음
                let err = TickerError::Persistence("deadline exceeded while persisting".into());
                let unknown = snapshots.iter().map(|s| s.provider_id).collect();
                return CycleResult::partial(started_at, requested, 0, unknown, &err);
            }
        };

        if report.persisted.is_empty() {
            let reason = report
                .failed
                .first()
                .map(|f| f.reason.clone())
                .unwrap_or_else(|| "no snapshot persisted".to_string());
            return CycleResult {
                failed_assets: report.failed_ids(),
                ..CycleResult::failure(started_at, requested, &TickerError::Persistence(reason))
            };
        }

        if !report.is_complete() {
            let mut failed = report.failed_ids();
            failed.extend(&missing);
            failed.sort_unstable();
            let err = TickerError::Persistence(format!(
                "{} of {} snapshots not persisted",
                report.failed.len(),
                snapshots.len()
            ));
            return CycleResult::partial(started_at, requested, report.persisted.len(), failed, &err);
        }

        if !missing.is_empty() {
            let err = TickerError::decode(
                format!("{} requested assets missing from payload", missing.len()),
                payload.len(),
            );
            return CycleResult::partial(started_at, requested, report.persisted.len(), missing, &err);
        }

        CycleResult::success(started_at, requested, report.persisted.len())
    }
}

/// 사이클 요약 로그 (사이클당 한 줄).
fn log_result(result: &CycleResult) {
    let duration_ms = result.duration().as_millis() as u64;
    let error_kind = result.error_kind.map(|k| k.as_str()).unwrap_or("none");

    match result.outcome {
        CycleOutcome::Success => info!(
            outcome = result.outcome.as_str(),
            requested = result.requested,
            snapshots = result.snapshot_count,
            duration_ms,
            "시세 사이클 완료"
        ),
        CycleOutcome::PartialFailure => warn!(
            outcome = result.outcome.as_str(),
            error_kind,
            requested = result.requested,
            snapshots = result.snapshot_count,
            failed_assets = ?result.failed_assets,
            error = result.error.as_deref().unwrap_or_default(),
            duration_ms,
            "시세 사이클 일부 실패"
        ),
        CycleOutcome::Failure if result.error_kind == Some(ErrorKind::Cancelled) => info!(
            outcome = result.outcome.as_str(),
            requested = result.requested,
            duration_ms,
            "시세 사이클 중단 (종료 신호)"
        ),
        CycleOutcome::Failure => error!(
            outcome = result.outcome.as_str(),
            error_kind,
            requested = result.requested,
            error = result.error.as_deref().unwrap_or_default(),
            duration_ms,
            "시세 사이클 실패"
        ),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
