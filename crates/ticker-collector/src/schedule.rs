//! 주기 실행 작업.
//!
//! 하나의 백그라운드 태스크가 자체 타이머로 작업을 반복 실행합니다.
//!
//! # 상태 전이
//!
//! ```text
//! Idle -(tick)-> Running -(완료)-> Idle
//!   |               |
//!   +---(stop)------+--> ShuttingDown -(실행 중 작업 종료)-> Stopped
//! ```
//!
//! - 첫 tick은 시작 후 한 주기가 지나야 발생합니다.
//! - 작업 실행 중 도착한 tick은 버려지며 대기열에 쌓이지 않습니다. 다음 실행은
//!   작업이 끝난 뒤의 첫 주기 경계입니다.
//! - 작업이 패닉해도 루프는 계속됩니다.
//! - 취소 신호는 다음 tick보다 항상 우선합니다.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use ticker_core::RequestContext;

use crate::error::CollectorError;
use crate::Result;

/// 작업 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// 다음 tick 대기 중
    Idle,
    /// 작업 실행 중
    Running,
    /// 종료 신호 수신, 새 tick 무시
    ShuttingDown,
    /// 종료됨
    Stopped,
}

/// 주기적으로 실행되는 작업.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// tick 한 번에 대한 실행.
    ///
    /// `ctx`는 스케줄러 취소 토큰과 작업 타임아웃을 담고 있습니다.
    /// 에러는 작업 내부에서 처리하고 로그로 남겨야 합니다. 패닉은 스케줄러가 잡아
    /// 로그로 남기고 해당 tick만 실패로 처리합니다.
    async fn run(&self, ctx: &RequestContext);
}

/// 반복 실행 스케줄러.
///
/// 프로세스 종료 토큰의 하위 토큰을 가지며, 부모가 취소되면 함께 멈춥니다.
pub struct Scheduler {
    name: String,
    token: CancellationToken,
    state: Arc<watch::Sender<TaskState>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

impl Scheduler {
    /// `parent` 토큰에 묶인 스케줄러 생성.
    pub fn new(name: impl Into<String>, parent: &CancellationToken) -> Self {
        let (state, _) = watch::channel(TaskState::Idle);
        Self {
            name: name.into(),
            token: parent.child_token(),
            state: Arc::new(state),
            handle: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> TaskState {
        *self.state.borrow()
    }

    /// 상태 변경 구독.
    pub fn subscribe(&self) -> watch::Receiver<TaskState> {
        self.state.subscribe()
    }

    /// 스케줄러 취소 토큰 (하위 컨텍스트 생성용).
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// 반복 실행 시작. 인스턴스당 한 번만 호출할 수 있습니다.
    pub fn start(&self, job: Arc<dyn Job>, every: Duration, timeout: Duration) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(CollectorError::AlreadyStarted(self.name.clone()));
        }

        info!(
            task = %self.name,
            interval_secs = every.as_secs_f64(),
            timeout_secs = timeout.as_secs_f64(),
            "주기 작업 시작"
        );

        let handle = tokio::spawn(run_loop(
            self.name.clone(),
            job,
            every,
            timeout,
            self.token.clone(),
            Arc::clone(&self.state),
        ));

        match self.handle.lock() {
            Ok(mut slot) => *slot = Some(handle),
            Err(poisoned) => *poisoned.into_inner() = Some(handle),
        }
        Ok(())
    }

    /// 종료 신호를 보내고 태스크가 끝날 때까지 대기.
    ///
    /// 실행 중인 작업은 자신의 데드라인 안에서 마무리됩니다.
    /// 여러 번 호출해도 안전하며, `start`와 다른 태스크에서 호출할 수 있습니다.
    pub async fn stop(&self) {
        if !self.token.is_cancelled() {
            info!(task = %self.name, "주기 작업 종료 요청");
        }
        self.token.cancel();

        if !self.started.load(Ordering::SeqCst) {
            self.state.send_replace(TaskState::Stopped);
            return;
        }

        self.state.send_if_modified(|state| match state {
            TaskState::Idle | TaskState::Running => {
                *state = TaskState::ShuttingDown;
                true
            }
            _ => false,
        });

        let handle = match self.handle.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        match handle {
            Some(handle) => {
                if let Err(e) = handle.await {
                    error!(task = %self.name, error = %e, "주기 작업 태스크 비정상 종료");
                    self.state.send_replace(TaskState::Stopped);
                }
            }
            None => {
                // 다른 호출자가 이미 핸들을 가져감
                let mut rx = self.state.subscribe();
                let _ = rx.wait_for(|s| *s == TaskState::Stopped).await;
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn run_loop(
    name: String,
    job: Arc<dyn Job>,
    every: Duration,
    timeout: Duration,
    token: CancellationToken,
    state: Arc<watch::Sender<TaskState>>,
) {
    let first = Instant::now() + every;
    let mut next = first;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                info!(task = %name, "종료 신호 수신");
                break;
            }
            _ = tokio::time::sleep_until(next) => {
                let began = state.send_if_modified(|s| {
                    if *s == TaskState::Idle {
                        *s = TaskState::Running;
                        true
                    } else {
                        false
                    }
                });
                if !began {
                    next = next_boundary(first, every, Instant::now());
                    continue;
                }

                let started = Instant::now();
                let ctx = RequestContext::new(token.clone()).with_timeout(timeout);
                if let Err(panic) = AssertUnwindSafe(job.run(&ctx)).catch_unwind().await {
                    error!(task = %name, panic = panic_message(&*panic), "작업 패닉, 다음 tick에서 재시도");
                }

                // 실행 중 지나간 tick은 버리고 다음 경계에서 재개
                let now = Instant::now();
                let elapsed = now.saturating_duration_since(started);
                next = next_boundary(first, every, now);
                if elapsed > every {
                    warn!(
                        task = %name,
                        elapsed_ms = elapsed.as_millis() as u64,
                        dropped_ticks = (elapsed.as_nanos() / every.as_nanos().max(1)) as u64,
                        "작업이 주기보다 오래 걸려 tick 누락"
                    );
                }

                state.send_if_modified(|s| {
                    if *s == TaskState::Running {
                        *s = TaskState::Idle;
                        true
                    } else {
                        false
                    }
                });
            }
        }
    }

    state.send_replace(TaskState::Stopped);
    debug!(task = %name, "주기 작업 종료됨");
}

/// `first + k * every` 중 `now` 이후 첫 시각.
fn next_boundary(first: Instant, every: Duration, now: Instant) -> Instant {
    if now < first {
        return first;
    }
    let period = every.as_nanos().max(1);
    let into_period = now.duration_since(first).as_nanos() % period;
    now + Duration::from_nanos((period - into_period) as u64)
}

fn panic_message<'a>(panic: &'a (dyn Any + Send + 'static)) -> &'a str {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Counter {
        runs: AtomicUsize,
        work: Duration,
    }

    #[async_trait]
    impl Job for Counter {
        async fn run(&self, ctx: &RequestContext) {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let _ = ctx.run(tokio::time::sleep(self.work)).await;
        }
    }

    fn counter(work: Duration) -> Arc<Counter> {
        Arc::new(Counter {
            runs: AtomicUsize::new(0),
            work,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_one_interval() {
        let job = counter(Duration::ZERO);
        let scheduler = Scheduler::new("test", &CancellationToken::new());
        scheduler
            .start(job.clone(), Duration::from_secs(10), Duration::from_secs(3))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 1);

        scheduler.stop().await;
        assert_eq!(scheduler.state(), TaskState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_job_drops_ticks() {
        // 25초 걸리는 작업, 10초 주기: 10초에 시작해 35초에 끝나고 다음은 40초
        let job = counter(Duration::from_secs(25));
        let scheduler = Scheduler::new("slow", &CancellationToken::new());
        scheduler
            .start(job.clone(), Duration::from_secs(10), Duration::from_secs(60))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(39)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 2);

        scheduler.stop().await;
    }

    /// 실행 시작 시각(시작 기준 초)을 기록하는 작업.
    struct StartTimes {
        origin: Instant,
        work: Duration,
        starts: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl Job for StartTimes {
        async fn run(&self, ctx: &RequestContext) {
            self.starts
                .lock()
                .unwrap()
                .push(self.origin.elapsed().as_secs());
            let _ = ctx.run(tokio::time::sleep(self.work)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_job_resumes_on_schedule_boundary() {
        let job = Arc::new(StartTimes {
            origin: Instant::now(),
            work: Duration::from_secs(25),
            starts: Mutex::new(Vec::new()),
        });
        let scheduler = Scheduler::new("boundary", &CancellationToken::new());
        scheduler
            .start(job.clone(), Duration::from_secs(10), Duration::from_secs(60))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(75)).await;
        scheduler.stop().await;

        assert_eq!(*job.starts.lock().unwrap(), vec![10, 40, 70]);
    }

    #[test]
    fn test_next_boundary() {
        let first = Instant::now();
        let every = Duration::from_secs(10);

        assert_eq!(next_boundary(first, every, first - Duration::from_secs(3)), first);
        assert_eq!(next_boundary(first, every, first), first + every);
        assert_eq!(
            next_boundary(first, every, first + Duration::from_secs(25)),
            first + Duration::from_secs(30)
        );
        assert_eq!(
            next_boundary(first, every, first + Duration::from_secs(30)),
            first + Duration::from_secs(40)
        );
    }

    struct Panicky {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl Job for Panicky {
        async fn run(&self, _ctx: &RequestContext) {
            if self.runs.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first run fails");
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_job_keeps_loop_alive() {
        let job = Arc::new(Panicky {
            runs: AtomicUsize::new(0),
        });
        let scheduler = Scheduler::new("panicky", &CancellationToken::new());
        scheduler
            .start(job.clone(), Duration::from_secs(10), Duration::from_secs(5))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.state(), TaskState::Idle);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 2);

        scheduler.stop().await;
        assert_eq!(scheduler.state(), TaskState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_fails() {
        let scheduler = Scheduler::new("twice", &CancellationToken::new());
        let job = counter(Duration::ZERO);
        scheduler
            .start(job.clone(), Duration::from_secs(1), Duration::from_millis(500))
            .unwrap();

        let err = scheduler
            .start(job, Duration::from_secs(1), Duration::from_millis(500))
            .unwrap_err();
        assert!(matches!(err, CollectorError::AlreadyStarted(_)));

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let scheduler = Scheduler::new("idem", &CancellationToken::new());
        scheduler.stop().await;
        assert_eq!(scheduler.state(), TaskState::Stopped);

        let scheduler = Scheduler::new("idem", &CancellationToken::new());
        scheduler
            .start(counter(Duration::ZERO), Duration::from_secs(1), Duration::from_millis(500))
            .unwrap();
        scheduler.stop().await;
        scheduler.stop().await;
        assert_eq!(scheduler.state(), TaskState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancel_stops_loop() {
        let parent = CancellationToken::new();
        let scheduler = Scheduler::new("child", &parent);
        let job = counter(Duration::ZERO);
        scheduler
            .start(job.clone(), Duration::from_secs(1), Duration::from_millis(500))
            .unwrap();

        parent.cancel();
        let mut rx = scheduler.subscribe();
        rx.wait_for(|s| *s == TaskState::Stopped).await.unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_running_job() {
        let job = counter(Duration::from_secs(3600));
        let scheduler = Scheduler::new("long", &CancellationToken::new());
        scheduler
            .start(job.clone(), Duration::from_secs(1), Duration::from_secs(7200))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(scheduler.state(), TaskState::Running);

        let started = Instant::now();
        scheduler.stop().await;

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(scheduler.state(), TaskState::Stopped);
    }
}
