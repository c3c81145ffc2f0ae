//! 요청 컨텍스트: 취소 토큰 + 데드라인.
//!
//! 프로세스 종료 신호는 [`CancellationToken`] 트리로 전파되고, 각 사이클은
//! 부모 컨텍스트에서 파생된 데드라인을 갖습니다. 파생 데드라인은 부모의
//! 데드라인을 넘지 않습니다.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::TickerError;

/// 컨텍스트에 의해 future가 중단된 사유.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    /// 취소 신호 수신
    Cancelled,
    /// 데드라인 경과
    DeadlineExceeded,
}

impl From<Interrupted> for TickerError {
    fn from(reason: Interrupted) -> Self {
        match reason {
            Interrupted::Cancelled => TickerError::Cancelled,
            Interrupted::DeadlineExceeded => TickerError::Timeout("deadline exceeded".to_string()),
        }
    }
}

/// 취소와 데드라인을 함께 전달하는 컨텍스트.
#[derive(Debug, Clone)]
pub struct RequestContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// 주어진 토큰에 묶인 데드라인 없는 컨텍스트.
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// 어디에도 묶이지 않은 컨텍스트 (테스트, 일회성 실행용).
    pub fn background() -> Self {
        Self::new(CancellationToken::new())
    }

    /// `timeout` 이후 만료되는 하위 컨텍스트.
    ///
    /// 부모에 더 이른 데드라인이 있으면 그것을 유지합니다.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// 지정한 시각에 만료되는 하위 컨텍스트.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// 데드라인까지 남은 시간 (데드라인이 없으면 `None`).
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// 취소될 때까지 대기.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// 취소 또는 데드라인 중 먼저 오는 쪽에서 `fut`를 중단합니다.
    ///
    /// 중단된 future는 drop되므로 반환 이후 계속 실행되는 작업은 없습니다.
    /// 취소가 이미 신호된 경우 항상 취소가 우선합니다.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Interrupted> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Interrupted::Cancelled),
            _ = sleep_until(self.deadline) => Err(Interrupted::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }

    /// 데드라인만 적용하고 취소는 무시합니다.
    ///
    /// 이미 시작된 저장 단계처럼 중간에 끊으면 안 되는 작업에 사용합니다.
    pub async fn run_until_deadline<F: Future>(&self, fut: F) -> Result<F::Output, Interrupted> {
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, fut)
                .await
                .map_err(|_| Interrupted::DeadlineExceeded),
            None => Ok(fut.await),
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}
