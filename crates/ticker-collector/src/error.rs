//! 에러 타입 정의.

use thiserror::Error;
use ticker_core::TickerError;

/// Collector 에러 타입
///
/// 사이클 단계의 에러는 `CycleResult`로 기록되고 여기로 오지 않습니다.
/// 이 타입은 시작 시점 에러와 스케줄러 오용만 다룹니다.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// 설정 에러 (시작 전에 치명적)
    #[error("Configuration error: {0}")]
    Config(String),

    /// 저장소/provider 초기화 에러
    #[error(transparent)]
    Ticker(#[from] TickerError),

    /// 같은 작업을 두 번 시작
    #[error("Task `{0}` is already started")]
    AlreadyStarted(String),

    /// 다른 사이클이 실행 중 (요청은 대기열에 넣지 않고 버림)
    #[error("A cycle is already in progress")]
    CycleInProgress,

    /// 일반 에러
    #[error("Error: {0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl From<Box<dyn std::error::Error + Send + Sync>> for CollectorError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self::Other(err)
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, CollectorError>;
