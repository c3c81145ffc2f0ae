//! 시세 수집기의 에러 타입.
//!
//! 사이클의 각 단계(fetch, decode, persist)에서 발생한 에러는 오케스트레이터
//! 경계에서 [`ErrorKind`]로 분류되어 `CycleResult`에 기록됩니다.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 에러 분류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 네트워크/타임아웃 (다음 tick에서 암묵적으로 재시도)
    Transport,
    /// 정상 payload 내부의 provider 에러 코드 (rate limit, 잘못된 키 등)
    ProviderApplication,
    /// 잘못된 payload
    Decode,
    /// 저장소 쓰기 실패 (전체 또는 일부)
    Persistence,
    /// 필수 설정 누락 (시작 시점에만 발생)
    Configuration,
    /// 종료 신호로 중단됨
    Cancelled,
}

impl ErrorKind {
    /// 로그/메트릭용 문자열.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::ProviderApplication => "provider_application",
            Self::Decode => "decode",
            Self::Persistence => "persistence",
            Self::Configuration => "configuration",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 시세 수집 에러.
#[derive(Debug, Clone, Error)]
pub enum TickerError {
    /// 네트워크/연결 에러
    #[error("Transport error: {0}")]
    Transport(String),

    /// 요청 타임아웃
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// 종료 신호로 중단
    #[error("Cancelled by shutdown")]
    Cancelled,

    /// Provider가 보고한 애플리케이션 에러
    #[error("Provider error {code}: {message}")]
    ProviderApplication {
        code: i64,
        message: String,
        credit_count: i64,
    },

    /// payload 파싱 에러
    #[error("Decode error ({size} bytes): {message}")]
    Decode { message: String, size: usize },

    /// 저장소 에러
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// 설정 에러
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl TickerError {
    /// payload 크기 정보를 포함한 decode 에러 생성.
    pub fn decode(message: impl Into<String>, size: usize) -> Self {
        Self::Decode {
            message: message.into(),
            size,
        }
    }

    /// 에러 분류.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) | Self::Timeout(_) => ErrorKind::Transport,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::ProviderApplication { .. } => ErrorKind::ProviderApplication,
            Self::Decode { .. } => ErrorKind::Decode,
            Self::Persistence(_) => ErrorKind::Persistence,
            Self::Configuration(_) => ErrorKind::Configuration,
        }
    }
}

/// 시세 수집 Result 타입.
pub type Result<T> = std::result::Result<T, TickerError>;
