//! # Ticker Core
//!
//! 시세 수집기의 핵심 도메인 모델 및 타입을 제공합니다.
//!
//! - 추적 자산 / 자산 집합 (`TrackedAsset`, `AssetSet`)
//! - 시세 스냅샷 (`QuoteSnapshot`)
//! - 사이클 결과 (`CycleResult`)
//! - 에러 분류 (`TickerError`, `ErrorKind`)
//! - 취소 + 데드라인 컨텍스트 (`RequestContext`)
//! - 로깅 인프라

pub mod context;
pub mod error;
pub mod logging;
pub mod types;

pub use context::{Interrupted, RequestContext};
pub use error::{ErrorKind, Result, TickerError};
pub use logging::{init_logging, LogConfig, LogFormat};
pub use types::*;
