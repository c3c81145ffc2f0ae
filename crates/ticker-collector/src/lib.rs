//! Quote ticker collector.
//!
//! 두 개의 독립 주기 작업을 제공합니다:
//! - 시세 사이클 (`CycleOrchestrator`): fetch -> decode -> persist, 짧은 주기
//! - 식별자 해석 (`IdentityResolver`): 심볼 -> provider ID, 긴 주기
//!
//! 두 작업은 `AssetRegistry`의 읽기 경로만 공유합니다.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod resolver;
pub mod schedule;
pub mod stats;

pub use config::TickerConfig;
pub use error::{CollectorError, Result};
pub use orchestrator::CycleOrchestrator;
pub use registry::AssetRegistry;
pub use resolver::IdentityResolver;
pub use schedule::{Job, Scheduler, TaskState};
pub use stats::CycleStats;
