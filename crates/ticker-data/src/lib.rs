//! 시세 데이터 수집의 외부 협력자.
//!
//! - `provider`: 외부 시세/식별자 API 클라이언트 (HTTP 왕복 1회, 재시도 없음)
//! - `decoder`: payload -> 스냅샷 변환 (순수 함수)
//! - `storage`: 스냅샷/추적 자산 저장 (멱등 upsert)

pub mod decoder;
pub mod provider;
pub mod storage;

pub use decoder::{decode_identity_map, CmcQuoteDecoder, QuoteDecoder};
pub use provider::{CmcClient, CmcConfig, IdentitySource, QuoteFetcher};
pub use storage::{
    AssetFailure, AssetStore, MemoryStore, PersistReport, Persister, PgStore, DEADLINE_EXCEEDED,
};
