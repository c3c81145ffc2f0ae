//! 도메인 타입.

pub mod asset;
pub mod cycle;
pub mod quote;

pub use asset::{AssetIdentity, AssetSet, TrackedAsset};
pub use cycle::{CycleOutcome, CycleResult};
pub use quote::QuoteSnapshot;
