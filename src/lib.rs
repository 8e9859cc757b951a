// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod atlas;
pub mod compliance;
pub mod config;
pub mod dispatch;
pub mod gates;
pub mod geo;
pub mod ingest;
pub mod metrics;
pub mod oracle;
pub mod pipeline;
pub mod sitrep;
pub mod store;
pub mod tables;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::atlas::{AtlasPacket, ProcessingStatus, SourceTier};
pub use crate::dispatch::{IntelRequest, IntelResponse, MissionContext, MissionDispatcher};
pub use crate::pipeline::{PipelineOrchestrator, PipelineReport};
