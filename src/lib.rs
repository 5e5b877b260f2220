// src/lib.rs
//! Weather hazard warning and forecast ingestion: source clients, fallback
//! policy, optional AI augmentation and SQLite snapshot persistence.

pub mod analyze;
pub mod config;
pub mod error;
pub mod ingest;
pub mod model;
pub mod store;
pub mod telemetry;

pub use analyze::ai_adapter;
pub use config::Settings;
pub use error::{ErrorKind, IngestError, StoreError};
pub use ingest::{CycleError, CycleReport, FallbackNote, Feed, IngestionService, PIPELINE_INGESTION};
pub use store::{SnapshotStore, SqliteStore};
