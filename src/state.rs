//! Application state management
//!
//! Contains shared state accessible across all handlers.

use crate::config::{SessionConfig, StorageConfig};
use crate::crud::RecordService;
use crate::db::store::Store;
use crate::import::Importer;
use crate::routines::RoutineService;
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// Table CRUD over the schema registry
    pub records: RecordService,

    /// CSV fixture ingestion and the bootstrap script
    pub importer: Importer,

    /// Stored routine listing and invocation, with per-session snapshots
    pub routines: RoutineService,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, storage: &StorageConfig, session: &SessionConfig) -> Self {
        Self {
            records: RecordService::new(store.clone()),
            importer: Importer::new(store.clone(), &storage.data_dir, &storage.bootstrap_sql),
            routines: RoutineService::new(store, &storage.catalog_file, &storage.export_dir)
                .with_session_ttl(session.ttl),
        }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
