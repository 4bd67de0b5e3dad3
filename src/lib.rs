#![doc(test(attr(deny(warnings))))]

//! Backup Core implements database backup, cataloging, deletion, and restore
//! for a single local embedded-database file set, behind a storage-access
//! adapter that spans both direct-filesystem and managed shared-storage
//! models.

pub mod backup;
pub mod config;
pub mod database;
pub mod errors;
pub mod orchestrator;
pub mod permissions;
pub mod storage;
pub mod utils;

use std::sync::Once;

static INIT_TRACING: Once = Once::new();

/// Initializes global tracing and emits a startup info log.
pub fn init() {
    INIT_TRACING.call_once(|| {
        utils::init_tracing();
        tracing::info!("Backup Core tracing initialized.");
    });
}
