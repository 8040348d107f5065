// Census Sync - Core Library
// Reconciles facility and occupant sheets into SQLite and raises capacity
// alerts. Exposes all modules for use in the binary and in tests.

pub mod alert;
pub mod config;
pub mod entities;
pub mod error;
pub mod jobs;
pub mod occupancy;
pub mod reconciliation;
pub mod report;
pub mod source;
pub mod store;

// Re-export commonly used types
pub use alert::{AlertSender, FileOutbox};
pub use config::Settings;
pub use entities::{Facility, FacilityStore, Occupant, OccupantStore, UnitType};
pub use error::{SourceError, StoreError, SyncError};
pub use jobs::{Scheduler, SyncOrchestrator};
pub use occupancy::{CapacityAlertRow, OccupancyAggregator, DEFAULT_THRESHOLD};
pub use reconciliation::{ReconciliationEngine, SheetLayout, SyncReport};
pub use source::{CsvWorkbook, RangeRef, TabularSource};
pub use store::{setup_database, EntityStore, Identified, NameLookup};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
