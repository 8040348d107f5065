// Entity store abstraction + SQLite schema setup
//
// The reconciliation engine and the occupancy aggregator depend on these
// traits only; the concrete SQLite adapters live with their entities in
// src/entities/. Two flat tables keyed by the business identifier - no
// indices beyond the ascending-id scan and the facility-reference lookup.

use rusqlite::Connection;

use crate::error::StoreError;

/// A record addressed by its immutable business identifier.
///
/// Identifiers come from the first column of the source sheet and are never
/// generated or rewritten by the engine.
pub trait Identified {
    fn id(&self) -> &str;
}

/// Persistent CRUD surface for one entity kind.
///
/// `scan_page` is keyset pagination: ascending identifier order, with the
/// last-seen identifier as an exclusive lower bound. Callers detect the end
/// of the set by the first empty page.
pub trait EntityStore {
    type Entity: Identified + Clone + PartialEq;

    /// Human-readable kind label, used in log lines.
    fn kind(&self) -> &'static str;

    /// Bulk point lookup. Ids absent from the store are simply not returned.
    fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Self::Entity>, StoreError>;

    /// Insert-or-overwrite the batch in a single transaction.
    fn upsert_batch(&self, batch: &[Self::Entity]) -> Result<(), StoreError>;

    /// Delete the batch in a single transaction.
    fn delete_batch(&self, batch: &[Self::Entity]) -> Result<(), StoreError>;

    /// One page of records with `id > after_id`, ascending, at most
    /// `page_size` rows.
    fn scan_page(
        &self,
        after_id: Option<&str>,
        page_size: usize,
    ) -> Result<Vec<Self::Entity>, StoreError>;

    /// Total number of records of this kind.
    fn count(&self) -> Result<u64, StoreError>;
}

/// Bulk name-to-record lookup, implemented by the facility store so the
/// occupant sync can resolve facility names without seeing a concrete store.
pub trait NameLookup: EntityStore {
    fn find_by_names(&self, names: &[String]) -> Result<Vec<Self::Entity>, StoreError>;
}

pub fn setup_database(conn: &Connection) -> Result<(), StoreError> {
    // WAL keeps readers unblocked while a sync run commits windows.
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS facilities (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            location TEXT NOT NULL,
            general_units INTEGER NOT NULL,
            icu_units INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS occupants (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            date_of_birth TEXT NOT NULL,
            category TEXT NOT NULL,
            unit_type TEXT NOT NULL,
            facility_id TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_occupants_facility ON occupants(facility_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_facilities_name ON facilities(name)",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_database_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        setup_database(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert!(tables.contains(&"facilities".to_string()));
        assert!(tables.contains(&"occupants".to_string()));
    }
}
