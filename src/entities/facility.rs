// Facility entity + SQLite store
//
// Facilities are created and updated only by the facility sync pass, and
// deleted only by its deletion sweep. The identifier in column A is the
// business key; the remaining columns are overwritten wholesale whenever
// any of them differs from the source.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::store::{EntityStore, Identified, NameLookup};

// ============================================================================
// FACILITY
// ============================================================================

/// A care facility with two capacity counters.
///
/// Source sheet `Facility`, columns A-E:
/// id, name, location, general capacity, ICU capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facility {
    pub id: String,
    pub name: String,
    pub location: String,
    pub general_units: u32,
    pub icu_units: u32,
}

impl Facility {
    /// Parse one source row. Missing trailing cells read as empty strings;
    /// a capacity cell that is absent or non-numeric is a parse failure.
    pub fn from_row(cells: &[String]) -> Result<Self, String> {
        let cell = |i: usize| cells.get(i).map(String::as_str).unwrap_or("");

        let general_units: u32 = cell(3)
            .parse()
            .map_err(|_| format!("invalid general capacity '{}'", cell(3)))?;
        let icu_units: u32 = cell(4)
            .parse()
            .map_err(|_| format!("invalid ICU capacity '{}'", cell(4)))?;

        Ok(Facility {
            id: cell(0).to_string(),
            name: cell(1).to_string(),
            location: cell(2).to_string(),
            general_units,
            icu_units,
        })
    }
}

impl Identified for Facility {
    fn id(&self) -> &str {
        &self.id
    }
}

// ============================================================================
// FACILITY STORE
// ============================================================================

const COLUMNS: &str = "id, name, location, general_units, icu_units";

pub struct FacilityStore<'c> {
    conn: &'c Connection,
}

impl<'c> FacilityStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        FacilityStore { conn }
    }
}

impl NameLookup for FacilityStore<'_> {
    /// Bulk lookup by display name, used to resolve occupant rows'
    /// facility-name column to facility ids. Names absent from the store
    /// are simply not returned.
    fn find_by_names(&self, names: &[String]) -> Result<Vec<Facility>, StoreError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; names.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM facilities WHERE name IN ({}) ORDER BY id ASC",
            COLUMNS, placeholders
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(names), row_to_facility)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn row_to_facility(row: &rusqlite::Row<'_>) -> rusqlite::Result<Facility> {
    Ok(Facility {
        id: row.get(0)?,
        name: row.get(1)?,
        location: row.get(2)?,
        general_units: row.get(3)?,
        icu_units: row.get(4)?,
    })
}

impl EntityStore for FacilityStore<'_> {
    type Entity = Facility;

    fn kind(&self) -> &'static str {
        "facility"
    }

    fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Facility>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM facilities WHERE id IN ({}) ORDER BY id ASC",
            COLUMNS, placeholders
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(ids), row_to_facility)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn upsert_batch(&self, batch: &[Facility]) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO facilities (id, name, location, general_units, icu_units)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    location = excluded.location,
                    general_units = excluded.general_units,
                    icu_units = excluded.icu_units",
            )?;
            for facility in batch {
                stmt.execute(params![
                    facility.id,
                    facility.name,
                    facility.location,
                    facility.general_units,
                    facility.icu_units,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_batch(&self, batch: &[Facility]) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["?"; batch.len()].join(", ");
        let sql = format!("DELETE FROM facilities WHERE id IN ({})", placeholders);
        self.conn.execute(
            &sql,
            rusqlite::params_from_iter(batch.iter().map(|f| f.id.as_str())),
        )?;
        Ok(())
    }

    fn scan_page(
        &self,
        after_id: Option<&str>,
        page_size: usize,
    ) -> Result<Vec<Facility>, StoreError> {
        let sql = format!(
            "SELECT {} FROM facilities
             WHERE (?1 IS NULL OR id > ?1)
             ORDER BY id ASC
             LIMIT ?2",
            COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![after_id, page_size as i64], row_to_facility)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM facilities", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::setup_database;

    fn facility(id: &str, name: &str) -> Facility {
        Facility {
            id: id.to_string(),
            name: name.to_string(),
            location: "North".to_string(),
            general_units: 10,
            icu_units: 2,
        }
    }

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_from_row_parses_capacities() {
        let cells: Vec<String> = ["F1", "General Hospital", "North", "10", "2"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let facility = Facility::from_row(&cells).unwrap();
        assert_eq!(facility.id, "F1");
        assert_eq!(facility.general_units, 10);
        assert_eq!(facility.icu_units, 2);
    }

    #[test]
    fn test_from_row_rejects_bad_capacity() {
        let cells: Vec<String> = ["F1", "General Hospital", "North", "ten", "2"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let err = Facility::from_row(&cells).unwrap_err();
        assert!(err.contains("general capacity"));

        // Negative counters are not valid capacities either.
        let cells: Vec<String> = ["F1", "General Hospital", "North", "10", "-2"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(Facility::from_row(&cells).is_err());
    }

    #[test]
    fn test_from_row_missing_trailing_cells() {
        let cells: Vec<String> = ["F1", "General Hospital"].iter().map(|s| s.to_string()).collect();
        let err = Facility::from_row(&cells).unwrap_err();
        assert!(err.contains("invalid general capacity"));
    }

    #[test]
    fn test_upsert_inserts_then_overwrites() {
        let conn = test_conn();
        let store = FacilityStore::new(&conn);

        store.upsert_batch(&[facility("F1", "General Hospital")]).unwrap();
        assert_eq!(store.count().unwrap(), 1);

        let mut updated = facility("F1", "General Hospital");
        updated.general_units = 25;
        store.upsert_batch(&[updated.clone()]).unwrap();

        assert_eq!(store.count().unwrap(), 1);
        let found = store.find_by_ids(&["F1".to_string()]).unwrap();
        assert_eq!(found, vec![updated]);
    }

    #[test]
    fn test_find_by_ids_returns_only_known() {
        let conn = test_conn();
        let store = FacilityStore::new(&conn);
        store
            .upsert_batch(&[facility("F1", "A"), facility("F2", "B")])
            .unwrap();

        let found = store
            .find_by_ids(&["F2".to_string(), "F9".to_string()])
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "F2");

        assert!(store.find_by_ids(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_find_by_names() {
        let conn = test_conn();
        let store = FacilityStore::new(&conn);
        store
            .upsert_batch(&[facility("F1", "General Hospital"), facility("F2", "City Clinic")])
            .unwrap();

        let found = store
            .find_by_names(&["City Clinic".to_string(), "Nowhere".to_string()])
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "F2");
    }

    #[test]
    fn test_scan_page_visits_everything_in_order() {
        let conn = test_conn();
        let store = FacilityStore::new(&conn);
        let all: Vec<Facility> = (1..=5).map(|i| facility(&format!("F{}", i), "X")).collect();
        store.upsert_batch(&all).unwrap();

        let mut seen = Vec::new();
        let mut after: Option<String> = None;
        let mut calls = 0;
        loop {
            let page = store.scan_page(after.as_deref(), 2).unwrap();
            calls += 1;
            if page.is_empty() {
                break;
            }
            after = page.last().map(|f| f.id.clone());
            seen.extend(page.into_iter().map(|f| f.id));
        }

        // Each record exactly once, ascending, ceil(5/2) + 1 = 4 calls.
        assert_eq!(seen, vec!["F1", "F2", "F3", "F4", "F5"]);
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_delete_batch() {
        let conn = test_conn();
        let store = FacilityStore::new(&conn);
        store
            .upsert_batch(&[facility("F1", "A"), facility("F2", "B"), facility("F3", "C")])
            .unwrap();

        store
            .delete_batch(&[facility("F1", "A"), facility("F3", "C")])
            .unwrap();

        let remaining = store.scan_page(None, 10).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "F2");

        // Empty deletions are a no-op, not an error.
        store.delete_batch(&[]).unwrap();
    }
}
