// Occupant entity + SQLite store
//
// Occupant rows reference their facility by display name in the source and
// by facility id in the store; the reconciliation engine resolves the name
// per window before records are built. Rows whose facility name has no
// match are rejected by the engine, never written with a broken reference.

use std::collections::HashMap;

use chrono::NaiveDate;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::store::{EntityStore, Identified};

/// Source date-of-birth format (`2001-07-24`).
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// UNIT TYPES
// ============================================================================

/// The fixed unit-type vocabulary occupancy is aggregated over.
///
/// Occupant rows store the raw label; labels outside this vocabulary are
/// kept as-is and simply never contribute to a capacity ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitType {
    General,
    Icu,
}

impl UnitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitType::General => "General",
            UnitType::Icu => "ICU",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "General" => Some(UnitType::General),
            "ICU" => Some(UnitType::Icu),
            _ => None,
        }
    }
}

// ============================================================================
// OCCUPANT
// ============================================================================

/// Source sheet `Occupant`, columns A-F:
/// id, name, date of birth, category, unit type, facility name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupant {
    pub id: String,
    pub name: String,
    pub date_of_birth: NaiveDate,
    pub category: String,
    pub unit_type: String,
    pub facility_id: String,
}

/// Outcome of parsing one occupant row against the window's facility map.
#[derive(Debug)]
pub enum OccupantRow {
    Parsed(Occupant),
    /// The facility-name column matched nothing in the store; the row is
    /// skipped and logged by the engine.
    UnresolvedFacility { id: String, facility_name: String },
}

impl Occupant {
    /// Parse one source row. The facility-name column (F) is resolved
    /// through `facility_ids`, the window's name-to-id map.
    pub fn from_row(
        cells: &[String],
        facility_ids: &HashMap<String, String>,
    ) -> Result<OccupantRow, String> {
        let cell = |i: usize| cells.get(i).map(String::as_str).unwrap_or("");

        let date_of_birth = NaiveDate::parse_from_str(cell(2), DATE_FORMAT)
            .map_err(|_| format!("invalid date of birth '{}'", cell(2)))?;

        let facility_name = cell(5);
        let Some(facility_id) = facility_ids.get(facility_name) else {
            return Ok(OccupantRow::UnresolvedFacility {
                id: cell(0).to_string(),
                facility_name: facility_name.to_string(),
            });
        };

        Ok(OccupantRow::Parsed(Occupant {
            id: cell(0).to_string(),
            name: cell(1).to_string(),
            date_of_birth,
            category: cell(3).to_string(),
            unit_type: cell(4).to_string(),
            facility_id: facility_id.clone(),
        }))
    }
}

impl Identified for Occupant {
    fn id(&self) -> &str {
        &self.id
    }
}

// ============================================================================
// OCCUPANT STORE
// ============================================================================

const COLUMNS: &str = "id, name, date_of_birth, category, unit_type, facility_id";

pub struct OccupantStore<'c> {
    conn: &'c Connection,
}

impl<'c> OccupantStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        OccupantStore { conn }
    }

    /// Grouped occupancy count for one facility: unit-type label to number
    /// of occupants. Labels with no occupants are absent from the map.
    pub fn count_by_unit_type(
        &self,
        facility_id: &str,
    ) -> Result<HashMap<String, u64>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT unit_type, COUNT(*) FROM occupants
             WHERE facility_id = ?1
             GROUP BY unit_type",
        )?;
        let rows = stmt.query_map(params![facility_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (label, count) = row?;
            counts.insert(label, count);
        }
        Ok(counts)
    }
}

fn row_to_occupant(row: &rusqlite::Row<'_>) -> rusqlite::Result<Occupant> {
    let date_text: String = row.get(2)?;
    let date_of_birth = NaiveDate::parse_from_str(&date_text, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Occupant {
        id: row.get(0)?,
        name: row.get(1)?,
        date_of_birth,
        category: row.get(3)?,
        unit_type: row.get(4)?,
        facility_id: row.get(5)?,
    })
}

impl EntityStore for OccupantStore<'_> {
    type Entity = Occupant;

    fn kind(&self) -> &'static str {
        "occupant"
    }

    fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Occupant>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM occupants WHERE id IN ({}) ORDER BY id ASC",
            COLUMNS, placeholders
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(ids), row_to_occupant)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn upsert_batch(&self, batch: &[Occupant]) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO occupants (id, name, date_of_birth, category, unit_type, facility_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    date_of_birth = excluded.date_of_birth,
                    category = excluded.category,
                    unit_type = excluded.unit_type,
                    facility_id = excluded.facility_id",
            )?;
            for occupant in batch {
                stmt.execute(params![
                    occupant.id,
                    occupant.name,
                    occupant.date_of_birth.format(DATE_FORMAT).to_string(),
                    occupant.category,
                    occupant.unit_type,
                    occupant.facility_id,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_batch(&self, batch: &[Occupant]) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["?"; batch.len()].join(", ");
        let sql = format!("DELETE FROM occupants WHERE id IN ({})", placeholders);
        self.conn.execute(
            &sql,
            rusqlite::params_from_iter(batch.iter().map(|o| o.id.as_str())),
        )?;
        Ok(())
    }

    fn scan_page(
        &self,
        after_id: Option<&str>,
        page_size: usize,
    ) -> Result<Vec<Occupant>, StoreError> {
        let sql = format!(
            "SELECT {} FROM occupants
             WHERE (?1 IS NULL OR id > ?1)
             ORDER BY id ASC
             LIMIT ?2",
            COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![after_id, page_size as i64], row_to_occupant)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM occupants", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

// ============================================================================
// TESTS
// ============================================================================
