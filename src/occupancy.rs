// Occupancy aggregation - per-facility capacity ratios vs. a threshold
//
// Pages the facility set in ascending-id order and issues one grouped
// occupant count per facility. Eligibility is strict: a ratio exactly equal
// to the threshold does not qualify, and a zero capacity never qualifies on
// that ratio (and never divides).

use tracing::debug;

use crate::entities::{Facility, UnitType};
use crate::error::StoreError;
use crate::store::EntityStore;

/// Default occupancy threshold: report facilities above 90% on either ratio.
pub const DEFAULT_THRESHOLD: f64 = 0.9;

/// Grouped occupant counts for one facility, keyed by unit-type label.
/// Labels with no occupants are absent; callers treat them as zero.
pub trait OccupancyCounts {
    fn count_by_unit_type(
        &self,
        facility_id: &str,
    ) -> Result<std::collections::HashMap<String, u64>, StoreError>;
}

impl OccupancyCounts for crate::entities::OccupantStore<'_> {
    fn count_by_unit_type(
        &self,
        facility_id: &str,
    ) -> Result<std::collections::HashMap<String, u64>, StoreError> {
        crate::entities::OccupantStore::count_by_unit_type(self, facility_id)
    }
}

/// One eligible facility, ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityAlertRow {
    pub facility_id: String,
    pub facility_name: String,
    pub general_units: u32,
    pub general_occupied: u64,
    pub icu_units: u32,
    pub icu_occupied: u64,
}

pub struct OccupancyAggregator {
    threshold: f64,
    page_size: usize,
}

impl OccupancyAggregator {
    pub fn new(threshold: f64, page_size: usize) -> Self {
        OccupancyAggregator {
            threshold,
            page_size: page_size.max(1),
        }
    }

    /// Collect every facility whose general or ICU occupancy ratio is
    /// strictly above the threshold, in ascending facility-id order.
    pub fn rows_over_threshold<F, C>(
        &self,
        facilities: &F,
        occupancy: &C,
    ) -> Result<Vec<CapacityAlertRow>, StoreError>
    where
        F: EntityStore<Entity = Facility>,
        C: OccupancyCounts,
    {
        let mut eligible = Vec::new();
        let mut after_id: Option<String> = None;

        loop {
            let page = facilities.scan_page(after_id.as_deref(), self.page_size)?;
            let Some(last) = page.last() else {
                break;
            };
            after_id = Some(last.id.clone());

            for facility in &page {
                let counts = occupancy.count_by_unit_type(&facility.id)?;
                let general_occupied = counts.get(UnitType::General.as_str()).copied().unwrap_or(0);
                let icu_occupied = counts.get(UnitType::Icu.as_str()).copied().unwrap_or(0);

                if over_threshold(general_occupied, facility.general_units, self.threshold)
                    || over_threshold(icu_occupied, facility.icu_units, self.threshold)
                {
                    eligible.push(CapacityAlertRow {
                        facility_id: facility.id.clone(),
                        facility_name: facility.name.clone(),
                        general_units: facility.general_units,
                        general_occupied,
                        icu_units: facility.icu_units,
                        icu_occupied,
                    });
                }
            }
        }

        debug!(eligible = eligible.len(), "occupancy aggregation finished");
        Ok(eligible)
    }
}

/// Strictly-greater comparison of occupied/capacity against the threshold.
/// A zero capacity has no defined ratio and is never over.
fn over_threshold(occupied: u64, capacity: u32, threshold: f64) -> bool {
    if capacity == 0 {
        return false;
    }
    occupied as f64 / capacity as f64 > threshold
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::*;
    use crate::entities::{FacilityStore, Occupant, OccupantStore};
    use crate::store::setup_database;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn facility(id: &str, name: &str, general: u32, icu: u32) -> Facility {
        Facility {
            id: id.to_string(),
            name: name.to_string(),
            location: "North".to_string(),
            general_units: general,
            icu_units: icu,
        }
    }

    fn occupant(id: &str, unit_type: &str, facility_id: &str) -> Occupant {
        Occupant {
            id: id.to_string(),
            name: "Jordan Doe".to_string(),
            date_of_birth: chrono::NaiveDate::from_ymd_opt(1987, 3, 14).unwrap(),
            category: "Cardiology".to_string(),
            unit_type: unit_type.to_string(),
            facility_id: facility_id.to_string(),
        }
    }

    fn seed_occupants(store: &OccupantStore, facility_id: &str, general: usize, icu: usize) {
        let mut batch = Vec::new();
        for i in 0..general {
            batch.push(occupant(&format!("{}-G{}", facility_id, i), "General", facility_id));
        }
        for i in 0..icu {
            batch.push(occupant(&format!("{}-I{}", facility_id, i), "ICU", facility_id));
        }
        store.upsert_batch(&batch).unwrap();
    }

    #[test]
    fn test_ratio_exactly_at_threshold_is_not_reported() {
        let conn = test_conn();
        let facilities = FacilityStore::new(&conn);
        let occupants = OccupantStore::new(&conn);

        facilities
            .upsert_batch(&[facility("F1", "General Hospital", 10, 2)])
            .unwrap();
        // 9/10 general = 0.9 exactly, 1/2 ICU = 0.5: neither is strictly over.
        seed_occupants(&occupants, "F1", 9, 1);

        let aggregator = OccupancyAggregator::new(DEFAULT_THRESHOLD, 50);
        let rows = aggregator.rows_over_threshold(&facilities, &occupants).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_one_more_occupant_tips_the_ratio() {
        let conn = test_conn();
        let facilities = FacilityStore::new(&conn);
        let occupants = OccupantStore::new(&conn);

        facilities
            .upsert_batch(&[facility("F1", "General Hospital", 10, 2)])
            .unwrap();
        // 10/10 general = 1.0 > 0.9.
        seed_occupants(&occupants, "F1", 10, 1);

        let aggregator = OccupancyAggregator::new(DEFAULT_THRESHOLD, 50);
        let rows = aggregator.rows_over_threshold(&facilities, &occupants).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].facility_id, "F1");
        assert_eq!(rows[0].general_occupied, 10);
        assert_eq!(rows[0].icu_occupied, 1);
    }

    #[test]
    fn test_icu_ratio_alone_can_qualify() {
        let conn = test_conn();
        let facilities = FacilityStore::new(&conn);
        let occupants = OccupantStore::new(&conn);

        facilities
            .upsert_batch(&[facility("F1", "General Hospital", 100, 2)])
            .unwrap();
        seed_occupants(&occupants, "F1", 1, 2); // ICU 2/2 = 1.0

        let aggregator = OccupancyAggregator::new(DEFAULT_THRESHOLD, 50);
        let rows = aggregator.rows_over_threshold(&facilities, &occupants).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_zero_capacity_never_faults_or_qualifies() {
        let conn = test_conn();
        let facilities = FacilityStore::new(&conn);
        let occupants = OccupantStore::new(&conn);

        facilities
            .upsert_batch(&[facility("F1", "Annex", 0, 0)])
            .unwrap();
        // Occupants recorded against a zero-capacity facility still must not
        // divide by zero or report the facility.
        seed_occupants(&occupants, "F1", 3, 1);

        let aggregator = OccupancyAggregator::new(DEFAULT_THRESHOLD, 50);
        let rows = aggregator.rows_over_threshold(&facilities, &occupants).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_rows_come_back_in_ascending_id_order_across_pages() {
        let conn = test_conn();
        let facilities = FacilityStore::new(&conn);
        let occupants = OccupantStore::new(&conn);

        for i in [3, 1, 5, 2, 4] {
            let id = format!("F{}", i);
            facilities
                .upsert_batch(&[facility(&id, "Full House", 1, 0)])
                .unwrap();
            seed_occupants(&occupants, &id, 1, 0); // 1/1 > 0.9 everywhere
        }

        let aggregator = OccupancyAggregator::new(DEFAULT_THRESHOLD, 2);
        let rows = aggregator.rows_over_threshold(&facilities, &occupants).unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.facility_id.as_str()).collect();
        assert_eq!(ids, ["F1", "F2", "F3", "F4", "F5"]);
    }

    #[test]
    fn test_missing_unit_labels_default_to_zero() {
        let conn = test_conn();
        let facilities = FacilityStore::new(&conn);
        let occupants = OccupantStore::new(&conn);

        facilities
            .upsert_batch(&[facility("F1", "General Hospital", 2, 2)])
            .unwrap();
        // Only ICU occupants; the general count must default to zero.
        seed_occupants(&occupants, "F1", 0, 2);

        let aggregator = OccupancyAggregator::new(DEFAULT_THRESHOLD, 50);
        let rows = aggregator.rows_over_threshold(&facilities, &occupants).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].general_occupied, 0);
        assert_eq!(rows[0].icu_occupied, 2);
    }
}
