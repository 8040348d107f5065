// Reconciliation engine - make the store match the source snapshot
//
// Three passes per entity kind:
//   1. universe pass: full identifier column, header skipped
//   2. upsert pass: fixed-size row windows, partitioned into add/update
//   3. deletion sweep: keyset pages, bulk delete of ids absent from the
//      universe set
//
// Known limitation, accepted as-is: a record inserted into the store behind
// an already-visited page boundary while the deletion sweep is running can
// be missed until the next scheduled run. The scheduler guarantees two sync
// runs never overlap; external writers are not locked out.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::entities::occupant::OccupantRow;
use crate::entities::{Facility, Occupant};
use crate::error::SyncError;
use crate::source::TabularSource;
use crate::store::{EntityStore, Identified, NameLookup};

// ============================================================================
// SHEET LAYOUTS
// ============================================================================

/// Fixed column layout of one entity kind's sheet. The identifier always
/// lives in column A; row 1 is the header, row 2 the first data row.
#[derive(Debug, Clone, Copy)]
pub struct SheetLayout {
    pub sheet: &'static str,
    pub last_column: char,
}

impl SheetLayout {
    pub const FACILITY: SheetLayout = SheetLayout {
        sheet: "Facility",
        last_column: 'E',
    };

    pub const OCCUPANT: SheetLayout = SheetLayout {
        sheet: "Occupant",
        last_column: 'F',
    };

    fn id_range(&self) -> String {
        format!("{}!A:A", self.sheet)
    }

    fn window_range(&self, start_row: usize, end_row: usize) -> String {
        format!(
            "{}!A{}:{}{}",
            self.sheet, start_row, self.last_column, end_row
        )
    }
}

// ============================================================================
// SYNC REPORT
// ============================================================================

/// Operation counters for one entity kind's reconciliation run.
///
/// A run over an unchanged source reports zero added, updated and deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    /// Rows rejected for an unresolvable facility reference.
    pub skipped: usize,
}

impl SyncReport {
    /// True when the run performed no store mutation.
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.deleted == 0
    }
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct ReconciliationEngine {
    batch_size: usize,
}

impl ReconciliationEngine {
    pub fn new(batch_size: usize) -> Self {
        ReconciliationEngine {
            batch_size: batch_size.max(1),
        }
    }

    /// Reconcile the facility table against the `Facility` sheet.
    pub fn reconcile_facilities<S, St>(
        &self,
        source: &S,
        store: &St,
    ) -> Result<SyncReport, SyncError>
    where
        S: TabularSource,
        St: EntityStore<Entity = Facility>,
    {
        let layout = SheetLayout::FACILITY;
        let universe = self.read_universe(source, &layout)?;
        let mut report = SyncReport::default();

        self.upsert_pass(
            source,
            &layout,
            universe.len(),
            store,
            &mut report,
            |rows, first_row| {
                let mut parsed = Vec::with_capacity(rows.len());
                for (offset, cells) in rows.iter().enumerate() {
                    let facility = Facility::from_row(cells).map_err(|reason| {
                        SyncError::parse(layout.sheet, first_row + offset, reason)
                    })?;
                    parsed.push(facility);
                }
                Ok((parsed, 0))
            },
        )?;

        report.deleted = self.deletion_sweep(store, &universe)?;
        Ok(report)
    }

    /// Reconcile the occupant table against the `Occupant` sheet.
    ///
    /// Must run after facility reconciliation: the facility-name column is
    /// resolved against the store, so a stale facility set would reject
    /// rows that are valid in the source.
    pub fn reconcile_occupants<S, Fs, Os>(
        &self,
        source: &S,
        facilities: &Fs,
        store: &Os,
    ) -> Result<SyncReport, SyncError>
    where
        S: TabularSource,
        Fs: NameLookup<Entity = Facility>,
        Os: EntityStore<Entity = Occupant>,
    {
        let layout = SheetLayout::OCCUPANT;
        let universe = self.read_universe(source, &layout)?;
        let mut report = SyncReport::default();

        self.upsert_pass(
            source,
            &layout,
            universe.len(),
            store,
            &mut report,
            |rows, first_row| {
                // Resolve this window's facility names in one bulk read.
                let mut names: Vec<String> = rows
                    .iter()
                    .filter_map(|cells| cells.get(5))
                    .cloned()
                    .collect();
                names.sort();
                names.dedup();
                let facility_ids: HashMap<String, String> = facilities
                    .find_by_names(&names)?
                    .into_iter()
                    .map(|f| (f.name, f.id))
                    .collect();

                let mut parsed = Vec::with_capacity(rows.len());
                let mut skipped = 0;
                for (offset, cells) in rows.iter().enumerate() {
                    let row = Occupant::from_row(cells, &facility_ids).map_err(|reason| {
                        SyncError::parse(layout.sheet, first_row + offset, reason)
                    })?;
                    match row {
                        OccupantRow::Parsed(occupant) => parsed.push(occupant),
                        OccupantRow::UnresolvedFacility { id, facility_name } => {
                            warn!(
                                occupant_id = %id,
                                facility_name = %facility_name,
                                "skipping occupant row: facility name matches no stored facility"
                            );
                            skipped += 1;
                        }
                    }
                }
                Ok((parsed, skipped))
            },
        )?;

        report.deleted = self.deletion_sweep(store, &universe)?;
        Ok(report)
    }

    // ------------------------------------------------------------------------
    // passes
    // ------------------------------------------------------------------------

    /// Read the full identifier column and collect the authoritative
    /// membership set. Row 1 is the header and is skipped.
    fn read_universe<S: TabularSource>(
        &self,
        source: &S,
        layout: &SheetLayout,
    ) -> Result<HashSet<String>, SyncError> {
        let range = layout.id_range();
        let rows = source
            .read_range(&range)
            .map_err(|e| SyncError::source_read(&range, e))?;

        Ok(rows
            .iter()
            .skip(1)
            .filter_map(|row| row.first())
            .cloned()
            .collect())
    }

    /// Walk the data rows in `batch_size` windows, partitioning each window
    /// into records to add and records to overwrite.
    ///
    /// The loop bound is `universe_len + 1` because the universe count
    /// excludes the header row while window offsets are sheet row numbers.
    fn upsert_pass<S, St, F>(
        &self,
        source: &S,
        layout: &SheetLayout,
        universe_len: usize,
        store: &St,
        report: &mut SyncReport,
        mut parse_window: F,
    ) -> Result<(), SyncError>
    where
        S: TabularSource,
        St: EntityStore,
        F: FnMut(&[Vec<String>], usize) -> Result<(Vec<St::Entity>, usize), SyncError>,
    {
        let mut window_start = 2usize;
        while window_start <= universe_len + 1 {
            let window_end = window_start + self.batch_size - 1;
            let range = layout.window_range(window_start, window_end);
            let rows = source
                .read_range(&range)
                .map_err(|e| SyncError::source_read(&range, e))?;

            if !rows.is_empty() {
                let (parsed, skipped) = parse_window(&rows, window_start)?;
                report.skipped += skipped;
                self.apply_window(store, parsed, report)?;
            }

            debug!(
                sheet = layout.sheet,
                window_start,
                rows = rows.len(),
                "window applied"
            );
            window_start += self.batch_size;
        }
        Ok(())
    }

    /// Diff one window's parsed records against the store and issue at most
    /// two bulk writes (updates, then adds). Field comparison is whole-record
    /// equality: any differing attribute makes the record update-eligible and
    /// the stored record is overwritten in full.
    fn apply_window<St: EntityStore>(
        &self,
        store: &St,
        parsed: Vec<St::Entity>,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let ids: Vec<String> = parsed.iter().map(|e| e.id().to_string()).collect();
        let existing: HashMap<String, St::Entity> = store
            .find_by_ids(&ids)?
            .into_iter()
            .map(|e| (e.id().to_string(), e))
            .collect();

        let mut to_update = Vec::new();
        let mut to_add = Vec::new();
        for record in parsed {
            match existing.get(record.id()) {
                Some(current) if *current == record => report.unchanged += 1,
                Some(_) => to_update.push(record),
                None => to_add.push(record),
            }
        }

        report.updated += to_update.len();
        report.added += to_add.len();

        if !to_update.is_empty() {
            store.upsert_batch(&to_update)?;
        }
        if !to_add.is_empty() {
            store.upsert_batch(&to_add)?;
        }
        Ok(())
    }

    /// Page through the store in ascending-id order and bulk-delete every
    /// record whose identifier is no longer in the universe set. One delete
    /// call per page, so round trips stay proportional to store size over
    /// `batch_size` no matter how many records disappeared.
    fn deletion_sweep<St: EntityStore>(
        &self,
        store: &St,
        universe: &HashSet<String>,
    ) -> Result<usize, SyncError> {
        let mut deleted = 0;
        let mut after_id: Option<String> = None;
        loop {
            let page = store.scan_page(after_id.as_deref(), self.batch_size)?;
            let Some(last) = page.last() else {
                break;
            };
            after_id = Some(last.id().to_string());

            let doomed: Vec<St::Entity> = page
                .iter()
                .filter(|record| !universe.contains(record.id()))
                .cloned()
                .collect();
            if !doomed.is_empty() {
                deleted += doomed.len();
                store.delete_batch(&doomed)?;
            }
        }

        if deleted > 0 {
            debug!(kind = store.kind(), deleted, "deletion sweep finished");
        }
        Ok(deleted)
    }
}

// ============================================================================
// TESTS
// ============================================================================
