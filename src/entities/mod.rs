// Entity models and their SQLite stores
//
// Each entity has:
// - An immutable business identifier taken from the source sheet
// - Mutable fields overwritten wholesale by the reconciliation engine
// - A store implementing the EntityStore trait plus kind-specific lookups

pub mod facility;
pub mod occupant;

pub use facility::{Facility, FacilityStore};
pub use occupant::{Occupant, OccupantStore, UnitType};
