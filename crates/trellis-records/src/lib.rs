//! Record payload validation against entity definitions, and the generic
//! record store contract (keyset pagination, lookup listings) used by it.

mod entities;
mod store;
mod validate;

pub use entities::{entities_from_manifest, find_entity_def, match_entity_id, normalize_entity_id};
pub use store::{MemRecordStore, RecordPage, RecordStore, StoredRecord};
pub use validate::{validate_lookup_fields, validate_record_payload};
