use std::collections::HashMap;
use std::sync::RwLock;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use trellis_core::{OrgId, now_utc};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRecord {
    pub record_id: String,
    pub record: Value,
}

/// One page of records plus the cursor for the next page, or `None` at the
/// end. The cursor encodes `(updated_at, id)`; ids must be total-order
/// comparable in the backing store for ties on `updated_at` to page
/// deterministically.
#[derive(Debug, Clone, Serialize)]
pub struct RecordPage {
    pub items: Vec<StoredRecord>,
    pub next_cursor: Option<String>,
}

fn encode_cursor(updated_at: &str, record_id: &str) -> Option<String> {
    if updated_at.is_empty() || record_id.is_empty() {
        return None;
    }
    Some(URL_SAFE.encode(format!("{updated_at}|{record_id}")))
}

fn decode_cursor(cursor: &str) -> Option<(String, String)> {
    let raw = URL_SAFE.decode(cursor).ok()?;
    let raw = String::from_utf8(raw).ok()?;
    let (ts, record_id) = raw.split_once('|')?;
    if ts.is_empty() || record_id.is_empty() {
        return None;
    }
    Some((ts.to_string(), record_id.to_string()))
}

/// Generic record persistence, scoped by tenant and entity.
pub trait RecordStore: Send + Sync {
    fn create(&self, org: &OrgId, entity_id: &str, data: &Value) -> StoredRecord;
    fn get(&self, org: &OrgId, entity_id: &str, record_id: &str) -> Option<StoredRecord>;
    fn update(&self, org: &OrgId, entity_id: &str, record_id: &str, data: &Value) -> StoredRecord;
    fn delete(&self, org: &OrgId, entity_id: &str, record_id: &str);

    /// Newest first by `updated_at`.
    fn list(&self, org: &OrgId, entity_id: &str, limit: usize, q: Option<&str>,
        search_fields: Option<&[String]>) -> Vec<StoredRecord>;

    /// Keyset pagination ordered by `(updated_at, id)` descending.
    #[allow(clippy::too_many_arguments)]
    fn list_page(
        &self,
        org: &OrgId,
        entity_id: &str,
        limit: usize,
        cursor: Option<&str>,
        q: Option<&str>,
        search_fields: Option<&[String]>,
        fields: Option<&[String]>,
    ) -> RecordPage;

    /// Projection for lookup pickers: `{display_field, id}` per record,
    /// prefix-filtered on the display field.
    fn list_lookup(
        &self,
        org: &OrgId,
        entity_id: &str,
        display_field: Option<&str>,
        limit: usize,
        q: Option<&str>,
    ) -> Vec<StoredRecord>;
}

#[derive(Debug, Clone)]
struct RecordRow {
    id: String,
    data: Value,
    updated_at: String,
}

type Key = (OrgId, String);

/// In-memory record store mirroring the backing table's ordering
/// guarantees.
#[derive(Default)]
pub struct MemRecordStore {
    inner: RwLock<HashMap<Key, Vec<RecordRow>>>,
}

impl MemRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn key(org: &OrgId, entity_id: &str) -> Key {
    (org.clone(), entity_id.to_string())
}

fn matches_query(row: &RecordRow, q: Option<&str>, search_fields: Option<&[String]>) -> bool {
    let q = match q.map(|q| q.trim().to_lowercase()).filter(|q| !q.is_empty()) {
        Some(q) => q,
        None => return true,
    };
    match search_fields.filter(|fields| !fields.is_empty()) {
        Some(fields) => fields.iter().any(|field| {
            row.data
                .get(field)
                .and_then(Value::as_str)
                .map(|value| value.to_lowercase().starts_with(&q))
                .unwrap_or(false)
        }),
        None => row.data.to_string().to_lowercase().contains(&q),
    }
}

fn project(data: &Value, fields: Option<&[String]>) -> Value {
    match fields.filter(|fields| !fields.is_empty()) {
        None => data.clone(),
        Some(fields) => {
            let mut out = Map::new();
            for field in fields {
                if let Some(value) = data.get(field) {
                    out.insert(field.clone(), value.clone());
                }
            }
            Value::Object(out)
        }
    }
}

fn to_stored(row: &RecordRow, fields: Option<&[String]>) -> StoredRecord {
    let mut record = project(&row.data, fields);
    if let Some(map) = record.as_object_mut() {
        map.insert("id".to_string(), Value::String(row.id.clone()));
    }
    StoredRecord {
        record_id: row.id.clone(),
        record,
    }
}

fn sorted_desc(rows: &[RecordRow]) -> Vec<&RecordRow> {
    let mut sorted: Vec<&RecordRow> = rows.iter().collect();
    sorted.sort_by(|a, b| {
        (b.updated_at.as_str(), b.id.as_str()).cmp(&(a.updated_at.as_str(), a.id.as_str()))
    });
    sorted
}

impl RecordStore for MemRecordStore {
    fn create(&self, org: &OrgId, entity_id: &str, data: &Value) -> StoredRecord {
        let record_id = Uuid::new_v4().to_string();
        let mut record = data.clone();
        if let Some(map) = record.as_object_mut() {
            map.insert("id".to_string(), Value::String(record_id.clone()));
        }
        let row = RecordRow {
            id: record_id,
            data: record,
            updated_at: now_utc(),
        };
        let mut state = self.inner.write().unwrap();
        let stored = to_stored(&row, None);
        state.entry(key(org, entity_id)).or_default().push(row);
        stored
    }

    fn get(&self, org: &OrgId, entity_id: &str, record_id: &str) -> Option<StoredRecord> {
        let state = self.inner.read().unwrap();
        state
            .get(&key(org, entity_id))
            .and_then(|rows| rows.iter().find(|row| row.id == record_id))
            .map(|row| to_stored(row, None))
    }

    fn update(&self, org: &OrgId, entity_id: &str, record_id: &str, data: &Value) -> StoredRecord {
        let mut record = data.clone();
        if let Some(map) = record.as_object_mut() {
            map.insert("id".to_string(), Value::String(record_id.to_string()));
        }
        let mut state = self.inner.write().unwrap();
        let rows = state.entry(key(org, entity_id)).or_default();
        let updated_at = now_utc();
        if let Some(row) = rows.iter_mut().find(|row| row.id == record_id) {
            row.data = record.clone();
            row.updated_at = updated_at;
            return to_stored(row, None);
        }
        let row = RecordRow {
            id: record_id.to_string(),
            data: record,
            updated_at,
        };
        let stored = to_stored(&row, None);
        rows.push(row);
        stored
    }

    fn delete(&self, org: &OrgId, entity_id: &str, record_id: &str) {
        let mut state = self.inner.write().unwrap();
        if let Some(rows) = state.get_mut(&key(org, entity_id)) {
            rows.retain(|row| row.id != record_id);
        }
    }

    fn list(
        &self,
        org: &OrgId,
        entity_id: &str,
        limit: usize,
        q: Option<&str>,
        search_fields: Option<&[String]>,
    ) -> Vec<StoredRecord> {
        let state = self.inner.read().unwrap();
        let rows = match state.get(&key(org, entity_id)) {
            Some(rows) => rows,
            None => return Vec::new(),
        };
        sorted_desc(rows)
            .into_iter()
            .filter(|row| matches_query(row, q, search_fields))
            .take(limit)
            .map(|row| to_stored(row, None))
            .collect()
    }

    fn list_page(
        &self,
        org: &OrgId,
        entity_id: &str,
        limit: usize,
        cursor: Option<&str>,
        q: Option<&str>,
        search_fields: Option<&[String]>,
        fields: Option<&[String]>,
    ) -> RecordPage {
        let state = self.inner.read().unwrap();
        let rows = match state.get(&key(org, entity_id)) {
            Some(rows) => rows,
            None => {
                return RecordPage {
                    items: Vec::new(),
                    next_cursor: None,
                };
            }
        };
        let decoded = cursor.and_then(decode_cursor);
        let filtered: Vec<&RecordRow> = sorted_desc(rows)
            .into_iter()
            .filter(|row| matches_query(row, q, search_fields))
            .filter(|row| match &decoded {
                None => true,
                Some((cursor_ts, cursor_id)) => {
                    (row.updated_at.as_str(), row.id.as_str())
                        < (cursor_ts.as_str(), cursor_id.as_str())
                }
            })
            .take(limit + 1)
            .collect();

        let next_cursor = if filtered.len() > limit && limit > 0 {
            let tail = filtered[limit - 1];
            encode_cursor(&tail.updated_at, &tail.id)
        } else {
            None
        };
        RecordPage {
            items: filtered
                .into_iter()
                .take(limit)
                .map(|row| to_stored(row, fields))
                .collect(),
            next_cursor,
        }
    }

    fn list_lookup(
        &self,
        org: &OrgId,
        entity_id: &str,
        display_field: Option<&str>,
        limit: usize,
        q: Option<&str>,
    ) -> Vec<StoredRecord> {
        let state = self.inner.read().unwrap();
        let rows = match state.get(&key(org, entity_id)) {
            Some(rows) => rows,
            None => return Vec::new(),
        };
        let q_lower = q.map(|q| q.trim().to_lowercase()).filter(|q| !q.is_empty());
        sorted_desc(rows)
            .into_iter()
            .filter(|row| match (display_field, &q_lower) {
                (Some(display_field), Some(q)) => row
                    .data
                    .get(display_field)
                    .and_then(Value::as_str)
                    .map(|label| label.to_lowercase().starts_with(q))
                    .unwrap_or(false),
                _ => true,
            })
            .take(limit)
            .map(|row| match display_field {
                Some(display_field) => {
                    let mut record = Map::new();
                    record.insert(
                        display_field.to_string(),
                        row.data.get(display_field).cloned().unwrap_or(Value::Null),
                    );
                    record.insert("id".to_string(), Value::String(row.id.clone()));
                    StoredRecord {
                        record_id: row.id.clone(),
                        record: Value::Object(record),
                    }
                }
                None => to_stored(row, None),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn org() -> OrgId {
        OrgId::default()
    }

    #[test]
    fn create_get_update_delete_round_trip() {
        let store = MemRecordStore::new();
        let created = store.create(&org(), "entity.job", &json!({"job.title": "Roof"}));
        assert_eq!(created.record["job.title"], json!("Roof"));
        assert_eq!(created.record["id"], json!(created.record_id));

        let loaded = store.get(&org(), "entity.job", &created.record_id).unwrap();
        assert_eq!(loaded, created);

        let updated = store.update(
            &org(),
            "entity.job",
            &created.record_id,
            &json!({"job.title": "Roof repair"}),
        );
        assert_eq!(updated.record["job.title"], json!("Roof repair"));

        store.delete(&org(), "entity.job", &created.record_id);
        assert!(store.get(&org(), "entity.job", &created.record_id).is_none());
    }

    #[test]
    fn records_are_tenant_scoped() {
        let store = MemRecordStore::new();
        let created = store.create(&org(), "entity.job", &json!({"job.title": "A"}));
        let other = OrgId::new("other");
        assert!(store.get(&other, "entity.job", &created.record_id).is_none());
        assert!(store.list(&other, "entity.job", 10, None, None).is_empty());
    }

    #[test]
    fn list_page_walks_all_records_without_overlap() {
        let store = MemRecordStore::new();
        for i in 0..7 {
            store.create(&org(), "entity.job", &json!({"job.title": format!("job {i}")}));
        }

        let mut seen = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = store.list_page(&org(), "entity.job", 3, cursor.as_deref(), None, None, None);
            seen.extend(page.items.iter().map(|r| r.record_id.clone()));
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        assert_eq!(seen.len(), 7);
        let mut unique = seen.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 7, "cursor pagination must not repeat records");
    }

    #[test]
    fn list_page_ties_break_on_id() {
        // Same-second timestamps force the id component of the cursor to
        // carry the ordering.
        let store = MemRecordStore::new();
        for _ in 0..5 {
            store.create(&org(), "entity.job", &json!({"job.title": "x"}));
        }
        let first = store.list_page(&org(), "entity.job", 2, None, None, None, None);
        assert_eq!(first.items.len(), 2);
        let second = store.list_page(
            &org(),
            "entity.job",
            2,
            first.next_cursor.as_deref(),
            None,
            None,
            None,
        );
        for item in &second.items {
            assert!(!first.items.iter().any(|f| f.record_id == item.record_id));
        }
    }

    #[test]
    fn search_fields_use_prefix_matching() {
        let store = MemRecordStore::new();
        store.create(&org(), "entity.job", &json!({"job.title": "Roof repair"}));
        store.create(&org(), "entity.job", &json!({"job.title": "Solar install"}));

        let fields = vec!["job.title".to_string()];
        let hits = store.list(&org(), "entity.job", 10, Some("roof"), Some(&fields));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record["job.title"], json!("Roof repair"));

        // Without search fields the query matches anywhere in the payload.
        let hits = store.list(&org(), "entity.job", 10, Some("install"), None);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn field_projection_limits_payload() {
        let store = MemRecordStore::new();
        store.create(
            &org(),
            "entity.job",
            &json!({"job.title": "Roof", "job.notes": "long text"}),
        );
        let fields = vec!["job.title".to_string()];
        let page = store.list_page(&org(), "entity.job", 10, None, None, None, Some(&fields));
        let record = &page.items[0].record;
        assert!(record.get("job.title").is_some());
        assert!(record.get("job.notes").is_none());
        assert!(record.get("id").is_some());
    }

    #[test]
    fn lookup_projects_display_field() {
        let store = MemRecordStore::new();
        store.create(&org(), "entity.parent", &json!({"parent.name": "Acme", "parent.city": "X"}));
        store.create(&org(), "entity.parent", &json!({"parent.name": "Beta"}));

        let items = store.list_lookup(&org(), "entity.parent", Some("parent.name"), 10, Some("ac"));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].record["parent.name"], json!("Acme"));
        assert!(items[0].record.get("parent.city").is_none());
    }
}
