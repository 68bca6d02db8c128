//! Entity definition lookup across the enabled modules of a tenant.

use serde_json::{Map, Value};

use trellis_registry::ModuleRegistry;
use trellis_store::{StoreBackend, StoreResult};

pub fn normalize_entity_id(entity_id: &str) -> String {
    entity_id.trim_matches('/').trim().to_string()
}

/// `entity.job` and `job` address the same entity.
pub fn match_entity_id(requested: &str, declared: &str) -> bool {
    if requested == declared {
        return true;
    }
    if let Some(bare) = declared.strip_prefix("entity.") {
        if requested == bare {
            return true;
        }
    }
    if let Some(bare) = requested.strip_prefix("entity.") {
        if bare == declared {
            return true;
        }
    }
    false
}

/// Entities as a list, whether the manifest declares a list or an id-keyed
/// map.
pub fn entities_from_manifest(manifest: &Value) -> Vec<Value> {
    match manifest.get("entities") {
        Some(Value::Array(entities)) => entities.clone(),
        Some(Value::Object(entities)) => entities
            .iter()
            .map(|(ent_id, ent)| match ent {
                Value::Object(ent) => {
                    let mut item = Map::new();
                    item.insert("id".to_string(), Value::String(ent_id.clone()));
                    for (key, value) in ent {
                        item.insert(key.clone(), value.clone());
                    }
                    Value::Object(item)
                }
                _ => {
                    let mut item = Map::new();
                    item.insert("id".to_string(), Value::String(ent_id.clone()));
                    Value::Object(item)
                }
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Find an entity definition among the enabled modules' head manifests.
/// Returns `(module_id, entity, manifest)` for the first match.
pub fn find_entity_def<B: StoreBackend>(
    registry: &ModuleRegistry<B>,
    entity_id: &str,
) -> StoreResult<Option<(String, Value, Value)>> {
    let entity_id = normalize_entity_id(entity_id);
    for module in registry.list()? {
        if !module.enabled {
            continue;
        }
        let manifest = match registry
            .store()
            .get_snapshot(&module.module_id, &module.current_hash)?
        {
            Some(manifest) => manifest,
            None => continue,
        };
        for entity in entities_from_manifest(&manifest) {
            let declared = entity.get("id").and_then(Value::as_str).unwrap_or_default();
            if !declared.is_empty() && match_entity_id(&entity_id, declared) {
                return Ok(Some((module.module_id.clone(), entity, manifest)));
            }
        }
    }
    Ok(None)
}
