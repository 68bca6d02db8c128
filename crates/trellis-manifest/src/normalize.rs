//! Best-effort canonicalization of legacy and v0 manifest shapes.

use serde_json::{Map, Value, json};

/// `open_jobs` / `open-jobs` -> `Open Jobs`.
fn title_case(value: &str) -> String {
    let replaced = value.replace('-', "_");
    let words: Vec<String> = replaced
        .split('_')
        .filter(|p| !p.is_empty())
        .map(|p| {
            let mut chars = p.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();
    if words.is_empty() {
        value.to_string()
    } else {
        words.join(" ")
    }
}

fn expand_enum_options(field: &mut Map<String, Value>) {
    if field.get("type").and_then(Value::as_str) != Some("enum") {
        return;
    }
    let options = field
        .get("options")
        .filter(|v| !v.is_null())
        .or_else(|| field.get("values"))
        .cloned();
    if let Some(Value::Array(options)) = options {
        if !options.is_empty() && options.iter().all(Value::is_string) {
            let expanded: Vec<Value> = options
                .iter()
                .filter_map(Value::as_str)
                .map(|opt| json!({"value": opt, "label": title_case(opt)}))
                .collect();
            field.insert("options".to_string(), Value::Array(expanded));
        }
    }
}

fn normalize_fields(fields: Option<&Value>) -> Vec<Value> {
    match fields {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_object)
            .map(|f| {
                let mut item = f.clone();
                expand_enum_options(&mut item);
                Value::Object(item)
            })
            .collect(),
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(fid, fdef)| fdef.as_object().map(|f| (fid, f)))
            .map(|(fid, fdef)| {
                let mut item = fdef.clone();
                item.entry("id".to_string())
                    .or_insert_with(|| Value::String(fid.clone()));
                expand_enum_options(&mut item);
                Value::Object(item)
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn normalize_entities(entities: Option<&Value>) -> Vec<Value> {
    match entities {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_object)
            .map(|ent| {
                let mut item = ent.clone();
                let fields = normalize_fields(item.get("fields"));
                item.insert("fields".to_string(), Value::Array(fields));
                Value::Object(item)
            })
            .collect(),
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(eid, ent)| ent.as_object().map(|e| (eid, e)))
            .map(|(eid, ent)| {
                let mut item = ent.clone();
                item.entry("id".to_string())
                    .or_insert_with(|| Value::String(eid.clone()));
                let fields = normalize_fields(item.get("fields"));
                item.insert("fields".to_string(), Value::Array(fields));
                Value::Object(item)
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn canonical_entity_id(entity: &str, entity_ids: &[String]) -> String {
    if entity_ids.iter().any(|id| id == entity) {
        return entity.to_string();
    }
    if !entity.starts_with("entity.") {
        let prefixed = format!("entity.{entity}");
        if entity_ids.iter().any(|id| *id == prefixed) {
            return prefixed;
        }
    }
    entity.to_string()
}

fn normalize_view(view: &Map<String, Value>, entity_ids: &[String]) -> Value {
    let mut item = view.clone();
    let vtype = item
        .get("kind")
        .and_then(Value::as_str)
        .or_else(|| item.get("type").and_then(Value::as_str))
        .map(str::to_string);
    if let Some(kind) = &vtype {
        item.insert("kind".to_string(), Value::String(kind.clone()));
    }
    let entity = item
        .get("entity")
        .and_then(Value::as_str)
        .or_else(|| item.get("entity_id").and_then(Value::as_str))
        .or_else(|| item.get("entityId").and_then(Value::as_str))
        .map(str::to_string);
    if let Some(entity) = entity {
        item.insert(
            "entity".to_string(),
            Value::String(canonical_entity_id(&entity, entity_ids)),
        );
    }

    if vtype.as_deref() == Some("list") {
        if !item.contains_key("columns") {
            if let Some(fields) = item.get("fields").and_then(Value::as_array) {
                let columns: Vec<Value> = fields
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|fid| json!({"field_id": fid}))
                    .collect();
                item.insert("columns".to_string(), Value::Array(columns));
            }
        }
        if let Some(Value::Array(columns)) = item.get("columns").cloned() {
            let cols: Vec<Value> = columns
                .into_iter()
                .filter_map(|col| match col {
                    Value::Object(map) if map.get("field_id").map(truthy).unwrap_or(false) => {
                        Some(Value::Object(map))
                    }
                    Value::String(fid) => Some(json!({"field_id": fid})),
                    _ => None,
                })
                .collect();
            item.insert("columns".to_string(), Value::Array(cols));
        }
    }
    if vtype.as_deref() == Some("form") {
        if !item.contains_key("sections") {
            if let Some(fields) = item.get("fields").cloned() {
                if fields.is_array() {
                    item.insert(
                        "sections".to_string(),
                        json!([{"id": "main", "title": "Main", "fields": fields}]),
                    );
                }
            }
        }
        if let Some(Value::Array(sections)) = item.get("sections").cloned() {
            let kept: Vec<Value> = sections.into_iter().filter(Value::is_object).collect();
            item.insert("sections".to_string(), Value::Array(kept));
        }
    }
    Value::Object(item)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(m) => !m.is_empty(),
    }
}

fn normalize_blocks(blocks: Option<&Value>) -> Vec<Value> {
    let items = match blocks.and_then(Value::as_array) {
        Some(items) => items,
        None => return Vec::new(),
    };
    let mut normalized = Vec::with_capacity(items.len());
    for block in items.iter().filter_map(Value::as_object) {
        let mut item = block.clone();
        match item.get("kind").and_then(Value::as_str) {
            Some("view") => {
                if let Some(target) = item.get("target").and_then(Value::as_str) {
                    if !target.starts_with("view:") {
                        let prefixed = format!("view:{target}");
                        item.insert("target".to_string(), Value::String(prefixed));
                    }
                }
            }
            Some("stack") | Some("container") | Some("record") => {
                let content = normalize_blocks(item.get("content"));
                item.insert("content".to_string(), Value::Array(content));
            }
            Some("grid") => {
                let grid_items: Vec<Value> = item
                    .get("items")
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(Value::as_object)
                            .map(|grid_item| {
                                let mut norm = grid_item.clone();
                                let content = normalize_blocks(grid_item.get("content"));
                                norm.insert("content".to_string(), Value::Array(content));
                                Value::Object(norm)
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                item.insert("items".to_string(), Value::Array(grid_items));
            }
            Some("tabs") => {
                let tabs: Vec<Value> = item
                    .get("tabs")
                    .and_then(Value::as_array)
                    .map(|tabs| {
                        tabs.iter()
                            .filter_map(Value::as_object)
                            .map(|tab| {
                                let mut norm = tab.clone();
                                let content = normalize_blocks(tab.get("content"));
                                norm.insert("content".to_string(), Value::Array(content));
                                Value::Object(norm)
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                item.insert("tabs".to_string(), Value::Array(tabs));
            }
            _ => {}
        }
        normalized.push(Value::Object(item));
    }
    normalized
}

const CONSUMED_TOP_KEYS: &[&str] = &[
    "manifest_version",
    "module",
    "module_id",
    "id",
    "name",
    "version",
    "description",
    "entities",
    "views",
    "workflows",
    "relations",
    "pages",
];

/// Canonicalize a raw manifest. Total: malformed input degrades to the
/// nearest canonical shape rather than failing. Idempotent over its own
/// output.
pub fn normalize_manifest(raw: &Value) -> Value {
    let raw = match raw.as_object() {
        Some(map) => map,
        None => return json!({}),
    };

    let mut normalized = Map::new();
    let version = raw
        .get("manifest_version")
        .filter(|v| truthy(v))
        .cloned()
        .unwrap_or_else(|| Value::String("0.x".to_string()));
    normalized.insert("manifest_version".to_string(), version);

    let module = match raw.get("module") {
        Some(Value::Object(module)) => Value::Object(module.clone()),
        _ => {
            let module_id = raw
                .get("module_id")
                .filter(|v| truthy(v))
                .or_else(|| raw.get("id"))
                .cloned()
                .unwrap_or(Value::Null);
            let name = match raw.get("name").filter(|v| truthy(v)) {
                Some(name) => name.clone(),
                None => match &module_id {
                    Value::String(id) => Value::String(title_case(id)),
                    _ => Value::Null,
                },
            };
            json!({
                "id": module_id,
                "name": name,
                "version": raw.get("version").cloned().unwrap_or(Value::Null),
                "description": raw.get("description").cloned().unwrap_or(Value::Null),
            })
        }
    };
    normalized.insert("module".to_string(), module);

    let entities = normalize_entities(raw.get("entities"));
    let entity_ids: Vec<String> = entities
        .iter()
        .filter_map(|e| e.get("id").and_then(Value::as_str))
        .map(str::to_string)
        .collect();
    normalized.insert("entities".to_string(), Value::Array(entities));

    let views: Vec<Value> = raw
        .get("views")
        .and_then(Value::as_array)
        .map(|views| {
            views
                .iter()
                .filter_map(Value::as_object)
                .map(|v| normalize_view(v, &entity_ids))
                .collect()
        })
        .unwrap_or_default();
    normalized.insert("views".to_string(), Value::Array(views));

    if let Some(Value::Array(pages)) = raw.get("pages") {
        let normalized_pages: Vec<Value> = pages
            .iter()
            .filter_map(Value::as_object)
            .map(|page| {
                let mut item = page.clone();
                let content = normalize_blocks(page.get("content"));
                item.insert("content".to_string(), Value::Array(content));
                Value::Object(item)
            })
            .collect();
        normalized.insert("pages".to_string(), Value::Array(normalized_pages));
    }

    let workflows = match raw.get("workflows") {
        Some(Value::Array(list)) => Value::Array(list.clone()),
        Some(Value::Object(map)) => Value::Array(map.values().cloned().collect()),
        _ => Value::Array(Vec::new()),
    };
    normalized.insert("workflows".to_string(), workflows);

    if let Some(Value::Array(relations)) = raw.get("relations") {
        normalized.insert("relations".to_string(), Value::Array(relations.clone()));
    }

    // Unrecognized top-level keys ride along untouched for forward compat.
    for (key, value) in raw {
        if CONSUMED_TOP_KEYS.contains(&key.as_str()) {
            continue;
        }
        normalized.insert(key.clone(), value.clone());
    }

    Value::Object(normalized)
}
