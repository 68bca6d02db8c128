//! Structural and cross-reference validation of canonical manifests.
//!
//! The validator accumulates every issue it can find in a single pass over
//! the document; it only skips checks whose prerequisites are already
//! broken. Feature availability is keyed on `manifest_version` via the
//! gate tables in [`crate::catalog`].

mod actions;
mod app;
mod blocks;
mod conditions;
mod views;
mod workflows;

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Value, json};
use trellis_core::{Issue, ManifestVersion};

use crate::catalog::{
    ALLOWED_FIELD_TYPES, ALLOWED_V1_TOP_KEYS, CONDITION_GATE, FIELD_UI_GATE,
};
use crate::normalize::normalize_manifest;

pub(crate) use conditions::validate_condition;

/// Validate a canonical manifest. Returns accumulated `(errors, warnings)`.
pub fn validate_manifest(
    manifest: &Value,
    expected_module_id: Option<&str>,
) -> (Vec<Issue>, Vec<Issue>) {
    let mut cx = Vctx::new(manifest);

    let manifest = match manifest.as_object() {
        Some(_) => manifest,
        None => {
            cx.errors
                .push(Issue::new("MANIFEST_INVALID", "manifest must be an object"));
            return cx.finish();
        }
    };

    check_module(&mut cx, manifest, expected_module_id);

    if !cx.is_v1() {
        if get(manifest, "app").is_some() || get(manifest, "pages").is_some() {
            cx.error(
                "MANIFEST_VERSION_REQUIRED",
                "manifest_version is required for app/pages definitions",
                "manifest_version",
            );
        }
    } else {
        reject_unknown_keys(&mut cx, manifest, ALLOWED_V1_TOP_KEYS, "$");
    }

    let entity_by_id = check_entities(&mut cx, manifest);
    let action_by_id = actions::check_actions(&mut cx, manifest);
    actions::check_modals(&mut cx, manifest, &action_by_id);
    actions::check_triggers(&mut cx, manifest, &entity_by_id, &action_by_id);

    let workflows_by_entity = workflows::workflows_by_entity(manifest);
    views::check_views(&mut cx, manifest, &entity_by_id, &action_by_id, &workflows_by_entity);

    let view_ids = collect_view_ids(manifest);
    check_relations(&mut cx, manifest);
    workflows::check_workflows(&mut cx, manifest, &entity_by_id);

    if cx.is_v1() {
        app::check_app_and_pages(&mut cx, manifest, &entity_by_id, &action_by_id, &view_ids);
    }

    cx.finish()
}

/// Normalize a raw manifest, then validate the canonical form.
pub fn validate_manifest_raw(
    raw: &Value,
    expected_module_id: Option<&str>,
) -> (Value, Vec<Issue>, Vec<Issue>) {
    let normalized = normalize_manifest(raw);
    let (errors, warnings) = validate_manifest(&normalized, expected_module_id);
    (normalized, errors, warnings)
}

pub(crate) struct Vctx {
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
    version: ManifestVersion,
}

impl Vctx {
    fn new(manifest: &Value) -> Self {
        let version = match get(manifest, "manifest_version") {
            Some(Value::String(v)) if !v.is_empty() => ManifestVersion::new(v.clone()),
            _ => ManifestVersion::default(),
        };
        Vctx {
            errors: Vec::new(),
            warnings: Vec::new(),
            version,
        }
    }

    pub fn error(&mut self, code: &str, message: &str, path: impl Into<String>) {
        self.errors.push(Issue::at(code, message, path.into()));
    }

    pub fn warn(&mut self, code: &str, message: &str, path: impl Into<String>) {
        self.warnings.push(Issue::at(code, message, path.into()));
    }

    pub fn is_v1(&self) -> bool {
        self.version.is_v1()
    }

    pub fn at_least(&self, gate: &str) -> bool {
        self.version.at_least(gate)
    }

    pub fn conditions_allowed(&self) -> bool {
        self.version.at_least(CONDITION_GATE)
    }

    fn finish(self) -> (Vec<Issue>, Vec<Issue>) {
        (self.errors, self.warnings)
    }
}

// --- shared lookup helpers -------------------------------------------------

pub(crate) fn get<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value.as_object().and_then(|map| map.get(key))
}

pub(crate) fn get_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    get(value, key).and_then(Value::as_str)
}

pub(crate) fn nonempty_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    get_str(value, key).filter(|s| !s.is_empty())
}

/// Python-style truthiness, used where the contract treats empty values as
/// absent.
pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(m) => !m.is_empty(),
    }
}

pub(crate) fn is_truthy(value: &Value, key: &str) -> bool {
    get(value, key).map(truthy).unwrap_or(false)
}

pub(crate) fn field_ids(entity: &Value) -> BTreeSet<&str> {
    get(entity, "fields")
        .and_then(Value::as_array)
        .map(|fields| {
            fields
                .iter()
                .filter_map(|f| get_str(f, "id"))
                .filter(|id| !id.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn find_field<'a>(entity: &'a Value, field_id: &str) -> Option<&'a Value> {
    get(entity, "fields")
        .and_then(Value::as_array)
        .and_then(|fields| fields.iter().find(|f| get_str(f, "id") == Some(field_id)))
}

pub(crate) fn reject_unknown_keys(cx: &mut Vctx, obj: &Value, allowed: &[&str], path: &str) {
    if let Some(map) = obj.as_object() {
        for key in map.keys() {
            if !allowed.contains(&key.as_str()) {
                cx.error(
                    "MANIFEST_UNKNOWN_KEY",
                    &format!("unknown key: {key}"),
                    format!("{path}.{key}"),
                );
            }
        }
    }
}

/// `page:<id>` / `view:<id>` navigation target.
pub(crate) fn parse_target(target: &str) -> Option<(&'static str, &str)> {
    if let Some(id) = target.strip_prefix("page:") {
        return Some(("page", id));
    }
    if let Some(id) = target.strip_prefix("view:") {
        return Some(("view", id));
    }
    None
}

/// Bare or `view:`-prefixed view target; `page:` is not a view.
pub(crate) fn parse_view_target(target: &str) -> Option<&str> {
    if target.starts_with("page:") {
        return None;
    }
    if let Some(id) = target.strip_prefix("view:") {
        return Some(id);
    }
    Some(target)
}

pub(crate) type EntityMap<'a> = BTreeMap<String, &'a Value>;
pub(crate) type ActionMap<'a> = BTreeMap<String, &'a Value>;

/// Look up an entity by id, trying the `entity.`-prefixed form first for
/// bare ids.
pub(crate) fn entity_lookup<'a>(entities: &EntityMap<'a>, entity_id: &str) -> Option<&'a Value> {
    if entity_id.starts_with("entity.") {
        return entities.get(entity_id).copied();
    }
    let prefixed = format!("entity.{entity_id}");
    entities
        .get(&prefixed)
        .or_else(|| entities.get(entity_id))
        .copied()
}

pub(crate) fn entity_known(entities: &EntityMap<'_>, entity_id: &str) -> bool {
    entity_lookup(entities, entity_id).is_some()
}

fn collect_view_ids(manifest: &Value) -> BTreeSet<String> {
    get(manifest, "views")
        .and_then(Value::as_array)
        .map(|views| {
            views
                .iter()
                .filter_map(|v| get_str(v, "id"))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

// --- module / entities / relations ----------------------------------------

fn check_module(cx: &mut Vctx, manifest: &Value, expected_module_id: Option<&str>) {
    if let Some(version) = get(manifest, "manifest_version") {
        if !version.is_string() {
            cx.error(
                "MANIFEST_VERSION_INVALID",
                "manifest_version must be a string",
                "manifest_version",
            );
        }
    }

    let module = get(manifest, "module");
    if !matches!(module, Some(Value::Object(_))) {
        cx.error("MANIFEST_MODULE_MISSING", "module section is required", "module");
    }
    let module_id = module.and_then(|m| get_str(m, "id"));
    if module_id.map(str::is_empty).unwrap_or(true) {
        cx.error("MANIFEST_MODULE_ID_INVALID", "module.id is required", "module.id");
    }
    if let Some(expected) = expected_module_id {
        if module_id != Some(expected) {
            cx.errors.push(
                Issue::at(
                    "MANIFEST_MODULE_ID_MISMATCH",
                    "module.id does not match target module_id",
                    "module.id",
                )
                .with_detail(json!({
                    "expected": expected,
                    "actual": module_id,
                })),
            );
        }
    }
}

fn check_entities<'a>(cx: &mut Vctx, manifest: &'a Value) -> EntityMap<'a> {
    let mut entity_by_id = EntityMap::new();
    let entities = match get(manifest, "entities") {
        Some(Value::Array(entities)) => entities.as_slice(),
        Some(_) => {
            cx.error("MANIFEST_ENTITIES_INVALID", "entities must be a list", "entities");
            &[]
        }
        None => &[],
    };

    // First pass registers every entity so cross-entity lookups (lookup
    // fields) see later declarations.
    for entity in entities {
        if let Some(id) = nonempty_str(entity, "id") {
            entity_by_id.insert(id.to_string(), entity);
        }
    }

    for (i, entity) in entities.iter().enumerate() {
        let path = format!("entities[{i}]");
        if !entity.is_object() {
            cx.error("MANIFEST_ENTITY_INVALID", "entity must be an object", path);
            continue;
        }
        if nonempty_str(entity, "id").is_none() {
            cx.error("MANIFEST_ENTITY_ID_INVALID", "entity.id is required", format!("{path}.id"));
            continue;
        }
        let fields = match get(entity, "fields") {
            Some(Value::Array(fields)) => fields,
            _ => {
                cx.error(
                    "MANIFEST_FIELDS_INVALID",
                    "entity.fields must be a list",
                    format!("{path}.fields"),
                );
                continue;
            }
        };
        for (j, field) in fields.iter().enumerate() {
            check_field(cx, field, &format!("{path}.fields[{j}]"), &entity_by_id);
        }

        if let Some(display_field) = get(entity, "display_field").filter(|v| truthy(v)) {
            let known = display_field
                .as_str()
                .map(|df| field_ids(entity).contains(df))
                .unwrap_or(false);
            if !known {
                cx.error(
                    "MANIFEST_DISPLAY_FIELD_INVALID",
                    "display_field not found in fields",
                    format!("{path}.display_field"),
                );
            }
        }
    }

    entity_by_id
}

fn check_field(cx: &mut Vctx, field: &Value, fpath: &str, entity_by_id: &EntityMap<'_>) {
    if !field.is_object() {
        cx.error("MANIFEST_FIELD_INVALID", "field must be an object", fpath);
        return;
    }
    if nonempty_str(field, "id").is_none() {
        cx.error("MANIFEST_FIELD_ID_INVALID", "field.id is required", format!("{fpath}.id"));
    }
    let ftype = get_str(field, "type").unwrap_or_default();
    if !ALLOWED_FIELD_TYPES.contains(&ftype) {
        cx.errors.push(
            Issue::at(
                "MANIFEST_FIELD_TYPE_INVALID",
                "field.type must be one of allowed types",
                format!("{fpath}.type"),
            )
            .with_detail(json!({"allowed": ALLOWED_FIELD_TYPES})),
        );
    }

    let required = get(field, "required");
    if let Some(required) = required {
        if !required.is_null() && !required.is_boolean() {
            cx.warn(
                "MANIFEST_FIELD_REQUIRED_INVALID",
                "field.required should be boolean",
                format!("{fpath}.required"),
            );
        }
    }
    let readonly = get(field, "readonly");
    if let Some(readonly) = readonly {
        if !readonly.is_null() && !readonly.is_boolean() {
            cx.warn(
                "MANIFEST_FIELD_READONLY_INVALID",
                "field.readonly should be boolean",
                format!("{fpath}.readonly"),
            );
        }
    }

    if let Some(ui) = get(field, "ui").filter(|v| !v.is_null()) {
        if !cx.at_least(FIELD_UI_GATE) {
            cx.error(
                "MANIFEST_FIELD_UI_INVALID",
                "field.ui requires manifest_version >= 1.2",
                format!("{fpath}.ui"),
            );
        }
        match ui.as_object() {
            None => {
                cx.error(
                    "MANIFEST_FIELD_UI_INVALID",
                    "field.ui must be an object",
                    format!("{fpath}.ui"),
                );
            }
            Some(ui) => {
                let widget = ui.get("widget");
                if let Some(widget) = widget {
                    if !widget.is_null() && !widget.is_string() {
                        cx.error(
                            "MANIFEST_FIELD_UI_INVALID",
                            "field.ui.widget must be a string",
                            format!("{fpath}.ui.widget"),
                        );
                    }
                    if widget.as_str() == Some("steps") && ftype != "enum" {
                        cx.error(
                            "MANIFEST_FIELD_UI_INVALID",
                            "steps widget requires enum field",
                            format!("{fpath}.ui.widget"),
                        );
                    }
                }
            }
        }
    }

    let default = get(field, "default").filter(|v| !v.is_null());
    if let Some(default) = default {
        if !default_type_valid(ftype, default) {
            cx.error(
                "MANIFEST_FIELD_DEFAULT_INVALID",
                "field.default must match field.type",
                format!("{fpath}.default"),
            );
        }
        if ftype == "enum" {
            let options = get(field, "options")
                .filter(|v| truthy(v))
                .or_else(|| get(field, "values"));
            if let Some(Value::Array(options)) = options {
                let allowed: Vec<&Value> = options
                    .iter()
                    .map(|opt| opt.get("value").unwrap_or(opt))
                    .collect();
                if !allowed.iter().any(|v| *v == default) {
                    cx.error(
                        "MANIFEST_FIELD_DEFAULT_INVALID",
                        "field.default must be one of enum options",
                        format!("{fpath}.default"),
                    );
                }
            }
        }
    }

    let required_truthy = required.map(truthy).unwrap_or(false);
    let readonly_truthy = readonly.map(truthy).unwrap_or(false);
    if required_truthy && readonly_truthy && default.is_none() && !is_truthy(field, "system") {
        cx.error(
            "MANIFEST_FIELD_REQUIRED_READONLY_INVALID",
            "readonly required fields must define default or be system",
            format!("{fpath}.readonly"),
        );
    }

    if ftype == "enum" {
        let options = get(field, "options")
            .filter(|v| truthy(v))
            .or_else(|| get(field, "values"));
        match options {
            Some(Value::Array(options)) if !options.is_empty() => {
                if !enum_options_object_shape(options) {
                    cx.error(
                        "MANIFEST_ENUM_OPTIONS_SHAPE_INVALID",
                        "enum.options must be objects with value and label",
                        format!("{fpath}.options"),
                    );
                }
            }
            _ => {
                cx.error(
                    "MANIFEST_ENUM_VALUES_INVALID",
                    "enum must define options",
                    format!("{fpath}.options"),
                );
            }
        }
    }

    if ftype == "lookup" {
        let target = get_str(field, "entity").filter(|s| !s.is_empty());
        let display = get_str(field, "display_field").filter(|s| !s.is_empty());
        if target.is_none() {
            cx.error(
                "MANIFEST_LOOKUP_TARGET_MISSING",
                "lookup must declare target entity",
                format!("{fpath}.entity"),
            );
        }
        if display.is_none() {
            cx.error(
                "MANIFEST_LOOKUP_DISPLAY_MISSING",
                "lookup must declare display_field",
                format!("{fpath}.display_field"),
            );
        }
        if let Some(target) = target {
            match entity_lookup(entity_by_id, target) {
                None => {
                    cx.warn(
                        "MANIFEST_LOOKUP_TARGET_EXTERNAL",
                        "lookup target entity not found in module (external ok)",
                        format!("{fpath}.entity"),
                    );
                }
                Some(target_entity) => {
                    if let Some(display) = display {
                        if !field_ids(target_entity).contains(display) {
                            cx.error(
                                "MANIFEST_LOOKUP_DISPLAY_UNKNOWN",
                                "lookup display_field not found on target entity",
                                format!("{fpath}.display_field"),
                            );
                        }
                    }
                }
            }
        }
    }

    for key in ["visible_when", "disabled_when", "required_when"] {
        if let Some(cond) = get(field, key).filter(|v| !v.is_null()) {
            if !cx.conditions_allowed() {
                cx.error(
                    "MANIFEST_FIELD_CONDITION_INVALID",
                    &format!("{key} requires manifest_version >= 1.2"),
                    format!("{fpath}.{key}"),
                );
            } else {
                validate_condition(cx, cond, &format!("{fpath}.{key}"), 0);
            }
        }
    }
    if let Some(domain) = get(field, "domain").filter(|v| !v.is_null()) {
        if !cx.conditions_allowed() {
            cx.error(
                "MANIFEST_LOOKUP_DOMAIN_INVALID",
                "lookup domain requires manifest_version >= 1.2",
                format!("{fpath}.domain"),
            );
        } else {
            if ftype != "lookup" {
                cx.error(
                    "MANIFEST_LOOKUP_DOMAIN_INVALID",
                    "domain is only valid on lookup fields",
                    format!("{fpath}.domain"),
                );
            }
            validate_condition(cx, domain, &format!("{fpath}.domain"), 0);
        }
    }
}

fn default_type_valid(field_type: &str, value: &Value) -> bool {
    match field_type {
        "string" | "text" => value.is_string(),
        "number" => value.is_number(),
        "bool" | "boolean" => value.is_boolean(),
        "date" => value.is_string(),
        "enum" => value.is_string() || value.is_number() || value.is_boolean(),
        _ => false,
    }
}

fn enum_options_object_shape(options: &[Value]) -> bool {
    !options.is_empty()
        && options.iter().all(|opt| {
            opt.as_object()
                .map(|o| o.contains_key("value") && o.contains_key("label"))
                .unwrap_or(false)
        })
}

fn check_relations(cx: &mut Vctx, manifest: &Value) {
    let relations = match get(manifest, "relations") {
        Some(relations) if truthy(relations) => match relations.as_array() {
            Some(relations) => relations,
            None => {
                cx.error("MANIFEST_RELATIONS_INVALID", "relations must be a list", "relations");
                return;
            }
        },
        _ => return,
    };
    for (ridx, rel) in relations.iter().enumerate() {
        let rpath = format!("relations[{ridx}]");
        if !rel.is_object() {
            cx.error("MANIFEST_RELATION_INVALID", "relation must be an object", rpath);
            continue;
        }
        let source = get_str(rel, "from");
        let target = get_str(rel, "to");
        if source.is_none() || target.is_none() {
            cx.error("MANIFEST_RELATION_INVALID", "relation from/to required", rpath);
            continue;
        }
        if let Some(label_field) = get(rel, "label_field").filter(|v| truthy(v)) {
            if !label_field.is_string() {
                cx.warn(
                    "MANIFEST_RELATION_LABEL_INVALID",
                    "label_field should be string",
                    format!("{rpath}.label_field"),
                );
            }
        }
    }
}
