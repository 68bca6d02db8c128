use serde::Serialize;
use serde_json::Value;

use trellis_core::Issue;
use trellis_manifest::validate_manifest_raw;
use trellis_store::{StoreBackend, StoreResult};

use crate::registry::ModuleRegistry;

/// Runtime health summary for one enabled module.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleDiagnostics {
    pub module_id: String,
    pub enabled: bool,
    pub manifest_hash: String,
    pub module_version: Option<String>,
    pub manifest_version: Option<String>,
    pub has_app_home: bool,
    pub home_target: Option<String>,
    pub home_type: Option<String>,
    pub home_id: Option<String>,
    pub counts: DiagnosticsCounts,
    pub warnings: Vec<Issue>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DiagnosticsCounts {
    pub pages: usize,
    pub views: usize,
    pub entities: usize,
}

fn parse_target(target: &str) -> Option<(&'static str, &str)> {
    if let Some(id) = target.strip_prefix("page:") {
        return Some(("page", id));
    }
    if let Some(id) = target.strip_prefix("view:") {
        return Some(("view", id));
    }
    None
}

fn list_len(manifest: &Value, key: &str) -> usize {
    manifest
        .get(key)
        .and_then(Value::as_array)
        .map(|items| items.len())
        .unwrap_or(0)
}

/// Summarize every enabled module: home-target resolution, section counts,
/// and validator warnings against the current head snapshot.
pub fn build_diagnostics<B: StoreBackend>(
    registry: &ModuleRegistry<B>,
) -> StoreResult<Vec<ModuleDiagnostics>> {
    let mut modules = Vec::new();
    for record in registry.list()? {
        if !record.enabled {
            continue;
        }
        let manifest = registry
            .store()
            .get_snapshot(&record.module_id, &record.current_hash)?;
        let (manifest, warnings) = match manifest {
            Some(manifest) => {
                let (_, _, warnings) = validate_manifest_raw(&manifest, Some(&record.module_id));
                (manifest, warnings)
            }
            None => (Value::Null, Vec::new()),
        };

        let home = manifest
            .get("app")
            .and_then(|app| app.get("home"))
            .and_then(Value::as_str);
        let parsed = home.and_then(parse_target);

        modules.push(ModuleDiagnostics {
            module_id: record.module_id.clone(),
            enabled: record.enabled,
            manifest_hash: record.current_hash.clone(),
            module_version: manifest
                .get("module")
                .and_then(|m| m.get("version"))
                .and_then(Value::as_str)
                .map(str::to_string),
            manifest_version: manifest
                .get("manifest_version")
                .and_then(Value::as_str)
                .map(str::to_string),
            has_app_home: parsed.is_some(),
            home_target: home.map(str::to_string),
            home_type: parsed.map(|(kind, _)| kind.to_string()),
            home_id: parsed.map(|(_, id)| id.to_string()),
            counts: DiagnosticsCounts {
                pages: list_len(&manifest, "pages"),
                views: list_len(&manifest, "views"),
                entities: list_len(&manifest, "entities"),
            },
            warnings,
        });
    }
    Ok(modules)
}
