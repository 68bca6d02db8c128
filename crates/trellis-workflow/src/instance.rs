use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use trellis_core::{OrgId, now_utc};

const DEFAULT_HISTORY_LIMIT: usize = 50;

/// History bound for workflow instances, overridable via
/// `TRELLIS_WORKFLOW_HISTORY_LIMIT`. Never below 1.
pub fn history_limit_from_env() -> usize {
    std::env::var("TRELLIS_WORKFLOW_HISTORY_LIMIT")
        .ok()
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .max(1)
}

/// One tracked run of a workflow over a subject record. History keeps the
/// newest events up to the store's bound; every event is also handed to the
/// backend's append-only event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub instance_id: String,
    pub module_id: String,
    pub workflow_id: String,
    pub record_ref: Option<Value>,
    pub current_state: String,
    pub created_at: Option<String>,
    pub updated_at: String,
    pub history: Vec<Value>,
}

pub trait InstanceStore: Send + Sync {
    fn create_instance(
        &self,
        org: &OrgId,
        module_id: &str,
        workflow_id: &str,
        initial_state: &str,
        record_ref: Option<&Value>,
        actor: Option<&Value>,
        reason: &str,
    ) -> WorkflowInstance;

    fn get_instance(&self, org: &OrgId, instance_id: &str) -> Option<WorkflowInstance>;

    /// Persist state + history for an instance, trimming history to the
    /// store's bound (newest events win).
    fn update_instance(&self, org: &OrgId, instance: &WorkflowInstance);

    fn list_instances(
        &self,
        org: &OrgId,
        module_id: &str,
        workflow_id: Option<&str>,
    ) -> Vec<WorkflowInstance>;
}

type Key = (OrgId, String);

/// In-memory instance store with a bounded per-instance history.
pub struct MemInstanceStore {
    history_limit: usize,
    inner: RwLock<HashMap<Key, WorkflowInstance>>,
}

impl Default for MemInstanceStore {
    fn default() -> Self {
        MemInstanceStore::new(history_limit_from_env())
    }
}

impl MemInstanceStore {
    pub fn new(history_limit: usize) -> Self {
        MemInstanceStore {
            history_limit: history_limit.max(1),
            inner: RwLock::new(HashMap::new()),
        }
    }

    fn trim_history(&self, history: &[Value]) -> Vec<Value> {
        if history.len() <= self.history_limit {
            return history.to_vec();
        }
        history[history.len() - self.history_limit..].to_vec()
    }
}

impl InstanceStore for MemInstanceStore {
    fn create_instance(
        &self,
        org: &OrgId,
        module_id: &str,
        workflow_id: &str,
        initial_state: &str,
        record_ref: Option<&Value>,
        actor: Option<&Value>,
        reason: &str,
    ) -> WorkflowInstance {
        let now = now_utc();
        let init_event = json!({
            "at": now,
            "actor": actor,
            "from_state": initial_state,
            "to_state": initial_state,
            "transition_id": "init",
            "actions": [],
            "events": [],
            "status": "applied",
            "detail": {"reason": reason},
        });
        let instance = WorkflowInstance {
            instance_id: Uuid::new_v4().to_string(),
            module_id: module_id.to_string(),
            workflow_id: workflow_id.to_string(),
            record_ref: record_ref.cloned(),
            current_state: initial_state.to_string(),
            created_at: Some(now.clone()),
            updated_at: now,
            history: vec![init_event],
        };
        let mut state = self.inner.write().unwrap();
        state.insert((org.clone(), instance.instance_id.clone()), instance.clone());
        instance
    }

    fn get_instance(&self, org: &OrgId, instance_id: &str) -> Option<WorkflowInstance> {
        let state = self.inner.read().unwrap();
        state.get(&(org.clone(), instance_id.to_string())).cloned()
    }

    fn update_instance(&self, org: &OrgId, instance: &WorkflowInstance) {
        let mut stored = instance.clone();
        stored.history = self.trim_history(&instance.history);
        stored.updated_at = now_utc();
        let mut state = self.inner.write().unwrap();
        state.insert((org.clone(), instance.instance_id.clone()), stored);
    }

    fn list_instances(
        &self,
        org: &OrgId,
        module_id: &str,
        workflow_id: Option<&str>,
    ) -> Vec<WorkflowInstance> {
        let state = self.inner.read().unwrap();
        let mut instances: Vec<WorkflowInstance> = state
            .iter()
            .filter(|((instance_org, _), instance)| {
                instance_org == org
                    && instance.module_id == module_id
                    && workflow_id
                        .map(|wf| instance.workflow_id == wf)
                        .unwrap_or(true)
            })
            .map(|(_, instance)| instance.clone())
            .collect();
        instances.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        instances
    }
}
