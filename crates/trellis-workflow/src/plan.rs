use serde::Serialize;
use serde_json::{Value, json};

use trellis_core::Issue;
use trellis_dsl::eval_condition_limited;

/// The selected transition and everything it fires. `chosen_transition_id`
/// is null when no transition is eligible from the current state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowPlan {
    pub workflow_id: String,
    pub current_state: String,
    pub chosen_transition_id: Option<String>,
    pub next_state: Option<String>,
    pub actions: Vec<String>,
    pub events: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanOutcome {
    pub ok: bool,
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
    pub plan: Option<WorkflowPlan>,
}

impl PlanOutcome {
    fn failure(errors: Vec<Issue>) -> Self {
        PlanOutcome {
            ok: false,
            errors,
            warnings: Vec::new(),
            plan: None,
        }
    }
}

fn invalid(message: &str, path: &str) -> Issue {
    Issue::at("WORKFLOW_INVALID", message, path)
}

fn nonempty_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn validate_workflow(workflow: &Value, errors: &mut Vec<Issue>) {
    if nonempty_str(workflow, "id").is_none() {
        errors.push(invalid("workflow.id must be non-empty string", "$.id"));
    }
    if nonempty_str(workflow, "initial_state").is_none() {
        errors.push(invalid("initial_state must be non-empty string", "$.initial_state"));
    }

    let states = match workflow.get("states").and_then(Value::as_array) {
        Some(states) => states,
        None => {
            errors.push(invalid("states must be list", "$.states"));
            return;
        }
    };
    let mut state_ids: Vec<&str> = Vec::new();
    for (idx, state) in states.iter().enumerate() {
        match nonempty_str(state, "id") {
            Some(id) => state_ids.push(id),
            None => {
                errors.push(invalid(
                    "state.id must be non-empty string",
                    &format!("$.states[{idx}].id"),
                ));
            }
        }
    }
    let mut unique = state_ids.clone();
    unique.sort_unstable();
    unique.dedup();
    if unique.len() != state_ids.len() {
        errors.push(invalid("state ids must be unique", "$.states"));
    }

    let transitions = match workflow.get("transitions").and_then(Value::as_array) {
        Some(transitions) => transitions,
        None => {
            errors.push(invalid("transitions must be list", "$.transitions"));
            return;
        }
    };
    let mut transition_ids: Vec<&str> = Vec::new();
    for (idx, tr) in transitions.iter().enumerate() {
        match nonempty_str(tr, "id") {
            Some(id) => transition_ids.push(id),
            None => {
                errors.push(invalid(
                    "transition.id must be non-empty string",
                    &format!("$.transitions[{idx}].id"),
                ));
            }
        }

        let from_state = tr.get("from").and_then(Value::as_str);
        let to_state = tr.get("to").and_then(Value::as_str);
        match (from_state, to_state) {
            (Some(from), Some(to)) => {
                if !state_ids.contains(&from) {
                    errors.push(invalid(
                        "transition.from unknown state",
                        &format!("$.transitions[{idx}].from"),
                    ));
                }
                if !state_ids.contains(&to) {
                    errors.push(invalid(
                        "transition.to unknown state",
                        &format!("$.transitions[{idx}].to"),
                    ));
                }
            }
            _ => {
                errors.push(invalid(
                    "transition.from/to must be strings",
                    &format!("$.transitions[{idx}]"),
                ));
            }
        }

        if let Some(actions) = tr.get("actions").filter(|v| !v.is_null()) {
            let valid = actions
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .all(|a| a.as_str().map(|s| !s.is_empty()).unwrap_or(false))
                })
                .unwrap_or(false);
            if !valid {
                errors.push(invalid(
                    "actions must be list of non-empty strings",
                    &format!("$.transitions[{idx}].actions"),
                ));
            }
        }
        if let Some(emits) = tr.get("emits").filter(|v| !v.is_null()) {
            match emits.as_array() {
                None => {
                    errors.push(invalid("emits must be list", &format!("$.transitions[{idx}].emits")));
                }
                Some(emits) => {
                    for (eidx, evt) in emits.iter().enumerate() {
                        if nonempty_str(evt, "name").is_none() {
                            errors.push(invalid(
                                "event.name must be non-empty string",
                                &format!("$.transitions[{idx}].emits[{eidx}].name"),
                            ));
                        }
                        if let Some(payload) = evt.get("payload").filter(|v| !v.is_null()) {
                            if !payload.is_object() {
                                errors.push(invalid(
                                    "event.payload must be object",
                                    &format!("$.transitions[{idx}].emits[{eidx}].payload"),
                                ));
                            }
                        }
                    }
                }
            }
        }
    }

    let mut unique = transition_ids.clone();
    unique.sort_unstable();
    unique.dedup();
    if unique.len() != transition_ids.len() {
        errors.push(invalid("transition ids must be unique", "$.transitions"));
    }
}

/// Select at most one transition out of `current_state` and produce its
/// plan. Guards are evaluated against `ctx.vars`; when several transitions
/// are eligible the lexicographically smallest id wins and a warning lists
/// all of them. Output is deterministic for identical input.
pub fn plan_workflow_step(workflow: &Value, current_state: &str, ctx: &Value) -> PlanOutcome {
    plan_workflow_step_limited(workflow, current_state, ctx, trellis_dsl::DEFAULT_DEPTH_LIMIT)
}

pub fn plan_workflow_step_limited(
    workflow: &Value,
    current_state: &str,
    ctx: &Value,
    depth_limit: usize,
) -> PlanOutcome {
    let mut errors: Vec<Issue> = Vec::new();
    let mut warnings: Vec<Issue> = Vec::new();

    if !workflow.is_object() {
        return PlanOutcome::failure(vec![invalid("workflow must be object", "$")]);
    }
    validate_workflow(workflow, &mut errors);
    if !errors.is_empty() {
        return PlanOutcome::failure(errors);
    }

    if current_state.is_empty() {
        return PlanOutcome::failure(vec![invalid(
            "current_state must be non-empty string",
            "$.current_state",
        )]);
    }
    let vars = ctx.get("vars").filter(|v| v.is_object());
    let vars = match vars {
        Some(vars) => vars,
        None => {
            return PlanOutcome::failure(vec![invalid("ctx.vars must be object", "$.ctx.vars")]);
        }
    };

    let transitions = workflow
        .get("transitions")
        .and_then(Value::as_array)
        .map(|transitions| transitions.as_slice())
        .unwrap_or_default();
    let candidates = transitions
        .iter()
        .filter(|tr| tr.get("from").and_then(Value::as_str) == Some(current_state));

    let mut allowed: Vec<&Value> = Vec::new();
    for tr in candidates {
        match tr.get("guard").filter(|g| !g.is_null()) {
            None => allowed.push(tr),
            Some(guard) => match eval_condition_limited(guard, vars, depth_limit) {
                Ok(true) => allowed.push(tr),
                Ok(false) => {}
                Err(err) => {
                    errors.push(
                        Issue::at("WORKFLOW_GUARD_ERROR", err.to_string(), "$.transitions.guard")
                            .with_detail(json!({
                                "transition_id": tr.get("id"),
                                "error_code": err.code(),
                            })),
                    );
                    return PlanOutcome::failure(errors);
                }
            },
        }
    }

    let workflow_id = workflow
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if allowed.is_empty() {
        return PlanOutcome {
            ok: true,
            errors,
            warnings,
            plan: Some(WorkflowPlan {
                workflow_id,
                current_state: current_state.to_string(),
                chosen_transition_id: None,
                next_state: None,
                actions: Vec::new(),
                events: Vec::new(),
            }),
        };
    }

    let chosen = if allowed.len() > 1 {
        let mut ids: Vec<&str> = allowed
            .iter()
            .filter_map(|tr| tr.get("id").and_then(Value::as_str))
            .collect();
        ids.sort_unstable();
        warnings.push(
            Issue::at(
                "WORKFLOW_MULTIPLE_TRANSITIONS",
                "multiple transitions allowed; choosing lexicographically smallest id",
                "$.transitions",
            )
            .with_detail(json!({"allowed": ids})),
        );
        allowed
            .iter()
            .min_by_key(|tr| tr.get("id").and_then(Value::as_str).unwrap_or_default())
            .copied()
            .unwrap_or(allowed[0])
    } else {
        allowed[0]
    };

    let actions: Vec<String> = chosen
        .get("actions")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let events: Vec<Value> = chosen
        .get("emits")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    PlanOutcome {
        ok: true,
        errors,
        warnings,
        plan: Some(WorkflowPlan {
            workflow_id,
            current_state: current_state.to_string(),
            chosen_transition_id: chosen.get("id").and_then(Value::as_str).map(str::to_string),
            next_state: chosen.get("to").and_then(Value::as_str).map(str::to_string),
            actions,
            events,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn workflow() -> Value {
        json!({
            "id": "workflow.job",
            "initial_state": "new",
            "states": [{"id": "new", "label": null}, {"id": "done", "label": null}],
            "transitions": [
                {
                    "id": "t1",
                    "from": "new",
                    "to": "done",
                    "label": null,
                    "guard": {"op": "eq", "left": {"var": "job.status"}, "right": {"literal": "ok"}},
                    "actions": ["action.close"],
                    "emits": [{"name": "job.closed", "payload": {"ok": true}}],
                }
            ],
        })
    }

    fn ctx() -> Value {
        json!({
            "actor": {"id": "u1", "roles": ["admin"]},
            "module_id": "job_management",
            "manifest_hash": "sha256:abcd",
            "vars": {"job": {"status": "ok"}},
        })
    }

    #[test]
    fn invalid_workflow_structure_fails() {
        let bad = json!({
            "id": "w",
            "initial_state": "x",
            "states": [],
            "transitions": [{"id": "t", "from": "x", "to": "y"}],
        });
        let result = plan_workflow_step(&bad, "x", &ctx());
        assert!(!result.ok);
    }

    #[test]
    fn passing_guard_selects_transition() {
        let result = plan_workflow_step(&workflow(), "new", &ctx());
        assert!(result.ok, "{:?}", result.errors);
        let plan = result.plan.unwrap();
        assert_eq!(plan.chosen_transition_id.as_deref(), Some("t1"));
        assert_eq!(plan.next_state.as_deref(), Some("done"));
        assert_eq!(plan.actions, vec!["action.close"]);
        assert_eq!(plan.events[0]["name"], json!("job.closed"));
    }

    #[test]
    fn failing_guard_yields_empty_plan() {
        let mut ctx = ctx();
        ctx["vars"]["job"]["status"] = json!("no");
        let result = plan_workflow_step(&workflow(), "new", &ctx);
        assert!(result.ok);
        let plan = result.plan.unwrap();
        assert_eq!(plan.chosen_transition_id, None);
        assert!(plan.actions.is_empty());
        assert!(plan.events.is_empty());
    }

    #[test]
    fn multiple_transitions_choose_smallest_id() {
        let wf = json!({
            "id": "w",
            "initial_state": "s",
            "states": [{"id": "s", "label": null}, {"id": "t", "label": null}],
            "transitions": [
                {"id": "b", "from": "s", "to": "t", "guard": null, "actions": []},
                {"id": "a", "from": "s", "to": "t", "guard": null, "actions": []},
            ],
        });
        let result = plan_workflow_step(&wf, "s", &ctx());
        assert!(result.ok);
        assert_eq!(result.plan.unwrap().chosen_transition_id.as_deref(), Some("a"));
        assert_eq!(result.warnings[0].code, "WORKFLOW_MULTIPLE_TRANSITIONS");
        assert_eq!(
            result.warnings[0].detail.as_ref().unwrap()["allowed"],
            json!(["a", "b"])
        );
    }

    #[test]
    fn guard_errors_abort_planning() {
        let wf = json!({
            "id": "w",
            "initial_state": "s",
            "states": [{"id": "s", "label": null}, {"id": "t", "label": null}],
            "transitions": [
                {"id": "t1", "from": "s", "to": "t", "guard": {"op": "eq", "left": {"var": "missing"}, "right": {"literal": 1}}}
            ],
        });
        let result = plan_workflow_step(&wf, "s", &ctx());
        assert!(!result.ok);
        assert_eq!(result.errors[0].code, "WORKFLOW_GUARD_ERROR");
        assert_eq!(
            result.errors[0].detail.as_ref().unwrap()["error_code"],
            json!("CONDITION_VAR_UNRESOLVED")
        );
    }

    #[test]
    fn planning_is_deterministic() {
        let first = plan_workflow_step(&workflow(), "new", &ctx());
        let second = plan_workflow_step(&workflow(), "new", &ctx());
        assert_eq!(first.plan, second.plan);
    }

    #[test]
    fn duplicate_transition_ids_are_invalid() {
        let wf = json!({
            "id": "w",
            "initial_state": "s",
            "states": [{"id": "s"}, {"id": "t"}],
            "transitions": [
                {"id": "dup", "from": "s", "to": "t"},
                {"id": "dup", "from": "t", "to": "s"},
            ],
        });
        let result = plan_workflow_step(&wf, "s", &ctx());
        assert!(!result.ok);
    }
}
