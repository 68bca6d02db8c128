//! Workflow planning and instance tracking. The planner evaluates guards
//! deterministically and emits a plan of actions and events; it never
//! executes anything itself.

mod instance;
mod plan;

pub use instance::{InstanceStore, MemInstanceStore, WorkflowInstance, history_limit_from_env};
pub use plan::{PlanOutcome, WorkflowPlan, plan_workflow_step, plan_workflow_step_limited};
