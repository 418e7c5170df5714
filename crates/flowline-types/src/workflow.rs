//! Workflow domain types for Flowline.
//!
//! Defines the definition document format (persisted verbatim on
//! creation), the execution tracking records (`Run`, `StepState`,
//! `StepResult`), and their status enums.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Workflow definition (the input document)
// ---------------------------------------------------------------------------

/// A workflow definition as submitted by the caller.
///
/// Stored verbatim (as JSON) in the `workflows` table. The planner
/// validates it once on creation and fixes the execution order at run
/// creation; the definition itself is immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Human-readable workflow name.
    pub name: String,
    /// Step descriptors forming the workflow DAG.
    pub steps: Vec<StepDefinition>,
}

/// A single step descriptor in a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    /// User-chosen step ID (e.g. "validate"). Unique within a workflow.
    pub id: String,
    /// Free-form step kind tag; not interpreted by the engine.
    #[serde(rename = "type")]
    pub step_type: String,
    /// Step IDs that must complete before this step runs (DAG edges).
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Simulation and dispatch parameters.
    pub config: StepConfig,
}

/// Simulation and dispatch parameters for one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Registered action to invoke atomically with step completion.
    /// Unknown names are no-ops at dispatch time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// How long the simulated task sleeps before resolving.
    #[serde(default = "default_duration_seconds")]
    pub duration_seconds: f64,
    /// Probability in [0.0, 1.0] that the simulated task fails.
    #[serde(default)]
    pub fail_probability: f64,
    /// Retry budget beyond the initial attempt.
    #[serde(default)]
    pub max_retries: u32,
}

fn default_duration_seconds() -> f64 {
    1.0
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            action: None,
            duration_seconds: default_duration_seconds(),
            fail_probability: 0.0,
            max_retries: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Persisted records
// ---------------------------------------------------------------------------

/// A persisted workflow. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// UUIDv7 assigned on creation.
    pub id: Uuid,
    pub name: String,
    /// The original definition document, verbatim.
    pub definition: WorkflowDefinition,
    pub created_at: DateTime<Utc>,
}

/// One execution instance of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub status: RunStatus,
    /// Order this run dispatches actions against, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Persisted execution state for one step of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepState {
    pub id: Uuid,
    pub run_id: Uuid,
    /// User-chosen step ID from the definition (not a UUID).
    pub step_id: String,
    /// Position in the planned execution order, contiguous from 0.
    pub step_index: u32,
    pub status: StepStatus,
    /// Token for the current attempt; cleared when a retry is scheduled
    /// so the next attempt issues a fresh one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub retry_count: u32,
    /// Copied from the definition at run creation.
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Durable receipt that a step attempt committed. Append-only: rows are
/// inserted only inside the successful completion transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub idempotency_key: String,
    /// Owning step row, kept for debugging.
    pub step_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Overall status of a run. Transitions monotonically away from Pending;
/// Completed and Failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RunStatus::Pending),
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

/// Status of an individual step within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(StepStatus::Pending),
            "running" => Some(StepStatus::Running),
            "completed" => Some(StepStatus::Completed),
            "failed" => Some(StepStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_config_defaults_applied() {
        let config: StepConfig = serde_json::from_str("{}").unwrap();
        assert!(config.action.is_none());
        assert_eq!(config.duration_seconds, 1.0);
        assert_eq!(config.fail_probability, 0.0);
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn test_step_definition_type_field_renamed() {
        let json_str = r#"{
            "id": "validate",
            "type": "task",
            "config": {"action": "validate_order"}
        }"#;
        let step: StepDefinition = serde_json::from_str(json_str).unwrap();
        assert_eq!(step.step_type, "task");
        assert!(step.depends_on.is_empty());
        assert_eq!(step.config.action.as_deref(), Some("validate_order"));

        let back = serde_json::to_value(&step).unwrap();
        assert_eq!(back["type"], "task");
    }

    #[test]
    fn test_workflow_definition_roundtrip() {
        let def = WorkflowDefinition {
            name: "order-fulfillment".to_string(),
            steps: vec![
                StepDefinition {
                    id: "validate".to_string(),
                    step_type: "task".to_string(),
                    depends_on: vec![],
                    config: StepConfig {
                        action: Some("validate_order".to_string()),
                        duration_seconds: 0.5,
                        fail_probability: 0.0,
                        max_retries: 2,
                    },
                },
                StepDefinition {
                    id: "charge".to_string(),
                    step_type: "task".to_string(),
                    depends_on: vec!["validate".to_string()],
                    config: StepConfig::default(),
                },
            ],
        };

        let json_str = serde_json::to_string(&def).unwrap();
        let parsed: WorkflowDefinition = serde_json::from_str(&json_str).unwrap();
        assert_eq!(parsed.name, "order-fulfillment");
        assert_eq!(parsed.steps.len(), 2);
        assert_eq!(parsed.steps[1].depends_on, vec!["validate"]);
        assert_eq!(parsed.steps[1].config.max_retries, 0);
    }

    #[test]
    fn test_run_status_serde_snake_case() {
        for status in [
            RunStatus::Pending,
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Failed,
        ] {
            let json_val = serde_json::to_value(status).unwrap();
            assert_eq!(json_val, json!(status.as_str()));
            let parsed: RunStatus = serde_json::from_value(json_val).unwrap();
            assert_eq!(parsed, status);
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        assert!(RunStatus::parse("bogus").is_none());
    }

    #[test]
    fn test_step_status_serde_snake_case() {
        for status in [
            StepStatus::Pending,
            StepStatus::Running,
            StepStatus::Completed,
            StepStatus::Failed,
        ] {
            let json_val = serde_json::to_value(status).unwrap();
            assert_eq!(json_val, json!(status.as_str()));
            assert_eq!(StepStatus::parse(status.as_str()), Some(status));
        }
        assert!(StepStatus::parse("skipped").is_none());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());

        assert!(!StepStatus::Pending.is_terminal());
        assert!(!StepStatus::Running.is_terminal());
        assert!(StepStatus::Completed.is_terminal());
        assert!(StepStatus::Failed.is_terminal());
    }

    #[test]
    fn test_run_json_roundtrip() {
        let run = Run {
            id: Uuid::now_v7(),
            workflow_id: Uuid::now_v7(),
            status: RunStatus::Running,
            order_id: Some(Uuid::now_v7()),
            started_at: Some(Utc::now()),
            completed_at: None,
            created_at: Utc::now(),
        };
        let json_str = serde_json::to_string(&run).unwrap();
        assert!(!json_str.contains("completed_at"));
        let parsed: Run = serde_json::from_str(&json_str).unwrap();
        assert_eq!(parsed.id, run.id);
        assert_eq!(parsed.status, RunStatus::Running);
        assert_eq!(parsed.order_id, run.order_id);
    }

    #[test]
    fn test_step_state_json_roundtrip() {
        let step = StepState {
            id: Uuid::now_v7(),
            run_id: Uuid::now_v7(),
            step_id: "charge".to_string(),
            step_index: 1,
            status: StepStatus::Failed,
            idempotency_key: None,
            retry_count: 2,
            max_retries: 2,
            started_at: Some(Utc::now()),
            completed_at: Some(Utc::now()),
            error_message: Some("task 'charge' failed".to_string()),
            created_at: Utc::now(),
        };
        let json_str = serde_json::to_string(&step).unwrap();
        let parsed: StepState = serde_json::from_str(&json_str).unwrap();
        assert_eq!(parsed.step_id, "charge");
        assert_eq!(parsed.retry_count, 2);
        assert_eq!(parsed.status, StepStatus::Failed);
        assert!(parsed.error_message.is_some());
    }
}
