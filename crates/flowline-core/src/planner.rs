//! Definition validation, cycle detection, and stable topological ordering.
//!
//! Uses `petgraph` to model step dependencies as a directed graph. The
//! execution order is computed once at run creation with Kahn's algorithm
//! and a stable tie-break: among the currently ready steps, the one
//! earliest in the input list is emitted first. Workers never consult
//! `depends_on` again; they iterate the persisted order.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use flowline_types::workflow::{StepDefinition, WorkflowDefinition};
use petgraph::Direction;
use petgraph::graph::DiGraph;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from definition validation and planning. Surfaced to the
/// caller, never retried; nothing is persisted when one is returned.
#[derive(Debug, Error)]
pub enum PlanError {
    /// Structural or numeric validation failure.
    #[error("invalid workflow: {0}")]
    Validation(String),

    /// A step references a dependency that is not defined.
    #[error("invalid workflow: {0}")]
    UnknownDependency(String),

    /// The dependency graph contains a cycle: Kahn's algorithm terminated
    /// with unprocessed steps remaining.
    #[error("cycle detected: {0}")]
    CycleDetected(String),
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate structural constraints on a workflow definition.
///
/// Checks:
/// - name is non-empty
/// - at least one step exists
/// - step IDs are unique within the workflow
/// - every `depends_on` reference points to a defined step ID
///   (forward references are allowed)
/// - `fail_probability` is within [0.0, 1.0]
/// - `duration_seconds` is finite and non-negative
pub fn validate_definition(def: &WorkflowDefinition) -> Result<(), PlanError> {
    if def.name.trim().is_empty() {
        return Err(PlanError::Validation(
            "workflow name must not be empty".to_string(),
        ));
    }

    if def.steps.is_empty() {
        return Err(PlanError::Validation(
            "workflow must have at least one step".to_string(),
        ));
    }

    let mut ids: HashSet<&str> = HashSet::with_capacity(def.steps.len());
    for step in &def.steps {
        if !ids.insert(step.id.as_str()) {
            return Err(PlanError::Validation(format!(
                "duplicate step id: '{}'",
                step.id
            )));
        }
    }

    for step in &def.steps {
        for dep in &step.depends_on {
            if !ids.contains(dep.as_str()) {
                return Err(PlanError::UnknownDependency(format!(
                    "step '{}' depends on '{}' which is not defined in this workflow",
                    step.id, dep
                )));
            }
        }

        let config = &step.config;
        if !(0.0..=1.0).contains(&config.fail_probability) {
            return Err(PlanError::Validation(format!(
                "step '{}': fail_probability must be within [0.0, 1.0], got {}",
                step.id, config.fail_probability
            )));
        }
        if !config.duration_seconds.is_finite() || config.duration_seconds < 0.0 {
            return Err(PlanError::Validation(format!(
                "step '{}': duration_seconds must be a non-negative number, got {}",
                step.id, config.duration_seconds
            )));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Planning (stable Kahn ordering)
// ---------------------------------------------------------------------------

/// Order steps so every dependency precedes its dependents.
///
/// Guarantees:
/// - Every step appears after all of its dependencies.
/// - Deterministic: when multiple steps are ready, the one with the
///   smallest position in the input list is emitted first, so an
///   already-sorted input comes back unchanged.
/// - Returns `CycleDetected` when some step can never become ready.
pub fn plan(steps: &[StepDefinition]) -> Result<Vec<StepDefinition>, PlanError> {
    if steps.is_empty() {
        return Ok(vec![]);
    }

    // Node insertion order matches input order, so NodeIndex::index()
    // doubles as the input position used by the tie-break.
    let id_to_pos: HashMap<&str, usize> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();
    if id_to_pos.len() != steps.len() {
        return Err(PlanError::Validation(
            "duplicate step id in workflow".to_string(),
        ));
    }

    let mut graph = DiGraph::<&str, ()>::new();
    let node_indices: Vec<_> = steps.iter().map(|s| graph.add_node(s.id.as_str())).collect();

    for step in steps {
        let to_pos = id_to_pos[step.id.as_str()];
        for dep in &step.depends_on {
            let from_pos = id_to_pos.get(dep.as_str()).ok_or_else(|| {
                PlanError::UnknownDependency(format!(
                    "step '{}' depends on '{}' which is not defined in this workflow",
                    step.id, dep
                ))
            })?;
            graph.add_edge(node_indices[*from_pos], node_indices[to_pos], ());
        }
    }

    let mut in_degree: Vec<usize> = node_indices
        .iter()
        .map(|&n| graph.neighbors_directed(n, Direction::Incoming).count())
        .collect();

    // Min-heap over input positions: the ready step earliest in the
    // input list wins ties.
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|&(_, &d)| d == 0)
        .map(|(pos, _)| Reverse(pos))
        .collect();

    let mut order = Vec::with_capacity(steps.len());
    while let Some(Reverse(pos)) = ready.pop() {
        order.push(steps[pos].clone());
        for dependent in graph.neighbors_directed(node_indices[pos], Direction::Outgoing) {
            let dep_pos = dependent.index();
            in_degree[dep_pos] -= 1;
            if in_degree[dep_pos] == 0 {
                ready.push(Reverse(dep_pos));
            }
        }
    }

    if order.len() != steps.len() {
        let stuck: Vec<&str> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d > 0)
            .map(|(pos, _)| steps[pos].id.as_str())
            .collect();
        return Err(PlanError::CycleDetected(format!(
            "circular dependency among workflow steps: {}",
            stuck.join(", ")
        )));
    }

    Ok(order)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use flowline_types::workflow::StepConfig;

    fn step(id: &str, depends_on: Vec<&str>) -> StepDefinition {
        StepDefinition {
            id: id.to_string(),
            step_type: "task".to_string(),
            depends_on: depends_on.into_iter().map(String::from).collect(),
            config: StepConfig::default(),
        }
    }

    fn definition(steps: Vec<StepDefinition>) -> WorkflowDefinition {
        WorkflowDefinition {
            name: "test-workflow".to_string(),
            steps,
        }
    }

    fn order_of(steps: &[StepDefinition]) -> Vec<&str> {
        steps.iter().map(|s| s.id.as_str()).collect()
    }

    // -----------------------------------------------------------------------
    // Ordering
    // -----------------------------------------------------------------------

    #[test]
    fn test_already_sorted_input_unchanged() {
        let steps = vec![step("a", vec![]), step("b", vec!["a"]), step("c", vec!["b"])];
        let planned = plan(&steps).unwrap();
        assert_eq!(order_of(&planned), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_reversed_chain_reordered() {
        let steps = vec![step("c", vec!["b"]), step("b", vec!["a"]), step("a", vec![])];
        let planned = plan(&steps).unwrap();
        assert_eq!(order_of(&planned), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_stable_tie_break_uses_input_position() {
        // Both b and c become ready once a is emitted; among ready steps
        // the smallest input position wins, so c (position 0) precedes b.
        let steps = vec![
            step("c", vec!["a"]),
            step("b", vec!["a"]),
            step("a", vec![]),
        ];
        let planned = plan(&steps).unwrap();
        assert_eq!(order_of(&planned), vec!["a", "c", "b"]);
    }

    #[test]
    fn test_independent_steps_keep_input_order() {
        let steps = vec![step("x", vec![]), step("y", vec![]), step("z", vec![])];
        let planned = plan(&steps).unwrap();
        assert_eq!(order_of(&planned), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_diamond_order() {
        // a -> {b, c} -> d, input already sorted
        let steps = vec![
            step("a", vec![]),
            step("b", vec!["a"]),
            step("c", vec!["a"]),
            step("d", vec!["b", "c"]),
        ];
        let planned = plan(&steps).unwrap();
        assert_eq!(order_of(&planned), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_forward_reference_allowed() {
        let steps = vec![step("b", vec!["a"]), step("a", vec![])];
        let planned = plan(&steps).unwrap();
        assert_eq!(order_of(&planned), vec!["a", "b"]);
    }

    #[test]
    fn test_empty_steps() {
        assert!(plan(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_dependencies_precede_dependents() {
        let steps = vec![
            step("f", vec!["d", "e"]),
            step("d", vec!["b"]),
            step("e", vec!["c"]),
            step("b", vec!["a"]),
            step("c", vec!["a"]),
            step("a", vec![]),
        ];
        let planned = plan(&steps).unwrap();
        let pos: HashMap<&str, usize> = planned
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.as_str(), i))
            .collect();
        for s in &planned {
            for dep in &s.depends_on {
                assert!(
                    pos[dep.as_str()] < pos[s.id.as_str()],
                    "{dep} should precede {}",
                    s.id
                );
            }
        }
    }

    // -----------------------------------------------------------------------
    // Cycles and unknown references
    // -----------------------------------------------------------------------

    #[test]
    fn test_two_node_cycle_detected() {
        let steps = vec![step("a", vec!["b"]), step("b", vec!["a"])];
        let err = plan(&steps).unwrap_err();
        assert!(matches!(err, PlanError::CycleDetected(_)), "got: {err}");
        assert!(err.to_string().contains("a"));
    }

    #[test]
    fn test_three_node_cycle_detected() {
        let steps = vec![
            step("a", vec!["c"]),
            step("b", vec!["a"]),
            step("c", vec!["b"]),
        ];
        let err = plan(&steps).unwrap_err();
        assert!(matches!(err, PlanError::CycleDetected(_)));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let steps = vec![step("a", vec!["a"])];
        let err = plan(&steps).unwrap_err();
        assert!(matches!(err, PlanError::CycleDetected(_)));
    }

    #[test]
    fn test_plan_unknown_dependency() {
        let steps = vec![step("a", vec!["missing"])];
        let err = plan(&steps).unwrap_err();
        assert!(matches!(err, PlanError::UnknownDependency(_)));
        assert!(err.to_string().contains("missing"));
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    #[test]
    fn test_validate_ok() {
        let def = definition(vec![step("a", vec![]), step("b", vec!["a"])]);
        assert!(validate_definition(&def).is_ok());
    }

    #[test]
    fn test_validate_empty_name() {
        let mut def = definition(vec![step("a", vec![])]);
        def.name = "  ".to_string();
        let err = validate_definition(&def).unwrap_err();
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn test_validate_no_steps() {
        let def = definition(vec![]);
        let err = validate_definition(&def).unwrap_err();
        assert!(err.to_string().contains("at least one step"));
    }

    #[test]
    fn test_validate_duplicate_step_id() {
        let def = definition(vec![step("a", vec![]), step("a", vec![])]);
        let err = validate_definition(&def).unwrap_err();
        assert!(matches!(err, PlanError::Validation(_)));
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_validate_unknown_dependency() {
        let def = definition(vec![step("a", vec!["ghost"])]);
        let err = validate_definition(&def).unwrap_err();
        assert!(matches!(err, PlanError::UnknownDependency(_)));
    }

    #[test]
    fn test_validate_fail_probability_out_of_range() {
        let mut def = definition(vec![step("a", vec![])]);
        def.steps[0].config.fail_probability = 1.5;
        let err = validate_definition(&def).unwrap_err();
        assert!(err.to_string().contains("fail_probability"));

        def.steps[0].config.fail_probability = -0.1;
        assert!(validate_definition(&def).is_err());

        def.steps[0].config.fail_probability = f64::NAN;
        assert!(validate_definition(&def).is_err());
    }

    #[test]
    fn test_validate_negative_duration() {
        let mut def = definition(vec![step("a", vec![])]);
        def.steps[0].config.duration_seconds = -1.0;
        let err = validate_definition(&def).unwrap_err();
        assert!(err.to_string().contains("duration_seconds"));
    }

    #[test]
    fn test_validate_boundary_values_accepted() {
        let mut def = definition(vec![step("a", vec![])]);
        def.steps[0].config.fail_probability = 1.0;
        def.steps[0].config.duration_seconds = 0.0;
        assert!(validate_definition(&def).is_ok());

        def.steps[0].config.fail_probability = 0.0;
        assert!(validate_definition(&def).is_ok());
    }
}
