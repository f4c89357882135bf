use std::collections::HashSet;

use crate::models::WorkflowStep;

/// A step is ready once every dependency names a step whose task has
/// completed successfully.
pub fn ready_steps<'a>(
    steps: &'a [WorkflowStep],
    completed: &HashSet<String>,
) -> Vec<&'a WorkflowStep> {
    steps
        .iter()
        .filter(|s| s.task_id.is_none())
        .filter(|s| s.depends_on.iter().all(|dep| completed.contains(dep)))
        .collect()
}

/// Every step name reachable, transitively, from `failed` via `depends_on`
/// edges pointing at it. Used to cascade-cancel a `continue_on_error`
/// workflow's downstream steps without ever submitting their tasks.
pub fn downstream_of(steps: &[WorkflowStep], failed: &str) -> HashSet<String> {
    let mut affected: HashSet<String> = HashSet::new();
    let mut frontier = vec![failed.to_string()];
    while let Some(name) = frontier.pop() {
        for step in steps {
            if step.depends_on.contains(&name) && affected.insert(step.name.clone()) {
                frontier.push(step.name.clone());
            }
        }
    }
    affected
}
