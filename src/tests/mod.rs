//! End-to-end scenario coverage for the orchestrator core, exercised
//! against the real `Coordinator`/`WorkflowEngine` with a fake `Dispatcher`
//! standing in for the Agent Manager's transport.

#[cfg(test)]
mod test_helpers;

#[cfg(test)]
mod scenarios;

#[cfg(test)]
mod workflow_scenarios;
