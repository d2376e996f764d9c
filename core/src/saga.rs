//! Saga bookkeeping for multi-step remote mutations
//!
//! The provider has no transaction spanning several file writes. A saga
//! declares its steps and a failure policy for each one up front; the
//! coordinator then feeds every step's result through [`Saga::record`] and
//! reacts to the returned [`StepOutcome`]. Nothing is compensated
//! automatically: an aborted saga reports what already happened.

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{ErrorKind, Result, SyncError};

/// What happens to the remaining steps when a step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop and report; later steps are skipped
    Abort,
    /// Record the failure and run the next step
    Continue,
}

/// One declared step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    pub name: String,
    pub policy: FailurePolicy,
}

impl Step {
    pub fn abort(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            policy: FailurePolicy::Abort,
        }
    }

    pub fn continue_on_failure(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            policy: FailurePolicy::Continue,
        }
    }
}

/// Recorded result of a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StepState {
    Succeeded,
    Failed { kind: ErrorKind },
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub step: String,
    #[serde(flatten)]
    pub state: StepState,
}

/// What the coordinator should do with a step result
#[derive(Debug)]
pub enum StepOutcome<T> {
    Done(T),
    /// Failed under `Continue`; carry on with the next step
    Continued(SyncError),
    /// Failed under `Abort`; later steps are skipped
    Aborted(SyncError),
}

/// Declared plan plus the record of what ran
#[derive(Debug, Clone)]
pub struct Saga {
    name: &'static str,
    plan: Vec<Step>,
    records: Vec<StepRecord>,
}

impl Saga {
    pub fn new(name: &'static str, plan: Vec<Step>) -> Self {
        debug!(saga = name, steps = plan.len(), "Saga planned");
        Self {
            name,
            plan,
            records: Vec::new(),
        }
    }

    pub fn plan(&self) -> &[Step] {
        &self.plan
    }

    /// Index of the next step to record
    pub fn cursor(&self) -> usize {
        self.records.len()
    }

    /// Record the result of the next planned step
    pub fn record<T>(&mut self, result: Result<T>) -> StepOutcome<T> {
        let index = self.records.len();
        let Some(step) = self.plan.get(index).cloned() else {
            return StepOutcome::Aborted(SyncError::Internal(format!(
                "saga {} has no step {}",
                self.name, index
            )));
        };

        match result {
            Ok(value) => {
                debug!(saga = self.name, step = %step.name, "Step succeeded");
                self.records.push(StepRecord {
                    step: step.name,
                    state: StepState::Succeeded,
                });
                StepOutcome::Done(value)
            }
            Err(err) => {
                warn!(saga = self.name, step = %step.name, error = %err, "Step failed");
                self.records.push(StepRecord {
                    step: step.name,
                    state: StepState::Failed { kind: err.kind() },
                });
                match step.policy {
                    FailurePolicy::Continue => StepOutcome::Continued(err),
                    FailurePolicy::Abort => {
                        self.skip_remaining();
                        StepOutcome::Aborted(err)
                    }
                }
            }
        }
    }

    fn skip_remaining(&mut self) {
        let start = self.records.len();
        let skipped: Vec<StepRecord> = self.plan[start..]
            .iter()
            .map(|step| StepRecord {
                step: step.name.clone(),
                state: StepState::Skipped,
            })
            .collect();
        self.records.extend(skipped);
    }

    /// Steps that ran or were skipped, in plan order
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn failed_steps(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r.state, StepState::Failed { .. }))
            .count()
    }
}
