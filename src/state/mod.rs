//! Per-run task state
//!
//! Created once per run, mutated only by the orchestrator applying a node's
//! declared delta, discarded when the run returns.

use crate::error::FailureKind;
use crate::models::{Capability, DraftAnalysis, NodeId, Observation, RunReport, RunStatus};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

/// Partial update declared by one node execution.
#[derive(Debug, Clone)]
pub struct StateDelta {
    pub observation: Observation,
    pub resolved_symbol: Option<String>,
    pub draft_analysis: Option<DraftAnalysis>,
    pub artifact: Option<String>,
    pub completion_observed: bool,
}

impl StateDelta {
    pub fn observe(observation: Observation) -> Self {
        Self {
            observation,
            resolved_symbol: None,
            draft_analysis: None,
            artifact: None,
            completion_observed: false,
        }
    }

    pub fn with_symbol(mut self, symbol: String) -> Self {
        self.resolved_symbol = Some(symbol);
        self
    }

    pub fn with_draft(mut self, draft: DraftAnalysis) -> Self {
        self.draft_analysis = Some(draft);
        self
    }

    pub fn with_artifact(mut self, artifact: String) -> Self {
        self.artifact = Some(artifact);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskState {
    run_id: Uuid,
    subject: String,
    resolved_symbol: Option<String>,
    observations: Vec<Observation>,
    draft_analysis: Option<DraftAnalysis>,
    artifact: Option<String>,
    step_count: u32,
    status: RunStatus,
    failure: Option<FailureKind>,
    error_detail: Option<String>,
    completion_observed: bool,
}

impl TaskState {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            subject: subject.into(),
            resolved_symbol: None,
            observations: Vec::new(),
            draft_analysis: None,
            artifact: None,
            step_count: 0,
            status: RunStatus::Running,
            failure: None,
            error_detail: None,
            completion_observed: false,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn resolved_symbol(&self) -> Option<&str> {
        self.resolved_symbol.as_deref()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn draft_analysis(&self) -> Option<&DraftAnalysis> {
        self.draft_analysis.as_ref()
    }

    pub fn artifact(&self) -> Option<&str> {
        self.artifact.as_deref()
    }

    pub fn step_count(&self) -> u32 {
        self.step_count
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn failure(&self) -> Option<FailureKind> {
        self.failure
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    pub fn completion_observed(&self) -> bool {
        self.completion_observed
    }

    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }

    //
    // ---------- derived views used by the router ----------
    //

    pub fn attempts(&self, node: NodeId) -> usize {
        self.observations.iter().filter(|o| o.node == node).count()
    }

    /// Observations for one capability, in invocation order.
    pub fn observations_for(&self, capability: Capability) -> impl Iterator<Item = &Observation> {
        self.observations
            .iter()
            .filter(move |o| o.capability == capability)
    }

    /// Providers already attempted for a capability this run.
    pub fn tried_providers(&self, capability: Capability) -> Vec<&str> {
        self.observations_for(capability)
            .map(|o| o.provider.as_str())
            .collect()
    }

    /// The most recent successful metrics observation.
    pub fn usable_data(&self) -> Option<&Observation> {
        self.observations
            .iter()
            .rev()
            .find(|o| o.capability == Capability::FinancialMetrics && o.is_success())
    }

    /// The most recent successful news observation, if any.
    pub fn news(&self) -> Option<&Observation> {
        self.observations
            .iter()
            .rev()
            .find(|o| o.capability == Capability::News && o.is_success())
    }

    pub fn last_observation(&self, node: NodeId) -> Option<&Observation> {
        self.observations.iter().rev().find(|o| o.node == node)
    }

    //
    // ---------- mutation (orchestrator only) ----------
    //

    pub(crate) fn apply(&mut self, delta: StateDelta) {
        if !self.is_running() {
            warn!(run_id = %self.run_id, "Ignoring delta for a finished run");
            return;
        }

        let mut observation = delta.observation;
        observation.sequence = self.observations.len() as u32 + 1;
        self.observations.push(observation);

        if let Some(symbol) = delta.resolved_symbol {
            if self.resolved_symbol.is_none() {
                self.resolved_symbol = Some(symbol);
            } else {
                warn!(run_id = %self.run_id, "Resolved symbol already set; keeping the first one");
            }
        }

        if let Some(draft) = delta.draft_analysis {
            if self.draft_analysis.is_none() {
                self.draft_analysis = Some(draft);
            }
        }

        if delta.artifact.is_some() {
            self.artifact = delta.artifact;
        }

        self.completion_observed |= delta.completion_observed;
    }

    pub(crate) fn increment_step(&mut self) {
        self.step_count = self.step_count.saturating_add(1);
    }

    pub(crate) fn complete(&mut self) {
        if self.is_running() {
            self.status = RunStatus::Completed;
        }
    }

    pub(crate) fn fail(&mut self, kind: FailureKind, detail: impl AsRef<str>) {
        if self.is_running() {
            self.status = RunStatus::Failed;
            self.failure = Some(kind);
            self.error_detail = Some(format!("{}: {}", kind, detail.as_ref()));
        }
    }

    pub fn into_report(self) -> RunReport {
        RunReport {
            run_id: self.run_id,
            subject: self.subject,
            status: self.status,
            symbol: self.resolved_symbol,
            analysis: self.draft_analysis,
            artifact: self.artifact,
            failure: self.failure,
            error: self.error_detail,
            steps: self.step_count,
            observations: self.observations,
        }
    }
}
