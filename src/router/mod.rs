//! Step router
//!
//! Pure transition function over `TaskState`. The same state always yields
//! the same verdict; retry counts are derived from the observation log.

use crate::error::FailureKind;
use crate::fallback::FallbackResolver;
use crate::models::{Capability, NodeId, Observation, OutcomeKind, RunStatus};
use crate::state::TaskState;
use std::sync::Arc;

pub const DEFAULT_SYNTHESIS_ATTEMPTS: u32 = 3;
pub const DEFAULT_REPORT_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    Completed,
    Failed { kind: FailureKind, detail: String },
}

impl Termination {
    fn failed(kind: FailureKind, detail: impl Into<String>) -> Self {
        Termination::Failed {
            kind,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NextStep {
    Run(NodeId),
    Terminate(Termination),
}

pub struct StepRouter {
    resolver: Arc<FallbackResolver>,
    synthesis_attempts: u32,
    report_attempts: u32,
}

fn last_message(observation: Option<&Observation>) -> &str {
    observation
        .and_then(|o| o.message.as_deref())
        .unwrap_or("no detail")
}

impl StepRouter {
    pub fn new(resolver: Arc<FallbackResolver>) -> Self {
        Self {
            resolver,
            synthesis_attempts: DEFAULT_SYNTHESIS_ATTEMPTS,
            report_attempts: DEFAULT_REPORT_ATTEMPTS,
        }
    }

    pub fn with_attempt_limits(mut self, synthesis_attempts: u32, report_attempts: u32) -> Self {
        self.synthesis_attempts = synthesis_attempts.max(1);
        self.report_attempts = report_attempts.max(1);
        self
    }

    pub fn resolver(&self) -> &FallbackResolver {
        &self.resolver
    }

    /// Decide what happens next. First matching rule wins.
    pub fn next(&self, state: &TaskState) -> NextStep {
        match state.status() {
            RunStatus::Running => {}
            RunStatus::Completed => return NextStep::Terminate(Termination::Completed),
            RunStatus::Failed => {
                return NextStep::Terminate(Termination::failed(
                    state.failure().unwrap_or(FailureKind::NodeFailure),
                    state.error_detail().unwrap_or("run already failed"),
                ))
            }
        }

        if state.artifact().is_some() {
            return NextStep::Terminate(Termination::Completed);
        }

        let has_valid_draft = state.draft_analysis().is_some_and(|d| d.is_complete());

        if state.completion_observed() {
            return NextStep::Terminate(if has_valid_draft {
                Termination::Completed
            } else {
                Termination::failed(
                    FailureKind::SynthesisMalformed,
                    "completion marker observed before a valid analysis was produced",
                )
            });
        }

        if state.resolved_symbol().is_none() {
            if state.attempts(NodeId::LookupSymbol) == 0 {
                return NextStep::Run(NodeId::LookupSymbol);
            }
            let last = state.last_observation(NodeId::LookupSymbol);
            return NextStep::Terminate(Termination::failed(
                FailureKind::ResolutionFailure,
                format!(
                    "symbol lookup for '{}' produced no symbol ({})",
                    state.subject(),
                    last_message(last)
                ),
            ));
        }

        if has_valid_draft {
            let failures = state.attempts(NodeId::GenerateReport) as u32;
            if failures < self.report_attempts {
                return NextStep::Run(NodeId::GenerateReport);
            }
            return NextStep::Terminate(Termination::failed(
                FailureKind::ReportFailure,
                format!(
                    "report generation failed {} time(s): {}",
                    failures,
                    last_message(state.last_observation(NodeId::GenerateReport))
                ),
            ));
        }

        let metrics = Capability::FinancialMetrics;
        let tried = state.tried_providers(metrics);

        if tried.is_empty() {
            return NextStep::Run(NodeId::FetchPrimary);
        }

        if state.usable_data().is_none() {
            if self.resolver.next_provider(metrics, &tried).is_some() {
                return NextStep::Run(NodeId::FetchFallback);
            }

            let last = state.observations_for(metrics).last();
            let kind = match last.map(|o| o.kind) {
                Some(OutcomeKind::Error) => FailureKind::ProviderError,
                _ => FailureKind::ProviderEmpty,
            };
            return NextStep::Terminate(Termination::failed(
                kind,
                format!(
                    "no metrics provider returned usable data for {} (tried: {}); last: {}",
                    state.resolved_symbol().unwrap_or_default(),
                    tried.join(", "),
                    last_message(last)
                ),
            ));
        }

        // News is optional: any outcome moves on to the next provider or to synthesis.
        let news = Capability::News;
        if state.news().is_none()
            && self
                .resolver
                .next_provider(news, &state.tried_providers(news))
                .is_some()
        {
            return NextStep::Run(NodeId::FetchNews);
        }

        let synthesis_attempts = state.attempts(NodeId::Synthesize) as u32;
        if synthesis_attempts < self.synthesis_attempts {
            return NextStep::Run(NodeId::Synthesize);
        }

        let last = state.last_observation(NodeId::Synthesize);
        if state
            .observations_for(Capability::Synthesis)
            .all(|o| o.kind == OutcomeKind::Error)
        {
            return NextStep::Terminate(Termination::failed(
                FailureKind::ProviderError,
                format!(
                    "synthesis provider failed on all {} attempt(s): {}",
                    synthesis_attempts,
                    last_message(last)
                ),
            ));
        }

        NextStep::Terminate(Termination::failed(
            FailureKind::SynthesisMalformed,
            format!(
                "analysis still malformed after {} attempt(s): {}",
                synthesis_attempts,
                last_message(last)
            ),
        ))
    }
}
