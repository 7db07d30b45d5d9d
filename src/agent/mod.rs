//! Orchestrator - runs one analysis to a terminal state
//!
//! ROUTE → BOUND? → CANCELLED? → EXECUTE → DETECT → APPLY → ROUTE ...
//!
//! The orchestrator is the only writer of `TaskState`. Nodes read the state
//! and declare a `StateDelta`; every failure ends as a `Failed` state.

use crate::completion::CompletionDetector;
use crate::config::OrchestratorConfig;
use crate::error::{FailureKind, OrchestrationError};
use crate::fallback::FallbackResolver;
use crate::models::{DraftAnalysis, NodeId, Observation, RunReport, ToolOutcome};
use crate::router::{NextStep, StepRouter, Termination};
use crate::state::{StateDelta, TaskState};
use crate::tools::ToolGateway;
use crate::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Coordinates router, gateway and completion detection for a run.
pub struct Orchestrator {
    gateway: ToolGateway,
    router: StepRouter,
    detector: CompletionDetector,
    config: OrchestratorConfig,
}

fn invariant(detail: impl Into<String>) -> OrchestrationError {
    OrchestrationError::InvariantViolation(detail.into())
}

fn payload_text<'a>(outcome: &'a ToolOutcome, field: &str) -> Option<&'a str> {
    outcome
        .payload
        .as_ref()?
        .get(field)?
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

impl Orchestrator {
    pub fn new(
        gateway: ToolGateway,
        resolver: Arc<FallbackResolver>,
        config: OrchestratorConfig,
    ) -> Self {
        let router = StepRouter::new(resolver)
            .with_attempt_limits(config.synthesis_attempts, config.report_attempts);
        let detector = CompletionDetector::new(&config.completion_marker);

        Self {
            gateway,
            router,
            detector,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn gateway(&self) -> &ToolGateway {
        &self.gateway
    }

    /// Run with the configured step bound and no cancellation.
    pub async fn run(&self, subject: &str) -> RunReport {
        self.run_with(subject, self.config.max_steps, CancellationToken::new())
            .await
            .into_report()
    }

    /// Drive one run until the router terminates it, the bound is reached
    /// or `cancel` fires. Always returns a terminal state.
    pub async fn run_with(
        &self,
        subject: &str,
        max_steps: u32,
        cancel: CancellationToken,
    ) -> TaskState {
        let started = Instant::now();
        let mut state = TaskState::new(subject);

        info!(
            run_id = %state.run_id(),
            subject = %subject,
            max_steps,
            "Orchestrator: starting run"
        );

        loop {
            let node = match self.router.next(&state) {
                NextStep::Terminate(Termination::Completed) => {
                    state.complete();
                    break;
                }
                NextStep::Terminate(Termination::Failed { kind, detail }) => {
                    state.fail(kind, detail);
                    break;
                }
                NextStep::Run(node) => node,
            };

            if state.step_count() >= max_steps {
                state.fail(
                    FailureKind::BoundExceeded,
                    format!("step bound of {} reached before {}", max_steps, node),
                );
                break;
            }

            if cancel.is_cancelled() {
                state.fail(FailureKind::Cancelled, format!("cancelled before {}", node));
                break;
            }

            debug!(run_id = %state.run_id(), node = %node, step = state.step_count() + 1, "Executing node");

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                delta = self.execute_node(node, &state) => Some(delta),
            };

            match result {
                None => {
                    state.fail(FailureKind::Cancelled, format!("cancelled during {}", node));
                    break;
                }
                Some(Ok(mut delta)) => {
                    if self.detector.is_complete(delta.observation.message.as_deref()) {
                        debug!(run_id = %state.run_id(), node = %node, "Completion marker observed");
                        delta.completion_observed = true;
                    }
                    state.apply(delta);
                    state.increment_step();
                }
                Some(Err(e)) => {
                    state.increment_step();
                    state.fail(FailureKind::NodeFailure, format!("{} failed: {}", node, e));
                    break;
                }
            }
        }

        match state.failure() {
            None => info!(
                run_id = %state.run_id(),
                steps = state.step_count(),
                artifact = state.artifact().unwrap_or_default(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Run completed"
            ),
            Some(kind) => warn!(
                run_id = %state.run_id(),
                steps = state.step_count(),
                failure = %kind,
                detail = state.error_detail().unwrap_or_default(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Run failed"
            ),
        }

        state
    }

    /// Invoke the provider chosen for `node` and translate the outcome into
    /// the node's declared update.
    async fn execute_node(&self, node: NodeId, state: &TaskState) -> Result<StateDelta> {
        let capability = node.capability();
        let resolver = self.router.resolver();

        let provider = match node {
            NodeId::FetchFallback | NodeId::FetchNews => {
                resolver.next_provider(capability, &state.tried_providers(capability))
            }
            _ => resolver.primary(capability),
        }
        .ok_or_else(|| invariant(format!("no provider left for {:?} at {}", capability, node)))?
        .to_string();

        if node == NodeId::FetchFallback {
            warn!(
                run_id = %state.run_id(),
                provider = %provider,
                tried = ?state.tried_providers(capability),
                "Falling back to next metrics provider"
            );
        }

        let args = node_arguments(node, &provider, state)?;

        let started = Instant::now();
        let outcome = self
            .gateway
            .invoke(&provider, args, self.config.tool_timeout)
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        debug!(
            run_id = %state.run_id(),
            node = %node,
            provider = %provider,
            kind = ?outcome.kind,
            elapsed_ms,
            "Tool returned"
        );

        let delta = match node {
            NodeId::LookupSymbol => {
                let symbol = payload_text(&outcome, "symbol").map(str::to_string);
                let delta = StateDelta::observe(Observation::from_outcome(
                    node, &provider, outcome, elapsed_ms,
                ));
                match symbol {
                    Some(symbol) => delta.with_symbol(symbol),
                    None => delta,
                }
            }
            NodeId::FetchPrimary | NodeId::FetchFallback | NodeId::FetchNews => StateDelta::observe(
                Observation::from_outcome(node, &provider, outcome, elapsed_ms),
            ),
            NodeId::Synthesize => validate_synthesis(node, &provider, outcome, elapsed_ms, state),
            NodeId::GenerateReport => {
                let artifact = payload_text(&outcome, "artifact").map(str::to_string);
                let delta = StateDelta::observe(Observation::from_outcome(
                    node, &provider, outcome, elapsed_ms,
                ));
                match artifact {
                    Some(artifact) => delta.with_artifact(artifact),
                    None => delta,
                }
            }
        };

        Ok(delta)
    }
}

fn node_arguments(node: NodeId, provider: &str, state: &TaskState) -> Result<Value> {
    let symbol = || {
        state
            .resolved_symbol()
            .ok_or_else(|| invariant(format!("{} requires a resolved symbol", node)))
    };

    match node {
        NodeId::LookupSymbol => Ok(json!({ "company": state.subject() })),
        NodeId::FetchPrimary | NodeId::FetchFallback => Ok(json!({
            "symbol": symbol()?,
            "provider": provider,
        })),
        NodeId::FetchNews => Ok(json!({
            "company": state.subject(),
            "symbol": symbol()?,
        })),
        NodeId::Synthesize => {
            let data = state
                .usable_data()
                .ok_or_else(|| invariant("Synthesize requires usable metrics"))?;
            let previous_issue = state
                .last_observation(NodeId::Synthesize)
                .and_then(|o| o.message.as_deref());
            let news = state.news().and_then(|o| o.payload.as_ref());

            Ok(json!({
                "company": state.subject(),
                "symbol": symbol()?,
                "provider": data.provider,
                "data": data.payload,
                "news": news,
                "previous_issue": previous_issue,
            }))
        }
        NodeId::GenerateReport => {
            let draft = state
                .draft_analysis()
                .ok_or_else(|| invariant("GenerateReport requires a draft analysis"))?;
            let mut args = serde_json::to_value(draft)?;
            args["run_id"] = json!(state.run_id());
            Ok(args)
        }
    }
}

/// A successful synthesis only counts when it parses into a complete,
/// company-specific draft for the resolved symbol. Anything else is recorded
/// as Empty so the router can re-ask.
fn validate_synthesis(
    node: NodeId,
    provider: &str,
    outcome: ToolOutcome,
    elapsed_ms: u64,
    state: &TaskState,
) -> StateDelta {
    let Some(payload) = outcome.payload.as_ref().filter(|_| outcome.is_success()) else {
        return StateDelta::observe(Observation::from_outcome(node, provider, outcome, elapsed_ms));
    };

    let checked = DraftAnalysis::from_value(payload).and_then(|draft| {
        let expected = state.resolved_symbol().unwrap_or_default();
        if !draft.symbol.eq_ignore_ascii_case(expected) {
            Err(format!(
                "analysis is for symbol '{}' but the run resolved '{}'",
                draft.symbol, expected
            ))
        } else if draft.is_generic() {
            Err("generic analysis detected; a company-specific analysis is required".to_string())
        } else {
            Ok(draft)
        }
    });

    match checked {
        Ok(draft) => {
            StateDelta::observe(Observation::from_outcome(node, provider, outcome, elapsed_ms))
                .with_draft(draft)
        }
        Err(reason) => {
            warn!(run_id = %state.run_id(), reason = %reason, "Rejected malformed analysis");
            StateDelta::observe(Observation::from_outcome(
                node,
                provider,
                ToolOutcome::empty(format!("{}: {}", FailureKind::SynthesisMalformed, reason)),
                elapsed_ms,
            ))
        }
    }
}
