//! Provider fallback policy
//!
//! Each capability has an ordered plan of providers. The resolver holds
//! no per-run history; callers pass what they already tried.

use crate::models::Capability;
use crate::tools::names;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Ordered providers for one capability, tried left to right.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FallbackPlan {
    pub capability: Capability,
    pub providers: Vec<String>,
}

impl FallbackPlan {
    pub fn new<I, S>(capability: Capability, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            capability,
            providers: providers.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FallbackResolver {
    plans: HashMap<Capability, FallbackPlan>,
}

impl FallbackResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plan(mut self, plan: FallbackPlan) -> Self {
        self.plans.insert(plan.capability, plan);
        self
    }

    pub fn plan(&self, capability: Capability) -> Option<&FallbackPlan> {
        self.plans.get(&capability)
    }

    /// Next untried provider, or `None` once the plan is exhausted.
    pub fn next_provider(&self, capability: Capability, tried: &[&str]) -> Option<&str> {
        self.plans
            .get(&capability)?
            .providers
            .iter()
            .map(String::as_str)
            .find(|provider| !tried.contains(provider))
    }

    pub fn primary(&self, capability: Capability) -> Option<&str> {
        self.next_provider(capability, &[])
    }
}

/// Plan for the optional news capability. Not part of the default plans;
/// adding it makes the router collect headlines before synthesis.
pub fn news_plan() -> FallbackPlan {
    FallbackPlan::new(Capability::News, [names::NEWSAPI_HEADLINES])
}

/// Default plans wired to the built-in tool names.
pub fn create_default_resolver() -> FallbackResolver {
    FallbackResolver::new()
        .with_plan(FallbackPlan::new(
            Capability::SymbolLookup,
            [names::SEARCH_SYMBOL],
        ))
        .with_plan(FallbackPlan::new(
            Capability::FinancialMetrics,
            [names::FINNHUB_METRICS, names::YAHOO_QUOTE],
        ))
        .with_plan(FallbackPlan::new(
            Capability::Synthesis,
            [names::SYNTHESIZE_ANALYSIS],
        ))
        .with_plan(FallbackPlan::new(
            Capability::Report,
            [names::GENERATE_REPORT],
        ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_consumed_left_to_right() {
        let resolver = create_default_resolver();
        let metrics = Capability::FinancialMetrics;

        assert_eq!(resolver.primary(metrics), Some(names::FINNHUB_METRICS));
        assert_eq!(
            resolver.next_provider(metrics, &[names::FINNHUB_METRICS]),
            Some(names::YAHOO_QUOTE)
        );
        assert_eq!(
            resolver.next_provider(metrics, &[names::FINNHUB_METRICS, names::YAHOO_QUOTE]),
            None
        );
    }

    #[test]
    fn test_symbol_lookup_has_no_fallback() {
        let resolver = create_default_resolver();
        assert_eq!(
            resolver.next_provider(Capability::SymbolLookup, &[names::SEARCH_SYMBOL]),
            None
        );
    }

    #[test]
    fn test_tried_order_does_not_matter() {
        let resolver = FallbackResolver::new().with_plan(FallbackPlan::new(
            Capability::FinancialMetrics,
            ["a", "b", "c"],
        ));

        assert_eq!(
            resolver.next_provider(Capability::FinancialMetrics, &["b", "a"]),
            Some("c")
        );
    }

    #[test]
    fn test_unknown_capability_yields_none() {
        let resolver = FallbackResolver::new();
        assert_eq!(resolver.primary(Capability::Report), None);
        assert!(resolver.plan(Capability::Report).is_none());
    }
}
