use anyhow::Result;

use crate::logic::{PlayPlan, PlaySummary};

pub mod catalog;

pub use catalog::{catalog_scenarios, find_scenario};

/// Check run against a finished play-through.
pub type Expectation = fn(&PlayPlan, &PlaySummary) -> Result<()>;

#[derive(Debug, Clone)]
pub struct TestScenario {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub plan: PlayPlan,
    pub expectations: Vec<Expectation>,
}

impl TestScenario {
    #[must_use]
    pub fn new(
        key: &'static str,
        name: &'static str,
        description: &'static str,
        plan: PlayPlan,
    ) -> Self {
        Self {
            key,
            name,
            description,
            plan,
            expectations: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_expectation(mut self, expectation: Expectation) -> Self {
        self.expectations.push(expectation);
        self
    }

    /// First failed expectation, if any.
    #[must_use]
    pub fn evaluate(&self, summary: &PlaySummary) -> Option<String> {
        self.expectations
            .iter()
            .find_map(|expectation| expectation(&self.plan, summary).err())
            .map(|err| format!("{err:#}"))
    }
}

/// Scenario keys with their descriptions, in catalog order.
pub fn list_scenarios() -> Vec<(&'static str, &'static str)> {
    catalog_scenarios()
        .iter()
        .map(|s| (s.key, s.description))
        .collect()
}
