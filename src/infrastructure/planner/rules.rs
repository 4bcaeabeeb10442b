use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

use crate::domain::models::PlannedStep;
use crate::domain::ports::{Planner, PlannerError};

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(https?://\S+)").expect("valid url regex"));

static CALC_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)calc:").expect("valid calc regex"));

static CALCULATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bcalculate\b").expect("valid calculate regex"));

/// Deterministic keyword planner.
///
/// - the first `http://` or `https://` URL becomes an `http_get` step
/// - text after `calc:` becomes a `calc` step
/// - otherwise text after the word `calculate` (minus a leading `:`) does
///
/// A trigger with nothing after it produces no step.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleBasedPlanner;

impl RuleBasedPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous core of [`Planner::plan`].
    pub fn plan_goal(goal: &str) -> Vec<PlannedStep> {
        let mut steps = Vec::new();

        if let Some(url) = URL_RE.find(goal) {
            steps.push(PlannedStep::http_get(url.as_str()));
        }

        let expr = if let Some(m) = CALC_PREFIX_RE.find(goal) {
            Some(goal[m.end()..].trim())
        } else {
            CALCULATE_RE
                .find(goal)
                .map(|m| goal[m.end()..].trim_start().trim_start_matches(':').trim())
        };
        if let Some(expr) = expr.filter(|e| !e.is_empty()) {
            steps.push(PlannedStep::calc(expr));
        }

        steps
    }
}

#[async_trait]
impl Planner for RuleBasedPlanner {
    fn name(&self) -> &str {
        "rule_planner"
    }

    async fn plan(&self, goal: &str) -> Result<Vec<PlannedStep>, PlannerError> {
        Ok(Self::plan_goal(goal))
    }
}
