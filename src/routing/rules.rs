//! Routing rules
//!
//! A rule is a name, a predicate evaluated against each candidate, and a
//! selection policy used when the predicate matches more than one candidate.
//! The built-in rules and caller-supplied rules go through the same path.

use crate::registry::Specialist;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Names of the built-in rules, in evaluation order
pub const DEFAULT_RULE_NAMES: [&str; 4] =
    ["code_analysis", "documentation", "memory_context", "planning"];

/// What a rule predicate sees about the request
#[derive(Debug, Clone, Copy)]
pub struct RuleInput<'a> {
    pub message: &'a str,
    pub context: Option<&'a Value>,
    pub required_capabilities: &'a [String],
}

/// Predicate deciding whether a candidate is a match for a request
pub type RulePredicate = Arc<dyn Fn(&RuleInput<'_>, &Specialist) -> bool + Send + Sync>;

/// How a rule picks among several matching candidates
///
/// Whatever the policy, remaining ties are broken by highest success rate,
/// then lowest average response time, then id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionPolicy {
    HighestSuccessRate,
    /// Lowest average response time; specialists without samples rank last
    FastestResponse,
    /// Earlier ids in the list win; unlisted candidates rank after listed ones
    PreferIds(Vec<String>),
    /// Fewest selections so far by this engine
    LeastRouted,
}

/// One named routing rule
#[derive(Clone)]
pub struct RoutingRule {
    name: String,
    predicate: RulePredicate,
    policy: SelectionPolicy,
}

impl fmt::Debug for RoutingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingRule")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RoutingRule {
    pub fn new<F>(name: impl Into<String>, policy: SelectionPolicy, predicate: F) -> Self
    where
        F: Fn(&RuleInput<'_>, &Specialist) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
            policy,
        }
    }

    /// Rule matching messages that mention any keyword (case-insensitive)
    ///
    /// A candidate matches when it has one of `capabilities` or is listed in
    /// `preferred`; preferred ids win in list order.
    pub fn keyword(
        name: impl Into<String>,
        keywords: &[&str],
        capabilities: &[&str],
        preferred: &[&str],
    ) -> Result<Self, regex::Error> {
        let alternatives: Vec<String> = keywords.iter().map(|k| regex::escape(k)).collect();
        let pattern = Regex::new(&format!(r"(?i)\b(?:{})", alternatives.join("|")))?;
        let capabilities: Vec<String> = capabilities.iter().map(|c| c.to_string()).collect();
        let preferred: Vec<String> = preferred.iter().map(|p| p.to_string()).collect();
        let preferred_ids = preferred.clone();

        Ok(Self::new(
            name,
            SelectionPolicy::PreferIds(preferred),
            move |input, specialist| {
                pattern.is_match(input.message)
                    && (preferred_ids.iter().any(|id| *id == specialist.id)
                        || capabilities
                            .iter()
                            .any(|cap| specialist.has_capabilities(std::slice::from_ref(cap))))
            },
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &SelectionPolicy {
        &self.policy
    }

    pub fn matches(&self, input: &RuleInput<'_>, specialist: &Specialist) -> bool {
        (self.predicate)(input, specialist)
    }
}

/// The built-in rule set, in [`DEFAULT_RULE_NAMES`] order
pub fn default_rules() -> Vec<RoutingRule> {
    let definitions: [(&str, &[&str], &[&str], &[&str]); 4] = [
        (
            "code_analysis",
            &["analyze", "analyse", "review", "code quality", "static analysis"],
            &["code_analysis", "static_analysis"],
            &["apollo-ai", "sophia-ai"],
        ),
        (
            "documentation",
            &["document", "docs", "readme", "explain"],
            &["documentation", "technical_writing"],
            &["hermes-ai"],
        ),
        (
            "memory_context",
            &["remember", "context", "history", "previous"],
            &["memory", "context_management"],
            &["engram-ai"],
        ),
        (
            "planning",
            &["plan", "roadmap", "milestone", "schedule"],
            &["planning", "task_decomposition"],
            &["prometheus-ai", "metis-ai"],
        ),
    ];

    definitions
        .into_iter()
        .filter_map(|(name, keywords, capabilities, preferred)| {
            RoutingRule::keyword(name, keywords, capabilities, preferred)
                .map_err(|e| warn!(rule = name, error = %e, "Skipping built-in rule"))
                .ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SpecialistSpec;

    fn specialist(id: &str, capabilities: &[&str]) -> Specialist {
        Specialist::from_spec(
            SpecialistSpec::new(id, "localhost", 1).with_capabilities(capabilities.iter().copied()),
        )
    }

    fn input(message: &str) -> RuleInput<'_> {
        RuleInput {
            message,
            context: None,
            required_capabilities: &[],
        }
    }

    #[test]
    fn test_default_rules_order() {
        let names: Vec<_> = default_rules().iter().map(|r| r.name().to_string()).collect();
        assert_eq!(names, DEFAULT_RULE_NAMES);
    }

    #[test]
    fn test_keyword_rule_is_case_insensitive() {
        let rule = RoutingRule::keyword("docs", &["readme"], &["documentation"], &[]).unwrap();
        let writer = specialist("hermes-ai", &["documentation"]);

        assert!(rule.matches(&input("Update the README please"), &writer));
        assert!(!rule.matches(&input("hello there"), &writer));
    }

    #[test]
    fn test_keyword_rule_requires_capability_or_preference() {
        let rule =
            RoutingRule::keyword("code", &["review"], &["code_analysis"], &["apollo-ai"]).unwrap();
        let apollo = specialist("apollo-ai", &[]);
        let sophia = specialist("sophia-ai", &["code_analysis"]);
        let terma = specialist("terma-ai", &["terminal"]);

        let request = input("please review this diff");
        assert!(rule.matches(&request, &apollo));
        assert!(rule.matches(&request, &sophia));
        assert!(!rule.matches(&request, &terma));
        assert_eq!(
            rule.policy(),
            &SelectionPolicy::PreferIds(vec!["apollo-ai".to_string()])
        );
    }

    #[test]
    fn test_keywords_match_word_prefixes() {
        let rule = RoutingRule::keyword("docs", &["document"], &["documentation"], &[]).unwrap();
        let writer = specialist("hermes-ai", &["documentation"]);
        assert!(rule.matches(&input("documentation is stale"), &writer));
        assert!(!rule.matches(&input("undocumented"), &writer));
    }

    #[test]
    fn test_keyword_special_characters_are_escaped() {
        let rule = RoutingRule::keyword("cpp", &["c++"], &["code_analysis"], &[]).unwrap();
        let analyst = specialist("apollo-ai", &["code_analysis"]);
        assert!(rule.matches(&input("some c++ code"), &analyst));
    }

    #[test]
    fn test_custom_predicate_sees_context() {
        let rule = RoutingRule::new("urgent", SelectionPolicy::FastestResponse, |input, _| {
            input
                .context
                .and_then(|c| c.get("urgent"))
                .and_then(Value::as_bool)
                .unwrap_or(false)
        });
        let ctx = serde_json::json!({"urgent": true});
        let request = RuleInput {
            message: "anything",
            context: Some(&ctx),
            required_capabilities: &[],
        };
        assert!(rule.matches(&request, &specialist("a-ai", &[])));
        assert!(!rule.matches(&input("anything"), &specialist("a-ai", &[])));
    }
}
