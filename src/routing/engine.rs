//! Routing engine
//!
//! Picks exactly one specialist for a message, or reports why none qualifies.
//!
//! Selection runs in up to two passes. The first pass only considers
//! `Healthy` specialists; if none satisfy the required capabilities the
//! second pass admits `Degraded` ones and every fallback level is one higher.
//! Within a pass the preferred specialist wins, then the first matching rule,
//! then the candidate with the best success rate.

use super::rules::{default_rules, RoutingRule, RuleInput, SelectionPolicy};
use crate::registry::{DiscoverFilter, Specialist, SpecialistRegistry, SpecialistStatus};
use crate::route_span;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn, Instrument};

/// Minimum success rate for healthy team members
const TEAM_HEALTHY_MIN_RATE: f64 = 0.7;
/// Minimum success rate for degraded team members
const TEAM_DEGRADED_MIN_RATE: f64 = 0.5;
/// Response time treated as the worst case when scoring team members
const TEAM_SLOW_SECS: f64 = 5.0;

/// Routing failures
#[derive(Debug, Error, PartialEq)]
pub enum RoutingError {
    #[error("no healthy or degraded specialist satisfies required capabilities {required_capabilities:?}")]
    NoCandidate {
        required_capabilities: Vec<String>,
        excluded: Vec<String>,
    },

    #[error("team size must be at least 1")]
    InvalidTeamSize,
}

/// A message to route plus optional hints
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteRequest {
    pub message: String,
    pub context: Option<Value>,
    pub preferred: Option<String>,
    pub required_capabilities: Vec<String>,
    /// Ids that must not be selected
    pub exclude: Vec<String>,
}

impl RouteRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn prefer(mut self, specialist_id: impl Into<String>) -> Self {
        self.preferred = Some(specialist_id.into());
        self
    }

    pub fn require<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn exclude<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(ids.into_iter().map(Into::into));
        self
    }

    fn rule_input(&self) -> RuleInput<'_> {
        RuleInput {
            message: &self.message,
            context: self.context.as_ref(),
            required_capabilities: &self.required_capabilities,
        }
    }
}

/// Outcome of a routing decision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteResult {
    pub specialist: Specialist,
    pub rule_used: Option<String>,
    /// 0 for a preferred or rule match; each relaxation step adds one
    pub fallback_level: u32,
    pub reason: String,
}

/// Rule-based specialist selection over a shared registry
pub struct RoutingEngine {
    registry: SpecialistRegistry,
    rules: Vec<RoutingRule>,
    route_counts: Mutex<HashMap<String, u64>>,
}

impl std::fmt::Debug for RoutingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingEngine")
            .field("rules", &self.rule_names())
            .finish_non_exhaustive()
    }
}

impl RoutingEngine {
    /// Engine without rules; every request falls through to success-rate selection
    pub fn new(registry: SpecialistRegistry) -> Self {
        Self {
            registry,
            rules: Vec::new(),
            route_counts: Mutex::new(HashMap::new()),
        }
    }

    /// Engine loaded with the built-in rule set
    pub fn with_default_rules(registry: SpecialistRegistry) -> Self {
        let mut engine = Self::new(registry);
        for rule in default_rules() {
            engine.add_rule(rule);
        }
        engine
    }

    pub fn registry(&self) -> &SpecialistRegistry {
        &self.registry
    }

    /// Append a rule; earlier rules win
    pub fn add_rule(&mut self, rule: RoutingRule) {
        debug!(rule = rule.name(), "Added routing rule");
        self.rules.push(rule);
    }

    /// Remove every rule with this name; returns whether any was removed
    pub fn remove_rule(&mut self, name: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|rule| rule.name() != name);
        self.rules.len() != before
    }

    pub fn rules(&self) -> &[RoutingRule] {
        &self.rules
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(RoutingRule::name).collect()
    }

    /// Times each specialist was selected by this engine
    pub fn route_count(&self, specialist_id: &str) -> u64 {
        self.counts().get(specialist_id).copied().unwrap_or(0)
    }

    /// Select one specialist for `request`
    pub async fn route_message(&self, request: &RouteRequest) -> Result<RouteResult, RoutingError> {
        let span = route_span!(
            message_len = request.message.len(),
            preferred = request.preferred.as_deref().unwrap_or(""),
            required = ?request.required_capabilities
        );

        async {
            let filter =
                DiscoverFilter::new().with_capabilities(request.required_capabilities.clone());
            let eligible: Vec<Specialist> = self
                .registry
                .discover(&filter)
                .await
                .into_iter()
                .filter(|s| !request.exclude.contains(&s.id))
                .collect();

            let passes: [(u32, &[SpecialistStatus]); 2] = [
                (0, &[SpecialistStatus::Healthy]),
                (1, &[SpecialistStatus::Healthy, SpecialistStatus::Degraded]),
            ];

            for (base_level, statuses) in passes {
                let candidates: Vec<&Specialist> = eligible
                    .iter()
                    .filter(|s| statuses.contains(&s.status))
                    .collect();
                if candidates.is_empty() {
                    continue;
                }

                let mut result = self.select(request, &candidates, base_level);
                if base_level > 0 {
                    result.reason.push_str(" (no healthy candidate; degraded admitted)");
                }
                self.note_selection(&result.specialist.id);
                info!(
                    specialist_id = %result.specialist.id,
                    rule = result.rule_used.as_deref().unwrap_or("-"),
                    fallback_level = result.fallback_level,
                    reason = %result.reason,
                    "Routed message"
                );
                return Ok(result);
            }

            warn!(
                required = ?request.required_capabilities,
                excluded = ?request.exclude,
                "No candidate specialist"
            );
            Err(RoutingError::NoCandidate {
                required_capabilities: request.required_capabilities.clone(),
                excluded: request.exclude.clone(),
            })
        }
        .instrument(span)
        .await
    }

    /// Select up to `team_size` distinct specialists for collaborative work
    ///
    /// Healthy specialists with a success rate of at least 0.7 are used first;
    /// degraded ones with at least 0.5 join when there are too few. With
    /// `diverse` each pick maximises newly covered capabilities, otherwise the
    /// best performers are taken.
    pub async fn route_to_team(
        &self,
        message: &str,
        team_size: usize,
        diverse: bool,
    ) -> Result<Vec<RouteResult>, RoutingError> {
        if team_size == 0 {
            return Err(RoutingError::InvalidTeamSize);
        }

        let mut candidates = self
            .registry
            .discover(
                &DiscoverFilter::new()
                    .with_status(SpecialistStatus::Healthy)
                    .with_min_success_rate(TEAM_HEALTHY_MIN_RATE),
            )
            .await;
        if candidates.len() < team_size {
            candidates.extend(
                self.registry
                    .discover(
                        &DiscoverFilter::new()
                            .with_status(SpecialistStatus::Degraded)
                            .with_min_success_rate(TEAM_DEGRADED_MIN_RATE),
                    )
                    .await,
            );
        }
        if candidates.is_empty() {
            return Err(RoutingError::NoCandidate {
                required_capabilities: Vec::new(),
                excluded: Vec::new(),
            });
        }
        candidates.sort_by(tie_break);

        let picked: Vec<Specialist> = if diverse {
            pick_diverse(candidates, team_size)
        } else {
            candidates.into_iter().take(team_size).collect()
        };

        let mode = if diverse { "diverse" } else { "performance-based" };
        let team: Vec<RouteResult> = picked
            .into_iter()
            .enumerate()
            .map(|(i, specialist)| {
                let fallback_level = u32::from(specialist.status != SpecialistStatus::Healthy);
                RouteResult {
                    specialist,
                    rule_used: None,
                    fallback_level,
                    reason: format!("team member {} ({mode} selection)", i + 1),
                }
            })
            .collect();

        for member in &team {
            self.note_selection(&member.specialist.id);
        }
        info!(
            message_len = message.len(),
            team = ?team.iter().map(|m| m.specialist.id.as_str()).collect::<Vec<_>>(),
            "Routed message to team"
        );
        Ok(team)
    }

    /// Steps 2 to 4 of a pass over a non-empty candidate set
    fn select(
        &self,
        request: &RouteRequest,
        candidates: &[&Specialist],
        base_level: u32,
    ) -> RouteResult {
        if let Some(preferred) = request.preferred.as_deref() {
            if let Some(specialist) = candidates.iter().find(|s| s.id == preferred) {
                return RouteResult {
                    specialist: (*specialist).clone(),
                    rule_used: None,
                    fallback_level: base_level,
                    reason: "preferred specialist available".to_string(),
                };
            }
            debug!(preferred = preferred, "Preferred specialist not among candidates");
        }

        let input = request.rule_input();
        for rule in &self.rules {
            let matches: Vec<&Specialist> = candidates
                .iter()
                .copied()
                .filter(|s| rule.matches(&input, s))
                .collect();
            if let Some(specialist) = self.pick(rule.policy(), &matches) {
                return RouteResult {
                    specialist: specialist.clone(),
                    rule_used: Some(rule.name().to_string()),
                    fallback_level: base_level,
                    reason: format!("matched rule '{}'", rule.name()),
                };
            }
        }

        // Candidates are non-empty, so this always selects
        let specialist = candidates
            .iter()
            .copied()
            .min_by(|a, b| tie_break(*a, *b))
            .cloned()
            .unwrap_or_else(|| candidates[0].clone());
        RouteResult {
            specialist,
            rule_used: None,
            fallback_level: base_level + 1,
            reason: "no rule matched; selected by success rate".to_string(),
        }
    }

    fn pick<'a>(
        &self,
        policy: &SelectionPolicy,
        matches: &[&'a Specialist],
    ) -> Option<&'a Specialist> {
        let counts = self.counts();
        matches.iter().copied().min_by(|a, b| {
            let primary = match policy {
                SelectionPolicy::HighestSuccessRate => Ordering::Equal,
                SelectionPolicy::FastestResponse => response_key(a).total_cmp(&response_key(b)),
                SelectionPolicy::PreferIds(ids) => {
                    preference_rank(ids, &a.id).cmp(&preference_rank(ids, &b.id))
                }
                SelectionPolicy::LeastRouted => {
                    let load = |s: &Specialist| counts.get(&s.id).copied().unwrap_or(0);
                    load(*a).cmp(&load(*b))
                }
            };
            primary.then_with(|| tie_break(a, b))
        })
    }

    fn note_selection(&self, specialist_id: &str) {
        *self.counts().entry(specialist_id.to_string()).or_insert(0) += 1;
    }

    fn counts(&self) -> std::sync::MutexGuard<'_, HashMap<String, u64>> {
        self.route_counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Highest success rate, then lowest average response time, then id
fn tie_break(a: &Specialist, b: &Specialist) -> Ordering {
    b.success_rate()
        .total_cmp(&a.success_rate())
        .then_with(|| a.avg_response_secs.total_cmp(&b.avg_response_secs))
        .then_with(|| a.id.cmp(&b.id))
}

fn response_key(specialist: &Specialist) -> f64 {
    if specialist.success_count == 0 {
        f64::INFINITY
    } else {
        specialist.avg_response_secs
    }
}

fn preference_rank(ids: &[String], id: &str) -> usize {
    ids.iter().position(|p| p == id).unwrap_or(usize::MAX)
}

/// Greedy pick favouring capabilities not yet covered by the team
fn pick_diverse(mut pool: Vec<Specialist>, team_size: usize) -> Vec<Specialist> {
    let mut covered: BTreeSet<String> = BTreeSet::new();
    let mut team = Vec::with_capacity(team_size);

    while team.len() < team_size && !pool.is_empty() {
        let score = |s: &Specialist| {
            let new_caps = s.capabilities.difference(&covered).count() as f64;
            let speed = (1.0 - s.avg_response_secs / TEAM_SLOW_SECS).max(0.0);
            new_caps * 0.7 + s.success_rate() * speed * 0.3
        };

        // Pool is sorted by tie-break order, so the first maximum wins ties
        let mut best = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (i, candidate) in pool.iter().enumerate() {
            let candidate_score = score(candidate);
            if candidate_score > best_score {
                best = i;
                best_score = candidate_score;
            }
        }

        let chosen = pool.remove(best);
        covered.extend(chosen.capabilities.iter().cloned());
        team.push(chosen);
    }
    team
}
