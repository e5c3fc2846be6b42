//! Routing Infrastructure
//!
//! ## Rules (rules.rs)
//!
//! Named predicates with a selection policy. The built-in set is
//! `code_analysis`, `documentation`, `memory_context` and `planning`, evaluated
//! in that order.
//!
//! ## Engine (engine.rs)
//!
//! Consults the registry for candidates and returns one specialist with the
//! rule used, the fallback level and a human-readable reason.
//!
//! ## Dispatch (dispatch.rs)
//!
//! Route, send and record the outcome in one call, retrying on other
//! specialists when the selected one fails.

pub mod dispatch;
pub mod engine;
pub mod rules;

pub use dispatch::{DispatchError, DispatchReply};
pub use engine::{RouteRequest, RouteResult, RoutingEngine, RoutingError};
pub use rules::{default_rules, RoutingRule, RuleInput, SelectionPolicy, DEFAULT_RULE_NAMES};
