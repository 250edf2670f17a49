//! Rule evaluation.
//!
//! Answers "may this request proceed?" for an already-resolved set of rules.
//! Evaluation is a pure function of its inputs and never touches storage.
//!
//! **White mode** (default deny): a matching deny rule always wins, in any
//! position; otherwise a matching allow rule grants access.
//!
//! **Black mode** (default allow): among the matching rules only the most
//! specific ones count. A deny at that specificity denies (ties favor deny);
//! an allow there overrides broader denies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::models::AuthContext;
use super::pattern::SegmentPath;
use super::rule::{Effect, Rule};
use crate::error::{Result, WardenError};

// ═══════════════════════════════════════════════════════════════════════════════
// Mode
// ═══════════════════════════════════════════════════════════════════════════════

/// Evaluation posture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Default deny.
    #[default]
    White,
    /// Default allow.
    Black,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::White => "white",
            Self::Black => "black",
        }
    }

    fn default_decision(&self) -> Decision {
        match self {
            Self::White => Decision::Deny,
            Self::Black => Decision::Allow,
        }
    }
}

impl FromStr for Mode {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "white" => Ok(Self::White),
            "black" => Ok(Self::Black),
            _ => Err(WardenError::invalid_mode(s)),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Decision
// ═══════════════════════════════════════════════════════════════════════════════

/// Outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Deny)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }
}

impl From<Effect> for Decision {
    fn from(effect: Effect) -> Self {
        match effect {
            Effect::Allow => Self::Allow,
            Effect::Deny => Self::Deny,
        }
    }
}

/// A decision together with the rule that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub decision: Decision,
    /// Index into the evaluated rule slice, `None` when the mode default applied.
    pub matched_rule: Option<usize>,
    pub reason: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Request
// ═══════════════════════════════════════════════════════════════════════════════

/// The resource/action pair being authorized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequest {
    pub resource: SegmentPath,
    pub action: SegmentPath,
}

impl AccessRequest {
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: SegmentPath::new(resource),
            action: SegmentPath::new(action),
        }
    }
}

impl fmt::Display for AccessRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.action, self.resource)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Evaluation
// ═══════════════════════════════════════════════════════════════════════════════

fn rule_matches(rule: &Rule, request: &AccessRequest, context: &AuthContext) -> bool {
    rule.resource.matches(&request.resource)
        && rule.action.matches(&request.action)
        && rule.condition.as_ref().map_or(true, |c| c.holds(context))
}

/// Decide whether `request` is allowed by `rules` under `mode`.
pub fn evaluate(
    rules: &[Rule],
    request: &AccessRequest,
    mode: Mode,
    context: &AuthContext,
) -> Decision {
    explain(rules, request, mode, context).decision
}

/// Like [`evaluate`], also reporting which rule decided.
pub fn explain(
    rules: &[Rule],
    request: &AccessRequest,
    mode: Mode,
    context: &AuthContext,
) -> Verdict {
    let matching = rules
        .iter()
        .enumerate()
        .filter(|(_, rule)| rule_matches(rule, request, context));

    match mode {
        Mode::White => explain_white(matching, request),
        Mode::Black => explain_black(matching, request),
    }
}

fn explain_white<'a>(
    matching: impl Iterator<Item = (usize, &'a Rule)>,
    request: &AccessRequest,
) -> Verdict {
    let mut first_allow = None;
    for (idx, rule) in matching {
        match rule.effect {
            Effect::Deny => {
                return Verdict {
                    decision: Decision::Deny,
                    matched_rule: Some(idx),
                    reason: format!("Denied by rule #{} ({})", idx, rule),
                };
            }
            Effect::Allow => {
                first_allow.get_or_insert((idx, rule));
            }
        }
    }

    match first_allow {
        Some((idx, rule)) => Verdict {
            decision: Decision::Allow,
            matched_rule: Some(idx),
            reason: format!("Allowed by rule #{} ({})", idx, rule),
        },
        None => default_verdict(Mode::White, request),
    }
}

fn explain_black<'a>(
    matching: impl Iterator<Item = (usize, &'a Rule)>,
    request: &AccessRequest,
) -> Verdict {
    // (specificity, index, rule) of the best candidate; deny replaces allow on ties.
    let mut best: Option<(u32, usize, &Rule)> = None;
    for (idx, rule) in matching {
        let specificity = rule.specificity();
        let replace = match best {
            None => true,
            Some((best_spec, _, best_rule)) => {
                specificity > best_spec
                    || (specificity == best_spec
                        && rule.effect == Effect::Deny
                        && best_rule.effect == Effect::Allow)
            }
        };
        if replace {
            best = Some((specificity, idx, rule));
        }
    }

    match best {
        Some((specificity, idx, rule)) => Verdict {
            decision: rule.effect.into(),
            matched_rule: Some(idx),
            reason: format!(
                "Decided by rule #{} ({}) at specificity {}",
                idx, rule, specificity
            ),
        },
        None => default_verdict(Mode::Black, request),
    }
}

fn default_verdict(mode: Mode, request: &AccessRequest) -> Verdict {
    Verdict {
        decision: mode.default_decision(),
        matched_rule: None,
        reason: format!("No rule matches {}; {} mode default applies", request, mode),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
