//! Tests for rule patterns and evaluation.
//!
//! Tests cover:
//! - Mode defaults with no matching rule
//! - White-mode deny precedence
//! - Black-mode specificity ordering
//! - Pattern parsing and matching edge cases

use warden_core::error::ErrorCode;
use warden_core::rbac::{
    evaluate, explain, AccessRequest, AuthContext, Decision, Mode, Pattern, Rule, SegmentPath,
};

fn ctx() -> AuthContext {
    AuthContext::new()
}

// ============================================================================
// Mode Defaults
// ============================================================================

#[test]
fn test_no_matching_rule_follows_mode_default() {
    let rules = vec![
        Rule::allow("agent:*", "agent:read").unwrap(),
        Rule::deny("agent:*", "agent:delete").unwrap(),
    ];
    let request = AccessRequest::new("logs/a", "read");

    assert_eq!(evaluate(&rules, &request, Mode::White, &ctx()), Decision::Deny);
    assert_eq!(evaluate(&rules, &request, Mode::Black, &ctx()), Decision::Allow);
}

// ============================================================================
// White Mode
// ============================================================================

#[test]
fn test_white_deny_wins_regardless_of_order() {
    let request = AccessRequest::new("logs/a", "read");
    let allow = Rule::allow("logs/*", "read").unwrap();
    let deny = Rule::deny("logs/*", "*").unwrap();

    let mut rules = vec![allow.clone(), allow.clone(), deny];
    for _ in 0..rules.len() {
        assert_eq!(evaluate(&rules, &request, Mode::White, &ctx()), Decision::Deny);
        rules.rotate_left(1);
    }
}

#[test]
fn test_white_broad_deny_beats_narrow_allow() {
    let rules = vec![
        Rule::allow("logs/public", "read").unwrap(),
        Rule::deny("**", "read").unwrap(),
    ];
    let verdict = explain(&rules, &AccessRequest::new("logs/public", "read"), Mode::White, &ctx());
    assert_eq!(verdict.decision, Decision::Deny);
    assert_eq!(verdict.matched_rule, Some(1));
}

// ============================================================================
// Black Mode
// ============================================================================

#[test]
fn test_black_specificity_ordering() {
    let rules = vec![
        Rule::deny("agent:id:*", "agent:restart").unwrap(),
        Rule::allow("agent:id:[1-5]", "agent:restart").unwrap(),
        Rule::deny("agent:id:3", "agent:restart").unwrap(),
    ];

    let decide = |id: &str| {
        evaluate(
            &rules,
            &AccessRequest::new(format!("agent:id:{}", id), "agent:restart"),
            Mode::Black,
            &ctx(),
        )
    };

    assert_eq!(decide("3"), Decision::Deny);
    assert_eq!(decide("4"), Decision::Allow);
    assert_eq!(decide("9"), Decision::Deny);
}

#[test]
fn test_black_tie_denies() {
    let rules = vec![
        Rule::allow("agent:id:*", "agent:read").unwrap(),
        Rule::deny("agent:*:7", "agent:read").unwrap(),
    ];
    let request = AccessRequest::new("agent:id:7", "agent:read");
    assert_eq!(rules[0].specificity(), rules[1].specificity());
    assert_eq!(evaluate(&rules, &request, Mode::Black, &ctx()), Decision::Deny);
}

// ============================================================================
// Patterns
// ============================================================================

#[test]
fn test_malformed_patterns_rejected() {
    for bad in ["", "logs//a", "lo*gs", "agent:[5-1]", "agent:[a-b]", "**:logs"] {
        let err = Pattern::parse(bad).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError, "pattern {:?}", bad);
    }
}

#[test]
fn test_rest_wildcard_needs_a_segment() {
    let pattern = Pattern::parse("logs/**").unwrap();
    assert!(pattern.matches(&SegmentPath::new("logs/a/b/c")));
    assert!(!pattern.matches(&SegmentPath::new("logs")));
}

#[test]
fn test_range_is_numeric() {
    let pattern = Pattern::parse("agent:[2-10]").unwrap();
    assert!(pattern.matches(&SegmentPath::new("agent:10")));
    assert!(!pattern.matches(&SegmentPath::new("agent:11")));
    assert!(!pattern.matches(&SegmentPath::new("agent:abc")));
}

#[test]
fn test_range_rejects_signed_numbers() {
    let pattern = Pattern::parse("agent:[1-50]").unwrap();
    assert!(pattern.matches(&SegmentPath::new("agent:5")));
    assert!(!pattern.matches(&SegmentPath::new("agent:+5")));
    assert!(Pattern::parse("agent:[+1-5]").is_err());
}
