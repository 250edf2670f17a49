//! Metric names and descriptions.
//!
//! Counters are emitted through the `metrics` facade at the call sites; the
//! embedding process installs whichever recorder it exports with.

use metrics::describe_counter;

pub const DECISIONS_TOTAL: &str = "warden_decisions_total";
pub const REVOCATIONS_TOTAL: &str = "warden_revocations_total";
pub const CONFIG_UPDATES_TOTAL: &str = "warden_config_updates_total";
pub const CHANGES_TOTAL: &str = "warden_changes_total";
pub const ERRORS_TOTAL: &str = "warden_errors_total";

/// Register all metric descriptions with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(
        DECISIONS_TOTAL,
        "Authorization decisions by mode and outcome"
    );
    describe_counter!(
        REVOCATIONS_TOTAL,
        "Revocation records raised, by scope (user or global)"
    );
    describe_counter!(
        CONFIG_UPDATES_TOTAL,
        "Security configuration updates, by whether they required revocation"
    );
    describe_counter!(CHANGES_TOTAL, "Role, policy and link changes applied");
    describe_counter!(ERRORS_TOTAL, "Total number of errors by code");
}
