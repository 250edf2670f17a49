//! Token invalidation tracking.
//!
//! Each user may carry a cutoff instant: tokens issued before it are no
//! longer accepted. A global cutoff applies the same rule to every user and
//! is raised when a security configuration change invalidates all
//! outstanding decisions. Cutoffs only ever move forward.

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Result, WardenError};
use crate::rbac::UserId;
use crate::store::{ReadTx, WriteTx};
use crate::telemetry::metrics::REVOCATIONS_TOTAL;

/// Per-user cutoff: tokens issued before `not_before` are invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationRecord {
    pub user_id: UserId,
    pub not_before: DateTime<Utc>,
}

/// Check a token's issue time against the applicable cutoffs.
pub fn token_valid(
    issued_at: DateTime<Utc>,
    user_cutoff: Option<DateTime<Utc>>,
    global_cutoff: Option<DateTime<Utc>>,
) -> bool {
    [user_cutoff, global_cutoff]
        .into_iter()
        .flatten()
        .all(|cutoff| issued_at >= cutoff)
}

/// Records and answers token revocation state through a unit-of-work.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenInvalidationTracker;

impl TokenInvalidationTracker {
    pub fn new() -> Self {
        Self
    }

    /// Raise the cutoff of every listed user to at least `as_of`.
    pub async fn mark_invalid<T: WriteTx + ?Sized>(
        &self,
        tx: &mut T,
        users: &BTreeSet<UserId>,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<RevocationRecord>> {
        let mut records = Vec::with_capacity(users.len());
        for user_id in users {
            let record = tx.raise_revocation(*user_id, as_of).await?;
            debug!(user_id = %user_id, not_before = %record.not_before, "User tokens revoked");
            records.push(record);
        }
        counter!(REVOCATIONS_TOTAL, "scope" => "user").increment(records.len() as u64);
        Ok(records)
    }

    /// Raise the global cutoff to at least `as_of`.
    pub async fn mark_all_invalid<T: WriteTx + ?Sized>(
        &self,
        tx: &mut T,
        as_of: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let cutoff = tx.raise_global_revocation(as_of).await?;
        counter!(REVOCATIONS_TOTAL, "scope" => "global").increment(1);
        info!(not_before = %cutoff, "All issued tokens revoked");
        Ok(cutoff)
    }

    /// Whether a token issued to `user_id` at `issued_at` is still accepted.
    pub async fn is_token_valid<T: ReadTx + ?Sized>(
        &self,
        tx: &mut T,
        user_id: UserId,
        issued_at: DateTime<Utc>,
    ) -> Result<bool> {
        let user_cutoff = tx.revocation(user_id).await?.map(|r| r.not_before);
        let global_cutoff = tx.global_revocation().await?;
        Ok(token_valid(issued_at, user_cutoff, global_cutoff))
    }

    /// Drop user records that can no longer reject any unexpired token.
    ///
    /// A record older than `now - token_lifetime` only rejects tokens that
    /// have expired on their own.
    pub async fn prune<T: WriteTx + ?Sized>(
        &self,
        tx: &mut T,
        now: DateTime<Utc>,
        token_lifetime: Duration,
    ) -> Result<u64> {
        let out_of_range = || {
            WardenError::validation(format!(
                "Token lifetime out of range: {}s",
                token_lifetime.as_secs()
            ))
        };
        let lifetime = chrono::Duration::from_std(token_lifetime).map_err(|_| out_of_range())?;
        let before = now.checked_sub_signed(lifetime).ok_or_else(out_of_range)?;
        let removed = tx.prune_revocations(before).await?;
        if removed > 0 {
            debug!(removed, "Expired revocation records pruned");
        }
        Ok(removed)
    }
}
