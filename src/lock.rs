//! Advisory record locking for evaluators.
//!
//! A lock is three fields on the record itself: an opaque token, an
//! absolute expiry and the holder's display name. Expiry, not an unlock
//! sweep, is what reclaims locks abandoned mid-review. The guarantee is
//! cooperative and not linearizable: the Postgres backend checks the
//! precondition inside the UPDATE itself, the file backends re-check it
//! under read-modify-write.

use chrono::{DateTime, Duration, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::{AwardsError, Result};
use crate::models::LockState;
use crate::store::{FieldUpdates, RecordKey, RecordStore, WriteGuard};

/// How long an evaluator may sit on a record before the lock lapses.
pub const DEFAULT_TTL_SECS: i64 = 120;

#[derive(Debug, Clone)]
pub struct LockGrant {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub holder: String,
}

/// Tries to take the lock on one record. Returns `None` when somebody else
/// holds an unexpired lock; an expired lock counts as released and is
/// overwritten. Every acquisition mints a fresh 128-bit random token.
pub async fn acquire(
    store: &dyn RecordStore,
    key: &RecordKey,
    holder: &str,
    ttl_secs: i64,
) -> Result<Option<LockGrant>> {
    let now = Utc::now();
    let token = Uuid::new_v4().simple().to_string();
    let expires_at = now + Duration::seconds(ttl_secs.max(1));

    let lock = LockState {
        token: token.clone(),
        expires_at: Some(expires_at),
        holder: holder.to_string(),
    };
    let updates = FieldUpdates {
        lock: Some(lock),
        ..Default::default()
    };

    if store.apply(key, updates, WriteGuard::Free(now)).await? {
        info!(key = %key, holder, %expires_at, "lock acquired");
        return Ok(Some(LockGrant {
            token,
            expires_at,
            holder: holder.to_string(),
        }));
    }

    // Either the record is missing or a live lock is in the way.
    match store.find(key).await? {
        None => Err(AwardsError::NotFound(format!("no submission for {key}"))),
        Some(record) => {
            info!(key = %key, current_holder = %record.lock.holder, "lock busy");
            Ok(None)
        }
    }
}

/// Releases the lock, but only for its rightful holder: the stored token
/// must equal `token` exactly. Returns false without touching the record
/// otherwise; this is not a forced unlock.
pub async fn release(store: &dyn RecordStore, key: &RecordKey, token: &str) -> Result<bool> {
    if token.is_empty() {
        return Ok(false);
    }
    let updates = FieldUpdates {
        lock: Some(LockState::default()),
        ..Default::default()
    };
    let released = store
        .apply(key, updates, WriteGuard::HeldBy(token.to_string()))
        .await?;
    if released {
        info!(key = %key, "lock released");
    }
    Ok(released)
}

/// Applies review-field updates under the lock: the write lands only when
/// the stored token is empty or matches `token`, and nothing is mutated on
/// a mismatch.
pub async fn update_with_lock(
    store: &dyn RecordStore,
    key: &RecordKey,
    token: &str,
    updates: FieldUpdates,
) -> Result<bool> {
    store
        .apply(key, updates, WriteGuard::TokenOrFree(token.to_string()))
        .await
}
