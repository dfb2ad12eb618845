//! Fallback wrapper around the primary record store. Any primary error is
//! logged and the operation is retried against the local file store, so a
//! transient network failure never drops a submission or a vote. A failure
//! of the local store itself is terminal and surfaced to the caller.
//!
//! Records written during an outage live only in the local store until an
//! operator reconciles them; reads served from the fallback may therefore
//! trail the primary.

use async_trait::async_trait;
use tracing::warn;

use crate::error::Result;
use crate::local::LocalStore;
use crate::models::SubmissionRecord;
use crate::store::{FieldUpdates, RecordKey, RecordStore, WriteGuard};

pub struct FallbackStore<P: RecordStore> {
    primary: P,
    local: LocalStore,
}

impl<P: RecordStore> FallbackStore<P> {
    pub fn new(primary: P, local: LocalStore) -> Self {
        FallbackStore { primary, local }
    }
}

#[async_trait]
impl<P: RecordStore> RecordStore for FallbackStore<P> {
    async fn insert(&self, record: &SubmissionRecord) -> Result<()> {
        match self.primary.insert(record).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(error = %err, candidate = %record.candidate_name,
                    "primary record store failed on insert, writing to local fallback");
                self.local.insert(record).await
            }
        }
    }

    async fn find(&self, key: &RecordKey) -> Result<Option<SubmissionRecord>> {
        match self.primary.find(key).await {
            Ok(found) => Ok(found),
            Err(err) => {
                warn!(error = %err, key = %key,
                    "primary record store failed on find, reading local fallback");
                self.local.find(key).await
            }
        }
    }

    async fn list_all(&self) -> Result<Vec<SubmissionRecord>> {
        match self.primary.list_all().await {
            Ok(records) => Ok(records),
            Err(err) => {
                warn!(error = %err,
                    "primary record store failed on list, reading local fallback");
                self.local.list_all().await
            }
        }
    }

    async fn apply(
        &self,
        key: &RecordKey,
        updates: FieldUpdates,
        guard: WriteGuard,
    ) -> Result<bool> {
        match self
            .primary
            .apply(key, updates.clone(), guard.clone())
            .await
        {
            Ok(applied) => Ok(applied),
            Err(err) => {
                warn!(error = %err, key = %key,
                    "primary record store failed on update, applying to local fallback");
                self.local.apply(key, updates, guard).await
            }
        }
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        match self.primary.get_setting(key).await {
            Ok(value) => Ok(value),
            Err(err) => {
                warn!(error = %err, key, "settings read failed, using local fallback");
                self.local.get_setting(key).await
            }
        }
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        match self.primary.set_setting(key, value).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(error = %err, key, "settings write failed, writing local fallback");
                self.local.set_setting(key, value).await
            }
        }
    }
}
