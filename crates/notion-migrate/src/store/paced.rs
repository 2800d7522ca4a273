//! Call pacing and rate-limit retries.

use std::thread;
use std::time::Duration;
use tracing::warn;

use super::{Fields, RecordFilter, RecordStore, StoreError, StoredRecord};
use crate::config::PacingConfig;

/// Wraps a store so every call is followed by the configured delay and
/// rate-limited calls are retried with exponential backoff.
///
/// When retries run out the last `RateLimited` error is returned, which
/// callers treat as a failure of that one item.
#[derive(Debug, Clone)]
pub struct PacedStore<S> {
    inner: S,
    pacing: PacingConfig,
}

impl<S: RecordStore> PacedStore<S> {
    pub fn new(inner: S, pacing: PacingConfig) -> Self {
        Self { inner, pacing }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Wait before retry number `attempt` (1-based). A server-provided
    /// `Retry-After` wins over the computed backoff.
    pub fn backoff_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or_else(|| {
            let factor = 1u32 << attempt.saturating_sub(1).min(16);
            self.pacing.backoff.saturating_mul(factor)
        })
    }

    fn call<T>(&self, mut op: impl FnMut(&S) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = op(&self.inner);
            pause(self.pacing.delay);
            match result {
                Err(StoreError::RateLimited { retry_after })
                    if attempt < self.pacing.max_attempts =>
                {
                    let wait = self.backoff_for(attempt, retry_after);
                    warn!(
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        "rate limited, backing off"
                    );
                    pause(wait);
                }
                other => return other,
            }
        }
    }
}

fn pause(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}

impl<S: RecordStore> RecordStore for PacedStore<S> {
    fn create_record(&self, table: &str, fields: Fields) -> Result<StoredRecord, StoreError> {
        self.call(|store| store.create_record(table, fields.clone()))
    }

    fn update_record(
        &self,
        table: &str,
        record_id: &str,
        fields: Fields,
    ) -> Result<StoredRecord, StoreError> {
        self.call(|store| store.update_record(table, record_id, fields.clone()))
    }

    fn find_records(
        &self,
        table: &str,
        filter: &RecordFilter,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        self.call(|store| store.find_records(table, filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn paced(store: &InMemoryStore, max_attempts: u32) -> PacedStore<InMemoryStore> {
        PacedStore::new(
            store.clone(),
            PacingConfig {
                max_attempts,
                ..PacingConfig::immediate()
            },
        )
    }

    #[test]
    fn test_retries_rate_limit_then_succeeds() {
        let store = InMemoryStore::new();
        store.rate_limit_next(2);
        let record = paced(&store, 5).create_record("ASSET", Fields::new()).unwrap();
        assert_eq!(record.id, "rec000001");
        assert_eq!(store.call_count(), 3);
    }

    #[test]
    fn test_exhausted_retries_return_rate_limit() {
        let store = InMemoryStore::new();
        store.rate_limit_next(10);
        let err = paced(&store, 3).create_record("ASSET", Fields::new()).unwrap_err();
        assert_eq!(err, StoreError::RateLimited { retry_after: None });
        assert_eq!(store.call_count(), 3);
        assert!(store.records("ASSET").is_empty());
    }

    #[test]
    fn test_other_errors_are_not_retried() {
        let store = InMemoryStore::new().with_computed_field("Caption");
        let mut fields = Fields::new();
        fields.insert("Caption".into(), "x".into());
        let err = paced(&store, 5).create_record("ASSET", fields).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(store.call_count(), 1);
    }

    #[test]
    fn test_backoff_doubles_and_honors_retry_after() {
        let paced = PacedStore::new(InMemoryStore::new(), PacingConfig::default());
        assert_eq!(paced.backoff_for(1, None), Duration::from_secs(1));
        assert_eq!(paced.backoff_for(2, None), Duration::from_secs(2));
        assert_eq!(paced.backoff_for(4, None), Duration::from_secs(8));
        assert_eq!(
            paced.backoff_for(3, Some(Duration::from_secs(30))),
            Duration::from_secs(30)
        );
    }
}
