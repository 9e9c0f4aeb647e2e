use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::metrics::SequenceMetrics;
use crate::sequence_store::{SequenceCategory, SequenceKey, SequenceStore, StoreError};
use crate::tenant_registry::TenantId;

pub trait SequenceGenerator: Send + Sync {
    /// Hands out the next consecutive value for the triple, starting at 1.
    fn next_value(
        &self,
        tenant_id: TenantId,
        year: i32,
        category: SequenceCategory,
    ) -> Result<i64, SequenceError>;

    /// The value the next call to [`SequenceGenerator::next_value`] would return.
    fn peek_next(
        &self,
        tenant_id: TenantId,
        year: i32,
        category: SequenceCategory,
    ) -> Result<i64, SequenceError>;
}

#[derive(Error, Debug)]
pub enum SequenceError {
    #[error("Tenant not found: {0}")]
    ReferenceNotFound(TenantId),

    #[error("Concurrency conflict on counter {0}")]
    ConcurrencyConflict(SequenceKey),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl SequenceError {
    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SequenceError::ReferenceNotFound(_) => "reference_not_found",
            SequenceError::ConcurrencyConflict(_) => "concurrency_conflict",
            SequenceError::Storage(_) => "storage",
        }
    }
}

/// Consecutive numbering per (tenant, year, category).
///
/// Creation is optimistic: a missing record is inserted without locking and
/// a unique violation on that insert means another caller created it first,
/// in which case the increment is retried once.
pub struct ConsecutiveSequenceService {
    store: Arc<dyn SequenceStore>,
    metrics: Option<Arc<SequenceMetrics>>,
}

impl ConsecutiveSequenceService {
    pub fn new(store: Arc<dyn SequenceStore>) -> Self {
        ConsecutiveSequenceService { store, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Arc<SequenceMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn next_for_key(&self, key: &SequenceKey) -> Result<i64, SequenceError> {
        if let Some(value) = self.store.increment(key)? {
            return Ok(value);
        }

        match self.store.insert_seeded(key) {
            Ok(()) => {
                info!(counter = %key, "created sequence counter");
                if let Some(metrics) = &self.metrics {
                    metrics.record_created(key.category);
                }
                Ok(1)
            }
            Err(StoreError::UniqueViolation(_)) => {
                debug!(counter = %key, "lost counter creation race, retrying increment");
                if let Some(metrics) = &self.metrics {
                    metrics.record_race();
                }
                self.store
                    .increment(key)?
                    .ok_or(SequenceError::ConcurrencyConflict(*key))
            }
            Err(StoreError::ForeignKeyViolation(tenant_id)) => {
                Err(SequenceError::ReferenceNotFound(tenant_id))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl SequenceGenerator for ConsecutiveSequenceService {
    fn next_value(
        &self,
        tenant_id: TenantId,
        year: i32,
        category: SequenceCategory,
    ) -> Result<i64, SequenceError> {
        let key = SequenceKey::new(tenant_id, year, category);
        let result = self.next_for_key(&key);
        match &result {
            Ok(value) => {
                debug!(counter = %key, value, "issued sequence value");
                if let Some(metrics) = &self.metrics {
                    metrics.record_issued(category);
                }
            }
            Err(e) => {
                warn!(counter = %key, error = %e, "sequence request failed");
                if let Some(metrics) = &self.metrics {
                    metrics.record_error(e.kind());
                }
            }
        }
        result
    }

    fn peek_next(
        &self,
        tenant_id: TenantId,
        year: i32,
        category: SequenceCategory,
    ) -> Result<i64, SequenceError> {
        let key = SequenceKey::new(tenant_id, year, category);
        Ok(self.store.peek(&key)?.unwrap_or(1))
    }
}
