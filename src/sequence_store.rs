use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::tenant_registry::{InMemoryTenantRegistry, TenantId};

/// Independent numbering spaces within one tenant and year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SequenceCategory {
    Discharge,
    Invoice,
}

impl SequenceCategory {
    pub const ALL: [SequenceCategory; 2] = [SequenceCategory::Discharge, SequenceCategory::Invoice];

    pub fn as_str(&self) -> &'static str {
        match self {
            SequenceCategory::Discharge => "DISCHARGE",
            SequenceCategory::Invoice => "INVOICE",
        }
    }
}

impl fmt::Display for SequenceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unknown sequence category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for SequenceCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SequenceCategory::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// Natural key of a counter record. At most one record exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequenceKey {
    pub tenant_id: TenantId,
    pub year: i32,
    pub category: SequenceCategory,
}

impl SequenceKey {
    pub fn new(tenant_id: TenantId, year: i32, category: SequenceCategory) -> Self {
        SequenceKey { tenant_id, year, category }
    }
}

impl fmt::Display for SequenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.tenant_id, self.year, self.category)
    }
}

/// Value stored in a freshly created record; the creating caller receives 1.
pub const SEEDED_NEXT_VALUE: i64 = 2;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Counter already exists: {0}")]
    UniqueViolation(SequenceKey),

    #[error("Tenant not found: {0}")]
    ForeignKeyViolation(TenantId),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Durable counter records. Each operation is atomic with respect to a
/// single key; nothing spans keys.
pub trait SequenceStore: Send + Sync {
    /// Returns the stored next value and persists it plus one, or `None`
    /// when no record exists for `key`.
    fn increment(&self, key: &SequenceKey) -> Result<Option<i64>, StoreError>;

    /// Creates the record for `key` holding [`SEEDED_NEXT_VALUE`].
    fn insert_seeded(&self, key: &SequenceKey) -> Result<(), StoreError>;

    /// Reads the stored next value without consuming it.
    fn peek(&self, key: &SequenceKey) -> Result<Option<i64>, StoreError>;
}

/// Counters kept in process memory.
///
/// The outer map is only locked long enough to find or create an entry;
/// each entry carries its own mutex, so increments on different keys do not
/// wait on each other.
pub struct InMemorySequenceStore {
    tenants: Arc<InMemoryTenantRegistry>,
    counters: Mutex<HashMap<SequenceKey, Arc<Mutex<i64>>>>,
}

impl InMemorySequenceStore {
    pub fn new(tenants: Arc<InMemoryTenantRegistry>) -> Self {
        InMemorySequenceStore {
            tenants,
            counters: Mutex::new(HashMap::new()),
        }
    }

    fn entry(&self, key: &SequenceKey) -> Result<Option<Arc<Mutex<i64>>>, StoreError> {
        let counters = self
            .counters
            .lock()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {}", e)))?;
        Ok(counters.get(key).cloned())
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        let counters = self
            .counters
            .lock()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {}", e)))?;
        Ok(counters.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

impl SequenceStore for InMemorySequenceStore {
    fn increment(&self, key: &SequenceKey) -> Result<Option<i64>, StoreError> {
        let Some(entry) = self.entry(key)? else {
            return Ok(None);
        };
        let mut next_value = entry
            .lock()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {}", e)))?;
        let value = *next_value;
        *next_value = value
            .checked_add(1)
            .ok_or_else(|| StoreError::Backend(format!("counter overflow: {}", key)))?;
        Ok(Some(value))
    }

    fn insert_seeded(&self, key: &SequenceKey) -> Result<(), StoreError> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {}", e)))?;
        if counters.contains_key(key) {
            return Err(StoreError::UniqueViolation(*key));
        }
        let tenant_exists = self
            .tenants
            .contains(key.tenant_id)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if !tenant_exists {
            return Err(StoreError::ForeignKeyViolation(key.tenant_id));
        }
        counters.insert(*key, Arc::new(Mutex::new(SEEDED_NEXT_VALUE)));
        Ok(())
    }

    fn peek(&self, key: &SequenceKey) -> Result<Option<i64>, StoreError> {
        match self.entry(key)? {
            Some(entry) => {
                let next_value = entry
                    .lock()
                    .map_err(|e| StoreError::Backend(format!("lock poisoned: {}", e)))?;
                Ok(Some(*next_value))
            }
            None => Ok(None),
        }
    }
}
