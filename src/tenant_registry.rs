use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use thiserror::Error;

/// Identifier of a tenant (corporation). Every counter belongs to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub u64);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

pub trait TenantRegistry: Send + Sync {
    /// Inserts the tenant, replacing any previous record with the same id.
    fn register_tenant(&self, tenant: Tenant) -> Result<(), RegistryError>;
    fn get_tenant(&self, id: TenantId) -> Result<Option<Tenant>, RegistryError>;
}

#[derive(Default)]
pub struct InMemoryTenantRegistry {
    tenants: RwLock<HashMap<TenantId, Tenant>>,
}

impl InMemoryTenantRegistry {
    pub fn new() -> Self {
        InMemoryTenantRegistry {
            tenants: RwLock::new(HashMap::new()),
        }
    }

    pub fn contains(&self, id: TenantId) -> Result<bool, RegistryError> {
        let tenants = self
            .tenants
            .read()
            .map_err(|e| RegistryError::LockPoisoned(e.to_string()))?;
        Ok(tenants.contains_key(&id))
    }
}

impl TenantRegistry for InMemoryTenantRegistry {
    fn register_tenant(&self, tenant: Tenant) -> Result<(), RegistryError> {
        let mut tenants = self
            .tenants
            .write()
            .map_err(|e| RegistryError::LockPoisoned(e.to_string()))?;
        tenants.insert(tenant.id, tenant);
        Ok(())
    }

    fn get_tenant(&self, id: TenantId) -> Result<Option<Tenant>, RegistryError> {
        let tenants = self
            .tenants
            .read()
            .map_err(|e| RegistryError::LockPoisoned(e.to_string()))?;
        Ok(tenants.get(&id).cloned())
    }
}
