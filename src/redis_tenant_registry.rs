use redis::{Client, Commands};
use tracing::debug;

use crate::tenant_registry::{RegistryError, Tenant, TenantId, TenantRegistry};

/// Hash holding one JSON-encoded tenant per field, keyed by tenant id.
/// The Redis sequence store checks this hash before seeding a counter.
pub const TENANTS_KEY: &str = "tenants";

#[derive(Clone, Debug)]
pub struct RedisTenantRegistry {
    client: Client,
}

impl RedisTenantRegistry {
    pub fn new(redis_url: &str) -> Result<Self, RegistryError> {
        let client = Client::open(redis_url)?;
        client.get_connection()?;
        Ok(RedisTenantRegistry { client })
    }
}

impl TenantRegistry for RedisTenantRegistry {
    fn register_tenant(&self, tenant: Tenant) -> Result<(), RegistryError> {
        let mut conn = self.client.get_connection()?;
        let value = serde_json::to_string(&tenant)?;
        let _: () = conn.hset(TENANTS_KEY, tenant.id.0, value)?;
        debug!(tenant_id = %tenant.id, "registered tenant");
        Ok(())
    }

    fn get_tenant(&self, id: TenantId) -> Result<Option<Tenant>, RegistryError> {
        let mut conn = self.client.get_connection()?;
        let result: Option<String> = conn.hget(TENANTS_KEY, id.0)?;
        match result {
            Some(value) => Ok(Some(serde_json::from_str(&value)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REDIS_URL: &str = "redis://127.0.0.1/";

    #[test]
    #[ignore = "requires a running redis server"]
    fn test_register_and_get_tenant() -> Result<(), Box<dyn std::error::Error>> {
        let registry = RedisTenantRegistry::new(REDIS_URL)?;
        let tenant = Tenant {
            id: TenantId(900_001),
            name: "Cuenca Alta".to_string(),
        };

        registry.register_tenant(tenant.clone())?;
        assert_eq!(registry.get_tenant(tenant.id)?, Some(tenant.clone()));

        let mut conn = registry.client.get_connection()?;
        let _: () = conn.hdel(TENANTS_KEY, tenant.id.0)?;
        Ok(())
    }

    #[test]
    #[ignore = "requires a running redis server"]
    fn test_get_unknown_tenant() -> Result<(), Box<dyn std::error::Error>> {
        let registry = RedisTenantRegistry::new(REDIS_URL)?;
        assert!(registry.get_tenant(TenantId(900_404))?.is_none());
        Ok(())
    }

    #[test]
    fn test_redis_connection_error() {
        let result = RedisTenantRegistry::new("redis://127.0.0.1:1234/");
        assert!(result.is_err());
    }
}
