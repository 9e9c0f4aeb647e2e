use redis::{Client, Script};

use crate::redis_tenant_registry::TENANTS_KEY;
use crate::sequence_store::{SequenceKey, SequenceStore, StoreError, SEEDED_NEXT_VALUE};

// Returns the stored value before INCR, or nil when the record is absent.
const INCREMENT_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return redis.call('INCR', KEYS[1]) - 1
end
return false
";

// -1: tenant missing, 0: record already exists, 1: created.
const INSERT_SCRIPT: &str = r"
if redis.call('HEXISTS', KEYS[2], ARGV[1]) == 0 then
    return -1
end
if redis.call('SETNX', KEYS[1], ARGV[2]) == 0 then
    return 0
end
return 1
";

pub struct RedisSequenceStore {
    redis_client: Client,
    increment_script: Script,
    insert_script: Script,
}

impl RedisSequenceStore {
    pub fn new(redis_url: &str) -> Result<Self, StoreError> {
        let redis_client = Client::open(redis_url)
            .map_err(|e| StoreError::Backend(format!("Failed to connect to Redis: {}", e)))?;
        Ok(RedisSequenceStore {
            redis_client,
            increment_script: Script::new(INCREMENT_SCRIPT),
            insert_script: Script::new(INSERT_SCRIPT),
        })
    }

    pub fn counter_key(key: &SequenceKey) -> String {
        format!("seq:{}:{}:{}", key.tenant_id, key.year, key.category)
    }
}

impl SequenceStore for RedisSequenceStore {
    fn increment(&self, key: &SequenceKey) -> Result<Option<i64>, StoreError> {
        let mut conn = self.redis_client.get_connection()?;
        let value: Option<i64> = self
            .increment_script
            .key(Self::counter_key(key))
            .invoke(&mut conn)?;
        Ok(value)
    }

    fn insert_seeded(&self, key: &SequenceKey) -> Result<(), StoreError> {
        let mut conn = self.redis_client.get_connection()?;
        let outcome: i64 = self
            .insert_script
            .key(Self::counter_key(key))
            .key(TENANTS_KEY)
            .arg(key.tenant_id.0)
            .arg(SEEDED_NEXT_VALUE)
            .invoke(&mut conn)?;
        match outcome {
            1 => Ok(()),
            0 => Err(StoreError::UniqueViolation(*key)),
            -1 => Err(StoreError::ForeignKeyViolation(key.tenant_id)),
            other => Err(StoreError::Backend(format!(
                "unexpected insert script result {} for {}",
                other, key
            ))),
        }
    }

    fn peek(&self, key: &SequenceKey) -> Result<Option<i64>, StoreError> {
        let mut conn = self.redis_client.get_connection()?;
        let value: Option<i64> = redis::cmd("GET")
            .arg(Self::counter_key(key))
            .query(&mut conn)?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redis_tenant_registry::RedisTenantRegistry;
    use crate::sequence_store::SequenceCategory;
    use crate::tenant_registry::{Tenant, TenantId, TenantRegistry};

    const REDIS_URL: &str = "redis://127.0.0.1/";

    fn clear(key: &SequenceKey) {
        let client = Client::open(REDIS_URL).unwrap();
        let mut conn = client.get_connection().unwrap();
        let _: () = redis::cmd("DEL")
            .arg(RedisSequenceStore::counter_key(key))
            .query(&mut conn)
            .unwrap();
    }

    #[test]
    fn counter_key_layout() {
        let key = SequenceKey::new(TenantId(7), 2025, SequenceCategory::Invoice);
        assert_eq!(RedisSequenceStore::counter_key(&key), "seq:7:2025:INVOICE");
    }

    #[test]
    #[ignore = "requires a running redis server"]
    fn test_insert_then_increment() {
        let registry = RedisTenantRegistry::new(REDIS_URL).unwrap();
        registry
            .register_tenant(Tenant { id: TenantId(910_001), name: "Sabana".to_string() })
            .unwrap();
        let store = RedisSequenceStore::new(REDIS_URL).unwrap();
        let key = SequenceKey::new(TenantId(910_001), 2025, SequenceCategory::Discharge);
        clear(&key);

        assert_eq!(store.increment(&key).unwrap(), None);
        store.insert_seeded(&key).unwrap();
        assert!(matches!(store.insert_seeded(&key), Err(StoreError::UniqueViolation(_))));
        assert_eq!(store.increment(&key).unwrap(), Some(2));
        assert_eq!(store.peek(&key).unwrap(), Some(3));

        clear(&key);
    }

    #[test]
    #[ignore = "requires a running redis server"]
    fn test_insert_for_unknown_tenant() {
        let store = RedisSequenceStore::new(REDIS_URL).unwrap();
        let key = SequenceKey::new(TenantId(910_404), 2025, SequenceCategory::Invoice);

        assert!(matches!(
            store.insert_seeded(&key),
            Err(StoreError::ForeignKeyViolation(TenantId(910_404)))
        ));
        assert_eq!(store.peek(&key).unwrap(), None);
    }
}
