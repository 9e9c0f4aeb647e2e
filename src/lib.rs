pub mod api;
pub mod config;
pub mod metrics;
pub mod number_assembler;
pub mod numbering_rule;
pub mod redis_sequence_store;
pub mod redis_tenant_registry;
pub mod sequence_generator;
pub mod sequence_store;
pub mod tenant_registry;

pub use sequence_generator::{ConsecutiveSequenceService, SequenceError, SequenceGenerator};
pub use sequence_store::{SequenceCategory, SequenceKey, SequenceStore, StoreError};
pub use tenant_registry::{Tenant, TenantId, TenantRegistry};
