use actix_web::middleware::from_fn;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tenant_sequencer::api::{self, AppState};
use tenant_sequencer::config::{self, Args};
use tenant_sequencer::metrics::SequenceMetrics;
use tenant_sequencer::number_assembler::NumberAssembler;
use tenant_sequencer::numbering_rule::NumberingRules;
use tenant_sequencer::redis_sequence_store::RedisSequenceStore;
use tenant_sequencer::redis_tenant_registry::RedisTenantRegistry;
use tenant_sequencer::sequence_store::InMemorySequenceStore;
use tenant_sequencer::tenant_registry::InMemoryTenantRegistry;
use tenant_sequencer::{
    ConsecutiveSequenceService, SequenceCategory, SequenceStore, TenantId, TenantRegistry,
};

fn build_backend(args: &Args) -> Result<(Arc<dyn TenantRegistry>, Arc<dyn SequenceStore>)> {
    match &args.redis_url {
        Some(redis_url) => {
            info!("Using Redis backend at {}", redis_url);
            let tenants: Arc<dyn TenantRegistry> = Arc::new(
                RedisTenantRegistry::new(redis_url).context("Failed to connect to Redis")?,
            );
            let store: Arc<dyn SequenceStore> = Arc::new(
                RedisSequenceStore::new(redis_url).context("Failed to open Redis client")?,
            );
            Ok((tenants, store))
        }
        None => {
            info!("No Redis URL configured, keeping counters in memory");
            let registry = Arc::new(InMemoryTenantRegistry::new());
            let store: Arc<dyn SequenceStore> = Arc::new(InMemorySequenceStore::new(registry.clone()));
            let tenants: Arc<dyn TenantRegistry> = registry;
            Ok((tenants, store))
        }
    }
}

/// Fails startup on a numbering rule that could never produce a reference.
fn validate_rules(rules: &NumberingRules, assembler: &NumberAssembler) -> Result<()> {
    for category in SequenceCategory::ALL {
        let rule = rules.get(category);
        assembler
            .assemble_number(TenantId(1), 2000, &rule, 1)
            .with_context(|| format!("Invalid numbering format for {}: {}", category, rule.format))?;
    }
    Ok(())
}

#[actix_web::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tenant_sequencer=info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let rules = config::load_numbering_rules(args.config.as_deref())
        .context("Failed to load numbering rules")?;
    let assembler = NumberAssembler::new();
    validate_rules(&rules, &assembler)?;

    let (tenants, store) = build_backend(&args)?;
    let metrics = Arc::new(SequenceMetrics::new().context("Failed to register metrics")?);
    let sequences = ConsecutiveSequenceService::new(store).with_metrics(metrics.clone());

    let state = web::Data::new(AppState {
        tenants,
        sequences: Arc::new(sequences),
        rules,
        assembler,
        metrics,
    });

    info!("Starting tenant-sequencer on {}:{}", args.bind, args.port);

    HttpServer::new(move || {
        App::new()
            .wrap(from_fn(api::request_id))
            .app_data(state.clone())
            .configure(api::configure)
    })
    .bind((args.bind.as_str(), args.port))
    .with_context(|| format!("Failed to bind {}:{}", args.bind, args.port))?
    .run()
    .await
    .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}
