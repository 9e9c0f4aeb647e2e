use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::sequence_store::SequenceCategory;

/// Prometheus counters for the sequence service.
pub struct SequenceMetrics {
    registry: Registry,
    values_issued: IntCounterVec,
    counters_created: IntCounterVec,
    creation_races: IntCounter,
    errors: IntCounterVec,
}

impl SequenceMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let values_issued = IntCounterVec::new(
            Opts::new("sequence_values_issued_total", "Sequence values handed out"),
            &["category"],
        )?;
        let counters_created = IntCounterVec::new(
            Opts::new("sequence_counters_created_total", "Counter records created"),
            &["category"],
        )?;
        let creation_races = IntCounter::new(
            "sequence_creation_races_total",
            "Counter inserts that lost to a concurrent creator",
        )?;
        let errors = IntCounterVec::new(
            Opts::new("sequence_errors_total", "Failed sequence requests"),
            &["kind"],
        )?;

        registry.register(Box::new(values_issued.clone()))?;
        registry.register(Box::new(counters_created.clone()))?;
        registry.register(Box::new(creation_races.clone()))?;
        registry.register(Box::new(errors.clone()))?;

        Ok(SequenceMetrics {
            registry,
            values_issued,
            counters_created,
            creation_races,
            errors,
        })
    }

    pub fn record_issued(&self, category: SequenceCategory) {
        self.values_issued.with_label_values(&[category.as_str()]).inc();
    }

    pub fn record_created(&self, category: SequenceCategory) {
        self.counters_created.with_label_values(&[category.as_str()]).inc();
    }

    pub fn record_race(&self) {
        self.creation_races.inc();
    }

    pub fn record_error(&self, kind: &str) {
        self.errors.with_label_values(&[kind]).inc();
    }

    pub fn issued(&self, category: SequenceCategory) -> u64 {
        self.values_issued.with_label_values(&[category.as_str()]).get()
    }

    pub fn races(&self) -> u64 {
        self.creation_races.get()
    }

    pub fn errors(&self, kind: &str) -> u64 {
        self.errors.with_label_values(&[kind]).get()
    }

    /// Renders every registered metric in the Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
