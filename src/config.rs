//! Command-line, environment and file configuration.
//!
//! Flags fall back to `SEQUENCER_*` environment variables. Numbering rules
//! come from an optional TOML file:
//!
//! ```toml
//! [numbering.invoice]
//! format = "FAC-{year}-{SEQ}"
//! seq_length = 5
//! ```

use clap::Parser;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::numbering_rule::{NumberingRule, NumberingRules};
use crate::sequence_store::SequenceCategory;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid numbering rule for {category}: {reason}")]
    InvalidRule { category: String, reason: String },
}

#[derive(Parser, Debug, Clone)]
#[command(name = "tenant-sequencer")]
#[command(about = "Consecutive numbering service per tenant, year and category")]
#[command(version)]
pub struct Args {
    /// Address to bind the HTTP server to
    #[arg(long, default_value = "0.0.0.0", env = "SEQUENCER_BIND")]
    pub bind: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8080, env = "SEQUENCER_PORT")]
    pub port: u16,

    /// Redis URL; counters are kept in memory when absent
    #[arg(long, env = "SEQUENCER_REDIS_URL")]
    pub redis_url: Option<String>,

    /// TOML file with numbering rule overrides
    #[arg(short, long, env = "SEQUENCER_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    numbering: HashMap<String, RuleOverride>,
}

#[derive(Debug, Deserialize)]
struct RuleOverride {
    format: String,
    seq_length: Option<u32>,
}

pub fn load_numbering_rules(path: Option<&Path>) -> Result<NumberingRules, ConfigError> {
    let mut rules = NumberingRules::default();
    let Some(path) = path else {
        return Ok(rules);
    };

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: FileConfig = toml::from_str(&content)?;

    for (name, rule) in file.numbering {
        let category: SequenceCategory = name.parse().map_err(|_| ConfigError::InvalidRule {
            category: name.clone(),
            reason: "unknown category".to_string(),
        })?;
        if rule.format.is_empty() {
            return Err(ConfigError::InvalidRule {
                category: name,
                reason: "format must not be empty".to_string(),
            });
        }
        let seq_length = rule
            .seq_length
            .unwrap_or_else(|| NumberingRule::default_for(category).seq_length);
        rules.set(NumberingRule {
            category,
            format: rule.format,
            seq_length,
        });
    }

    Ok(rules)
}
