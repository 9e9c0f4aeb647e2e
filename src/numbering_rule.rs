use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::sequence_store::SequenceCategory;

/// How a raw sequence value becomes a human-facing reference number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberingRule {
    pub category: SequenceCategory,
    pub format: String,
    pub seq_length: u32,
}

impl NumberingRule {
    pub fn default_for(category: SequenceCategory) -> Self {
        match category {
            SequenceCategory::Discharge => NumberingRule {
                category,
                format: "VT-{year}-{SEQ}".to_string(),
                seq_length: 4,
            },
            SequenceCategory::Invoice => NumberingRule {
                category,
                format: "FAC-{tenant}-{year}-{SEQ}".to_string(),
                seq_length: 6,
            },
        }
    }
}

/// One rule per category; categories without an override use the default.
#[derive(Debug, Clone)]
pub struct NumberingRules {
    rules: BTreeMap<SequenceCategory, NumberingRule>,
}

impl Default for NumberingRules {
    fn default() -> Self {
        let rules = SequenceCategory::ALL
            .into_iter()
            .map(|category| (category, NumberingRule::default_for(category)))
            .collect();
        NumberingRules { rules }
    }
}

impl NumberingRules {
    pub fn set(&mut self, rule: NumberingRule) {
        self.rules.insert(rule.category, rule);
    }

    pub fn get(&self, category: SequenceCategory) -> NumberingRule {
        self.rules
            .get(&category)
            .cloned()
            .unwrap_or_else(|| NumberingRule::default_for(category))
    }
}
