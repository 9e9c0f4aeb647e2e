use regex::Regex;
use thiserror::Error;

use crate::numbering_rule::NumberingRule;
use crate::tenant_registry::TenantId;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AssembleError {
    #[error("Unknown placeholder in format: {0}")]
    UnknownPlaceholder(String),

    #[error("Invalid sequence width: {0}")]
    InvalidWidth(String),
}

/// Expands `{tenant}`, `{year}`, `{category}`, `{SEQ}` and `{SEQ:n}` in a
/// numbering rule's format.
pub struct NumberAssembler {
    placeholder: Regex,
}

impl Default for NumberAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl NumberAssembler {
    pub fn new() -> Self {
        NumberAssembler {
            placeholder: Regex::new(r"\{([A-Za-z0-9_]+)(?::(\d+))?\}")
                .expect("placeholder pattern is a valid regex"),
        }
    }

    pub fn assemble_number(
        &self,
        tenant_id: TenantId,
        year: i32,
        rule: &NumberingRule,
        sequence: i64,
    ) -> Result<String, AssembleError> {
        let mut formatted = String::with_capacity(rule.format.len() + 8);
        let mut last = 0;

        for capture in self.placeholder.captures_iter(&rule.format) {
            let Some(full_match) = capture.get(0) else {
                continue;
            };
            formatted.push_str(&rule.format[last..full_match.start()]);
            last = full_match.end();

            let name = capture.get(1).map_or("", |m| m.as_str());
            let width = capture.get(2).map(|m| m.as_str());
            let value = match (name, width) {
                ("tenant", None) => tenant_id.to_string(),
                ("year", None) => year.to_string(),
                ("category", None) => rule.category.to_string(),
                ("SEQ", None) => pad(sequence, rule.seq_length as usize),
                ("SEQ", Some(width)) => {
                    let width = width
                        .parse::<usize>()
                        .map_err(|_| AssembleError::InvalidWidth(width.to_string()))?;
                    pad(sequence, width)
                }
                _ => return Err(AssembleError::UnknownPlaceholder(full_match.as_str().to_string())),
            };
            formatted.push_str(&value);
        }
        formatted.push_str(&rule.format[last..]);

        Ok(formatted)
    }
}

fn pad(sequence: i64, width: usize) -> String {
    format!("{:0width$}", sequence, width = width)
}
