//! Run-scoped flag identifier sequence
//!
//! Each pipeline execution owns one [`FlagSequence`] and lends it to every
//! checker, so identifiers restart at `001` for every run and two runs in
//! the same process never observe each other's counters.

use super::flag::{Category, Finding, Flag, Severity};
use std::collections::HashMap;

/// Identifier prefixes, one per checker family
pub mod prefix {
    pub const SCHEMA: &str = "SCHEMA";
    pub const ARITHMETIC: &str = "ARITH";
    pub const RANGE: &str = "RANGE";
    pub const CROSS_METRIC: &str = "CROSS";
    pub const MSK: &str = "MSK";
    pub const ONCOLOGY: &str = "ONC";
}

/// Monotonic per-prefix counters for one validation run
#[derive(Debug, Default, Clone)]
pub struct FlagSequence {
    counters: HashMap<&'static str, u32>,
}

impl FlagSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next identifier for `prefix`, e.g. `ARITH-004`.
    pub fn next_id(&mut self, prefix: &'static str) -> String {
        let counter = self.counters.entry(prefix).or_insert(0);
        *counter += 1;
        format!("{}-{:03}", prefix, counter)
    }

    /// Number of identifiers issued so far for `prefix`
    pub fn issued(&self, prefix: &str) -> u32 {
        self.counters.get(prefix).copied().unwrap_or(0)
    }

    /// Restart every counter at zero.
    pub fn reset(&mut self) {
        self.counters.clear();
    }

    /// Borrow the sequence as an emitter for one checker invocation.
    pub fn emitter<'a>(
        &'a mut self,
        prefix: &'static str,
        category: Category,
        contract_id: &'a str,
    ) -> FlagEmitter<'a> {
        FlagEmitter {
            sequence: self,
            prefix,
            category,
            contract_id,
            flags: Vec::new(),
        }
    }
}

/// Collects flags for one checker, stamping id, category and contract
pub struct FlagEmitter<'a> {
    sequence: &'a mut FlagSequence,
    prefix: &'static str,
    category: Category,
    contract_id: &'a str,
    flags: Vec<Flag>,
}

impl<'a> FlagEmitter<'a> {
    pub fn emit(&mut self, severity: Severity, finding: Finding) {
        let flag = Flag {
            flag_id: self.sequence.next_id(self.prefix),
            severity,
            category: self.category,
            metric_name: finding.metric_name,
            metric_value: finding.metric_value,
            expected_value: finding.expected_value,
            episode_type: finding.episode_type,
            contract_id: self.contract_id.to_string(),
            description: finding.description,
            detail: finding.detail,
            related_metrics: finding.related_metrics,
        };
        self.flags.push(flag);
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn contract_id(&self) -> &str {
        self.contract_id
    }

    pub fn finish(self) -> Vec<Flag> {
        self.flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_zero_padded_and_per_prefix() {
        let mut seq = FlagSequence::new();
        assert_eq!(seq.next_id(prefix::ARITHMETIC), "ARITH-001");
        assert_eq!(seq.next_id(prefix::ARITHMETIC), "ARITH-002");
        assert_eq!(seq.next_id(prefix::SCHEMA), "SCHEMA-001");
        assert_eq!(seq.issued(prefix::ARITHMETIC), 2);
        assert_eq!(seq.issued(prefix::RANGE), 0);
    }

    #[test]
    fn test_reset_restarts_numbering() {
        let mut seq = FlagSequence::new();
        seq.next_id(prefix::MSK);
        seq.next_id(prefix::MSK);
        seq.reset();
        assert_eq!(seq.next_id(prefix::MSK), "MSK-001");
    }

    #[test]
    fn test_independent_sequences_do_not_share_state() {
        let mut first = FlagSequence::new();
        let mut second = FlagSequence::new();
        first.next_id(prefix::ONCOLOGY);
        first.next_id(prefix::ONCOLOGY);
        assert_eq!(second.next_id(prefix::ONCOLOGY), "ONC-001");
    }

    #[test]
    fn test_emitter_stamps_flags() {
        let mut seq = FlagSequence::new();
        let mut emitter = seq.emitter(prefix::RANGE, Category::Range, "MSK-2024-001");
        emitter.emit(
            Severity::Yellow,
            Finding {
                metric_name: "avg_episode_cost".to_string(),
                ..Default::default()
            },
        );
        emitter.emit(Severity::Red, Finding::default());
        let flags = emitter.finish();

        assert_eq!(flags.len(), 2);
        assert_eq!(flags[0].flag_id, "RANGE-001");
        assert_eq!(flags[1].flag_id, "RANGE-002");
        assert_eq!(flags[0].category, Category::Range);
        assert_eq!(flags[0].contract_id, "MSK-2024-001");
        assert_eq!(flags[1].severity, Severity::Red);
        assert_eq!(seq.issued(prefix::RANGE), 2);
    }
}
