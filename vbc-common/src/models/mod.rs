//! Domain models shared by the validator and report crates

pub mod contract;
pub mod flag;
pub mod reference;
pub mod sequence;

pub use contract::{Contract, ContractMetadata, Specialty};
pub use flag::{
    evidence, sorted_by_severity, Category, Evidence, Flag, Finding, MetricValue, Severity,
    SeverityCounts,
};
pub use reference::{
    AdherenceBenchmark, BiosimilarPair, IncidenceRate, RangeDef, RangeShape, ReferenceRanges,
    SpecialtyRanges,
};
pub use sequence::{prefix, FlagEmitter, FlagSequence};
