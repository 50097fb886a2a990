pub mod candidate;
pub mod layout;
pub mod pattern_store;
pub mod result;
pub mod token;

pub use candidate::{NumberFormat, ScoredCandidate, StrategyKind, ValueCandidate};
pub use layout::{TableCell, TableLayout, TableRow};
pub use pattern_store::{KnownValue, PatternStore};
pub use result::{
    AccuracyReport, Decision, Diagnostics, DocumentTotal, ExtractionResult, LocaleDetection,
    ReferenceSource,
};
pub use token::{Entity, RawToken, Section};
