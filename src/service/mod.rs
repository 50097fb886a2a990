pub mod candidates;
pub mod entities;
pub mod fusion;
pub mod locale;
pub mod outlier;
pub mod pipeline;
pub mod strategies;
pub mod totals;

pub use fusion::{EnsembleFusion, FusionOutcome};
pub use locale::{format_amount, LocaleParser};
pub use outlier::{OutlierFilter, OutlierSplit};
pub use pipeline::{DocumentInput, HoldingsExtractor};
pub use strategies::{DocumentContext, ScoringStrategy};
pub use totals::{accuracy_report, coverage_percent, TotalDetector};
