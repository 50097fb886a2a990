pub mod api;
pub mod config;
pub mod error;
pub mod export;
pub mod models;
pub mod service;

pub use config::{AppConfig, ExtractionConfig};
pub use error::{ExtractError, Result};
pub use models::{Decision, ExtractionResult, PatternStore};
pub use service::{DocumentInput, HoldingsExtractor};
