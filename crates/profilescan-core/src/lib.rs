//! Domain types and pure logic for the business-profile scan service.
//!
//! Everything in this crate is free of I/O: the scan data model, the
//! business-health scorer, the rule-based fallback recommendation generator,
//! and the environment-driven application configuration.

pub mod app_config;
pub mod config;
pub mod recommendations;
pub mod scan;
pub mod scoring;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use recommendations::{fallback_recommendations, priority_for};
pub use scan::{
    LatLng, LeadContact, PayloadError, PlacePhoto, PlaceRecord, PlaceSummary, Priority,
    Recommendation, RecommendationPayload, RecommendationSource, ScanRecord, ScanRequest,
    ScanResult, ScanStatus, ScoreSet,
};
pub use scoring::score;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
