//! AI recommendation advisor.
//!
//! Sends a business's scores and place summary to an OpenAI-compatible chat
//! completions endpoint and parses the reply into a
//! [`RecommendationPayload`](profilescan_core::RecommendationPayload).

pub mod client;
pub mod error;
pub mod prompt;

pub use client::{AdvisorClient, AdvisorRequest};
pub use error::AdvisorError;
