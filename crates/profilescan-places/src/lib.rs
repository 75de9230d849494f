//! Places lookup adapter.
//!
//! Resolves a free-text business name and location into a single
//! [`PlaceRecord`](profilescan_core::PlaceRecord) using the Google Places
//! Geocoding, Text Search and Place Details endpoints.

pub mod client;
pub mod error;
pub mod geo;
pub mod similarity;
pub mod types;

pub use client::PlacesClient;
pub use error::PlacesError;
pub use geo::haversine_km;
pub use similarity::name_similarity;
