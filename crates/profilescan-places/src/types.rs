//! Wire types for the Google Places JSON endpoints.
//!
//! Only the fields the adapter reads are modelled; everything else in the
//! provider's responses is ignored.

use serde::Deserialize;

use profilescan_core::{LatLng, PlacePhoto};

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WireLatLng {
    pub lat: f64,
    pub lng: f64,
}

impl From<WireLatLng> for LatLng {
    fn from(w: WireLatLng) -> Self {
        LatLng {
            lat: w.lat,
            lng: w.lng,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Geometry {
    pub location: WireLatLng,
}

#[derive(Debug, Deserialize)]
pub struct GeocodeResponse {
    pub status: String,
    #[serde(default)]
    pub results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
pub struct GeocodeResult {
    pub geometry: Geometry,
    #[serde(default)]
    pub formatted_address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TextSearchResponse {
    pub status: String,
    #[serde(default)]
    pub results: Vec<SearchCandidate>,
}

/// One Text Search hit.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchCandidate {
    pub place_id: String,
    pub name: String,
    #[serde(default)]
    pub formatted_address: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub user_ratings_total: Option<u32>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
}

impl SearchCandidate {
    #[must_use]
    pub fn location(&self) -> Option<LatLng> {
        self.geometry.as_ref().map(|g| g.location.into())
    }
}

#[derive(Debug, Deserialize)]
pub struct DetailsResponse {
    pub status: String,
    #[serde(default)]
    pub result: Option<PlaceDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaceDetails {
    #[serde(default)]
    pub place_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub formatted_address: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub user_ratings_total: Option<u32>,
    #[serde(default)]
    pub formatted_phone_number: Option<String>,
    #[serde(default)]
    pub international_phone_number: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub opening_hours: Option<OpeningHours>,
    #[serde(default)]
    pub photos: Vec<WirePhoto>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpeningHours {
    #[serde(default)]
    pub weekday_text: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WirePhoto {
    pub photo_reference: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

impl From<WirePhoto> for PlacePhoto {
    fn from(w: WirePhoto) -> Self {
        PlacePhoto {
            reference: w.photo_reference,
            width: w.width,
            height: w.height,
        }
    }
}
