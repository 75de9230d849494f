//! HTTP client for the Google Places JSON API.
//!
//! Wraps `reqwest` with Places-specific status handling, API key management,
//! and typed response deserialization. Every endpoint checks the `"status"`
//! field of the JSON envelope; see [`PlacesClient::check_status`] for the
//! mapping onto [`PlacesError`].

use std::time::Duration;

use reqwest::{Client, Url};

use profilescan_core::{LatLng, PlaceRecord};

use crate::error::PlacesError;
use crate::geo::haversine_km;
use crate::similarity::{name_similarity, LOW_CONFIDENCE_THRESHOLD};
use crate::types::{
    DetailsResponse, GeocodeResponse, PlaceDetails, SearchCandidate, TextSearchResponse,
};

const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com/maps/api/";
const DEFAULT_SEARCH_RADIUS_KM: f64 = 50.0;

const DETAIL_FIELDS: &str = "place_id,name,formatted_address,rating,user_ratings_total,\
formatted_phone_number,international_phone_number,website,opening_hours,photos,geometry";

/// Client for the Google Places Geocoding, Text Search and Place Details
/// endpoints.
///
/// Use [`PlacesClient::new`] for production or [`PlacesClient::with_base_url`]
/// to point at a mock server in tests. A client without an API key can be
/// built; every lookup then fails with [`PlacesError::Configuration`] before
/// any request is sent.
pub struct PlacesClient {
    client: Client,
    api_key: Option<String>,
    base_url: Url,
    search_radius_km: f64,
}

impl PlacesClient {
    /// Creates a new client pointed at the production Google Maps API.
    ///
    /// # Errors
    ///
    /// Returns [`PlacesError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(api_key: Option<&str>, timeout_secs: u64) -> Result<Self, PlacesError> {
        Self::with_base_url(api_key, timeout_secs, DEFAULT_BASE_URL)
    }

    /// Creates a new client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`PlacesError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`PlacesError::Configuration`] if `base_url`
    /// is not a valid URL.
    pub fn with_base_url(
        api_key: Option<&str>,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, PlacesError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("profilescan/0.1 (business-profile-scan)")
            .build()?;

        // Endpoint paths are joined relative to the base, so it must end in
        // exactly one slash.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| {
            PlacesError::Configuration(format!("invalid base URL '{base_url}': {e}"))
        })?;

        Ok(Self {
            client,
            api_key: api_key
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_owned),
            base_url,
            search_radius_km: DEFAULT_SEARCH_RADIUS_KM,
        })
    }

    /// Overrides the distance used both as the Text Search bias radius and as
    /// the post-search candidate filter.
    #[must_use]
    pub fn with_search_radius_km(mut self, km: f64) -> Self {
        self.search_radius_km = km;
        self
    }

    /// Resolves a free-text business name and location to one listing.
    ///
    /// Geocoding failures are tolerated: the search then runs without a
    /// coordinate bias. The first query composition returning any result
    /// wins; nearby candidates are preferred, but when none fall within the
    /// search radius the unfiltered list is used. A low name similarity is
    /// logged and never blocks selection.
    ///
    /// # Errors
    ///
    /// - [`PlacesError::Configuration`] if no API key is configured or the key
    ///   is rejected.
    /// - [`PlacesError::NotFound`] if no query composition yields a candidate.
    /// - Any error from the Text Search or Place Details requests.
    pub async fn resolve(&self, name: &str, location: &str) -> Result<PlaceRecord, PlacesError> {
        self.api_key()?;

        let origin = match self.geocode(location).await {
            Ok(origin) => origin,
            Err(e) => {
                tracing::warn!(location, error = %e, "geocoding failed; searching without location bias");
                None
            }
        };

        let mut candidates = Vec::new();
        for query in query_compositions(name, location) {
            candidates = self.text_search(&query, origin).await?;
            if !candidates.is_empty() {
                tracing::debug!(query, count = candidates.len(), "text search matched");
                break;
            }
            tracing::debug!(query, "text search returned no results");
        }

        if candidates.is_empty() {
            return Err(PlacesError::NotFound {
                message: format!(
                    "We couldn't find \"{name}\" in \"{location}\". \
                     Try adding the town or city, or the postcode."
                ),
            });
        }

        let candidates = match origin {
            Some(origin) => filter_by_distance(candidates, origin, self.search_radius_km),
            None => candidates,
        };
        let Some(selected) = candidates.into_iter().next() else {
            return Err(PlacesError::NotFound {
                message: format!("No usable listing found for \"{name}\"."),
            });
        };

        let similarity = name_similarity(name, &selected.name);
        if similarity < LOW_CONFIDENCE_THRESHOLD {
            tracing::warn!(
                query = name,
                candidate = %selected.name,
                similarity,
                "low-confidence place match"
            );
        }

        let details = self.place_details(&selected.place_id).await?;
        Ok(merge_candidate(selected, details))
    }

    /// Geocodes a free-text address to coordinates.
    ///
    /// Returns `Ok(None)` when the provider finds nothing.
    ///
    /// # Errors
    ///
    /// - [`PlacesError::Configuration`] if no API key is configured.
    /// - [`PlacesError::Http`] on network failure or non-2xx HTTP status.
    /// - Any status mapped by [`PlacesClient::check_status`].
    pub async fn geocode(&self, address: &str) -> Result<Option<LatLng>, PlacesError> {
        let url = self.build_url("geocode/json", &[("address", address)])?;
        let body = self.request_json(&url).await?;
        Self::check_status(&body)?;

        let response: GeocodeResponse =
            serde_json::from_value(body).map_err(|e| PlacesError::Deserialize {
                context: format!("geocode(address={address})"),
                source: e,
            })?;

        Ok(response
            .results
            .into_iter()
            .next()
            .map(|r| r.geometry.location.into()))
    }

    /// Runs one Text Search query, biased towards `bias` when known.
    ///
    /// `ZERO_RESULTS` is returned as an empty list.
    ///
    /// # Errors
    ///
    /// - [`PlacesError::Configuration`] if no API key is configured.
    /// - [`PlacesError::Http`] on network failure or non-2xx HTTP status.
    /// - Any status mapped by [`PlacesClient::check_status`].
    pub async fn text_search(
        &self,
        query: &str,
        bias: Option<LatLng>,
    ) -> Result<Vec<SearchCandidate>, PlacesError> {
        let mut params = vec![("query", query.to_owned())];
        if let Some(origin) = bias {
            params.push(("location", format!("{},{}", origin.lat, origin.lng)));
            params.push(("radius", format!("{:.0}", self.search_radius_km * 1000.0)));
        }
        let borrowed: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();

        let url = self.build_url("place/textsearch/json", &borrowed)?;
        let body = self.request_json(&url).await?;
        Self::check_status(&body)?;

        let response: TextSearchResponse =
            serde_json::from_value(body).map_err(|e| PlacesError::Deserialize {
                context: format!("textsearch(query={query})"),
                source: e,
            })?;

        Ok(response.results)
    }

    /// Fetches contact, opening-hours and photo details for one place.
    ///
    /// # Errors
    ///
    /// - [`PlacesError::Configuration`] if no API key is configured.
    /// - [`PlacesError::NotFound`] if the place id is unknown or the response
    ///   carries no result.
    /// - [`PlacesError::Http`] on network failure or non-2xx HTTP status.
    pub async fn place_details(&self, place_id: &str) -> Result<PlaceDetails, PlacesError> {
        let url = self.build_url(
            "place/details/json",
            &[("place_id", place_id), ("fields", DETAIL_FIELDS)],
        )?;
        let body = self.request_json(&url).await?;
        Self::check_status(&body)?;

        let response: DetailsResponse =
            serde_json::from_value(body).map_err(|e| PlacesError::Deserialize {
                context: format!("details(place_id={place_id})"),
                source: e,
            })?;

        response.result.ok_or_else(|| PlacesError::NotFound {
            message: format!("no details returned for place {place_id}"),
        })
    }

    fn api_key(&self) -> Result<&str, PlacesError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| PlacesError::Configuration("GOOGLE_PLACES_API_KEY is not set".to_owned()))
    }

    /// Builds the request URL for `path` with percent-encoded query
    /// parameters, appending the API key last.
    fn build_url(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, PlacesError> {
        let key = self.api_key()?;
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| PlacesError::Configuration(format!("invalid endpoint path '{path}': {e}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
            pairs.append_pair("key", key);
        }
        Ok(url)
    }

    /// Sends a GET request, asserts a 2xx HTTP status, and parses the response
    /// body as JSON.
    async fn request_json(&self, url: &Url) -> Result<serde_json::Value, PlacesError> {
        let response = self.client.get(url.clone()).send().await?;
        let response = response.error_for_status()?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| PlacesError::Deserialize {
            context: url.path().to_owned(),
            source: e,
        })
    }

    /// Maps the envelope `"status"` onto an error.
    ///
    /// `OK` and `ZERO_RESULTS` pass; `REQUEST_DENIED` and key-related
    /// `INVALID_REQUEST` are configuration problems; `OVER_QUERY_LIMIT` and
    /// `OVER_DAILY_LIMIT` are quota problems; `NOT_FOUND` is a missing place.
    fn check_status(body: &serde_json::Value) -> Result<(), PlacesError> {
        let status = body
            .get("status")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("UNKNOWN_ERROR");
        let message = body
            .get("error_message")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("")
            .to_owned();

        match status {
            "OK" | "ZERO_RESULTS" => Ok(()),
            "REQUEST_DENIED" => Err(PlacesError::Configuration(message)),
            "INVALID_REQUEST" if message.to_lowercase().contains("key") => {
                Err(PlacesError::Configuration(message))
            }
            "OVER_QUERY_LIMIT" | "OVER_DAILY_LIMIT" => Err(PlacesError::QuotaExceeded(message)),
            "NOT_FOUND" => Err(PlacesError::NotFound { message }),
            other => Err(PlacesError::Api {
                status: other.to_owned(),
                message,
            }),
        }
    }
}

/// The query strings tried in order until one returns a result.
fn query_compositions(name: &str, location: &str) -> [String; 3] {
    let name = name.trim();
    let location = location.trim();
    [
        format!("{name} {location}"),
        format!("{name} near {location}"),
        format!("{name}, {location}"),
    ]
}

/// Keeps candidates within `radius_km` of `origin`, or all of them when none
/// are that close. Candidates without coordinates are kept.
fn filter_by_distance(
    candidates: Vec<SearchCandidate>,
    origin: LatLng,
    radius_km: f64,
) -> Vec<SearchCandidate> {
    let nearby: Vec<SearchCandidate> = candidates
        .iter()
        .filter(|c| {
            c.location()
                .is_none_or(|loc| haversine_km(origin, loc) <= radius_km)
        })
        .cloned()
        .collect();

    if nearby.is_empty() {
        tracing::debug!(radius_km, "no candidates within radius; using unfiltered results");
        candidates
    } else {
        nearby
    }
}

/// Details override the search hit wherever they carry a value.
fn merge_candidate(candidate: SearchCandidate, details: PlaceDetails) -> PlaceRecord {
    let location = details
        .geometry
        .as_ref()
        .map(|g| g.location.into())
        .or_else(|| candidate.location());

    PlaceRecord {
        place_id: details.place_id.unwrap_or(candidate.place_id),
        name: details.name.unwrap_or(candidate.name),
        rating: details.rating.or(candidate.rating),
        review_count: details
            .user_ratings_total
            .or(candidate.user_ratings_total)
            .unwrap_or(0),
        address: details
            .formatted_address
            .or(candidate.formatted_address)
            .unwrap_or_default(),
        phone: details
            .formatted_phone_number
            .or(details.international_phone_number),
        website: details.website,
        opening_hours: details
            .opening_hours
            .map(|h| h.weekday_text)
            .filter(|lines| !lines.is_empty()),
        photos: details.photos.into_iter().map(Into::into).collect(),
        location,
    }
}
