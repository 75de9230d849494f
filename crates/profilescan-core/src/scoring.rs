//! Business-health scorer.
//!
//! Pure and deterministic: the same [`PlaceRecord`] always yields the same
//! [`ScoreSet`]. The overall weights sum to 0.85 and sit on top of a flat
//! base of 15, so the overall score is not a convex combination of the
//! sub-scores. Changing either constant breaks score parity with stored scans.

use crate::scan::{is_present, PlaceRecord, ScoreSet};

const REVIEW_RATING_WEIGHT: f64 = 0.7;
const REVIEW_VOLUME_WEIGHT: f64 = 0.3;
/// Review count at which the volume component saturates.
const REVIEW_VOLUME_TARGET: f64 = 50.0;

const ENGAGEMENT_HAS_REVIEWS: u8 = 40;
const ENGAGEMENT_HAS_CONTACT: u8 = 30;
const ENGAGEMENT_HAS_HOURS: u8 = 30;

/// Photo count at which the photo score saturates.
const PHOTO_TARGET: f64 = 15.0;
const PHOTO_BONUS_THRESHOLD: usize = 10;
const PHOTO_BONUS: f64 = 10.0;

const COMPLETENESS_FIELDS: f64 = 6.0;

const OVERALL_REVIEWS_WEIGHT: f64 = 0.30;
const OVERALL_ENGAGEMENT_WEIGHT: f64 = 0.25;
const OVERALL_PHOTOS_WEIGHT: f64 = 0.15;
const OVERALL_COMPLETENESS_WEIGHT: f64 = 0.15;
const OVERALL_BASE: f64 = 15.0;

/// Score a resolved place.
#[must_use]
pub fn score(place: &PlaceRecord) -> ScoreSet {
    let reviews = reviews_score(place.rating, place.review_count);
    let engagement = engagement_score(place);
    let photos = photos_score(place.photo_count());
    let completeness = completeness_score(place);

    let overall = to_score(
        (OVERALL_REVIEWS_WEIGHT * f64::from(reviews)
            + OVERALL_ENGAGEMENT_WEIGHT * f64::from(engagement)
            + OVERALL_PHOTOS_WEIGHT * f64::from(photos)
            + OVERALL_COMPLETENESS_WEIGHT * f64::from(completeness)
            + OVERALL_BASE)
            .min(100.0),
    );

    ScoreSet {
        overall,
        reviews,
        engagement,
        photos,
        completeness,
    }
}

/// Blend of star rating (70%) and review volume (30%, saturating at 50 reviews).
///
/// Unrated listings and listings without reviews score 0.
#[must_use]
pub fn reviews_score(rating: Option<f64>, review_count: u32) -> u8 {
    let Some(rating) = rating.filter(|r| r.is_finite()) else {
        return 0;
    };
    if review_count == 0 {
        return 0;
    }

    let rating_pct = rating.clamp(0.0, 5.0) / 5.0 * 100.0;
    let volume_pct = (f64::from(review_count) / REVIEW_VOLUME_TARGET * 100.0).min(100.0);
    to_score(REVIEW_RATING_WEIGHT * rating_pct + REVIEW_VOLUME_WEIGHT * volume_pct)
}

#[must_use]
pub fn engagement_score(place: &PlaceRecord) -> u8 {
    let mut total = 0;
    if place.review_count > 0 {
        total += ENGAGEMENT_HAS_REVIEWS;
    }
    if place.has_phone() || place.has_website() {
        total += ENGAGEMENT_HAS_CONTACT;
    }
    if place.has_opening_hours() {
        total += ENGAGEMENT_HAS_HOURS;
    }
    total
}

/// Photo coverage, saturating at 15 photos, with a +10 bonus from 10 photos up.
#[must_use]
pub fn photos_score(photo_count: usize) -> u8 {
    #[allow(clippy::cast_precision_loss)]
    let coverage = (photo_count as f64 / PHOTO_TARGET * 100.0).min(100.0).round();
    if photo_count >= PHOTO_BONUS_THRESHOLD {
        to_score((coverage + PHOTO_BONUS).min(100.0))
    } else {
        to_score(coverage)
    }
}

/// Share of the six profile fields that are filled in.
#[must_use]
pub fn completeness_score(place: &PlaceRecord) -> u8 {
    let present = [
        is_present(Some(place.name.as_str())),
        is_present(Some(place.address.as_str())),
        place.has_phone(),
        place.has_website(),
        place.has_opening_hours(),
        !place.photos.is_empty(),
    ]
    .into_iter()
    .filter(|&p| p)
    .count();

    #[allow(clippy::cast_precision_loss)]
    let pct = present as f64 / COMPLETENESS_FIELDS * 100.0;
    to_score(pct)
}

fn to_score(value: f64) -> u8 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let rounded = value.round().clamp(0.0, 100.0) as u8;
    rounded
}
