//! Prompt text for the recommendation request.

use std::fmt::Write as _;

use crate::client::AdvisorRequest;

pub const SYSTEM_PROMPT: &str = "You are a local SEO consultant who audits Google Business Profiles \
for small service businesses. Reply with a single JSON object and nothing else. The object must have \
the keys: \"priority\" (one of \"critical\", \"high\", \"medium\"), \"recommendations\" (an array of \
1 to 4 objects with string keys \"category\", \"action\", \"impact\", \"timeframe\", \"difficulty\"), \
\"quickWins\" (an array of at most 3 short strings), \"revenueImpact\" (one sentence) and optionally \
\"competitiveRisk\" (one sentence). Be specific to the numbers you are given.";

/// Renders the user message for one business.
#[must_use]
pub fn user_prompt(request: &AdvisorRequest) -> String {
    let s = &request.scores;
    let p = &request.place_summary;

    let mut out = String::new();
    let _ = writeln!(out, "Business: {}", request.business_name);
    let _ = writeln!(out, "Location: {}", request.business_location);
    let _ = writeln!(out, "Listing name: {}", p.name);
    let _ = writeln!(out, "Address: {}", or_missing(Some(p.address.as_str())));
    let _ = writeln!(
        out,
        "Rating: {} from {} reviews",
        p.rating.map_or_else(|| "none".to_owned(), |r| format!("{r:.1}")),
        p.review_count
    );
    let _ = writeln!(out, "Phone: {}", or_missing(p.phone.as_deref()));
    let _ = writeln!(out, "Website: {}", or_missing(p.website.as_deref()));
    let _ = writeln!(
        out,
        "Opening hours listed: {}",
        if p.has_opening_hours { "yes" } else { "no" }
    );
    let _ = writeln!(out, "Photos: {}", p.photo_count);
    let _ = writeln!(out);
    let _ = writeln!(out, "Scores out of 100:");
    let _ = writeln!(out, "- overall: {}", s.overall);
    let _ = writeln!(out, "- reviews: {}", s.reviews);
    let _ = writeln!(out, "- engagement: {}", s.engagement);
    let _ = writeln!(out, "- photos: {}", s.photos);
    let _ = writeln!(out, "- completeness: {}", s.completeness);
    let _ = writeln!(out);
    out.push_str("Recommend the changes that would most improve this profile's local visibility.");
    out
}

fn or_missing(value: Option<&str>) -> &str {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => "missing",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use profilescan_core::{PlaceSummary, ScoreSet};

    fn request() -> AdvisorRequest {
        AdvisorRequest {
            business_name: "Joe's Plumbing".to_owned(),
            business_location: "Manchester".to_owned(),
            scores: ScoreSet {
                overall: 62,
                reviews: 71,
                engagement: 70,
                photos: 40,
                completeness: 67,
            },
            place_summary: PlaceSummary {
                place_id: "p1".to_owned(),
                name: "Joe's Plumbing & Heating".to_owned(),
                address: "12 Deansgate".to_owned(),
                rating: Some(4.0),
                review_count: 25,
                phone: Some("0161 496 0000".to_owned()),
                website: Some("  ".to_owned()),
                photo_count: 6,
                has_opening_hours: false,
            },
        }
    }

    #[test]
    fn user_prompt_carries_scores_and_gaps() {
        let text = user_prompt(&request());
        assert!(text.contains("Business: Joe's Plumbing"));
        assert!(text.contains("Rating: 4.0 from 25 reviews"));
        assert!(text.contains("Website: missing"));
        assert!(text.contains("Opening hours listed: no"));
        assert!(text.contains("- photos: 40"));
    }

    #[test]
    fn unrated_listing_says_none() {
        let mut req = request();
        req.place_summary.rating = None;
        assert!(user_prompt(&req).contains("Rating: none from 25 reviews"));
    }
}
