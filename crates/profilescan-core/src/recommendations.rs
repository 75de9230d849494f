//! Rule-based fallback recommendation generator.
//!
//! Used when the AI advisor cannot be reached or does not answer in time.
//! Output order is fixed (reviews, photos, completeness) and truncated, never
//! re-sorted.

use crate::scan::{Priority, Recommendation, RecommendationPayload, ScoreSet, MAX_QUICK_WINS};

pub const MAX_FALLBACK_RECOMMENDATIONS: usize = 4;

const REVIEWS_THRESHOLD: u8 = 70;
const PHOTOS_THRESHOLD: u8 = 70;
const COMPLETENESS_THRESHOLD: u8 = 80;

const CRITICAL_BELOW: u8 = 50;
const HIGH_BELOW: u8 = 70;

/// Priority band for an overall score.
#[must_use]
pub fn priority_for(overall: u8) -> Priority {
    if overall < CRITICAL_BELOW {
        Priority::Critical
    } else if overall < HIGH_BELOW {
        Priority::High
    } else {
        Priority::Medium
    }
}

struct Rule {
    quick_win: &'static str,
    category: &'static str,
    action: &'static str,
    impact: &'static str,
    timeframe: &'static str,
    difficulty: &'static str,
}

const REVIEWS_RULE: Rule = Rule {
    quick_win: "Ask your five most recent happy customers to leave a Google review",
    category: "Reviews",
    action: "Set up a simple review request after every completed job and reply to every review within 48 hours",
    impact: "Higher star rating and review volume lift map-pack ranking and click-through",
    timeframe: "2-4 weeks",
    difficulty: "Easy",
};

const PHOTOS_RULE: Rule = Rule {
    quick_win: "Upload at least 10 recent photos of your team, premises and work",
    category: "Photos",
    action: "Add fresh, well-lit photos every month covering exterior, interior, team and finished work",
    impact: "Profiles with more photos receive more direction requests and website clicks",
    timeframe: "1 week",
    difficulty: "Easy",
};

const COMPLETENESS_RULE: Rule = Rule {
    quick_win: "Fill in your phone number, website and opening hours",
    category: "Profile Completeness",
    action: "Complete every profile field: contact details, opening hours, services and business description",
    impact: "Complete profiles are treated as more trustworthy by Google and by customers",
    timeframe: "1-2 days",
    difficulty: "Easy",
};

const GENERIC_RULE: Rule = Rule {
    quick_win: "Publish a Google post about a current offer or recent project",
    category: "Engagement",
    action: "Keep the profile active with weekly posts, Q&A answers and review replies",
    impact: "Regular activity protects your ranking against competitors catching up",
    timeframe: "Ongoing",
    difficulty: "Easy",
};

impl Rule {
    fn recommendation(&self) -> Recommendation {
        Recommendation {
            category: self.category.to_string(),
            action: self.action.to_string(),
            impact: self.impact.to_string(),
            timeframe: self.timeframe.to_string(),
            difficulty: self.difficulty.to_string(),
        }
    }
}

/// Build a recommendation payload from scores alone.
#[must_use]
pub fn fallback_recommendations(scores: &ScoreSet) -> RecommendationPayload {
    let mut rules: Vec<&Rule> = Vec::new();
    if scores.reviews < REVIEWS_THRESHOLD {
        rules.push(&REVIEWS_RULE);
    }
    if scores.photos < PHOTOS_THRESHOLD {
        rules.push(&PHOTOS_RULE);
    }
    if scores.completeness < COMPLETENESS_THRESHOLD {
        rules.push(&COMPLETENESS_RULE);
    }
    if rules.is_empty() {
        rules.push(&GENERIC_RULE);
    }

    let mut quick_wins: Vec<String> = rules.iter().map(|r| r.quick_win.to_string()).collect();
    quick_wins.truncate(MAX_QUICK_WINS);

    let mut recommendations: Vec<Recommendation> =
        rules.iter().map(|r| r.recommendation()).collect();
    recommendations.truncate(MAX_FALLBACK_RECOMMENDATIONS);

    let priority = priority_for(scores.overall);

    RecommendationPayload {
        priority,
        recommendations,
        quick_wins,
        revenue_impact: revenue_impact(priority).to_string(),
        competitive_risk: competitive_risk(priority).map(str::to_string),
    }
}

fn revenue_impact(priority: Priority) -> &'static str {
    match priority {
        Priority::Critical => {
            "Your profile is likely costing you a significant share of local enquiries every month"
        }
        Priority::High => "Fixing the gaps below could noticeably increase calls and website visits",
        Priority::Medium => "Your profile is in good shape; small improvements keep enquiries growing",
    }
}

fn competitive_risk(priority: Priority) -> Option<&'static str> {
    match priority {
        Priority::Critical => {
            Some("Competitors with stronger profiles are very likely outranking you in the map pack")
        }
        Priority::High => Some("Nearby competitors can overtake you with only modest effort"),
        Priority::Medium => None,
    }
}
