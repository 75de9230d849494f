//! Integration tests for `AdvisorClient` using wiremock HTTP mocks.

use profilescan_advisor::{AdvisorClient, AdvisorError, AdvisorRequest};
use profilescan_core::{PlaceSummary, Priority, ScoreSet};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(base_url: &str) -> AdvisorClient {
    AdvisorClient::with_base_url(Some("sk-test"), 30, base_url, "gpt-test")
        .expect("client construction should not fail")
}

fn request() -> AdvisorRequest {
    AdvisorRequest {
        business_name: "Joe's Plumbing".to_owned(),
        business_location: "Manchester".to_owned(),
        scores: ScoreSet {
            overall: 45,
            reviews: 30,
            engagement: 70,
            photos: 20,
            completeness: 67,
        },
        place_summary: PlaceSummary {
            place_id: "ChIJ-joes".to_owned(),
            name: "Joe's Plumbing".to_owned(),
            address: "12 Deansgate, Manchester".to_owned(),
            rating: Some(3.8),
            review_count: 6,
            phone: Some("0161 496 0000".to_owned()),
            website: None,
            photo_count: 3,
            has_opening_hours: true,
        },
    }
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
}

#[tokio::test]
async fn generate_parses_json_reply() {
    let server = MockServer::start().await;

    let reply = json!({
        "priority": "critical",
        "recommendations": [{
            "category": "Reviews",
            "action": "Ask every customer for a review",
            "impact": "Better ranking",
            "timeframe": "2 weeks",
            "difficulty": "Easy"
        }],
        "quickWins": ["Reply to reviews"],
        "revenueImpact": "Significant",
        "competitiveRisk": "High"
    })
    .to_string();

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-test",
            "response_format": { "type": "json_object" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(&reply)))
        .expect(1)
        .mount(&server)
        .await;

    let payload = test_client(&format!("{}/v1", server.uri()))
        .generate(&request())
        .await
        .expect("reply should parse");

    assert_eq!(payload.priority, Priority::Critical);
    assert_eq!(payload.recommendations.len(), 1);
    assert_eq!(payload.quick_wins, vec!["Reply to reviews"]);
    assert_eq!(payload.competitive_risk.as_deref(), Some("High"));
}

#[tokio::test]
async fn generate_rejects_non_json_reply() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(completion("Sure! Here are some ideas...")),
        )
        .mount(&server)
        .await;

    let err = test_client(&server.uri())
        .generate(&request())
        .await
        .expect_err("prose is not a payload");
    assert!(matches!(err, AdvisorError::Payload(_)), "got {err:?}");
}

#[tokio::test]
async fn generate_surfaces_http_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let err = test_client(&server.uri())
        .generate(&request())
        .await
        .expect_err("429 must fail");
    match err {
        AdvisorError::Status { status, body } => {
            assert_eq!(status, 429);
            assert_eq!(body, "rate limited");
        }
        other => panic!("expected Status, got {other:?}"),
    }
}

#[tokio::test]
async fn generate_with_empty_choices_is_empty_reply() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let err = test_client(&server.uri())
        .generate(&request())
        .await
        .expect_err("no choices");
    assert!(matches!(err, AdvisorError::EmptyReply));
}

#[tokio::test]
async fn generate_without_key_sends_nothing() {
    let server = MockServer::start().await;
    let client = AdvisorClient::with_base_url(None, 30, &server.uri(), "gpt-test").unwrap();

    let err = client.generate(&request()).await.expect_err("no key");
    assert!(matches!(err, AdvisorError::NotConfigured(_)));
    assert!(server
        .received_requests()
        .await
        .unwrap_or_default()
        .is_empty());
}
