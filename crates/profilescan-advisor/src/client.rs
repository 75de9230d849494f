//! HTTP client for an OpenAI-compatible chat completions endpoint.

use std::time::Duration;

use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use profilescan_core::{PlaceSummary, RecommendationPayload, ScoreSet};

use crate::error::AdvisorError;
use crate::prompt::{user_prompt, SYSTEM_PROMPT};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const TEMPERATURE: f32 = 0.4;
/// Upper bound on the error body echoed into [`AdvisorError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Everything the advisor is told about one business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvisorRequest {
    pub business_name: String,
    pub business_location: String,
    pub scores: ScoreSet,
    pub place_summary: PlaceSummary,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    response_format: ResponseFormat,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct AdvisorClient {
    client: Client,
    api_key: Option<String>,
    model: String,
    endpoint: Url,
}

impl AdvisorClient {
    /// Creates a client pointed at the public `OpenAI` API.
    ///
    /// # Errors
    ///
    /// Returns [`AdvisorError::Http`] if the `reqwest::Client` cannot be built.
    pub fn new(api_key: Option<&str>, timeout_secs: u64) -> Result<Self, AdvisorError> {
        Self::with_base_url(api_key, timeout_secs, DEFAULT_BASE_URL, DEFAULT_MODEL)
    }

    /// Creates a client against any OpenAI-compatible base URL.
    ///
    /// # Errors
    ///
    /// Returns [`AdvisorError::Http`] if the `reqwest::Client` cannot be built,
    /// or [`AdvisorError::NotConfigured`] if `base_url` is not a valid URL.
    pub fn with_base_url(
        api_key: Option<&str>,
        timeout_secs: u64,
        base_url: &str,
        model: &str,
    ) -> Result<Self, AdvisorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("profilescan/0.1 (business-profile-scan)")
            .build()?;

        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let endpoint = Url::parse(&normalised)
            .and_then(|base| base.join("chat/completions"))
            .map_err(|e| {
                AdvisorError::NotConfigured(format!("invalid base URL '{base_url}': {e}"))
            })?;

        Ok(Self {
            client,
            api_key: api_key
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_owned),
            model: model.to_owned(),
            endpoint,
        })
    }

    /// Whether an API key is present. Without one, [`Self::generate`] fails
    /// immediately.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Asks the model for recommendations and parses its reply.
    ///
    /// # Errors
    ///
    /// - [`AdvisorError::NotConfigured`] when no API key is set.
    /// - [`AdvisorError::Http`] on network failure.
    /// - [`AdvisorError::Status`] on a non-2xx response.
    /// - [`AdvisorError::EmptyReply`], [`AdvisorError::Deserialize`] or
    ///   [`AdvisorError::Payload`] when the reply is not a usable payload.
    pub async fn generate(
        &self,
        request: &AdvisorRequest,
    ) -> Result<RecommendationPayload, AdvisorError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(AdvisorError::NotConfigured(
                "PROFILESCAN_ADVISOR_API_KEY is not set".to_owned(),
            ));
        };

        let user = user_prompt(request);
        let body = ChatRequest {
            model: &self.model,
            temperature: TEMPERATURE,
            response_format: ResponseFormat {
                kind: "json_object",
            },
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &user,
                },
            ],
        };

        tracing::debug!(model = %self.model, business = %request.business_name, "requesting recommendations");

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(AdvisorError::Status {
                status: status.as_u16(),
                body: truncate(&text, MAX_ERROR_BODY),
            });
        }

        let chat: ChatResponse =
            serde_json::from_str(&text).map_err(|e| AdvisorError::Deserialize {
                context: "chat completion".to_owned(),
                source: e,
            })?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(AdvisorError::EmptyReply)?;

        let payload = RecommendationPayload::parse_json(&serde_json::Value::String(content))?;
        Ok(payload)
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_owned();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}
