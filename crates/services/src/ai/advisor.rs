use std::env;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use assess_core::model::{
    AiFeedback, AssessmentResult, Recommendation, Scope, SessionId, TopicScore,
};

use crate::error::AdvisorError;

const MAX_SUGGESTED_ACTIONS: usize = 5;

/// What the advisor sees of a submitted session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdviceRequest {
    pub session_id: SessionId,
    pub scope: Scope,
    pub total_score: u8,
    pub correct_count: usize,
    pub item_count: usize,
    pub breakdown: Vec<TopicScore>,
}

impl AdviceRequest {
    #[must_use]
    pub fn new(scope: Scope, result: &AssessmentResult) -> Self {
        Self {
            session_id: result.session_id,
            scope,
            total_score: result.total_score,
            correct_count: result.correct_count(),
            item_count: result.responses.len(),
            breakdown: result.breakdown.clone(),
        }
    }
}

/// Produces coaching feedback for a graded session.
#[async_trait]
pub trait AssessmentAdvisor: Send + Sync {
    /// # Errors
    ///
    /// Returns `AdvisorError` if no usable feedback could be produced.
    async fn advise(&self, request: &AdviceRequest) -> Result<AiFeedback, AdvisorError>;
}

#[derive(Clone, Debug)]
pub struct AdvisorConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl AdvisorConfig {
    /// `None` when `ASSESS_AI_API_KEY` is unset or blank.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let api_key = lookup("ASSESS_AI_API_KEY")?;
        if api_key.trim().is_empty() {
            return None;
        }
        let base_url =
            lookup("ASSESS_AI_BASE_URL").unwrap_or_else(|| "https://api.openai.com/v1".into());
        let model = lookup("ASSESS_AI_MODEL").unwrap_or_else(|| "gpt-4o-mini".into());
        Some(Self {
            base_url,
            api_key,
            model,
        })
    }
}

/// Advisor backed by an OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct HttpAdvisor {
    client: Client,
    config: AdvisorConfig,
}

impl HttpAdvisor {
    #[must_use]
    pub fn new(config: AdvisorConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// `None` when no API key is configured.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        AdvisorConfig::from_env().map(Self::new)
    }
}

#[async_trait]
impl AssessmentAdvisor for HttpAdvisor {
    #[tracing::instrument(
        skip(self, request),
        fields(session_id = %request.session_id, model = %self.config.model)
    )]
    async fn advise(&self, request: &AdviceRequest) -> Result<AiFeedback, AdvisorError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let payload = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You provide concise coaching feedback for assessments.".into(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt(request),
                },
            ],
            temperature: 0.6,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AdvisorError::HttpStatus(response.status()));
        }

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(AdvisorError::EmptyResponse)?;

        parse_feedback(&content)
    }
}

fn prompt(request: &AdviceRequest) -> String {
    let breakdown = serde_json::to_string(&request.breakdown).unwrap_or_else(|_| "[]".into());
    format!(
        "The learner finished a {scope} assessment with {correct} of {total} questions correct \
         and an overall score of {score} out of 100.\n\
         Topic breakdown (JSON):\n{breakdown}\n\n\
         Write a short encouraging summary (at most 60 words) and a study recommendation. \
         Respond strictly as JSON: {{\"summary\": string, \"recommendation\": \
         {{\"level\": string, \"focus_topics\": [string], \"suggested_actions\": [string]}}}}.",
        scope = request.scope,
        correct = request.correct_count,
        total = request.item_count,
        score = request.total_score,
    )
}

/// Parse model output into feedback, tolerating a fenced code block.
///
/// # Errors
///
/// Returns `AdvisorError::InvalidResponse` for malformed JSON or a blank summary.
pub fn parse_feedback(content: &str) -> Result<AiFeedback, AdvisorError> {
    let payload: FeedbackPayload = serde_json::from_str(strip_code_fence(content))
        .map_err(|err| AdvisorError::InvalidResponse(err.to_string()))?;

    let summary = payload.summary.trim();
    if summary.is_empty() {
        return Err(AdvisorError::InvalidResponse("summary is empty".into()));
    }

    let mut recommendation = payload.recommendation;
    recommendation.level = recommendation.level.trim().to_owned();
    recommendation.focus_topics = tidy(recommendation.focus_topics);
    recommendation.suggested_actions = tidy(recommendation.suggested_actions);
    recommendation
        .suggested_actions
        .truncate(MAX_SUGGESTED_ACTIONS);

    Ok(AiFeedback {
        summary: summary.to_owned(),
        recommendation,
    })
}

fn tidy(entries: Vec<String>) -> Vec<String> {
    entries
        .into_iter()
        .map(|entry| entry.trim().to_owned())
        .filter(|entry| !entry.is_empty())
        .collect()
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or(rest, |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[derive(Debug, Deserialize)]
struct FeedbackPayload {
    summary: String,
    #[serde(default)]
    recommendation: Recommendation,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}
