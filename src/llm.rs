//! Chat-completion client and the prompts built on top of it.
//!
//! Transport and parsing failures never propagate as errors: they come back as
//! [`LlmOutcome::Failed`] and are logged, so a flaky endpoint only degrades the
//! narrative parts of the output. A missing API key is different and is
//! rejected when the client is built.

use crate::config::LlmConfig;
use crate::data::BorrowerRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const HTTP_ERROR_SENTINEL: &str = "Could not generate response from LLM (HTTP Error).";
pub const UNEXPECTED_ERROR_SENTINEL: &str =
    "Could not generate response from LLM (Unexpected Error).";

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The endpoint answered with a non-success status.
    Http { status: u16 },
    /// Connection, timeout or TLS failure.
    Transport,
    /// The body did not contain `choices[0].message.content`.
    MalformedResponse,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LlmOutcome {
    Generated(String),
    Failed { kind: FailureKind, reason: String },
}

impl LlmOutcome {
    pub fn is_generated(&self) -> bool {
        matches!(self, Self::Generated(_))
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Generated(text) => Some(text),
            Self::Failed { .. } => None,
        }
    }

    /// The generated text, or a fixed human-readable placeholder on failure.
    pub fn text_or_sentinel(&self) -> &str {
        match self {
            Self::Generated(text) => text,
            Self::Failed {
                kind: FailureKind::Http { .. },
                ..
            } => HTTP_ERROR_SENTINEL,
            Self::Failed { .. } => UNEXPECTED_ERROR_SENTINEL,
        }
    }
}

impl fmt::Display for LlmOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text_or_sentinel())
    }
}

/// Anything that can answer a chat-completion request.
pub trait ChatClient {
    fn complete(&self, request: &ChatRequest) -> LlmOutcome;
}

#[derive(Serialize)]
struct ChatPayload<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Blocking client for an OpenRouter-compatible endpoint.
pub struct OpenRouterClient {
    config: LlmConfig,
    agent: ureq::Agent,
}

impl OpenRouterClient {
    pub fn new(config: LlmConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Self { config, agent }
    }

    /// Build a client from the environment; a missing key is fatal.
    pub fn from_env() -> crate::Result<Self> {
        Ok(Self::new(LlmConfig::from_env()?))
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }
}

impl ChatClient for OpenRouterClient {
    fn complete(&self, request: &ChatRequest) -> LlmOutcome {
        let payload = ChatPayload {
            model: &self.config.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        tracing::debug!(
            model = %self.config.model,
            messages = request.messages.len(),
            max_tokens = request.max_tokens,
            "requesting chat completion"
        );

        let response = self
            .agent
            .post(&self.config.api_url)
            .set("Authorization", &format!("Bearer {}", self.config.api_key))
            .set("Content-Type", "application/json")
            .send_json(&payload);

        let outcome = match response {
            Ok(resp) => match resp.into_json::<ChatResponse>() {
                Ok(body) => match body.choices.into_iter().next() {
                    Some(choice) => LlmOutcome::Generated(choice.message.content),
                    None => LlmOutcome::Failed {
                        kind: FailureKind::MalformedResponse,
                        reason: "response contained no choices".to_string(),
                    },
                },
                Err(err) => LlmOutcome::Failed {
                    kind: FailureKind::MalformedResponse,
                    reason: err.to_string(),
                },
            },
            Err(ureq::Error::Status(status, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                LlmOutcome::Failed {
                    kind: FailureKind::Http { status },
                    reason: format!("HTTP {} - Response: {}", status, body),
                }
            }
            Err(err) => LlmOutcome::Failed {
                kind: FailureKind::Transport,
                reason: err.to_string(),
            },
        };

        if let LlmOutcome::Failed { kind, reason } = &outcome {
            tracing::warn!(?kind, %reason, "chat completion failed");
        }
        outcome
    }
}

/// "high risk" above 0.5, "low risk" otherwise.
pub fn risk_level(score: f64) -> &'static str {
    if score > 0.5 {
        "high risk"
    } else {
        "low risk"
    }
}

/// `Num_Missed_Payments` becomes `Num Missed Payments`.
fn title_case(column: &str) -> String {
    column
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn borrower_details(borrower: &BorrowerRecord) -> String {
    borrower
        .sorted_fields()
        .into_iter()
        .map(|(column, value)| format!("- {}: {}", title_case(column), value))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Borrower context shared by the explanation and suggestion prompts.
#[derive(Debug, Clone, Copy)]
pub struct PredictionContext<'a> {
    pub borrower: &'a BorrowerRecord,
    pub risk_score: f64,
    pub strategy: &'a str,
    pub segment: &'a str,
}

pub fn explanation_request(
    context: PredictionContext<'_>,
    feature_importances: &[(String, f64)],
) -> ChatRequest {
    let importances = feature_importances
        .iter()
        .map(|(feature, importance)| format!("{} ({:.2})", feature, importance))
        .collect::<Vec<_>>()
        .join(", ");

    let user = format!(
        "A borrower has been assessed. Details:\n{}\nPrediction: {} (Score: {:.2}). Strategy: {}. Segment: {}. \
         The most influential factors for this prediction were: {}. Please explain the reasons.",
        borrower_details(context.borrower),
        risk_level(context.risk_score),
        context.risk_score,
        context.strategy,
        context.segment,
        importances
    );

    ChatRequest::new(vec![
        ChatMessage::system("You are an AI assistant that explains loan recovery predictions."),
        ChatMessage::user(user),
    ])
}

pub fn recovery_actions_request(context: PredictionContext<'_>) -> ChatRequest {
    let user = format!(
        "A borrower is {} (Score: {:.2}). Profile:\n{}\nSegment: {}. Assigned Strategy: \"{}\". \
         What detailed steps or alternative strategies would you recommend? Provide a bulleted list.",
        risk_level(context.risk_score),
        context.risk_score,
        borrower_details(context.borrower),
        context.segment,
        context.strategy
    );

    ChatRequest::new(vec![
        ChatMessage::system(
            "You are an expert loan recovery agent AI. Suggest specific, actionable recovery strategies.",
        ),
        ChatMessage::user(user),
    ])
}

/// Ask the model why a borrower received its score.
pub fn explain_prediction(
    client: &dyn ChatClient,
    context: PredictionContext<'_>,
    feature_importances: &[(String, f64)],
) -> LlmOutcome {
    client.complete(&explanation_request(context, feature_importances))
}

/// Ask the model for concrete recovery steps for a borrower.
pub fn suggest_recovery_actions(client: &dyn ChatClient, context: PredictionContext<'_>) -> LlmOutcome {
    client.complete(&recovery_actions_request(context))
}
