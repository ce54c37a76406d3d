//! Batch analyzer abstraction and the LLM-backed implementation.
//!
//! Defines the [`BatchAnalyzer`] trait and concrete implementations:
//! - **[`DisabledAnalyzer`]**: fails every call; used when no backend is configured.
//! - **[`LlmAnalyzer`]**: sends one prompt per batch to a text-generation API
//!   and parses the JSON object embedded in the reply.
//!
//! # Response Contract
//!
//! The backend is asked for a single JSON object with six fields:
//!
//! ```json
//! {
//!   "themes": [{ "name": "...", "count": 3,
//!                "sentiment": { "positive": 1, "neutral": 0, "negative": 2 },
//!                "quotes": ["..."], "description": "..." }],
//!   "nps": { "promoters": 1, "passives": 1, "detractors": 1 },
//!   "sentiment": { "positive": 1, "neutral": 1, "negative": 1 },
//!   "insights": ["..."],
//!   "feedbackSentiments": [{ "sentiment": "positive" }]
//! }
//! ```
//!
//! The object may be wrapped in prose. No JSON object at all is a
//! [`PipelineError::MalformedResponse`]; an object with missing or
//! mistyped fields is a [`PipelineError::SchemaViolation`].
//!
//! # Failure Policy
//!
//! One HTTP call per batch, no retries. Any transport failure is returned
//! to the pipeline, which aborts the run.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::PipelineError;
use crate::models::{
    BatchResult, FeedbackRecord, NpsCounts, SentimentCounts, SentimentLabel, Theme,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Produces one [`BatchResult`] for one batch of records.
///
/// `index` and `total` give the batch's position for prompt context only;
/// they do not change the result's meaning. Implementations do not need
/// to set `batch_index`/`batch_len` on the result; the pipeline does.
#[async_trait]
pub trait BatchAnalyzer: Send + Sync {
    /// Short backend identifier (e.g. `"anthropic:claude-3-5-sonnet"`).
    fn name(&self) -> String;

    async fn analyze(
        &self,
        batch: &[FeedbackRecord],
        index: usize,
        total: usize,
    ) -> Result<BatchResult, PipelineError>;
}

// ============ Prompt ============

/// Build the instruction sent for one batch.
pub fn build_prompt(batch: &[FeedbackRecord], index: usize, total: usize) -> String {
    let lines = batch
        .iter()
        .enumerate()
        .map(|(i, r)| format!("[{}] NPS: {} | \"{}\"", i + 1, r.nps_score, r.feedback_text))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a UX research analyst. Analyze batch {batch} of {total} of user feedback below.

FEEDBACK ({count} entries):
{lines}

Tasks:
1. Label every entry's sentiment as "positive", "neutral" or "negative", in entry order.
2. Group the feedback into themes (for example Usability Issues, Feature Requests,
   Onboarding/Learning Curve, Visual/Design, Bugs/Technical, Other). For each theme give
   the number of entries, its sentiment split, up to 3 verbatim quotes and a one-line description.
3. Count NPS promoters (9-10), passives (7-8) and detractors (0-6).
4. Count the overall sentiment distribution.
5. Write 2-3 key insights.

Reply with ONLY one JSON object, no markdown fences, shaped exactly like:
{{
  "themes": [
    {{
      "name": "Theme Name",
      "count": 0,
      "sentiment": {{ "positive": 0, "neutral": 0, "negative": 0 }},
      "quotes": ["quote"],
      "description": "Brief description"
    }}
  ],
  "nps": {{ "promoters": 0, "passives": 0, "detractors": 0 }},
  "sentiment": {{ "positive": 0, "neutral": 0, "negative": 0 }},
  "insights": ["insight"],
  "feedbackSentiments": [{{ "sentiment": "positive" }}]
}}"#,
        batch = index + 1,
        total = total,
        count = batch.len(),
        lines = lines,
    )
}

// ============ Response parsing ============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchResponse {
    themes: Vec<Theme>,
    nps: NpsCounts,
    sentiment: SentimentCounts,
    insights: Vec<String>,
    #[serde(default)]
    feedback_sentiments: Vec<EntrySentiment>,
}

#[derive(Debug, Deserialize)]
struct EntrySentiment {
    sentiment: SentimentLabel,
}

/// Locate the JSON object in a model reply.
///
/// Returns the first candidate from [`json_candidates`].
pub fn extract_json_payload(text: &str) -> Option<Value> {
    json_candidates(text).into_iter().next()
}

/// Every JSON object found in `text`, in the order they are tried.
///
/// The span from the first `{` to the last `}` comes first, followed by
/// each complete object starting at a `{`, left to right.
fn json_candidates(text: &str) -> Vec<Value> {
    let mut candidates = Vec::new();
    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        return candidates;
    };

    if end > start {
        if let Ok(value) = serde_json::from_str::<Value>(&text[start..=end]) {
            if value.is_object() {
                candidates.push(value);
            }
        }
    }

    for (pos, _) in text.match_indices('{') {
        let mut stream = serde_json::Deserializer::from_str(&text[pos..]).into_iter::<Value>();
        if let Some(Ok(value)) = stream.next() {
            if value.is_object() && !candidates.contains(&value) {
                candidates.push(value);
            }
        }
    }

    candidates
}

/// Parse a raw model reply into a [`BatchResult`].
///
/// The first candidate object that matches the batch schema wins, so a
/// small example object in surrounding prose does not shadow the payload.
pub fn parse_batch_response(
    text: &str,
    index: usize,
    batch_len: usize,
) -> Result<BatchResult, PipelineError> {
    let candidates = json_candidates(text);
    if candidates.is_empty() {
        return Err(PipelineError::MalformedResponse {
            batch: index,
            detail: "no JSON object found in response".to_string(),
        });
    }

    let mut first_error = None;
    let mut parsed = None;
    for candidate in candidates {
        match serde_json::from_value::<BatchResponse>(candidate) {
            Ok(response) => {
                parsed = Some(response);
                break;
            }
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    let response = parsed.ok_or_else(|| PipelineError::SchemaViolation {
        batch: index,
        detail: first_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no candidate matched".to_string()),
    })?;

    Ok(BatchResult {
        batch_index: index,
        batch_len,
        themes: response.themes,
        nps: response.nps,
        sentiment: response.sentiment,
        insights: response.insights,
        entry_sentiments: response
            .feedback_sentiments
            .into_iter()
            .map(|e| e.sentiment)
            .collect(),
    })
}

// ============ Disabled Analyzer ============

/// An analyzer that always fails.
///
/// Used when `llm.provider = "disabled"` in the configuration.
pub struct DisabledAnalyzer;

#[async_trait]
impl BatchAnalyzer for DisabledAnalyzer {
    fn name(&self) -> String {
        "disabled".to_string()
    }

    async fn analyze(
        &self,
        _batch: &[FeedbackRecord],
        index: usize,
        _total: usize,
    ) -> Result<BatchResult, PipelineError> {
        Err(PipelineError::Transport {
            batch: index,
            message: "analysis backend is disabled (set [llm].provider in the config)".to_string(),
        })
    }
}

// ============ LLM Analyzer ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provider {
    Anthropic,
    OpenAi,
}

/// Batch analyzer backed by a chat/messages completion API.
///
/// Supports the Anthropic Messages API and any OpenAI-compatible chat
/// completions endpoint (OpenAI, OpenRouter, local servers).
pub struct LlmAnalyzer {
    client: reqwest::Client,
    provider: Provider,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
    temperature: f64,
}

impl LlmAnalyzer {
    /// Create an analyzer from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `model` is not set, the provider is unknown, or
    /// the API key variable is unset for a hosted (non-`base_url`) backend.
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let provider = match config.provider.as_str() {
            "anthropic" => Provider::Anthropic,
            "openai" => Provider::OpenAi,
            other => anyhow::bail!("Unknown llm provider: {}", other),
        };

        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for provider {}", config.provider))?;

        let key_var = config.api_key_var();
        let api_key = std::env::var(&key_var).ok().filter(|k| !k.is_empty());
        if api_key.is_none() && config.base_url.is_none() {
            anyhow::bail!("{} environment variable not set", key_var);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            provider,
            endpoint: endpoint_for(provider, &config.resolved_base_url()),
            model,
            api_key,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    async fn complete(&self, prompt: &str, index: usize) -> Result<String, PipelineError> {
        let transport = |message: String| PipelineError::Transport {
            batch: index,
            message,
        };

        // Both APIs accept the same minimal request shape.
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let mut req = self.client.post(&self.endpoint).json(&body);
        match (self.provider, &self.api_key) {
            (Provider::Anthropic, Some(key)) => {
                req = req
                    .header("x-api-key", key)
                    .header("anthropic-version", ANTHROPIC_VERSION);
            }
            (Provider::Anthropic, None) => {
                req = req.header("anthropic-version", ANTHROPIC_VERSION);
            }
            (Provider::OpenAi, Some(key)) => {
                req = req.header("Authorization", format!("Bearer {}", key));
            }
            (Provider::OpenAi, None) => {}
        }

        let response = req
            .send()
            .await
            .map_err(|e| transport(format!("request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(transport(format!("API error {}: {}", status, text)));
        }

        let json: Value = serde_json::from_str(&text).map_err(|e| {
            PipelineError::MalformedResponse {
                batch: index,
                detail: format!("response envelope is not JSON: {}", e),
            }
        })?;

        let content = match self.provider {
            Provider::Anthropic => json["content"]
                .get(0)
                .and_then(|c| c["text"].as_str()),
            Provider::OpenAi => json["choices"]
                .get(0)
                .and_then(|c| c["message"]["content"].as_str()),
        };

        match content {
            Some(c) if !c.trim().is_empty() => Ok(c.to_string()),
            _ => Err(PipelineError::MalformedResponse {
                batch: index,
                detail: "response has no text content".to_string(),
            }),
        }
    }
}

/// Resolve the completion endpoint from the base URL.
fn endpoint_for(provider: Provider, base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    match provider {
        Provider::Anthropic => {
            if base.ends_with("/messages") {
                base.to_string()
            } else if base.ends_with("/v1") {
                format!("{}/messages", base)
            } else {
                format!("{}/v1/messages", base)
            }
        }
        Provider::OpenAi => {
            if base.ends_with("/chat/completions") {
                base.to_string()
            } else if base.ends_with("/v1") {
                format!("{}/chat/completions", base)
            } else {
                format!("{}/v1/chat/completions", base)
            }
        }
    }
}

#[async_trait]
impl BatchAnalyzer for LlmAnalyzer {
    fn name(&self) -> String {
        let provider = match self.provider {
            Provider::Anthropic => "anthropic",
            Provider::OpenAi => "openai",
        };
        format!("{}:{}", provider, self.model)
    }

    async fn analyze(
        &self,
        batch: &[FeedbackRecord],
        index: usize,
        total: usize,
    ) -> Result<BatchResult, PipelineError> {
        let prompt = build_prompt(batch, index, total);
        tracing::debug!(batch = index, records = batch.len(), "sending batch");

        let reply = self.complete(&prompt, index).await?;
        parse_batch_response(&reply, index, batch.len())
    }
}

/// Create the appropriate [`BatchAnalyzer`] based on configuration.
///
/// | Config Value | Analyzer |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledAnalyzer`] |
/// | `"anthropic"` | [`LlmAnalyzer`] (Messages API) |
/// | `"openai"` | [`LlmAnalyzer`] (chat completions) |
pub fn create_analyzer(config: &LlmConfig) -> anyhow::Result<Box<dyn BatchAnalyzer>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledAnalyzer)),
        "anthropic" | "openai" => Ok(Box::new(LlmAnalyzer::new(config)?)),
        other => anyhow::bail!("Unknown llm provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "themes": [{"name": "Bugs", "count": 2,
                    "sentiment": {"positive": 0, "neutral": 0, "negative": 2},
                    "quotes": ["crashes on save"], "description": "Stability"}],
        "nps": {"promoters": 1, "passives": 0, "detractors": 2},
        "sentiment": {"positive": 1, "neutral": 0, "negative": 2},
        "insights": ["Fix the save crash"],
        "feedbackSentiments": [{"sentiment": "negative"}, {"sentiment": "positive"}, {"sentiment": "negative"}]
    }"#;

    #[test]
    fn extracts_object_wrapped_in_prose() {
        let text = format!("Here is the analysis you asked for:\n{}\nLet me know!", VALID);
        let value = extract_json_payload(&text).unwrap();
        assert_eq!(value["nps"]["detractors"], 2);
    }

    #[test]
    fn falls_back_to_first_balanced_object() {
        // Greedy span includes the trailing brace in prose and fails to parse.
        let text = r#"{"themes": [], "nps": {"promoters": 0, "passives": 0, "detractors": 0}, "sentiment": {"positive": 0, "neutral": 0, "negative": 0}, "insights": []} (note: counts use {braces})"#;
        let value = extract_json_payload(text).unwrap();
        assert!(value["themes"].as_array().unwrap().is_empty());
    }

    #[test]
    fn skips_example_object_before_payload() {
        let text = format!(
            "Each entry is labelled like {{\"sentiment\": \"positive\"}}. Result:\n{}",
            VALID
        );
        let result = parse_batch_response(&text, 1, 3).unwrap();
        assert_eq!(result.nps.detractors, 2);
        assert_eq!(result.themes[0].quotes, vec!["crashes on save"]);
    }

    #[test]
    fn only_non_matching_objects_is_schema_violation() {
        let text = r#"Example: {"sentiment": "positive"} and {"note": 1}"#;
        assert!(matches!(
            parse_batch_response(text, 4, 2),
            Err(PipelineError::SchemaViolation { batch: 4, .. })
        ));
    }

    #[test]
    fn no_object_is_none() {
        assert!(extract_json_payload("I could not analyze this batch.").is_none());
        assert!(extract_json_payload("} backwards {").is_none());
    }

    #[test]
    fn parses_valid_reply() {
        let result = parse_batch_response(VALID, 4, 3).unwrap();
        assert_eq!(result.batch_index, 4);
        assert_eq!(result.batch_len, 3);
        assert_eq!(result.themes[0].name, "Bugs");
        assert_eq!(result.nps.total(), 3);
        assert_eq!(
            result.entry_sentiments,
            vec![
                SentimentLabel::Negative,
                SentimentLabel::Positive,
                SentimentLabel::Negative
            ]
        );
    }

    #[test]
    fn missing_reply_object_is_malformed() {
        let err = parse_batch_response("Sorry, no JSON today", 1, 3).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedResponse { batch: 1, .. }));
    }

    #[test]
    fn missing_required_field_is_schema_violation() {
        let err = parse_batch_response(r#"{"themes": [], "insights": []}"#, 0, 3).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaViolation { batch: 0, .. }));
    }

    #[test]
    fn mistyped_count_is_schema_violation() {
        let text = VALID.replace(r#""promoters": 1"#, r#""promoters": "one""#);
        let err = parse_batch_response(&text, 0, 3).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaViolation { .. }));
    }

    #[test]
    fn entry_sentiments_are_optional() {
        let text = r#"{"themes": [], "nps": {"promoters": 0, "passives": 0, "detractors": 0},
                       "sentiment": {"positive": 0, "neutral": 0, "negative": 0}, "insights": []}"#;
        let result = parse_batch_response(text, 0, 1).unwrap();
        assert!(result.entry_sentiments.is_empty());
    }

    #[test]
    fn prompt_lists_every_entry() {
        let batch = vec![FeedbackRecord::new("Too slow", 3), FeedbackRecord::new("Nice", 9)];
        let prompt = build_prompt(&batch, 1, 4);
        assert!(prompt.contains("batch 2 of 4"));
        assert!(prompt.contains("[1] NPS: 3 | \"Too slow\""));
        assert!(prompt.contains("[2] NPS: 9 | \"Nice\""));
        assert!(prompt.contains("\"feedbackSentiments\""));
    }

    #[test]
    fn endpoint_resolution() {
        assert_eq!(
            endpoint_for(Provider::OpenAi, "http://localhost:1234/v1"),
            "http://localhost:1234/v1/chat/completions"
        );
        assert_eq!(
            endpoint_for(Provider::OpenAi, "https://openrouter.ai/api/v1/chat/completions"),
            "https://openrouter.ai/api/v1/chat/completions"
        );
        assert_eq!(
            endpoint_for(Provider::Anthropic, "https://api.anthropic.com"),
            "https://api.anthropic.com/v1/messages"
        );
    }

    #[tokio::test]
    async fn disabled_analyzer_fails_with_transport() {
        let err = DisabledAnalyzer
            .analyze(&[FeedbackRecord::new("x", 5)], 0, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Transport { .. }));
    }
}
