//! AI text collaborator: motivational quotes and day summaries.
//!
//! Failures never reach task state. Callers that only need text for display
//! use the `*_or_placeholder` helpers, which degrade to a friendly sentence.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::error::TrackerError;
use crate::task::Task;

pub const NOTHING_TO_SUMMARIZE: &str = "No tasks were completed or tracked today.";
pub const QUOTE_PLACEHOLDER: &str = "Could not fetch inspiration right now. Keep going, one task at a time.";
pub const SUMMARY_PLACEHOLDER: &str = "Could not generate a summary right now. Please try again later.";

const QUOTE_PROMPT: &str = "Generate a single, concise motivational quote about productivity or achieving goals. Keep it under 20 words.";

/// Anything that turns a prompt into text.
pub trait TextGenerator {
    fn generate(&self, prompt: &str) -> impl Future<Output = anyhow::Result<String>> + Send;
}

/// Client for the Gemini `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GeminiClient {
    pub fn new(endpoint: &str, model: &str, api_key: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed building HTTP client for the AI service")?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        })
    }

    /// Reads `ai.*` keys; the key falls back to `GEMINI_API_KEY`, then `API_KEY`.
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let endpoint = cfg
            .get("ai.endpoint")
            .ok_or_else(|| anyhow!("ai.endpoint is not configured"))?;
        let model = cfg
            .get("ai.model")
            .ok_or_else(|| anyhow!("ai.model is not configured"))?;
        let timeout = Duration::from_secs(cfg.get_u64("ai.timeout")?.unwrap_or(30));
        let api_key = cfg
            .get("ai.key")
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .or_else(|| std::env::var("API_KEY").ok())
            .filter(|key| !key.trim().is_empty());

        Self::new(&endpoint, &model, api_key, timeout)
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

impl TextGenerator for GeminiClient {
    #[instrument(skip(self, prompt), fields(model = %self.model))]
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("AI API key is not configured; set ai.key or GEMINI_API_KEY");
        };

        let body = serde_json::to_vec(&GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
        })?;

        debug!(url = %self.url(), bytes = body.len(), "sending generateContent request");
        let response = self
            .http
            .post(self.url())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header("x-goog-api-key", api_key)
            .body(body)
            .send()
            .await
            .context("AI service request failed")?;

        let status = response.status();
        let text = response
            .text()
            .await
            .context("failed reading AI service response")?;
        if !status.is_success() {
            bail!("AI service returned {status}: {}", text.trim());
        }

        extract_text(&text)
    }
}

fn extract_text(raw: &str) -> anyhow::Result<String> {
    let parsed: GenerateResponse =
        serde_json::from_str(raw).context("AI service returned malformed JSON")?;
    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    let trimmed = text.trim();
    if trimmed.is_empty() {
        bail!("AI service returned no text");
    }
    Ok(trimmed.to_string())
}

/// Builds the coaching prompt, or `None` when nothing was completed or tracked.
pub fn summary_prompt(tasks: &[Task]) -> Option<String> {
    let completed: Vec<&Task> = tasks.iter().filter(|task| task.completed).collect();
    let tracked: Vec<&Task> = tasks.iter().filter(|task| task.time_spent > 0).collect();
    if completed.is_empty() && tracked.is_empty() {
        return None;
    }

    let completed_list = completed
        .iter()
        .map(|task| format!("- {} ({})", task.text, task.category))
        .collect::<Vec<_>>()
        .join("\n");
    let tracked_list = tracked
        .iter()
        .map(|task| {
            let minutes = (task.time_spent as f64 / 60.0).round() as u64;
            format!("- {} ({}): {minutes} minutes", task.text, task.category)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let or_none = |list: String| if list.is_empty() { "None".to_string() } else { list };

    Some(format!(
        "You are a positive and encouraging productivity coach. Based on the following user activity, \
         write a brief, uplifting summary of their day. Praise their effort and highlight their \
         accomplishments. Mention both completed tasks and where they spent their time.\n\n\
         Completed tasks:\n{}\n\nTime tracked on tasks:\n{}\n",
        or_none(completed_list),
        or_none(tracked_list)
    ))
}

pub struct Collaborator<G> {
    generator: G,
}

impl<G: TextGenerator> Collaborator<G> {
    pub fn new(generator: G) -> Self {
        Self { generator }
    }

    #[instrument(skip(self))]
    pub async fn inspirational_quote(&self) -> Result<String, TrackerError> {
        let quote = self
            .generator
            .generate(QUOTE_PROMPT)
            .await
            .map_err(TrackerError::AiService)?;
        info!(words = quote.split_whitespace().count(), "received quote");
        Ok(quote)
    }

    /// Summarizes completed and time-tracked tasks. Returns the canned
    /// sentence without calling the service when there is nothing to say.
    #[instrument(skip(self, tasks), fields(tasks = tasks.len()))]
    pub async fn summarize_day(&self, tasks: &[Task]) -> Result<String, TrackerError> {
        let Some(prompt) = summary_prompt(tasks) else {
            debug!("nothing completed or tracked; skipping AI call");
            return Ok(NOTHING_TO_SUMMARIZE.to_string());
        };
        self.generator
            .generate(&prompt)
            .await
            .map_err(TrackerError::AiService)
    }

    pub async fn quote_or_placeholder(&self) -> String {
        match self.inspirational_quote().await {
            Ok(quote) => quote,
            Err(err) => {
                warn!(error = %err, "quote unavailable; showing placeholder");
                QUOTE_PLACEHOLDER.to_string()
            }
        }
    }

    pub async fn summary_or_placeholder(&self, tasks: &[Task]) -> String {
        match self.summarize_day(tasks).await {
            Ok(summary) => summary,
            Err(err) => {
                warn!(error = %err, "summary unavailable; showing placeholder");
                SUMMARY_PLACEHOLDER.to_string()
            }
        }
    }
}
