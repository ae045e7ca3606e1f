//! # ai — narrative note from Gemini, Claude or OpenAI
//!
//! Provider chosen by `AI_PROVIDER`. Quota responses (429 / 503) are retried
//! with exponential backoff; any other failure surfaces as
//! [`PipelineError::ExternalServiceUnavailable`] and the caller stores
//! [`AI_FAILURE_NOTE`] instead.
//!
//! With the provider disabled, [`rule_based_note`] derives a short note from
//! the stock change and the largest takers of delivery.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{AiProvider, Config};
use crate::error::PipelineError;
use crate::models::{DealerActivity, Direction, StockSnapshot};

/// Stored when the provider could not produce a note.
pub const AI_FAILURE_NOTE: &str = "AI analysis unavailable.";

/// Bullion banks whose delivery-taking is worth calling out.
pub const MAJOR_DEALERS: &[&str] = &["JPMORGAN", "CITI", "HSBC", "SCOTIA", "BOFA", "WELLS", "STONEX"];

const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_secs(2);

// ─── Shared Response ──────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
enum CallError {
    #[error("rate limited (HTTP {0})")]
    RateLimited(u16),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Calls the configured provider, retrying quota errors.
pub async fn call_ai(
    client: &reqwest::Client,
    config: &Config,
    prompt: &str,
) -> Result<String, PipelineError> {
    let api_key = match (config.ai_provider, config.ai_api_key.as_deref()) {
        (AiProvider::Disabled, _) => {
            return Err(PipelineError::external("AI narrative", "provider disabled"))
        }
        (_, None) => return Err(PipelineError::ConfigurationMissing("AI_API_KEY is required".into())),
        (_, Some(k)) => k,
    };

    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = match config.ai_provider {
            AiProvider::Gemini   => call_gemini(client, config, api_key, prompt).await,
            AiProvider::Claude   => call_claude(client, config, api_key, prompt).await,
            AiProvider::OpenAi   => call_openai(client, config, api_key, prompt).await,
            AiProvider::Disabled => Err(anyhow::anyhow!("provider disabled").into()),
        };

        match result {
            Ok(text) => return Ok(text.trim().to_string()),
            Err(CallError::RateLimited(status)) if attempt < MAX_ATTEMPTS => {
                let wait = BASE_BACKOFF * 2u32.pow(attempt - 1);
                warn!(status, attempt, ?wait, "AI provider rate limited, backing off");
                tokio::time::sleep(wait).await;
            }
            Err(e) => return Err(PipelineError::external("AI narrative", e)),
        }
    }
}

async fn send_checked(req: reqwest::RequestBuilder, provider: &str) -> Result<reqwest::Response, CallError> {
    let resp = req
        .send()
        .await
        .with_context(|| format!("{provider} API request failed"))?;

    let status = resp.status();
    if status.as_u16() == 429 || status.as_u16() == 503 {
        return Err(CallError::RateLimited(status.as_u16()));
    }
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(anyhow::anyhow!("{provider} API error {status}: {text}").into());
    }
    Ok(resp)
}

// ─── Google Gemini ────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiCandidateContent,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: String,
}

async fn call_gemini(
    client: &reqwest::Client,
    config: &Config,
    api_key: &str,
    prompt: &str,
) -> Result<String, CallError> {
    let body = GeminiRequest {
        contents: vec![GeminiContent { parts: vec![GeminiPart { text: prompt }] }],
    };

    debug!("Calling Gemini API...");

    let req = client
        .post("https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent")
        .header("x-goog-api-key", api_key)
        .json(&body)
        .timeout(config.http_timeout);
    let data: GeminiResponse = send_checked(req, "Gemini")
        .await?
        .json()
        .await
        .context("Gemini response parse error")?;

    let text: String = data
        .candidates
        .into_iter()
        .next()
        .map(|c| c.content.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(anyhow::anyhow!("Gemini returned empty content").into());
    }
    Ok(text)
}

// ─── Anthropic Claude ─────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ClaudeRequest<'a> {
    model:      &'a str,
    max_tokens: u32,
    messages:   Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role:    &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContent>,
}

#[derive(Deserialize)]
struct ClaudeContent {
    text: String,
}

async fn call_claude(
    client: &reqwest::Client,
    config: &Config,
    api_key: &str,
    prompt: &str,
) -> Result<String, CallError> {
    let body = ClaudeRequest {
        model:      "claude-3-5-sonnet-20241022",
        max_tokens: 256,
        messages:   vec![ChatMessage { role: "user", content: prompt }],
    };

    debug!("Calling Claude API...");

    let req = client
        .post("https://api.anthropic.com/v1/messages")
        .header("x-api-key", api_key)
        .header("anthropic-version", "2023-06-01")
        .json(&body)
        .timeout(config.http_timeout);
    let data: ClaudeResponse = send_checked(req, "Claude")
        .await?
        .json()
        .await
        .context("Claude response parse error")?;

    Ok(data
        .content
        .into_iter()
        .next()
        .map(|c| c.text)
        .context("Claude returned empty content")?)
}

// ─── OpenAI GPT-4o ────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model:    &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMsg,
}

#[derive(Deserialize)]
struct OpenAiChoiceMsg {
    content: Option<String>,
}

async fn call_openai(
    client: &reqwest::Client,
    config: &Config,
    api_key: &str,
    prompt: &str,
) -> Result<String, CallError> {
    let body = OpenAiRequest {
        model:    "gpt-4o",
        messages: vec![
            ChatMessage { role: "system", content: "You are a senior commodities analyst. Be brief." },
            ChatMessage { role: "user",   content: prompt },
        ],
    };

    debug!("Calling OpenAI API...");

    let req = client
        .post("https://api.openai.com/v1/chat/completions")
        .bearer_auth(api_key)
        .json(&body)
        .timeout(config.http_timeout);
    let data: OpenAiResponse = send_checked(req, "OpenAI")
        .await?
        .json()
        .await
        .context("OpenAI response parse error")?;

    Ok(data
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .context("OpenAI returned empty content")?)
}

// ─── Rule-based Note ──────────────────────────────────────────────────────────

/// Inventory direction plus a call-out when a major dealer is the largest
/// taker of delivery.
pub fn rule_based_note(stock: &StockSnapshot, activities: &[DealerActivity]) -> String {
    let mut note = if stock.net_change() < 0.0 {
        "📉 Drawdown".to_string()
    } else if stock.net_change() > 0.0 {
        "📦 Inflow".to_string()
    } else {
        "⚖️ Neutral".to_string()
    };

    let top_stopper = activities
        .iter()
        .filter(|a| a.direction == Direction::Stopped)
        .max_by(|a, b| a.volume.cmp(&b.volume).then_with(|| b.firm_name.cmp(&a.firm_name)));

    if let Some(a) = top_stopper {
        let upper = a.firm_name.to_uppercase();
        if let Some(dealer) = MAJOR_DEALERS.iter().find(|d| upper.contains(*d)) {
            note.push_str(&format!(" | {dealer} taking delivery ({})", a.volume));
        }
    }
    note
}
