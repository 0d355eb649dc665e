//! AI analysis client for tournament enrichment.
//!
//! Builds a prompt from a candidate's descriptive fields and requests one
//! plain-text completion from an Anthropic-style messages endpoint. Failures
//! degrade to a missing analysis; they never block persistence.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use turnier_core::Candidate;

pub const CRATE_NAME: &str = "turnier-analyze";

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1000;

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("analysis request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("analysis service error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("analysis timed out after {0:?}")]
    Timeout(Duration),
    #[error("analysis response contained no text")]
    EmptyCompletion,
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, candidate: &Candidate) -> Result<String, AnalyzeError>;
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

pub struct ClaudeAnalyzer {
    api_key: String,
    model: String,
    timeout: Duration,
    http: reqwest::Client,
    base_url: String,
}

impl ClaudeAnalyzer {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            timeout,
            http: reqwest::Client::new(),
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    async fn request(&self, prompt: String) -> Result<String, AnalyzeError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            temperature: 0.0,
            system: "You are an expert on chess tournaments. Respond with the requested \
                     analysis only, no preamble.",
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .http
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AnalyzeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: MessagesResponse = response.json().await?;
        body.content
            .into_iter()
            .find_map(|block| block.text)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(AnalyzeError::EmptyCompletion)
    }
}

#[async_trait]
impl Analyzer for ClaudeAnalyzer {
    async fn analyze(&self, candidate: &Candidate) -> Result<String, AnalyzeError> {
        let prompt = build_prompt(candidate);
        tracing::debug!(tournament = %candidate.name, model = %self.model, "requesting analysis");
        match tokio::time::timeout(self.timeout, self.request(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(AnalyzeError::Timeout(self.timeout)),
        }
    }
}

/// Render the descriptive fields into the analysis prompt.
pub fn build_prompt(candidate: &Candidate) -> String {
    let mut lines = vec![
        "Write a brief analysis (two to three sentences) of this chess tournament for \
         players deciding whether to attend. Cover the likely field strength, format, \
         and who the event suits. Do not invent details the data does not support."
            .to_string(),
        String::new(),
        format!("Name: {}", candidate.name),
        format!("Month: {}", candidate.month),
        format!("Year: {}", candidate.year),
    ];
    if let Some(start) = candidate.start_date {
        lines.push(format!("Start date: {start}"));
    }
    if let Some(end) = candidate.end_date {
        lines.push(format!("End date: {end}"));
    }
    if let Some(city) = &candidate.city {
        lines.push(format!("City: {city}"));
    }
    if let Some(country) = &candidate.country {
        lines.push(format!("Country: {country}"));
    }
    lines.push(format!(
        "Scope: {}",
        if candidate.is_international {
            "international"
        } else {
            "national"
        }
    ));
    if let Some(tournament_type) = candidate.tournament_type {
        lines.push(format!("Time control: {tournament_type}"));
    }
    if let Some(category) = candidate.category {
        lines.push(format!("Category: {category}"));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnier_core::{Category, Month, TournamentType};

    #[test]
    fn prompt_includes_known_fields_and_omits_absent_ones() {
        let candidate = Candidate {
            name: "Berliner Sommer Open".to_string(),
            month: Month::June,
            year: 2025,
            start_date: None,
            end_date: None,
            city: Some("Berlin".to_string()),
            country: Some("Germany".to_string()),
            is_international: false,
            tournament_type: Some(TournamentType::Standard),
            category: Some(Category::Open),
        };

        let prompt = build_prompt(&candidate);
        assert!(prompt.contains("Name: Berliner Sommer Open"));
        assert!(prompt.contains("Month: June"));
        assert!(prompt.contains("City: Berlin"));
        assert!(prompt.contains("Scope: national"));
        assert!(prompt.contains("Time control: Standard"));
        assert!(!prompt.contains("Start date"));
    }

    #[test]
    fn completion_text_is_extracted_from_the_first_text_block() {
        let body: MessagesResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"A strong summer open."}]}"#,
        )
        .unwrap();
        assert_eq!(
            body.content.into_iter().find_map(|b| b.text).as_deref(),
            Some("A strong summer open.")
        );
    }
}
