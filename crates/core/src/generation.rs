use crate::error::GenerationError;
use crate::traits::AnswerGenerator;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

pub const SYSTEM_INSTRUCTIONS: &str = "You are an expert document analyst. Answer questions based ONLY on the provided context from uploaded documents.

If the context doesn't contain enough information, clearly state what's missing.
Always cite specific sources when making claims.
For multilingual documents, maintain the language consistency of the user's question.
Structure your response clearly with relevant details.";

pub const INSUFFICIENT_INFORMATION: &str =
    "I don't have enough information to answer that question based on the uploaded documents.";

pub fn build_prompt(context: &str, query: &str) -> String {
    format!(
        "Context from documents:\n{context}\n\nUser Question: {query}\n\n\
         Please provide a comprehensive answer based on the context above."
    )
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    pub timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.5-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Gemini `generateContent` over REST.
pub struct GeminiGenerator {
    config: GeminiConfig,
    client: Client,
}

impl GeminiGenerator {
    pub fn new(config: GeminiConfig) -> Result<Self, GenerationError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }
}

fn request_body(system_instructions: &str, context_prompt: &str) -> Value {
    json!({
        "systemInstruction": {
            "parts": [{ "text": system_instructions }]
        },
        "contents": [{
            "role": "user",
            "parts": [{ "text": context_prompt }]
        }]
    })
}

fn parse_generation_response(parsed: &Value) -> Result<String, GenerationError> {
    let parts = parsed
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| GenerationError::BackendResponse {
            backend: "gemini".to_string(),
            details: "response has no candidate content".to_string(),
        })?;

    let text = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        return Err(GenerationError::BackendResponse {
            backend: "gemini".to_string(),
            details: "candidate text is empty".to_string(),
        });
    }
    Ok(text)
}

#[async_trait]
impl AnswerGenerator for GeminiGenerator {
    async fn generate(
        &self,
        system_instructions: &str,
        context_prompt: &str,
    ) -> Result<String, GenerationError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                GenerationError::NotConfigured("Google API key not configured".to_string())
            })?;

        let url = format!(
            "{}/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        );

        let response = self
            .client
            .post(url)
            .query(&[("key", api_key)])
            .json(&request_body(system_instructions, context_prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(GenerationError::BackendResponse {
                backend: "gemini".to_string(),
                details: format!("{status}: {details}"),
            });
        }

        let parsed: Value = response.json().await?;
        parse_generation_response(&parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_api_key_is_not_configured() {
        let generator = GeminiGenerator::new(GeminiConfig::default()).unwrap();
        let error = generator.generate("system", "prompt").await.unwrap_err();
        assert!(matches!(error, GenerationError::NotConfigured(_)));
    }

    #[test]
    fn prompt_contains_context_and_question() {
        let prompt = build_prompt("Source 1 (Page 2, Similarity: 0.80):\ntext\n", "What is AI?");
        assert!(prompt.starts_with("Context from documents:\nSource 1"));
        assert!(prompt.contains("User Question: What is AI?"));
    }

    #[test]
    fn request_body_separates_system_and_user_parts() {
        let body = request_body("be precise", "the prompt");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be precise");
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "the prompt");
    }

    #[test]
    fn candidate_parts_are_concatenated() {
        let parsed = json!({
            "candidates": [{
                "content": { "parts": [ { "text": "Artificial " }, { "text": "intelligence." } ] }
            }]
        });
        assert_eq!(parse_generation_response(&parsed).unwrap(), "Artificial intelligence.");
    }

    #[test]
    fn empty_candidates_are_an_error() {
        let parsed = json!({ "candidates": [] });
        assert!(matches!(
            parse_generation_response(&parsed),
            Err(GenerationError::BackendResponse { .. })
        ));
    }
}
