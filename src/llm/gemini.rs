//! Google Generative Language client (`models/{model}:generateContent`).

use serde::{Deserialize, Serialize};

use super::{error_from_response, http_client, CompletionRequest, LlmClient, ProviderError};
use crate::config::ProviderConfig;

/// Blocking client for Gemini models.
pub struct GeminiClient {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl GeminiClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ProviderError::MissingCredential("gemini".into()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            client: http_client(config.timeout_secs)?,
            timeout_secs: config.timeout_secs,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Deserialize)]
struct ResponseCandidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

impl LlmClient for GeminiClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let url = self.endpoint();
        let body = GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part { text: &request.system }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: &request.prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: request.options.temperature,
                max_output_tokens: request.options.max_tokens,
                response_mime_type: "application/json",
            },
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .map_err(|e| ProviderError::from_transport(&e, &self.base_url, self.timeout_secs))?;

        if !response.status().is_success() {
            return Err(error_from_response(response));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .map_err(|e| ProviderError::MalformedBody(e.to_string()))?;

        extract_text(parsed)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Concatenate the text parts of the first candidate.
fn extract_text(response: GenerateContentResponse) -> Result<String, ProviderError> {
    let content = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .ok_or_else(|| ProviderError::MalformedBody("response contained no candidates".into()))?;

    Ok(content
        .parts
        .into_iter()
        .map(|p| p.text)
        .collect::<Vec<_>>()
        .join(""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::CompletionOptions;

    fn config_with_key(key: Option<&str>) -> ProviderConfig {
        let mut config = ProviderConfig::default_proposer();
        config.api_key = key.map(str::to_string);
        config
    }

    #[test]
    fn requires_api_key() {
        let err = GeminiClient::new(&config_with_key(None)).err().unwrap();
        assert!(matches!(err, ProviderError::MissingCredential(_)));
        let err = GeminiClient::new(&config_with_key(Some("  "))).err().unwrap();
        assert!(matches!(err, ProviderError::MissingCredential(_)));
    }

    #[test]
    fn endpoint_includes_model() {
        let client = GeminiClient::new(&config_with_key(Some("k"))).unwrap();
        assert!(client
            .endpoint()
            .ends_with("/models/gemini-flash-latest:generateContent"));
        assert!(!client.endpoint().contains("key="));
    }

    #[test]
    fn request_body_shape() {
        let request = CompletionRequest {
            system: "sys".into(),
            prompt: "user".into(),
            options: CompletionOptions { temperature: 0.2, max_tokens: 100 },
        };
        let body = GenerateContentRequest {
            system_instruction: Content { role: None, parts: vec![Part { text: &request.system }] },
            contents: vec![Content { role: Some("user"), parts: vec![Part { text: &request.prompt }] }],
            generation_config: GenerationConfig {
                temperature: request.options.temperature,
                max_output_tokens: request.options.max_tokens,
                response_mime_type: "application/json",
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "sys");
        assert!(json["systemInstruction"].get("role").is_none());
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 100);
        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
    }

    #[test]
    fn extracts_joined_parts() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"[{\"a\":"},{"text":"1}]"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), r#"[{"a":1}]"#);
    }

    #[test]
    fn empty_candidates_is_malformed() {
        let response: GenerateContentResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(matches!(
            extract_text(response),
            Err(ProviderError::MalformedBody(_))
        ));
    }
}
