use serde::{Deserialize, Serialize};

use super::{error_from_response, http_client, CompletionRequest, LlmClient, ProviderError};
use crate::config::ProviderConfig;

/// Ollama HTTP client for local inference (no credentials).
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client: http_client(config.timeout_secs)?,
            timeout_secs: config.timeout_secs,
        })
    }
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    format: &'static str,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

impl LlmClient for OllamaClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt: &request.prompt,
            system: &request.system,
            stream: false,
            format: "json",
            options: OllamaOptions {
                temperature: request.options.temperature,
                num_predict: request.options.max_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| ProviderError::from_transport(&e, &self.base_url, self.timeout_secs))?;

        if !response.status().is_success() {
            return Err(error_from_response(response));
        }

        let parsed: OllamaGenerateResponse = response
            .json()
            .map_err(|e| ProviderError::MalformedBody(e.to_string()))?;

        Ok(parsed.response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;

    fn local_config(url: &str) -> ProviderConfig {
        let mut config = ProviderConfig::default_verifier();
        config.kind = ProviderKind::Ollama;
        config.base_url = url.into();
        config.model = "llama3:8b".into();
        config
    }

    #[test]
    fn ollama_client_constructor() {
        let client = OllamaClient::new(&local_config("http://localhost:11434")).unwrap();
        assert_eq!(client.base_url, "http://localhost:11434");
        assert_eq!(client.model_name(), "llama3:8b");
    }

    #[test]
    fn ollama_client_trims_trailing_slash() {
        let client = OllamaClient::new(&local_config("http://localhost:11434/")).unwrap();
        assert_eq!(client.base_url, "http://localhost:11434");
    }

    #[test]
    fn request_asks_for_json_without_streaming() {
        let body = OllamaGenerateRequest {
            model: "m",
            prompt: "p",
            system: "s",
            stream: false,
            format: "json",
            options: OllamaOptions { temperature: 0.1, num_predict: 512 },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["format"], "json");
        assert_eq!(json["options"]["num_predict"], 512);
    }

    #[test]
    fn unreachable_host_is_transient() {
        // Port 9 (discard) on loopback is closed on any normal test machine.
        let mut config = local_config("http://127.0.0.1:9");
        config.timeout_secs = 2;
        let client = OllamaClient::new(&config).unwrap();
        let err = client
            .complete(&CompletionRequest {
                system: String::new(),
                prompt: String::new(),
                options: Default::default(),
            })
            .unwrap_err();
        assert!(err.is_transient(), "got {err:?}");
    }
}
