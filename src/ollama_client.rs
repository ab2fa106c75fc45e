use futures::future::BoxFuture;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::classifier::TextGenerator;
use crate::config::OllamaConfig;
use crate::error::GenerationError;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Client for an Ollama-compatible `/api/generate` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    api_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(config: &OllamaConfig) -> Result<Self, GenerationError> {
        Self::with_timeout(config, config.timeout())
    }

    pub fn with_timeout(config: &OllamaConfig, timeout: Duration) -> Result<Self, GenerationError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            model: config.model.clone(),
        })
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        debug!("Sending {} char prompt to {} ({})", prompt.len(), self.api_url, self.model);

        let response = self
            .http
            .post(&self.api_url)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::Status(status.as_u16()));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Decode(e.to_string()))?;

        debug!("Raw model response: {}", body.response);
        Ok(body.response.trim().to_string())
    }

    /// Service root derived from the generate URL.
    pub fn root_url(&self) -> String {
        self.api_url.replace("/api/generate", "/")
    }

    /// Cheap reachability check: the service root answering 200 or 404
    /// means something is listening.
    pub async fn ping(&self) -> Result<(), GenerationError> {
        let url = self.root_url();
        let status = self.http.get(&url).send().await?.status();
        match status.as_u16() {
            200 | 404 => {
                info!("Ollama reachable at {} ({})", url, status);
                Ok(())
            }
            code => Err(GenerationError::Status(code)),
        }
    }
}

impl TextGenerator for OllamaClient {
    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, GenerationError>> {
        Box::pin(OllamaClient::generate(self, prompt))
    }
}
