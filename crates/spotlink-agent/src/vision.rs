//! [`VisionDriver`] – asks a local multimodal model about a camera frame.
//!
//! Talks to [Ollama](https://ollama.com)'s native `/api/generate` endpoint
//! with the frame attached as a base64 image and streaming disabled.
//!
//! ```rust,no_run
//! use spotlink_agent::vision::{Vision, VisionDriver};
//!
//! # async fn demo(png_base64: &str) {
//! let driver = VisionDriver::new("http://localhost:11434", "qwen3-vl:4b");
//! // Requires a running Ollama instance.
//! let answer = driver.describe(png_base64, "Is the path clear?").await;
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "qwen3-vl:4b";

/// Image analysis is slow on small machines.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Sent as the `system` field of every request.
pub const SYSTEM_PROMPT: &str = "You are the eyes of a walking robot, answering in real time. \
Keep answers short and factual. No small talk. Give only what the request asks for.";

#[derive(Error, Debug)]
pub enum VisionError {
    /// The HTTP request to the model server failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The model server answered with something other than a generation.
    #[error("Unexpected response format: {0}")]
    BadResponse(String),
}

/// Anything that can answer a prompt about a base64-encoded PNG.
pub trait Vision {
    fn describe(
        &self,
        png_base64: &str,
        prompt: &str,
    ) -> impl Future<Output = Result<String, VisionError>> + Send;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    images: [&'a str; 1],
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

pub struct VisionDriver {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl VisionDriver {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }
}

impl Vision for VisionDriver {
    /// # Errors
    ///
    /// [`VisionError::Http`] if the request fails or times out,
    /// [`VisionError::BadResponse`] if the model returns no text.
    async fn describe(&self, png_base64: &str, prompt: &str) -> Result<String, VisionError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            system: SYSTEM_PROMPT,
            images: [png_base64],
            stream: false,
        };
        debug!(model = %self.model, bytes = png_base64.len(), "querying vision model");

        let reply: GenerateResponse = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let text = reply.response.trim();
        if text.is_empty() {
            return Err(VisionError::BadResponse("model returned an empty answer".into()));
        }
        Ok(text.to_string())
    }
}
