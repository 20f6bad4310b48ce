//! Model invocation
//!
//! The underlying generative model is an opaque collaborator: text in, text
//! out, may fail or time out. The pipeline only depends on the
//! [`ModelInvoker`] trait; an OpenAI-style HTTP implementation is available
//! behind the `http-invoker` feature.

use crate::assemble::AssembledRequest;
use async_trait::async_trait;
use thiserror::Error;

/// Ways a model invocation can fail
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The provider did not answer within the deadline
    #[error("model invocation timed out")]
    Timeout,

    /// The provider returned an error
    #[error("provider error: {0}")]
    Provider(String),
}

/// Executes an assembled request against a generative model
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    /// Invoke the model and return its raw text response
    async fn invoke(&self, request: &AssembledRequest) -> Result<String, InvokeError>;
}

/// OpenAI-style chat-completions invoker
#[cfg(feature = "http-invoker")]
pub struct HttpInvoker {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
}

#[cfg(feature = "http-invoker")]
impl HttpInvoker {
    /// Create an invoker for the given API base URL and model name
    pub fn new(api_base: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
            api_key: None,
            model: model.into(),
        }
    }

    /// Set the API key
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

#[cfg(feature = "http-invoker")]
#[async_trait]
impl ModelInvoker for HttpInvoker {
    async fn invoke(&self, request: &AssembledRequest) -> Result<String, InvokeError> {
        use serde_json::{json, Value};

        // Instructions and user data travel in separate roles; the user block
        // keeps its delimiters even here.
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system_prompt() },
                { "role": "user", "content": request.user_block() },
            ],
        });

        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .json(&body);
        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                InvokeError::Timeout
            } else {
                InvokeError::Provider(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(InvokeError::Provider(format!(
                "API returned {status}: {text}"
            )));
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| InvokeError::Provider(format!("unparseable response: {e}")))?;

        parsed["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| InvokeError::Provider("response carried no content".to_string()))
    }
}
