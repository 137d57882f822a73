//! HTTP translation engine
//!
//! Talks to a LibreTranslate-compatible endpoint (`POST {endpoint}/translate`).
//! Requests run on a tokio runtime owned by the engine, created on
//! initialization and dropped on dispose.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Runtime;
use tracing::{debug, info};

use crate::translation::{Budget, TranslationEngine, TranslationError};

/// Configuration for an HTTP translation engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpEngineConfig {
    /// Name used in logs and outcomes
    pub name: String,
    /// Base URL of the service
    pub endpoint: String,
    pub api_key: Option<String>,
    /// Per-request timeout
    pub timeout_ms: u64,
    /// Metered allowance, unbounded when absent
    pub budget: Option<u64>,
    /// License feature required to use this engine
    pub license_feature: Option<String>,
}

impl Default for HttpEngineConfig {
    fn default() -> Self {
        Self {
            name: "libretranslate".to_string(),
            endpoint: "http://localhost:5000".to_string(),
            api_key: None,
            timeout_ms: 5000,
            budget: None,
            license_feature: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: Option<String>,
    error: Option<String>,
}

/// Engine state that only exists between initialize and dispose
struct Connection {
    runtime: Runtime,
    client: reqwest::Client,
}

pub struct HttpTranslationEngine {
    config: HttpEngineConfig,
    connection: Option<Connection>,
    budget: Budget,
}

impl HttpTranslationEngine {
    pub fn new(config: HttpEngineConfig) -> Self {
        let budget = config.budget.map(Budget::Remaining).unwrap_or(Budget::Unbounded);
        Self {
            config,
            connection: None,
            budget,
        }
    }

    pub fn config(&self) -> &HttpEngineConfig {
        &self.config
    }

    fn url(&self) -> String {
        format!("{}/translate", self.config.endpoint.trim_end_matches('/'))
    }

    async fn request(
        client: &reqwest::Client,
        url: &str,
        body: &TranslateRequest<'_>,
    ) -> Result<(reqwest::StatusCode, String), TranslationError> {
        let response = client.post(url).json(body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        Ok((status, text))
    }
}

/// Extract the translation from a LibreTranslate response body
fn parse_response(engine: &str, status: u16, body: &str) -> Result<String, TranslationError> {
    let parsed: Option<TranslateResponse> = serde_json::from_str(body).ok();

    if !(200..300).contains(&status) {
        let message = parsed
            .and_then(|r| r.error)
            .unwrap_or_else(|| format!("HTTP {}", status));
        return Err(TranslationError::Engine {
            engine: engine.to_string(),
            message,
        });
    }

    let response = parsed.ok_or_else(|| {
        TranslationError::InvalidResponse(format!("unparseable body from '{}'", engine))
    })?;

    match response.translated_text {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(TranslationError::InvalidResponse(
            response
                .error
                .unwrap_or_else(|| "missing translatedText".to_string()),
        )),
    }
}

impl TranslationEngine for HttpTranslationEngine {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn initialize(&mut self) -> Result<(), TranslationError> {
        if self.connection.is_some() {
            return Ok(());
        }

        let init_error = |e: String| TranslationError::Initialization(self.config.name.clone(), e);

        let runtime = Runtime::new().map_err(|e| init_error(e.to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(self.config.timeout_ms.max(1)))
            .build()
            .map_err(|e| init_error(e.to_string()))?;

        info!("HTTP translation engine '{}' -> {}", self.config.name, self.config.endpoint);
        self.connection = Some(Connection { runtime, client });
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.connection.is_some()
    }

    fn remaining_budget(&self) -> Budget {
        self.budget
    }

    fn translate(&mut self, text: &str, from: &str, to: &str) -> Result<String, TranslationError> {
        let url = self.url();
        let connection = self
            .connection
            .as_ref()
            .ok_or_else(|| TranslationError::Unavailable(self.config.name.clone()))?;

        let body = TranslateRequest {
            q: text,
            source: from,
            target: to,
            format: "text",
            api_key: self.config.api_key.as_deref(),
        };

        debug!("POST {} ({} chars, {}->{})", url, text.chars().count(), from, to);
        let (status, response) = connection
            .runtime
            .block_on(Self::request(&connection.client, &url, &body))?;

        let translated = parse_response(&self.config.name, status.as_u16(), &response)?;
        self.budget.charge(text.chars().count() as u64);
        Ok(translated)
    }

    fn license_feature(&self) -> Option<&str> {
        self.config.license_feature.as_deref()
    }

    fn dispose(&mut self) {
        if self.connection.take().is_some() {
            debug!("HTTP translation engine '{}' disposed", self.config.name);
        }
    }
}
