//! HTTP-backed oracle client (OpenAI-compatible chat completions)
//!
//! One client serves both oracle roles. The transform prompt asks the model
//! to return the full revised unit text or a reply opening with the reserved
//! failure marker; the address prompt asks it to pick exactly one candidate
//! label or answer `НЕТ`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::{AddressOracle, OracleError, TransformOracle, FAILURE_MARKER};

/// Oracle configuration loaded from environment or built explicitly.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl OracleConfig {
    /// Load from environment variables.
    pub fn from_env() -> Result<Self, OracleError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            OracleError::NotConfigured("set OPENAI_API_KEY to use the remote oracle".to_string())
        })?;
        Ok(Self {
            api_key,
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            base_url: std::env::var("OPENAI_BASE_URL").ok(),
            timeout_secs: 60,
        })
    }
}

pub struct RemoteOracle {
    client: Client,
    config: OracleConfig,
}

impl RemoteOracle {
    pub fn new(config: OracleConfig) -> Result<Self, OracleError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OracleError::Network(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self, OracleError> {
        Self::new(OracleConfig::from_env()?)
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, OracleError> {
        let url = format!(
            "{}/chat/completions",
            self.config
                .base_url
                .as_deref()
                .unwrap_or("https://api.openai.com/v1")
        );

        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": 0.0,
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::Network(e.to_string()))?;

        if response.status() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60u64);
            return Err(OracleError::RateLimited {
                retry_after_ms: retry_after * 1000,
            });
        }

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(OracleError::Api(error_text));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| OracleError::InvalidResponse(e.to_string()))?;

        data["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| OracleError::InvalidResponse("missing message content".to_string()))
    }
}

#[async_trait]
impl TransformOracle for RemoteOracle {
    async fn transform(&self, before: &str, instruction: &str) -> Result<String, OracleError> {
        let system = format!(
            "Ты редактор юридических текстов. Тебе даётся текст структурной \
             единицы документа и одна инструкция о внесении изменения. Верни \
             ПОЛНЫЙ новый текст единицы с внесённым изменением, без пояснений \
             и без форматирования. Если указанный в инструкции фрагмент \
             отсутствует в тексте, верни ровно одну строку вида \
             «{FAILURE_MARKER} описание проблемы]»."
        );
        let user = format!("ТЕКСТ:\n{before}\n\nИНСТРУКЦИЯ:\n{instruction}");
        let reply = self.complete(&system, &user).await?;
        tracing::debug!(chars = reply.len(), "transform oracle replied");
        Ok(reply)
    }
}

#[async_trait]
impl AddressOracle for RemoteOracle {
    async fn match_address(
        &self,
        address: &str,
        candidates: &[String],
    ) -> Result<Option<String>, OracleError> {
        let system = "Ты сопоставляешь адрес правки со списком структурных \
                      единиц документа. Ответь ровно одной строкой: точным \
                      наименованием подходящей единицы из списка, либо НЕТ, \
                      если ни одна не подходит.";
        let user = format!("АДРЕС: {address}\n\nЕДИНИЦЫ:\n{}", candidates.join("\n"));
        let reply = self.complete(system, &user).await?;
        if reply == "НЕТ" || reply.to_lowercase() == "нет" {
            return Ok(None);
        }
        // Membership is validated again by the caller; this is a first pass.
        Ok(candidates.iter().find(|c| **c == reply).cloned())
    }
}
