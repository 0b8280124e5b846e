//! HTTP client for the OpenRouter gateway.
//!
//! Owns the authenticated request plumbing for listing models, blocking
//! completions, and key validation, plus a one-hour model-list cache. The
//! streaming variant lives in [`crate::core::chat_stream`]; this client
//! builds its [`StreamParams`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

use crate::api::{ChatMessage, ChatRequest, ChatResponse, ModelInfo, ModelsResponse};
use crate::core::chat_stream::{error_from_response, StreamParams};
use crate::core::credentials::CredentialStore;
use crate::core::error::OpenRouterError;
use crate::utils::url::construct_api_url;

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_TEMPERATURE: f64 = 0.8;

const MODEL_CACHE_VALIDITY: Duration = Duration::from_secs(3600);

struct ModelCache {
    models: Vec<ModelInfo>,
    fetched_at: Instant,
}

pub struct OpenRouterClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Arc<dyn CredentialStore>,
    model_cache: Mutex<Option<ModelCache>>,
}

/// Drop models without text input/output and order the rest by display name.
pub fn filter_and_sort_models(models: Vec<ModelInfo>) -> Vec<ModelInfo> {
    let mut models: Vec<ModelInfo> = models.into_iter().filter(ModelInfo::supports_text).collect();
    models.sort_by(|a, b| a.display_name().cmp(b.display_name()));
    models
}

impl OpenRouterClient {
    pub fn new(credentials: Arc<dyn CredentialStore>) -> Self {
        Self::with_base_url(credentials, OPENROUTER_BASE_URL)
    }

    pub fn with_base_url(credentials: Arc<dyn CredentialStore>, base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: crate::utils::url::normalize_base_url(base_url),
            credentials,
            model_cache: Mutex::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_key(&self) -> Result<String, OpenRouterError> {
        self.credentials.get().map_err(|_| OpenRouterError::NoApiKey)
    }

    fn authed(&self, request: reqwest::RequestBuilder, api_key: &str) -> reqwest::RequestBuilder {
        request
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .header("X-Title", "Dramatis")
    }

    /// List text-capable models, sorted by display name.
    ///
    /// Results are cached for an hour. A refresh replaces the cached list and
    /// its timestamp together, and only after a fully successful fetch; a
    /// failed refresh leaves the previous cache intact. Holding the cache
    /// lock across the fetch keeps refreshes single-writer.
    pub async fn list_models(
        &self,
        force_refresh: bool,
    ) -> Result<Vec<ModelInfo>, OpenRouterError> {
        let mut cache = self.model_cache.lock().await;

        if !force_refresh {
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < MODEL_CACHE_VALIDITY {
                    debug!(count = cached.models.len(), "serving models from cache");
                    return Ok(cached.models.clone());
                }
            }
        }

        let api_key = self.api_key()?;
        let models = self.fetch_models(&api_key).await?;
        let models = filter_and_sort_models(models);
        debug!(count = models.len(), "refreshed model cache");

        *cache = Some(ModelCache {
            models: models.clone(),
            fetched_at: Instant::now(),
        });
        Ok(models)
    }

    async fn fetch_models(&self, api_key: &str) -> Result<Vec<ModelInfo>, OpenRouterError> {
        let url = construct_api_url(&self.base_url, "models");
        let response = self
            .authed(self.http.get(url), api_key)
            .send()
            .await
            .map_err(OpenRouterError::Network)?;

        let status = response.status();
        let body = response.text().await.map_err(OpenRouterError::Network)?;
        if !status.is_success() {
            return Err(error_from_response(status.as_u16(), &body));
        }

        let parsed: ModelsResponse = serde_json::from_str(&body)?;
        Ok(parsed.data)
    }

    /// Blocking (non-streaming) chat completion.
    pub async fn complete_chat(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        temperature: f64,
        max_tokens: Option<u32>,
    ) -> Result<ChatResponse, OpenRouterError> {
        let api_key = self.api_key()?;
        let url = construct_api_url(&self.base_url, "chat/completions");

        let request = ChatRequest {
            model: model.to_string(),
            messages,
            stream: false,
            temperature: Some(temperature),
            max_tokens,
        };

        let response = self
            .authed(self.http.post(url), &api_key)
            .json(&request)
            .send()
            .await
            .map_err(OpenRouterError::Network)?;

        let status = response.status();
        let body = response.text().await.map_err(OpenRouterError::Network)?;
        if !status.is_success() {
            return Err(error_from_response(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(OpenRouterError::Decoding)
    }

    /// Parameters for a streaming completion against this client's endpoint.
    /// Fails fast with `NoApiKey` before any request is spawned.
    pub fn stream_params(
        &self,
        model: &str,
        api_messages: Vec<ChatMessage>,
        stream_id: u64,
    ) -> Result<StreamParams, OpenRouterError> {
        let api_key = self.api_key()?;
        Ok(StreamParams {
            client: self.http.clone(),
            base_url: self.base_url.clone(),
            api_key,
            model: model.to_string(),
            api_messages,
            temperature: Some(DEFAULT_TEMPERATURE),
            max_tokens: None,
            stream_id,
        })
    }

    /// Check a candidate key against the models endpoint before storing it.
    /// Transport failures read as an invalid key, never an error.
    pub async fn validate_key(&self, key: &str) -> bool {
        let url = construct_api_url(&self.base_url, "models");
        match self
            .http
            .get(url)
            .header("Authorization", format!("Bearer {key}"))
            .send()
            .await
        {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(err) => {
                debug!(%err, "key validation request failed");
                false
            }
        }
    }

    #[cfg(test)]
    async fn prime_cache(&self, models: Vec<ModelInfo>) {
        *self.model_cache.lock().await = Some(ModelCache {
            models,
            fetched_at: Instant::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Architecture, Modalities};
    use crate::core::credentials::MemoryCredentialStore;

    fn model(id: &str, name: &str, output: Option<Vec<&str>>) -> ModelInfo {
        ModelInfo {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            context_length: Some(8192),
            pricing: None,
            architecture: output.map(|out| Architecture {
                tokenizer: None,
                instruction_type: None,
                modalities: Some(Modalities {
                    input: Some(vec!["text".to_string()]),
                    output: Some(out.into_iter().map(String::from).collect()),
                }),
            }),
        }
    }

    fn offline_client() -> OpenRouterClient {
        // Port 9 is discard; nothing listens there, so any fetch attempt
        // fails fast with a transport error.
        OpenRouterClient::with_base_url(
            Arc::new(MemoryCredentialStore::with_secret("sk-or-test")),
            "http://127.0.0.1:9/api/v1",
        )
    }

    #[test]
    fn filter_drops_non_text_models_and_sorts_by_name() {
        let models = vec![
            model("z/zeta", "Zeta", None),
            model("a/alpha", "Alpha", Some(vec!["text"])),
            model("i/imager", "Imager", Some(vec!["image"])),
            model("m/mystery", "", None),
        ];
        let filtered = filter_and_sort_models(models);
        let names: Vec<&str> = filtered.iter().map(|m| m.display_name()).collect();
        assert_eq!(names, vec!["Alpha", "Zeta", "m/mystery"]);
    }

    #[tokio::test]
    async fn cached_models_are_served_without_a_request() {
        let client = offline_client();
        client.prime_cache(vec![model("a/alpha", "Alpha", None)]).await;

        // The endpoint is unreachable, so this only succeeds via the cache.
        let models = client.list_models(false).await.unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].id, "a/alpha");
    }

    #[tokio::test]
    async fn force_refresh_bypasses_the_cache() {
        let client = offline_client();
        client.prime_cache(vec![model("a/alpha", "Alpha", None)]).await;

        let result = client.list_models(true).await;
        assert!(matches!(result, Err(OpenRouterError::Network(_))));

        // The failed refresh left the previous cache untouched.
        let models = client.list_models(false).await.unwrap();
        assert_eq!(models[0].id, "a/alpha");
    }

    #[tokio::test]
    async fn missing_credential_fails_before_any_request() {
        let client = OpenRouterClient::with_base_url(
            Arc::new(MemoryCredentialStore::new()),
            "http://127.0.0.1:9/api/v1",
        );
        assert!(matches!(
            client.list_models(false).await,
            Err(OpenRouterError::NoApiKey)
        ));
        assert!(matches!(
            client.stream_params("test/model", Vec::new(), 1),
            Err(OpenRouterError::NoApiKey)
        ));
    }

    fn user_message(content: &str) -> ChatMessage {
        ChatMessage {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn complete_chat_surfaces_transport_failure() {
        let client = offline_client();
        let result = client
            .complete_chat("test/model", vec![user_message("hi")], DEFAULT_TEMPERATURE, None)
            .await;
        assert!(matches!(result, Err(OpenRouterError::Network(_))));
    }

    #[tokio::test]
    async fn complete_chat_requires_a_credential() {
        let client = OpenRouterClient::with_base_url(
            Arc::new(MemoryCredentialStore::new()),
            "http://127.0.0.1:9/api/v1",
        );
        let result = client
            .complete_chat("test/model", vec![user_message("hi")], DEFAULT_TEMPERATURE, Some(256))
            .await;
        assert!(matches!(result, Err(OpenRouterError::NoApiKey)));
    }

    #[tokio::test]
    async fn validate_key_resolves_transport_failure_to_false() {
        let client = offline_client();
        assert!(!client.validate_key("sk-or-candidate").await);
    }
}
