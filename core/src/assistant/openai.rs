use super::api::AssistantApi;
use super::types::{MessageList, Run, Thread, ThreadMessage};
use crate::config::OpenAiSettings;
use crate::error::AssistantError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::trace;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

/// Assistants v2 over HTTP.
#[derive(Clone, Debug)]
pub struct OpenAiAssistantsClient {
    base_url: String,
    http: reqwest::Client,
    api_key: String,
}

impl OpenAiAssistantsClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, AssistantError> {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            base_url,
            http,
            api_key: api_key.into(),
        })
    }

    pub fn from_settings(settings: &OpenAiSettings) -> Result<Self, AssistantError> {
        Self::new(settings.base_url.clone(), settings.api_key.clone())
    }

    fn headers(&self) -> HeaderMap {
        let mut h = HeaderMap::new();
        if let Ok(hv) = HeaderValue::from_str(&format!("Bearer {}", self.api_key)) {
            h.insert(AUTHORIZATION, hv);
        }
        h.insert(
            HeaderName::from_static("openai-beta"),
            HeaderValue::from_static("assistants=v2"),
        );
        h
    }

    async fn exec_request(
        &self,
        req: reqwest::RequestBuilder,
        method: &str,
        url: &str,
    ) -> Result<String, AssistantError> {
        let res = req.headers(self.headers()).send().await?;
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        trace!(method, url, %status, "assistant API response");
        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .and_then(|parsed| parsed.error)
                .and_then(|detail| detail.message)
                .unwrap_or_else(|| format!("{method} {url} failed: {status}"));
            return Err(AssistantError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(body)
    }

    fn decode_json<T: DeserializeOwned>(url: &str, body: &str) -> Result<T, AssistantError> {
        serde_json::from_str::<T>(body)
            .map_err(|err| AssistantError::Decode(format!("{url}: {err}")))
    }
}

#[async_trait]
impl AssistantApi for OpenAiAssistantsClient {
    async fn create_thread(&self) -> Result<Thread, AssistantError> {
        let url = format!("{}/threads", self.base_url);
        let req = self.http.post(&url).json(&json!({}));
        let body = self.exec_request(req, "POST", &url).await?;
        Self::decode_json(&url, &body)
    }

    async fn add_message(&self, thread_id: &str, content: &str) -> Result<(), AssistantError> {
        let url = format!("{}/threads/{thread_id}/messages", self.base_url);
        let req = self
            .http
            .post(&url)
            .json(&json!({ "role": "user", "content": content }));
        self.exec_request(req, "POST", &url).await?;
        Ok(())
    }

    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
    ) -> Result<Run, AssistantError> {
        let url = format!("{}/threads/{thread_id}/runs", self.base_url);
        let req = self
            .http
            .post(&url)
            .json(&json!({ "assistant_id": assistant_id }));
        let body = self.exec_request(req, "POST", &url).await?;
        Self::decode_json(&url, &body)
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AssistantError> {
        let url = format!("{}/threads/{thread_id}/runs/{run_id}", self.base_url);
        let req = self.http.get(&url);
        let body = self.exec_request(req, "GET", &url).await?;
        Self::decode_json(&url, &body)
    }

    async fn latest_message(
        &self,
        thread_id: &str,
    ) -> Result<Option<ThreadMessage>, AssistantError> {
        let url = format!("{}/threads/{thread_id}/messages", self.base_url);
        let req = self
            .http
            .get(&url)
            .query(&[("limit", "1"), ("order", "desc")]);
        let body = self.exec_request(req, "GET", &url).await?;
        let list: MessageList = Self::decode_json(&url, &body)?;
        Ok(list.data.into_iter().next())
    }
}
