use std::time::Duration;

use chemfetch_core::error::EngineError;
use chemfetch_core::models::RawDocument;
use reqwest::Client;

/// Some of the prediction servers reject non-browser clients, so requests
/// identify as a desktop browser.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36";

/// Shared HTTP transport for all source fetchers.
///
/// Wraps one `reqwest::Client` (connection-pooled, safe for concurrent use
/// across jobs) with a bounded per-request timeout. Every error is tagged
/// with the protocol stage it occurred in; timeouts surface with
/// `stage: "timeout"` so the retry policy can recognise them.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: Client,
    timeout_secs: u64,
}

impl HttpClient {
    pub fn new() -> Result<Self, EngineError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, EngineError> {
        let timeout_secs = timeout.as_secs();
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::fetch("client", e.to_string()))?;

        Ok(Self {
            client,
            timeout_secs,
        })
    }

    /// GET `url`, returning the body as a raw document.
    pub async fn get(&self, url: &str, stage: &str) -> Result<RawDocument, EngineError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.request_error(stage, &e))?;
        self.read_body(url, stage, response).await
    }

    /// POST `form` as application/x-www-form-urlencoded, with optional
    /// extra headers (Referer/Origin for sources that check them).
    pub async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        headers: &[(&str, &str)],
        stage: &str,
    ) -> Result<RawDocument, EngineError> {
        let mut request = self.client.post(url).form(form);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.request_error(stage, &e))?;
        self.read_body(url, stage, response).await
    }

    async fn read_body(
        &self,
        url: &str,
        stage: &str,
        response: reqwest::Response,
    ) -> Result<RawDocument, EngineError> {
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::fetch(
                stage,
                format!("HTTP {} for {}", status.as_u16(), url),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.request_error(stage, &e))?;

        Ok(RawDocument {
            body,
            status: status.as_u16(),
            throttled: false,
            identifiers: Vec::new(),
        })
    }

    fn request_error(&self, stage: &str, e: &reqwest::Error) -> EngineError {
        if e.is_timeout() {
            EngineError::fetch(
                "timeout",
                format!("'{stage}' exceeded {}s: {e}", self.timeout_secs),
            )
        } else if e.is_connect() {
            EngineError::fetch(stage, format!("Connection failed: {e}"))
        } else {
            EngineError::fetch(stage, e.to_string())
        }
    }
}
