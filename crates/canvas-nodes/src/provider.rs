//! Generation provider boundary
//!
//! Generation nodes never talk to a back-end directly. They look up an
//! `Arc<dyn GenerationProvider>` in the executor extensions and hand it a
//! [`GenerationRequest`]. [`HttpGenerationProvider`] is the production
//! implementation: it submits a job to the generation API and polls until
//! the job completes, fails, or runs out of attempts.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Errors raised by a generation provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The HTTP request itself failed (connection refused, DNS, ...)
    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    /// The API answered with a non-success status
    #[error("Generation API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The API refused to start the job
    #[error("Generation rejected: {0}")]
    Rejected(String),

    /// The job ran and reported failure
    #[error("Generation failed: {0}")]
    Failed(String),

    /// The job did not finish within the polling budget
    #[error("Generation timed out after {attempts} polls")]
    Timeout { attempts: u32 },

    /// The API answered with something we could not understand
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// No provider is available to this node
    #[error("No generation provider configured")]
    NotConfigured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationKind {
    Image,
    Video,
    Text,
}

/// One generation job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    #[serde(rename = "type")]
    pub kind: GenerationKind,
    pub prompt: String,
    pub model: String,
    /// Kind-specific knobs (aspect ratio, quantity, duration, ...)
    #[serde(default)]
    pub params: serde_json::Map<String, Value>,
    #[serde(default)]
    pub reference_images: Vec<String>,
}

impl GenerationRequest {
    pub fn new(kind: GenerationKind, prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            kind,
            prompt: prompt.into(),
            model: model.into(),
            params: serde_json::Map::new(),
            reference_images: Vec::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: Value) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }

    pub fn with_reference_images(mut self, images: Vec<String>) -> Self {
        self.reference_images = images;
        self
    }
}

/// What a finished job produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOutput {
    pub urls: Vec<String>,
    pub text: Option<String>,
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput, ProviderError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    success: bool,
    #[serde(default)]
    generation_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    status: String,
    #[serde(default)]
    result_url: Option<String>,
    #[serde(default)]
    result_text: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

/// Client for the HTTP generation API
///
/// # Example
///
/// ```ignore
/// let provider = HttpGenerationProvider::new("http://localhost:8000")
///     .with_api_key("secret")
///     .with_poll_interval(Duration::from_secs(2));
/// let output = provider.generate(request).await?;
/// ```
#[derive(Debug, Clone)]
pub struct HttpGenerationProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    project_id: Option<String>,
    poll_interval: Duration,
    max_attempts: u32,
}

impl HttpGenerationProvider {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;

    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            project_id: None,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request_body(&self, request: &GenerationRequest) -> Value {
        let mut body = json!({
            "type": request.kind,
            "prompt": request.prompt,
            "model": request.model,
            "referenceImages": request.reference_images,
        });
        if let Some(project_id) = &self.project_id {
            body["projectId"] = json!(project_id);
        }
        if let Value::Object(map) = &mut body {
            for (key, value) in &request.params {
                map.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
        body
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("X-API-Key", key),
            None => builder,
        }
    }

    async fn send(&self, url: &str, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, ProviderError> {
        let response = builder.send().await.map_err(|e| ProviderError::Request {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, message });
        }
        Ok(response)
    }

    async fn submit(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let url = format!("{}/api/generate", self.base_url);
        log::debug!(
            "HttpGenerationProvider: submitting {:?} job to {} with model '{}'",
            request.kind,
            url,
            request.model
        );

        let builder = self.authorize(self.client.post(&url).json(&self.request_body(request)));
        let response: SubmitResponse = self
            .send(&url, builder)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        match (response.success, response.generation_id) {
            (true, Some(id)) => Ok(id),
            _ => Err(ProviderError::Rejected(
                response
                    .error
                    .unwrap_or_else(|| "Failed to start generation".to_string()),
            )),
        }
    }

    async fn wait_for_generation(&self, generation_id: &str) -> Result<GenerationOutput, ProviderError> {
        let url = format!("{}/api/generations/{}", self.base_url, generation_id);

        for attempt in 1..=self.max_attempts {
            let builder = self.authorize(self.client.get(&url));
            let status: StatusResponse = self
                .send(&url, builder)
                .await?
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

            match status.status.as_str() {
                "completed" => {
                    log::debug!(
                        "HttpGenerationProvider: generation {} completed after {} polls",
                        generation_id,
                        attempt
                    );
                    return Ok(GenerationOutput {
                        urls: status
                            .result_url
                            .as_deref()
                            .map(parse_result_urls)
                            .unwrap_or_default(),
                        text: status.result_text,
                    });
                }
                "failed" => {
                    return Err(ProviderError::Failed(
                        status
                            .error_message
                            .unwrap_or_else(|| "Generation failed".to_string()),
                    ));
                }
                other => {
                    log::debug!(
                        "HttpGenerationProvider: generation {} is '{}' (poll {}/{})",
                        generation_id,
                        other,
                        attempt,
                        self.max_attempts
                    );
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        Err(ProviderError::Timeout {
            attempts: self.max_attempts,
        })
    }
}

#[async_trait]
impl GenerationProvider for HttpGenerationProvider {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput, ProviderError> {
        let generation_id = self.submit(&request).await?;
        self.wait_for_generation(&generation_id).await
    }
}

/// `resultUrl` is either a JSON array of URLs or a single URL
fn parse_result_urls(raw: &str) -> Vec<String> {
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(urls) => urls,
        Err(_) if raw.is_empty() => Vec::new(),
        Err(_) => vec![raw.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal HTTP server answering each request with the next canned body
    async fn serve(responses: Vec<(u16, &'static str)>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let index = counter.fetch_add(1, Ordering::SeqCst);
                let (status, body) = responses
                    .get(index)
                    .or_else(|| responses.last())
                    .copied()
                    .unwrap();

                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                loop {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                    if let Some(end) = find_header_end(&request) {
                        let length = content_length(&request[..end]);
                        if request.len() >= end + length {
                            break;
                        }
                    }
                }

                let response = format!(
                    "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{}", addr), hits)
    }

    fn find_header_end(request: &[u8]) -> Option<usize> {
        request.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
    }

    fn content_length(headers: &[u8]) -> usize {
        String::from_utf8_lossy(headers)
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse().ok())
                    .flatten()
            })
            .unwrap_or(0)
    }

    fn fast(base_url: String) -> HttpGenerationProvider {
        HttpGenerationProvider::new(base_url)
            .with_poll_interval(Duration::from_millis(5))
            .with_max_attempts(3)
    }

    fn image_request() -> GenerationRequest {
        GenerationRequest::new(GenerationKind::Image, "a cat", "seedream")
            .with_param("aspectRatio", json!("1:1"))
    }

    #[test]
    fn test_parse_result_urls() {
        assert_eq!(
            parse_result_urls(r#"["https://a.png","https://b.png"]"#),
            vec!["https://a.png".to_string(), "https://b.png".to_string()]
        );
        assert_eq!(parse_result_urls("https://a.png"), vec!["https://a.png".to_string()]);
        assert!(parse_result_urls("").is_empty());
    }

    #[test]
    fn test_request_body() {
        let provider = HttpGenerationProvider::new("http://localhost:8000/").with_project_id("p1");
        assert_eq!(provider.base_url(), "http://localhost:8000");

        let body = provider.request_body(
            &image_request().with_reference_images(vec!["https://ref.png".to_string()]),
        );
        assert_eq!(body["type"], "image");
        assert_eq!(body["prompt"], "a cat");
        assert_eq!(body["aspectRatio"], "1:1");
        assert_eq!(body["projectId"], "p1");
        assert_eq!(body["referenceImages"], json!(["https://ref.png"]));
    }

    #[tokio::test]
    async fn test_generate_polls_until_completed() {
        let (url, hits) = serve(vec![
            (200, r#"{"success": true, "generationId": "g1"}"#),
            (200, r#"{"status": "processing"}"#),
            (200, r#"{"status": "completed", "resultUrl": "[\"https://out/1.png\"]"}"#),
        ])
        .await;

        let output = fast(url).generate(image_request()).await.unwrap();
        assert_eq!(output.urls, vec!["https://out/1.png".to_string()]);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_generate_reports_failure() {
        let (url, _) = serve(vec![
            (200, r#"{"success": true, "generationId": "g1"}"#),
            (200, r#"{"status": "failed", "errorMessage": "nsfw"}"#),
        ])
        .await;

        let err = fast(url).generate(image_request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Failed(msg) if msg == "nsfw"));
    }

    #[tokio::test]
    async fn test_generate_times_out() {
        let (url, hits) = serve(vec![
            (200, r#"{"success": true, "generationId": "g1"}"#),
            (200, r#"{"status": "pending"}"#),
        ])
        .await;

        let err = fast(url).generate(image_request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { attempts: 3 }));
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_rejected_and_http_errors() {
        let (url, _) = serve(vec![(200, r#"{"success": false, "error": "quota"}"#)]).await;
        let err = fast(url).generate(image_request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Rejected(msg) if msg == "quota"));

        let (url, _) = serve(vec![(500, r#"{"error": "boom"}"#)]).await;
        let err = fast(url).generate(image_request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Api { status: 500, .. }));
    }
}
