use std::env;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};

use super::types::{
    ApiError, Content, ErrorEnvelope, FileInfo, GenerateContentRequest, GenerateContentResponse,
    GenerationConfig, ListFilesResponse, Part, UploadFile, UploadMetadata, UploadResponse,
};

const API_BASE: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";
/// Image understanding is slow; the client-wide timeout is too tight for it.
const GENERATE_TIMEOUT: Duration = Duration::from_secs(120);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);
const LIST_PAGE_SIZE: &str = "100";
const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";

#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    #[error("GEMINI_API_KEY not set. Get one at https://aistudio.google.com/apikey")]
    ApiKeyNotSet,

    #[error("API rate limit exceeded. Please retry later.")]
    RateLimited,

    #[error("API quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("upload session not started: response had no {UPLOAD_URL_HEADER} header")]
    MissingUploadUrl,

    #[error("uploaded file has no URI")]
    MissingFileUri,

    #[error("image is empty")]
    EmptyImage,

    #[error("model returned no text part")]
    EmptyResponse,

    #[error("model returned malformed offers JSON: {0}")]
    MalformedOffers(#[from] serde_json::Error),
}

#[derive(Clone)]
struct ApiKey(String);

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// REST client for the Gemini Files and `generateContent` endpoints.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: ApiKey,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn from_env(http: Client) -> Result<Self, GeminiError> {
        let api_key = env::var("GEMINI_API_KEY").map_err(|_| GeminiError::ApiKeyNotSet)?;
        if api_key.trim().is_empty() {
            return Err(GeminiError::ApiKeyNotSet);
        }
        let model = env::var("GEMINI_MODEL")
            .ok()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Ok(Self {
            http,
            api_key: ApiKey(api_key.trim().to_string()),
            model,
            base_url: API_BASE.to_string(),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            api_key: ApiKey("test-key".to_string()),
            model: DEFAULT_MODEL.to_string(),
            base_url: base_url.to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        debug_assert!(
            url.starts_with("https://") || cfg!(test),
            "API key must only be sent over HTTPS"
        );
        self.http
            .request(method, url)
            .header("x-goog-api-key", &self.api_key.0)
            .header("User-Agent", crate::USER_AGENT)
    }

    /// Uploads `bytes` through the resumable upload protocol (start, then
    /// upload+finalize in one chunk) and returns the created file resource.
    pub async fn upload_file(
        &self,
        name: &str,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<FileInfo, GeminiError> {
        let url = self.endpoint("upload/v1beta/files");
        let metadata = UploadMetadata {
            file: UploadFile {
                name: format!("files/{name}"),
                display_name: name.to_string(),
            },
        };

        let start = self
            .request(Method::POST, &url)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&metadata)
            .timeout(UPLOAD_TIMEOUT)
            .send()
            .await?;
        let start = check_status(start).await?;

        let session_url = start
            .headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or(GeminiError::MissingUploadUrl)?;

        let finish = self
            .request(Method::POST, &session_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .timeout(UPLOAD_TIMEOUT)
            .send()
            .await?;
        let body: UploadResponse = check_status(finish).await?.json().await?;

        debug!(name = %body.file.name, "file uploaded");
        Ok(body.file)
    }

    /// Lists every file owned by this API key, following pagination.
    pub async fn list_files(&self) -> Result<Vec<FileInfo>, GeminiError> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = url::Url::parse(&self.endpoint("v1beta/files"))?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("pageSize", LIST_PAGE_SIZE);
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let response = self.request(Method::GET, url.as_str()).send().await?;
            let page: ListFilesResponse = check_status(response).await?.json().await?;
            files.extend(page.files);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(count = files.len(), "listed files");
        Ok(files)
    }

    /// Deletes a file by its resource name (`files/...`).
    pub async fn delete_file(&self, name: &str) -> Result<(), GeminiError> {
        let url = self.endpoint(&format!("v1beta/{name}"));
        let response = self.request(Method::DELETE, &url).send().await?;
        check_status(response).await?;
        debug!(name, "file deleted");
        Ok(())
    }

    /// Runs `prompt` against an uploaded file, asking for a JSON response.
    pub async fn generate_json(
        &self,
        file_uri: &str,
        mime_type: &str,
        prompt: &str,
    ) -> Result<GenerateContentResponse, GeminiError> {
        let url = self.endpoint(&format!("v1beta/models/{}:generateContent", self.model));

        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part::file(mime_type, file_uri), Part::text(prompt)],
                role: Some("user".to_string()),
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
            },
        };

        let response = self
            .request(Method::POST, &url)
            .json(&request)
            .timeout(GENERATE_TIMEOUT)
            .send()
            .await?;

        let body: GenerateContentResponse = check_status(response).await?.json().await?;
        debug!(model = %self.model, "gemini generation complete");

        if let Some(err) = &body.error {
            let classified = classify_api_error(err);
            warn!(error = %classified, "Gemini API error in 200 response");
            return Err(classified);
        }

        Ok(body)
    }
}

async fn check_status(response: Response) -> Result<Response, GeminiError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        warn!("Gemini API rate limited");
        return Err(GeminiError::RateLimited);
    }
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    if let Ok(body) = serde_json::from_str::<ErrorEnvelope>(&text)
        && let Some(err) = &body.error
    {
        let classified = classify_api_error(err);
        warn!(error = %classified, "Gemini API error");
        return Err(classified);
    }

    let snippet = &text[..text.floor_char_boundary(200)];
    warn!(status = %status, "Gemini API error (no structured body)");
    Err(GeminiError::Api {
        code: status.as_u16(),
        message: format!("HTTP {status}: {snippet}"),
    })
}

fn classify_api_error(err: &ApiError) -> GeminiError {
    let message = err
        .message
        .clone()
        .unwrap_or_else(|| "Unknown error".to_string());

    match err.code {
        Some(429) => GeminiError::RateLimited,
        Some(403) => GeminiError::QuotaExhausted(message),
        Some(code) => GeminiError::Api { code, message },
        None => GeminiError::Api {
            code: 0,
            message: format!("Unknown error (no status code): {message}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_429_as_rate_limited() {
        let err = ApiError {
            code: Some(429),
            message: Some("Resource exhausted".into()),
        };
        assert!(matches!(classify_api_error(&err), GeminiError::RateLimited));
    }

    #[test]
    fn classify_403_as_quota_exhausted() {
        let err = ApiError {
            code: Some(403),
            message: Some("Quota exceeded".into()),
        };
        assert!(matches!(
            classify_api_error(&err),
            GeminiError::QuotaExhausted(_)
        ));
    }

    #[test]
    fn classify_missing_code_keeps_message() {
        let err = ApiError {
            code: None,
            message: Some("weird".into()),
        };
        match classify_api_error(&err) {
            GeminiError::Api { code, message } => {
                assert_eq!(code, 0);
                assert!(message.contains("weird"));
            }
            other => panic!("expected Api error, got: {other:?}"),
        }
    }

    #[test]
    fn api_key_debug_is_redacted() {
        let key = ApiKey("secret".into());
        assert_eq!(format!("{key:?}"), "[REDACTED]");
    }
}

#[cfg(test)]
mod http_tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn upload_runs_resumable_protocol() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/v1beta/files"))
            .and(header("X-Goog-Upload-Command", "start"))
            .and(header("X-Goog-Upload-Header-Content-Length", "5"))
            .and(body_partial_json(serde_json::json!({
                "file": {"name": "files/au-test-0", "displayName": "au-test-0"}
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(UPLOAD_URL_HEADER, format!("{}/session/42", server.uri())),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "file": {
                    "name": "files/au-test-0",
                    "mimeType": "image/jpeg",
                    "uri": "https://example.test/files/au-test-0",
                    "state": "ACTIVE"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::with_base_url(Client::new(), &server.uri());
        let file = client
            .upload_file("au-test-0", b"image".to_vec(), "image/jpeg")
            .await
            .unwrap();

        assert_eq!(file.name, "files/au-test-0");
        assert_eq!(
            file.uri.as_deref(),
            Some("https://example.test/files/au-test-0")
        );
    }

    #[tokio::test]
    async fn upload_without_session_header_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/v1beta/files"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = GeminiClient::with_base_url(Client::new(), &server.uri());
        let result = client
            .upload_file("au-test-0", b"image".to_vec(), "image/jpeg")
            .await;
        assert!(matches!(result, Err(GeminiError::MissingUploadUrl)));
    }

    #[tokio::test]
    async fn list_files_follows_page_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1beta/files"))
            .and(query_param("pageToken", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [{"name": "files/c"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1beta/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [{"name": "files/a"}, {"name": "files/b"}],
                "nextPageToken": "page-2"
            })))
            .mount(&server)
            .await;

        let client = GeminiClient::with_base_url(Client::new(), &server.uri());
        let files = client.list_files().await.unwrap();

        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["files/a", "files/b", "files/c"]);
    }

    #[tokio::test]
    async fn list_files_empty_body_is_empty_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1beta/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let client = GeminiClient::with_base_url(Client::new(), &server.uri());
        assert!(client.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_file_hits_resource_path() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1beta/files/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::with_base_url(Client::new(), &server.uri());
        client.delete_file("files/abc").await.unwrap();
    }

    #[tokio::test]
    async fn delete_missing_file_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": {"code": 404, "message": "File not found"}
            })))
            .mount(&server)
            .await;

        let client = GeminiClient::with_base_url(Client::new(), &server.uri());
        let result = client.delete_file("files/gone").await;
        assert!(matches!(result, Err(GeminiError::Api { code: 404, .. })));
    }

    #[tokio::test]
    async fn generate_sends_file_reference_and_json_mode() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r":generateContent$"))
            .and(body_partial_json(serde_json::json!({
                "generationConfig": {"responseMimeType": "application/json"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": {"parts": [{"text": "[]"}], "role": "model"}
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::with_base_url(Client::new(), &server.uri());
        let response = client
            .generate_json("https://example.test/files/x", "image/jpeg", "extract")
            .await
            .unwrap();

        let candidates = response.candidates.unwrap();
        let part = &candidates[0].content.as_ref().unwrap().parts[0];
        assert_eq!(part.text.as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn generate_429_returns_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r":generateContent$"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = GeminiClient::with_base_url(Client::new(), &server.uri());
        let result = client.generate_json("uri", "image/jpeg", "p").await;
        assert!(matches!(result, Err(GeminiError::RateLimited)));
    }

    #[tokio::test]
    async fn generate_500_with_error_body_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r":generateContent$"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "error": {
                    "code": 500,
                    "message": "Internal server error"
                }
            })))
            .mount(&server)
            .await;

        let client = GeminiClient::with_base_url(Client::new(), &server.uri());
        let result = client.generate_json("uri", "image/jpeg", "p").await;
        match &result {
            Err(GeminiError::Api { code: 500, message }) => {
                assert!(message.contains("Internal server error"));
            }
            other => panic!("expected Api(500) with body message, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn generate_500_with_invalid_body_returns_generic_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r":generateContent$"))
            .respond_with(ResponseTemplate::new(500).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = GeminiClient::with_base_url(Client::new(), &server.uri());
        let result = client.generate_json("uri", "image/jpeg", "p").await;
        match &result {
            Err(GeminiError::Api { code: 500, message }) => {
                assert!(message.contains("not json"), "got: {message}");
            }
            other => panic!("expected Api(500) without body, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn generate_200_with_error_field_returns_classified_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r":generateContent$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": {
                    "code": 403,
                    "message": "Quota exceeded"
                }
            })))
            .mount(&server)
            .await;

        let client = GeminiClient::with_base_url(Client::new(), &server.uri());
        let result = client.generate_json("uri", "image/jpeg", "p").await;
        assert!(matches!(result, Err(GeminiError::QuotaExhausted(_))));
    }
}
