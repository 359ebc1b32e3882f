use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use url::Url;

use crate::error::AppCastError;
use crate::serializer::strip_bom;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_REDIRECTS: usize = 10;
const BODY_SNIPPET_CHARS: usize = 160;

/// Decides whether a 3xx response may be followed, given the URL that
/// answered and the URL it points at.
pub type RedirectHook = Arc<dyn Fn(&Url, &Url) -> bool + Send + Sync>;

/// Refuses redirects that downgrade from HTTPS to plain HTTP.
#[must_use]
pub fn refuse_https_downgrade() -> RedirectHook {
    Arc::new(|from: &Url, to: &Url| !(from.scheme() == "https" && to.scheme() == "http"))
}

#[must_use]
pub fn redirect_policy(hook: RedirectHook) -> reqwest::redirect::Policy {
    reqwest::redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error(format!("more than {MAX_REDIRECTS} redirects"));
        }
        let allowed = match attempt.previous().last() {
            Some(from) => hook(from, attempt.url()),
            None => true,
        };
        if allowed {
            attempt.follow()
        } else {
            warn!("Refusing redirect to {}", attempt.url());
            attempt.stop()
        }
    })
}

#[derive(Clone)]
pub struct HttpOptions {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
    pub redirect_hook: RedirectHook,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            user_agent: format!("sparkle/{}", env!("CARGO_PKG_VERSION")),
            redirect_hook: refuse_https_downgrade(),
        }
    }
}

impl std::fmt::Debug for HttpOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpOptions")
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

impl HttpOptions {
    /// # Errors
    /// Returns an error when the TLS backend cannot be initialised.
    pub fn build_client(&self) -> Result<reqwest::Client, AppCastError> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(self.user_agent.clone())
            .redirect(redirect_policy(Arc::clone(&self.redirect_hook)))
            .build()
            .map_err(|error| AppCastError::http("failed to build HTTP client", error))
    }

    /// Client for large transfers: `timeout` bounds each read instead of the
    /// whole request.
    ///
    /// # Errors
    /// Returns an error when the TLS backend cannot be initialised.
    pub fn build_download_client(&self) -> Result<reqwest::Client, AppCastError> {
        reqwest::Client::builder()
            .read_timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(self.user_agent.clone())
            .redirect(redirect_policy(Arc::clone(&self.redirect_hook)))
            .build()
            .map_err(|error| AppCastError::http("failed to build HTTP client", error))
    }
}

pub(crate) fn response_snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let snippet: String = trimmed.chars().take(BODY_SNIPPET_CHARS).collect();
    format!(": {snippet}")
}

/// Fetches the raw app cast text, independent of its format.
#[async_trait]
pub trait AppCastDataDownloader: Send + Sync {
    /// # Errors
    /// Returns an error when the feed cannot be fetched.
    async fn download_app_cast_text(&self, url: &str) -> Result<String, AppCastError>;

    /// Detached signature published next to the feed at `<url>.signature`.
    /// Any failure reads as an empty signature and is left to the security
    /// policy.
    async fn download_app_cast_signature(&self, app_cast_url: &str) -> String {
        let signature_url = format!("{app_cast_url}.signature");
        match self.download_app_cast_text(&signature_url).await {
            Ok(text) => text.trim().to_string(),
            Err(error) => {
                debug!("No app cast signature at {signature_url}: {error}");
                String::new()
            }
        }
    }
}

/// HTTP(S) fetch, optionally as a POST carrying a JSON body.
#[derive(Debug, Clone)]
pub struct WebRequestAppCastDataDownloader {
    client: reqwest::Client,
    post_body: Option<serde_json::Value>,
}

impl WebRequestAppCastDataDownloader {
    /// # Errors
    /// Returns an error when the HTTP client cannot be built.
    pub fn new(options: &HttpOptions) -> Result<Self, AppCastError> {
        Ok(Self::with_client(options.build_client()?))
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            post_body: None,
        }
    }

    #[must_use]
    pub fn with_post_body(mut self, body: serde_json::Value) -> Self {
        self.post_body = Some(body);
        self
    }
}

#[async_trait]
impl AppCastDataDownloader for WebRequestAppCastDataDownloader {
    async fn download_app_cast_text(&self, url: &str) -> Result<String, AppCastError> {
        let request = match &self.post_body {
            Some(body) => self.client.post(url).json(body),
            None => self.client.get(url),
        };
        let response = request
            .send()
            .await
            .map_err(|error| AppCastError::http("failed to request app cast", error))?;

        let status = response.status();
        if !status.is_success() {
            let body_snippet = response
                .text()
                .await
                .ok()
                .map(|body| response_snippet(&body))
                .unwrap_or_default();
            return Err(AppCastError::HttpStatus {
                url: url.to_string(),
                status,
                body_snippet,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|error| AppCastError::http("failed to read app cast body", error))?;
        Ok(strip_bom(&text).to_string())
    }
}

/// Reads the feed from disk. Accepts plain paths and `file://` URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileAppCastDataDownloader;

impl LocalFileAppCastDataDownloader {
    fn resolve(location: &str) -> Result<PathBuf, AppCastError> {
        if location.starts_with("file:") {
            let url = Url::parse(location).map_err(|error| AppCastError::InvalidUrl {
                url: location.to_string(),
                details: error.to_string(),
            })?;
            return url.to_file_path().map_err(|()| AppCastError::InvalidUrl {
                url: location.to_string(),
                details: "not a local file path".to_string(),
            });
        }
        Ok(PathBuf::from(location))
    }
}

#[async_trait]
impl AppCastDataDownloader for LocalFileAppCastDataDownloader {
    async fn download_app_cast_text(&self, url: &str) -> Result<String, AppCastError> {
        let path = Self::resolve(url)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|error| AppCastError::io("failed to read local app cast", error))?;
        let text = String::from_utf8_lossy(&bytes);
        Ok(strip_bom(&text).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(raw: &str) -> Url {
        Url::parse(raw).expect("test url should parse")
    }

    #[test]
    fn downgrade_hook_refuses_only_https_to_http() {
        let hook = refuse_https_downgrade();
        assert!(!hook(&url("https://a.example/x"), &url("http://b.example/x")));
        assert!(hook(&url("https://a.example/x"), &url("https://b.example/x")));
        assert!(hook(&url("http://a.example/x"), &url("https://b.example/x")));
        assert!(hook(&url("http://a.example/x"), &url("http://b.example/x")));
    }

    #[test]
    fn snippet_is_empty_for_blank_bodies_and_truncated_otherwise() {
        assert_eq!(response_snippet("   "), "");
        let long = "x".repeat(500);
        assert_eq!(response_snippet(&long).chars().count(), BODY_SNIPPET_CHARS + 2);
    }

    #[tokio::test]
    async fn local_downloader_reads_paths_and_file_urls_without_bom() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir.path().join("appcast.xml");
        std::fs::write(&path, "\u{feff}<rss/>").expect("feed should be written");

        let downloader = LocalFileAppCastDataDownloader;
        let by_path = downloader
            .download_app_cast_text(&path.display().to_string())
            .await
            .expect("path should be readable");
        assert_eq!(by_path, "<rss/>");

        let file_url = Url::from_file_path(&path).expect("path should convert to url");
        let by_url = downloader
            .download_app_cast_text(file_url.as_str())
            .await
            .expect("file url should be readable");
        assert_eq!(by_url, "<rss/>");
    }

    #[tokio::test]
    async fn missing_signature_file_reads_as_empty() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir.path().join("appcast.xml");

        let signature = LocalFileAppCastDataDownloader
            .download_app_cast_signature(&path.display().to_string())
            .await;
        assert!(signature.is_empty());
    }
}
