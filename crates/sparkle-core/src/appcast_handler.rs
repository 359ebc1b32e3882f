use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};
use sparkle_appcast::{
    AppCast, AppCastDataDownloader, AppCastError, AppCastSerializer, HttpOptions,
    LocalFileAppCastDataDownloader, WebRequestAppCastDataDownloader, XmlAppCastSerializer,
};
use sparkle_signing::{SignatureChecker, SignatureVerifier, ValidationResult};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Fetch, optionally verify, and parse the app cast.
#[derive(Clone)]
pub struct AppCastHandler {
    downloader: Arc<dyn AppCastDataDownloader>,
    serializer: Arc<dyn AppCastSerializer>,
}

impl AppCastHandler {
    #[must_use]
    pub fn new(
        downloader: Arc<dyn AppCastDataDownloader>,
        serializer: Arc<dyn AppCastSerializer>,
    ) -> Self {
        Self {
            downloader,
            serializer,
        }
    }

    /// Web downloader for `http(s)` URLs, local file reads otherwise, with
    /// the XML serializer.
    ///
    /// # Errors
    /// Returns an error when the HTTP client cannot be built.
    pub fn for_url(url: &str, http: &HttpOptions) -> Result<Self, AppCastError> {
        let downloader: Arc<dyn AppCastDataDownloader> = if is_web_url(url) {
            Arc::new(WebRequestAppCastDataDownloader::new(http)?)
        } else {
            Arc::new(LocalFileAppCastDataDownloader)
        };
        Ok(Self::new(downloader, Arc::new(XmlAppCastSerializer::new())))
    }

    /// # Errors
    /// Returns an error when the feed cannot be fetched or parsed, when its
    /// detached signature is `Invalid` under a mode that checks feeds, or
    /// when `cancel` fires first.
    pub async fn fetch(
        &self,
        url: &str,
        verifier: &SignatureVerifier,
        cancel: &CancellationToken,
    ) -> Result<AppCast, AppCastError> {
        debug!("Fetching app cast from {url}");
        let text = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(AppCastError::Canceled),
            text = self.downloader.download_app_cast_text(url) => text?,
        };

        if verifier.security_mode().verifies_app_cast() {
            let signature = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(AppCastError::Canceled),
                signature = self.downloader.download_app_cast_signature(url) => signature,
            };
            let verdict = verifier.verify_signature_of_string(&signature, &text);
            debug!("App cast signature check: {verdict:?}");
            if verdict == ValidationResult::Invalid {
                warn!("Rejecting app cast from {url}: signature is invalid");
                return Err(AppCastError::InvalidSignature);
            }
        }

        let app_cast = self
            .serializer
            .deserialize_with_base(&text, base_url(url).as_ref())?;
        info!("App cast lists {} item(s)", app_cast.items.len());
        Ok(app_cast)
    }
}

pub(crate) fn is_web_url(url: &str) -> bool {
    Url::parse(url).is_ok_and(|parsed| matches!(parsed.scheme(), "http" | "https"))
}

fn base_url(location: &str) -> Option<Url> {
    if let Ok(url) = Url::parse(location)
        && url.scheme().len() > 1
    {
        return Some(url);
    }
    let path = Path::new(location);
    if path.is_absolute() {
        return Url::from_file_path(path).ok();
    }
    std::env::current_dir()
        .ok()
        .and_then(|dir| Url::from_file_path(dir.join(path)).ok())
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use sparkle_signing::SecurityMode;

    use super::*;

    const FEED: &str = r#"<rss version="2.0" xmlns:sparkle="http://www.andymatuschak.org/xml-namespaces/sparkle"><channel>
        <item><enclosure url="rocket-2.0.0.exe" sparkle:version="2.0.0" /></item>
    </channel></rss>"#;

    struct Fixed {
        signature: &'static str,
    }

    #[async_trait]
    impl AppCastDataDownloader for Fixed {
        async fn download_app_cast_text(&self, url: &str) -> Result<String, AppCastError> {
            if url.ends_with(".signature") {
                Ok(self.signature.to_string())
            } else {
                Ok(FEED.to_string())
            }
        }
    }

    fn handler(signature: &'static str) -> AppCastHandler {
        AppCastHandler::new(
            Arc::new(Fixed { signature }),
            Arc::new(XmlAppCastSerializer::new()),
        )
    }

    #[tokio::test]
    async fn relative_links_resolve_against_the_feed_url() {
        let cast = handler("")
            .fetch(
                "https://updates.example.com/app/appcast.xml",
                &SignatureVerifier::None(SecurityMode::Unsafe),
                &CancellationToken::new(),
            )
            .await
            .expect("feed should parse");
        assert_eq!(
            cast.items[0].download_link,
            "https://updates.example.com/app/rocket-2.0.0.exe"
        );
    }

    #[tokio::test]
    async fn strict_mode_without_key_rejects_the_feed() {
        let error = handler("")
            .fetch(
                "https://updates.example.com/appcast.xml",
                &SignatureVerifier::None(SecurityMode::Strict),
                &CancellationToken::new(),
            )
            .await
            .expect_err("unsigned feed should be rejected under strict mode");
        assert!(matches!(error, AppCastError::InvalidSignature));
    }

    #[tokio::test]
    async fn software_only_mode_skips_the_feed_check() {
        let result = handler("")
            .fetch(
                "https://updates.example.com/appcast.xml",
                &SignatureVerifier::None(SecurityMode::OnlyVerifySoftwareDownloads),
                &CancellationToken::new(),
            )
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn cancellation_wins_over_the_fetch() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let error = handler("")
            .fetch(
                "https://updates.example.com/appcast.xml",
                &SignatureVerifier::None(SecurityMode::Unsafe),
                &cancel,
            )
            .await
            .expect_err("canceled fetch should fail");
        assert!(matches!(error, AppCastError::Canceled));
    }

    #[test]
    fn web_urls_are_told_apart_from_local_paths() {
        assert!(is_web_url("https://example.com/appcast.xml"));
        assert!(is_web_url("http://localhost:8080/appcast.xml"));
        assert!(!is_web_url("file:///tmp/appcast.xml"));
        assert!(!is_web_url("/tmp/appcast.xml"));
        assert!(!is_web_url("C:\\feeds\\appcast.xml"));
    }
}
