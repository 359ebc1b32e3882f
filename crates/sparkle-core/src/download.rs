use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use futures_util::StreamExt;
use log::{debug, info, warn};
use sparkle_appcast::{AppCastError, AppCastItem, HttpOptions};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::appcast_handler::is_web_url;

pub const DOWNLOAD_CHUNK_SIZE: usize = 64 * 1024;
pub const DEFAULT_DOWNLOAD_FILE_NAME: &str = "update-download";
const PARTIAL_SUFFIX: &str = ".partial";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub bytes_received: u64,
    /// Zero when the server did not announce a length.
    pub total_bytes: u64,
    pub percentage: u8,
}

impl DownloadProgress {
    fn new(bytes_received: u64, total_bytes: u64) -> Self {
        let percentage = if total_bytes == 0 {
            0
        } else {
            u8::try_from((bytes_received.saturating_mul(100) / total_bytes).min(100)).unwrap_or(100)
        };
        Self {
            bytes_received,
            total_bytes,
            percentage,
        }
    }
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("{context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("download from {url} failed with HTTP {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid download URL {url:?}: {details}")]
    InvalidUrl { url: String, details: String },
}

impl DownloadError {
    fn http(context: &'static str, source: reqwest::Error) -> Self {
        Self::Http { context, source }
    }

    fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }
}

/// Events of one download, in order: any number of `Progress` with strictly
/// increasing `bytes_received`, then exactly one `Completed`.
#[derive(Debug)]
pub enum DownloadEvent {
    Progress(DownloadProgress),
    Completed {
        error: Option<DownloadError>,
        was_canceled: bool,
    },
}

/// Streams one artifact at a time to disk.
///
/// Data lands in `<destination>.partial` and is renamed into place only after
/// the transfer finished, so the destination never holds a truncated file.
/// The downloader makes no trust decision about what it fetched.
pub struct UpdateDownloader {
    client: reqwest::Client,
    active: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    cancel: Mutex<CancellationToken>,
}

impl UpdateDownloader {
    /// # Errors
    /// Returns an error when the HTTP client cannot be built.
    pub fn new(http: &HttpOptions) -> Result<Self, AppCastError> {
        Ok(Self::with_client(http.build_download_client()?))
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            active: tokio::sync::Mutex::new(None),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Start downloading `url` to `destination` in the background. A
    /// download that is still running is canceled, and has delivered its
    /// completion event, before the new one starts.
    pub async fn start_file_download(
        &self,
        url: &str,
        destination: &Path,
    ) -> mpsc::UnboundedReceiver<DownloadEvent> {
        self.start_cancelable_download(url, destination, CancellationToken::new())
            .await
    }

    /// Like [`Self::start_file_download`], but the transfer also stops when
    /// the caller's `cancel` fires, including when it fired before the
    /// transfer began.
    pub async fn start_cancelable_download(
        &self,
        url: &str,
        destination: &Path,
        cancel: CancellationToken,
    ) -> mpsc::UnboundedReceiver<DownloadEvent> {
        let mut active = self.active.lock().await;

        let previous = std::mem::replace(
            &mut *self.cancel.lock().unwrap_or_else(PoisonError::into_inner),
            cancel.clone(),
        );
        previous.cancel();
        if let Some(handle) = active.take() {
            if !handle.is_finished() {
                debug!("Canceling the previous download before starting {url}");
            }
            let _ = handle.await;
        }

        let (events, receiver) = mpsc::unbounded_channel();
        *active = Some(tokio::spawn(run_download(
            self.client.clone(),
            url.to_string(),
            destination.to_path_buf(),
            cancel,
            events,
        )));
        receiver
    }

    /// Cancel the running download, if any. Its receiver sees
    /// `Completed { was_canceled: true }`.
    pub fn cancel_download(&self) {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    /// File name to save `item` under: the `Content-Disposition` name from a
    /// HEAD request when the server sends one, else the last segment of the
    /// (possibly redirected) URL, else [`DEFAULT_DOWNLOAD_FILE_NAME`].
    pub async fn retrieve_destination_file_name(&self, item: &AppCastItem) -> String {
        let link = item.download_link.as_str();
        let fallback = file_name_from_url(link);
        if !is_web_url(link) {
            return fallback;
        }

        match self.client.head(link).send().await {
            Ok(response) if response.status().is_success() => response
                .headers()
                .get(reqwest::header::CONTENT_DISPOSITION)
                .and_then(|value| value.to_str().ok())
                .and_then(file_name_from_content_disposition)
                .map_or_else(
                    || file_name_from_url(response.url().as_str()),
                    |name| sanitize_file_name(&name),
                ),
            Ok(response) => {
                debug!("HEAD {link} returned {}, using URL name", response.status());
                fallback
            }
            Err(error) => {
                debug!("HEAD {link} failed, using URL name: {error}");
                fallback
            }
        }
    }
}

pub(crate) fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    destination.with_file_name(name)
}

fn sanitize_file_name(raw: &str) -> String {
    let normalized = raw.trim().trim_matches('"').replace('\\', "/");
    Path::new(&normalized)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty() && !name.contains(".."))
        .unwrap_or(DEFAULT_DOWNLOAD_FILE_NAME)
        .to_string()
}

fn file_name_from_url(link: &str) -> String {
    let segment = Url::parse(link)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .unwrap_or_else(|| link.rsplit(['/', '\\']).next().unwrap_or_default().to_string());
    sanitize_file_name(&segment)
}

fn file_name_from_content_disposition(value: &str) -> Option<String> {
    let mut plain = None;
    for part in value.split(';').map(str::trim) {
        let Some((key, raw)) = part.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let encoded = raw.trim().trim_matches('"');
                let name = encoded
                    .split_once("''")
                    .map_or(encoded, |(_, name)| name);
                if !name.is_empty() {
                    return Some(name.to_string());
                }
            }
            "filename" => {
                let name = raw.trim().trim_matches('"');
                if !name.is_empty() {
                    plain = Some(name.to_string());
                }
            }
            _ => {}
        }
    }
    plain
}

enum Transfer {
    Completed(u64),
    Canceled,
}

struct Sink<'a> {
    file: tokio::fs::File,
    received: u64,
    total: u64,
    events: &'a mpsc::UnboundedSender<DownloadEvent>,
}

impl Sink<'_> {
    async fn write(&mut self, mut bytes: &[u8]) -> Result<(), DownloadError> {
        while !bytes.is_empty() {
            let (piece, rest) = bytes.split_at(bytes.len().min(DOWNLOAD_CHUNK_SIZE));
            self.file
                .write_all(piece)
                .await
                .map_err(|error| DownloadError::io("failed to write download data", error))?;
            self.received += piece.len() as u64;
            let _ = self.events.send(DownloadEvent::Progress(DownloadProgress::new(
                self.received,
                self.total,
            )));
            bytes = rest;
        }
        Ok(())
    }

    async fn finish(mut self) -> Result<u64, DownloadError> {
        self.file
            .flush()
            .await
            .map_err(|error| DownloadError::io("failed to flush download file", error))?;
        self.file
            .sync_all()
            .await
            .map_err(|error| DownloadError::io("failed to sync download file", error))?;
        Ok(self.received)
    }
}

async fn create_sink<'a>(
    partial: &Path,
    total: u64,
    events: &'a mpsc::UnboundedSender<DownloadEvent>,
) -> Result<Sink<'a>, DownloadError> {
    if let Some(parent) = partial.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|error| DownloadError::io("failed to create download directory", error))?;
    }
    let file = tokio::fs::File::create(partial)
        .await
        .map_err(|error| DownloadError::io("failed to create download file", error))?;
    Ok(Sink {
        file,
        received: 0,
        total,
        events,
    })
}

async fn transfer_http(
    client: &reqwest::Client,
    url: &str,
    partial: &Path,
    cancel: &CancellationToken,
    events: &mpsc::UnboundedSender<DownloadEvent>,
) -> Result<Transfer, DownloadError> {
    let response = tokio::select! {
        biased;
        () = cancel.cancelled() => return Ok(Transfer::Canceled),
        response = client.get(url).send() => {
            response.map_err(|error| DownloadError::http("download request failed", error))?
        }
    };
    if !response.status().is_success() {
        return Err(DownloadError::HttpStatus {
            url: url.to_string(),
            status: response.status(),
        });
    }

    let mut sink = create_sink(partial, response.content_length().unwrap_or(0), events).await?;
    let mut stream = response.bytes_stream();
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(Transfer::Canceled),
            next = stream.next() => next,
        };
        match next {
            Some(Ok(chunk)) => sink.write(&chunk).await?,
            Some(Err(error)) => return Err(DownloadError::http("download stream error", error)),
            None => break,
        }
    }
    sink.finish().await.map(Transfer::Completed)
}

async fn transfer_local(
    source: &Path,
    partial: &Path,
    cancel: &CancellationToken,
    events: &mpsc::UnboundedSender<DownloadEvent>,
) -> Result<Transfer, DownloadError> {
    let mut input = tokio::fs::File::open(source)
        .await
        .map_err(|error| DownloadError::io("failed to open local update file", error))?;
    let total = input
        .metadata()
        .await
        .map_err(|error| DownloadError::io("failed to stat local update file", error))?
        .len();

    let mut sink = create_sink(partial, total, events).await?;
    let mut buffer = vec![0_u8; DOWNLOAD_CHUNK_SIZE];
    loop {
        if cancel.is_cancelled() {
            return Ok(Transfer::Canceled);
        }
        let read = input
            .read(&mut buffer)
            .await
            .map_err(|error| DownloadError::io("failed to read local update file", error))?;
        if read == 0 {
            break;
        }
        sink.write(&buffer[..read]).await?;
    }
    sink.finish().await.map(Transfer::Completed)
}

async fn transfer(
    client: &reqwest::Client,
    url: &str,
    partial: &Path,
    cancel: &CancellationToken,
    events: &mpsc::UnboundedSender<DownloadEvent>,
) -> Result<Transfer, DownloadError> {
    let parsed = Url::parse(url).map_err(|error| DownloadError::InvalidUrl {
        url: url.to_string(),
        details: error.to_string(),
    })?;
    if parsed.scheme() == "file" {
        let source = parsed.to_file_path().map_err(|()| DownloadError::InvalidUrl {
            url: url.to_string(),
            details: "not a local file path".to_string(),
        })?;
        return transfer_local(&source, partial, cancel, events).await;
    }
    transfer_http(client, url, partial, cancel, events).await
}

async fn remove_if_present(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => warn!("Failed to remove {}: {error}", path.display()),
    }
}

async fn run_download(
    client: reqwest::Client,
    url: String,
    destination: PathBuf,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<DownloadEvent>,
) {
    let partial = partial_path(&destination);
    remove_if_present(&destination).await;

    info!("Downloading {url} to {}", destination.display());
    let (error, was_canceled) = match transfer(&client, &url, &partial, &cancel, &events).await {
        Ok(Transfer::Completed(bytes)) => match tokio::fs::rename(&partial, &destination).await {
            Ok(()) => {
                info!("Download complete: {bytes} bytes");
                (None, false)
            }
            Err(error) => (
                Some(DownloadError::io("failed to move download into place", error)),
                false,
            ),
        },
        Ok(Transfer::Canceled) => {
            info!("Download of {url} canceled");
            (None, true)
        }
        Err(error) => (Some(error), false),
    };

    if let Some(error) = &error {
        warn!("Download of {url} failed: {error}");
    }
    if error.is_some() || was_canceled {
        remove_if_present(&partial).await;
    }
    let _ = events.send(DownloadEvent::Completed {
        error,
        was_canceled,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_is_capped_and_zero_when_length_is_unknown() {
        assert_eq!(DownloadProgress::new(50, 200).percentage, 25);
        assert_eq!(DownloadProgress::new(500, 200).percentage, 100);
        assert_eq!(DownloadProgress::new(500, 0).percentage, 0);
    }

    #[test]
    fn content_disposition_prefers_the_extended_name() {
        assert_eq!(
            file_name_from_content_disposition(
                "attachment; filename=\"plain.exe\"; filename*=UTF-8''Rocket%20Setup.exe"
            )
            .as_deref(),
            Some("Rocket%20Setup.exe")
        );
        assert_eq!(
            file_name_from_content_disposition("attachment; filename=\"Rocket.msi\"").as_deref(),
            Some("Rocket.msi")
        );
        assert!(file_name_from_content_disposition("inline").is_none());
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("..\\..\\evil.exe"), "evil.exe");
        assert_eq!(sanitize_file_name(".."), DEFAULT_DOWNLOAD_FILE_NAME);
        assert_eq!(sanitize_file_name(""), DEFAULT_DOWNLOAD_FILE_NAME);
        assert_eq!(
            file_name_from_url("https://cdn.example.com/builds/Rocket-2.0.0.dmg?token=abc"),
            "Rocket-2.0.0.dmg"
        );
        assert_eq!(
            file_name_from_url("https://cdn.example.com/"),
            DEFAULT_DOWNLOAD_FILE_NAME
        );
    }

    #[test]
    fn partial_file_sits_next_to_the_destination() {
        assert_eq!(
            partial_path(Path::new("/tmp/updates/Rocket.msi")),
            PathBuf::from("/tmp/updates/Rocket.msi.partial")
        );
    }

    #[tokio::test]
    async fn a_token_canceled_before_the_start_stops_the_transfer() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let source = dir.path().join("source.bin");
        std::fs::write(&source, vec![1_u8; DOWNLOAD_CHUNK_SIZE]).expect("source should be written");
        let destination = dir.path().join("update.bin");

        let downloader = UpdateDownloader::with_client(reqwest::Client::new());
        let url = Url::from_file_path(&source).expect("source path should convert");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut events = downloader
            .start_cancelable_download(url.as_str(), &destination, cancel)
            .await;

        let mut canceled = false;
        while let Some(event) = events.recv().await {
            match event {
                DownloadEvent::Progress(_) => panic!("no data should be written"),
                DownloadEvent::Completed {
                    error,
                    was_canceled,
                } => {
                    assert!(error.is_none());
                    canceled = was_canceled;
                }
            }
        }

        assert!(canceled);
        assert!(!destination.exists());
        assert!(!partial_path(&destination).exists());
    }

    #[tokio::test]
    async fn local_file_urls_are_copied_with_progress() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let source = dir.path().join("source.bin");
        let payload = vec![3_u8; DOWNLOAD_CHUNK_SIZE * 2 + 17];
        std::fs::write(&source, &payload).expect("source should be written");
        let destination = dir.path().join("out").join("update.bin");

        let downloader = UpdateDownloader::with_client(reqwest::Client::new());
        let url = Url::from_file_path(&source).expect("source path should convert");
        let mut events = downloader.start_file_download(url.as_str(), &destination).await;

        let mut progress = Vec::new();
        let mut completion = None;
        while let Some(event) = events.recv().await {
            match event {
                DownloadEvent::Progress(update) => progress.push(update),
                DownloadEvent::Completed {
                    error,
                    was_canceled,
                } => completion = Some((error.is_none(), was_canceled)),
            }
        }

        assert_eq!(completion, Some((true, false)));
        assert!(progress.len() >= 3);
        assert!(progress.windows(2).all(|pair| pair[0].bytes_received < pair[1].bytes_received));
        assert_eq!(progress.last().map(|p| p.percentage), Some(100));
        assert_eq!(
            std::fs::read(&destination).expect("download should exist"),
            payload
        );
        assert!(!partial_path(&destination).exists());
    }
}
