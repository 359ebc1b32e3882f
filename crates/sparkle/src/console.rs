use std::io::{BufRead, Write};

use async_trait::async_trait;
use log::warn;
use sparkle_appcast::AppCastItem;
use sparkle_core::{
    DownloadProgress, InstallUpdateFailureReason, UpdateAvailableResponse, UserInterface,
};

/// Terminal collaborator for the headless host.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleInterface {
    /// Answer "install" without prompting.
    pub assume_yes: bool,
    /// Open the release notes of an offered update in the browser.
    pub open_notes: bool,
}

pub fn parse_response(line: &str) -> UpdateAvailableResponse {
    match line.trim().to_ascii_lowercase().as_str() {
        "i" | "install" | "y" | "yes" => UpdateAvailableResponse::InstallUpdate,
        "s" | "skip" => UpdateAvailableResponse::SkipUpdate,
        "r" | "remind" | "later" => UpdateAvailableResponse::RemindMeLater,
        _ => UpdateAvailableResponse::Dismissed,
    }
}

pub fn describe(item: &AppCastItem) -> String {
    let mut line = item.version.to_string();
    if let Some(short) = &item.short_version {
        line.push_str(&format!(" ({short})"));
    }
    if let Some(date) = item.publication_date {
        line.push_str(&format!(", released {}", date.format("%Y-%m-%d")));
    }
    if item.update_size > 0 {
        line.push_str(&format!(", {} bytes", item.update_size));
    }
    if item.is_critical_update {
        line.push_str(", critical");
    }
    line
}

async fn read_answer(prompt: String) -> Option<String> {
    tokio::task::spawn_blocking(move || {
        let mut stdout = std::io::stdout().lock();
        let _ = write!(stdout, "{prompt}");
        let _ = stdout.flush();
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line).ok()?;
        Some(line)
    })
    .await
    .ok()
    .flatten()
}

#[async_trait]
impl UserInterface for ConsoleInterface {
    async fn show_update_available(
        &self,
        updates: &[AppCastItem],
        is_critical: bool,
    ) -> UpdateAvailableResponse {
        let Some(top) = updates.first() else {
            return UpdateAvailableResponse::Dismissed;
        };
        println!("Update available: {}", describe(top));
        for older in updates.iter().skip(1) {
            println!("  also newer than installed: {}", describe(older));
        }
        if let Some(notes) = &top.release_notes_link {
            println!("Release notes: {notes}");
            if self.open_notes
                && let Err(error) = open::that(notes)
            {
                warn!("Failed to open release notes {notes}: {error}");
            }
        }

        if self.assume_yes {
            return UpdateAvailableResponse::InstallUpdate;
        }
        let prompt = if is_critical {
            "[i]nstall or [d]ismiss? "
        } else {
            "[i]nstall, [s]kip this version, [r]emind me later or [d]ismiss? "
        };
        read_answer(prompt.to_string())
            .await
            .map_or(UpdateAvailableResponse::Dismissed, |line| parse_response(&line))
    }

    async fn show_version_skipped(&self, item: &AppCastItem) -> bool {
        println!("Version {} was skipped earlier.", item.version);
        if self.assume_yes {
            return true;
        }
        read_answer("Install it anyway? [y/N] ".to_string())
            .await
            .is_some_and(|line| parse_response(&line) == UpdateAvailableResponse::InstallUpdate)
    }

    async fn show_no_update(&self) {
        println!("You are running the latest version.");
    }

    async fn show_could_not_determine(&self) {
        println!("Could not determine whether an update is available.");
    }

    fn show_download_progress(&self, progress: &DownloadProgress) {
        if progress.total_bytes > 0 {
            eprint!(
                "\rDownloading... {:>3}% ({}/{} bytes)",
                progress.percentage, progress.bytes_received, progress.total_bytes
            );
        } else {
            eprint!("\rDownloading... {} bytes", progress.bytes_received);
        }
    }

    async fn show_download_error(&self, message: &str) {
        eprintln!();
        println!("Download failed: {message}");
    }

    async fn show_install_failed(&self, reason: InstallUpdateFailureReason) {
        println!("Update could not be installed: {reason}");
    }
}
