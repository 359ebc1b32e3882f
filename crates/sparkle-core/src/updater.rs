use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use log::{debug, info, warn};
use sparkle_appcast::{
    AppCastDataDownloader, AppCastError, AppCastFilter, AppCastItem, AppCastSerializer,
    DefaultAppCastFilter, LocalFileAppCastDataDownloader, WebRequestAppCastDataDownloader,
    XmlAppCastSerializer,
};
use sparkle_config::{
    Configuration, ConfigurationStore, JsonConfigurationStore, MemoryConfigurationStore,
    SavedConfiguration,
};
use sparkle_platform::{AppIdentity, AppPaths};
use sparkle_signing::{SecurityMode, SignatureChecker, SignatureVerifier, ValidationResult};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::appcast_handler::{AppCastHandler, is_web_url};
use crate::download::{DownloadEvent, UpdateDownloader};
use crate::error::{CoreError, InstallUpdateFailureReason};
use crate::evaluator::{UpdateEvaluator, UpdateInfo, UpdateStatus};
use crate::events::{EVENT_CAPACITY, UpdaterEvent};
use crate::installer::{
    InstallOutcome, ProcessLauncher, SystemProcessLauncher, build_installer_command,
    execute_install_plan,
};
use crate::settings::{MIN_CHECK_INTERVAL, UpdaterSettings, UserInteractionMode};
use crate::ui::{
    DefaultHooks, LogOnlyInterface, NextUpdateAction, UpdateAvailableResponse, UpdaterHooks,
    UserInterface,
};

const FALLBACK_DOWNLOAD_DIR: &str = "sparkle-updates";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct SparkleUpdaterBuilder {
    settings: UpdaterSettings,
    store: Option<Box<dyn ConfigurationStore>>,
    identity: Option<AppIdentity>,
    verifier: SignatureVerifier,
    app_cast_downloader: Option<Arc<dyn AppCastDataDownloader>>,
    serializer: Option<Arc<dyn AppCastSerializer>>,
    filter: Option<Arc<dyn AppCastFilter>>,
    launcher: Arc<dyn ProcessLauncher>,
    ui: Arc<dyn UserInterface>,
    hooks: Arc<dyn UpdaterHooks>,
}

impl SparkleUpdaterBuilder {
    #[must_use]
    pub fn new(settings: UpdaterSettings) -> Self {
        Self {
            settings,
            store: None,
            identity: None,
            verifier: SignatureVerifier::default(),
            app_cast_downloader: None,
            serializer: None,
            filter: None,
            launcher: Arc::new(SystemProcessLauncher),
            ui: Arc::new(LogOnlyInterface),
            hooks: Arc::new(DefaultHooks),
        }
    }

    /// Persist state in the per-app JSON file and download into the per-app
    /// cache directory, unless a store or download directory is set
    /// explicitly.
    #[must_use]
    pub fn identity(mut self, identity: AppIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    #[must_use]
    pub fn store(mut self, store: Box<dyn ConfigurationStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn verifier(mut self, verifier: SignatureVerifier) -> Self {
        self.verifier = verifier;
        self
    }

    #[must_use]
    pub fn app_cast_downloader(mut self, downloader: Arc<dyn AppCastDataDownloader>) -> Self {
        self.app_cast_downloader = Some(downloader);
        self
    }

    #[must_use]
    pub fn serializer(mut self, serializer: Arc<dyn AppCastSerializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: Arc<dyn AppCastFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    #[must_use]
    pub fn user_interface(mut self, ui: Arc<dyn UserInterface>) -> Self {
        self.ui = ui;
        self
    }

    #[must_use]
    pub fn hooks(mut self, hooks: Arc<dyn UpdaterHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// # Errors
    /// Returns an error when the HTTP clients cannot be built.
    pub fn build(self) -> Result<SparkleUpdater, CoreError> {
        let http = self.settings.http_options();
        let url = self.settings.app_cast_url.as_str();

        let paths = self
            .identity
            .as_ref()
            .and_then(|identity| match AppPaths::for_app(identity) {
                Ok(paths) => Some(paths),
                Err(error) => {
                    warn!("Could not resolve application directories: {error}");
                    None
                }
            });

        let store: Box<dyn ConfigurationStore> = match (self.store, &paths) {
            (Some(store), _) => store,
            (None, Some(paths)) => Box::new(JsonConfigurationStore::for_app(paths)),
            (None, None) => {
                warn!("No configuration store available, updater state will not persist");
                Box::new(MemoryConfigurationStore::new())
            }
        };

        let download_dir = self
            .settings
            .download_dir
            .clone()
            .or_else(|| paths.as_ref().map(AppPaths::download_dir))
            .unwrap_or_else(|| std::env::temp_dir().join(FALLBACK_DOWNLOAD_DIR));

        let app_cast_downloader: Arc<dyn AppCastDataDownloader> = match self.app_cast_downloader {
            Some(downloader) => downloader,
            None if is_web_url(url) => Arc::new(WebRequestAppCastDataDownloader::new(&http)?),
            None => Arc::new(LocalFileAppCastDataDownloader),
        };
        let serializer = self
            .serializer
            .unwrap_or_else(|| Arc::new(XmlAppCastSerializer::new()));
        let filter = self
            .filter
            .unwrap_or_else(|| Arc::new(DefaultAppCastFilter::default()));

        let configuration = Configuration::new(store, self.settings.installed_version.clone());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(SparkleUpdater {
            inner: Arc::new(Inner {
                handler: AppCastHandler::new(app_cast_downloader, serializer),
                evaluator: UpdateEvaluator::new(filter),
                downloader: UpdateDownloader::new(&http)?,
                configuration: Mutex::new(configuration),
                verifier: RwLock::new(self.verifier),
                launcher: self.launcher,
                ui: self.ui,
                hooks: self.hooks,
                events,
                download_dir,
                settings: self.settings,
                check_in_flight: AtomicBool::new(false),
                loop_state: Mutex::new(None),
                transfer_cancel: Mutex::new(CancellationToken::new()),
            }),
        })
    }
}

struct LoopState {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Inner {
    settings: UpdaterSettings,
    download_dir: PathBuf,
    configuration: Mutex<Configuration>,
    verifier: RwLock<SignatureVerifier>,
    handler: AppCastHandler,
    evaluator: UpdateEvaluator,
    downloader: UpdateDownloader,
    launcher: Arc<dyn ProcessLauncher>,
    ui: Arc<dyn UserInterface>,
    hooks: Arc<dyn UpdaterHooks>,
    events: broadcast::Sender<UpdaterEvent>,
    check_in_flight: AtomicBool,
    loop_state: Mutex<Option<LoopState>>,
    transfer_cancel: Mutex<CancellationToken>,
}

/// Resets the in-flight flag however the check ends.
struct CheckGuard<'a>(&'a AtomicBool);

impl<'a> CheckGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for CheckGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Checks for, downloads, verifies and launches updates.
///
/// Cheap to clone; clones share state. Only one check runs at a time, and a
/// check requested while another is in flight returns `None` instead of
/// starting a second one.
#[derive(Clone)]
pub struct SparkleUpdater {
    inner: Arc<Inner>,
}

impl SparkleUpdater {
    #[must_use]
    pub fn builder(settings: UpdaterSettings) -> SparkleUpdaterBuilder {
        SparkleUpdaterBuilder::new(settings)
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<UpdaterEvent> {
        self.inner.events.subscribe()
    }

    #[must_use]
    pub fn settings(&self) -> &UpdaterSettings {
        &self.inner.settings
    }

    #[must_use]
    pub fn download_dir(&self) -> &Path {
        &self.inner.download_dir
    }

    #[must_use]
    pub fn configuration(&self) -> SavedConfiguration {
        self.config().snapshot()
    }

    #[must_use]
    pub fn is_first_run(&self) -> bool {
        self.config().is_first_run()
    }

    pub fn set_check_for_update(&self, enabled: bool) {
        self.config().set_check_for_update(enabled);
    }

    #[must_use]
    pub fn security_mode(&self) -> SecurityMode {
        self.inner
            .verifier
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .security_mode()
    }

    pub fn set_security_mode(&self, mode: SecurityMode) {
        self.inner
            .verifier
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set_security_mode(mode);
    }

    /// Run one check and report the result without acting on it.
    ///
    /// Returns `None` when another check is already running or the check
    /// was canceled.
    pub async fn check_for_updates(&self) -> Option<UpdateInfo> {
        self.run_check(&CancellationToken::new()).await
    }

    /// Check, then follow the interaction mode for an available update.
    /// Nothing is shown when there is no update.
    pub async fn check_for_updates_quietly(&self) -> Option<UpdateInfo> {
        let info = self.check_for_updates().await?;
        if info.status == UpdateStatus::UpdateAvailable {
            self.respond_to_update(&info, &CancellationToken::new()).await;
        }
        Some(info)
    }

    /// Check on behalf of the user: every outcome reaches the UI, and a
    /// previously skipped version can be taken after all.
    pub async fn check_for_updates_at_user_request(&self) -> Option<UpdateInfo> {
        let info = self.check_for_updates().await?;
        let ui = &self.inner.ui;
        match info.status {
            UpdateStatus::UpdateAvailable => {
                self.respond_to_update(&info, &CancellationToken::new()).await;
            }
            UpdateStatus::UpdateNotAvailable => ui.show_no_update().await,
            UpdateStatus::CouldNotDetermine => ui.show_could_not_determine().await,
            UpdateStatus::UserSkipped => {
                if let Some(top) = info.top()
                    && ui.show_version_skipped(top).await
                {
                    self.config().clear_skipped_version();
                    let transfer = self.begin_transfer(&CancellationToken::new());
                    self.prompt(&info.updates, None, &transfer).await;
                }
            }
        }
        Some(info)
    }

    /// Start periodic checks in the background. Returns false, changing
    /// nothing, when the loop is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_loop(
        &self,
        do_initial_check: bool,
        force_initial_check: bool,
        interval: Option<Duration>,
    ) -> bool {
        let mut state = lock(&self.inner.loop_state);
        if state.as_ref().is_some_and(|running| !running.handle.is_finished()) {
            debug!("Update loop already running");
            return false;
        }

        let interval = interval
            .unwrap_or_else(|| self.inner.settings.check_interval())
            .max(MIN_CHECK_INTERVAL);
        let cancel = CancellationToken::new();
        let updater = self.clone();
        let handle = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                updater
                    .run_loop(do_initial_check, force_initial_check, interval, cancel)
                    .await;
            }
        });
        *state = Some(LoopState { cancel, handle });
        true
    }

    /// Stop the loop and cancel the check cycle it is running, including the
    /// download and verification of an update. Safe to call when no loop
    /// runs.
    pub fn stop_loop(&self) {
        if let Some(state) = lock(&self.inner.loop_state).take() {
            debug!("Stopping update loop");
            state.cancel.cancel();
        }
    }

    #[must_use]
    pub fn is_loop_running(&self) -> bool {
        lock(&self.inner.loop_state)
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Cancel the current download or downloaded-file verification.
    pub fn cancel_download(&self) {
        self.inner.downloader.cancel_download();
        lock(&self.inner.transfer_cancel).cancel();
    }

    /// Persist `item` as skipped so later checks report `UserSkipped`.
    pub fn skip_version(&self, item: &AppCastItem) {
        let version = item.version.as_str().to_string();
        if let Err(error) = self.config().set_version_to_skip(&version) {
            warn!("Could not skip version {version}: {error}");
            return;
        }
        info!("Skipping version {version}");
        self.emit(UpdaterEvent::UserSkipped { version });
    }

    /// Defer scheduled checks for the configured remind-later delay.
    pub fn remind_me_later(&self) {
        let delay = TimeDelta::from_std(self.inner.settings.remind_later())
            .unwrap_or_else(|_| TimeDelta::days(1));
        let until = Utc::now() + delay;
        self.config().set_remind_me_later(until);
        info!("Reminding about the update after {until}");
        self.emit(UpdaterEvent::RemindMeLater { until });
    }

    /// Download `item` into the download directory, reusing an earlier
    /// download of it when that still verifies.
    ///
    /// # Errors
    /// Returns [`InstallUpdateFailureReason::DownloadFailed`] or
    /// [`InstallUpdateFailureReason::DownloadCanceled`].
    pub async fn download_update(
        &self,
        item: &AppCastItem,
    ) -> Result<PathBuf, InstallUpdateFailureReason> {
        let transfer = self.begin_transfer(&CancellationToken::new());
        self.download_with(item, &transfer).await
    }

    async fn download_with(
        &self,
        item: &AppCastItem,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, InstallUpdateFailureReason> {
        let file_name = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(self.download_canceled()),
            name = self.inner.downloader.retrieve_destination_file_name(item) => name,
        };
        let path = self.inner.download_dir.join(file_name);

        if tokio::fs::metadata(&path).await.is_ok_and(|meta| meta.is_file()) {
            let verdict = self.verify_file(item, &path, cancel).await;
            if cancel.is_cancelled() {
                return Err(self.download_canceled());
            }
            if verdict.is_acceptable() {
                info!("Reusing previous download {}", path.display());
                self.emit(UpdaterEvent::DownloadFinished { path: path.clone() });
                return Ok(path);
            }
            info!("Discarding previous download {} ({verdict:?})", path.display());
            if let Err(error) = tokio::fs::remove_file(&path).await {
                warn!("Failed to remove {}: {error}", path.display());
            }
        }

        if cancel.is_cancelled() {
            return Err(self.download_canceled());
        }
        self.emit(UpdaterEvent::DownloadStarted {
            url: item.download_link.clone(),
            path: path.clone(),
        });
        let mut events = self
            .inner
            .downloader
            .start_cancelable_download(&item.download_link, &path, cancel.clone())
            .await;

        while let Some(event) = events.recv().await {
            match event {
                DownloadEvent::Progress(progress) => {
                    self.inner.ui.show_download_progress(&progress);
                    self.emit(UpdaterEvent::DownloadProgress(progress));
                }
                DownloadEvent::Completed {
                    error: Some(error), ..
                } => {
                    let message = error.to_string();
                    self.emit(UpdaterEvent::DownloadError(message.clone()));
                    self.inner.ui.show_download_error(&message).await;
                    return Err(InstallUpdateFailureReason::DownloadFailed);
                }
                DownloadEvent::Completed {
                    was_canceled: true, ..
                } => return Err(self.download_canceled()),
                DownloadEvent::Completed { .. } => {
                    self.emit(UpdaterEvent::DownloadFinished { path: path.clone() });
                    return Ok(path);
                }
            }
        }

        warn!("Download of {} ended without a result", item.download_link);
        Err(InstallUpdateFailureReason::DownloadFailed)
    }

    /// Verify the downloaded file and launch its installer.
    ///
    /// Every failure is also emitted as
    /// [`UpdaterEvent::InstallUpdateFailed`] and shown through the UI.
    ///
    /// # Errors
    /// Returns why the installer was not launched.
    pub async fn install_update(
        &self,
        item: &AppCastItem,
        path: &Path,
        silent: bool,
    ) -> Result<InstallOutcome, InstallUpdateFailureReason> {
        let transfer = self.begin_transfer(&CancellationToken::new());
        self.install_with(item, path, silent, &transfer).await
    }

    async fn install_with(
        &self,
        item: &AppCastItem,
        path: &Path,
        silent: bool,
        cancel: &CancellationToken,
    ) -> Result<InstallOutcome, InstallUpdateFailureReason> {
        let result = self.try_install(item, path, silent, cancel).await;
        match result {
            Ok(InstallOutcome::ExitForInstaller) => self.emit(UpdaterEvent::CloseApplication),
            Ok(InstallOutcome::RestartRequired) => {
                info!("Update {} installed, restart to apply", item.version);
            }
            Err(reason) => {
                warn!("Installing {} failed: {reason}", item.version);
                self.emit(UpdaterEvent::InstallUpdateFailed(reason));
                self.inner.ui.show_install_failed(reason).await;
            }
        }
        result
    }

    async fn try_install(
        &self,
        item: &AppCastItem,
        path: &Path,
        silent: bool,
        cancel: &CancellationToken,
    ) -> Result<InstallOutcome, InstallUpdateFailureReason> {
        if !tokio::fs::metadata(path).await.is_ok_and(|meta| meta.is_file()) {
            return Err(InstallUpdateFailureReason::FileNotFound);
        }

        let verdict = self.verify_file(item, path, cancel).await;
        if cancel.is_cancelled() {
            return Err(InstallUpdateFailureReason::DownloadCanceled);
        }
        self.emit(UpdaterEvent::SignatureChecked(verdict));
        if !verdict.is_acceptable() {
            return Err(InstallUpdateFailureReason::InvalidSignature);
        }

        let plan = build_installer_command(path, silent, &self.inner.settings.installer)?;
        if !self.inner.hooks.prepare_to_exit(item, path).await {
            info!("Host canceled installation of {}", item.version);
            return Err(InstallUpdateFailureReason::CanceledByUserViaEvent);
        }
        if cancel.is_cancelled() {
            return Err(InstallUpdateFailureReason::DownloadCanceled);
        }

        let launcher = Arc::clone(&self.inner.launcher);
        tokio::task::spawn_blocking(move || execute_install_plan(&plan, launcher.as_ref()))
            .await
            .map_err(|error| {
                warn!("Installer task failed: {error}");
                InstallUpdateFailureReason::InstallerLaunchFailed
            })?
    }

    fn config(&self) -> MutexGuard<'_, Configuration> {
        lock(&self.inner.configuration)
    }

    fn emit(&self, event: UpdaterEvent) {
        let _ = self.inner.events.send(event);
    }

    /// Token for one download-verify-install sequence. It fires on
    /// [`Self::cancel_download`] and whenever `cycle` fires.
    fn begin_transfer(&self, cycle: &CancellationToken) -> CancellationToken {
        let token = cycle.child_token();
        *lock(&self.inner.transfer_cancel) = token.clone();
        token
    }

    fn download_canceled(&self) -> InstallUpdateFailureReason {
        info!("Update download canceled");
        self.emit(UpdaterEvent::DownloadCanceled);
        InstallUpdateFailureReason::DownloadCanceled
    }

    fn verifier_snapshot(&self) -> SignatureVerifier {
        self.inner
            .verifier
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn verify_file(
        &self,
        item: &AppCastItem,
        path: &Path,
        cancel: &CancellationToken,
    ) -> ValidationResult {
        let verifier = self.verifier_snapshot();
        let signature = item.download_signature.clone();
        let path_owned = path.to_path_buf();
        let abort = cancel.clone();

        let verdict = tokio::task::spawn_blocking(move || {
            verifier.verify_signature_of_file_with_abort(&signature, &path_owned, &|| {
                abort.is_cancelled()
            })
        })
        .await
        .unwrap_or_else(|error| {
            warn!("Signature check task failed: {error}");
            ValidationResult::Invalid
        });
        debug!("Signature of {}: {verdict:?}", path.display());
        verdict
    }

    async fn run_check(&self, cancel: &CancellationToken) -> Option<UpdateInfo> {
        let Some(_guard) = CheckGuard::acquire(&self.inner.check_in_flight) else {
            debug!("Update check already in progress");
            return None;
        };

        self.emit(UpdaterEvent::CheckStarted);
        let verifier = self.verifier_snapshot();
        let fetched = match self
            .inner
            .handler
            .fetch(&self.inner.settings.app_cast_url, &verifier, cancel)
            .await
        {
            Ok(app_cast) => Some(app_cast),
            Err(AppCastError::Canceled) => {
                debug!("Update check canceled");
                return None;
            }
            Err(error) => {
                warn!("Update check failed: {error}");
                None
            }
        };

        let mut info = {
            let mut config = self.config();
            let info = self.inner.evaluator.evaluate(
                fetched.as_ref(),
                config.installed_version(),
                config.last_version_skipped(),
            );
            config.touch_after_check_at(Utc::now());
            info
        };

        if info.status == UpdateStatus::UserSkipped && info.is_critical() {
            info!("Critical update overrides the skipped version");
            info.status = UpdateStatus::UpdateAvailable;
        }

        info!("Update check finished: {}", info.status);
        self.emit(UpdaterEvent::CheckFinished(info.status));
        if info.status == UpdateStatus::UpdateAvailable
            && let Some(top) = info.top()
        {
            self.emit(UpdaterEvent::UpdateDetected(Box::new(top.clone())));
        }
        Some(info)
    }

    async fn respond_to_update(&self, info: &UpdateInfo, cycle: &CancellationToken) {
        let Some(top) = info.top() else {
            return;
        };
        let transfer = self.begin_transfer(cycle);
        let mode = self.inner.settings.interaction_mode;
        let action = match self.inner.hooks.update_detected(&info.updates).await {
            Some(action) => action,
            None if mode == UserInteractionMode::NotSilent => {
                NextUpdateAction::ShowStandardUserInterface
            }
            None => NextUpdateAction::PerformUpdateUnattended,
        };
        debug!("Next action for {}: {action:?}", top.version);

        match action {
            NextUpdateAction::ProhibitUpdate => info!("Host prohibited update {}", top.version),
            NextUpdateAction::ShowStandardUserInterface => {
                self.prompt(&info.updates, None, &transfer).await;
            }
            NextUpdateAction::PerformUpdateUnattended => {
                let Ok(path) = self.download_with(top, &transfer).await else {
                    return;
                };
                if mode == UserInteractionMode::DownloadNoInstall {
                    self.prompt(&info.updates, Some(path), &transfer).await;
                } else {
                    let _ = self.install_with(top, &path, true, &transfer).await;
                }
            }
        }
    }

    async fn prompt(
        &self,
        updates: &[AppCastItem],
        downloaded: Option<PathBuf>,
        transfer: &CancellationToken,
    ) {
        let Some(top) = updates.first() else {
            return;
        };
        let critical = top.is_critical_update;
        let mut response = self.inner.ui.show_update_available(updates, critical).await;
        if critical
            && matches!(
                response,
                UpdateAvailableResponse::SkipUpdate | UpdateAvailableResponse::RemindMeLater
            )
        {
            info!("Ignoring {response:?} for critical update {}", top.version);
            response = UpdateAvailableResponse::Dismissed;
        }

        match response {
            UpdateAvailableResponse::InstallUpdate => {
                self.config().clear_remind_me_later();
                let path = match downloaded {
                    Some(path) => path,
                    None => match self.download_with(top, transfer).await {
                        Ok(path) => path,
                        Err(_) => return,
                    },
                };
                let _ = self.install_with(top, &path, false, transfer).await;
            }
            UpdateAvailableResponse::SkipUpdate => self.skip_version(top),
            UpdateAvailableResponse::RemindMeLater => self.remind_me_later(),
            UpdateAvailableResponse::Dismissed => debug!("Update {} dismissed", top.version),
        }
    }

    fn scheduled_check_due(&self, interval: Duration) -> bool {
        let mut config = self.config();
        config.reload();
        let now = Utc::now();
        if !config.check_for_update() {
            debug!("Scheduled check skipped: checks are disabled");
            return false;
        }
        if config.remind_later_active(now) {
            debug!("Scheduled check skipped: remind-me-later is active");
            return false;
        }
        let interval = TimeDelta::from_std(interval).unwrap_or(TimeDelta::MAX);
        if let Some(last) = config.last_check_time()
            && now.signed_duration_since(last) < interval
        {
            debug!("Scheduled check skipped: last check at {last}");
            return false;
        }
        true
    }

    async fn run_loop(
        &self,
        do_initial_check: bool,
        force_initial_check: bool,
        interval: Duration,
        cancel: CancellationToken,
    ) {
        info!("Update loop started, interval {}s", interval.as_secs());
        self.emit(UpdaterEvent::LoopStarted);

        let mut first_tick = true;
        loop {
            let run = if first_tick {
                if !do_initial_check {
                    false
                } else if force_initial_check {
                    true
                } else if self.is_first_run() {
                    debug!("First run, skipping the initial check");
                    false
                } else {
                    self.scheduled_check_due(interval)
                }
            } else {
                self.scheduled_check_due(interval)
            };
            first_tick = false;

            if run {
                let cycle = cancel.child_token();
                if let Some(info) = self.run_check(&cycle).await
                    && info.status == UpdateStatus::UpdateAvailable
                    && !cycle.is_cancelled()
                {
                    self.respond_to_update(&info, &cycle).await;
                }
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }
        }

        info!("Update loop stopped");
        self.emit(UpdaterEvent::LoopFinished);
    }
}
