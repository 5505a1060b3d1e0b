//! Update orchestrator - check for new releases and fetch them.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use shipcheck_core::{Application, TaskState, UpdateCheckResult, UPDATE_DOWNLOAD_TASK};

use crate::archive::VersionArchive;
use crate::error::UpdateError;
use crate::fetch::{spawn_fetch_loop, FetchContext, FetchHandle, FetchJob};
use crate::license::LicenseReconciler;
use crate::manifest::load_manifests;
use crate::metrics::Metrics;
use crate::store::ApplicationStore;
use crate::task_status::TaskStatusStore;
use crate::upstream::{ResolveRequest, UpdateDownloader, UpdateResolver};

/// Capabilities the orchestrator composes.
#[derive(Clone)]
pub struct Collaborators {
    pub apps: Arc<dyn ApplicationStore>,
    pub task_status: Arc<dyn TaskStatusStore>,
    pub license: Arc<dyn LicenseReconciler>,
    pub archive: Arc<dyn VersionArchive>,
    pub resolver: Arc<dyn UpdateResolver>,
    pub downloader: Arc<dyn UpdateDownloader>,
}

/// Result of a check, plus the background download when one was started.
#[derive(Debug)]
pub struct CheckOutcome {
    pub result: UpdateCheckResult,
    pub fetch: Option<FetchHandle>,
}

impl CheckOutcome {
    fn without_fetch() -> Self {
        Self {
            result: UpdateCheckResult::none(),
            fetch: None,
        }
    }
}

/// Single-flight update check and fetch.
pub struct UpdateOrchestrator {
    cycle: Cycle,
    /// Serializes the guard's read-clear-mark sequence.
    gate: Mutex<()>,
}

impl UpdateOrchestrator {
    /// Create a new UpdateOrchestrator.
    pub fn new(deps: Collaborators, metrics: Arc<Metrics>) -> Self {
        Self {
            cycle: Cycle { deps, metrics },
            gate: Mutex::new(()),
        }
    }

    /// Check `app_slug` for updates, detaching any background download.
    pub async fn check_for_updates(&self, app_slug: &str) -> Result<UpdateCheckResult, UpdateError> {
        self.check(app_slug).await.map(|outcome| outcome.result)
    }

    /// Check `app_slug` for updates.
    ///
    /// Returns as soon as the pending count is known. When updates were
    /// found the returned handle tracks the download loop, which keeps
    /// running whether or not the handle is awaited.
    ///
    /// Once the task is claimed the cycle runs on its own task, so dropping
    /// this future never leaves `update-download` in `Running`.
    pub async fn check(&self, app_slug: &str) -> Result<CheckOutcome, UpdateError> {
        self.cycle.metrics.record_check();

        let app = self
            .cycle
            .deps
            .apps
            .get_by_slug(app_slug)
            .await
            .map_err(UpdateError::from_lookup)?;

        if !self.try_begin().await? {
            debug!(app_slug = %app_slug, "update-download is already running, not starting a new one");
            self.cycle.metrics.record_skipped();
            return Ok(CheckOutcome::without_fetch());
        }

        let cycle = self.cycle.clone();
        let supervised = tokio::spawn(async move {
            let supervisor = cycle.clone();
            match tokio::spawn(cycle.run(app)).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let err = UpdateError::Aborted(e.to_string());
                    supervisor.fail(&err).await;
                    Err(err)
                }
            }
        });

        supervised
            .await
            .unwrap_or_else(|e| Err(UpdateError::Aborted(e.to_string())))
    }

    /// Single-flight guard: claim the task unless a cycle is already running.
    async fn try_begin(&self) -> Result<bool, UpdateError> {
        let _gate = self.gate.lock().await;
        let status = &self.cycle.deps.task_status;

        let current = status.get(UPDATE_DOWNLOAD_TASK).await?;
        if current.state.is_running() {
            return Ok(false);
        }

        status.clear(UPDATE_DOWNLOAD_TASK).await?;
        status
            .set(UPDATE_DOWNLOAD_TASK, TaskState::Running, "Checking for updates")
            .await?;
        Ok(true)
    }
}

/// One claimed check cycle, from license sync to handing off the fetch loop.
#[derive(Clone)]
struct Cycle {
    deps: Collaborators,
    metrics: Arc<Metrics>,
}

impl Cycle {
    async fn run(self, app: Application) -> Result<CheckOutcome, UpdateError> {
        let app_slug = app.slug.clone();
        match self.prepare(app).await {
            Ok(None) => {
                info!(app_slug = %app_slug, "No updates available");
                self.set_status(TaskState::Done, "No updates available").await;
                Ok(CheckOutcome::without_fetch())
            }
            Ok(Some(job)) => {
                let count = job.updates.len();
                self.metrics.record_updates_found(count);
                self.set_status(TaskState::Running, &format!("Found {count} update(s)"))
                    .await;
                info!(app_slug = %app_slug, available_updates = count, "Starting update download");

                let handle = spawn_fetch_loop(
                    job,
                    FetchContext {
                        downloader: self.deps.downloader.clone(),
                        status: self.deps.task_status.clone(),
                        metrics: self.metrics.clone(),
                    },
                );
                Ok(CheckOutcome {
                    result: UpdateCheckResult::with_count(count),
                    fetch: Some(handle),
                })
            }
            Err(e) => {
                self.fail(&e).await;
                Err(e)
            }
        }
    }

    /// Sync, resolve, and stamp; `None` when nothing is pending.
    async fn prepare(&self, app: Application) -> Result<Option<FetchJob>, UpdateError> {
        // sync license, this is only called when online
        self.deps.license.sync_license(&app, None).await?;

        // license sync can create a new release
        let app = self.deps.apps.get_by_id(&app.id).await?;

        let workspace = self
            .deps
            .archive
            .workspace(&app.id, app.current_sequence)
            .await?;
        let manifests = load_manifests(workspace.path()).await?;

        // releases archived before manifests carried a cursor fall back to the record
        let or_record = |from_manifest: &str, recorded: &str| {
            let value = if from_manifest.is_empty() { recorded } else { from_manifest };
            value.to_string()
        };
        let request = ResolveRequest {
            current_cursor: or_record(manifests.current_cursor(), &app.update_cursor),
            current_channel: or_record(manifests.current_channel(), &app.channel_name),
            license: manifests.license,
            silent: false,
        };
        let updates = self
            .deps
            .resolver
            .resolve_updates(request)
            .await
            .map_err(|e| {
                error!(app_slug = %app.slug, actionable = e.is_actionable(), error = %e, "Failed to get updates");
                e
            })?;

        self.deps.apps.set_last_updated_at(&app.id).await?;

        if updates.is_empty() {
            if let Err(e) = workspace.release().await {
                warn!(app_slug = %app.slug, error = %e, "Failed to release archive workspace");
            }
            return Ok(None);
        }

        Ok(Some(FetchJob {
            app_id: app.id,
            app_slug: app.slug,
            workspace,
            updates,
        }))
    }

    async fn fail(&self, err: &UpdateError) {
        self.metrics.record_failed();
        self.set_status(TaskState::Failed, &err.response_body()).await;
    }

    async fn set_status(&self, state: TaskState, message: &str) {
        if let Err(e) = self
            .deps
            .task_status
            .set(UPDATE_DOWNLOAD_TASK, state, message)
            .await
        {
            warn!(error = %e, ?state, "Failed to update task status");
        }
    }
}
