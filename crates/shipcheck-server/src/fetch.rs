//! Background fetch loop.
//!
//! Downloads the pending releases of one check cycle, strictly in order,
//! into the cycle's workspace. A failed download is logged and skipped; the
//! loop always runs to the end, releases the workspace, and records the
//! outcome on the `update-download` task.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use shipcheck_core::{AppId, TaskState, UpdateDescriptor, UPDATE_DOWNLOAD_TASK};

use crate::archive::ArchiveWorkspace;
use crate::metrics::Metrics;
use crate::task_status::TaskStatusStore;
use crate::upstream::UpdateDownloader;

/// Everything a fetch loop owns.
#[derive(Debug)]
pub struct FetchJob {
    pub app_id: AppId,
    pub app_slug: String,
    pub workspace: ArchiveWorkspace,
    /// Oldest first.
    pub updates: Vec<UpdateDescriptor>,
}

/// Outcome of one fetch loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub attempted: usize,
    pub succeeded: usize,
    /// Cursors whose download failed, in attempt order.
    pub failed: Vec<String>,
}

impl FetchReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Handle to a detached fetch loop. Dropping it does not cancel the loop.
pub type FetchHandle = JoinHandle<FetchReport>;

/// Collaborators the loop reports through.
#[derive(Clone)]
pub struct FetchContext {
    pub downloader: Arc<dyn UpdateDownloader>,
    pub status: Arc<dyn TaskStatusStore>,
    pub metrics: Arc<Metrics>,
}

/// Run `job` on its own task.
///
/// A supervisor marks the task failed if the loop panics, so the
/// single-flight guard is never left holding `Running`.
pub fn spawn_fetch_loop(job: FetchJob, ctx: FetchContext) -> FetchHandle {
    tokio::spawn(async move {
        let app_slug = job.app_slug.clone();
        let status = ctx.status.clone();

        match tokio::spawn(run_fetch_loop(job, ctx)).await {
            Ok(report) => report,
            Err(e) => {
                error!(app_slug = %app_slug, error = %e, "Update download task aborted");
                set_status(
                    status.as_ref(),
                    TaskState::Failed,
                    &format!("Update download aborted: {e}"),
                )
                .await;
                FetchReport::default()
            }
        }
    })
}

/// Download every update in `job` and release its workspace.
pub async fn run_fetch_loop(job: FetchJob, ctx: FetchContext) -> FetchReport {
    let FetchJob {
        app_id,
        app_slug,
        workspace,
        updates,
    } = job;
    let total = updates.len();
    let mut report = FetchReport::default();

    for (index, update) in updates.iter().enumerate() {
        set_status(
            ctx.status.as_ref(),
            TaskState::Running,
            &format!("Downloading release {} of {}", index + 1, total),
        )
        .await;

        report.attempted += 1;
        // the latest version is in the workspace
        match ctx
            .downloader
            .download_update(&app_id, workspace.path(), &update.cursor)
            .await
        {
            Ok(()) => {
                report.succeeded += 1;
                ctx.metrics.record_download(true);
            }
            Err(e) => {
                error!(
                    app_slug = %app_slug,
                    cursor = %update.cursor,
                    error = %e,
                    "Failed to download update"
                );
                report.failed.push(update.cursor.clone());
                ctx.metrics.record_download(false);
            }
        }
    }

    if let Err(e) = workspace.release().await {
        warn!(app_slug = %app_slug, error = %e, "Failed to release archive workspace");
    }

    if report.all_succeeded() {
        info!(app_slug = %app_slug, downloaded = report.succeeded, "Update download finished");
        set_status(
            ctx.status.as_ref(),
            TaskState::Done,
            &format!("Downloaded {} update(s)", report.succeeded),
        )
        .await;
    } else {
        warn!(
            app_slug = %app_slug,
            succeeded = report.succeeded,
            failed = report.failed.len(),
            "Update download finished with failures"
        );
        set_status(
            ctx.status.as_ref(),
            TaskState::Failed,
            &format!(
                "Failed to download {} of {} update(s): {}",
                report.failed.len(),
                total,
                report.failed.join(", ")
            ),
        )
        .await;
    }

    report
}

/// Best-effort status write; the loop never stops on a status failure.
async fn set_status(status: &dyn TaskStatusStore, state: TaskState, message: &str) {
    if let Err(e) = status.set(UPDATE_DOWNLOAD_TASK, state, message).await {
        warn!(error = %e, ?state, "Failed to update task status");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::task_status::InMemoryTaskStatusStore;
    use crate::upstream::DownloadError;

    /// Records every call and fails the listed cursors.
    struct ScriptedDownloader {
        calls: Mutex<Vec<String>>,
        fail: Vec<&'static str>,
        panic_on: Option<&'static str>,
    }

    impl ScriptedDownloader {
        fn new(fail: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail,
                panic_on: None,
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl UpdateDownloader for ScriptedDownloader {
        async fn download_update(&self, _app_id: &AppId, workspace: &Path, cursor: &str) -> Result<(), DownloadError> {
            assert!(workspace.exists(), "workspace released mid-loop");
            self.calls.lock().unwrap().push(cursor.to_string());
            if self.panic_on.is_some_and(|p| p == cursor) {
                panic!("downloader exploded");
            }
            if self.fail.iter().any(|f| *f == cursor) {
                return Err(DownloadError::Other(format!("cannot fetch {cursor}")));
            }
            Ok(())
        }
    }

    fn job(dir: &Path, cursors: &[&str]) -> FetchJob {
        let path = dir.join("ws");
        std::fs::create_dir_all(&path).unwrap();
        FetchJob {
            app_id: AppId::new("app-1"),
            app_slug: "sentry".into(),
            workspace: ArchiveWorkspace::adopt(path),
            updates: cursors
                .iter()
                .map(|c| UpdateDescriptor::new(*c, "stable"))
                .collect(),
        }
    }

    fn ctx(downloader: Arc<ScriptedDownloader>, status: Arc<InMemoryTaskStatusStore>) -> FetchContext {
        FetchContext {
            downloader,
            status,
            metrics: Metrics::new(),
        }
    }

    #[tokio::test]
    async fn test_downloads_in_order_and_releases_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = ScriptedDownloader::new(vec![]);
        let status = Arc::new(InMemoryTaskStatusStore::new());

        let report = run_fetch_loop(job(dir.path(), &["1", "2", "3"]), ctx(downloader.clone(), status.clone())).await;

        assert_eq!(downloader.calls(), vec!["1", "2", "3"]);
        assert_eq!(report.succeeded, 3);
        assert!(!dir.path().join("ws").exists());

        let record = status.get(UPDATE_DOWNLOAD_TASK).await.unwrap();
        assert_eq!(record.state, TaskState::Done);
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_batch() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = ScriptedDownloader::new(vec!["2"]);
        let status = Arc::new(InMemoryTaskStatusStore::new());

        let report = run_fetch_loop(job(dir.path(), &["1", "2", "3"]), ctx(downloader.clone(), status.clone())).await;

        assert_eq!(downloader.calls(), vec!["1", "2", "3"]);
        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, vec!["2".to_string()]);
        assert!(!dir.path().join("ws").exists());

        let record = status.get(UPDATE_DOWNLOAD_TASK).await.unwrap();
        assert_eq!(record.state, TaskState::Failed);
        assert!(record.message.contains("1 of 3"));
    }

    #[tokio::test]
    async fn test_all_failures_still_release_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = ScriptedDownloader::new(vec!["1", "2"]);
        let status = Arc::new(InMemoryTaskStatusStore::new());

        let report = run_fetch_loop(job(dir.path(), &["1", "2"]), ctx(downloader, status)).await;

        assert_eq!(report.succeeded, 0);
        assert_eq!(report.failed.len(), 2);
        assert!(!dir.path().join("ws").exists());
    }

    #[tokio::test]
    async fn test_panicking_loop_marks_task_failed_and_drops_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = Arc::new(ScriptedDownloader {
            calls: Mutex::new(Vec::new()),
            fail: vec![],
            panic_on: Some("2"),
        });
        let status = Arc::new(InMemoryTaskStatusStore::new());

        let handle = spawn_fetch_loop(job(dir.path(), &["1", "2", "3"]), ctx(downloader.clone(), status.clone()));
        let report = handle.await.unwrap();

        assert_eq!(report, FetchReport::default());
        assert_eq!(downloader.calls(), vec!["1", "2"]);
        assert!(!dir.path().join("ws").exists());

        let record = status.get(UPDATE_DOWNLOAD_TASK).await.unwrap();
        assert_eq!(record.state, TaskState::Failed);
    }
}
