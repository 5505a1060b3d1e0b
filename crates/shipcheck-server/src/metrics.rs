//! Prometheus metrics collection and formatting.
//!
//! Counters are kept in process memory and rendered in Prometheus text
//! exposition format.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use shipcheck_core::{TaskState, UPDATE_DOWNLOAD_TASK};

use crate::state::AppState;

/// Update workflow counters.
#[derive(Debug, Default)]
pub struct Metrics {
    checks_total: AtomicU64,
    checks_skipped: AtomicU64,
    checks_failed: AtomicU64,
    updates_found: AtomicU64,
    downloads_succeeded: AtomicU64,
    downloads_failed: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_check(&self) {
        self.checks_total.fetch_add(1, Ordering::Relaxed);
    }

    /// A check that found another cycle running.
    pub fn record_skipped(&self) {
        self.checks_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.checks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_updates_found(&self, count: usize) {
        self.updates_found.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_download(&self, succeeded: bool) {
        if succeeded {
            self.downloads_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.downloads_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn write_counters(&self, output: &mut String) {
        let counters = [
            ("shipcheck_update_checks_total", "Update checks received", &self.checks_total),
            ("shipcheck_update_checks_skipped_total", "Update checks skipped because a cycle was running", &self.checks_skipped),
            ("shipcheck_update_checks_failed_total", "Update checks that failed before scheduling downloads", &self.checks_failed),
            ("shipcheck_updates_found_total", "Pending updates reported to callers", &self.updates_found),
        ];
        for (name, help, value) in counters {
            writeln!(output, "# HELP {name} {help}").ok();
            writeln!(output, "# TYPE {name} counter").ok();
            writeln!(output, "{name} {}", value.load(Ordering::Relaxed)).ok();
        }

        writeln!(output, "# HELP shipcheck_update_downloads_total Update downloads by outcome").ok();
        writeln!(output, "# TYPE shipcheck_update_downloads_total counter").ok();
        writeln!(
            output,
            "shipcheck_update_downloads_total{{outcome=\"succeeded\"}} {}",
            self.downloads_succeeded.load(Ordering::Relaxed)
        )
        .ok();
        writeln!(
            output,
            "shipcheck_update_downloads_total{{outcome=\"failed\"}} {}",
            self.downloads_failed.load(Ordering::Relaxed)
        )
        .ok();
    }
}

/// Collect all metrics from AppState and format as Prometheus text.
pub async fn collect_metrics(state: &Arc<AppState>) -> String {
    let mut output = String::new();

    state.metrics.write_counters(&mut output);
    collect_task_metrics(state, &mut output).await;

    output
}

/// Export the update-download task state as a one-hot gauge.
async fn collect_task_metrics(state: &Arc<AppState>, output: &mut String) {
    // An unreadable store reports as idle
    let current = state
        .task_status
        .get(UPDATE_DOWNLOAD_TASK)
        .await
        .map(|s| s.state)
        .unwrap_or_default();

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP shipcheck_update_task_state Current state of the update-download task"
    )
    .ok();
    writeln!(output, "# TYPE shipcheck_update_task_state gauge").ok();
    for (label, state) in [
        ("idle", TaskState::Idle),
        ("running", TaskState::Running),
        ("failed", TaskState::Failed),
        ("done", TaskState::Done),
    ] {
        let value = u8::from(current == state);
        writeln!(output, "shipcheck_update_task_state{{state=\"{label}\"}} {value}").ok();
    }
}
