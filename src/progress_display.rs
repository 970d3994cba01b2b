/*!
 * Terminal progress display for a running extraction job.
 *
 * The display only reads `JobProgress`; it polls the shared counters on an
 * interval and never blocks the coordinator.
 */

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::extraction::{JobProgress, JobState, ProgressSnapshot};

/// Bar resolution, in steps for the whole job
const BAR_STEPS: u64 = 1000;
const POLL_INTERVAL: Duration = Duration::from_millis(200);

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% {msg} {eta}")
        .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {percent}% {msg}"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░")
}

/// Status text shown next to the bar
pub fn status_message(snapshot: &ProgressSnapshot) -> String {
    match &snapshot.state {
        JobState::Processing { chunk, total } => format!("chunk {}/{}", chunk, total),
        state => state.to_string(),
    }
}

/// Bar position for a snapshot
pub fn bar_position(snapshot: &ProgressSnapshot) -> u64 {
    (snapshot.overall() * BAR_STEPS as f64).round() as u64
}

/// Progress bar fed by a background polling task
pub struct ProgressDisplay {
    bar: ProgressBar,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ProgressDisplay {
    /// Start polling `progress` until `finish` is called
    pub fn spawn(progress: Arc<JobProgress>) -> Self {
        let bar = ProgressBar::new(BAR_STEPS);
        bar.set_style(bar_style());
        bar.enable_steady_tick(Duration::from_millis(100));

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let task_bar = bar.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(POLL_INTERVAL);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = interval.tick() => {
                        let snapshot = progress.snapshot();
                        task_bar.set_position(bar_position(&snapshot));
                        task_bar.set_message(status_message(&snapshot));
                    }
                }
            }
        });

        Self {
            bar,
            stop: Some(stop_tx),
            task: Some(task),
        }
    }

    /// Stop polling and clear the bar
    pub async fn finish(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.bar.finish_and_clear();
    }
}

impl Drop for ProgressDisplay {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
