//! Cancellable background execution with progress reporting.
//!
//! A [`BackgroundTask`] drives N units of work through a fixed protocol:
//! an initial indeterminate status, a bounded lead-in wait, one fractional
//! progress update per unit with a settling wait between units, and a final
//! indeterminate clean-up status. Cancellation is cooperative — polled once
//! per unit boundary — and is the only early-abort path.

use std::fmt::Display;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::config::TaskTiming;

/// Fixed confirmation line appended to the success notice.
const CONFIRMATION: &str = "Feature extraction successful";

/// The six status labels a task is constructed with.
#[derive(Debug, Clone)]
pub struct StatusLabels {
    pub title: String,
    pub init: String,
    pub remaining: String,
    pub clean_up: String,
    pub cancel: String,
    pub success: String,
}

impl StatusLabels {
    /// Labels for the loop segmentation run.
    pub fn segmentation() -> Self {
        Self {
            title: "Loop segmentation".into(),
            init: "Initializing loop generator".into(),
            remaining: "Computing features for loops".into(),
            clean_up: "Cleaning up".into(),
            cancel: "Loop segmentation cancelled".into(),
            success: "Loop segmentation complete".into(),
        }
    }
}

/// One update on the status channel. `progress` is a fraction in [0, 1];
/// `None` means indeterminate.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub message: String,
    pub progress: Option<f64>,
}

impl StatusUpdate {
    fn indeterminate(message: &str) -> Self {
        Self {
            message: message.to_string(),
            progress: None,
        }
    }

    fn fraction(message: &str, unit: usize, total: usize) -> Self {
        Self {
            message: message.to_string(),
            progress: Some(unit as f64 / total as f64),
        }
    }
}

/// Terminal notification: warning on cancellation, info on success.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Info(String),
    Warning(String),
}

impl Notice {
    pub fn text(&self) -> &str {
        match self {
            Notice::Info(s) | Notice::Warning(s) => s,
        }
    }
}

/// A unit that failed without aborting the run.
#[derive(Debug, Clone)]
pub struct UnitFailure {
    pub unit: usize,
    pub reason: String,
}

/// Terminal result of a task run.
#[derive(Debug)]
pub struct TaskReport {
    pub cancelled: bool,
    /// Units processed before the run ended (failures included).
    pub completed: usize,
    pub failures: Vec<UnitFailure>,
    pub notice: Notice,
}

/// Cooperative cancellation token shared between the initiating thread and
/// the worker. Cancellation only takes effect at the next unit boundary.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    cancelled: Mutex<bool>,
    cvar: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let mut cancelled = self.inner.cancelled.lock().unwrap();
        *cancelled = true;
        self.inner.cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock().unwrap()
    }

    /// Bounded wait that wakes early on cancellation. Returns whether the
    /// token was cancelled.
    pub fn wait(&self, dur: Duration) -> bool {
        let guard = self.inner.cancelled.lock().unwrap();
        let (guard, _) = self
            .inner
            .cvar
            .wait_timeout_while(guard, dur, |cancelled| !*cancelled)
            .unwrap();
        *guard
    }
}

/// A cancellable long-running operation over a known number of units.
pub struct BackgroundTask {
    total: usize,
    labels: StatusLabels,
    timing: TaskTiming,
}

impl BackgroundTask {
    pub fn new(total: usize, labels: StatusLabels, timing: TaskTiming) -> Self {
        Self {
            total,
            labels,
            timing,
        }
    }

    /// Drive `work` through the progress/cancellation protocol on the
    /// calling thread.
    ///
    /// `work` runs once per unit, in order. A unit returning `Err` is
    /// recorded and the run continues; cancellation stops the run at the
    /// next unit boundary without touching the remaining units. Status
    /// updates are sent best-effort: a hung or dropped receiver never stalls
    /// the run.
    pub fn run<F, E>(
        self,
        token: &CancelToken,
        status: &Sender<StatusUpdate>,
        mut work: F,
    ) -> TaskReport
    where
        F: FnMut(usize) -> Result<(), E>,
        E: Display,
    {
        let mut failures = Vec::new();
        let mut completed = 0usize;

        let _ = status.send(StatusUpdate::indeterminate(&self.labels.init));
        if token.wait(self.timing.lead_in()) {
            return self.finish(true, completed, failures);
        }
        let _ = status.send(StatusUpdate::indeterminate(&self.labels.remaining));

        for unit in 0..self.total {
            if token.is_cancelled() {
                return self.finish(true, completed, failures);
            }
            let _ = status.send(StatusUpdate::fraction(
                &self.labels.remaining,
                unit,
                self.total,
            ));

            if let Err(e) = work(unit) {
                log::warn!("{}: unit {} failed: {}", self.labels.title, unit, e);
                failures.push(UnitFailure {
                    unit,
                    reason: e.to_string(),
                });
            }
            completed += 1;

            if token.wait(self.timing.settle()) {
                return self.finish(true, completed, failures);
            }
        }

        let _ = status.send(StatusUpdate::indeterminate(&self.labels.clean_up));
        self.finish(false, completed, failures)
    }

    fn finish(self, cancelled: bool, completed: usize, failures: Vec<UnitFailure>) -> TaskReport {
        let notice = if cancelled {
            log::warn!("{}: cancelled after {} of {} units", self.labels.title, completed, self.total);
            Notice::Warning(self.labels.cancel)
        } else {
            log::info!("{}: {} units done, {} failed", self.labels.title, completed, failures.len());
            Notice::Info(format!("{}. {}", self.labels.success, CONFIRMATION))
        };
        TaskReport {
            cancelled,
            completed,
            failures,
            notice,
        }
    }
}
