//! Run-level progress across analyzers of unequal size.
//!
//! The total is the sum of the selected analyzers' declared steps and is fixed
//! when the run starts. Every producing stage ticks once. Stages skipped for
//! missing fields never tick, so a run can finish below its total; `finish`
//! closes it out without pretending those steps happened.

use serde::Serialize;

use crate::error::{GurneyError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProgressState {
    Idle,
    Running,
    Complete,
}

/// Point-in-time view handed to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub state: ProgressState,
    pub current: usize,
    pub total: usize,
    pub label: String,
    pub fraction: f64,
}

type Observer = Box<dyn FnMut(&ProgressSnapshot) + Send>;

pub struct ProgressAggregator {
    state: ProgressState,
    current: usize,
    total: usize,
    label: String,
    observer: Option<Observer>,
}

impl Default for ProgressAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProgressAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressAggregator")
            .field("state", &self.state)
            .field("current", &self.current)
            .field("total", &self.total)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl ProgressAggregator {
    pub fn new() -> Self {
        Self {
            state: ProgressState::Idle,
            current: 0,
            total: 0,
            label: String::new(),
            observer: None,
        }
    }

    /// Calls `observer` after every state change.
    #[must_use]
    pub fn with_observer(mut self, observer: impl FnMut(&ProgressSnapshot) + Send + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn start(&mut self, total: usize) {
        self.current = 0;
        self.total = total;
        self.label.clear();
        self.state = if total == 0 {
            ProgressState::Complete
        } else {
            ProgressState::Running
        };
        tracing::debug!(total, "Progress started");
        self.notify();
    }

    /// Advances by one step.
    ///
    /// # Errors
    ///
    /// [`GurneyError::ProgressOverflow`] when the run is not in progress or the
    /// step would pass the total. The counter is left unchanged.
    pub fn tick(&mut self, label: &str) -> Result<()> {
        if self.state != ProgressState::Running || self.current >= self.total {
            tracing::error!(
                current = self.current,
                total = self.total,
                state = ?self.state,
                label,
                "Progress tick past the declared total"
            );
            return Err(GurneyError::ProgressOverflow {
                current: self.current,
                total: self.total,
            });
        }

        self.current += 1;
        label.clone_into(&mut self.label);
        if self.current == self.total {
            self.state = ProgressState::Complete;
        }
        self.notify();
        Ok(())
    }

    /// Closes the run; steps never reached are reported by [`Self::skipped`].
    pub fn finish(&mut self) {
        if self.state == ProgressState::Complete {
            return;
        }
        if self.skipped() > 0 {
            tracing::info!(
                current = self.current,
                total = self.total,
                skipped = self.skipped(),
                "Run finished with skipped stages"
            );
        }
        self.state = ProgressState::Complete;
        self.notify();
    }

    pub fn state(&self) -> ProgressState {
        self.state
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn skipped(&self) -> usize {
        self.total.saturating_sub(self.current)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn fraction(&self) -> f64 {
        match self.state {
            ProgressState::Complete => 1.0,
            _ if self.total == 0 => 0.0,
            _ => (self.current as f64 / self.total as f64).clamp(0.0, 1.0),
        }
    }

    pub fn display(&self) -> String {
        if self.label.is_empty() {
            format!("{}/{}", self.current, self.total)
        } else {
            format!("{}/{} {}", self.current, self.total, self.label)
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            state: self.state,
            current: self.current,
            total: self.total,
            label: self.label.clone(),
            fraction: self.fraction(),
        }
    }

    fn notify(&mut self) {
        let snapshot = self.snapshot();
        if let Some(observer) = self.observer.as_mut() {
            observer(&snapshot);
        }
    }
}
