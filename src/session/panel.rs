//! Optional diagnostics panel shown while training.
//!
//! The panel reports its visibility asynchronously, so a request may not show
//! up in [`DiagnosticsPanel::is_open`] right away. [`VisibilityRetry`] keeps
//! re-requesting the target state on a fixed delay and forces it once the
//! attempt budget runs out.

use std::time::Duration;

use crate::classifier::EpochReport;

/// A visualisation surface outside the session's control.
pub trait DiagnosticsPanel: Send {
    /// Last observed visibility; may lag behind requests.
    fn is_open(&self) -> bool;

    /// Ask the panel to show or hide itself.
    fn request_visibility(&mut self, open: bool);

    /// Apply a visibility directly, bypassing the panel's own controls.
    fn force_visibility(&mut self, open: bool);

    /// Training progress, sent only while the panel is open.
    fn show_epoch(&mut self, _report: &EpochReport) {}
}

/// Bounds for [`VisibilityRetry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    /// Wait before the first check, so the panel can finish rendering.
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            retry_delay: Duration::from_millis(120),
            initial_delay: Duration::from_millis(200),
        }
    }
}

/// What a convergence step decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelPoll {
    /// Observed visibility matches the target.
    Settled,
    /// Requested again; poll after the delay.
    Retry(Duration),
    /// Budget exhausted; visibility was forced.
    Forced,
}

/// Drives a panel towards a target visibility, one poll at a time.
#[derive(Debug, Clone)]
pub struct VisibilityRetry {
    target_open: bool,
    attempts: u32,
    policy: RetryPolicy,
}

impl VisibilityRetry {
    pub fn new(target_open: bool, policy: RetryPolicy) -> Self {
        Self {
            target_open,
            attempts: 0,
            policy,
        }
    }

    pub fn target_open(&self) -> bool {
        self.target_open
    }

    /// Delay before the first [`Self::poll`].
    pub fn initial_delay(&self) -> Duration {
        self.policy.initial_delay
    }

    pub fn poll(&mut self, panel: &mut dyn DiagnosticsPanel) -> PanelPoll {
        if panel.is_open() == self.target_open {
            return PanelPoll::Settled;
        }
        panel.request_visibility(self.target_open);
        self.attempts += 1;
        if self.attempts < self.policy.max_attempts {
            PanelPoll::Retry(self.policy.retry_delay)
        } else {
            tracing::debug!(
                "Panel did not reach open={} after {} requests; forcing",
                self.target_open,
                self.attempts
            );
            panel.force_visibility(self.target_open);
            PanelPoll::Forced
        }
    }
}

/// A panel plus any convergence still in progress.
pub(crate) struct PanelDriver {
    panel: Box<dyn DiagnosticsPanel>,
    pending: Option<VisibilityRetry>,
    policy: RetryPolicy,
}

impl PanelDriver {
    pub(crate) fn new(panel: Box<dyn DiagnosticsPanel>, policy: RetryPolicy) -> Self {
        Self {
            panel,
            pending: None,
            policy,
        }
    }

    /// Visibility as the user would perceive it: a pending close counts as closed.
    pub(crate) fn effective_open(&self) -> bool {
        match &self.pending {
            Some(retry) => retry.target_open(),
            None => self.panel.is_open(),
        }
    }

    pub(crate) fn open_now(&mut self) {
        self.pending = None;
        self.panel.request_visibility(true);
    }

    /// Start converging on closed; returns the delay before the first poll.
    pub(crate) fn begin_close(&mut self) -> Duration {
        let retry = VisibilityRetry::new(false, self.policy);
        let delay = retry.initial_delay();
        self.pending = Some(retry);
        delay
    }

    /// Run one convergence step; `Some(delay)` means poll again after `delay`.
    pub(crate) fn poll(&mut self) -> Option<Duration> {
        let retry = self.pending.as_mut()?;
        match retry.poll(self.panel.as_mut()) {
            PanelPoll::Retry(delay) => Some(delay),
            PanelPoll::Settled | PanelPoll::Forced => {
                self.pending = None;
                None
            }
        }
    }

    pub(crate) fn show_epoch(&mut self, report: &EpochReport) {
        if self.panel.is_open() {
            self.panel.show_epoch(report);
        }
    }
}
