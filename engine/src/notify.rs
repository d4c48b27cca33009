//! Transient user-facing notifications.
//!
//! `NotificationCenter` does not own timers. Every operation takes the
//! current instant, and the owner calls `advance` at (or after) the instant
//! returned by `next_deadline`. That keeps the lifecycle deterministic and
//! lets notifications outlive whatever view posted them.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

/// Delay between posting and becoming visible (the enter animation).
pub const ENTER_DELAY: Duration = Duration::from_millis(10);

/// Delay between starting to leave and being removed (the exit animation).
pub const EXIT_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Error,
    Warning,
    Info,
}

impl Severity {
    /// Auto-dismiss time used when the caller does not pick one.
    pub fn default_duration(&self) -> Duration {
        match self {
            Severity::Success => Duration::from_millis(3000),
            Severity::Error => Duration::from_millis(5000),
            Severity::Warning => Duration::from_millis(4000),
            Severity::Info => Duration::from_millis(3000),
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Severity::Success => "✓",
            Severity::Error => "✕",
            Severity::Warning => "⚠",
            Severity::Info => "i",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Success => write!(f, "success"),
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// Lifecycle of a single notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Entering,
    Visible,
    Leaving,
    /// No longer tracked
    Removed,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub id: Uuid,
    pub message: String,
    pub severity: Severity,
    pub phase: Phase,
    posted_at: Instant,
    dismiss_at: Option<Instant>,
    remove_at: Option<Instant>,
}

impl Notification {
    fn visible_at(&self) -> Instant {
        self.posted_at + ENTER_DELAY
    }

    /// Earliest instant at which this notification changes phase.
    fn next_deadline(&self) -> Option<Instant> {
        match self.phase {
            Phase::Entering => Some(self.visible_at()),
            Phase::Visible => self.dismiss_at,
            Phase::Leaving => self.remove_at,
            Phase::Removed => None,
        }
    }
}

/// Stack of live notifications in arrival order.
#[derive(Debug, Default)]
pub struct NotificationCenter {
    items: Vec<Notification>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a notification. `duration` overrides the severity default;
    /// `Some(Duration::ZERO)` keeps it until dismissed.
    pub fn post(
        &mut self,
        message: impl Into<String>,
        severity: Severity,
        duration: Option<Duration>,
        now: Instant,
    ) -> Uuid {
        let duration = duration.unwrap_or_else(|| severity.default_duration());
        let id = Uuid::new_v4();
        self.items.push(Notification {
            id,
            message: message.into(),
            severity,
            phase: Phase::Entering,
            posted_at: now,
            dismiss_at: (!duration.is_zero()).then(|| now + duration),
            remove_at: None,
        });
        id
    }

    /// Start the exit of one notification.
    ///
    /// Returns false when it is already leaving or gone.
    pub fn dismiss(&mut self, id: Uuid, now: Instant) -> bool {
        match self.items.iter_mut().find(|n| n.id == id) {
            Some(n) if matches!(n.phase, Phase::Entering | Phase::Visible) => {
                n.phase = Phase::Leaving;
                n.remove_at = Some(now + EXIT_DELAY);
                true
            }
            _ => false,
        }
    }

    /// Dismiss everything currently shown.
    pub fn clear_all(&mut self, now: Instant) {
        let ids: Vec<Uuid> = self.items.iter().map(|n| n.id).collect();
        for id in ids {
            self.dismiss(id, now);
        }
    }

    /// Apply every phase change due at `now`. Returns true if anything changed.
    pub fn advance(&mut self, now: Instant) -> bool {
        let mut changed = false;
        for n in &mut self.items {
            if n.phase == Phase::Entering && now >= n.visible_at() {
                n.phase = Phase::Visible;
                changed = true;
            }
            if n.phase == Phase::Visible {
                if let Some(at) = n.dismiss_at.filter(|at| now >= *at) {
                    n.phase = Phase::Leaving;
                    n.remove_at = Some(at + EXIT_DELAY);
                    changed = true;
                }
            }
            if n.phase == Phase::Leaving && n.remove_at.is_some_and(|at| now >= at) {
                n.phase = Phase::Removed;
                changed = true;
            }
        }
        self.items.retain(|n| n.phase != Phase::Removed);
        changed
    }

    /// When `advance` next needs to run, if ever.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.items.iter().filter_map(Notification::next_deadline).min()
    }

    /// Live notifications, oldest first.
    pub fn active(&self) -> &[Notification] {
        &self.items
    }

    pub fn phase(&self, id: Uuid) -> Phase {
        self.items
            .iter()
            .find(|n| n.id == id)
            .map_or(Phase::Removed, |n| n.phase)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
