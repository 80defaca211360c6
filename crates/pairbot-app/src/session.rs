//! Per-run lifecycle state
//!
//! `Idle → Launching → Connected → Disconnected → Idle`. A run only leaves
//! `Disconnected` through an explicit stop; nothing reconnects on its own.

use std::fmt;

use chrono::{DateTime, Local};
use serde::Serialize;

/// Lifecycle phase of the current run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Nothing running; `start` is accepted
    #[default]
    Idle,
    /// Worker spawned, waiting for the readiness marker
    Launching,
    /// Readiness seen; the channel is opening or open
    Connected,
    /// Channel closed or worker gone; waiting for an explicit stop
    Disconnected,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Launching => "launching",
            Phase::Connected => "connected",
            Phase::Disconnected => "disconnected",
        }
    }

    /// Whether the machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::Idle, Phase::Launching)
                | (Phase::Launching, Phase::Connected)
                | (Phase::Launching, Phase::Disconnected)
                | (Phase::Connected, Phase::Disconnected)
                | (_, Phase::Idle)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one start..stop cycle, used to drop events from older runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

/// A phase change that actually happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Phase,
    pub to: Phase,
}

/// Lifecycle state for the single worker/channel pair
#[derive(Debug, Default)]
pub struct Session {
    phase: Phase,
    run: Option<RunId>,
    runs_started: u64,
    started_at: Option<DateTime<Local>>,
    reviews: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Most recently started run, kept after stop so its exit can be reported
    pub fn run(&self) -> Option<RunId> {
        self.run
    }

    pub fn is_current(&self, run: RunId) -> bool {
        self.run == Some(run)
    }

    pub fn started_at(&self) -> Option<DateTime<Local>> {
        self.started_at
    }

    /// Reviews rendered during the current run
    pub fn reviews(&self) -> u64 {
        self.reviews
    }

    pub fn record_review(&mut self) {
        self.reviews += 1;
    }

    /// `Idle → Launching`, allocating a new run. `None` when not idle.
    pub fn begin_launch(&mut self) -> Option<(RunId, Transition)> {
        let transition = self.transition(Phase::Launching)?;
        self.runs_started += 1;
        let run = RunId(self.runs_started);
        self.run = Some(run);
        self.started_at = Some(Local::now());
        self.reviews = 0;
        Some((run, transition))
    }

    /// `Launching → Connected` on readiness
    pub fn mark_ready(&mut self) -> Option<Transition> {
        self.transition(Phase::Connected)
    }

    /// `Launching | Connected → Disconnected`
    pub fn mark_disconnected(&mut self) -> Option<Transition> {
        self.transition(Phase::Disconnected)
    }

    /// Any phase `→ Idle`. `None` when already idle.
    pub fn stop(&mut self) -> Option<Transition> {
        self.transition(Phase::Idle)
    }

    fn transition(&mut self, next: Phase) -> Option<Transition> {
        if self.phase == next || !self.phase.can_transition_to(next) {
            return None;
        }
        let from = self.phase;
        self.phase = next;
        Some(Transition { from, to: next })
    }
}
