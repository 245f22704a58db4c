//! Countdown driving the timed stages of a room.
//!
//! The scheduler holds at most one countdown. It never sleeps by itself: the
//! room actor asks for [`TimerScheduler::next_wake`], sleeps until then and
//! feeds the current time back through [`TimerScheduler::poll`].

/// Stage a countdown belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Answer window of a question.
    Question,
    /// Time the correct answer stays on screen.
    Reveal,
    /// Time the leaderboard stays on screen.
    Result,
}

/// Signal produced while polling the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerSignal {
    /// Whole seconds remaining changed.
    Tick {
        /// Kind of the running countdown.
        kind: TimerKind,
        /// `ceil(remaining / 1000)`.
        seconds: u64,
    },
    /// The countdown reached its deadline and is no longer active.
    Expired {
        /// Kind of the expired countdown.
        kind: TimerKind,
    },
}

#[derive(Debug, Clone)]
struct Countdown {
    kind: TimerKind,
    deadline_ms: u64,
    last_reported: u64,
}

/// Single-slot countdown scheduler.
#[derive(Debug, Default)]
pub struct TimerScheduler {
    active: Option<Countdown>,
}

impl TimerScheduler {
    /// Create an idle scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a countdown ending at `deadline_ms`, replacing any running one.
    pub fn start(&mut self, kind: TimerKind, now_ms: u64, deadline_ms: u64) {
        self.active = Some(Countdown {
            kind,
            deadline_ms,
            last_reported: seconds_remaining(deadline_ms, now_ms),
        });
    }

    /// Stop the running countdown. Returns whether one was running.
    pub fn cancel(&mut self) -> bool {
        self.active.take().is_some()
    }

    /// Kind and deadline of the running countdown.
    pub fn active(&self) -> Option<(TimerKind, u64)> {
        self.active
            .as_ref()
            .map(|countdown| (countdown.kind, countdown.deadline_ms))
    }

    /// Earliest instant at which [`poll`](Self::poll) has something to report.
    pub fn next_wake(&self, now_ms: u64) -> Option<u64> {
        let countdown = self.active.as_ref()?;
        if now_ms >= countdown.deadline_ms {
            return Some(now_ms);
        }
        let seconds = seconds_remaining(countdown.deadline_ms, now_ms);
        if seconds != countdown.last_reported {
            return Some(now_ms);
        }
        Some(countdown.deadline_ms - (seconds - 1) * 1000)
    }

    /// Report ticks and expiry reached at `now_ms`.
    pub fn poll(&mut self, now_ms: u64) -> Vec<TimerSignal> {
        let mut signals = Vec::new();
        let Some(countdown) = self.active.as_mut() else {
            return signals;
        };

        let seconds = seconds_remaining(countdown.deadline_ms, now_ms);
        if seconds != countdown.last_reported {
            countdown.last_reported = seconds;
            signals.push(TimerSignal::Tick {
                kind: countdown.kind,
                seconds,
            });
        }

        if now_ms >= countdown.deadline_ms {
            signals.push(TimerSignal::Expired {
                kind: countdown.kind,
            });
            self.active = None;
        }

        signals
    }
}

/// Whole seconds left before `deadline_ms`, rounded up.
pub fn seconds_remaining(deadline_ms: u64, now_ms: u64) -> u64 {
    deadline_ms.saturating_sub(now_ms).div_ceil(1000)
}
