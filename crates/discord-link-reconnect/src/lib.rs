//! Single-slot reconnect timer for the discord-link connection manager.
//!
//! [`ReconnectScheduler`] holds at most one pending deadline. Arming it
//! replaces whatever was pending, so repeated failures can never pile up
//! timers. Closing it cancels the pending deadline and refuses every later
//! arm, which is how plugin shutdown stops reconnects for good.
//!
//! # Integration
//!
//! The scheduler owns no task of its own. It is designed to sit inside the
//! connection actor's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         fire = scheduler.wait_for_fire() => {
//!             // fire.reason says why we were disconnected
//!             connect();
//!         }
//!     }
//! }
//! ```

use std::fmt;
use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Why a reconnect is being scheduled. Each reason has its own delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectReason {
    /// A connect attempt failed before the connection opened.
    ConnectFailed,
    /// A live connection was closed by the peer.
    Closed,
    /// A live connection failed with a transport error.
    Errored,
}

impl fmt::Display for ReconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectFailed => write!(f, "connect failed"),
            Self::Closed => write!(f, "closed"),
            Self::Errored => write!(f, "errored"),
        }
    }
}

/// Delays used when arming the scheduler.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay after the peer closes a live connection. Default: 5 s.
    pub close_delay: Duration,
    /// Delay after a live connection errors. Default: 10 s.
    pub error_delay: Duration,
    /// Delay after a connect attempt fails. Default: 10 s.
    pub connect_failure_delay: Duration,
    /// Random jitter (0..=max) added to every delay so a fleet of game
    /// servers does not reconnect in lockstep after a service restart.
    /// Default: zero.
    pub max_jitter: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            close_delay: Duration::from_secs(5),
            error_delay: Duration::from_secs(10),
            connect_failure_delay: Duration::from_secs(10),
            max_jitter: Duration::ZERO,
        }
    }
}

impl ReconnectConfig {
    /// Smallest delay the scheduler will use.
    pub const MIN_DELAY: Duration = Duration::from_millis(100);

    /// Largest delay (and largest jitter) the scheduler will use.
    pub const MAX_DELAY: Duration = Duration::from_secs(60 * 60);

    /// Raise any delay below [`Self::MIN_DELAY`] to it, so a zero in the
    /// config cannot turn into a hot reconnect loop, and lower any delay or
    /// jitter above [`Self::MAX_DELAY`] to it, so a deadline always fits in
    /// an `Instant`.
    ///
    /// Called automatically by [`ReconnectScheduler::new`].
    pub fn validated(mut self) -> Self {
        for delay in [
            &mut self.close_delay,
            &mut self.error_delay,
            &mut self.connect_failure_delay,
        ] {
            if *delay < Self::MIN_DELAY {
                debug!(
                    configured_ms = delay.as_millis() as u64,
                    min_ms = Self::MIN_DELAY.as_millis() as u64,
                    "reconnect delay below minimum, raising"
                );
                *delay = Self::MIN_DELAY;
            } else if *delay > Self::MAX_DELAY {
                warn!(
                    configured_secs = delay.as_secs(),
                    max_secs = Self::MAX_DELAY.as_secs(),
                    "reconnect delay above maximum, lowering"
                );
                *delay = Self::MAX_DELAY;
            }
        }
        if self.max_jitter > Self::MAX_DELAY {
            warn!(
                configured_secs = self.max_jitter.as_secs(),
                max_secs = Self::MAX_DELAY.as_secs(),
                "reconnect jitter above maximum, lowering"
            );
            self.max_jitter = Self::MAX_DELAY;
        }
        self
    }

    /// The base delay (before jitter) for `reason`.
    pub fn delay_for(&self, reason: ReconnectReason) -> Duration {
        match reason {
            ReconnectReason::ConnectFailed => self.connect_failure_delay,
            ReconnectReason::Closed => self.close_delay,
            ReconnectReason::Errored => self.error_delay,
        }
    }
}

// ---------------------------------------------------------------------------
// Fire info and metrics
// ---------------------------------------------------------------------------

/// Returned by [`ReconnectScheduler::wait_for_fire`] when the deadline hits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectFire {
    /// The failure that armed this timer.
    pub reason: ReconnectReason,
    /// The delay that was waited, jitter included.
    pub delay: Duration,
    /// Monotonic arm counter; identifies which arm fired.
    pub arm_seq: u64,
}

/// Lifetime counters for the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconnectMetrics {
    /// Times the scheduler was armed.
    pub total_armed: u64,
    /// Times a pending deadline fired.
    pub total_fired: u64,
    /// Times a pending deadline was dropped before firing, either by
    /// re-arming or by an explicit cancel.
    pub total_cancelled: u64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Pending {
    deadline: TokioInstant,
    reason: ReconnectReason,
    delay: Duration,
    arm_seq: u64,
}

/// Single-slot delayed reconnect trigger.
pub struct ReconnectScheduler {
    config: ReconnectConfig,
    pending: Option<Pending>,
    arm_seq: u64,
    closed: bool,
    metrics: ReconnectMetrics,
}

impl ReconnectScheduler {
    /// Create a new, idle scheduler.
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config: config.validated(),
            pending: None,
            arm_seq: 0,
            closed: false,
            metrics: ReconnectMetrics::default(),
        }
    }

    /// Arm the timer for `reason`, replacing any pending deadline.
    ///
    /// Returns the delay that was scheduled, or `None` if the scheduler
    /// has been [closed](Self::close).
    pub fn arm(&mut self, reason: ReconnectReason) -> Option<Duration> {
        let base = self.config.delay_for(reason);
        let delay = base.saturating_add(self.jitter());
        self.arm_after(delay, reason)
    }

    /// Arm the timer with an explicit delay (no jitter), replacing any
    /// pending deadline.
    ///
    /// Returns `None` if the scheduler has been closed.
    pub fn arm_after(
        &mut self,
        delay: Duration,
        reason: ReconnectReason,
    ) -> Option<Duration> {
        if self.closed {
            trace!(%reason, "reconnect scheduler closed, not arming");
            return None;
        }

        if let Some(previous) = self.pending.take() {
            self.metrics.total_cancelled += 1;
            trace!(
                arm_seq = previous.arm_seq,
                "replacing pending reconnect"
            );
        }

        // base + jitter is at most twice the validated maximum.
        let delay = delay.min(ReconnectConfig::MAX_DELAY.saturating_mul(2));
        let now = TokioInstant::now();
        let deadline = now
            .checked_add(delay)
            .unwrap_or_else(|| now + ReconnectConfig::MAX_DELAY);

        self.arm_seq += 1;
        self.pending = Some(Pending {
            deadline,
            reason,
            delay,
            arm_seq: self.arm_seq,
        });
        self.metrics.total_armed += 1;

        debug!(
            %reason,
            delay_ms = delay.as_millis() as u64,
            arm_seq = self.arm_seq,
            "reconnect scheduled"
        );
        Some(delay)
    }

    /// Drop the pending deadline, if any. Returns `true` if one was dropped.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(p) => {
                self.metrics.total_cancelled += 1;
                debug!(arm_seq = p.arm_seq, "pending reconnect cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel the pending deadline and refuse all future arms.
    ///
    /// Idempotent.
    pub fn close(&mut self) {
        if !self.closed {
            self.cancel();
            self.closed = true;
            debug!("reconnect scheduler closed");
        }
    }

    /// Wait until the pending deadline is reached.
    ///
    /// With nothing pending (or once closed) this future pends forever,
    /// leaving `tokio::select!` to drive the other branches. Dropping the
    /// future before it completes leaves the deadline in place.
    pub async fn wait_for_fire(&mut self) -> ReconnectFire {
        let deadline = match &self.pending {
            Some(p) if !self.closed => p.deadline,
            _ => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        };

        time::sleep_until(deadline).await;

        // Nothing awaits between the sleep and here, so the slot still
        // holds the deadline we slept on.
        let Some(fired) = self.pending.take() else {
            std::future::pending::<()>().await;
            unreachable!()
        };
        self.metrics.total_fired += 1;
        trace!(arm_seq = fired.arm_seq, reason = %fired.reason, "reconnect timer fired");

        ReconnectFire {
            reason: fired.reason,
            delay: fired.delay,
            arm_seq: fired.arm_seq,
        }
    }

    /// Whether a deadline is pending.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Time left until the pending deadline, if any.
    pub fn remaining(&self) -> Option<Duration> {
        self.pending
            .as_ref()
            .map(|p| p.deadline.saturating_duration_since(TokioInstant::now()))
    }

    /// The reason the pending deadline was armed, if any.
    pub fn pending_reason(&self) -> Option<ReconnectReason> {
        self.pending.as_ref().map(|p| p.reason)
    }

    /// Snapshot of lifetime counters.
    pub fn metrics(&self) -> &ReconnectMetrics {
        &self.metrics
    }

    /// The (validated) configuration in use.
    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    fn jitter(&self) -> Duration {
        let max_us = self.config.max_jitter.as_micros() as u64;
        if max_us == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(rand::rng().random_range(0..=max_us))
        }
    }
}

impl Default for ReconnectScheduler {
    fn default() -> Self {
        Self::new(ReconnectConfig::default())
    }
}
