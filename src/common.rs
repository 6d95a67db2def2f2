use std::{
    collections::VecDeque,
    ops::Deref,
    time::{Duration, Instant},
};

use crate::WindowGateError;

/// Maximum number of admitted requests per key within one window.
///
/// Always at least 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestLimit(u64);

impl TryFrom<u64> for RequestLimit {
    type Error = WindowGateError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value == 0 {
            return Err(WindowGateError::InvalidConfiguration(
                "limit must be greater than 0",
            ));
        }

        Ok(Self(value))
    }
}

impl Deref for RequestLimit {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Trailing duration over which admitted requests are counted.
///
/// Always strictly positive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowSize(Duration);

impl WindowSize {
    /// Window of `secs` whole seconds.
    pub fn from_secs(secs: u64) -> Result<Self, WindowGateError> {
        Self::try_from(Duration::from_secs(secs))
    }

    /// Window of `millis` milliseconds.
    pub fn from_millis(millis: u64) -> Result<Self, WindowGateError> {
        Self::try_from(Duration::from_millis(millis))
    }
}

impl TryFrom<Duration> for WindowSize {
    type Error = WindowGateError;

    fn try_from(value: Duration) -> Result<Self, Self::Error> {
        if value.is_zero() {
            return Err(WindowGateError::InvalidConfiguration(
                "window must be greater than 0",
            ));
        }

        Ok(Self(value))
    }
}

impl Deref for WindowSize {
    type Target = Duration;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Outcome of an admission check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// The request is admitted and has been recorded.
    Allowed,
    /// The request is rejected and left no trace in the key's state.
    ///
    /// Includes hints for callers that want to communicate backoff.
    Rejected {
        /// Window size used for the decision.
        window: Duration,
        /// Time until the oldest live request leaves the window.
        retry_after: Duration,
        /// Live requests counted against the key at decision time.
        live_count: u64,
    },
}

impl AdmissionDecision {
    /// `true` for [`AdmissionDecision::Allowed`].
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// `t` is still inside the window ending at `now`.
///
/// Equivalent to `t > now - window`; a timestamp exactly `window` old is expired.
/// Timestamps later than `now` count as live.
pub(crate) fn is_live(t: Instant, now: Instant, window: Duration) -> bool {
    now.saturating_duration_since(t) < window
}

/// Admitted request times for a single key.
pub(crate) struct KeyState {
    pub timestamps: VecDeque<Instant>,
}

impl KeyState {
    pub fn new(now: Instant) -> Self {
        Self {
            timestamps: VecDeque::from([now]),
        }
    }

    /// Drop every expired timestamp, then record `now` if there is room.
    ///
    /// A key whose history fully expired restarts in place with `[now]`.
    pub fn admit(&mut self, now: Instant, limit: u64, window: Duration) -> AdmissionDecision {
        self.timestamps.retain(|t| is_live(*t, now, window));

        let live_count = self.timestamps.len() as u64;
        if live_count >= limit {
            // Callers may hand in timestamps out of order, so the oldest is not
            // necessarily at the front.
            let oldest = self.timestamps.iter().min().copied().unwrap_or(now);
            let retry_after = window.saturating_sub(now.saturating_duration_since(oldest));

            return AdmissionDecision::Rejected {
                window,
                retry_after,
                live_count,
            };
        }

        self.timestamps.push_back(now);
        AdmissionDecision::Allowed
    }

    pub fn live_count(&self, now: Instant, window: Duration) -> u64 {
        self.timestamps
            .iter()
            .filter(|t| is_live(**t, now, window))
            .count() as u64
    }

    pub fn is_expired(&self, now: Instant, window: Duration) -> bool {
        !self.timestamps.iter().any(|t| is_live(*t, now, window))
    }
}
