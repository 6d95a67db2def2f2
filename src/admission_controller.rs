//! Sliding-window admission controller.
//!
//! State lives in a [`DashMap`](dashmap::DashMap) keyed by caller identity. Every
//! decision holds the shard write lock for its key while it prunes, decides and
//! records, so concurrent calls for one key can never over-admit.

use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

use dashmap::{DashMap, mapref::entry::Entry};

use crate::{
    WindowGateError,
    cleanup_loop::CleanupLoop,
    common::{AdmissionDecision, KeyState, RequestLimit, WindowSize},
};

/// Policy for an [`AdmissionController`].
///
/// Both fields are validated newtypes, so a constructed value is always usable.
#[derive(Clone, Debug)]
pub struct AdmissionOptions {
    /// Maximum admitted requests per key within `window`.
    pub limit: RequestLimit,
    /// Trailing window over which admitted requests are counted.
    pub window: WindowSize,
}

/// Strict per-key sliding-window admission control.
///
/// Admits at most `limit` requests per key in any trailing `window`. Timestamps
/// are supplied by the caller, which keeps decisions deterministic under
/// simulated time.
///
/// # Algorithm
///
/// 1. **Unknown key:** record `[now]` and admit
/// 2. **Prune:** drop timestamps `t` with `t <= now - window`
/// 3. **Decide:** reject if the live count is `>= limit`
/// 4. **Record:** otherwise append `now` and admit
///
/// Rejected requests are never recorded, so per-key memory stays bounded by
/// `limit`.
///
/// # Memory
///
/// Pruning is lazy: idle keys keep their last timestamps until they are seen
/// again. Call [`sweep`](Self::sweep) periodically, or start the background
/// loop with [`run_cleanup_loop`](Self::run_cleanup_loop), when key cardinality
/// is unbounded.
///
/// # Examples
///
/// ```
/// use std::time::{Duration, Instant};
/// use windowgate::AdmissionController;
///
/// let controller = AdmissionController::new(3, Duration::from_secs(60)).unwrap();
/// let t0 = Instant::now();
///
/// let results: Vec<bool> = (0..4)
///     .map(|i| controller.is_allowed("user1", t0 + Duration::from_secs(i)))
///     .collect();
///
/// assert_eq!(results, [true, true, true, false]);
/// assert!(controller.is_allowed("user1", t0 + Duration::from_secs(61)));
/// ```
pub struct AdmissionController {
    limit: RequestLimit,
    window: WindowSize,
    registry: DashMap<String, KeyState>,
    pub(crate) cleanup_loop: Mutex<Option<CleanupLoop>>,
}

impl AdmissionController {
    /// Create a controller admitting `limit` requests per key per `window`.
    ///
    /// Fails with [`WindowGateError::InvalidConfiguration`] if `limit` is 0 or
    /// `window` is zero.
    pub fn new(limit: u64, window: Duration) -> Result<Self, WindowGateError> {
        Ok(Self::with_options(AdmissionOptions {
            limit: RequestLimit::try_from(limit)?,
            window: WindowSize::try_from(window)?,
        }))
    }

    /// Create a controller from already validated options.
    pub fn with_options(options: AdmissionOptions) -> Self {
        Self {
            limit: options.limit,
            window: options.window,
            registry: DashMap::new(),
            cleanup_loop: Mutex::new(None),
        }
    } // end constructor

    pub(crate) fn registry(&self) -> &DashMap<String, KeyState> {
        &self.registry
    }

    /// Configured per-window limit.
    pub fn limit(&self) -> RequestLimit {
        self.limit
    }

    /// Configured window size.
    pub fn window(&self) -> WindowSize {
        self.window
    }

    /// Number of keys currently holding state.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// `true` if no key holds state.
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Decide whether the request for `key` at `now` is admitted.
    ///
    /// Admitted requests are recorded; rejected ones leave the key's state
    /// untouched apart from pruning expired timestamps.
    pub fn is_allowed(&self, key: &str, now: Instant) -> bool {
        self.check(key, now).is_allowed()
    }

    /// Same as [`is_allowed`](Self::is_allowed), sampling `Instant::now()`.
    pub fn is_allowed_now(&self, key: &str) -> bool {
        self.is_allowed(key, Instant::now())
    }

    /// Decide admission for `key` at `now`, returning backoff hints on rejection.
    ///
    /// # Returns
    ///
    /// - [`AdmissionDecision::Allowed`]: request admitted, `now` recorded
    /// - [`AdmissionDecision::Rejected`]: key is at its limit, nothing recorded
    ///
    /// # Concurrency
    ///
    /// The lookup, prune, decision and append happen under the key's shard
    /// write lock; no other call can observe or modify that key in between.
    pub fn check(&self, key: &str, now: Instant) -> AdmissionDecision {
        let limit = *self.limit;
        let window = *self.window;

        // Existing keys skip the key allocation needed by `entry`.
        let decision = if let Some(mut state) = self.registry.get_mut(key) {
            state.admit(now, limit, window)
        } else {
            match self.registry.entry(key.to_owned()) {
                Entry::Occupied(mut entry) => entry.get_mut().admit(now, limit, window),
                Entry::Vacant(entry) => {
                    entry.insert(KeyState::new(now));
                    AdmissionDecision::Allowed
                }
            }
        };

        if let AdmissionDecision::Rejected { live_count, .. } = decision {
            tracing::trace!(key, live_count, limit, "request rejected");
        }

        decision
    } // end method check

    /// Number of requests for `key` still live at `now` (read-only).
    ///
    /// Does not prune or record anything.
    pub fn live_count(&self, key: &str, now: Instant) -> u64 {
        self.registry
            .get(key)
            .map(|state| state.live_count(now, *self.window))
            .unwrap_or(0)
    }

    /// Remove every key whose recorded requests have all expired as of `now`.
    ///
    /// Returns the number of keys removed. Iterates the whole registry, locking
    /// one shard at a time.
    pub fn sweep(&self, now: Instant) -> usize {
        let window = *self.window;
        let mut removed = 0;

        self.registry.retain(|_, state| {
            let expired = state.is_expired(now, window);
            if expired {
                removed += 1;
            }
            !expired
        });

        tracing::debug!(removed, remaining = self.registry.len(), "swept expired keys");

        removed
    } // end method sweep
} // end of impl
