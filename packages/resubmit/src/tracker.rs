//! In-memory registry of recent submissions.
//!
//! ## Concurrency
//!
//! Records live in a [`DashMap`] keyed by [`Fingerprint`]. [`SubmissionTracker::try_admit`]
//! does its check and insert inside a single `entry` call, which holds the
//! shard's write lock for the whole operation; of any number of concurrent
//! callers with the same fingerprint exactly one observes a vacant (or
//! expired) entry and is admitted. Nothing here awaits or performs I/O while a
//! lock is held.
//!
//! ## Expiry
//!
//! A record expires `ttl` after completion, or `ttl` after admission if it is
//! never completed (e.g. the handler was aborted without cleanup running).
//! Expired records are ignored and replaced on access, so they can never cause
//! a rejection; [`SubmissionTracker::purge_expired`] and the optional sweeper
//! task only reclaim their memory.
//!
//! Time is read from [`tokio::time::Instant`], so paused test clocks apply.

use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::{DashMap, mapref::entry::Entry};
use derive_more::{Debug, Display};
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, instrument, trace};

use crate::fingerprint::Fingerprint;

/// Lifecycle state of a submission record.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Display)]
pub enum SubmissionState {
    /// Admitted; the handler has not finished yet.
    #[display("in_flight")]
    InFlight,

    /// The handler finished; the record is kept for its retention window.
    #[display("completed")]
    Completed,
}

/// Identifies one admission of a fingerprint, so that a late completion from
/// an earlier, expired admission cannot complete a newer one.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Generation(u64);

/// Why a fingerprint was not admitted.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Rejection {
    /// State of the record that blocked admission.
    pub state: SubmissionState,

    /// Time until the blocking record expires, assuming it is not completed
    /// in the meantime.
    pub retry_after: Duration,
}

/// Verdict of [`SubmissionTracker::try_admit`].
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Admission {
    Admitted(Generation),
    Rejected(Rejection),
}

#[derive(Copy, Clone, Debug)]
struct Record {
    generation: Generation,
    state: SubmissionState,
    ttl: Duration,
    created_at: Instant,
    expires_at: Instant,
}

impl Record {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Concurrency-safe registry of in-flight and recently completed submissions.
///
/// Construct one per process and share it (behind an [`Arc`]) between every
/// guard that should see the same submissions.
#[derive(Debug, Default)]
#[debug("SubmissionTracker(records = {})", self.records.len())]
pub struct SubmissionTracker {
    records: DashMap<Fingerprint, Record>,
    generations: AtomicU64,
}

impl SubmissionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit the fingerprint unless a live record for it exists.
    ///
    /// On admission an in-flight record is created that expires after `ttl`
    /// unless completed first. Rejection never modifies the existing record.
    #[instrument(level = "trace", skip_all, fields(%fingerprint))]
    pub fn try_admit(&self, fingerprint: Fingerprint, ttl: Duration) -> Admission {
        let now = Instant::now();
        match self.records.entry(fingerprint) {
            Entry::Occupied(mut entry) => {
                let existing = *entry.get();
                if existing.is_live(now) {
                    let rejection = Rejection {
                        state: existing.state,
                        retry_after: existing.expires_at.saturating_duration_since(now),
                    };
                    trace!(state = %rejection.state, retry_after = ?rejection.retry_after, "tracker.rejected");
                    return Admission::Rejected(rejection);
                }
                let record = self.in_flight(now, ttl);
                entry.insert(record);
                trace!("tracker.admitted.replaced_expired");
                Admission::Admitted(record.generation)
            }
            Entry::Vacant(entry) => {
                let record = self.in_flight(now, ttl);
                entry.insert(record);
                trace!("tracker.admitted");
                Admission::Admitted(record.generation)
            }
        }
    }

    /// Admit the fingerprint, returning a [`Permit`] that completes the
    /// submission when dropped.
    pub fn admit(
        self: &Arc<Self>,
        fingerprint: Fingerprint,
        ttl: Duration,
    ) -> Result<Permit, Rejection> {
        match self.try_admit(fingerprint, ttl) {
            Admission::Admitted(generation) => Ok(Permit {
                tracker: Arc::clone(self),
                fingerprint,
                generation,
            }),
            Admission::Rejected(rejection) => Err(rejection),
        }
    }

    /// Move an in-flight record to completed, starting its retention window.
    ///
    /// Idempotent; does nothing if the record is absent, expired or already
    /// completed.
    #[instrument(level = "trace", skip_all, fields(%fingerprint))]
    pub fn complete(&self, fingerprint: &Fingerprint) {
        self.complete_matching(fingerprint, |_| true);
    }

    /// Like [`SubmissionTracker::complete`], but only if the record still
    /// belongs to the given admission.
    #[instrument(level = "trace", skip_all, fields(%fingerprint))]
    pub fn complete_generation(&self, fingerprint: &Fingerprint, generation: Generation) {
        self.complete_matching(fingerprint, |record| record.generation == generation);
    }

    fn complete_matching(&self, fingerprint: &Fingerprint, matches: impl FnOnce(&Record) -> bool) {
        let now = Instant::now();
        let Entry::Occupied(mut entry) = self.records.entry(*fingerprint) else {
            return;
        };

        let record = entry.get_mut();
        if !matches(record) {
            trace!("tracker.complete.superseded");
            return;
        }
        if !record.is_live(now) {
            entry.remove();
            trace!("tracker.complete.expired");
            return;
        }
        if record.state == SubmissionState::InFlight {
            record.state = SubmissionState::Completed;
            record.expires_at = now + record.ttl;
            trace!(
                retain = ?record.ttl,
                held = ?now.saturating_duration_since(record.created_at),
                "tracker.completed"
            );
        }
    }

    /// State of the live record for the fingerprint, if any.
    pub fn state(&self, fingerprint: &Fingerprint) -> Option<SubmissionState> {
        let now = Instant::now();
        self.records
            .get(fingerprint)
            .filter(|record| record.is_live(now))
            .map(|record| record.state)
    }

    /// Remove every expired record, returning how many were removed.
    #[instrument(level = "debug", skip(self))]
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.records.len();
        self.records.retain(|_, record| record.is_live(now));
        let purged = before.saturating_sub(self.records.len());
        if purged > 0 {
            debug!(purged, remaining = self.records.len(), "tracker.purge");
        }
        purged
    }

    /// Periodically purge expired records on the current tokio runtime.
    ///
    /// The task holds only a weak reference and exits once the tracker is
    /// dropped; abort the handle to stop it earlier.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let tracker: Weak<Self> = Arc::downgrade(self);
        let period = period.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(tracker) = tracker.upgrade() else {
                    debug!("tracker.sweeper.stopped");
                    break;
                };
                tracker.purge_expired();
            }
        })
    }

    /// Number of stored records, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn in_flight(&self, now: Instant, ttl: Duration) -> Record {
        Record {
            generation: Generation(self.generations.fetch_add(1, Ordering::Relaxed)),
            state: SubmissionState::InFlight,
            ttl,
            created_at: now,
            expires_at: now + ttl,
        }
    }
}

/// An admitted submission.
///
/// Dropping the permit completes the submission. This covers every way a
/// request can end: normal return, an error response, a panic unwinding
/// through the handler, or the request future being dropped by a timeout or
/// a disconnected client.
#[derive(Debug)]
#[debug("Permit({})", self.fingerprint)]
#[must_use = "dropping the permit completes the submission immediately"]
pub struct Permit {
    tracker: Arc<SubmissionTracker>,
    fingerprint: Fingerprint,
    generation: Generation,
}

impl Permit {
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.tracker
            .complete_generation(&self.fingerprint, self.generation);
    }
}
