//! Synchronized types that allow access to a `Histogram` from multiple threads.
//!
//! The core histogram is single-writer. This module provides the multi-writer
//! pattern on top of it: every writer thread owns a [`Recorder`] and records into a
//! thread-local histogram without synchronization; a [`SyncHistogram`] merges the
//! writers' samples into one quiescent histogram on demand.

use crate::errors::RecordError;
use crate::{Counter, Histogram};
use std::ops::{AddAssign, Deref, DerefMut};
use std::sync::{atomic, Arc, Mutex};
use std::time;

/// A write-only handle to a [`SyncHistogram`].
///
/// Each writer thread records through its own `Recorder`. Recording goes into a
/// local histogram and never contends with other writers; the only cross-thread
/// traffic happens when the reader starts a _phase shift_, at which point the next
/// write on each recorder ships the local histogram over a lock-free channel and
/// starts a fresh one.
///
/// A recorder that stops writing never notices the phase shift, so it stalls the
/// reader's [`SyncHistogram::refresh`] until the next write (or forever). A recorder
/// that expects to go quiet should call [`Recorder::idle`] first, which takes it out
/// of the set the reader waits for.
///
/// Dropping a `Recorder` ships its remaining samples; they become visible at the
/// next [`SyncHistogram::refresh`].
#[derive(Debug)]
pub struct Recorder<C: Counter> {
    local: Histogram<C>,
    shared: Arc<Shared<C>>,
    last_phase: usize,
}

// `r += value` sugar, as on the histogram itself.
impl<C: Counter> AddAssign<u64> for Recorder<C> {
    fn add_assign(&mut self, value: u64) {
        self.record(value).unwrap();
    }
}

impl<C: Counter> Clone for Recorder<C> {
    fn clone(&self) -> Self {
        // one more writer for the reader to collect from
        {
            let mut roster = self.shared.roster.lock().unwrap();
            roster.active += 1;
        }

        // the clone inherits our phase, but none of our samples
        Recorder {
            local: Histogram::new_from(&self.local),
            shared: self.shared.clone(),
            last_phase: self.last_phase,
        }
    }
}

impl<C: Counter> Drop for Recorder<C> {
    fn drop(&mut self) {
        let mut roster = self.shared.roster.lock().unwrap();
        roster.active -= 1;

        // Our samples leave with us, under the same lock as the roster update. The
        // reader may have counted us before the decrement and be blocking on our
        // send; sending while unregistering serves both orders. hand_over() would
        // borrow self.shared a second time, so inline the send here.
        let h = Histogram::new_from(&self.local);
        let h = std::mem::replace(&mut self.local, h);
        let _ = self.shared.sender.send(h).is_ok(); // Err means the reader went away

        // hold the lock until the send is done
        drop(roster);
    }
}

#[derive(Debug)]
struct Roster {
    active: usize,
}

#[derive(Debug)]
struct Shared<C: Counter> {
    roster: Mutex<Roster>,
    sender: crossbeam_channel::Sender<Histogram<C>>,
    phase: atomic::AtomicUsize,
}

/// Denotes that a [`Recorder`] is currently idle: a [`SyncHistogram`] phase shift
/// will not wait on it. Dropping the guard marks the recorder active again.
#[derive(Debug)]
pub struct IdleRecorderGuard<'a, C: Counter> {
    recorder: &'a mut Recorder<C>,
}

impl<'a, C: Counter> Drop for IdleRecorderGuard<'a, C> {
    fn drop(&mut self) {
        // back in rotation: the reader waits for us again
        let mut roster = self.recorder.shared.roster.lock().unwrap();
        roster.active += 1;

        // The phase we rejoin at must be read under the lock. Read outside it, the
        // reader could count us and bump the phase in between, and we would treat
        // that shift as already answered while the reader blocks on a send we will
        // never make.
        self.recorder.last_phase = self.recorder.shared.phase.load(atomic::Ordering::Acquire);

        // hold the lock until the phase is adopted
        drop(roster);
    }
}

impl<C: Counter> Recorder<C> {
    fn with_hist<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut Histogram<C>) -> R,
    {
        let r = f(&mut self.local);
        let phase = self.shared.phase.load(atomic::Ordering::Acquire);
        if phase != self.last_phase {
            self.hand_over();
            self.last_phase = phase;
        }
        r
    }

    // take the local histogram, leaving a cleared one behind
    fn shed(&mut self) -> Histogram<C> {
        let h = Histogram::new_from(&self.local);
        std::mem::replace(&mut self.local, h)
    }

    fn hand_over(&mut self) {
        let h = self.shed();
        let _ = self.shared.sender.send(h).is_ok(); // Err means the reader went away
    }

    /// Call this method if the Recorder will be idle for a while.
    ///
    /// Until the returned guard is dropped, the associated [`SyncHistogram`] will not
    /// wait for this recorder on a phase shift.
    pub fn idle(&mut self) -> IdleRecorderGuard<'_, C> {
        let phase;
        {
            // leave the rotation
            let mut roster = self.shared.roster.lock().unwrap();
            roster.active -= 1;

            // answer any phase shift already in flight before going quiet
            phase = self.shared.phase.load(atomic::Ordering::Acquire);
            if phase != self.last_phase {
                // hand_over() would borrow self.shared a second time; inline the send
                let h = Histogram::new_from(&self.local);
                let h = std::mem::replace(&mut self.local, h);
                let _ = self.shared.sender.send(h).is_ok(); // Err means the reader went away
            }
        }
        self.last_phase = phase;

        IdleRecorderGuard { recorder: self }
    }

    /// See [`Histogram::record`].
    pub fn record(&mut self, value: u64) -> Result<(), RecordError> {
        self.with_hist(move |h| h.record(value))
    }

    /// See [`Histogram::record_n`].
    pub fn record_n(&mut self, value: u64, count: C) -> Result<(), RecordError> {
        self.with_hist(move |h| h.record_n(value, count))
    }

    /// See [`Histogram::saturating_record`].
    pub fn saturating_record(&mut self, value: u64) {
        self.with_hist(move |h| h.saturating_record(value))
    }

    /// See [`Histogram::saturating_record_n`].
    pub fn saturating_record_n(&mut self, value: u64, count: C) {
        self.with_hist(move |h| h.saturating_record_n(value, count))
    }

    /// See [`Histogram::record_correct`].
    pub fn record_correct(&mut self, value: u64, interval: u64) -> Result<(), RecordError> {
        self.with_hist(move |h| h.record_correct(value, interval))
    }

    /// See [`Histogram::record_n_correct`].
    pub fn record_n_correct(
        &mut self,
        value: u64,
        count: C,
        interval: u64,
    ) -> Result<(), RecordError> {
        self.with_hist(move |h| h.record_n_correct(value, count, interval))
    }
}

/// A `Histogram` that can be written to by multiple threads concurrently.
///
/// Each writer thread should have a [`Recorder`], which allows it to record new
/// samples without synchronization. Newly recorded samples are made available
/// through this histogram by calling [`SyncHistogram::refresh`], which blocks until
/// it has synchronized with every recorder.
#[derive(Debug)]
pub struct SyncHistogram<C: Counter> {
    merged: Histogram<C>,
    shared: Arc<Shared<C>>,
    receiver: crossbeam_channel::Receiver<Histogram<C>>,
}

impl<C: Counter> SyncHistogram<C> {
    fn refresh_inner(&mut self, timeout: Option<time::Duration>) {
        let end = timeout.map(|dur| time::Instant::now() + dur);

        // Histograms from recorders dropped since the last refresh are sitting in
        // the channel; fold them in before bumping the phase so they cannot be
        // mistaken for answers to this shift.
        while let Ok(h) = self.receiver.try_recv() {
            self.merged
                .add(&h)
                .expect("merging a recorder histogram overflowed a counter");
        }

        // pin the writer set for this shift
        let recorders = self.shared.roster.lock().unwrap().active;

        // announce the shift
        let _ = self.shared.phase.fetch_add(1, atomic::Ordering::AcqRel);

        // every pinned writer answers with exactly one histogram
        let mut phased = 0;
        while phased < recorders {
            let h = if let Some(end) = end {
                let now = time::Instant::now();
                if now > end {
                    break;
                }

                match self.receiver.recv_timeout(end - now) {
                    Ok(h) => h,
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => break,
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => unreachable!(),
                }
            } else {
                self.receiver
                    .recv()
                    .expect("SyncHistogram has an Arc<Shared> with a Receiver")
            };

            self.merged
                .add(&h)
                .expect("merging a recorder histogram overflowed a counter");
            phased += 1;
        }

        // writers may also have dropped while we waited; collect their remainders
        while let Ok(h) = self.receiver.try_recv() {
            self.merged
                .add(&h)
                .expect("merging a recorder histogram overflowed a counter");
        }
    }

    /// Block until writes from all [`Recorder`] instances for this histogram have
    /// been incorporated.
    pub fn refresh(&mut self) {
        self.refresh_inner(None)
    }

    /// Block until writes from all [`Recorder`] instances for this histogram have
    /// been incorporated, or until the given amount of time has passed.
    pub fn refresh_timeout(&mut self, timeout: time::Duration) {
        self.refresh_inner(Some(timeout))
    }

    /// Obtain another multi-threaded writer for this histogram.
    ///
    /// Writes made to the `Recorder` will not be visible until the next call to
    /// [`SyncHistogram::refresh`].
    pub fn recorder(&self) -> Recorder<C> {
        // one more writer for the reader to collect from
        {
            let mut roster = self.shared.roster.lock().unwrap();
            roster.active += 1;
        }

        // the new recorder starts empty, at the current phase
        Recorder {
            local: Histogram::new_from(&self.merged),
            shared: self.shared.clone(),
            last_phase: self.shared.phase.load(atomic::Ordering::Acquire),
        }
    }
}

impl<C: Counter> From<Histogram<C>> for SyncHistogram<C> {
    fn from(h: Histogram<C>) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        SyncHistogram {
            merged: h,
            receiver: rx,
            shared: Arc::new(Shared {
                roster: Mutex::new(Roster { active: 0 }),
                sender: tx,
                phase: atomic::AtomicUsize::new(0),
            }),
        }
    }
}

impl<C: Counter> Deref for SyncHistogram<C> {
    type Target = Histogram<C>;
    fn deref(&self) -> &Self::Target {
        &self.merged
    }
}

impl<C: Counter> DerefMut for SyncHistogram<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.merged
    }
}
