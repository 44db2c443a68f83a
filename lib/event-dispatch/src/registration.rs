// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Registration nodes and the in-flight / cancelled state machine shared by
//! trigger and cancel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::busy::{BusyInterface, LeaveGuard};
use crate::deferred::DeferredEvent;
use crate::event::Event;

/// Subtracted from the state word when cancellation begins. Negative values
/// therefore mean "cancelled"; exactly `-CANCEL_MARKER` means cancelled with
/// nobody left inside.
pub(crate) const CANCEL_MARKER: i32 = 0x10000;

/// Outcome of [`RegistrationState::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// In-flight count incremented; the caller must run delivery and then
    /// depart.
    Admitted,
    /// Cancelled with zero threads in flight; the observer must unlink the
    /// node.
    CancelledIdle,
    /// Cancelled while other threads are still inside; skip the node and
    /// leave unlinking to a later pass.
    CancelledBusy,
}

/// Packed state word: positive values count threads between admission and
/// departure; the sticky cancelled bit is the subtracted [`CANCEL_MARKER`].
/// Packing both into one atomic makes the quiescent-cancelled state
/// observable with a single load.
pub(crate) struct RegistrationState {
    word: AtomicI32,
    cancel_lock: Mutex<()>,
    quiescent: Condvar,
}

impl RegistrationState {
    pub(crate) fn new() -> Self {
        Self {
            word: AtomicI32::new(0),
            cancel_lock: Mutex::new(()),
            quiescent: Condvar::new(),
        }
    }

    /// Try to take one in-flight unit. Refused once cancel has begun.
    pub(crate) fn admit(&self) -> Admission {
        let mut observed = self.word.load(Ordering::Acquire);
        loop {
            if observed < 0 {
                return if observed == -CANCEL_MARKER {
                    Admission::CancelledIdle
                } else {
                    Admission::CancelledBusy
                };
            }
            match self.word.compare_exchange_weak(
                observed,
                observed + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Admission::Admitted,
                Err(current) => observed = current,
            }
        }
    }

    /// Release one in-flight unit. The thread whose decrement reaches the
    /// terminal cancelled state wakes the canceller.
    pub(crate) fn depart(&self) {
        if self.word.fetch_sub(1, Ordering::AcqRel) == 1 - CANCEL_MARKER {
            // The canceller may be between its predicate check and the
            // wait; cycling its mutex orders this notify after the wait
            // has begun.
            drop(self.cancel_lock.lock());
            self.quiescent.notify_one();
        }
    }

    /// Take one in-flight unit unconditionally. Only legal while the caller
    /// already holds an admission, so the word cannot be at rest.
    pub(crate) fn pin(&self) {
        let previous = self.word.fetch_add(1, Ordering::AcqRel);
        debug_assert!(
            previous != 0 && previous != -CANCEL_MARKER,
            "pin taken without an admission in flight"
        );
    }

    /// Flip the sticky cancelled bit. Returns the in-flight count at that
    /// instant.
    pub(crate) fn begin_cancel(&self) -> i32 {
        let previous = self.word.fetch_sub(CANCEL_MARKER, Ordering::AcqRel);
        debug_assert!(previous >= 0, "registration cancelled twice");
        previous
    }

    /// Block until every in-flight unit has departed after cancellation.
    pub(crate) fn await_quiescence(&self) {
        let mut guard = self.cancel_lock.lock();
        while self.word.load(Ordering::Acquire) != -CANCEL_MARKER {
            self.quiescent.wait(&mut guard);
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.word.load(Ordering::Acquire) < 0
    }
}

/// Departs on drop, so the in-flight count is restored even when a callback
/// unwinds.
pub(crate) struct DepartGuard<'a> {
    state: &'a RegistrationState,
}

impl<'a> DepartGuard<'a> {
    pub(crate) fn new(state: &'a RegistrationState) -> Self {
        Self { state }
    }
}

impl Drop for DepartGuard<'_> {
    fn drop(&mut self) {
        self.state.depart();
    }
}

pub(crate) type Callback<T> = dyn Fn(&T) + Send + Sync;

/// One registered callback, linked into its server's list.
pub(crate) struct Registration<T: Event> {
    callback: Box<Callback<T>>,
    busy: Option<BusyInterface>,
    silent: AtomicBool,
    pub(crate) state: RegistrationState,
    /// Next node in the server's list. Only mutated under the server's list
    /// mutex; one-shot walks read it after detachment, when no other thread
    /// can reach the chain.
    pub(crate) next: Mutex<Option<Arc<Registration<T>>>>,
}

impl<T: Event> Registration<T> {
    pub(crate) fn new(callback: Box<Callback<T>>, busy: Option<BusyInterface>) -> Self {
        Self {
            callback,
            busy,
            silent: AtomicBool::new(false),
            state: RegistrationState::new(),
            next: Mutex::new(None),
        }
    }

    pub(crate) fn set_silent(&self, silent: bool) {
        self.silent.store(silent, Ordering::Relaxed);
    }

    /// Run the callback, or defer it if the busy interface is occupied.
    ///
    /// The caller must hold an admission and must not hold the server's
    /// list mutex.
    pub(crate) fn deliver(this: &Arc<Self>, data: &T) {
        match &this.busy {
            None => this.invoke(data),
            Some(busy) => {
                let entered = busy.try_enter();
                // try_enter incremented the depth either way; the guard's
                // leave drains the queue when this thread is the last one
                // out, and still runs if the callback unwinds.
                let _leave = LeaveGuard::new(busy);
                if entered {
                    this.invoke(data);
                } else {
                    if !this.silent.load(Ordering::Relaxed) {
                        trace!(
                            registration = ?Arc::as_ptr(this),
                            "busy interface occupied; deferring event"
                        );
                    }
                    busy.push(Box::new(DeferredEvent::new(Arc::clone(this), data.clone())));
                }
            }
        }
    }

    /// Invoke the callback directly. Used inline and by deferred replay.
    pub(crate) fn invoke(&self, data: &T) {
        if !self.silent.load(Ordering::Relaxed) {
            trace!(registration = ?(self as *const Self), "invoking callback");
        }
        (self.callback)(data);
    }
}
