// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Per-client serialization without blocking the triggering thread.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tracing::trace;

use crate::deferred::Replay;

/// A non-blocking critical area shared by every registration of one client.
///
/// At most one thread at a time executes callbacks associated with a given
/// `BusyInterface`. A thread that finds the interface occupied does not
/// wait: the event is pushed onto the deferral queue and replayed by the
/// occupying thread on its way out.
///
/// Clones alias the same interface (the serializer itself is never
/// duplicated), so a client can hand the same instance to registrations on
/// any number of servers.
///
/// `try_enter` / `leave` are public so a client can mark itself busy around
/// work that is not driven by a server at all; events triggered meanwhile
/// are deferred and drained by the matching `leave`.
#[derive(Clone, Default)]
pub struct BusyInterface {
    inner: Arc<BusyState>,
}

#[derive(Default)]
struct BusyState {
    busy_depth: AtomicU32,
    queue: Mutex<VecDeque<Box<dyn Replay>>>,
}

impl BusyInterface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-size the deferral queue for clients expecting bursts.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusyState {
                busy_depth: AtomicU32::new(0),
                queue: Mutex::new(VecDeque::with_capacity(capacity)),
            }),
        }
    }

    /// Claim the critical area. Returns `true` when the caller got exclusive
    /// access. Every call, successful or not, must be matched by exactly one
    /// [`leave`](BusyInterface::leave).
    pub fn try_enter(&self) -> bool {
        self.inner.busy_depth.fetch_add(1, Ordering::AcqRel) == 0
    }

    /// Release one claim on the critical area.
    ///
    /// Returns `true` when the caller was the last thread inside; the
    /// deferral queue has then been drained (or handed off to a newly
    /// arrived holder) before this returns.
    pub fn leave(&self) -> bool {
        let previous = self.inner.busy_depth.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous != 0, "leave without a matching try_enter");
        if previous != 1 {
            return false;
        }
        self.drain();
        true
    }

    pub(crate) fn push(&self, event: Box<dyn Replay>) {
        self.inner.queue.lock().push_back(event);
    }

    fn pop(&self) -> Option<Box<dyn Replay>> {
        self.inner.queue.lock().pop_front()
    }

    /// Replay queued events until the queue is empty or another thread takes
    /// over the exclusive slot.
    ///
    /// Each enqueue happens before its enqueuer's decrement, so whenever the
    /// queue is non-empty some thread's decrement still has to land and that
    /// thread (or whoever displaces it here) picks the queue up: no entry is
    /// ever orphaned.
    fn drain(&self) {
        loop {
            let Some(event) = self.pop() else { return };
            if self.inner.busy_depth.fetch_add(1, Ordering::AcqRel) == 0 {
                trace!("replaying deferred event");
                event.replay();
            } else {
                // Lost the slot to a newcomer; it inherits the queue.
                self.push(event);
            }
            if self.inner.busy_depth.fetch_sub(1, Ordering::AcqRel) != 1 {
                return;
            }
        }
    }
}

/// Leaves (and thereby drains) on drop, so a panicking callback cannot
/// leave the client marked busy forever.
pub(crate) struct LeaveGuard<'a> {
    busy: &'a BusyInterface,
}

impl<'a> LeaveGuard<'a> {
    pub(crate) fn new(busy: &'a BusyInterface) -> Self {
        Self { busy }
    }
}

impl Drop for LeaveGuard<'_> {
    fn drop(&mut self) {
        self.busy.leave();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorded {
        log: Arc<Mutex<Vec<u32>>>,
        value: u32,
    }

    impl Replay for Recorded {
        fn replay(self: Box<Self>) {
            self.log.lock().push(self.value);
        }
    }

    fn recorded(log: &Arc<Mutex<Vec<u32>>>, value: u32) -> Box<dyn Replay> {
        Box::new(Recorded {
            log: Arc::clone(log),
            value,
        })
    }

    #[test]
    fn first_enter_wins_until_leave() {
        let busy = BusyInterface::new();
        assert!(busy.try_enter());
        assert!(!busy.try_enter());
        assert!(!busy.leave());
        assert!(busy.leave());
        assert!(busy.try_enter());
        assert!(busy.leave());
    }

    #[test]
    fn queue_drains_in_fifo_order_on_last_leave() {
        let busy = BusyInterface::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        assert!(busy.try_enter());
        for value in 0..4 {
            busy.push(recorded(&log, value));
        }
        assert!(log.lock().is_empty());

        assert!(busy.leave());
        assert_eq!(*log.lock(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn contended_leave_defers_drain_to_holder() {
        let busy = BusyInterface::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        assert!(busy.try_enter());
        assert!(!busy.try_enter());
        busy.push(recorded(&log, 7));

        // The contender leaves first; the holder still owns the queue.
        assert!(!busy.leave());
        assert!(log.lock().is_empty());

        assert!(busy.leave());
        assert_eq!(*log.lock(), vec![7]);
    }
}
