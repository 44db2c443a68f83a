// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Per-event-type servers: registration admission and the two triggering
//! algorithms.

use std::any::type_name;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::busy::BusyInterface;
use crate::event::Event;
use crate::handle::Handle;
use crate::registration::{Admission, Callback, DepartGuard, Registration};

/// Per-event-type dispatch aggregate.
///
/// Any number of threads may [`trigger`](Server::trigger) concurrently with
/// each other and with [`register`](Server::register) and handle
/// cancellation. The internal list mutex is never held across a callback,
/// so a triggering thread never waits on a callback it did not invoke.
///
/// Drop a server only after every handle pointing into it has been
/// cancelled and no trigger is in progress.
pub struct Server<T: Event> {
    head: Mutex<Option<Arc<Registration<T>>>>,
}

impl<T: Event> Server<T> {
    pub fn new() -> Self {
        Self {
            head: Mutex::new(None),
        }
    }

    /// Register `callback` for every future trigger of this event type.
    ///
    /// Without a busy interface the callback may be invoked by any number
    /// of triggering threads simultaneously; it has to be thread-safe on
    /// its own terms. Use [`register_busy`](Server::register_busy) to
    /// serialize per client.
    pub fn register<F>(&self, callback: F) -> Handle<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.link(Box::new(callback), None)
    }

    /// Register `callback` behind a busy interface: at most one callback
    /// associated with that interface runs at any moment, across all event
    /// types, and a trigger that finds the interface occupied defers the
    /// event instead of blocking.
    pub fn register_busy<F>(&self, callback: F, busy: &BusyInterface) -> Handle<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.link(Box::new(callback), Some(busy.clone()))
    }

    fn link(&self, callback: Box<Callback<T>>, busy: Option<BusyInterface>) -> Handle<T> {
        let node = Arc::new(Registration::new(callback, busy));
        let mut head = self.head.lock();
        *node.next.lock() = head.take();
        *head = Some(Arc::clone(&node));
        trace!(
            server = %type_name::<T>(),
            registration = ?Arc::as_ptr(&node),
            "registered callback"
        );
        Handle::new(node)
    }

    /// Deliver `data` to every registered callback.
    ///
    /// Persistent event types keep their registrations; one-shot types
    /// consume the whole list atomically. Delivery order across distinct
    /// registrations is unspecified (currently reverse registration order).
    pub fn trigger(&self, data: &T) {
        if T::ONE_SHOT {
            self.trigger_one_shot(data);
        } else {
            self.trigger_persistent(data);
        }
    }

    fn trigger_persistent(&self, data: &T) {
        let mut list = self.head.lock();
        // The cursor is the last node this walk admitted or stepped over.
        // While the mutex is released around a callback the cursor node is
        // pinned by this walk's own in-flight unit, so it cannot be
        // unlinked out from under the walk.
        let mut cursor: Option<Arc<Registration<T>>> = None;
        loop {
            let candidate = match &cursor {
                None => Option::clone(&list),
                Some(previous) => Option::clone(&previous.next.lock()),
            };
            let Some(node) = candidate else { break };
            match node.state.admit() {
                Admission::Admitted => {
                    drop(list);
                    let depart = DepartGuard::new(&node.state);
                    Registration::deliver(&node, data);
                    list = self.head.lock();
                    // Depart while holding the mutex again: once the count
                    // can reach its terminal value, the only walk that may
                    // unlink the node is one holding the mutex, and that
                    // walk is this one.
                    drop(depart);
                    cursor = Some(node);
                }
                Admission::CancelledIdle => {
                    // Last observer: splice the node out. References held
                    // by its handle or queued events keep the storage
                    // alive past the unlink.
                    trace!(
                        registration = ?Arc::as_ptr(&node),
                        "unlinking cancelled registration"
                    );
                    let successor = node.next.lock().take();
                    match &cursor {
                        None => *list = successor,
                        Some(previous) => *previous.next.lock() = successor,
                    }
                }
                Admission::CancelledBusy => cursor = Some(node),
            }
        }
    }

    fn trigger_one_shot(&self, data: &T) {
        // Registrations added after this point are simply too late.
        let mut cursor = self.head.lock().take();
        while let Some(node) = cursor {
            // No other trigger can reach the detached chain, but a handle
            // may still cancel concurrently; the admission protocol keeps
            // that race and the canceller's wakeup correct.
            if node.state.admit() == Admission::Admitted {
                let _depart = DepartGuard::new(&node.state);
                Registration::deliver(&node, data);
            }
            cursor = node.next.lock().take();
        }
    }
}

impl<T: Event> Default for Server<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Event> Drop for Server<T> {
    fn drop(&mut self) {
        // Break the links iteratively so a long list cannot overflow the
        // stack with recursive drops.
        let mut cursor = self.head.get_mut().take();
        while let Some(node) = cursor {
            cursor = node.next.lock().take();
        }
    }
}
