// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Deferred (registration, payload) pairs queued on a busy interface.

use std::sync::Arc;

use crate::event::Event;
use crate::registration::Registration;

/// Erased queued event; a single busy interface serves registrations of
/// many event types, so the queue recovers the concrete type by dispatching
/// through this trait.
pub(crate) trait Replay: Send {
    /// Invoke the registration's callback with the stored payload.
    fn replay(self: Box<Self>);
}

/// A payload waiting for its busy interface to free up.
///
/// Holds one pinned in-flight unit on the registration from construction
/// until drop, so a cancel that races the queue blocks until the replay (or
/// the discard of an unreplayed entry) has finished.
pub(crate) struct DeferredEvent<T: Event> {
    registration: Arc<Registration<T>>,
    payload: T,
}

impl<T: Event> DeferredEvent<T> {
    /// The caller must hold an admission on `registration`.
    pub(crate) fn new(registration: Arc<Registration<T>>, payload: T) -> Self {
        registration.state.pin();
        Self {
            registration,
            payload,
        }
    }
}

impl<T: Event> Replay for DeferredEvent<T> {
    fn replay(self: Box<Self>) {
        self.registration.invoke(&self.payload);
    }
}

impl<T: Event> Drop for DeferredEvent<T> {
    fn drop(&mut self) {
        self.registration.state.depart();
    }
}
