// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Cancellation tokens returned by registration.

use std::sync::Arc;

use tracing::trace;

use crate::event::Event;
use crate::registration::Registration;

/// Move-only cancellation token for one registration.
///
/// A handle starts null ([`Handle::null`] / [`Default`]) and is normally
/// assigned from a `register` call. Cancel it before dropping it and before
/// destroying anything the callback captures; dropping a handle that still
/// refers to a live registration is a programming error caught by a debug
/// assertion. One-shot registrations consumed by a trigger still need their
/// handle cancelled (the cancel is then immediate).
pub struct Handle<T: Event> {
    registration: Option<Arc<Registration<T>>>,
}

impl<T: Event> Handle<T> {
    pub(crate) fn new(registration: Arc<Registration<T>>) -> Self {
        Self {
            registration: Some(registration),
        }
    }

    /// A token referring to nothing; `cancel` on it is a no-op.
    pub fn null() -> Self {
        Self { registration: None }
    }

    /// Stop future invocations and wait until no thread is still inside the
    /// callback.
    ///
    /// On return it is safe to destroy anything the callback captured,
    /// including the client owning the busy interface: no invocation is in
    /// flight, none will start, and already-queued deferred events have
    /// completed. The wait is bounded only by the longest running callback.
    pub fn cancel(&mut self) {
        let Some(registration) = self.registration.take() else {
            return;
        };
        trace!(registration = ?Arc::as_ptr(&registration), "cancelling registration");
        if registration.state.begin_cancel() > 0 {
            registration.state.await_quiescence();
        }
    }

    /// Whether this handle no longer refers to a live registration.
    pub fn is_cancelled(&self) -> bool {
        match &self.registration {
            None => true,
            Some(registration) => registration.state.is_cancelled(),
        }
    }

    /// Suppress (or restore) per-invocation trace output for this
    /// registration. Useful for high-frequency callbacks.
    pub fn set_silent(&self, silent: bool) {
        if let Some(registration) = &self.registration {
            registration.set_silent(silent);
        }
    }
}

impl<T: Event> Default for Handle<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: Event> Drop for Handle<T> {
    fn drop(&mut self) {
        debug_assert!(
            self.registration.is_none() || std::thread::panicking(),
            "handle dropped without cancel(); the callback and its captures may still be invoked"
        );
    }
}

trait ErasedCancel: Send {
    fn cancel_erased(&mut self);
}

impl<T: Event> ErasedCancel for Handle<T> {
    fn cancel_erased(&mut self) {
        self.cancel();
    }
}

/// Owns handles across any number of event types and cancels them together.
///
/// A client that registers for several event types keeps its handles here
/// and calls [`cancel_all`](HandleSet::cancel_all) during teardown; dropping
/// the set cancels whatever is left.
#[derive(Default)]
pub struct HandleSet {
    handles: Vec<Box<dyn ErasedCancel>>,
}

impl HandleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a handle.
    pub fn insert<T: Event>(&mut self, handle: Handle<T>) {
        self.handles.push(Box::new(handle));
    }

    /// Cancel every held handle, blocking for quiescence on each.
    pub fn cancel_all(&mut self) {
        for handle in &mut self.handles {
            handle.cancel_erased();
        }
        self.handles.clear();
    }

    /// Number of handles currently held.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Drop for HandleSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::Server;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    struct Ping(u32);
    impl Event for Ping {}

    #[test]
    fn null_handle_cancel_is_a_noop() {
        let mut handle = Handle::<Ping>::null();
        assert!(handle.is_cancelled());
        handle.cancel();
        handle.cancel();
        assert!(handle.is_cancelled());
    }

    #[test]
    fn default_handle_is_null() {
        let handle = Handle::<Ping>::default();
        assert!(handle.is_cancelled());
    }

    #[test]
    fn live_handle_reports_cancellation() {
        let server = Server::<Ping>::new();
        let mut handle = server.register(|_| {});
        assert!(!handle.is_cancelled());
        handle.cancel();
        assert!(handle.is_cancelled());
    }

    #[test]
    fn handle_set_cancels_everything_on_drop() {
        let server = Server::<Ping>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = HandleSet::new();
        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            handles.insert(server.register(move |_| {
                calls.fetch_add(1, Ordering::Relaxed);
            }));
        }
        assert_eq!(handles.len(), 3);

        server.trigger(&Ping(1));
        assert_eq!(calls.load(Ordering::Relaxed), 3);

        drop(handles);
        server.trigger(&Ping(2));
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }
}
