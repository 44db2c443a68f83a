// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Typed multi-producer event dispatch with non-blocking per-client
//! serialization.
//!
//! # Overview
//!
//! Application code registers callbacks against a per-event-type
//! [`Server`] and any number of threads fire events into it concurrently.
//! Each trigger delivers to every currently-registered callback, either
//! *persistently* (registrations stay until cancelled) or *one-shot* (a
//! single trigger consumes the whole registration list), selected by the
//! payload type's [`Event::ONE_SHOT`] marker.
//!
//! Three pieces make the concurrency story:
//!
//! - a per-server registration list that supports concurrent trigger and
//!   concurrent cancel while callbacks are executing, with the list mutex
//!   never held across a callback;
//! - a cancellation protocol with a hard quiescence guarantee: once
//!   [`Handle::cancel`] returns, no thread is inside the callback and none
//!   will enter it again, so whatever the callback captured can be torn
//!   down immediately;
//! - a [`BusyInterface`] serializer per client: at most one callback of
//!   that client runs at a time, across all event types it registered for,
//!   and a triggering thread that finds the client busy enqueues the event
//!   and moves on instead of waiting.
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//!
//! use event_dispatch::{Event, Server};
//!
//! #[derive(Clone)]
//! struct Tick(u32);
//! impl Event for Tick {}
//!
//! let server = Server::<Tick>::new();
//! let seen = Arc::new(AtomicU32::new(0));
//!
//! let mut handle = server.register({
//!     let seen = Arc::clone(&seen);
//!     move |Tick(value)| {
//!         seen.fetch_add(*value, Ordering::Relaxed);
//!     }
//! });
//!
//! server.trigger(&Tick(21));
//! server.trigger(&Tick(21));
//! handle.cancel();
//! server.trigger(&Tick(1));
//!
//! assert_eq!(seen.load(Ordering::Relaxed), 42);
//! ```
//!
//! # Concurrency
//!
//! Everything runs on the caller's thread: there is no internal scheduler,
//! no event loop, and no async runtime. A registration without a busy
//! interface may have its callback invoked by many triggering threads at
//! once; with a busy interface, invocations are totally ordered and
//! deferred replays follow queue FIFO. `cancel` is bounded only by the
//! longest running callback.

// Public surface
mod busy;
mod event;
mod handle;
mod server;

// Internal machinery
mod deferred;
mod registration;

pub use busy::BusyInterface;
pub use event::Event;
pub use handle::{Handle, HandleSet};
pub use server::Server;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    struct Ping(i32);
    impl Event for Ping {}

    #[derive(Clone)]
    struct Flush;
    impl Event for Flush {
        const ONE_SHOT: bool = true;
    }

    #[test]
    fn persistent_lifecycle() {
        let server = Server::<Ping>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handle = server.register({
            let calls = Arc::clone(&calls);
            move |_| {
                calls.fetch_add(1, Ordering::Relaxed);
            }
        });

        server.trigger(&Ping(42));
        server.trigger(&Ping(43));
        assert_eq!(calls.load(Ordering::Relaxed), 2);

        handle.cancel();
        server.trigger(&Ping(44));
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn one_shot_delivers_to_all_then_empties() {
        let server = Server::<Flush>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles: Vec<_> = (0..2)
            .map(|_| {
                let calls = Arc::clone(&calls);
                server.register(move |_| {
                    calls.fetch_add(1, Ordering::Relaxed);
                })
            })
            .collect();

        server.trigger(&Flush);
        assert_eq!(calls.load(Ordering::Relaxed), 2);

        // The list was consumed: a second trigger reaches nobody.
        server.trigger(&Flush);
        assert_eq!(calls.load(Ordering::Relaxed), 2);

        for handle in &mut handles {
            handle.cancel();
        }
    }

    #[test]
    fn busy_hold_defers_until_release() {
        let server = Server::<Ping>::new();
        let busy = BusyInterface::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handle = server.register_busy(
            {
                let calls = Arc::clone(&calls);
                move |_| {
                    calls.fetch_add(1, Ordering::Relaxed);
                }
            },
            &busy,
        );

        // Simulate a long callback holding the client busy.
        assert!(busy.try_enter());
        server.trigger(&Ping(1));
        assert_eq!(calls.load(Ordering::Relaxed), 0);

        // Releasing the hold drains the deferred event.
        assert!(busy.leave());
        assert_eq!(calls.load(Ordering::Relaxed), 1);

        handle.cancel();
    }

    #[test]
    fn free_client_is_invoked_inline() {
        let server = Server::<Ping>::new();
        let busy = BusyInterface::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handle = server.register_busy(
            {
                let calls = Arc::clone(&calls);
                move |_| {
                    calls.fetch_add(1, Ordering::Relaxed);
                }
            },
            &busy,
        );

        server.trigger(&Ping(5));
        assert_eq!(calls.load(Ordering::Relaxed), 1);

        handle.cancel();
    }
}
