// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! One client, two event types, one shared busy interface.
//!
//! Two threads hammer separate servers; the client's busy interface keeps
//! its callbacks serialized, which the `inside` counter asserts. Run with
//! `RUST_LOG=trace` to watch deferral and replay decisions.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use tracing_subscriber::EnvFilter;

use event_dispatch::{BusyInterface, Event, HandleSet, Server};

const TRIGGERS_PER_THREAD: usize = 10_000;

#[derive(Clone)]
struct Connected {
    peer: u32,
}
impl Event for Connected {}

#[derive(Clone)]
struct Disconnected {
    peer: u32,
}
impl Event for Disconnected {}

#[derive(Default)]
struct Client {
    inside: AtomicUsize,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl Client {
    fn on_connected(&self, event: &Connected) {
        assert_eq!(
            self.inside.fetch_add(1, Ordering::SeqCst),
            0,
            "two callbacks ran concurrently for peer {}",
            event.peer
        );
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.inside.fetch_sub(1, Ordering::SeqCst);
    }

    fn on_disconnected(&self, event: &Disconnected) {
        assert_eq!(
            self.inside.fetch_add(1, Ordering::SeqCst),
            0,
            "two callbacks ran concurrently for peer {}",
            event.peer
        );
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.inside.fetch_sub(1, Ordering::SeqCst);
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let connected = Arc::new(Server::<Connected>::new());
    let disconnected = Arc::new(Server::<Disconnected>::new());
    let busy = BusyInterface::new();
    let client = Arc::new(Client::default());

    let mut handles = HandleSet::new();
    handles.insert(connected.register_busy(
        {
            let client = Arc::clone(&client);
            move |event| client.on_connected(event)
        },
        &busy,
    ));
    handles.insert(disconnected.register_busy(
        {
            let client = Arc::clone(&client);
            move |event| client.on_disconnected(event)
        },
        &busy,
    ));

    let connect_thread = {
        let connected = Arc::clone(&connected);
        thread::spawn(move || {
            for peer in 0..TRIGGERS_PER_THREAD {
                connected.trigger(&Connected { peer: peer as u32 });
            }
        })
    };
    let disconnect_thread = {
        let disconnected = Arc::clone(&disconnected);
        thread::spawn(move || {
            for peer in 0..TRIGGERS_PER_THREAD {
                disconnected.trigger(&Disconnected { peer: peer as u32 });
            }
        })
    };
    connect_thread.join().unwrap();
    disconnect_thread.join().unwrap();

    // Tear every registration down before the client goes away.
    handles.cancel_all();

    println!(
        "connects: {}, disconnects: {}",
        client.connects.load(Ordering::SeqCst),
        client.disconnects.load(Ordering::SeqCst)
    );
    assert_eq!(client.connects.load(Ordering::SeqCst), TRIGGERS_PER_THREAD);
    assert_eq!(
        client.disconnects.load(Ordering::SeqCst),
        TRIGGERS_PER_THREAD
    );
}
