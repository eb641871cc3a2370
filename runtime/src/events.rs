// Copyright 2026 Vega Contributors
// SPDX-License-Identifier: Apache-2.0

//! Typed events from every runtime component.
//!
//! The EventBus is a `tokio::sync::broadcast` channel carrying
//! [`BotEvent`] values. Any consumer — a routing layer, log files, an
//! operator dashboard — can subscribe independently. When no subscribers
//! exist, events are silently dropped (zero overhead).

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Every event the runtime emits. Serialized to JSON for external consumers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BotEvent {
    // ── Auth Events ───────────────────────
    /// A login attempt has started.
    LoginStarted { username: String },
    /// A login attempt finished.
    LoginComplete { success: bool },
    /// The upstream demands an interactive challenge before login.
    ChallengeRequired { challenge_id: String },
    /// A challenge answer was submitted.
    ChallengeSolved { challenge_id: String, success: bool },
    /// A fetched page showed the session is no longer authenticated.
    SessionExpired,
    /// The session was logged out on purpose.
    LoggedOut,

    // ── Status Events ─────────────────────
    /// Status flags changed, parsed opportunistically from a fetched page.
    StatusFlags {
        under_attack: bool,
        vacation_mode: bool,
    },

    // ── Task Events ───────────────────────
    /// A task entered the scheduler heap.
    TaskQueued {
        id: u64,
        priority: u8,
        queue_depth: usize,
    },
    /// The worker started executing a task.
    TaskStarted { id: u64 },
    /// A task finished and its result was delivered.
    TaskComplete {
        id: u64,
        success: bool,
        elapsed_ms: u64,
    },
    /// A task was cancelled before the worker reached it.
    TaskCancelled { id: u64 },
}

/// The central event bus for the runtime.
///
/// All components emit events through this bus. Consumers subscribe
/// to receive a stream of all events.
pub struct EventBus {
    sender: broadcast::Sender<BotEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers. Silently ignores if no subscribers.
    pub fn emit(&self, event: BotEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<BotEvent> {
        self.sender.subscribe()
    }
}
