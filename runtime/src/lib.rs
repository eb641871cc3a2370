// Copyright 2026 Vega Contributors
// SPDX-License-Identifier: Apache-2.0

//! Vega runtime library — headless client for a persistent-session
//! browser strategy game.
//!
//! The upstream has no API: game state is scraped out of server-rendered
//! pages (HTML plus inline-script JSON) and actions are HTML form replays.
//! The runtime wraps that into a typed facade ([`bot::Bot`]) backed by one
//! authenticated session and a single-flight priority scheduler.

pub mod bot;
pub mod config;
pub mod errors;
pub mod events;
pub mod extract;
pub mod http;
pub mod scheduler;
pub mod session;
pub mod snapshot;
