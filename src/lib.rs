// SPDX-License-Identifier: GPL-3.0-only

//! Keyboard-state plumbing for an X11 on-screen keyboard.
//!
//! This crate keeps a virtual keyboard's buttons truthful about the
//! physical keyboard state and delivers their presses back to the
//! focused application:
//!
//! - [`glyph`] resolves what a button should display, per layout and
//!   shift level, with the fallback chain for sparsely mapped keys.
//! - [`modifier`] polls the lock modifiers (Caps Lock, Num Lock,
//!   level-3 shift) and reports changes made on the physical keyboard.
//! - [`layout`] tracks the configured layout list and active index as
//!   published by the desktop's keyboard daemon.
//! - [`synth`] injects fake key events, wrapping each key in the
//!   currently held virtual modifiers.
//! - [`button`] holds the per-button display state machine and the
//!   auto-repeat timer.
//! - [`engine`] ties these together in a single-threaded async run
//!   loop; [`dbus`] bridges the layout daemon's signals into it.
//!
//! The X server is reached through the [`server::InputServer`] trait;
//! [`server::X11Server`] is the real backend.

pub mod app_settings;
pub mod button;
pub mod dbus;
pub mod engine;
pub mod glyph;
pub mod layout;
pub mod modifier;
pub mod server;
pub mod synth;

// ============================================================================
// Integration tests
// ============================================================================
